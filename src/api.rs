//! JSON bodies of the analysis server's HTTP API, shared by the server and its clients

use crate::analysis::{Analysis, DebugImages};
use serde::{Deserialize, Serialize};

/// `POST /analyze`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_short_answer: bool,
    #[serde(default)]
    pub use_gemini: bool,
}

/// `POST /analyze-image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageBody {
    #[serde(default)]
    pub image_data: String,

    /// Accepted for compatibility; the mode is classified from the extracted text
    #[serde(default)]
    pub is_short_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub answer: String,
    pub processing_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugImagePaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<String>,
}

impl From<&DebugImages> for DebugImagePaths {
    fn from(images: &DebugImages) -> Self {
        Self {
            original: images.original.as_ref().map(|p| p.display().to_string()),
            processed: images.processed.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageResponse {
    pub answer: String,
    pub confidence: Option<f32>,
    pub processing_time: u64,
    pub text_extracted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_images: Option<DebugImagePaths>,
}

impl AnalyzeImageResponse {
    pub fn from_analysis(analysis: Analysis, processing_time: u64) -> Self {
        Self {
            debug_images: analysis.debug_images.as_ref().map(DebugImagePaths::from),
            answer: analysis.answer,
            confidence: analysis.confidence,
            processing_time,
            text_extracted: analysis.extracted_text.unwrap_or_default(),
        }
    }
}

/// Body of every failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub processing_time: u64,
}

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    /// `initialized` when OCR is configured, `not initialized` otherwise
    pub vision: String,

    /// RFC 3339
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::QuestionMode;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_analyze_body_defaults() {
        let body: AnalyzeBody = serde_json::from_value(json!({"text": "What is 2+2?"})).unwrap();
        assert!(!body.is_short_answer);
        assert!(!body.use_gemini);

        let body: AnalyzeBody =
            serde_json::from_value(json!({"text": "q", "isShortAnswer": true, "useGemini": true})).unwrap();
        assert!(body.is_short_answer && body.use_gemini);
    }

    #[test]
    fn test_image_response_wire_format() {
        let analysis = Analysis {
            answer: "B".into(),
            mode: QuestionMode::Mcq,
            confidence: Some(0.5),
            extracted_text: Some("1. q\na) x\nb) y".into()),
            debug_images: Some(DebugImages { original: Some(PathBuf::from("/tmp/original-1.png")), processed: None }),
        };
        let value = serde_json::to_value(AnalyzeImageResponse::from_analysis(analysis, 42)).unwrap();
        assert_eq!(
            value,
            json!({
                "answer": "B",
                "confidence": 0.5,
                "processingTime": 42,
                "textExtracted": "1. q\na) x\nb) y",
                "debugImages": {"original": "/tmp/original-1.png"}
            })
        );
    }

    #[test]
    fn test_debug_images_omitted_when_absent() {
        let analysis = Analysis {
            answer: "PARIS".into(),
            mode: QuestionMode::ShortAnswer,
            confidence: None,
            extracted_text: None,
            debug_images: None,
        };
        let value = serde_json::to_value(AnalyzeImageResponse::from_analysis(analysis, 7)).unwrap();
        assert!(value.get("debugImages").is_none());
        assert_eq!(value["textExtracted"], "");
    }
}

use crate::error::AnalysisError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error};
use serde::{Deserialize, Serialize};

const VISION_API_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const BACKEND: &str = "vision";

/// One text annotation; the first covers the whole image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    pub description: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Optical character recognition over an encoded image
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Detect text in `image`. An image without text yields an empty list, not an error.
    async fn detect_text(&self, image: &[u8]) -> Result<Vec<TextDetection>, AnalysisError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest {
    image: VisionImage,
    features: Vec<VisionFeature>,
    image_context: ImageContext,
}

#[derive(Debug, Serialize)]
struct VisionImage {
    content: String,
}

#[derive(Debug, Serialize)]
struct VisionFeature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<&'static str>,
    text_detection_params: TextDetectionParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextDetectionParams {
    enable_text_detection_confidence_score: bool,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextDetection>,
    error: Option<VisionError>,
}

#[derive(Debug, Deserialize)]
struct VisionError {
    message: String,
}

fn annotate_request(image: &[u8]) -> AnnotateRequest {
    AnnotateRequest {
        requests: vec![AnnotateImageRequest {
            image: VisionImage { content: STANDARD.encode(image) },
            features: vec![VisionFeature { kind: "TEXT_DETECTION" }],
            image_context: ImageContext {
                language_hints: vec!["en"],
                text_detection_params: TextDetectionParams { enable_text_detection_confidence_score: true },
            },
        }],
    }
}

/// Read the detections out of an `images:annotate` response body
pub fn parse_annotate_response(body: &str) -> Result<Vec<TextDetection>, AnalysisError> {
    let response: AnnotateResponse = serde_json::from_str(body).map_err(|e| AnalysisError::MalformedResponse {
        backend: BACKEND.to_string(),
        reason: format!("invalid JSON: {}", e),
    })?;

    let Some(first) = response.responses.into_iter().next() else {
        return Err(AnalysisError::MalformedResponse { backend: BACKEND.to_string(), reason: "no responses".into() });
    };
    if let Some(error) = first.error {
        return Err(AnalysisError::Backend { backend: BACKEND.to_string(), reason: error.message });
    }
    Ok(first.text_annotations)
}

/// Google Cloud Vision text detection over REST
pub struct VisionOcr {
    client: reqwest::Client,
    api_key: String,
}

impl VisionOcr {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into() }
    }
}

#[async_trait]
impl OcrService for VisionOcr {
    async fn detect_text(&self, image: &[u8]) -> Result<Vec<TextDetection>, AnalysisError> {
        debug!("Sending {} bytes to Vision text detection", image.len());

        let response = self
            .client
            .post(VISION_API_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&annotate_request(image))
            .send()
            .await
            .map_err(|e| AnalysisError::Backend { backend: BACKEND.to_string(), reason: e.to_string() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Backend { backend: BACKEND.to_string(), reason: e.to_string() })?;

        if !status.is_success() {
            error!("Vision error: status={}, body={}", status, body);
            return Err(AnalysisError::Status { backend: BACKEND.to_string(), status: status.as_u16() });
        }

        let detections = parse_annotate_response(&body)?;
        debug!("Vision returned {} text annotations", detections.len());
        Ok(detections)
    }
}

//! OCR and answer generation
//!
//! The [`Dispatcher`] owns the configured backends and one [`RetryPolicy`].
//! Text requests go straight to an answer backend; image requests are
//! preprocessed, run through OCR, cleaned and classified first.

pub mod backend;
pub mod debug;
pub mod ocr;
pub mod preprocess;
pub mod retry;

pub use backend::{build_prompt, AnswerBackend, ClaudeBackend, GeminiBackend, Provider, Sampling};
pub use debug::DebugArtifacts;
pub use ocr::{OcrService, TextDetection, VisionOcr};
pub use retry::RetryPolicy;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::normalize::{classify_question, clean_extracted_text, format_answer, QuestionMode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const VISION: &str = "vision";

// 1x1 grayscale PNG used to validate OCR credentials
const PROBE_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNk+A8AAQUBAScY42YAAAAASUVORK5CYII=";

/// Work for the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    /// Selected text; `backend` falls back to the default provider
    Text { payload: String, mode: QuestionMode, backend: Option<Provider> },

    /// Encoded image bytes; `mode` is classified from the OCR text when absent
    Image { payload: Vec<u8>, mode: Option<QuestionMode> },
}

/// Paths of the images written for an image request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugImages {
    pub original: Option<PathBuf>,
    pub processed: Option<PathBuf>,
}

/// A normalized answer plus advisory metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub answer: String,
    pub mode: QuestionMode,

    /// OCR confidence of the full-text annotation, when reported
    pub confidence: Option<f32>,

    /// Cleaned question text, for image requests
    pub extracted_text: Option<String>,
    pub debug_images: Option<DebugImages>,
}

/// Routes analysis requests to OCR and answer backends with retry
pub struct Dispatcher {
    backends: HashMap<Provider, Arc<dyn AnswerBackend>>,
    ocr: Option<Arc<dyn OcrService>>,
    default_provider: Provider,
    retry: RetryPolicy,
    debug: DebugArtifacts,
}

impl Dispatcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            backends: HashMap::new(),
            ocr: None,
            default_provider: Provider::Claude,
            retry,
            debug: DebugArtifacts::disabled(),
        }
    }

    /// Build every backend whose credentials are present in `config`
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let mut dispatcher = Self::new(config.retry).with_default_provider(config.default_provider);

        if let Some(key) = &config.anthropic_api_key {
            dispatcher = dispatcher.with_backend(Arc::new(ClaudeBackend::new(key.clone(), config.anthropic_model.clone())));
        }
        if let Some(key) = &config.gemini_api_key {
            dispatcher = dispatcher.with_backend(Arc::new(GeminiBackend::new(key.clone(), config.gemini_model.clone())));
        }
        if let Some(key) = &config.vision_api_key {
            dispatcher = dispatcher.with_ocr(Arc::new(VisionOcr::new(key.clone())));
        }
        if let Some(dir) = &config.debug_dir {
            dispatcher = dispatcher.with_debug_dir(dir.clone());
        }
        dispatcher
    }

    /// Register `backend` under its provider, replacing any previous one
    pub fn with_backend(mut self, backend: Arc<dyn AnswerBackend>) -> Self {
        self.backends.insert(backend.provider(), backend);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrService>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_default_provider(mut self, provider: Provider) -> Self {
        self.default_provider = provider;
        self
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug = DebugArtifacts::new(Some(dir.into()));
        self
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    pub fn has_backend(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<Analysis, AnalysisError> {
        match request {
            AnalysisRequest::Text { payload, mode, backend } => self.analyze_text(&payload, mode, backend).await,
            AnalysisRequest::Image { payload, mode } => self.analyze_image(payload, mode).await,
        }
    }

    pub async fn analyze_text(
        &self,
        text: &str,
        mode: QuestionMode,
        provider: Option<Provider>,
    ) -> Result<Analysis, AnalysisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::InvalidRequest("No text provided".to_string()));
        }

        let answer = self.answer(text, mode, provider.unwrap_or(self.default_provider)).await?;
        Ok(Analysis { answer, mode, confidence: None, extracted_text: None, debug_images: None })
    }

    pub async fn analyze_image(&self, image: Vec<u8>, mode: Option<QuestionMode>) -> Result<Analysis, AnalysisError> {
        if image.is_empty() {
            return Err(AnalysisError::InvalidRequest("No image data provided".to_string()));
        }
        let Some(ocr) = &self.ocr else {
            return Err(AnalysisError::BackendUnavailable(VISION.to_string()));
        };
        info!("Analyzing image ({} bytes)", image.len());

        let original_path = self.debug.save(&image, "original").await;
        let raw = image.clone();
        let processed = tokio::task::spawn_blocking(move || preprocess::prepare_for_ocr(&image))
            .await
            .unwrap_or_else(|e| {
                warn!("Preprocessing task failed, using original image: {}", e);
                raw
            });
        let processed_path = self.debug.save(&processed, "processed").await;

        let debug_images = if original_path.is_some() || processed_path.is_some() {
            Some(DebugImages { original: original_path, processed: processed_path })
        } else {
            None
        };

        let detections = self.retry.run(VISION, |_| ocr.detect_text(&processed)).await?;
        info!("Detected {} text annotations", detections.len());

        let Some(first) = detections.into_iter().next() else {
            let mut message = "No text detected in image".to_string();
            if let Some(images) = &debug_images {
                message.push_str(&format!(". Debug images saved at: {}", describe_debug_images(images)));
            }
            return Err(AnalysisError::NoText(message));
        };
        debug!("First detection confidence: {:?}", first.confidence);

        let cleaned = clean_extracted_text(&first.description);
        if cleaned.is_empty() {
            return Err(AnalysisError::NoText("No readable question text found in image".to_string()));
        }

        let mode = mode.unwrap_or_else(|| classify_question(&cleaned));
        info!("Extracted {} characters, classified as {}", cleaned.len(), mode);

        let answer = self.answer(&cleaned, mode, self.default_provider).await?;
        Ok(Analysis {
            answer,
            mode,
            confidence: first.confidence,
            extracted_text: Some(cleaned),
            debug_images,
        })
    }

    /// Validate the OCR credentials once with a tiny image
    pub async fn probe_ocr(&self) -> Result<(), AnalysisError> {
        let Some(ocr) = &self.ocr else {
            return Err(AnalysisError::BackendUnavailable(VISION.to_string()));
        };
        let png = STANDARD
            .decode(PROBE_PNG)
            .map_err(|e| AnalysisError::InvalidRequest(format!("probe image: {}", e)))?;

        let detections = tokio::time::timeout(self.retry.attempt_timeout, ocr.detect_text(&png))
            .await
            .map_err(|_| AnalysisError::Timeout { operation: VISION.to_string(), duration: self.retry.attempt_timeout })??;
        debug!("OCR probe returned {} annotations", detections.len());
        Ok(())
    }

    async fn answer(&self, text: &str, mode: QuestionMode, provider: Provider) -> Result<String, AnalysisError> {
        let Some(backend) = self.backends.get(&provider) else {
            return Err(AnalysisError::BackendUnavailable(provider.to_string()));
        };

        let prompt = build_prompt(text, mode);
        let sampling = backend.sampling();
        info!("Asking {} ({})", provider, mode);

        let raw = self
            .retry
            .run(&provider.to_string(), |_| backend.complete(&prompt, &sampling))
            .await?;
        let answer = format_answer(&raw, mode);
        if answer.is_empty() {
            warn!("{} answer {:?} is empty once normalized", provider, raw);
            return Err(AnalysisError::MalformedResponse {
                backend: provider.to_string(),
                reason: "Invalid response format".to_string(),
            });
        }
        info!("{} answered {:?}, normalized to {:?}", provider, raw, answer);
        Ok(answer)
    }
}

fn describe_debug_images(images: &DebugImages) -> String {
    let show = |path: &Option<PathBuf>| path.as_ref().map_or_else(|| "not saved".to_string(), |p| p.display().to_string());
    format!("Original: {}, Processed: {}", show(&images.original), show(&images.processed))
}

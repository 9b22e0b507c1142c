use crate::analysis::{Dispatcher, Provider};
use crate::api::{AnalyzeBody, AnalyzeImageBody, AnalyzeImageResponse, AnalyzeResponse, ErrorResponse, HealthResponse};
use crate::capture::decode_data_url;
use crate::error::AnalysisError;
use crate::normalize::QuestionMode;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

const SERVER: &str = "analysis server";

/// Network egress of the background agent: text or an image in, a display-ready answer out
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn analyze_text(
        &self,
        text: &str,
        mode: QuestionMode,
        provider: Option<Provider>,
    ) -> Result<String, AnalysisError>;

    /// `image_data` is a data URL or bare base64
    async fn analyze_image(&self, image_data: &str) -> Result<String, AnalysisError>;
}

#[async_trait]
impl AnswerService for Dispatcher {
    async fn analyze_text(
        &self,
        text: &str,
        mode: QuestionMode,
        provider: Option<Provider>,
    ) -> Result<String, AnalysisError> {
        Ok(Dispatcher::analyze_text(self, text, mode, provider).await?.answer)
    }

    async fn analyze_image(&self, image_data: &str) -> Result<String, AnalysisError> {
        let bytes = decode_data_url(image_data).map_err(|e| AnalysisError::InvalidRequest(e.to_string()))?;
        Ok(Dispatcher::analyze_image(self, bytes, None).await?.answer)
    }
}

/// Client for a running analysis server
#[derive(Debug, Clone)]
pub struct HttpAnswerService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnswerService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, AnalysisError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(request_failed)?;
        read_json(response).await
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, AnalysisError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await.map_err(request_failed)?;
        read_json(response).await
    }
}

fn request_failed(e: reqwest::Error) -> AnalysisError {
    AnalysisError::Backend { backend: SERVER.to_string(), reason: e.to_string() }
}

async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, AnalysisError> {
    let status = response.status();
    let body = response.text().await.map_err(request_failed)?;

    if !status.is_success() {
        let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) else {
            return Err(AnalysisError::Status { backend: SERVER.to_string(), status: status.as_u16() });
        };
        return Err(match status.as_u16() {
            400 => AnalysisError::InvalidRequest(error.error),
            422 => AnalysisError::NoText(error.error),
            _ => AnalysisError::Backend { backend: SERVER.to_string(), reason: error.error },
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| AnalysisError::MalformedResponse { backend: SERVER.to_string(), reason: e.to_string() })
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn analyze_text(
        &self,
        text: &str,
        mode: QuestionMode,
        provider: Option<Provider>,
    ) -> Result<String, AnalysisError> {
        let body = AnalyzeBody {
            text: text.to_string(),
            is_short_answer: mode == QuestionMode::ShortAnswer,
            use_gemini: provider == Some(Provider::Gemini),
        };
        let response: AnalyzeResponse = self.post("/analyze", &body).await?;
        debug!("Server answered in {}ms", response.processing_time);
        Ok(response.answer)
    }

    async fn analyze_image(&self, image_data: &str) -> Result<String, AnalysisError> {
        let body = AnalyzeImageBody { image_data: image_data.to_string(), is_short_answer: false };
        let response: AnalyzeImageResponse = self.post("/analyze-image", &body).await?;
        debug!("Server answered in {}ms from {:?}", response.processing_time, response.text_extracted);
        Ok(response.answer)
    }
}

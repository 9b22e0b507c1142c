use crate::error::AnalysisError;
use crate::normalize::QuestionMode;
use async_trait::async_trait;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Generative service an answer is requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Gemini,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Claude => write!(f, "claude"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Sampling parameters sent with each completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// A generative service: prompt text in, raw answer text out
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    fn provider(&self) -> Provider;

    fn sampling(&self) -> Sampling;

    async fn complete(&self, prompt: &str, sampling: &Sampling) -> Result<String, AnalysisError>;
}

/// Prompt asking for an answer in the shape `mode` expects
pub fn build_prompt(text: &str, mode: QuestionMode) -> String {
    match mode {
        QuestionMode::Mcq => format!(
            "For this multiple choice question:\n{}\n\nRespond with ONLY the single letter (A, B, C, D, or E) of the correct answer. No periods, explanations or other text.",
            text
        ),
        QuestionMode::ShortAnswer => format!(
            "Given this question: {}\nAnswer with ONLY one or two words. If several answers are correct, separate them with commas (e.g. \"cat,dog\"). No explanations or additional text.",
            text
        ),
    }
}

fn request_failed(provider: Provider, e: reqwest::Error) -> AnalysisError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    AnalysisError::Backend { backend: provider.to_string(), reason }
}

fn malformed(provider: Provider, reason: impl Into<String>) -> AnalysisError {
    AnalysisError::MalformedResponse { backend: provider.to_string(), reason: reason.into() }
}

async fn read_success_body(provider: Provider, response: reqwest::Response) -> Result<String, AnalysisError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| request_failed(provider, e))?;
    debug!("{} responded with status {}", provider, status);

    if !status.is_success() {
        error!("{} error: status={}, body={}", provider, status, body);
        return Err(AnalysisError::Status { backend: provider.to_string(), status: status.as_u16() });
    }
    Ok(body)
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    text: Option<String>,
}

/// Extract the answer text from an Anthropic messages response body
pub fn parse_claude_response(body: &str) -> Result<String, AnalysisError> {
    let response: ClaudeResponse =
        serde_json::from_str(body).map_err(|e| malformed(Provider::Claude, format!("invalid JSON: {}", e)))?;
    response
        .content
        .into_iter()
        .find_map(|block| block.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| malformed(Provider::Claude, "no text content"))
}

/// Anthropic messages API
pub struct ClaudeBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into(), model: model.into() }
    }
}

#[async_trait]
impl AnswerBackend for ClaudeBackend {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn sampling(&self) -> Sampling {
        Sampling { temperature: 0.1, max_tokens: 1024, top_p: None, top_k: None }
    }

    async fn complete(&self, prompt: &str, sampling: &Sampling) -> Result<String, AnalysisError> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            messages: vec![ClaudeMessage { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Claude, e))?;

        let body = read_success_body(Provider::Claude, response).await?;
        parse_claude_response(&body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Extract the answer text from a Gemini `generateContent` response body
pub fn parse_gemini_response(body: &str) -> Result<String, AnalysisError> {
    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|e| malformed(Provider::Gemini, format!("invalid JSON: {}", e)))?;

    if let Some(error) = response.error {
        return Err(AnalysisError::Backend { backend: Provider::Gemini.to_string(), reason: error.message });
    }

    let text: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(malformed(Provider::Gemini, "no candidates"));
    }
    Ok(text.to_string())
}

/// Google Gemini `generateContent` API
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_key: api_key.into(), model: model.into() }
    }
}

#[async_trait]
impl AnswerBackend for GeminiBackend {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn sampling(&self) -> Sampling {
        Sampling { temperature: 0.1, max_tokens: 100, top_p: Some(0.8), top_k: Some(40) }
    }

    async fn complete(&self, prompt: &str, sampling: &Sampling) -> Result<String, AnalysisError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent { role: "user", parts: vec![GeminiPart { text: prompt }] }],
            generation_config: GeminiGenerationConfig {
                temperature: sampling.temperature,
                max_output_tokens: sampling.max_tokens,
                top_p: sampling.top_p,
                top_k: sampling.top_k,
            },
        };

        let url = format!("{}/{}:generateContent", GEMINI_API_URL, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Gemini, e))?;

        let body = read_success_body(Provider::Gemini, response).await?;
        parse_gemini_response(&body)
    }
}

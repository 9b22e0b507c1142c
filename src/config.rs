use crate::analysis::{Provider, RetryPolicy};
use crate::geometry::CaptureTarget;
use crate::relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default Anthropic model used for answers
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default Gemini model used for answers
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";

/// Slack added on top of the dispatcher's worst case before the relay gives up
pub const RELAY_MARGIN: Duration = Duration::from_secs(10);

/// Settings for the page and background agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Smallest accepted selection side, in CSS pixels, checked before scaling
    pub min_capture_size: f64,

    /// What the rasterizer captures, which decides the crop origin
    pub capture_target: CaptureTarget,

    pub relay: RelayConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { min_capture_size: 50.0, capture_target: CaptureTarget::Viewport, relay: RelayConfig::default() }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_capture_size(mut self, size: f64) -> Self {
        self.min_capture_size = size;
        self
    }

    pub fn capture_target(mut self, target: CaptureTarget) -> Self {
        self.capture_target = target;
        self
    }

    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Wait on the relay at least as long as an image analysis under `retry`
    /// can take, which is an OCR call followed by an answer call
    pub fn covering(mut self, retry: &RetryPolicy) -> Self {
        let needed = retry.budget().saturating_mul(2).saturating_add(RELAY_MARGIN);
        self.relay.response_timeout = self.relay.response_timeout.max(needed);
        self
    }
}

/// Credentials and tuning for the analysis dispatcher
///
/// A backend is only built when its API key is present; the dispatcher reports
/// requests for a missing provider as unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    /// Google Cloud Vision key used for OCR
    pub vision_api_key: Option<String>,

    /// Provider used for image requests and text requests that do not ask for Gemini
    pub default_provider: Provider,

    pub retry: RetryPolicy,

    /// Where original and preprocessed images are written; nothing is written when unset
    pub debug_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_model: DEFAULT_CLAUDE_MODEL.to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            vision_api_key: None,
            default_provider: Provider::Claude,
            retry: RetryPolicy::default(),
            debug_dir: None,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(key.into());
        self
    }

    pub fn anthropic_model(mut self, model: impl Into<String>) -> Self {
        self.anthropic_model = model.into();
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    pub fn gemini_model(mut self, model: impl Into<String>) -> Self {
        self.gemini_model = model.into();
        self
    }

    pub fn vision_api_key(mut self, key: impl Into<String>) -> Self {
        self.vision_api_key = Some(key.into());
        self
    }

    pub fn default_provider(mut self, provider: Provider) -> Self {
        self.default_provider = provider;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_capture_size, 50.0);
        assert_eq!(config.capture_target, CaptureTarget::Viewport);
        assert_eq!(config.relay.probe_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new()
            .min_capture_size(20.0)
            .capture_target(CaptureTarget::Document)
            .relay(RelayConfig::new().response_timeout(Duration::from_secs(10)));

        assert_eq!(config.min_capture_size, 20.0);
        assert_eq!(config.capture_target, CaptureTarget::Document);
        assert_eq!(config.relay.response_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_relay_outlasts_image_analysis() {
        let retry = RetryPolicy::default();
        assert!(PipelineConfig::default().relay.response_timeout >= retry.budget() * 2 + RELAY_MARGIN);

        let slow = RetryPolicy::new().max_attempts(5).attempt_timeout(Duration::from_secs(30));
        let config = PipelineConfig::new().covering(&slow);
        assert_eq!(config.relay.response_timeout, Duration::from_secs(2 * (150 + 1 + 2 + 4 + 8) + 10));

        // never shortens a longer wait
        let patient = PipelineConfig::new().relay(RelayConfig::new().response_timeout(Duration::from_secs(600)));
        assert_eq!(patient.covering(&retry).relay.response_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_analysis_config_builder() {
        let config = AnalysisConfig::new()
            .anthropic_api_key("sk-test")
            .gemini_api_key("g-test")
            .default_provider(Provider::Gemini)
            .debug_dir("/tmp/debug");

        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.anthropic_model, DEFAULT_CLAUDE_MODEL);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.vision_api_key, None);
        assert_eq!(config.default_provider, Provider::Gemini);
        assert_eq!(config.debug_dir, Some(PathBuf::from("/tmp/debug")));
    }
}

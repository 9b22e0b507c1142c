//! Region-answer analysis server
//!
//! Serves `/analyze`, `/analyze-image` and `/health` on localhost, answering
//! questions with Claude or Gemini and reading screenshots with Google Cloud Vision.

use anyhow::{Context, bail};
use clap::Parser;
use region_answer::analysis::Provider;
use region_answer::config::{DEFAULT_CLAUDE_MODEL, DEFAULT_GEMINI_MODEL};
use region_answer::{AnalysisConfig, Dispatcher, RetryPolicy, server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "answer-server")]
#[command(version)]
#[command(about = "OCR + LLM answering server for region-answer", long_about = None)]
struct Cli {
    /// Port to listen on (bound to 127.0.0.1)
    #[arg(long, short = 'p', env = "PORT", default_value = "3001")]
    port: u16,

    /// Anthropic API key; enables the Claude backend
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_CLAUDE_MODEL)]
    anthropic_model: String,

    /// Gemini API key; enables the Gemini backend
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,

    /// Google Cloud Vision API key; enables image analysis
    #[arg(long, env = "GOOGLE_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// Provider for image requests (claude or gemini)
    #[arg(long, env = "DEFAULT_PROVIDER", default_value = "claude")]
    default_provider: Provider,

    /// Save original and preprocessed OCR inputs here
    #[arg(long, env = "DEBUG_DIR", value_name = "DIR")]
    debug_dir: Option<PathBuf>,

    /// Attempts per OCR or backend call, including the first
    #[arg(long, default_value = "3")]
    retry_attempts: u32,

    /// First backoff delay in milliseconds
    #[arg(long, default_value = "1000")]
    retry_base_ms: u64,

    /// Backoff cap in milliseconds
    #[arg(long, default_value = "8000")]
    retry_max_ms: u64,

    /// Timeout for a single attempt in milliseconds
    #[arg(long, default_value = "15000")]
    attempt_timeout_ms: u64,

    /// Start even if the OCR startup probe fails
    #[arg(long)]
    skip_ocr_probe: bool,
}

impl Cli {
    fn analysis_config(&self) -> AnalysisConfig {
        let retry = RetryPolicy::new()
            .max_attempts(self.retry_attempts)
            .base_delay(Duration::from_millis(self.retry_base_ms))
            .max_delay(Duration::from_millis(self.retry_max_ms))
            .attempt_timeout(Duration::from_millis(self.attempt_timeout_ms));

        let mut config = AnalysisConfig::new()
            .anthropic_model(&self.anthropic_model)
            .gemini_model(&self.gemini_model)
            .default_provider(self.default_provider)
            .retry(retry);

        if let Some(key) = &self.anthropic_api_key {
            config = config.anthropic_api_key(key);
        }
        if let Some(key) = &self.gemini_api_key {
            config = config.gemini_api_key(key);
        }
        if let Some(key) = &self.vision_api_key {
            config = config.vision_api_key(key);
        }
        if let Some(dir) = &self.debug_dir {
            config = config.debug_dir(dir);
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.analysis_config();
    let dispatcher = Dispatcher::from_config(&config);

    eprintln!("Region-answer analysis server v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "Backends: claude {}, gemini {}",
        if dispatcher.has_backend(Provider::Claude) { "enabled" } else { "disabled" },
        if dispatcher.has_backend(Provider::Gemini) { "enabled" } else { "disabled" }
    );
    eprintln!("Default provider: {}", config.default_provider);

    if let Some(ref dir) = config.debug_dir {
        eprintln!("Debug images: {}", dir.display());
    }

    if !dispatcher.has_backend(config.default_provider) {
        log::warn!("Default provider {} has no API key; requests routed to it will fail", config.default_provider);
    }

    if !dispatcher.has_ocr() {
        eprintln!("Vision: not initialized (image analysis disabled)");
    } else if cli.skip_ocr_probe {
        eprintln!("Vision: probe skipped");
    } else {
        match dispatcher.probe_ocr().await {
            Ok(()) => eprintln!("Vision: initialized"),
            Err(e) => bail!("Google Cloud Vision probe failed: {}", e),
        }
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    eprintln!("Ready to accept requests at http://{}", addr);

    server::serve(addr, dispatcher).await.context("analysis server failed")?;

    eprintln!("Server stopped");
    Ok(())
}

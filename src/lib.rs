//! # region-answer
//!
//! Select a region of a browser page (or highlight some text) and get a short
//! AI-generated answer rendered back into the page.
//!
//! ## Features
//!
//! - **Selection Gesture**: Drag out a rectangle over the page, converted to device-pixel crop bounds
//! - **Message Relay**: Typed request/response channel between the in-page and privileged agents
//! - **Capture & Crop**: Rasterize the viewport through Chrome DevTools Protocol (CDP) and crop it exactly
//! - **Analysis Server**: OCR + LLM answering over HTTP (`/analyze`, `/analyze-image`, `/health`)
//!
//! ## Analysis Server
//!
//! ```bash
//! # Serve on 127.0.0.1:3001
//! ANTHROPIC_API_KEY=... GOOGLE_VISION_API_KEY=... cargo run --bin answer-server
//!
//! # Save original and preprocessed OCR inputs for troubleshooting
//! cargo run --bin answer-server -- --debug-dir ./debug
//! ```
//!
//! ## Library Usage
//!
//! ### Answering a Region of a Live Page
//!
//! ```rust,no_run
//! use region_answer::{BrowserSession, HttpAnswerService, LaunchOptions, Pipeline, PipelineConfig, Point};
//! use std::sync::Arc;
//!
//! # async fn run() -> region_answer::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! session.navigate("https://example.com/quiz")?;
//! session.wait_for_navigation()?;
//!
//! let page = session.page()?;
//! let answers = Arc::new(HttpAnswerService::new("http://127.0.0.1:3001"));
//! let pipeline = Pipeline::connect(page.clone(), page, answers, &PipelineConfig::default());
//!
//! pipeline.page.activate();
//! pipeline.page.pointer_down(Point::new(40.0, 120.0));
//! pipeline.page.pointer_move(Point::new(640.0, 380.0));
//! let outcome = pipeline.page.pointer_up(Point::new(640.0, 380.0)).await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ### Analyzing Text Directly
//!
//! ```rust,no_run
//! use region_answer::{AnalysisConfig, Dispatcher, QuestionMode};
//!
//! # async fn run() -> region_answer::Result<()> {
//! let config = AnalysisConfig::default().anthropic_api_key("sk-...");
//! let dispatcher = Dispatcher::from_config(&config);
//!
//! let analysis = dispatcher
//!     .analyze_text("Which planet is largest? A) Mars B) Jupiter C) Venus", QuestionMode::Mcq, None)
//!     .await?;
//! assert_eq!(analysis.answer, "B");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod analysis;
pub mod api;
pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;
pub mod normalize;
pub mod relay;
pub mod selection;

#[cfg(feature = "server")]
pub mod server;

pub use agent::{AnswerService, BackgroundAgent, HttpAnswerService, MenuChoice, PageAgent, Pipeline, SessionOutcome};
pub use analysis::{Analysis, AnalysisRequest, Dispatcher, Provider, RetryPolicy};
pub use browser::{BrowserSession, ChromePage, ConnectionOptions, LaunchOptions};
pub use capture::{CaptureService, EncodedImage, Rasterizer};
pub use config::{AnalysisConfig, PipelineConfig};
pub use error::{AnalysisError, BrowserError, CaptureError, Error, RelayError, Result};
pub use geometry::{CaptureRequest, CaptureTarget, Point, SelectionRect, ViewportMetrics};
pub use normalize::QuestionMode;
pub use relay::{Endpoint, RelayConfig, Request, Response};
pub use selection::{MemorySurface, PageSurface, SelectionMachine, SelectionState};

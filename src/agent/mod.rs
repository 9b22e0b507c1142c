//! The two isolated contexts of the pipeline and their wiring
//!
//! [`PageAgent`] lives in the page and owns the selection gesture.
//! [`BackgroundAgent`] owns capture and network egress. They share nothing but
//! a pair of relay [`Endpoint`]s.

pub mod background;
pub mod client;
pub mod page;

pub use background::{BackgroundAgent, Command, Installer, MenuChoice};
pub use client::{AnswerService, HttpAnswerService};
pub use page::{PageAgent, SessionOutcome};

use crate::capture::{CaptureService, Rasterizer};
use crate::config::PipelineConfig;
use crate::relay::Endpoint;
use crate::selection::PageSurface;
use std::sync::Arc;

/// Both agents, installed on their endpoints
pub struct Pipeline<S: PageSurface + 'static, R: Rasterizer + 'static> {
    pub page: Arc<PageAgent<S>>,
    pub background: Arc<BackgroundAgent<R>>,

    /// Requests addressed to the page agent
    pub page_endpoint: Endpoint,

    /// Requests addressed to the background agent
    pub background_endpoint: Endpoint,
}

impl<S: PageSurface + 'static, R: Rasterizer + 'static> Pipeline<S, R> {
    /// Create both agents and install each on its endpoint. Must be called inside a tokio runtime.
    pub fn connect(surface: S, rasterizer: R, answers: Arc<dyn AnswerService>, config: &PipelineConfig) -> Self {
        let page_endpoint = Endpoint::new("page", config.relay);
        let background_endpoint = Endpoint::new("background", config.relay);

        let page = PageAgent::new(surface, config, background_endpoint.clone());
        page.install(&page_endpoint);

        let reinstall = Arc::clone(&page);
        let installer: Installer = Arc::new(move |endpoint: &Endpoint| {
            reinstall.install(endpoint);
        });
        let background = BackgroundAgent::new(CaptureService::new(rasterizer), answers, page_endpoint.clone(), installer);
        background.install(&background_endpoint);

        Self { page, background, page_endpoint, background_endpoint }
    }
}

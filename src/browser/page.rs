use crate::capture::Rasterizer;
use crate::error::{BrowserError, CaptureError};
use crate::geometry::{SelectionRect, ViewportMetrics};
use crate::selection::{PageSurface, Popup};
use async_trait::async_trait;
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use log::warn;
use serde_json::Value;
use std::sync::Arc;

/// Installs `window.__regionAnswer` once per document
const SURFACE_JS: &str = include_str!("surface.js");

/// A Chrome tab acting as both the page surface and the viewport rasterizer
#[derive(Clone)]
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Run `call` against the installed helper, returning its value
    fn call(&self, call: &str) -> Result<Option<Value>, BrowserError> {
        let script = format!("{}\n;window.__regionAnswer.{}", SURFACE_JS, call);
        let result = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(result.value)
    }

    /// Rendering is cosmetic, so failures are only logged
    fn render(&self, call: &str) {
        if let Err(e) = self.call(call) {
            warn!("Page rendering failed ({}): {}", call, e);
        }
    }

    fn read_viewport(&self) -> Result<ViewportMetrics, BrowserError> {
        let value = self
            .call("viewport()")?
            .ok_or_else(|| BrowserError::EvaluationFailed("No value returned from JavaScript".to_string()))?;

        // The helper returns a JSON string
        let metrics = match value.as_str() {
            Some(json_str) => serde_json::from_str(json_str),
            None => serde_json::from_value(value),
        };
        metrics.map_err(|e| BrowserError::EvaluationFailed(format!("Failed to parse viewport metrics: {}", e)))
    }
}

/// Quote `text` as a JavaScript string literal
fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

impl PageSurface for ChromePage {
    fn viewport(&self) -> ViewportMetrics {
        self.read_viewport().unwrap_or_else(|e| {
            warn!("Falling back to default viewport metrics: {}", e);
            ViewportMetrics::default()
        })
    }

    fn show_overlay(&mut self) {
        self.render("showOverlay()");
    }

    fn set_pointer_tracking(&mut self, enabled: bool) {
        self.render(&format!("setTracking({})", enabled));
    }

    fn draw_selection(&mut self, rect: &SelectionRect) {
        self.render(&format!("drawSelection({}, {}, {}, {})", rect.x, rect.y, rect.width, rect.height));
    }

    fn remove_overlay(&mut self) {
        self.render("removeOverlay()");
    }

    fn show_popup(&mut self, popup: &Popup) {
        self.render(&format!("showPopup({}, {})", js_string(&popup.text), popup.is_error));
    }
}

#[async_trait]
impl Rasterizer for ChromePage {
    async fn capture_viewport(&self) -> Result<Vec<u8>, CaptureError> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| CaptureError::from(BrowserError::ScreenshotFailed(e.to_string())))
        })
        .await
        .map_err(|e| CaptureError::Denied(format!("screenshot task failed: {}", e)))?
    }
}

use crate::geometry::{SelectionRect, ViewportMetrics};
use crate::normalize::{display_answer, is_error_message};
use std::sync::{Arc, Mutex};

/// A message rendered in the page's answer popup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub text: String,
    pub is_error: bool,
}

impl Popup {
    /// Build a popup from an answer or an `Error: ...` message
    pub fn from_message(message: &str) -> Self {
        Self { text: display_answer(message), is_error: is_error_message(message) }
    }
}

/// The document the selection gesture happens in.
///
/// Implementations own the overlay, the selection box, cursor affordance and the
/// answer popup. Rendering failures are cosmetic and are not reported back.
pub trait PageSurface: Send {
    /// Current scroll offset and device pixel ratio
    fn viewport(&self) -> ViewportMetrics;

    /// Show the full-viewport capture overlay with a crosshair cursor
    fn show_overlay(&mut self);

    /// Start or stop routing pointer move/up events to the selection machine
    fn set_pointer_tracking(&mut self, enabled: bool);

    /// Draw (or redraw) the selection box
    fn draw_selection(&mut self, rect: &SelectionRect);

    /// Remove the overlay and selection box and restore the default cursor
    fn remove_overlay(&mut self);

    fn show_popup(&mut self, popup: &Popup);
}

/// What a [`MemorySurface`] has been asked to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceLog {
    pub overlay_visible: bool,
    pub pointer_tracking: bool,
    pub selection: Option<SelectionRect>,
    pub selection_draws: usize,
    pub popups: Vec<Popup>,
}

/// In-memory surface for headless runs and tests.
///
/// Clones share the same log, so a copy kept outside the selection machine can
/// observe everything rendered.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    metrics: ViewportMetrics,
    log: Arc<Mutex<SurfaceLog>>,
}

impl MemorySurface {
    pub fn new(metrics: ViewportMetrics) -> Self {
        Self { metrics, log: Arc::new(Mutex::new(SurfaceLog::default())) }
    }

    /// Copy of everything rendered so far
    pub fn snapshot(&self) -> SurfaceLog {
        self.log().clone()
    }

    /// Text of the most recent popup
    pub fn last_popup(&self) -> Option<Popup> {
        self.log().popups.last().cloned()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, SurfaceLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PageSurface for MemorySurface {
    fn viewport(&self) -> ViewportMetrics {
        self.metrics
    }

    fn show_overlay(&mut self) {
        self.log().overlay_visible = true;
    }

    fn set_pointer_tracking(&mut self, enabled: bool) {
        self.log().pointer_tracking = enabled;
    }

    fn draw_selection(&mut self, rect: &SelectionRect) {
        let mut log = self.log();
        log.selection = Some(*rect);
        log.selection_draws += 1;
    }

    fn remove_overlay(&mut self) {
        let mut log = self.log();
        log.overlay_visible = false;
        log.selection = None;
    }

    fn show_popup(&mut self, popup: &Popup) {
        self.log().popups.push(popup.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_styles_errors() {
        let popup = Popup::from_message("Error: Selection area too small");
        assert!(popup.is_error);
        assert_eq!(popup.text, "Error: Selection area too small");

        let popup = Popup::from_message("paris, 4");
        assert!(!popup.is_error);
        assert_eq!(popup.text, "PARIS, 4");
    }

    #[test]
    fn test_memory_surface_clones_share_log() {
        let surface = MemorySurface::default();
        let mut handle = surface.clone();

        handle.show_overlay();
        handle.draw_selection(&SelectionRect::new(1.0, 2.0, 3.0, 4.0));
        assert!(surface.snapshot().overlay_visible);
        assert_eq!(surface.snapshot().selection_draws, 1);

        handle.remove_overlay();
        assert!(!surface.snapshot().overlay_visible);
        assert_eq!(surface.snapshot().selection, None);
    }
}

use crate::config::PipelineConfig;
use crate::geometry::{to_device_pixels, CaptureRequest, CaptureTarget, Point, SelectionRect};
use crate::normalize::error_message;
use crate::selection::{PageSurface, Popup};
use log::{debug, info, warn};
use std::fmt;

/// Notice shown when a gesture ends below the minimum capture size
pub const SELECTION_TOO_SMALL: &str = "Selection area too small";

/// Identifies one capture-to-answer transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the page is in the selection gesture
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionState {
    Idle,

    /// Overlay shown, waiting for pointer-down
    Armed,

    /// Pointer held down; `rect` follows the pointer
    Selecting { start: Point, rect: SelectionRect },

    /// Gesture ended, rectangle not yet validated
    Frozen { rect: SelectionRect },

    /// Single-flight guard held; `request` is `None` for pasted images
    Processing { session: SessionId, request: Option<CaptureRequest> },
}

impl SelectionState {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionState::Idle => "idle",
            SelectionState::Armed => "armed",
            SelectionState::Selecting { .. } => "selecting",
            SelectionState::Frozen { .. } => "frozen",
            SelectionState::Processing { .. } => "processing",
        }
    }
}

/// A validated capture that the caller must send and later [`finish`](SelectionMachine::finish)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCapture {
    pub session: SessionId,
    pub request: CaptureRequest,
}

/// Result of ending a gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// No gesture was in progress
    Ignored,

    /// Rectangle below the minimum; the notice was shown and the machine is idle
    TooSmall,

    Capture(PendingCapture),
}

/// Tracks the selection gesture for one page and owns the single-flight guard.
///
/// All transitions are synchronous. The caller performs the relay round trips
/// between [`pointer_up`](Self::pointer_up) and [`finish`](Self::finish).
pub struct SelectionMachine<S: PageSurface> {
    surface: S,
    state: SelectionState,
    min_capture_size: f64,
    capture_target: CaptureTarget,
    next_session: u64,
}

impl<S: PageSurface> SelectionMachine<S> {
    pub fn new(surface: S, config: &PipelineConfig) -> Self {
        Self {
            surface,
            state: SelectionState::Idle,
            min_capture_size: config.min_capture_size,
            capture_target: config.capture_target,
            next_session: 1,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Whether the single-flight guard is held
    pub fn is_busy(&self) -> bool {
        matches!(self.state, SelectionState::Processing { .. })
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn transition(&mut self, next: SelectionState) {
        debug!("Selection {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn next_session(&mut self) -> SessionId {
        let session = SessionId(self.next_session);
        self.next_session += 1;
        session
    }

    fn teardown(&mut self) {
        self.surface.set_pointer_tracking(false);
        self.surface.remove_overlay();
    }

    /// Show the overlay and wait for a drag. Ignored unless idle.
    pub fn activate(&mut self) -> bool {
        if self.state != SelectionState::Idle {
            debug!("Ignoring activation while {}", self.state.name());
            return false;
        }
        self.surface.show_overlay();
        self.surface.set_pointer_tracking(true);
        self.transition(SelectionState::Armed);
        true
    }

    pub fn pointer_down(&mut self, at: Point) -> bool {
        if self.state != SelectionState::Armed {
            debug!("Ignoring pointer-down while {}", self.state.name());
            return false;
        }
        let rect = SelectionRect::empty_at(at);
        self.surface.draw_selection(&rect);
        self.transition(SelectionState::Selecting { start: at, rect });
        true
    }

    pub fn pointer_move(&mut self, at: Point) -> bool {
        let SelectionState::Selecting { start, rect } = &mut self.state else {
            return false;
        };
        *rect = SelectionRect::from_corners(*start, at);
        let rect = *rect;
        self.surface.draw_selection(&rect);
        true
    }

    /// End the gesture at `at`, tear down the overlay and validate the rectangle
    pub fn pointer_up(&mut self, at: Point) -> GestureOutcome {
        let SelectionState::Selecting { start, .. } = self.state else {
            return GestureOutcome::Ignored;
        };
        let rect = SelectionRect::from_corners(start, at);
        self.transition(SelectionState::Frozen { rect });
        self.teardown();

        if !rect.meets_minimum(self.min_capture_size) {
            info!(
                "Rejecting {}x{} selection (minimum {}px)",
                rect.width, rect.height, self.min_capture_size
            );
            self.surface.show_popup(&Popup::from_message(&error_message(SELECTION_TOO_SMALL)));
            self.transition(SelectionState::Idle);
            return GestureOutcome::TooSmall;
        }

        let metrics = self.surface.viewport();
        let mut scale = metrics.device_pixel_ratio;
        if !(scale.is_finite() && scale > 0.0) {
            warn!("Invalid device pixel ratio {}, using 1.0", scale);
            scale = 1.0;
        }
        let offset = self.capture_target.origin_offset(metrics.scroll);
        let request = to_device_pixels(&rect, offset, scale);

        let session = self.next_session();
        info!(
            "Session {} capturing {}x{} at ({}, {})",
            session, request.width, request.height, request.x, request.y
        );
        self.transition(SelectionState::Processing { session, request: Some(request) });
        GestureOutcome::Capture(PendingCapture { session, request })
    }

    /// Abandon an armed or in-progress gesture. Does not abort processing.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            SelectionState::Armed | SelectionState::Selecting { .. } | SelectionState::Frozen { .. } => {
                self.teardown();
                self.transition(SelectionState::Idle);
                true
            }
            _ => false,
        }
    }

    /// Take the guard for an analysis that skips the gesture (pasted or dropped images)
    pub fn begin_direct(&mut self) -> Option<SessionId> {
        if self.state != SelectionState::Idle {
            debug!("Ignoring direct submission while {}", self.state.name());
            return None;
        }
        let session = self.next_session();
        self.transition(SelectionState::Processing { session, request: None });
        Some(session)
    }

    /// Render the terminal message of `session` and release the guard.
    ///
    /// `message` is an answer or an `Error: ...` notice. Completions for any other
    /// session are dropped and `false` is returned.
    pub fn finish(&mut self, session: SessionId, message: &str) -> bool {
        match self.state {
            SelectionState::Processing { session: current, .. } if current == session => {
                self.surface.show_popup(&Popup::from_message(message));
                self.transition(SelectionState::Idle);
                true
            }
            _ => {
                debug!("Dropping stale completion for session {}", session);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ScrollOffset, ViewportMetrics};
    use crate::selection::MemorySurface;

    fn machine_with(metrics: ViewportMetrics) -> (SelectionMachine<MemorySurface>, MemorySurface) {
        let surface = MemorySurface::new(metrics);
        (SelectionMachine::new(surface.clone(), &PipelineConfig::default()), surface)
    }

    fn machine() -> (SelectionMachine<MemorySurface>, MemorySurface) {
        machine_with(ViewportMetrics::default())
    }

    fn drag(machine: &mut SelectionMachine<MemorySurface>, from: Point, to: Point) -> GestureOutcome {
        assert!(machine.activate());
        assert!(machine.pointer_down(from));
        machine.pointer_move(to);
        machine.pointer_up(to)
    }

    #[test]
    fn test_activate_arms_overlay() {
        let (mut machine, surface) = machine();
        assert!(machine.activate());
        assert_eq!(machine.state(), &SelectionState::Armed);

        let log = surface.snapshot();
        assert!(log.overlay_visible);
        assert!(log.pointer_tracking);
    }

    #[test]
    fn test_activation_is_not_reentrant() {
        let (mut machine, _surface) = machine();
        assert!(machine.activate());
        assert!(!machine.activate());

        machine.pointer_down(Point::new(1.0, 1.0));
        assert!(!machine.activate());
        assert_eq!(machine.state().name(), "selecting");
    }

    #[test]
    fn test_pointer_down_requires_armed() {
        let (mut machine, surface) = machine();
        assert!(!machine.pointer_down(Point::new(5.0, 5.0)));
        assert_eq!(machine.state(), &SelectionState::Idle);
        assert_eq!(surface.snapshot().selection_draws, 0);
    }

    #[test]
    fn test_pointer_move_tracks_rectangle_in_any_direction() {
        let (mut machine, surface) = machine();
        machine.activate();
        machine.pointer_down(Point::new(200.0, 200.0));

        machine.pointer_move(Point::new(250.0, 260.0));
        assert_eq!(surface.snapshot().selection, Some(SelectionRect::new(200.0, 200.0, 50.0, 60.0)));

        machine.pointer_move(Point::new(120.0, 150.0));
        assert_eq!(surface.snapshot().selection, Some(SelectionRect::new(120.0, 150.0, 80.0, 50.0)));
        match machine.state() {
            SelectionState::Selecting { rect, .. } => assert_eq!(*rect, SelectionRect::new(120.0, 150.0, 80.0, 50.0)),
            other => panic!("unexpected state {:?}", other),
        }
        // one draw on pointer-down, one per move
        assert_eq!(surface.snapshot().selection_draws, 3);
    }

    #[test]
    fn test_pointer_move_outside_gesture_is_ignored() {
        let (mut machine, surface) = machine();
        assert!(!machine.pointer_move(Point::new(10.0, 10.0)));
        machine.activate();
        assert!(!machine.pointer_move(Point::new(10.0, 10.0)));
        assert_eq!(surface.snapshot().selection_draws, 0);
    }

    #[test]
    fn test_small_selection_is_rejected() {
        let (mut machine, surface) = machine();
        let outcome = drag(&mut machine, Point::new(100.0, 100.0), Point::new(120.0, 120.0));

        assert_eq!(outcome, GestureOutcome::TooSmall);
        assert_eq!(machine.state(), &SelectionState::Idle);
        let log = surface.snapshot();
        assert!(!log.overlay_visible);
        assert!(!log.pointer_tracking);
        assert_eq!(
            log.popups,
            vec![Popup { text: "Error: Selection area too small".into(), is_error: true }]
        );
    }

    #[test]
    fn test_one_short_side_is_enough_to_reject() {
        let (mut machine, _surface) = machine();
        let outcome = drag(&mut machine, Point::new(0.0, 0.0), Point::new(400.0, 49.0));
        assert_eq!(outcome, GestureOutcome::TooSmall);
    }

    #[test]
    fn test_valid_selection_enters_processing() {
        let (mut machine, surface) = machine_with(ViewportMetrics { scroll: ScrollOffset::default(), device_pixel_ratio: 2.0 });
        let outcome = drag(&mut machine, Point::new(50.0, 50.0), Point::new(350.0, 200.0));

        let GestureOutcome::Capture(pending) = outcome else {
            panic!("expected capture, got {:?}", outcome);
        };
        assert_eq!(pending.request, CaptureRequest::new(100, 100, 600, 300));
        assert!(machine.is_busy());
        assert_eq!(
            machine.state(),
            &SelectionState::Processing { session: pending.session, request: Some(pending.request) }
        );

        let log = surface.snapshot();
        assert!(!log.overlay_visible);
        assert!(!log.pointer_tracking);
        assert_eq!(log.selection, None);
    }

    #[test]
    fn test_rectangle_is_finalized_at_pointer_up() {
        let (mut machine, _surface) = machine();
        machine.activate();
        machine.pointer_down(Point::new(0.0, 0.0));
        machine.pointer_move(Point::new(60.0, 60.0));

        // pointer-up lands further out than the last move
        let GestureOutcome::Capture(pending) = machine.pointer_up(Point::new(80.0, 90.0)) else {
            panic!("expected capture");
        };
        assert_eq!(pending.request, CaptureRequest::new(0, 0, 80, 90));
    }

    #[test]
    fn test_viewport_target_ignores_scroll() {
        let metrics = ViewportMetrics { scroll: ScrollOffset::new(0.0, 1200.0), device_pixel_ratio: 1.0 };
        let (mut machine, _surface) = machine_with(metrics);
        let GestureOutcome::Capture(pending) = drag(&mut machine, Point::new(10.0, 10.0), Point::new(110.0, 110.0)) else {
            panic!("expected capture");
        };
        assert_eq!(pending.request, CaptureRequest::new(10, 10, 100, 100));
    }

    #[test]
    fn test_document_target_adds_scroll() {
        let surface = MemorySurface::new(ViewportMetrics { scroll: ScrollOffset::new(0.0, 1200.0), device_pixel_ratio: 1.0 });
        let config = PipelineConfig::new().capture_target(CaptureTarget::Document);
        let mut machine = SelectionMachine::new(surface, &config);

        let GestureOutcome::Capture(pending) = drag(&mut machine, Point::new(10.0, 10.0), Point::new(110.0, 110.0)) else {
            panic!("expected capture");
        };
        assert_eq!(pending.request, CaptureRequest::new(10, 1210, 100, 100));
    }

    #[test]
    fn test_invalid_device_pixel_ratio_falls_back_to_one() {
        let (mut machine, _surface) = machine_with(ViewportMetrics { scroll: ScrollOffset::default(), device_pixel_ratio: 0.0 });
        let GestureOutcome::Capture(pending) = drag(&mut machine, Point::new(0.0, 0.0), Point::new(64.0, 64.0)) else {
            panic!("expected capture");
        };
        assert_eq!(pending.request, CaptureRequest::new(0, 0, 64, 64));
    }

    #[test]
    fn test_pointer_down_while_processing_is_noop() {
        let (mut machine, surface) = machine();
        let GestureOutcome::Capture(pending) = drag(&mut machine, Point::new(0.0, 0.0), Point::new(100.0, 100.0)) else {
            panic!("expected capture");
        };
        let before = machine.state().clone();
        let draws = surface.snapshot().selection_draws;

        assert!(!machine.pointer_down(Point::new(5.0, 5.0)));
        assert!(!machine.activate());
        assert!(!machine.cancel());
        assert_eq!(machine.pointer_up(Point::new(300.0, 300.0)), GestureOutcome::Ignored);

        assert_eq!(machine.state(), &before);
        assert_eq!(surface.snapshot().selection_draws, draws);
        assert!(machine.finish(pending.session, "A"));
    }

    #[test]
    fn test_finish_renders_and_releases_guard() {
        let (mut machine, surface) = machine();
        let GestureOutcome::Capture(pending) = drag(&mut machine, Point::new(0.0, 0.0), Point::new(100.0, 100.0)) else {
            panic!("expected capture");
        };

        assert!(machine.finish(pending.session, "a"));
        assert_eq!(machine.state(), &SelectionState::Idle);
        assert_eq!(surface.last_popup(), Some(Popup { text: "A".into(), is_error: false }));

        // the guard is free again
        assert!(machine.activate());
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let (mut machine, surface) = machine();
        let GestureOutcome::Capture(first) = drag(&mut machine, Point::new(0.0, 0.0), Point::new(100.0, 100.0)) else {
            panic!("expected capture");
        };
        assert!(machine.finish(first.session, "Error: capture denied"));

        let GestureOutcome::Capture(second) = drag(&mut machine, Point::new(0.0, 0.0), Point::new(100.0, 100.0)) else {
            panic!("expected capture");
        };
        assert_ne!(first.session, second.session);

        assert!(!machine.finish(first.session, "late"));
        assert!(machine.is_busy());
        assert_eq!(surface.snapshot().popups.len(), 1);

        assert!(machine.finish(second.session, "C"));
        assert!(!machine.finish(second.session, "C"));
    }

    #[test]
    fn test_cancel_tears_down() {
        let (mut machine, surface) = machine();
        machine.activate();
        machine.pointer_down(Point::new(10.0, 10.0));
        machine.pointer_move(Point::new(90.0, 90.0));

        assert!(machine.cancel());
        assert_eq!(machine.state(), &SelectionState::Idle);
        let log = surface.snapshot();
        assert!(!log.overlay_visible);
        assert!(!log.pointer_tracking);
        assert!(log.popups.is_empty());

        assert!(!machine.cancel());
    }

    #[test]
    fn test_begin_direct_shares_the_guard() {
        let (mut machine, _surface) = machine();
        let session = machine.begin_direct().unwrap();
        assert_eq!(machine.state(), &SelectionState::Processing { session, request: None });

        assert!(machine.begin_direct().is_none());
        assert!(!machine.activate());

        assert!(machine.finish(session, "42"));
        machine.activate();
        assert!(machine.begin_direct().is_none());
    }
}

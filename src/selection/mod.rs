//! The in-page selection gesture
//!
//! [`SelectionMachine`] turns pointer events into at most one capture request at
//! a time, rendering through a [`PageSurface`].

pub mod machine;
pub mod surface;

pub use machine::{GestureOutcome, PendingCapture, SelectionMachine, SelectionState, SessionId, SELECTION_TOO_SMALL};
pub use surface::{MemorySurface, PageSurface, Popup, SurfaceLog};

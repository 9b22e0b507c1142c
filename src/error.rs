use std::time::Duration;
use thiserror::Error;

/// Errors raised while driving a Chrome instance
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),
}

/// Errors produced by the cross-context message relay
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    /// No receiver is installed on the endpoint
    #[error("receiver not ready for '{action}'")]
    NotReady { action: String },

    /// The receiver accepted the message but never answered in time
    #[error("'{action}' timed out after {duration:?}")]
    Timeout { action: String, duration: Duration },

    /// The receiver dropped the reply slot without answering
    #[error("no response for '{action}'")]
    NoResponse { action: String },

    /// The response did not have the shape the sender expected
    #[error("unexpected response to '{action}': {detail}")]
    UnexpectedResponse { action: String, detail: String },
}

/// Errors produced while rasterizing and cropping the viewport
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("capture denied: {0}")]
    Denied(String),

    #[error("capture area {width}x{height} is below the minimum of {min}px")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error(
        "crop bounds ({x},{y},{width},{height}) exceed captured bitmap {bitmap_width}x{bitmap_height}"
    )]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bitmap_width: u32,
        bitmap_height: u32,
    },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// A browser that cannot rasterize the viewport denies the capture
impl From<BrowserError> for CaptureError {
    fn from(e: BrowserError) -> Self {
        CaptureError::Denied(e.to_string())
    }
}

/// Errors produced by the analysis dispatcher and its collaborators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// The request itself is unusable; never retried
    #[error("{0}")]
    InvalidRequest(String),

    /// OCR returned nothing usable; never retried
    #[error("{0}")]
    NoText(String),

    #[error("no backend configured for provider '{0}'")]
    BackendUnavailable(String),

    #[error("{backend} request failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("{backend} returned status {status}")]
    Status { backend: String, status: u16 },

    #[error("{backend} returned a malformed response: {reason}")]
    MalformedResponse { backend: String, reason: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted { operation: String, attempts: u32, last: String },
}

impl AnalysisError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Backend { .. }
                | AnalysisError::Status { .. }
                | AnalysisError::MalformedResponse { .. }
                | AnalysisError::Timeout { .. }
        )
    }
}

/// Umbrella error for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

pub type Result<T> = std::result::Result<T, Error>;

use crate::geometry::CaptureRequest;
use serde::{Deserialize, Serialize};

/// A message sent from one context to the other, discriminated by `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Readiness probe
    CheckIfLoaded,

    /// Arm the selection overlay in the page
    InitiateScreenshot {
        #[serde(rename = "isShortAnswer", default)]
        is_short_answer: bool,
    },

    /// Rasterize the visible viewport and crop it to `area` (device pixels)
    CaptureVisibleTab { area: CaptureRequest },

    /// Run OCR + answer analysis on an encoded image (data URL)
    AnalyzeScreenshot {
        #[serde(rename = "imageData")]
        image_data: String,
        #[serde(default)]
        timestamp: i64,
    },

    /// Render an answer (or `Error: ...` message) in the page
    ShowAnswer { answer: String },
}

impl Request {
    /// Wire name of the action, used in logs and relay errors
    pub fn action(&self) -> &'static str {
        match self {
            Request::CheckIfLoaded => "checkIfLoaded",
            Request::InitiateScreenshot { .. } => "initiateScreenshot",
            Request::CaptureVisibleTab { .. } => "captureVisibleTab",
            Request::AnalyzeScreenshot { .. } => "analyzeScreenshot",
            Request::ShowAnswer { .. } => "showAnswer",
        }
    }
}

/// The single terminal reply to a [`Request`]
///
/// Failures travel as plain `{error}` payloads; nothing richer survives the
/// context boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Loaded {
        loaded: bool,
    },
    Image {
        #[serde(rename = "imageData")]
        image_data: String,
    },
    Answer {
        answer: String,
    },
    Status {
        status: String,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn loaded() -> Self {
        Response::Loaded { loaded: true }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Response::Status { status: status.into() }
    }

    pub fn error(error: impl ToString) -> Self {
        Response::Error { error: error.to_string() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// Short name of the payload variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Loaded { .. } => "loaded",
            Response::Image { .. } => "imageData",
            Response::Answer { .. } => "answer",
            Response::Status { .. } => "status",
            Response::Error { .. } => "error",
        }
    }
}

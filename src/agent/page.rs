use crate::config::PipelineConfig;
use crate::error::RelayError;
use crate::geometry::{CaptureRequest, Point};
use crate::normalize::{error_message, is_error_message};
use crate::relay::{Endpoint, Handler, Request, Response};
use crate::selection::{GestureOutcome, PageSurface, Popup, SelectionMachine, SelectionState, SessionId};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Notice rendered when a session is dropped before its answer arrives
pub const SESSION_CANCELLED: &str = "Session cancelled";

/// How a pointer-up or image submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing was started: no gesture in progress or the guard was held
    Ignored,

    /// Selection below the minimum size; nothing crossed the relay
    Rejected,

    /// An answer was rendered
    Answered(String),

    /// An `Error: ...` notice was rendered
    Failed(String),
}

/// The in-page agent: drives the selection gesture and renders answers.
///
/// Receives `checkIfLoaded`, `initiateScreenshot` and `showAnswer` from the
/// background agent and sends `captureVisibleTab` / `analyzeScreenshot` to it.
pub struct PageAgent<S: PageSurface + 'static> {
    machine: Mutex<SelectionMachine<S>>,
    background: Endpoint,
}

impl<S: PageSurface + 'static> PageAgent<S> {
    pub fn new(surface: S, config: &PipelineConfig, background: Endpoint) -> Arc<Self> {
        Arc::new(Self { machine: Mutex::new(SelectionMachine::new(surface, config)), background })
    }

    /// Install this agent as the receiver of `endpoint`, replacing any previous agent
    pub fn install(self: &Arc<Self>, endpoint: &Endpoint) -> JoinHandle<()> {
        info!("Installing page agent on '{}' endpoint", endpoint.name());
        endpoint.install(Arc::clone(self) as Arc<dyn Handler>)
    }

    fn machine(&self) -> MutexGuard<'_, SelectionMachine<S>> {
        self.machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SelectionState {
        self.machine().state().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.machine().is_busy()
    }

    /// Run `f` against the page surface
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(self.machine().surface_mut())
    }

    pub fn activate(&self) -> bool {
        self.machine().activate()
    }

    pub fn pointer_down(&self, at: Point) -> bool {
        self.machine().pointer_down(at)
    }

    pub fn pointer_move(&self, at: Point) -> bool {
        self.machine().pointer_move(at)
    }

    pub fn cancel(&self) -> bool {
        self.machine().cancel()
    }

    /// End the gesture and, if the selection is large enough, run the whole
    /// capture and analysis round trip before returning
    pub async fn pointer_up(&self, at: Point) -> SessionOutcome {
        let outcome = self.machine().pointer_up(at);
        match outcome {
            GestureOutcome::Ignored => SessionOutcome::Ignored,
            GestureOutcome::TooSmall => SessionOutcome::Rejected,
            GestureOutcome::Capture(pending) => {
                let guard = SessionGuard::new(self, pending.session);
                let result = self.capture_and_analyze(pending.request).await;
                guard.complete(result)
            }
        }
    }

    /// Analyze a pasted or dropped image without a capture, under the same guard
    pub async fn submit_image(&self, image_data: &str) -> SessionOutcome {
        let session = self.machine().begin_direct();
        let Some(session) = session else {
            return SessionOutcome::Ignored;
        };
        let guard = SessionGuard::new(self, session);
        let result = self.analyze(image_data.to_string()).await;
        guard.complete(result)
    }

    /// Render an answer pushed by the background agent
    pub fn show_answer(&self, answer: &str) {
        self.with_surface(|surface| surface.show_popup(&Popup::from_message(answer)));
    }

    async fn capture_and_analyze(&self, area: CaptureRequest) -> Result<String, String> {
        let response = self
            .background
            .send(Request::CaptureVisibleTab { area })
            .await
            .map_err(|e| e.to_string())?;

        let image_data = match response {
            Response::Image { image_data } => image_data,
            Response::Error { error } => return Err(error),
            other => return Err(unexpected("captureVisibleTab", &other).to_string()),
        };
        debug!("Received capture ({} bytes encoded)", image_data.len());

        self.analyze(image_data).await
    }

    async fn analyze(&self, image_data: String) -> Result<String, String> {
        let request = Request::AnalyzeScreenshot { image_data, timestamp: Utc::now().timestamp_millis() };
        match self.background.send(request).await.map_err(|e| e.to_string())? {
            Response::Answer { answer } if answer.trim().is_empty() => Err("Invalid response".to_string()),
            Response::Answer { answer } => Ok(answer),
            Response::Error { error } => Err(error),
            other => Err(unexpected("analyzeScreenshot", &other).to_string()),
        }
    }

    fn complete(&self, session: SessionId, result: Result<String, String>) -> SessionOutcome {
        let message = match result {
            Ok(answer) => answer,
            Err(error) => {
                warn!("Session {} failed: {}", session, error);
                error_message(error)
            }
        };

        if !self.machine().finish(session, &message) {
            return SessionOutcome::Ignored;
        }
        if is_error_message(&message) {
            SessionOutcome::Failed(message)
        } else {
            info!("Session {} answered {:?}", session, message);
            SessionOutcome::Answered(message)
        }
    }
}

/// Holds a session across its await points and releases the guard if the
/// session future is dropped before [`complete`](SessionGuard::complete)
struct SessionGuard<'a, S: PageSurface + 'static> {
    agent: &'a PageAgent<S>,
    session: SessionId,
    completed: bool,
}

impl<'a, S: PageSurface + 'static> SessionGuard<'a, S> {
    fn new(agent: &'a PageAgent<S>, session: SessionId) -> Self {
        Self { agent, session, completed: false }
    }

    fn complete(mut self, result: Result<String, String>) -> SessionOutcome {
        self.completed = true;
        self.agent.complete(self.session, result)
    }
}

impl<S: PageSurface + 'static> Drop for SessionGuard<'_, S> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!("Session {} dropped before completion", self.session);
        self.agent.machine().finish(self.session, &error_message(SESSION_CANCELLED));
    }
}

fn unexpected(action: &str, response: &Response) -> RelayError {
    RelayError::UnexpectedResponse { action: action.to_string(), detail: format!("got '{}'", response.kind()) }
}

#[async_trait]
impl<S: PageSurface + 'static> Handler for PageAgent<S> {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::CheckIfLoaded => Response::loaded(),
            Request::InitiateScreenshot { is_short_answer } => {
                debug!("initiateScreenshot (short answer hint: {})", is_short_answer);
                if self.activate() { Response::status("armed") } else { Response::status("busy") }
            }
            Request::ShowAnswer { answer } => {
                self.show_answer(&answer);
                Response::status("shown")
            }
            other => Response::error(format!("unsupported action '{}'", other.action())),
        }
    }
}

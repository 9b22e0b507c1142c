use crate::agent::AnswerService;
use crate::analysis::Provider;
use crate::capture::{CaptureService, Rasterizer};
use crate::error::RelayError;
use crate::normalize::{error_message, QuestionMode};
use crate::relay::{Endpoint, Handler, Request, Response};
use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Re-installs the page agent on the page endpoint when it stops answering
pub type Installer = Arc<dyn Fn(&Endpoint) + Send + Sync>;

/// Keyboard shortcuts handled by the background agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TakeScreenshot,
}

/// Context-menu entries for selected text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Mcq,
    ShortAnswer,
    /// Short answer from Gemini
    Gemini,
}

impl MenuChoice {
    pub fn mode(&self) -> QuestionMode {
        match self {
            MenuChoice::Mcq => QuestionMode::Mcq,
            MenuChoice::ShortAnswer | MenuChoice::Gemini => QuestionMode::ShortAnswer,
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            MenuChoice::Gemini => Some(Provider::Gemini),
            _ => None,
        }
    }
}

/// The privileged agent: owns screen capture and network egress
pub struct BackgroundAgent<R: Rasterizer + 'static> {
    capture: CaptureService<R>,
    answers: Arc<dyn AnswerService>,
    page: Endpoint,
    page_installer: Installer,
}

impl<R: Rasterizer + 'static> BackgroundAgent<R> {
    pub fn new(
        capture: CaptureService<R>,
        answers: Arc<dyn AnswerService>,
        page: Endpoint,
        page_installer: Installer,
    ) -> Arc<Self> {
        Arc::new(Self { capture, answers, page, page_installer })
    }

    pub fn install(self: &Arc<Self>, endpoint: &Endpoint) -> JoinHandle<()> {
        info!("Installing background agent on '{}' endpoint", endpoint.name());
        endpoint.install(Arc::clone(self) as Arc<dyn Handler>)
    }

    /// Send `request` to the page, re-installing the page agent first if it does not answer the probe
    async fn send_to_page(&self, request: Request) -> Result<Response, RelayError> {
        let action = request.action();
        match self.page.send_ensuring_ready(request, self.page_installer.as_ref()).await? {
            Response::Error { error } => Err(RelayError::UnexpectedResponse { action: action.to_string(), detail: error }),
            response => Ok(response),
        }
    }

    pub async fn on_command(&self, command: Command) -> Result<(), RelayError> {
        match command {
            Command::TakeScreenshot => {
                let response = self.send_to_page(Request::InitiateScreenshot { is_short_answer: false }).await?;
                debug!("Page responded to initiateScreenshot with {:?}", response);
                Ok(())
            }
        }
    }

    /// Answer highlighted text and push the answer (or `Error: ...`) to the page.
    /// Returns the message that was pushed.
    pub async fn answer_selection(&self, text: &str, choice: MenuChoice) -> Result<String, RelayError> {
        info!("Answering selected text as {:?}", choice);
        let message = match self.answers.analyze_text(text, choice.mode(), choice.provider()).await {
            Ok(answer) if answer.trim().is_empty() => {
                error!("Text analysis returned an empty answer");
                error_message("Invalid response format")
            }
            Ok(answer) => answer,
            Err(e) => {
                error!("Text analysis failed: {}", e);
                error_message(e)
            }
        };

        self.send_to_page(Request::ShowAnswer { answer: message.clone() }).await?;
        Ok(message)
    }
}

#[async_trait]
impl<R: Rasterizer + 'static> Handler for BackgroundAgent<R> {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::CheckIfLoaded => Response::loaded(),
            Request::CaptureVisibleTab { area } => match self.capture.capture(area).await {
                Ok(image) => Response::Image { image_data: image.to_data_url() },
                Err(e) => {
                    error!("Capture failed: {}", e);
                    Response::error(e)
                }
            },
            Request::AnalyzeScreenshot { image_data, timestamp } => {
                debug!("analyzeScreenshot requested at {}", timestamp);
                match self.answers.analyze_image(&image_data).await {
                    Ok(answer) => Response::Answer { answer },
                    Err(e) => {
                        error!("Image analysis failed: {}", e);
                        Response::error(e)
                    }
                }
            }
            other => Response::error(format!("unsupported action '{}'", other.action())),
        }
    }
}

use crate::error::RelayError;
use crate::relay::{Request, Response, RelayConfig};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Receiving side of an endpoint.
///
/// Returning a [`Response`] is the only way to answer, so every handled request
/// produces exactly one reply.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// One direction of the relay: senders post requests, the installed handler answers them.
///
/// Cloning an endpoint yields another handle to the same inbox.
#[derive(Clone)]
pub struct Endpoint {
    name: &'static str,
    inbox: Arc<Mutex<Option<mpsc::UnboundedSender<Envelope>>>>,
    config: RelayConfig,
}

impl Endpoint {
    /// Create an endpoint with no receiver installed
    pub fn new(name: &'static str, config: RelayConfig) -> Self {
        Self { name, inbox: Arc::new(Mutex::new(None)), config }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Envelope>>> {
        self.inbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install `handler` as the receiver, replacing any previous one.
    ///
    /// Each request is handled on its own task, so replies may complete in any order.
    pub fn install(&self, handler: Arc<dyn Handler>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        *self.slot() = Some(tx);
        debug!("Installed receiver on '{}' endpoint", self.name);

        let name = self.name;
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let action = envelope.request.action();
                    let response = handler.handle(envelope.request).await;
                    if envelope.reply.send(response).is_err() {
                        debug!("Sender of '{}' on '{}' stopped waiting", action, name);
                    }
                });
            }
            debug!("Receiver on '{}' endpoint shut down", name);
        })
    }

    /// Remove the receiver; in-flight requests still get their replies
    pub fn uninstall(&self) {
        *self.slot() = None;
    }

    pub fn is_installed(&self) -> bool {
        self.slot().is_some()
    }

    /// Send a request and wait for its reply, bounded by the configured response timeout
    pub async fn send(&self, request: Request) -> Result<Response, RelayError> {
        self.send_with_timeout(request, self.config.response_timeout).await
    }

    /// Send a request and wait at most `timeout` for its reply
    pub async fn send_with_timeout(&self, request: Request, timeout: Duration) -> Result<Response, RelayError> {
        let action = request.action();
        let (reply, response) = oneshot::channel();

        let inbox = self.slot().clone();
        let Some(inbox) = inbox else {
            return Err(RelayError::NotReady { action: action.to_string() });
        };
        if inbox.send(Envelope { request, reply }).is_err() {
            return Err(RelayError::NotReady { action: action.to_string() });
        }
        debug!("Sent '{}' on '{}' endpoint", action, self.name);

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RelayError::NoResponse { action: action.to_string() }),
            Err(_) => Err(RelayError::Timeout { action: action.to_string(), duration: timeout }),
        }
    }

    /// Probe the receiver with `checkIfLoaded`, bounded by the probe timeout
    pub async fn is_ready(&self) -> bool {
        match self.send_with_timeout(Request::CheckIfLoaded, self.config.probe_timeout).await {
            Ok(Response::Loaded { loaded }) => loaded,
            Ok(other) => {
                warn!("Readiness probe on '{}' got '{}' instead of loaded", self.name, other.kind());
                false
            }
            Err(e) => {
                debug!("Readiness probe on '{}' failed: {}", self.name, e);
                false
            }
        }
    }

    /// Probe the receiver, re-install it through `installer` if the probe fails, then send once
    pub async fn send_ensuring_ready<F>(&self, request: Request, installer: F) -> Result<Response, RelayError>
    where
        F: FnOnce(&Endpoint),
    {
        if !self.is_ready().await {
            warn!("Receiver on '{}' not ready, re-installing before '{}'", self.name, request.action());
            installer(self);
        }
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, request: Request) -> Response {
            match request {
                Request::CheckIfLoaded => Response::loaded(),
                Request::ShowAnswer { answer } => Response::Answer { answer },
                other => Response::error(format!("unsupported action '{}'", other.action())),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl Handler for Stalled {
        async fn handle(&self, _request: Request) -> Response {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Response::status("too late")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Handler for Panicking {
        async fn handle(&self, _request: Request) -> Response {
            panic!("handler crashed");
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("page", RelayConfig::default())
    }

    #[tokio::test]
    async fn test_send_without_receiver_is_not_ready() {
        let endpoint = endpoint();
        let err = endpoint.send(Request::CheckIfLoaded).await.unwrap_err();
        assert_eq!(err, RelayError::NotReady { action: "checkIfLoaded".into() });
        assert!(!endpoint.is_ready().await);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let endpoint = endpoint();
        endpoint.install(Arc::new(Echo));

        assert!(endpoint.is_ready().await);
        let response = endpoint.send(Request::ShowAnswer { answer: "B".into() }).await.unwrap();
        assert_eq!(response, Response::Answer { answer: "B".into() });
    }

    #[tokio::test]
    async fn test_unsupported_action_is_an_error_payload() {
        let endpoint = endpoint();
        endpoint.install(Arc::new(Echo));

        let response = endpoint.send(Request::InitiateScreenshot { is_short_answer: false }).await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handler_times_out() {
        let endpoint = Endpoint::new("background", RelayConfig::default().response_timeout(Duration::from_secs(5)));
        endpoint.install(Arc::new(Stalled));

        let err = endpoint.send(Request::ShowAnswer { answer: "A".into() }).await.unwrap_err();
        assert_eq!(err, RelayError::Timeout { action: "showAnswer".into(), duration: Duration::from_secs(5) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_uses_short_timeout() {
        let endpoint = endpoint();
        endpoint.install(Arc::new(Stalled));

        let started = tokio::time::Instant::now();
        assert!(!endpoint.is_ready().await);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(1) && waited < Duration::from_secs(2), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_no_response() {
        let endpoint = endpoint();
        endpoint.install(Arc::new(Panicking));

        let err = endpoint.send(Request::CheckIfLoaded).await.unwrap_err();
        assert_eq!(err, RelayError::NoResponse { action: "checkIfLoaded".into() });
    }

    #[tokio::test]
    async fn test_uninstall_stops_delivery() {
        let endpoint = endpoint();
        endpoint.install(Arc::new(Echo));
        assert!(endpoint.is_installed());

        endpoint.uninstall();
        assert!(!endpoint.is_installed());
        assert!(!endpoint.is_ready().await);
    }

    #[tokio::test]
    async fn test_send_ensuring_ready_reinstalls_once() {
        let endpoint = endpoint();
        let installs = AtomicUsize::new(0);

        let response = endpoint
            .send_ensuring_ready(Request::ShowAnswer { answer: "C".into() }, |ep| {
                installs.fetch_add(1, Ordering::SeqCst);
                ep.install(Arc::new(Echo));
            })
            .await
            .unwrap();
        assert_eq!(response, Response::Answer { answer: "C".into() });
        assert_eq!(installs.load(Ordering::SeqCst), 1);

        // Already ready: the installer is not called again
        endpoint
            .send_ensuring_ready(Request::ShowAnswer { answer: "D".into() }, |_| {
                installs.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(installs.load(Ordering::SeqCst), 1);
    }
}

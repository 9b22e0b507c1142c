//! End-to-end runs of the selection pipeline with in-memory page and capture

use async_trait::async_trait;
use region_answer::capture::encode_png;
use region_answer::geometry::ScrollOffset;
use region_answer::selection::Popup;
use region_answer::{
    AnalysisError, AnswerService, CaptureError, EncodedImage, MemorySurface, Pipeline, PipelineConfig, Point, Provider,
    QuestionMode, Rasterizer, Request, Response, SelectionState, SessionOutcome, ViewportMetrics,
};
use region_answer::relay::Handler;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A 1400x900 viewport screenshot
struct Screen;

#[async_trait]
impl Rasterizer for Screen {
    async fn capture_viewport(&self) -> Result<Vec<u8>, CaptureError> {
        encode_png(&image::DynamicImage::new_rgb8(1400, 900))
    }
}

/// Answers "A" and records the size of every image it was given
#[derive(Default)]
struct Recorder {
    sizes: Mutex<Vec<(u32, u32)>>,
}

#[async_trait]
impl AnswerService for Recorder {
    async fn analyze_text(&self, _text: &str, _mode: QuestionMode, _provider: Option<Provider>) -> Result<String, AnalysisError> {
        Ok("A".into())
    }

    async fn analyze_image(&self, image_data: &str) -> Result<String, AnalysisError> {
        let image = EncodedImage::from_data_url(image_data).map_err(|e| AnalysisError::InvalidRequest(e.to_string()))?;
        self.sizes.lock().unwrap().push((image.width, image.height));
        Ok("A".into())
    }
}

/// Holds every image analysis until released
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl AnswerService for Gate {
    async fn analyze_text(&self, _text: &str, _mode: QuestionMode, _provider: Option<Provider>) -> Result<String, AnalysisError> {
        Ok("A".into())
    }

    async fn analyze_image(&self, _image_data: &str) -> Result<String, AnalysisError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("C".into())
    }
}

/// Records requests instead of serving them
#[derive(Default)]
struct Recording {
    requests: Mutex<Vec<Request>>,
}

#[async_trait]
impl Handler for Recording {
    async fn handle(&self, request: Request) -> Response {
        self.requests.lock().unwrap().push(request);
        Response::error("recording only")
    }
}

fn retina() -> MemorySurface {
    MemorySurface::new(ViewportMetrics { scroll: ScrollOffset::new(0.0, 640.0), device_pixel_ratio: 2.0 })
}

#[tokio::test]
async fn test_selection_is_captured_cropped_and_answered() {
    let surface = retina();
    let answers = Arc::new(Recorder::default());
    let pipeline = Pipeline::connect(surface.clone(), Screen, answers.clone(), &PipelineConfig::default());

    assert!(pipeline.page.activate());
    assert!(surface.snapshot().overlay_visible);

    pipeline.page.pointer_down(Point::new(50.0, 50.0));
    pipeline.page.pointer_move(Point::new(200.0, 120.0));
    let outcome = pipeline.page.pointer_up(Point::new(350.0, 200.0)).await;

    assert_eq!(outcome, SessionOutcome::Answered("A".into()));
    assert_eq!(pipeline.page.state(), SelectionState::Idle);

    // 300x150 CSS pixels at 2x; viewport capture ignores the page scroll
    assert_eq!(*answers.sizes.lock().unwrap(), vec![(600, 300)]);

    let log = surface.snapshot();
    assert!(!log.overlay_visible);
    assert_eq!(log.popups, vec![Popup { text: "A".into(), is_error: false }]);
}

#[tokio::test]
async fn test_small_selection_never_reaches_background() {
    let surface = retina();
    let pipeline = Pipeline::connect(surface.clone(), Screen, Arc::new(Recorder::default()), &PipelineConfig::default());
    let recording = Arc::new(Recording::default());
    pipeline.background_endpoint.install(recording.clone());

    pipeline.page.activate();
    pipeline.page.pointer_down(Point::new(100.0, 100.0));
    let outcome = pipeline.page.pointer_up(Point::new(120.0, 120.0)).await;

    assert_eq!(outcome, SessionOutcome::Rejected);
    assert!(recording.requests.lock().unwrap().is_empty());
    assert_eq!(pipeline.page.state(), SelectionState::Idle);
    assert_eq!(
        surface.last_popup(),
        Some(Popup { text: "Error: Selection area too small".into(), is_error: true })
    );
}

#[tokio::test]
async fn test_gestures_are_ignored_while_processing() {
    let surface = retina();
    let gate = Arc::new(Gate::default());
    let pipeline = Pipeline::connect(surface.clone(), Screen, gate.clone(), &PipelineConfig::default());

    pipeline.page.activate();
    pipeline.page.pointer_down(Point::new(10.0, 10.0));
    let page = Arc::clone(&pipeline.page);
    let running = tokio::spawn(async move { page.pointer_up(Point::new(210.0, 110.0)).await });

    gate.entered.notified().await;
    assert!(pipeline.page.is_busy());
    assert!(!pipeline.page.activate());
    assert!(!pipeline.page.pointer_down(Point::new(5.0, 5.0)));
    assert_eq!(pipeline.page.submit_image("data:image/png;base64,AAAA").await, SessionOutcome::Ignored);

    gate.release.notify_one();
    assert_eq!(running.await.unwrap(), SessionOutcome::Answered("C".into()));
    assert_eq!(pipeline.page.state(), SelectionState::Idle);
    assert_eq!(surface.snapshot().popups.len(), 1);
}

#[tokio::test]
async fn test_timed_out_session_releases_guard() {
    let surface = retina();
    let pipeline = Pipeline::connect(surface.clone(), Screen, Arc::new(Gate::default()), &PipelineConfig::default());

    pipeline.page.activate();
    pipeline.page.pointer_down(Point::new(10.0, 10.0));
    let stalled =
        tokio::time::timeout(Duration::from_millis(200), pipeline.page.pointer_up(Point::new(210.0, 110.0))).await;

    assert!(stalled.is_err());
    assert!(!pipeline.page.is_busy());
    assert_eq!(
        surface.last_popup(),
        Some(Popup { text: "Error: Session cancelled".into(), is_error: true })
    );

    assert!(pipeline.page.activate());
    assert!(pipeline.page.pointer_down(Point::new(5.0, 5.0)));
    assert_eq!(pipeline.page.pointer_up(Point::new(8.0, 8.0)).await, SessionOutcome::Rejected);
    assert_eq!(pipeline.page.state(), SelectionState::Idle);
}

#[tokio::test]
async fn test_capture_failure_is_rendered_as_error() {
    let surface = retina();
    let pipeline = Pipeline::connect(surface.clone(), Screen, Arc::new(Recorder::default()), &PipelineConfig::default());

    // Past the right edge of the 1400px bitmap at 2x
    pipeline.page.activate();
    pipeline.page.pointer_down(Point::new(600.0, 0.0));
    let outcome = pipeline.page.pointer_up(Point::new(760.0, 100.0)).await;

    let SessionOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.starts_with("Error: "), "{}", message);
    assert!(message.contains("exceed captured bitmap 1400x900"), "{}", message);
    assert_eq!(pipeline.page.state(), SelectionState::Idle);
    assert!(surface.last_popup().is_some_and(|popup| popup.is_error));
}

#[tokio::test]
async fn test_shortcut_arms_page_and_selection_answer_is_pushed() {
    let surface = retina();
    let pipeline = Pipeline::connect(surface.clone(), Screen, Arc::new(Recorder::default()), &PipelineConfig::default());

    pipeline.background.on_command(region_answer::agent::Command::TakeScreenshot).await.unwrap();
    assert_eq!(pipeline.page.state(), SelectionState::Armed);

    let pushed = pipeline
        .background
        .answer_selection("Which is a prime? A) 4 B) 6 C) 7", region_answer::MenuChoice::Mcq)
        .await
        .unwrap();
    assert_eq!(pushed, "A");
    assert_eq!(surface.last_popup(), Some(Popup { text: "A".into(), is_error: false }));
}

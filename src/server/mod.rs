//! HTTP analysis server
//!
//! Exposes the [`Dispatcher`] over `POST /analyze`, `POST /analyze-image` and
//! `GET /health`. Every response carries `processingTime` in milliseconds;
//! failures are `{error, processingTime}` with a status derived from the error.

use crate::analysis::{Dispatcher, Provider};
use crate::api::{AnalyzeBody, AnalyzeImageBody, AnalyzeImageResponse, AnalyzeResponse, ErrorResponse, HealthResponse};
use crate::capture::decode_data_url;
use crate::error::AnalysisError;
use crate::normalize::QuestionMode;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Largest accepted request body (base64 screenshots are big)
pub const BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared state for HTTP handlers
struct AppState {
    dispatcher: Dispatcher,
}

/// Build the router around `dispatcher`
pub fn router(dispatcher: Dispatcher) -> Router {
    let state = Arc::new(AppState { dispatcher });

    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/analyze-image", post(analyze_image_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: SocketAddr, dispatcher: Dispatcher) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Analysis server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down analysis server");
        })
        .await
}

/// Serve on an already-bound listener until the process exits
pub async fn serve_listener(listener: TcpListener, dispatcher: Dispatcher) -> std::io::Result<()> {
    axum::serve(listener, router(dispatcher)).await
}

fn status_for(error: &AnalysisError) -> StatusCode {
    match error {
        AnalysisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AnalysisError::NoText(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

fn failure(context: &str, error: AnalysisError, started: Instant) -> Response {
    error!("{} failed: {}", context, error);
    let body = ErrorResponse { error: error.to_string(), processing_time: elapsed_ms(started) };
    (status_for(&error), Json(body)).into_response()
}

/// Malformed bodies get the same `{error}` payload as every other failure
fn rejected(context: &str, rejection: JsonRejection, started: Instant) -> Response {
    failure(context, AnalysisError::InvalidRequest(rejection.body_text()), started)
}

/// Gemini only answers in short-answer form
fn route(body: &AnalyzeBody) -> (QuestionMode, Provider) {
    if body.use_gemini {
        (QuestionMode::ShortAnswer, Provider::Gemini)
    } else {
        (QuestionMode::from_short_answer_flag(body.is_short_answer), Provider::Claude)
    }
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return rejected("Text analysis", rejection, started),
    };
    let (mode, provider) = route(&body);
    info!("Text analysis via {} ({})", provider, mode);

    match state.dispatcher.analyze_text(&body.text, mode, Some(provider)).await {
        Ok(analysis) => {
            let processing_time = elapsed_ms(started);
            info!("Text analysis completed in {}ms", processing_time);
            Json(AnalyzeResponse { answer: analysis.answer, processing_time }).into_response()
        }
        Err(e) => failure("Text analysis", e, started),
    }
}

async fn analyze_image_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeImageBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return rejected("Image analysis", rejection, started),
    };
    if body.image_data.trim().is_empty() {
        return failure("Image analysis", AnalysisError::InvalidRequest("No image data provided".into()), started);
    }
    info!("Image analysis ({} chars of image data)", body.image_data.len());

    let bytes = match decode_data_url(&body.image_data) {
        Ok(bytes) => bytes,
        Err(e) => return failure("Image analysis", AnalysisError::InvalidRequest(e.to_string()), started),
    };

    match state.dispatcher.analyze_image(bytes, None).await {
        Ok(analysis) => {
            let processing_time = elapsed_ms(started);
            info!("Image analysis completed in {}ms", processing_time);
            Json(AnalyzeImageResponse::from_analysis(analysis, processing_time)).into_response()
        }
        Err(e) => failure("Image analysis", e, started),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let vision = if state.dispatcher.has_ocr() { "initialized" } else { "not initialized" };
    Json(HealthResponse { status: "ok".into(), vision: vision.into(), timestamp: Utc::now().to_rfc3339() })
}

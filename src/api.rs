use crate::model::ModelHandle;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../templates/index.html");

pub const NO_TEXT: &str = "No text provided in request body";
pub const EMPTY_TEXT: &str = "Text cannot be empty";
pub const INTERNAL: &str = "An internal server error occurred";

#[derive(Clone)]
pub struct AppState {
    pub model: ModelHandle,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/summarize", post(summarize))
        .with_state(Arc::new(state))
}

// -------------------------------------------------------------------
// Pages

async fn index() -> Html<&'static str> {
    tracing::debug!("serving landing page");
    Html(INDEX_HTML)
}

// -------------------------------------------------------------------
// Summaries

async fn summarize(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SummaryResponse>, ApiError> {
    // Accept any content type; only the JSON shape matters.
    let payload: Option<Value> = serde_json::from_slice(&body).ok();
    let Some(text) = payload.as_ref().and_then(|v| v.get("text")) else {
        tracing::info!("'text' field missing in request body");
        return Err(ApiError::bad_request(NO_TEXT));
    };
    let text = text
        .as_str()
        .ok_or_else(|| ApiError::internal(format!("'text' must be a string, got {text}")))?;
    if text.trim().is_empty() {
        tracing::info!("received empty text");
        return Err(ApiError::bad_request(EMPTY_TEXT));
    }
    tracing::info!(chars = text.chars().count(), "summarize request received");

    let model = state.model.clone();
    let text = text.to_owned();
    let summary = tokio::task::spawn_blocking(move || model.summarize_text(&text))
        .await
        .map_err(ApiError::internal)?
        .map_err(|e| ApiError::internal(format!("{} ({})", e, e.kind())))?;

    Ok(Json(SummaryResponse { summary }))
}

// -------------------------------------------------------------------
// Shared helpers & DTOs

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }
    fn bad_request(message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
    /// Logs the detail; the client only ever sees the generic message.
    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "error in /summarize");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody { error: self.message });
        (self.status, body).into_response()
    }
}

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, sse::Sse},
};
use chat::create_sse_event;
use futures::StreamExt;
use request::{ChatRequest, Message};
use response::ChatResponse;
use std::sync::Arc;
use tracing::{error, info};

use crate::AppState;
use crate::error::AppError;

/// Checks the credential first, then the body, the same order the errors are reported in.
///
/// The body is parsed whatever its `Content-Type`, since browser clients often
/// post JSON as `text/plain`.
fn validate(state: &AppState, body: &[u8]) -> Result<Vec<Message>, AppError> {
    if !state.provider.is_configured() {
        error!("Rejecting request, API key not configured");
        return Err(AppError::ConfigurationMissing);
    }

    let payload: ChatRequest =
        serde_json::from_slice(body).map_err(|e| AppError::InvalidBody(e.to_string()))?;
    payload.messages.ok_or(AppError::MissingInput)
}

pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let messages = validate(&state, &body)?;
    info!("Received streaming chat request with {} messages", messages.len());

    let stream = state
        .provider
        .chat_completions_stream(messages)
        .await?
        .map(|item| item.and_then(|event| create_sse_event(&event)));

    Ok((
        StatusCode::OK,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Sse::new(stream),
    ))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let messages = validate(&state, &body)?;
    info!("Received chat request with {} messages", messages.len());

    let response = state.provider.chat_completions(messages).await?;

    Ok((
        StatusCode::OK,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(ChatResponse { response }),
    ))
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

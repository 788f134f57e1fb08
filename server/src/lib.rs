use axum::{Router, routing::post};
use chat::provider::ChatCompletionsProvider;
use std::sync::Arc;

pub mod settings;
pub mod error;
pub mod handlers;

use handlers::chat::{chat, chat_stream, method_not_allowed};

pub struct AppState {
    pub provider: Arc<dyn ChatCompletionsProvider>,
}

pub fn get_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/chat-stream",
            post(chat_stream).fallback(method_not_allowed),
        )
        .route("/api/chat", post(chat).fallback(method_not_allowed))
        .with_state(state)
}

use chat::provider::OpenRouterChatCompletionsProvider;
use server::{AppState, get_app, settings::load_config};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Initializing chat relay server");

    let settings = load_config()?;
    info!("Starting server on {}:{}", settings.host, settings.port);

    let state = Arc::new(AppState {
        provider: Arc::new(OpenRouterChatCompletionsProvider::new(settings.provider)),
    });

    let app = get_app(state);

    info!("Routes configured, binding to {}:{}", settings.host, settings.port);
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", settings.host, settings.port)).await?;
    info!("Server started successfully, listening for requests");

    axum::serve(listener, app).await?;

    Ok(())
}

use axum::response::sse::Event;
use response::RelayEvent;

pub mod config;
pub mod error;
pub mod provider;
pub mod relay;
pub mod sse;

pub use config::ProviderConfig;
pub use error::ChatError;

/// Upstream end-of-stream sentinel. Carries no content and does not end the relay.
pub const DONE_MESSAGE: &str = "[DONE]";

pub fn create_sse_event(event: &RelayEvent) -> anyhow::Result<Event> {
    let data = serde_json::to_string(event)
        .map_err(|e| anyhow::anyhow!("Failed to serialize relay event: {}", e))?;
    Ok(Event::default().data(data))
}

use async_trait::async_trait;
use futures::stream::BoxStream;
use request::Message;
use response::RelayEvent;

use crate::error::ChatError;

pub mod openrouter;

pub use openrouter::OpenRouterChatCompletionsProvider;

#[async_trait]
pub trait ChatCompletionsProvider: Send + Sync {
    /// Whether a credential is available for upstream calls.
    fn is_configured(&self) -> bool;

    /// Streams content deltas followed by one terminal event.
    async fn chat_completions_stream(
        &self,
        messages: Vec<Message>,
    ) -> Result<BoxStream<'static, anyhow::Result<RelayEvent>>, ChatError>;

    /// Returns the complete assistant reply.
    async fn chat_completions(&self, messages: Vec<Message>) -> Result<String, ChatError>;
}

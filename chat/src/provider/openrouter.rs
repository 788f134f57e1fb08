use async_trait::async_trait;
use futures::stream::BoxStream;
use request::{ChatCompletionsRequest, Message};
use response::{ChatCompletionsResponse, RelayEvent, Usage};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::config::ProviderConfig;
use crate::error::ChatError;
use crate::provider::ChatCompletionsProvider;
use crate::relay::relay_stream;

pub struct OpenRouterChatCompletionsProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenRouterChatCompletionsProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn build_request(&self, messages: Vec<Message>, stream: bool) -> ChatCompletionsRequest {
        ChatCompletionsRequest::builder(&self.config.model)
            .system_prompt(self.config.system_prompt.as_deref())
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .stream(stream)
            .build()
    }

    /// Sends the request and rejects non-success statuses with the upstream body.
    async fn send(&self, request: &ChatCompletionsRequest) -> Result<reqwest::Response, ChatError> {
        let api_key = self.config.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;

        let mut builder = self
            .client
            .post(self.config.chat_completions_url())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");
        if let Some(referer) = &self.config.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.config.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.json(request).send().await?;

        let status = response.status();
        debug!("Upstream response status: {}", status);

        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("unknown error").to_string();
            }
            error!("Upstream API error: {} - {}", status, message);
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

fn log_usage(usage: &Usage) {
    info!(
        "Usage: prompt_tokens: {}, completion_tokens: {}, total_tokens: {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
}

#[async_trait]
impl ChatCompletionsProvider for OpenRouterChatCompletionsProvider {
    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn chat_completions_stream(
        &self,
        messages: Vec<Message>,
    ) -> Result<BoxStream<'static, anyhow::Result<RelayEvent>>, ChatError> {
        let request = self.build_request(messages, true);
        info!(
            "Sending streaming request with {} messages to model: {}",
            request.messages.len(),
            request.model
        );

        let response = self.send(&request).await?;
        info!("Connected to upstream stream");

        Ok(relay_stream(response.bytes_stream()))
    }

    async fn chat_completions(&self, messages: Vec<Message>) -> Result<String, ChatError> {
        let request = self.build_request(messages, false);
        info!(
            "Sending request with {} messages to model: {}",
            request.messages.len(),
            request.model
        );

        let call = async {
            let response = self.send(&request).await?;
            let body = response.bytes().await?;
            Ok::<_, ChatError>(body)
        };

        let body = match timeout(self.config.timeout, call).await {
            Ok(body) => body?,
            Err(_) => {
                error!("Upstream request timed out after {:?}", self.config.timeout);
                return Err(ChatError::Timeout);
            }
        };

        let completion: ChatCompletionsResponse = serde_json::from_slice(&body)
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        if let Some(usage) = &completion.usage {
            log_usage(usage);
        }

        completion
            .content()
            .map(str::to_string)
            .ok_or_else(|| ChatError::Decode("response has no message content".to_string()))
    }
}

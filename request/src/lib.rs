use serde::{Deserialize, Serialize};

/// Inbound body accepted by the chat endpoints.
///
/// `messages` is optional at the type level so a body without it can be
/// reported as missing input rather than a generic parse failure.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// One chat turn.
///
/// Array content and fields the relay does not interpret (`tool_calls`,
/// `tool_call_id`, `name`, ...) are forwarded upstream as received.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Contents>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Contents::String(content.into())),
            extra: serde_json::Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    Developer,
    System,
    Tool,
    User,
}

/// Plain text, or content parts (text, image_url, ...) passed through untouched.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Contents {
    String(String),
    Array(Vec<serde_json::Value>),
}

/// Body posted to the upstream `/chat/completions` endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl ChatCompletionsRequest {
    pub fn builder(model: impl Into<String>) -> ChatCompletionsRequestBuilder {
        ChatCompletionsRequestBuilder {
            model: model.into(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct ChatCompletionsRequestBuilder {
    model: String,
    system_prompt: Option<String>,
    messages: Vec<Message>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    stream: bool,
}

impl ChatCompletionsRequestBuilder {
    /// An empty prompt is treated the same as no prompt.
    pub fn system_prompt(mut self, system_prompt: Option<&str>) -> Self {
        self.system_prompt = system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string);
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn build(self) -> ChatCompletionsRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(self.messages);

        ChatCompletionsRequest {
            model: self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }
}

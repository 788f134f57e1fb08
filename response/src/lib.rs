use serde::{Deserialize, Serialize};

/// One `data:` payload of an upstream streamed chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionsChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl ChatCompletionsChunk {
    /// Text carried by the first choice, if any. Empty strings count as absent.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// Upstream body for a non-streamed chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionsResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl ChatCompletionsResponse {
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

/// Event written to the caller's SSE stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelayEvent {
    Content {
        content: String,
    },
    Done {
        done: bool,
        #[serde(rename = "fullResponse")]
        full_response: String,
    },
}

impl RelayEvent {
    pub fn content(content: impl Into<String>) -> Self {
        Self::Content {
            content: content.into(),
        }
    }

    pub fn done(full_response: impl Into<String>) -> Self {
        Self::Done {
            done: true,
            full_response: full_response.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Non-streamed reply to the caller.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

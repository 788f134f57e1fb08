use std::{fmt, time::Duration};

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "kwaipilot/kat-coder-pro:free";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// Upstream settings, resolved once at startup and shared by every request.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Deadline for non-streamed completions.
    pub timeout: Duration,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
            referer: None,
            title: None,
        }
    }
}

impl ProviderConfig {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field(
                "system_prompt",
                &self.system_prompt.as_ref().map(|p| p.chars().count()),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_completions_url_tolerates_trailing_slash() {
        let config = ProviderConfig {
            api_base: "http://127.0.0.1:9000/api/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.chat_completions_url(),
            "http://127.0.0.1:9000/api/v1/chat/completions"
        );
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = ProviderConfig {
            api_key: Some("sk-or-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-or-secret"));
        assert!(debug.contains("<redacted>"));
    }
}

use chat::ProviderConfig;
use chat::config::{DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT};
use config::{Config, Environment, File, Map};
use std::time::Duration;
use tracing::{info, warn};

pub struct Settings {
    pub host: String,
    pub port: u16,
    pub provider: ProviderConfig,
}

/// Prefix of environment variables that override `config.toml`, e.g. `RELAY_PORT`.
pub const ENV_PREFIX: &str = "RELAY";

/// Reads `config.toml` (optional) from the working directory, then the environment.
pub fn load_config() -> anyhow::Result<Settings> {
    let config = build_config(None)?;
    Ok(settings_from(&config))
}

/// `vars` replaces the process environment when given.
fn build_config(vars: Option<Map<String, String>>) -> anyhow::Result<Config> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        // OPENROUTER_API_KEY -> openrouter_api_key
        .add_source(
            Environment::with_prefix("OPENROUTER")
                .keep_prefix(true)
                .source(vars.clone()),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(vars),
        )
        .build()?;

    Ok(config)
}

pub fn settings_from(config: &Config) -> Settings {
    let host: String = config
        .get("host")
        .unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = config.get("port").unwrap_or(3000);

    let api_key: Option<String> = config
        .get::<String>("openrouter_api_key")
        .ok()
        .filter(|key| !key.trim().is_empty());
    if api_key.is_none() {
        warn!("openrouter_api_key is not set, chat requests will be rejected");
    }

    let provider = ProviderConfig {
        api_key,
        api_base: config
            .get("api_base")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        model: config
            .get("model")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        system_prompt: config.get("system_prompt").ok(),
        temperature: Some(config.get("temperature").unwrap_or(DEFAULT_TEMPERATURE)),
        max_tokens: config.get("max_tokens").ok(),
        timeout: config
            .get::<u64>("timeout_secs")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
        referer: config.get("referer").ok(),
        title: config.get("title").ok(),
    };

    info!(
        "Upstream: {}, model: {}, timeout: {:?}, max_tokens: {:?}",
        provider.api_base, provider.model, provider.timeout, provider.max_tokens
    );

    Settings {
        host,
        port,
        provider,
    }
}

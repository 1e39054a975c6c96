use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, RelayResult};
use crate::grounding::types::{BoundsPolicy, TextMode};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub grounding: GroundingConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    /// A single OpenAI entry, matching what the relay talks to when no config file exists.
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderEntry {
                display_name: "OpenAI".into(),
                api_base: "https://api.openai.com/v1/chat/completions".into(),
                model: "gpt-4o".into(),
                temperature: default_temperature(),
                api_key: None,
            },
        );
        Self {
            active_provider: "openai".into(),
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (env vars take precedence).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    #[serde(default)]
    pub text_mode: TextMode,
    #[serde(default)]
    pub bounds: BoundsPolicy,
    /// Upper bound on the whole upstream stream, first byte to last chunk.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            text_mode: TextMode::default(),
            bounds: BoundsPolicy::default(),
            stream_timeout_secs: default_stream_timeout(),
        }
    }
}

fn default_stream_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Application the assistant answers questions about.
    #[serde(default = "default_product")]
    pub product: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            product: default_product(),
        }
    }
}

fn default_product() -> String {
    "FL Studio".into()
}

fn resolve_config_path() -> RelayResult<Option<PathBuf>> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    Ok(None)
}

pub fn parse_config(content: &str) -> RelayResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if !config.llm.providers.contains_key(&config.llm.active_provider) {
        return Err(RelayError::Config(format!(
            "active provider '{}' has no [llm.providers.{}] entry",
            config.llm.active_provider, config.llm.active_provider
        )));
    }
    Ok(config)
}

/// Loads `config.toml`, falling back to built-in defaults when no file is present.
/// `DAWASSIST_PORT` overrides the listening port.
pub fn load_config() -> RelayResult<AppConfig> {
    let mut config = match resolve_config_path()? {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config = parse_config(&content)?;
            tracing::info!(
                path = %path.display(),
                provider = %config.llm.active_provider,
                "config loaded"
            );
            config
        }
        None => {
            tracing::info!("no config.toml found; using defaults");
            AppConfig::default()
        }
    };

    if let Ok(port) = std::env::var("DAWASSIST_PORT") {
        config.server.port = port
            .parse()
            .map_err(|_| RelayError::Config(format!("DAWASSIST_PORT is not a port: {port}")))?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.llm.active_provider, "openai");
        assert_eq!(cfg.grounding.text_mode, TextMode::Cumulative);
        assert_eq!(cfg.grounding.bounds, BoundsPolicy::Off);
        assert_eq!(cfg.grounding.stream_timeout_secs, 120);
        assert_eq!(cfg.prompts.product, "FL Studio");
    }

    #[test]
    fn full_file_parses() {
        let cfg = parse_config(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9100

            [llm]
            active_provider = "local"

            [llm.providers.local]
            display_name = "Local vLLM"
            api_base = "http://localhost:8001/v1/chat/completions"
            model = "qwen2-vl"

            [grounding]
            text_mode = "delta"
            bounds = "clamp"
            stream_timeout_secs = 30

            [prompts]
            product = "Ableton Live"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 9100);
        let local = &cfg.llm.providers["local"];
        assert_eq!(local.model, "qwen2-vl");
        assert!((local.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.grounding.text_mode, TextMode::Delta);
        assert_eq!(cfg.grounding.bounds, BoundsPolicy::Clamp);
        assert_eq!(cfg.grounding.stream_timeout_secs, 30);
        assert_eq!(cfg.prompts.product, "Ableton Live");
    }

    #[test]
    fn unknown_active_provider_is_rejected() {
        let err = parse_config(
            r#"
            [llm]
            active_provider = "missing"
            [llm.providers.openai]
            display_name = "OpenAI"
            api_base = "https://api.openai.com/v1/chat/completions"
            model = "gpt-4o"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}

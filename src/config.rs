use crate::provider::cloud::DEFAULT_CLOUD_BASE;
use crate::router::{DEFAULT_CLOUD_FRAGMENTS, DEFAULT_MODEL};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Default model (optional)
    pub model: Option<String>,

    /// "gateway" (default) or "stub".
    pub provider: Option<String>,

    /// Base URL of the chat gateway serving `/api/chat` and `/api/chat/stream`.
    pub gateway_url: Option<String>,

    /// OpenAI-compatible base URL for cloud models.
    pub cloud_base_url: Option<String>,

    pub cloud_api_key: Option<String>,

    /// Model-name fragments that route to the cloud provider.
    pub cloud_model_fragments: Option<Vec<String>>,

    pub connect_timeout_secs: Option<u64>,

    /// Deadline for non-streamed requests.
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Read `path`; a missing file means "use defaults".
    pub fn load_optional(path: &Path) -> anyhow::Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file");
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("failed to read config: {}", path.display())),
        };

        toml::from_str(&text)
            .map(Some)
            .with_context(|| format!("invalid config: {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderChoice {
    Gateway,
    Stub,
}

impl ProviderChoice {
    pub fn parse(name: &str) -> anyhow::Result<Self> {
        match name {
            "gateway" => Ok(Self::Gateway),
            "stub" => Ok(Self::Stub),
            other => anyhow::bail!("unknown provider: {other} (expected \"gateway\" or \"stub\")"),
        }
    }
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub provider: Option<String>,
    pub gateway_url: Option<String>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub provider: ProviderChoice,
    pub gateway_url: String,
    pub cloud_base_url: String,
    pub cloud_api_key: Option<String>,
    pub cloud_fragments: Vec<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
}

impl Settings {
    /// Precedence: command line, then environment, then config file, then defaults.
    pub fn resolve(
        overrides: &Overrides,
        cfg: Option<&Config>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let model = overrides
            .model
            .clone()
            .or_else(|| cfg.and_then(|c| c.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let provider_name = overrides
            .provider
            .clone()
            .or_else(|| cfg.and_then(|c| c.provider.clone()))
            .unwrap_or_else(|| "gateway".to_string());

        let gateway_url = overrides
            .gateway_url
            .clone()
            .or_else(|| env("CHATHUB_GATEWAY_URL"))
            .or_else(|| cfg.and_then(|c| c.gateway_url.clone()))
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        let cloud_base_url = cfg
            .and_then(|c| c.cloud_base_url.clone())
            .unwrap_or_else(|| DEFAULT_CLOUD_BASE.to_string());

        let cloud_api_key = env("GROQ_API_KEY")
            .or_else(|| cfg.and_then(|c| c.cloud_api_key.clone()))
            .filter(|k| !k.trim().is_empty());

        let cloud_fragments = cfg
            .and_then(|c| c.cloud_model_fragments.clone())
            .unwrap_or_else(|| DEFAULT_CLOUD_FRAGMENTS.iter().map(|s| s.to_string()).collect());

        let connect_timeout = Duration::from_secs(cfg.and_then(|c| c.connect_timeout_secs).unwrap_or(10));
        let request_timeout = match cfg.and_then(|c| c.request_timeout_secs).unwrap_or(120) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            model,
            provider: ProviderChoice::parse(&provider_name)?,
            gateway_url,
            cloud_base_url,
            cloud_api_key,
            cloud_fragments,
            connect_timeout,
            request_timeout,
        })
    }
}

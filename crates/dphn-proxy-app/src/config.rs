use std::{env, time::Duration};

use dphn_proxy_upstream::DEFAULT_UPSTREAM_URL;

pub const DEFAULT_SUPPORTED_MODELS: &[&str] = &["dolphinserver:24B", "dolphinserver2:8B"];
pub const DEFAULT_API_KEY: &str = "1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub upstream_url: String,
    pub upstream_timeout: Option<Duration>,
    /// First entry is the model used when a request names none.
    pub supported_models: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid PORT value: {0}")]
    InvalidPort(String),
    #[error("invalid UPSTREAM_TIMEOUT_SECONDS value: {0}")]
    InvalidUpstreamTimeout(String),
    #[error("UPSTREAM_URL must not be empty")]
    MissingUpstreamUrl,
    #[error("SUPPORTED_MODELS must name at least one model")]
    NoModels,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = non_empty(lookup("HOST")).unwrap_or_else(|| "0.0.0.0".to_string());

        let port_raw = non_empty(lookup("PORT")).unwrap_or_else(|| "3000".to_string());
        let port =
            port_raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(port_raw.clone()))?;

        let api_key = non_empty(lookup("API_KEY")).unwrap_or_else(|| DEFAULT_API_KEY.to_string());

        let upstream_url = match lookup("UPSTREAM_URL") {
            None => DEFAULT_UPSTREAM_URL.to_string(),
            Some(url) if url.trim().is_empty() => return Err(ConfigError::MissingUpstreamUrl),
            Some(url) => url.trim().to_string(),
        };

        let upstream_timeout = match non_empty(lookup("UPSTREAM_TIMEOUT_SECONDS")) {
            None => None,
            Some(raw) => parse_timeout_seconds(&raw)
                .ok_or_else(|| ConfigError::InvalidUpstreamTimeout(raw.clone()))?,
        };

        let supported_models = match lookup("SUPPORTED_MODELS") {
            Some(raw) => parse_string_list(raw.trim(), DEFAULT_SUPPORTED_MODELS),
            None => to_owned_list(DEFAULT_SUPPORTED_MODELS),
        };
        if supported_models.is_empty() {
            return Err(ConfigError::NoModels);
        }

        Ok(Self { host, port, api_key, upstream_url, upstream_timeout, supported_models })
    }

    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_key: "test-key".to_string(),
            upstream_url: "http://127.0.0.1:9/api/chat".to_string(),
            upstream_timeout: None,
            supported_models: to_owned_list(DEFAULT_SUPPORTED_MODELS),
        }
    }

    pub fn primary_model(&self) -> &str {
        self.supported_models.first().map(String::as_str).unwrap_or(DEFAULT_SUPPORTED_MODELS[0])
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `0` means no deadline, matching an unset variable.
fn parse_timeout_seconds(value: &str) -> Option<Option<Duration>> {
    let seconds = value.trim().parse::<u64>().ok()?;
    if seconds == 0 { Some(None) } else { Some(Some(Duration::from_secs(seconds))) }
}

fn to_owned_list(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn parse_string_list(trimmed: &str, default: &[&str]) -> Vec<String> {
    if trimmed.is_empty() {
        return to_owned_list(default);
    }
    if trimmed.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Vec<String>>(trimmed) {
            return parsed
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect();
        }
        return to_owned_list(default);
    }

    let parsed = trimmed
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>();
    if parsed.is_empty() { to_owned_list(default) } else { parsed }
}

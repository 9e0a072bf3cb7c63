use std::env;

/// Where formatted log lines go. `LOG_EXPORTER=none` (or `off`) silences the
/// proxy entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSink {
    #[default]
    Stdout,
    Disabled,
}

impl LogSink {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Self::Disabled,
            _ => Self::Stdout,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Disabled => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_span_events: bool,
    pub log_sink: LogSink,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("LOG_LEVEL")
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "info".to_string());
        let log_span_events = lookup("LOG_SPAN_EVENTS").is_some_and(|value| is_truthy(&value));
        let log_sink = lookup("LOG_EXPORTER").map(|value| LogSink::parse(&value)).unwrap_or_default();

        Self { log_level, log_span_events, log_sink }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

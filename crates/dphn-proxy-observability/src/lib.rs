use tracing_subscriber::{
    EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

pub mod config;

pub use config::{LogSink, ObservabilityConfig};

const PROXY_CRATES: &[&str] = &[
    "dphn_proxy_app",
    "dphn_proxy_core",
    "dphn_proxy_upstream",
    "tower_http",
];

pub fn fallback_filter(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(PROXY_CRATES.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

pub fn init_observability(service_name: &str, config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter(&config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match config.log_sink {
        LogSink::Stdout => Some(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(std::io::stdout)
                .with_span_events(span_events(config.log_span_events)),
        ),
        LogSink::Disabled => None,
    };

    let installed = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init();
    if installed.is_ok() {
        tracing::debug!(
            event = "observability.initialized",
            service = service_name,
            log_level = %config.log_level,
            log_sink = config.log_sink.as_str()
        );
    }
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE }
}

/// Installs the global subscriber from `RUST_LOG`, `LOG_LEVEL`,
/// `LOG_SPAN_EVENTS` and `LOG_EXPORTER`. A second call is a no-op.
pub fn init_tracing(service_name: &str) {
    init_observability(service_name, &ObservabilityConfig::from_env());
}

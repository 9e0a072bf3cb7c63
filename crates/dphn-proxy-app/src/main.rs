use std::net::SocketAddr;

use dphn_proxy_app::{AppState, build_router, config::AppConfig};
use dphn_proxy_observability::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing("dphn-proxy");

    let config = AppConfig::from_env().expect("configuration must be valid");
    let state = AppState::from_config(&config).expect("upstream http client must build");
    let app = build_router(state);
    let addr: SocketAddr =
        format!("{}:{}", config.host, config.port).parse().expect("socket address must be valid");

    info!(
        event = "server.starting",
        %addr,
        upstream = %config.upstream_url,
        models = config.supported_models.len(),
        primary_model = config.primary_model(),
        upstream_timeout_secs = config.upstream_timeout.map(|timeout| timeout.as_secs()),
        "listening; model list at /v1/models"
    );

    let listener = tokio::net::TcpListener::bind(addr).await.expect("listener must bind");
    axum::serve(listener, app).await.expect("server must run");
}

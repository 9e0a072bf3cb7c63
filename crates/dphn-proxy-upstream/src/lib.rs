use std::time::Duration;

use async_trait::async_trait;
use dphn_proxy_contracts::NormalizedRequest;
use dphn_proxy_core::{ByteStream, ChatUpstream, CoreError};
use futures::StreamExt;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use tracing::{error, info, warn};

pub use reqwest::Error as HttpClientError;

pub const DEFAULT_UPSTREAM_URL: &str = "https://chat.dphn.ai/api/chat";

// The upstream only answers requests that look like its own mobile web
// client; these values are protocol constants.
const UPSTREAM_HEADERS: &[(&str, &str)] = &[
    ("authority", "chat.dphn.ai"),
    ("accept", "text/event-stream"),
    ("accept-language", "vi-VN,vi;q=0.9"),
    ("cache-control", "no-cache"),
    ("content-type", "application/json"),
    ("origin", "https://chat.dphn.ai"),
    ("referer", "https://chat.dphn.ai/"),
    ("sec-ch-ua", "\"Chromium\";v=\"137\", \"Not/A)Brand\";v=\"24\""),
    ("sec-ch-ua-mobile", "?1"),
    ("sec-ch-ua-platform", "\"Android\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    (
        "user-agent",
        "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Mobile Safari/537.36",
    ),
];

pub struct UpstreamClient {
    url: String,
    http_client: Client,
    headers: HeaderMap,
}

impl UpstreamClient {
    /// `timeout` bounds the whole upstream exchange, body included. `None`
    /// leaves a hung upstream hanging the request.
    pub fn build_http_client(timeout: Option<Duration>) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    pub fn new_with_http_client(url: String, http_client: Client) -> Self {
        Self { url, http_client, headers: upstream_headers() }
    }

    pub fn new(url: String, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let http_client = Self::build_http_client(timeout)?;
        Ok(Self::new_with_http_client(url, http_client))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatUpstream for UpstreamClient {
    async fn dispatch(&self, request: &NormalizedRequest) -> Result<ByteStream, CoreError> {
        info!(
            event = "upstream.request.sent",
            model = %request.model,
            messages = request.messages.len()
        );

        let response = self
            .http_client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| {
                error!(event = "upstream.request.failed", url = %self.url, error = %err);
                CoreError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|err| {
                warn!(event = "upstream.response.error_body_unreadable", error = %err);
                String::new()
            });
            error!(event = "upstream.response.error", status = status.as_u16(), body = %body);
            return Err(CoreError::Upstream { status: status.as_u16(), body });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| CoreError::Transport(err.to_string())))
            .boxed())
    }
}

fn upstream_headers() -> HeaderMap {
    UPSTREAM_HEADERS
        .iter()
        .map(|&(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
        .collect()
}

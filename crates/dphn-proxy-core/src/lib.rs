use async_trait::async_trait;
use bytes::Bytes;
use dphn_proxy_contracts::NormalizedRequest;
use futures::stream::BoxStream;

pub mod accumulate;
pub mod normalize;
pub mod passthrough;
pub mod sse;

pub use accumulate::{AccumulatedResult, ContentAccumulator, DEFAULT_FINISH_REASON, accumulate};
pub use normalize::{SYSTEM_SEPARATOR, normalize_messages, normalize_request};
pub use passthrough::observe_passthrough;
pub use sse::{DecodeStats, SseFrameDecoder};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("upstream returned status {status}")]
    Upstream { status: u16, body: String },
    #[error("{0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Raw upstream response body, read lazily chunk by chunk. Dropping it
/// releases the upstream connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, CoreError>>;

#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Issues exactly one upstream call. Non-success statuses come back as
    /// [`CoreError::Upstream`] with the full body already read.
    async fn dispatch(&self, request: &NormalizedRequest) -> Result<ByteStream, CoreError>;
}

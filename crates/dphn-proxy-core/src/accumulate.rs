use dphn_proxy_contracts::UpstreamFrame;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::{ByteStream, sse::SseFrameDecoder};

pub const DEFAULT_FINISH_REASON: &str = "stop";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatedResult {
    pub content: String,
    pub finish_reason: String,
    pub frames: usize,
    /// The upstream body failed mid-read; `content` is what arrived before.
    pub interrupted: bool,
}

#[derive(Debug, Default)]
pub struct ContentAccumulator {
    content: String,
    finish_reason: Option<String>,
    frames: usize,
    content_frames: usize,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, frame: &UpstreamFrame) {
        self.frames += 1;
        if let Some(delta) = frame.delta_content() {
            self.content_frames += 1;
            self.content.push_str(delta);
        }
        if let Some(reason) = frame.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn finish(self, interrupted: bool) -> AccumulatedResult {
        AccumulatedResult {
            content: self.content,
            finish_reason: self
                .finish_reason
                .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
            frames: self.frames,
            interrupted,
        }
    }
}

/// Drains the upstream body and folds its deltas into one result.
///
/// A read failure ends the drain early but is not fatal: whatever content
/// arrived before it is returned with `interrupted` set.
pub async fn accumulate(mut body: ByteStream) -> AccumulatedResult {
    let mut decoder = SseFrameDecoder::new();
    let mut accumulator = ContentAccumulator::new();
    let mut interrupted = false;

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                for frame in decoder.push(&chunk) {
                    accumulator.apply(&frame);
                }
            }
            Err(err) => {
                warn!(
                    event = "upstream.stream.read_failed",
                    error = %err,
                    received_chars = accumulator.content().chars().count(),
                    "returning partial content"
                );
                interrupted = true;
                break;
            }
        }
    }
    drop(body);

    let stats = decoder.finish();
    if stats.data_lines > 0 && accumulator.content_frames == 0 {
        warn!(
            event = "upstream.stream.no_content",
            data_lines = stats.data_lines,
            malformed = stats.malformed,
            "upstream frames carried no delta content; upstream frame format may have changed"
        );
    }

    let result = accumulator.finish(interrupted);
    debug!(
        event = "upstream.stream.accumulated",
        frames = result.frames,
        malformed = stats.malformed,
        finish_reason = %result.finish_reason,
        interrupted = result.interrupted
    );
    result
}

use futures::{StreamExt, stream};
use tracing::{info, warn};

use crate::{ByteStream, sse::SseFrameDecoder};

/// Forwards the upstream body untouched while running the same frame decoder
/// the accumulating path uses, purely to log what went through.
///
/// When the client goes away the returned stream is dropped mid-flight, which
/// drops the upstream body with it and releases the connection.
pub fn observe_passthrough(body: ByteStream, model: String) -> ByteStream {
    let tap = PassthroughTap {
        body,
        decoder: SseFrameDecoder::new(),
        model,
        chunks: 0,
        bytes: 0,
        finish_reason: None,
        finished: false,
    };

    stream::unfold(tap, |mut tap| async move {
        if tap.finished {
            return None;
        }
        match tap.body.next().await {
            Some(Ok(chunk)) => {
                tap.observe(&chunk);
                Some((Ok(chunk), tap))
            }
            Some(Err(err)) => {
                warn!(
                    event = "passthrough.read_failed",
                    model = %tap.model,
                    chunks = tap.chunks,
                    error = %err
                );
                tap.finished = true;
                Some((Err(err), tap))
            }
            None => {
                tap.complete();
                None
            }
        }
    })
    .boxed()
}

struct PassthroughTap {
    body: ByteStream,
    decoder: SseFrameDecoder,
    model: String,
    chunks: usize,
    bytes: usize,
    finish_reason: Option<String>,
    finished: bool,
}

impl PassthroughTap {
    fn observe(&mut self, chunk: &[u8]) {
        self.chunks += 1;
        self.bytes += chunk.len();
        for frame in self.decoder.push(chunk) {
            if let Some(reason) = frame.finish_reason() {
                self.finish_reason = Some(reason.to_string());
            }
        }
    }

    fn complete(&mut self) {
        self.finished = true;
        let stats = self.decoder.stats();
        info!(
            event = "passthrough.completed",
            model = %self.model,
            chunks = self.chunks,
            bytes = self.bytes,
            frames = stats.frames,
            malformed = stats.malformed,
            finish_reason = self.finish_reason.as_deref().unwrap_or("none")
        );
    }
}

impl Drop for PassthroughTap {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                event = "passthrough.cancelled",
                model = %self.model,
                chunks = self.chunks,
                bytes = self.bytes,
                "client disconnected; releasing upstream stream"
            );
        }
    }
}

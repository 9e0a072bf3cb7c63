use dphn_proxy_contracts::UpstreamFrame;
use tracing::trace;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// `data:` lines carrying a payload other than the terminator.
    pub data_lines: usize,
    /// Data lines that parsed as an [`UpstreamFrame`].
    pub frames: usize,
    /// Data lines whose payload was not valid frame JSON.
    pub malformed: usize,
}

/// Incremental decoder for the upstream SSE body.
///
/// Chunks may split lines and multi-byte characters anywhere. Bytes are held
/// until a `\n` arrives; since `\n` never occurs inside a UTF-8 sequence, a
/// completed line always holds whole code points and is decoded only then.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    pending: Vec<u8>,
    stats: DecodeStats,
}

#[derive(Debug, PartialEq)]
enum LineOutcome {
    Ignored,
    Malformed,
    Frame(UpstreamFrame),
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the frames completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<UpstreamFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|byte| *byte == b'\n') {
            let line_end = consumed + offset;
            match decode_line(&self.pending[consumed..line_end]) {
                LineOutcome::Ignored => {}
                LineOutcome::Malformed => {
                    self.stats.data_lines += 1;
                    self.stats.malformed += 1;
                }
                LineOutcome::Frame(frame) => {
                    self.stats.data_lines += 1;
                    self.stats.frames += 1;
                    frames.push(frame);
                }
            }
            consumed = line_end + 1;
        }
        self.pending.drain(..consumed);

        frames
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Ends decoding. A trailing line without its `\n` is dropped, never
    /// half-processed.
    pub fn finish(self) -> DecodeStats {
        if !self.pending.is_empty() {
            trace!(
                event = "sse.decoder.trailing_bytes_discarded",
                bytes = self.pending.len()
            );
        }
        self.stats
    }
}

fn decode_line(raw: &[u8]) -> LineOutcome {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Ignored;
    };
    let payload = payload.trim_start();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return LineOutcome::Ignored;
    }
    match serde_json::from_str::<UpstreamFrame>(payload) {
        Ok(frame) => LineOutcome::Frame(frame),
        Err(err) => {
            trace!(event = "sse.decoder.frame_skipped", error = %err);
            LineOutcome::Malformed
        }
    }
}

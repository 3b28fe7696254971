//! Server-sent event handling
//!
//! Network chunks arrive at arbitrary byte offsets. `SseLineBuffer` only
//! hands out complete lines, so a multibyte character split across two
//! chunks is decoded once both halves are in. `SseStreamProcessor` turns
//! those lines into [`StreamPart`]s using a provider [`SseParser`].

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::ai::streaming::StreamPart;
use crate::ai::types::FinishReason;
use crate::error::ClientError;

/// Events a parser extracts from one `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    TextDelta(String),
    Finish(FinishReason),
}

/// Provider-specific decoding of `data:` JSON payloads
pub trait SseParser: Send + Sync {
    /// Events in the payload, in order. An `Err` ends the stream.
    fn parse_event(&self, json: &Value) -> Result<Vec<SseEvent>, ClientError>;
}

/// Classification of a single SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine<'a> {
    Data(&'a str),
    Done,
    Ignored,
}

pub fn parse_line(line: &str) -> SseLine<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, `:` comments, `event:`, `id:` and `retry:` fields
        return SseLine::Ignored;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == "[DONE]" {
        SseLine::Done
    } else if data.trim().is_empty() {
        SseLine::Ignored
    } else {
        SseLine::Data(data)
    }
}

/// Accumulates raw bytes and yields complete, decoded lines
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every line completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned());
        }
        lines
    }

    /// Remaining unterminated line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Drives a parser over a byte stream and forwards parts on a channel
pub struct SseStreamProcessor<P> {
    parser: P,
    lines: SseLineBuffer,
    tx: mpsc::UnboundedSender<StreamPart>,
    finish_reason: Option<FinishReason>,
    deltas: usize,
    finished: bool,
}

impl<P: SseParser> SseStreamProcessor<P> {
    pub fn new(parser: P, tx: mpsc::UnboundedSender<StreamPart>) -> Self {
        Self {
            parser,
            lines: SseLineBuffer::new(),
            tx,
            finish_reason: None,
            deltas: 0,
            finished: false,
        }
    }

    /// Feed one network chunk. Returns true once the stream is complete.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<bool, ClientError> {
        for line in self.lines.push(chunk) {
            if self.process_line(&line)? {
                return Ok(true);
            }
        }
        Ok(self.finished)
    }

    /// Flush the trailing partial line and emit the final part. Called when
    /// the body ends without a `[DONE]` sentinel.
    pub fn finish(&mut self) -> Result<(), ClientError> {
        if let Some(line) = self.lines.finish() {
            if self.process_line(&line)? {
                return Ok(());
            }
        }
        self.complete();
        Ok(())
    }

    /// Number of text deltas forwarded so far
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    fn process_line(&mut self, line: &str) -> Result<bool, ClientError> {
        if self.finished {
            return Ok(true);
        }
        match parse_line(line) {
            SseLine::Ignored => Ok(false),
            SseLine::Done => {
                debug!("SSE: [DONE] after {} deltas", self.deltas);
                self.complete();
                Ok(true)
            }
            SseLine::Data(data) => {
                let json: Value = match serde_json::from_str(data) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("SSE: skipping malformed chunk ({}): {}", e, truncate(data));
                        return Ok(false);
                    }
                };
                for event in self.parser.parse_event(&json)? {
                    match event {
                        SseEvent::TextDelta(delta) => {
                            self.deltas += 1;
                            trace!("SSE: delta #{} ({} bytes)", self.deltas, delta.len());
                            let _ = self.tx.send(StreamPart::TextDelta { delta });
                        }
                        SseEvent::Finish(reason) => self.finish_reason = Some(reason),
                    }
                }
                Ok(false)
            }
        }
    }

    fn complete(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let reason = self.finish_reason.take().unwrap_or(FinishReason::Stop);
        let _ = self.tx.send(StreamPart::Finish { reason });
    }
}

fn truncate(data: &str) -> String {
    data.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parsers::OpenAIParser;

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamPart>) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        while let Ok(part) = rx.try_recv() {
            parts.push(part);
        }
        parts
    }

    #[test]
    fn test_parse_line_kinds() {
        assert_eq!(parse_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}"));
        assert_eq!(parse_line("data:{\"a\":1}\r"), SseLine::Data("{\"a\":1}"));
        assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(parse_line("event: message"), SseLine::Ignored);
        assert_eq!(parse_line(""), SseLine::Ignored);
    }

    #[test]
    fn test_line_buffer_holds_split_multibyte_char() {
        let mut buffer = SseLineBuffer::new();
        let text = "data: é\n".as_bytes();
        // 'é' is two bytes; cut between them
        let cut = "data: ".len() + 1;
        assert!(buffer.push(&text[..cut]).is_empty());
        assert_eq!(buffer.pending_len(), cut);
        assert_eq!(buffer.push(&text[cut..]), vec!["data: é".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_processor_forwards_deltas_and_done() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut processor = SseStreamProcessor::new(OpenAIParser::new(), tx);
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        assert!(processor.process_chunk(body.as_bytes()).unwrap());
        assert_eq!(
            drain(&mut rx),
            vec![
                StreamPart::TextDelta { delta: "Hel".into() },
                StreamPart::TextDelta { delta: "lo".into() },
                StreamPart::Finish {
                    reason: FinishReason::Length
                },
            ]
        );
    }

    #[test]
    fn test_processor_skips_malformed_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut processor = SseStreamProcessor::new(OpenAIParser::new(), tx);
        let body = concat!(
            "data: {not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert!(!processor.process_chunk(body.as_bytes()).unwrap());
        processor.finish().unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                StreamPart::TextDelta { delta: "ok".into() },
                StreamPart::Finish {
                    reason: FinishReason::Stop
                },
            ]
        );
    }

    #[test]
    fn test_processor_flushes_unterminated_last_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut processor = SseStreamProcessor::new(OpenAIParser::new(), tx);
        processor
            .process_chunk(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .unwrap();
        processor.finish().unwrap();
        let parts = drain(&mut rx);
        assert_eq!(parts[0], StreamPart::TextDelta { delta: "tail".into() });
        assert_eq!(processor.delta_count(), 1);
    }

    #[test]
    fn test_processor_error_payload_is_fatal() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut processor = SseStreamProcessor::new(OpenAIParser::new(), tx);
        let result = processor.process_chunk(
            b"data: {\"error\":{\"message\":\"model not loaded\",\"type\":\"server_error\"}}\n",
        );
        assert!(matches!(result, Err(ClientError::Api { .. })));
    }
}

//! Streaming chat completions
//!
//! Opens `POST {server}/chat/completions` with `stream: true` and hands the
//! body to a background task that turns SSE lines into [`StreamPart`]s.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ensure_success_response, LocalServerClient};
use crate::ai::parsers::OpenAIParser;
use crate::ai::retry::with_retry;
use crate::ai::sse::{SseParser, SseStreamProcessor};
use crate::ai::streaming::StreamPart;
use crate::ai::types::ChatRequest;
use crate::error::ClientError;

/// Spawn a stream processing task for an HTTP SSE response.
///
/// Reads bytes until `[DONE]`, end of body, an error, or cancellation.
/// Errors are sent as an explicit [`StreamPart::Error`] so the receiver never
/// waits on a silently-dead channel. Cancellation sends nothing and drops the
/// response, closing the connection.
fn spawn_sse_stream_task<S, P>(
    stream: S,
    parser: P,
    tx: mpsc::UnboundedSender<StreamPart>,
    cancel: CancellationToken,
    timeout: Duration,
) where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
    P: SseParser + 'static,
{
    tokio::spawn(async move {
        tokio::pin!(stream);
        let mut processor = SseStreamProcessor::new(parser, tx.clone());
        let mut chunk_count: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chat stream cancelled after {} chunks", chunk_count);
                    return;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    chunk_count += 1;
                    match processor.process_chunk(&bytes) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => {
                            warn!("Chat stream chunk #{} error: {}", chunk_count, e);
                            let _ = tx.send(StreamPart::Error {
                                error: e.to_string(),
                            });
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    let e = ClientError::from_reqwest(e, timeout);
                    error!("Chat stream read error at chunk #{}: {}", chunk_count, e);
                    let _ = tx.send(StreamPart::Error {
                        error: e.to_string(),
                    });
                    return;
                }
                None => {
                    if let Err(e) = processor.finish() {
                        let _ = tx.send(StreamPart::Error {
                            error: e.to_string(),
                        });
                        return;
                    }
                    break;
                }
            }
        }

        info!(
            "Chat stream ended after {} chunks, {} deltas",
            chunk_count,
            processor.delta_count()
        );
    });
}

impl LocalServerClient {
    /// Open a streamed chat completion.
    ///
    /// Opening the stream is retried on transient failures; once the body
    /// starts flowing nothing is retried.
    pub async fn call_streaming(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ClientError> {
        let call_start = Instant::now();
        info!(
            "Chat request: model={}, messages={}, max_tokens={}",
            request.model,
            request.messages.len(),
            request.max_tokens
        );

        let timeout = self.config().stream_timeout;
        let url = self.config().chat_url();
        let response = with_retry(&self.config().retry, "Open chat stream", || async {
            let response = self
                .http
                .post(&url)
                .timeout(timeout)
                .header("Accept", "text/event-stream")
                .json(&request)
                .send()
                .await
                .map_err(|e| ClientError::from_reqwest(e, timeout))?;
            ensure_success_response(response, call_start, "Chat stream").await
        })
        .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_sse_stream_task(
            response.bytes_stream(),
            OpenAIParser::new(),
            tx,
            cancel,
            timeout,
        );
        Ok(rx)
    }
}

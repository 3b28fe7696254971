//! OpenAI-compatible SSE parser for chat/completions format

use serde_json::Value;

use crate::ai::sse::{SseEvent, SseParser};
use crate::ai::types::FinishReason;
use crate::error::ClientError;

/// Parser for `{"choices":[{"delta":{...},"finish_reason":...}]}` chunks
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAIParser;

impl OpenAIParser {
    pub fn new() -> Self {
        Self
    }
}

impl SseParser for OpenAIParser {
    fn parse_event(&self, json: &Value) -> Result<Vec<SseEvent>, ClientError> {
        // Check for error response first
        // Format: {"error": {"message": "...", "type": "..."}} or {"error": "..."}
        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .unwrap_or("Unknown error");
            let kind = error
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown");
            return Err(ClientError::Api {
                kind: kind.to_string(),
                message: message.to_string(),
            });
        }

        let mut events = Vec::new();
        let Some(choice) = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|choices| choices.first())
        else {
            return Ok(events);
        };

        if let Some(delta) = choice.get("delta") {
            // Reasoning content only when content is absent or null
            let content = delta
                .get("content")
                .and_then(|c| c.as_str())
                .or_else(|| delta.get("reasoning_content").and_then(|r| r.as_str()))
                .unwrap_or_default();
            if !content.is_empty() {
                events.push(SseEvent::TextDelta(content.to_string()));
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
            events.push(SseEvent::Finish(FinishReason::from_wire(reason)));
        }

        Ok(events)
    }
}

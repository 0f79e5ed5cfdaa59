use crate::api::logging::emit_sse_parse_error;
use crate::types::{CustomEvent, Message, RunMetadata, StateSnapshot, StreamEvent};
use anyhow::Result;
use serde::Deserialize;

#[derive(Deserialize)]
struct ErrorFrame {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Incremental SSE decoder for the run stream. Frames may arrive fragmented
/// across chunks; the buffer holds the unterminated tail between calls.
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let frame_end = start + end + 2;
            let frame_text = &self.buffer[start..frame_end];

            let mut event_name = None;
            let mut data = None;

            for line in frame_text.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event_name = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = Some(rest.trim().to_string());
                }
            }

            if let (Some(name), Some(json_data)) = (event_name, data) {
                if json_data != "[DONE]" {
                    if let Some(event) = decode_event(&name, &json_data) {
                        events.push(event);
                    }
                }
            }

            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(events)
    }

    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

fn decode_event(name: &str, json_data: &str) -> Option<StreamEvent> {
    match name {
        "metadata" => match serde_json::from_str::<RunMetadata>(json_data) {
            Ok(metadata) => Some(StreamEvent::Metadata(metadata)),
            Err(error) => {
                emit_sse_parse_error(Some(name), json_data, &error);
                None
            }
        },
        "values" => match serde_json::from_str::<StateSnapshot>(json_data) {
            Ok(snapshot) => Some(StreamEvent::Values(snapshot)),
            Err(error) => {
                emit_sse_parse_error(Some(name), json_data, &error);
                None
            }
        },
        "messages/partial" => match serde_json::from_str::<Vec<Message>>(json_data) {
            Ok(messages) => Some(StreamEvent::MessagesPartial(messages)),
            Err(error) => {
                emit_sse_parse_error(Some(name), json_data, &error);
                None
            }
        },
        "messages/complete" => match serde_json::from_str::<Vec<Message>>(json_data) {
            Ok(messages) => Some(StreamEvent::MessagesComplete(messages)),
            Err(error) => {
                emit_sse_parse_error(Some(name), json_data, &error);
                None
            }
        },
        // Malformed custom payloads are dropped silently; they must never
        // take down the rest of the stream.
        "custom" => serde_json::from_str::<CustomEvent>(json_data)
            .ok()
            .map(StreamEvent::Custom),
        "error" => {
            let message = serde_json::from_str::<ErrorFrame>(json_data)
                .ok()
                .and_then(|frame| frame.message.or(frame.error))
                .unwrap_or_else(|| json_data.to_string());
            Some(StreamEvent::Error { message })
        }
        "end" => Some(StreamEvent::End),
        // Checkpoint, task, debug and other stream modes we did not subscribe
        // to are skipped without complaint.
        _ => None,
    }
}

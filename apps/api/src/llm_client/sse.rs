//! Server-sent event decoding for the Messages streaming API.
//!
//! Network frames do not line up with event boundaries, so the decoder keeps raw
//! bytes until a blank line closes an event. UTF-8 is only decoded per complete
//! event, which keeps multi-byte characters split across frames intact.

use serde::Deserialize;
use tracing::debug;

use super::AnthropicErrorBody;

/// One decoded SSE event block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feeds one network frame and returns every event it completed.
    pub fn push(&mut self, frame: &[u8]) -> Vec<SseEvent> {
        self.pending.extend(frame.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.pending) {
            let block: Vec<u8> = self.pending.drain(..end + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                events.push(event);
            }
        }
        events
    }
}

fn find_blank_line(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() && event.event.is_none() {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// What the client does with a decoded event.
#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Stop,
    Error(String),
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: WireDelta },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: AnthropicErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Maps an event to a client action. Payloads that are not JSON are ignored.
pub fn parse_stream_event(event: &SseEvent) -> StreamEvent {
    if event.data.trim().is_empty() {
        return StreamEvent::Ignored;
    }
    let wire: WireEvent = match serde_json::from_str(&event.data) {
        Ok(wire) => wire,
        Err(e) => {
            debug!("Skipping undecodable SSE payload: {e}");
            return StreamEvent::Ignored;
        }
    };
    match wire {
        WireEvent::ContentBlockDelta {
            delta: WireDelta::TextDelta { text },
        } => StreamEvent::Text(text),
        WireEvent::ContentBlockDelta { .. } => StreamEvent::Ignored,
        WireEvent::MessageStop => StreamEvent::Stop,
        WireEvent::Error { error } => StreamEvent::Error(error.message),
        WireEvent::Other => StreamEvent::Ignored,
    }
}

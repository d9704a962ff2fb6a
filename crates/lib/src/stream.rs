//! Decoder for the chat stream's server-sent-event body.
//!
//! Bytes are buffered until a full line is available, so a JSON payload split across two
//! network reads is parsed once its line is complete. `\r\n` line endings are accepted.

use serde::Deserialize;

/// Field prefix that carries a JSON payload.
pub const DATA_PREFIX: &str = "data:";

/// One meaningful event from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full current text of the assistant reply (replaces, not appends).
    Content(String),
    /// End of the reply; may carry the final text.
    Done(Option<String>),
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Incremental line decoder. Feed it each network chunk with [`push`](Self::push) and call
/// [`finish`](Self::finish) once the body ends.
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    buffer: Vec<u8>,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return events for every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..i).collect();
            self.buffer.drain(..1);
            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(ev) = parse_line(&line) {
                events.push(ev);
            }
        }
        events
    }

    /// Interpret whatever is left in the buffer as a final, unterminated line.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Parse a single stream line. Non-data lines, non-JSON data (e.g. `[END]`) and payloads
/// without content or a done marker yield None.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches('\r');
    let data = line.strip_prefix(DATA_PREFIX)?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        return None;
    }
    let payload: Payload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(_) => {
            log::trace!("stream: ignoring non-json data line");
            return None;
        }
    };
    match payload.kind.as_deref() {
        Some("done") => Some(StreamEvent::Done(payload.content)),
        _ => payload.content.map(StreamEvent::Content),
    }
}

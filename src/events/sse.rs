//! Incremental parser for `text/event-stream` bodies
//!
//! Bytes are fed as they arrive off the wire; complete messages come out as
//! soon as their terminating blank line is seen. Only the `event` and `data`
//! fields are kept, comments and other fields are skipped.

use tracing::warn;

/// Longest line kept while waiting for its newline
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    // set after an overlong line was cut, until its newline shows up
    discarding: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every message it completes.
    ///
    /// A line that grows past [`MAX_LINE_LENGTH`] before its newline arrives
    /// is dropped together with the message it belongs to.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            warn!(
                "Dropping event stream line longer than {} bytes",
                MAX_LINE_LENGTH
            );
            self.buffer.clear();
            self.event = None;
            self.data.clear();
            self.discarding = true;
        }

        messages
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn flush(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage { event, data })
    }
}

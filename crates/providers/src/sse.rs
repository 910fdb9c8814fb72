//! Incremental SSE (Server-Sent Events) parser shared by the streaming
//! adapters. Buffers partial frames across chunk boundaries, tolerates
//! CRLF line endings, and ignores comment/`id:`/`retry:` fields.
//!
//! `data: [DONE]` is passed through untouched; terminator handling is
//! each adapter's concern.

/// A single parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// The `event:` field, if present (e.g. "content_block_delta").
    pub event: Option<String>,
    /// The joined `data:` payload.
    pub data: String,
}

/// Incremental parser fed raw HTTP body bytes.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    pending_event: Option<String>,
    pending_data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every complete event it closed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                // Blank line closes the current event.
                if !self.pending_data.is_empty() {
                    events.push(SseEvent {
                        event: self.pending_event.take(),
                        data: self.pending_data.join("\n"),
                    });
                }
                self.pending_event = None;
                self.pending_data.clear();
            } else if let Some(value) = line.strip_prefix("data:") {
                self.pending_data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            } else if let Some(value) = line.strip_prefix("event:") {
                self.pending_event = Some(value.trim().to_string());
            }
            // id:, retry:, and ": comment" lines are skipped.
        }
        events
    }
}

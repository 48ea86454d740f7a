//! Incremental decoder for `text/event-stream` bodies.
//!
//! Follows the WHATWG server-sent events parsing rules: LF, CRLF and CR line
//! endings, `:` comment lines, `event`/`data`/`id`/`retry` fields and
//! dispatch on a blank line. Chunks may split lines (and UTF-8 sequences)
//! anywhere.

use std::time::Duration;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Longest line, and largest accumulated `data`, kept for one frame.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    /// Last event id in effect when this event was dispatched.
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    pending_cr: bool,
    bom_checked: bool,
    event_type: String,
    data: String,
    last_event_id: Option<String>,
    retry: Option<Duration>,
    /// Rest of the current line is dropped.
    skipping_line: bool,
    /// Current frame is dropped up to the next blank line.
    skipping_frame: bool,
    discarded: u64,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of the body and returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for &b in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.pending_cr = true;
                }
                _ if self.skipping_line => {}
                _ if self.line.len() >= MAX_FRAME_BYTES => {
                    self.skipping_line = true;
                    self.discard_frame();
                }
                _ => self.line.push(b),
            }
        }
        out
    }

    /// Clears partial frame state for a fresh connection.
    ///
    /// The last event id survives so it can be sent as `Last-Event-ID`.
    pub fn reset(&mut self) {
        self.line.clear();
        self.pending_cr = false;
        self.bom_checked = false;
        self.event_type.clear();
        self.data.clear();
        self.skipping_line = false;
        self.skipping_frame = false;
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Takes the most recent `retry:` hint, if one arrived since the last call.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    /// Takes the number of frames dropped for exceeding [`MAX_FRAME_BYTES`]
    /// since the last call.
    pub fn take_discarded(&mut self) -> u64 {
        std::mem::take(&mut self.discarded)
    }

    fn discard_frame(&mut self) {
        self.line.clear();
        self.event_type.clear();
        self.data.clear();
        self.bom_checked = true;
        if !self.skipping_frame {
            self.skipping_frame = true;
            self.discarded += 1;
        }
    }

    fn end_line(&mut self, out: &mut Vec<SseEvent>) {
        if self.skipping_line {
            self.skipping_line = false;
            return;
        }
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if !self.bom_checked {
            self.bom_checked = true;
            if let Some(stripped) = line.strip_prefix('\u{FEFF}') {
                line = stripped.to_string();
            }
        }
        self.process_line(&line, out);
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if self.skipping_frame {
            if line.is_empty() {
                self.skipping_frame = false;
            }
            return;
        }
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = value.to_string(),
            "data" => {
                if self.data.len() + value.len() + 1 > MAX_FRAME_BYTES {
                    self.discard_frame();
                    return;
                }
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseEvent>) {
        let event_type = std::mem::take(&mut self.event_type);
        if self.data.is_empty() {
            return;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        let event = if event_type.is_empty() {
            DEFAULT_EVENT_NAME.to_string()
        } else {
            event_type
        };
        out.push(SseEvent {
            event,
            data,
            id: self.last_event_id.clone(),
        });
    }
}

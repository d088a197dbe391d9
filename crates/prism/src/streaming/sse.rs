//! Server-Sent Events (SSE) framing
//!
//! Encodes session events as `text/event-stream` frames. The decoder below
//! only backs the crate's own tests, which read written streams back:
//! - event: and data: field parsing
//! - Multi-line data fields
//! - CRLF and LF line endings
//!

/// Encode one frame. Multi-line data is split over several `data:` lines
/// so the frame stays well-formed.
pub fn encode_frame(event: &str, data: &str) -> String {
    let mut frame = String::with_capacity(event.len() + data.len() + 16);
    frame.push_str("event: ");
    frame.push_str(event);
    frame.push('\n');
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line.strip_suffix('\r').unwrap_or(line));
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// A parsed SSE frame
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    /// Event type (defaults to "message")
    pub(crate) event: String,
    pub(crate) data: String,
    pub(crate) id: Option<String>,
}

#[cfg(test)]
impl SseFrame {
    /// Parse the data as JSON
    pub(crate) fn parse_json<T: for<'de> serde::Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// SSE frame decoder, fed line by line
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    event_type: Option<String>,
    data_lines: Vec<String>,
    event_id: Option<String>,
}

#[cfg(test)]
impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Decode a single line; returns a frame at each blank line
    pub(crate) fn decode(&mut self, line: &str) -> Option<SseFrame> {
        if line.trim().is_empty() {
            return self.take_frame();
        }

        // Comment line
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" => self.event_id = Some(value.to_string()),
            _ => {}
        }

        None
    }

    /// Force out a frame that was not terminated by a blank line
    pub(crate) fn flush(&mut self) -> Option<SseFrame> {
        self.take_frame()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data_lines.is_empty() {
            self.event_type = None;
            return None;
        }

        Some(SseFrame {
            event: self
                .event_type
                .take()
                .unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data_lines).join("\n"),
            // the last event id carries over to later frames
            id: self.event_id.clone(),
        })
    }
}

/// Parse a complete `text/event-stream` body into frames
#[cfg(test)]
pub(crate) fn parse_frames(body: &[u8]) -> Vec<SseFrame> {
    let text = String::from_utf8_lossy(body);
    let mut decoder = SseDecoder::new();
    let mut frames: Vec<SseFrame> = text
        .split('\n')
        .filter_map(|line| decoder.decode(line.strip_suffix('\r').unwrap_or(line)))
        .collect();
    frames.extend(decoder.flush());
    frames
}

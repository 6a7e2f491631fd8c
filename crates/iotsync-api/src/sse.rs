//! Line-oriented event-stream parser.
//!
//! Turns the body of a `text/event-stream` response into discrete named
//! events. The grammar the backend emits is a repetition of
//!
//! ```text
//! event: <name>
//! data: <json>
//!
//! ```
//!
//! Text may arrive in arbitrary chunks: a line, an event, or even a
//! multibyte UTF-8 sequence can be split across two reads. The parser
//! buffers at most one incomplete trailing line and emits the same event
//! sequence no matter where the chunk boundaries fall.
//!
//! Only the last `data:` line of an event is kept. The backend never emits
//! multi-line payloads, and concatenating would change what gets decoded.

use serde_json::Value;

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Value of the `event:` line, e.g. `"progress"`, `"complete"`, `"error"`.
    pub name: String,
    /// `data:` payload decoded as JSON.
    pub data: Value,
}

/// Incremental parser state for a single stream.
///
/// Create one per response body; never share across streams.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    /// Incomplete trailing line carried over from the previous chunk.
    buffer: String,
    /// Bytes of a UTF-8 sequence cut off at the end of the previous chunk.
    utf8_tail: Vec<u8>,
    event_name: Option<String>,
    data: Option<String>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text and return every event it completes.
    pub fn parse_chunk(&mut self, text: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(text);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Feed raw bytes, reassembling UTF-8 sequences split across chunks.
    pub fn parse_bytes(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut pending = std::mem::take(&mut self.utf8_tail);
        pending.extend_from_slice(bytes);

        let valid_up_to = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                // Genuinely invalid bytes: decode lossily so the stream keeps going.
                tracing::warn!(offset = e.valid_up_to(), "invalid UTF-8 in event stream");
                let text = String::from_utf8_lossy(&pending).into_owned();
                return self.parse_chunk(&text);
            }
        };

        self.utf8_tail = pending.split_off(valid_up_to);
        match std::str::from_utf8(&pending) {
            Ok(text) => self.parse_chunk(text),
            Err(_) => Vec::new(),
        }
    }

    /// `true` if a partial line or an unterminated event is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
            || !self.utf8_tail.is_empty()
            || self.event_name.is_some()
            || self.data.is_some()
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(rest) = line.strip_prefix(EVENT_PREFIX) {
            self.event_name = Some(rest.trim().to_owned());
        } else if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            self.data = Some(rest.trim().to_owned());
        } else if line.starts_with(':') {
            tracing::trace!("event stream comment");
        } else {
            tracing::debug!(line, "ignoring unrecognized event stream line");
        }
        None
    }

    /// Blank line: emit the pending event if complete, then reset.
    fn dispatch(&mut self) -> Option<StreamEvent> {
        let name = self.event_name.take();
        let data = self.data.take();

        let (Some(name), Some(data)) = (name, data) else {
            return None;
        };

        match serde_json::from_str::<Value>(&data) {
            Ok(value) => Some(StreamEvent { name, data: value }),
            Err(e) => {
                tracing::warn!(event = %name, error = %e, "dropping malformed event payload");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const STREAM: &str = "event: progress\n\
        data: {\"stage\":\"device\",\"progress\":10,\"message\":\"Créating device\"}\n\
        \n\
        event: progress\r\n\
        data: {\"stage\":\"rules\",\"progress\":50}\r\n\
        \r\n\
        : keep-alive\n\
        event: complete\n\
        data: {\"id\":\"dev-1\",\"name\":\"Pump\"}\n\
        \n";

    fn parse_whole(text: &str) -> Vec<StreamEvent> {
        EventStreamParser::new().parse_chunk(text)
    }

    #[test]
    fn parses_complete_stream() {
        let events = parse_whole(STREAM);
        let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["progress", "progress", "complete"]);
        assert_eq!(events[1].data["progress"], 50);
        assert_eq!(events[2].data, json!({"id": "dev-1", "name": "Pump"}));
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let expected = parse_whole(STREAM);

        for split in 0..=STREAM.len() {
            if !STREAM.is_char_boundary(split) {
                continue;
            }
            let mut parser = EventStreamParser::new();
            let mut events = parser.parse_chunk(&STREAM[..split]);
            events.extend(parser.parse_chunk(&STREAM[split..]));
            assert_eq!(events, expected, "split at byte {split}");
        }
    }

    #[test]
    fn byte_chunks_reassemble_multibyte_characters() {
        let expected = parse_whole(STREAM);
        let bytes = STREAM.as_bytes();

        for split in 0..=bytes.len() {
            let mut parser = EventStreamParser::new();
            let mut events = parser.parse_bytes(&bytes[..split]);
            events.extend(parser.parse_bytes(&bytes[split..]));
            assert_eq!(events, expected, "byte split at {split}");
        }
    }

    #[test]
    fn one_byte_at_a_time() {
        let expected = parse_whole(STREAM);
        let mut parser = EventStreamParser::new();
        let events: Vec<_> = STREAM
            .as_bytes()
            .iter()
            .flat_map(|b| parser.parse_bytes(std::slice::from_ref(b)))
            .collect();
        assert_eq!(events, expected);
        assert!(!parser.has_pending());
    }

    #[test]
    fn incomplete_trailing_line_is_buffered() {
        let mut parser = EventStreamParser::new();
        assert!(parser.parse_chunk("event: progress\ndata: {\"a\":").is_empty());
        assert!(parser.has_pending());

        let events = parser.parse_chunk("1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, json!({"a": 1}));
    }

    #[test]
    fn malformed_payload_is_skipped_and_stream_continues() {
        let text = "event: progress\ndata: {not json\n\nevent: complete\ndata: {\"ok\":true}\n\n";
        let events = parse_whole(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "complete");
    }

    #[test]
    fn only_last_data_line_is_kept() {
        let text = "event: progress\ndata: {\"n\":1}\ndata: {\"n\":2}\n\n";
        let events = parse_whole(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, json!({"n": 2}));
    }

    #[test]
    fn data_without_event_name_is_dropped_and_state_reset() {
        let text = "data: {\"orphan\":true}\n\nevent: complete\ndata: {}\n\n";
        let events = parse_whole(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "complete");
    }
}

//! Incremental framing for the message stream body.
//!
//! Bytes arrive in arbitrary chunks. The decoder holds back incomplete UTF-8
//! sequences and incomplete events, and hands out the joined `data:` payload
//! of every event terminated by a blank line.

const EVENT_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data:";

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending_bytes: Vec<u8>,
    buffer: String,
    // Prefix of `buffer` already known to hold no delimiter.
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode_utf8(chunk);
        self.append(&text);
        self.drain_complete_events()
    }

    /// Flushes whatever is left once the body has ended, including a final
    /// event that never received its trailing blank line.
    pub fn finish(&mut self) -> Vec<String> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            self.append(&tail);
        }
        let mut payloads = self.drain_complete_events();
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if let Some(payload) = extract_data(&rest) {
            payloads.push(payload);
        }
        payloads
    }

    pub fn is_empty(&self) -> bool {
        self.pending_bytes.is_empty() && self.buffer.is_empty()
    }

    fn append(&mut self, text: &str) {
        self.buffer.extend(text.chars().filter(|c| *c != '\r'));
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending_bytes.clear();
                    return out;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid_up_to]));
                    match e.error_len() {
                        // Truncated multi-byte sequence: wait for the next chunk.
                        None => {
                            self.pending_bytes.drain(..valid_up_to);
                            return out;
                        }
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid_up_to + invalid_len);
                        }
                    }
                }
            }
        }
    }

    fn drain_complete_events(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Some(found) = self.buffer[self.scanned..].find(EVENT_DELIMITER) {
            let boundary = self.scanned + found;
            let raw_event: String = self.buffer.drain(..boundary + EVENT_DELIMITER.len()).collect();
            self.scanned = 0;
            if let Some(payload) = extract_data(&raw_event[..boundary]) {
                payloads.push(payload);
            }
        }
        // A trailing '\n' may be the first half of the next delimiter.
        self.scanned = if self.buffer.ends_with('\n') {
            self.buffer.len() - 1
        } else {
            self.buffer.len()
        };
        payloads
    }
}

/// Joins the `data:` lines of one raw event with `\n`. Events without any
/// data line (comments, `event:`/`id:` only) yield nothing.
fn extract_data(raw_event: &str) -> Option<String> {
    let raw_event = raw_event.trim();
    if raw_event.is_empty() {
        return None;
    }
    let data_lines: Vec<&str> = raw_event
        .split('\n')
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELTA_EVENT: &str = "data: {\"type\":\"delta\",\"delta\":\"ab\"}\n\n";

    fn decode_in_pieces(body: &[u8], split_at: usize) -> Vec<String> {
        let mut decoder = SseDecoder::new();
        let mut out = decoder.push(&body[..split_at]);
        out.extend(decoder.push(&body[split_at..]));
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn single_event_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(DELTA_EVENT.as_bytes());
        assert_eq!(events, vec![r#"{"type":"delta","delta":"ab"}"#.to_string()]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn every_split_offset_yields_the_same_events() {
        let body = DELTA_EVENT.as_bytes();
        let expected = decode_in_pieces(body, body.len());
        for offset in 0..=body.len() {
            assert_eq!(decode_in_pieces(body, offset), expected, "split at byte {}", offset);
        }
    }

    #[test]
    fn incomplete_event_waits_for_delimiter() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"delta\"").is_empty());
        assert!(decoder.push(b",\"delta\":\"x\"}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec![r#"{"type":"delta","delta":"x"}"#.to_string()]);
    }

    #[test]
    fn multiple_data_lines_are_joined_with_newline() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"delta\",\ndata:\"delta\":\"z\"}\n\n");
        assert_eq!(events, vec!["{\"type\":\"delta\",\n\"delta\":\"z\"}".to_string()]);
    }

    #[test]
    fn carriage_returns_are_stripped_before_framing() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(events, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn only_a_single_space_after_prefix_is_removed() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data:tight\n\ndata:  padded\n\n");
        assert_eq!(events, vec!["tight".to_string(), " padded".to_string()]);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\n\nevent: message\nid: 3\ndata: x\n\n");
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn trailing_event_without_delimiter_is_flushed_on_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: last").is_empty());
        assert_eq!(decoder.finish(), vec!["last".to_string()]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn multibyte_characters_survive_chunk_splits() {
        let body = "data: héllo ✓\n\n".as_bytes();
        let check_mark_start = body.len() - 5;
        for offset in [7, 8, check_mark_start + 1, check_mark_start + 2] {
            assert_eq!(decode_in_pieces(body, offset), vec!["héllo ✓".to_string()]);
        }
    }

    #[test]
    fn long_event_fed_byte_by_byte_resumes_scanning() {
        let text = "x".repeat(4096);
        let body = format!("data: {}\n\ndata: é\n\n", text);
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for byte in body.as_bytes() {
            events.extend(decoder.push(std::slice::from_ref(byte)));
            assert!(decoder.scanned <= decoder.buffer.len());
            if !decoder.buffer.ends_with('\n') {
                assert_eq!(decoder.scanned, decoder.buffer.len());
            }
        }
        assert_eq!(events, vec![text, "é".to_string()]);
        assert!(decoder.is_empty());
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: a\xffb\n\n");
        assert_eq!(events, vec!["a\u{FFFD}b".to_string()]);
    }
}

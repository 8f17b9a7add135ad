//! Event-stream framing: each event travels as `data: <json>` followed by a
//! blank line.

use crate::ServerEvent;

const DATA_PREFIX: &str = "data:";
const DELIMITER: &[u8] = b"\n\n";

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("frame payload is not a server event: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Encode one event as a complete frame.
pub fn encode_frame(event: &ServerEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Incremental decoder for a chunked event stream.
///
/// Bytes are buffered until a full delimited frame is present, so frames (and
/// UTF-8 sequences) split across reads decode the same as if they arrived
/// whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // Prefix of `buffer` already searched for a delimiter.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every event whose frame is now complete, in
    /// arrival order. Frames without the `data:` prefix are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<ServerEvent, FrameError>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            // Back off so a delimiter split across chunks is still found.
            let start = self.scanned.saturating_sub(DELIMITER.len() - 1);
            let Some(offset) = find_delimiter(&self.buffer[start..]) else {
                self.scanned = self.buffer.len();
                break;
            };
            let idx = start + offset;
            let frame: Vec<u8> = self.buffer.drain(..idx + DELIMITER.len()).collect();
            self.scanned = 0;
            if let Some(event) = decode_frame(&frame[..idx]) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

fn decode_frame(raw: &[u8]) -> Option<Result<ServerEvent, FrameError>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Err(e.into())),
    };
    let payload = text.strip_prefix(DATA_PREFIX)?;
    Some(serde_json::from_str(payload).map_err(FrameError::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(events: Vec<Result<ServerEvent, FrameError>>) -> Vec<ServerEvent> {
        events.into_iter().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn encodes_data_line_and_blank_line() {
        let frame = encode_frame(&ServerEvent::Done).unwrap();
        assert_eq!(frame, "data: {\"type\":\"done\"}\n\n");
    }

    #[test]
    fn decodes_several_frames_in_one_chunk() {
        let mut bytes = String::new();
        bytes.push_str(&encode_frame(&ServerEvent::token("Sure")).unwrap());
        bytes.push_str(&encode_frame(&ServerEvent::token(", ")).unwrap());
        bytes.push_str(&encode_frame(&ServerEvent::Done).unwrap());

        let mut decoder = FrameDecoder::new();
        assert_eq!(
            ok(decoder.push(bytes.as_bytes())),
            vec![
                ServerEvent::token("Sure"),
                ServerEvent::token(", "),
                ServerEvent::Done
            ]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn frame_split_at_every_offset_decodes_identically() {
        let frame = encode_frame(&ServerEvent::token("héllo wörld")).unwrap();
        let bytes = frame.as_bytes();

        for split in 1..bytes.len() {
            let mut decoder = FrameDecoder::new();
            let first = decoder.push(&bytes[..split]);
            assert!(first.is_empty(), "split {split} decoded early");
            let second = ok(decoder.push(&bytes[split..]));
            assert_eq!(second, vec![ServerEvent::token("héllo wörld")], "split {split}");
        }
    }

    #[test]
    fn partial_frame_waits_for_delimiter() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\"}\n").is_empty());
        assert!(decoder.pending() > 0);
        assert_eq!(ok(decoder.push(b"\n")), vec![ServerEvent::Done]);
    }

    #[test]
    fn byte_by_byte_feed_never_rescans_searched_prefix() {
        let content = "x".repeat(4096);
        let mut wire = encode_frame(&ServerEvent::token(content.clone())).unwrap();
        wire.push_str(&encode_frame(&ServerEvent::Done).unwrap());

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for byte in wire.as_bytes() {
            events.extend(ok(decoder.push(std::slice::from_ref(byte))));
            assert_eq!(decoder.scanned, decoder.buffer.len());
        }
        assert_eq!(events, vec![ServerEvent::token(content), ServerEvent::Done]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn frames_without_data_prefix_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let events = ok(decoder.push(b": keep-alive\n\nevent: ping\n\ndata:{\"type\":\"done\"}\n\n"));
        assert_eq!(events, vec![ServerEvent::Done]);
    }

    #[test]
    fn malformed_payload_is_reported_and_decoding_continues() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {oops\n\ndata: {\"type\":\"done\"}\n\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Err(FrameError::Payload(_))));
        assert_eq!(events[1].as_ref().unwrap(), &ServerEvent::Done);
    }
}

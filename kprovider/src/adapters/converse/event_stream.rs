//! Decoder for the binary event-stream framing used by `converse-stream`.
//!
//! Each frame is laid out as:
//!
//! ```text
//! total_len:u32 | headers_len:u32 | prelude_crc:u32 | headers | payload | message_crc:u32
//! ```
//!
//! All integers are big-endian. Frames are delimited by the length fields alone;
//! the CRC fields are skipped, not verified.

use crate::GatewayError;

const PRELUDE_LEN: usize = 12;
const TRAILER_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + TRAILER_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStreamMessage {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Vec<u8>,
}

impl EventStreamMessage {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(value) if key == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// `event` or `exception`.
    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    pub fn exception_type(&self) -> Option<&str> {
        self.header_str(":exception-type")
    }
}

/// Buffers raw bytes and yields complete frames as they become available.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_message(&mut self) -> Result<Option<EventStreamMessage>, GatewayError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buffer[0..4]) as usize;
        let headers_len = read_u32(&self.buffer[4..8]) as usize;

        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len) {
            return Err(frame_error(format!("invalid frame length {total_len}")));
        }
        if headers_len > total_len - MIN_FRAME_LEN {
            return Err(frame_error(format!(
                "header block of {headers_len} bytes exceeds frame of {total_len} bytes"
            )));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let frame = self.buffer.drain(..total_len).collect::<Vec<_>>();
        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(&frame[PRELUDE_LEN..headers_end])?;
        let payload = frame[headers_end..total_len - TRAILER_LEN].to_vec();

        Ok(Some(EventStreamMessage { headers, payload }))
    }
}

fn parse_headers(mut bytes: &[u8]) -> Result<Vec<(String, HeaderValue)>, GatewayError> {
    let mut headers = Vec::new();

    while !bytes.is_empty() {
        let name_len = take(&mut bytes, 1)?[0] as usize;
        let name = utf8(take(&mut bytes, name_len)?)?;
        let value_type = take(&mut bytes, 1)?[0];

        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(take(&mut bytes, 1)?[0] as i8),
            3 => HeaderValue::Short(i16::from_be_bytes(array(take(&mut bytes, 2)?)?)),
            4 => HeaderValue::Int(i32::from_be_bytes(array(take(&mut bytes, 4)?)?)),
            5 => HeaderValue::Long(i64::from_be_bytes(array(take(&mut bytes, 8)?)?)),
            6 => {
                let len = u16::from_be_bytes(array(take(&mut bytes, 2)?)?) as usize;
                HeaderValue::Bytes(take(&mut bytes, len)?.to_vec())
            }
            7 => {
                let len = u16::from_be_bytes(array(take(&mut bytes, 2)?)?) as usize;
                HeaderValue::String(utf8(take(&mut bytes, len)?)?)
            }
            8 => HeaderValue::Timestamp(i64::from_be_bytes(array(take(&mut bytes, 8)?)?)),
            9 => HeaderValue::Uuid(array(take(&mut bytes, 16)?)?),
            other => return Err(frame_error(format!("unknown header value type {other}"))),
        };

        headers.push((name, value));
    }

    Ok(headers)
}

fn take<'a>(bytes: &mut &'a [u8], len: usize) -> Result<&'a [u8], GatewayError> {
    if bytes.len() < len {
        return Err(frame_error("truncated header block"));
    }
    let (head, tail) = bytes.split_at(len);
    *bytes = tail;
    Ok(head)
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], GatewayError> {
    bytes
        .try_into()
        .map_err(|_| frame_error("header value has unexpected width"))
}

fn utf8(bytes: &[u8]) -> Result<String, GatewayError> {
    String::from_utf8(bytes.to_vec()).map_err(|err| frame_error(err.to_string()))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn frame_error(message: impl Into<String>) -> GatewayError {
    GatewayError::provider(format!("malformed event stream: {}", message.into()))
}

/// Test-side encoder mirroring the decoder; CRC fields are written as zero.
#[cfg(test)]
pub(crate) fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = MIN_FRAME_LEN + header_bytes.len() + payload.len();
    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(&(total_len as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&[0; 4]);
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&[0; 4]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayErrorKind;

    #[test]
    fn decodes_a_complete_event_frame() {
        let frame = encode_frame(
            &[(":message-type", "event"), (":event-type", "contentBlockDelta")],
            br#"{"delta":{"text":"Hallo"}}"#,
        );
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);

        let message = decoder
            .next_message()
            .expect("frame should decode")
            .expect("frame should be complete");
        assert_eq!(message.message_type(), Some("event"));
        assert_eq!(message.event_type(), Some("contentBlockDelta"));
        assert_eq!(message.payload, br#"{"delta":{"text":"Hallo"}}"#.to_vec());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn crc_fields_are_not_verified() {
        let mut frame = encode_frame(&[(":event-type", "messageStop")], b"{}");
        frame[8..12].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let trailer = frame.len() - 4;
        frame[trailer..].copy_from_slice(&[0xca, 0xfe, 0xba, 0xbe]);

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);
        let message = decoder
            .next_message()
            .expect("length-delimited frame decodes")
            .expect("complete frame");
        assert_eq!(message.event_type(), Some("messageStop"));
    }

    #[test]
    fn waits_for_frames_split_across_chunks() {
        let frame = encode_frame(&[(":message-type", "event")], b"{}");
        let (first, second) = frame.split_at(frame.len() / 2);
        let mut decoder = EventStreamDecoder::new();

        decoder.push(first);
        assert_eq!(decoder.next_message().expect("partial is fine"), None);

        decoder.push(second);
        assert!(decoder.next_message().expect("decode").is_some());
    }

    #[test]
    fn yields_back_to_back_frames_in_order() {
        let mut bytes = encode_frame(&[(":event-type", "messageStart")], b"{}");
        bytes.extend(encode_frame(&[(":event-type", "messageStop")], b"{}"));
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&bytes);

        let first = decoder.next_message().expect("decode").expect("first");
        let second = decoder.next_message().expect("decode").expect("second");
        assert_eq!(first.event_type(), Some("messageStart"));
        assert_eq!(second.event_type(), Some("messageStop"));
        assert_eq!(decoder.next_message().expect("decode"), None);
    }

    #[test]
    fn exposes_exception_headers() {
        let frame = encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "throttlingException"),
            ],
            br#"{"message":"slow down"}"#,
        );
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);

        let message = decoder.next_message().expect("decode").expect("frame");
        assert_eq!(message.message_type(), Some("exception"));
        assert_eq!(message.exception_type(), Some("throttlingException"));
    }

    #[test]
    fn rejects_impossible_lengths() {
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&[0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);

        let error = decoder.next_message().expect_err("length below minimum");
        assert_eq!(error.kind, GatewayErrorKind::Provider);
        assert!(error.message.contains("malformed event stream"));
    }

    #[test]
    fn rejects_truncated_header_blocks() {
        let mut frame = encode_frame(&[(":event-type", "metadata")], b"");
        // Corrupt the string length of the only header.
        let length_offset = PRELUDE_LEN + 1 + ":event-type".len() + 1;
        frame[length_offset] = 0xFF;
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&frame);

        assert!(decoder.next_message().is_err());
    }
}

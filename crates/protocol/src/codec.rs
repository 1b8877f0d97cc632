//! Frame body encoding and best-effort decoding.

use chrono::DateTime;
use uuid::Uuid;

use crate::DELIMITER;
use crate::error::FrameError;
use crate::frame::{MessageFrame, Severity};

const FLAG_TIMESTAMP: u8 = 0x01;
const FLAG_ACTIVITY_ID: u8 = 0x02;

const TIMESTAMP_LEN: usize = 8;
const ACTIVITY_ID_LEN: usize = 16;

/// Encodes a frame body.
///
/// Fails with [`FrameError::InvalidSource`] when the source contains the
/// field delimiter, and with [`FrameError::FrameTooLarge`] when the body
/// would exceed `max_frame_size`. Frames are never truncated.
pub fn encode(frame: &MessageFrame, max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    if frame.source.contains(DELIMITER) {
        return Err(FrameError::InvalidSource {
            source_name: frame.source.clone(),
            delimiter: DELIMITER,
        });
    }

    let severity = frame.severity.as_str();
    let text_len =
        severity.len() + frame.source.len() + frame.message.len() + 2 * DELIMITER.len_utf8();

    let mut flags = 0u8;
    let mut size = 1 + text_len;
    if frame.timestamp.is_some() {
        flags |= FLAG_TIMESTAMP;
        size += TIMESTAMP_LEN;
    }
    if frame.activity_id.is_some() {
        flags |= FLAG_ACTIVITY_ID;
        size += ACTIVITY_ID_LEN;
    }

    if size > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }

    let mut buf = Vec::with_capacity(size);
    buf.push(flags);
    if let Some(ts) = frame.timestamp {
        buf.extend_from_slice(&ts.timestamp_millis().to_be_bytes());
    }
    if let Some(id) = frame.activity_id {
        buf.extend_from_slice(id.as_bytes());
    }

    let mut delim_buf = [0u8; 4];
    let delim = DELIMITER.encode_utf8(&mut delim_buf).as_bytes();
    buf.extend_from_slice(severity.as_bytes());
    buf.extend_from_slice(delim);
    buf.extend_from_slice(frame.source.as_bytes());
    buf.extend_from_slice(delim);
    buf.extend_from_slice(frame.message.as_bytes());

    Ok(buf)
}

/// Decodes a frame body.
///
/// Never fails: missing fields decode as empty strings and an unknown
/// severity token as [`Severity::Unspecified`]. Check
/// [`MessageFrame::is_valid`] before trusting the result.
pub fn decode(body: &[u8]) -> MessageFrame {
    let Some((&flags, mut rest)) = body.split_first() else {
        return MessageFrame::new(Severity::Unspecified, "", "");
    };

    let mut timestamp = None;
    if flags & FLAG_TIMESTAMP != 0 && rest.len() >= TIMESTAMP_LEN {
        let (raw, tail) = rest.split_at(TIMESTAMP_LEN);
        let mut millis = [0u8; TIMESTAMP_LEN];
        millis.copy_from_slice(raw);
        timestamp = DateTime::from_timestamp_millis(i64::from_be_bytes(millis));
        rest = tail;
    }

    let mut activity_id = None;
    if flags & FLAG_ACTIVITY_ID != 0 && rest.len() >= ACTIVITY_ID_LEN {
        let (raw, tail) = rest.split_at(ACTIVITY_ID_LEN);
        activity_id = Uuid::from_slice(raw).ok();
        rest = tail;
    }

    let text = String::from_utf8_lossy(rest);
    let mut fields = text.splitn(3, DELIMITER);
    let severity = Severity::from_token(fields.next().unwrap_or_default());
    let source = fields.next().unwrap_or_default();
    let message = fields.next().unwrap_or_default();

    MessageFrame {
        severity,
        source: source.to_string(),
        message: message.to_string(),
        timestamp,
        activity_id,
    }
}

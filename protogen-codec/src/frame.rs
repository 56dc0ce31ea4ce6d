//! Binary frame header.
//!
//! Frame layout (4 bytes header + payload, big-endian):
//!
//! ```text
//! +-------------+--------------+---------+---------------------+
//! | payload_len | message_type | user_id | payload             |
//! |   2 bytes   |    1 byte    | 1 byte  | payload_len bytes   |
//! +-------------+--------------+---------+---------------------+
//! ```

use crate::error::{CodecError, ErrorKind};
use bytes::BufMut;

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 4;

/// The fixed header in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u16,
    pub message_type: u8,
    pub user_id: u8,
}

impl FrameHeader {
    pub fn new(payload_len: u16, message_type: u8, user_id: u8) -> Self {
        Self {
            payload_len,
            message_type,
            user_id,
        }
    }

    /// Reads a header from the start of `buf` without consuming anything.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
    pub fn peek(buf: &[u8]) -> Option<Self> {
        match buf {
            [hi, lo, message_type, user_id, ..] => Some(Self {
                payload_len: u16::from_be_bytes([*hi, *lo]),
                message_type: *message_type,
                user_id: *user_id,
            }),
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.payload_len);
        buf.put_u8(self.message_type);
        buf.put_u8(self.user_id);
    }

    /// Total length of the frame, header included.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }
}

/// Splits the first frame out of `buf`.
///
/// The returned payload is exactly `payload_len` bytes long. Anything after
/// it belongs to the next frame and is not part of the slice.
pub fn split_frame(buf: &[u8]) -> Result<(FrameHeader, &[u8]), CodecError> {
    let header = FrameHeader::peek(buf)
        .ok_or_else(|| CodecError::new(0, 0, 0, ErrorKind::HeaderTooShort))?;

    let end = header.frame_len();
    if buf.len() < end {
        return Err(CodecError::in_frame(&header, ErrorKind::Truncated));
    }

    Ok((header, &buf[HEADER_SIZE..end]))
}

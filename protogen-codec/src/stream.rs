//! Streaming frame decoder.

use crate::binary::Codec;
use crate::error::{CodecError, ErrorKind};
use crate::frame::{FrameHeader, HEADER_SIZE};
use crate::value::Message;
use bytes::BytesMut;

/// Buffers incoming bytes and decodes complete frames out of them.
///
/// A frame is removed from the buffer before its payload is decoded, so a
/// malformed message is reported once and the next call starts at the
/// following frame boundary.
pub struct FrameDecoder<'c> {
    codec: Codec<'c>,
    buffer: BytesMut,
}

impl<'c> FrameDecoder<'c> {
    pub fn new(codec: Codec<'c>) -> Self {
        Self {
            codec,
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next message from the buffer.
    ///
    /// Returns `Ok(None)` until a whole frame has been buffered.
    pub fn decode(&mut self) -> Result<Option<Message>, CodecError> {
        let header = match FrameHeader::peek(&self.buffer) {
            Some(header) => header,
            None => return Ok(None),
        };

        if self.buffer.len() < header.frame_len() {
            return Ok(None);
        }

        let frame = self.buffer.split_to(header.frame_len());
        match self.codec.decode_payload(header, &frame[HEADER_SIZE..]) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                tracing::debug!(
                    user_id = header.user_id,
                    message_type = header.message_type,
                    error = %e,
                    "skipped malformed frame"
                );
                Err(e)
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Checks that the stream ended on a frame boundary.
    pub fn finish(&mut self) -> Result<(), CodecError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let err = match FrameHeader::peek(&self.buffer) {
            Some(header) => CodecError::new(
                header.user_id,
                header.message_type,
                header.payload_len as usize,
                ErrorKind::Truncated,
            ),
            None => CodecError::new(0, 0, 0, ErrorKind::HeaderTooShort),
        };
        self.buffer.clear();
        Err(err)
    }
}

//! Binary codec: message values to and from wire frames.

use crate::error::{CodecError, ErrorKind};
use crate::frame::{split_frame, FrameHeader, HEADER_SIZE};
use crate::text::TextOptions;
use crate::value::{Message, Value};
use bytes::{Buf, BufMut, BytesMut};
use protogen_schema::{Catalogue, Field, FieldKind, IntType, MessageDef, SeqType, MAX_PAYLOAD_LEN};

/// Encodes and decodes messages of one catalogue.
///
/// The codec only borrows the catalogue; any number of codecs can share
/// it across threads.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'c> {
    catalogue: &'c Catalogue,
    options: TextOptions,
}

impl<'c> Codec<'c> {
    pub fn new(catalogue: &'c Catalogue) -> Self {
        Self {
            catalogue,
            options: TextOptions::default(),
        }
    }

    /// Sets the options used by the text conversions.
    pub fn with_options(mut self, options: TextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalogue(&self) -> &'c Catalogue {
        self.catalogue
    }

    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    /// Decodes the first frame in `buf`.
    ///
    /// Bytes after the frame are ignored; they belong to the next frame.
    pub fn decode(&self, buf: &[u8]) -> Result<Message, CodecError> {
        let (header, payload) = split_frame(buf)?;
        self.decode_payload(header, payload)
    }

    /// Decodes a payload that has already been split from its frame.
    pub fn decode_payload(
        &self,
        header: FrameHeader,
        payload: &[u8],
    ) -> Result<Message, CodecError> {
        let fail = |kind| CodecError::in_frame(&header, kind);

        let def = self
            .catalogue
            .by_id(header.message_type)
            .ok_or_else(|| fail(ErrorKind::UnknownType))?;

        // A message without fields is identified by its type alone
        if !def.fields().is_empty() {
            check_len(def, payload.len()).map_err(fail)?;
        }

        let mut buf = payload;
        let mut values = Vec::with_capacity(def.fields().len());
        for field in def.fields() {
            values.push(read_field(def, field, &mut buf).map_err(fail)?);
        }

        if buf.has_remaining() {
            tracing::debug!(
                message = %def.name,
                trailing = buf.remaining(),
                "ignoring trailing payload bytes"
            );
        }

        Ok(Message::new(header.user_id, header.message_type, values))
    }

    /// Encodes a message into a complete frame.
    ///
    /// The header's payload length is the size of the encoded fields.
    pub fn encode(&self, msg: &Message) -> Result<BytesMut, CodecError> {
        let fail = |len, kind| CodecError::new(msg.user_id, msg.message_type, len, kind);

        let def = self
            .catalogue
            .by_id(msg.message_type)
            .ok_or_else(|| fail(0, ErrorKind::UnknownType))?;

        if msg.values.len() != def.fields().len() {
            return Err(fail(
                0,
                ErrorKind::FieldCount {
                    expected: def.fields().len(),
                    actual: msg.values.len(),
                },
            ));
        }

        let mut payload = BytesMut::with_capacity(def.min_len());
        for (field, value) in def.fields().iter().zip(&msg.values) {
            write_field(def, field, value, &mut payload)
                .map_err(|kind| fail(payload.len(), kind))?;
        }

        let len = payload.len();
        check_len(def, len).map_err(|kind| fail(len, kind))?;

        let mut frame = BytesMut::with_capacity(HEADER_SIZE + len);
        FrameHeader::new(len as u16, msg.message_type, msg.user_id).encode(&mut frame);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

fn check_len(def: &MessageDef, len: usize) -> Result<(), ErrorKind> {
    let out_of_bounds = def.layout.has_bounds() && (len < def.min_len() || len > def.max_len());
    if len > MAX_PAYLOAD_LEN || out_of_bounds {
        return Err(ErrorKind::BadLength {
            len,
            min: def.min_len(),
            max: def.max_len(),
        });
    }
    Ok(())
}

fn field_too_long(def: &MessageDef, field: &Field) -> ErrorKind {
    ErrorKind::FieldTooLong {
        message: def.name.clone(),
        field: field.name.clone(),
    }
}

fn type_mismatch(field: &Field) -> ErrorKind {
    ErrorKind::TypeMismatch {
        field: field.name.clone(),
    }
}

fn take<'p>(buf: &mut &'p [u8], n: usize) -> &'p [u8] {
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    head
}

fn read_field(def: &MessageDef, field: &Field, buf: &mut &[u8]) -> Result<Value, ErrorKind> {
    match &field.kind {
        FieldKind::Integer {
            ty: IntType::Bool, ..
        } => Ok(Value::Bool(read_int(buf, IntType::Bool)? != 0)),
        FieldKind::Integer { ty, .. } => read_int(buf, *ty).map(Value::Int),
        FieldKind::Flags { width, .. } => read_uint(buf, *width).map(Value::Int),
        FieldKind::Sequence { ty, prefix, .. } => {
            let esize = ty.element_size();
            let count = match prefix {
                Some(prefix) => {
                    let count = read_uint(buf, prefix.width())? as usize;
                    let content_max = field.max_len - prefix.width();
                    if count * esize > buf.remaining() || count * esize > content_max {
                        return Err(field_too_long(def, field));
                    }
                    count
                }
                None => {
                    if buf.remaining() % esize != 0 {
                        return Err(ErrorKind::PartialItem {
                            field: field.name.clone(),
                        });
                    }
                    buf.remaining() / esize
                }
            };

            let data = take(buf, count * esize);
            Ok(match ty {
                SeqType::Bytes | SeqType::VecU8 => Value::Bytes(data.to_vec()),
                SeqType::Utf8 => Value::Text(String::from_utf8_lossy(data).into_owned()),
                SeqType::VecU16 => Value::Words(
                    data.chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                ),
            })
        }
        FieldKind::Struct {
            subfields,
            item_len,
            ..
        } => {
            if buf.remaining() % item_len != 0 {
                return Err(ErrorKind::PartialItem {
                    field: field.name.clone(),
                });
            }

            let mut records = Vec::with_capacity(buf.remaining() / item_len);
            while buf.has_remaining() {
                let record = subfields
                    .iter()
                    .map(|sub| read_scalar(sub, buf))
                    .collect::<Result<Vec<_>, _>>()?;
                records.push(record);
            }
            Ok(Value::Records(records))
        }
    }
}

/// Reads a struct subfield as a plain number.
fn read_scalar(field: &Field, buf: &mut &[u8]) -> Result<i64, ErrorKind> {
    match &field.kind {
        FieldKind::Integer {
            ty: IntType::Bool, ..
        } => Ok((read_int(buf, IntType::Bool)? != 0) as i64),
        FieldKind::Integer { ty, .. } => read_int(buf, *ty),
        FieldKind::Flags { width, .. } => read_uint(buf, *width),
        _ => Err(type_mismatch(field)),
    }
}

fn read_int(buf: &mut &[u8], ty: IntType) -> Result<i64, ErrorKind> {
    if buf.remaining() < ty.width() {
        return Err(ErrorKind::Truncated);
    }
    Ok(match ty {
        IntType::I8 => buf.get_i8() as i64,
        IntType::I16 => buf.get_i16() as i64,
        IntType::I32 => buf.get_i32() as i64,
        IntType::U8 | IntType::Bool => buf.get_u8() as i64,
        IntType::U16 => buf.get_u16() as i64,
        IntType::U32 | IntType::Argb32 => buf.get_u32() as i64,
    })
}

fn read_uint(buf: &mut &[u8], width: usize) -> Result<i64, ErrorKind> {
    if buf.remaining() < width {
        return Err(ErrorKind::Truncated);
    }
    Ok(match width {
        1 => buf.get_u8() as i64,
        2 => buf.get_u16() as i64,
        _ => buf.get_u32() as i64,
    })
}

fn write_field(
    def: &MessageDef,
    field: &Field,
    value: &Value,
    buf: &mut BytesMut,
) -> Result<(), ErrorKind> {
    match (&field.kind, value) {
        (
            FieldKind::Integer {
                ty: IntType::Bool, ..
            },
            Value::Bool(v),
        ) => buf.put_u8(*v as u8),
        (FieldKind::Integer { .. } | FieldKind::Flags { .. }, Value::Int(v)) => {
            write_scalar(field, *v, buf)?
        }
        (FieldKind::Sequence { ty, prefix, .. }, value) => {
            let count = match (ty, value) {
                (SeqType::Bytes | SeqType::VecU8, Value::Bytes(v)) => v.len(),
                (SeqType::Utf8, Value::Text(v)) => v.len(),
                (SeqType::VecU16, Value::Words(v)) => v.len(),
                _ => return Err(type_mismatch(field)),
            };

            let content_max = field.max_len - prefix.map_or(0, |p| p.width());
            if count * ty.element_size() > content_max {
                return Err(field_too_long(def, field));
            }

            if let Some(prefix) = prefix {
                put_uint(buf, prefix.width(), count as u32);
            }
            match value {
                Value::Bytes(v) => buf.put_slice(v),
                Value::Text(v) => buf.put_slice(v.as_bytes()),
                Value::Words(v) => v.iter().for_each(|w| buf.put_u16(*w)),
                _ => {}
            }
        }
        (
            FieldKind::Struct {
                subfields,
                max_items,
                ..
            },
            Value::Records(records),
        ) => {
            if records.len() > *max_items {
                return Err(field_too_long(def, field));
            }
            for record in records {
                if record.len() != subfields.len() {
                    return Err(type_mismatch(field));
                }
                for (sub, v) in subfields.iter().zip(record) {
                    write_scalar(sub, *v, buf)?;
                }
            }
        }
        _ => return Err(type_mismatch(field)),
    }
    Ok(())
}

/// Writes an integer or flags value after checking it fits the field.
fn write_scalar(field: &Field, value: i64, buf: &mut BytesMut) -> Result<(), ErrorKind> {
    let (width, in_range) = match &field.kind {
        FieldKind::Integer { ty, .. } => (ty.width(), ty.contains(value)),
        FieldKind::Flags { width, .. } => {
            let max = (1i64 << (8 * width)) - 1;
            (*width, (0..=max).contains(&value))
        }
        _ => return Err(type_mismatch(field)),
    };

    if !in_range {
        return Err(ErrorKind::OutOfRange {
            field: field.name.clone(),
            value,
        });
    }
    // Two's complement truncation keeps the bit pattern of signed values.
    put_uint(buf, width, value as u32);
    Ok(())
}

fn put_uint(buf: &mut BytesMut, width: usize, value: u32) {
    match width {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(value as u16),
        _ => buf.put_u32(value),
    }
}

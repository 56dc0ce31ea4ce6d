//! Codec error types.

use crate::frame::FrameHeader;
use thiserror::Error;

/// Cause of a binary decode or encode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("header too short")]
    HeaderTooShort,

    #[error("message truncated")]
    Truncated,

    #[error("unknown message type")]
    UnknownType,

    #[error("invalid payload length {len} (expected {min}..={max})")]
    BadLength { len: usize, min: usize, max: usize },

    #[error("{message}.{field}: field too long")]
    FieldTooLong { message: String, field: String },

    #[error("{field}: partial item at end of payload")]
    PartialItem { field: String },

    #[error("wrong number of values: expected {expected}, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("{field}: value does not match the field type")]
    TypeMismatch { field: String },

    #[error("{field}: value {value} out of range")]
    OutOfRange { field: String, value: i64 },
}

/// A binary codec error with the frame it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (user {user_id}, type {message_type}, payload length {payload_len})")]
pub struct CodecError {
    pub user_id: u8,
    pub message_type: u8,
    pub payload_len: usize,
    pub kind: ErrorKind,
}

impl CodecError {
    pub fn new(user_id: u8, message_type: u8, payload_len: usize, kind: ErrorKind) -> Self {
        Self {
            user_id,
            message_type,
            payload_len,
            kind,
        }
    }

    pub(crate) fn in_frame(header: &FrameHeader, kind: ErrorKind) -> Self {
        Self::new(
            header.user_id,
            header.message_type,
            header.payload_len as usize,
            kind,
        )
    }

    /// Human-readable cause, without the frame context.
    pub fn cause(&self) -> String {
        self.kind.to_string()
    }
}

/// Errors of the text representation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TextError {
    #[error("unknown message type {0}")]
    UnknownType(u8),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of values: expected {expected}, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("{field}: value does not match the field type")]
    TypeMismatch { field: String },

    #[error("{field}: unknown flag '{flag}'")]
    UnknownFlag { field: String, flag: String },

    #[error("{field}: invalid value '{value}'")]
    InvalidValue { field: String, value: String },

    #[error("{field}: value {value} out of range")]
    OutOfRange { field: String, value: String },

    #[error("{field}: record has {actual} values, expected {expected}")]
    RecordArity {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("syntax error: {0}")]
    Syntax(String),
}

impl TextError {
    pub(crate) fn invalid(field: &str, value: impl Into<String>) -> Self {
        TextError::InvalidValue {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn out_of_range(field: &str, value: impl ToString) -> Self {
        TextError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Errors reading or writing recording files.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a binary recording (bad magic {0:?})")]
    BadMagic(Vec<u8>),

    #[error("recording metadata too long: {0} bytes (max 65535)")]
    MetadataTooLong(usize),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Text(#[from] TextError),

    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: TextError,
    },
}

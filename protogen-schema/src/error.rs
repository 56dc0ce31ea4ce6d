//! Schema definition errors.

use thiserror::Error;

/// Errors raised while building a catalogue from schema descriptors.
///
/// Every variant is fatal: a catalogue is either built completely or not at
/// all.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate field name '{field}' in {owner}")]
    DuplicateField { owner: String, field: String },

    #[error("{name}: duplicate message name")]
    DuplicateMessage { name: String },

    #[error("{name}: duplicate message ID {id}")]
    DuplicateId { name: String, id: u8 },

    #[error("{name}: duplicate message command name '{command}'")]
    DuplicateCommand { name: String, command: String },

    #[error("{owner} is missing required attribute '{attribute}'")]
    MissingAttribute { owner: String, attribute: String },

    #[error("{owner}: invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        owner: String,
        attribute: String,
        reason: String,
    },

    #[error("{field}: unknown field type '{type_name}'")]
    UnknownType { field: String, type_name: String },

    #[error("invalid short form field '{0}'")]
    InvalidShortForm(String),

    #[error("invalid long form field: {0}")]
    InvalidLongForm(String),

    #[error("{field}: struct field must be the last field")]
    StructNotLast { field: String },

    #[error("{field}: struct field must be the only variable length field in a message")]
    StructNotSoleVariable { field: String },

    #[error("{owner}.{field}: only fixed length fields allowed in structs")]
    VariableSubfield { owner: String, field: String },

    #[error("{field}: too many flags ({count}, max 32)")]
    TooManyFlags { field: String, count: usize },

    #[error("{field}: flags width {width} is too short (need {required})")]
    FlagsWidthTooSmall {
        field: String,
        width: usize,
        required: usize,
    },

    #[error("{field}: max length {max} smaller than min length {min}")]
    MaxBelowMin { field: String, min: usize, max: usize },

    #[error("{name}: alias target '{target}' not found")]
    UnknownAlias { name: String, target: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub(crate) fn invalid(
        owner: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SchemaError::InvalidAttribute {
            owner: owner.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(owner: impl Into<String>, attribute: impl Into<String>) -> Self {
        SchemaError::MissingAttribute {
            owner: owner.into(),
            attribute: attribute.into(),
        }
    }
}

//! # protogen-schema
//!
//! Message schema model for protogen.
//!
//! This crate provides:
//! - Typed field descriptors and the per-field length algebra
//! - Message layouts with aggregate payload bounds and aliases
//! - The validated, immutable message catalogue
//! - A YAML loader for schema sources

pub mod catalogue;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod message;
pub mod source;

pub use catalogue::Catalogue;
pub use descriptor::{
    DescriptorBody, FieldAttributes, FieldDescriptor, LongField, MessageDescriptor, TypeParams,
};
pub use error::SchemaError;
pub use field::{Field, FieldKind, Format, IntType, PrefixType, SeqType, MAX_FLAGS, MAX_PAYLOAD_LEN};
pub use message::{Layout, MessageDef};
pub use source::SchemaSource;

//! Message model: ordered fields, aggregate length bounds and aliases.

use crate::descriptor::FieldDescriptor;
use crate::error::SchemaError;
use crate::field::{Field, FieldKind, MAX_PAYLOAD_LEN};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The field list of a message together with its payload bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub fields: Vec<Field>,
    pub min_len: usize,
    pub max_len: usize,
}

impl Layout {
    /// Builds a layout from field descriptors, accumulating length bounds.
    pub fn build(owner: &str, descriptors: &[FieldDescriptor]) -> Result<Self, SchemaError> {
        let mut fields = Vec::with_capacity(descriptors.len());
        let mut names = HashSet::new();
        let mut min_len = 0;
        let mut max_len = 0;
        let last = descriptors.len().saturating_sub(1);

        for (idx, desc) in descriptors.iter().enumerate() {
            let field = Field::build(desc, idx == last, min_len, max_len)?;
            if !names.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    owner: owner.to_string(),
                    field: field.name,
                });
            }

            min_len += field.min_len;
            max_len = (max_len + field.max_len).min(MAX_PAYLOAD_LEN);
            fields.push(field);
        }

        Ok(Self {
            fields,
            min_len,
            max_len,
        })
    }

    pub fn is_fixed_len(&self) -> bool {
        self.min_len == self.max_len
    }

    /// Whether the payload length must be checked before decoding fields.
    pub fn has_bounds(&self) -> bool {
        self.min_len > 0 || self.max_len < MAX_PAYLOAD_LEN
    }

    /// Sum of the fixed-length fields.
    pub fn fixed_len(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.is_fixed_len())
            .map(|f| f.min_len)
            .sum()
    }

    /// The trailing struct-array field, if the message has one.
    pub fn struct_field(&self) -> Option<&Field> {
        self.fields
            .last()
            .filter(|f| matches!(f.kind, FieldKind::Struct { .. }))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A message type in the catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDef {
    pub name: String,
    /// Text command name.
    pub command: String,
    /// Numeric message type.
    pub id: u8,
    pub comment: String,
    /// Name of the message whose layout this one reuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Shared with the alias target when `alias` is set.
    pub layout: Arc<Layout>,
}

impl MessageDef {
    pub fn fields(&self) -> &[Field] {
        &self.layout.fields
    }

    pub fn min_len(&self) -> usize {
        self.layout.min_len
    }

    pub fn max_len(&self) -> usize {
        self.layout.max_len
    }

    pub fn is_fixed_len(&self) -> bool {
        self.layout.is_fixed_len()
    }

    pub fn is_alias(&self) -> bool {
        self.alias.is_some()
    }

    /// Maximum struct-array record count, for messages ending in a struct field.
    pub fn max_items(&self) -> Option<usize> {
        self.layout.struct_field().and_then(Field::max_items)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.layout.field(name)
    }
}

impl fmt::Display for MessageDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.comment.lines() {
            writeln!(f, "# {}", line)?;
        }

        if let Some(target) = &self.alias {
            return write!(
                f,
                "{}(name=\"{}\", id={}) --> {}",
                self.name, self.command, self.id, target
            );
        }

        if self.fields().is_empty() {
            return write!(f, "{}(name=\"{}\", id={})", self.name, self.command, self.id);
        }

        if self.is_fixed_len() {
            write!(
                f,
                "{}(name=\"{}\", id={}, len={}):",
                self.name,
                self.command,
                self.id,
                self.min_len()
            )?;
        } else {
            write!(
                f,
                "{}(name=\"{}\", id={}, minlen={}, maxlen={}):",
                self.name,
                self.command,
                self.id,
                self.min_len(),
                self.max_len()
            )?;
        }
        for field in self.fields() {
            write!(f, "\n\t{}", field)?;
        }
        Ok(())
    }
}

//! Parsed schema descriptors.
//!
//! Descriptors are the input of the catalogue builder: the schema source has
//! already been split into messages and fields, but nothing has been
//! validated yet. Fields come in two shapes:
//!
//! ```yaml
//! - name utf8                 # short form: "<field-name> <type>"
//! - flags flags: [auth, mod]  # long form: one "<name> <type>" key holding
//!   length: 2                 #   the type parameters, plus attributes
//! ```

use crate::error::SchemaError;

/// Type parameters attached to the `"<name> <type>"` key of a long-form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeParams {
    /// A scalar parameter, used as the field format (`hex`, `div4`).
    Format(String),
    /// A list parameter, used as the flag names of a flags field.
    List(Vec<String>),
}

/// Optional attributes of a long-form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAttributes {
    pub format: Option<String>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub prefix_type: Option<String>,
    pub length: Option<usize>,
    /// Record type name of a struct field.
    pub struct_name: Option<String>,
    /// Subfields of a struct field.
    pub fields: Option<Vec<FieldDescriptor>>,
}

/// A long-form field descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongField {
    /// The `"<name> <type>"` key.
    pub key: String,
    pub params: Option<TypeParams>,
    pub attributes: FieldAttributes,
}

impl LongField {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            params: None,
            attributes: FieldAttributes::default(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.params = Some(TypeParams::Format(format.into()));
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = Some(TypeParams::List(flags.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_attributes(mut self, attributes: FieldAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_struct(mut self, name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        self.attributes.struct_name = Some(name.into());
        self.attributes.fields = Some(fields);
        self
    }
}

/// A field descriptor in either short or long form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDescriptor {
    Short(String),
    Long(LongField),
}

impl FieldDescriptor {
    pub fn short(spec: impl Into<String>) -> Self {
        FieldDescriptor::Short(spec.into())
    }

    /// Splits the `"<name> <type>"` part into its two tokens.
    pub fn name_and_type(&self) -> Result<(&str, &str), SchemaError> {
        let spec = match self {
            FieldDescriptor::Short(spec) => spec,
            FieldDescriptor::Long(long) => &long.key,
        };
        let mut tokens = spec.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(name), Some(type_name), None) => Ok((name, type_name)),
            _ => Err(match self {
                FieldDescriptor::Short(_) => SchemaError::InvalidShortForm(spec.clone()),
                FieldDescriptor::Long(_) => SchemaError::InvalidLongForm(spec.clone()),
            }),
        }
    }

    pub fn params(&self) -> Option<&TypeParams> {
        match self {
            FieldDescriptor::Short(_) => None,
            FieldDescriptor::Long(long) => long.params.as_ref(),
        }
    }

    pub fn attributes(&self) -> Option<&FieldAttributes> {
        match self {
            FieldDescriptor::Short(_) => None,
            FieldDescriptor::Long(long) => Some(&long.attributes),
        }
    }
}

impl From<LongField> for FieldDescriptor {
    fn from(long: LongField) -> Self {
        FieldDescriptor::Long(long)
    }
}

/// Body of a message descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorBody {
    Fields(Vec<FieldDescriptor>),
    /// Reuse the layout of another message.
    Alias(String),
}

/// A message descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub name: String,
    /// Numeric message type. Must fit the frame's one-byte type field.
    pub id: u32,
    /// Text command name; defaults to the lower-cased message name.
    pub command: Option<String>,
    pub comment: String,
    pub body: DescriptorBody,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>, id: u32, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            id,
            command: None,
            comment: String::new(),
            body: DescriptorBody::Fields(fields),
        }
    }

    pub fn alias(name: impl Into<String>, id: u32, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            command: None,
            comment: String::new(),
            body: DescriptorBody::Alias(target.into()),
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

//! Structured message values.

use protogen_schema::{Field, FieldKind, IntType, MessageDef, SeqType};

/// The value of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer, color and flags fields.
    Int(i64),
    Bool(bool),
    /// `bytes` and `vec_u8` fields.
    Bytes(Vec<u8>),
    /// `utf8` fields.
    Text(String),
    /// `vec_u16` fields.
    Words(Vec<u16>),
    /// Struct arrays: one entry per record, one number per subfield.
    Records(Vec<Vec<i64>>),
}

impl Value {
    /// The zero value of a field.
    pub fn zero(field: &Field) -> Self {
        match &field.kind {
            FieldKind::Integer {
                ty: IntType::Bool, ..
            } => Value::Bool(false),
            FieldKind::Integer { .. } | FieldKind::Flags { .. } => Value::Int(0),
            FieldKind::Sequence { ty, .. } => match ty {
                SeqType::Bytes | SeqType::VecU8 => Value::Bytes(Vec::new()),
                SeqType::VecU16 => Value::Words(Vec::new()),
                SeqType::Utf8 => Value::Text(String::new()),
            },
            FieldKind::Struct { .. } => Value::Records(Vec::new()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_words(&self) -> Option<&[u16]> {
        match self {
            Value::Words(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Vec<i64>]> {
        match self {
            Value::Records(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u16>> for Value {
    fn from(v: Vec<u16>) -> Self {
        Value::Words(v)
    }
}

impl From<Vec<Vec<i64>>> for Value {
    fn from(v: Vec<Vec<i64>>) -> Self {
        Value::Records(v)
    }
}

/// A decoded message instance.
///
/// `values` match the fields of the message type positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub user_id: u8,
    pub message_type: u8,
    pub values: Vec<Value>,
}

impl Message {
    pub fn new(user_id: u8, message_type: u8, values: Vec<Value>) -> Self {
        Self {
            user_id,
            message_type,
            values,
        }
    }

    /// A message of the given type with every field at its zero value.
    pub fn zeroed(def: &MessageDef, user_id: u8) -> Self {
        Self {
            user_id,
            message_type: def.id,
            values: def.fields().iter().map(Value::zero).collect(),
        }
    }

    /// Looks up a field value by name.
    pub fn get<'a>(&'a self, def: &MessageDef, name: &str) -> Option<&'a Value> {
        let idx = def.fields().iter().position(|f| f.name == name)?;
        self.values.get(idx)
    }

    /// Replaces a field value by name. Returns `false` if there is no such field.
    pub fn set(&mut self, def: &MessageDef, name: &str, value: impl Into<Value>) -> bool {
        match def.fields().iter().position(|f| f.name == name) {
            Some(idx) if idx < self.values.len() => {
                self.values[idx] = value.into();
                true
            }
            _ => false,
        }
    }
}

//! Field model and per-field length algebra.
//!
//! Every field knows its exact or bounded encoded length. Fixed-width
//! fields have `min_len == max_len`; variable-length fields are bounded by
//! their length prefix, their declared limits and the room left in a
//! 65535-byte payload after the fields that precede them.

use crate::descriptor::{FieldDescriptor, TypeParams};
use crate::error::SchemaError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 0xffff;

/// Largest number of flags a flags field can hold.
pub const MAX_FLAGS: usize = 32;

/// Fixed-width integer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntType {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    /// 32-bit ARGB color; a plain `u32` on the wire.
    Argb32,
    /// One byte interpreted as zero / non-zero.
    Bool,
}

impl IntType {
    /// Width in bytes.
    pub fn width(self) -> usize {
        match self {
            IntType::I8 | IntType::U8 | IntType::Bool => 1,
            IntType::I16 | IntType::U16 => 2,
            IntType::I32 | IntType::U32 | IntType::Argb32 => 4,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntType::I8 | IntType::I16 | IntType::I32)
    }

    /// Inclusive range of representable values.
    pub fn range(self) -> (i64, i64) {
        match self {
            IntType::I8 => (i8::MIN as i64, i8::MAX as i64),
            IntType::I16 => (i16::MIN as i64, i16::MAX as i64),
            IntType::I32 => (i32::MIN as i64, i32::MAX as i64),
            IntType::U8 => (0, u8::MAX as i64),
            IntType::U16 => (0, u16::MAX as i64),
            IntType::U32 | IntType::Argb32 => (0, u32::MAX as i64),
            IntType::Bool => (0, 1),
        }
    }

    pub fn contains(self, value: i64) -> bool {
        let (min, max) = self.range();
        (min..=max).contains(&value)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            IntType::I8 => "i8",
            IntType::I16 => "i16",
            IntType::I32 => "i32",
            IntType::U8 => "u8",
            IntType::U16 => "u16",
            IntType::U32 => "u32",
            IntType::Argb32 => "argb32",
            IntType::Bool => "bool",
        }
    }
}

/// Element type of a variable-length sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeqType {
    /// Opaque bytes.
    Bytes,
    /// A list of small numbers.
    VecU8,
    /// A list of 16-bit numbers.
    VecU16,
    /// UTF-8 text.
    Utf8,
}

impl SeqType {
    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            SeqType::VecU16 => 2,
            SeqType::Bytes | SeqType::VecU8 | SeqType::Utf8 => 1,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SeqType::Bytes => "bytes",
            SeqType::VecU8 => "vec_u8",
            SeqType::VecU16 => "vec_u16",
            SeqType::Utf8 => "utf8",
        }
    }
}

/// Width of the element count stored before a non-final sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixType {
    U8,
    U16,
}

impl PrefixType {
    pub fn width(self) -> usize {
        match self {
            PrefixType::U8 => 1,
            PrefixType::U16 => 2,
        }
    }

    /// Largest element count the prefix can express.
    pub fn max_count(self) -> usize {
        (1usize << (8 * self.width())) - 1
    }

    fn parse(owner: &str, s: &str) -> Result<Self, SchemaError> {
        match s {
            "u8" => Ok(PrefixType::U8),
            "u16" => Ok(PrefixType::U16),
            other => Err(SchemaError::invalid(
                owner,
                "prefix_type",
                format!("prefix type can only be u8 or u16, got '{}'", other),
            )),
        }
    }
}

/// Text representation of a numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Plain,
    /// Text value is the raw value divided by N.
    Div(u32),
    /// Zero-padded lowercase hex with a `0x` prefix.
    Hex,
}

impl Format {
    pub fn parse(owner: &str, s: &str) -> Result<Self, SchemaError> {
        match s {
            "" => Ok(Format::Plain),
            "hex" => Ok(Format::Hex),
            s if s.starts_with("div") => match s[3..].parse::<u32>() {
                Ok(n) if n > 0 => Ok(Format::Div(n)),
                _ => Err(SchemaError::invalid(
                    owner,
                    "format",
                    format!("invalid divisor in '{}'", s),
                )),
            },
            other => Err(SchemaError::invalid(
                owner,
                "format",
                format!("unknown format '{}'", other),
            )),
        }
    }
}

/// Variant-specific part of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Integer {
        ty: IntType,
        format: Format,
    },
    Flags {
        /// Flag names; flag `i` is bit `1 << i`.
        flags: Vec<String>,
        /// Storage width in bytes (1, 2 or 4).
        width: usize,
    },
    Sequence {
        ty: SeqType,
        /// `None` when the field is last and takes the rest of the payload.
        prefix: Option<PrefixType>,
        format: Format,
    },
    Struct {
        struct_name: String,
        subfields: Vec<Field>,
        item_len: usize,
        max_items: usize,
    },
}

/// A typed field with its byte-length bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub min_len: usize,
    pub max_len: usize,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// Schema type keyword, resolved through a fixed table.
enum TypeKeyword {
    Int(IntType),
    Flags,
    Seq(SeqType),
    Struct,
}

impl TypeKeyword {
    fn lookup(keyword: &str) -> Option<Self> {
        let kw = match keyword {
            "i8" => TypeKeyword::Int(IntType::I8),
            "i16" => TypeKeyword::Int(IntType::I16),
            "i32" => TypeKeyword::Int(IntType::I32),
            "u8" => TypeKeyword::Int(IntType::U8),
            "u16" => TypeKeyword::Int(IntType::U16),
            "u32" => TypeKeyword::Int(IntType::U32),
            "argb32" => TypeKeyword::Int(IntType::Argb32),
            "bool" => TypeKeyword::Int(IntType::Bool),
            "flags" => TypeKeyword::Flags,
            "bytes" => TypeKeyword::Seq(SeqType::Bytes),
            "vec_u8" => TypeKeyword::Seq(SeqType::VecU8),
            "vec_u16" => TypeKeyword::Seq(SeqType::VecU16),
            "utf8" => TypeKeyword::Seq(SeqType::Utf8),
            "struct" => TypeKeyword::Struct,
            _ => return None,
        };
        Some(kw)
    }
}

impl Field {
    /// Builds a field from its descriptor.
    ///
    /// `prev_min` and `prev_max` are the running length totals of the
    /// fields that precede this one in its message.
    pub fn build(
        desc: &FieldDescriptor,
        is_last: bool,
        prev_min: usize,
        prev_max: usize,
    ) -> Result<Self, SchemaError> {
        let (name, type_name) = desc.name_and_type()?;
        let keyword = TypeKeyword::lookup(type_name).ok_or_else(|| SchemaError::UnknownType {
            field: name.to_string(),
            type_name: type_name.to_string(),
        })?;

        match keyword {
            TypeKeyword::Int(ty) => Self::integer(name, ty, desc),
            TypeKeyword::Flags => Self::flags_field(name, desc),
            TypeKeyword::Seq(ty) => Self::sequence(name, ty, desc, is_last, prev_min),
            TypeKeyword::Struct => Self::struct_field(name, desc, is_last, prev_min, prev_max),
        }
    }

    fn integer(name: &str, ty: IntType, desc: &FieldDescriptor) -> Result<Self, SchemaError> {
        let format = field_format(name, desc)?;
        if ty == IntType::Bool && format != Format::Plain {
            return Err(SchemaError::invalid(
                name,
                "format",
                "bool fields have no alternative format",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            min_len: ty.width(),
            max_len: ty.width(),
            kind: FieldKind::Integer { ty, format },
        })
    }

    fn flags_field(name: &str, desc: &FieldDescriptor) -> Result<Self, SchemaError> {
        let flags = match desc.params() {
            Some(TypeParams::List(flags)) => flags.clone(),
            Some(TypeParams::Format(_)) => {
                return Err(SchemaError::invalid(
                    name,
                    "_type_params",
                    "flags field expects a list of flag names",
                ))
            }
            None => return Err(SchemaError::missing(name, "_type_params")),
        };

        let mut seen = HashSet::new();
        for flag in &flags {
            if !seen.insert(flag.as_str()) {
                return Err(SchemaError::DuplicateField {
                    owner: name.to_string(),
                    field: flag.clone(),
                });
            }
        }

        let required = match flags.len() {
            0..=8 => 1,
            9..=16 => 2,
            17..=MAX_FLAGS => 4,
            count => {
                return Err(SchemaError::TooManyFlags {
                    field: name.to_string(),
                    count,
                })
            }
        };

        let width = match desc.attributes().and_then(|a| a.length) {
            Some(width) if width < required => {
                return Err(SchemaError::FlagsWidthTooSmall {
                    field: name.to_string(),
                    width,
                    required,
                })
            }
            Some(width) if !matches!(width, 1 | 2 | 4) => {
                return Err(SchemaError::invalid(
                    name,
                    "length",
                    format!("unsupported flags field width {}", width),
                ))
            }
            Some(width) => width,
            None => required,
        };

        Ok(Self {
            name: name.to_string(),
            min_len: width,
            max_len: width,
            kind: FieldKind::Flags { flags, width },
        })
    }

    fn sequence(
        name: &str,
        ty: SeqType,
        desc: &FieldDescriptor,
        is_last: bool,
        prev_min: usize,
    ) -> Result<Self, SchemaError> {
        let format = field_format(name, desc)?;
        match format {
            Format::Div(_) => {
                return Err(SchemaError::invalid(
                    name,
                    "format",
                    "scaling is only supported on integer fields",
                ))
            }
            Format::Hex if ty != SeqType::VecU16 => {
                return Err(SchemaError::invalid(
                    name,
                    "format",
                    "hex format is only supported on integer and vec_u16 fields",
                ))
            }
            _ => {}
        }

        let attrs = desc.attributes().cloned().unwrap_or_default();
        let esize = ty.element_size();
        let declared_min = attrs.min_len.unwrap_or(0);
        let room = MAX_PAYLOAD_LEN.saturating_sub(prev_min);
        let min_bytes = |pw: usize| {
            declared_min
                .checked_mul(esize)
                .and_then(|n| n.checked_add(pw))
                .ok_or_else(|| SchemaError::invalid(name, "min_len", "declared length too large"))
        };

        let (prefix, min_len, max_len) = if is_last {
            let mut count = room / esize;
            if let Some(declared_max) = attrs.max_len {
                count = count.min(declared_max);
            }
            (None, min_bytes(0)?, count * esize)
        } else {
            let prefix = match attrs.prefix_type.as_deref() {
                Some(p) => PrefixType::parse(name, p)?,
                None => PrefixType::U8,
            };
            let pw = prefix.width();
            let max_len = if room < pw {
                room
            } else {
                let mut count = prefix.max_count().min((room - pw) / esize);
                if let Some(declared_max) = attrs.max_len {
                    count = count.min(declared_max);
                }
                pw + count * esize
            };
            (Some(prefix), min_bytes(pw)?, max_len)
        };

        if max_len < min_len {
            return Err(SchemaError::MaxBelowMin {
                field: name.to_string(),
                min: min_len,
                max: max_len,
            });
        }

        Ok(Self {
            name: name.to_string(),
            min_len,
            max_len,
            kind: FieldKind::Sequence { ty, prefix, format },
        })
    }

    fn struct_field(
        name: &str,
        desc: &FieldDescriptor,
        is_last: bool,
        prev_min: usize,
        prev_max: usize,
    ) -> Result<Self, SchemaError> {
        if !is_last {
            return Err(SchemaError::StructNotLast {
                field: name.to_string(),
            });
        }
        if prev_min != prev_max {
            return Err(SchemaError::StructNotSoleVariable {
                field: name.to_string(),
            });
        }

        let attrs = desc
            .attributes()
            .ok_or_else(|| SchemaError::missing(name, "name"))?;
        let struct_name = attrs
            .struct_name
            .clone()
            .ok_or_else(|| SchemaError::missing(name, "name"))?;
        let descriptors = attrs
            .fields
            .as_ref()
            .ok_or_else(|| SchemaError::missing(name, "fields"))?;

        let mut subfields = Vec::with_capacity(descriptors.len());
        let mut names = HashSet::new();
        let mut item_len = 0;

        for sub in descriptors {
            // Subfields are never "last": a variable subfield would get a
            // prefix and fail the fixed-length check below.
            let subfield = Field::build(sub, false, item_len, item_len)?;
            if !names.insert(subfield.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    owner: name.to_string(),
                    field: subfield.name,
                });
            }
            // Records are number arrays: no sequences, even fixed ones.
            if !subfield.is_fixed_len() || matches!(subfield.kind, FieldKind::Sequence { .. }) {
                return Err(SchemaError::VariableSubfield {
                    owner: name.to_string(),
                    field: subfield.name,
                });
            }
            item_len += subfield.min_len;
            subfields.push(subfield);
        }

        if item_len == 0 {
            return Err(SchemaError::invalid(
                name,
                "fields",
                "struct must have at least one subfield",
            ));
        }

        let max_len = MAX_PAYLOAD_LEN.saturating_sub(prev_min) / item_len * item_len;

        Ok(Self {
            name: name.to_string(),
            min_len: 0,
            max_len,
            kind: FieldKind::Struct {
                struct_name,
                subfields,
                item_len,
                max_items: max_len / item_len,
            },
        })
    }

    pub fn is_fixed_len(&self) -> bool {
        self.min_len == self.max_len
    }

    /// The field's text format. Flags and struct fields are always plain.
    pub fn format(&self) -> Format {
        match &self.kind {
            FieldKind::Integer { format, .. } | FieldKind::Sequence { format, .. } => *format,
            FieldKind::Flags { .. } | FieldKind::Struct { .. } => Format::Plain,
        }
    }

    /// Flag names of a flags field, in bit order. Empty for other fields.
    pub fn flags(&self) -> &[String] {
        match &self.kind {
            FieldKind::Flags { flags, .. } => flags,
            _ => &[],
        }
    }

    /// Bit mask of the named flag.
    pub fn flag_mask(&self, flag: &str) -> Option<u32> {
        self.flags()
            .iter()
            .position(|f| f == flag)
            .map(|index| 1u32 << index)
    }

    /// Maximum record count of a struct field.
    pub fn max_items(&self) -> Option<usize> {
        match &self.kind {
            FieldKind::Struct { max_items, .. } => Some(*max_items),
            _ => None,
        }
    }

    /// Schema type keyword of this field.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            FieldKind::Integer { ty, .. } => ty.keyword(),
            FieldKind::Flags { width, .. } => match width {
                1 => "u8",
                2 => "u16",
                _ => "u32",
            },
            FieldKind::Sequence { ty, .. } => ty.keyword(),
            FieldKind::Struct { .. } => "struct",
        }
    }
}

fn field_format(name: &str, desc: &FieldDescriptor) -> Result<Format, SchemaError> {
    let explicit = desc.attributes().and_then(|a| a.format.as_deref());
    match (explicit, desc.params()) {
        (Some(format), _) => Format::parse(name, format),
        (None, Some(TypeParams::Format(format))) => Format::parse(name, format),
        (None, Some(TypeParams::List(_))) => Err(SchemaError::invalid(
            name,
            "_type_params",
            "a list parameter is only valid for flags fields",
        )),
        (None, None) => Ok(Format::Plain),
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed_len() {
            write!(f, "[{}] {}: ", self.min_len, self.name)?;
        } else {
            write!(f, "[{}-{}] {}: ", self.min_len, self.max_len, self.name)?;
        }

        match &self.kind {
            FieldKind::Integer { .. } => f.write_str(self.type_name()),
            FieldKind::Flags { flags, .. } => {
                write!(f, "{} {:?}", self.type_name(), flags)
            }
            FieldKind::Sequence {
                ty,
                prefix: Some(prefix),
                ..
            } => {
                let prefix = match prefix {
                    PrefixType::U8 => "u8",
                    PrefixType::U16 => "u16",
                };
                write!(f, "{} + {}", prefix, ty.keyword())
            }
            FieldKind::Sequence { ty, prefix: None, .. } => f.write_str(ty.keyword()),
            FieldKind::Struct {
                struct_name,
                subfields,
                max_items,
                ..
            } => {
                write!(f, "struct {} * 0..{}", struct_name, max_items)?;
                for sub in subfields {
                    write!(f, "\n\t\t{}", sub)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldAttributes, LongField};

    fn build(desc: impl Into<FieldDescriptor>, is_last: bool, prev: usize) -> Field {
        Field::build(&desc.into(), is_last, prev, prev).unwrap()
    }

    fn short(spec: &str) -> FieldDescriptor {
        FieldDescriptor::short(spec)
    }

    #[test]
    fn test_integer_widths() {
        for (spec, width) in [
            ("a i8", 1),
            ("a u8", 1),
            ("a bool", 1),
            ("a i16", 2),
            ("a u16", 2),
            ("a i32", 4),
            ("a u32", 4),
            ("a argb32", 4),
        ] {
            let field = build(short(spec), false, 0);
            assert_eq!(field.min_len, width, "{}", spec);
            assert_eq!(field.max_len, width, "{}", spec);
            assert!(field.is_fixed_len());
        }
    }

    #[test]
    fn test_integer_format_from_params() {
        let field = build(LongField::new("layer u16").with_format("hex"), false, 0);
        assert_eq!(field.format(), Format::Hex);

        let field = build(LongField::new("x i32").with_format("div4"), false, 0);
        assert_eq!(field.format(), Format::Div(4));
    }

    #[test]
    fn test_invalid_formats() {
        let desc: FieldDescriptor = LongField::new("x i32").with_format("div0").into();
        assert!(matches!(
            Field::build(&desc, false, 0, 0),
            Err(SchemaError::InvalidAttribute { .. })
        ));

        let desc: FieldDescriptor = LongField::new("name utf8").with_format("div4").into();
        assert!(Field::build(&desc, true, 0, 0).is_err());

        let desc: FieldDescriptor = LongField::new("on bool").with_format("hex").into();
        assert!(Field::build(&desc, false, 0, 0).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let result = Field::build(&short("x float"), false, 0, 0);
        assert!(matches!(result, Err(SchemaError::UnknownType { .. })));
    }

    #[test]
    fn test_flags_minimum_width() {
        let names = |n: usize| (0..n).map(|i| format!("f{}", i)).collect::<Vec<_>>();

        let field = build(LongField::new("f flags").with_flags(names(8)), false, 0);
        assert_eq!(field.min_len, 1);
        let field = build(LongField::new("f flags").with_flags(names(9)), false, 0);
        assert_eq!(field.min_len, 2);
        let field = build(LongField::new("f flags").with_flags(names(17)), false, 0);
        assert_eq!(field.min_len, 4);
        assert_eq!(field.type_name(), "u32");

        let desc: FieldDescriptor = LongField::new("f flags").with_flags(names(33)).into();
        assert!(matches!(
            Field::build(&desc, false, 0, 0),
            Err(SchemaError::TooManyFlags { count: 33, .. })
        ));
    }

    #[test]
    fn test_flags_declared_width() {
        let wide = LongField::new("f flags")
            .with_flags(["a", "b"])
            .with_attributes(FieldAttributes {
                length: Some(4),
                ..Default::default()
            });
        let field = build(wide, false, 0);
        assert_eq!(field.min_len, 4);

        let names: Vec<String> = (0..10).map(|i| format!("f{}", i)).collect();
        let narrow: FieldDescriptor = LongField::new("f flags")
            .with_flags(names)
            .with_attributes(FieldAttributes {
                length: Some(1),
                ..Default::default()
            })
            .into();
        assert!(matches!(
            Field::build(&narrow, false, 0, 0),
            Err(SchemaError::FlagsWidthTooSmall {
                width: 1,
                required: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_flag_masks() {
        let field = build(LongField::new("f flags").with_flags(["a", "b", "c"]), false, 0);
        assert_eq!(field.flag_mask("a"), Some(0b001));
        assert_eq!(field.flag_mask("b"), Some(0b010));
        assert_eq!(field.flag_mask("c"), Some(0b100));
        assert_eq!(field.flag_mask("d"), None);
    }

    #[test]
    fn test_prefixed_sequence_bounds() {
        let field = build(short("name utf8"), false, 1);
        assert_eq!(field.min_len, 1);
        assert_eq!(field.max_len, 256);
        assert!(matches!(
            field.kind,
            FieldKind::Sequence {
                prefix: Some(PrefixType::U8),
                ..
            }
        ));

        let long = LongField::new("name utf8").with_attributes(FieldAttributes {
            prefix_type: Some("u16".to_string()),
            ..Default::default()
        });
        let field = build(long, false, 10);
        assert_eq!(field.min_len, 2);
        assert_eq!(field.max_len, MAX_PAYLOAD_LEN - 10);
    }

    #[test]
    fn test_prefixed_sequence_declared_bounds() {
        let long = LongField::new("title utf8").with_attributes(FieldAttributes {
            min_len: Some(1),
            max_len: Some(32),
            ..Default::default()
        });
        let field = build(long, false, 0);
        assert_eq!(field.min_len, 2);
        assert_eq!(field.max_len, 33);
    }

    #[test]
    fn test_u16_sequence_counts_elements() {
        let field = build(short("layers vec_u16"), false, 0);
        assert_eq!(field.min_len, 1);
        assert_eq!(field.max_len, 1 + 255 * 2);

        let field = build(short("layers vec_u16"), true, 1);
        assert_eq!(field.max_len, (MAX_PAYLOAD_LEN - 1) / 2 * 2);
    }

    #[test]
    fn test_max_below_min_rejected() {
        let long: FieldDescriptor = LongField::new("name utf8")
            .with_attributes(FieldAttributes {
                min_len: Some(10),
                max_len: Some(5),
                ..Default::default()
            })
            .into();
        assert!(matches!(
            Field::build(&long, false, 0, 0),
            Err(SchemaError::MaxBelowMin { .. })
        ));
    }

    #[test]
    fn test_invalid_prefix_type() {
        let long: FieldDescriptor = LongField::new("name utf8")
            .with_attributes(FieldAttributes {
                prefix_type: Some("u32".to_string()),
                ..Default::default()
            })
            .into();
        assert!(matches!(
            Field::build(&long, false, 0, 0),
            Err(SchemaError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_last_sequence_takes_remaining_payload() {
        let field = build(short("data bytes"), true, 19);
        assert_eq!(field.min_len, 0);
        assert_eq!(field.max_len, MAX_PAYLOAD_LEN - 19);
        assert!(matches!(
            field.kind,
            FieldKind::Sequence { prefix: None, .. }
        ));
    }

    fn dab_struct() -> LongField {
        LongField::new("dabs struct").with_struct(
            "ClassicDab",
            vec![
                LongField::new("x i8").with_format("div4").into(),
                LongField::new("y i8").with_format("div4").into(),
                LongField::new("size u16").with_format("div256").into(),
                short("opacity u8"),
                short("hardness u8"),
            ],
        )
    }

    #[test]
    fn test_struct_bounds() {
        let field = build(dab_struct(), true, 15);
        assert_eq!(field.min_len, 0);
        match &field.kind {
            FieldKind::Struct {
                item_len,
                max_items,
                ..
            } => {
                assert_eq!(*item_len, 6);
                assert_eq!(*max_items, 10920);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(field.max_len, 10920 * 6);
        assert_eq!(field.max_items(), Some(10920));
    }

    #[test]
    fn test_struct_must_be_last() {
        let desc: FieldDescriptor = dab_struct().into();
        assert!(matches!(
            Field::build(&desc, false, 0, 0),
            Err(SchemaError::StructNotLast { .. })
        ));
    }

    #[test]
    fn test_struct_must_be_sole_variable_field() {
        let desc: FieldDescriptor = dab_struct().into();
        assert!(matches!(
            Field::build(&desc, true, 1, 256),
            Err(SchemaError::StructNotSoleVariable { .. })
        ));
    }

    #[test]
    fn test_struct_rejects_variable_subfield() {
        let desc: FieldDescriptor = LongField::new("items struct")
            .with_struct("Item", vec![short("x u8"), short("label utf8")])
            .into();
        assert!(matches!(
            Field::build(&desc, true, 0, 0),
            Err(SchemaError::VariableSubfield { .. })
        ));
    }

    #[test]
    fn test_struct_rejects_duplicate_subfield() {
        let desc: FieldDescriptor = LongField::new("items struct")
            .with_struct("Item", vec![short("x u8"), short("x u16")])
            .into();
        assert!(matches!(
            Field::build(&desc, true, 0, 0),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_struct_requires_name() {
        let mut long = dab_struct();
        long.attributes.struct_name = None;
        let desc: FieldDescriptor = long.into();
        assert!(matches!(
            Field::build(&desc, true, 0, 0),
            Err(SchemaError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_display() {
        let field = build(short("name utf8"), false, 1);
        assert_eq!(field.to_string(), "[1-256] name: u8 + utf8");

        let field = build(short("layer u16"), false, 0);
        assert_eq!(field.to_string(), "[2] layer: u16");
    }

    #[test]
    fn test_oversized_declared_min_len() {
        for (spec, is_last) in [("a vec_u16", true), ("a vec_u16", false), ("a bytes", false)] {
            let desc: FieldDescriptor = LongField::new(spec)
                .with_attributes(FieldAttributes {
                    min_len: Some(usize::MAX),
                    ..Default::default()
                })
                .into();
            let err = Field::build(&desc, is_last, 0, 0).unwrap_err();
            assert!(matches!(
                err,
                SchemaError::InvalidAttribute { ref attribute, .. } if attribute == "min_len"
            ));
        }
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn seq_type() -> impl Strategy<Value = &'static str> {
            prop_oneof![Just("bytes"), Just("vec_u8"), Just("vec_u16"), Just("utf8")]
        }

        fn prefix_type() -> impl Strategy<Value = &'static str> {
            prop_oneof![Just("u8"), Just("u16")]
        }

        proptest! {
            #[test]
            fn sequence_bounds_fit_payload(
                ty in seq_type(),
                prefix in prefix_type(),
                is_last in any::<bool>(),
                prev in 0usize..=MAX_PAYLOAD_LEN,
                declared_max in proptest::option::of(0usize..70000),
            ) {
                let desc: FieldDescriptor = LongField::new(format!("data {}", ty))
                    .with_attributes(FieldAttributes {
                        prefix_type: Some(prefix.to_string()),
                        max_len: declared_max,
                        ..Default::default()
                    })
                    .into();

                if let Ok(field) = Field::build(&desc, is_last, prev, prev) {
                    prop_assert!(field.min_len <= field.max_len);
                    prop_assert!(field.max_len <= MAX_PAYLOAD_LEN - prev);

                    if let FieldKind::Sequence { ty, prefix, .. } = &field.kind {
                        let esize = ty.element_size();
                        let pw = prefix.map_or(0, |p| p.width());
                        let count = (field.max_len - pw) / esize;
                        prop_assert_eq!((field.max_len - pw) % esize, 0);
                        if let Some(p) = prefix {
                            prop_assert!(count <= p.max_count());
                        }
                        if let Some(declared) = declared_max {
                            prop_assert!(count <= declared);
                        }
                    } else {
                        prop_assert!(false, "not a sequence field");
                    }
                }
            }

            #[test]
            fn declared_min_beyond_payload_is_rejected(
                ty in seq_type(),
                is_last in any::<bool>(),
                declared_min in (MAX_PAYLOAD_LEN + 1)..=usize::MAX,
            ) {
                let desc: FieldDescriptor = LongField::new(format!("data {}", ty))
                    .with_attributes(FieldAttributes {
                        min_len: Some(declared_min),
                        ..Default::default()
                    })
                    .into();
                prop_assert!(Field::build(&desc, is_last, 0, 0).is_err());
            }

            #[test]
            fn integer_range_matches_width(value in any::<i64>()) {
                let types = [
                    IntType::I8,
                    IntType::U8,
                    IntType::I16,
                    IntType::U16,
                    IntType::I32,
                    IntType::U32,
                ];
                for ty in types {
                    let bits = 8 * ty.width() as u32;
                    let expected = if ty.is_signed() {
                        let half = 1i64 << (bits - 1);
                        (-half..half).contains(&value)
                    } else {
                        (0..(1i64 << bits)).contains(&value)
                    };
                    prop_assert_eq!(ty.contains(value), expected);
                }
            }
        }
    }
}

//! Text codec: message values to and from text commands.
//!
//! A text command is a command name, an ordered list of `key=value` pairs
//! and, for messages ending in a struct array, a list of numeric records.
//! Field values are rendered according to the field type and format:
//!
//! | field                  | text                                    |
//! |------------------------|-----------------------------------------|
//! | integer                | decimal                                 |
//! | integer, `div<N>`      | raw / N as a decimal fraction           |
//! | integer, `hex`         | `0x` + zero-padded lowercase hex        |
//! | `bool`                 | `true` / `false`                        |
//! | `argb32`               | `#rrggbb`, or `#aarrggbb` unless opaque |
//! | flags                  | comma-separated flag names              |
//! | `utf8`                 | as-is                                   |
//! | `bytes`                | base64                                  |
//! | `vec_u8`, `vec_u16`    | comma-separated numbers                 |

use crate::binary::Codec;
use crate::error::TextError;
use crate::value::{Message, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use protogen_schema::{Field, FieldKind, Format, IntType, SeqType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What to do with flag names a flags field does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagPolicy {
    /// Skip unknown names.
    #[default]
    Ignore,
    /// Fail with [`TextError::UnknownFlag`].
    Reject,
}

impl FromStr for FlagPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(FlagPolicy::Ignore),
            "reject" => Ok(FlagPolicy::Reject),
            other => Err(format!("unknown flag policy '{}' (expected ignore or reject)", other)),
        }
    }
}

/// Parsing options for text commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    pub unknown_flags: FlagPolicy,
    /// Reject records whose value count does not match the struct,
    /// instead of skipping them.
    pub strict_records: bool,
}

/// A message in its text form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMessage {
    pub user_id: u8,
    /// Command name.
    pub name: String,
    pub args: Vec<(String, String)>,
    /// Struct-array records.
    pub dabs: Vec<Vec<f64>>,
}

impl TextMessage {
    pub fn new(user_id: u8, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            args: Vec::new(),
            dabs: Vec::new(),
        }
    }

    /// Appends an argument. Empty values are left out.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.args.push((key.into(), value));
        }
        self
    }

    pub fn with_dabs(mut self, dabs: Vec<Vec<f64>>) -> Self {
        self.dabs = dabs;
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Codec<'_> {
    /// Converts a message into its text form.
    pub fn to_text(&self, msg: &Message) -> Result<TextMessage, TextError> {
        let def = self
            .catalogue()
            .by_id(msg.message_type)
            .ok_or(TextError::UnknownType(msg.message_type))?;

        if msg.values.len() != def.fields().len() {
            return Err(TextError::FieldCount {
                expected: def.fields().len(),
                actual: msg.values.len(),
            });
        }

        let mut text = TextMessage::new(msg.user_id, def.command.as_str());
        for (field, value) in def.fields().iter().zip(&msg.values) {
            match (&field.kind, value) {
                (FieldKind::Struct { subfields, .. }, Value::Records(records)) => {
                    text.dabs = records
                        .iter()
                        .map(|record| {
                            subfields
                                .iter()
                                .zip(record)
                                .map(|(sub, v)| scale_down(sub.format(), *v))
                                .collect()
                        })
                        .collect();
                }
                _ => {
                    let rendered = render_value(field, value)?;
                    text = text.set(field.name.as_str(), rendered);
                }
            }
        }
        Ok(text)
    }

    /// Converts a text command into a message.
    ///
    /// Missing arguments take the field's zero value; arguments that name
    /// no field are ignored.
    pub fn from_text(&self, text: &TextMessage) -> Result<Message, TextError> {
        let def = self
            .catalogue()
            .by_command(&text.name)
            .ok_or_else(|| TextError::UnknownCommand(text.name.clone()))?;

        let mut values = Vec::with_capacity(def.fields().len());
        for field in def.fields() {
            let value = match (&field.kind, text.get(&field.name)) {
                (FieldKind::Struct { .. }, _) => self.parse_records(field, &text.dabs)?,
                (_, Some(s)) => self.parse_value(field, s)?,
                (_, None) => Value::zero(field),
            };
            values.push(value);
        }

        for (key, _) in &text.args {
            if def.field(key).is_none() {
                tracing::debug!(command = %text.name, key = %key, "ignoring unknown argument");
            }
        }

        Ok(Message::new(text.user_id, def.id, values))
    }

    fn parse_value(&self, field: &Field, s: &str) -> Result<Value, TextError> {
        match &field.kind {
            FieldKind::Integer {
                ty: IntType::Bool, ..
            } => Ok(Value::Bool(s == "true")),
            FieldKind::Integer {
                ty: IntType::Argb32,
                format: Format::Plain,
            } => parse_argb32(field, s).map(Value::Int),
            FieldKind::Integer { ty, format } => parse_int(field, *ty, *format, s).map(Value::Int),
            FieldKind::Flags { flags, .. } => self.parse_flags(field, flags, s).map(Value::Int),
            FieldKind::Sequence { ty, .. } => match ty {
                SeqType::Utf8 => Ok(Value::Text(s.to_string())),
                SeqType::Bytes => BASE64
                    .decode(s)
                    .map(Value::Bytes)
                    .map_err(|_| TextError::invalid(&field.name, s)),
                SeqType::VecU8 => parse_list(field, s, IntType::U8)
                    .map(|list| Value::Bytes(list.into_iter().map(|v| v as u8).collect())),
                SeqType::VecU16 => parse_list(field, s, IntType::U16)
                    .map(|list| Value::Words(list.into_iter().map(|v| v as u16).collect())),
            },
            FieldKind::Struct { .. } => Err(TextError::TypeMismatch {
                field: field.name.clone(),
            }),
        }
    }

    fn parse_flags(&self, field: &Field, flags: &[String], s: &str) -> Result<i64, TextError> {
        let mut bits = 0i64;
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match flags.iter().position(|f| f == name) {
                Some(index) => bits |= 1 << index,
                None if self.options().unknown_flags == FlagPolicy::Reject => {
                    return Err(TextError::UnknownFlag {
                        field: field.name.clone(),
                        flag: name.to_string(),
                    });
                }
                None => {
                    tracing::warn!(field = %field.name, flag = %name, "ignoring unknown flag");
                }
            }
        }
        Ok(bits)
    }

    fn parse_records(&self, field: &Field, dabs: &[Vec<f64>]) -> Result<Value, TextError> {
        let subfields = match &field.kind {
            FieldKind::Struct { subfields, .. } => subfields,
            _ => {
                return Err(TextError::TypeMismatch {
                    field: field.name.clone(),
                })
            }
        };

        let mut records = Vec::with_capacity(dabs.len());
        for dab in dabs {
            if dab.len() != subfields.len() {
                if self.options().strict_records {
                    return Err(TextError::RecordArity {
                        field: field.name.clone(),
                        expected: subfields.len(),
                        actual: dab.len(),
                    });
                }
                tracing::warn!(
                    field = %field.name,
                    expected = subfields.len(),
                    actual = dab.len(),
                    "skipping malformed record"
                );
                continue;
            }

            let record = subfields
                .iter()
                .zip(dab)
                .map(|(sub, x)| scale_up(sub, *x))
                .collect::<Result<Vec<_>, _>>()?;
            records.push(record);
        }
        Ok(Value::Records(records))
    }
}

fn render_value(field: &Field, value: &Value) -> Result<String, TextError> {
    let mismatch = || TextError::TypeMismatch {
        field: field.name.clone(),
    };

    let rendered = match (&field.kind, value) {
        (
            FieldKind::Integer {
                ty: IntType::Bool, ..
            },
            Value::Bool(v),
        ) => v.to_string(),
        (
            FieldKind::Integer {
                ty: IntType::Argb32,
                format: Format::Plain,
            },
            Value::Int(v),
        ) => format_argb32(*v as u32),
        (FieldKind::Integer { ty, format }, Value::Int(v)) => format_int(*ty, *format, *v),
        (FieldKind::Flags { flags, .. }, Value::Int(v)) => flags
            .iter()
            .enumerate()
            .filter(|(index, _)| v & (1 << index) != 0)
            .map(|(_, name)| name.as_str())
            .collect::<Vec<_>>()
            .join(","),
        (FieldKind::Sequence { ty, format, .. }, value) => match (ty, value) {
            (SeqType::Utf8, Value::Text(v)) => v.clone(),
            (SeqType::Bytes, Value::Bytes(v)) => BASE64.encode(v),
            (SeqType::VecU8, Value::Bytes(v)) => join_list(v.iter().map(|b| b.to_string())),
            (SeqType::VecU16, Value::Words(v)) if *format == Format::Hex => {
                join_list(v.iter().map(|w| format!("0x{:04x}", w)))
            }
            (SeqType::VecU16, Value::Words(v)) => join_list(v.iter().map(|w| w.to_string())),
            _ => return Err(mismatch()),
        },
        _ => return Err(mismatch()),
    };
    Ok(rendered)
}

fn join_list(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(",")
}

fn format_int(ty: IntType, format: Format, v: i64) -> String {
    match format {
        Format::Plain => v.to_string(),
        Format::Div(n) => (v as f64 / n as f64).to_string(),
        Format::Hex => {
            let digits = ty.width() * 2;
            let mask = (1u64 << (8 * ty.width())) - 1;
            format!("0x{:0width$x}", (v as u64) & mask, width = digits)
        }
    }
}

fn format_argb32(color: u32) -> String {
    if color >> 24 == 0xff {
        format!("#{:06x}", color & 0x00ff_ffff)
    } else {
        format!("#{:08x}", color)
    }
}

fn scale_down(format: Format, v: i64) -> f64 {
    match format {
        Format::Div(n) => v as f64 / n as f64,
        _ => v as f64,
    }
}

/// Parses a decimal or `0x`-prefixed hex integer.
fn parse_number(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_int(field: &Field, ty: IntType, format: Format, s: &str) -> Result<i64, TextError> {
    let value = match format {
        Format::Div(n) => {
            let x: f64 = s
                .trim()
                .parse()
                .map_err(|_| TextError::invalid(&field.name, s))?;
            let scaled = (x * n as f64).round();
            if !scaled.is_finite() {
                return Err(TextError::invalid(&field.name, s));
            }
            scaled as i64
        }
        Format::Hex | Format::Plain => {
            let v = parse_number(s).ok_or_else(|| TextError::invalid(&field.name, s))?;
            // Hex text of a signed field is its bit pattern.
            let bits = 8 * ty.width() as u32;
            let is_hex = s.trim().starts_with("0x") || s.trim().starts_with("0X");
            let is_pattern = is_hex && ty.is_signed() && (v as u64) < (1u64 << bits);
            if is_pattern && !ty.contains(v) {
                v - (1i64 << bits)
            } else {
                v
            }
        }
    };

    if !ty.contains(value) {
        return Err(TextError::out_of_range(&field.name, s));
    }
    Ok(value)
}

fn parse_argb32(field: &Field, s: &str) -> Result<i64, TextError> {
    let s = s.trim();
    let value = match s.strip_prefix('#') {
        Some(hex) if hex.len() == 6 => u32::from_str_radix(hex, 16).ok().map(|rgb| 0xff00_0000 | rgb),
        Some(hex) if hex.len() == 8 => u32::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => parse_number(s).and_then(|v| u32::try_from(v).ok()),
    };
    value
        .map(i64::from)
        .ok_or_else(|| TextError::invalid(&field.name, s))
}

fn parse_list(field: &Field, s: &str, ty: IntType) -> Result<Vec<i64>, TextError> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let v = parse_number(item).ok_or_else(|| TextError::invalid(&field.name, item))?;
            if !ty.contains(v) {
                return Err(TextError::out_of_range(&field.name, item));
            }
            Ok(v)
        })
        .collect()
}

/// Converts one record value back to the raw integer of a subfield.
fn scale_up(field: &Field, x: f64) -> Result<i64, TextError> {
    let scaled = match field.format() {
        Format::Div(n) => (x * n as f64).round(),
        _ => x.round(),
    };
    if !scaled.is_finite() {
        return Err(TextError::invalid(&field.name, x.to_string()));
    }

    let value = scaled as i64;
    let in_range = match &field.kind {
        FieldKind::Integer { ty, .. } => ty.contains(value),
        FieldKind::Flags { width, .. } => (0..(1i64 << (8 * width))).contains(&value),
        _ => false,
    };
    if !in_range {
        return Err(TextError::out_of_range(&field.name, x));
    }
    Ok(value)
}

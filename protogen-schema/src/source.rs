//! YAML schema source.
//!
//! The schema is a single mapping, read in file order. The `_protocol` key
//! carries metadata; every other key names a message:
//!
//! ```yaml
//! _protocol:
//!   version: dp:4.21.2
//!
//! Join:
//!   id: 32
//!   comment: Inform the client of a new user
//!   fields:
//!     - flags flags: [auth, mod, bot]
//!     - name utf8
//!     - avatar bytes
//!
//! DrawDabsPixelSquare:
//!   id: 150
//!   name: squarepixeldabs
//!   alias: DrawDabsPixel
//! ```

use crate::catalogue::Catalogue;
use crate::descriptor::{
    DescriptorBody, FieldAttributes, FieldDescriptor, LongField, MessageDescriptor, TypeParams,
};
use crate::error::SchemaError;
use serde_yaml::{Mapping, Value};
use std::path::Path;

const METADATA_KEY: &str = "_protocol";

/// Schema metadata plus the message descriptors, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    pub version: String,
    pub messages: Vec<MessageDescriptor>,
}

impl SchemaSource {
    /// Parses a YAML schema document into descriptors.
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        let root: Value = serde_yaml::from_str(source)?;
        let root = root
            .as_mapping()
            .ok_or_else(|| SchemaError::invalid("schema", "root", "expected a mapping"))?;

        let mut version = None;
        let mut messages = Vec::with_capacity(root.len());

        for (key, value) in root {
            let name = key
                .as_str()
                .ok_or_else(|| SchemaError::invalid("schema", "key", "message names must be strings"))?;

            if name == METADATA_KEY {
                version = Some(parse_version(value)?);
            } else {
                messages.push(parse_message(name, value)?);
            }
        }

        let version = version.ok_or_else(|| SchemaError::missing(METADATA_KEY, "version"))?;
        Ok(Self { version, messages })
    }

    pub fn into_catalogue(self) -> Result<Catalogue, SchemaError> {
        Catalogue::build(self.version, self.messages)
    }
}

impl Catalogue {
    /// Loads a catalogue from a YAML schema document.
    pub fn from_yaml_str(source: &str) -> Result<Self, SchemaError> {
        SchemaSource::parse(source)?.into_catalogue()
    }

    /// Loads a catalogue from a YAML schema file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading protocol schema");
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }
}

fn parse_version(value: &Value) -> Result<String, SchemaError> {
    let meta = value
        .as_mapping()
        .ok_or_else(|| SchemaError::invalid(METADATA_KEY, "version", "expected a mapping"))?;
    match meta.get("version") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(SchemaError::invalid(
            METADATA_KEY,
            "version",
            "expected a string",
        )),
        None => Err(SchemaError::missing(METADATA_KEY, "version")),
    }
}

fn parse_message(name: &str, value: &Value) -> Result<MessageDescriptor, SchemaError> {
    let map = value
        .as_mapping()
        .ok_or_else(|| SchemaError::invalid(name, "message", "expected a mapping"))?;

    let mut id = None;
    let mut command = None;
    let mut comment = String::new();
    let mut fields = None;
    let mut alias = None;

    for (key, value) in map {
        let key = attribute_key(name, key)?;
        match key {
            "id" => id = Some(uint(name, key, value)?),
            "name" => command = Some(string(name, key, value)?),
            "comment" => comment = string(name, key, value)?.trim_end().to_string(),
            "alias" => alias = Some(string(name, key, value)?),
            "fields" => fields = Some(field_list(name, value)?),
            other => {
                return Err(SchemaError::invalid(name, other, "unknown message attribute"));
            }
        }
    }

    let id = id.ok_or_else(|| SchemaError::missing(name, "id"))?;
    let id = u32::try_from(id)
        .map_err(|_| SchemaError::invalid(name, "id", format!("message ID {} is too large", id)))?;

    let body = match (alias, fields) {
        (Some(_), Some(_)) => {
            return Err(SchemaError::invalid(
                name,
                "alias",
                "an alias message cannot declare fields",
            ));
        }
        (Some(target), None) => DescriptorBody::Alias(target),
        (None, fields) => DescriptorBody::Fields(fields.unwrap_or_default()),
    };

    Ok(MessageDescriptor {
        name: name.to_string(),
        id,
        command,
        comment,
        body,
    })
}

fn field_list(owner: &str, value: &Value) -> Result<Vec<FieldDescriptor>, SchemaError> {
    match value {
        Value::Sequence(items) => items.iter().map(|item| parse_field(owner, item)).collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(SchemaError::invalid(owner, "fields", "expected a list")),
    }
}

fn parse_field(owner: &str, value: &Value) -> Result<FieldDescriptor, SchemaError> {
    match value {
        Value::String(spec) => Ok(FieldDescriptor::short(spec.as_str())),
        Value::Mapping(map) => parse_long_field(owner, map).map(FieldDescriptor::Long),
        other => Err(SchemaError::InvalidShortForm(format!(
            "{}: {:?}",
            owner, other
        ))),
    }
}

fn parse_long_field(owner: &str, map: &Mapping) -> Result<LongField, SchemaError> {
    let mut keyed = None;
    let mut attributes = FieldAttributes::default();

    for (key, value) in map {
        let key = attribute_key(owner, key)?;
        if key.contains(' ') {
            if keyed.is_some() {
                return Err(SchemaError::InvalidLongForm(format!(
                    "{}: more than one \"<name> <type>\" key",
                    owner
                )));
            }
            keyed = Some((key, type_params(key, value)?));
            continue;
        }

        match key {
            "format" => attributes.format = Some(string(owner, key, value)?),
            "min_len" => attributes.min_len = Some(length(owner, key, value)?),
            "max_len" => attributes.max_len = Some(length(owner, key, value)?),
            "length" => attributes.length = Some(length(owner, key, value)?),
            "prefix_type" => attributes.prefix_type = Some(string(owner, key, value)?),
            "name" => attributes.struct_name = Some(string(owner, key, value)?),
            "fields" => attributes.fields = Some(field_list(owner, value)?),
            other => {
                return Err(SchemaError::invalid(owner, other, "unknown field attribute"));
            }
        }
    }

    let (key, params) = keyed.ok_or_else(|| {
        SchemaError::InvalidLongForm(format!("{}: missing \"<name> <type>\" key", owner))
    })?;

    Ok(LongField {
        key: key.to_string(),
        params,
        attributes,
    })
}

fn type_params(field: &str, value: &Value) -> Result<Option<TypeParams>, SchemaError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(TypeParams::Format(s.clone()))),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaError::invalid(field, "_type_params", "list items must be strings")
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|list| Some(TypeParams::List(list))),
        _ => Err(SchemaError::invalid(
            field,
            "_type_params",
            "expected a string or a list",
        )),
    }
}

fn attribute_key<'a>(owner: &str, key: &'a Value) -> Result<&'a str, SchemaError> {
    key.as_str()
        .ok_or_else(|| SchemaError::invalid(owner, "key", "attribute names must be strings"))
}

fn string(owner: &str, attribute: &str, value: &Value) -> Result<String, SchemaError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SchemaError::invalid(owner, attribute, "expected a string"))
}

fn uint(owner: &str, attribute: &str, value: &Value) -> Result<u64, SchemaError> {
    value
        .as_u64()
        .ok_or_else(|| SchemaError::invalid(owner, attribute, "expected a non-negative integer"))
}

fn length(owner: &str, attribute: &str, value: &Value) -> Result<usize, SchemaError> {
    let n = uint(owner, attribute, value)?;
    usize::try_from(n).map_err(|_| SchemaError::invalid(owner, attribute, "value too large"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldKind, Format};

    const SCHEMA: &str = r#"
_protocol:
  version: dp:4.21.2

Join:
  id: 32
  comment: Inform the client of a new user
  fields:
    - flags flags: [auth, mod, bot]
    - name utf8
    - avatar bytes

Leave:
  id: 33

LayerRetitle:
  id: 132
  name: retitlelayer
  fields:
    - id u16: hex
    - title utf8

DrawDabsPixel:
  id: 149
  name: pixeldabs
  fields:
    - layer u16:
      format: hex
    - x i32
    - y i32
    - color argb32
    - mode u8
    - dabs struct:
      name: PixelDab
      fields:
        - x i8
        - y i8
        - size u8
        - opacity u8

DrawDabsPixelSquare:
  id: 150
  name: squarepixeldabs
  alias: DrawDabsPixel
"#;

    #[test]
    fn test_parse_source() {
        let source = SchemaSource::parse(SCHEMA).unwrap();
        assert_eq!(source.version, "dp:4.21.2");
        assert_eq!(source.messages.len(), 5);

        let join = &source.messages[0];
        assert_eq!(join.name, "Join");
        assert_eq!(join.id, 32);
        assert_eq!(join.comment, "Inform the client of a new user");
        match &join.body {
            DescriptorBody::Fields(fields) => {
                assert_eq!(fields.len(), 3);
                assert_eq!(
                    fields[0].params(),
                    Some(&TypeParams::List(vec![
                        "auth".to_string(),
                        "mod".to_string(),
                        "bot".to_string()
                    ]))
                );
                assert_eq!(fields[1], FieldDescriptor::short("name utf8"));
            }
            other => panic!("unexpected body {:?}", other),
        }

        let leave = &source.messages[1];
        assert_eq!(leave.body, DescriptorBody::Fields(vec![]));

        let square = &source.messages[4];
        assert_eq!(square.command.as_deref(), Some("squarepixeldabs"));
        assert_eq!(square.body, DescriptorBody::Alias("DrawDabsPixel".to_string()));
    }

    #[test]
    fn test_catalogue_from_yaml() {
        let catalogue = Catalogue::from_yaml_str(SCHEMA).unwrap();
        assert_eq!(catalogue.version(), "dp:4.21.2");
        assert_eq!(catalogue.len(), 5);

        let retitle = catalogue.by_command("retitlelayer").unwrap();
        assert_eq!(retitle.fields()[0].format(), Format::Hex);

        let pixel = catalogue.get("DrawDabsPixel").unwrap();
        assert_eq!(pixel.fields()[0].format(), Format::Hex);
        assert_eq!(pixel.max_items(), Some(16380));
        assert!(matches!(
            pixel.fields()[5].kind,
            FieldKind::Struct { item_len: 4, .. }
        ));

        let square = catalogue.by_id(150).unwrap();
        assert!(square.is_alias());
        assert_eq!(square.max_items(), Some(16380));
    }

    #[test]
    fn test_missing_version() {
        let result = SchemaSource::parse("Leave:\n  id: 33\n");
        assert!(matches!(
            result,
            Err(SchemaError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_missing_id() {
        let result = SchemaSource::parse("_protocol:\n  version: '1'\nLeave:\n  comment: bye\n");
        match result {
            Err(SchemaError::MissingAttribute { owner, attribute }) => {
                assert_eq!(owner, "Leave");
                assert_eq!(attribute, "id");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_long_form_needs_one_typed_key() {
        let yaml = "_protocol:\n  version: '1'\nM:\n  id: 1\n  fields:\n    - format: hex\n";
        assert!(matches!(
            SchemaSource::parse(yaml),
            Err(SchemaError::InvalidLongForm(_))
        ));

        let yaml = "_protocol:\n  version: '1'\nM:\n  id: 1\n  fields:\n    - a u8: hex\n      b u8: hex\n";
        assert!(matches!(
            SchemaSource::parse(yaml),
            Err(SchemaError::InvalidLongForm(_))
        ));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let yaml = "_protocol:\n  version: '1'\nM:\n  id: 1\n  fields:\n    - a u8:\n      colour: red\n";
        assert!(matches!(
            SchemaSource::parse(yaml),
            Err(SchemaError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_huge_min_len_is_a_schema_error() {
        let yaml = "_protocol:\n  version: '1'\nM:\n  id: 1\n  fields:\n    - a vec_u16:\n      min_len: 9223372036854775808\n";
        assert!(matches!(
            Catalogue::from_yaml_str(yaml),
            Err(SchemaError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_alias_with_fields_rejected() {
        let yaml = "_protocol:\n  version: '1'\nA:\n  id: 1\nB:\n  id: 2\n  alias: A\n  fields: [x u8]\n";
        assert!(SchemaSource::parse(yaml).is_err());
    }

    #[test]
    fn test_duplicate_id_in_yaml() {
        let yaml = "_protocol:\n  version: '1'\nA:\n  id: 7\nB:\n  id: 7\n";
        assert!(matches!(
            Catalogue::from_yaml_str(yaml),
            Err(SchemaError::DuplicateId { id: 7, .. })
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Catalogue::from_file("/nonexistent/protocol.yaml");
        assert!(matches!(result, Err(SchemaError::Io(_))));
    }
}

//! The schema catalogue: every message type of a protocol, validated and
//! indexed.
//!
//! A catalogue is built once and never mutated afterwards, so it can be
//! shared freely between threads and codec calls.

use crate::descriptor::{DescriptorBody, MessageDescriptor};
use crate::error::SchemaError;
use crate::message::{Layout, MessageDef};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Validated set of message definitions.
#[derive(Debug, Clone)]
pub struct Catalogue {
    version: String,
    /// Sorted by ascending id.
    messages: Vec<MessageDef>,
    by_name: HashMap<String, usize>,
    by_command: HashMap<String, usize>,
    by_id: HashMap<u8, usize>,
    checksum: String,
}

#[derive(Serialize)]
struct CatalogueDigest<'a> {
    version: &'a str,
    messages: &'a [MessageDef],
}

impl Catalogue {
    /// Builds a catalogue from message descriptors.
    ///
    /// Fails on the first invariant violation; no partial catalogue is
    /// ever returned.
    pub fn build(
        version: impl Into<String>,
        descriptors: Vec<MessageDescriptor>,
    ) -> Result<Self, SchemaError> {
        let version = version.into();

        let mut names = HashSet::new();
        let mut commands = HashSet::new();
        let mut ids = HashSet::new();

        for desc in &descriptors {
            let command = command_name(desc);

            if !names.insert(desc.name.clone()) {
                return Err(SchemaError::DuplicateMessage {
                    name: desc.name.clone(),
                });
            }
            if !commands.insert(command.clone()) {
                return Err(SchemaError::DuplicateCommand {
                    name: desc.name.clone(),
                    command,
                });
            }

            let id = u8::try_from(desc.id).map_err(|_| {
                SchemaError::invalid(
                    &desc.name,
                    "id",
                    format!("message ID {} does not fit in one byte", desc.id),
                )
            })?;
            if !ids.insert(id) {
                return Err(SchemaError::DuplicateId {
                    name: desc.name.clone(),
                    id,
                });
            }
        }

        // Concrete layouts first so aliases can point at any message,
        // regardless of declaration order.
        let mut layouts: HashMap<&str, Arc<Layout>> = HashMap::new();
        for desc in &descriptors {
            if let DescriptorBody::Fields(fields) = &desc.body {
                let layout = Layout::build(&desc.name, fields)?;
                layouts.insert(desc.name.as_str(), Arc::new(layout));
            }
        }

        let mut messages = Vec::with_capacity(descriptors.len());
        for desc in &descriptors {
            let (alias, layout) = match &desc.body {
                DescriptorBody::Fields(_) => (None, layouts[desc.name.as_str()].clone()),
                DescriptorBody::Alias(target) => {
                    let layout = layouts.get(target.as_str()).cloned().ok_or_else(|| {
                        SchemaError::UnknownAlias {
                            name: desc.name.clone(),
                            target: target.clone(),
                        }
                    })?;
                    (Some(target.clone()), layout)
                }
            };

            messages.push(MessageDef {
                name: desc.name.clone(),
                command: command_name(desc),
                id: desc.id as u8,
                comment: desc.comment.clone(),
                alias,
                layout,
            });
        }

        messages.sort_by_key(|m| m.id);

        let mut by_name = HashMap::with_capacity(messages.len());
        let mut by_command = HashMap::with_capacity(messages.len());
        let mut by_id = HashMap::with_capacity(messages.len());
        for (idx, message) in messages.iter().enumerate() {
            tracing::debug!(
                message = %message.name,
                id = message.id,
                min_len = message.min_len(),
                max_len = message.max_len(),
                "registered message"
            );
            by_name.insert(message.name.clone(), idx);
            by_command.insert(message.command.clone(), idx);
            by_id.insert(message.id, idx);
        }

        let digest = serde_json::to_vec(&CatalogueDigest {
            version: &version,
            messages: &messages,
        })?;
        let checksum = format!("{:08x}", crc32c::crc32c(&digest));

        tracing::info!(
            version = %version,
            messages = messages.len(),
            checksum = %checksum,
            "loaded protocol catalogue"
        );

        Ok(Self {
            version,
            messages,
            by_name,
            by_command,
            by_id,
            checksum,
        })
    }

    /// Protocol version string from the schema metadata.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All messages, ordered by ascending id.
    pub fn messages(&self) -> &[MessageDef] {
        &self.messages
    }

    pub fn get(&self, name: &str) -> Option<&MessageDef> {
        self.by_name.get(name).map(|&idx| &self.messages[idx])
    }

    pub fn by_id(&self, id: u8) -> Option<&MessageDef> {
        self.by_id.get(&id).map(|&idx| &self.messages[idx])
    }

    pub fn by_command(&self, command: &str) -> Option<&MessageDef> {
        self.by_command.get(command).map(|&idx| &self.messages[idx])
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// CRC32C of the catalogue model, as 8 hex digits.
    ///
    /// Two peers with equal checksums agree on every message layout.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

impl fmt::Display for Catalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Protocol version: {}", self.version)?;
        for message in &self.messages {
            writeln!(f, "{}", message)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn command_name(desc: &MessageDescriptor) -> String {
    desc.command
        .clone()
        .unwrap_or_else(|| desc.name.to_lowercase())
}

use serde::{Deserialize, Serialize};

use crate::core::{Document, Node};
use crate::error::ValueError;
use crate::plugin::PluginRegistry;

pub const VALUE_SCHEMA: &str = "edital-editor";
pub const VALUE_FORMAT_VERSION: u32 = 1;

fn default_schema() -> String {
    VALUE_SCHEMA.to_string()
}

fn default_version() -> u32 {
    VALUE_FORMAT_VERSION
}

/// Structured-tree form of a document, as handed to hosts that do not want HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub document: Document,
}

impl EditorValue {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            document,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a value written by this or an older format version.
    pub fn from_json_str(s: &str) -> Result<Self, ValueError> {
        let value: Self = serde_json::from_str(s)?;
        if value.schema != VALUE_SCHEMA {
            return Err(ValueError::Schema(value.schema));
        }
        if value.version > VALUE_FORMAT_VERSION {
            return Err(ValueError::Version {
                found: value.version,
                supported: VALUE_FORMAT_VERSION,
            });
        }
        Ok(value)
    }

    /// Document for an editor built from `registry`. Trees that use node kinds
    /// the registry does not declare are rejected rather than loaded half-known.
    pub fn into_document(self, registry: &PluginRegistry) -> Result<Document, ValueError> {
        check_kinds(&self.document.children, registry)?;
        Ok(self.document)
    }
}

fn check_kinds(nodes: &[Node], registry: &PluginRegistry) -> Result<(), ValueError> {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Void(v) => {
                if registry.node_spec(v.kind).is_none() {
                    return Err(ValueError::UnknownKind(v.kind));
                }
            }
            Node::Element(el) => {
                if registry.node_spec(el.kind).is_none() {
                    return Err(ValueError::UnknownKind(el.kind));
                }
                check_kinds(&el.children, registry)?;
            }
        }
    }
    Ok(())
}

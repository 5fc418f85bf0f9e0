//! Serde model of one exported conversation archive.
//!
//! Only the fields the importer stores are modelled; everything else in the
//! export is ignored. Node-level `message` payloads are kept as raw JSON until
//! the importer reaches them, so a malformed message is reported against its
//! node id.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use threadloom_common::{Error, NodeId, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Archive {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
    pub mapping: BTreeMap<NodeId, ArchiveNode>,
}

impl Archive {
    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| Error::Archive(format!("invalid archive JSON: {e}")))
    }

    /// Nodes without a parent.
    pub fn roots(&self) -> impl Iterator<Item = &NodeId> {
        self.mapping
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveNode {
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl ArchiveNode {
    /// The message payload, or `None` for structural nodes (`null`, `{}` or missing).
    pub fn message_payload(&self) -> Option<&Value> {
        match &self.message {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(value),
        }
    }

    /// Decodes the message payload of the node stored under `node_id`.
    pub fn decode_message(&self, node_id: &NodeId) -> Result<Option<ArchiveMessage>> {
        let Some(payload) = self.message_payload() else {
            return Ok(None);
        };

        let message = ArchiveMessage::deserialize(payload)
            .map_err(|e| Error::Archive(format!("node {node_id}: invalid message: {e}")))?;

        if let Some(id) = &message.id {
            if id != node_id {
                return Err(Error::Archive(format!(
                    "node {node_id}: message id {id} does not match its node"
                )));
            }
        }

        Ok(Some(message))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveMessage {
    #[serde(default)]
    pub id: Option<NodeId>,
    pub author: Author,
    pub content: Content,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub end_turn: Option<bool>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub role: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub parts: Option<Vec<Value>>,
}

impl Content {
    pub fn parts(&self) -> &[Value] {
        self.parts.as_deref().unwrap_or_default()
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Surrogate key assigned to a conversation row by the database.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConversationId(i64);

impl ConversationId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node identifier taken verbatim from an archive's mapping keys.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn from_str(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How parent links between nodes are checked while a file is imported.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyMode {
    /// Parent links are checked once, when the file's transaction commits.
    #[default]
    Deferred,
    /// Nodes are inserted unlinked, then parent links are set in a second pass.
    TwoPass,
    /// Nodes are inserted in mapping order and every parent must already exist.
    Immediate,
}

impl ForeignKeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::TwoPass => "two_pass",
            Self::Immediate => "immediate",
        }
    }
}

impl fmt::Display for ForeignKeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForeignKeyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "deferred" => Ok(Self::Deferred),
            "two_pass" => Ok(Self::TwoPass),
            "immediate" => Ok(Self::Immediate),
            other => Err(Error::Config(format!(
                "unknown foreign key mode: {other} (expected deferred, two_pass or immediate)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationId, ForeignKeyMode, NodeId};

    #[test]
    fn node_id_serializes_as_plain_string() {
        let id = NodeId::from_str("n1");
        let json = serde_json::to_string(&id).expect("serialize node id");
        assert_eq!(json, "\"n1\"");
        assert_eq!(id.to_string(), "n1");
    }

    #[test]
    fn conversation_id_round_trips_raw_value() {
        let id = ConversationId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn foreign_key_mode_parses_cli_spellings() {
        assert_eq!(
            "two-pass".parse::<ForeignKeyMode>().expect("parse two-pass"),
            ForeignKeyMode::TwoPass
        );
        assert_eq!(
            "Immediate".parse::<ForeignKeyMode>().expect("parse immediate"),
            ForeignKeyMode::Immediate
        );
        assert!("lazy".parse::<ForeignKeyMode>().is_err());
        assert_eq!(ForeignKeyMode::default(), ForeignKeyMode::Deferred);
    }
}

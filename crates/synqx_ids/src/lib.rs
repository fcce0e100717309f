//! Typed identifier wrappers shared across the SynqX workspace.
//!
//! UUID-backed ids use [`define_uuid_id`] for entities the control plane
//! mints itself (pipelines, jobs, runs, agents...). [`NodeId`] is the one
//! exception: node identity is a user-chosen string that must stay stable
//! across pipeline versions (spec: "node_id ∈ string-unique-within-version"),
//! so it wraps a plain `String` rather than a `Uuid`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned when parsing an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                uuid::Uuid::parse_str(value)
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_uuid_id!(WorkspaceId, "workspace ID");
define_uuid_id!(ConnectionId, "connection ID");
define_uuid_id!(AssetId, "asset ID");
define_uuid_id!(PipelineId, "pipeline ID");
define_uuid_id!(PipelineVersionId, "pipeline version ID");
define_uuid_id!(JobId, "job ID");
define_uuid_id!(PipelineRunId, "pipeline run ID");
define_uuid_id!(StepRunId, "step run ID");
define_uuid_id!(AgentId, "agent ID");
define_uuid_id!(EphemeralJobId, "ephemeral job ID");

/// A node's graph identity: a user-chosen string, stable across versions
/// when the user preserves the DAG shape. Never UUID-backed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
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

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_id_roundtrips_through_display_and_parse() {
        let id = PipelineId::new();
        let parsed = PipelineId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn uuid_id_rejects_garbage() {
        assert!(JobId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn node_id_preserves_arbitrary_strings() {
        let id = NodeId::new("extract_orders");
        assert_eq!(id.as_str(), "extract_orders");
        assert_eq!(id.to_string(), "extract_orders");
    }

    #[test]
    fn node_id_is_hashable_and_ordered() {
        let mut ids = vec![NodeId::new("b"), NodeId::new("a")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::new("a"), NodeId::new("b")]);
    }
}

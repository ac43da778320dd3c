//! Wire-level enums shared by requests and responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Global formation state of the compute node group, as reported to nodes.
///
/// `Initializing -> Initialized -> Finished` is the normal lifecycle.
/// `Failed` is only reachable from `Initializing` when recovery is enabled
/// and the group did not form in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopologyState {
    #[default]
    Initializing,
    Initialized,
    Finished,
    Failed,
}

impl TopologyState {
    /// Lowercase label used in logs and health output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TopologyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an unregistration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnregistrationResult {
    Success,
    /// The group has not reached `Initialized`; leaving is not allowed yet.
    UninitializedTopology,
    /// No node with the given id is registered.
    InvalidNode,
}

/// Result code for metadata and host name queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataStatus {
    Valid,
    Invalid,
}

impl MetadataStatus {
    #[must_use]
    pub fn from_found(found: bool) -> Self {
        if found {
            Self::Valid
        } else {
            Self::Invalid
        }
    }
}

//! Error types for membership requests and fatal coordinator conditions.

use std::time::Duration;

use meta_core::{TopologyState, UnregistrationResult};

/// Registration refused by the registry. The caller is told via
/// `success = false`; the coordinator keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("group already holds all {total_node_num} nodes")]
    GroupFull { total_node_num: u32 },
    #[error("requested rank {rank_id} is outside 0..{total_node_num}")]
    RankOutOfRange { rank_id: u32, total_node_num: u32 },
    #[error("rank {rank_id} of role {role} was already issued")]
    RankTaken { role: String, rank_id: u32 },
}

/// Unregistration refused by the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnregisterError {
    #[error("topology is {state}, nodes may only leave once it is initialized")]
    UninitializedTopology { state: TopologyState },
    #[error("node {node_id} is not registered")]
    InvalidNode { node_id: String },
}

impl UnregisterError {
    /// Wire result code for this error.
    #[must_use]
    pub fn result_code(&self) -> UnregistrationResult {
        match self {
            Self::UninitializedTopology { .. } => UnregistrationResult::UninitializedTopology,
            Self::InvalidNode { .. } => UnregistrationResult::InvalidNode,
        }
    }
}

/// Unrecoverable coordinator condition.
///
/// Raised off the request path (monitor loop, startup restore) and captured by
/// the `ShutdownController`, so the shutdown path can refuse to report a clean
/// finish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error(
        "topology did not form within {timeout:?}: {registered} of {expected} nodes registered"
    )]
    FormationTimeout {
        timeout: Duration,
        registered: usize,
        expected: u32,
    },
    #[error("{count} node(s) missed their heartbeat deadline with recovery disabled: {node_ids:?}")]
    NodeTimeout { count: u32, node_ids: Vec<String> },
    #[error("failed to restore topology: {0}")]
    Restore(String),
    #[error("failed to persist formation checkpoint: {0}")]
    Persist(String),
}

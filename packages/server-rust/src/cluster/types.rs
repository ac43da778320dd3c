//! Cluster domain types: per-node records, liveness, and health summaries.
//!
//! Wire-facing enums (`TopologyState`) live in `meta_core`; the types here are
//! coordinator-internal and never leave the process except through
//! `ClusterHealth` in the health endpoint.

use serde::Serialize;
use tokio::time::Instant;

pub use meta_core::TopologyState;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Liveness of a registered node as seen by the topology monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Heartbeats are arriving within the timeout.
    Registered,
    /// No heartbeat within the timeout. Cleared by the next heartbeat.
    Timeout,
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// A compute node known to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node_id: String,
    pub host_name: String,
    pub role: String,
    /// Assigned at first registration (or restored), never changed afterwards.
    pub rank_id: u32,
    pub state: NodeState,
    pub last_update: Instant,
}

impl NodeInfo {
    #[must_use]
    pub fn new(node_id: String, host_name: String, role: String, rank_id: u32, now: Instant) -> Self {
        Self {
            node_id,
            host_name,
            role,
            rank_id,
            state: NodeState::Registered,
            last_update: now,
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state == NodeState::Registered
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub rank_id: u32,
    pub total_node_num: u32,
    /// `false` when the node id was already registered and its rank was reused.
    pub newly_created: bool,
}

/// Snapshot returned with every acknowledged heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    pub topology_state: TopologyState,
    pub total_node_num: u32,
    pub abnormal_node_count: u32,
}

/// Summary of coordinator health, serialized into `GET /health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    pub topology_state: TopologyState,
    pub total_node_num: u32,
    pub registered_nodes: usize,
    pub alive_nodes: usize,
    pub abnormal_nodes: u32,
}

//! Membership payloads: registration, unregistration, heartbeat.

use serde::{Deserialize, Serialize};

use crate::types::{TopologyState, UnregistrationResult};

/// Sent by a compute node to join the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub node_id: String,
    pub host_name: String,
    pub role: String,
    /// Rank the node asks for within its role. When absent the coordinator
    /// allocates the next free rank.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub success: bool,
    pub rank_id: u32,
    pub total_node_num: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregistrationRequest {
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregistrationResponse {
    pub result: UnregistrationResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub node_id: String,
}

/// Heartbeat acknowledgement. Carries the abnormal node count so nodes can
/// react to partial degradation without a separate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub success: bool,
    pub topology_state: TopologyState,
    pub total_node_num: u32,
    pub abnormal_node_count: u32,
}

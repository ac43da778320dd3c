//! Metadata store and host name query payloads.

use serde::{Deserialize, Serialize};

use crate::types::MetadataStatus;

/// Write (or overwrite) a metadata entry. The coordinator does not reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteMetadataRequest {
    pub name: String,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMetadataRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMetadataResponse {
    pub status: MetadataStatus,
    #[serde(
        with = "serde_bytes",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMetadataRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMetadataResponse {
    pub status: MetadataStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHostNamesRequest {
    pub role: String,
}

/// Host names of one role, indexed by rank. Empty unless `status` is `Valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHostNamesResponse {
    pub status: MetadataStatus,
    #[serde(default)]
    pub host_names: Vec<String>,
}

//! Durable snapshot of the node registry.
//!
//! The recovery file is a versioned JSON document keyed by node id:
//!
//! ```json
//! { "version": 1,
//!   "compute_node_states": {
//!     "node-0": { "node_id": "node-0", "host_name": "10.0.0.1", "role": "worker", "rank_id": 0 }
//! } }
//! ```
//!
//! Writes go to `<path>.tmp` first and are renamed over the target, so a crash
//! mid-write never leaves a truncated file behind. A file whose node count does
//! not match the expected group size is rejected outright.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::NodeInfo;

/// Current on-disk format version.
pub const RECOVERY_FORMAT_VERSION: u32 = 1;

fn legacy_version() -> u32 {
    RECOVERY_FORMAT_VERSION
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// The persisted fields of one node. Liveness is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedNode {
    pub node_id: String,
    pub host_name: String,
    pub role: String,
    pub rank_id: u32,
}

impl PersistedNode {
    #[must_use]
    pub fn new(node_id: &str, host_name: &str, role: &str, rank_id: u32) -> Self {
        Self {
            node_id: node_id.to_string(),
            host_name: host_name.to_string(),
            role: role.to_string(),
            rank_id,
        }
    }
}

impl From<&NodeInfo> for PersistedNode {
    fn from(node: &NodeInfo) -> Self {
        Self {
            node_id: node.node_id.clone(),
            host_name: node.host_name.clone(),
            role: node.role.clone(),
            rank_id: node.rank_id,
        }
    }
}

/// Top-level recovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryFile {
    #[serde(default = "legacy_version")]
    pub version: u32,
    /// `BTreeMap` keeps the output ordered by node id.
    pub compute_node_states: BTreeMap<String, PersistedNode>,
}

impl RecoveryFile {
    #[must_use]
    pub fn from_nodes(nodes: &[PersistedNode]) -> Self {
        Self {
            version: RECOVERY_FORMAT_VERSION,
            compute_node_states: nodes
                .iter()
                .map(|n| (n.node_id.clone(), n.clone()))
                .collect(),
        }
    }

    /// Checks the version and the internal consistency of every entry.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError` for an unsupported version, an entry whose key
    /// differs from its `node_id`, or a rank issued twice within a role.
    pub fn validate(&self) -> Result<(), RecoveryError> {
        if self.version != RECOVERY_FORMAT_VERSION {
            return Err(RecoveryError::UnsupportedVersion {
                found: self.version,
            });
        }
        let mut ranks = HashSet::new();
        for (key, node) in &self.compute_node_states {
            if *key != node.node_id {
                return Err(RecoveryError::KeyMismatch {
                    key: key.clone(),
                    node_id: node.node_id.clone(),
                });
            }
            if !ranks.insert((node.role.as_str(), node.rank_id)) {
                return Err(RecoveryError::DuplicateRank {
                    role: node.role.clone(),
                    rank_id: node.rank_id,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn into_nodes(self) -> Vec<PersistedNode> {
        self.compute_node_states.into_values().collect()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("recovery file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("recovery file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize recovery state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("unsupported recovery file version {found}")]
    UnsupportedVersion { found: u32 },
    #[error("recovery entry keyed {key} describes node {node_id}")]
    KeyMismatch { key: String, node_id: String },
    #[error("rank {rank_id} of role {role} appears twice in the recovery file")]
    DuplicateRank { role: String, rank_id: u32 },
    #[error("recovery file holds {found} nodes but the group expects {expected}")]
    NodeCountMismatch { found: usize, expected: u32 },
}

// ---------------------------------------------------------------------------
// RecoveryStore
// ---------------------------------------------------------------------------

/// Reads and writes the recovery file. All calls perform blocking file I/O.
#[derive(Debug, Clone)]
pub struct RecoveryStore {
    path: PathBuf,
}

impl RecoveryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> RecoveryError {
        RecoveryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Atomically replaces the recovery file with `nodes`.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError` if serialization or any file operation fails.
    pub fn persist(&self, nodes: &[PersistedNode]) -> Result<(), RecoveryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let bytes = serde_json::to_vec_pretty(&RecoveryFile::from_nodes(nodes))
            .map_err(RecoveryError::Serialize)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        info!(
            path = %self.path.display(),
            nodes = nodes.len(),
            "Persisted topology to recovery file"
        );
        Ok(())
    }

    /// Reads and validates the recovery file. Returns `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError` if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(&self) -> Result<Option<RecoveryFile>, RecoveryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let file: RecoveryFile =
            serde_json::from_slice(&bytes).map_err(|source| RecoveryError::Parse {
                path: self.path.clone(),
                source,
            })?;
        file.validate()?;
        Ok(Some(file))
    }

    /// Loads the persisted nodes for a group of `expected` nodes.
    ///
    /// Returns `Ok(None)` when there is nothing to restore.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::NodeCountMismatch` when the file holds a
    /// different number of nodes than `expected`, plus any `load` error.
    pub fn restore(&self, expected: u32) -> Result<Option<Vec<PersistedNode>>, RecoveryError> {
        let Some(file) = self.load()? else {
            return Ok(None);
        };
        let found = file.compute_node_states.len();
        if found != expected as usize {
            return Err(RecoveryError::NodeCountMismatch { found, expected });
        }
        Ok(Some(file.into_nodes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> Vec<PersistedNode> {
        vec![
            PersistedNode::new("node-0", "h0", "worker", 0),
            PersistedNode::new("node-1", "h1", "worker", 1),
            PersistedNode::new("node-2", "h2", "worker", 2),
        ]
    }

    #[test]
    fn persist_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("state/recovery.json"));
        assert!(!store.path().exists());

        store.persist(&three_nodes()).unwrap();
        assert!(store.path().is_file());
        assert!(!dir.path().join("state/recovery.json.tmp").exists());

        let restored = store.restore(3).unwrap().unwrap();
        assert_eq!(restored, three_nodes());
    }

    #[test]
    fn missing_file_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("absent.json"));
        assert!(store.restore(3).unwrap().is_none());
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("recovery.json"));
        store.persist(&three_nodes()[..2]).unwrap();

        let err = store.restore(3).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::NodeCountMismatch {
                found: 2,
                expected: 3
            }
        ));
    }

    #[test]
    fn file_layout_is_keyed_by_node_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("recovery.json"));
        store.persist(&three_nodes()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["compute_node_states"]["node-1"]["host_name"], "h1");
        assert_eq!(raw["compute_node_states"]["node-2"]["rank_id"], 2);
    }

    #[test]
    fn unversioned_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery.json");
        fs::write(
            &path,
            r#"{"compute_node_states":{"a":{"node_id":"a","host_name":"h","role":"worker","rank_id":0}}}"#,
        )
        .unwrap();

        let restored = RecoveryStore::new(&path).restore(1).unwrap().unwrap();
        assert_eq!(restored[0].node_id, "a");
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery.json");
        fs::write(&path, r#"{"version":2,"compute_node_states":{}}"#).unwrap();

        let err = RecoveryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, RecoveryError::UnsupportedVersion { found: 2 }));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery.json");
        fs::write(&path, b"not json").unwrap();

        let err = RecoveryStore::new(&path).restore(1).unwrap_err();
        assert!(matches!(err, RecoveryError::Parse { .. }));
    }

    #[test]
    fn key_and_rank_consistency_is_checked() {
        let mut file = RecoveryFile::from_nodes(&three_nodes());
        file.compute_node_states.insert(
            "alias".to_string(),
            PersistedNode::new("node-9", "h9", "worker", 9),
        );
        assert!(matches!(
            file.validate(),
            Err(RecoveryError::KeyMismatch { .. })
        ));

        let file = RecoveryFile::from_nodes(&[
            PersistedNode::new("a", "h", "worker", 0),
            PersistedNode::new("b", "h", "worker", 0),
        ]);
        assert!(matches!(
            file.validate(),
            Err(RecoveryError::DuplicateRank { rank_id: 0, .. })
        ));
    }
}

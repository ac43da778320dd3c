//! Cluster coordination module.
//!
//! Provides the node registry with its rank ledger, the shared metadata
//! store, the recovery file, and the topology monitor that drives liveness
//! and the topology state machine.

pub mod error;
pub mod metadata;
pub mod monitor;
pub mod rank;
pub mod recovery;
pub mod registry;
pub mod types;

// ---------------------------------------------------------------------------
// Re-exports: flat public API
// ---------------------------------------------------------------------------

pub use error::{FatalError, RegisterError, UnregisterError};
pub use metadata::MetadataStore;
pub use monitor::{MonitorSettings, MonitorTask, TopologyMonitor};
pub use rank::RankAllocator;
pub use recovery::{PersistedNode, RecoveryError, RecoveryFile, RecoveryStore};
pub use registry::{EvaluationReport, EvaluationRules, NodeRegistry};
pub use types::{ClusterHealth, HeartbeatAck, NodeInfo, NodeState, Registration, TopologyState};

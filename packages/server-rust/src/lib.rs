//! Meta server: cluster topology coordinator for a fixed-size group of compute
//! nodes, with rank assignment, heartbeat liveness, a shared metadata store,
//! and optional crash recovery.

pub mod cluster;
pub mod network;
pub mod node;
pub mod service;

pub use cluster::{FatalError, NodeRegistry, TopologyMonitor, TopologyState};
pub use network::{NetworkConfig, NetworkModule, ShutdownController};
pub use node::MetaServerNode;
pub use service::{ConfigError, MessageRouter, MetaServerConfig};

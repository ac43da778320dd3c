use std::path::PathBuf;
use std::time::Duration;

/// Coordinator configuration.
///
/// Controls the expected group size, liveness and formation deadlines, the
/// monitor cadence, and crash recovery.
#[derive(Debug, Clone)]
pub struct MetaServerConfig {
    /// Number of compute nodes that make up the group. Must be positive.
    pub total_node_num: u32,
    /// A node silent for longer than this is marked `Timeout`.
    pub heartbeat_timeout: Duration,
    /// Interval between topology monitor evaluations.
    pub monitor_tick: Duration,
    /// Maximum time the topology may stay `Initializing`.
    pub formation_timeout: Duration,
    /// Persist the first formed topology and restore it on startup.
    pub recovery_enabled: bool,
    /// Location of the recovery file. Required when `recovery_enabled`.
    pub recovery_file: Option<PathBuf>,
    /// How long `finalize` waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for MetaServerConfig {
    fn default() -> Self {
        Self {
            total_node_num: 1,
            heartbeat_timeout: Duration::from_secs(30),
            monitor_tick: Duration::from_secs(3),
            formation_timeout: Duration::from_secs(600),
            recovery_enabled: false,
            recovery_file: None,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl MetaServerConfig {
    /// Default configuration for a group of `total_node_num` nodes.
    #[must_use]
    pub fn for_group(total_node_num: u32) -> Self {
        Self {
            total_node_num,
            ..Self::default()
        }
    }

    /// Enables recovery backed by the file at `path`.
    #[must_use]
    pub fn with_recovery(mut self, path: impl Into<PathBuf>) -> Self {
        self.recovery_enabled = true;
        self.recovery_file = Some(path.into());
        self
    }

    /// Rejects configurations the coordinator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_node_num == 0 {
            return Err(ConfigError::ZeroNodes);
        }
        for (field, value) in [
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("monitor_tick", self.monitor_tick),
            ("formation_timeout", self.formation_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        if self.recovery_enabled && self.recovery_file.is_none() {
            return Err(ConfigError::MissingRecoveryFile);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("total_node_num must be greater than zero")]
    ZeroNodes,
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("recovery is enabled but no recovery file path was given")]
    MissingRecoveryFile,
}

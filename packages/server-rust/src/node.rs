//! `MetaServerNode`: one coordinator instance.
//!
//! Owns the registry, the metadata store, the router, and the topology monitor
//! worker, and shares the `ShutdownController` with the transport. Created
//! with `new()`, brought up with `initialize()` (restore, then start the
//! monitor) and torn down with `finalize()`.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::info;

use crate::cluster::{
    ClusterHealth, EvaluationReport, FatalError, MetadataStore, MonitorSettings, MonitorTask,
    NodeRegistry, RecoveryStore, TopologyMonitor, TopologyState,
};
use crate::network::ShutdownController;
use crate::service::{
    BackgroundWorker, ConfigError, MessageRouter, MetaServerConfig, SystemHandlers,
};

pub struct MetaServerNode {
    config: MetaServerConfig,
    registry: Arc<NodeRegistry>,
    metadata: Arc<MetadataStore>,
    router: Arc<MessageRouter>,
    shutdown: Arc<ShutdownController>,
    monitor: Mutex<Option<BackgroundWorker<TopologyMonitor>>>,
}

impl MetaServerNode {
    /// Creates a node with its own shutdown controller.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` does not validate.
    pub fn new(config: MetaServerConfig) -> Result<Self, ConfigError> {
        Self::with_shutdown(config, Arc::new(ShutdownController::new()))
    }

    /// Creates a node that reports into an existing shutdown controller.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` does not validate.
    pub fn with_shutdown(
        config: MetaServerConfig,
        shutdown: Arc<ShutdownController>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(NodeRegistry::new(config.total_node_num));
        let metadata = Arc::new(MetadataStore::new());
        let router = Arc::new(MessageRouter::new(SystemHandlers::new(
            Arc::clone(&registry),
            Arc::clone(&metadata),
        )));
        Ok(Self {
            config,
            registry,
            metadata,
            router,
            shutdown,
            monitor: Mutex::new(None),
        })
    }

    /// Restores persisted state (recovery mode only) and starts the monitor.
    /// Calling it again once the monitor runs is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `FatalError::Restore` if the recovery file exists but cannot be
    /// used. The error is also reported to the shutdown controller.
    pub async fn initialize(&self) -> Result<(), FatalError> {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_some() {
            return Ok(());
        }

        let checkpoint_store = match self.recovery_store() {
            Some(store) => self.restore(store).await.inspect_err(|e| {
                self.shutdown.report_fatal(e.clone());
            })?,
            None => None,
        };

        let settings = MonitorSettings {
            heartbeat_timeout: self.config.heartbeat_timeout,
            formation_timeout: self.config.formation_timeout,
            recovery_enabled: self.config.recovery_enabled,
        };
        *monitor = Some(BackgroundWorker::start(
            TopologyMonitor::new(
                Arc::clone(&self.registry),
                settings,
                checkpoint_store,
                Arc::clone(&self.shutdown),
            ),
            self.config.monitor_tick,
        ));
        info!(
            total_node_num = self.config.total_node_num,
            recovery = self.config.recovery_enabled,
            state = %self.registry.topology_state(),
            "Meta server initialized"
        );
        Ok(())
    }

    fn recovery_store(&self) -> Option<RecoveryStore> {
        if !self.config.recovery_enabled {
            return None;
        }
        self.config.recovery_file.clone().map(RecoveryStore::new)
    }

    /// Loads the recovery file into the registry. Returns the store to
    /// checkpoint into when there was nothing to restore.
    async fn restore(&self, store: RecoveryStore) -> Result<Option<RecoveryStore>, FatalError> {
        let expected = self.config.total_node_num;
        let reader = store.clone();
        let restored = tokio::task::spawn_blocking(move || reader.restore(expected))
            .await
            .map_err(|e| FatalError::Restore(e.to_string()))?
            .map_err(|e| FatalError::Restore(e.to_string()))?;

        match restored {
            Some(nodes) => {
                info!(path = %store.path().display(), "Restoring topology from recovery file");
                self.registry.restore(nodes, Instant::now());
                Ok(None)
            }
            None => {
                info!(path = %store.path().display(), "No recovery file, starting fresh");
                Ok(Some(store))
            }
        }
    }

    #[must_use]
    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds a user message handler. Returns `false` if `name` is taken.
    pub fn register_handler<F>(&self, name: impl Into<String>, handler: F) -> bool
    where
        F: Fn(Bytes) -> Option<Bytes> + Send + Sync + 'static,
    {
        self.router.register_handler(name, handler)
    }

    #[must_use]
    pub fn topology_state(&self) -> TopologyState {
        self.registry.topology_state()
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.registry.alive_count()
    }

    #[must_use]
    pub fn health(&self) -> ClusterHealth {
        self.registry.health()
    }

    /// Runs one monitor evaluation outside the regular tick.
    ///
    /// Returns `None` if the monitor is not running or has halted.
    pub async fn evaluate_now(&self) -> Option<EvaluationReport> {
        let monitor = self.monitor.lock().await;
        let worker = monitor.as_ref()?;
        let (tx, rx) = oneshot::channel();
        worker.submit(MonitorTask::Evaluate(tx)).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Stops the monitor, drains in-flight requests, and reports how the
    /// coordinator ended.
    ///
    /// # Errors
    ///
    /// Returns the first `FatalError` captured during the node's lifetime.
    pub async fn finalize(&self) -> Result<(), FatalError> {
        if let Some(mut worker) = self.monitor.lock().await.take() {
            worker.stop().await;
        }
        self.shutdown.trigger_shutdown();
        self.shutdown.wait_for_drain(self.config.drain_timeout).await;

        match self.shutdown.fatal_error() {
            Some(err) => Err(err),
            None => {
                info!(state = %self.registry.topology_state(), "Meta server finalized");
                Ok(())
            }
        }
    }
}

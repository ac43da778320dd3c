//! Topology monitor: the periodic evaluation loop driving liveness and the
//! topology state machine.
//!
//! Runs inside a `BackgroundWorker`. Each tick calls `NodeRegistry::evaluate`,
//! publishes gauges, writes the formation checkpoint (outside the registry
//! lock), and escalates fatal conditions to the `ShutdownController`. After the
//! first fatal condition the monitor stops evaluating.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::error::FatalError;
use super::recovery::RecoveryStore;
use super::registry::{EvaluationReport, EvaluationRules, NodeRegistry};
use super::types::TopologyState;
use crate::network::ShutdownController;
use crate::service::worker::BackgroundRunnable;

/// Timing and recovery rules for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub heartbeat_timeout: Duration,
    pub formation_timeout: Duration,
    pub recovery_enabled: bool,
}

/// On-demand work for the monitor worker.
#[derive(Debug)]
pub enum MonitorTask {
    /// Run one evaluation now. Replies `None` once the monitor has halted.
    Evaluate(oneshot::Sender<Option<EvaluationReport>>),
}

pub struct TopologyMonitor {
    registry: Arc<NodeRegistry>,
    settings: MonitorSettings,
    recovery: Option<RecoveryStore>,
    persist_on_formation: bool,
    formation_deadline: Instant,
    shutdown: Arc<ShutdownController>,
    last_state: TopologyState,
    halted: bool,
}

impl TopologyMonitor {
    /// Creates a monitor whose formation window starts now.
    ///
    /// `recovery` is the store to checkpoint into on first formation; pass
    /// `None` when there is nothing to persist (recovery disabled, or the
    /// topology was itself restored from disk).
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        settings: MonitorSettings,
        recovery: Option<RecoveryStore>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        let formation_deadline = Instant::now() + settings.formation_timeout;
        let last_state = registry.topology_state();
        Self {
            persist_on_formation: recovery.is_some(),
            registry,
            settings,
            recovery,
            formation_deadline,
            shutdown,
            last_state,
            halted: false,
        }
    }

    fn rules(&self) -> EvaluationRules {
        EvaluationRules {
            heartbeat_timeout: self.settings.heartbeat_timeout,
            formation_deadline: self.formation_deadline,
            recovery_enabled: self.settings.recovery_enabled,
            persist_on_formation: self.persist_on_formation,
        }
    }

    fn fail(&mut self, err: FatalError) {
        self.halted = true;
        self.shutdown.report_fatal(err);
    }

    /// Runs one evaluation. Returns `None` if the monitor has already halted.
    pub async fn evaluate(&mut self) -> Option<EvaluationReport> {
        if self.halted {
            return None;
        }

        let report = self.registry.evaluate(Instant::now(), &self.rules());
        publish_gauges(&report);

        if report.topology_state != self.last_state {
            info!(
                from = %self.last_state,
                to = %report.topology_state,
                "Topology state changed"
            );
        }
        for node_id in &report.newly_timed_out {
            warn!(
                node_id,
                timeout = ?self.settings.heartbeat_timeout,
                "Node missed its heartbeat deadline"
            );
        }

        if let (Some(checkpoint), Some(store)) =
            (report.checkpoint.clone(), self.recovery.clone())
        {
            let persisted = tokio::task::spawn_blocking(move || store.persist(&checkpoint)).await;
            let written = match persisted {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join) => Err(join.to_string()),
            };
            if let Err(reason) = written {
                self.fail(FatalError::Persist(reason));
                return Some(report);
            }
            self.persist_on_formation = false;
        }

        if report.formation_timed_out {
            if self.settings.recovery_enabled {
                error!(
                    registered = report.registered_nodes,
                    expected = self.registry.total_node_num(),
                    "Topology did not form in time, marked failed"
                );
            } else {
                self.fail(FatalError::FormationTimeout {
                    timeout: self.settings.formation_timeout,
                    registered: report.registered_nodes,
                    expected: self.registry.total_node_num(),
                });
                return Some(report);
            }
        }

        if report.abnormal_node_count > 0 && !self.settings.recovery_enabled {
            self.fail(FatalError::NodeTimeout {
                count: report.abnormal_node_count,
                node_ids: report.timed_out.clone(),
            });
            return Some(report);
        }

        if report.topology_state == TopologyState::Finished
            && self.last_state != TopologyState::Finished
        {
            info!("Every node left, shutting down");
            self.shutdown.trigger_shutdown();
        }
        self.last_state = report.topology_state;

        Some(report)
    }
}

fn publish_gauges(report: &EvaluationReport) {
    let as_gauge = |n: usize| f64::from(u32::try_from(n).unwrap_or(u32::MAX));
    gauge!("meta_server_registered_nodes").set(as_gauge(report.registered_nodes));
    gauge!("meta_server_alive_nodes").set(as_gauge(report.alive_nodes));
    gauge!("meta_server_abnormal_nodes").set(f64::from(report.abnormal_node_count));
}

#[async_trait]
impl BackgroundRunnable for TopologyMonitor {
    type Task = MonitorTask;

    async fn run(&mut self, task: MonitorTask) {
        match task {
            MonitorTask::Evaluate(reply) => {
                let report = self.evaluate().await;
                let _ = reply.send(report);
            }
        }
    }

    async fn on_tick(&mut self) {
        self.evaluate().await;
    }

    async fn shutdown(&mut self) {
        info!(state = %self.registry.topology_state(), "Topology monitor stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

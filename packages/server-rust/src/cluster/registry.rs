//! Node registry: membership, rank bookkeeping, and global topology state.
//!
//! Everything that must change atomically together (the node map, the rank
//! ledger, the topology state, and the abnormal node count) sits behind a
//! single `RwLock`. Critical sections are O(node count) and never perform I/O;
//! the formation checkpoint is handed out as a snapshot for the caller to
//! write after the lock is released.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::{RegisterError, UnregisterError};
use super::rank::RankAllocator;
use super::recovery::PersistedNode;
use super::types::{
    ClusterHealth, HeartbeatAck, NodeInfo, NodeState, Registration, TopologyState,
};

// ---------------------------------------------------------------------------
// Monitor evaluation inputs / outputs
// ---------------------------------------------------------------------------

/// Rules applied by one monitor evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationRules {
    pub heartbeat_timeout: Duration,
    /// Instant after which an `Initializing` topology counts as timed out.
    pub formation_deadline: Instant,
    pub recovery_enabled: bool,
    /// Hand out a snapshot once the group forms (recovery on, nothing persisted yet).
    pub persist_on_formation: bool,
}

/// What a single monitor evaluation observed and changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub previous_state: TopologyState,
    pub topology_state: TopologyState,
    pub registered_nodes: usize,
    pub alive_nodes: usize,
    pub abnormal_node_count: u32,
    /// Node ids that crossed the heartbeat deadline during this evaluation.
    pub newly_timed_out: Vec<String>,
    /// All node ids currently in `Timeout`.
    pub timed_out: Vec<String>,
    /// Set when the formation deadline passed while still `Initializing`.
    pub formation_timed_out: bool,
    /// Registry snapshot to persist, present once per formation.
    pub checkpoint: Option<Vec<PersistedNode>>,
}

// ---------------------------------------------------------------------------
// NodeRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RegistryInner {
    nodes: HashMap<String, NodeInfo>,
    ranks: RankAllocator,
    topology_state: TopologyState,
    abnormal_node_count: u32,
    /// Set by the transition into `Initialized`, drained by the monitor.
    checkpoint_pending: bool,
}

impl RegistryInner {
    fn alive_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_alive()).count()
    }

    fn snapshot(&self) -> Vec<PersistedNode> {
        let mut nodes: Vec<PersistedNode> = self.nodes.values().map(PersistedNode::from).collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    /// Moves `Initializing` to `Initialized` once every expected node is alive.
    fn try_complete_formation(&mut self, total_node_num: u32) -> bool {
        if self.topology_state == TopologyState::Initializing
            && self.nodes.len() == total_node_num as usize
            && self.alive_count() == total_node_num as usize
        {
            self.topology_state = TopologyState::Initialized;
            self.checkpoint_pending = true;
            info!(
                total_node_num,
                "All {} nodes registered, topology initialized", total_node_num
            );
            true
        } else {
            false
        }
    }
}

/// Registry of compute nodes for one coordinator instance.
#[derive(Debug)]
pub struct NodeRegistry {
    total_node_num: u32,
    inner: RwLock<RegistryInner>,
}

impl NodeRegistry {
    /// Creates an empty registry expecting `total_node_num` nodes.
    #[must_use]
    pub fn new(total_node_num: u32) -> Self {
        Self {
            total_node_num,
            inner: RwLock::new(RegistryInner {
                nodes: HashMap::new(),
                ranks: RankAllocator::new(),
                topology_state: TopologyState::Initializing,
                abnormal_node_count: 0,
                checkpoint_pending: false,
            }),
        }
    }

    #[must_use]
    pub fn total_node_num(&self) -> u32 {
        self.total_node_num
    }

    /// Registers a node, or re-acknowledges an already registered one.
    ///
    /// A repeated `node_id` keeps its original rank (`newly_created = false`)
    /// and has its liveness refreshed. A new node with `requested_rank` gets
    /// exactly that rank; otherwise the next unissued rank of its role.
    ///
    /// # Errors
    ///
    /// Returns `RegisterError` if the group is already full or the requested
    /// rank is out of range or already issued.
    pub fn register(
        &self,
        node_id: &str,
        host_name: &str,
        role: &str,
        requested_rank: Option<u32>,
        now: Instant,
    ) -> Result<Registration, RegisterError> {
        let mut inner = self.inner.write();

        if let Some(node) = inner.nodes.get_mut(node_id) {
            if node.host_name != host_name {
                warn!(
                    node_id,
                    old_host = %node.host_name,
                    new_host = host_name,
                    "Node registered again from a different host, keeping its original record"
                );
            }
            if requested_rank.is_some_and(|r| r != node.rank_id) {
                warn!(
                    node_id,
                    rank_id = node.rank_id,
                    "Node registered again asking for a different rank, keeping rank {}",
                    node.rank_id
                );
            }
            let was_timed_out = node.state == NodeState::Timeout;
            node.state = NodeState::Registered;
            node.last_update = now;
            let rank_id = node.rank_id;
            if was_timed_out {
                inner.abnormal_node_count = inner.abnormal_node_count.saturating_sub(1);
            }
            info!(node_id, rank_id, "Node registered again, reusing its rank");
            inner.try_complete_formation(self.total_node_num);
            return Ok(Registration {
                rank_id,
                total_node_num: self.total_node_num,
                newly_created: false,
            });
        }

        if inner.nodes.len() >= self.total_node_num as usize {
            return Err(RegisterError::GroupFull {
                total_node_num: self.total_node_num,
            });
        }

        let rank_id = match requested_rank {
            Some(rank_id) if rank_id >= self.total_node_num => {
                return Err(RegisterError::RankOutOfRange {
                    rank_id,
                    total_node_num: self.total_node_num,
                });
            }
            Some(rank_id) => {
                if !inner.ranks.reserve(role, rank_id) {
                    return Err(RegisterError::RankTaken {
                        role: role.to_string(),
                        rank_id,
                    });
                }
                rank_id
            }
            None => inner.ranks.allocate(role),
        };

        inner.nodes.insert(
            node_id.to_string(),
            NodeInfo::new(
                node_id.to_string(),
                host_name.to_string(),
                role.to_string(),
                rank_id,
                now,
            ),
        );
        info!(
            node_id,
            host_name,
            role,
            rank_id,
            "New node registered, {} of {} nodes present",
            inner.nodes.len(),
            self.total_node_num
        );
        inner.try_complete_formation(self.total_node_num);

        Ok(Registration {
            rank_id,
            total_node_num: self.total_node_num,
            newly_created: true,
        })
    }

    /// Removes a node. Only allowed while the topology is `Initialized`;
    /// removing the last node finishes the topology.
    ///
    /// # Errors
    ///
    /// Returns `UnregisterError::UninitializedTopology` before the group has
    /// formed (the node is kept), or `UnregisterError::InvalidNode` for an
    /// unknown id.
    pub fn unregister(&self, node_id: &str) -> Result<(), UnregisterError> {
        let mut inner = self.inner.write();

        if inner.topology_state != TopologyState::Initialized {
            return Err(UnregisterError::UninitializedTopology {
                state: inner.topology_state,
            });
        }

        let Some(node) = inner.nodes.remove(node_id) else {
            return Err(UnregisterError::InvalidNode {
                node_id: node_id.to_string(),
            });
        };
        if node.state == NodeState::Timeout {
            inner.abnormal_node_count = inner.abnormal_node_count.saturating_sub(1);
        }
        info!(
            node_id,
            rank_id = node.rank_id,
            "Node unregistered, {} nodes remain",
            inner.nodes.len()
        );

        if inner.nodes.is_empty() {
            inner.topology_state = TopologyState::Finished;
            info!("All nodes unregistered, topology finished");
        }
        Ok(())
    }

    /// Refreshes a node's liveness. Returns `None` for unknown ids.
    pub fn heartbeat(&self, node_id: &str, now: Instant) -> Option<HeartbeatAck> {
        let mut inner = self.inner.write();

        let node = inner.nodes.get_mut(node_id)?;
        let was_timed_out = node.state == NodeState::Timeout;
        node.state = NodeState::Registered;
        node.last_update = now;

        if was_timed_out {
            inner.abnormal_node_count = inner.abnormal_node_count.saturating_sub(1);
            info!(node_id, "Node is heartbeating again after a timeout");
        } else {
            debug!(node_id, "Heartbeat");
        }

        Some(HeartbeatAck {
            topology_state: inner.topology_state,
            total_node_num: self.total_node_num,
            abnormal_node_count: inner.abnormal_node_count,
        })
    }

    /// Number of registered nodes, timed out or not.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Number of nodes currently in `Registered` state.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.inner.read().alive_count()
    }

    #[must_use]
    pub fn topology_state(&self) -> TopologyState {
        self.inner.read().topology_state
    }

    /// Host names of `role`, ordered by rank.
    ///
    /// Returns `None` until all `total_node_num` nodes are registered, so
    /// callers never see a partial list. Ranks without an owner are skipped.
    #[must_use]
    pub fn host_names_by_role(&self, role: &str) -> Option<Vec<String>> {
        let inner = self.inner.read();
        if inner.nodes.len() != self.total_node_num as usize {
            return None;
        }

        let mut owners: Vec<(u32, &str)> = inner
            .nodes
            .values()
            .filter(|n| n.role == role)
            .map(|n| (n.rank_id, n.host_name.as_str()))
            .collect();
        owners.sort_unstable_by_key(|(rank, _)| *rank);
        Some(owners.into_iter().map(|(_, host)| host.to_string()).collect())
    }

    /// Persistable copy of every node, ordered by node id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PersistedNode> {
        self.inner.read().snapshot()
    }

    #[must_use]
    pub fn health(&self) -> ClusterHealth {
        let inner = self.inner.read();
        ClusterHealth {
            topology_state: inner.topology_state,
            total_node_num: self.total_node_num,
            registered_nodes: inner.nodes.len(),
            alive_nodes: inner.alive_count(),
            abnormal_nodes: inner.abnormal_node_count,
        }
    }

    /// Repopulates the registry from a recovery snapshot.
    ///
    /// Restored nodes start as `Registered` with `last_update = now` and their
    /// ranks are reserved. If the full group is present the topology goes
    /// straight to `Initialized`; no formation checkpoint is requested since
    /// the state already came from disk.
    pub fn restore(&self, nodes: Vec<PersistedNode>, now: Instant) {
        let mut inner = self.inner.write();
        for node in nodes {
            inner.ranks.reserve(&node.role, node.rank_id);
            inner.nodes.insert(
                node.node_id.clone(),
                NodeInfo::new(node.node_id, node.host_name, node.role, node.rank_id, now),
            );
        }
        info!(
            restored = inner.nodes.len(),
            "Restored {} nodes from recovery file",
            inner.nodes.len()
        );
        if inner.try_complete_formation(self.total_node_num) {
            inner.checkpoint_pending = false;
        }
    }

    /// One monitor tick: marks silent nodes as timed out and advances the
    /// topology state machine.
    pub fn evaluate(&self, now: Instant, rules: &EvaluationRules) -> EvaluationReport {
        let mut inner = self.inner.write();
        let previous_state = inner.topology_state;

        let mut newly_timed_out = Vec::new();
        let mut timed_out = Vec::new();
        for node in inner.nodes.values_mut() {
            if node.state != NodeState::Timeout
                && now.saturating_duration_since(node.last_update) > rules.heartbeat_timeout
            {
                node.state = NodeState::Timeout;
                newly_timed_out.push(node.node_id.clone());
            }
            if node.state == NodeState::Timeout {
                timed_out.push(node.node_id.clone());
            }
        }
        newly_timed_out.sort();
        timed_out.sort();
        inner.abnormal_node_count = u32::try_from(timed_out.len()).unwrap_or(u32::MAX);

        let mut formation_timed_out = false;
        match inner.topology_state {
            TopologyState::Initializing => {
                if !inner.try_complete_formation(self.total_node_num)
                    && now > rules.formation_deadline
                {
                    formation_timed_out = true;
                    if rules.recovery_enabled {
                        inner.topology_state = TopologyState::Failed;
                    }
                }
            }
            TopologyState::Initialized => {
                if inner.nodes.is_empty() {
                    inner.topology_state = TopologyState::Finished;
                }
            }
            TopologyState::Finished | TopologyState::Failed => {}
        }

        let checkpoint = if inner.checkpoint_pending {
            inner.checkpoint_pending = false;
            rules.persist_on_formation.then(|| inner.snapshot())
        } else {
            None
        };

        EvaluationReport {
            previous_state,
            topology_state: inner.topology_state,
            registered_nodes: inner.nodes.len(),
            alive_nodes: inner.alive_count(),
            abnormal_node_count: inner.abnormal_node_count,
            newly_timed_out,
            timed_out,
            formation_timed_out,
            checkpoint,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

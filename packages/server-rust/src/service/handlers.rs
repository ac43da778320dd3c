//! Built-in system message handlers.
//!
//! Each `process_*` maps one request onto the registry or the metadata store
//! and builds the wire response. Rejections are ordinary responses; nothing
//! here fails.

use std::sync::Arc;

use meta_core::messages::{
    DeleteMetadataRequest, DeleteMetadataResponse, GetHostNamesRequest, GetHostNamesResponse,
    HeartbeatRequest, HeartbeatResponse, ReadMetadataRequest, ReadMetadataResponse,
    RegistrationRequest, RegistrationResponse, UnregistrationRequest, UnregistrationResponse,
    WriteMetadataRequest,
};
use meta_core::{MetadataStatus, UnregistrationResult};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cluster::{MetadataStore, NodeRegistry};

#[derive(Debug, Clone)]
pub struct SystemHandlers {
    registry: Arc<NodeRegistry>,
    metadata: Arc<MetadataStore>,
}

impl SystemHandlers {
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>, metadata: Arc<MetadataStore>) -> Self {
        Self { registry, metadata }
    }

    pub fn process_register(&self, req: RegistrationRequest) -> RegistrationResponse {
        match self.registry.register(
            &req.node_id,
            &req.host_name,
            &req.role,
            req.rank_id,
            Instant::now(),
        ) {
            Ok(reg) => RegistrationResponse {
                success: true,
                rank_id: reg.rank_id,
                total_node_num: reg.total_node_num,
            },
            Err(e) => {
                warn!(node_id = %req.node_id, role = %req.role, error = %e, "Registration rejected");
                RegistrationResponse {
                    success: false,
                    rank_id: 0,
                    total_node_num: self.registry.total_node_num(),
                }
            }
        }
    }

    pub fn process_unregister(&self, req: UnregistrationRequest) -> UnregistrationResponse {
        let result = match self.registry.unregister(&req.node_id) {
            Ok(()) => UnregistrationResult::Success,
            Err(e) => {
                warn!(node_id = %req.node_id, error = %e, "Unregistration rejected");
                e.result_code()
            }
        };
        UnregistrationResponse { result }
    }

    /// Returns `None` for a node that never registered; such heartbeats get
    /// no reply.
    pub fn process_heartbeat(&self, req: HeartbeatRequest) -> Option<HeartbeatResponse> {
        let Some(ack) = self.registry.heartbeat(&req.node_id, Instant::now()) else {
            debug!(node_id = %req.node_id, "Heartbeat from unregistered node ignored");
            return None;
        };
        Some(HeartbeatResponse {
            success: true,
            topology_state: ack.topology_state,
            total_node_num: ack.total_node_num,
            abnormal_node_count: ack.abnormal_node_count,
        })
    }

    pub fn process_write_metadata(&self, req: WriteMetadataRequest) {
        self.metadata.write(&req.name, req.value);
    }

    pub fn process_read_metadata(&self, req: ReadMetadataRequest) -> ReadMetadataResponse {
        let value = self.metadata.read(&req.name);
        ReadMetadataResponse {
            status: MetadataStatus::from_found(value.is_some()),
            value,
        }
    }

    pub fn process_delete_metadata(&self, req: DeleteMetadataRequest) -> DeleteMetadataResponse {
        DeleteMetadataResponse {
            status: MetadataStatus::from_found(self.metadata.delete(&req.name)),
        }
    }

    /// Host names of a role in rank order, or `invalid` until the group is full.
    pub fn process_get_host_names(&self, req: GetHostNamesRequest) -> GetHostNamesResponse {
        match self.registry.host_names_by_role(&req.role) {
            Some(host_names) => GetHostNamesResponse {
                status: MetadataStatus::Valid,
                host_names,
            },
            None => {
                debug!(
                    role = %req.role,
                    registered = self.registry.count(),
                    expected = self.registry.total_node_num(),
                    "Host names requested before the group is complete"
                );
                GetHostNamesResponse {
                    status: MetadataStatus::Invalid,
                    host_names: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use meta_core::TopologyState;

    use super::*;

    fn handlers(total: u32) -> SystemHandlers {
        SystemHandlers::new(
            Arc::new(NodeRegistry::new(total)),
            Arc::new(MetadataStore::new()),
        )
    }

    fn register(h: &SystemHandlers, node_id: &str, rank_id: Option<u32>) -> RegistrationResponse {
        h.process_register(RegistrationRequest {
            node_id: node_id.to_string(),
            host_name: format!("host-{node_id}"),
            role: "worker".to_string(),
            rank_id,
        })
    }

    #[test]
    fn register_reports_rank_and_group_size() {
        let h = handlers(2);
        let resp = register(&h, "a", None);
        assert!(resp.success);
        assert_eq!(resp.rank_id, 0);
        assert_eq!(resp.total_node_num, 2);
    }

    #[test]
    fn rejected_registration_still_reports_group_size() {
        let h = handlers(1);
        assert!(register(&h, "a", None).success);
        let resp = register(&h, "b", None);
        assert!(!resp.success);
        assert_eq!(resp.total_node_num, 1);
    }

    #[test]
    fn unregister_maps_result_codes() {
        let h = handlers(1);
        register(&h, "a", None);

        let resp = h.process_unregister(UnregistrationRequest {
            node_id: "ghost".to_string(),
        });
        assert_eq!(resp.result, UnregistrationResult::InvalidNode);

        let resp = h.process_unregister(UnregistrationRequest {
            node_id: "a".to_string(),
        });
        assert_eq!(resp.result, UnregistrationResult::Success);
        assert_eq!(h.registry.topology_state(), TopologyState::Finished);
    }

    #[test]
    fn unregister_before_formation_is_refused() {
        let h = handlers(2);
        register(&h, "a", None);
        let resp = h.process_unregister(UnregistrationRequest {
            node_id: "a".to_string(),
        });
        assert_eq!(resp.result, UnregistrationResult::UninitializedTopology);
        assert_eq!(h.registry.count(), 1);
    }

    #[test]
    fn heartbeat_from_unknown_node_has_no_reply() {
        let h = handlers(1);
        assert!(h
            .process_heartbeat(HeartbeatRequest {
                node_id: "ghost".to_string()
            })
            .is_none());

        register(&h, "a", None);
        let resp = h
            .process_heartbeat(HeartbeatRequest {
                node_id: "a".to_string(),
            })
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.topology_state, TopologyState::Initialized);
    }

    #[test]
    fn metadata_lifecycle() {
        let h = handlers(1);
        h.process_write_metadata(WriteMetadataRequest {
            name: "k".to_string(),
            value: vec![7],
        });

        let read = h.process_read_metadata(ReadMetadataRequest {
            name: "k".to_string(),
        });
        assert_eq!(read.status, MetadataStatus::Valid);
        assert_eq!(read.value, Some(vec![7]));

        let del = h.process_delete_metadata(DeleteMetadataRequest {
            name: "k".to_string(),
        });
        assert_eq!(del.status, MetadataStatus::Valid);

        let read = h.process_read_metadata(ReadMetadataRequest {
            name: "k".to_string(),
        });
        assert_eq!(read.status, MetadataStatus::Invalid);
        assert!(read.value.is_none());

        let del = h.process_delete_metadata(DeleteMetadataRequest {
            name: "k".to_string(),
        });
        assert_eq!(del.status, MetadataStatus::Invalid);
    }

    #[test]
    fn host_names_wait_for_full_group() {
        let h = handlers(2);
        register(&h, "b", Some(1));
        let req = || GetHostNamesRequest {
            role: "worker".to_string(),
        };
        let resp = h.process_get_host_names(req());
        assert_eq!(resp.status, MetadataStatus::Invalid);
        assert!(resp.host_names.is_empty());

        register(&h, "a", Some(0));
        let resp = h.process_get_host_names(req());
        assert_eq!(resp.status, MetadataStatus::Valid);
        assert_eq!(resp.host_names, vec!["host-a", "host-b"]);
    }
}

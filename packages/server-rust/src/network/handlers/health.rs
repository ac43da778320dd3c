//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::cluster::{ClusterHealth, TopologyState};
use crate::network::HealthState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub state: &'static str,
    #[serde(flatten)]
    pub cluster: ClusterHealth,
    pub metadata_entries: usize,
    pub in_flight: u64,
    pub uptime_secs: u64,
}

/// Returns server and topology health as JSON.
///
/// Always returns 200; the `state` and `topologyState` fields say whether the
/// coordinator is actually healthy.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        state: state.shutdown.health_state().as_str(),
        cluster: state.node.health(),
        metadata_entries: state.node.metadata().entry_count(),
        in_flight: state.shutdown.in_flight_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 once the server is serving and the topology has
/// formed, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready
        && state.node.topology_state() == TopologyState::Initialized
    {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;
    use crate::node::MetaServerNode;
    use crate::service::MetaServerConfig;

    fn test_state(total: u32) -> AppState {
        let node = MetaServerNode::new(MetaServerConfig::for_group(total)).unwrap();
        AppState::new(Arc::new(node))
    }

    fn register(state: &AppState, node_id: &str) {
        state
            .node
            .registry()
            .register(node_id, "h", "worker", None, Instant::now())
            .unwrap();
    }

    async fn health_json(state: AppState) -> serde_json::Value {
        serde_json::to_value(health_handler(State(state)).await.0).unwrap()
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state(2);
        state.shutdown.set_ready();
        register(&state, "a");
        state.node.metadata().write("master_addr", b"h:1".to_vec());

        let json = health_json(state).await;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["topologyState"], "initializing");
        assert_eq!(json["totalNodeNum"], 2);
        assert_eq!(json["registeredNodes"], 1);
        assert_eq!(json["aliveNodes"], 1);
        assert_eq!(json["abnormalNodes"], 0);
        assert_eq!(json["metadataEntries"], 1);
        assert_eq!(json["inFlight"], 0);
        assert!(json["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state(1);
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();

        let json = health_json(state).await;
        assert_eq!(json["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_requires_formed_topology() {
        let state = test_state(1);
        state.shutdown.set_ready();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        register(&state, "a");
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

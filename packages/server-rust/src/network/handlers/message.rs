//! Message endpoints: `POST /v1/system/{id}` and `POST /v1/user/{name}`.
//!
//! The request body is the `MsgPack` payload. The router's `Reply` maps onto
//! the status code: 200 with a `MsgPack` body, 204 for no response, 404 for an
//! unknown message, 400 for a malformed payload, and 503 while not serving.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use meta_core::MessageKey;
use tower::ServiceExt;

use super::AppState;
use crate::network::HealthState;
use crate::service::{InboundMessage, Reply, RouterService};

const MSGPACK: &str = "application/msgpack";

pub async fn system_message_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    body: Bytes,
) -> Response {
    dispatch(
        &state,
        InboundMessage {
            key: MessageKey::System(id),
            payload: body,
        },
    )
    .await
}

pub async fn user_message_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    dispatch(&state, InboundMessage::user(name, body)).await
}

async fn dispatch(state: &AppState, msg: InboundMessage) -> Response {
    if state.shutdown.health_state() != HealthState::Ready {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is not accepting requests").into_response();
    }
    let _guard = state.shutdown.in_flight_guard();

    let reply = RouterService::new(state.node.router())
        .oneshot(msg)
        .await
        .unwrap_or_else(|never| match never {});
    reply_response(reply)
}

fn reply_response(reply: Reply) -> Response {
    match reply {
        Reply::Payload(bytes) => ([(CONTENT_TYPE, MSGPACK)], bytes).into_response(),
        Reply::NoResponse => StatusCode::NO_CONTENT.into_response(),
        Reply::UnknownMessage(key) => {
            (StatusCode::NOT_FOUND, format!("unknown message {key}")).into_response()
        }
        Reply::Malformed { reason, .. } => (StatusCode::BAD_REQUEST, reason).into_response(),
        Reply::Internal { reason, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use meta_core::messages::{RegistrationRequest, RegistrationResponse};
    use meta_core::{decode, encode, SystemMessage};

    use super::*;
    use crate::node::MetaServerNode;
    use crate::service::MetaServerConfig;

    fn ready_state() -> AppState {
        let node = MetaServerNode::new(MetaServerConfig::for_group(1)).unwrap();
        let state = AppState::new(Arc::new(node));
        state.shutdown.set_ready();
        state
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn registration_returns_msgpack() {
        let state = ready_state();
        let body = encode(&RegistrationRequest {
            node_id: "n0".to_string(),
            host_name: "h0".to_string(),
            role: "worker".to_string(),
            rank_id: None,
        })
        .unwrap();

        let response = system_message_handler(
            State(state),
            Path(SystemMessage::Registration.id()),
            Bytes::from(body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], MSGPACK);

        let resp: RegistrationResponse = decode(&body_bytes(response).await).unwrap();
        assert!(resp.success);
        assert_eq!(resp.rank_id, 0);
    }

    #[tokio::test]
    async fn unknown_and_malformed_map_to_client_errors() {
        let state = ready_state();

        let response = system_message_handler(State(state.clone()), Path(77), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = system_message_handler(
            State(state.clone()),
            Path(SystemMessage::Heartbeat.id()),
            Bytes::from_static(b"\xc1"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            user_message_handler(State(state), Path("missing".to_string()), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn silent_handlers_answer_no_content() {
        let state = ready_state();
        state.node.register_handler("sink", |_| None);
        let response =
            user_message_handler(State(state), Path("sink".to_string()), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn draining_server_refuses_messages() {
        let state = ready_state();
        state.shutdown.trigger_shutdown();
        let response = system_message_handler(State(state), Path(3), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

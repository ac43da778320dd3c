//! Message routing: classifies inbound messages and dispatches them to the
//! built-in system handlers or to user handlers bound by name.

use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use meta_core::{encode, MessageKey, SystemMessage};
use metrics::counter;
use serde::Serialize;
use tower::Service;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::handlers::SystemHandlers;
use super::operation::{InboundMessage, Operation, Reply};

/// A user message handler. Returns `None` to send no response.
pub type UserHandler = Arc<dyn Fn(Bytes) -> Option<Bytes> + Send + Sync>;

// ---------------------------------------------------------------------------
// MessageRouter
// ---------------------------------------------------------------------------

/// Routes `InboundMessage` values to their handler.
///
/// System messages are fixed; user handlers may be bound at any time and are
/// looked up per message. Every routed message is counted in
/// `meta_server_messages_total{message, outcome}`.
pub struct MessageRouter {
    system: SystemHandlers,
    user: DashMap<String, UserHandler>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(system: SystemHandlers) -> Self {
        Self {
            system,
            user: DashMap::new(),
        }
    }

    /// Binds `handler` to the user message `name`.
    ///
    /// Returns `false` and leaves the existing binding in place if `name` is
    /// already bound.
    pub fn register_handler<F>(&self, name: impl Into<String>, handler: F) -> bool
    where
        F: Fn(Bytes) -> Option<Bytes> + Send + Sync + 'static,
    {
        match self.user.entry(name.into()) {
            Entry::Occupied(e) => {
                warn!(name = %e.key(), "User message handler already registered");
                false
            }
            Entry::Vacant(e) => {
                info!(name = %e.key(), "User message handler registered");
                e.insert(Arc::new(handler));
                true
            }
        }
    }

    /// Routes one message and returns the reply for the transport.
    pub fn route(&self, msg: InboundMessage) -> Reply {
        let key = msg.key.clone();
        let reply = match classify(msg) {
            Ok(op) => {
                debug!(key = %key, operation = op.label(), "Routing message");
                self.dispatch(&key, op)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Message rejected");
                e.into_reply(key.clone())
            }
        };
        counter!(
            "meta_server_messages_total",
            "message" => metric_label(&key),
            "outcome" => reply.outcome()
        )
        .increment(1);
        reply
    }

    fn dispatch(&self, key: &MessageKey, op: Operation) -> Reply {
        let h = &self.system;
        match op {
            Operation::Register(req) => encode_reply(key, &h.process_register(req)),
            Operation::Unregister(req) => encode_reply(key, &h.process_unregister(req)),
            Operation::Heartbeat(req) => match h.process_heartbeat(req) {
                Some(resp) => encode_reply(key, &resp),
                None => Reply::NoResponse,
            },
            Operation::WriteMetadata(req) => {
                h.process_write_metadata(req);
                Reply::NoResponse
            }
            Operation::ReadMetadata(req) => encode_reply(key, &h.process_read_metadata(req)),
            Operation::DeleteMetadata(req) => encode_reply(key, &h.process_delete_metadata(req)),
            Operation::GetHostNames(req) => encode_reply(key, &h.process_get_host_names(req)),
            Operation::User { name, payload } => {
                // Clone the handler out so the map shard is not held while it runs.
                let handler = self.user.get(&name).map(|entry| Arc::clone(entry.value()));
                match handler {
                    Some(handler) => {
                        debug!(name = %name, len = payload.len(), "Dispatching user message");
                        handler(payload).map_or(Reply::NoResponse, Reply::Payload)
                    }
                    None => {
                        warn!(name = %name, "No handler for user message");
                        Reply::UnknownMessage(key.clone())
                    }
                }
            }
        }
    }
}

fn encode_reply<T: Serialize>(key: &MessageKey, response: &T) -> Reply {
    match encode(response) {
        Ok(bytes) => Reply::Payload(Bytes::from(bytes)),
        Err(e) => Reply::Internal {
            key: key.clone(),
            reason: e.to_string(),
        },
    }
}

/// Bounded label set: user message names are collapsed into one value.
fn metric_label(key: &MessageKey) -> &'static str {
    match key {
        MessageKey::System(id) => SystemMessage::from_id(*id).map_or("unknown", SystemMessage::as_str),
        MessageKey::User(_) => "user",
    }
}

// ---------------------------------------------------------------------------
// RouterService
// ---------------------------------------------------------------------------

/// `tower::Service` view of a shared `MessageRouter`, for transports built on
/// tower. Routing never fails; every outcome is a `Reply`.
#[derive(Clone)]
pub struct RouterService {
    router: Arc<MessageRouter>,
}

impl RouterService {
    #[must_use]
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self { router }
    }
}

impl Service<InboundMessage> for RouterService {
    type Response = Reply;
    type Error = Infallible;
    type Future = Ready<Result<Reply, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, msg: InboundMessage) -> Self::Future {
        ready(Ok(self.router.route(msg)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use meta_core::messages::{
        HeartbeatRequest, ReadMetadataRequest, ReadMetadataResponse, RegistrationRequest,
        RegistrationResponse, WriteMetadataRequest,
    };
    use meta_core::MetadataStatus;
    use tower::ServiceExt;

    use super::*;
    use crate::cluster::{MetadataStore, NodeRegistry};

    fn router(total: u32) -> MessageRouter {
        MessageRouter::new(SystemHandlers::new(
            Arc::new(NodeRegistry::new(total)),
            Arc::new(MetadataStore::new()),
        ))
    }

    fn system<T: Serialize>(message: SystemMessage, body: &T) -> InboundMessage {
        InboundMessage::system(message, encode(body).unwrap())
    }

    #[test]
    fn registration_round_trip() {
        let router = router(2);
        let reply = router.route(system(
            SystemMessage::Registration,
            &RegistrationRequest {
                node_id: "n0".to_string(),
                host_name: "h0".to_string(),
                role: "worker".to_string(),
                rank_id: None,
            },
        ));
        let resp: RegistrationResponse = reply.decode().unwrap().unwrap();
        assert!(resp.success);
        assert_eq!(resp.total_node_num, 2);
    }

    #[test]
    fn write_has_no_response_and_read_sees_it() {
        let router = router(1);
        let reply = router.route(system(
            SystemMessage::WriteMetadata,
            &WriteMetadataRequest {
                name: "nccl".to_string(),
                value: vec![1, 2],
            },
        ));
        assert_eq!(reply, Reply::NoResponse);

        let reply = router.route(system(
            SystemMessage::ReadMetadata,
            &ReadMetadataRequest {
                name: "nccl".to_string(),
            },
        ));
        let resp: ReadMetadataResponse = reply.decode().unwrap().unwrap();
        assert_eq!(resp.status, MetadataStatus::Valid);
        assert_eq!(resp.value, Some(vec![1, 2]));
    }

    #[test]
    fn heartbeat_from_stranger_has_no_response() {
        let router = router(1);
        let reply = router.route(system(
            SystemMessage::Heartbeat,
            &HeartbeatRequest {
                node_id: "ghost".to_string(),
            },
        ));
        assert_eq!(reply, Reply::NoResponse);
    }

    #[test]
    fn unknown_keys_are_answered_explicitly() {
        let router = router(1);
        let reply = router.route(InboundMessage {
            key: MessageKey::System(42),
            payload: Bytes::new(),
        });
        assert_eq!(reply, Reply::UnknownMessage(MessageKey::System(42)));

        let reply = router.route(InboundMessage::user("nobody", Bytes::new()));
        assert_eq!(reply, Reply::UnknownMessage(MessageKey::user("nobody")));
    }

    #[test]
    fn malformed_payload_is_reported_not_fatal() {
        let router = router(1);
        let reply = router.route(InboundMessage::system(
            SystemMessage::Registration,
            Bytes::from_static(b"\xff\x00"),
        ));
        assert!(matches!(reply, Reply::Malformed { .. }));
        assert_eq!(reply.outcome(), "malformed");
    }

    #[test]
    fn user_handlers_bind_once() {
        let router = router(1);
        assert!(router.register_handler("echo", Some));
        assert!(!router.register_handler("echo", |_| None));

        let reply = router.route(InboundMessage::user("echo", Bytes::from_static(b"ping")));
        assert_eq!(reply, Reply::Payload(Bytes::from_static(b"ping")));
    }

    #[test]
    fn user_handler_may_stay_silent() {
        let router = router(1);
        router.register_handler("sink", |_| None);
        let reply = router.route(InboundMessage::user("sink", Bytes::from_static(b"x")));
        assert_eq!(reply, Reply::NoResponse);
    }

    #[test]
    fn metric_labels_are_bounded() {
        assert_eq!(metric_label(&MessageKey::system(SystemMessage::Heartbeat)), "heartbeat");
        assert_eq!(metric_label(&MessageKey::System(99)), "unknown");
        assert_eq!(metric_label(&MessageKey::user("anything")), "user");
    }

    #[tokio::test]
    async fn service_routes_via_oneshot() {
        let router = Arc::new(router(1));
        router.register_handler("echo", Some);
        let service = RouterService::new(Arc::clone(&router));

        let reply = service
            .oneshot(InboundMessage::user("echo", Bytes::from_static(b"hi")))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Payload(Bytes::from_static(b"hi")));
    }
}

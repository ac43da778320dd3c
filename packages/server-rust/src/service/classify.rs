//! Message classification: converts an `InboundMessage` into a typed `Operation`.

use meta_core::{decode, MessageKey, SystemMessage};
use serde::de::DeserializeOwned;

use super::operation::{ClassifyError, InboundMessage, Operation};

fn payload<T: DeserializeOwned>(message: SystemMessage, bytes: &[u8]) -> Result<T, ClassifyError> {
    decode(bytes).map_err(|source| ClassifyError::Malformed {
        message: message.as_str(),
        source,
    })
}

/// Classifies an inbound message.
///
/// System ids decode their payload into the matching request struct. User
/// messages pass through untouched; whether a handler exists is decided by
/// the router.
///
/// # Errors
///
/// - `ClassifyError::Unknown` for a system id with no built-in message
/// - `ClassifyError::Malformed` when the payload does not decode
pub fn classify(msg: InboundMessage) -> Result<Operation, ClassifyError> {
    let id = match msg.key {
        MessageKey::User(name) => {
            return Ok(Operation::User {
                name,
                payload: msg.payload,
            })
        }
        MessageKey::System(id) => id,
    };
    let Some(message) = SystemMessage::from_id(id) else {
        return Err(ClassifyError::Unknown {
            key: MessageKey::System(id),
        });
    };

    let bytes = msg.payload.as_ref();
    Ok(match message {
        SystemMessage::Registration => Operation::Register(payload(message, bytes)?),
        SystemMessage::Unregistration => Operation::Unregister(payload(message, bytes)?),
        SystemMessage::Heartbeat => Operation::Heartbeat(payload(message, bytes)?),
        SystemMessage::WriteMetadata => Operation::WriteMetadata(payload(message, bytes)?),
        SystemMessage::ReadMetadata => Operation::ReadMetadata(payload(message, bytes)?),
        SystemMessage::DeleteMetadata => Operation::DeleteMetadata(payload(message, bytes)?),
        SystemMessage::GetHostNames => Operation::GetHostNames(payload(message, bytes)?),
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use meta_core::encode;
    use meta_core::messages::{HeartbeatRequest, RegistrationRequest, WriteMetadataRequest};

    use super::*;

    #[test]
    fn system_messages_decode_their_payload() {
        let req = RegistrationRequest {
            node_id: "node-0".to_string(),
            host_name: "10.0.0.1".to_string(),
            role: "worker".to_string(),
            rank_id: None,
        };
        let msg = InboundMessage::system(SystemMessage::Registration, encode(&req).unwrap());
        assert_eq!(classify(msg).unwrap(), Operation::Register(req));

        let req = WriteMetadataRequest {
            name: "k".to_string(),
            value: vec![0, 255],
        };
        let msg = InboundMessage::system(SystemMessage::WriteMetadata, encode(&req).unwrap());
        assert_eq!(classify(msg).unwrap(), Operation::WriteMetadata(req));
    }

    #[test]
    fn user_messages_pass_through() {
        let msg = InboundMessage::user("barrier", Bytes::from_static(b"opaque"));
        assert_eq!(
            classify(msg).unwrap(),
            Operation::User {
                name: "barrier".to_string(),
                payload: Bytes::from_static(b"opaque"),
            }
        );
    }

    #[test]
    fn unknown_system_id_is_rejected() {
        let msg = InboundMessage {
            key: MessageKey::System(99),
            payload: Bytes::new(),
        };
        assert!(matches!(
            classify(msg),
            Err(ClassifyError::Unknown {
                key: MessageKey::System(99)
            })
        ));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        // A heartbeat body sent as a registration is missing required fields.
        let body = encode(&HeartbeatRequest {
            node_id: "n".to_string(),
        })
        .unwrap();
        let msg = InboundMessage::system(SystemMessage::Registration, body);
        assert!(matches!(
            classify(msg),
            Err(ClassifyError::Malformed {
                message: "registration",
                ..
            })
        ));
    }

    #[test]
    fn empty_payload_is_malformed() {
        let msg = InboundMessage::system(SystemMessage::Heartbeat, Bytes::new());
        assert!(matches!(classify(msg), Err(ClassifyError::Malformed { .. })));
    }
}

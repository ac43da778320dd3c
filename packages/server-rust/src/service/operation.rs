//! Inbound messages, their typed operations, and router replies.

use bytes::Bytes;
use meta_core::messages::{
    DeleteMetadataRequest, GetHostNamesRequest, HeartbeatRequest, ReadMetadataRequest,
    RegistrationRequest, UnregistrationRequest, WriteMetadataRequest,
};
use meta_core::{CodecError, MessageKey, SystemMessage};

/// A request as delivered by the transport: an address plus opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: MessageKey,
    pub payload: Bytes,
}

impl InboundMessage {
    #[must_use]
    pub fn system(message: SystemMessage, payload: impl Into<Bytes>) -> Self {
        Self {
            key: MessageKey::system(message),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn user(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: MessageKey::user(name),
            payload: payload.into(),
        }
    }
}

/// Typed operation produced by classifying an `InboundMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Register(RegistrationRequest),
    Unregister(UnregistrationRequest),
    Heartbeat(HeartbeatRequest),
    WriteMetadata(WriteMetadataRequest),
    ReadMetadata(ReadMetadataRequest),
    DeleteMetadata(DeleteMetadataRequest),
    GetHostNames(GetHostNamesRequest),
    /// Dispatched to a registered user handler with the payload untouched.
    User { name: String, payload: Bytes },
}

impl Operation {
    /// Label used in logs and the `message` metrics dimension.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Register(_) => SystemMessage::Registration.as_str(),
            Self::Unregister(_) => SystemMessage::Unregistration.as_str(),
            Self::Heartbeat(_) => SystemMessage::Heartbeat.as_str(),
            Self::WriteMetadata(_) => SystemMessage::WriteMetadata.as_str(),
            Self::ReadMetadata(_) => SystemMessage::ReadMetadata.as_str(),
            Self::DeleteMetadata(_) => SystemMessage::DeleteMetadata.as_str(),
            Self::GetHostNames(_) => SystemMessage::GetHostNames.as_str(),
            Self::User { name, .. } => name,
        }
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Encoded response payload.
    Payload(Bytes),
    /// The handler ran and deliberately sends nothing back.
    NoResponse,
    /// No system message or user handler matches the key.
    UnknownMessage(MessageKey),
    /// The payload did not decode into the message's schema.
    Malformed { key: MessageKey, reason: String },
    /// The response could not be produced.
    Internal { key: MessageKey, reason: String },
}

impl Reply {
    /// Outcome label for the `outcome` metrics dimension.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Payload(_) => "payload",
            Self::NoResponse => "no_response",
            Self::UnknownMessage(_) => "unknown",
            Self::Malformed { .. } => "malformed",
            Self::Internal { .. } => "internal",
        }
    }

    /// Decodes a payload reply. Returns `None` for every other variant.
    #[must_use]
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, CodecError>> {
        match self {
            Self::Payload(bytes) => Some(meta_core::decode(bytes)),
            _ => None,
        }
    }
}

/// Errors from classifying an `InboundMessage` into an `Operation`.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("unknown message {key}")]
    Unknown { key: MessageKey },
    #[error("malformed {message} payload: {source}")]
    Malformed {
        message: &'static str,
        #[source]
        source: CodecError,
    },
}

impl ClassifyError {
    /// Converts the error into the reply sent back for `key`.
    #[must_use]
    pub fn into_reply(self, key: MessageKey) -> Reply {
        match self {
            Self::Unknown { key } => Reply::UnknownMessage(key),
            Self::Malformed { .. } => Reply::Malformed {
                key,
                reason: self.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_message_names() {
        let op = Operation::Heartbeat(HeartbeatRequest {
            node_id: "n".to_string(),
        });
        assert_eq!(op.label(), "heartbeat");

        let op = Operation::User {
            name: "barrier".to_string(),
            payload: Bytes::new(),
        };
        assert_eq!(op.label(), "barrier");
    }

    #[test]
    fn outcomes_are_distinct() {
        let key = MessageKey::user("x");
        let replies = [
            Reply::Payload(Bytes::new()),
            Reply::NoResponse,
            Reply::UnknownMessage(key.clone()),
            Reply::Malformed {
                key: key.clone(),
                reason: String::new(),
            },
            Reply::Internal {
                key,
                reason: String::new(),
            },
        ];
        let outcomes: std::collections::HashSet<_> = replies.iter().map(Reply::outcome).collect();
        assert_eq!(outcomes.len(), replies.len());
    }

    #[test]
    fn malformed_reply_carries_decode_text() {
        let source = meta_core::decode::<HeartbeatRequest>(b"\xc1").unwrap_err();
        let err = ClassifyError::Malformed {
            message: "heartbeat",
            source,
        };
        let reply = err.into_reply(MessageKey::system(SystemMessage::Heartbeat));
        match reply {
            Reply::Malformed { reason, .. } => assert!(reason.starts_with("malformed heartbeat")),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}

//! Wire schemas for the meta server protocol.
//!
//! Requests are addressed either by a fixed numeric [`SystemMessage`] id or by
//! a free-form user message name (see [`MessageKey`]). Payload structs use
//! camelCase field names and are encoded with [`crate::codec::encode`].

pub mod membership;
pub mod metadata;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use membership::{
    HeartbeatRequest, HeartbeatResponse, RegistrationRequest, RegistrationResponse,
    UnregistrationRequest, UnregistrationResponse,
};
pub use metadata::{
    DeleteMetadataRequest, DeleteMetadataResponse, GetHostNamesRequest, GetHostNamesResponse,
    ReadMetadataRequest, ReadMetadataResponse, WriteMetadataRequest,
};

// ---------------------------------------------------------------------------
// SystemMessage
// ---------------------------------------------------------------------------

/// Built-in coordinator messages. The discriminants are the wire ids and
/// must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SystemMessage {
    Registration = 1,
    Unregistration = 2,
    Heartbeat = 3,
    WriteMetadata = 4,
    ReadMetadata = 5,
    DeleteMetadata = 6,
    GetHostNames = 7,
}

impl SystemMessage {
    pub const ALL: [SystemMessage; 7] = [
        Self::Registration,
        Self::Unregistration,
        Self::Heartbeat,
        Self::WriteMetadata,
        Self::ReadMetadata,
        Self::DeleteMetadata,
        Self::GetHostNames,
    ];

    /// Numeric wire id.
    #[must_use]
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Looks up a system message by wire id.
    #[must_use]
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// Stable snake_case name, used as a metrics label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Unregistration => "unregistration",
            Self::Heartbeat => "heartbeat",
            Self::WriteMetadata => "write_metadata",
            Self::ReadMetadata => "read_metadata",
            Self::DeleteMetadata => "delete_metadata",
            Self::GetHostNames => "get_host_names",
        }
    }
}

// ---------------------------------------------------------------------------
// MessageKey
// ---------------------------------------------------------------------------

/// Address of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "camelCase")]
pub enum MessageKey {
    /// A built-in message, by wire id. Unknown ids are representable so the
    /// router can answer them explicitly.
    System(u32),
    /// A user message bound through handler registration.
    User(String),
}

impl MessageKey {
    #[must_use]
    pub fn system(message: SystemMessage) -> Self {
        Self::System(message.id())
    }

    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self::User(name.into())
    }
}

impl From<SystemMessage> for MessageKey {
    fn from(message: SystemMessage) -> Self {
        Self::system(message)
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(id) => match SystemMessage::from_id(*id) {
                Some(m) => write!(f, "system:{}", m.as_str()),
                None => write!(f, "system:{id}"),
            },
            Self::User(name) => write!(f, "user:{name}"),
        }
    }
}

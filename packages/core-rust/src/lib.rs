//! Meta server core: system message ids, wire payloads, and the `MsgPack` codec
//! shared by the coordinator and the compute nodes that talk to it.

pub mod codec;
pub mod messages;
pub mod types;

pub use codec::{decode, encode, CodecError};
pub use messages::{MessageKey, SystemMessage};
pub use types::{MetadataStatus, TopologyState, UnregistrationResult};

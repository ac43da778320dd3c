//! `MsgPack` payload codec.
//!
//! All payloads are encoded as named maps (`rmp_serde::to_vec_named`) so field
//! order never matters on the wire and optional fields can be omitted.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors produced while encoding or decoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a payload as a `MsgPack` named map.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decodes a payload produced by [`encode`].
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes are not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::messages::{RegistrationRequest, RegistrationResponse, WriteMetadataRequest};

    #[test]
    fn decode_rejects_garbage() {
        let result: Result<RegistrationRequest, _> = decode(&[0xC1, 0x00, 0xFF]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let bytes = encode(&RegistrationResponse {
            success: true,
            rank_id: 0,
            total_node_num: 1,
        })
        .unwrap();
        let result: Result<RegistrationRequest, _> = decode(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn encoded_payload_uses_camel_case_names() {
        let bytes = encode(&RegistrationResponse {
            success: true,
            rank_id: 7,
            total_node_num: 8,
        })
        .unwrap();
        let haystack = String::from_utf8_lossy(&bytes);
        assert!(haystack.contains("rankId"));
        assert!(haystack.contains("totalNodeNum"));
    }

    proptest! {
        #[test]
        fn registration_survives_the_wire(
            node_id in "[a-z0-9-]{1,24}",
            host_name in "[a-z0-9.]{1,32}",
            role in "[a-z]{1,12}",
            rank_id in proptest::option::of(any::<u32>()),
        ) {
            let req = RegistrationRequest { node_id, host_name, role, rank_id };
            let bytes = encode(&req).unwrap();
            prop_assert_eq!(
                String::from_utf8_lossy(&bytes).contains("rankId"),
                rank_id.is_some()
            );
            let decoded: RegistrationRequest = decode(&bytes).unwrap();
            prop_assert_eq!(decoded, req);
        }

        #[test]
        fn metadata_values_keep_every_byte(
            name in ".{0,16}",
            value in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let req = WriteMetadataRequest { name, value };
            let decoded: WriteMetadataRequest = decode(&encode(&req).unwrap()).unwrap();
            prop_assert_eq!(decoded, req);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode::<RegistrationRequest>(&bytes);
        }
    }
}

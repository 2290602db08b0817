//! Internal encoding helpers for records persisted in the content store.
//!
//! Bincode with the standard config is the canonical encoding for
//! structured records. Hashes and counters are stored as raw fixed-width
//! bytes with a length check on read.

use bytes::Bytes;
use terrace_core::error::TerraceError;
use terrace_core::types::Hash256;

pub(crate) fn encode<T: bincode::Encode>(value: &T) -> Result<Bytes, TerraceError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map(Bytes::from)
        .map_err(|e| TerraceError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, TerraceError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| TerraceError::Serialization(e.to_string()))
}

pub(crate) fn hash_bytes(hash: &Hash256) -> Bytes {
    Bytes::copy_from_slice(hash.as_bytes())
}

pub(crate) fn hash_from_bytes(bytes: &[u8]) -> Result<Hash256, TerraceError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TerraceError::Storage(format!("invalid hash row length {}", bytes.len())))?;
    Ok(Hash256(arr))
}

pub(crate) fn u64_bytes(value: u64) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

pub(crate) fn u64_from_bytes(bytes: &[u8]) -> Result<u64, TerraceError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| TerraceError::Storage(format!("invalid counter row length {}", bytes.len())))?;
    Ok(u64::from_le_bytes(arr))
}

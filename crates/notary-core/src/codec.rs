//! Canonical binary encoding for persisted entities.
//!
//! Every stored value is the bincode (standard config) encoding of its entity.
//! Decoding is strict: the whole buffer must be consumed, so truncated or
//! padded values fail instead of yielding a partially-populated entity.

use crate::error::CoreError;

/// Encode `value` with the canonical configuration.
pub fn encode<T: bincode::Encode>(kind: &'static str, value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(|e| CoreError::Encode {
        kind,
        reason: e.to_string(),
    })
}

/// Decode a `T` from `bytes`, rejecting trailing data.
pub fn decode<T: bincode::Decode<()>>(kind: &'static str, bytes: &[u8]) -> Result<T, CoreError> {
    let (value, read): (T, usize) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CoreError::Decode {
            kind,
            reason: e.to_string(),
        })?;
    if read != bytes.len() {
        return Err(CoreError::Decode {
            kind,
            reason: format!("{} trailing bytes", bytes.len() - read),
        });
    }
    Ok(value)
}

//! Row set payload encoding for the shared cache slot.
//!
//! Payloads are JSON arrays of objects; column order and scalar types
//! survive the round trip (see [`roster_core::Row`]).

use roster_core::{CodecError, RowSet};

/// Serialize a row set into cache bytes.
pub fn encode_row_set(rows: &RowSet) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(rows).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Deserialize cache bytes into a row set.
pub fn decode_row_set(bytes: &[u8]) -> Result<RowSet, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        reason: e.to_string(),
    })
}

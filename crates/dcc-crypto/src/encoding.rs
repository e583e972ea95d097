//! Text encodings used between the server, lab partners and the signing
//! service.
//!
//! Everything base64 in this system is the standard alphabet with padding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::EncodingError;

/// Re-encode a hex digest as base64, the form the signing service expects.
pub fn hex_hash_to_base64(hex_hash: &str) -> Result<String, EncodingError> {
    let bytes = hex::decode(hex_hash).map_err(|e| EncodingError::Hex(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

/// Decode standard base64.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, EncodingError> {
    STANDARD
        .decode(input)
        .map_err(|e| EncodingError::Base64(e.to_string()))
}

/// Encode bytes as standard base64.
pub fn encode_base64(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Whether `input` is non-empty, well-formed standard base64.
pub fn is_base64(input: &str) -> bool {
    !input.is_empty() && STANDARD.decode(input).is_ok()
}

//! # dcc-crypto: Signed Object Surgery and Wire Encodings
//!
//! - **COSE_Sign1 splice.** [`replace_dcc_payload`] swaps the payload of a
//!   signed object while leaving every other byte where it was.
//! - **Encodings.** Hex digests are re-encoded as base64 for the signing
//!   service; lab uploads are checked for well-formed base64.
//!
//! No key material is handled here. Signing happens in an external service.

pub mod cose;
pub mod encoding;
pub mod error;

pub use cose::{parse_sign1, replace_dcc_payload, replace_payload_bytes, Sign1Parts};
pub use encoding::{decode_base64, encode_base64, hex_hash_to_base64, is_base64};
pub use error::{CoseError, EncodingError};

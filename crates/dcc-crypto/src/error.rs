//! Error types for the binary and text encodings handled by this crate.

use thiserror::Error;

/// Failure to read or rewrite a signed DCC object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoseError {
    /// A base64 argument could not be decoded.
    #[error("invalid base64 in {field}: {reason}")]
    Base64 {
        /// Which argument was malformed.
        field: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// The CBOR item stream is truncated or syntactically invalid.
    #[error("malformed CBOR at offset {offset}: {reason}")]
    Malformed {
        /// Byte offset into the decoded object.
        offset: usize,
        /// Decoder message.
        reason: String,
    },

    /// The top-level item is not an array.
    #[error("expected a CBOR array at offset {offset}")]
    NotAnArray {
        /// Byte offset of the offending item.
        offset: usize,
    },

    /// The array does not hold exactly four elements.
    #[error("expected 4 elements in signed object, found {found}")]
    ElementCount {
        /// Number of elements actually present.
        found: usize,
    },

    /// Bytes follow the end of the signed object.
    #[error("{count} trailing bytes after signed object")]
    TrailingBytes {
        /// Number of unexpected bytes.
        count: usize,
    },

    /// Nesting deeper than the decoder is willing to follow.
    #[error("CBOR nesting exceeds depth {0}")]
    TooDeep(usize),

    /// Writing the replacement payload failed.
    #[error("failed to encode replacement payload: {0}")]
    Encode(String),
}

/// Failure to convert between the text encodings used on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    Hex(String),

    /// Input was not valid standard base64.
    #[error("invalid base64: {0}")]
    Base64(String),
}

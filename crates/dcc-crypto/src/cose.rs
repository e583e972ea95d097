//! # COSE_Sign1 Payload Splice
//!
//! The signing service returns a COSE_Sign1 object whose payload is a
//! placeholder. Before delivery the encrypted payload uploaded by the lab is
//! spliced into element 2, leaving the envelope untouched.
//!
//! ## Layout
//!
//! ```text
//! [tag 18]? array(4) [ protected, unprotected, payload, signature ]
//!                                              ^^^^^^^
//!                                              replaced
//! ```
//!
//! ## Byte preservation
//!
//! The object is never decoded into a value tree and re-encoded. The item
//! stream is walked with `ciborium-ll` to find the byte range of each
//! element, and the output is the original bytes with only the payload range
//! substituted. Tags, header encodings, non-canonical lengths in the other
//! elements and the array framing all survive exactly.

use ciborium::Value;
use ciborium_ll::{Decoder, Header};

use crate::encoding::{decode_base64, encode_base64};
use crate::error::CoseError;

const ELEMENTS: usize = 4;
const PAYLOAD_INDEX: usize = 2;
const MAX_DEPTH: usize = 32;
const BREAK: u8 = 0xff;

/// Byte ranges of a parsed COSE_Sign1 object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sign1Parts<'a> {
    input: &'a [u8],
    /// End of any tags preceding the array.
    tags_end: usize,
    elements: [(usize, usize); ELEMENTS],
}

impl<'a> Sign1Parts<'a> {
    /// The raw encoded bytes of element `index` (0..4).
    pub fn element(&self, index: usize) -> &'a [u8] {
        let (start, end) = self.elements[index];
        &self.input[start..end]
    }

    /// The raw bytes of any tags in front of the array.
    pub fn tag_prefix(&self) -> &'a [u8] {
        &self.input[..self.tags_end]
    }
}

/// Locate the four elements of a COSE_Sign1 object.
///
/// Fails unless the input is an optionally tagged array of exactly four
/// items with nothing after it.
pub fn parse_sign1(input: &[u8]) -> Result<Sign1Parts<'_>, CoseError> {
    let mut pos = 0;
    let (header, len) = loop {
        match pull(input, pos)? {
            (Header::Tag(_), len) => pos += len,
            other => break other,
        }
    };
    let tags_end = pos;
    pos += len;

    let declared = match header {
        Header::Array(n) => n,
        _ => return Err(CoseError::NotAnArray { offset: tags_end }),
    };

    let mut elements = Vec::with_capacity(ELEMENTS);
    match declared {
        Some(n) => {
            if n != ELEMENTS {
                return Err(CoseError::ElementCount { found: n });
            }
            for _ in 0..n {
                let end = skip_item(input, pos, 0)?;
                elements.push((pos, end));
                pos = end;
            }
        }
        None => {
            while !at_break(input, pos)? {
                let end = skip_item(input, pos, 0)?;
                elements.push((pos, end));
                pos = end;
            }
            pos += 1;
            if elements.len() != ELEMENTS {
                return Err(CoseError::ElementCount {
                    found: elements.len(),
                });
            }
        }
    }

    if pos != input.len() {
        return Err(CoseError::TrailingBytes {
            count: input.len() - pos,
        });
    }

    Ok(Sign1Parts {
        input,
        tags_end,
        elements: [elements[0], elements[1], elements[2], elements[3]],
    })
}

/// Replace the payload of a base64 COSE_Sign1 object.
///
/// `new_payload_b64` is decoded and written as a byte string in place of
/// element 2. Every other byte of the object is copied unchanged. The result
/// is base64.
pub fn replace_dcc_payload(signed_b64: &str, new_payload_b64: &str) -> Result<String, CoseError> {
    let signed = decode_base64(signed_b64).map_err(|e| CoseError::Base64 {
        field: "dcc",
        reason: e.to_string(),
    })?;
    let payload = decode_base64(new_payload_b64).map_err(|e| CoseError::Base64 {
        field: "payload",
        reason: e.to_string(),
    })?;
    let spliced = replace_payload_bytes(&signed, payload)?;
    Ok(encode_base64(spliced))
}

/// Byte-level form of [`replace_dcc_payload`].
pub fn replace_payload_bytes(signed: &[u8], payload: Vec<u8>) -> Result<Vec<u8>, CoseError> {
    let parts = parse_sign1(signed)?;
    let (start, end) = parts.elements[PAYLOAD_INDEX];

    let mut encoded = Vec::with_capacity(payload.len() + 9);
    ciborium::into_writer(&Value::Bytes(payload), &mut encoded)
        .map_err(|e| CoseError::Encode(e.to_string()))?;

    let mut out = Vec::with_capacity(signed.len() - (end - start) + encoded.len());
    out.extend_from_slice(&signed[..start]);
    out.extend_from_slice(&encoded);
    out.extend_from_slice(&signed[end..]);
    Ok(out)
}

// -- Item walker ------------------------------------------------------------

/// Decode one header at `pos`, returning it with its encoded length.
fn pull(input: &[u8], pos: usize) -> Result<(Header, usize), CoseError> {
    let rest = input.get(pos..).ok_or(CoseError::Malformed {
        offset: pos,
        reason: "offset past end of input".into(),
    })?;
    let mut decoder = Decoder::from(rest);
    let header = decoder.pull().map_err(|e| CoseError::Malformed {
        offset: pos,
        reason: format!("{e:?}"),
    })?;
    Ok((header, decoder.offset()))
}

fn at_break(input: &[u8], pos: usize) -> Result<bool, CoseError> {
    match input.get(pos) {
        Some(b) => Ok(*b == BREAK),
        None => Err(CoseError::Malformed {
            offset: pos,
            reason: "missing break in indefinite-length item".into(),
        }),
    }
}

/// Return the offset just past the complete item starting at `pos`.
fn skip_item(input: &[u8], pos: usize, depth: usize) -> Result<usize, CoseError> {
    if depth > MAX_DEPTH {
        return Err(CoseError::TooDeep(MAX_DEPTH));
    }
    let (header, len) = pull(input, pos)?;
    let mut pos = pos + len;

    match header {
        Header::Positive(_) | Header::Negative(_) | Header::Float(_) | Header::Simple(_) => Ok(pos),
        Header::Tag(_) => skip_item(input, pos, depth + 1),
        Header::Break => Err(CoseError::Malformed {
            offset: pos - len,
            reason: "unexpected break".into(),
        }),
        Header::Bytes(Some(n)) | Header::Text(Some(n)) => {
            let end = pos.checked_add(n).filter(|end| *end <= input.len());
            end.ok_or(CoseError::Malformed {
                offset: pos,
                reason: format!("string of length {n} runs past end of input"),
            })
        }
        Header::Bytes(None) | Header::Text(None) | Header::Array(None) | Header::Map(None) => {
            while !at_break(input, pos)? {
                pos = skip_item(input, pos, depth + 1)?;
            }
            Ok(pos + 1)
        }
        Header::Array(Some(n)) => {
            for _ in 0..n {
                pos = skip_item(input, pos, depth + 1)?;
            }
            Ok(pos)
        }
        Header::Map(Some(n)) => {
            for _ in 0..n.saturating_mul(2) {
                pos = skip_item(input, pos, depth + 1)?;
            }
            Ok(pos)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// tag 18, array(4): h'a10126', {4: h'6b6964'}, h'00', h'5349'
    fn sample() -> Vec<u8> {
        vec![
            0xd2, // tag 18
            0x84, // array(4)
            0x43, 0xa1, 0x01, 0x26, // protected: bstr {1: -7}
            0xa1, 0x04, 0x43, 0x6b, 0x69, 0x64, // unprotected: {4: h'6b6964'}
            0x41, 0x00, // payload: h'00'
            0x42, 0x53, 0x49, // signature: h'5349'
        ]
    }

    #[test]
    fn locates_elements_after_tag() {
        let input = sample();
        let parts = parse_sign1(&input).unwrap();
        assert_eq!(parts.tag_prefix(), &[0xd2]);
        assert_eq!(parts.element(0), &[0x43, 0xa1, 0x01, 0x26]);
        assert_eq!(parts.element(1), &[0xa1, 0x04, 0x43, 0x6b, 0x69, 0x64]);
        assert_eq!(parts.element(2), &[0x41, 0x00]);
        assert_eq!(parts.element(3), &[0x42, 0x53, 0x49]);
    }

    #[test]
    fn replaces_payload_and_keeps_everything_else() {
        let input = sample();
        let out = replace_payload_bytes(&input, b"hello".to_vec()).unwrap();
        let mut expected = input[..12].to_vec();
        expected.extend_from_slice(&[0x45, b'h', b'e', b'l', b'l', b'o']);
        expected.extend_from_slice(&input[14..]);
        assert_eq!(out, expected);
    }

    #[test]
    fn untagged_object_accepted() {
        let input = sample()[1..].to_vec();
        let out = replace_payload_bytes(&input, vec![1, 2]).unwrap();
        assert_eq!(out[0], 0x84);
        assert_eq!(parse_sign1(&out).unwrap().element(2), &[0x42, 1, 2]);
    }

    #[test]
    fn indefinite_array_framing_preserved() {
        let mut input = vec![0x9f];
        input.extend_from_slice(&sample()[2..]);
        input.push(0xff);
        let out = replace_payload_bytes(&input, vec![7]).unwrap();
        assert_eq!(out[0], 0x9f);
        assert_eq!(*out.last().unwrap(), 0xff);
        assert_eq!(parse_sign1(&out).unwrap().element(2), &[0x41, 7]);
    }

    #[test]
    fn null_payload_is_replaced() {
        // Detached payload encoded as null.
        let input = vec![0x84, 0x40, 0xa0, 0xf6, 0x40];
        let out = replace_payload_bytes(&input, vec![9, 9]).unwrap();
        assert_eq!(out, vec![0x84, 0x40, 0xa0, 0x42, 9, 9, 0x40]);
    }

    #[test]
    fn three_elements_rejected() {
        let input = vec![0x83, 0x40, 0xa0, 0x40];
        assert_eq!(
            parse_sign1(&input).unwrap_err(),
            CoseError::ElementCount { found: 3 }
        );
    }

    #[test]
    fn five_elements_in_indefinite_array_rejected() {
        let input = vec![0x9f, 0x40, 0xa0, 0x40, 0x40, 0x40, 0xff];
        assert_eq!(
            parse_sign1(&input).unwrap_err(),
            CoseError::ElementCount { found: 5 }
        );
    }

    #[test]
    fn map_at_top_level_rejected() {
        assert_eq!(
            parse_sign1(&[0xa0]).unwrap_err(),
            CoseError::NotAnArray { offset: 0 }
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut input = sample();
        input.push(0x00);
        assert_eq!(
            parse_sign1(&input).unwrap_err(),
            CoseError::TrailingBytes { count: 1 }
        );
    }

    #[test]
    fn truncated_input_rejected() {
        let input = sample();
        assert!(matches!(
            parse_sign1(&input[..input.len() - 1]),
            Err(CoseError::Malformed { .. })
        ));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(parse_sign1(&[]), Err(CoseError::Malformed { .. })));
    }

    #[test]
    fn base64_wrapper_reports_field() {
        match replace_dcc_payload("***", "AA==") {
            Err(CoseError::Base64 { field, .. }) => assert_eq!(field, "dcc"),
            other => panic!("expected Base64 error, got {other:?}"),
        }
        let dcc = encode_base64(sample());
        match replace_dcc_payload(&dcc, "***") {
            Err(CoseError::Base64 { field, .. }) => assert_eq!(field, "payload"),
            other => panic!("expected Base64 error, got {other:?}"),
        }
    }

    #[test]
    fn base64_wrapper_round_trip() {
        let dcc = encode_base64(sample());
        let out = replace_dcc_payload(&dcc, &encode_base64(b"hello")).unwrap();
        let bytes = decode_base64(&out).unwrap();
        assert_eq!(parse_sign1(&bytes).unwrap().element(2), &[0x45, b'h', b'e', b'l', b'l', b'o']);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    fn header_map() -> impl Strategy<Value = Value> {
        prop::collection::vec((any::<i8>(), prop::collection::vec(any::<u8>(), 0..16)), 0..4).prop_map(
            |entries| {
                Value::Map(
                    entries
                        .into_iter()
                        .map(|(k, v)| (Value::Integer(k.into()), Value::Bytes(v)))
                        .collect(),
                )
            },
        )
    }

    fn sign1() -> impl Strategy<Value = (Vec<u8>, [Vec<u8>; 4])> {
        (
            prop::collection::vec(any::<u8>(), 0..64),
            header_map(),
            prop::collection::vec(any::<u8>(), 0..300),
            prop::collection::vec(any::<u8>(), 0..128),
            any::<bool>(),
        )
            .prop_map(|(protected, unprotected, payload, signature, tagged)| {
                let elements = [
                    encode(&Value::Bytes(protected)),
                    encode(&unprotected),
                    encode(&Value::Bytes(payload)),
                    encode(&Value::Bytes(signature)),
                ];
                let mut input = Vec::new();
                if tagged {
                    input.push(0xd2);
                }
                input.push(0x84);
                for e in &elements {
                    input.extend_from_slice(e);
                }
                (input, elements)
            })
    }

    proptest! {
        /// Elements 0, 1 and 3 are bit-identical after the splice and element
        /// 2 decodes to the new payload.
        #[test]
        fn splice_preserves_envelope(
            (input, elements) in sign1(),
            new_payload in prop::collection::vec(any::<u8>(), 0..400),
        ) {
            let out = replace_payload_bytes(&input, new_payload.clone()).unwrap();
            let parts = parse_sign1(&out).unwrap();
            prop_assert_eq!(parts.element(0), elements[0].as_slice());
            prop_assert_eq!(parts.element(1), elements[1].as_slice());
            prop_assert_eq!(parts.element(3), elements[3].as_slice());

            let decoded: Value = ciborium::from_reader(parts.element(2)).unwrap();
            prop_assert_eq!(decoded, Value::Bytes(new_payload));

            let whole: Value = ciborium::from_reader(out.as_slice()).unwrap();
            let items = match whole {
                Value::Tag(18, inner) => *inner,
                other => other,
            };
            match items {
                Value::Array(items) => prop_assert_eq!(items.len(), 4),
                other => prop_assert!(false, "expected array, got {:?}", other),
            }
        }
    }
}

//! # DCCI Minting
//!
//! A DCCI has the shape `PREFIX:BODYC` where `BODY` is a fresh 128-bit random
//! value rendered as an upper-case base-36 integer and `C` is a Luhn mod N
//! check character computed over `PREFIX:BODY`.
//!
//! ## Alphabet
//!
//! The checksum runs over [`CODE_POINTS`], 38 symbols: `A-Z`, `0-9`, `/`, `:`.
//! The prefix is validated against the same alphabet once, when the
//! generator is constructed, so minting itself cannot fail.

use uuid::Uuid;

use crate::error::ValidationError;

/// The checksum alphabet. A character's code point is its index here.
pub const CODE_POINTS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/:";

const RADIX: u128 = 36;

/// Mints DCCIs under a fixed, pre-validated prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcciGenerator {
    prefix: String,
}

impl DcciGenerator {
    /// Create a generator for `prefix`.
    ///
    /// Fails if any character of the prefix is outside [`CODE_POINTS`].
    /// Call this once during startup; an error here is a fatal
    /// configuration problem.
    pub fn new(prefix: impl Into<String>) -> Result<Self, ValidationError> {
        let prefix = prefix.into();
        if let Some(invalid) = prefix.chars().find(|c| code_point(*c).is_none()) {
            return Err(ValidationError::InvalidDcciPrefix {
                prefix,
                invalid,
                allowed: CODE_POINTS,
            });
        }
        Ok(Self { prefix })
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mint a new DCCI from a random 128-bit value.
    pub fn new_dcci(&self) -> String {
        self.dcci_from(Uuid::new_v4().as_u128())
    }

    /// Mint the DCCI for a given 128-bit body value.
    pub fn dcci_from(&self, value: u128) -> String {
        let mut dcci = format!("{}:{}", self.prefix, encode_base36(value));
        // Every character is in the alphabet: the prefix was validated and
        // the body is base-36.
        let check = check_character(&dcci).unwrap_or('A');
        dcci.push(check);
        dcci
    }
}

/// Map a character onto its index in [`CODE_POINTS`].
pub fn code_point(c: char) -> Option<u32> {
    CODE_POINTS.find(c).map(|i| i as u32)
}

fn character_from_code_point(cp: u32) -> char {
    CODE_POINTS.as_bytes()[cp as usize] as char
}

/// Render `value` as an upper-case base-36 integer without leading zeros.
pub fn encode_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(25);
    while value > 0 {
        let digit = (value % RADIX) as u32;
        digits.push(std::char::from_digit(digit, RADIX as u32).unwrap_or('0'));
        value /= RADIX;
    }
    digits.iter().rev().map(|c| c.to_ascii_uppercase()).collect()
}

/// Sum of the Luhn mod N addends over `input`, scanning right to left and
/// starting with `first_factor`.
fn luhn_sum(input: &str, first_factor: u32) -> Result<u32, ValidationError> {
    let n = CODE_POINTS.len() as u32;
    let mut factor = first_factor;
    let mut sum = 0;
    for c in input.chars().rev() {
        let cp = code_point(c).ok_or(ValidationError::UnsupportedChecksumCharacter(c))?;
        let addend = factor * cp;
        factor = if factor == 2 { 1 } else { 2 };
        sum += addend / n + addend % n;
    }
    Ok(sum)
}

/// Compute the Luhn mod N check character for `input`.
pub fn check_character(input: &str) -> Result<char, ValidationError> {
    let n = CODE_POINTS.len() as u32;
    let remainder = luhn_sum(input, 2)? % n;
    Ok(character_from_code_point((n - remainder) % n))
}

/// Whether `dcci` (including its trailing check character) satisfies the
/// Luhn mod N checksum.
pub fn is_valid(dcci: &str) -> bool {
    let n = CODE_POINTS.len() as u32;
    !dcci.is_empty() && matches!(luhn_sum(dcci, 1), Ok(sum) if sum % n == 0)
}

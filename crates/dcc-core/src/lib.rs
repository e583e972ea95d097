#![deny(missing_docs)]

//! # dcc-core: Foundational Types for the DCC Server
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies, only `serde`, `thiserror`,
//! `chrono` and `uuid` from the external ecosystem.
//!
//! ## Contents
//!
//! 1. **Records.** [`DccRegistration`] is one credential in progress,
//!    [`LabIdClaim`] is a partner's lease over a lab identifier.
//!
//! 2. **Lifecycle view.** [`RegistrationState`] is derived from which fields
//!    of a registration are populated. There is no stored state column; the
//!    fields are the state.
//!
//! 3. **DCCI minting.** [`DcciGenerator`] validates its prefix once at
//!    construction and then mints identifiers carrying a Luhn mod N check
//!    character over a fixed 38-symbol alphabet.
//!
//! 4. **Validated newtypes.** [`DccHash`] and [`PartnerId`] reject malformed
//!    input at construction time.

pub mod claim;
pub mod dcci;
pub mod error;
pub mod identity;
pub mod registration;
pub mod test_result;

pub use claim::LabIdClaim;
pub use dcci::{DcciGenerator, CODE_POINTS};
pub use error::ValidationError;
pub use identity::{DccHash, PartnerId};
pub use registration::{DccErrorReason, DccRegistration, NewRegistration, RegistrationState};
pub use test_result::TestResult;

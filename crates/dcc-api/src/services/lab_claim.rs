//! # Lab Identifier Claims
//!
//! A lab partner may upload results for a lab only while it holds the
//! lab's claim. Claims are exclusive per lab and a partner may hold at most
//! `quota` of them when asking for a new one. Re-using a claim the partner
//! already holds refreshes it and never counts against the quota.
//!
//! The claim store's unique constraint on `lab_id` is the only thing that
//! keeps two partners from claiming the same lab at once. The losing writer
//! sees the violation and re-resolves the claim as a lookup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dcc_core::LabIdClaim;

use crate::error::DccError;
use crate::store::{ClaimStore, LAB_ID_CONSTRAINT};

/// Result of a claim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The partner holds the claim, either newly created or refreshed.
    Granted,
    /// Another partner holds the lab.
    Conflict,
    /// The partner holds its maximum number of claims.
    QuotaExceeded,
}

impl ClaimOutcome {
    /// Whether the partner may upload for the lab.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    fn as_label(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Conflict => "conflict",
            Self::QuotaExceeded => "quota_exceeded",
        }
    }
}

/// Grants and refreshes lab claims.
#[derive(Clone)]
pub struct LabClaimManager {
    store: Arc<dyn ClaimStore>,
    quota: u32,
}

impl LabClaimManager {
    /// Create a manager with a per-partner claim quota.
    pub fn new(store: Arc<dyn ClaimStore>, quota: u32) -> Self {
        Self { store, quota }
    }

    /// The configured per-partner quota.
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Claim `lab_id` for `partner_id`, or refresh the partner's existing
    /// claim on it.
    pub async fn get_or_create_claim(&self, partner_id: &str, lab_id: &str) -> Result<ClaimOutcome, DccError> {
        let now = Utc::now();
        let outcome = match self.store.find_by_lab_id(lab_id).await? {
            Some(existing) => self.resolve_existing(existing, partner_id, now).await?,
            None => self.create(partner_id, lab_id, now).await?,
        };
        crate::metrics::lab_claim(outcome.as_label());
        tracing::info!(partner_id, lab_id, outcome = outcome.as_label(), "lab claim resolved");
        Ok(outcome)
    }

    /// `quota - active claims`. Negative when the quota was lowered below
    /// the claims a partner already holds.
    pub async fn remaining_quota(&self, partner_id: &str) -> Result<i64, DccError> {
        let held = self.store.count_by_partner(partner_id).await?;
        let held = i64::try_from(held).unwrap_or(i64::MAX);
        Ok(i64::from(self.quota).saturating_sub(held))
    }

    /// The current claim on `lab_id`, if any.
    pub async fn get_claim(&self, lab_id: &str) -> Result<Option<LabIdClaim>, DccError> {
        Ok(self.store.find_by_lab_id(lab_id).await?)
    }

    async fn create(&self, partner_id: &str, lab_id: &str, now: DateTime<Utc>) -> Result<ClaimOutcome, DccError> {
        let held = self.store.count_by_partner(partner_id).await?;
        if held >= u64::from(self.quota) {
            return Ok(ClaimOutcome::QuotaExceeded);
        }

        let claim = LabIdClaim::new(lab_id, partner_id, now);
        match self.store.insert(&claim).await {
            Ok(()) => Ok(ClaimOutcome::Granted),
            Err(e) if e.violates(LAB_ID_CONSTRAINT) => {
                tracing::debug!(partner_id, lab_id, "lost lab claim race, re-resolving");
                match self.store.find_by_lab_id(lab_id).await? {
                    Some(winner) => self.resolve_existing(winner, partner_id, now).await,
                    // The winning claim vanished again before we could read it.
                    None => Err(DccError::Conflict(format!("lab {lab_id} claim changed concurrently"))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_existing(
        &self,
        existing: LabIdClaim,
        partner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DccError> {
        if !existing.is_owned_by(partner_id) {
            return Ok(ClaimOutcome::Conflict);
        }
        self.store.touch(existing.id, now).await?;
        Ok(ClaimOutcome::Granted)
    }
}

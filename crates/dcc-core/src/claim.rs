//! Lab identifier claims.
//!
//! A claim gives one partner the exclusive right to upload results for a
//! lab. `lab_id` is unique across claims; the store's unique constraint is
//! what keeps two partners from holding the same lab.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A partner's lease over a lab identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabIdClaim {
    /// Primary key.
    pub id: Uuid,
    /// When the claim was first granted.
    pub created_at: DateTime<Utc>,
    /// Refreshed every time the owning partner re-uses the claim.
    pub last_used: DateTime<Utc>,
    /// The claimed lab. Unique.
    pub lab_id: String,
    /// The owning partner.
    pub partner_id: String,
}

impl LabIdClaim {
    /// A new claim, created and last used at `now`.
    pub fn new(lab_id: impl Into<String>, partner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_used: now,
            lab_id: lab_id.into(),
            partner_id: partner_id.into(),
        }
    }

    /// Whether `partner_id` owns this claim.
    pub fn is_owned_by(&self, partner_id: &str) -> bool {
        self.partner_id == partner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_claim_timestamps_match() {
        let now = Utc::now();
        let c = LabIdClaim::new("lab", "partner", now);
        assert_eq!(c.created_at, now);
        assert_eq!(c.last_used, now);
        assert!(c.is_owned_by("partner"));
        assert!(!c.is_owned_by("other"));
    }
}

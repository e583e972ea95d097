//! # Server Configuration
//!
//! [`DccConfig`] is read once at startup. When `DCC_CONFIG` names a YAML
//! file it is loaded from there, otherwise from environment variables. Any
//! field left out falls back to its default.
//!
//! ```yaml
//! dcci_prefix: "URN:UVCI:V1:DE"
//! port: 8080
//! cleanup:
//!   dcc_data_days: 4
//!   registration_token_days: 21
//!   entity_days: 180
//!   rate_ms: 60000
//! lab_id_claim:
//!   maximum_age_days: 30
//!   claims_per_partner: 100
//! lease:
//!   holder: "dcc-server-1"
//!   hold_ms: 600000
//! ```
//!
//! Oracle URLs and credentials are not part of this file; see
//! [`dcc_client::OracleConfig::from_env`].

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Name of the registration sweep lease.
pub const ENTITY_CLEANUP_LEASE: &str = "entity_cleanup_job";
/// Name of the lab claim sweep lease.
pub const CLAIM_CLEANUP_LEASE: &str = "labidclaim_cleanup_job";

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DccConfig {
    /// Prefix of minted DCCIs. Validated against the checksum alphabet at
    /// startup.
    pub dcci_prefix: String,
    /// HTTP listen port.
    pub port: u16,
    /// Retention windows and sweep interval.
    pub cleanup: CleanupConfig,
    /// Lab claim limits.
    pub lab_id_claim: LabIdClaimConfig,
    /// Sweep lease settings.
    pub lease: LeaseConfig,
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            dcci_prefix: "URN:UVCI:V1:DE".to_string(),
            port: 8080,
            cleanup: CleanupConfig::default(),
            lab_id_claim: LabIdClaimConfig::default(),
            lease: LeaseConfig::default(),
        }
    }
}

/// Retention windows. The relative order of the three windows is the
/// operator's responsibility and is not checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Days after the last update before credential data is stripped.
    pub dcc_data_days: u32,
    /// Days after creation before the registration token is stripped.
    pub registration_token_days: u32,
    /// Days after the last update before the record is deleted.
    pub entity_days: u32,
    /// Milliseconds between sweep cycles.
    pub rate_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            dcc_data_days: 4,
            registration_token_days: 21,
            entity_days: 180,
            rate_ms: 60_000,
        }
    }
}

impl CleanupConfig {
    /// Stage 1 retention window.
    pub fn dcc_data_ttl(&self) -> Duration {
        Duration::days(i64::from(self.dcc_data_days))
    }

    /// Stage 2 retention window.
    pub fn registration_token_ttl(&self) -> Duration {
        Duration::days(i64::from(self.registration_token_days))
    }

    /// Stage 3 retention window.
    pub fn entity_ttl(&self) -> Duration {
        Duration::days(i64::from(self.entity_days))
    }

    /// Sweep interval.
    pub fn rate(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_ms.max(1))
    }
}

/// Lab claim limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabIdClaimConfig {
    /// Days after last use before a claim is deleted.
    pub maximum_age_days: u32,
    /// Maximum claims a partner may hold when creating a new one.
    pub claims_per_partner: u32,
}

impl Default for LabIdClaimConfig {
    fn default() -> Self {
        Self {
            maximum_age_days: 30,
            claims_per_partner: 100,
        }
    }
}

impl LabIdClaimConfig {
    /// Claim retention window.
    pub fn maximum_age(&self) -> Duration {
        Duration::days(i64::from(self.maximum_age_days))
    }
}

/// Sweep lease settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Identity written into the lease row. Empty means generate one.
    pub holder: String,
    /// Longest time a cycle may hold the lease before others may take it.
    pub hold_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            holder: String::new(),
            hold_ms: 10 * 60 * 1000,
        }
    }
}

impl LeaseConfig {
    /// Lease hold time.
    pub fn hold(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.hold_ms).unwrap_or(i64::MAX))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: String, value: String },
}

impl DccConfig {
    /// Load from the YAML file named by `DCC_CONFIG`, or from the
    /// environment when it is unset.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("DCC_CONFIG") {
            Ok(path) => Self::from_yaml_file(&path),
            Err(_) => Self::from_env(),
        }
    }

    /// Parse a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DCC_DCCI_PREFIX` (default: `URN:UVCI:V1:DE`)
    /// - `PORT` (default: 8080)
    /// - `DCC_CLEANUP_DCC_DATA_DAYS` (default: 4)
    /// - `DCC_CLEANUP_REGISTRATION_TOKEN_DAYS` (default: 21)
    /// - `DCC_CLEANUP_ENTITY_DAYS` (default: 180)
    /// - `DCC_CLEANUP_RATE_MS` (default: 60000)
    /// - `DCC_LAB_ID_CLAIM_MAXIMUM_AGE_DAYS` (default: 30)
    /// - `DCC_LAB_ID_CLAIMS_PER_PARTNER` (default: 100)
    /// - `DCC_LEASE_HOLDER` (default: generated)
    /// - `DCC_LEASE_HOLD_MS` (default: 600000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            dcci_prefix: lookup("DCC_DCCI_PREFIX").unwrap_or(d.dcci_prefix),
            port: parse_var(&lookup, "PORT", d.port)?,
            cleanup: CleanupConfig {
                dcc_data_days: parse_var(&lookup, "DCC_CLEANUP_DCC_DATA_DAYS", d.cleanup.dcc_data_days)?,
                registration_token_days: parse_var(
                    &lookup,
                    "DCC_CLEANUP_REGISTRATION_TOKEN_DAYS",
                    d.cleanup.registration_token_days,
                )?,
                entity_days: parse_var(&lookup, "DCC_CLEANUP_ENTITY_DAYS", d.cleanup.entity_days)?,
                rate_ms: parse_var(&lookup, "DCC_CLEANUP_RATE_MS", d.cleanup.rate_ms)?,
            },
            lab_id_claim: LabIdClaimConfig {
                maximum_age_days: parse_var(
                    &lookup,
                    "DCC_LAB_ID_CLAIM_MAXIMUM_AGE_DAYS",
                    d.lab_id_claim.maximum_age_days,
                )?,
                claims_per_partner: parse_var(
                    &lookup,
                    "DCC_LAB_ID_CLAIMS_PER_PARTNER",
                    d.lab_id_claim.claims_per_partner,
                )?,
            },
            lease: LeaseConfig {
                holder: lookup("DCC_LEASE_HOLDER").unwrap_or(d.lease.holder),
                hold_ms: parse_var(&lookup, "DCC_LEASE_HOLD_MS", d.lease.hold_ms)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidVar {
            var: var.to_string(),
            value,
        }),
    }
}

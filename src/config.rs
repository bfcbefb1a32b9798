//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use cdmx_card::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str("{}").unwrap();
//! assert_eq!(config.max_balance, 500_000);
//! assert_eq!(config.max_debit_chunk, 32_767);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::amount::SV_LIMIT;
use crate::records::{Modality, Period};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// EngineConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Highest SV balance a reload may reach, in centavos
    #[serde(default = "default_max_balance")]
    pub max_balance: i32,

    /// Largest amount debited in one secure session
    #[serde(default = "default_max_debit_chunk")]
    pub max_debit_chunk: i32,

    /// Days before the period end at which a contract counts as expired
    #[serde(default = "default_expiration_offset_days")]
    pub expiration_offset_days: i64,

    /// Offset used by balance cancellation; large enough to force renewal
    #[serde(default = "default_cancellation_renewal_offset_days")]
    pub cancellation_renewal_offset_days: i64,

    /// Reject a debit at the same location within this window (0 = off)
    #[serde(default)]
    pub passback_seconds: u32,

    /// Debits within this many minutes of a debit at another location
    /// are recorded as interchange legs (0 = off)
    #[serde(default)]
    pub interchange_window_minutes: u32,

    /// Check the SAM authenticator of a contract before using it
    #[serde(default = "default_true")]
    pub verify_contract_authenticator: bool,

    #[serde(default = "default_event_version")]
    pub event_version: u8,

    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Hex-encoded SAM unlock secret
    #[serde(default)]
    pub sam_unlock_key: String,

    #[serde(default)]
    pub profile: ProductProfile,
}

fn default_max_balance() -> i32 {
    500_000
}

fn default_max_debit_chunk() -> i32 {
    i32::from(i16::MAX)
}

fn default_expiration_offset_days() -> i64 {
    15
}

fn default_cancellation_renewal_offset_days() -> i64 {
    1800
}

fn default_true() -> bool {
    true
}

fn default_event_version() -> u8 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_balance: default_max_balance(),
            max_debit_chunk: default_max_debit_chunk(),
            expiration_offset_days: default_expiration_offset_days(),
            cancellation_renewal_offset_days: default_cancellation_renewal_offset_days(),
            passback_seconds: 0,
            interchange_window_minutes: 0,
            verify_contract_authenticator: true,
            event_version: default_event_version(),
            terminal: TerminalConfig::default(),
            sam_unlock_key: String::new(),
            profile: ProductProfile::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_balance <= 0 || i64::from(self.max_balance) > SV_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_balance {} outside 1..={}",
                self.max_balance, SV_LIMIT
            )));
        }
        if self.max_debit_chunk <= 0 || self.max_debit_chunk > i32::from(i16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "max_debit_chunk {} outside 1..={}",
                self.max_debit_chunk,
                i16::MAX
            )));
        }
        if self.expiration_offset_days < 0 || self.cancellation_renewal_offset_days < 0 {
            return Err(ConfigError::Invalid("negative day offset".into()));
        }
        if self.profile.validity.count > Period::MAX_COUNT {
            return Err(ConfigError::Invalid(format!(
                "profile validity count {} exceeds {}",
                self.profile.validity.count,
                Period::MAX_COUNT
            )));
        }
        self.sam_secret()?;
        Ok(())
    }

    /// Decoded SAM unlock secret.
    pub fn sam_secret(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(&self.sam_unlock_key)
            .map_err(|e| ConfigError::Invalid(format!("sam_unlock_key: {e}")))
    }
}

/// Identity stamped on events written by this terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub network: u8,
    #[serde(default)]
    pub provider: u8,
}

// ============================================================================
// ProductProfile
// ============================================================================

/// Template for contracts created by a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductProfile {
    pub version: u8,
    pub network: u8,
    pub provider: u8,
    pub modality: Modality,
    pub counter_code: u8,
    pub tariff: u16,
    pub vehicle_class: u8,
    pub restrict_time: u8,
    pub restrict_code: u8,
    pub period_journeys: u8,
    /// 40-bit location bitmap, all locations by default
    pub location: u64,
    pub validity: Period,
    pub kvc: u8,
}

impl Default for ProductProfile {
    fn default() -> Self {
        Self {
            version: 1,
            network: 1,
            provider: 1,
            modality: Modality::default(),
            counter_code: 0,
            tariff: 0,
            vehicle_class: 0x7F,
            restrict_time: 0,
            restrict_code: 0,
            period_journeys: 0,
            location: 0xFF_FFFF_FFFF,
            validity: Period::months(60),
            kvc: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::PeriodUnit;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.expiration_offset_days, 15);
        assert_eq!(config.cancellation_renewal_offset_days, 1800);
        assert!(config.verify_contract_authenticator);
        assert_eq!(config.profile.validity, Period::months(60));
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "max_balance": 100000,
            "passback_seconds": 120,
            "terminal": { "network": 1, "provider": 7 },
            "sam_unlock_key": "00112233",
            "profile": { "tariff": 500, "validity": { "unit": "week", "count": 2 } }
        }"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(config.max_balance, 100_000);
        assert_eq!(config.passback_seconds, 120);
        assert_eq!(config.terminal.provider, 7);
        assert_eq!(config.sam_secret().unwrap(), vec![0x00, 0x11, 0x22, 0x33]);
        assert_eq!(config.profile.tariff, 500);
        assert_eq!(config.profile.validity.unit, PeriodUnit::Week);
        assert_eq!(config.profile.location, 0xFF_FFFF_FFFF);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::from_json_str(r#"{"max_debit_chunk": 40000}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"max_balance": 0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"sam_unlock_key": "zz"}"#).is_err());
        assert!(EngineConfig::from_json_str(
            r#"{"profile": {"validity": {"unit": "day", "count": 64}}}"#
        )
        .is_err());
    }
}

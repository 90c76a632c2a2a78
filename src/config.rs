//! Escrow and engine configuration.
//!
//! [`EscrowConfig`] is fixed per escrow and validated before any
//! cryptographic work. [`EngineSettings`] holds engine-wide tunables such as
//! the time-lock puzzle calibration.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::sloth::PuzzleCalibration;
use crate::error::{ConfigurationError, EscrowError};

pub const MIN_THRESHOLD: u32 = 2;
pub const MAX_SHARDS: u32 = 7;
pub const MAX_SECRET_LEN: usize = 4096;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EscrowConfig {
    pub threshold: u32,
    pub total_shards: u32,
    /// Unix seconds before which the escrow stays time-locked.
    pub time_lock_until: Option<u64>,
    /// Key-rotation tag; carried along, never used as key material.
    pub epoch: Option<u64>,
    pub label: Option<String>,
}

impl EscrowConfig {
    pub fn new(threshold: u32, total_shards: u32) -> Self {
        EscrowConfig {
            threshold,
            total_shards,
            time_lock_until: None,
            epoch: None,
            label: None,
        }
    }

    pub fn with_time_lock_until(mut self, release_at: u64) -> Self {
        self.time_lock_until = Some(release_at);
        self
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Checks `MIN_THRESHOLD <= threshold <= total_shards <= MAX_SHARDS`,
    /// reporting the first constraint that fails.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.threshold < MIN_THRESHOLD {
            return Err(ConfigurationError::ThresholdTooLow {
                threshold: self.threshold,
                min: MIN_THRESHOLD,
            });
        }
        if self.total_shards > MAX_SHARDS {
            return Err(ConfigurationError::TooManyShards {
                total: self.total_shards,
                max: MAX_SHARDS,
            });
        }
        if self.threshold > self.total_shards {
            return Err(ConfigurationError::ThresholdExceedsShards {
                threshold: self.threshold,
                total: self.total_shards,
            });
        }
        Ok(())
    }
}

/// Engine-wide settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Measured rate of sequential puzzle steps on the reference opener.
    pub puzzle_steps_per_second: u64,
    /// Upper bound on the difficulty the engine will generate.
    pub max_puzzle_difficulty: u64,
    pub max_secret_len: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            puzzle_steps_per_second: 20_000,
            max_puzzle_difficulty: 1 << 32,
            max_secret_len: MAX_SECRET_LEN,
        }
    }
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self, EscrowError> {
        let settings: EngineSettings = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.puzzle_steps_per_second == 0 {
            return Err(ConfigurationError::InvalidSettings(
                "puzzle_steps_per_second must be positive".into(),
            ));
        }
        if self.max_puzzle_difficulty == 0 {
            return Err(ConfigurationError::InvalidSettings(
                "max_puzzle_difficulty must be positive".into(),
            ));
        }
        if self.max_secret_len == 0 || self.max_secret_len > MAX_SECRET_LEN {
            return Err(ConfigurationError::InvalidSettings(format!(
                "max_secret_len must be in 1..={}",
                MAX_SECRET_LEN
            )));
        }
        Ok(())
    }

    /// Default settings with `puzzle_steps_per_second` measured on this
    /// machine over `sample_steps` puzzle steps.
    pub fn calibrated(sample_steps: u64) -> Result<Self, EscrowError> {
        let calibration = PuzzleCalibration::measure(sample_steps)?;
        debug!(steps_per_second = calibration.steps_per_second, "Calibrated time-lock puzzle");
        Ok(EngineSettings {
            puzzle_steps_per_second: calibration.steps_per_second,
            ..EngineSettings::default()
        })
    }

    /// Difficulty needed so that opening the lock early takes at least
    /// `delay_secs` on the calibrated opener, capped at
    /// `max_puzzle_difficulty`. Never below 1.
    ///
    /// A capped puzzle can be solved before `release_at`; the release time
    /// itself is still enforced by the engine's clock.
    pub fn puzzle_difficulty_for(&self, delay_secs: u64) -> u64 {
        let difficulty = delay_secs.saturating_mul(self.puzzle_steps_per_second).max(1);
        if difficulty > self.max_puzzle_difficulty {
            warn!(
                delay_secs,
                difficulty,
                max = self.max_puzzle_difficulty,
                "Capping time-lock puzzle difficulty"
            );
            return self.max_puzzle_difficulty;
        }
        difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundaries() {
        assert!(EscrowConfig::new(2, 2).validate().is_ok());
        assert!(EscrowConfig::new(7, 7).validate().is_ok());
        assert!(EscrowConfig::new(2, 7).validate().is_ok());
    }

    #[test]
    fn reports_which_constraint_failed() {
        assert_eq!(
            EscrowConfig::new(1, 3).validate(),
            Err(ConfigurationError::ThresholdTooLow { threshold: 1, min: 2 })
        );
        assert_eq!(
            EscrowConfig::new(3, 8).validate(),
            Err(ConfigurationError::TooManyShards { total: 8, max: 7 })
        );
        assert_eq!(
            EscrowConfig::new(4, 3).validate(),
            Err(ConfigurationError::ThresholdExceedsShards { threshold: 4, total: 3 })
        );
    }

    #[test]
    fn settings_from_partial_json_fill_defaults() {
        let settings = EngineSettings::from_json(r#"{ "puzzle_steps_per_second": 10 }"#).unwrap();
        assert_eq!(settings.puzzle_steps_per_second, 10);
        assert_eq!(settings.max_secret_len, MAX_SECRET_LEN);

        assert!(EngineSettings::from_json(r#"{ "puzzle_steps_per_second": 0 }"#).is_err());
        assert!(EngineSettings::from_json("not json").is_err());
    }

    #[test]
    fn difficulty_scales_with_delay() {
        let settings = EngineSettings {
            puzzle_steps_per_second: 100,
            max_puzzle_difficulty: 10_000,
            ..EngineSettings::default()
        };
        assert_eq!(settings.puzzle_difficulty_for(0), 1);
        assert_eq!(settings.puzzle_difficulty_for(30), 3_000);
        assert_eq!(settings.puzzle_difficulty_for(1_000), 10_000);
        assert_eq!(settings.puzzle_difficulty_for(u64::MAX), 10_000);
    }

    #[test]
    fn week_long_delay_is_capped_with_defaults() {
        let settings = EngineSettings::default();
        let week = 7 * 24 * 3600;
        assert_eq!(settings.puzzle_difficulty_for(week), settings.max_puzzle_difficulty);
        assert_eq!(settings.puzzle_difficulty_for(60), 60 * 20_000);
    }

    #[test]
    fn calibrated_settings_are_valid() {
        let settings = EngineSettings::calibrated(200).unwrap();
        assert!(settings.puzzle_steps_per_second >= 1);
        assert_eq!(settings.max_puzzle_difficulty, EngineSettings::default().max_puzzle_difficulty);
        assert!(settings.validate().is_ok());
    }
}

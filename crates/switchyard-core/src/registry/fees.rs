//! Tiered fee schedule for mutating registry calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::deployer::MAX_CODE_SIZE;

/// Errors from fee-schedule construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeeScheduleError {
    /// A schedule needs at least one tier.
    #[error("fee schedule has no tiers")]
    Empty,

    /// Tiers must be sorted by strictly increasing size bound.
    #[error("fee tiers unsorted at index {index}: {previous} then {current}")]
    Unsorted {
        /// Index of the offending tier.
        index: usize,
        /// Size bound of the preceding tier.
        previous: usize,
        /// Size bound of the offending tier.
        current: usize,
    },

    /// The final tier must cover the maximum deployable size.
    #[error("fee ceiling too low: last tier covers {covered} bytes, need {required}")]
    CeilingTooLow {
        /// Bytes covered by the last tier.
        covered: usize,
        /// The required coverage.
        required: usize,
    },
}

/// One fee tier: everything up to `max_size` bytes costs `fee` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeTier {
    /// Largest payload this tier covers, in bytes.
    pub max_size: usize,
    /// Fee units charged.
    pub fee: u64,
}

/// Size-tiered deployment fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeSchedule {
    tiers: Vec<FeeTier>,
}

impl FeeSchedule {
    /// Builds a schedule from tiers sorted by increasing size bound.
    ///
    /// # Errors
    ///
    /// Returns [`FeeScheduleError`] for an empty, unsorted, or
    /// insufficient-coverage tier list.
    pub fn new(tiers: Vec<FeeTier>) -> Result<Self, FeeScheduleError> {
        if tiers.is_empty() {
            return Err(FeeScheduleError::Empty);
        }
        for (index, window) in tiers.windows(2).enumerate() {
            if window[1].max_size <= window[0].max_size {
                return Err(FeeScheduleError::Unsorted {
                    index: index + 1,
                    previous: window[0].max_size,
                    current: window[1].max_size,
                });
            }
        }
        let covered = tiers[tiers.len() - 1].max_size;
        if covered < MAX_CODE_SIZE {
            return Err(FeeScheduleError::CeilingTooLow {
                covered,
                required: MAX_CODE_SIZE,
            });
        }
        Ok(Self { tiers })
    }

    /// Fee units for a payload of `size` bytes.
    ///
    /// Sizes beyond the last tier fall into it; callers enforce the hard
    /// size ceiling before fee computation.
    #[must_use]
    pub fn fee_for(&self, size: usize) -> u64 {
        self.tiers
            .iter()
            .find(|tier| size <= tier.max_size)
            .map(|tier| tier.fee)
            .unwrap_or_else(|| self.tiers[self.tiers.len() - 1].fee)
    }

    /// The configured tiers.
    #[must_use]
    pub fn tiers(&self) -> &[FeeTier] {
        &self.tiers
    }
}

impl Default for FeeSchedule {
    /// Three tiers: small, medium, and everything up to the code ceiling.
    fn default() -> Self {
        Self {
            tiers: vec![
                FeeTier {
                    max_size: 4_096,
                    fee: 10,
                },
                FeeTier {
                    max_size: 16_384,
                    fee: 25,
                },
                FeeTier {
                    max_size: MAX_CODE_SIZE,
                    fee: 60,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_valid() {
        let schedule = FeeSchedule::default();
        FeeSchedule::new(schedule.tiers().to_vec()).unwrap();
    }

    #[test]
    fn fee_picks_first_covering_tier() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.fee_for(0), 10);
        assert_eq!(schedule.fee_for(4_096), 10);
        assert_eq!(schedule.fee_for(4_097), 25);
        assert_eq!(schedule.fee_for(MAX_CODE_SIZE), 60);
    }

    #[test]
    fn empty_schedule_is_rejected() {
        assert_eq!(
            FeeSchedule::new(Vec::new()).unwrap_err(),
            FeeScheduleError::Empty
        );
    }

    #[test]
    fn unsorted_tiers_are_rejected() {
        let err = FeeSchedule::new(vec![
            FeeTier {
                max_size: 100,
                fee: 1,
            },
            FeeTier {
                max_size: 100,
                fee: 2,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, FeeScheduleError::Unsorted { index: 1, .. }));
    }

    #[test]
    fn low_ceiling_is_rejected() {
        let err = FeeSchedule::new(vec![FeeTier {
            max_size: 100,
            fee: 1,
        }])
        .unwrap_err();
        assert!(matches!(err, FeeScheduleError::CeilingTooLow { .. }));
    }
}

//! Brick sizing configuration shared by the CLI and batch jobs.
//!
//! Price mode uses fixed brick/reversal sizes; ADR mode scales both as
//! percentages of the per-session Average Daily Range. `build_schedule`
//! validates the config and produces the size schedule the engine consumes.

use crate::adr::{build_size_schedule, price_schedule, SizeScheduleEntry};
use crate::calendar::SessionSchedule;
use crate::error::{RenkoError, Result};
use crate::types::OhlcBar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    Price,
    Adr,
}

impl std::fmt::Display for SizingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingMode::Price => write!(f, "price"),
            SizingMode::Adr => write!(f, "adr"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub sizing_mode: SizingMode,
    pub brick_size: f64,
    pub reversal_size: f64,
    pub brick_pct: f64,
    pub reversal_pct: f64,
    pub adr_period: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            sizing_mode: SizingMode::Price,
            brick_size: 0.0010,
            reversal_size: 0.0020,
            brick_pct: 5.0,
            reversal_pct: 10.0,
            adr_period: 14,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        match self.sizing_mode {
            SizingMode::Price => {
                if !self.brick_size.is_finite() || self.brick_size <= 0.0 {
                    return Err(RenkoError::InvalidBrickSize(self.brick_size));
                }
                if self.reversal_size < self.brick_size {
                    return Err(RenkoError::InvalidConfig(format!(
                        "reversal_size {} is smaller than brick_size {}",
                        self.reversal_size, self.brick_size
                    )));
                }
            }
            SizingMode::Adr => {
                if self.brick_pct <= 0.0 || self.reversal_pct <= 0.0 {
                    return Err(RenkoError::InvalidConfig(
                        "ADR percentages must be positive".to_string(),
                    ));
                }
                if self.reversal_pct < self.brick_pct {
                    return Err(RenkoError::InvalidConfig(format!(
                        "reversal_pct {} is smaller than brick_pct {}",
                        self.reversal_pct, self.brick_pct
                    )));
                }
                if self.adr_period == 0 {
                    return Err(RenkoError::InvalidConfig(
                        "adr_period must be positive".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validate and build the size schedule this config describes.
    pub fn build_schedule(
        &self,
        bars: &[OhlcBar],
        schedule: &SessionSchedule,
    ) -> Result<Vec<SizeScheduleEntry>> {
        self.validate()?;
        match self.sizing_mode {
            SizingMode::Price => Ok(price_schedule(self.brick_size, self.reversal_size)),
            SizingMode::Adr => build_size_schedule(
                bars,
                schedule,
                self.adr_period,
                self.brick_pct,
                self.reversal_pct,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_mode_schedule() {
        let config = SizingConfig::default();
        let schedule = config
            .build_schedule(&[], &SessionSchedule::default())
            .unwrap();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].source_index, 0);
        assert_eq!(schedule[0].brick_size, 0.0010);
        assert_eq!(schedule[0].adr_value, None);
    }

    #[test]
    fn test_reversal_below_brick_rejected() {
        let config = SizingConfig {
            reversal_size: 0.0005,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RenkoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_brick_size_rejected() {
        let config = SizingConfig {
            brick_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RenkoError::InvalidBrickSize(_))
        ));
    }

    #[test]
    fn test_adr_mode_validation() {
        let config = SizingConfig {
            sizing_mode: SizingMode::Adr,
            reversal_pct: 2.0,
            brick_pct: 5.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RenkoError::InvalidConfig(_))
        ));

        let config = SizingConfig {
            sizing_mode: SizingMode::Adr,
            adr_period: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RenkoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_adr_mode_without_history_fails() {
        let config = SizingConfig {
            sizing_mode: SizingMode::Adr,
            ..Default::default()
        };
        let err = config
            .build_schedule(&[], &SessionSchedule::default())
            .unwrap_err();
        assert!(matches!(err, RenkoError::InsufficientHistory { .. }));
    }

    #[test]
    fn test_sizing_mode_serde_names() {
        let config: SizingConfig = serde_json::from_str(r#"{"sizing_mode": "adr"}"#).unwrap();
        assert_eq!(config.sizing_mode, SizingMode::Adr);
        assert_eq!(config.brick_size, 0.0010);
    }
}

//! Cylinder calibration and the remaining-gas calculation.

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Physical calibration of the cylinder sitting on the scale.
///
/// Loaded once at startup and never mutated afterwards. All weights are in
/// pounds, the same unit the scale reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CylinderProfile {
    tare_weight: f64,
    full_weight: f64,
    extra_weight: f64,
}

/// On-disk layout of `cylinder.json`.
#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(rename = "tareweight")]
    tare_weight: f64,
    #[serde(rename = "fullweight")]
    full_weight: f64,
    /// Regulator, hose and safety chain resting on the scale
    #[serde(rename = "extraweight", default)]
    extra_weight: f64,
}

impl CylinderProfile {
    /// Create a validated profile.
    ///
    /// Rejects non-finite values, a full weight that does not exceed the tare
    /// weight, and any combination that leaves no positive weight range to
    /// divide by.
    pub fn new(tare_weight: f64, full_weight: f64, extra_weight: f64) -> Result<Self> {
        for (name, value) in [
            ("tare weight", tare_weight),
            ("full weight", full_weight),
            ("extra weight", extra_weight),
        ] {
            if !value.is_finite() {
                return Err(BotError::config_error(format!(
                    "Cylinder {} must be a finite number, got {}",
                    name, value
                )));
            }
        }

        if full_weight <= tare_weight {
            return Err(BotError::config_error(format!(
                "Cylinder full weight ({}) must be greater than its tare weight ({})",
                full_weight, tare_weight
            )));
        }

        let profile = Self {
            tare_weight,
            full_weight,
            extra_weight,
        };

        if profile.base_weight() <= 0.0 {
            return Err(BotError::config_error(format!(
                "Extra weight ({}) leaves no usable range between tare ({}) and full ({})",
                extra_weight, tare_weight, full_weight
            )));
        }

        Ok(profile)
    }

    /// Parse and validate a profile from the contents of `cylinder.json`.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ProfileFile = serde_json::from_str(content)
            .map_err(|e| BotError::config_error(format!("Failed to read cylinder data: {}", e)))?;
        Self::new(file.tare_weight, file.full_weight, file.extra_weight)
    }

    /// Load and validate a profile from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::config_error(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn tare_weight(&self) -> f64 {
        self.tare_weight
    }

    pub fn full_weight(&self) -> f64 {
        self.full_weight
    }

    pub fn extra_weight(&self) -> f64 {
        self.extra_weight
    }

    fn base_weight(&self) -> f64 {
        self.full_weight - self.tare_weight + self.extra_weight
    }

    /// Percentage of gas left for a raw scale reading.
    ///
    /// The result is rounded with [`f64::round`], so exact halves round away
    /// from zero (12.5 becomes 13, -12.5 becomes -13). It is deliberately not
    /// clamped: an over-filled cylinder reads above 100 and a miscalibrated
    /// scale can read below 0.
    pub fn remaining_percent(&self, current_weight: f64) -> f64 {
        let current = current_weight - self.tare_weight + self.extra_weight;
        (current / self.base_weight() * 100.0).round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_with_extra_weight() {
        let profile = CylinderProfile::new(20.0, 60.0, 5.0).unwrap();
        // (50 - 20 + 5) / (60 - 20 + 5) = 77.7...
        assert_eq!(profile.remaining_percent(50.0), 78.0);
    }

    #[test]
    fn test_remaining_at_bounds() {
        let profile = CylinderProfile::new(17.0, 37.0, 0.0).unwrap();
        assert_eq!(profile.remaining_percent(37.0), 100.0);
        assert_eq!(profile.remaining_percent(17.0), 0.0);
    }

    #[test]
    fn test_remaining_is_not_clamped() {
        let profile = CylinderProfile::new(17.0, 37.0, 0.0).unwrap();
        assert_eq!(profile.remaining_percent(41.0), 120.0);
        assert_eq!(profile.remaining_percent(15.0), -10.0);
    }

    #[test]
    fn test_halves_round_away_from_zero() {
        let profile = CylinderProfile::new(0.0, 8.0, 0.0).unwrap();
        // 1/8 = 12.5%
        assert_eq!(profile.remaining_percent(1.0), 13.0);
        assert_eq!(profile.remaining_percent(-1.0), -13.0);
        // 3/8 = 37.5%
        assert_eq!(profile.remaining_percent(3.0), 38.0);
    }

    #[test]
    fn test_rejects_full_not_above_tare() {
        assert!(matches!(
            CylinderProfile::new(37.0, 37.0, 0.0),
            Err(BotError::Config(_))
        ));
        assert!(CylinderProfile::new(40.0, 37.0, 0.0).is_err());
    }

    #[test]
    fn test_rejects_zero_denominator() {
        // 60 - 20 - 40 == 0
        assert!(matches!(
            CylinderProfile::new(20.0, 60.0, -40.0),
            Err(BotError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(CylinderProfile::new(f64::NAN, 37.0, 0.0).is_err());
        assert!(CylinderProfile::new(17.0, f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_from_json() {
        let profile =
            CylinderProfile::from_json(r#"{"tareweight": 17.5, "fullweight": 37.5, "extraweight": 2}"#)
                .unwrap();
        assert_eq!(profile.tare_weight(), 17.5);
        assert_eq!(profile.full_weight(), 37.5);
        assert_eq!(profile.extra_weight(), 2.0);
    }

    #[test]
    fn test_from_json_extra_weight_defaults_to_zero() {
        let profile = CylinderProfile::from_json(r#"{"tareweight": 17, "fullweight": 37}"#).unwrap();
        assert_eq!(profile.extra_weight(), 0.0);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            CylinderProfile::from_json("{not json"),
            Err(BotError::Config(_))
        ));
    }
}

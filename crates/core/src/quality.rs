//! Quality score and spoilage risk from environmental readings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Score reported when a lot has no readings at all.
pub const NEUTRAL_SCORE: f64 = 50.0;

const BELOW_RANGE_WEIGHT: f64 = 1.5;
const ABOVE_RANGE_WEIGHT: f64 = 1.2;

/// The environmental fields a reading may carry. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub soil_moisture_pct: Option<f64>,
    pub ph: Option<f64>,
}

/// A tracked field with its ideal closed range.
#[derive(Debug, Clone, Copy)]
pub struct IdealRange {
    pub field: &'static str,
    pub lo: f64,
    pub hi: f64,
    get: fn(&Reading) -> Option<f64>,
}

impl IdealRange {
    pub fn value(&self, reading: &Reading) -> Option<f64> {
        (self.get)(reading)
    }

    /// Distance outside the range, weighted by side. Zero inside the range.
    pub fn penalty(&self, value: f64) -> f64 {
        if value < self.lo {
            (self.lo - value) * BELOW_RANGE_WEIGHT
        } else if value > self.hi {
            (value - self.hi) * ABOVE_RANGE_WEIGHT
        } else {
            0.0
        }
    }
}

pub const IDEAL_RANGES: [IdealRange; 4] = [
    IdealRange {
        field: "temperature_c",
        lo: 8.0,
        hi: 15.0,
        get: |r| r.temperature_c,
    },
    IdealRange {
        field: "humidity_pct",
        lo: 85.0,
        hi: 95.0,
        get: |r| r.humidity_pct,
    },
    IdealRange {
        field: "soil_moisture_pct",
        lo: 25.0,
        hi: 45.0,
        get: |r| r.soil_moisture_pct,
    },
    IdealRange {
        field: "ph",
        lo: 6.0,
        hi: 7.0,
        get: |r| r.ph,
    },
];

/// Score the most recent reading on a 0..=100 scale, rounded to 2 decimals.
///
/// Only the last reading counts; earlier readings are ignored. An empty
/// slice scores [`NEUTRAL_SCORE`].
pub fn score(readings: &[Reading]) -> f64 {
    let Some(latest) = readings.last() else {
        return NEUTRAL_SCORE;
    };
    let penalty: f64 = IDEAL_RANGES
        .iter()
        .filter_map(|range| range.value(latest).map(|v| range.penalty(v)))
        .sum();
    round2((100.0 - penalty).max(0.0))
}

/// Round to 2 decimal places, ties to even on the exact binary value.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Spoilage risk bucket derived from a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpoilageRisk {
    Low,
    Medium,
    High,
}

impl SpoilageRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            SpoilageRisk::Low => "LOW",
            SpoilageRisk::Medium => "MEDIUM",
            SpoilageRisk::High => "HIGH",
        }
    }
}

impl fmt::Display for SpoilageRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `>= 80` is LOW, `>= 60` is MEDIUM, everything else (NaN included) is HIGH.
pub fn label(score: f64) -> SpoilageRisk {
    if score >= 80.0 {
        SpoilageRisk::Low
    } else if score >= 60.0 {
        SpoilageRisk::Medium
    } else {
        SpoilageRisk::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ideal() -> Reading {
        Reading {
            temperature_c: Some(10.0),
            humidity_pct: Some(90.0),
            soil_moisture_pct: Some(30.0),
            ph: Some(6.5),
        }
    }

    #[test]
    fn no_readings_is_neutral() {
        assert_eq!(score(&[]), 50.0);
        assert_eq!(label(score(&[])), SpoilageRisk::High);
    }

    #[test]
    fn ideal_reading_scores_full() {
        assert_eq!(score(&[ideal()]), 100.0);
        assert_eq!(label(100.0), SpoilageRisk::Low);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let r = Reading {
            temperature_c: Some(15.0),
            humidity_pct: Some(85.0),
            soil_moisture_pct: Some(45.0),
            ph: Some(6.0),
        };
        assert_eq!(score(&[r]), 100.0);
    }

    #[test]
    fn above_range_uses_upper_weight() {
        let r = Reading {
            temperature_c: Some(20.0),
            ..ideal()
        };
        assert_eq!(score(&[r]), 94.0);
        assert_eq!(label(94.0), SpoilageRisk::Low);
    }

    #[test]
    fn below_range_uses_lower_weight() {
        let r = Reading {
            temperature_c: Some(2.0),
            ..ideal()
        };
        assert_eq!(score(&[r]), 91.0);
    }

    #[test]
    fn score_is_clamped_at_zero() {
        let r = Reading {
            temperature_c: Some(-60.0),
            ..ideal()
        };
        assert_eq!(score(&[r]), 0.0);
        assert_eq!(label(0.0), SpoilageRisk::High);
    }

    #[test]
    fn absent_fields_cost_nothing() {
        let r = Reading {
            temperature_c: Some(25.0),
            humidity_pct: Some(40.0),
            ..Reading::default()
        };
        // (25 - 15) * 1.2 + (85 - 40) * 1.5 = 12 + 67.5
        assert_eq!(score(&[r]), 20.5);
        assert_eq!(score(&[Reading::default()]), 100.0);
    }

    #[test]
    fn only_latest_reading_counts() {
        let bad = Reading {
            temperature_c: Some(40.0),
            ..ideal()
        };
        assert_eq!(score(&[bad, ideal()]), 100.0);
        assert_eq!(score(&[ideal(), bad]), 70.0);
    }

    #[test]
    fn score_rounds_to_two_decimals() {
        let r = Reading {
            ph: Some(7.333),
            ..ideal()
        };
        // 100 - 0.333 * 1.2 = 99.6004
        assert_eq!(score(&[r]), 99.6);
    }

    #[test]
    fn label_thresholds() {
        assert_eq!(label(80.0), SpoilageRisk::Low);
        assert_eq!(label(79.99), SpoilageRisk::Medium);
        assert_eq!(label(60.0), SpoilageRisk::Medium);
        assert_eq!(label(59.99), SpoilageRisk::High);
        assert_eq!(label(-5.0), SpoilageRisk::High);
        assert_eq!(label(250.0), SpoilageRisk::Low);
        assert_eq!(label(f64::NAN), SpoilageRisk::High);
    }

    #[test]
    fn risk_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&SpoilageRisk::Medium).unwrap(),
            "\"MEDIUM\""
        );
        assert_eq!(SpoilageRisk::High.to_string(), "HIGH");
    }
}

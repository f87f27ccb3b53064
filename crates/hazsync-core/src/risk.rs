//! Risk factors and the severity × likelihood ranking matrix.
//!
//! Severity and likelihood are 1..=5 scales. An entry with neither factor
//! assessed has no rank and counts as "unassessed" in aggregates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive bounds for both risk factors.
pub const FACTOR_MIN: u8 = 1;
/// Upper bound of the 5-point factor scale.
pub const FACTOR_MAX: u8 = 5;

/// A risk factor value outside the 1..=5 scale.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{factor} must be between {FACTOR_MIN} and {FACTOR_MAX}, got {value}")]
pub struct FactorOutOfRange {
    /// Which factor was invalid ("severity" or "likelihood").
    pub factor: &'static str,
    /// The rejected value.
    pub value: u8,
}

/// Consequence severity on a 1..=5 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Severity(u8);

impl Severity {
    /// Validate and wrap a raw severity value.
    pub fn new(value: u8) -> Result<Self, FactorOutOfRange> {
        if (FACTOR_MIN..=FACTOR_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(FactorOutOfRange {
                factor: "severity",
                value,
            })
        }
    }

    /// Raw scale value.
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Occurrence likelihood on a 1..=5 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Likelihood(u8);

impl Likelihood {
    /// Validate and wrap a raw likelihood value.
    pub fn new(value: u8) -> Result<Self, FactorOutOfRange> {
        if (FACTOR_MIN..=FACTOR_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(FactorOutOfRange {
                factor: "likelihood",
                value,
            })
        }
    }

    /// Raw scale value.
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Categorical risk rank derived from the severity × likelihood matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRank {
    /// Score ≥ 15.
    High,
    /// Score 8..=14.
    Medium,
    /// Score ≤ 7.
    Low,
}

impl RiskRank {
    /// Canonical storage string for this rank.
    pub fn as_str(self) -> &'static str {
        match self {
            RiskRank::High => "high",
            RiskRank::Medium => "medium",
            RiskRank::Low => "low",
        }
    }

    /// Parse a storage string; `None` for unrecognized input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(RiskRank::High),
            "medium" => Some(RiskRank::Medium),
            "low" => Some(RiskRank::Low),
            _ => None,
        }
    }
}

impl fmt::Display for RiskRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank a severity/likelihood pair on the 5×5 matrix.
pub fn rank(severity: Severity, likelihood: Likelihood) -> RiskRank {
    let score = u16::from(severity.value()) * u16::from(likelihood.value());
    if score >= 15 {
        RiskRank::High
    } else if score >= 8 {
        RiskRank::Medium
    } else {
        RiskRank::Low
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// Qualitative reading of a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// Scores below this are `Low`.
    pub const MEDIUM_FROM: u8 = 30;
    /// Scores at or above this are `High`.
    pub const HIGH_FROM: u8 = 60;

    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        if score >= Self::HIGH_FROM {
            Self::High
        } else if score >= Self::MEDIUM_FROM {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring a request against its project.
///
/// Invariant: `score <= 100` and `band == RiskBand::from_score(score)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    score: u8,
    band: RiskBand,
    notes: String,
}

impl RiskAssessment {
    pub const MAX_SCORE: u8 = 100;

    /// Clamp `raw` into range and derive the band from it.
    #[must_use]
    pub fn new(raw: u32, notes: impl Into<String>) -> Self {
        let score = raw.min(u32::from(Self::MAX_SCORE)) as u8;
        Self {
            score,
            band: RiskBand::from_score(score),
            notes: notes.into(),
        }
    }

    #[must_use]
    pub const fn score(&self) -> u8 {
        self.score
    }

    #[must_use]
    pub const fn band(&self) -> RiskBand {
        self.band
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }
}

#[cfg(test)]
mod tests {
    use super::{RiskAssessment, RiskBand};

    #[test]
    fn band_thresholds() {
        assert_eq!(RiskBand::from_score(0), RiskBand::Low);
        assert_eq!(RiskBand::from_score(29), RiskBand::Low);
        assert_eq!(RiskBand::from_score(30), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(59), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(60), RiskBand::High);
        assert_eq!(RiskBand::from_score(100), RiskBand::High);
    }

    #[test]
    fn score_is_capped() {
        let risk = RiskAssessment::new(140, "x");
        assert_eq!(risk.score(), 100);
        assert_eq!(risk.band(), RiskBand::High);
    }
}

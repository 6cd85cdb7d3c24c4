//! Risk score for a revision request against its seed project.

use revdesk_types::{Project, RiskAssessment};

const UNKNOWN_PROJECT: u32 = 35;
const MISSING_AMOUNT: u32 = 30;
const EXCEEDS_REMAINING: u32 = 50;
const HIGH_SPENT_RATIO: u32 = 15;
const LARGE_SHARE_OF_TOTAL: u32 = 15;
const NON_POSITIVE_AMOUNT: u32 = 20;
const SHORT_JUSTIFICATION: u32 = 10;

const SPENT_RATIO_THRESHOLD: f64 = 0.9;
const SHARE_OF_TOTAL_THRESHOLD: f64 = 0.2;
const MIN_JUSTIFICATION_CHARS: usize = 50;

pub const NO_RISK_NOTE: &str = "No significant risk signal.";

/// Score a request. An unknown project short-circuits every other rule.
#[must_use]
pub fn assess_risk(
    project: Option<&Project>,
    requested_amount_try: Option<i64>,
    justification: Option<&str>,
) -> RiskAssessment {
    let Some(project) = project else {
        return RiskAssessment::new(
            UNKNOWN_PROJECT,
            "Project code not found in the project registry; verify the reference.",
        );
    };

    let mut score = 0;
    let mut notes: Vec<&str> = Vec::new();

    match requested_amount_try {
        None => {
            score += MISSING_AMOUNT;
            notes.push("Requested amount could not be extracted; verify manually.");
        }
        Some(amount) => {
            if amount > project.remaining_try() {
                score += EXCEEDS_REMAINING;
                notes.push("Requested amount exceeds the remaining budget.");
            }
            if project.spent_ratio() >= SPENT_RATIO_THRESHOLD {
                score += HIGH_SPENT_RATIO;
                notes.push("Budget is 90%+ spent; the revision may have a large impact.");
            }
            if project.total_budget_try > 0
                && amount as f64 / project.total_budget_try as f64 >= SHARE_OF_TOTAL_THRESHOLD
            {
                score += LARGE_SHARE_OF_TOTAL;
                notes.push("Request is 20%+ of the total budget.");
            }
            if amount <= 0 {
                score += NON_POSITIVE_AMOUNT;
                notes.push("Requested amount is not positive.");
            }
        }
    }

    let justification_len = justification.map_or(0, |j| j.trim().chars().count());
    if justification_len < MIN_JUSTIFICATION_CHARS {
        score += SHORT_JUSTIFICATION;
        notes.push("Justification is too short; ask for details.");
    }

    if notes.is_empty() {
        RiskAssessment::new(score, NO_RISK_NOTE)
    } else {
        RiskAssessment::new(score, notes.join(" "))
    }
}

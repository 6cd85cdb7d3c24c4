//! Core domain types for Revision Desk.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
mod risk;
mod settings;
mod text;

pub use ids::{ProjectCode, ProjectCodeError, RequestId, RequestIdError};
pub use risk::{RiskAssessment, RiskBand};
pub use settings::{ApiKey, ExtractorSettings, NotifierSettings, Settings};
pub use text::{display_or_dash, group_thousands, truncate_chars};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Seed Dataset
// ============================================================================

/// A project record from the seed dataset.
///
/// Amounts are whole Turkish lira.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_code: ProjectCode,
    pub project_name: String,
    pub ministry: String,
    pub total_budget_try: i64,
    pub spent_try: i64,
}

impl Project {
    /// Budget left to spend, never negative.
    #[must_use]
    pub fn remaining_try(&self) -> i64 {
        (self.total_budget_try - self.spent_try).max(0)
    }

    /// Fraction of the budget already spent, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn spent_ratio(&self) -> f64 {
        if self.total_budget_try <= 0 {
            return 0.0;
        }
        (self.spent_try as f64 / self.total_budget_try as f64).clamp(0.0, 1.0)
    }
}

// ============================================================================
// Request Lifecycle
// ============================================================================

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariantError {
    kind: &'static str,
    value: String,
}

/// Lifecycle state of a revision request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownVariantError> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariantError {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of human review.
///
/// Separate from [`RequestStatus`] so that "decide to keep pending" is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownVariantError> {
        match value.trim() {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariantError {
                kind: "decision",
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn status(self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Which extractor produced a [`ParsedRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Rules,
    OpenAI,
}

impl ExtractionMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::OpenAI => "openai",
        }
    }
}

/// Fields pulled out of a request document.
///
/// `extracted` is the raw, method-specific payload kept for auditing. It always
/// carries a `"method"` key.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    pub project_code: Option<ProjectCode>,
    pub requested_amount_try: Option<i64>,
    pub justification: Option<String>,
    pub method: ExtractionMethod,
    pub extracted: serde_json::Map<String, serde_json::Value>,
}

impl ParsedRequest {
    /// Build a parsed request and its audit payload from already-extracted fields.
    #[must_use]
    pub fn new(
        method: ExtractionMethod,
        project_code: Option<ProjectCode>,
        requested_amount_try: Option<i64>,
        justification: Option<String>,
    ) -> Self {
        let mut extracted = serde_json::Map::new();
        extracted.insert("method".into(), method.as_str().into());
        extracted.insert(
            "project_code".into(),
            project_code
                .as_ref()
                .map_or(serde_json::Value::Null, |c| c.as_str().into()),
        );
        extracted.insert("requested_amount_try".into(), requested_amount_try.into());
        extracted.insert(
            "justification".into(),
            justification
                .as_deref()
                .map_or(serde_json::Value::Null, Into::into),
        );
        Self {
            project_code,
            requested_amount_try,
            justification,
            method,
            extracted,
        }
    }

    /// Serialize the audit payload.
    #[must_use]
    pub fn extracted_json(&self) -> String {
        serde_json::Value::Object(self.extracted.clone()).to_string()
    }
}

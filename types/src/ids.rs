use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_REQUEST_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestIdError {
    #[error("request id must not be empty")]
    Empty,
    #[error("request id is longer than {MAX_REQUEST_ID_LEN} characters")]
    TooLong,
    #[error("request id may only contain ASCII letters and digits")]
    InvalidCharacter,
}

/// Opaque identifier of a revision request.
///
/// Ids arrive from URL paths, so they are restricted to ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    pub fn parse(raw: &str) -> Result<Self, RequestIdError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RequestIdError::Empty);
        }
        if raw.len() > MAX_REQUEST_ID_LEN {
            return Err(RequestIdError::TooLong);
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(RequestIdError::InvalidCharacter);
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RequestId {
    type Error = RequestIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RequestId> for String {
    fn from(value: RequestId) -> Self {
        value.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("project code must not be empty")]
pub struct ProjectCodeError;

/// Project code as written in the seed dataset (e.g. `2024-123456`).
///
/// Codes typed in by a reviewer are free text and need not exist in the seed
/// data; the only invariant is that the trimmed value is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectCode(String);

impl ProjectCode {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ProjectCodeError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Err(ProjectCodeError)
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Build a code from the year and serial parts found in a document.
    #[must_use]
    pub fn from_parts(year: &str, serial: &str) -> Self {
        Self(format!("{year}-{serial}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectCode {
    type Error = ProjectCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectCode> for String {
    fn from(value: ProjectCode) -> Self {
        value.0
    }
}

impl fmt::Display for ProjectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Resolved configuration types shared across crates.
//!
//! These types represent fully-validated, resolved configuration state.
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! `revdesk-config`. The config loader resolves them into these types at the
//! parse boundary.
//!
//! Existence of a variant is the proof of its validity: an `OpenAI` extractor
//! always has a key, a `Webhook` notifier always has a URL.

use std::path::PathBuf;

/// Secret API key.
///
/// Note: `Debug` is manually implemented to redact the key value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank keys so "configured but empty" collapses into "not configured".
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// How request documents are turned into fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtractorSettings {
    /// Regex rules only.
    #[default]
    Rules,
    /// Chat-completions call with rules as the fallback.
    OpenAI {
        api_key: ApiKey,
        model: String,
        endpoint: String,
    },
}

impl ExtractorSettings {
    pub const DEFAULT_OPENAI_MODEL: &'static str = "gpt-4o-mini";
    pub const DEFAULT_OPENAI_ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::OpenAI { .. } => "openai",
        }
    }
}

/// Where processing notifications go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotifierSettings {
    #[default]
    Disabled,
    Webhook { url: String },
}

/// Fully resolved application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub app_name: String,
    pub bind: String,
    pub base_url: String,
    pub data_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub extractor: ExtractorSettings,
    pub notifier: NotifierSettings,
}

impl Settings {
    pub const DEFAULT_APP_NAME: &'static str = "Investment Program Revision Desk";
    pub const DEFAULT_BIND: &'static str = "127.0.0.1:8000";
    pub const DEFAULT_BASE_URL: &'static str = "http://127.0.0.1:8000";
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

    /// SQLite database location.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("app.db")
    }

    /// Optional on-disk override for the compiled-in seed dataset.
    #[must_use]
    pub fn seed_path(&self) -> PathBuf {
        self.data_dir.join("projects_seed.json")
    }

    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.storage_dir.join("requests")
    }

    #[must_use]
    pub fn presentations_dir(&self) -> PathBuf {
        self.output_dir.join("presentations")
    }

    #[must_use]
    pub fn knowledge_base_dir(&self) -> PathBuf {
        self.output_dir.join("knowledge_base")
    }

    /// Absolute link to a request's review page.
    #[must_use]
    pub fn review_url(&self, request_id: &str) -> String {
        format!("{}/requests/{request_id}", self.base_url.trim_end_matches('/'))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: Self::DEFAULT_APP_NAME.to_string(),
            bind: Self::DEFAULT_BIND.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from("./data"),
            storage_dir: PathBuf::from("./storage"),
            output_dir: PathBuf::from("./outputs"),
            max_upload_bytes: Self::DEFAULT_MAX_UPLOAD_BYTES,
            extractor: ExtractorSettings::Rules,
            notifier: NotifierSettings::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiKey, Settings};

    #[test]
    fn blank_api_key_is_absent() {
        assert!(ApiKey::new("  ").is_none());
        assert_eq!(ApiKey::new(" sk-1 ").unwrap().as_str(), "sk-1");
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert!(!format!("{key:?}").contains("secret"));
    }

    #[test]
    fn review_url_strips_trailing_slash() {
        let settings = Settings {
            base_url: "http://demo.local/".into(),
            ..Settings::default()
        };
        assert_eq!(settings.review_url("abc"), "http://demo.local/requests/abc");
    }
}

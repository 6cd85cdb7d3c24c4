//! Incoming-webhook notifier (Mattermost/Slack style).

use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use revdesk_types::NotifierSettings;

use crate::read_capped_error_body;
use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};

const WEBHOOK_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook returned {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("webhook request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },
}

/// Posts `{"text": ...}` to a webhook URL. Without a URL every call is a no-op.
///
/// Each notification is a single POST unless [`WebhookNotifier::with_retry`]
/// installs a retry policy.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: Option<String>,
    retry: RetryConfig,
    timeout: Duration,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            url: url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            retry: RetryConfig::none(),
            timeout: Duration::from_secs(WEBHOOK_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &NotifierSettings) -> Self {
        match settings {
            NotifierSettings::Disabled => Self::new(None),
            NotifierSettings::Webhook { url } => Self::new(Some(url.clone())),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Returns `Ok(false)` when no webhook is configured, `Ok(true)` once delivered.
    pub async fn notify(&self, client: &reqwest::Client, text: &str) -> Result<bool, NotifyError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(false);
        };
        let body = json!({ "text": text });

        match send_with_retry(
            || client.post(url).timeout(self.timeout).json(&body),
            &self.retry,
        )
        .await
        {
            RetryOutcome::Success(_) => {
                tracing::debug!("Webhook notification delivered");
                Ok(true)
            }
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                Err(NotifyError::Http { status, body })
            }
            RetryOutcome::Transport { attempts, source } => {
                Err(NotifyError::Transport { attempts, source })
            }
        }
    }
}

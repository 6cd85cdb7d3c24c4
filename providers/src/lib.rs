//! Outbound HTTP clients for Revision Desk.
//!
//! - [`openai`] - Chat Completions call that extracts request fields as a JSON object
//! - [`notifier`] - Mattermost-style incoming webhook (`{"text": ...}`)
//! - [`retry`] - Shared retry policy with exponential backoff
//!
//! Both clients take a `&reqwest::Client` so callers share one connection pool;
//! [`http_client`] provides the process-wide default.

pub mod notifier;
pub mod openai;
pub mod retry;

use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

pub use notifier::{NotifyError, WebhookNotifier};
pub use openai::OpenAIExtractor;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

const USER_AGENT: &str = concat!("revdesk/", env!("CARGO_PKG_VERSION"));

/// Errors from the extraction provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API error {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!("Failed to build configured HTTP client: {e}. Using defaults.");
            reqwest::Client::new()
        })
    })
}

/// Plain HTTP is permitted: webhook URLs may point at internal services.
fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Read at most 32 KiB of an error response body.
pub async fn read_capped_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{MAX_ERROR_BODY_BYTES, http_client, read_capped_error_body};

    #[tokio::test]
    async fn error_body_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(100_000)))
            .mount(&server)
            .await;

        let response = http_client().get(server.uri()).send().await.unwrap();
        let body = read_capped_error_body(response).await;
        assert!(body.ends_with("...(truncated)"));
        assert_eq!(body.len(), MAX_ERROR_BODY_BYTES + "...(truncated)".len());
    }

    #[tokio::test]
    async fn short_error_body_is_returned_whole() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let response = http_client().get(server.uri()).send().await.unwrap();
        assert_eq!(read_capped_error_body(response).await, "bad request");
    }
}

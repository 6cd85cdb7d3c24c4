//! Human-readable descriptions of extraction provider failures.
//!
//! The result is stored next to the rules fallback as `extracted.openai_error`,
//! so it stays a single short line.

use serde_json::Value;

use revdesk_providers::ProviderError;
use revdesk_types::truncate_chars;

const DETAIL_MAX_CHARS: usize = 200;

/// Pull the `message` out of an OpenAI-style JSON error body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body.trim()).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

#[must_use]
pub fn is_auth_error(status: Option<reqwest::StatusCode>, detail: &str) -> bool {
    if status.is_some_and(|s| s == reqwest::StatusCode::UNAUTHORIZED) {
        return true;
    }
    let lower = detail.to_ascii_lowercase();
    let mentions_key = lower.contains("api key") || lower.contains("authorization");
    let auth_words = lower.contains("invalid")
        || lower.contains("incorrect")
        || lower.contains("missing")
        || lower.contains("unauthorized");

    lower.contains("invalid_api_key")
        || lower.contains("you must provide an api key")
        || (mentions_key && auth_words)
}

/// Format a provider error as one line.
#[must_use]
pub fn describe_provider_error(err: &ProviderError) -> String {
    match err {
        ProviderError::Http { status, body } => {
            let detail = extract_error_message(body).unwrap_or_else(|| body.trim().to_string());
            let detail = flatten(&detail);
            if is_auth_error(Some(*status), &detail) {
                return format!("OpenAI authentication failed ({status}); check OPENAI_API_KEY");
            }
            if detail.is_empty() {
                format!("OpenAI request failed ({status})")
            } else {
                format!("OpenAI request failed ({status}): {detail}")
            }
        }
        ProviderError::Transport { .. } | ProviderError::MalformedResponse(_) => {
            flatten(&err.to_string())
        }
    }
}

fn flatten(detail: &str) -> String {
    let single_line = detail.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > DETAIL_MAX_CHARS {
        format!("{}...", truncate_chars(&single_line, DETAIL_MAX_CHARS))
    } else {
        single_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn extracts_nested_openai_message() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("Rate limit reached"));
        assert_eq!(
            extract_error_message(r#"{"message":"flat"}"#).as_deref(),
            Some("flat")
        );
        assert!(extract_error_message("<html>bad gateway</html>").is_none());
    }

    #[test]
    fn auth_failures_point_at_the_key() {
        let err = ProviderError::Http {
            status: StatusCode::UNAUTHORIZED,
            body: r#"{"error":{"message":"Incorrect API key provided"}}"#.into(),
        };
        let message = describe_provider_error(&err);
        assert!(message.contains("authentication failed"));
        assert!(message.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn http_errors_keep_status_and_detail() {
        let err = ProviderError::Http {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: r#"{"error":{"message":"Rate limit\nreached"}}"#.into(),
        };
        assert_eq!(
            describe_provider_error(&err),
            "OpenAI request failed (429 Too Many Requests): Rate limit reached"
        );

        let err = ProviderError::Http {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert_eq!(
            describe_provider_error(&err),
            "OpenAI request failed (502 Bad Gateway)"
        );
    }

    #[test]
    fn long_details_are_truncated() {
        let err = ProviderError::MalformedResponse("x".repeat(500));
        let message = describe_provider_error(&err);
        assert!(message.ends_with("..."));
        assert_eq!(message.chars().count(), DETAIL_MAX_CHARS + 3);
    }

    #[test]
    fn auth_detection_without_status() {
        assert!(is_auth_error(None, "invalid_api_key"));
        assert!(is_auth_error(None, "Missing Authorization header"));
        assert!(!is_auth_error(Some(StatusCode::BAD_REQUEST), "model not found"));
    }
}

//! OpenAI Chat Completions field extractor.
//!
//! Sends the first [`MAX_INPUT_CHARS`] characters of a request document and asks
//! for a JSON object with `project_code`, `requested_amount_try`,
//! `justification` and `confidence`.

use std::time::Duration;

use serde_json::{Map, Value, json};

use revdesk_types::{ApiKey, ExtractionMethod, ExtractorSettings, ParsedRequest, ProjectCode};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{ProviderError, read_capped_error_body};

/// Characters of document text sent to the model.
pub const MAX_INPUT_CHARS: usize = 12_000;

const REQUEST_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str = "You read public investment program documents. Extract the \
investment program revision request from the user's text. Return only a JSON object, no \
other text, with these fields:\n\
- project_code: project code in 'YYYY-123456' form (null if absent)\n\
- requested_amount_try: requested amount in Turkish lira as an integer (null if absent)\n\
- justification: the justification text (null if absent)\n\
- confidence: number between 0 and 1\n";

#[derive(Debug, Clone)]
pub struct OpenAIExtractor {
    api_key: ApiKey,
    model: String,
    endpoint: String,
    retry: RetryConfig,
    timeout: Duration,
}

impl OpenAIExtractor {
    #[must_use]
    pub fn new(api_key: ApiKey, model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            endpoint: endpoint.into(),
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// `None` when the settings select rule-based extraction.
    #[must_use]
    pub fn from_settings(settings: &ExtractorSettings) -> Option<Self> {
        match settings {
            ExtractorSettings::Rules => None,
            ExtractorSettings::OpenAI {
                api_key,
                model,
                endpoint,
            } => Some(Self::new(api_key.clone(), model, endpoint)),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn extract(
        &self,
        client: &reqwest::Client,
        text: &str,
    ) -> Result<ParsedRequest, ProviderError> {
        let body = build_request_body(&self.model, text);
        let auth_header = format!("Bearer {}", self.api_key.as_str());

        let outcome = send_with_retry(
            || {
                client
                    .post(&self.endpoint)
                    .header("Authorization", &auth_header)
                    .timeout(self.timeout)
                    .json(&body)
            },
            &self.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                return Err(ProviderError::Http { status, body });
            }
            RetryOutcome::Transport { attempts, source } => {
                return Err(ProviderError::Transport { attempts, source });
            }
        };

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let parsed = parse_completion(&payload)?;
        tracing::debug!(
            model = %self.model,
            project_code = ?parsed.project_code,
            amount = ?parsed.requested_amount_try,
            "OpenAI extraction complete"
        );
        Ok(parsed)
    }
}

fn build_request_body(model: &str, text: &str) -> Value {
    let input = revdesk_types::truncate_chars(text, MAX_INPUT_CHARS);
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": input },
        ],
        "temperature": 0,
        "response_format": { "type": "json_object" },
    })
}

/// Turn a chat-completions response into a [`ParsedRequest`].
///
/// Every key the model returned is kept in `extracted` next to `"method"`.
fn parse_completion(payload: &Value) -> Result<ParsedRequest, ProviderError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::MalformedResponse("missing choices[0].message.content".to_string())
        })?;
    let fields: Map<String, Value> = match serde_json::from_str(content) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(ProviderError::MalformedResponse(format!(
                "expected a JSON object, got {other}"
            )));
        }
        Err(e) => {
            return Err(ProviderError::MalformedResponse(format!(
                "content is not JSON: {e}"
            )));
        }
    };

    let project_code = fields
        .get("project_code")
        .and_then(Value::as_str)
        .and_then(|code| ProjectCode::new(code).ok());
    let requested_amount_try = fields.get("requested_amount_try").and_then(amount_from_json);
    let justification = fields
        .get("justification")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|j| !j.is_empty())
        .map(str::to_string);

    let mut parsed = ParsedRequest::new(
        ExtractionMethod::OpenAI,
        project_code,
        requested_amount_try,
        justification,
    );
    for (key, value) in fields {
        if key != "method" {
            parsed.extracted.insert(key, value);
        }
    }
    Ok(parsed)
}

fn amount_from_json(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

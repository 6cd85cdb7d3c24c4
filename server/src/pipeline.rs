//! Background processing for one uploaded request.
//!
//! extract text -> parse fields -> project lookup -> risk -> persist -> notify.
//! Failures before persisting are stored in `risk_notes` and audited as
//! `process_failed`; a failed notification is audited as `notify_failed` and
//! does not undo the extraction.

use thiserror::Error;
use tracing::{error, info, warn};

use revdesk_core::{ExtractError, assess_risk, extract_text, parse_revision_request};
use revdesk_store::{AuditAction, Extraction, StoreError};
use revdesk_types::{ParsedRequest, RequestId, RiskAssessment, display_or_dash, group_thousands};

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("text extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run the pipeline and record any failure against the request.
pub async fn process_request(state: AppState, id: RequestId) {
    if let Err(err) = run(&state, &id).await {
        let message = err.to_string();
        warn!(request_id = %id, error = %message, "Processing failed");
        if let Err(e) = state
            .store
            .lock()
            .await
            .record_processing_error(&id, &message)
        {
            error!(request_id = %id, error = %e, "Failed to record processing error");
        }
    }
}

async fn run(state: &AppState, id: &RequestId) -> Result<(), PipelineError> {
    let request = state
        .store
        .lock()
        .await
        .get_request(id)?
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;

    let path = request.stored_path;
    let text = tokio::task::spawn_blocking(move || extract_text(&path)).await??;

    let parsed = parse_revision_request(&text, state.extractor.as_deref(), &state.client).await;

    let risk = {
        let mut store = state.store.lock().await;
        let project = match &parsed.project_code {
            Some(code) => store.get_project(code)?,
            None => None,
        };
        let risk = assess_risk(
            project.as_ref(),
            parsed.requested_amount_try,
            parsed.justification.as_deref(),
        );
        store.record_extraction(
            id,
            &Extraction {
                text: &text,
                parsed: &parsed,
                risk: &risk,
            },
        )?;
        risk
    };
    info!(
        request_id = %id,
        method = parsed.method.as_str(),
        project_code = ?parsed.project_code,
        risk = risk.score(),
        "Processed request"
    );

    notify(state, id, &parsed, &risk).await;
    Ok(())
}

async fn notify(state: &AppState, id: &RequestId, parsed: &ParsedRequest, risk: &RiskAssessment) {
    if !state.notifier.is_enabled() {
        return;
    }
    let message = notification_text(&state.settings.review_url(id.as_str()), id, parsed, risk);
    let (action, detail) = match state.notifier.notify(&state.client, &message).await {
        Ok(_) => (AuditAction::Notified, "webhook".to_string()),
        Err(e) => {
            warn!(request_id = %id, error = %e, "Webhook notification failed");
            (AuditAction::NotifyFailed, e.to_string())
        }
    };
    if let Err(e) = state
        .store
        .lock()
        .await
        .add_audit(id, action, Some(&detail))
    {
        error!(request_id = %id, error = %e, "Failed to audit notification");
    }
}

/// Chat message announcing a processed request.
#[must_use]
pub fn notification_text(
    review_url: &str,
    id: &RequestId,
    parsed: &ParsedRequest,
    risk: &RiskAssessment,
) -> String {
    format!(
        "Revision request received (ID: {id})\n\
         - Project: {project}\n\
         - Amount (TRY): {amount}\n\
         - Risk: {score}/100 ({band})\n\
         - Review: {review_url}",
        project = display_or_dash(parsed.project_code.as_ref()),
        amount = display_or_dash(parsed.requested_amount_try.map(group_thousands)),
        score = risk.score(),
        band = risk.band(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdesk_types::{ExtractionMethod, ProjectCode};

    #[test]
    fn notification_names_request_and_link() {
        let id = RequestId::parse("abc123").unwrap();
        let parsed = ParsedRequest::new(
            ExtractionMethod::Rules,
            Some(ProjectCode::new("2024-123456").unwrap()),
            Some(2_500_000),
            None,
        );
        let risk = RiskAssessment::new(65, "Requested amount exceeds the remaining budget.");
        let text = notification_text("http://desk.local/requests/abc123", &id, &parsed, &risk);
        assert_eq!(
            text,
            "Revision request received (ID: abc123)\n\
             - Project: 2024-123456\n\
             - Amount (TRY): 2.500.000\n\
             - Risk: 65/100 (high)\n\
             - Review: http://desk.local/requests/abc123"
        );
    }

    #[test]
    fn notification_uses_dash_for_missing_fields() {
        let id = RequestId::parse("abc123").unwrap();
        let parsed = ParsedRequest::new(ExtractionMethod::Rules, None, None, None);
        let risk = RiskAssessment::new(35, "not found");
        let text = notification_text("http://x/requests/abc123", &id, &parsed, &risk);
        assert!(text.contains("- Project: -\n"));
        assert!(text.contains("- Amount (TRY): -\n"));
    }
}

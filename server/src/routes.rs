use std::path::Path as FsPath;

use axum::Json;
use axum::extract::{Form, Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use revdesk_core::{
    Brief, Presentation, PresentationError, assess_risk, find_presentation, generate_presentation,
    parse_try_amount, write_knowledge_base_entry,
};
use revdesk_store::{AuditAction, AuditEntry, FieldUpdate, RevisionRequest, Store};
use revdesk_types::{Decision, Project, ProjectCode, RequestId, RiskBand};
use revdesk_utils::sanitize_upload_name;

use crate::error::AppError;
use crate::pipeline;
use crate::state::AppState;
use crate::views;

const DASHBOARD_RECENT_REQUESTS: usize = 20;
const STORED_NAME_PREFIX_LEN: usize = 12;

fn parse_id(raw: &str) -> Result<RequestId, AppError> {
    RequestId::parse(raw).map_err(|_| AppError::NotFound(format!("Request {raw} not found")))
}

fn load_request(store: &Store, id: &RequestId) -> Result<RevisionRequest, AppError> {
    store
        .get_request(id)?
        .ok_or_else(|| AppError::NotFound(format!("Request {id} not found")))
}

fn redirect_to_request(id: &RequestId) -> Redirect {
    Redirect::to(&format!("/requests/{id}"))
}

// ============================================================================
// Pages
// ============================================================================

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(views::index_page(&state.settings.app_name))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.settings.app_name,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn upload_form(State(state): State<AppState>) -> Html<String> {
    Html(views::upload_page(
        &state.settings.app_name,
        state.settings.max_upload_bytes,
    ))
}

pub async fn list_requests(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let requests = state.store.lock().await.list_requests(None)?;
    Ok(Html(views::requests_page(&state.settings.app_name, &requests)))
}

pub async fn request_detail(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let id = parse_id(&raw_id)?;
    let store = state.store.lock().await;
    let request = load_request(&store, &id)?;
    let project = match &request.project_code {
        Some(code) => store.get_project(code)?,
        None => None,
    };
    let audits = store.list_audits(&id)?;
    drop(store);

    Ok(Html(views::request_detail_page(
        &state.settings.app_name,
        &request,
        project.as_ref(),
        &audits,
    )))
}

pub async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let store = state.store.lock().await;
    let projects = store.list_projects()?;
    let totals = store.revision_totals()?;
    let recent = store.list_requests(Some(DASHBOARD_RECENT_REQUESTS))?;
    drop(store);

    Ok(Html(views::dashboard_page(
        &state.settings.app_name,
        &projects,
        &totals,
        &recent,
    )))
}

// ============================================================================
// Upload
// ============================================================================

/// Accept a multipart `file`, store it, create the record and start processing.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = sanitize_upload_name(field.file_name());
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }
    let Some((filename, bytes)) = upload else {
        return Err(AppError::BadRequest("Missing file field".to_string()));
    };

    let dir = state.settings.uploads_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::io(format!("creating {}", dir.display()), e))?;
    let mut prefix = uuid::Uuid::new_v4().simple().to_string();
    prefix.truncate(STORED_NAME_PREFIX_LEN);
    let stored_path = dir.join(format!("{prefix}_{filename}"));
    tokio::fs::write(&stored_path, &bytes)
        .await
        .map_err(|e| AppError::io(format!("writing {}", stored_path.display()), e))?;

    let request = state
        .store
        .lock()
        .await
        .create_request(&filename, &stored_path)?;
    info!(request_id = %request.id, bytes = bytes.len(), "Accepted upload");

    tokio::spawn(pipeline::process_request(state.clone(), request.id.clone()));
    Ok(redirect_to_request(&request.id))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        AppError::BadRequest(format!("Invalid upload: {}", err.body_text()))
    }
}

// ============================================================================
// Review
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EditForm {
    #[serde(default)]
    pub project_code: String,
    #[serde(default)]
    pub requested_amount_try: String,
    #[serde(default)]
    pub justification: String,
}

/// Whole lira, or a grouped amount such as `2.500.000`. Anything else clears the field.
fn parse_amount_field(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i64>()
        .ok()
        .or_else(|| parse_try_amount(raw).filter(|_| !raw.starts_with('-')))
}

pub async fn edit_request(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Form(form): Form<EditForm>,
) -> Result<Redirect, AppError> {
    let id = parse_id(&raw_id)?;
    let project_code = ProjectCode::new(&form.project_code).ok();
    let requested_amount_try = parse_amount_field(&form.requested_amount_try);
    let justification = Some(form.justification.trim())
        .filter(|j| !j.is_empty())
        .map(str::to_string);

    let mut store = state.store.lock().await;
    let project = match &project_code {
        Some(code) => store.get_project(code)?,
        None => None,
    };
    let risk = assess_risk(
        project.as_ref(),
        requested_amount_try,
        justification.as_deref(),
    );
    store.update_fields(
        &id,
        &FieldUpdate {
            project_code,
            requested_amount_try,
            justification,
            risk,
        },
    )?;
    info!(request_id = %id, "Applied manual edit");
    Ok(redirect_to_request(&id))
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionForm {
    #[serde(default)]
    pub note: String,
}

pub async fn approve(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Form(form): Form<DecisionForm>,
) -> Result<Redirect, AppError> {
    decide(&state, &raw_id, Decision::Approved, &form.note).await
}

pub async fn reject(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Form(form): Form<DecisionForm>,
) -> Result<Redirect, AppError> {
    decide(&state, &raw_id, Decision::Rejected, &form.note).await
}

/// Record the decision, then write the knowledge-base entry and, on approval, the brief.
///
/// Artifact failures are logged and audited; the decision itself stands. The
/// store lock is released while the files are written.
async fn decide(
    state: &AppState,
    raw_id: &str,
    decision: Decision,
    note: &str,
) -> Result<Redirect, AppError> {
    let id = parse_id(raw_id)?;
    let (request, project) = {
        let mut store = state.store.lock().await;
        let request = store.record_decision(&id, decision, Some(note))?.request;
        let project = match &request.project_code {
            Some(code) => store.get_project(code)?,
            None => None,
        };
        (request, project)
    };

    let knowledge_base_dir = state.settings.knowledge_base_dir();
    let presentations_dir = state.settings.presentations_dir();
    let presentation = tokio::task::spawn_blocking(move || {
        write_decision_artifacts(
            &knowledge_base_dir,
            &presentations_dir,
            &request,
            project.as_ref(),
            decision,
        )
    })
    .await
    .map_err(|e| AppError::io("writing decision artifacts", std::io::Error::other(e)))?;

    if let Some(presentation) = presentation {
        let mut store = state.store.lock().await;
        match presentation {
            Ok(presentation) => {
                let detail = presentation.path.display().to_string();
                store.add_audit(&id, AuditAction::PresentationGenerated, Some(&detail))?;
            }
            Err(e) => {
                warn!(request_id = %id, error = %e, "Failed to generate presentation");
                store.add_audit(&id, AuditAction::PresentationFailed, Some(&e.to_string()))?;
            }
        }
    }

    Ok(redirect_to_request(&id))
}

/// Blocking file writes for a decided request. Returns the brief outcome for approvals.
fn write_decision_artifacts(
    knowledge_base_dir: &FsPath,
    presentations_dir: &FsPath,
    request: &RevisionRequest,
    project: Option<&Project>,
    decision: Decision,
) -> Option<Result<Presentation, PresentationError>> {
    let brief = Brief {
        request_id: &request.id,
        project_code: request.project_code.as_ref().map(ProjectCode::as_str),
        project_name: project.map(|p| p.project_name.as_str()),
        ministry: project.map(|p| p.ministry.as_str()),
        requested_amount_try: request.requested_amount_try,
        risk_score: request.risk_score,
        decision: Some(decision),
        justification: request.justification.as_deref(),
    };

    match write_knowledge_base_entry(
        knowledge_base_dir,
        &brief,
        decision,
        request.decision_note.as_deref(),
    ) {
        Ok(path) => {
            debug!(request_id = %request.id, path = %path.display(), "Knowledge-base entry written");
        }
        Err(e) => warn!(request_id = %request.id, error = %e, "Failed to write knowledge-base entry"),
    }

    (decision == Decision::Approved).then(|| generate_presentation(presentations_dir, &brief))
}

// ============================================================================
// Downloads and JSON
// ============================================================================

fn content_type_for(path: &FsPath) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// `attachment; filename="..."` with non-ASCII and quote characters replaced.
fn attachment_header(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn file_response(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, attachment_header(filename)),
        ],
        bytes,
    )
        .into_response()
}

async fn read_download(path: &FsPath, missing: &str) -> Result<Vec<u8>, AppError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound(missing.to_string()))
        }
        Err(e) => Err(AppError::io(format!("reading {}", path.display()), e)),
    }
}

pub async fn download_original(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let request = load_request(&*state.store.lock().await, &id)?;
    let bytes = read_download(&request.stored_path, "File missing").await?;
    Ok(file_response(
        bytes,
        content_type_for(&request.stored_path),
        &request.filename,
    ))
}

pub async fn download_presentation(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    const NOT_GENERATED: &str = "Presentation not generated yet (created after approval)";

    let id = parse_id(&raw_id)?;
    let presentation = find_presentation(&state.settings.presentations_dir(), &id)
        .ok_or_else(|| AppError::NotFound(NOT_GENERATED.to_string()))?;
    let bytes = read_download(&presentation.path, NOT_GENERATED).await?;
    Ok(file_response(
        bytes,
        presentation.kind.content_type(),
        &presentation.file_name(),
    ))
}

#[derive(Serialize)]
struct RequestView<'a> {
    #[serde(flatten)]
    request: &'a RevisionRequest,
    risk_band: Option<RiskBand>,
    audits: &'a [AuditEntry],
}

pub async fn api_request(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let store = state.store.lock().await;
    let request = load_request(&store, &id)?;
    let audits = store.list_audits(&id)?;
    drop(store);

    Ok(Json(RequestView {
        request: &request,
        risk_band: request.risk_band(),
        audits: &audits,
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_field_accepts_plain_and_grouped() {
        assert_eq!(parse_amount_field(" 2500000 "), Some(2_500_000));
        assert_eq!(parse_amount_field("2.500.000"), Some(2_500_000));
        assert_eq!(parse_amount_field("-5"), Some(-5));
        assert_eq!(parse_amount_field("-1.000"), None);
        assert_eq!(parse_amount_field(""), None);
        assert_eq!(parse_amount_field("about a million"), None);
    }

    #[test]
    fn attachment_header_is_ascii() {
        let value = attachment_header("gerekçe \"v2\".pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"gerek_e _v2_.pdf\""
        );
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for(FsPath::new("a.PDF")), "application/pdf");
        assert_eq!(content_type_for(FsPath::new("a.txt")), "text/plain; charset=utf-8");
        assert_eq!(content_type_for(FsPath::new("a")), "application/octet-stream");
    }

    fn decided_request(decision: Decision) -> RevisionRequest {
        RevisionRequest {
            id: RequestId::parse("feedbeef").unwrap(),
            filename: "memo.txt".into(),
            stored_path: "memo.txt".into(),
            status: decision.status(),
            extracted_text: None,
            project_code: Some(ProjectCode::new("2024-123456").unwrap()),
            requested_amount_try: Some(2_500_000),
            justification: Some("Signalling costs rose.".into()),
            extracted_json: None,
            risk_score: Some(15),
            risk_notes: None,
            decision: Some(decision),
            decision_note: Some("ok".into()),
            decided_at: Some("2024-01-02T10:00:00Z".into()),
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-02T10:00:00Z".into(),
        }
    }

    #[test]
    fn rejection_artifacts_skip_the_brief() {
        let dir = tempfile::tempdir().unwrap();
        let (kb, briefs) = (dir.path().join("kb"), dir.path().join("briefs"));
        let request = decided_request(Decision::Rejected);

        let presentation = write_decision_artifacts(&kb, &briefs, &request, None, Decision::Rejected);
        assert!(presentation.is_none());
        let entry = std::fs::read_to_string(kb.join("feedbeef.md")).unwrap();
        assert!(entry.contains("**REJECTED**"));
        assert!(!briefs.exists());
    }

    #[test]
    fn approval_artifacts_include_the_brief() {
        let dir = tempfile::tempdir().unwrap();
        let (kb, briefs) = (dir.path().join("kb"), dir.path().join("briefs"));
        let request = decided_request(Decision::Approved);

        let presentation = write_decision_artifacts(&kb, &briefs, &request, None, Decision::Approved)
            .expect("approvals produce a brief")
            .unwrap();
        assert!(presentation.path.starts_with(&briefs));
        assert!(presentation.path.is_file());
        assert!(kb.join("feedbeef.md").is_file());
    }
}

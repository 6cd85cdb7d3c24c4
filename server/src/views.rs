//! Server-rendered HTML pages.
//!
//! Every dynamic value goes through [`escape_html`].

use std::collections::BTreeMap;
use std::fmt::Write as _;

use revdesk_store::{AuditEntry, RevisionRequest};
use revdesk_types::{
    Decision, Project, ProjectCode, RequestStatus, display_or_dash, group_thousands,
};

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem auto;max-width:72rem;padding:0 1rem;color:#1f2937}\
nav a{margin-right:1rem}table{border-collapse:collapse;width:100%}th,td{border-bottom:1px solid #e5e7eb;padding:.4rem;text-align:left;vertical-align:top}\
.badge{padding:.1rem .5rem;border-radius:.5rem;background:#e5e7eb}.low{background:#d1fae5}.medium{background:#fef3c7}.high{background:#fee2e2}\
.error{color:#b91c1c}pre{white-space:pre-wrap;background:#f9fafb;padding:1rem;max-height:24rem;overflow:auto}\
label{display:block;margin-top:.5rem}input[type=text],textarea{width:100%}";

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn opt(value: Option<&str>) -> String {
    escape_html(&display_or_dash(value))
}

fn amount(value: Option<i64>) -> String {
    display_or_dash(value.map(group_thousands))
}

fn status_badge(status: RequestStatus) -> String {
    format!(r#"<span class="badge">{}</span>"#, status.as_str())
}

fn risk_badge(request: &RevisionRequest) -> String {
    match (request.risk_score, request.risk_band()) {
        (Some(score), Some(band)) => {
            format!(r#"<span class="badge {band}">{score} ({band})</span>"#)
        }
        _ => "-".to_string(),
    }
}

pub fn layout(app_name: &str, title: &str, body: &str) -> String {
    let app_name = escape_html(app_name);
    let title = escape_html(title);
    format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title} | {app_name}</title><style>{STYLE}</style></head><body>\
         <nav><a href=\"/\">{app_name}</a><a href=\"/upload\">Upload</a>\
         <a href=\"/requests\">Requests</a><a href=\"/dashboard\">Dashboard</a></nav>\
         <h1>{title}</h1>\n{body}\n</body></html>"
    )
}

// ============================================================================
// Pages
// ============================================================================

pub fn index_page(app_name: &str) -> String {
    layout(
        app_name,
        "Revision Desk",
        "<p>Upload an investment program revision request (PDF or text). Fields are \
         extracted automatically, matched against the project registry and scored for \
         risk, then a reviewer approves or rejects the request.</p>\
         <p><a href=\"/upload\">Upload a request</a> or open the \
         <a href=\"/dashboard\">dashboard</a>.</p>",
    )
}

pub fn upload_page(app_name: &str, max_upload_bytes: usize) -> String {
    let limit_mib = max_upload_bytes / (1024 * 1024);
    layout(
        app_name,
        "Upload request",
        &format!(
            "<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
             <label>Request document (PDF or text, up to {limit_mib} MiB)\
             <input type=\"file\" name=\"file\" required></label>\
             <p><button type=\"submit\">Upload</button></p></form>"
        ),
    )
}

fn request_rows(requests: &[RevisionRequest]) -> String {
    if requests.is_empty() {
        return "<tr><td colspan=\"7\">No requests yet.</td></tr>".to_string();
    }
    let mut rows = String::new();
    for r in requests {
        let _ = write!(
            rows,
            "<tr><td><a href=\"/requests/{id}\">{id}</a></td><td>{filename}</td><td>{status}</td>\
             <td>{code}</td><td>{amount}</td><td>{risk}</td><td>{created}</td></tr>",
            id = r.id,
            filename = escape_html(&r.filename),
            status = status_badge(r.status),
            code = opt(r.project_code.as_ref().map(ProjectCode::as_str)),
            amount = amount(r.requested_amount_try),
            risk = risk_badge(r),
            created = escape_html(&r.created_at),
        );
    }
    rows
}

fn requests_table(requests: &[RevisionRequest]) -> String {
    format!(
        "<table><thead><tr><th>ID</th><th>File</th><th>Status</th><th>Project</th>\
         <th>Amount (TRY)</th><th>Risk</th><th>Created</th></tr></thead><tbody>{}</tbody></table>",
        request_rows(requests)
    )
}

pub fn requests_page(app_name: &str, requests: &[RevisionRequest]) -> String {
    layout(app_name, "Requests", &requests_table(requests))
}

/// The recorded decision, or the approve/reject form while the request is open.
fn decision_section(request: &RevisionRequest) -> String {
    if request.is_decided() {
        format!(
            "<h2>Decision</h2><p><strong>{decision}</strong> at {at}</p><p>{note}</p>",
            decision = display_or_dash(request.decision),
            at = opt(request.decided_at.as_deref()),
            note = opt(request.decision_note.as_deref()),
        )
    } else {
        format!(
            "<h2>Decision</h2><form method=\"post\" action=\"/requests/{id}/approve\">\
             <label>Note<input type=\"text\" name=\"note\"></label>\
             <button type=\"submit\">Approve</button>\
             <button type=\"submit\" formaction=\"/requests/{id}/reject\">Reject</button></form>",
            id = request.id,
        )
    }
}

/// Detail view of one request with its project, audit trail and review forms.
pub fn request_detail_page(
    app_name: &str,
    request: &RevisionRequest,
    project: Option<&Project>,
    audits: &[AuditEntry],
) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "<p>{status} <a href=\"/requests/{id}/download\">Original file</a> | \
         <a href=\"/api/requests/{id}\">JSON</a>",
        status = status_badge(request.status),
        id = request.id,
    );
    if request.decision == Some(Decision::Approved) {
        let _ = write!(
            body,
            " | <a href=\"/requests/{}/presentation\">Presentation</a>",
            request.id
        );
    }
    body.push_str("</p>");

    if request.extracted_text.is_none() && !request.processing_failed() {
        body.push_str("<p><em>Processing... refresh in a moment.</em></p>");
    }

    let notes_class = if request.processing_failed() { " class=\"error\"" } else { "" };
    let _ = write!(
        body,
        "<h2>Extracted fields</h2><table>\
         <tr><th>File</th><td>{filename}</td></tr>\
         <tr><th>Project code</th><td>{code}</td></tr>\
         <tr><th>Requested amount (TRY)</th><td>{amount}</td></tr>\
         <tr><th>Risk</th><td>{risk}</td></tr>\
         <tr><th>Risk notes</th><td{notes_class}>{notes}</td></tr>\
         <tr><th>Justification</th><td>{justification}</td></tr>\
         <tr><th>Created</th><td>{created}</td></tr></table>",
        filename = escape_html(&request.filename),
        code = opt(request.project_code.as_ref().map(ProjectCode::as_str)),
        amount = amount(request.requested_amount_try),
        risk = risk_badge(request),
        notes = opt(request.risk_notes.as_deref()),
        justification = opt(request.justification.as_deref()),
        created = escape_html(&request.created_at),
    );

    body.push_str("<h2>Project</h2>");
    match project {
        Some(p) => {
            let _ = write!(
                body,
                "<table><tr><th>Name</th><td>{name}</td></tr><tr><th>Ministry</th><td>{ministry}</td></tr>\
                 <tr><th>Total budget (TRY)</th><td>{total}</td></tr><tr><th>Spent (TRY)</th><td>{spent}</td></tr>\
                 <tr><th>Remaining (TRY)</th><td>{remaining}</td></tr><tr><th>Spent ratio</th><td>{ratio:.1}%</td></tr></table>",
                name = escape_html(&p.project_name),
                ministry = escape_html(&p.ministry),
                total = group_thousands(p.total_budget_try),
                spent = group_thousands(p.spent_try),
                remaining = group_thousands(p.remaining_try()),
                ratio = p.spent_ratio() * 100.0,
            );
        }
        None => body.push_str("<p>No matching project in the registry.</p>"),
    }

    body.push_str(&decision_section(request));

    let _ = write!(
        body,
        "<h2>Edit fields</h2><form method=\"post\" action=\"/requests/{id}/edit\">\
         <label>Project code<input type=\"text\" name=\"project_code\" value=\"{code}\"></label>\
         <label>Requested amount (TRY)<input type=\"text\" name=\"requested_amount_try\" value=\"{amount}\"></label>\
         <label>Justification<textarea name=\"justification\" rows=\"6\">{justification}</textarea></label>\
         <p><button type=\"submit\">Save and rescore</button></p></form>",
        id = request.id,
        code = escape_html(request.project_code.as_ref().map_or("", ProjectCode::as_str)),
        amount = request
            .requested_amount_try
            .map(|a| a.to_string())
            .unwrap_or_default(),
        justification = escape_html(request.justification.as_deref().unwrap_or("")),
    );

    body.push_str("<h2>Audit log</h2><table><thead><tr><th>Time</th><th>Action</th><th>Detail</th></tr></thead><tbody>");
    for entry in audits {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&entry.created_at),
            escape_html(&entry.action),
            opt(entry.detail.as_deref()),
        );
    }
    body.push_str("</tbody></table>");

    if let Some(text) = &request.extracted_text {
        let _ = write!(
            body,
            "<h2>Extracted text</h2><pre>{}</pre>",
            escape_html(text)
        );
    }

    layout(app_name, &format!("Request {}", request.id), &body)
}

/// Projects with approved revisions folded in, plus recent requests.
pub fn dashboard_page(
    app_name: &str,
    projects: &[Project],
    revision_totals: &BTreeMap<ProjectCode, i64>,
    recent: &[RevisionRequest],
) -> String {
    let mut body = String::from(
        "<h2>Projects</h2><table><thead><tr><th>Code</th><th>Name</th><th>Ministry</th>\
         <th>Total budget</th><th>Spent</th><th>Approved revisions</th><th>Revised total</th>\
         </tr></thead><tbody>",
    );
    for p in projects {
        let approved = revision_totals.get(&p.project_code).copied().unwrap_or(0);
        let _ = write!(
            body,
            "<tr><td>{code}</td><td>{name}</td><td>{ministry}</td><td>{total}</td><td>{spent}</td>\
             <td>{approved}</td><td>{revised}</td></tr>",
            code = escape_html(p.project_code.as_str()),
            name = escape_html(&p.project_name),
            ministry = escape_html(&p.ministry),
            total = group_thousands(p.total_budget_try),
            spent = group_thousands(p.spent_try),
            approved = group_thousands(approved),
            revised = group_thousands(p.total_budget_try.saturating_add(approved)),
        );
    }
    body.push_str("</tbody></table><h2>Recent requests</h2>");
    body.push_str(&requests_table(recent));
    layout(app_name, "Dashboard", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdesk_types::RequestId;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#39;y&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn layout_escapes_title() {
        let page = layout("Desk", "<b>", "<p>body</p>");
        assert!(page.contains("<h1>&lt;b&gt;</h1>"));
        assert!(page.contains("<p>body</p>"));
    }

    #[test]
    fn dashboard_adds_approved_revisions() {
        let project = Project {
            project_code: ProjectCode::new("2024-123456").unwrap(),
            project_name: "Line".into(),
            ministry: "Transport".into(),
            total_budget_try: 10_000_000,
            spent_try: 1_000,
        };
        let mut totals = BTreeMap::new();
        totals.insert(project.project_code.clone(), 2_500_000);

        let page = dashboard_page("Desk", &[project], &totals, &[]);
        assert!(page.contains("<td>2.500.000</td><td>12.500.000</td>"));
        assert!(page.contains("No requests yet."));
    }

    fn open_request() -> RevisionRequest {
        RevisionRequest {
            id: RequestId::parse("abc123").unwrap(),
            filename: "memo.txt".into(),
            stored_path: "memo.txt".into(),
            status: RequestStatus::Pending,
            extracted_text: None,
            project_code: None,
            requested_amount_try: None,
            justification: None,
            extracted_json: None,
            risk_score: None,
            risk_notes: None,
            decision: None,
            decision_note: None,
            decided_at: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn open_request_offers_decision_form() {
        let section = decision_section(&open_request());
        assert!(section.contains("action=\"/requests/abc123/approve\""));
        assert!(section.contains("formaction=\"/requests/abc123/reject\""));
    }

    #[test]
    fn decided_request_shows_outcome_without_form() {
        let request = RevisionRequest {
            status: RequestStatus::Rejected,
            decision: Some(Decision::Rejected),
            decision_note: Some("<over budget>".into()),
            decided_at: Some("2024-01-02T10:00:00Z".into()),
            ..open_request()
        };
        let section = decision_section(&request);
        assert!(section.contains(&format!("<strong>{}</strong>", Decision::Rejected)));
        assert!(section.contains("&lt;over budget&gt;"));
        assert!(!section.contains("<form"));
    }
}

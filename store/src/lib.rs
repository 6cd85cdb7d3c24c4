//! Decision store - SQLite persistence for Revision Desk.
//!
//! Holds the seed project dataset, uploaded revision requests with their
//! extracted fields and risk, reviewer decisions, the per-request audit log and
//! the approved revision ledger used by the dashboard.
//!
//! `project_code` on requests and revisions is free text with no foreign key to
//! `projects`: a request may name a project the seed does not know.

#![allow(clippy::missing_errors_doc)]

mod seed;
mod sqlite_util;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use revdesk_types::{
    Decision, ParsedRequest, Project, ProjectCode, RequestId, RequestStatus, RiskAssessment,
    RiskBand,
};

pub use seed::{builtin_seed, load_seed};

use sqlite_util::{open_secure_db, utc_now};

/// Prefix stored in `risk_notes` when the processing pipeline fails.
pub const PROCESSING_ERROR_PREFIX: &str = "PROCESSING ERROR: ";

const REQUEST_ID_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("request {id} has already been {decision}")]
    AlreadyDecided { id: RequestId, decision: Decision },
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error("invalid project seed: {0}")]
    Seed(#[source] serde_json::Error),
    #[error("failed to read project seed {}: {source}", .path.display())]
    SeedRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

// ============================================================================
// Records
// ============================================================================

/// One uploaded revision request and everything known about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionRequest {
    pub id: RequestId,
    pub filename: String,
    #[serde(skip)]
    pub stored_path: PathBuf,
    pub status: RequestStatus,
    pub extracted_text: Option<String>,
    pub project_code: Option<ProjectCode>,
    pub requested_amount_try: Option<i64>,
    pub justification: Option<String>,
    pub extracted_json: Option<String>,
    pub risk_score: Option<u8>,
    pub risk_notes: Option<String>,
    pub decision: Option<Decision>,
    pub decision_note: Option<String>,
    pub decided_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RevisionRequest {
    #[must_use]
    pub fn risk_band(&self) -> Option<RiskBand> {
        self.risk_score.map(RiskBand::from_score)
    }

    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }

    /// True when the pipeline recorded a failure for this request.
    #[must_use]
    pub fn processing_failed(&self) -> bool {
        self.risk_notes
            .as_deref()
            .is_some_and(|notes| notes.starts_with(PROCESSING_ERROR_PREFIX))
    }
}

/// Append-only audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub request_id: RequestId,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: String,
}

/// Actions written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Created,
    Processed,
    ProcessFailed,
    Notified,
    NotifyFailed,
    Edited,
    Decision,
    PresentationGenerated,
    PresentationFailed,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Processed => "processed",
            Self::ProcessFailed => "process_failed",
            Self::Notified => "notified",
            Self::NotifyFailed => "notify_failed",
            Self::Edited => "edited",
            Self::Decision => "decision",
            Self::PresentationGenerated => "presentation_generated",
            Self::PresentationFailed => "presentation_failed",
        }
    }
}

/// Output of the processing pipeline for one request.
#[derive(Debug, Clone, Copy)]
pub struct Extraction<'a> {
    pub text: &'a str,
    pub parsed: &'a ParsedRequest,
    pub risk: &'a RiskAssessment,
}

/// Reviewer corrections to the extracted fields, with the risk recomputed from them.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub project_code: Option<ProjectCode>,
    pub requested_amount_try: Option<i64>,
    pub justification: Option<String>,
    pub risk: RiskAssessment,
}

/// Result of [`Store::record_decision`].
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    /// The request as stored after the decision.
    pub request: RevisionRequest,
    /// Whether an approved revision row was inserted.
    pub revision_recorded: bool,
}

// ============================================================================
// Store
// ============================================================================

const REQUEST_COLUMNS: &str = "id, filename, stored_path, status, extracted_text, project_code, \
     requested_amount_try, justification, extracted_json, risk_score, risk_notes, decision, \
     decision_note, decided_at, created_at, updated_at";

/// SQLite-backed store. Not `Sync`; callers share it behind a mutex.
pub struct Store {
    db: Connection,
}

impl Store {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS projects (
            project_code TEXT PRIMARY KEY,
            project_name TEXT NOT NULL,
            ministry TEXT NOT NULL,
            total_budget_try INTEGER NOT NULL,
            spent_try INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS revision_requests (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            stored_path TEXT NOT NULL,
            status TEXT NOT NULL,
            extracted_text TEXT,
            project_code TEXT,
            requested_amount_try INTEGER,
            justification TEXT,
            extracted_json TEXT,
            risk_score INTEGER,
            risk_notes TEXT,
            decision TEXT,
            decision_note TEXT,
            decided_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL,
            action TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (request_id) REFERENCES revision_requests(id) ON DELETE CASCADE
        );

        -- One row per approved request
        CREATE TABLE IF NOT EXISTS project_revisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL UNIQUE,
            project_code TEXT NOT NULL,
            amount_try INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (request_id) REFERENCES revision_requests(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_requests_created
        ON revision_requests(created_at);

        CREATE INDEX IF NOT EXISTS idx_audit_request
        ON audit_logs(request_id);
    ";

    /// Open or create the store at `path`, tightening file permissions on Unix.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = open_secure_db(path)?;
        info!(path = %path.display(), "Opened decision store");
        Self::initialize(db)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Connection::open_in_memory()?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )?;
        db.execute_batch(Self::SCHEMA)?;
        Ok(Self { db })
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    /// Insert `projects` when the project table is empty. Returns the number inserted.
    pub fn seed_projects_if_empty(&mut self, projects: &[Project]) -> Result<usize, StoreError> {
        let tx = self.db.transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        if existing > 0 {
            debug!(existing, "Project table already seeded");
            return Ok(0);
        }

        let now = utc_now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO projects (project_code, project_name, ministry, total_budget_try, \
                 spent_try, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            )?;
            for project in projects {
                stmt.execute(params![
                    project.project_code.as_str(),
                    project.project_name.trim(),
                    project.ministry.trim(),
                    project.total_budget_try,
                    project.spent_try,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        info!(count = projects.len(), "Seeded project table");
        Ok(projects.len())
    }

    pub fn get_project(&self, code: &ProjectCode) -> Result<Option<Project>, StoreError> {
        let raw = self
            .db
            .query_row(
                "SELECT project_code, project_name, ministry, total_budget_try, spent_try \
                 FROM projects WHERE project_code = ?1",
                [code.as_str()],
                read_project_row,
            )
            .optional()?;
        raw.map(RawProject::into_project).transpose()
    }

    /// All projects ordered by code.
    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT project_code, project_name, ministry, total_budget_try, spent_try \
             FROM projects ORDER BY project_code",
        )?;
        let rows = stmt.query_map([], read_project_row)?;
        rows.map(|row| -> Result<Project, StoreError> { row?.into_project() })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Create a `pending` request and its `created` audit entry.
    pub fn create_request(
        &mut self,
        filename: &str,
        stored_path: &Path,
    ) -> Result<RevisionRequest, StoreError> {
        let id = new_request_id()?;
        let now = utc_now();
        let tx = self.db.transaction()?;
        tx.execute(
            "INSERT INTO revision_requests (id, filename, stored_path, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.as_str(),
                filename,
                stored_path.to_string_lossy(),
                RequestStatus::Pending.as_str(),
                now,
            ],
        )?;
        insert_audit(
            &tx,
            &id,
            AuditAction::Created,
            Some(&format!("filename={filename}")),
        )?;
        let request = fetch_request(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        tx.commit()?;

        info!(request_id = %id, filename, "Created revision request");
        Ok(request)
    }

    pub fn get_request(&self, id: &RequestId) -> Result<Option<RevisionRequest>, StoreError> {
        fetch_request(&self.db, id)
    }

    /// Requests newest first, optionally capped at `limit`.
    pub fn list_requests(&self, limit: Option<usize>) -> Result<Vec<RevisionRequest>, StoreError> {
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = self.db.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM revision_requests \
             ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit], read_request_row)?;
        rows.map(|row| -> Result<RevisionRequest, StoreError> { row?.into_request() })
            .collect()
    }

    /// Store the pipeline's text, parsed fields and risk, with a `processed` audit entry.
    pub fn record_extraction(
        &mut self,
        id: &RequestId,
        extraction: &Extraction<'_>,
    ) -> Result<(), StoreError> {
        let Extraction { text, parsed, risk } = *extraction;
        let tx = self.db.transaction()?;
        let changed = tx.execute(
            "UPDATE revision_requests SET extracted_text = ?1, project_code = ?2, \
             requested_amount_try = ?3, justification = ?4, extracted_json = ?5, \
             risk_score = ?6, risk_notes = ?7, updated_at = ?8 WHERE id = ?9",
            params![
                text,
                parsed.project_code.as_ref().map(ProjectCode::as_str),
                parsed.requested_amount_try,
                parsed.justification,
                parsed.extracted_json(),
                risk.score(),
                risk.notes(),
                utc_now(),
                id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        insert_audit(
            &tx,
            id,
            AuditAction::Processed,
            Some(&format!("risk={}", risk.score())),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Record a pipeline failure in `risk_notes` and the audit log.
    pub fn record_processing_error(
        &mut self,
        id: &RequestId,
        message: &str,
    ) -> Result<(), StoreError> {
        let tx = self.db.transaction()?;
        let changed = tx.execute(
            "UPDATE revision_requests SET risk_notes = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                format!("{PROCESSING_ERROR_PREFIX}{message}"),
                utc_now(),
                id.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        insert_audit(&tx, id, AuditAction::ProcessFailed, Some(message))?;
        tx.commit()?;
        Ok(())
    }

    /// Apply a reviewer's manual edit, with an `edited` audit entry.
    pub fn update_fields(
        &mut self,
        id: &RequestId,
        update: &FieldUpdate,
    ) -> Result<RevisionRequest, StoreError> {
        let tx = self.db.transaction()?;
        let changed = tx.execute(
            "UPDATE revision_requests SET project_code = ?1, requested_amount_try = ?2, \
             justification = ?3, risk_score = ?4, risk_notes = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                update.project_code.as_ref().map(ProjectCode::as_str),
                update.requested_amount_try,
                update.justification,
                update.risk.score(),
                update.risk.notes(),
                utc_now(),
                id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        insert_audit(&tx, id, AuditAction::Edited, Some("manual edit"))?;
        let request = fetch_request(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        tx.commit()?;
        Ok(request)
    }

    /// Record a reviewer decision.
    ///
    /// A decision is final: deciding again fails with [`StoreError::AlreadyDecided`].
    /// Approval also inserts a `project_revisions` row when the request names a
    /// project; a missing amount counts as zero.
    pub fn record_decision(
        &mut self,
        id: &RequestId,
        decision: Decision,
        note: Option<&str>,
    ) -> Result<DecisionOutcome, StoreError> {
        let tx = self.db.transaction()?;
        let current = fetch_request(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if let Some(existing) = current.decision {
            return Err(StoreError::AlreadyDecided {
                id: id.clone(),
                decision: existing,
            });
        }

        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let now = utc_now();
        tx.execute(
            "UPDATE revision_requests SET status = ?1, decision = ?2, decision_note = ?3, \
             decided_at = ?4, updated_at = ?4 WHERE id = ?5",
            params![
                decision.status().as_str(),
                decision.as_str(),
                note,
                now,
                id.as_str()
            ],
        )?;
        insert_audit(&tx, id, AuditAction::Decision, Some(decision.as_str()))?;

        let mut revision_recorded = false;
        if decision == Decision::Approved
            && let Some(code) = &current.project_code
        {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO project_revisions (request_id, project_code, amount_try, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.as_str(),
                    code.as_str(),
                    current.requested_amount_try.unwrap_or(0),
                    now
                ],
            )?;
            revision_recorded = inserted > 0;
        }

        let request = fetch_request(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        tx.commit()?;

        info!(request_id = %id, %decision, revision_recorded, "Recorded decision");
        Ok(DecisionOutcome {
            request,
            revision_recorded,
        })
    }

    // ------------------------------------------------------------------------
    // Audit log and revisions
    // ------------------------------------------------------------------------

    pub fn add_audit(
        &mut self,
        id: &RequestId,
        action: AuditAction,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        insert_audit(&self.db, id, action, detail)
    }

    /// Audit entries for one request, newest first.
    pub fn list_audits(&self, id: &RequestId) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT id, request_id, action, detail, created_at FROM audit_logs \
             WHERE request_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([id.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        rows.map(|row| -> Result<AuditEntry, StoreError> {
            let (entry_id, request_id, action, detail, created_at) = row?;
            Ok(AuditEntry {
                id: entry_id,
                request_id: RequestId::parse(&request_id)
                    .map_err(|e| corrupt("audit_logs", e))?,
                action,
                detail,
                created_at,
            })
        })
        .collect()
    }

    /// Sum of approved revision amounts per project code.
    pub fn revision_totals(&self) -> Result<BTreeMap<ProjectCode, i64>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT project_code, COALESCE(SUM(amount_try), 0) FROM project_revisions \
             GROUP BY project_code",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        rows.map(|row| -> Result<(ProjectCode, i64), StoreError> {
            let (code, total) = row?;
            let code = ProjectCode::new(&code).map_err(|e| corrupt("project_revisions", e))?;
            Ok((code, total))
        })
        .collect()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn new_request_id() -> Result<RequestId, StoreError> {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    RequestId::parse(&simple[..REQUEST_ID_LEN]).map_err(|e| corrupt("revision_requests", e))
}

fn corrupt(table: &'static str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        table,
        detail: detail.to_string(),
    }
}

fn insert_audit(
    db: &Connection,
    id: &RequestId,
    action: AuditAction,
    detail: Option<&str>,
) -> Result<(), StoreError> {
    db.execute(
        "INSERT INTO audit_logs (request_id, action, detail, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.as_str(), action.as_str(), detail, utc_now()],
    )?;
    debug!(request_id = %id, action = action.as_str(), "Audit entry");
    Ok(())
}

fn fetch_request(db: &Connection, id: &RequestId) -> Result<Option<RevisionRequest>, StoreError> {
    let raw = db
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM revision_requests WHERE id = ?1"),
            [id.as_str()],
            read_request_row,
        )
        .optional()?;
    raw.map(RawRequest::into_request).transpose()
}

struct RawProject {
    project_code: String,
    project_name: String,
    ministry: String,
    total_budget_try: i64,
    spent_try: i64,
}

fn read_project_row(row: &Row<'_>) -> rusqlite::Result<RawProject> {
    Ok(RawProject {
        project_code: row.get(0)?,
        project_name: row.get(1)?,
        ministry: row.get(2)?,
        total_budget_try: row.get(3)?,
        spent_try: row.get(4)?,
    })
}

impl RawProject {
    fn into_project(self) -> Result<Project, StoreError> {
        Ok(Project {
            project_code: ProjectCode::new(&self.project_code)
                .map_err(|e| corrupt("projects", e))?,
            project_name: self.project_name,
            ministry: self.ministry,
            total_budget_try: self.total_budget_try,
            spent_try: self.spent_try,
        })
    }
}

struct RawRequest {
    id: String,
    filename: String,
    stored_path: String,
    status: String,
    extracted_text: Option<String>,
    project_code: Option<String>,
    requested_amount_try: Option<i64>,
    justification: Option<String>,
    extracted_json: Option<String>,
    risk_score: Option<i64>,
    risk_notes: Option<String>,
    decision: Option<String>,
    decision_note: Option<String>,
    decided_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_request_row(row: &Row<'_>) -> rusqlite::Result<RawRequest> {
    Ok(RawRequest {
        id: row.get(0)?,
        filename: row.get(1)?,
        stored_path: row.get(2)?,
        status: row.get(3)?,
        extracted_text: row.get(4)?,
        project_code: row.get(5)?,
        requested_amount_try: row.get(6)?,
        justification: row.get(7)?,
        extracted_json: row.get(8)?,
        risk_score: row.get(9)?,
        risk_notes: row.get(10)?,
        decision: row.get(11)?,
        decision_note: row.get(12)?,
        decided_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl RawRequest {
    fn into_request(self) -> Result<RevisionRequest, StoreError> {
        const TABLE: &str = "revision_requests";
        let risk_score = self
            .risk_score
            .map(|score| u8::try_from(score.clamp(0, i64::from(RiskAssessment::MAX_SCORE))))
            .transpose()
            .map_err(|e| corrupt(TABLE, e))?;
        Ok(RevisionRequest {
            id: RequestId::parse(&self.id).map_err(|e| corrupt(TABLE, e))?,
            filename: self.filename,
            stored_path: PathBuf::from(self.stored_path),
            status: RequestStatus::parse(&self.status).map_err(|e| corrupt(TABLE, e))?,
            extracted_text: self.extracted_text,
            project_code: self
                .project_code
                .as_deref()
                .map(ProjectCode::new)
                .transpose()
                .map_err(|e| corrupt(TABLE, e))?,
            requested_amount_try: self.requested_amount_try,
            justification: self.justification,
            extracted_json: self.extracted_json,
            risk_score,
            risk_notes: self.risk_notes,
            decision: self
                .decision
                .as_deref()
                .map(Decision::parse)
                .transpose()
                .map_err(|e| corrupt(TABLE, e))?,
            decision_note: self.decision_note,
            decided_at: self.decided_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

//! Decision briefs and knowledge-base entries.
//!
//! Approved requests get a brief in `<output_dir>/presentations/`: a Markdown
//! file, or a three-slide deck when the `pptx` feature is enabled. Every
//! decision gets a knowledge-base entry in `<output_dir>/knowledge_base/`.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use revdesk_types::{Decision, RequestId, display_or_dash, group_thousands};
use revdesk_utils::atomic_write;

#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("failed to write {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[cfg(feature = "pptx")]
    #[error("failed to build PPTX archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Everything a brief or knowledge-base entry shows about one request.
#[derive(Debug, Clone, Copy)]
pub struct Brief<'a> {
    pub request_id: &'a RequestId,
    pub project_code: Option<&'a str>,
    pub project_name: Option<&'a str>,
    pub ministry: Option<&'a str>,
    pub requested_amount_try: Option<i64>,
    pub risk_score: Option<u8>,
    pub decision: Option<Decision>,
    pub justification: Option<&'a str>,
}

impl Brief<'_> {
    pub(crate) fn amount_label(&self) -> String {
        display_or_dash(self.requested_amount_try.map(group_thousands))
    }

    pub(crate) fn summary_lines(&self) -> [String; 6] {
        [
            format!("Project code: {}", display_or_dash(self.project_code)),
            format!("Project name: {}", display_or_dash(self.project_name)),
            format!("Ministry: {}", display_or_dash(self.ministry)),
            format!("Requested amount (TRY): {}", self.amount_label()),
            format!("Risk score: {}", display_or_dash(self.risk_score)),
            format!("Decision: {}", display_or_dash(self.decision)),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationKind {
    Markdown,
    Pptx,
}

impl PresentationKind {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Pptx => "pptx",
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub path: PathBuf,
    pub kind: PresentationKind,
}

impl Presentation {
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn brief_path(dir: &Path, request_id: &RequestId, kind: PresentationKind) -> PathBuf {
    dir.join(format!("{request_id}_brief.{}", kind.extension()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PresentationError> {
    atomic_write(path, bytes).map_err(|source| PresentationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Briefs
// ============================================================================

#[must_use]
pub fn render_markdown_brief(brief: &Brief<'_>) -> String {
    let mut lines = vec![
        format!("# Revision Request Brief: {}", brief.request_id),
        String::new(),
    ];
    lines.extend(brief.summary_lines().into_iter().map(|line| format!("- {line}")));
    lines.push(String::new());
    lines.push("## Justification".to_string());
    lines.push(display_or_dash(brief.justification));
    lines.join("\n") + "\n"
}

#[cfg(not(feature = "pptx"))]
fn render_brief(brief: &Brief<'_>) -> Result<(PresentationKind, Vec<u8>), PresentationError> {
    Ok((
        PresentationKind::Markdown,
        render_markdown_brief(brief).into_bytes(),
    ))
}

#[cfg(feature = "pptx")]
fn render_brief(brief: &Brief<'_>) -> Result<(PresentationKind, Vec<u8>), PresentationError> {
    Ok((PresentationKind::Pptx, crate::pptx::render_deck(brief)?))
}

/// Write the brief for `brief.request_id` into `dir`, replacing any earlier one.
pub fn generate_presentation(
    dir: &Path,
    brief: &Brief<'_>,
) -> Result<Presentation, PresentationError> {
    let (kind, bytes) = render_brief(brief)?;
    let path = brief_path(dir, brief.request_id, kind);
    write_file(&path, &bytes)?;

    tracing::info!(
        request_id = %brief.request_id,
        path = %path.display(),
        "Generated presentation"
    );
    Ok(Presentation { path, kind })
}

/// Locate a generated brief, preferring the deck over Markdown.
#[must_use]
pub fn find_presentation(dir: &Path, request_id: &RequestId) -> Option<Presentation> {
    [PresentationKind::Pptx, PresentationKind::Markdown]
        .into_iter()
        .map(|kind| Presentation {
            path: brief_path(dir, request_id, kind),
            kind,
        })
        .find(|presentation| presentation.path.is_file())
}

// ============================================================================
// Knowledge base
// ============================================================================

#[must_use]
pub fn render_knowledge_base_entry(
    brief: &Brief<'_>,
    decision: Decision,
    note: Option<&str>,
) -> String {
    let lines = [
        format!("# Revision Request Decision: {}", brief.request_id),
        String::new(),
        format!("- Decision: **{}**", decision.as_str().to_uppercase()),
        format!("- Project code: {}", display_or_dash(brief.project_code)),
        format!("- Requested amount (TRY): {}", brief.amount_label()),
        format!("- Risk: {}", display_or_dash(brief.risk_score)),
        String::new(),
        "## Note".to_string(),
        display_or_dash(note.map(str::trim).filter(|n| !n.is_empty())),
        String::new(),
        "## Justification (extracted)".to_string(),
        display_or_dash(brief.justification),
    ];
    lines.join("\n") + "\n"
}

/// Write `<dir>/<id>.md` for a decided request.
pub fn write_knowledge_base_entry(
    dir: &Path,
    brief: &Brief<'_>,
    decision: Decision,
    note: Option<&str>,
) -> Result<PathBuf, PresentationError> {
    let path = dir.join(format!("{}.md", brief.request_id));
    write_file(
        &path,
        render_knowledge_base_entry(brief, decision, note).as_bytes(),
    )?;
    tracing::debug!(request_id = %brief.request_id, path = %path.display(), "Wrote knowledge-base entry");
    Ok(path)
}

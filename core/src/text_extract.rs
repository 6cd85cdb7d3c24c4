//! Plain text from uploaded request documents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use lopdf::content::Content;
use lopdf::{Document, Encoding, Object, ObjectId};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read PDF {}: {source}", .path.display())]
    Pdf {
        path: PathBuf,
        source: lopdf::Error,
    },
}

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f-\x{9f}]").expect("valid control character regex")
});
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid horizontal space regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Normalize extracted text: drop control characters, turn NBSP into a space,
/// collapse runs of spaces/tabs, collapse 3+ newlines to 2, and trim.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let text = CONTROL_CHARS.replace_all(text, "");
    let text = text.replace('\u{00A0}', " ");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Expand typographic ligatures that PDF text layers commonly emit.
fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{FB05}', '\u{FB06}'], "st")
}

/// Text of a document: every page of a `.pdf`, otherwise the file as lossy UTF-8.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return extract_pdf_text(path);
    }

    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize_text(&String::from_utf8_lossy(&bytes)))
}

fn extract_pdf_text(path: &Path) -> Result<String, ExtractError> {
    let pdf_err = |source| ExtractError::Pdf {
        path: path.to_path_buf(),
        source,
    };
    let doc = Document::load(path).map_err(pdf_err)?;

    let mut pages = Vec::new();
    for page_id in doc.get_pages().into_values() {
        pages.push(page_text(&doc, page_id).map_err(pdf_err)?);
    }
    tracing::debug!(path = %path.display(), pages = pages.len(), "Extracted PDF text");

    Ok(normalize_text(&expand_ligatures(&pages.join("\n"))))
}

/// Text shown on one page, with a line break wherever the text cursor moves
/// to a new line (new text object, `T*`, `'`, `"`, vertical `Td`/`TD`, or a
/// `Tm` with a different baseline).
fn page_text(doc: &Document, page_id: ObjectId) -> lopdf::Result<String> {
    let encodings: BTreeMap<Vec<u8>, Encoding> = doc
        .get_page_fonts(page_id)?
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                tracing::debug!("Skipping font without usable encoding: {e}");
                None
            }
        })
        .collect();
    let content = Content::decode(&doc.get_page_content(page_id)?)?;

    let mut text = String::new();
    let mut encoding = None;
    let mut baseline: Option<f32> = None;
    for op in &content.operations {
        match op.operator.as_str() {
            "Tf" => {
                encoding = op
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name));
            }
            "BT" => {
                baseline = None;
                break_line(&mut text);
            }
            "ET" | "T*" => break_line(&mut text),
            "Td" | "TD" => {
                let new_line =
                    operand_float(&op.operands, 1).is_some_and(|ty| ty.abs() > f32::EPSILON);
                if new_line {
                    break_line(&mut text);
                }
            }
            "Tm" => {
                let y = operand_float(&op.operands, 5);
                if let (Some(previous), Some(y)) = (baseline, y)
                    && (previous - y).abs() > f32::EPSILON
                {
                    break_line(&mut text);
                }
                baseline = y;
            }
            "Tj" | "TJ" => push_shown_text(&mut text, encoding, &op.operands),
            "'" | "\"" => {
                break_line(&mut text);
                if let Some(shown) = op.operands.last() {
                    push_shown_text(&mut text, encoding, std::slice::from_ref(shown));
                }
            }
            _ => {}
        }
    }
    Ok(text)
}

fn break_line(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn operand_float(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(|value| value.as_float().ok())
}

/// Append string operands. Inside a `TJ` array a kerning adjustment wider than
/// a tenth of an em counts as a word gap.
fn push_shown_text(text: &mut String, encoding: Option<&Encoding>, operands: &[Object]) {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => text.push_str(&decode_shown(encoding, bytes)),
            Object::Array(items) => push_shown_text(text, encoding, items),
            Object::Integer(_) | Object::Real(_) => {
                let gap = operand.as_float().is_ok_and(|adjust| adjust < -100.0);
                if gap && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Decode with the font's encoding, falling back to Latin-1 when the font is
/// unknown or its encoding rejects the bytes.
fn decode_shown(encoding: Option<&Encoding>, bytes: &[u8]) -> String {
    encoding
        .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
        .unwrap_or_else(|| bytes.iter().map(|&byte| char::from(byte)).collect())
}

//! On-disk names for uploaded files.

/// Name used when the client sends no usable file name.
pub const UPLOAD_FALLBACK_NAME: &str = "upload.bin";

const MAX_NAME_CHARS: usize = 120;

/// Turn a client-supplied file name into a single safe path component.
///
/// Path separators become `_`, control characters are dropped, leading dots are
/// stripped (no hidden files, no `..`) and the result is capped in length while
/// keeping the extension.
#[must_use]
pub fn sanitize_upload_name(raw: Option<&str>) -> String {
    let raw = raw.unwrap_or_default().trim();
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();

    if cleaned.is_empty() {
        return UPLOAD_FALLBACK_NAME.to_string();
    }
    if cleaned.chars().count() <= MAX_NAME_CHARS {
        return cleaned.to_string();
    }

    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 8 => (stem, Some(ext)),
        _ => (cleaned, None),
    };
    let budget = MAX_NAME_CHARS - ext.map_or(0, |e| e.chars().count() + 1);
    let stem: String = stem.chars().take(budget).collect();
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

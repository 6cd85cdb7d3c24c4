//! Field extraction from request text.
//!
//! Rule-based extraction recognizes Turkish and English labels:
//!
//! | Field | Labels |
//! |-------|--------|
//! | project code | `Proje Kodu/No/Numarası`, `Project Code/No/Number` |
//! | amount | `Talep Tutarı`, `Requested Amount`, or a number next to `₺`/`TL`/`TRY` |
//! | justification | a `Gerekçe`/`Açıklama`/`Justification` heading line |
//!
//! When an [`OpenAIExtractor`] is configured it is tried first and the rules are
//! the fallback, with the provider error kept in `extracted.openai_error`.

use std::sync::OnceLock;

use regex::Regex;

use revdesk_providers::OpenAIExtractor;
use revdesk_types::{ExtractionMethod, ParsedRequest, ProjectCode, truncate_chars};

use crate::errors::describe_provider_error;

/// Lines collected after a justification heading.
const JUSTIFICATION_MAX_LINES: usize = 24;
/// Characters used as the justification when no heading is found.
const JUSTIFICATION_FALLBACK_CHARS: usize = 800;

struct FieldPatterns {
    labelled_project_code: Regex,
    project_code: Regex,
    labelled_amount: Regex,
    currency_before: Regex,
    currency_after: Regex,
    grouped_number: Regex,
    dotted_thousands: Regex,
    justification_heading: Regex,
    caps_heading: Regex,
}

impl FieldPatterns {
    fn new() -> Self {
        Self {
            labelled_project_code: Regex::new(
                r"(?im)\b(?:proje\s*(?:kodu|no|numarası|numarasi)|project\s*(?:code|no|number))\s*[:\-]?\s*(20\d{2})\s*[-/]\s*(\d{3,8})\b",
            )
            .expect("valid labelled project code regex"),
            project_code: Regex::new(r"\b(20\d{2})\s*[-/]\s*(\d{3,8})\b")
                .expect("valid project code regex"),
            labelled_amount: Regex::new(
                r"(?im)\b(?:talep\s*tutar[ıi]|requested\s*amount)\s*[:\-]?\s*([0-9][0-9., \t]{0,20})(?:\s*(?:₺|tl|try))?\b",
            )
            .expect("valid labelled amount regex"),
            currency_before: Regex::new(r"(?i)(?:₺|\b(?:tl|try)\b)\s*([0-9][0-9., \t]{0,20})")
                .expect("valid currency prefix regex"),
            currency_after: Regex::new(r"(?i)([0-9][0-9., \t]{0,20})\s*(?:₺|(?:tl|try)\b)")
                .expect("valid currency suffix regex"),
            grouped_number: Regex::new(r"\b[0-9]{1,3}(?:\.[0-9]{3})+(?:,[0-9]+)?\b")
                .expect("valid grouped number regex"),
            dotted_thousands: Regex::new(r"^\d{1,3}(?:\.\d{3})+$")
                .expect("valid dotted thousands regex"),
            justification_heading: Regex::new(
                r"(?i)^(?:gerek[çc]e|a[çc][ıiİ]klama|justification)\s*[:\-]?\s*$",
            )
            .expect("valid justification heading regex"),
            caps_heading: Regex::new(r"^[A-ZÇĞİÖŞÜ0-9][A-ZÇĞİÖŞÜ0-9 \t]{3,}$")
                .expect("valid caps heading regex"),
        }
    }
}

fn patterns() -> &'static FieldPatterns {
    static PATTERNS: OnceLock<FieldPatterns> = OnceLock::new();
    PATTERNS.get_or_init(FieldPatterns::new)
}

// ============================================================================
// Amounts
// ============================================================================

/// Parse a lira amount written with Turkish or plain separators.
///
/// - `1.500.000,50` - `.` groups thousands, `,` is the decimal mark
/// - `1.500.000` - dots alone in groups of three are thousands separators
/// - `1500000,5` - a lone `,` is the decimal mark
/// - `1500.5` - a lone `.` that is not a thousands group is the decimal mark
///
/// The result is rounded to the nearest lira. Returns `None` when nothing numeric remains.
#[must_use]
pub fn parse_try_amount(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ',']);
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');
    let normalized = if has_dot && has_comma {
        cleaned.replace('.', "").replace(',', ".")
    } else if has_dot && patterns().dotted_thousands.is_match(cleaned) {
        cleaned.replace('.', "")
    } else if has_comma {
        cleaned.replace(',', ".")
    } else {
        cleaned.to_string()
    };

    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() || value < 0.0 || value > i64::MAX as f64 {
        return None;
    }
    Some(value.round() as i64)
}

fn find_amount(text: &str) -> Option<i64> {
    let p = patterns();
    let positive = |raw: &str| parse_try_amount(raw).filter(|amount| *amount > 0);

    if let Some(amount) = p
        .labelled_amount
        .captures(text)
        .and_then(|caps| positive(&caps[1]))
    {
        return Some(amount);
    }

    let currency_adjacent = p
        .currency_before
        .captures_iter(text)
        .chain(p.currency_after.captures_iter(text))
        .find_map(|caps| positive(&caps[1]));
    if currency_adjacent.is_some() {
        return currency_adjacent;
    }

    p.grouped_number
        .find_iter(text)
        .find_map(|m| positive(m.as_str()))
}

// ============================================================================
// Project code
// ============================================================================

fn find_project_code(text: &str) -> Option<ProjectCode> {
    let p = patterns();
    if let Some(caps) = p.labelled_project_code.captures(text) {
        return Some(ProjectCode::from_parts(&caps[1], &caps[2]));
    }

    // Unlabelled: skip year ranges such as `2024-2028`.
    p.project_code.captures_iter(text).find_map(|caps| {
        let serial = &caps[2];
        let is_year = serial.len() == 4
            && serial
                .parse::<u16>()
                .is_ok_and(|year| (1900..=2100).contains(&year));
        (!is_year).then(|| ProjectCode::from_parts(&caps[1], serial))
    })
}

// ============================================================================
// Justification
// ============================================================================

fn find_justification(text: &str) -> Option<String> {
    let p = patterns();
    let lines: Vec<&str> = text.lines().collect();

    if let Some(heading) = lines
        .iter()
        .position(|line| p.justification_heading.is_match(line.trim()))
    {
        let body: Vec<&str> = lines[heading + 1..]
            .iter()
            .take(JUSTIFICATION_MAX_LINES)
            .take_while(|line| !is_caps_heading(line.trim()))
            .copied()
            .collect();
        let body = body.join("\n");
        let body = body.trim();
        return (!body.is_empty()).then(|| body.to_string());
    }

    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| truncate_chars(trimmed, JUSTIFICATION_FALLBACK_CHARS))
}

/// An all-caps line of 4+ characters with at least one letter, e.g. `BÜTÇE ETKİSİ`.
fn is_caps_heading(line: &str) -> bool {
    patterns().caps_heading.is_match(line) && line.chars().any(char::is_alphabetic)
}

// ============================================================================
// Entry points
// ============================================================================

/// Extract fields with regex rules only.
#[must_use]
pub fn parse_with_rules(text: &str) -> ParsedRequest {
    ParsedRequest::new(
        ExtractionMethod::Rules,
        find_project_code(text),
        find_amount(text),
        find_justification(text),
    )
}

/// Extract fields with the configured extractor, falling back to the rules.
pub async fn parse_revision_request(
    text: &str,
    extractor: Option<&OpenAIExtractor>,
    client: &reqwest::Client,
) -> ParsedRequest {
    let Some(extractor) = extractor else {
        return parse_with_rules(text);
    };

    match extractor.extract(client, text).await {
        Ok(parsed) => parsed,
        Err(e) => {
            let message = describe_provider_error(&e);
            tracing::warn!(error = %message, "OpenAI extraction failed; using rules");
            let mut parsed = parse_with_rules(text);
            parsed
                .extracted
                .insert("openai_error".to_string(), message.into());
            parsed
        }
    }
}

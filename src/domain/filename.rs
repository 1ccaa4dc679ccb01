//! Output filename derivation for rendered documents.

use time::OffsetDateTime;

/// Token used when sanitisation leaves nothing behind.
pub const FALLBACK_TOKEN: &str = "sheet";
/// Label used when a batch offers no name, code, or template.
pub const DEFAULT_ATTENDANCE_LABEL: &str = "attendance";
const DEFAULT_CONCAT_LABEL: &str = "combined";
const DOCUMENT_EXTENSION: &str = "pdf";

/// Keep ASCII letters, digits, `-` and `_`; map spaces to `-`; drop the rest.
pub fn sanitize_filename(input: &str) -> String {
    let clean: String = input
        .chars()
        .filter_map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => Some(ch),
            ' ' => Some('-'),
            _ => None,
        })
        .collect();

    if clean.is_empty() {
        FALLBACK_TOKEN.to_string()
    } else {
        clean
    }
}

/// Inputs considered when naming an attendance document, in precedence order.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceNameParts<'a> {
    pub requested: Option<&'a str>,
    pub primary_code: Option<&'a str>,
    pub template: Option<&'a str>,
}

/// `attendance-<base>.pdf`, where base is the first non-blank of the
/// requested name, the primary roster code, and the template name.
pub fn attendance_filename(parts: AttendanceNameParts<'_>) -> String {
    let base = [parts.requested, parts.primary_code, parts.template]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(DEFAULT_ATTENDANCE_LABEL);

    format!(
        "attendance-{}.{DOCUMENT_EXTENSION}",
        sanitize_filename(base)
    )
}

/// Name for an ad-hoc concatenation of uploaded documents.
pub fn concat_filename(requested: Option<&str>) -> String {
    let base = match requested.map(str::trim) {
        Some(name) if !name.is_empty() => sanitize_filename(name),
        _ => DEFAULT_CONCAT_LABEL.to_string(),
    };
    format!("{base}.{DOCUMENT_EXTENSION}")
}

/// `MasterList_<month>_<day>_<year>.pdf` for the given instant.
pub fn masterlist_filename(now: OffsetDateTime) -> String {
    format!(
        "MasterList_{}_{}_{}.{DOCUMENT_EXTENSION}",
        u8::from(now.month()),
        now.day(),
        now.year()
    )
}

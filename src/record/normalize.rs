//! Text normalization shared by the extractors and the validator

/// Collapses all whitespace runs into single spaces and trims the result
///
/// Literal `&nbsp;` entities that survived HTML decoding are treated as
/// whitespace. Returns `None` when nothing but whitespace remains.
///
/// # Examples
///
/// ```
/// use bafa_harvest::record::normalize_text;
///
/// assert_eq!(normalize_text("  Max \n  Mustermann "), Some("Max Mustermann".to_string()));
/// assert_eq!(normalize_text(" \t "), None);
/// ```
pub fn normalize_text(raw: &str) -> Option<String> {
    let cleaned = raw
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Normalizes an optional field, coercing empty text to `None`
pub fn normalize_field(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_text)
}

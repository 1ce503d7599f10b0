//! HTML helpers shared by the listing and detail extractors

use crate::record::normalize_text;
use crate::ExtractError;
use scraper::{ElementRef, Selector};
use url::Url;

/// Compiles a CSS selector
pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector(format!("{}: {}", css, e)))
}

/// Collects the normalized text content of an element
pub(crate) fn element_text(element: ElementRef<'_>) -> Option<String> {
    normalize_text(&element.text().collect::<String>())
}

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None for empty hrefs, fragment-only links, `javascript:` and
/// `mailto:` targets, and anything that does not resolve to HTTP(S).
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Returns the first value of a query parameter
pub(crate) fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Splits a leading five-digit postal code off a location string
///
/// Returns `(postal_code, rest)`; the postal code is None when the text does
/// not start with exactly five digits.
pub(crate) fn split_postal_code(text: &str) -> (Option<&str>, &str) {
    let bytes = text.as_bytes();
    let leading_digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();

    if leading_digits == 5 {
        (Some(&text[..5]), text[5..].trim())
    } else {
        (None, text.trim())
    }
}

//! Detail page extraction
//!
//! The contact block of an advisor lives in `div.bereich`. Email addresses
//! are never printed; the portal renders them as an image served from an
//! `m2i` endpoint, so only their presence and the image number are known.

use crate::crawler::parser::{selector, split_postal_code};
use crate::record::{normalize_text, DetailFields};
use crate::ExtractError;
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

const CONTACT_BLOCK: &str = "div.bereich";
const EMAIL_IMAGE: &str = r#"div.bereich img[src*="m2i"]"#;
const WEBSITE_LINK: &str = r#"div.bereich a[href*="http"]"#;
const PORTAL_HOST: &str = "bafa.bund.de";

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bTel(?:efon)?\.?\s*:\s*(\+?[0-9][0-9 /()\-.]*[0-9])")
            .expect("phone pattern is valid")
    })
}

fn fax_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bFax\.?\s*:\s*(\+?[0-9][0-9 /()\-.]*[0-9])")
            .expect("fax pattern is valid")
    })
}

fn image_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"nr=(\d+)").expect("image number pattern is valid"))
}

/// Parses an advisor detail page
///
/// Absent optional fields come back as `None`. A page without a contact
/// block, or with an empty one, is not an advisor page at all and yields
/// `ExtractError::StructureMismatch`.
pub fn parse_detail(html: &str) -> Result<DetailFields, ExtractError> {
    let document = Html::parse_document(html);

    let block_selector = selector(CONTACT_BLOCK)?;
    let blocks: Vec<_> = document.select(&block_selector).collect();
    if blocks.is_empty() {
        return Err(ExtractError::StructureMismatch(format!(
            "no {} contact block",
            CONTACT_BLOCK
        )));
    }

    let texts: Vec<String> = blocks
        .iter()
        .flat_map(|block| block.text())
        .filter_map(normalize_text)
        .collect();
    if texts.is_empty() {
        return Err(ExtractError::StructureMismatch(format!(
            "{} contact block is empty",
            CONTACT_BLOCK
        )));
    }

    let mut fields = DetailFields::default();

    // Address: the first line opening with a postal code, street right above
    if let Some(index) = texts
        .iter()
        .position(|text| split_postal_code(text).0.is_some())
    {
        let (postal_code, city) = split_postal_code(&texts[index]);
        fields.postal_code = postal_code.map(String::from);
        fields.city = normalize_text(city);
        if index > 0 {
            fields.street = Some(texts[index - 1].clone());
        }
    }

    let content = texts.join(" ");
    fields.phone = capture(phone_pattern(), &content);
    fields.fax = capture(fax_pattern(), &content);

    if let Some(image) = document.select(&selector(EMAIL_IMAGE)?).next() {
        fields.email_present = true;
        fields.email_image_id = image
            .value()
            .attr("src")
            .and_then(|src| capture(image_number_pattern(), src));
    }

    fields.website = document
        .select(&selector(WEBSITE_LINK)?)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.contains(PORTAL_HOST))
        .map(String::from);

    Ok(fields)
}

fn capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .and_then(|m| normalize_text(m.as_str()))
}

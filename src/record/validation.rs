//! Field validation: the single boundary between raw and accepted data

use crate::record::normalize::normalize_field;
use crate::record::{AdvisorRecord, RawCandidate};
use std::fmt;

/// Number of digits in a German postal code
pub const POSTAL_CODE_DIGITS: usize = 5;

/// Why a candidate was not accepted
///
/// Rejections are an expected outcome of a run, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Name or detail URL is missing
    MissingRequiredField(&'static str),

    /// Postal code present but not five digits
    InvalidPostalCode(String),

    /// The detail URL was already accepted earlier in the run
    DuplicateDetailUrl(String),
}

impl Rejection {
    /// Stable reason text used for stats tallies
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingRequiredField(_) => "missing required field",
            Self::InvalidPostalCode(_) => "invalid postal code",
            Self::DuplicateDetailUrl(_) => "duplicate detail URL",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequiredField(field) => write!(f, "{} ({})", self.reason(), field),
            Self::InvalidPostalCode(code) => write!(f, "{} ({:?})", self.reason(), code),
            Self::DuplicateDetailUrl(url) => write!(f, "{} ({})", self.reason(), url),
        }
    }
}

/// Returns true if `code` is exactly five ASCII digits
pub fn is_valid_postal_code(code: &str) -> bool {
    code.len() == POSTAL_CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// Validates and normalizes a merged candidate
///
/// # Rules
///
/// | Field | Rule |
/// |-------|------|
/// | all | trim, collapse internal whitespace, empty becomes `None` |
/// | name, detail URL | required |
/// | postal code | five digits when present |
/// | website | `https://` prefixed when the scheme is missing |
///
/// The function is pure: validating the candidate of an accepted record
/// yields the same record again.
pub fn validate(candidate: &RawCandidate) -> Result<AdvisorRecord, Rejection> {
    let name = normalize_field(candidate.name.as_deref())
        .ok_or(Rejection::MissingRequiredField("name"))?;
    let detail_url = normalize_field(candidate.detail_url.as_deref())
        .ok_or(Rejection::MissingRequiredField("detail URL"))?;

    let postal_code = normalize_field(candidate.postal_code.as_deref());
    if let Some(code) = &postal_code {
        if !is_valid_postal_code(code) {
            return Err(Rejection::InvalidPostalCode(code.clone()));
        }
    }

    let website = normalize_field(candidate.website.as_deref()).map(|site| {
        if site.starts_with("http://") || site.starts_with("https://") {
            site
        } else {
            format!("https://{}", site)
        }
    });

    Ok(AdvisorRecord {
        name,
        company: normalize_field(candidate.company.as_deref()),
        street: normalize_field(candidate.street.as_deref()),
        postal_code,
        city: normalize_field(candidate.city.as_deref()),
        phone: normalize_field(candidate.phone.as_deref()),
        fax: normalize_field(candidate.fax.as_deref()),
        email_present: candidate.email_present,
        email_image_id: normalize_field(candidate.email_image_id.as_deref()),
        website,
        bfee_id: normalize_field(candidate.bfee_id.as_deref()),
        detail_url,
    })
}

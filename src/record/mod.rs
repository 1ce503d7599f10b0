//! Advisor records and the validation boundary
//!
//! # Components
//!
//! - `ListingSummary` / `DetailFields`: raw output of the two extractors
//! - `RawCandidate`: both merged, still unvalidated
//! - `validate`: turns a candidate into an `AdvisorRecord` or a `Rejection`
//! - `AdvisorRecord`: the accepted, immutable unit of output

mod candidate;
mod normalize;
mod validation;

pub use candidate::{DetailFields, ListingSummary, RawCandidate};
pub use normalize::{normalize_field, normalize_text};
pub use validation::{is_valid_postal_code, validate, Rejection, POSTAL_CODE_DIGITS};

use serde::{Deserialize, Serialize};

/// Export column headers, in field order
pub const COLUMN_HEADERS: [&str; 12] = [
    "Beratername",
    "Beraterfirma",
    "Strasse",
    "PLZ",
    "Ort",
    "Telefon",
    "Fax",
    "Email_Vorhanden",
    "Email_Image_ID",
    "Website",
    "BFEE_ID",
    "Detail_URL",
];

/// One accepted energy advisor
///
/// Only [`validate`] constructs these during a run. The detail URL is the
/// record's natural key and is unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorRecord {
    #[serde(rename = "Beratername")]
    pub name: String,

    #[serde(rename = "Beraterfirma")]
    pub company: Option<String>,

    #[serde(rename = "Strasse")]
    pub street: Option<String>,

    #[serde(rename = "PLZ")]
    pub postal_code: Option<String>,

    #[serde(rename = "Ort")]
    pub city: Option<String>,

    #[serde(rename = "Telefon")]
    pub phone: Option<String>,

    #[serde(rename = "Fax")]
    pub fax: Option<String>,

    #[serde(rename = "Email_Vorhanden", with = "yes_no")]
    pub email_present: bool,

    #[serde(rename = "Email_Image_ID")]
    pub email_image_id: Option<String>,

    #[serde(rename = "Website")]
    pub website: Option<String>,

    #[serde(rename = "BFEE_ID")]
    pub bfee_id: Option<String>,

    #[serde(rename = "Detail_URL")]
    pub detail_url: String,
}

impl AdvisorRecord {
    /// Cell values in [`COLUMN_HEADERS`] order, `None` for empty cells
    pub fn cells(&self) -> [Option<&str>; 12] {
        [
            Some(self.name.as_str()),
            self.company.as_deref(),
            self.street.as_deref(),
            self.postal_code.as_deref(),
            self.city.as_deref(),
            self.phone.as_deref(),
            self.fax.as_deref(),
            Some(if self.email_present { yes_no::YES } else { yes_no::NO }),
            self.email_image_id.as_deref(),
            self.website.as_deref(),
            self.bfee_id.as_deref(),
            Some(self.detail_url.as_str()),
        ]
    }
}

/// The email flag travels as the portal's own `Ja` / `Nein` tokens
mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    pub const YES: &str = "Ja";
    pub const NO: &str = "Nein";

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { YES } else { NO })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(token.trim() == YES)
    }
}

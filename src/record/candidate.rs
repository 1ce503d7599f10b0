//! Intermediate structures produced by the extractors
//!
//! Nothing here is validated. Listing and detail data are merged into a
//! [`RawCandidate`], which only becomes an [`AdvisorRecord`] by passing
//! through [`crate::record::validate`].

use crate::record::AdvisorRecord;

/// Fields visible on one row of a listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub name: Option<String>,
    pub company: Option<String>,
    /// Postal code split off the location cell
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// Absolute detail-page URL
    pub detail_url: Option<String>,
    pub bfee_id: Option<String>,
}

/// Fields extracted from one advisor detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub website: Option<String>,
    pub email_image_id: Option<String>,
    /// True iff the email obfuscation image was found
    pub email_present: bool,
}

/// A merged, not yet validated advisor record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCandidate {
    pub name: Option<String>,
    pub company: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub email_present: bool,
    pub email_image_id: Option<String>,
    pub website: Option<String>,
    pub bfee_id: Option<String>,
    pub detail_url: Option<String>,
}

impl RawCandidate {
    /// Builds a candidate from a listing row alone
    ///
    /// Used for rows that carry no detail link and are therefore never
    /// fetched.
    pub fn from_summary(summary: ListingSummary) -> Self {
        Self {
            name: summary.name,
            company: summary.company,
            postal_code: summary.postal_code,
            city: summary.city,
            bfee_id: summary.bfee_id,
            detail_url: summary.detail_url,
            ..Self::default()
        }
    }

    /// Merges a listing row with the fields of its detail page
    ///
    /// The detail page knows the full address, so its postal code and city
    /// win when present; otherwise the listing values are kept.
    pub fn merge(summary: ListingSummary, detail: DetailFields) -> Self {
        Self {
            name: summary.name,
            company: summary.company,
            street: detail.street,
            postal_code: detail.postal_code.or(summary.postal_code),
            city: detail.city.or(summary.city),
            phone: detail.phone,
            fax: detail.fax,
            email_present: detail.email_present,
            email_image_id: detail.email_image_id,
            website: detail.website,
            bfee_id: summary.bfee_id,
            detail_url: summary.detail_url,
        }
    }
}

impl From<&AdvisorRecord> for RawCandidate {
    fn from(record: &AdvisorRecord) -> Self {
        Self {
            name: Some(record.name.clone()),
            company: record.company.clone(),
            street: record.street.clone(),
            postal_code: record.postal_code.clone(),
            city: record.city.clone(),
            phone: record.phone.clone(),
            fax: record.fax.clone(),
            email_present: record.email_present,
            email_image_id: record.email_image_id.clone(),
            website: record.website.clone(),
            bfee_id: record.bfee_id.clone(),
            detail_url: Some(record.detail_url.clone()),
        }
    }
}

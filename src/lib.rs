//! BAFA harvest: an energy advisor directory harvester
//!
//! This crate walks the paginated advisor listing of the BAFA portal, follows
//! every entry to its detail page, validates the extracted contact fields and
//! exports the accepted records as a timestamped table.

pub mod config;
pub mod crawler;
pub mod output;
pub mod record;

use thiserror::Error;

/// Main error type for harvest operations
///
/// Only configuration problems, first-page failures and export failures
/// surface through this type. Per-item failures are counted in
/// [`output::RunStats`] and never abort a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("First listing page {url} could not be harvested: {source}")]
    FirstPage {
        url: String,
        #[source]
        source: Box<HarvestError>,
    },

    #[error("Export error: {0}")]
    Export(#[from] output::ExportError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors from a single HTTP fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP error for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Server error {status} for {url}")]
    ServerError { url: String, status: u16 },

    #[error("Rate limited at {url}")]
    RateLimited { url: String },

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Returns true if another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Network { .. }
                | Self::ServerError { .. }
                | Self::RateLimited { .. }
        )
    }
}

/// Errors raised when a page does not have the expected shape
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Page does not match the expected structure: {0}")]
    StructureMismatch(String),

    #[error("Invalid selector {0}")]
    Selector(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for a single fetch
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::{Config, RunMode};
pub use output::{RunStats, StatsReport};
pub use record::{validate, AdvisorRecord, RawCandidate, Rejection};

//! Crawler module for listing and detail page harvesting
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with retry logic
//! - Listing page and detail page extraction
//! - Bounded concurrent detail fetching
//! - Overall harvest coordination

mod coordinator;
mod detail;
mod fetcher;
mod listing;
mod parser;

pub use coordinator::{listing_url, run_harvest, Coordinator, RunOutcome};
pub use detail::parse_detail;
pub use fetcher::{build_http_client, fetch_page, fetch_with_policy, FetchedPage, RetryPolicy};
pub use listing::{parse_listing, ListingPage};

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete harvest
///
/// This is the main entry point for starting a run. It will:
/// 1. Build the HTTP client
/// 2. Walk the listing pages in order
/// 3. Fetch, merge and validate every entry's detail page
/// 4. Export the accepted records
/// 5. Write the error log if anything failed
///
/// # Arguments
///
/// * `config` - The harvester configuration
///
/// # Returns
///
/// * `Ok(RunOutcome)` - Records, statistics and written file paths
/// * `Err(HarvestError)` - The first listing page or the export failed
pub async fn crawl(config: Config) -> Result<RunOutcome, HarvestError> {
    run_harvest(config).await
}

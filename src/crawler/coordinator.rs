//! Crawler coordinator - main harvest orchestration logic
//!
//! This module contains the main loop that coordinates the harvest:
//! - Walking listing pages strictly in order
//! - Dispatching detail fetches through a bounded pool
//! - Merging, validating and accounting for every listing entry
//! - Enforcing the test-mode record ceiling
//! - Handing the results to the export writer

use crate::config::{validate as validate_config, Config};
use crate::crawler::detail::parse_detail;
use crate::crawler::fetcher::{build_http_client, fetch_with_policy, RetryPolicy};
use crate::crawler::listing::{parse_listing, ListingPage};
use crate::output::{export_records, write_error_log, RunStats, StatsReport};
use crate::record::{validate, AdvisorRecord, DetailFields, ListingSummary, RawCandidate, Rejection};
use crate::HarvestError;
use chrono::{DateTime, Local};
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// What happened to one listing entry's detail page
#[derive(Debug)]
enum DetailOutcome {
    /// The entry had no detail link, nothing was fetched
    NoLink,
    Extracted(DetailFields),
    Failed(String),
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunOutcome {
    /// Accepted records in listing order
    pub records: Vec<AdvisorRecord>,
    pub report: StatsReport,
    /// CSV table of the accepted records
    pub export_path: PathBuf,
    /// xlsx workbook with the same rows
    pub workbook_path: PathBuf,
    /// Present only when failures were recorded
    pub error_log: Option<PathBuf>,
}

/// Builds the URL of a listing page
///
/// # Example
///
/// ```
/// use bafa_harvest::config::Config;
/// use bafa_harvest::crawler::listing_url;
///
/// let url = listing_url(&Config::default(), 2).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://elan1.bafa.bund.de/bafa-portal/audit-suche/showErgebnis?resultsPerPage=9999&page=2"
/// );
/// ```
pub fn listing_url(config: &Config, page: u32) -> Result<Url, HarvestError> {
    let mut url = Url::parse(&config.source.base_url)?.join(&config.source.listing_path)?;
    url.query_pairs_mut()
        .append_pair("resultsPerPage", &config.effective_page_size().to_string())
        .append_pair("page", &page.to_string());
    Ok(url)
}

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    client: Client,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    stats: Arc<RunStats>,
    records: Vec<AdvisorRecord>,
    seen_detail_urls: HashSet<String>,
    listed_detail_urls: HashSet<String>,
    started_at: DateTime<Local>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to crawl
    /// * `Err(HarvestError)` - The configuration is invalid or the HTTP
    ///   client could not be built
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        validate_config(&config)?;
        let client = build_http_client(&config)?;
        let policy = RetryPolicy::from_config(&config.retry);
        let semaphore = Arc::new(Semaphore::new(
            config.crawler.max_concurrent_requests.max(1) as usize,
        ));

        Ok(Self {
            config: Arc::new(config),
            client,
            policy,
            semaphore,
            stats: Arc::new(RunStats::new()),
            records: Vec::new(),
            seen_detail_urls: HashSet::new(),
            listed_detail_urls: HashSet::new(),
            started_at: Local::now(),
        })
    }

    /// Shared handle to the run's statistics
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the whole harvest: crawl, export, report
    ///
    /// Item-level failures are counted and skipped. Only a failed first
    /// listing page or a failed export ends the run with an error.
    pub async fn run(mut self) -> Result<RunOutcome, HarvestError> {
        tracing::info!(
            "Starting {} harvest at page {} (page size {}, {} concurrent requests)",
            self.config.mode(),
            self.config.crawler.start_page,
            self.config.effective_page_size(),
            self.config.crawler.max_concurrent_requests
        );

        let records = self.crawl().await?;
        let report = self.stats.snapshot();
        report.log();

        let paths = export_records(
            &records,
            &self.config.output.output_dir,
            self.config.mode(),
            &self.started_at,
        )?;
        tracing::info!(
            "Results saved to: {} and {} ({} records)",
            paths.table.display(),
            paths.workbook.display(),
            records.len()
        );

        let error_log = match write_error_log(
            &self.stats.errors(),
            &self.config.output.log_dir,
            &self.started_at,
        ) {
            Ok(Some(path)) => {
                tracing::warn!("Errors have been saved to: {}", path.display());
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Failed to write error log: {}", e);
                None
            }
        };

        Ok(RunOutcome {
            records,
            report,
            export_path: paths.table,
            workbook_path: paths.workbook,
            error_log,
        })
    }

    /// Walks the listing pages and returns the accepted records
    ///
    /// Listing pages are fetched one after the other; the next page is only
    /// requested once every detail fetch of the current page has finished.
    ///
    /// Pagination stops at the first of: no next-page link, an empty page, a
    /// page listing no detail URL that was not already listed this run, the
    /// `max-pages` ceiling, or the test-mode entry limit.
    pub async fn crawl(&mut self) -> Result<Vec<AdvisorRecord>, HarvestError> {
        let first_page = self.config.crawler.start_page;
        let max_pages = self.config.crawler.max_pages;
        let mut page_index = first_page;
        let mut pages_fetched = 0u32;

        loop {
            if pages_fetched >= max_pages {
                tracing::warn!(
                    "Page ceiling of {} listing pages reached, stopping pagination",
                    max_pages
                );
                break;
            }

            if self.limit_reached() {
                tracing::info!(
                    "Entry limit of {} reached, no further pages requested",
                    self.records.len()
                );
                break;
            }

            let url = listing_url(&self.config, page_index)?;
            tracing::info!("Fetching listing page {}: {}", page_index, url);

            pages_fetched += 1;

            let listing = match self.fetch_listing(&url).await {
                Ok(listing) => listing,
                Err(e) if page_index == first_page => {
                    tracing::error!("First listing page failed: {}", e);
                    return Err(HarvestError::FirstPage {
                        url: url.to_string(),
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::error!(
                        "Listing page {} failed, stopping pagination: {}",
                        page_index,
                        e
                    );
                    self.stats
                        .record_page_failure(format!("listing page {} ({}): {}", page_index, url, e));
                    break;
                }
            };

            if listing.is_empty() {
                tracing::info!("Listing page {} has no entries, pagination complete", page_index);
                break;
            }

            if !self.lists_new_entries(&listing) && page_index != first_page {
                tracing::warn!(
                    "Listing page {} repeats already listed advisors, stopping pagination",
                    page_index
                );
                break;
            }

            tracing::debug!(
                "Listing page {} has {} entries (next page: {})",
                page_index,
                listing.entries.len(),
                listing.has_next
            );
            self.harvest_entries(listing.entries).await;

            let progress = self.stats.snapshot();
            tracing::info!(
                "Progress: page {} done, {} accepted, {} rejected, {} failed",
                page_index,
                progress.accepted,
                progress.rejected,
                progress.failed
            );

            if !listing.has_next {
                tracing::info!("No further listing page after page {}", page_index);
                break;
            }
            page_index += 1;
        }

        Ok(std::mem::take(&mut self.records))
    }

    /// Fetches and parses one listing page
    ///
    /// The caller decides whether a failure ends the run.
    async fn fetch_listing(&self, url: &Url) -> Result<ListingPage, HarvestError> {
        let page = fetch_with_policy(&self.client, url.as_str(), &self.policy).await?;

        let base = Url::parse(&page.url).unwrap_or_else(|_| url.clone());
        Ok(parse_listing(&page.body, &base)?)
    }

    /// Records the page's detail URLs, returning false if none was new
    fn lists_new_entries(&mut self, listing: &ListingPage) -> bool {
        let mut new_entries = 0usize;
        for url in listing.entries.iter().filter_map(|e| e.detail_url.as_ref()) {
            if self.listed_detail_urls.insert(url.clone()) {
                new_entries += 1;
            }
        }
        new_entries > 0
    }

    /// Remaining room under the test-mode ceiling, None in full mode
    fn remaining_capacity(&self) -> Option<usize> {
        self.config
            .entry_limit()
            .map(|limit| limit.saturating_sub(self.records.len()))
    }

    fn limit_reached(&self) -> bool {
        self.remaining_capacity() == Some(0)
    }

    /// Processes the entries of one listing page
    ///
    /// Entries are dispatched in waves. In full mode one wave covers the whole
    /// page; in test mode a wave never holds more fetches than records are
    /// still allowed, so the ceiling is met exactly without cancelling work.
    async fn harvest_entries(&mut self, entries: Vec<ListingSummary>) {
        let mut pending = entries;

        while !pending.is_empty() {
            let wave_size = match self.remaining_capacity() {
                Some(0) => {
                    tracing::debug!("Entry limit reached, {} entries left undispatched", pending.len());
                    break;
                }
                Some(room) => room.min(pending.len()),
                None => pending.len(),
            };

            let rest = pending.split_off(wave_size);
            let wave = std::mem::replace(&mut pending, rest);

            let outcomes = self.fetch_details(&wave).await;
            for (summary, outcome) in wave.into_iter().zip(outcomes) {
                match outcome {
                    DetailOutcome::NoLink => self.accept_or_reject(RawCandidate::from_summary(summary)),
                    DetailOutcome::Extracted(detail) => {
                        self.accept_or_reject(RawCandidate::merge(summary, detail))
                    }
                    DetailOutcome::Failed(reason) => {
                        tracing::error!("Skipping advisor: {}", reason);
                        self.stats.record_failed(reason);
                    }
                }
            }
        }
    }

    /// Fetches the detail pages of a wave through the bounded pool
    ///
    /// Outcomes are returned in the order of `wave`, whatever order the
    /// fetches complete in.
    async fn fetch_details(&self, wave: &[ListingSummary]) -> Vec<DetailOutcome> {
        let mut outcomes: Vec<Option<DetailOutcome>> = wave.iter().map(|_| None).collect();
        let mut tasks = JoinSet::new();
        let delay = self.config.request_delay();
        let mut dispatched = 0usize;

        for (index, summary) in wave.iter().enumerate() {
            self.stats.record_candidate();

            let Some(url) = summary.detail_url.clone() else {
                outcomes[index] = Some(DetailOutcome::NoLink);
                continue;
            };

            if dispatched > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes[index] = Some(DetailOutcome::Failed(format!("{}: {}", url, e)));
                    continue;
                }
            };

            let client = self.client.clone();
            let policy = self.policy;
            tasks.spawn(async move {
                let _permit = permit;
                tracing::debug!("Fetching detail page {}", url);

                let outcome = match fetch_with_policy(&client, &url, &policy).await {
                    Ok(page) => match parse_detail(&page.body) {
                        Ok(detail) => DetailOutcome::Extracted(detail),
                        Err(e) => DetailOutcome::Failed(format!("{}: {}", url, e)),
                    },
                    Err(e) => DetailOutcome::Failed(e.to_string()),
                };
                (index, outcome)
            });
            dispatched += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::error!("Detail fetch task failed: {}", e),
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    DetailOutcome::Failed("detail fetch task did not complete".to_string())
                })
            })
            .collect()
    }

    /// Validates a candidate and books it as accepted or rejected
    fn accept_or_reject(&mut self, candidate: RawCandidate) {
        let label = candidate
            .name
            .clone()
            .or_else(|| candidate.detail_url.clone())
            .unwrap_or_else(|| "<unnamed entry>".to_string());

        let rejection = match validate(&candidate) {
            Ok(record) if self.seen_detail_urls.insert(record.detail_url.clone()) => {
                tracing::debug!("Accepted advisor: {}", record.name);
                self.stats.record_accepted(&record);
                self.records.push(record);
                return;
            }
            Ok(record) => Rejection::DuplicateDetailUrl(record.detail_url),
            Err(rejection) => rejection,
        };

        tracing::warn!("Rejected {}: {}", label, rejection);
        self.stats.record_rejected(&rejection);
    }
}

/// Runs a complete harvest with the given configuration
///
/// # Example
///
/// ```no_run
/// use bafa_harvest::config::Config;
/// use bafa_harvest::crawler::run_harvest;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = run_harvest(Config::default()).await?;
/// println!("{}", outcome.report);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: Config) -> Result<RunOutcome, HarvestError> {
    Coordinator::new(config)?.run().await
}

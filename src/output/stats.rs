//! Run statistics collection
//!
//! `RunStats` is shared by the coordinator and its detail fetch tasks. All
//! updates go through atomic counters or mutex-guarded collections, so no
//! increment is lost when several fetches complete at once.

use crate::record::{AdvisorRecord, Rejection};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Process-wide counters for one harvest run
#[derive(Debug)]
pub struct RunStats {
    started: Instant,
    candidates: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    page_failures: AtomicU64,
    with_email: AtomicU64,
    with_website: AtomicU64,
    cities: Mutex<HashSet<String>>,
    rejection_reasons: Mutex<BTreeMap<&'static str, u64>>,
    errors: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            candidates: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            page_failures: AtomicU64::new(0),
            with_email: AtomicU64::new(0),
            with_website: AtomicU64::new(0),
            cities: Mutex::new(HashSet::new()),
            rejection_reasons: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Counts a listing entry taken up for processing
    ///
    /// Every candidate later lands in exactly one of accepted, rejected or
    /// failed.
    pub fn record_candidate(&self) {
        self.candidates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self, record: &AdvisorRecord) {
        self.accepted.fetch_add(1, Ordering::Relaxed);

        if record.email_present {
            self.with_email.fetch_add(1, Ordering::Relaxed);
        }
        if record.website.is_some() {
            self.with_website.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(city) = &record.city {
            lock(&self.cities).insert(city.clone());
        }
    }

    pub fn record_rejected(&self, rejection: &Rejection) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        *lock(&self.rejection_reasons)
            .entry(rejection.reason())
            .or_insert(0) += 1;
    }

    /// Counts a candidate whose detail page could not be fetched or parsed
    pub fn record_failed(&self, message: impl Into<String>) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        lock(&self.errors).push(message.into());
    }

    /// Counts a listing page that could not be fetched or parsed
    pub fn record_page_failure(&self, message: impl Into<String>) {
        self.page_failures.fetch_add(1, Ordering::Relaxed);
        lock(&self.errors).push(message.into());
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// All failure messages recorded so far, in recording order
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    /// Takes an immutable snapshot of the counters
    pub fn snapshot(&self) -> StatsReport {
        StatsReport {
            candidates: self.candidates.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            page_failures: self.page_failures.load(Ordering::Relaxed),
            with_email: self.with_email.load(Ordering::Relaxed),
            with_website: self.with_website.load(Ordering::Relaxed),
            distinct_cities: lock(&self.cities).len() as u64,
            rejection_reasons: lock(&self.rejection_reasons)
                .iter()
                .map(|(reason, count)| (reason.to_string(), *count))
                .collect(),
            error_count: lock(&self.errors).len() as u64,
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Final statistics of a run
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    /// Listing entries taken up for processing
    pub candidates: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Entries lost to fetch or parse failures
    pub failed: u64,
    /// Listing pages lost to fetch or parse failures
    pub page_failures: u64,
    pub with_email: u64,
    pub with_website: u64,
    pub distinct_cities: u64,
    /// Rejection reason -> count
    pub rejection_reasons: BTreeMap<String, u64>,
    pub error_count: u64,
    pub elapsed: Duration,
}

impl StatsReport {
    /// True when every candidate is accounted for in exactly one bucket
    pub fn is_complete(&self) -> bool {
        self.accepted + self.rejected + self.failed == self.candidates
    }

    /// Share of candidates that were accepted, in percent
    pub fn success_rate(&self) -> f64 {
        if self.candidates == 0 {
            return 0.0;
        }
        (self.accepted as f64 / self.candidates as f64) * 100.0
    }

    /// Writes the report to the run log
    pub fn log(&self) {
        tracing::info!("Collection statistics:");
        tracing::info!("  Candidates: {}", self.candidates);
        tracing::info!("  Accepted records: {}", self.accepted);
        tracing::info!("  Rejected records: {}", self.rejected);
        for (reason, count) in &self.rejection_reasons {
            tracing::info!("    {}: {}", reason, count);
        }
        tracing::info!("  Failed items: {}", self.failed);
        if self.page_failures > 0 {
            tracing::warn!("  Failed listing pages: {}", self.page_failures);
        }
        tracing::info!("  Entries with email: {}", self.with_email);
        tracing::info!("  Entries with website: {}", self.with_website);
        tracing::info!("  Unique cities: {}", self.distinct_cities);
        tracing::info!("  Success rate: {:.2}%", self.success_rate());
        tracing::info!("  Duration: {:.2}s", self.elapsed.as_secs_f64());

        if !self.is_complete() {
            tracing::error!(
                "Accounting mismatch: {} accepted + {} rejected + {} failed != {} candidates",
                self.accepted,
                self.rejected,
                self.failed,
                self.candidates
            );
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Collection Statistics ===")?;
        writeln!(f, "  Candidates: {}", self.candidates)?;
        writeln!(f, "  Accepted: {}", self.accepted)?;
        writeln!(f, "  Rejected: {}", self.rejected)?;
        for (reason, count) in &self.rejection_reasons {
            writeln!(f, "    {}: {}", reason, count)?;
        }
        writeln!(f, "  Failed: {}", self.failed)?;
        writeln!(f, "  Failed listing pages: {}", self.page_failures)?;
        writeln!(f, "  With email: {}", self.with_email)?;
        writeln!(f, "  With website: {}", self.with_website)?;
        writeln!(f, "  Unique cities: {}", self.distinct_cities)?;
        write!(f, "  Success rate: {:.2}%", self.success_rate())
    }
}

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a harvest run
///
/// Every section and key has a default, so an empty file (or no file at all)
/// yields a full run against the live portal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Whether the run harvests everything or stops after a few records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Test,
}

impl RunMode {
    /// Token used in export and log file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Stop after `entry_limit` accepted records
    #[serde(rename = "test-mode")]
    pub test_mode: bool,

    /// Accepted-record ceiling in test mode
    #[serde(rename = "entry-limit")]
    pub entry_limit: u32,

    /// Results requested per listing page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Listing page index to start from
    #[serde(rename = "start-page")]
    pub start_page: u32,

    /// Upper bound on listing pages requested in one run
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Maximum number of detail pages fetched at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Timeout for every single request (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Pause between two detail fetch dispatches (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Logging verbosity (0 = info, 1 = debug, 2+ = trace)
    pub verbosity: u8,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            entry_limit: 5,
            page_size: 9999,
            start_page: 0,
            max_pages: 1000,
            max_concurrent_requests: 32,
            request_timeout_secs: 15,
            request_delay_ms: 250,
            verbosity: 0,
        }
    }
}

/// Retry and backoff configuration applied to every fetch
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, the first one included
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Shortest pause between two attempts (milliseconds)
    #[serde(rename = "backoff-floor-ms")]
    pub backoff_floor_ms: u64,

    /// Longest pause between two attempts (milliseconds)
    #[serde(rename = "backoff-ceiling-ms")]
    pub backoff_ceiling_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_floor_ms: 4_000,
            backoff_ceiling_ms: 10_000,
        }
    }
}

/// Where the advisor directory lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "listing-path")]
    pub listing_path: String,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://elan1.bafa.bund.de".to_string(),
            listing_path: "/bafa-portal/audit-suche/showErgebnis".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving the exported tables
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Directory receiving the run log and the error log
    #[serde(rename = "log-dir")]
    pub log_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    pub fn mode(&self) -> RunMode {
        if self.crawler.test_mode {
            RunMode::Test
        } else {
            RunMode::Full
        }
    }

    /// Page size actually requested from the portal
    ///
    /// Test runs never ask for more entries than they are allowed to keep.
    pub fn effective_page_size(&self) -> u32 {
        match self.mode() {
            RunMode::Full => self.crawler.page_size,
            RunMode::Test => self.crawler.page_size.min(self.crawler.entry_limit),
        }
    }

    /// Accepted-record ceiling, if any
    pub fn entry_limit(&self) -> Option<usize> {
        match self.mode() {
            RunMode::Full => None,
            RunMode::Test => Some(self.crawler.entry_limit as usize),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.crawler.request_delay_ms)
    }
}

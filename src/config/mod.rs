//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! All keys are optional; missing ones fall back to the settings used against
//! the live portal.
//!
//! # Example
//!
//! ```
//! use bafa_harvest::config::parse_config;
//!
//! let config = parse_config("[crawler]\ntest-mode = true\n").unwrap();
//! assert_eq!(config.entry_limit(), Some(5));
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, RetryConfig, RunMode, SourceConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;

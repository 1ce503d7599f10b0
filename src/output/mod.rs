//! Output module for statistics and exports
//!
//! This module handles:
//! - Collecting run statistics across concurrent fetches
//! - Writing the CSV table and xlsx workbook of accepted records
//! - Writing the error log of a run

mod export;
pub mod stats;

pub use export::{
    export_file_name, export_records, read_export, write_error_log, write_records, write_workbook,
    ExportError, ExportPaths, ExportResult, DATASET_NAME, SHEET_NAME,
};
pub use stats::{RunStats, StatsReport};

//! Tabular export of accepted records
//!
//! Every run writes the same rows twice: a CSV table and an xlsx workbook
//! with a single `BAFA_Advisors` sheet. Both carry the fixed header row and
//! are named after the dataset, the run mode and the run's start time.
//! Files are always created fresh; a name that is already taken gets a
//! numeric suffix, so earlier exports are never overwritten.

use crate::config::RunMode;
use crate::record::{AdvisorRecord, COLUMN_HEADERS};
use chrono::{DateTime, Local};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the exported dataset
pub const DATASET_NAME: &str = "bafa_advisors";

/// Name of the single worksheet in the workbook export
pub const SHEET_NAME: &str = "BAFA_Advisors";

const MAX_NAME_SUFFIX: u32 = 1000;

/// Errors that can occur while writing output files
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("No free file name for {0} in the output directory")]
    NameTaken(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

fn file_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y%m%d_%H%M%S").to_string()
}

/// Base name (without extension) of the exports of a run
fn export_stem(mode: RunMode, timestamp: &DateTime<Local>) -> String {
    format!("{}_{}_{}", DATASET_NAME, mode, file_timestamp(timestamp))
}

/// File name of the CSV export for a run
///
/// # Example
///
/// ```
/// use bafa_harvest::config::RunMode;
/// use bafa_harvest::output::export_file_name;
/// use chrono::{Local, TimeZone};
///
/// let ts = Local.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
/// assert_eq!(export_file_name(RunMode::Test, &ts), "bafa_advisors_test_20240301_140509.csv");
/// ```
pub fn export_file_name(mode: RunMode, timestamp: &DateTime<Local>) -> String {
    format!("{}.csv", export_stem(mode, timestamp))
}

/// Creates a new file `<stem>.<ext>` in `dir`, never truncating an existing one
///
/// When the name is taken, `<stem>_1.<ext>`, `<stem>_2.<ext>` and so on are
/// tried in turn.
fn create_unique(dir: &Path, stem: &str, ext: &str) -> ExportResult<(PathBuf, File)> {
    for suffix in 0..=MAX_NAME_SUFFIX {
        let name = match suffix {
            0 => format!("{}.{}", stem, ext),
            n => format!("{}_{}.{}", stem, n, ext),
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ExportError::NameTaken(format!("{}.{}", stem, ext)))
}

fn ensure_dir(dir: &Path) -> ExportResult<()> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Paths of the files written by one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub table: PathBuf,
    pub workbook: PathBuf,
}

/// Writes the records to a new CSV table and a new workbook inside `output_dir`
///
/// The directory is created if needed. Rows keep the order of `records`;
/// missing values become empty cells.
///
/// # Returns
///
/// * `Ok(ExportPaths)` - Paths of the written files
/// * `Err(ExportError)` - The directory or a file could not be written
pub fn export_records(
    records: &[AdvisorRecord],
    output_dir: &Path,
    mode: RunMode,
    timestamp: &DateTime<Local>,
) -> ExportResult<ExportPaths> {
    ensure_dir(output_dir)?;
    let stem = export_stem(mode, timestamp);

    let (table, file) = create_unique(output_dir, &stem, "csv")?;
    write_records(file, records)?;

    let (workbook, file) = create_unique(output_dir, &stem, "xlsx")?;
    write_workbook(file, records)?;

    if records.is_empty() {
        tracing::warn!("No records were collected, {} holds the header only", table.display());
    }

    Ok(ExportPaths { table, workbook })
}

/// Writes the header row and one row per record as CSV
pub fn write_records<W: Write>(writer: W, records: &[AdvisorRecord]) -> ExportResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    writer.write_record(COLUMN_HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes the header row and one row per record as an xlsx workbook
pub fn write_workbook<W: Write>(mut writer: W, records: &[AdvisorRecord]) -> ExportResult<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in COLUMN_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (index, record) in records.iter().enumerate() {
        let row = index as u32 + 1;
        for (col, cell) in record.cells().iter().enumerate() {
            if let Some(value) = cell {
                sheet.write_string(row, col as u16, *value)?;
            }
        }
    }

    writer.write_all(&workbook.save_to_buffer()?)?;
    writer.flush()?;
    Ok(())
}

/// Reads an export back into records
pub fn read_export(path: &Path) -> ExportResult<Vec<AdvisorRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize()
        .collect::<Result<Vec<AdvisorRecord>, csv::Error>>()?;
    Ok(records)
}

/// Writes every recorded failure message to an error log
///
/// Nothing is written when there were no failures.
pub fn write_error_log(
    errors: &[String],
    log_dir: &Path,
    timestamp: &DateTime<Local>,
) -> ExportResult<Option<PathBuf>> {
    if errors.is_empty() {
        return Ok(None);
    }

    ensure_dir(log_dir)?;
    let stem = format!("errors_{}", file_timestamp(timestamp));
    let (path, file) = create_unique(log_dir, &stem, "log")?;

    let mut file = BufWriter::new(file);
    for error in errors {
        writeln!(file, "{}", error)?;
    }
    file.flush()?;

    Ok(Some(path))
}

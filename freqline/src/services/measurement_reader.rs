//! Measurement table reader
//!
//! Loads the frequency and magnitude columns of one measurement file.
//! Spreadsheets (`xls`, `xlsx`, `xlsm`, `ods`) are read with calamine from
//! their first worksheet; delimited text is read with the csv crate (`csv` is
//! comma separated, `tsv` and `txt` are tab separated). In both cases the first
//! row is the header row.
//!
//! # Column detection
//! The frequency column is the first header containing `frequency`, `freq` or
//! `hz` (case-insensitive). The magnitude column is the first *other* header
//! containing `dbspl`, `magnitude`, `mag` or `db`. When no header matches, the
//! frequency column falls back to column 0 and the magnitude column to column 1.

use crate::models::{FrequencyPoint, MeasurementTable};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::{Path, PathBuf};
use thiserror::Error;

const FREQUENCY_PATTERNS: [&str; 3] = ["frequency", "freq", "hz"];
const MAGNITUDE_PATTERNS: [&str; 4] = ["dbspl", "magnitude", "mag", "db"];

/// Measurement reading errors
#[derive(Debug, Error)]
pub enum ReadError {
    /// Extension is not a known measurement format
    #[error("Unsupported measurement format: {0}")]
    UnsupportedFormat(PathBuf),

    /// File could not be opened or parsed
    #[error("Failed to read {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Workbook contains no worksheet
    #[error("No worksheet in {0}")]
    NoWorksheet(PathBuf),

    /// Header row has fewer than two columns
    #[error("{0} needs at least two columns (frequency, magnitude)")]
    TooFewColumns(PathBuf),

    /// No row had a numeric frequency and magnitude
    #[error("No numeric frequency/magnitude rows in {0}")]
    NoData(PathBuf),
}

impl ReadError {
    fn parse(path: &Path, err: impl std::fmt::Display) -> Self {
        ReadError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Physical layout of a measurement file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementFormat {
    /// Workbook read through calamine
    Spreadsheet,
    /// Delimited text with the given separator byte
    Delimited(u8),
}

impl MeasurementFormat {
    /// Format implied by the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Some(MeasurementFormat::Spreadsheet),
            "csv" => Some(MeasurementFormat::Delimited(b',')),
            "tsv" | "txt" => Some(MeasurementFormat::Delimited(b'\t')),
            _ => None,
        }
    }
}

/// Chosen frequency and magnitude column indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSelection {
    pub frequency: usize,
    pub magnitude: usize,
    /// Frequency column came from the positional fallback
    pub frequency_fallback: bool,
    /// Magnitude column came from the positional fallback
    pub magnitude_fallback: bool,
}

/// Pick frequency and magnitude columns from a header row
///
/// Returns None when the header has fewer than two columns.
pub fn detect_columns<S: AsRef<str>>(headers: &[S]) -> Option<ColumnSelection> {
    if headers.len() < 2 {
        return None;
    }

    let lowered: Vec<String> = headers.iter().map(|h| h.as_ref().to_lowercase()).collect();
    let matches = |header: &str, patterns: &[&str]| patterns.iter().any(|p| header.contains(p));

    let detected_frequency = lowered.iter().position(|h| matches(h, &FREQUENCY_PATTERNS));
    let frequency = detected_frequency.unwrap_or(0);

    let detected_magnitude = lowered
        .iter()
        .enumerate()
        .position(|(i, h)| i != frequency && matches(h, &MAGNITUDE_PATTERNS));

    // Fallback column 1 may collide with a detected frequency column at 1
    let magnitude = detected_magnitude.unwrap_or(if frequency == 1 { 0 } else { 1 });

    Some(ColumnSelection {
        frequency,
        magnitude,
        frequency_fallback: detected_frequency.is_none(),
        magnitude_fallback: detected_magnitude.is_none(),
    })
}

/// A cell as read from either backend
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    /// Finite numeric value, parsing text cells
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Empty => return None,
        };
        value.is_finite().then_some(value)
    }

    fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::String(s) => CellValue::from_text(s),
            Data::Empty => CellValue::Empty,
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// Header row plus data rows, before column selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Select columns and keep rows with numeric frequency and magnitude
    pub fn into_measurement(self, path: &Path) -> Result<MeasurementTable, ReadError> {
        let columns =
            detect_columns(self.headers.as_slice()).ok_or_else(|| ReadError::TooFewColumns(path.to_path_buf()))?;

        if columns.frequency_fallback {
            tracing::info!(
                file = %path.display(),
                column = %self.headers[columns.frequency],
                "No frequency header found, using first column"
            );
        }
        if columns.magnitude_fallback {
            tracing::info!(
                file = %path.display(),
                column = %self.headers[columns.magnitude],
                "No magnitude header found, using second column"
            );
        }

        let mut points = Vec::with_capacity(self.rows.len());
        let mut skipped_rows = 0;
        for row in &self.rows {
            let frequency = row.get(columns.frequency).and_then(CellValue::as_f64);
            let magnitude = row.get(columns.magnitude).and_then(CellValue::as_f64);
            match (frequency, magnitude) {
                (Some(frequency), Some(magnitude)) => points.push(FrequencyPoint { frequency, magnitude }),
                _ => skipped_rows += 1,
            }
        }

        if points.is_empty() {
            return Err(ReadError::NoData(path.to_path_buf()));
        }
        if skipped_rows > 0 {
            tracing::debug!(file = %path.display(), skipped_rows, "Skipped non-numeric rows");
        }

        Ok(MeasurementTable {
            frequency_column: self.headers[columns.frequency].clone(),
            magnitude_column: self.headers[columns.magnitude].clone(),
            points,
            skipped_rows,
        })
    }
}

/// Measurement file reader
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementReader;

impl MeasurementReader {
    pub fn new() -> Self {
        Self
    }

    /// Read the frequency/magnitude table of `path`
    pub fn read(&self, path: &Path) -> Result<MeasurementTable, ReadError> {
        let raw = self.read_raw(path)?;
        raw.into_measurement(path)
    }

    /// Read header and rows without interpreting them
    pub fn read_raw(&self, path: &Path) -> Result<RawTable, ReadError> {
        match MeasurementFormat::from_path(path) {
            Some(MeasurementFormat::Spreadsheet) => read_spreadsheet(path),
            Some(MeasurementFormat::Delimited(delimiter)) => read_delimited(path, delimiter),
            None => Err(ReadError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

fn read_spreadsheet(path: &Path) -> Result<RawTable, ReadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ReadError::parse(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReadError::NoWorksheet(path.to_path_buf()))?
        .map_err(|e| ReadError::parse(path, e))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::Empty => format!("Unnamed: {}", i),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        None => Vec::new(),
    };

    let rows = rows.map(|row| row.iter().map(CellValue::from).collect()).collect();
    Ok(RawTable { headers, rows })
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<RawTable, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ReadError::parse(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| ReadError::parse(path, e))?
        .iter()
        .enumerate()
        .map(|(i, h)| match h.trim_start_matches('\u{feff}') {
            "" => format!("Unnamed: {}", i),
            h => h.to_string(),
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReadError::parse(path, e))?;
        rows.push(record.iter().map(CellValue::from_text).collect());
    }

    Ok(RawTable { headers, rows })
}

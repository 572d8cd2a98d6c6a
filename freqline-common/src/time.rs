//! Timestamp and run-date utilities

use crate::{Error, Result};
use chrono::{Local, NaiveDate};

/// Date stamp format used in artifact names (e.g. `20250114`)
pub const DATE_STAMP_FORMAT: &str = "%Y%m%d";

/// Today's date in the local timezone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Format a run date as `YYYYMMDD`
pub fn date_stamp(date: NaiveDate) -> String {
    date.format(DATE_STAMP_FORMAT).to_string()
}

/// Parse a `YYYYMMDD` run date
pub fn parse_date_stamp(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.len() != 8 {
        return Err(Error::InvalidInput(format!(
            "run date '{}' is not in YYYYMMDD form",
            value
        )));
    }
    NaiveDate::parse_from_str(trimmed, DATE_STAMP_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("run date '{}': {}", value, e)))
}

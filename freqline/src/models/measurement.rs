//! Measurement table read from one input file

use super::FrequencyPoint;

/// Frequency/magnitude samples of one measurement, in file row order
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTable {
    /// Header of the frequency column
    pub frequency_column: String,
    /// Header of the magnitude column
    pub magnitude_column: String,
    /// Rows with numeric frequency and magnitude
    pub points: Vec<FrequencyPoint>,
    /// Data rows dropped because a value was empty or non-numeric
    pub skipped_rows: usize,
}

impl MeasurementTable {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

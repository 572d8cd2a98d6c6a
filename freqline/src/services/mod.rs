//! Service modules for the measurement pipeline
//!
//! Synchronous building blocks used by the stages:
//! - input discovery (`InputScanner`)
//! - table loading (`MeasurementReader`)
//! - grid sampling (`FrequencyExtractor`)
//! - class assignment and grouping (`FrequencyClassifier`)
//! - spreadsheet export of classified results (`workbook_export`)

pub mod frequency_classifier;
pub mod frequency_extractor;
pub mod input_scanner;
pub mod measurement_reader;
pub mod workbook_export;

pub use frequency_classifier::{classify_frequency, group_by_class, ClassifyError, FrequencyClassifier};
pub use frequency_extractor::{nearest_point, FrequencyExtractor};
pub use input_scanner::{InputScanner, MeasurementGroup, ScanError, ScanResult};
pub use measurement_reader::{detect_columns, ColumnSelection, MeasurementFormat, MeasurementReader, ReadError};
pub use workbook_export::{classified_workbook, reclassified_workbook, workbook_name, ExportError};

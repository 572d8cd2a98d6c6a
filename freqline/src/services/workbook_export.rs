//! Spreadsheet export of classified and reclassified artifacts
//!
//! Each workbook has a `Detailed_Results` sheet (one row per point) and a
//! `Grouped_Results` sheet (one row per class). The JSON artifacts remain the
//! hand-off between stages; workbooks are for people.

use crate::models::{ClassifiedArtifact, FrequencyGroup, ReclassifiedArtifact};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;
use thiserror::Error;

pub const DETAILED_SHEET: &str = "Detailed_Results";
pub const GROUPED_SHEET: &str = "Grouped_Results";

/// Workbook export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Workbook export failed: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Too many rows for one worksheet: {0}")]
    TooManyRows(usize),
}

enum Cell {
    Number(f64),
    Flag(bool),
}

/// Workbook file name for an artifact file name (`x.json` → `x.xlsx`)
pub fn workbook_name(artifact_name: &str) -> String {
    Path::new(artifact_name)
        .with_extension("xlsx")
        .to_string_lossy()
        .to_string()
}

/// Detailed and grouped tables of a classified artifact
pub fn classified_workbook(artifact: &ClassifiedArtifact) -> Result<Vec<u8>, ExportError> {
    let detailed: Vec<Vec<Cell>> = artifact
        .detailed
        .iter()
        .map(|p| {
            vec![
                Cell::Number(p.original_frequency),
                Cell::Number(p.classified_frequency as f64),
                Cell::Number(p.magnitude),
            ]
        })
        .collect();

    build_workbook(
        &["Original_Frequency", "Classified_Frequency", "Magnitude"],
        &detailed,
        &artifact.grouped,
    )
}

/// Detailed and grouped tables of a reclassified artifact
pub fn reclassified_workbook(artifact: &ReclassifiedArtifact) -> Result<Vec<u8>, ExportError> {
    let detailed: Vec<Vec<Cell>> = artifact
        .detailed
        .iter()
        .map(|p| {
            vec![
                Cell::Number(p.original_frequency),
                Cell::Number(p.previous_frequency as f64),
                Cell::Number(p.reclassified_frequency as f64),
                Cell::Number(p.magnitude),
                Cell::Flag(p.revised),
            ]
        })
        .collect();

    build_workbook(
        &[
            "Original_Frequency",
            "Previous_Frequency",
            "Classified_Frequency",
            "Magnitude",
            "Revised",
        ],
        &detailed,
        &artifact.grouped,
    )
}

fn build_workbook(
    detailed_headers: &[&str],
    detailed: &[Vec<Cell>],
    grouped: &[FrequencyGroup],
) -> Result<Vec<u8>, ExportError> {
    let header = Format::new().set_bold();
    let mut workbook = Workbook::new();

    write_sheet(workbook.add_worksheet(), DETAILED_SHEET, &header, detailed_headers, detailed)?;

    let grouped_rows: Vec<Vec<Cell>> = grouped
        .iter()
        .map(|g| {
            vec![
                Cell::Number(g.classified_frequency as f64),
                Cell::Number(g.mean_magnitude),
                Cell::Number(g.count as f64),
            ]
        })
        .collect();
    write_sheet(
        workbook.add_worksheet(),
        GROUPED_SHEET,
        &header,
        &["Classified_Frequency", "Mean_Magnitude", "Count"],
        &grouped_rows,
    )?;

    Ok(workbook.save_to_buffer()?)
}

fn write_sheet(
    sheet: &mut Worksheet,
    name: &str,
    header: &Format,
    headers: &[&str],
    rows: &[Vec<Cell>],
) -> Result<(), ExportError> {
    sheet.set_name(name)?;
    for (col, title) in (0u16..).zip(headers) {
        sheet.write_string_with_format(0, col, *title, header)?;
    }

    for (index, cells) in rows.iter().enumerate() {
        // row 0 is the header
        let row = u32::try_from(index + 1).map_err(|_| ExportError::TooManyRows(rows.len()))?;
        for (col, cell) in (0u16..).zip(cells) {
            match cell {
                Cell::Number(value) => sheet.write_number(row, col, *value)?,
                Cell::Flag(value) => sheet.write_boolean(row, col, *value)?,
            };
        }
    }
    Ok(())
}

//! Target-grid sampling of a measurement
//!
//! For every grid frequency the extractor selects the measurement row whose
//! frequency is closest to it. Rows are not interpolated; the emitted point is
//! the row's own (frequency, magnitude). Ties go to the earliest row.

use crate::models::{FrequencyPoint, MeasurementTable, TargetGrid};

/// Samples measurements at a fixed target grid
#[derive(Debug, Clone, Copy)]
pub struct FrequencyExtractor {
    grid: TargetGrid,
}

impl FrequencyExtractor {
    pub fn new(grid: TargetGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> TargetGrid {
        self.grid
    }

    /// One point per grid frequency, in grid order
    ///
    /// Returns an empty vector when the table has no points.
    pub fn extract(&self, table: &MeasurementTable) -> Vec<FrequencyPoint> {
        self.grid
            .frequencies()
            .filter_map(|target| nearest_point(&table.points, target))
            .collect()
    }
}

/// Row with minimum `|frequency - target|`, earliest row on ties
pub fn nearest_point(points: &[FrequencyPoint], target: f64) -> Option<FrequencyPoint> {
    let mut best: Option<(f64, FrequencyPoint)> = None;
    for point in points {
        let distance = (point.frequency - target).abs();
        match best {
            Some((best_distance, _)) if distance >= best_distance => {}
            _ => best = Some((distance, *point)),
        }
    }
    best.map(|(_, point)| point)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(frequency: f64, magnitude: f64) -> FrequencyPoint {
        FrequencyPoint { frequency, magnitude }
    }

    fn table(points: Vec<FrequencyPoint>) -> MeasurementTable {
        MeasurementTable {
            frequency_column: "Frequency".to_string(),
            magnitude_column: "dBSPL".to_string(),
            points,
            skipped_rows: 0,
        }
    }

    #[test]
    fn test_nearest_point_picks_closest() {
        let points = vec![point(40.0, 1.0), point(55.0, 2.0), point(90.0, 3.0)];
        assert_eq!(nearest_point(&points, 50.0), Some(point(55.0, 2.0)));
        assert_eq!(nearest_point(&points, 100.0), Some(point(90.0, 3.0)));
    }

    #[test]
    fn test_nearest_point_tie_goes_to_earliest_row() {
        let points = vec![point(60.0, 1.0), point(40.0, 2.0), point(60.0, 3.0)];
        assert_eq!(nearest_point(&points, 50.0), Some(point(60.0, 1.0)));
    }

    #[test]
    fn test_nearest_point_empty() {
        assert_eq!(nearest_point(&[], 50.0), None);
    }

    #[test]
    fn test_extract_emits_one_point_per_target() {
        let extractor = FrequencyExtractor::new(TargetGrid { start: 50, stop: 200, step: 50 });
        let table = table(vec![point(48.0, 10.0), point(103.0, 11.0), point(149.0, 12.0)]);

        let points = extractor.extract(&table);
        assert_eq!(
            points,
            vec![
                point(48.0, 10.0),
                point(103.0, 11.0),
                point(149.0, 12.0),
                point(149.0, 12.0),
            ]
        );
    }

    #[test]
    fn test_extract_default_grid_length() {
        let extractor = FrequencyExtractor::new(TargetGrid { start: 50, stop: 22_000, step: 50 });
        let table = table(vec![point(1000.0, 80.0)]);
        assert_eq!(extractor.extract(&table).len(), 440);
    }
}

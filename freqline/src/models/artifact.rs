//! Artifacts exchanged between stages through the stores
//!
//! Every artifact carries the [`SourceRef`] of the measurement file it was
//! derived from, so each stage can name its output without parsing the
//! upstream file name. Artifacts hold no timestamps or run identifiers:
//! identical input and run date produce byte-identical stores.

use serde::{Deserialize, Serialize};

/// Measurement file an artifact descends from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Experiment name (artifact name prefix)
    pub experiment: String,
    /// Run date as `YYYYMMDD`
    pub run_date: String,
    /// Group folder name, e.g. `HL1`
    pub group: String,
    /// Measurement file stem, e.g. `Pon`
    pub stem: String,
    /// Measurement file path relative to the input root
    pub path: String,
}

impl SourceRef {
    /// `{experiment}_{date}_{group}_{stem}`
    pub fn name_prefix(&self) -> String {
        format!("{}_{}_{}_{}", self.experiment, self.run_date, self.group, self.stem)
    }

    /// Extraction store file name
    pub fn extraction_name(&self) -> String {
        format!("{}_magnitude.json", self.name_prefix())
    }

    /// Classification store file name
    pub fn classification_name(&self, base: u32) -> String {
        format!("{}_freq{}.json", self.name_prefix(), base)
    }

    /// Reclassification store file name
    pub fn reclassification_name(&self, base: u32) -> String {
        format!("{}_reclass{}.json", self.name_prefix(), base)
    }
}

/// One (frequency, magnitude) sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyPoint {
    /// Frequency in Hz
    pub frequency: f64,
    /// Magnitude (typically dB SPL)
    pub magnitude: f64,
}

/// Target frequency grid `start..=stop` by `step` (Hz)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGrid {
    pub start: u32,
    pub stop: u32,
    pub step: u32,
}

impl TargetGrid {
    /// Grid frequencies in ascending order
    pub fn frequencies(&self) -> impl Iterator<Item = f64> {
        let step = self.step.max(1) as usize;
        (self.start..=self.stop).step_by(step).map(f64::from)
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        if self.start > self.stop || self.step == 0 {
            return 0;
        }
        ((self.stop - self.start) / self.step) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of the extraction stage for one measurement file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyArtifact {
    pub source: SourceRef,
    /// Header of the column read as frequency
    pub frequency_column: String,
    /// Header of the column read as magnitude
    pub magnitude_column: String,
    pub targets: TargetGrid,
    /// One point per grid frequency, in grid order
    pub points: Vec<FrequencyPoint>,
}

/// A point snapped to its class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPoint {
    pub original_frequency: f64,
    pub classified_frequency: i64,
    pub magnitude: f64,
}

/// Aggregate of all points sharing a class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyGroup {
    pub classified_frequency: i64,
    pub mean_magnitude: f64,
    pub count: usize,
}

/// Output of the classification stage for one frequency artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedArtifact {
    pub source: SourceRef,
    pub base: u32,
    pub detailed: Vec<ClassifiedPoint>,
    /// Sorted ascending by class
    pub grouped: Vec<FrequencyGroup>,
}

/// A classified point after the second pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReclassifiedPoint {
    pub original_frequency: f64,
    pub previous_frequency: i64,
    pub reclassified_frequency: i64,
    pub magnitude: f64,
    /// Class differs from the classification stage's
    pub revised: bool,
}

/// Output of the reclassification stage for one classified artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclassifiedArtifact {
    pub source: SourceRef,
    pub previous_base: u32,
    pub base: u32,
    pub detailed: Vec<ReclassifiedPoint>,
    /// Sorted ascending by class
    pub grouped: Vec<FrequencyGroup>,
    pub revised_count: usize,
}

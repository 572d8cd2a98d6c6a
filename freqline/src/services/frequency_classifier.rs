//! Frequency classification
//!
//! A frequency's class is the nearest multiple of the base frequency,
//! `round(frequency / base) * base`, with exact halves rounded to the even
//! multiple (125 Hz at base 50 is class 100, 175 Hz is class 200). Points
//! sharing a class are grouped into their mean magnitude and count.

use crate::models::{
    ClassifiedArtifact, ClassifiedPoint, FrequencyArtifact, FrequencyGroup, ReclassifiedArtifact,
    ReclassifiedPoint,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Classification errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifyError {
    /// Class would not fit in an `i64`
    #[error("Frequency {frequency} Hz has no representable class at base {base} Hz")]
    OutOfRange { frequency: f64, base: u32 },
}

/// Class of `frequency` at `base` Hz
///
/// Fails for frequencies whose class does not fit in an `i64` (the reader
/// accepts any finite number, so `1e300` can reach this point).
pub fn classify_frequency(frequency: f64, base: u32) -> Result<i64, ClassifyError> {
    let out_of_range = ClassifyError::OutOfRange { frequency, base };
    let multiple = (frequency / f64::from(base)).round_ties_even();
    // `as` saturates, so reject anything at or beyond 2^63 before converting
    if !multiple.is_finite() || multiple.abs() >= i64::MAX as f64 {
        return Err(out_of_range);
    }
    (multiple as i64).checked_mul(i64::from(base)).ok_or(out_of_range)
}

/// Group `(class, magnitude)` pairs, ascending by class
pub fn group_by_class<I>(entries: I) -> Vec<FrequencyGroup>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut sums: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (class, magnitude) in entries {
        let slot = sums.entry(class).or_insert((0.0, 0));
        slot.0 += magnitude;
        slot.1 += 1;
    }

    sums.into_iter()
        .map(|(classified_frequency, (sum, count))| FrequencyGroup {
            classified_frequency,
            mean_magnitude: sum / count as f64,
            count,
        })
        .collect()
}

/// Classifier for one base frequency
#[derive(Debug, Clone, Copy)]
pub struct FrequencyClassifier {
    base: u32,
}

impl FrequencyClassifier {
    /// `base` must be positive; configuration validation guarantees it
    pub fn new(base: u32) -> Self {
        debug_assert!(base > 0);
        Self { base }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Classify every point of an extraction artifact
    pub fn classify(&self, artifact: &FrequencyArtifact) -> Result<ClassifiedArtifact, ClassifyError> {
        let detailed = artifact
            .points
            .iter()
            .map(|p| {
                Ok(ClassifiedPoint {
                    original_frequency: p.frequency,
                    classified_frequency: classify_frequency(p.frequency, self.base)?,
                    magnitude: p.magnitude,
                })
            })
            .collect::<Result<Vec<_>, ClassifyError>>()?;

        let grouped = group_by_class(detailed.iter().map(|p| (p.classified_frequency, p.magnitude)));

        Ok(ClassifiedArtifact {
            source: artifact.source.clone(),
            base: self.base,
            detailed,
            grouped,
        })
    }

    /// Re-bin a classified artifact at this classifier's base
    pub fn reclassify(&self, artifact: &ClassifiedArtifact) -> Result<ReclassifiedArtifact, ClassifyError> {
        let detailed = artifact
            .detailed
            .iter()
            .map(|p| {
                let reclassified_frequency = classify_frequency(p.original_frequency, self.base)?;
                Ok(ReclassifiedPoint {
                    original_frequency: p.original_frequency,
                    previous_frequency: p.classified_frequency,
                    reclassified_frequency,
                    magnitude: p.magnitude,
                    revised: reclassified_frequency != p.classified_frequency,
                })
            })
            .collect::<Result<Vec<_>, ClassifyError>>()?;

        let grouped = group_by_class(detailed.iter().map(|p| (p.reclassified_frequency, p.magnitude)));
        let revised_count = detailed.iter().filter(|p| p.revised).count();

        Ok(ReclassifiedArtifact {
            source: artifact.source.clone(),
            previous_base: artifact.base,
            base: self.base,
            detailed,
            grouped,
            revised_count,
        })
    }
}

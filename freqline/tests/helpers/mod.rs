//! Test Helper Utilities
//!
//! Shared utilities for testing freqline

#![allow(dead_code)]

pub mod fixtures;
pub mod stages;

// Re-export commonly used items
pub use fixtures::{
    drain_events, read_store, sample_rows, test_config, write_measurement_csv, write_text,
};
pub use stages::{CancellingStage, CountingStage, FailingStage};

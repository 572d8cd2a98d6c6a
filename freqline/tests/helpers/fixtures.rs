//! Measurement fixtures and store inspection

use chrono::NaiveDate;
use freqline::PipelineConfig;
use freqline_common::events::PipelineEvent;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Run date used by every fixture config
pub const TEST_DATE: &str = "20240115";

/// Synthetic response: 20 Hz to 22.05 kHz every 7 Hz
///
/// The odd step keeps grid targets off exact rows, so nearest-row selection
/// and half-even classification both get exercised.
pub fn sample_rows() -> Vec<(f64, f64)> {
    (0..3148)
        .map(|i| {
            let frequency = 20.0 + 7.0 * i as f64;
            let magnitude = 60.0 + 10.0 * (frequency / 1000.0).sin();
            (frequency, magnitude)
        })
        .collect()
}

/// Write `{root}/{group}/{stem}.csv` with a standard header
pub fn write_measurement_csv(root: &Path, group: &str, stem: &str, rows: &[(f64, f64)]) -> PathBuf {
    let mut content = String::from("Frequency (Hz),Magnitude (dBSPL)\n");
    for (frequency, magnitude) in rows {
        content.push_str(&format!("{},{}\n", frequency, magnitude));
    }
    write_text(root, group, &format!("{}.csv", stem), &content)
}

/// Write an arbitrary file into a group folder
pub fn write_text(root: &Path, group: &str, file_name: &str, content: &str) -> PathBuf {
    let dir = root.join(group);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, content).unwrap();
    path
}

/// Default config rooted at `root` with a fixed experiment and date
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::with_input_root(root);
    config.experiment = "exp".to_string();
    config.run_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    config.workers = 2;
    config
}

/// File name → contents of every regular file in a store (hidden files included)
pub fn read_store(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    if !dir.exists() {
        return files;
    }
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().unwrap().is_file() {
            files.insert(name, fs::read(entry.path()).unwrap());
        } else {
            // staging leftovers show up as a marker entry
            files.insert(format!("{}/", name), Vec::new());
        }
    }
    files
}

/// All events currently buffered for `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

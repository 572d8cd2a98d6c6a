//! Pipeline configuration resolution
//!
//! Assembles the run context from four tiers:
//! 1. Command-line argument
//! 2. Environment variable (handled by clap's `env` fallbacks, so both
//!    arrive here as [`ConfigOverrides`])
//! 3. TOML config file ([`TomlConfig`])
//! 4. Compiled default ([`CompiledDefaults`])
//!
//! The resolved [`PipelineConfig`] is immutable for the rest of the run and
//! shared with every stage.

use crate::models::TargetGrid;
use chrono::NaiveDate;
use freqline_common::config::{CompiledDefaults, LoggingConfig, TomlConfig};
use freqline_common::{time, Error, Result, StageKind, Store};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// How a stage treats a failure on one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Any per-artifact error fails the stage
    #[default]
    FailFast,
    /// Per-artifact errors are logged and skipped
    KeepGoing,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(FailurePolicy::FailFast),
            "keep-going" | "keep_going" => Ok(FailurePolicy::KeepGoing),
            other => Err(Error::Config(format!(
                "Unknown failure policy '{}' (expected fail-fast or keep-going)",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => f.write_str("fail-fast"),
            FailurePolicy::KeepGoing => f.write_str("keep-going"),
        }
    }
}

/// Locations of the three stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePaths {
    pub extraction_path: PathBuf,
    pub classification_path: PathBuf,
    pub reclassification_path: PathBuf,
}

impl StorePaths {
    /// Output directory of `stage`
    pub fn for_stage(&self, stage: StageKind) -> &Path {
        match stage {
            StageKind::Extraction => &self.extraction_path,
            StageKind::Classification => &self.classification_path,
            StageKind::Reclassification => &self.reclassification_path,
        }
    }

    /// Output store of `stage`
    pub fn store(&self, stage: StageKind) -> Store {
        Store::new(self.for_stage(stage))
    }

    /// Store `stage` reads from (None for extraction, which reads the input root)
    pub fn input_store(&self, stage: StageKind) -> Option<Store> {
        stage.upstream().map(|upstream| self.store(upstream))
    }

    /// Default store names under `root`
    pub fn under(root: &Path) -> Self {
        Self {
            extraction_path: root.join(CompiledDefaults::EXTRACTION_STORE),
            classification_path: root.join(CompiledDefaults::CLASSIFICATION_STORE),
            reclassification_path: root.join(CompiledDefaults::RECLASSIFICATION_STORE),
        }
    }
}

/// Extraction stage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Group folder name prefix
    pub group_prefix: String,
    /// Accepted measurement file extensions (lowercase, no dot)
    pub extensions: Vec<String>,
    pub grid: TargetGrid,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            group_prefix: CompiledDefaults::GROUP_PREFIX.to_string(),
            extensions: CompiledDefaults::EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            grid: TargetGrid {
                start: CompiledDefaults::TARGET_START,
                stop: CompiledDefaults::TARGET_STOP,
                step: CompiledDefaults::TARGET_STEP,
            },
        }
    }
}

/// Resolved run context shared by the driver and every stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the measurement group folders
    pub input_root: PathBuf,
    /// Artifact name prefix
    pub experiment: String,
    /// Date stamped into artifact names
    pub run_date: NaiveDate,
    pub stores: StorePaths,
    pub extraction: ExtractionSettings,
    /// Classification base frequency (Hz)
    pub classification_base: u32,
    /// Reclassification base frequency (Hz)
    pub reclassification_base: u32,
    pub failure_policy: FailurePolicy,
    /// Concurrent artifacts per stage
    pub workers: usize,
    /// Empty every store before the run
    pub clean_stores: bool,
    /// Also write xlsx workbooks of classified and reclassified artifacts
    pub export_workbooks: bool,
    pub logging: LoggingConfig,
}

/// Values taken from the command line or environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input_root: Option<PathBuf>,
    pub extraction_dir: Option<PathBuf>,
    pub classification_dir: Option<PathBuf>,
    pub reclassification_dir: Option<PathBuf>,
    pub experiment: Option<String>,
    /// `YYYYMMDD`
    pub date: Option<String>,
    pub base: Option<u32>,
    pub reclass_base: Option<u32>,
    pub keep_going: bool,
    pub clean: bool,
    pub workbooks: bool,
    pub workers: Option<usize>,
    pub log_level: Option<String>,
}

impl PipelineConfig {
    /// Config with compiled defaults rooted at `input_root`
    pub fn with_input_root(input_root: impl Into<PathBuf>) -> Self {
        let input_root = input_root.into();
        Self {
            experiment: experiment_from_root(&input_root),
            stores: StorePaths::under(&input_root),
            input_root,
            run_date: time::today(),
            extraction: ExtractionSettings::default(),
            classification_base: CompiledDefaults::BASE_FREQUENCY,
            reclassification_base: CompiledDefaults::BASE_FREQUENCY,
            failure_policy: FailurePolicy::FailFast,
            workers: default_workers(),
            clean_stores: false,
            export_workbooks: false,
            logging: LoggingConfig::default(),
        }
    }

    /// Resolve CLI/ENV overrides over the TOML config and compiled defaults
    pub fn resolve(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let input_root = overrides
            .input_root
            .clone()
            .or_else(|| toml.input_root.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let experiment = overrides
            .experiment
            .clone()
            .or_else(|| toml.experiment.clone())
            .unwrap_or_else(|| experiment_from_root(&input_root));

        let run_date = match &overrides.date {
            Some(stamp) => time::parse_date_stamp(stamp)?,
            None => time::today(),
        };

        let store_path = |cli: &Option<PathBuf>, file: &Option<PathBuf>, default: &str| {
            let path = cli.clone().or_else(|| file.clone()).unwrap_or_else(|| PathBuf::from(default));
            resolve_against(&input_root, path)
        };
        let stores = StorePaths {
            extraction_path: store_path(
                &overrides.extraction_dir,
                &toml.stores.extraction_path,
                CompiledDefaults::EXTRACTION_STORE,
            ),
            classification_path: store_path(
                &overrides.classification_dir,
                &toml.stores.classification_path,
                CompiledDefaults::CLASSIFICATION_STORE,
            ),
            reclassification_path: store_path(
                &overrides.reclassification_dir,
                &toml.stores.reclassification_path,
                CompiledDefaults::RECLASSIFICATION_STORE,
            ),
        };

        let section = &toml.extraction;
        let defaults = ExtractionSettings::default();
        let extraction = ExtractionSettings {
            group_prefix: section.group_prefix.clone().unwrap_or(defaults.group_prefix),
            extensions: section
                .extensions
                .as_ref()
                .map(|exts| {
                    exts.iter()
                        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                        .collect()
                })
                .unwrap_or(defaults.extensions),
            grid: TargetGrid {
                start: section.target_start.unwrap_or(defaults.grid.start),
                stop: section.target_stop.unwrap_or(defaults.grid.stop),
                step: section.target_step.unwrap_or(defaults.grid.step),
            },
        };

        let failure_policy = if overrides.keep_going {
            FailurePolicy::KeepGoing
        } else {
            match &toml.run.failure_policy {
                Some(policy) => policy.parse()?,
                None => FailurePolicy::default(),
            }
        };

        let mut logging = toml.logging.clone();
        if let Some(level) = &overrides.log_level {
            logging.level = level.clone();
        }

        let config = Self {
            input_root,
            experiment,
            run_date,
            stores,
            extraction,
            classification_base: overrides
                .base
                .or(toml.classification.base)
                .unwrap_or(CompiledDefaults::BASE_FREQUENCY),
            reclassification_base: overrides
                .reclass_base
                .or(toml.reclassification.base)
                .unwrap_or(CompiledDefaults::BASE_FREQUENCY),
            failure_policy,
            workers: overrides.workers.or(toml.run.workers).unwrap_or_else(default_workers),
            clean_stores: overrides.clean || toml.run.clean_stores.unwrap_or(false),
            export_workbooks: overrides.workbooks || toml.export.workbooks.unwrap_or(false),
            logging,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no stage can run with
    pub fn validate(&self) -> Result<()> {
        if self.classification_base == 0 || self.reclassification_base == 0 {
            return Err(Error::Config("Base frequencies must be greater than 0".to_string()));
        }

        let grid = &self.extraction.grid;
        if grid.step == 0 {
            return Err(Error::Config("target_step must be greater than 0".to_string()));
        }
        if grid.start > grid.stop {
            return Err(Error::Config(format!(
                "target_start ({}) must not exceed target_stop ({})",
                grid.start, grid.stop
            )));
        }

        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }

        if self.experiment.trim().is_empty() || self.experiment.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "Experiment name '{}' must be non-empty and contain no path separators",
                self.experiment
            )));
        }

        if self.extraction.extensions.is_empty() {
            return Err(Error::Config("At least one measurement extension is required".to_string()));
        }

        let paths = [
            normalize(&self.stores.extraction_path),
            normalize(&self.stores.classification_path),
            normalize(&self.stores.reclassification_path),
        ];
        if paths[0] == paths[1] || paths[0] == paths[2] || paths[1] == paths[2] {
            return Err(Error::Config("The three store paths must be distinct".to_string()));
        }

        Ok(())
    }

    /// Run date as `YYYYMMDD`
    pub fn run_date_stamp(&self) -> String {
        time::date_stamp(self.run_date)
    }

    /// Base frequency used by a classifying stage
    pub fn base_for(&self, stage: StageKind) -> Option<u32> {
        match stage {
            StageKind::Extraction => None,
            StageKind::Classification => Some(self.classification_base),
            StageKind::Reclassification => Some(self.reclassification_base),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Experiment name from the input root's directory name
fn experiment_from_root(root: &Path) -> String {
    std::fs::canonicalize(root)
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| root.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| CompiledDefaults::EXPERIMENT.to_string())
}

fn resolve_against(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

/// Lexical normalization (drops `.` and folds `..`) for path comparison
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

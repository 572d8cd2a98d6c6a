//! TOML configuration loading and config-file discovery
//!
//! Configuration is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! This module owns tiers 3 and 4. A missing config file is never fatal:
//! the caller gets an empty [`TomlConfig`] and every field falls through
//! to [`CompiledDefaults`]. A config file that exists but cannot be parsed
//! is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "FREQLINE_CONFIG";

/// Config file name searched for in the platform config directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; unset fields fall back to command-line values
/// or compiled defaults when the pipeline configuration is assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory holding the measurement group folders
    pub input_root: Option<PathBuf>,

    /// Experiment name used as artifact file name prefix
    pub experiment: Option<String>,

    /// Store directory locations
    pub stores: StoresSection,

    /// Extraction stage settings
    pub extraction: ExtractionSection,

    /// Classification stage settings
    pub classification: BaseSection,

    /// Reclassification stage settings
    pub reclassification: BaseSection,

    /// Run-wide settings
    pub run: RunSection,

    /// Spreadsheet export settings
    pub export: ExportSection,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// `[stores]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoresSection {
    pub extraction_path: Option<PathBuf>,
    pub classification_path: Option<PathBuf>,
    pub reclassification_path: Option<PathBuf>,
}

/// `[extraction]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    /// Group folder name prefix (e.g. "HL")
    pub group_prefix: Option<String>,
    /// Accepted measurement file extensions
    pub extensions: Option<Vec<String>>,
    pub target_start: Option<u32>,
    pub target_stop: Option<u32>,
    pub target_step: Option<u32>,
}

/// `[classification]` / `[reclassification]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseSection {
    /// Base frequency in Hz that classes snap to
    pub base: Option<u32>,
}

/// `[run]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// "fail-fast" or "keep-going"
    pub failure_policy: Option<String>,
    pub workers: Option<usize>,
    pub clean_stores: Option<bool>,
}

/// `[export]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    /// Write an xlsx workbook next to each classified and reclassified artifact
    pub workbooks: Option<bool>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: CompiledDefaults::LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Built-in defaults used when neither CLI, environment nor TOML set a value
pub struct CompiledDefaults;

impl CompiledDefaults {
    pub const EXTRACTION_STORE: &'static str = "extracted_frequencies";
    pub const CLASSIFICATION_STORE: &'static str = "classified_frequencies";
    pub const RECLASSIFICATION_STORE: &'static str = "reclassified_frequencies";
    pub const GROUP_PREFIX: &'static str = "HL";
    pub const EXTENSIONS: [&'static str; 7] = ["xls", "xlsx", "xlsm", "ods", "csv", "tsv", "txt"];
    pub const TARGET_START: u32 = 50;
    pub const TARGET_STOP: u32 = 22_000;
    pub const TARGET_STEP: u32 = 50;
    pub const BASE_FREQUENCY: u32 = 50;
    pub const LOG_LEVEL: &'static str = "info";
    /// Fallback experiment name when the input root has no usable name
    pub const EXPERIMENT: &'static str = "experiment";
}

/// Find the config file to load, if any
///
/// Priority: explicit path, then `FREQLINE_CONFIG`, then the user config
/// directory, then the system-wide location (Linux only). An explicit path
/// or environment value that does not exist is an error; absent platform
/// files are not.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return require_existing(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    for candidate in platform_config_candidates() {
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(Error::NotFound(format!("config file {}", path.display())))
    }
}

/// Platform config locations, most specific first
fn platform_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("freqline").join(CONFIG_FILE_NAME));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/freqline").join(CONFIG_FILE_NAME));
    }
    candidates
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Locate and load the config file, falling back to an empty config
///
/// Returns the parsed config and the path it came from. Runs before the
/// subscriber is installed, so reporting the outcome is left to the caller.
pub fn load_or_default(explicit: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match locate_config_file(explicit)? {
        Some(path) => {
            let config = load_toml_config(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((TomlConfig::default(), None)),
    }
}

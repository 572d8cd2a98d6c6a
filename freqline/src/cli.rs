//! Command-line interface definition and exit code mapping

use crate::config::ConfigOverrides;
use crate::models::PipelineRun;
use clap::{Parser, Subcommand};
use freqline_common::StageKind;
use std::path::PathBuf;

/// Run finished successfully
pub const EXIT_SUCCESS: u8 = 0;
/// Configuration or startup error
pub const EXIT_CONFIG: u8 = 2;
/// Extraction stage failed
pub const EXIT_EXTRACTION_FAILED: u8 = 3;
/// Classification stage failed
pub const EXIT_CLASSIFICATION_FAILED: u8 = 4;
/// Reclassification stage failed
pub const EXIT_RECLASSIFICATION_FAILED: u8 = 5;

/// Command-line arguments for freqline
#[derive(Parser, Debug)]
#[command(name = "freqline")]
#[command(about = "Frequency measurement pipeline: extract, classify, reclassify")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// TOML config file
    #[arg(short, long, global = true, env = "FREQLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the HL* measurement group folders
    #[arg(short, long, global = true, env = "FREQLINE_INPUT_ROOT")]
    pub input_root: Option<PathBuf>,

    /// Extraction store directory
    #[arg(long, global = true, env = "FREQLINE_EXTRACTION_DIR")]
    pub extraction_dir: Option<PathBuf>,

    /// Classification store directory
    #[arg(long, global = true, env = "FREQLINE_CLASSIFICATION_DIR")]
    pub classification_dir: Option<PathBuf>,

    /// Reclassification store directory
    #[arg(long, global = true, env = "FREQLINE_RECLASSIFICATION_DIR")]
    pub reclassification_dir: Option<PathBuf>,

    /// Experiment name used as artifact prefix (default: input root directory name)
    #[arg(long, global = true)]
    pub experiment: Option<String>,

    /// Run date stamped into artifact names, YYYYMMDD (default: today)
    #[arg(long, global = true)]
    pub date: Option<String>,

    /// Classification base frequency in Hz
    #[arg(long, global = true)]
    pub base: Option<u32>,

    /// Reclassification base frequency in Hz
    #[arg(long, global = true)]
    pub reclass_base: Option<u32>,

    /// Skip inputs that fail instead of failing the stage
    #[arg(long, global = true)]
    pub keep_going: bool,

    /// Empty the stores before running
    #[arg(long, global = true)]
    pub clean: bool,

    /// Also write xlsx workbooks of classified and reclassified results
    #[arg(long, global = true)]
    pub workbooks: bool,

    /// Artifacts processed concurrently per stage
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FREQLINE_LOG")]
    pub log_level: Option<String>,

    /// Write the run report as JSON to this path
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,
}

/// Pipeline commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run extraction, classification and reclassification (default)
    Run,
    /// Run only the extraction stage
    Extract,
    /// Run only the classification stage (extraction store must exist)
    Classify,
    /// Run only the reclassification stage (classification store must exist)
    Reclassify,
}

impl Command {
    /// Stage run by a single-stage command (None for the full run)
    pub fn single_stage(self) -> Option<StageKind> {
        match self {
            Command::Run => None,
            Command::Extract => Some(StageKind::Extraction),
            Command::Classify => Some(StageKind::Classification),
            Command::Reclassify => Some(StageKind::Reclassification),
        }
    }
}

impl Args {
    /// Command to execute (`run` when none given)
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// CLI and environment values for configuration resolution
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input_root: self.input_root.clone(),
            extraction_dir: self.extraction_dir.clone(),
            classification_dir: self.classification_dir.clone(),
            reclassification_dir: self.reclassification_dir.clone(),
            experiment: self.experiment.clone(),
            date: self.date.clone(),
            base: self.base,
            reclass_base: self.reclass_base,
            keep_going: self.keep_going,
            clean: self.clean,
            workbooks: self.workbooks,
            workers: self.workers,
            log_level: self.log_level.clone(),
        }
    }
}

/// Process exit code for a finished run
pub fn exit_code(run: &PipelineRun) -> u8 {
    if run.succeeded() {
        return EXIT_SUCCESS;
    }
    match run.failed_stage() {
        Some(StageKind::Extraction) => EXIT_EXTRACTION_FAILED,
        Some(StageKind::Classification) => EXIT_CLASSIFICATION_FAILED,
        Some(StageKind::Reclassification) => EXIT_RECLASSIFICATION_FAILED,
        None => EXIT_CONFIG,
    }
}

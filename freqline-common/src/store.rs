//! Directory-backed artifact stores
//!
//! A [`Store`] is the hand-off point between two stages. Artifacts are JSON
//! files directly inside the store directory, optionally accompanied by
//! export files (spreadsheets for people to open). Writers never write into
//! the store directly: they open a [`StoreBatch`], which stages files in a
//! hidden directory inside the store, and only [`StoreBatch::commit`] moves
//! them into place. A batch dropped without commit removes its staging
//! directory, and a commit that fails part way puts back whatever it had
//! already moved, so a failed stage leaves the store as it was.

use crate::{Error, Result, StageKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension of every artifact
pub const ARTIFACT_EXTENSION: &str = "json";

/// File extensions accepted for export files
pub const EXPORT_EXTENSIONS: [&str; 1] = ["xlsx"];

const STAGING_MARKER: &str = "-staging-";

/// Holds store files displaced by a commit until it completes
const REPLACED_DIR: &str = ".replaced";

/// A directory holding one stage's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the store directory (and parents) if absent
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Committed artifacts, sorted by file name
    ///
    /// Hidden entries (including staging directories) and non-JSON files are
    /// ignored. A missing store directory is `Error::NotFound`.
    pub fn list_artifacts(&self) -> Result<Vec<PathBuf>> {
        self.list_files(|path| has_extension(path, &[ARTIFACT_EXTENSION]))
    }

    /// True when the store holds no committed artifacts (or does not exist)
    pub fn is_empty(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(true);
        }
        Ok(self.list_artifacts()?.is_empty())
    }

    /// Remove committed artifacts, export files and leftover staging directories
    ///
    /// Other files in the directory are left alone. Returns the number of
    /// artifacts removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.exists() {
            return Ok(0);
        }

        let artifacts = self.list_artifacts()?;
        for path in &artifacts {
            std::fs::remove_file(path)?;
        }
        for path in self.list_files(|path| has_extension(path, &EXPORT_EXTENSIONS))? {
            std::fs::remove_file(path)?;
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() && name.starts_with('.') && name.contains(STAGING_MARKER) {
                debug!(store = %self.root.display(), dir = %name, "Removing stale staging directory");
                std::fs::remove_dir_all(entry.path())?;
            }
        }

        Ok(artifacts.len())
    }

    /// Deserialize one artifact file
    pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let bytes = std::fs::read(path)?;
        let artifact = serde_json::from_slice(&bytes)?;
        Ok(artifact)
    }

    /// Start staging output for `stage`
    pub fn begin_batch(&self, stage: StageKind) -> Result<StoreBatch> {
        self.ensure_exists()?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}{}", stage.as_str(), STAGING_MARKER))
            .tempdir_in(&self.root)?;

        debug!(
            stage = %stage,
            staging = %staging.path().display(),
            "Opened staging directory"
        );

        Ok(StoreBatch {
            store_root: self.root.clone(),
            staging,
            artifacts: BTreeSet::new(),
            exports: BTreeSet::new(),
        })
    }

    /// Visible regular files matching `keep`, sorted
    fn list_files(&self, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
        if !self.exists() {
            return Err(Error::NotFound(format!("store {}", self.root.display())));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if !is_hidden(&path) && keep(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Uncommitted output of one stage run
#[derive(Debug)]
pub struct StoreBatch {
    store_root: PathBuf,
    staging: tempfile::TempDir,
    artifacts: BTreeSet<String>,
    exports: BTreeSet<String>,
}

impl StoreBatch {
    /// Stage one artifact under `name`
    ///
    /// `name` must be a plain `*.json` file name. Writing the same name twice
    /// in one batch is an error.
    pub fn write<T: Serialize>(&mut self, name: &str, artifact: &T) -> Result<PathBuf> {
        validate_file_name(name, &[ARTIFACT_EXTENSION])?;
        self.reject_duplicate(name)?;

        let mut bytes = serde_json::to_vec_pretty(artifact)?;
        bytes.push(b'\n');

        let staged = self.staging.path().join(name);
        std::fs::write(&staged, bytes)?;
        self.artifacts.insert(name.to_string());
        Ok(staged)
    }

    /// Stage an export file (see [`EXPORT_EXTENSIONS`]) under `name`
    ///
    /// Export files are committed with the artifacts but never listed as
    /// artifacts, so downstream stages do not read them.
    pub fn write_export(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_file_name(name, &EXPORT_EXTENSIONS)?;
        self.reject_duplicate(name)?;

        let staged = self.staging.path().join(name);
        std::fs::write(&staged, bytes)?;
        self.exports.insert(name.to_string());
        Ok(staged)
    }

    /// Move every staged file into the store
    ///
    /// Files with the same name from an earlier run are replaced. If any
    /// move fails, files already moved are taken back out and the replaced
    /// ones restored before the error is returned. Returns the committed
    /// artifact paths in name order (export files are not included).
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let replaced_dir = self.staging.path().join(REPLACED_DIR);
        let mut moved: Vec<(&str, bool)> = Vec::with_capacity(self.artifacts.len() + self.exports.len());

        for name in self.artifacts.iter().chain(self.exports.iter()) {
            match self.commit_file(name, &replaced_dir) {
                Ok(replaced) => moved.push((name, replaced)),
                Err(e) => {
                    warn!(
                        store = %self.store_root.display(),
                        file = %name,
                        error = %e,
                        "Commit failed, restoring store"
                    );
                    self.roll_back(&moved, &replaced_dir);
                    return Err(e);
                }
            }
        }

        debug!(
            store = %self.store_root.display(),
            artifacts = self.artifacts.len(),
            exports = self.exports.len(),
            "Committed staged files"
        );

        // TempDir removes the staging directory and displaced files on drop
        Ok(self.artifacts.iter().map(|name| self.store_root.join(name)).collect())
    }

    fn reject_duplicate(&self, name: &str) -> Result<()> {
        if self.artifacts.contains(name) || self.exports.contains(name) {
            return Err(Error::InvalidInput(format!(
                "artifact {} written twice in one stage run",
                name
            )));
        }
        Ok(())
    }

    /// Move one staged file into place; true when it displaced an existing file
    fn commit_file(&self, name: &str, replaced_dir: &Path) -> Result<bool> {
        let target = self.store_root.join(name);
        let replaced = target.is_file();
        if replaced {
            std::fs::create_dir_all(replaced_dir)?;
            std::fs::rename(&target, replaced_dir.join(name))?;
        }

        if let Err(e) = std::fs::rename(self.staging.path().join(name), &target) {
            if replaced {
                if let Err(restore) = std::fs::rename(replaced_dir.join(name), &target) {
                    warn!(file = %target.display(), error = %restore, "Failed to restore replaced file");
                }
            }
            return Err(e.into());
        }
        Ok(replaced)
    }

    fn roll_back(&self, moved: &[(&str, bool)], replaced_dir: &Path) {
        for &(name, replaced) in moved.iter().rev() {
            let target = self.store_root.join(name);
            let restored = if replaced {
                std::fs::rename(replaced_dir.join(name), &target)
            } else {
                std::fs::remove_file(&target)
            };
            if let Err(e) = restored {
                warn!(file = %target.display(), error = %e, "Failed to roll back committed file");
            }
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| extensions.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

fn validate_file_name(name: &str, extensions: &[&str]) -> Result<()> {
    let path = Path::new(name);
    let plain = path.components().count() == 1 && path.file_name().is_some();

    if !plain || name.starts_with('.') || !has_extension(path, extensions) {
        return Err(Error::InvalidInput(format!("invalid artifact name: {}", name)));
    }
    Ok(())
}

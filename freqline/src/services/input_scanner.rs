//! Measurement input scanner
//!
//! Discovers measurement groups under the input root. A group is an
//! immediate subdirectory whose name starts with the group prefix (`HL` by
//! default); its measurement files are the regular files directly inside it
//! with an accepted extension. Groups and files come back sorted by name so
//! extraction order is stable across runs and platforms.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Input scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Directory listing failed
    #[error("Cannot read directory {0}: {1}")]
    Unreadable(PathBuf, String),
}

/// One measurement group folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementGroup {
    /// Folder name, e.g. `HL1`
    pub name: String,
    pub path: PathBuf,
    /// Measurement files, sorted
    pub files: Vec<PathBuf>,
}

/// Scan result with statistics
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Groups in name order (including groups without measurement files)
    pub groups: Vec<MeasurementGroup>,
    /// Count of measurement files by extension
    pub by_format: BTreeMap<String, usize>,
    /// Entries that could not be read (scan continued past them)
    pub errors: Vec<String>,
}

impl ScanResult {
    /// Total measurement files across all groups
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }
}

/// Measurement input scanner
#[derive(Debug, Clone)]
pub struct InputScanner {
    group_prefix: String,
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
}

impl InputScanner {
    /// Create scanner for `group_prefix` folders accepting `extensions`
    ///
    /// Extensions are compared case-insensitively, with or without a
    /// leading dot. Spreadsheet lock files (`~$…`) and hidden files are
    /// always ignored.
    pub fn new(group_prefix: impl Into<String>, extensions: &[String]) -> Self {
        Self {
            group_prefix: group_prefix.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "desktop.ini".to_string(),
            ],
        }
    }

    /// Scan `root` for measurement groups
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut result = ScanResult::default();

        for entry in Self::children(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    result.errors.push(e.to_string());
                    continue;
                }
            };

            if !self.is_group_dir(&entry) {
                continue;
            }

            let group = self.scan_group(&entry, &mut result)?;
            tracing::debug!(
                group = %group.name,
                files = group.files.len(),
                "Group scanned"
            );
            result.groups.push(group);
        }

        Ok(result)
    }

    fn children(dir: &Path) -> walkdir::IntoIter {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
    }

    fn scan_group(
        &self,
        entry: &DirEntry,
        result: &mut ScanResult,
    ) -> Result<MeasurementGroup, ScanError> {
        let path = entry.path().to_path_buf();
        let name = entry.file_name().to_string_lossy().to_string();

        // Surface an unreadable group as an error rather than an empty group
        std::fs::read_dir(&path).map_err(|e| ScanError::Unreadable(path.clone(), e.to_string()))?;

        let mut files = Vec::new();
        for child in Self::children(&path) {
            match child {
                Ok(child) => {
                    if child.path().is_file() && self.is_measurement_file(&child) {
                        if let Some(ext) = extension_of(child.path()) {
                            *result.by_format.entry(ext).or_insert(0) += 1;
                        }
                        files.push(child.path().to_path_buf());
                    }
                }
                Err(e) => {
                    tracing::warn!(group = %name, "Error accessing entry: {}", e);
                    result.errors.push(e.to_string());
                }
            }
        }

        Ok(MeasurementGroup { name, path, files })
    }

    fn is_group_dir(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        entry.path().is_dir() && name.starts_with(&self.group_prefix)
    }

    fn is_measurement_file(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.starts_with("~$") {
            return false;
        }
        if self.ignore_patterns.iter().any(|p| name.as_ref() == p) {
            return false;
        }
        extension_of(entry.path())
            .map(|ext| self.extensions.iter().any(|e| *e == ext))
            .unwrap_or(false)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner() -> InputScanner {
        InputScanner::new("HL", &["xls".to_string(), ".CSV".to_string()])
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let result = scanner().scan(Path::new("/nonexistent/path"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_scan_file_as_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.csv");
        touch(&file);
        let result = scanner().scan(&file);
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = TempDir::new().unwrap();
        let result = scanner().scan(dir.path()).unwrap();
        assert!(result.groups.is_empty());
        assert_eq!(result.file_count(), 0);
    }

    #[test]
    fn test_groups_and_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("HL2/b.xls"));
        touch(&root.join("HL2/a.CSV"));
        touch(&root.join("HL2/notes.txt"));
        touch(&root.join("HL2/~$a.xls"));
        touch(&root.join("HL2/.hidden.csv"));
        touch(&root.join("HL1/z.csv"));
        touch(&root.join("HL1/nested/deep.csv"));
        touch(&root.join("other/x.csv"));
        touch(&root.join("HL_file.csv"));

        let result = scanner().scan(root).unwrap();

        let names: Vec<_> = result.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["HL1", "HL2"]);

        let hl1: Vec<_> = result.groups[0].files.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(hl1, vec!["z.csv"]);

        let hl2: Vec<_> = result.groups[1].files.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(hl2, vec!["a.CSV", "b.xls"]);

        assert_eq!(result.file_count(), 3);
        assert_eq!(result.by_format.get("csv"), Some(&2));
        assert_eq!(result.by_format.get("xls"), Some(&1));
    }
}

//! Data directory layout and file publication.
//!
//! Every corpus file, the published suggestions file and the per-solution
//! background-analysis markers live in one flat directory. Writers never touch
//! a live file directly: they write a `.tmp` sibling and swap it in while
//! holding the directory's file lock, which readers of the published file take
//! as well.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::core::errors::{AutoTemplateError, Result};
use crate::core::file_utils::is_hidden_file;

/// Published suggestions file name.
pub const SUGGESTIONS_FILE: &str = "_Suggestions.xml";

/// Temporary file the aggregator writes before publishing.
pub const SUGGESTIONS_TEMP_FILE: &str = "_Suggestions.tmp";

const CORPUS_EXTENSION: &str = "xml";
const TEMP_EXTENSION: &str = "tmp";
const MARKER_EXTENSION: &str = "config";

/// Whether background incremental analysis runs for a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundAnalysis {
    /// Saves trigger incremental updates
    Enabled,
    /// Saves are ignored
    Disabled,
}

impl BackgroundAnalysis {
    /// Marker file content
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    /// Whether background analysis runs
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl fmt::Display for BackgroundAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackgroundAnalysis {
    type Err = AutoTemplateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            other => Err(AutoTemplateError::validation_field(
                format!("Unknown background analysis marker '{other}'"),
                "marker",
            )),
        }
    }
}

/// The flat data directory shared by the analyzer, aggregator and catalog.
///
/// Clones share the same file lock.
#[derive(Debug, Clone)]
pub struct DataDirectory {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DataDirectory {
    /// Data directory rooted at `root`; nothing is created yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AutoTemplateError::io(
                format!("Failed to create data directory: {}", self.root.display()),
                e,
            )
        })
    }

    /// Acquire the shared file lock
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// `<root>/<solution>.xml`
    pub fn corpus_path(&self, solution: &str) -> PathBuf {
        self.root.join(format!("{solution}.{CORPUS_EXTENSION}"))
    }

    /// `<root>/<solution>.tmp`
    pub fn corpus_temp_path(&self, solution: &str) -> PathBuf {
        self.root.join(format!("{solution}.{TEMP_EXTENSION}"))
    }

    /// `<root>/_Suggestions.xml`
    pub fn suggestions_path(&self) -> PathBuf {
        self.root.join(SUGGESTIONS_FILE)
    }

    /// `<root>/_Suggestions.tmp`
    pub fn suggestions_temp_path(&self) -> PathBuf {
        self.root.join(SUGGESTIONS_TEMP_FILE)
    }

    /// `<root>/<solution>.config`
    pub fn marker_path(&self, solution: &str) -> PathBuf {
        self.root.join(format!("{solution}.{MARKER_EXTENSION}"))
    }

    /// Corpus files to aggregate: every visible `*.xml` file except the
    /// published suggestions file, sorted by name. A missing directory has no
    /// corpus files.
    pub fn corpus_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            AutoTemplateError::io(
                format!("Failed to list data directory: {}", self.root.display()),
                e,
            )
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || is_hidden_file(&path) {
                continue;
            }
            let is_xml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(CORPUS_EXTENSION))
                .unwrap_or(false);
            let is_suggestions = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.eq_ignore_ascii_case(SUGGESTIONS_FILE))
                .unwrap_or(false);
            if is_xml && !is_suggestions {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Swap `temp` into place as `target` under the file lock: the old target
    /// is deleted and the temp file renamed.
    pub fn publish(&self, temp: &Path, target: &Path) -> Result<()> {
        let _guard = self.lock();
        remove_if_exists(target)?;
        fs::rename(temp, target).map_err(|e| {
            AutoTemplateError::io(
                format!("Failed to publish {}", target.display()),
                e,
            )
        })?;
        debug!("Published {}", target.display());
        Ok(())
    }

    /// Copy `temp` over `target` under the file lock, then delete `temp`.
    pub fn replace_by_copy(&self, temp: &Path, target: &Path) -> Result<()> {
        let _guard = self.lock();
        fs::copy(temp, target).map_err(|e| {
            AutoTemplateError::io(
                format!("Failed to replace {}", target.display()),
                e,
            )
        })?;
        remove_if_exists(temp)
    }

    /// Background analysis marker for `solution`, `None` when never asked
    pub fn read_marker(&self, solution: &str) -> Result<Option<BackgroundAnalysis>> {
        let path = self.marker_path(solution);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| {
            AutoTemplateError::io(format!("Failed to read marker: {}", path.display()), e)
        })?;
        content.parse().map(Some)
    }

    /// Persist the background analysis marker for `solution`
    pub fn write_marker(&self, solution: &str, mode: BackgroundAnalysis) -> Result<()> {
        self.ensure_exists()?;
        let path = self.marker_path(solution);
        fs::write(&path, mode.as_str()).map_err(|e| {
            AutoTemplateError::io(format!("Failed to write marker: {}", path.display()), e)
        })
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AutoTemplateError::io(
            format!("Failed to delete {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn corpus_files_skip_suggestions_hidden_and_other_files() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        for name in [
            "Beta.xml",
            "Alpha.xml",
            "_suggestions.XML",
            ".Hidden.xml",
            "Alpha.config",
            "Alpha.tmp",
        ] {
            fs::write(dir.path().join(name), "<i />").unwrap();
        }

        let names: Vec<String> = data
            .corpus_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Alpha.xml", "Beta.xml"]);
    }

    #[test]
    fn missing_directory_has_no_corpus() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path().join("absent"));
        assert!(data.corpus_files().unwrap().is_empty());
    }

    #[test]
    fn publish_replaces_target() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        fs::write(data.suggestions_path(), "old").unwrap();
        fs::write(data.suggestions_temp_path(), "new").unwrap();

        data.publish(&data.suggestions_temp_path(), &data.suggestions_path())
            .unwrap();

        assert_eq!(fs::read_to_string(data.suggestions_path()).unwrap(), "new");
        assert!(!data.suggestions_temp_path().exists());
    }

    #[test]
    fn replace_by_copy_removes_temp() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        fs::write(data.corpus_path("App"), "old").unwrap();
        fs::write(data.corpus_temp_path("App"), "new").unwrap();

        data.replace_by_copy(&data.corpus_temp_path("App"), &data.corpus_path("App"))
            .unwrap();

        assert_eq!(fs::read_to_string(data.corpus_path("App")).unwrap(), "new");
        assert!(!data.corpus_temp_path("App").exists());
    }

    #[test]
    fn marker_round_trip() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path().join("data"));
        assert_eq!(data.read_marker("App").unwrap(), None);

        data.write_marker("App", BackgroundAnalysis::Disabled).unwrap();
        assert_eq!(
            data.read_marker("App").unwrap(),
            Some(BackgroundAnalysis::Disabled)
        );
        assert_eq!(
            fs::read_to_string(data.marker_path("App")).unwrap(),
            "disabled"
        );

        fs::write(data.marker_path("App"), "maybe").unwrap();
        assert!(data.read_marker("App").is_err());
    }
}

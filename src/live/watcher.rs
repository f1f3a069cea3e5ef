//! Background incremental analysis driven by file-system changes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::engine::SuggestionEngine;
use crate::core::config::AnalysisSettings;
use crate::core::errors::{AutoTemplateError, Result};
use crate::lang::workspace::{FsWorkspace, Workspace};
use crate::live::debounce::SaveDebouncer;

/// Whether a changed path is a source file outside excluded directories
pub fn is_tracked_source(path: &Path, settings: &AnalysisSettings) -> bool {
    let source = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| settings.is_source_extension(ext))
        .unwrap_or(false);
    source
        && !path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .map(|name| settings.is_excluded_dir(name))
                .unwrap_or(false)
        })
}

/// Recursive watcher reporting changed source files.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<PathBuf>,
}

impl SourceWatcher {
    /// Watch `root` recursively
    pub fn new(root: &Path, settings: &AnalysisSettings) -> Result<Self> {
        let (sender, changes) = mpsc::unbounded_channel();
        let settings = settings.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    for path in event.paths {
                        if is_tracked_source(&path, &settings) && sender.send(path).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            }
        })
        .map_err(|e| AutoTemplateError::internal(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| {
                AutoTemplateError::internal(format!("Failed to watch {}: {e}", root.display()))
            })?;
        info!("Watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Next changed source file
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        self.changes.recv().await
    }
}

/// Runs incremental updates and background builds for one solution.
#[derive(Clone)]
pub struct BackgroundUpdater {
    engine: Arc<SuggestionEngine>,
    workspace: Arc<FsWorkspace>,
}

impl BackgroundUpdater {
    /// Updater for `workspace`
    pub fn new(engine: Arc<SuggestionEngine>, workspace: Arc<FsWorkspace>) -> Self {
        Self { engine, workspace }
    }

    /// Re-mine `changed`, then rebuild the suggestions on the blocking pool
    pub async fn process(&self, changed: Vec<String>) -> Result<()> {
        let engine = self.engine.clone();
        let workspace = self.workspace.clone();
        let summary = tokio::task::spawn_blocking(move || {
            engine.update_files(workspace.as_ref(), &changed, None)
        })
        .await
        .map_err(|e| AutoTemplateError::pipeline("update", format!("Update task failed: {e}")))??;
        info!(
            "Updated {} file(s), {} observation(s) written",
            summary.files_analyzed, summary.observations_written
        );

        let build = self
            .engine
            .build_in_background()
            .await
            .map_err(|e| AutoTemplateError::pipeline("build", format!("Build task failed: {e}")))??;
        info!("Published {} suggestion(s)", build.published);
        Ok(())
    }
}

/// Watch the solution until `shutdown` resolves, feeding saves through the
/// debouncer into incremental updates.
pub async fn watch_solution(
    engine: Arc<SuggestionEngine>,
    workspace: Arc<FsWorkspace>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let settings = engine.config().analysis.clone();
    let mut watcher = SourceWatcher::new(workspace.root(), &settings)?;
    let (debouncer, mut batches) =
        SaveDebouncer::from_settings(&engine.config().suggestions, &settings);
    let updater = BackgroundUpdater::new(engine, workspace.clone());

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Watch of {} stopped", workspace.solution_name());
                return Ok(());
            }
            change = watcher.next_change() => {
                let Some(path) = change else {
                    return Ok(());
                };
                match workspace.file_id_for_path(&path) {
                    Some(file_id) => debouncer.record_save(&file_id),
                    None => debug!("Ignoring change outside projects: {}", path.display()),
                }
            }
            Some(batch) = batches.recv() => {
                if let Err(e) = updater.process(batch).await {
                    warn!("Background update failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AutoTemplateConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn tracks_only_source_files_outside_excluded_dirs() {
        let settings = AnalysisSettings::default();
        assert!(is_tracked_source(Path::new("/s/App/Repo.cs"), &settings));
        assert!(is_tracked_source(Path::new("/s/App/Repo.CS"), &settings));
        assert!(!is_tracked_source(Path::new("/s/App/obj/Repo.cs"), &settings));
        assert!(!is_tracked_source(Path::new("/s/App/readme.md"), &settings));
    }

    #[tokio::test]
    async fn updater_rebuilds_corpus_and_suggestions() {
        let data = TempDir::new().unwrap();
        let solution = TempDir::new().unwrap();
        let source = "using System.Data.SqlClient;\nclass A { void M() { var c = new SqlConnection(\"x\"); c.Open(); } }";
        fs::write(solution.path().join("A.cs"), source).unwrap();

        let mut config = AutoTemplateConfig::default();
        config.storage.data_dir = Some(data.path().to_path_buf());
        config.suggestions.min_occurrences = 1;
        let engine = Arc::new(SuggestionEngine::new(config).unwrap());
        let workspace = Arc::new(
            FsWorkspace::open(solution.path(), &engine.config().analysis)
                .unwrap()
                .with_solution_name("Shop"),
        );

        let file_id = workspace
            .file_id_for_path(&solution.path().join("A.cs"))
            .unwrap();
        BackgroundUpdater::new(engine.clone(), workspace)
            .process(vec![file_id])
            .await
            .unwrap();

        assert!(engine.data_dir().corpus_path("Shop").exists());
        assert!(engine
            .catalog()
            .templates()
            .iter()
            .any(|t| t.template == "$VariableName$.Open();"));
    }
}

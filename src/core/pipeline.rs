//! Mining pipeline and corpus analyzer.
//!
//! [`TemplatePipeline`] is the explicit registry of scope classifiers and
//! statement template builders. [`CorpusAnalyzer`] drives it over every file of
//! a [`Workspace`] and persists the observations as the solution's corpus,
//! either from scratch or by replacing the entries of changed files only.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::errors::{AutoTemplateError, Result};
use crate::detectors::scopes::{standard_classifiers, Scope, ScopeClassifier};
use crate::detectors::templates::{
    standard_builders, StatementDescriptor, StatementTemplateBuilder,
};
use crate::io::corpus::{read_corpus_lenient, retain_unchanged, CorpusWriter};
use crate::io::data_dir::DataDirectory;
use crate::lang::common::{SourceFile, StatementRef};
use crate::lang::workspace::Workspace;

/// Receives progress of long running passes.
pub trait ProgressSink: Send + Sync {
    /// Current task ("Building suggestions...", a project name)
    fn set_task(&self, task: &str);

    /// Detail within the task (a file name, "n of m")
    fn set_text(&self, text: &str);
}

/// Ordered classifiers and builders used for mining and for live offers.
pub struct TemplatePipeline {
    classifiers: Vec<Box<dyn ScopeClassifier>>,
    builders: Vec<Box<dyn StatementTemplateBuilder>>,
}

impl Default for TemplatePipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl TemplatePipeline {
    /// Every built-in classifier and builder
    pub fn standard() -> Self {
        Self {
            classifiers: standard_classifiers(),
            builders: standard_builders(),
        }
    }

    /// A pipeline with nothing registered
    pub fn empty() -> Self {
        Self {
            classifiers: Vec::new(),
            builders: Vec::new(),
        }
    }

    /// Register a classifier after the existing ones
    pub fn with_classifier(mut self, classifier: impl ScopeClassifier + 'static) -> Self {
        self.classifiers.push(Box::new(classifier));
        self
    }

    /// Register a builder after the existing ones
    pub fn with_builder(mut self, builder: impl StatementTemplateBuilder + 'static) -> Self {
        self.builders.push(Box::new(builder));
        self
    }

    /// Registered classifier names in order
    pub fn classifier_names(&self) -> Vec<&'static str> {
        self.classifiers.iter().map(|c| c.name()).collect()
    }

    /// Registered builder names in order
    pub fn builder_names(&self) -> Vec<&'static str> {
        self.builders.iter().map(|b| b.name()).collect()
    }

    /// Every scope the registered classifiers derive from `statement`
    pub fn scopes_for(&self, statement: StatementRef<'_>) -> Vec<Scope> {
        self.classifiers
            .iter()
            .filter(|classifier| classifier.can_handle(statement))
            .filter_map(|classifier| classifier.handle(statement))
            .collect()
    }

    /// Every template the registered builders derive from the statement
    /// following `scope`
    pub fn descriptors_for(&self, file: &SourceFile, scope: &Scope) -> Vec<StatementDescriptor> {
        let Some(next) = scope.next_statement(file) else {
            return Vec::new();
        };
        self.builders
            .iter()
            .filter(|builder| builder.can_handle(next))
            .filter_map(|builder| builder.build(next, scope))
            .collect()
    }

    /// Mine every statement of `file`, in pre-order
    pub fn analyze_file(&self, file: &SourceFile, file_id: &str) -> Vec<StatementDescriptor> {
        let mut descriptors = Vec::new();
        for statement in file.walk() {
            for scope in self.scopes_for(statement) {
                descriptors.extend(
                    self.descriptors_for(file, &scope)
                        .into_iter()
                        .map(|descriptor| descriptor.with_file_name(file_id)),
                );
            }
        }
        descriptors
    }
}

/// Counters of one corpus pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Files mined
    pub files_analyzed: usize,
    /// Files skipped after a load failure
    pub files_failed: usize,
    /// Entries carried over from the previous corpus
    pub observations_retained: usize,
    /// Entries written in total
    pub observations_written: usize,
}

/// Builds and incrementally maintains per-solution corpus files.
#[derive(Clone)]
pub struct CorpusAnalyzer {
    pipeline: Arc<TemplatePipeline>,
    data_dir: DataDirectory,
}

impl CorpusAnalyzer {
    /// Analyzer writing into `data_dir`
    pub fn new(pipeline: Arc<TemplatePipeline>, data_dir: DataDirectory) -> Self {
        Self { pipeline, data_dir }
    }

    /// Data directory in use
    pub fn data_dir(&self) -> &DataDirectory {
        &self.data_dir
    }

    /// Rebuild the solution's corpus from every file of the workspace.
    pub fn analyze_solution(
        &self,
        workspace: &dyn Workspace,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisSummary> {
        let solution = checked_solution_name(workspace)?;
        self.data_dir.ensure_exists()?;
        workspace.refresh()?;

        let temp = self.data_dir.corpus_temp_path(solution);
        let mut writer = CorpusWriter::create(&temp)?;
        let mut summary = AnalysisSummary::default();

        for project in workspace.projects()? {
            if let Some(progress) = progress {
                progress.set_task(&project.name);
            }
            for file_id in &project.file_ids {
                self.mine_into(workspace, file_id, &mut writer, &mut summary, progress)?;
            }
        }

        summary.observations_written = writer.written();
        writer.finish()?;
        self.data_dir
            .publish(&temp, &self.data_dir.corpus_path(solution))?;

        info!(
            "Analyzed {} files of {} ({} failed), {} observations",
            summary.files_analyzed, solution, summary.files_failed, summary.observations_written
        );
        Ok(summary)
    }

    /// Replace the corpus entries of `changed` files with fresh ones.
    ///
    /// Entries of every other file are copied through unchanged, so an empty
    /// change set rewrites the corpus byte for byte. Changed identifiers the
    /// workspace no longer knows simply lose their entries.
    pub fn update_files(
        &self,
        workspace: &dyn Workspace,
        changed: &[String],
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisSummary> {
        let solution = checked_solution_name(workspace)?;
        self.data_dir.ensure_exists()?;
        workspace.refresh()?;

        let changed_set: HashSet<String> = changed.iter().cloned().collect();
        let target = self.data_dir.corpus_path(solution);
        let previous = {
            let _guard = self.data_dir.lock();
            read_corpus_lenient(&target)
        };

        let temp = self.data_dir.corpus_temp_path(solution);
        let mut writer = CorpusWriter::create(&temp)?;
        writer.write_all(retain_unchanged(&previous, &changed_set))?;
        let mut summary = AnalysisSummary {
            observations_retained: writer.written(),
            ..AnalysisSummary::default()
        };

        let known: HashSet<String> = workspace.file_ids()?.into_iter().collect();
        if let Some(progress) = progress {
            progress.set_task(solution);
        }
        let mut seen = HashSet::new();
        for file_id in changed {
            if !seen.insert(file_id.as_str()) {
                continue;
            }
            if !known.contains(file_id) {
                debug!("{} is no longer part of {}", file_id, solution);
                continue;
            }
            self.mine_into(workspace, file_id, &mut writer, &mut summary, progress)?;
        }

        summary.observations_written = writer.written();
        writer.finish()?;
        self.data_dir.replace_by_copy(&temp, &target)?;

        info!(
            "Updated {} files of {}, {} observations retained, {} written",
            summary.files_analyzed,
            solution,
            summary.observations_retained,
            summary.observations_written
        );
        Ok(summary)
    }

    fn mine_into<W: std::io::Write>(
        &self,
        workspace: &dyn Workspace,
        file_id: &str,
        writer: &mut CorpusWriter<W>,
        summary: &mut AnalysisSummary,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        if let Some(progress) = progress {
            progress.set_text(file_id);
        }
        match workspace.load(file_id) {
            Ok(file) => {
                let descriptors = self.pipeline.analyze_file(&file, file_id);
                debug!("{}: {} observations", file_id, descriptors.len());
                writer.write_all(&descriptors)?;
                summary.files_analyzed += 1;
            }
            Err(e) => {
                warn!("Skipping {}: {}", file_id, e);
                summary.files_failed += 1;
            }
        }
        Ok(())
    }
}

fn checked_solution_name(workspace: &dyn Workspace) -> Result<&str> {
    let solution = workspace.solution_name();
    if solution.trim().is_empty() {
        return Err(AutoTemplateError::validation_field(
            "Solution name must not be empty",
            "solution",
        ));
    }
    Ok(solution)
}

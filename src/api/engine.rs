//! Main suggestion engine implementation.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::invocation::{
    complete_statement_triggers, offer_label, TemplateExecutor, TemplateInvocation,
};
use crate::core::aggregation::{BuildSummary, SuggestionBuilder};
use crate::core::config::AutoTemplateConfig;
use crate::core::errors::{AutoTemplateError, Result};
use crate::core::pipeline::{AnalysisSummary, CorpusAnalyzer, ProgressSink, TemplatePipeline};
use crate::detectors::scopes::ScopeParameters;
use crate::io::cache::{AutoTemplate, SuggestionCatalog};
use crate::io::data_dir::{BackgroundAnalysis, DataDirectory};
use crate::lang::common::{InsertionPoint, SourceFile, StatementId};
use crate::lang::workspace::Workspace;

/// One suggestion offered at a cursor position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    /// Scope key the suggestion was published under
    pub key: String,
    /// The published suggestion
    pub template: AutoTemplate,
    /// Parameters captured at the cursor
    pub parameters: ScopeParameters,
    /// Where the suggestion goes
    pub insertion: InsertionPoint,
    /// `Insert: ...` label
    pub label: String,
}

impl Offer {
    /// Invocation inserted on a new line
    pub fn invocation(&self) -> TemplateInvocation {
        TemplateInvocation::new(&self.template, &self.parameters, true)
    }

    /// Run the offer through `executor`
    pub fn apply(&self, executor: &mut dyn TemplateExecutor) -> Result<()> {
        executor.execute(&self.invocation(), self.insertion)
    }
}

/// Main autotemplate engine
///
/// Owns the classifier/builder registry, the data directory and the
/// suggestion catalog. Corpus analysis and suggestion builds are blocking file
/// work; [`SuggestionEngine::build_in_background`] moves the build onto the
/// tokio blocking pool.
pub struct SuggestionEngine {
    config: Arc<AutoTemplateConfig>,
    analyzer: CorpusAnalyzer,
    pipeline: Arc<TemplatePipeline>,
    catalog: Arc<SuggestionCatalog>,
}

impl SuggestionEngine {
    /// Create an engine with the standard pipeline
    pub fn new(config: AutoTemplateConfig) -> Result<Self> {
        Self::with_pipeline(config, TemplatePipeline::standard())
    }

    /// Create an engine with a custom pipeline
    pub fn with_pipeline(config: AutoTemplateConfig, pipeline: TemplatePipeline) -> Result<Self> {
        config.validate()?;
        let data_dir = DataDirectory::new(config.resolved_data_dir()?);
        data_dir.ensure_exists()?;
        info!("Using data directory {}", data_dir.root().display());

        let pipeline = Arc::new(pipeline);
        Ok(Self {
            analyzer: CorpusAnalyzer::new(pipeline.clone(), data_dir.clone()),
            catalog: Arc::new(SuggestionCatalog::new(data_dir)),
            config: Arc::new(config),
            pipeline,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &AutoTemplateConfig {
        &self.config
    }

    /// Data directory in use
    pub fn data_dir(&self) -> &DataDirectory {
        self.analyzer.data_dir()
    }

    /// Shared suggestion catalog
    pub fn catalog(&self) -> Arc<SuggestionCatalog> {
        self.catalog.clone()
    }

    /// Classifier and builder registry
    pub fn pipeline(&self) -> &TemplatePipeline {
        &self.pipeline
    }

    /// Rebuild the solution's corpus from scratch
    pub fn analyze_solution(
        &self,
        workspace: &dyn Workspace,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisSummary> {
        self.analyzer.analyze_solution(workspace, progress)
    }

    /// Re-mine the changed files of the solution
    pub fn update_files(
        &self,
        workspace: &dyn Workspace,
        changed: &[String],
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisSummary> {
        self.analyzer.update_files(workspace, changed, progress)
    }

    /// Aggregate every corpus into the published suggestions and drop the
    /// cached catalog
    pub fn build_suggestions(&self, progress: Option<&dyn ProgressSink>) -> Result<BuildSummary> {
        let summary = SuggestionBuilder::new(self.data_dir().clone(), &self.config.suggestions)
            .build(progress)?;
        self.catalog.invalidate();
        Ok(summary)
    }

    /// Run [`Self::build_suggestions`] on the blocking pool
    pub fn build_in_background(&self) -> JoinHandle<Result<BuildSummary>> {
        let data_dir = self.data_dir().clone();
        let settings = self.config.suggestions.clone();
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || {
            let summary = SuggestionBuilder::new(data_dir, &settings).build(None)?;
            catalog.invalidate();
            debug!("Background build published {} suggestions", summary.published);
            Ok(summary)
        })
    }

    /// Background-analysis marker of `solution`
    pub fn background_mode(&self, solution: &str) -> Result<Option<BackgroundAnalysis>> {
        self.data_dir().read_marker(solution)
    }

    /// Record the background-analysis choice for `solution`
    pub fn set_background_mode(&self, solution: &str, mode: BackgroundAnalysis) -> Result<()> {
        self.data_dir().write_marker(solution, mode)
    }

    /// Suggestions for the statement `statement` of `file`.
    ///
    /// Scopes are deduplicated by key, scopes without an insertion point are
    /// skipped and each template text is offered once. Computing insertion
    /// points may synthesize bodies in `file`.
    pub fn offers_at(&self, file: &mut SourceFile, statement: StatementId) -> Vec<Offer> {
        let Some(anchor) = file.statement(statement) else {
            return Vec::new();
        };
        let mut keys = HashSet::new();
        let scopes: Vec<_> = self
            .pipeline
            .scopes_for(anchor)
            .into_iter()
            .filter(|scope| keys.insert(scope.key().to_string()))
            .collect();

        let mut offered = HashSet::new();
        let mut offers = Vec::new();
        for scope in scopes {
            let Some(insertion) = scope.insert_position(file) else {
                debug!("No insertion point for scope {}", scope.key());
                continue;
            };
            for template in self.catalog.for_key(scope.key()) {
                if !offered.insert(template.template.clone()) {
                    continue;
                }
                offers.push(Offer {
                    key: scope.key().to_string(),
                    label: offer_label(&template, scope.parameters()),
                    parameters: scope.parameters().clone(),
                    insertion,
                    template,
                });
            }
        }
        offers
    }

    /// Suggestions for the first statement starting on 1-based `line`
    pub fn offers_at_line(&self, file: &mut SourceFile, line: usize) -> Result<Vec<Offer>> {
        let statement = file
            .statement_at_line(line)
            .map(|s| s.id())
            .ok_or_else(|| {
                AutoTemplateError::validation_field(
                    format!("No statement starts on line {line} of {}", file.path()),
                    "line",
                )
            })?;
        Ok(self.offers_at(file, statement))
    }

    /// Suggestions for the complete-statement gesture at byte offset `caret`.
    ///
    /// Nothing is offered unless the gesture is enabled and the caret sits in
    /// the lead-in whitespace of its line. Offers are for the statement that
    /// ends last before the caret.
    pub fn offers_at_caret(&self, file: &mut SourceFile, caret: usize) -> Vec<Offer> {
        if !complete_statement_triggers(&self.config.suggestions, file.text(), caret) {
            debug!("Complete statement does not trigger at offset {}", caret);
            return Vec::new();
        }
        match file.statement_before_offset(caret).map(|s| s.id()) {
            Some(statement) => self.offers_at(file, statement),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::invocation::BufferExecutor;
    use crate::lang::builder::{call, local, new_object, string_literal, arg, SourceFileBuilder, Stmt};
    use crate::lang::common::{MemberSymbol, QualifiedName, TypeInfo};
    use crate::lang::workspace::InMemoryWorkspace;
    use tempfile::TempDir;

    fn connection() -> QualifiedName {
        QualifiedName::new("System.Data.SqlClient", "SqlConnection")
    }

    fn open_call() -> Stmt {
        Stmt::expr(call(
            Some(local(
                "conn",
                TypeInfo::resolved("SqlConnection", connection().full_name()),
            )),
            "Open",
            Some(MemberSymbol::method("Open", connection())),
            vec![],
            TypeInfo::Unknown,
        ))
    }

    fn new_connection() -> Stmt {
        Stmt::var(
            "conn",
            new_object(connection(), vec![arg(string_literal("cs"), "connectionString")]),
        )
    }

    fn engine(dir: &TempDir) -> SuggestionEngine {
        let mut config = AutoTemplateConfig::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.suggestions.min_occurrences = 1;
        SuggestionEngine::new(config).unwrap()
    }

    #[test]
    fn analyze_build_and_offer() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut workspace = InMemoryWorkspace::new("Shop");
        for name in ["A.cs", "B.cs"] {
            workspace.add_file(
                "App",
                name,
                SourceFileBuilder::new(name)
                    .statement(new_connection())
                    .statement(open_call())
                    .finish(),
            );
        }

        engine.analyze_solution(&workspace, None).unwrap();
        let summary = engine.build_suggestions(None).unwrap();
        assert!(summary.published >= 1);

        let mut file = SourceFileBuilder::new("C.cs").statement(new_connection()).finish();
        let offers = engine.offers_at_line(&mut file, 3).unwrap();
        let open = offers
            .iter()
            .find(|o| o.template.template == "$VariableName$.Open();")
            .unwrap();
        assert_eq!(open.label, "Insert: conn.Open();");
        assert_eq!(open.invocation().text, "\nconn.Open();");

        let mut executor = BufferExecutor::new(file.text());
        open.apply(&mut executor).unwrap();
        assert!(executor.text().contains("var conn = new SqlConnection(\"cs\");\nconn.Open();"));
    }

    #[test]
    fn complete_statement_offers_for_the_previous_statement() {
        let dir = TempDir::new().unwrap();
        let mut workspace = InMemoryWorkspace::new("Shop");
        workspace.add_file(
            "App",
            "A.cs",
            SourceFileBuilder::new("A.cs")
                .statement(new_connection())
                .statement(open_call())
                .finish(),
        );
        let enabled = engine(&dir);
        enabled.analyze_solution(&workspace, None).unwrap();
        enabled.build_suggestions(None).unwrap();

        let mut file = SourceFileBuilder::new("C.cs").statement(new_connection()).finish();
        let next_line = file.text().find("\n}").unwrap() + 1;
        let offers = enabled.offers_at_caret(&mut file, next_line);
        assert!(offers
            .iter()
            .any(|o| o.template.template == "$VariableName$.Open();"));

        let inside_code = file.text().find("conn").unwrap();
        assert!(enabled.offers_at_caret(&mut file, inside_code).is_empty());

        let mut config = enabled.config().clone();
        config.suggestions.use_complete_statement = false;
        let disabled = SuggestionEngine::new(config).unwrap();
        assert!(disabled.offers_at_caret(&mut file, next_line).is_empty());
    }

    #[test]
    fn offers_are_empty_without_suggestions() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut file = SourceFileBuilder::new("C.cs").statement(new_connection()).finish();
        assert!(engine.offers_at_line(&mut file, 3).unwrap().is_empty());
        assert!(engine.offers_at_line(&mut file, 40).is_err());
    }

    #[test]
    fn background_marker_round_trip() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert_eq!(engine.background_mode("Shop").unwrap(), None);
        engine
            .set_background_mode("Shop", BackgroundAnalysis::Disabled)
            .unwrap();
        assert_eq!(
            engine.background_mode("Shop").unwrap(),
            Some(BackgroundAnalysis::Disabled)
        );
    }

    #[tokio::test]
    async fn background_build_invalidates_catalog() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let catalog = engine.catalog();
        assert!(catalog.templates().is_empty());
        assert!(catalog.is_loaded());

        let summary = engine.build_in_background().await.unwrap().unwrap();
        assert_eq!(summary.published, 0);
        assert!(!catalog.is_loaded());
    }
}

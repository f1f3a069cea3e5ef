//! Configuration types and management for autotemplate-rs.
//!
//! Settings are grouped the way the tool uses them: thresholds that shape the
//! published suggestions, knobs for source discovery and background analysis,
//! and where the corpus and suggestion files are stored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::{AutoTemplateError, Result, ResultExt};

mod validation;

pub use validation::*;

/// Name of the folder created under the platform data directory.
pub const DATA_FOLDER_NAME: &str = "PredictiveCodeSuggestions";

/// Main configuration for the suggestion engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AutoTemplateConfig {
    /// Thresholds applied when publishing suggestions
    #[serde(default)]
    pub suggestions: SuggestionSettings,

    /// Source discovery and background analysis settings
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Storage locations
    #[serde(default)]
    pub storage: StorageSettings,
}

impl AutoTemplateConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AutoTemplateError::io(format!("Failed to read config file: {}", path.display()), e)
        })?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|e| {
            AutoTemplateError::io(
                format!("Failed to write config file: {}", path.display()),
                e,
            )
        })
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        self.suggestions.validate()?;
        self.analysis.validate()?;
        Ok(())
    }

    /// Directory holding corpus files, markers and the published suggestions.
    ///
    /// Falls back to `<local data dir>/PredictiveCodeSuggestions` when no
    /// explicit directory is configured.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }

        dirs::data_local_dir()
            .map(|base| base.join(DATA_FOLDER_NAME))
            .ok_or_else(|| {
                AutoTemplateError::config_field(
                    "No local data directory is available on this platform",
                    "storage.data_dir",
                )
            })
    }
}

/// Thresholds controlling which aggregated templates are published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSettings {
    /// Maximum number of suggestions kept per scope key
    pub max_suggestions: usize,

    /// Minimum number of occurrences before a template is published
    pub min_occurrences: usize,

    /// Minimum share of the scope's observations, in percent (0-100)
    pub min_percentage: usize,

    /// Number of file saves that arms the background rebuild timer
    pub file_saves_before_rebuild: usize,

    /// Offer suggestions from the "complete statement" gesture
    pub use_complete_statement: bool,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            max_suggestions: 7,
            min_occurrences: 3,
            min_percentage: 20,
            file_saves_before_rebuild: 40,
            use_complete_statement: true,
        }
    }
}

impl SuggestionSettings {
    /// Validate suggestion thresholds
    pub fn validate(&self) -> Result<()> {
        validate_positive_usize(self.min_occurrences, "suggestions.min_occurrences")?;
        validate_bounded_usize(self.min_percentage, 0, 100, "suggestions.min_percentage")?;
        validate_positive_usize(
            self.file_saves_before_rebuild,
            "suggestions.file_saves_before_rebuild",
        )?;
        Ok(())
    }
}

/// Source discovery and background analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Quiet period after the save threshold before an update runs
    pub quiet_period_ms: u64,

    /// File extensions (without dot) treated as source files
    pub file_extensions: Vec<String>,

    /// Directory names never descended into
    pub exclude_dirs: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            quiet_period_ms: 1000,
            file_extensions: vec!["cs".to_string()],
            exclude_dirs: vec![
                "bin".to_string(),
                "obj".to_string(),
                ".git".to_string(),
                ".vs".to_string(),
            ],
        }
    }
}

impl AnalysisSettings {
    /// Validate analysis settings
    pub fn validate(&self) -> Result<()> {
        validate_positive_u64(self.quiet_period_ms, "analysis.quiet_period_ms")?;

        if self.file_extensions.is_empty() {
            return Err(AutoTemplateError::validation_field(
                "At least one source file extension is required",
                "analysis.file_extensions",
            ));
        }

        if let Some(ext) = self.file_extensions.iter().find(|ext| ext.starts_with('.')) {
            return Err(AutoTemplateError::validation_field(
                format!("File extension '{ext}' must be given without a leading dot"),
                "analysis.file_extensions",
            ));
        }

        Ok(())
    }

    /// Whether `extension` is one of the configured source extensions.
    pub fn is_source_extension(&self, extension: &str) -> bool {
        self.file_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// Whether a directory with this name is skipped during discovery.
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude_dirs.iter().any(|dir| dir == name)
    }
}

/// Storage locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    /// Explicit data directory; the platform default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests;

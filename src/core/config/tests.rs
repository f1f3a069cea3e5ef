use super::*;
use crate::core::errors::AutoTemplateError;
use tempfile::TempDir;

fn expect_validation_error<T: std::fmt::Debug>(result: Result<T>) -> AutoTemplateError {
    result.expect_err("expected validation failure")
}

#[test]
fn default_configs_validate_successfully() {
    AutoTemplateConfig::default()
        .validate()
        .expect("autotemplate default");
    SuggestionSettings::default()
        .validate()
        .expect("suggestions default");
    AnalysisSettings::default()
        .validate()
        .expect("analysis default");
}

#[test]
fn defaults_match_documented_values() {
    let settings = SuggestionSettings::default();
    assert_eq!(settings.max_suggestions, 7);
    assert_eq!(settings.min_occurrences, 3);
    assert_eq!(settings.min_percentage, 20);
    assert_eq!(settings.file_saves_before_rebuild, 40);
    assert!(settings.use_complete_statement);

    let analysis = AnalysisSettings::default();
    assert_eq!(analysis.quiet_period_ms, 1000);
    assert_eq!(analysis.file_extensions, vec!["cs".to_string()]);
}

#[test]
fn min_percentage_above_hundred_is_rejected() {
    let mut settings = SuggestionSettings::default();
    settings.min_percentage = 101;
    let err = expect_validation_error(settings.validate());
    assert!(matches!(err, AutoTemplateError::Validation { .. }));
    assert!(
        format!("{err}").contains("min_percentage"),
        "unexpected error message: {err}"
    );
}

#[test]
fn zero_max_suggestions_is_accepted_and_clamped_later() {
    let mut settings = SuggestionSettings::default();
    settings.max_suggestions = 0;
    settings.validate().expect("zero max is clamped by the aggregator");
}

#[test]
fn extensions_with_leading_dot_are_rejected() {
    let mut analysis = AnalysisSettings::default();
    analysis.file_extensions = vec![".cs".to_string()];
    let err = expect_validation_error(analysis.validate());
    assert!(format!("{err}").contains("leading dot"));
}

#[test]
fn source_extension_match_ignores_case() {
    let analysis = AnalysisSettings::default();
    assert!(analysis.is_source_extension("cs"));
    assert!(analysis.is_source_extension("CS"));
    assert!(!analysis.is_source_extension("vb"));
    assert!(analysis.is_excluded_dir("obj"));
    assert!(!analysis.is_excluded_dir("src"));
}

#[test]
fn yaml_round_trip_preserves_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("autotemplate.yml");

    let mut config = AutoTemplateConfig::default();
    config.suggestions.min_occurrences = 5;
    config.storage.data_dir = Some(dir.path().join("data"));
    config.to_yaml_file(&path).unwrap();

    let loaded = AutoTemplateConfig::from_yaml_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn partial_yaml_falls_back_to_section_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.yml");
    std::fs::write(
        &path,
        "suggestions:\n  max_suggestions: 3\n  min_occurrences: 2\n  min_percentage: 10\n  file_saves_before_rebuild: 5\n  use_complete_statement: false\n",
    )
    .unwrap();

    let loaded = AutoTemplateConfig::from_yaml_file(&path).unwrap();
    assert_eq!(loaded.suggestions.max_suggestions, 3);
    assert!(!loaded.suggestions.use_complete_statement);
    assert_eq!(loaded.analysis, AnalysisSettings::default());
    assert!(loaded.storage.data_dir.is_none());
}

#[test]
fn missing_config_file_reports_io_error() {
    let err = AutoTemplateConfig::from_yaml_file("/definitely/not/here.yml").unwrap_err();
    assert!(matches!(err, AutoTemplateError::Io { .. }));
}

#[test]
fn explicit_data_dir_wins_over_platform_default() {
    let mut config = AutoTemplateConfig::default();
    config.storage.data_dir = Some(PathBuf::from("/tmp/suggestions"));
    assert_eq!(
        config.resolved_data_dir().unwrap(),
        PathBuf::from("/tmp/suggestions")
    );
}

//! Suggestion aggregation.
//!
//! Every corpus file in the data directory is loaded into one flat list of
//! observations, grouped by scope key and then by template text. Each group
//! becomes a [`Record`] whose variable maps are merged with
//! [`merge_variables`]; the records of a key are filtered by the occurrence
//! and percentage thresholds, ranked by count and capped, then published to
//! the suggestions file.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::SuggestionSettings;
use crate::core::errors::Result;
use crate::core::pipeline::ProgressSink;
use crate::detectors::templates::{StatementDescriptor, TemplateVariables};
use crate::io::cache::AutoTemplate;
use crate::io::corpus::read_corpus_lenient;
use crate::io::data_dir::DataDirectory;
use crate::io::records::{encode_variables, RecordWriter};

/// Prefix marking a variable value as a list of constant choices.
pub const CONSTANT_LIST_PREFIX: &str = "c:";

/// Suggestion function for a placeholder the user fills in.
pub const COMPLETE_SMART: &str = "completeSmart()";

const PROGRESS_INTERVAL: usize = 25;

/// All observations of one `(key, template)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Scope key
    pub key: String,
    /// Template text
    pub template: String,
    /// Number of observations
    pub count: usize,
    /// Merged variables
    pub variables: TemplateVariables,
}

impl Record {
    fn first(observation: &StatementDescriptor) -> Self {
        Self {
            key: observation.key.clone(),
            template: observation.template.clone(),
            count: 0,
            variables: observation.variables.clone(),
        }
    }
}

/// Merge an observation's variables into a record's.
///
/// A new name is inserted. Two constant lists are unioned. Any other
/// disagreement turns the value into `""`, which asks the user. Once a value
/// has been downgraded it never becomes a list again, so the outcome depends
/// on which value was seen first.
pub fn merge_variables(incoming: &TemplateVariables, current: &mut TemplateVariables) {
    for (name, value) in incoming {
        let Some(existing) = current.get_mut(name) else {
            current.insert(name.clone(), value.clone());
            continue;
        };

        match (
            existing.strip_prefix(CONSTANT_LIST_PREFIX),
            value.strip_prefix(CONSTANT_LIST_PREFIX),
        ) {
            (Some(choices), Some(choice)) => {
                if !choices.split(',').any(|known| known == choice) {
                    existing.push(',');
                    existing.push_str(choice);
                }
            }
            (Some(_), None) => existing.clear(),
            _ => {
                if existing != value {
                    existing.clear();
                }
            }
        }
    }
}

/// Render a merged value as the suggestion function published for it.
pub fn publish_value(value: &str) -> String {
    if value.is_empty() {
        COMPLETE_SMART.to_string()
    } else if let Some(choices) = value.strip_prefix(CONSTANT_LIST_PREFIX) {
        format!("list(\"{choices}\")")
    } else {
        value.to_string()
    }
}

/// Publication thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Cap on suggestions per key, at least 1
    pub max_suggestions: usize,
    /// Minimum observations of a template
    pub min_occurrences: usize,
    /// Minimum share of the key's observations, in percent
    pub min_percentage: usize,
}

impl Thresholds {
    /// Thresholds with `max_suggestions` clamped to at least one
    pub fn new(max_suggestions: usize, min_occurrences: usize, min_percentage: usize) -> Self {
        Self {
            max_suggestions: max_suggestions.max(1),
            min_occurrences,
            min_percentage,
        }
    }

    /// Whether a record of `count` out of `total` observations is published
    pub fn admits(&self, count: usize, total: usize) -> bool {
        total > 0 && count >= self.min_occurrences && count * 100 >= self.min_percentage * total
    }
}

impl From<&SuggestionSettings> for Thresholds {
    fn from(settings: &SuggestionSettings) -> Self {
        Self::new(
            settings.max_suggestions,
            settings.min_occurrences,
            settings.min_percentage,
        )
    }
}

/// Group the observations of a single key into records, in template order.
pub fn group_records(observations: &mut [StatementDescriptor]) -> Vec<Record> {
    observations.sort_by(|a, b| a.template.cmp(&b.template));

    let mut records: Vec<Record> = Vec::new();
    for observation in observations.iter() {
        match records.last_mut() {
            Some(current) if current.template == observation.template => {
                merge_variables(&observation.variables, &mut current.variables);
                current.count += 1;
            }
            _ => {
                let mut record = Record::first(observation);
                record.count = 1;
                records.push(record);
            }
        }
    }
    records
}

/// Filter, rank and cap the records of one key.
pub fn select(records: Vec<Record>, thresholds: &Thresholds) -> Vec<AutoTemplate> {
    let total: usize = records.iter().map(|record| record.count).sum();

    let mut admitted: Vec<Record> = records
        .into_iter()
        .filter(|record| thresholds.admits(record.count, total))
        .collect();
    admitted.sort_by_key(|record| Reverse(record.count));
    admitted.truncate(thresholds.max_suggestions);

    admitted
        .into_iter()
        .map(|record| AutoTemplate {
            percentage: record.count * 100 / total,
            count: record.count,
            variables: record
                .variables
                .iter()
                .map(|(name, value)| (name.clone(), publish_value(value)))
                .collect(),
            key: record.key,
            template: record.template,
        })
        .collect()
}

/// Aggregate observations into published suggestions, ordered by key.
pub fn aggregate(
    mut observations: Vec<StatementDescriptor>,
    thresholds: &Thresholds,
    progress: Option<&dyn ProgressSink>,
) -> Vec<AutoTemplate> {
    observations.sort_by(|a, b| a.key.cmp(&b.key));
    let total = observations.len();

    let mut published = Vec::new();
    let mut start = 0;
    while start < total {
        let key = observations[start].key.clone();
        let end = observations[start..]
            .iter()
            .position(|o| o.key != key)
            .map(|offset| start + offset)
            .unwrap_or(total);

        if let Some(progress) = progress {
            for index in start..end {
                if index % PROGRESS_INTERVAL == 0 || index + 1 == total {
                    progress.set_text(&format!("{index} of {total}"));
                }
            }
        }

        let records = group_records(&mut observations[start..end]);
        published.extend(select(records, thresholds));
        start = end;
    }
    published
}

/// Outcome of a suggestion build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Corpus files read
    pub data_files: usize,
    /// Observations loaded
    pub observations: usize,
    /// Suggestions published
    pub published: usize,
}

/// Builds the published suggestions file from every corpus in a data directory.
#[derive(Debug, Clone)]
pub struct SuggestionBuilder {
    data_dir: DataDirectory,
    thresholds: Thresholds,
}

impl SuggestionBuilder {
    /// Builder over `data_dir` with thresholds from `settings`
    pub fn new(data_dir: DataDirectory, settings: &SuggestionSettings) -> Self {
        Self {
            data_dir,
            thresholds: Thresholds::from(settings),
        }
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Load every corpus observation. Unreadable files are skipped.
    pub fn load_observations(
        &self,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<(usize, Vec<StatementDescriptor>)> {
        let files = self.data_dir.corpus_files()?;
        let mut observations = Vec::new();
        for path in &files {
            if let Some(progress) = progress {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                progress.set_text(&name);
            }
            let loaded = read_corpus_lenient(path);
            debug!("Loaded {} observations from {}", loaded.len(), path.display());
            observations.extend(loaded);
        }
        Ok((files.len(), observations))
    }

    /// Aggregate and publish the suggestions file
    pub fn build(&self, progress: Option<&dyn ProgressSink>) -> Result<BuildSummary> {
        if let Some(progress) = progress {
            progress.set_task("Loading data files...");
            progress.set_text("");
        }
        let (data_files, observations) = self.load_observations(progress)?;
        let observation_count = observations.len();

        if let Some(progress) = progress {
            progress.set_task("Building suggestions...");
            progress.set_text(&format!("0 of {observation_count}"));
        }
        let published = aggregate(observations, &self.thresholds, progress);

        self.data_dir.ensure_exists()?;
        let temp = self.data_dir.suggestions_temp_path();
        let mut writer = RecordWriter::create(&temp)?;
        for suggestion in &published {
            let count = suggestion.count.to_string();
            let percentage = suggestion.percentage.to_string();
            let variables = encode_variables(&suggestion.variables);
            writer.write_record(
                &[
                    ("k", suggestion.key.as_str()),
                    ("c", count.as_str()),
                    ("v", variables.as_str()),
                    ("p", percentage.as_str()),
                ],
                &["v"],
                &suggestion.template,
            )?;
        }
        writer.finish()?;
        self.data_dir
            .publish(&temp, &self.data_dir.suggestions_path())?;

        info!(
            "Published {} suggestions from {} observations in {} data files",
            published.len(),
            observation_count,
            data_files
        );
        Ok(BuildSummary {
            data_files,
            observations: observation_count,
            published: published.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVariables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn observation(key: &str, template: &str, variables: &[(&str, &str)]) -> StatementDescriptor {
        StatementDescriptor::from_parts(key, "<App>/a.cs", template, vars(variables))
    }

    fn repeated(key: &str, template: &str, times: usize) -> Vec<StatementDescriptor> {
        (0..times).map(|_| observation(key, template, &[])).collect()
    }

    #[test]
    fn differing_plain_values_downgrade() {
        let mut current = vars(&[("x", "foo")]);
        merge_variables(&vars(&[("x", "bar")]), &mut current);
        assert_eq!(current, vars(&[("x", "")]));
    }

    #[test]
    fn constant_lists_union() {
        let mut current = vars(&[("x", "c:foo")]);
        merge_variables(&vars(&[("x", "c:bar")]), &mut current);
        merge_variables(&vars(&[("x", "c:foo")]), &mut current);
        assert_eq!(current, vars(&[("x", "c:foo,bar")]));
    }

    #[test]
    fn new_names_are_inserted_and_equal_values_kept() {
        let mut current = vars(&[("x", "same")]);
        merge_variables(&vars(&[("x", "same"), ("y", "c:1")]), &mut current);
        assert_eq!(current, vars(&[("x", "same"), ("y", "c:1")]));
    }

    #[test]
    fn downgrade_depends_on_first_value() {
        // A list meeting a plain value is downgraded for good.
        let mut current = vars(&[("x", "c:foo")]);
        merge_variables(&vars(&[("x", "plain")]), &mut current);
        merge_variables(&vars(&[("x", "c:bar")]), &mut current);
        assert_eq!(current, vars(&[("x", "")]));

        // A plain value met by a list is downgraded as well.
        let mut current = vars(&[("x", "plain")]);
        merge_variables(&vars(&[("x", "c:foo")]), &mut current);
        assert_eq!(current, vars(&[("x", "")]));
    }

    #[test]
    fn published_values_become_functions() {
        assert_eq!(publish_value(""), COMPLETE_SMART);
        assert_eq!(publish_value("c:1,2"), "list(\"1,2\")");
        assert_eq!(
            publish_value("suggestVariableName()"),
            "suggestVariableName()"
        );
    }

    #[test]
    fn threshold_boundaries() {
        let thresholds = Thresholds::new(7, 3, 20);
        // count 2 of 10 meets 20% but not the occurrence floor
        assert!(!thresholds.admits(2, 10));
        assert!(thresholds.admits(3, 10));
        // exactly 20%
        assert!(thresholds.admits(3, 15));
        // just below 20%
        assert!(!thresholds.admits(3, 16));
        assert!(!thresholds.admits(0, 0));
    }

    #[test]
    fn max_suggestions_is_clamped() {
        assert_eq!(Thresholds::new(0, 1, 0).max_suggestions, 1);
    }

    #[test]
    fn ranks_by_count_and_caps() {
        let mut observations = repeated("k", "a();", 3);
        observations.extend(repeated("k", "b();", 5));
        observations.extend(repeated("k", "c();", 4));
        observations.extend(repeated("other", "d();", 1));

        let published = aggregate(observations, &Thresholds::new(2, 1, 0), None);
        let summary: Vec<(&str, &str, usize, usize)> = published
            .iter()
            .map(|t| (t.key.as_str(), t.template.as_str(), t.count, t.percentage))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("k", "b();", 5, 41),
                ("k", "c();", 4, 33),
                ("other", "d();", 1, 100),
            ]
        );
    }

    #[test]
    fn merged_variables_are_published() {
        let observations = vec![
            observation("k", "f($a$, $b$);", &[("a", "c:1"), ("b", "x")]),
            observation("k", "f($a$, $b$);", &[("a", "c:2"), ("b", "y")]),
            observation("k", "f($a$, $b$);", &[("a", "c:1"), ("b", "x")]),
        ];

        let published = aggregate(observations, &Thresholds::new(7, 3, 20), None);
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].variables,
            vars(&[("a", "list(\"1,2\")"), ("b", COMPLETE_SMART)])
        );
    }

    #[derive(Default)]
    struct Recorder(parking_lot::Mutex<Vec<String>>);

    impl ProgressSink for Recorder {
        fn set_task(&self, task: &str) {
            self.0.lock().push(format!("task:{task}"));
        }

        fn set_text(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    #[test]
    fn progress_every_25_records_and_last() {
        let recorder = Recorder::default();
        let observations = repeated("k", "a();", 30);
        aggregate(observations, &Thresholds::new(7, 3, 20), Some(&recorder));
        assert_eq!(
            *recorder.0.lock(),
            vec!["0 of 30".to_string(), "25 of 30".to_string(), "29 of 30".to_string()]
        );
    }

    #[test]
    fn build_publishes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        let mut writer =
            crate::io::corpus::CorpusWriter::create(&data.corpus_path("App")).unwrap();
        writer.write_all(&repeated("k", "a();", 4)).unwrap();
        writer.finish().unwrap();

        let builder = SuggestionBuilder::new(data.clone(), &SuggestionSettings::default());
        let summary = builder.build(None).unwrap();
        assert_eq!(
            summary,
            BuildSummary {
                data_files: 1,
                observations: 4,
                published: 1
            }
        );

        let xml = std::fs::read_to_string(data.suggestions_path()).unwrap();
        assert!(xml.contains(r#"<i k="k" c="4" p="100">a();</i>"#), "{xml}");
        assert!(!data.suggestions_temp_path().exists());

        // The published file is not aggregated again.
        assert_eq!(builder.build(None).unwrap().data_files, 1);
    }
}

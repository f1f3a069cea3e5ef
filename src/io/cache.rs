//! Lazily loaded catalog of published suggestions.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detectors::templates::TemplateVariables;
use crate::io::data_dir::DataDirectory;
use crate::io::records::{decode_variables, read_records_file, XmlRecord};

/// A published suggestion for one scope key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTemplate {
    /// Scope key
    pub key: String,
    /// Template text
    pub template: String,
    /// Number of observations
    pub count: usize,
    /// Share of the key's observations, truncated percent
    pub percentage: usize,
    /// Placeholder suggestion functions
    pub variables: TemplateVariables,
}

impl From<XmlRecord> for AutoTemplate {
    fn from(record: XmlRecord) -> Self {
        Self {
            key: record.attribute("k").to_string(),
            count: record.int_attribute("c", 0),
            percentage: record.int_attribute("p", 0),
            variables: decode_variables(record.attribute("v")),
            template: record.text,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    loaded: bool,
    templates: Arc<Vec<AutoTemplate>>,
}

/// In-memory view of the published suggestions file.
///
/// The file is read on first access and kept until [`invalidate`] is called.
/// A missing or corrupt file yields an empty catalog.
///
/// [`invalidate`]: SuggestionCatalog::invalidate
#[derive(Debug)]
pub struct SuggestionCatalog {
    data_dir: DataDirectory,
    state: RwLock<CatalogState>,
}

impl SuggestionCatalog {
    /// Catalog over the suggestions file of `data_dir`
    pub fn new(data_dir: DataDirectory) -> Self {
        Self {
            data_dir,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// All published suggestions, loading them if needed
    pub fn templates(&self) -> Arc<Vec<AutoTemplate>> {
        {
            let state = self.state.read();
            if state.loaded {
                return Arc::clone(&state.templates);
            }
        }

        let mut state = self.state.write();
        if !state.loaded {
            state.templates = Arc::new(self.load());
            state.loaded = true;
        }
        Arc::clone(&state.templates)
    }

    /// Suggestions published for `key`, in file order
    pub fn for_key(&self, key: &str) -> Vec<AutoTemplate> {
        self.templates()
            .iter()
            .filter(|template| template.key == key)
            .cloned()
            .collect()
    }

    /// Drop the loaded suggestions; the next access reloads the file
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.loaded = false;
        state.templates = Arc::new(Vec::new());
    }

    /// Whether the file has been loaded since the last invalidation
    pub fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    fn load(&self) -> Vec<AutoTemplate> {
        let path = self.data_dir.suggestions_path();
        let _guard = self.data_dir.lock();

        if !path.exists() {
            debug!("No published suggestions at {}", path.display());
            return Vec::new();
        }

        match read_records_file(&path) {
            Ok(records) => {
                let templates: Vec<AutoTemplate> =
                    records.into_iter().map(AutoTemplate::from).collect();
                debug!("Loaded {} suggestions", templates.len());
                templates
            }
            Err(e) => {
                warn!("Ignoring unreadable suggestions file {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PUBLISHED: &str = r#"<i>
  <i k="After variable of type &quot;System.String&quot;" c="4" v="name|completeSmart()" p="80">var $name$ = $VariableName$.Trim();</i>
  <i k="If expression &quot;Settings.Enabled&quot;" c="3" p="100">return;</i>
</i>"#;

    #[test]
    fn loads_lazily_and_reloads_after_invalidate() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        let catalog = SuggestionCatalog::new(data.clone());

        assert!(!catalog.is_loaded());
        assert!(catalog.templates().is_empty(), "missing file gives empty catalog");
        assert!(catalog.is_loaded());

        fs::write(data.suggestions_path(), PUBLISHED).unwrap();
        assert!(catalog.templates().is_empty(), "stale until invalidated");

        catalog.invalidate();
        assert!(!catalog.is_loaded());
        let templates = catalog.templates();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].count, 4);
        assert_eq!(templates[0].percentage, 80);
        assert_eq!(
            templates[0].variables.get("name").map(String::as_str),
            Some("completeSmart()")
        );
        assert!(templates[1].variables.is_empty());
    }

    #[test]
    fn filters_by_key() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        fs::write(data.suggestions_path(), PUBLISHED).unwrap();
        let catalog = SuggestionCatalog::new(data);

        let found = catalog.for_key("If expression \"Settings.Enabled\"");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].template, "return;");
        assert!(catalog.for_key("unknown").is_empty());
    }

    #[test]
    fn corrupt_file_gives_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let data = DataDirectory::new(dir.path());
        fs::write(data.suggestions_path(), "<i><i k=\"x\">broken").unwrap();

        let catalog = SuggestionCatalog::new(data);
        assert!(catalog.templates().is_empty());
        assert!(catalog.is_loaded());
    }
}

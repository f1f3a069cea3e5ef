//! Solutions, projects and file identifiers.
//!
//! A [`Workspace`] lists the projects of a solution and loads source models by
//! file identifier. Identifiers are the project name in angle brackets
//! followed by the `/`-separated path relative to the project root
//! (`<Shop.Data>/Orders/Repository.cs`), so they stay stable across
//! incremental updates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::config::AnalysisSettings;
use crate::core::errors::{AutoTemplateError, Result};
use crate::core::file_utils::{to_forward_slashes, FileReader};
use crate::lang::common::SourceFile;
use crate::lang::csharp::CSharpAdapter;
use crate::lang::symbols::SymbolIndex;

const PROJECT_EXTENSION: &str = "csproj";

/// A project and the identifiers of its source files, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFiles {
    /// Project name
    pub name: String,
    /// File identifiers
    pub file_ids: Vec<String>,
}

/// Source of projects and parsed files for the corpus analyzer.
pub trait Workspace: Send + Sync {
    /// Name of the solution; names the corpus file
    fn solution_name(&self) -> &str;

    /// Projects with their source files
    fn projects(&self) -> Result<Vec<ProjectFiles>>;

    /// Parse the file with the given identifier
    fn load(&self, file_id: &str) -> Result<SourceFile>;

    /// Pick up projects, files and declarations changed since the last pass.
    /// Called before every full or incremental analysis.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Every file identifier of the solution
    fn file_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .projects()?
            .into_iter()
            .flat_map(|project| project.file_ids)
            .collect())
    }
}

/// Identifier of `relative` inside `project`.
pub fn file_identifier(project: &str, relative: &str) -> String {
    format!("<{}>/{}", project, relative.trim_start_matches('/'))
}

/// Split an identifier into project name and relative path.
pub fn split_file_identifier(file_id: &str) -> Option<(&str, &str)> {
    let rest = file_id.strip_prefix('<')?;
    let (project, relative) = rest.split_once(">/")?;
    Some((project, relative))
}

/// Workspace over pre-built source models.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkspace {
    solution: String,
    projects: IndexMap<String, Vec<String>>,
    files: IndexMap<String, Option<SourceFile>>,
}

impl InMemoryWorkspace {
    /// Empty solution called `solution`
    pub fn new(solution: impl Into<String>) -> Self {
        Self {
            solution: solution.into(),
            ..Self::default()
        }
    }

    /// Add or replace a file
    pub fn add_file(&mut self, project: &str, relative: &str, file: SourceFile) -> String {
        self.insert(project, relative, Some(file))
    }

    /// Register a file that fails to load
    pub fn add_missing_file(&mut self, project: &str, relative: &str) -> String {
        self.insert(project, relative, None)
    }

    /// Forget a file
    pub fn remove_file(&mut self, file_id: &str) {
        self.files.shift_remove(file_id);
        for ids in self.projects.values_mut() {
            ids.retain(|id| id != file_id);
        }
    }

    fn insert(&mut self, project: &str, relative: &str, file: Option<SourceFile>) -> String {
        let file_id = file_identifier(project, relative);
        let ids = self.projects.entry(project.to_string()).or_default();
        if !ids.contains(&file_id) {
            ids.push(file_id.clone());
        }
        self.files.insert(file_id.clone(), file);
        file_id
    }
}

impl Workspace for InMemoryWorkspace {
    fn solution_name(&self) -> &str {
        &self.solution
    }

    fn projects(&self) -> Result<Vec<ProjectFiles>> {
        Ok(self
            .projects
            .iter()
            .map(|(name, ids)| ProjectFiles {
                name: name.clone(),
                file_ids: ids.clone(),
            })
            .collect())
    }

    fn load(&self, file_id: &str) -> Result<SourceFile> {
        match self.files.get(file_id) {
            Some(Some(file)) => Ok(file.clone()),
            Some(None) => Err(AutoTemplateError::parse_in_file(
                "csharp",
                "Source unavailable",
                file_id,
            )),
            None => Err(AutoTemplateError::validation_field(
                format!("Unknown file '{file_id}'"),
                "file_id",
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct ProjectRoot {
    name: String,
    dir: PathBuf,
}

/// Solution directory on disk.
///
/// Every directory holding a `*.csproj` is a project named after the project
/// file; without any, the root directory is the single project. Source files
/// are discovered on every [`Workspace::projects`] call. Projects and the
/// declaration index are rebuilt by [`Workspace::refresh`], so an incremental
/// update sees the same types a fresh open would.
pub struct FsWorkspace {
    root: PathBuf,
    solution: String,
    settings: AnalysisSettings,
    projects: RwLock<Vec<ProjectRoot>>,
    symbols: RwLock<Option<Arc<SymbolIndex>>>,
}

impl FsWorkspace {
    /// Open the solution rooted at `root`
    pub fn open(root: impl AsRef<Path>, settings: &AnalysisSettings) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| AutoTemplateError::io(format!("Cannot open solution {}", root.display()), e))?;
        if !root.is_dir() {
            return Err(AutoTemplateError::validation_field(
                format!("{} is not a directory", root.display()),
                "root",
            ));
        }

        let solution = directory_name(&root);
        let projects = discover_projects(&root, settings)?;
        info!(
            "Opened solution {} with {} project(s)",
            solution,
            projects.len()
        );

        Ok(Self {
            root,
            solution,
            settings: settings.clone(),
            projects: RwLock::new(projects),
            symbols: RwLock::new(None),
        })
    }

    /// Override the solution name derived from the root directory
    pub fn with_solution_name(mut self, name: impl Into<String>) -> Self {
        self.solution = name.into();
        self
    }

    /// Solution root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project names in discovery order
    pub fn project_names(&self) -> Vec<String> {
        self.projects.read().iter().map(|p| p.name.clone()).collect()
    }

    /// Identifier of a file on disk, if it lies inside a project
    pub fn file_id_for_path(&self, path: &Path) -> Option<String> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let absolute = absolute.canonicalize().unwrap_or(absolute);

        // Innermost project wins
        let projects = self.projects.read();
        projects
            .iter()
            .filter_map(|project| {
                absolute
                    .strip_prefix(&project.dir)
                    .ok()
                    .map(|relative| (project, relative))
            })
            .max_by_key(|(project, _)| project.dir.components().count())
            .map(|(project, relative)| file_identifier(&project.name, &to_forward_slashes(relative)))
    }

    /// Path on disk of a file identifier
    pub fn path_for_id(&self, file_id: &str) -> Option<PathBuf> {
        let (project, relative) = split_file_identifier(file_id)?;
        let projects = self.projects.read();
        let project = projects.iter().find(|p| p.name == project)?;
        Some(project.dir.join(relative))
    }

    /// Declaration index over every source file, built on first use and
    /// after every refresh
    pub fn symbols(&self) -> Result<Arc<SymbolIndex>> {
        if let Some(index) = self.symbols.read().as_ref() {
            return Ok(Arc::clone(index));
        }
        let mut slot = self.symbols.write();
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(self.build_symbols()?);
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    fn build_symbols(&self) -> Result<SymbolIndex> {
        let mut adapter = CSharpAdapter::new()?;
        let mut index = SymbolIndex::new();
        let projects = self.projects.read();
        for project in projects.iter() {
            for path in source_files(project, &projects, &self.settings) {
                let declarations = FileReader::read_to_string(&path)
                    .and_then(|text| adapter.declarations(&text));
                match declarations {
                    Ok(declarations) => index.extend(declarations),
                    Err(e) => warn!("Skipping declarations of {}: {}", path.display(), e),
                }
            }
        }
        debug!("Indexed {} declared types", index.len());
        Ok(index)
    }
}

fn source_files(
    project: &ProjectRoot,
    projects: &[ProjectRoot],
    settings: &AnalysisSettings,
) -> Vec<PathBuf> {
    let walker = WalkDir::new(&project.dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let excluded = entry
                .file_name()
                .to_str()
                .map(|name| settings.is_excluded_dir(name))
                .unwrap_or(false);
            let nested_project = projects.iter().any(|p| p.dir == entry.path());
            !excluded && !nested_project
        });

    walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| settings.is_source_extension(ext))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

impl Workspace for FsWorkspace {
    fn solution_name(&self) -> &str {
        &self.solution
    }

    fn projects(&self) -> Result<Vec<ProjectFiles>> {
        let projects = self.projects.read();
        Ok(projects
            .iter()
            .map(|project| ProjectFiles {
                name: project.name.clone(),
                file_ids: source_files(project, &projects, &self.settings)
                    .iter()
                    .filter_map(|path| path.strip_prefix(&project.dir).ok())
                    .map(|relative| file_identifier(&project.name, &to_forward_slashes(relative)))
                    .collect(),
            })
            .collect())
    }

    fn load(&self, file_id: &str) -> Result<SourceFile> {
        let path = self.path_for_id(file_id).ok_or_else(|| {
            AutoTemplateError::validation_field(format!("Unknown file '{file_id}'"), "file_id")
        })?;
        let text = FileReader::read_to_string(&path)?;
        let symbols = self.symbols()?;
        CSharpAdapter::new()?.parse_file(file_id, &text, &symbols)
    }

    fn refresh(&self) -> Result<()> {
        let projects = discover_projects(&self.root, &self.settings)?;
        debug!("Refreshed {} with {} project(s)", self.solution, projects.len());
        *self.projects.write() = projects;
        *self.symbols.write() = None;
        Ok(())
    }
}

fn directory_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("Solution")
        .to_string()
}

fn discover_projects(root: &Path, settings: &AnalysisSettings) -> Result<Vec<ProjectRoot>> {
    let mut projects: Vec<ProjectRoot> = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !settings.is_excluded_dir(name))
                    .unwrap_or(true)
        });

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let is_project = entry.file_type().is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(PROJECT_EXTENSION))
                .unwrap_or(false);
        if !is_project {
            continue;
        }
        let (Some(dir), Some(stem)) = (path.parent(), path.file_stem().and_then(|s| s.to_str())) else {
            continue;
        };
        if projects.iter().any(|p| p.dir == dir || p.name == stem) {
            debug!("Ignoring additional project file {}", path.display());
            continue;
        }
        projects.push(ProjectRoot {
            name: stem.to_string(),
            dir: dir.to_path_buf(),
        });
    }

    if projects.is_empty() {
        projects.push(ProjectRoot {
            name: directory_name(root),
            dir: root.to_path_buf(),
        });
    }
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::builder::{SourceFileBuilder, Stmt};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, text: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn identifiers_round_trip() {
        let id = file_identifier("Shop.Data", "Orders/Repository.cs");
        assert_eq!(id, "<Shop.Data>/Orders/Repository.cs");
        assert_eq!(
            split_file_identifier(&id),
            Some(("Shop.Data", "Orders/Repository.cs"))
        );
        assert_eq!(split_file_identifier("Repository.cs"), None);
    }

    #[test]
    fn in_memory_add_replaces_existing_file() {
        let mut workspace = InMemoryWorkspace::new("Shop");
        workspace.add_file("App", "A.cs", SourceFileBuilder::new("A.cs").finish());
        workspace.add_file(
            "App",
            "A.cs",
            SourceFileBuilder::new("A.cs").statement(Stmt::Break).finish(),
        );

        assert_eq!(workspace.file_ids().unwrap(), vec!["<App>/A.cs"]);
        assert_eq!(workspace.load("<App>/A.cs").unwrap().statement_count(), 2);
        assert!(workspace.load("<App>/B.cs").is_err());
    }

    #[test]
    fn missing_files_fail_to_load() {
        let mut workspace = InMemoryWorkspace::new("Shop");
        let id = workspace.add_missing_file("App", "Gone.cs");
        assert!(workspace.load(&id).is_err());

        workspace.remove_file(&id);
        assert!(workspace.file_ids().unwrap().is_empty());
    }

    #[test]
    fn discovers_projects_and_skips_excluded_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "Shop.Data/Shop.Data.csproj", "<Project />");
        write(root, "Shop.Data/Repository.cs", "class Repository {}");
        write(root, "Shop.Data/Orders/Order.cs", "class Order {}");
        write(root, "Shop.Data/obj/Generated.cs", "class Generated {}");
        write(root, "Shop.Web/Shop.Web.csproj", "<Project />");
        write(root, "Shop.Web/Program.cs", "class Program {}");
        write(root, "Shop.Web/readme.md", "docs");

        let workspace = FsWorkspace::open(root, &AnalysisSettings::default()).unwrap();
        assert_eq!(workspace.project_names(), vec!["Shop.Data", "Shop.Web"]);

        let projects = workspace.projects().unwrap();
        assert_eq!(
            projects[0].file_ids,
            vec!["<Shop.Data>/Orders/Order.cs", "<Shop.Data>/Repository.cs"]
        );
        assert_eq!(projects[1].file_ids, vec!["<Shop.Web>/Program.cs"]);
    }

    #[test]
    fn root_is_the_project_without_project_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Scripts");
        write(&root, "Main.cs", "class Main {}");

        let workspace = FsWorkspace::open(&root, &AnalysisSettings::default())
            .unwrap()
            .with_solution_name("Tools");
        assert_eq!(workspace.solution_name(), "Tools");
        assert_eq!(workspace.file_ids().unwrap(), vec!["<Scripts>/Main.cs"]);
        assert_eq!(
            workspace.file_id_for_path(&root.join("Main.cs")).as_deref(),
            Some("<Scripts>/Main.cs")
        );
    }

    #[test]
    fn loads_files_with_solution_symbols() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "Widget.cs",
            "namespace Shop { public class Widget { public void Spin() {} } }",
        );
        write(
            root,
            "Program.cs",
            "namespace Shop { class Program { void Run() { Widget w = new Widget(); w.Spin(); } } }",
        );

        let workspace = FsWorkspace::open(root, &AnalysisSettings::default()).unwrap();
        assert_eq!(workspace.symbols().unwrap().len(), 2);

        let id = workspace.file_id_for_path(&root.join("Program.cs")).unwrap();
        let file = workspace.load(&id).unwrap();
        assert_eq!(file.path(), id);
        assert!(file.walk().iter().any(|s| s.text() == "w.Spin();"));
    }

    #[test]
    fn refresh_picks_up_new_projects_and_declarations() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Shop");
        write(&root, "Main.cs", "namespace Shop { class Main {} }");

        let workspace = FsWorkspace::open(&root, &AnalysisSettings::default()).unwrap();
        assert_eq!(workspace.symbols().unwrap().len(), 1);

        write(&root, "Tools/Tools.csproj", "<Project />");
        write(&root, "Tools/Cli.cs", "namespace Shop.Tools { class Cli {} }");
        // Stale until refreshed
        assert_eq!(workspace.symbols().unwrap().len(), 1);

        workspace.refresh().unwrap();
        assert_eq!(workspace.project_names(), vec!["Tools"]);
        assert_eq!(workspace.file_ids().unwrap(), vec!["<Tools>/Cli.cs"]);
        let symbols = workspace.symbols().unwrap();
        assert!(symbols.get("Shop.Tools.Cli").is_some());
        assert!(symbols.get("Shop.Main").is_none());
    }
}

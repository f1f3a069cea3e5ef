//! Mining, publishing and offering suggestions over a solution on disk

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::{tempdir, TempDir};

use autotemplate_rs::api::invocation::BufferExecutor;
use autotemplate_rs::lang::csharp::CSharpAdapter;
use autotemplate_rs::{AutoTemplate, AutoTemplateConfig, FsWorkspace, SuggestionEngine, Workspace};

const CONNECTION_KEY: &str = "After variable of type \"System.Data.SqlClient.SqlConnection\"";
const WIDGET_KEY: &str = "After variable of type \"Shop.Widget\"";

fn repository_source(index: usize) -> String {
    format!(
        r#"using System.Data.SqlClient;

namespace Shop.Data
{{
    public class Repository{index}
    {{
        public void Load()
        {{
            var conn = new SqlConnection("Server=db{index}");
            conn.Open();
        }}
    }}
}}
"#
    )
}

fn create_solution(dir: &TempDir, files: usize) -> Result<PathBuf> {
    let root = dir.path().join("Shop");
    fs::create_dir_all(root.join("Data"))?;
    fs::create_dir_all(root.join("bin"))?;
    for index in 0..files {
        fs::write(
            root.join("Data").join(format!("Repository{index}.cs")),
            repository_source(index),
        )?;
    }
    // Build output is never mined
    fs::write(root.join("bin/Generated.cs"), repository_source(99))?;
    Ok(root)
}

fn engine_for(data_dir: &Path) -> Result<SuggestionEngine> {
    let mut config = AutoTemplateConfig::default();
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config.suggestions.min_occurrences = 3;
    config.suggestions.min_percentage = 20;
    config.suggestions.max_suggestions = 7;
    Ok(SuggestionEngine::new(config)?)
}

#[test]
fn connection_open_is_learned_from_five_files() -> Result<()> {
    let dir = tempdir()?;
    let root = create_solution(&dir, 5)?;
    let engine = engine_for(&dir.path().join("data"))?;
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;
    assert_eq!(workspace.solution_name(), "Shop");

    let analysis = engine.analyze_solution(&workspace, None)?;
    assert_eq!(analysis.files_analyzed, 5);
    assert_eq!(analysis.files_failed, 0);

    let build = engine.build_suggestions(None)?;
    assert_eq!(build.data_files, 1);

    let published = engine.catalog().for_key(CONNECTION_KEY);
    let open = published
        .iter()
        .find(|t| t.template == "$VariableName$.Open();")
        .expect("Open() should be published for SqlConnection variables");
    assert_eq!(open.count, 5);
    assert_eq!(open.percentage, 100);
    assert_eq!(published[0].template, open.template);
    Ok(())
}

#[test]
fn too_few_observations_publish_nothing() -> Result<()> {
    let dir = tempdir()?;
    let root = create_solution(&dir, 2)?;
    let engine = engine_for(&dir.path().join("data"))?;
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;

    engine.analyze_solution(&workspace, None)?;
    engine.build_suggestions(None)?;
    assert!(engine.catalog().for_key(CONNECTION_KEY).is_empty());
    Ok(())
}

#[test]
fn repeated_builds_publish_identical_files() -> Result<()> {
    let dir = tempdir()?;
    let root = create_solution(&dir, 4)?;
    let engine = engine_for(&dir.path().join("data"))?;
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;

    engine.analyze_solution(&workspace, None)?;
    engine.build_suggestions(None)?;
    let first = fs::read_to_string(engine.data_dir().suggestions_path())?;

    engine.analyze_solution(&workspace, None)?;
    engine.build_suggestions(None)?;
    let second = fs::read_to_string(engine.data_dir().suggestions_path())?;

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn updating_a_file_replaces_its_observations() -> Result<()> {
    let dir = tempdir()?;
    let root = create_solution(&dir, 3)?;
    let engine = engine_for(&dir.path().join("data"))?;
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;

    engine.analyze_solution(&workspace, None)?;
    engine.build_suggestions(None)?;
    assert_eq!(engine.catalog().for_key(CONNECTION_KEY)[0].count, 3);

    let changed = root.join("Data/Repository0.cs");
    fs::write(
        &changed,
        "class Empty { void M() { var total = 0; } }\n",
    )?;
    let file_id = workspace
        .file_id_for_path(&changed)
        .expect("file lies inside the solution");
    let update = engine.update_files(&workspace, &[file_id], None)?;
    assert_eq!(update.files_analyzed, 1);

    engine.build_suggestions(None)?;
    assert!(engine.catalog().for_key(CONNECTION_KEY).is_empty());
    Ok(())
}

fn widget_user(name: &str) -> String {
    format!(
        "namespace Shop\n{{\n    class {name}\n    {{\n        void Run()\n        {{\n            Widget w = new Widget();\n            w.Spin();\n        }}\n    }}\n}}\n"
    )
}

fn sorted_templates(engine: &SuggestionEngine) -> Vec<AutoTemplate> {
    let mut templates = engine.catalog().templates().to_vec();
    templates.sort_by(|a, b| (&a.key, &a.template).cmp(&(&b.key, &b.template)));
    templates
}

#[test]
fn incremental_update_matches_a_full_rebuild() -> Result<()> {
    let dir = tempdir()?;
    let root = create_solution(&dir, 3)?;
    let engine = engine_for(&dir.path().join("data"))?;
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;
    engine.analyze_solution(&workspace, None)?;

    // A type declared after the first analysis, and three new users of it
    fs::write(
        root.join("Widget.cs"),
        "namespace Shop { public class Widget { public void Spin() {} } }\n",
    )?;
    let mut changed = vec![workspace.file_id_for_path(&root.join("Widget.cs"))];
    for name in ["A", "B", "C"] {
        let path = root.join(format!("{name}.cs"));
        fs::write(&path, widget_user(name))?;
        changed.push(workspace.file_id_for_path(&path));
    }
    let changed: Vec<String> = changed.into_iter().flatten().collect();
    assert_eq!(changed.len(), 4);

    engine.update_files(&workspace, &changed, None)?;
    engine.build_suggestions(None)?;
    let spin = engine.catalog().for_key(WIDGET_KEY);
    assert_eq!(spin.len(), 1);
    assert_eq!(spin[0].template, "$VariableName$.Spin();");
    assert_eq!(spin[0].count, 3);

    let fresh = engine_for(&dir.path().join("fresh"))?;
    let reopened = FsWorkspace::open(&root, &fresh.config().analysis)?;
    fresh.analyze_solution(&reopened, None)?;
    fresh.build_suggestions(None)?;

    assert_eq!(sorted_templates(&engine), sorted_templates(&fresh));
    Ok(())
}

#[test]
fn offers_insert_after_the_declaration() -> Result<()> {
    let dir = tempdir()?;
    let root = create_solution(&dir, 5)?;
    let engine = engine_for(&dir.path().join("data"))?;
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;
    engine.analyze_solution(&workspace, None)?;
    engine.build_suggestions(None)?;

    let source = "using System.Data.SqlClient;\n\nclass Report\n{\n    void Run()\n    {\n        var db = new SqlConnection(\"Server=report\");\n    }\n}\n";
    let mut file = CSharpAdapter::new()?.parse_file("Shop/Report.cs", source, &*workspace.symbols()?)?;
    let offers = engine.offers_at_line(&mut file, 7)?;
    let open = offers
        .iter()
        .find(|offer| offer.template.template == "$VariableName$.Open();")
        .expect("an Open() offer");
    assert_eq!(open.label, "Insert: db.Open();");

    let mut executor = BufferExecutor::new(file.text());
    open.apply(&mut executor)?;
    assert!(executor
        .text()
        .contains("var db = new SqlConnection(\"Server=report\");\ndb.Open();"));
    Ok(())
}

//! Command Execution
//!
//! Each subcommand builds a [`SuggestionEngine`] from the layered
//! configuration and drives it.

use crate::cli::args::*;
use crate::cli::output::*;
use anyhow::Context;
use console::user_attended;
use dialoguer::Confirm;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style as TableStyle, Table, Tabled};
use tracing::{info, warn};

use autotemplate_rs::api::engine::SuggestionEngine;
use autotemplate_rs::api::invocation::{BufferExecutor, TemplateExecutor};
use autotemplate_rs::core::config::AutoTemplateConfig;
use autotemplate_rs::core::file_utils::FileReader;
use autotemplate_rs::io::data_dir::BackgroundAnalysis;
use autotemplate_rs::lang::csharp::CSharpAdapter;
use autotemplate_rs::lang::workspace::{FsWorkspace, Workspace};
use autotemplate_rs::live::watcher::watch_solution;

/// Load configuration from `config_path` (defaults otherwise) and apply the
/// command-line data directory override
pub fn load_configuration(
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<AutoTemplateConfig> {
    let mut config = match config_path {
        Some(path) => AutoTemplateConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AutoTemplateConfig::default(),
    };
    if data_dir.is_some() {
        config.storage.data_dir = data_dir;
    }
    config.validate()?;
    Ok(config)
}

fn open_workspace(args: &SolutionArgs, config: &AutoTemplateConfig) -> anyhow::Result<FsWorkspace> {
    let workspace = FsWorkspace::open(&args.root, &config.analysis)?;
    Ok(match &args.solution {
        Some(name) => workspace.with_solution_name(name.clone()),
        None => workspace,
    })
}

/// Full corpus rebuild followed by a suggestion build
pub fn analyze_command(args: AnalyzeArgs, config: AutoTemplateConfig) -> anyhow::Result<()> {
    let engine = SuggestionEngine::new(config)?;
    let workspace = open_workspace(&args.solution, engine.config())?;
    let progress = SpinnerProgress::new(args.quiet)?;

    let analysis = engine.analyze_solution(&workspace, Some(&progress))?;
    let build = engine.build_suggestions(Some(&progress))?;
    progress.finish(&format!("Analyzed {}", workspace.solution_name()));

    if !args.quiet {
        display_run_summary(Some(&analysis), &build);
    }
    Ok(())
}

/// Incremental rebuild for changed files followed by a suggestion build
pub fn update_command(args: UpdateArgs, config: AutoTemplateConfig) -> anyhow::Result<()> {
    let engine = SuggestionEngine::new(config)?;
    let workspace = open_workspace(&args.solution, engine.config())?;

    let mut changed = Vec::new();
    for file in &args.files {
        match workspace.file_id_for_path(file) {
            Some(file_id) => changed.push(file_id),
            None => warn!("{} is not part of {}", file.display(), workspace.solution_name()),
        }
    }

    let progress = SpinnerProgress::new(args.quiet)?;
    let analysis = engine.update_files(&workspace, &changed, Some(&progress))?;
    let build = engine.build_suggestions(Some(&progress))?;
    progress.finish(&format!("Updated {}", workspace.solution_name()));

    if !args.quiet {
        display_run_summary(Some(&analysis), &build);
    }
    Ok(())
}

/// Aggregate every corpus file
pub fn build_command(config: AutoTemplateConfig) -> anyhow::Result<()> {
    let engine = SuggestionEngine::new(config)?;
    let progress = SpinnerProgress::new(false)?;
    let build = engine.build_suggestions(Some(&progress))?;
    progress.finish("Suggestions built");
    display_run_summary(None, &build);
    Ok(())
}

/// Show published suggestions
pub fn list_command(args: ListArgs, config: AutoTemplateConfig) -> anyhow::Result<()> {
    let engine = SuggestionEngine::new(config)?;
    let catalog = engine.catalog();
    let templates: Vec<_> = match &args.key {
        Some(key) => catalog.for_key(key),
        None => catalog.templates().as_ref().clone(),
    };

    match args.format {
        ListFormat::Table => display_templates(&templates),
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&templates)?),
    }
    Ok(())
}

/// Offers for the statement on a line, optionally applied
pub fn suggest_command(args: SuggestArgs, config: AutoTemplateConfig) -> anyhow::Result<()> {
    let engine = SuggestionEngine::new(config)?;
    let root = match &args.root {
        Some(root) => root.clone(),
        None => args
            .file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let workspace = FsWorkspace::open(&root, &engine.config().analysis)?;
    let file_id = workspace
        .file_id_for_path(&args.file)
        .unwrap_or_else(|| args.file.display().to_string());

    let text = FileReader::read_to_string(&args.file)?;
    let mut file = CSharpAdapter::new()?.parse_file(&file_id, &text, &*workspace.symbols()?)?;
    let offers = match args.column {
        None => engine.offers_at_line(&mut file, args.line)?,
        Some(column) => {
            let caret = caret_offset(file.text(), args.line, column).with_context(|| {
                format!("Line {} of {} does not exist", args.line, args.file.display())
            })?;
            engine.offers_at_caret(&mut file, caret)
        }
    };

    match args.apply {
        None => display_offers(&offers),
        Some(index) => {
            let offer = offers.get(index).with_context(|| {
                format!("No offer {index}; {} available", offers.len())
            })?;
            let mut executor = BufferExecutor::new(file.text());
            executor.execute(&offer.invocation(), offer.insertion)?;
            print!("{}", executor.text());
        }
    }
    Ok(())
}

/// Byte offset of 1-based `line` and `column`, clamped to the end of the line
fn caret_offset(text: &str, line: usize, column: usize) -> Option<usize> {
    let start = match line {
        0 => return None,
        1 => 0,
        _ => text.match_indices('\n').nth(line - 2).map(|(i, _)| i + 1)?,
    };
    let rest = &text[start..];
    let line_text = &rest[..rest.find('\n').unwrap_or(rest.len())];
    let within = line_text
        .char_indices()
        .nth(column.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(line_text.len());
    Some(start + within)
}

/// Decide whether background analysis runs for `solution`, asking once
fn background_mode(
    engine: &SuggestionEngine,
    solution: &str,
    enable: bool,
) -> anyhow::Result<BackgroundAnalysis> {
    if enable {
        engine.set_background_mode(solution, BackgroundAnalysis::Enabled)?;
        return Ok(BackgroundAnalysis::Enabled);
    }
    if let Some(mode) = engine.background_mode(solution)? {
        return Ok(mode);
    }

    let enabled = user_attended()
        && Confirm::new()
            .with_prompt(format!(
                "Analyze {solution} in the background while you edit?"
            ))
            .default(false)
            .interact()?;
    let mode = if enabled {
        BackgroundAnalysis::Enabled
    } else {
        BackgroundAnalysis::Disabled
    };
    engine.set_background_mode(solution, mode)?;
    Ok(mode)
}

/// Background mode: watcher, save debouncer, incremental updates
pub async fn watch_command(args: WatchArgs, config: AutoTemplateConfig) -> anyhow::Result<()> {
    let engine = Arc::new(SuggestionEngine::new(config)?);
    let workspace = Arc::new(open_workspace(&args.solution, engine.config())?);
    let solution = workspace.solution_name().to_string();

    if !background_mode(&engine, &solution, args.enable)?.is_enabled() {
        println!(
            "{} {}",
            "Background analysis is disabled for".yellow(),
            solution.bold()
        );
        println!("   Use --enable to turn it on");
        return Ok(());
    }

    println!(
        "{} {} {}",
        "Watching".bright_green().bold(),
        solution.cyan(),
        "(Ctrl+C to stop)".dimmed()
    );
    watch_solution(engine, workspace, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;
    info!("Stopped watching {}", solution);
    Ok(())
}

/// Print default configuration in YAML format
pub fn print_default_config() -> anyhow::Result<()> {
    println!("{}", "# Default autotemplate configuration".dimmed());
    println!("{}", "# Save this to a file and customize as needed".dimmed());
    println!(
        "{}",
        "# Usage: autotemplate --config your-config.yml analyze <ROOT>".dimmed()
    );
    println!();

    let yaml_output = serde_yaml::to_string(&AutoTemplateConfig::default())?;
    println!("{}", yaml_output);
    Ok(())
}

/// Initialize a configuration file with defaults
pub fn init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            args.output.display()
        );
    }

    AutoTemplateConfig::default().to_yaml_file(&args.output)?;
    println!(
        "{} {}",
        "Configuration saved to:".bright_green().bold(),
        args.output.display().to_string().cyan()
    );
    println!();

    #[derive(Tabled)]
    struct CustomizationRow {
        setting: &'static str,
        description: &'static str,
    }

    let rows = vec![
        CustomizationRow {
            setting: "suggestions.min_occurrences",
            description: "Observations needed before a template is suggested",
        },
        CustomizationRow {
            setting: "suggestions.min_percentage",
            description: "Share of a scope's observations a template needs",
        },
        CustomizationRow {
            setting: "suggestions.file_saves_before_rebuild",
            description: "Saves that trigger a background update",
        },
        CustomizationRow {
            setting: "storage.data_dir",
            description: "Where corpora and suggestions are kept",
        },
    ];
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_offsets_count_characters_and_clamp() {
        let text = "ab\n    é;\n";
        assert_eq!(caret_offset(text, 1, 1), Some(0));
        assert_eq!(caret_offset(text, 2, 5), Some(7));
        assert_eq!(caret_offset(text, 2, 6), Some(9));
        assert_eq!(caret_offset(text, 2, 40), Some(10));
        assert_eq!(caret_offset(text, 3, 1), Some(11));
        assert_eq!(caret_offset(text, 0, 1), None);
        assert_eq!(caret_offset(text, 4, 1), None);
    }
}

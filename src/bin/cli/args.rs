//! CLI Argument Structures
//!
//! Command definitions and argument types of the autotemplate binary.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Statement-level pattern mining and predictive code templates for C#
#[derive(Parser)]
#[command(name = "autotemplate")]
#[command(version = VERSION)]
#[command(about = "Mine recurring statement patterns from C# solutions and suggest them as templates")]
#[command(long_about = "
Learn what usually follows a statement in your C# code and offer it back as a
template at the cursor.

Common Usage:

  # Mine a solution and publish suggestions
  autotemplate analyze ./MySolution

  # Re-mine only the files you changed
  autotemplate update ./MySolution src/App/Orders.cs

  # Show what was learned
  autotemplate list --key 'After variable of type \"System.Data.SqlClient.SqlConnection\"'

  # Offers for the statement on line 42, applied
  autotemplate suggest ./MySolution/App/Orders.cs --line 42 --apply 0

  # Keep suggestions current while you edit
  autotemplate watch ./MySolution
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "AUTOTEMPLATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding corpora and published suggestions
    #[arg(long, global = true, env = "AUTOTEMPLATE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rebuild the corpus of a solution and publish suggestions
    Analyze(AnalyzeArgs),

    /// Re-mine changed files of a solution and publish suggestions
    Update(UpdateArgs),

    /// Aggregate every corpus into the published suggestions
    Build,

    /// Show published suggestions
    List(ListArgs),

    /// Offer suggestions for a statement of a file
    Suggest(SuggestArgs),

    /// Watch a solution and update suggestions in the background
    Watch(WatchArgs),

    /// Print default configuration in YAML format
    #[command(name = "print-default-config")]
    PrintDefaultConfig,

    /// Initialize a configuration file with defaults
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),
}

/// Solution selection shared by the mining commands
#[derive(Args, Debug, Clone)]
pub struct SolutionArgs {
    /// Solution root directory
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Solution name; defaults to the root directory name
    #[arg(long)]
    pub solution: Option<String>,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub solution: SolutionArgs,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub solution: SolutionArgs,

    /// Changed source files
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only suggestions for this scope key
    #[arg(long)]
    pub key: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: ListFormat,
}

#[derive(Args)]
pub struct SuggestArgs {
    /// Source file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// 1-based line the statement starts on, or the caret line with --column
    #[arg(long)]
    pub line: usize,

    /// 1-based caret column; offers what the complete-statement gesture would
    #[arg(long)]
    pub column: Option<usize>,

    /// Solution root used for symbol resolution; defaults to the file's directory
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Print the file with the offer at this index inserted
    #[arg(long)]
    pub apply: Option<usize>,
}

#[derive(Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub solution: SolutionArgs,

    /// Enable background analysis without asking
    #[arg(long)]
    pub enable: bool,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Output configuration file name
    #[arg(short, long, default_value = ".autotemplate.yml")]
    pub output: PathBuf,

    /// Overwrite existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

/// Output formats of `list`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Rounded table
    Table,
    /// Pretty-printed JSON
    Json,
}

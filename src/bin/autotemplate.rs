//! autotemplate CLI - predictive code templates mined from C# solutions

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::PrintDefaultConfig => cli::print_default_config(),
        Commands::InitConfig(args) => cli::init_config(args),
        command => {
            let config = cli::load_configuration(cli.config.as_deref(), cli.data_dir)?;
            match command {
                Commands::Analyze(args) => cli::analyze_command(args, config),
                Commands::Update(args) => cli::update_command(args, config),
                Commands::Build => cli::build_command(config),
                Commands::List(args) => cli::list_command(args, config),
                Commands::Suggest(args) => cli::suggest_command(args, config),
                Commands::Watch(args) => cli::watch_command(args, config).await,
                Commands::PrintDefaultConfig | Commands::InitConfig(_) => Ok(()),
            }
        }
    }
}

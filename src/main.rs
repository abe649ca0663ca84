//! f3l - command-line front end for f3-launcher

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use f3_launcher::cli::{self, Cli, Commands};
use f3_launcher::config::EngineConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => {
            let config = EngineConfig::load(cli.config.as_deref())?;
            cli::check::run(config, args).await
        }
        Commands::Probe(args) => {
            let config = EngineConfig::load(cli.config.as_deref())?;
            cli::probe::run(config, args).await
        }
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(ExitCode::SUCCESS)
        }
    }
}

//! Development tasks for f3-launcher
//!
//! Run with `cargo xtask <task>` (see `.cargo/config.toml`).

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use f3_launcher::cli::Cli;

#[derive(Parser)]
#[command(name = "xtask")]
struct Xtask {
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Regenerate the CLI reference in docs/cli.md
    GenDocs {
        /// Output file
        #[arg(long, default_value = "docs/cli.md")]
        output: PathBuf,
    },
}

fn main() -> std::io::Result<()> {
    match Xtask::parse().task {
        Task::GenDocs { output } => {
            let markdown = clap_markdown::help_markdown::<Cli>();
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output, markdown)?;
            println!("✓ Wrote {}", output.display());
            Ok(())
        }
    }
}

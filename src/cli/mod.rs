//! Command-line interface for f3-launcher

pub mod check;
pub mod probe;

use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "f3l")]
#[command(about = "Check flash drives and memory cards for counterfeit capacity using f3")]
#[command(version)]
pub struct Cli {
    /// Configuration file [default: <config dir>/f3-launcher/config.toml]
    #[arg(long, global = true, env = "F3_LAUNCHER_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Test a mounted drive (f3write + f3read) or a block device (f3probe)
    Check(check::CheckArgs),

    /// Show which f3 tools are installed and what they support
    Probe(probe::ProbeArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "f3l", &mut io::stdout());
}

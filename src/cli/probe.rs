//! `f3l probe` command implementation

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::ErrorCode;
use crate::probe::{Capabilities, Tool};

#[derive(Args)]
pub struct ProbeArgs {
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    #[serde(flatten)]
    capabilities: &'a Capabilities,
    quick_mode_supported: bool,
    shows_progress: bool,
}

pub async fn run(config: EngineConfig, args: ProbeArgs) -> Result<ExitCode> {
    let caps = Capabilities::discover(&config.tools, config.timeouts.probe()).await;

    if args.json {
        let output = ProbeOutput {
            capabilities: &caps,
            quick_mode_supported: caps.quick_mode_supported(),
            shows_progress: caps.shows_progress(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for tool in [Tool::Write, Tool::Read, Tool::Probe, Tool::Fix] {
            let name = tool.executable_name(&config.tools);
            match caps.path(tool) {
                Some(path) => println!("✓ {:<8} {}", name, path.display()),
                None => println!("✗ {:<8} not found", name),
            }
        }
        match caps.version {
            Some(version) => println!("  version  {}", version),
            None => println!("  version  unknown"),
        }
        if caps.quick_mode_supported() {
            println!("  quick    supported");
        } else {
            println!("  quick    unsupported");
        }

        let missing = caps.missing_features();
        if !missing.is_empty() {
            println!();
            for code in missing {
                println!("Warning: {}", code);
            }
        }
    }

    if caps.has_cui() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(ErrorCode::NoCui.code()))
    }
}

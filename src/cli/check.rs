//! `f3l check` command implementation

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineEvent, EngineHandle, EventReceiver, StatusChange};
use crate::error::{EngineError, ErrorCode};
use crate::report::Report;
use crate::status::Status;

/// Exit status when the user interrupted the check.
const STOPPED_EXIT: u8 = 1;

#[derive(Args)]
pub struct CheckArgs {
    /// Mount point of the drive, or its block device with --quick
    path: PathBuf,

    /// Probe the block device with f3probe instead of filling the drive
    #[arg(long)]
    quick: bool,

    /// Reuse files left by an earlier run and only read them back
    #[arg(long, conflicts_with = "quick")]
    use_cache: bool,

    /// Limit the memory f3probe uses (slower)
    #[arg(long, requires = "quick")]
    less_mem: bool,

    /// Let f3probe overwrite the device without backing it up first
    #[arg(long, requires = "quick")]
    destructive: bool,

    /// Shrink the device to its real capacity when the check finds it lies
    #[arg(long, requires = "quick")]
    fix: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl CheckArgs {
    /// Option overrides implied by the flags. Unset flags leave the
    /// configured defaults alone.
    fn options(&self) -> Vec<(&'static str, &'static str)> {
        let mut options = Vec::new();
        if self.quick {
            options.push(("mode", "quick"));
        }
        if self.use_cache {
            options.push(("cache", "write"));
        }
        if self.less_mem {
            options.push(("memory", "minimum"));
        }
        if self.destructive {
            options.push(("destructive", "yes"));
        }
        options
    }
}

fn is_advisory(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::NoProgress | ErrorCode::NoFix | ErrorCode::CacheNotFound
    )
}

fn exit_status(code: ErrorCode) -> u8 {
    if code.is_success() {
        0
    } else {
        code.code()
    }
}

fn exit_code(code: ErrorCode) -> ExitCode {
    ExitCode::from(exit_status(code))
}

fn exit_for(err: &EngineError) -> ExitCode {
    exit_code(err.code().unwrap_or(ErrorCode::Unknown))
}

pub async fn run(config: EngineConfig, args: CheckArgs) -> Result<ExitCode> {
    let (engine, mut events) = Engine::launch(config).await;
    if engine.error_code().is_fatal() {
        eprintln!("Error: {}", engine.error_code());
        return Ok(exit_code(engine.error_code()));
    }
    // Anything queued so far is startup noise already reported above.
    while events.try_recv().is_ok() {}

    for (key, value) in args.options() {
        if !engine.set_option(key, value).await {
            anyhow::bail!("Option {}={} was rejected", key, value);
        }
    }

    let mut printer = Printer::new(args.json);
    printer.line(&format!(
        "Checking {} ({} mode)...",
        args.path.display(),
        engine.option("mode").unwrap_or_default()
    ));
    if let Err(e) = engine.start_check(&args.path).await {
        eprintln!("Error: {}", e);
        return Ok(exit_for(&e));
    }

    if follow(&engine, &mut events, &mut printer).await {
        eprintln!("✗ Check stopped");
        return Ok(ExitCode::from(STOPPED_EXIT));
    }

    let mut code = engine.error_code();
    if code.is_success() && args.fix {
        code = fix(&engine, &mut events, &mut printer).await;
    }

    if args.json {
        if let Some(report) = engine.report() {
            println!("{}", serde_json::to_string_pretty(&*report)?);
        }
    }
    Ok(exit_code(code))
}

async fn fix(engine: &EngineHandle, events: &mut EventReceiver, printer: &mut Printer) -> ErrorCode {
    match engine.report() {
        Some(report) if report.capacity_mismatch() => {}
        _ => {
            printer.line("Nothing to fix.");
            return engine.error_code();
        }
    }

    printer.line("The device holds less than it claims. Fixing its capacity...");
    if let Err(e) = engine.start_fix().await {
        eprintln!("Error: {}", e);
        return e.code().unwrap_or(ErrorCode::Unknown);
    }
    if follow(engine, events, printer).await {
        eprintln!("✗ Fix stopped");
        return ErrorCode::Unknown;
    }

    let code = engine.error_code();
    if code.is_success() {
        printer.line("✓ Capacity fixed. Unplug and replug the device, then format it.");
    }
    code
}

/// Print events until the live run ends. Returns true if the user stopped it.
async fn follow(engine: &EngineHandle, events: &mut EventReceiver, printer: &mut Printer) -> bool {
    let mut watch = engine.watch();
    let mut active = watch.borrow().active;
    let mut stopped = false;

    while active {
        tokio::select! {
            Some(event) = events.recv() => printer.event(&event),
            changed = watch.changed() => {
                active = changed.is_ok() && watch.borrow_and_update().active;
            }
            _ = tokio::signal::ctrl_c(), if !stopped => {
                eprintln!("\nStopping...");
                engine.stop_check().await;
                stopped = true;
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        printer.event(&event);
    }
    stopped
}

/// Human-readable rendering of engine events. With `quiet` only errors are
/// shown, on stderr, so stdout stays machine-readable.
struct Printer {
    quiet: bool,
    last_shown: Option<(u32, i32)>,
}

impl Printer {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            last_shown: None,
        }
    }

    fn line(&self, text: &str) {
        if !self.quiet {
            println!("{}", text);
        }
    }

    fn event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Error(code) if is_advisory(*code) => eprintln!("Warning: {}", code),
            EngineEvent::Error(code) => eprintln!("Error: {}", code),
            EngineEvent::StatusChanged(change) if !self.quiet => self.status(change),
            EngineEvent::StatusChanged(_) => {}
        }
    }

    fn status(&mut self, change: &StatusChange) {
        match change.status {
            Status::Running => println!("Running..."),
            Status::Staged => println!("Stage {}", change.stage.stage),
            Status::Progressed => {
                // Whole percents are enough for a terminal.
                let shown = (change.stage.stage, change.stage.progress / 100);
                if self.last_shown != Some(shown) {
                    self.last_shown = Some(shown);
                    if let Some(percent) = change.stage.percent() {
                        println!("  {:6.2}%", percent);
                    }
                }
            }
            Status::Finished => {
                if let Some(report) = &change.report {
                    print_report(report);
                }
            }
            Status::Stopped => println!("Stopped."),
            Status::Ready => {}
        }
    }
}

fn print_report(report: &Report) {
    println!();
    if report.is_fixed() {
        println!("✓ Capacity fixed");
    } else if report.success {
        println!("✓ The device is genuine");
    } else {
        println!("✗ The device failed the check");
    }

    println!("  Reported free space: {}", report.reported_free);
    println!("  Actual free space:   {}", report.actual_free);
    println!("  Lost space:          {}", report.lost_space);
    println!("  Writing speed:       {}", report.writing_speed);
    println!("  Reading speed:       {}", report.reading_speed);
    match report.availability() {
        Some(availability) => println!("  Availability:        {:.2}%", availability * 100.0),
        None => println!("  Availability:        (N/A)"),
    }
    if report.module_size.is_available() {
        println!("  Module size:         {}", report.module_size);
    }
    if report.block_size.is_available() {
        println!("  Block size:          {}", report.block_size);
    }
    if let Some(sector) = report.last_sector {
        println!("  Last usable sector:  {}", sector);
    }
}

//! Translating run options into tool invocations

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;
use crate::options::{MemoryMode, RunOptions, TestMode};
use crate::probe::{Capabilities, Tool};

/// f3fix takes the last sector as a C `int`.
pub const MAX_FIX_SECTOR: u64 = i32::MAX as u64;

/// Extension of the files f3write leaves on the target.
pub const CACHE_EXTENSION: &str = "h2w";

/// One tool invocation within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
}

pub fn legacy_args(target: &Path, show_progress: bool) -> Vec<String> {
    let mut args = Vec::new();
    if show_progress {
        args.push("--show-progress=1".to_string());
    }
    args.push(target.display().to_string());
    args
}

pub fn quick_args(target: &Path, options: &RunOptions) -> Vec<String> {
    let mut args = Vec::new();
    if options.destructive {
        args.push("--destructive".to_string());
    }
    if options.memory == MemoryMode::Minimum {
        args.push("--min-memory".to_string());
    }
    args.push(target.display().to_string());
    args
}

pub fn fix_args(target: &Path, last_sector: u64) -> Vec<String> {
    vec![
        format!("--last-sec={}", last_sector),
        target.display().to_string(),
    ]
}

/// Phases of a check. With `cache_found` the write phase is skipped and the
/// files left by an earlier f3write are read back.
pub fn plan_check(
    target: &Path,
    options: &RunOptions,
    caps: &Capabilities,
    cache_found: bool,
) -> Result<Vec<Phase>, ErrorCode> {
    match options.mode {
        TestMode::Quick => {
            let program = caps.probe.clone().ok_or(ErrorCode::NoQuick)?;
            Ok(vec![Phase {
                tool: Tool::Probe,
                program,
                args: quick_args(target, options),
            }])
        }
        TestMode::Legacy => {
            let write = caps.write.clone().ok_or(ErrorCode::NoCui)?;
            let read = caps.read.clone().ok_or(ErrorCode::NoCui)?;
            let args = legacy_args(target, caps.shows_progress());

            let mut phases = Vec::with_capacity(2);
            if !cache_found {
                phases.push(Phase {
                    tool: Tool::Write,
                    program: write,
                    args: args.clone(),
                });
            }
            phases.push(Phase {
                tool: Tool::Read,
                program: read,
                args,
            });
            Ok(phases)
        }
    }
}

pub fn plan_fix(
    target: &Path,
    caps: &Capabilities,
    last_sector: u64,
) -> Result<Vec<Phase>, ErrorCode> {
    let program = caps.fix.clone().ok_or(ErrorCode::NoFix)?;
    if last_sector > MAX_FIX_SECTOR {
        return Err(ErrorCode::Oversize);
    }
    Ok(vec![Phase {
        tool: Tool::Fix,
        program,
        args: fix_args(target, last_sector),
    }])
}

/// Check the target exists and has the right kind for the mode: a directory
/// for the write/read test, anything but a directory for f3probe.
pub fn validate_target(target: &Path, mode: TestMode) -> Result<(), ErrorCode> {
    let metadata = fs::metadata(target).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => ErrorCode::NoPermission,
        _ => ErrorCode::PathIncorrect,
    })?;

    match mode {
        TestMode::Legacy if !metadata.is_dir() => Err(ErrorCode::NotDirectory),
        TestMode::Quick if metadata.is_dir() => Err(ErrorCode::NotDevice),
        _ => Ok(()),
    }
}

/// Whether an earlier f3write left its files in `dir`.
pub fn has_cache_files(dir: &Path) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to list {}: {}", dir.display(), e);
            return false;
        }
    };

    entries.filter_map(|entry| entry.ok()).any(|entry| {
        entry
            .path()
            .extension()
            .is_some_and(|ext| ext == CACHE_EXTENSION)
    })
}

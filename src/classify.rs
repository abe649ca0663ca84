//! Mapping a finished run onto the error taxonomy
//!
//! Classification is a pure function of what was observed. The first rule
//! that applies wins:
//!
//! 1. a required tool is missing
//! 2. stderr contains a known diagnostic
//! 3. the process failed or its output was cut short
//! 4. quick mode was asked for but is unavailable
//! 5. the cache was asked for but not found (a successful run)

use crate::error::ErrorCode;
use crate::parser::ParseOutcome;
use crate::process::ProcessExit;

/// Facts about a run that are known before its output is seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFacts {
    pub tool_missing: bool,
    pub quick_requested: bool,
    pub quick_available: bool,
    pub cache_requested: bool,
    pub cache_found: bool,
}

/// Diagnostics the f3 tools and the C library print, lowercased. Checked in
/// order, so the more specific phrases come first.
const STDERR_PATTERNS: &[(&[&str], ErrorCode)] = &[
    (
        &[
            "permission denied",
            "operation not permitted",
            "must be run as root",
        ],
        ErrorCode::NoPermission,
    ),
    (&["no space left"], ErrorCode::NoSpace),
    (
        &["out of memory", "cannot allocate memory"],
        ErrorCode::NoMemory,
    ),
    (&["is a partition of disk"], ErrorCode::NotDisk),
    (&["not backed by a usb", "not backed by usb"], ErrorCode::NotUSB),
    (&["not a directory"], ErrorCode::NotDirectory),
    (
        &["not a block device", "is a directory"],
        ErrorCode::NotDevice,
    ),
    (
        &["no such file or directory", "path not found", "no such device"],
        ErrorCode::PathIncorrect,
    ),
    (
        &["input/output error", "damaged", "inaccessible"],
        ErrorCode::Damaged,
    ),
];

/// Match stderr against the known diagnostics.
pub fn match_stderr(stderr: &str) -> Option<ErrorCode> {
    let stderr = stderr.to_lowercase();
    STDERR_PATTERNS
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| stderr.contains(p)))
        .map(|(_, code)| *code)
}

/// Rules that can be decided before anything is spawned.
pub fn preflight(facts: &RunFacts) -> Option<ErrorCode> {
    if facts.tool_missing {
        return Some(ErrorCode::NoCui);
    }
    if facts.quick_requested && !facts.quick_available {
        return Some(ErrorCode::NoQuick);
    }
    None
}

pub fn classify(
    exit: &ProcessExit,
    stderr: &str,
    outcome: ParseOutcome,
    facts: &RunFacts,
) -> ErrorCode {
    if facts.tool_missing {
        return ErrorCode::NoCui;
    }
    if let Some(code) = match_stderr(stderr) {
        return code;
    }
    if !exit.success() || outcome == ParseOutcome::Truncated {
        return ErrorCode::Unknown;
    }
    if facts.quick_requested && !facts.quick_available {
        return ErrorCode::NoQuick;
    }
    if facts.cache_requested && !facts.cache_found {
        return ErrorCode::CacheNotFound;
    }
    ErrorCode::Ok
}

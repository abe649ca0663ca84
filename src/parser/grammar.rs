//! Line grammar of the tool output
//!
//! Two dialects are recognised. The tagged one is line-per-record:
//!
//! ```text
//! STAGE 1
//! PROGRESS 42.37
//! REPORT_BEGIN
//! reading speed: 9.50 MB/s
//! REPORT_END
//! ```
//!
//! The native one is whatever f3write, f3read and f3probe print on their
//! own: progress redraws such as `12.34% -- 4.21 MB/s -- 1:23:45` and the
//! result lines at the end of each tool's output.

use std::sync::OnceLock;

use regex::Regex;

use crate::report::Field;

pub const REPORT_BEGIN: &str = "REPORT_BEGIN";
pub const REPORT_END: &str = "REPORT_END";

/// Report keys after normalisation, and whether the f3 tools print them
/// themselves (as opposed to only inside a tagged report block).
const FIELD_KEYS: &[(&str, Field, bool)] = &[
    ("success", Field::Success, false),
    ("reading speed", Field::ReadingSpeed, false),
    ("average reading speed", Field::ReadingSpeed, true),
    ("writing speed", Field::WritingSpeed, false),
    ("average writing speed", Field::WritingSpeed, true),
    ("reported free", Field::ReportedFree, false),
    ("reported free space", Field::ReportedFree, false),
    ("free space", Field::ReportedFree, true),
    ("announced size", Field::ReportedFree, true),
    ("actual free", Field::ActualFree, false),
    ("actual free space", Field::ActualFree, false),
    ("data ok", Field::ActualFree, true),
    ("usable size", Field::ActualFree, true),
    ("lost space", Field::LostSpace, false),
    ("data lost", Field::LostSpace, true),
    ("availability", Field::Availability, false),
    ("module size", Field::ModuleSize, false),
    ("module", Field::ModuleSize, true),
    ("block size", Field::BlockSize, false),
    ("physical block size", Field::BlockSize, true),
    ("last sector", Field::LastSector, false),
];

struct Patterns {
    stage: Regex,
    tagged_progress: Regex,
    native_progress: Regex,
    field: Regex,
    fix_hint: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        stage: Regex::new(r"^STAGE(?:\s+(\d+))?$").expect("stage regex is valid"),
        tagged_progress: Regex::new(r"^PROGRESS\s+(-?\d+(?:\.\d+)?)\s*%?$")
            .expect("progress regex is valid"),
        native_progress: Regex::new(r"(?:^|\.\.\.\s*)(-?\d+(?:\.\d+)?)%(?:\s|$)")
            .expect("progress regex is valid"),
        field: Regex::new(r"^([A-Za-z*][A-Za-z* ]*?)\s*:\s*(.*)$").expect("field regex is valid"),
        fix_hint: Regex::new(r"f3fix\s+--last-sec=(\d+)").expect("fix hint regex is valid"),
    })
}

/// `Some(None)` for a bare `STAGE`, `Some(Some(n))` for `STAGE n`.
pub fn stage_marker(line: &str) -> Option<Option<u32>> {
    let caps = patterns().stage.captures(line)?;
    match caps.get(1) {
        Some(number) => number.as_str().parse().ok().map(Some),
        None => Some(None),
    }
}

/// Raw percentage from a tagged or native progress line.
pub fn progress_marker(line: &str) -> Option<f64> {
    let p = patterns();
    let caps = p
        .tagged_progress
        .captures(line)
        .or_else(|| p.native_progress.captures(line))?;
    caps[1].parse().ok()
}

pub fn is_report_begin(line: &str) -> bool {
    line == REPORT_BEGIN
}

pub fn is_report_end(line: &str) -> bool {
    line == REPORT_END
}

/// Match a `key: value` report line. Outside a tagged block only the keys
/// the f3 tools print themselves are accepted (`native_only`).
pub fn report_field(line: &str, native_only: bool) -> Option<(Field, &str)> {
    let caps = patterns().field.captures(line)?;
    let key = normalize_key(caps.get(1)?.as_str());
    let value = caps.get(2)?.as_str();

    FIELD_KEYS
        .iter()
        .find(|(name, _, native)| *name == key && (*native || !native_only))
        .map(|(_, field, _)| (*field, value))
}

/// f3probe's verdict: `Good news: ...` or `Bad news: ...`.
pub fn verdict(line: &str) -> Option<bool> {
    if line.starts_with("Good news:") {
        Some(true)
    } else if line.starts_with("Bad news:") {
        Some(false)
    } else {
        None
    }
}

/// Last sector from f3probe's `f3fix --last-sec=N /dev/sdX` suggestion.
pub fn fix_hint(line: &str) -> Option<u64> {
    patterns().fix_hint.captures(line)?[1].parse().ok()
}

fn normalize_key(key: &str) -> String {
    key.replace('*', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

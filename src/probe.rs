//! Discovery of the installed f3 tools
//!
//! Probing never fails: a tool that cannot be found, started, or understood
//! simply shows up as absent.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

use crate::config::ToolConfig;
use crate::error::ErrorCode;

/// First f3 release whose f3write/f3read accept `--show-progress`.
pub const PROGRESS_MIN_VERSION: Version = Version { major: 6, minor: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    /// Parse the `F3 read 8.0` style banner the tools print for `--version`.
    pub fn from_banner(text: &str) -> Option<Self> {
        static BANNER: OnceLock<Regex> = OnceLock::new();
        let banner = BANNER.get_or_init(|| {
            Regex::new(r"F3\s+[A-Za-z]+\s+(\d+)\.(\d+)").expect("banner regex is valid")
        });

        let caps = banner.captures(text)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Write,
    Read,
    Probe,
    Fix,
}

impl Tool {
    pub fn executable_name(self, tools: &ToolConfig) -> &str {
        match self {
            Tool::Write => &tools.write,
            Tool::Read => &tools.read,
            Tool::Probe => &tools.probe,
            Tool::Fix => &tools.fix,
        }
    }
}

/// What this installation can do.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Capabilities {
    pub write: Option<PathBuf>,
    pub read: Option<PathBuf>,
    pub probe: Option<PathBuf>,
    pub fix: Option<PathBuf>,
    /// Version reported by f3read.
    pub version: Option<Version>,
}

impl Capabilities {
    pub async fn discover(tools: &ToolConfig, probe_timeout: Duration) -> Self {
        let write = detect(&tools.write, tools);
        let read = detect(&tools.read, tools);
        let probe = detect(&tools.probe, tools);
        let fix = detect(&tools.fix, tools);

        let version = match &read {
            Some(path) => probe_version(path, probe_timeout).await,
            None => None,
        };

        let caps = Self {
            write,
            read,
            probe,
            fix,
            version,
        };
        tracing::info!(
            write = ?caps.write,
            read = ?caps.read,
            probe = ?caps.probe,
            fix = ?caps.fix,
            version = ?caps.version,
            "discovered f3 tools"
        );
        caps
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Write => self.write.as_deref(),
            Tool::Read => self.read.as_deref(),
            Tool::Probe => self.probe.as_deref(),
            Tool::Fix => self.fix.as_deref(),
        }
    }

    /// f3write and f3read are both present; without them nothing can run.
    pub fn has_cui(&self) -> bool {
        self.write.is_some() && self.read.is_some()
    }

    pub fn quick_mode_supported(&self) -> bool {
        self.probe.is_some() && self.fix.is_some()
    }

    /// Whether f3write/f3read can be asked for `--show-progress`.
    pub fn shows_progress(&self) -> bool {
        self.version.is_some_and(|v| v >= PROGRESS_MIN_VERSION)
    }

    /// Capability-related codes this installation can run into.
    pub fn missing_features(&self) -> Vec<ErrorCode> {
        let mut codes = Vec::new();
        if !self.has_cui() {
            codes.push(ErrorCode::NoCui);
        }
        if self.probe.is_none() {
            codes.push(ErrorCode::NoQuick);
        }
        if self.fix.is_none() {
            codes.push(ErrorCode::NoFix);
        }
        if !self.shows_progress() {
            codes.push(ErrorCode::NoProgress);
        }
        codes
    }
}

/// Resolve `name` to an executable file.
///
/// Names containing a path separator are checked as given. Bare names are
/// looked up in the configured search directories, then in `PATH`.
pub fn detect(name: &str, tools: &ToolConfig) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    let system_dirs = if tools.use_system_path {
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    tools
        .search_dirs
        .iter()
        .chain(system_dirs.iter())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o111 != 0
        } else {
            true
        }
    }
}

/// Run `<path> --version` and parse its banner.
pub async fn probe_version(path: &Path, timeout: Duration) -> Option<Version> {
    let output = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!("Failed to probe {}: {}", path.display(), e);
            return None;
        }
        Err(_) => {
            tracing::warn!("Version probe of {} timed out", path.display());
            return None;
        }
    };

    // Older releases print the banner before complaining about the flag.
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Version::from_banner(&text)
}

//! Run options and the registry that validates them
//!
//! Options are addressed by string key so collaborators can wire them
//! straight from checkboxes or command-line flags. Every key and value is
//! checked against a fixed allow-list; anything else is rejected and the
//! stored options stay as they were.

use std::fmt;

use serde::Serialize;

pub const OPTION_KEYS: [&str; 4] = ["mode", "cache", "memory", "destructive"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// f3write followed by f3read against a mounted filesystem.
    #[default]
    Legacy,
    /// f3probe directly against a block device.
    Quick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    #[serde(rename = "none")]
    Off,
    /// Reuse `*.h2w` files left by an earlier f3write.
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    Minimum,
    #[default]
    Full,
}

impl TestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::Legacy => "legacy",
            TestMode::Quick => "quick",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "legacy" => Some(TestMode::Legacy),
            "quick" => Some(TestMode::Quick),
            _ => None,
        }
    }
}

impl CacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::Off => "none",
            CacheMode::Write => "write",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(CacheMode::Off),
            "write" => Some(CacheMode::Write),
            _ => None,
        }
    }
}

impl MemoryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryMode::Minimum => "minimum",
            MemoryMode::Full => "full",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "minimum" => Some(MemoryMode::Minimum),
            "full" => Some(MemoryMode::Full),
            _ => None,
        }
    }
}

fn parse_yes_no(value: &str) -> Option<bool> {
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// A complete, validated set of run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunOptions {
    pub mode: TestMode,
    pub cache: CacheMode,
    pub memory: MemoryMode,
    pub destructive: bool,
}

impl RunOptions {
    /// Apply one `key = value` pair. Returns `false` and leaves `self`
    /// untouched when either side is not recognised.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        match key {
            "mode" => TestMode::parse(value).map(|v| self.mode = v).is_some(),
            "cache" => CacheMode::parse(value).map(|v| self.cache = v).is_some(),
            "memory" => MemoryMode::parse(value).map(|v| self.memory = v).is_some(),
            "destructive" => parse_yes_no(value).map(|v| self.destructive = v).is_some(),
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&'static str> {
        match key {
            "mode" => Some(self.mode.as_str()),
            "cache" => Some(self.cache.as_str()),
            "memory" => Some(self.memory.as_str()),
            "destructive" => Some(if self.destructive { "yes" } else { "no" }),
            _ => None,
        }
    }
}

impl fmt::Display for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = OPTION_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| format!("{}={}", key, value)))
            .collect();
        write!(f, "{}", pairs.join(" "))
    }
}

/// Holds the options for the next run and refuses changes while one is live.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    options: RunOptions,
    locked: bool,
}

impl OptionRegistry {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            locked: false,
        }
    }

    pub fn set_option(&mut self, key: &str, value: &str) -> bool {
        if self.locked {
            tracing::debug!(key, value, "option change rejected while a run is active");
            return false;
        }
        let accepted = self.options.set(key, value);
        if !accepted {
            tracing::debug!(key, value, "option rejected");
        }
        accepted
    }

    /// Last accepted value for `key`, or its default. `None` for unknown keys.
    pub fn option(&self, key: &str) -> Option<String> {
        self.options.get(key).map(str::to_string)
    }

    /// Freeze the current options for a run and hand out the snapshot.
    pub fn lock(&mut self) -> RunOptions {
        self.locked = true;
        self.options
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }
}

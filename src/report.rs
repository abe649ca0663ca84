//! Test report produced at the end of a run

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Serialize, Serializer};

/// Availability value meaning "could not be determined".
pub const AVAILABILITY_UNKNOWN: f64 = -1.0;

/// A measurement as printed by the tools, or one of the two sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Measurement {
    Value(String),
    /// The tool did not report this field.
    #[default]
    Unavailable,
    /// Replaces the reported free space after a successful capacity fix.
    Fixed,
}

impl Measurement {
    pub fn value(&self) -> Option<&str> {
        match self {
            Measurement::Value(v) => Some(v),
            Measurement::Unavailable | Measurement::Fixed => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Measurement::Unavailable)
    }

    /// Size in bytes, when the value starts with an f3-style size.
    pub fn bytes(&self) -> Option<f64> {
        self.value().and_then(parse_size)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Value(v) => f.write_str(v),
            Measurement::Unavailable => f.write_str("(N/A)"),
            Measurement::Fixed => f.write_str("(Fixed)"),
        }
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// No bad regions were found. A clean exit can still carry `false`.
    pub success: bool,
    pub reading_speed: Measurement,
    pub writing_speed: Measurement,
    pub reported_free: Measurement,
    pub actual_free: Measurement,
    pub lost_space: Measurement,
    /// Fraction of the claimed capacity that is real, or [`AVAILABILITY_UNKNOWN`].
    pub availability: f64,
    pub module_size: Measurement,
    pub block_size: Measurement,
    /// Last usable sector, as recommended to f3fix.
    pub last_sector: Option<u64>,
    pub completed_at: DateTime<Utc>,
}

impl Report {
    pub fn availability(&self) -> Option<f64> {
        (self.availability >= 0.0).then_some(self.availability)
    }

    /// The device holds less than it claims.
    pub fn capacity_mismatch(&self) -> bool {
        self.last_sector.is_some() || self.availability().is_some_and(|a| a < 1.0)
    }

    pub fn is_fixed(&self) -> bool {
        self.reported_free == Measurement::Fixed
    }

    /// The report that stands after a successful fix.
    pub fn fixed(&self) -> Report {
        Report {
            reported_free: Measurement::Fixed,
            completed_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Fields of the report block, in the order the tools tend to print them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Success,
    ReadingSpeed,
    WritingSpeed,
    ReportedFree,
    ActualFree,
    LostSpace,
    Availability,
    ModuleSize,
    BlockSize,
    LastSector,
}

/// Collects report fields line by line and fills in what can be derived.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    success: Option<bool>,
    verdict: Option<bool>,
    reading_speed: Option<String>,
    writing_speed: Option<String>,
    reported_free: Option<String>,
    actual_free: Option<String>,
    lost_space: Option<String>,
    availability: Option<f64>,
    module_size: Option<String>,
    block_size: Option<String>,
    last_sector: Option<u64>,
}

impl ReportBuilder {
    /// Record one field. Values that do not parse for their field, and empty
    /// values, are dropped and leave the field unavailable.
    pub fn set(&mut self, field: Field, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }

        let text = Some(value.to_string());
        match field {
            Field::Success => return set_parsed(&mut self.success, parse_flag(value)),
            Field::Availability => {
                return set_parsed(&mut self.availability, parse_availability(value))
            }
            Field::LastSector => return set_parsed(&mut self.last_sector, value.parse().ok()),
            Field::ReadingSpeed => self.reading_speed = text,
            Field::WritingSpeed => self.writing_speed = text,
            Field::ReportedFree => self.reported_free = text,
            Field::ActualFree => self.actual_free = text,
            Field::LostSpace => self.lost_space = text,
            Field::ModuleSize => self.module_size = text,
            Field::BlockSize => self.block_size = text,
        }
        true
    }

    /// f3probe's "Good news"/"Bad news" line.
    pub fn set_verdict(&mut self, genuine: bool) {
        self.verdict = Some(genuine);
    }

    pub fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Success => self.success.is_some(),
            Field::ReadingSpeed => self.reading_speed.is_some(),
            Field::WritingSpeed => self.writing_speed.is_some(),
            Field::ReportedFree => self.reported_free.is_some(),
            Field::ActualFree => self.actual_free.is_some(),
            Field::LostSpace => self.lost_space.is_some(),
            Field::Availability => self.availability.is_some(),
            Field::ModuleSize => self.module_size.is_some(),
            Field::BlockSize => self.block_size.is_some(),
            Field::LastSector => self.last_sector.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_none()
            && self.verdict.is_none()
            && self.reading_speed.is_none()
            && self.writing_speed.is_none()
            && self.reported_free.is_none()
            && self.actual_free.is_none()
            && self.lost_space.is_none()
            && self.availability.is_none()
            && self.module_size.is_none()
            && self.block_size.is_none()
            && self.last_sector.is_none()
    }

    pub fn build(self) -> Report {
        let mut report = Report {
            success: false,
            reading_speed: measurement(self.reading_speed),
            writing_speed: measurement(self.writing_speed),
            reported_free: measurement(self.reported_free),
            actual_free: measurement(self.actual_free),
            lost_space: measurement(self.lost_space),
            availability: AVAILABILITY_UNKNOWN,
            module_size: measurement(self.module_size),
            block_size: measurement(self.block_size),
            last_sector: self.last_sector,
            completed_at: Utc::now(),
        };

        report.availability = self
            .availability
            .or_else(|| derive_availability(&report))
            .unwrap_or(AVAILABILITY_UNKNOWN);

        let lost_nothing = report.lost_space.bytes().map(|lost| lost == 0.0);
        let fully_available = report.availability().map(|a| a >= 1.0);
        report.success = self
            .success
            .or(self.verdict)
            .or(lost_nothing)
            .or(fully_available)
            .unwrap_or(false);

        report
    }
}

fn set_parsed<T>(slot: &mut Option<T>, parsed: Option<T>) -> bool {
    match parsed {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

fn measurement(value: Option<String>) -> Measurement {
    value.map(Measurement::Value).unwrap_or_default()
}

/// ok / (ok + lost) when both are known, otherwise usable / announced.
fn derive_availability(report: &Report) -> Option<f64> {
    let actual = report.actual_free.bytes()?;

    if let Some(lost) = report.lost_space.bytes() {
        let total = actual + lost;
        return (total > 0.0).then(|| (actual / total).clamp(0.0, 1.0));
    }

    let reported = report.reported_free.bytes()?;
    (reported > 0.0).then(|| (actual / reported).clamp(0.0, 1.0))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "ok" | "pass" => Some(true),
        "no" | "false" | "0" | "fail" => Some(false),
        _ => None,
    }
}

/// `0.87`, `87%` and `87.5 %` are all accepted. A bare number above 1 is a
/// percentage.
fn parse_availability(value: &str) -> Option<f64> {
    let (number, percent) = match value.strip_suffix('%') {
        Some(number) => (number.trim(), true),
        None => (value, false),
    };
    let number = number.parse::<f64>().ok()?;
    let fraction = if percent || number > 1.0 {
        number / 100.0
    } else {
        number
    };
    fraction.is_finite().then(|| fraction.clamp(0.0, 1.0))
}

/// Parse the leading size of an f3 measurement such as `14.83 GB (31100000 sectors)`.
///
/// f3 scales by 1024 regardless of the unit spelling.
pub fn parse_size(text: &str) -> Option<f64> {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    let size = SIZE.get_or_init(|| {
        Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(Bytes?|B|KB|KiB|MB|MiB|GB|GiB|TB|TiB|PB|PiB)\b")
            .expect("size regex is valid")
    });

    let caps = size.captures(text)?;
    let number: f64 = caps[1].parse().ok()?;
    let power = match &caps[2] {
        "Byte" | "Bytes" | "B" => 0,
        "KB" | "KiB" => 1,
        "MB" | "MiB" => 2,
        "GB" | "GiB" => 3,
        "TB" | "TiB" => 4,
        _ => 5,
    };
    Some(number * 1024f64.powi(power))
}

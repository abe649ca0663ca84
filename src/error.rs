//! Error taxonomy shared by the engine and its collaborators

use serde::Serialize;
use thiserror::Error;

/// Outcome codes reported by the engine.
///
/// The set is closed: every failure the engine can observe maps onto exactly
/// one of these. The numeric values match the exit statuses used by the `f3l`
/// binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Error, Serialize)]
pub enum ErrorCode {
    #[default]
    #[error("no error")]
    Ok,
    #[error("device path not found")]
    PathIncorrect,
    #[error("cannot find f3read/f3write")]
    NoCui,
    #[error("permission denied")]
    NoPermission,
    #[error("not enough space for checking")]
    NoSpace,
    #[error("installed f3 is too old to report progress")]
    NoProgress,
    #[error("f3probe not found, quick mode unavailable")]
    NoQuick,
    #[error("no cached data found, testing from writing")]
    CacheNotFound,
    #[error("not enough memory for checking")]
    NoMemory,
    #[error("path is not a directory")]
    NotDirectory,
    #[error("device is not a disk")]
    NotDisk,
    #[error("device is not backed by USB")]
    NotUSB,
    #[error("f3fix not found, capacity cannot be fixed")]
    NoFix,
    #[error("no completed test result")]
    NoReport,
    #[error("detected capacity cannot be used for fixing")]
    Oversize,
    #[error("device is inaccessible or damaged")]
    Damaged,
    #[error("path is not a valid device")]
    NotDevice,
    #[error("unknown error")]
    Unknown,
}

impl ErrorCode {
    /// Stable numeric value of the code.
    pub fn code(self) -> u8 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::PathIncorrect => 128,
            ErrorCode::NoCui => 129,
            ErrorCode::NoPermission => 130,
            ErrorCode::NoSpace => 131,
            ErrorCode::NoProgress => 132,
            ErrorCode::NoQuick => 133,
            ErrorCode::CacheNotFound => 134,
            ErrorCode::NoMemory => 135,
            ErrorCode::NotDirectory => 136,
            ErrorCode::NotDisk => 137,
            ErrorCode::NotUSB => 138,
            ErrorCode::NoFix => 139,
            ErrorCode::NoReport => 140,
            ErrorCode::Oversize => 141,
            ErrorCode::Damaged => 142,
            ErrorCode::NotDevice => 143,
            ErrorCode::Unknown => 255,
        }
    }

    /// Whether a run classified with this code still produced a usable result.
    pub fn is_success(self) -> bool {
        matches!(self, ErrorCode::Ok | ErrorCode::CacheNotFound)
    }

    /// `NoCui` is the only code that rules out every further run.
    pub fn is_fatal(self) -> bool {
        self == ErrorCode::NoCui
    }
}

/// Reasons an engine request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Rejected(#[from] ErrorCode),

    #[error("a check is already running")]
    Busy,

    #[error("engine has shut down")]
    Closed,
}

impl EngineError {
    /// The taxonomy code behind this error, if it carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            EngineError::Rejected(code) => Some(*code),
            EngineError::Busy | EngineError::Closed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

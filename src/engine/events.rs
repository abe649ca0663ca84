//! Events emitted by the engine
//!
//! Every observer gets the same ordered stream: status transitions carrying
//! the stage and (for `Finished`) the report, and error codes. Errors are a
//! separate event so that the stage updates preceding a failure survive.

use std::sync::Arc;

use serde::Serialize;

use crate::error::ErrorCode;
use crate::options::RunOptions;
use crate::report::Report;
use crate::status::{StageInfo, Status};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub status: Status,
    pub stage: StageInfo,
    /// Present exactly when `status` is `Finished`.
    pub report: Option<Arc<Report>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    StatusChanged(StatusChange),
    Error(ErrorCode),
}

impl EngineEvent {
    pub fn status(&self) -> Option<Status> {
        match self {
            EngineEvent::StatusChanged(change) => Some(change.status),
            EngineEvent::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<ErrorCode> {
        match self {
            EngineEvent::Error(code) => Some(*code),
            EngineEvent::StatusChanged(_) => None,
        }
    }
}

/// Engine state as last published. Readable from any handle without a
/// round trip to the engine task.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub status: Status,
    pub stage: StageInfo,
    pub report: Option<Arc<Report>>,
    /// Last error code emitted for a run, `Ok` when the last run succeeded.
    pub error: ErrorCode,
    pub options: RunOptions,
    /// A tool process is live.
    pub active: bool,
}

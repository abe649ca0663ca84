//! f3-launcher: runs the f3 flash memory test tools and reports what they find
//!
//! The [`engine`] drives f3write/f3read (a full write and read-back of a
//! mounted filesystem) or f3probe (a fast probe of a block device), turns
//! their output into stage/progress updates and a final [`report::Report`],
//! and can shrink a fake device to its real capacity with f3fix.

pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod parser;
pub mod probe;
pub mod process;
pub mod report;
pub mod status;

pub use engine::{Engine, EngineEvent, EngineHandle, EventReceiver, Snapshot, StatusChange};
pub use error::{EngineError, ErrorCode};
pub use status::{StageInfo, Status};

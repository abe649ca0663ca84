//! Run status and stage/progress tracking

use serde::Serialize;

/// Progress value meaning "the tool gives no incremental signal right now".
pub const PROGRESS_INDETERMINATE: i32 = -1;
/// Progress is measured in hundredths of a percent.
pub const PROGRESS_MAX: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Status {
    #[default]
    Ready,
    Running,
    Staged,
    Progressed,
    Finished,
    Stopped,
}

impl Status {
    /// A run is live in this status.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Running | Status::Staged | Status::Progressed)
    }

    /// Legal edges of the run state machine.
    ///
    /// `Ready` is reachable from a live run only when that run fails; a
    /// finished or stopped engine goes back to `Running` when a new run starts.
    pub fn can_transition_to(self, next: Status) -> bool {
        match (self, next) {
            (Status::Ready | Status::Finished | Status::Stopped, Status::Running) => true,
            (
                Status::Running | Status::Staged | Status::Progressed,
                Status::Staged
                | Status::Progressed
                | Status::Finished
                | Status::Stopped
                | Status::Ready,
            ) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StageInfo {
    /// Monotonic within a run; 0 before the first stage begins.
    pub stage: u32,
    /// 0..=10000, or [`PROGRESS_INDETERMINATE`].
    pub progress: i32,
}

impl Default for StageInfo {
    fn default() -> Self {
        Self {
            stage: 0,
            progress: PROGRESS_INDETERMINATE,
        }
    }
}

impl StageInfo {
    pub fn is_indeterminate(&self) -> bool {
        self.progress == PROGRESS_INDETERMINATE
    }

    pub fn percent(&self) -> Option<f64> {
        (!self.is_indeterminate()).then(|| f64::from(self.progress) / 100.0)
    }
}

/// Convert a raw percentage into hundredths of a percent, clamped to range.
pub fn progress_from_percent(percent: f64) -> i32 {
    if percent.is_nan() {
        return 0;
    }
    (percent * 100.0).round().clamp(0.0, f64::from(PROGRESS_MAX)) as i32
}

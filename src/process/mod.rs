//! Launching and supervising the f3 tools
//!
//! A [`Supervisor`] owns exactly one child process. stdout is read on demand
//! by whoever drives the run; stderr is drained in the background into a
//! bounded tail that is handed to the classifier once the process exits.

mod plan;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix::request_stop;
    } else {
        fn request_stop(_pid: u32) -> bool {
            false
        }
    }
}

pub use plan::{
    fix_args, has_cache_files, legacy_args, plan_check, plan_fix, quick_args, validate_target,
    Phase, CACHE_EXTENSION, MAX_FIX_SECTOR,
};

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::ErrorCode;
use crate::probe::Tool;

const READ_CHUNK: usize = 8 * 1024;
/// Only the end of stderr matters for classification.
const STDERR_TAIL: usize = 64 * 1024;
const STDERR_DRAIN: Duration = Duration::from_millis(500);

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process died from a signal.
    pub code: Option<i32>,
    /// The engine had to kill it.
    pub forced: bool,
}

impl ProcessExit {
    pub fn from_status(status: ExitStatus, forced: bool) -> Self {
        Self {
            code: status.code(),
            forced,
        }
    }

    pub fn success(&self) -> bool {
        !self.forced && self.code == Some(0)
    }
}

#[derive(Debug)]
pub enum ProcessIo {
    Output(Vec<u8>),
    Exited(ProcessExit),
}

pub struct Supervisor {
    tool: Tool,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    buf: Vec<u8>,
}

/// Map a failed spawn onto the taxonomy. A tool that vanished after
/// discovery is reported as that tool being unavailable.
pub fn spawn_error(tool: Tool, err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::NotFound => match tool {
            Tool::Write | Tool::Read => ErrorCode::NoCui,
            Tool::Probe => ErrorCode::NoQuick,
            Tool::Fix => ErrorCode::NoFix,
        },
        io::ErrorKind::PermissionDenied => ErrorCode::NoPermission,
        _ => ErrorCode::Unknown,
    }
}

impl Supervisor {
    pub fn spawn(phase: &Phase) -> Result<Self, ErrorCode> {
        let mut child = Command::new(&phase.program)
            .args(&phase.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::warn!("Failed to spawn {}: {}", phase.program.display(), e);
                spawn_error(phase.tool, &e)
            })?;

        tracing::info!(
            tool = ?phase.tool,
            pid = ?child.id(),
            args = ?phase.args,
            "spawned {}",
            phase.program.display()
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take().map(|s| tokio::spawn(collect_tail(s)));

        Ok(Self {
            tool: phase.tool,
            child,
            stdout,
            stderr,
            buf: vec![0; READ_CHUNK],
        })
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Next chunk of stdout, or the exit once stdout is closed.
    ///
    /// Cancel safe: dropping the future loses no output.
    pub async fn next(&mut self) -> ProcessIo {
        if let Some(stdout) = self.stdout.as_mut() {
            match stdout.read(&mut self.buf).await {
                Ok(0) => self.stdout = None,
                Ok(n) => return ProcessIo::Output(self.buf[..n].to_vec()),
                Err(e) => {
                    tracing::warn!("Failed to read {:?} output: {}", self.tool, e);
                    self.stdout = None;
                }
            }
        }

        match self.child.wait().await {
            Ok(status) => ProcessIo::Exited(ProcessExit::from_status(status, false)),
            Err(e) => {
                tracing::warn!("Failed to wait for {:?}: {}", self.tool, e);
                ProcessIo::Exited(ProcessExit {
                    code: None,
                    forced: false,
                })
            }
        }
    }

    /// Collected stderr. Call after the process has exited.
    pub async fn take_stderr(&mut self) -> String {
        let Some(mut handle) = self.stderr.take() else {
            return String::new();
        };

        match tokio::time::timeout(STDERR_DRAIN, &mut handle).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!("stderr collector failed: {}", e);
                String::new()
            }
            Err(_) => {
                tracing::warn!("stderr of {:?} still open after exit", self.tool);
                handle.abort();
                String::new()
            }
        }
    }

    /// Stop the process: SIGTERM, then SIGKILL once `grace` has passed.
    pub async fn terminate(&mut self, grace: Duration) -> ProcessExit {
        if let Ok(Some(status)) = self.child.try_wait() {
            self.release();
            return ProcessExit::from_status(status, false);
        }

        if self.child.id().is_some_and(request_stop) {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(tool = ?self.tool, "exited after SIGTERM");
                    self.release();
                    return ProcessExit::from_status(status, false);
                }
                Ok(Err(e)) => tracing::warn!("Failed to wait for {:?}: {}", self.tool, e),
                Err(_) => tracing::info!(
                    "{:?} did not exit within {:?}, killing it",
                    self.tool,
                    grace
                ),
            }
        }

        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill {:?}: {}", self.tool, e);
        }
        let code = match self.child.try_wait() {
            Ok(Some(status)) => status.code(),
            _ => None,
        };
        self.release();
        ProcessExit { code, forced: true }
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.release();
    }
}

async fn collect_tail(mut stderr: ChildStderr) -> String {
    let mut tail = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL {
                    let excess = tail.len() - STDERR_TAIL;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

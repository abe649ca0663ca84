//! The test orchestration engine
//!
//! A single task owns all run state. [`EngineHandle`]s send it commands;
//! what happens flows back as an ordered stream of [`EngineEvent`]s and as a
//! published [`Snapshot`]. Dropping every handle stops any live run and ends
//! the task.

mod events;
mod session;

pub use events::{EngineEvent, Snapshot, StatusChange};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::classify::{self, RunFacts};
use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorCode, Result};
use crate::options::{CacheMode, OptionRegistry, TestMode};
use crate::parser::{ParseOutcome, ParserEvent};
use crate::probe::Capabilities;
use crate::process::{self, Phase, ProcessExit, ProcessIo};
use crate::report::Report;
use crate::status::{StageInfo, Status};
use session::{Advance, RunKind, RunSession};

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

enum Command {
    SetOption {
        key: String,
        value: String,
        reply: oneshot::Sender<bool>,
    },
    StartCheck {
        target: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    StartFix {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    capabilities: Arc<Capabilities>,
}

impl EngineHandle {
    /// Set an option for the next run. Rejected while a run is live and for
    /// unknown keys or values.
    pub async fn set_option(&self, key: &str, value: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let command = Command::SetOption {
            key: key.to_string(),
            value: value.to_string(),
            reply,
        };
        if self.commands.send(command).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn option(&self, key: &str) -> Option<String> {
        self.snapshot.borrow().options.get(key).map(str::to_string)
    }

    /// Start a check of `target`: a mounted directory in legacy mode, a
    /// block device in quick mode.
    pub async fn start_check(&self, target: impl Into<PathBuf>) -> Result<()> {
        let target = target.into();
        self.request(|reply| Command::StartCheck { target, reply })
            .await
    }

    /// Shrink the reported capacity of the last checked device to what the
    /// check found usable.
    pub async fn start_fix(&self) -> Result<()> {
        self.request(|reply| Command::StartFix { reply }).await
    }

    /// Stop the live run, if any. Returns once the tool has exited.
    pub async fn stop_check(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<()>>) -> Command,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub fn status(&self) -> Status {
        self.snapshot.borrow().status
    }

    pub fn stage(&self) -> StageInfo {
        self.snapshot.borrow().stage
    }

    pub fn report(&self) -> Option<Arc<Report>> {
        self.snapshot.borrow().report.clone()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.snapshot.borrow().error
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.borrow().active
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every published change after this call.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        let mut rx = self.snapshot.clone();
        rx.borrow_and_update();
        rx
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

pub struct Engine {
    config: EngineConfig,
    capabilities: Arc<Capabilities>,
    registry: OptionRegistry,
    /// f3write/f3read are missing; nothing can ever run.
    disabled: bool,
    status: Status,
    stage: StageInfo,
    report: Option<Arc<Report>>,
    error: ErrorCode,
    /// Device or directory the current report was measured on.
    report_target: Option<PathBuf>,
    session: Option<RunSession>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<EngineEvent>,
    snapshot: watch::Sender<Snapshot>,
}

impl Engine {
    /// Discover the installed tools and start the engine task.
    pub async fn launch(config: EngineConfig) -> (EngineHandle, EventReceiver) {
        let capabilities = Capabilities::discover(&config.tools, config.timeouts.probe()).await;
        Self::launch_with(config, capabilities)
    }

    /// Start the engine task with known capabilities. Must be called from
    /// within a tokio runtime.
    pub fn launch_with(
        config: EngineConfig,
        capabilities: Capabilities,
    ) -> (EngineHandle, EventReceiver) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let registry = config.option_registry();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot {
            options: registry.options(),
            ..Snapshot::default()
        });
        let capabilities = Arc::new(capabilities);

        let mut engine = Engine {
            config,
            capabilities: capabilities.clone(),
            registry,
            disabled: !capabilities.has_cui(),
            status: Status::Ready,
            stage: StageInfo::default(),
            report: None,
            error: ErrorCode::Ok,
            report_target: None,
            session: None,
            commands: command_rx,
            events: event_tx,
            snapshot: snapshot_tx,
        };

        if engine.disabled {
            tracing::error!("f3write/f3read not found, checks are disabled");
            engine.error = ErrorCode::NoCui;
            engine.emit(EngineEvent::Error(ErrorCode::NoCui));
            engine.publish();
        }

        tokio::spawn(engine.run());

        let handle = EngineHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            capabilities,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                io = next_io(&mut self.session) => self.handle_io(io).await,
            }
        }

        if self.session.is_some() {
            tracing::info!("All engine handles dropped, stopping the live run");
            self.stop().await;
        }
        tracing::debug!("engine task finished");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetOption { key, value, reply } => {
                let accepted = self.registry.set_option(&key, &value);
                if accepted {
                    self.publish();
                }
                let _ = reply.send(accepted);
            }
            Command::StartCheck { target, reply } => {
                let result = self.start_check(target);
                let _ = reply.send(result);
            }
            Command::StartFix { reply } => {
                let result = self.start_fix();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_io(&mut self, io: ProcessIo) {
        match io {
            ProcessIo::Output(bytes) => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let fix = session.is_fix();
                let events = session.parser.feed(&bytes);
                self.apply(events, fix);
            }
            ProcessIo::Exited(exit) => self.phase_exited(exit).await,
        }
    }

    fn start_check(&mut self, target: PathBuf) -> Result<()> {
        if self.disabled {
            return Err(ErrorCode::NoCui.into());
        }
        if self.session.is_some() {
            return Err(EngineError::Busy);
        }

        let options = self.registry.options();
        let quick = options.mode == TestMode::Quick;
        let mut facts = RunFacts {
            tool_missing: !self.capabilities.has_cui(),
            quick_requested: quick,
            quick_available: self.capabilities.probe.is_some(),
            cache_requested: !quick && options.cache == CacheMode::Write,
            cache_found: false,
        };

        if let Some(code) = classify::preflight(&facts) {
            return self.reject(code);
        }
        if let Err(code) = process::validate_target(&target, options.mode) {
            return self.reject(code);
        }
        if facts.cache_requested {
            facts.cache_found = process::has_cache_files(&target);
        }
        let phases = match process::plan_check(
            &target,
            &options,
            &self.capabilities,
            facts.cache_found,
        ) {
            Ok(phases) => phases,
            Err(code) => return self.reject(code),
        };

        // Advisories: the run goes ahead regardless.
        if !quick && !self.capabilities.shows_progress() {
            self.emit(EngineEvent::Error(ErrorCode::NoProgress));
        }
        if quick && self.capabilities.fix.is_none() {
            self.emit(EngineEvent::Error(ErrorCode::NoFix));
        }

        self.begin(RunKind::Check, target, facts, phases)
    }

    fn start_fix(&mut self) -> Result<()> {
        if self.disabled {
            return Err(ErrorCode::NoCui.into());
        }
        if self.session.is_some() {
            return Err(EngineError::Busy);
        }

        let base = match &self.report {
            Some(report)
                if self.status == Status::Finished
                    && report.capacity_mismatch()
                    && !report.is_fixed() =>
            {
                report.clone()
            }
            _ => return self.reject(ErrorCode::NoReport),
        };
        let (Some(last_sector), Some(target)) = (base.last_sector, self.report_target.clone())
        else {
            return self.reject(ErrorCode::NoReport);
        };

        let phases = match process::plan_fix(&target, &self.capabilities, last_sector) {
            Ok(phases) => phases,
            Err(code) => return self.reject(code),
        };
        self.begin(RunKind::Fix { base }, target, RunFacts::default(), phases)
    }

    fn begin(
        &mut self,
        kind: RunKind,
        target: PathBuf,
        facts: RunFacts,
        phases: Vec<Phase>,
    ) -> Result<()> {
        let fix = matches!(kind, RunKind::Fix { .. });
        let (session, staged) = match RunSession::start(kind, target, facts, phases) {
            Ok(started) => started,
            Err(code) => return self.reject(code),
        };

        let options = self.registry.lock();
        tracing::info!(
            run_id = %session.id,
            target = %session.target.display(),
            %options,
            fix,
            "run started"
        );

        self.session = Some(session);
        self.report = None;
        self.report_target = None;
        self.stage = StageInfo::default();
        self.error = ErrorCode::Ok;
        self.set_status(Status::Running);
        self.apply(staged, fix);
        Ok(())
    }

    /// Refuse a request with `code`. The status is left as it was.
    fn reject(&mut self, code: ErrorCode) -> Result<()> {
        tracing::warn!("Run rejected: {}", code);
        self.error = code;
        self.emit(EngineEvent::Error(code));
        self.publish();
        Err(EngineError::Rejected(code))
    }

    async fn phase_exited(&mut self, exit: ProcessExit) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let fix = session.is_fix();
        let stderr = session.supervisor.take_stderr().await;
        session.stderr.push_str(&stderr);
        tracing::info!(
            run_id = %session.id,
            tool = ?session.supervisor.tool(),
            code = ?exit.code,
            "tool exited"
        );
        let flushed = session.parser.flush();
        self.apply(flushed, fix);

        if exit.success() {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            match session.advance() {
                Advance::Started(staged) => {
                    self.apply(staged, fix);
                    return;
                }
                Advance::Failed(code) => {
                    self.conclude(code);
                    return;
                }
                Advance::Done => {}
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        // Partial plain output of a failed tool does not make a report.
        let (events, outcome) = if exit.success() {
            session.parser.finish()
        } else {
            (Vec::new(), ParseOutcome::Truncated)
        };
        let stderr = std::mem::take(&mut session.stderr);
        let facts = session.facts;
        self.apply(events, fix);

        // f3fix prints no report; its exit status is the whole story.
        let outcome = if fix {
            ParseOutcome::Complete
        } else {
            outcome
        };
        let code = classify::classify(&exit, &stderr, outcome, &facts);
        self.conclude(code);
    }

    /// End the live run with its classification.
    ///
    /// A failure emits the code and then returns to `Ready`, unless the run
    /// had already delivered its report, which stands.
    fn conclude(&mut self, code: ErrorCode) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let run_id = session.id;
        let fixed = match &session.kind {
            RunKind::Fix { base } if code.is_success() => {
                Some((base.fixed(), session.target.clone()))
            }
            _ => None,
        };

        if let Some((report, target)) = fixed {
            self.report = Some(Arc::new(report));
            self.report_target = Some(target);
            self.set_status(Status::Finished);
        }

        self.error = code;
        if code != ErrorCode::Ok {
            self.emit(EngineEvent::Error(code));
        }
        if !code.is_success() && self.status != Status::Finished {
            self.report = None;
            self.report_target = None;
            self.set_status(Status::Ready);
        }

        self.session = None;
        self.registry.unlock();
        tracing::info!(run_id = %run_id, code = %code, "run concluded");
        self.publish();
    }

    async fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("stop requested with no live run");
            return;
        };

        let exit = session
            .supervisor
            .terminate(self.config.timeouts.stop_grace())
            .await;
        tracing::info!(run_id = %session.id, forced = exit.forced, "run stopped");

        // A report already delivered stands; otherwise the run is abandoned.
        if self.status.is_active() {
            self.set_status(Status::Stopped);
        }
        self.session = None;
        self.registry.unlock();
        self.publish();
    }

    fn apply(&mut self, events: impl IntoIterator<Item = ParserEvent>, fix: bool) {
        for event in events {
            match event {
                ParserEvent::Staged(stage) => {
                    self.stage = stage;
                    self.set_status(Status::Staged);
                }
                ParserEvent::Progressed(stage) => {
                    self.stage = stage;
                    self.set_status(Status::Progressed);
                }
                ParserEvent::Finished(_) if fix => {
                    tracing::debug!("ignoring report lines printed by f3fix");
                }
                ParserEvent::Finished(report) => {
                    self.report = Some(Arc::new(report));
                    self.report_target = self.session.as_ref().map(|s| s.target.clone());
                    self.set_status(Status::Finished);
                }
            }
        }
    }

    fn set_status(&mut self, next: Status) {
        if !self.status.can_transition_to(next) {
            tracing::warn!("Ignoring illegal transition {:?} -> {:?}", self.status, next);
            return;
        }

        self.status = next;
        let report = if next == Status::Finished {
            self.report.clone()
        } else {
            None
        };
        self.publish();
        self.emit(EngineEvent::StatusChanged(StatusChange {
            status: next,
            stage: self.stage,
            report,
        }));
    }

    fn emit(&self, event: EngineEvent) {
        tracing::debug!(?event, "engine event");
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            status: self.status,
            stage: self.stage,
            report: self.report.clone(),
            error: self.error,
            options: self.registry.options(),
            active: self.session.is_some(),
        });
    }
}

async fn next_io(session: &mut Option<RunSession>) -> ProcessIo {
    match session {
        Some(session) => session.supervisor.next().await,
        None => std::future::pending().await,
    }
}

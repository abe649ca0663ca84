//! One live run: its remaining phases, the running tool, and the parser

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::classify::RunFacts;
use crate::error::ErrorCode;
use crate::parser::{OutputParser, ParserEvent};
use crate::process::{Phase, Supervisor};
use crate::report::Report;

pub(crate) enum RunKind {
    Check,
    /// Capacity fix for the device `base` was measured on.
    Fix { base: Arc<Report> },
}

pub(crate) enum Advance {
    /// No phases left, or the report is already complete.
    Done,
    Started(Option<ParserEvent>),
    Failed(ErrorCode),
}

pub(crate) struct RunSession {
    pub id: Uuid,
    pub kind: RunKind,
    pub target: PathBuf,
    pub facts: RunFacts,
    pub parser: OutputParser,
    pub supervisor: Supervisor,
    /// stderr of every phase so far.
    pub stderr: String,
    phases: VecDeque<Phase>,
}

impl RunSession {
    /// Spawn the first phase. The returned event opens stage 1.
    pub fn start(
        kind: RunKind,
        target: PathBuf,
        facts: RunFacts,
        phases: Vec<Phase>,
    ) -> Result<(Self, Option<ParserEvent>), ErrorCode> {
        let mut phases = VecDeque::from(phases);
        let first = phases.pop_front().ok_or(ErrorCode::Unknown)?;
        let supervisor = Supervisor::spawn(&first)?;

        let mut parser = OutputParser::new();
        let staged = parser.begin_stage();

        let session = Self {
            id: Uuid::new_v4(),
            kind,
            target,
            facts,
            parser,
            supervisor,
            stderr: String::new(),
            phases,
        };
        Ok((session, staged))
    }

    pub fn is_fix(&self) -> bool {
        matches!(self.kind, RunKind::Fix { .. })
    }

    /// Launch the next phase after the current one exited cleanly.
    pub fn advance(&mut self) -> Advance {
        if self.parser.is_finished() {
            return Advance::Done;
        }
        let Some(phase) = self.phases.pop_front() else {
            return Advance::Done;
        };

        match Supervisor::spawn(&phase) {
            Ok(supervisor) => {
                tracing::info!(run_id = %self.id, tool = ?phase.tool, "next phase");
                self.supervisor = supervisor;
                Advance::Started(self.parser.begin_stage())
            }
            Err(code) => Advance::Failed(code),
        }
    }
}

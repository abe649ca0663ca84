//! Incremental parser for f3 tool output
//!
//! Output arrives in arbitrary chunks. Bytes are buffered until a line
//! terminator (`\n`, `\r`, or the backspace the f3 tools use to redraw their
//! progress line), so the events produced never depend on how the stream was
//! split.

pub mod grammar;

use crate::report::{Field, Report, ReportBuilder};
use crate::status::{progress_from_percent, StageInfo, PROGRESS_INDETERMINATE};

#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// A new stage began; progress is indeterminate until the next update.
    Staged(StageInfo),
    Progressed(StageInfo),
    /// The report is complete. Nothing after this changes the run's result.
    Finished(Report),
}

/// How the output stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A report was produced.
    Complete,
    /// The stream ended without a report, or inside an open report block.
    Truncated,
}

#[derive(Debug, Default)]
enum Mode {
    #[default]
    Streaming,
    InReport(ReportBuilder),
    Done,
}

#[derive(Debug, Default)]
pub struct OutputParser {
    pending: Vec<u8>,
    stage: StageInfo,
    mode: Mode,
    /// Result lines the tools print on their own, outside any tagged block.
    native: ReportBuilder,
}

/// Longest line kept; the rest of an overlong line is dropped.
const MAX_LINE: usize = 16 * 1024;

fn is_terminator(byte: u8) -> bool {
    matches!(byte, b'\n' | b'\r' | 0x08)
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.mode, Mode::Done)
    }

    /// Consume a chunk of output and return the events it completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            if is_terminator(byte) {
                let line = std::mem::take(&mut self.pending);
                self.process_raw(&line, &mut events);
            } else if self.pending.len() < MAX_LINE {
                self.pending.push(byte);
            }
        }
        events
    }

    /// Start the next stage, as when the engine launches another phase.
    /// Ignored once the report is complete.
    pub fn begin_stage(&mut self) -> Option<ParserEvent> {
        if self.is_finished() {
            return None;
        }
        self.advance_stage(None).map(ParserEvent::Staged)
    }

    /// Treat any buffered partial line as complete.
    pub fn flush(&mut self) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.process_raw(&line, &mut events);
        }
        events
    }

    /// End of all output for the run.
    ///
    /// Result lines collected outside a tagged block become the report here,
    /// so a run of the plain f3 tools finishes only once every phase is done.
    pub fn finish(&mut self) -> (Vec<ParserEvent>, ParseOutcome) {
        let mut events = self.flush();

        match std::mem::take(&mut self.mode) {
            Mode::Done => self.mode = Mode::Done,
            Mode::InReport(block) => {
                tracing::warn!("Output ended inside an unterminated report block");
                self.mode = Mode::InReport(block);
            }
            Mode::Streaming => {
                if !self.native.is_empty() {
                    let report = std::mem::take(&mut self.native).build();
                    self.complete(report, &mut events);
                }
            }
        }

        let outcome = if self.is_finished() {
            ParseOutcome::Complete
        } else {
            ParseOutcome::Truncated
        };
        (events, outcome)
    }

    fn process_raw(&mut self, raw: &[u8], events: &mut Vec<ParserEvent>) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return;
        }
        tracing::trace!(line, "tool output");
        self.process_line(line, events);
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<ParserEvent>) {
        match &mut self.mode {
            Mode::Done => {}
            Mode::InReport(block) => {
                if grammar::is_report_end(line) {
                    let report = std::mem::take(block).build();
                    self.complete(report, events);
                } else if let Some((field, value)) = grammar::report_field(line, false) {
                    block.set(field, value);
                }
            }
            Mode::Streaming => {
                if let Some(explicit) = grammar::stage_marker(line) {
                    if let Some(stage) = self.advance_stage(explicit) {
                        events.push(ParserEvent::Staged(stage));
                    }
                } else if let Some(percent) = grammar::progress_marker(line) {
                    self.stage.progress = progress_from_percent(percent);
                    events.push(ParserEvent::Progressed(self.stage));
                } else if grammar::is_report_begin(line) {
                    self.mode = Mode::InReport(ReportBuilder::default());
                } else {
                    self.capture_native(line);
                }
            }
        }
    }

    fn capture_native(&mut self, line: &str) {
        if let Some((field, value)) = grammar::report_field(line, true) {
            // f3write prints `Free space` again once it has filled the disk.
            if field == Field::ReportedFree && self.native.is_set(field) {
                return;
            }
            self.native.set(field, value);
        } else if let Some(genuine) = grammar::verdict(line) {
            self.native.set_verdict(genuine);
        } else if let Some(sector) = grammar::fix_hint(line) {
            self.native.set(Field::LastSector, &sector.to_string());
        }
    }

    /// A bare marker moves to the next stage. A numbered one only moves
    /// forward, so tools that announce the stage the engine already started
    /// do not count it twice.
    fn advance_stage(&mut self, explicit: Option<u32>) -> Option<StageInfo> {
        let next = match explicit {
            None => self.stage.stage.saturating_add(1),
            Some(n) if n > self.stage.stage => n,
            Some(_) => return None,
        };
        self.stage = StageInfo {
            stage: next,
            progress: PROGRESS_INDETERMINATE,
        };
        Some(self.stage)
    }

    fn complete(&mut self, report: Report, events: &mut Vec<ParserEvent>) {
        self.mode = Mode::Done;
        events.push(ParserEvent::Finished(report));
    }
}

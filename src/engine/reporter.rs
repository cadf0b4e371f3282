//! Per-check finding collector.
//!
//! A check writes findings and decorative notes to its `Reporter`; the
//! orchestrator turns the collected lines into a `CheckSection`. In live
//! mode every line is also echoed to stdout as it is produced.

use crate::cli::output::paint_status;
use crate::{StatusKind, StatusLine};

#[derive(Debug, Default)]
pub struct Reporter {
    lines: Vec<StatusLine>,
    transcript: String,
    live: Option<bool>,
}

impl Reporter {
    /// Buffering reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that also streams to stdout, colored when `color` is set
    pub fn live(color: bool) -> Self {
        Reporter {
            live: Some(color),
            ..Default::default()
        }
    }

    pub fn emit(&mut self, line: StatusLine) {
        let text = line.to_string();
        if let Some(color) = self.live {
            println!("    {}", paint_status(&line, color));
        }
        self.transcript.push_str(&text);
        self.transcript.push('\n');
        self.lines.push(line);
    }

    pub fn pass(&mut self, message: impl Into<String>) {
        self.emit(StatusLine::new(StatusKind::Pass, message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.emit(StatusLine::new(StatusKind::Warn, message));
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.emit(StatusLine::new(StatusKind::Fail, message));
    }

    pub fn skip(&mut self, message: impl Into<String>) {
        self.emit(StatusLine::new(StatusKind::Skip, message));
    }

    /// Decorative context; kept in the transcript, never counted
    pub fn note(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.live.is_some() {
            println!("    {}", message);
        }
        self.transcript.push_str(message);
        self.transcript.push('\n');
    }

    /// A raw output line of an external check: recorded as a finding when
    /// it carries a status tag, otherwise as a note.
    pub fn raw_line(&mut self, line: &str) {
        match StatusLine::parse(line) {
            Some(status) => self.emit(status),
            None => self.note(line),
        }
    }

    pub fn lines(&self) -> &[StatusLine] {
        &self.lines
    }

    pub fn has_failures(&self) -> bool {
        self.lines.iter().any(|l| l.kind == StatusKind::Fail)
    }

    pub fn into_parts(self) -> (Vec<StatusLine>, String) {
        (self.lines, self.transcript)
    }
}

//! Per-run diagnostics
//!
//! Every line emitted while handling one playback-start event carries the
//! same run number so the lines of one enforcement run can be correlated.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use crate::models::{EnforcementOutcome, EnforcementStage, OutcomeStatus};

/// Correlation number for one handled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic run number generator, owned by the dispatcher that uses it
#[derive(Debug, Default)]
pub struct RunSequence {
    next: AtomicU64,
}

impl RunSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next run number, starting at 1
    pub fn next_id(&self) -> RunId {
        RunId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured diagnostics line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLine {
    pub run: RunId,
    pub severity: Severity,
    pub stage: Option<EnforcementStage>,
    pub message: String,
}

/// Receiver of per-run diagnostics
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, line: DiagnosticLine);

    fn outcome(&self, run: RunId, outcome: &EnforcementOutcome);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record(&self, line: DiagnosticLine) {
        let stage = line.stage.map(|s| s.as_str()).unwrap_or("-");
        match line.severity {
            Severity::Debug => debug!(run = line.run.0, stage, "{}", line.message),
            Severity::Info => info!(run = line.run.0, stage, "{}", line.message),
            Severity::Warn => warn!(run = line.run.0, stage, "{}", line.message),
            Severity::Error => error!(run = line.run.0, stage, "{}", line.message),
        }
    }

    fn outcome(&self, run: RunId, outcome: &EnforcementOutcome) {
        match outcome.status() {
            OutcomeStatus::Success => info!(
                run = run.0,
                session_id = %outcome.session_id,
                stage = outcome.stage.as_str(),
                attempts = outcome.attempts,
                status = %outcome.status(),
                "Enforcement run finished"
            ),
            OutcomeStatus::Partial => warn!(
                run = run.0,
                session_id = %outcome.session_id,
                stage = outcome.stage.as_str(),
                attempts = outcome.attempts,
                status = %outcome.status(),
                "Enforcement run could not confirm the stream stopped"
            ),
        }
    }
}

/// Diagnostics handle bound to a single run
#[derive(Clone, Copy)]
pub struct RunLog<'a> {
    run: RunId,
    sink: &'a dyn DiagnosticsSink,
}

impl<'a> RunLog<'a> {
    pub fn new(run: RunId, sink: &'a dyn DiagnosticsSink) -> Self {
        Self { run, sink }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn debug(&self, stage: Option<EnforcementStage>, message: impl Into<String>) {
        self.emit(Severity::Debug, stage, message.into());
    }

    pub fn info(&self, stage: Option<EnforcementStage>, message: impl Into<String>) {
        self.emit(Severity::Info, stage, message.into());
    }

    pub fn warn(&self, stage: Option<EnforcementStage>, message: impl Into<String>) {
        self.emit(Severity::Warn, stage, message.into());
    }

    pub fn error(&self, stage: Option<EnforcementStage>, message: impl Into<String>) {
        self.emit(Severity::Error, stage, message.into());
    }

    pub fn outcome(&self, outcome: &EnforcementOutcome) {
        self.sink.outcome(self.run, outcome);
    }

    fn emit(&self, severity: Severity, stage: Option<EnforcementStage>, message: String) {
        self.sink.record(DiagnosticLine {
            run: self.run,
            severity,
            stage,
            message,
        });
    }
}

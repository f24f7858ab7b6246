//! The outcome of one request, filled in phase by phase

use crate::backend::BackendKind;
use crate::lint::{LintDiagnostic, LintReport};
use crate::strategy::CompileFailure;
use crate::variant::VariantKind;
use chrono::{DateTime, Utc};
use kiln_sandbox::{CapabilitySet, Completion, ExecutionOutcome};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTiming {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Wall-clock start of a phase, measured with a monotonic clock
pub(crate) struct PhaseClock {
    started: DateTime<Utc>,
    clock: Instant,
}

impl PhaseClock {
    pub(crate) fn start() -> Self {
        Self {
            started: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub(crate) fn stop(self) -> PhaseTiming {
        PhaseTiming {
            started: self.started,
            finished: Utc::now(),
            duration_seconds: self.clock.elapsed().as_secs_f64(),
        }
    }
}

/// Everything that happened to one request.
///
/// Phase fields stay `None` (and are left out of the JSON) when the phase
/// was never attempted, so "did not run" is never confused with "ran and
/// did nothing".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: Uuid,
    #[serde(rename = "as")]
    pub variant: VariantKind,
    /// Backend used once compilation was attempted, else the one requested
    pub compiler: String,
    pub class_name: String,
    pub method_name: String,
    /// Effective execution budget (ms)
    pub timeout: u64,
    pub indent_level: usize,
    pub run_checkstyle: bool,
    pub require_checkstyle: bool,
    pub received: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkstyle_succeeded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkstyle_messages: Option<Vec<LintDiagnostic>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkstyle_timing: Option<PhaseTiming>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_error_stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_timing: Option<PhaseTiming>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error_stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_timing: Option<PhaseTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_truncated: Option<bool>,

    pub version: &'static str,

    /// Grants the run was compiled under
    #[serde(skip)]
    pub capabilities: Arc<CapabilitySet>,
}

impl ResultRecord {
    pub(crate) fn received(
        variant: VariantKind,
        compiler: String,
        capabilities: Arc<CapabilitySet>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant,
            compiler,
            class_name: String::new(),
            method_name: String::new(),
            timeout: 0,
            indent_level: 0,
            run_checkstyle: false,
            require_checkstyle: false,
            received: Utc::now(),
            returned: None,
            checkstyle_succeeded: None,
            checkstyle_messages: None,
            checkstyle_timing: None,
            compiled: None,
            compilation_error_message: None,
            compilation_error_stack_trace: None,
            compile_timing: None,
            executed: None,
            crashed: None,
            timed_out: None,
            execution_error_message: None,
            execution_error_stack_trace: None,
            execution_timing: None,
            output: None,
            output_truncated: None,
            version: crate::VERSION,
            capabilities,
        }
    }

    pub(crate) fn record_lint(&mut self, report: LintReport, timing: PhaseTiming) {
        self.checkstyle_succeeded = Some(report.passed());
        self.checkstyle_messages = Some(report.diagnostics);
        self.checkstyle_timing = Some(timing);
    }

    /// The lint tool itself broke; the gate counts as failed
    pub(crate) fn record_lint_error(&mut self, timing: PhaseTiming) {
        self.checkstyle_succeeded = Some(false);
        self.checkstyle_messages = Some(Vec::new());
        self.checkstyle_timing = Some(timing);
    }

    pub(crate) fn record_compiled(&mut self, backend: BackendKind, timing: PhaseTiming) {
        self.compiled = Some(true);
        self.compiler = backend.name().to_string();
        self.compile_timing = Some(timing);
    }

    pub(crate) fn record_compile_failure(&mut self, failure: &CompileFailure, timing: PhaseTiming) {
        self.compiled = Some(false);
        self.compiler = failure.backend().name().to_string();
        self.compilation_error_message = Some(failure.message());
        self.compilation_error_stack_trace = Some(failure.trace());
        self.compile_timing = Some(timing);
    }

    pub(crate) fn record_execution(&mut self, outcome: ExecutionOutcome) {
        self.executed = Some(outcome.completion == Completion::Returned);
        self.timed_out = Some(outcome.timed_out());
        self.crashed = Some(matches!(outcome.completion, Completion::Crashed(_)));
        if let Completion::Crashed(crash) = outcome.completion {
            self.execution_error_message = Some(crash.message);
            self.execution_error_stack_trace = Some(crash.trace);
        }
        self.output = Some(outcome.output.text);
        self.output_truncated = Some(outcome.output.truncated);
        self.execution_timing = Some(PhaseTiming {
            started: outcome.started,
            finished: outcome.finished,
            duration_seconds: outcome.elapsed.as_secs_f64(),
        });
    }

    pub(crate) fn finish(mut self) -> Self {
        self.returned = Some(Utc::now());
        self
    }

    /// Compiled and ran to a normal return
    pub fn completed(&self) -> bool {
        self.compiled == Some(true) && self.executed == Some(true)
    }
}

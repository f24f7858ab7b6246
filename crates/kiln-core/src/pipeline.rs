//! Per-request state machine: lint, then compile, then execute
//!
//! Each phase records its own outcome on the [`ResultRecord`]. A phase only
//! runs when the one before it allows it: a required lint that fails stops
//! before compilation, and a failed compile never reaches the executor.

use crate::config::PipelineConfig;
use crate::lint::{LintConfig, LintGate};
use crate::record::{PhaseClock, ResultRecord};
use crate::strategy::{CompileStrategy, Compiled, CompilerChoice};
use crate::variant::Variant;
use crate::Result;
use kiln_sandbox::{CapabilitySet, Completion, Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One submission and the knobs the caller may turn
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub variant: Variant,
    pub compiler: CompilerChoice,
    /// Execution budget; the sandbox default applies when absent
    pub timeout_ms: Option<u64>,
    pub indent_level: usize,
    pub run_lint: bool,
    /// Skip compilation when lint fails
    pub require_lint: bool,
}

impl RunRequest {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            compiler: CompilerChoice::Auto,
            timeout_ms: None,
            indent_level: crate::lint::DEFAULT_INDENT,
            run_lint: true,
            require_lint: true,
        }
    }
}

pub struct Pipeline {
    request: RunRequest,
    lint: Arc<dyn LintGate>,
    lint_config: LintConfig,
    executor: Executor,
    caps: Arc<CapabilitySet>,
    timeout_ms: u64,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, lint: Arc<dyn LintGate>, request: RunRequest) -> Self {
        Self {
            lint_config: config.lint.with_indent(request.indent_level),
            timeout_ms: config.sandbox.effective_timeout_ms(request.timeout_ms),
            executor: Executor::new(config.sandbox.clone()),
            caps: Arc::new(config.capabilities.clone()),
            lint,
            request,
        }
    }

    /// Run every phase the request allows.
    ///
    /// Anything wrong with the submitted code ends up on the record. An
    /// error here means the service itself could not do its job.
    pub fn run(self) -> Result<ResultRecord> {
        let request = &self.request;
        let mut record = ResultRecord::received(
            request.variant.kind,
            request.compiler.to_string(),
            Arc::clone(&self.caps),
        );
        record.class_name = request.variant.entry.container.clone();
        record.method_name = request.variant.entry.method.clone();
        record.timeout = self.timeout_ms;
        record.indent_level = request.indent_level;
        record.run_checkstyle = request.run_lint;
        record.require_checkstyle = request.require_lint;

        let span = tracing::info_span!("run", id = %record.id, variant = ?request.variant.kind);
        let _enter = span.enter();

        if request.run_lint {
            self.lint_phase(&mut record);
            if request.require_lint && record.checkstyle_succeeded == Some(false) {
                info!("lint failed, not compiling");
                return Ok(record.finish());
            }
        }

        let Some(compiled) = self.compile_phase(&mut record) else {
            info!(compiler = %record.compiler, "compilation failed");
            return Ok(record.finish());
        };

        self.execute_phase(&mut record, &compiled)?;
        info!(
            compiler = %record.compiler,
            executed = ?record.executed,
            crashed = ?record.crashed,
            timed_out = ?record.timed_out,
            "run finished"
        );
        Ok(record.finish())
    }

    fn lint_phase(&self, record: &mut ResultRecord) {
        let clock = PhaseClock::start();
        let variant = &self.request.variant;
        match self.lint.check(variant.lint_units(), &self.lint_config) {
            Ok(report) => {
                let report = variant.remap(report);
                debug!(
                    passed = report.passed(),
                    diagnostics = report.diagnostic_count(),
                    "lint finished"
                );
                record.record_lint(report, clock.stop());
            }
            Err(e) => {
                warn!(error = %e, "lint gate failed");
                record.record_lint_error(clock.stop());
            }
        }
    }

    fn compile_phase(&self, record: &mut ResultRecord) -> Option<Compiled> {
        let clock = PhaseClock::start();
        let variant = &self.request.variant;
        let strategy = CompileStrategy::new(self.request.compiler, Arc::clone(&self.caps));
        match strategy.compile(&variant.units, &variant.form, &variant.entry) {
            Ok(compiled) => {
                debug!(backend = %compiled.backend, "compiled");
                record.record_compiled(compiled.backend, clock.stop());
                Some(compiled)
            }
            Err(failure) => {
                debug!(backend = %failure.backend(), error = %failure, "compile failed");
                record.record_compile_failure(&failure, clock.stop());
                None
            }
        }
    }

    fn execute_phase(&self, record: &mut ResultRecord, compiled: &Compiled) -> Result<()> {
        let timeout = Duration::from_millis(self.timeout_ms);
        let outcome = self.executor.execute(compiled.runnable(), timeout)?;
        match &outcome.completion {
            Completion::TimedOut { cooperative } => {
                info!(timeout_ms = self.timeout_ms, cooperative, "execution timed out");
            }
            Completion::Crashed(crash) => debug!(error = %crash.message, "execution crashed"),
            Completion::Returned => debug!(elapsed = ?outcome.elapsed, "execution returned"),
        }
        record.record_execution(outcome);
        Ok(())
    }
}

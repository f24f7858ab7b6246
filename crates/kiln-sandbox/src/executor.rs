//! Deadline-bounded execution on an isolated worker thread

use crate::cancel::CancelToken;
use crate::output::{CapturedOutput, OutputSink, DEFAULT_MAX_OUTPUT_BYTES};
use crate::{Result, SandboxError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Default execution timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Largest timeout a caller may ask for
pub const MAX_TIMEOUT_MS: u64 = 1000;

/// Held across a whole run when [`SandboxConfig::exclusive`] is set
static EXCLUSIVE: Mutex<()> = Mutex::new(());

static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Configuration for the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Timeout used when the request names none (ms)
    pub default_timeout_ms: u64,
    /// Requests asking for more are clamped to this (ms)
    pub max_timeout_ms: u64,
    /// How long to wait for a cancelled worker to stop on its own (ms)
    pub grace_ms: u64,
    /// Cap on captured stdout+stderr
    pub max_output_bytes: usize,
    /// Stack size for worker threads
    pub worker_stack_bytes: usize,
    /// Serialize every execution in the process behind one lock
    pub exclusive: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_timeout_ms: MAX_TIMEOUT_MS,
            grace_ms: 10,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            worker_stack_bytes: 32 * 1024 * 1024, // 32MB
            exclusive: false,
        }
    }
}

impl SandboxConfig {
    /// Resolve a caller-supplied timeout against the default and the cap
    pub fn effective_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_timeout_ms)
            .clamp(1, self.max_timeout_ms.max(1))
    }
}

/// What a running worker may touch: its own output sink, its cancel token,
/// and the size of the stack it runs on
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub output: OutputSink,
    pub cancel: CancelToken,
    pub stack_bytes: usize,
}

/// Abnormal termination of submitted code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crash {
    pub message: String,
    pub trace: String,
}

impl Crash {
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
        }
    }
}

/// Work that can be handed to an isolated worker
pub trait Runnable: Send + 'static {
    fn run(self: Box<Self>, ctx: &ExecutionContext) -> std::result::Result<(), Crash>;
}

struct FnJob<F>(F);

impl<F> Runnable for FnJob<F>
where
    F: FnOnce(&ExecutionContext) -> std::result::Result<(), Crash> + Send + 'static,
{
    fn run(self: Box<Self>, ctx: &ExecutionContext) -> std::result::Result<(), Crash> {
        (self.0)(ctx)
    }
}

/// Wrap a closure as a [`Runnable`]
pub fn from_fn<F>(f: F) -> Box<dyn Runnable>
where
    F: FnOnce(&ExecutionContext) -> std::result::Result<(), Crash> + Send + 'static,
{
    Box::new(FnJob(f))
}

/// How a run ended, from the caller's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The entry point returned normally
    Returned,
    /// The entry point threw, exited abnormally, or the worker panicked
    Crashed(Crash),
    /// The deadline passed first. `cooperative` is false when the worker
    /// ignored cancellation and had to be abandoned.
    TimedOut { cooperative: bool },
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub completion: Completion,
    pub output: CapturedOutput,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self.completion, Completion::TimedOut { .. })
    }
}

/// Runs one [`Runnable`] at a time per call, never blocking past its deadline
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: SandboxConfig,
}

impl Executor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `runnable` with a wall-clock budget of `timeout`.
    ///
    /// Only fails when the worker thread cannot be started; everything the
    /// submitted code does is reported through [`Completion`].
    pub fn execute(&self, runnable: Box<dyn Runnable>, timeout: Duration) -> Result<ExecutionOutcome> {
        let _exclusive = self.config.exclusive.then(lock_exclusive);

        let ctx = ExecutionContext {
            output: OutputSink::new(self.config.max_output_bytes),
            cancel: CancelToken::new(),
            stack_bytes: self.config.worker_stack_bytes,
        };
        let (tx, rx) = mpsc::channel();
        let worker_ctx = ctx.clone();
        let name = format!("kiln-worker-{}", WORKER_SEQ.fetch_add(1, Ordering::Relaxed));

        let started = Utc::now();
        let clock = Instant::now();
        let handle = thread::Builder::new()
            .name(name.clone())
            .stack_size(self.config.worker_stack_bytes)
            .spawn(move || {
                let result = runnable.run(&worker_ctx);
                let _ = tx.send(result);
            })
            .map_err(SandboxError::Spawn)?;

        let completion = match rx.recv_timeout(timeout) {
            Ok(Ok(())) => Completion::Returned,
            Ok(Err(crash)) => Completion::Crashed(crash),
            Err(RecvTimeoutError::Disconnected) => {
                let message = match handle.join() {
                    Err(payload) => panic_message(payload),
                    Ok(()) => "worker exited without reporting".to_string(),
                };
                Completion::Crashed(Crash::new(format!("InternalError: {message}"), ""))
            }
            Err(RecvTimeoutError::Timeout) => {
                ctx.cancel.cancel();
                let grace = Duration::from_millis(self.config.grace_ms);
                let cooperative = match rx.recv_timeout(grace) {
                    Ok(_) | Err(RecvTimeoutError::Disconnected) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                };
                if !cooperative {
                    // Dropping the handle detaches the thread; its sink is sealed below
                    tracing::warn!(worker = %name, "worker ignored cancellation, abandoning it");
                }
                Completion::TimedOut { cooperative }
            }
        };

        let output = ctx.output.seal();
        let elapsed = clock.elapsed();
        let finished = Utc::now();
        tracing::debug!(worker = %name, ?elapsed, ?completion, "execution finished");

        Ok(ExecutionOutcome {
            completion,
            output,
            started,
            finished,
            elapsed,
        })
    }
}

fn lock_exclusive() -> MutexGuard<'static, ()> {
    EXCLUSIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn executor() -> Executor {
        Executor::new(SandboxConfig::default())
    }

    #[test]
    fn test_returns_output_on_success() {
        let outcome = executor()
            .execute(
                from_fn(|ctx| {
                    ctx.output.write("7\n");
                    Ok(())
                }),
                Duration::from_millis(500),
            )
            .unwrap();
        assert_eq!(outcome.completion, Completion::Returned);
        assert_eq!(outcome.output.text, "7\n");
        assert!(outcome.finished >= outcome.started);
    }

    #[test]
    fn test_crash_keeps_partial_output() {
        let outcome = executor()
            .execute(
                from_fn(|ctx| {
                    ctx.output.write("partial");
                    Err(Crash::new("NullPointerException", "\tat Question.main(Question.java:3)"))
                }),
                Duration::from_millis(500),
            )
            .unwrap();
        match outcome.completion {
            Completion::Crashed(crash) => assert_eq!(crash.message, "NullPointerException"),
            other => panic!("unexpected completion {other:?}"),
        }
        assert_eq!(outcome.output.text, "partial");
    }

    #[test]
    fn test_panic_is_reported_as_crash() {
        let outcome = executor()
            .execute(
                from_fn(|_| panic!("boom")),
                Duration::from_millis(500),
            )
            .unwrap();
        match outcome.completion {
            Completion::Crashed(crash) => assert!(crash.message.contains("boom")),
            other => panic!("unexpected completion {other:?}"),
        }
    }

    #[test]
    fn test_cooperative_timeout() {
        let outcome = executor()
            .execute(
                from_fn(|ctx| {
                    ctx.output.write("tick\n");
                    while !ctx.cancel.is_cancelled() {
                        thread::yield_now();
                    }
                    Err(Crash::new("interrupted", ""))
                }),
                Duration::from_millis(30),
            )
            .unwrap();
        assert_eq!(outcome.completion, Completion::TimedOut { cooperative: true });
        assert_eq!(outcome.output.text, "tick\n");
    }

    #[test]
    fn test_uncooperative_worker_is_abandoned() {
        let release = Arc::new(AtomicBool::new(false));
        let worker_release = release.clone();
        let clock = Instant::now();
        let outcome = executor()
            .execute(
                from_fn(move |ctx| {
                    while !worker_release.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(1));
                    }
                    ctx.output.write("too late");
                    Ok(())
                }),
                Duration::from_millis(30),
            )
            .unwrap();
        assert!(clock.elapsed() < Duration::from_millis(500));
        assert_eq!(outcome.completion, Completion::TimedOut { cooperative: false });
        release.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(outcome.output.text, "");
    }

    #[test]
    fn test_worker_sees_its_stack_size() {
        let exec = Executor::new(SandboxConfig {
            worker_stack_bytes: 4 * 1024 * 1024,
            ..SandboxConfig::default()
        });
        let outcome = exec
            .execute(
                from_fn(|ctx| {
                    ctx.output.write(&ctx.stack_bytes.to_string());
                    Ok(())
                }),
                Duration::from_millis(500),
            )
            .unwrap();
        assert_eq!(outcome.output.text, (4 * 1024 * 1024).to_string());
    }

    #[test]
    fn test_effective_timeout_clamps() {
        let config = SandboxConfig::default();
        assert_eq!(config.effective_timeout_ms(None), 100);
        assert_eq!(config.effective_timeout_ms(Some(250)), 250);
        assert_eq!(config.effective_timeout_ms(Some(60_000)), 1000);
        assert_eq!(config.effective_timeout_ms(Some(0)), 1);
    }

    #[test]
    fn test_concurrent_outputs_do_not_bleed() {
        let exec = executor();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let exec = exec.clone();
                thread::spawn(move || {
                    exec.execute(
                        from_fn(move |ctx| {
                            for _ in 0..50 {
                                ctx.output.write(&format!("{i};"));
                                thread::yield_now();
                            }
                            Ok(())
                        }),
                        Duration::from_millis(1000),
                    )
                    .unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = handle.join().unwrap();
            assert_eq!(outcome.output.text, format!("{i};").repeat(50));
        }
    }

    #[test]
    fn test_exclusive_mode_still_completes() {
        let exec = Executor::new(SandboxConfig {
            exclusive: true,
            ..SandboxConfig::default()
        });
        let outcome = exec
            .execute(
                from_fn(|ctx| {
                    ctx.output.write("alone");
                    Ok(())
                }),
                Duration::from_millis(200),
            )
            .unwrap();
        assert_eq!(outcome.output.text, "alone");
    }
}

//! Kiln Sandbox - deadline-bounded execution of untrusted code
//!
//! Submitted code runs on its own worker thread with a private output sink
//! and a cancel token. The caller gets control back at the deadline whether
//! or not the worker cooperates.

mod cancel;
mod capabilities;
mod executor;
mod output;

pub use cancel::CancelToken;
pub use capabilities::{Capability, CapabilityDenied, CapabilitySet};
pub use executor::{
    from_fn, Completion, Crash, ExecutionContext, ExecutionOutcome, Executor, Runnable,
    SandboxConfig, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS,
};
pub use output::{CapturedOutput, OutputSink, DEFAULT_MAX_OUTPUT_BYTES};

/// Errors from sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

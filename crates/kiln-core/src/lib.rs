//! Kiln Core - the lint, compile, execute pipeline
//!
//! A [`Pipeline`] is built per request from a [`Variant`] of the submitted
//! source and runs each phase in order, recording what happened on a
//! [`ResultRecord`]. Failures of the submitted code are recorded, never
//! returned as errors.

pub mod backend;
pub mod config;
pub mod lint;
pub mod pipeline;
pub mod record;
pub mod strategy;
pub mod variant;

pub use backend::{Backend, BackendKind, BytecodeBackend, InterpreterBackend};
pub use config::PipelineConfig;
pub use lint::{LintConfig, LintDiagnostic, LintGate, LintReport, StyleChecker};
pub use pipeline::{Pipeline, RunRequest};
pub use record::{PhaseTiming, ResultRecord};
pub use strategy::{CompileFailure, CompileStrategy, Compiled, CompilerChoice};
pub use variant::{EntryPoint, Variant, VariantKind};

use std::path::PathBuf;

/// Current tool version, reported on every result
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that are not the submitted code's fault
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Sandbox(#[from] kiln_sandbox::SandboxError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Backend selection with ordered fallback and entry point resolution

use crate::backend::BackendKind;
use crate::variant::EntryPoint;
use kiln_lang::ast::Type;
use kiln_lang::{CompileErrors, Image, MethodId, Program, SourceForm, SourceUnit};
use kiln_sandbox::{CapabilitySet, Runnable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What the caller asked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerChoice {
    #[default]
    Auto,
    Bytecode,
    Interpreter,
}

impl CompilerChoice {
    /// First backend to try and the ones to fall back to, in order
    fn order(self) -> (BackendKind, &'static [BackendKind]) {
        match self {
            CompilerChoice::Auto => {
                let auto: &'static [BackendKind; 2] = &BackendKind::AUTO_ORDER;
                let [first, fallbacks @ ..] = auto;
                (*first, fallbacks)
            }
            CompilerChoice::Bytecode => (BackendKind::Bytecode, &[]),
            CompilerChoice::Interpreter => (BackendKind::Interpreter, &[]),
        }
    }
}

impl fmt::Display for CompilerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerChoice::Auto => f.write_str("auto"),
            CompilerChoice::Bytecode => f.write_str(BackendKind::Bytecode.name()),
            CompilerChoice::Interpreter => f.write_str(BackendKind::Interpreter.name()),
        }
    }
}

impl FromStr for CompilerChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(CompilerChoice::Auto);
        }
        Ok(match s.parse::<BackendKind>()? {
            BackendKind::Bytecode => CompilerChoice::Bytecode,
            BackendKind::Interpreter => CompilerChoice::Interpreter,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileFailure {
    #[error("{errors}")]
    Source {
        backend: BackendKind,
        errors: CompileErrors,
    },

    #[error("NoSuchMethodException: {entry} ({reason})")]
    EntryPointNotFound {
        backend: BackendKind,
        entry: EntryPoint,
        reason: String,
    },

    #[error("NoSuchMethodException: {entry} is not static")]
    EntryPointNotStatic { backend: BackendKind, entry: EntryPoint },
}

impl CompileFailure {
    pub fn backend(&self) -> BackendKind {
        match self {
            CompileFailure::Source { backend, .. }
            | CompileFailure::EntryPointNotFound { backend, .. }
            | CompileFailure::EntryPointNotStatic { backend, .. } => *backend,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Every diagnostic, one per line
    pub fn trace(&self) -> String {
        match self {
            CompileFailure::Source { errors, .. } => errors.listing(),
            other => other.to_string(),
        }
    }
}

/// A loaded image with its entry point resolved
pub struct Compiled {
    pub backend: BackendKind,
    pub image: Arc<dyn Image>,
    pub entry: MethodId,
}

impl Compiled {
    pub fn runnable(&self) -> Box<dyn Runnable> {
        Arc::clone(&self.image).runnable(self.entry)
    }
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiled")
            .field("backend", &self.backend)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

pub struct CompileStrategy {
    choice: CompilerChoice,
    caps: Arc<CapabilitySet>,
}

impl CompileStrategy {
    pub fn new(choice: CompilerChoice, caps: Arc<CapabilitySet>) -> Self {
        Self { choice, caps }
    }

    /// Try each candidate backend until one compiles and resolves `entry`.
    /// Only the last failure is reported.
    pub fn compile(
        &self,
        units: &[SourceUnit],
        form: &SourceForm,
        entry: &EntryPoint,
    ) -> Result<Compiled, CompileFailure> {
        let (first, fallbacks) = self.choice.order();
        let mut result = self.compile_with(first, units, form, entry);
        for &next in fallbacks {
            let Err(failure) = &result else { break };
            tracing::debug!(
                backend = %failure.backend(),
                next = %next,
                error = %failure,
                "compile failed, falling back"
            );
            result = self.compile_with(next, units, form, entry);
        }
        result
    }

    fn compile_with(
        &self,
        kind: BackendKind,
        units: &[SourceUnit],
        form: &SourceForm,
        entry: &EntryPoint,
    ) -> Result<Compiled, CompileFailure> {
        let image = kind
            .backend()
            .compile(units, form, &self.caps)
            .map_err(|errors| CompileFailure::Source { backend: kind, errors })?;
        let method = resolve_entry(image.program(), entry, kind)?;
        Ok(Compiled {
            backend: kind,
            image,
            entry: method,
        })
    }
}

fn resolve_entry(program: &Program, entry: &EntryPoint, backend: BackendKind) -> Result<MethodId, CompileFailure> {
    let not_found = |reason: String| CompileFailure::EntryPointNotFound {
        backend,
        entry: entry.clone(),
        reason,
    };
    let class = program
        .class(&entry.container)
        .ok_or_else(|| not_found(format!("class {} not found", entry.container)))?;
    let id = *class
        .methods
        .get(&entry.method)
        .ok_or_else(|| not_found(format!("no method {} in class {}", entry.method, entry.container)))?;

    let signature = &program.method(id).signature;
    if !signature.is_static {
        return Err(CompileFailure::EntryPointNotStatic {
            backend,
            entry: entry.clone(),
        });
    }
    match signature.params.as_slice() {
        [] | [Type::StringArray] => Ok(id),
        _ => Err(not_found("must take no arguments or a single String[]".into())),
    }
}

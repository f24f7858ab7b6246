//! Stack-machine engine: checked methods are lowered to flat instruction
//! lists and run on a heap-allocated frame stack.
//!
//! Lowering only covers the core statement forms, so this engine rejects
//! some programs the tree-walker accepts.

mod compiler;
mod vm;

use crate::diagnostics::CompileResult;
use crate::hir::{Builtin, MethodId, Op, Program, Slot, ValueMethod};
use crate::image::Image;
use crate::value::Value;
use kiln_sandbox::{CapabilitySet, Runnable};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Const(Value),
    Load(Slot),
    Store(Slot),
    Pop,
    Neg,
    Not,
    Binary(Op),
    /// Jumps to an earlier index poll for cancellation
    Jump(usize),
    JumpIfFalse(usize),
    /// Short-circuit: jump leaving the operand if it is false, else pop it
    JumpIfFalseKeep(usize),
    JumpIfTrueKeep(usize),
    Call { method: MethodId, argc: usize },
    Builtin { builtin: Builtin, argc: usize },
    ValueCall { method: ValueMethod, argc: usize },
    ArrayLength,
    Return,
    ReturnVoid,
    Throw { class: String, has_message: bool },
}

/// Lowered body of one method
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<Instr>,
    /// Source line for each instruction
    pub lines: Vec<u32>,
    pub locals: usize,
}

pub struct BytecodeImage {
    program: Program,
    chunks: Vec<Chunk>,
    caps: Arc<CapabilitySet>,
}

impl BytecodeImage {
    /// Lower every method, failing on constructs this engine does not handle
    pub fn compile(program: Program, caps: Arc<CapabilitySet>) -> CompileResult<Self> {
        let chunks = compiler::lower(&program)?;
        Ok(Self {
            program,
            chunks,
            caps,
        })
    }

    pub fn chunk(&self, method: MethodId) -> &Chunk {
        &self.chunks[method]
    }
}

impl Image for BytecodeImage {
    fn program(&self) -> &Program {
        &self.program
    }

    fn runnable(self: Arc<Self>, entry: MethodId) -> Box<dyn Runnable> {
        Box::new(vm::VmJob { image: self, entry })
    }
}

use crate::hir::{MethodId, Program};
use crate::value::Value;
use kiln_sandbox::Runnable;
use std::sync::Arc;

/// A compiled, loadable set of classes that can be inspected and run
pub trait Image: Send + Sync + 'static {
    fn program(&self) -> &Program;

    /// Package a call of `entry` for the executor
    fn runnable(self: Arc<Self>, entry: MethodId) -> Box<dyn Runnable>;
}

/// Arguments for an entry point: an empty `String[]` when it takes one
pub fn entry_args(program: &Program, entry: MethodId) -> Vec<Value> {
    if program.method(entry).signature.params.len() == 1 {
        vec![Value::empty_args()]
    } else {
        Vec::new()
    }
}

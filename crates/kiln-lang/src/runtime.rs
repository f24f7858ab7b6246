//! Semantics shared by both engines: operators, library calls, and crash
//! reporting

use crate::hir::{Builtin, MethodId, Op, Program, ValueMethod};
use crate::value::Value;
use kiln_sandbox::{Capability, CapabilitySet, Crash, ExecutionContext};
use std::sync::Arc;
use std::time::Duration;

/// Calls nested deeper than this raise `StackOverflowError`
pub const MAX_CALL_DEPTH: usize = 1024;

/// Native stack charged for one level of tree-walking recursion
pub const STACK_BYTES_PER_LEVEL: usize = 8 * 1024;

/// Stack held back for the worker's own frames
const STACK_RESERVE_BYTES: usize = 256 * 1024;

/// Strings longer than this raise `OutOfMemoryError`
pub const MAX_STRING_LEN: usize = 1024 * 1024;

/// A Java-style exception in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    pub class: String,
    pub detail: Option<String>,
}

impl Thrown {
    pub fn new(class: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn bare(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            detail: None,
        }
    }

    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {detail}", self.class),
            None => self.class.clone(),
        }
    }
}

/// Why a method stopped without returning a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unwind {
    Throw(Thrown),
    Exit(i32),
    Cancelled,
}

impl From<Thrown> for Unwind {
    fn from(thrown: Thrown) -> Self {
        Unwind::Throw(thrown)
    }
}

pub type Flow<T> = Result<T, Unwind>;

/// One active call, for stack traces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceFrame {
    pub method: MethodId,
    pub line: u32,
}

/// Turn an unwind that escaped the entry point into the run's outcome.
/// `frames` are outermost first, as they were when the unwind started.
pub fn finish(program: &Program, unwind: Unwind, frames: &[TraceFrame]) -> Result<(), Crash> {
    match unwind {
        Unwind::Exit(0) => Ok(()),
        Unwind::Exit(status) => Err(Crash::new(format!("exited with status {status}"), "")),
        Unwind::Cancelled => Err(Crash::new("interrupted", "")),
        Unwind::Throw(thrown) => {
            let trace = frames
                .iter()
                .rev()
                .map(|frame| {
                    let method = program.method(frame.method);
                    format!("\tat {}.{}({}:{})", method.class, method.name, method.unit, frame.line)
                })
                .collect::<Vec<_>>()
                .join("\n");
            Err(Crash::new(thrown.message(), trace))
        }
    }
}

/// Poll point for cooperative cancellation
pub fn check_cancel(ctx: &ExecutionContext) -> Flow<()> {
    if ctx.cancel.is_cancelled() {
        Err(Unwind::Cancelled)
    } else {
        Ok(())
    }
}

pub fn check_depth(depth: usize) -> Flow<()> {
    if depth >= MAX_CALL_DEPTH {
        Err(Thrown::bare("StackOverflowError").into())
    } else {
        Ok(())
    }
}

/// How many nested statements and expressions the tree-walking engine may
/// have in flight on a stack of `stack_bytes`
pub fn eval_budget(stack_bytes: usize) -> usize {
    stack_bytes.saturating_sub(STACK_RESERVE_BYTES) / STACK_BYTES_PER_LEVEL
}

fn int(value: &Value) -> i32 {
    value.as_int().unwrap_or_default()
}

fn string(text: String) -> Flow<Value> {
    if text.len() > MAX_STRING_LEN {
        return Err(Thrown::new("OutOfMemoryError", "Java heap space").into());
    }
    Ok(Value::from(text))
}

fn null_pointer() -> Unwind {
    Thrown::bare("NullPointerException").into()
}

pub fn binary(op: Op, lhs: &Value, rhs: &Value) -> Flow<Value> {
    let (a, b) = (int(lhs), int(rhs));
    Ok(match op {
        Op::Add => Value::Int(a.wrapping_add(b)),
        Op::Sub => Value::Int(a.wrapping_sub(b)),
        Op::Mul => Value::Int(a.wrapping_mul(b)),
        Op::Div | Op::Rem if b == 0 => {
            return Err(Thrown::new("ArithmeticException", "/ by zero").into())
        }
        Op::Div => Value::Int(a.wrapping_div(b)),
        Op::Rem => Value::Int(a.wrapping_rem(b)),
        Op::Lt => Value::Bool(a < b),
        Op::Le => Value::Bool(a <= b),
        Op::Gt => Value::Bool(a > b),
        Op::Ge => Value::Bool(a >= b),
        Op::Concat => return string(format!("{lhs}{rhs}")),
        Op::Eq => Value::Bool(lhs == rhs),
        Op::Ne => Value::Bool(lhs != rhs),
    })
}

pub fn negate(value: &Value) -> Value {
    Value::Int(int(value).wrapping_neg())
}

pub fn not(value: &Value) -> Value {
    Value::Bool(!value.as_bool().unwrap_or_default())
}

pub fn array_length(value: &Value) -> Flow<Value> {
    match value {
        Value::Args(items) => Ok(Value::Int(items.len() as i32)),
        _ => Err(null_pointer()),
    }
}

/// Run a runtime-library call on already evaluated arguments
pub fn call_builtin(
    builtin: Builtin,
    args: &[Value],
    ctx: &ExecutionContext,
    caps: &CapabilitySet,
) -> Flow<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
    match builtin {
        Builtin::Print { newline } => {
            let mut text = args.first().map(Value::to_string).unwrap_or_default();
            if newline {
                text.push('\n');
            }
            ctx.output.write(&text);
            Ok(Value::Null)
        }
        Builtin::Exit => {
            caps.require(Capability::ExitProcess)
                .map_err(|denied| Thrown::new("SecurityException", denied.to_string()))?;
            Err(Unwind::Exit(int(&arg(0))))
        }
        Builtin::GetEnv => {
            caps.require(Capability::ReadEnvironment)
                .map_err(|denied| Thrown::new("SecurityException", denied.to_string()))?;
            match arg(0) {
                Value::Str(name) => Ok(std::env::var(&*name).map(Value::from).unwrap_or(Value::Null)),
                _ => Err(null_pointer()),
            }
        }
        Builtin::Sleep => {
            caps.require(Capability::SuspendThread)
                .map_err(|denied| Thrown::new("SecurityException", denied.to_string()))?;
            let millis = int(&arg(0));
            if millis < 0 {
                return Err(Thrown::new("IllegalArgumentException", "timeout value is negative").into());
            }
            if ctx.cancel.sleep(Duration::from_millis(millis as u64)) {
                Ok(Value::Null)
            } else {
                Err(Unwind::Cancelled)
            }
        }
        Builtin::Abs => Ok(Value::Int(int(&arg(0)).wrapping_abs())),
        Builtin::Max => Ok(Value::Int(int(&arg(0)).max(int(&arg(1))))),
        Builtin::Min => Ok(Value::Int(int(&arg(0)).min(int(&arg(1))))),
        Builtin::ParseInt => match arg(0) {
            Value::Str(s) => s.parse::<i32>().map(Value::Int).map_err(|_| {
                Thrown::new("NumberFormatException", format!("For input string: \"{s}\"")).into()
            }),
            _ => Err(Thrown::new("NumberFormatException", "Cannot parse null string: null").into()),
        },
        Builtin::ValueOf => Ok(Value::from(arg(0).to_string())),
    }
}

/// Run a method on a value receiver such as `s.length()`
pub fn call_value_method(method: ValueMethod, receiver: &Value, args: &[Value]) -> Flow<Value> {
    if receiver.is_null() {
        return Err(null_pointer());
    }
    let text: Arc<str> = match receiver {
        Value::Str(s) => s.clone(),
        _ => Arc::from(""),
    };
    Ok(match method {
        ValueMethod::ToString => Value::from(receiver.to_string()),
        ValueMethod::Equals => Value::Bool(args.first().is_some_and(|other| other == receiver)),
        ValueMethod::Length => Value::Int(text.encode_utf16().count() as i32),
        ValueMethod::IsEmpty => Value::Bool(text.is_empty()),
        ValueMethod::ToUpperCase => return string(text.to_uppercase()),
        ValueMethod::ToLowerCase => return string(text.to_lowercase()),
        ValueMethod::Trim => Value::from(text.trim_matches(|c: char| c <= ' ')),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_sandbox::{CancelToken, OutputSink};

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            output: OutputSink::default(),
            cancel: CancelToken::new(),
            stack_bytes: 32 * 1024 * 1024,
        }
    }

    #[test]
    fn test_eval_budget_scales_with_stack() {
        assert_eq!(eval_budget(32 * 1024 * 1024), 4064);
        assert_eq!(eval_budget(2 * 1024 * 1024), 224);
        assert_eq!(eval_budget(64 * 1024), 0);
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(
            binary(Op::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap(),
            Value::Int(i32::MIN)
        );
        assert_eq!(
            binary(Op::Div, &Value::Int(i32::MIN), &Value::Int(-1)).unwrap(),
            Value::Int(i32::MIN)
        );
        let err = binary(Op::Rem, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err, Unwind::Throw(Thrown::new("ArithmeticException", "/ by zero")));
    }

    #[test]
    fn test_concat_renders_null() {
        let v = binary(Op::Concat, &Value::from("x="), &Value::Null).unwrap();
        assert_eq!(v, Value::from("x=null"));
    }

    #[test]
    fn test_print_writes_to_sink() {
        let ctx = ctx();
        let caps = CapabilitySet::standard();
        call_builtin(Builtin::Print { newline: true }, &[Value::Int(7)], &ctx, &caps).unwrap();
        call_builtin(Builtin::Print { newline: false }, &[Value::from("a")], &ctx, &caps).unwrap();
        call_builtin(Builtin::Print { newline: true }, &[], &ctx, &caps).unwrap();
        assert_eq!(ctx.output.seal().text, "7\na\n");
    }

    #[test]
    fn test_capability_gated_builtins() {
        let ctx = ctx();
        let none = CapabilitySet::new();
        let err = call_builtin(Builtin::Exit, &[Value::Int(0)], &ctx, &none).unwrap_err();
        assert_eq!(
            err,
            Unwind::Throw(Thrown::new("SecurityException", "exit-process not permitted"))
        );
        let caps = CapabilitySet::new().with(Capability::ExitProcess);
        let err = call_builtin(Builtin::Exit, &[Value::Int(3)], &ctx, &caps).unwrap_err();
        assert_eq!(err, Unwind::Exit(3));
        assert!(call_builtin(Builtin::GetEnv, &[Value::from("PATH")], &ctx, &none).is_err());
    }

    #[test]
    fn test_sleep_observes_cancellation() {
        let ctx = ctx();
        ctx.cancel.cancel();
        let err = call_builtin(Builtin::Sleep, &[Value::Int(10_000)], &ctx, &CapabilitySet::standard())
            .unwrap_err();
        assert_eq!(err, Unwind::Cancelled);
    }

    #[test]
    fn test_parse_int() {
        let caps = CapabilitySet::standard();
        let v = call_builtin(Builtin::ParseInt, &[Value::from("-42")], &ctx(), &caps).unwrap();
        assert_eq!(v, Value::Int(-42));
        let err = call_builtin(Builtin::ParseInt, &[Value::from("4x")], &ctx(), &caps).unwrap_err();
        assert_eq!(
            err,
            Unwind::Throw(Thrown::new("NumberFormatException", "For input string: \"4x\""))
        );
    }

    #[test]
    fn test_value_methods() {
        let s = Value::from("  Hi ");
        assert_eq!(call_value_method(ValueMethod::Trim, &s, &[]).unwrap(), Value::from("Hi"));
        assert_eq!(call_value_method(ValueMethod::Length, &s, &[]).unwrap(), Value::Int(5));
        assert_eq!(
            call_value_method(ValueMethod::Equals, &Value::from("a"), &[Value::from("a")]).unwrap(),
            Value::Bool(true)
        );
        let err = call_value_method(ValueMethod::Length, &Value::Null, &[]).unwrap_err();
        assert_eq!(err, Unwind::Throw(Thrown::bare("NullPointerException")));
    }
}

use super::{BytecodeImage, Instr};
use crate::hir::MethodId;
use crate::image::entry_args;
use crate::runtime::{self, Flow, Thrown, TraceFrame, Unwind};
use crate::value::Value;
use kiln_sandbox::{Crash, ExecutionContext, Runnable};
use std::sync::Arc;

pub(super) struct VmJob {
    pub(super) image: Arc<BytecodeImage>,
    pub(super) entry: MethodId,
}

impl Runnable for VmJob {
    fn run(self: Box<Self>, ctx: &ExecutionContext) -> Result<(), Crash> {
        let image = &*self.image;
        let mut vm = Vm {
            image,
            ctx,
            stack: Vec::with_capacity(64),
            frames: Vec::new(),
        };
        match vm.run(self.entry, entry_args(&image.program, self.entry)) {
            Ok(()) => Ok(()),
            Err(unwind) => runtime::finish(&image.program, unwind, &vm.trace()),
        }
    }
}

struct Frame {
    method: MethodId,
    pc: usize,
    locals: Vec<Value>,
}

struct Vm<'a> {
    image: &'a BytecodeImage,
    ctx: &'a ExecutionContext,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

impl<'a> Vm<'a> {
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    fn push_frame(&mut self, method: MethodId, mut locals: Vec<Value>) -> Flow<()> {
        runtime::check_depth(self.frames.len())?;
        runtime::check_cancel(self.ctx)?;
        let size = self.image.chunk(method).locals;
        locals.resize(size.max(locals.len()), Value::Null);
        self.frames.push(Frame {
            method,
            pc: 0,
            locals,
        });
        Ok(())
    }

    /// Trace frames; each points at the instruction it was executing
    fn trace(&self) -> Vec<TraceFrame> {
        self.frames
            .iter()
            .map(|frame| TraceFrame {
                method: frame.method,
                line: self
                    .image
                    .chunk(frame.method)
                    .lines
                    .get(frame.pc.saturating_sub(1))
                    .copied()
                    .unwrap_or(0),
            })
            .collect()
    }

    fn run(&mut self, entry: MethodId, args: Vec<Value>) -> Flow<()> {
        let image = self.image;
        self.push_frame(entry, args)?;

        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(());
            };
            let chunk = image.chunk(frame.method);
            let Some(instr) = chunk.code.get(frame.pc) else {
                return Ok(());
            };
            let pc = frame.pc;
            frame.pc += 1;

            match instr {
                Instr::Const(value) => self.stack.push(value.clone()),
                Instr::Load(slot) => {
                    let value = frame.locals[*slot].clone();
                    self.stack.push(value);
                }
                Instr::Store(slot) => {
                    let value = self.stack.pop().unwrap_or(Value::Null);
                    frame.locals[*slot] = value;
                }
                Instr::Pop => {
                    self.pop();
                }
                Instr::Neg => {
                    let value = self.pop();
                    self.stack.push(runtime::negate(&value));
                }
                Instr::Not => {
                    let value = self.pop();
                    self.stack.push(runtime::not(&value));
                }
                Instr::Binary(op) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    let result = runtime::binary(*op, &lhs, &rhs)?;
                    self.stack.push(result);
                }
                Instr::Jump(target) => {
                    if *target <= pc {
                        runtime::check_cancel(self.ctx)?;
                    }
                    frame.pc = *target;
                }
                Instr::JumpIfFalse(target) => {
                    let cond = self.stack.pop().and_then(|v| v.as_bool()).unwrap_or_default();
                    if !cond {
                        frame.pc = *target;
                    }
                }
                Instr::JumpIfFalseKeep(target) | Instr::JumpIfTrueKeep(target) => {
                    let jump_on = matches!(instr, Instr::JumpIfTrueKeep(_));
                    let top = self.stack.last().and_then(Value::as_bool).unwrap_or_default();
                    if top == jump_on {
                        frame.pc = *target;
                    } else {
                        self.stack.pop();
                    }
                }
                Instr::Call { method, argc } => {
                    let args = self.pop_n(*argc);
                    self.push_frame(*method, args)?;
                }
                Instr::Builtin { builtin, argc } => {
                    let args = self.pop_n(*argc);
                    let result = runtime::call_builtin(*builtin, &args, self.ctx, &image.caps)?;
                    self.stack.push(result);
                }
                Instr::ValueCall { method, argc } => {
                    let args = self.pop_n(*argc);
                    let receiver = self.pop();
                    let result = runtime::call_value_method(*method, &receiver, &args)?;
                    self.stack.push(result);
                }
                Instr::ArrayLength => {
                    let value = self.pop();
                    let length = runtime::array_length(&value)?;
                    self.stack.push(length);
                }
                Instr::Return | Instr::ReturnVoid => {
                    let value = match instr {
                        Instr::Return => self.pop(),
                        _ => Value::Null,
                    };
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.stack.push(value);
                }
                Instr::Throw { class, has_message } => {
                    let detail = if *has_message {
                        match self.pop() {
                            Value::Null => None,
                            other => Some(other.to_string()),
                        }
                    } else {
                        None
                    };
                    return Err(Unwind::Throw(Thrown {
                        class: class.clone(),
                        detail,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::BytecodeImage;
    use crate::hir::Program;
    use crate::image::Image;
    use crate::test_support::{run_script, run_units};
    use kiln_sandbox::{CapabilitySet, Completion};
    use std::sync::Arc;

    fn bytecode(program: Program, caps: Arc<CapabilitySet>) -> Arc<dyn Image> {
        Arc::new(BytecodeImage::compile(program, caps).unwrap())
    }

    #[test]
    fn test_prints_sum() {
        let outcome = run_script(bytecode, "int a = 3; int b = 4; print(a+b);", CapabilitySet::standard());
        assert_eq!(outcome.completion, Completion::Returned);
        assert_eq!(outcome.output.text, "7\n");
    }

    #[test]
    fn test_loops_calls_and_short_circuit() {
        let src = r#"
int square(int x) { return x * x; }
boolean loud(boolean b) { print("eval"); return b; }
int sum = 0;
for (int i = 0; i < 10; i++) {
    if (i == 7) { break; }
    if (i % 2 == 1) { continue; }
    sum += square(i);
}
int k = 0;
while (k < 3) { k++; }
if (false && loud(true)) { print("no"); }
if (true || loud(true)) { print(sum + k); }
"#;
        let outcome = run_script(bytecode, src, CapabilitySet::standard());
        assert_eq!(outcome.completion, Completion::Returned);
        assert_eq!(outcome.output.text, "59\n");
    }

    #[test]
    fn test_arithmetic_crash_trace() {
        let outcome = run_units(
            bytecode,
            &[(
                "Question.java",
                "public class Question {\n  static int half(int d) {\n    return 10 / d;\n  }\n  public static void main(String[] args) {\n    print(half(0));\n  }\n}\n",
            )],
            CapabilitySet::standard(),
        );
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash, got {:?}", outcome.completion);
        };
        assert_eq!(crash.message, "ArithmeticException: / by zero");
        assert_eq!(
            crash.trace,
            "\tat Question.half(Question.java:3)\n\tat Question.main(Question.java:6)"
        );
    }

    #[test]
    fn test_infinite_loop_is_cancelled() {
        let outcome = run_script(bytecode, "int i = 0;\nwhile (true) { i++; }", CapabilitySet::standard());
        assert_eq!(outcome.completion, Completion::TimedOut { cooperative: true });
    }

    #[test]
    fn test_deep_recursion_overflows() {
        let outcome = run_script(bytecode, "int f(int n) { return f(n + 1); }\nf(0);", CapabilitySet::standard());
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash");
        };
        assert_eq!(crash.message, "StackOverflowError");
        assert_eq!(crash.trace.lines().count(), 1024);
    }
}

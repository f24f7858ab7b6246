//! Tree-walking engine. Slower than bytecode but runs the whole language.

use crate::hir::*;
use crate::image::{entry_args, Image};
use crate::runtime::{self, Flow, Thrown, TraceFrame, Unwind};
use crate::value::Value;
use kiln_sandbox::{CapabilitySet, Crash, ExecutionContext, Runnable};
use std::sync::Arc;

pub struct InterpImage {
    program: Program,
    caps: Arc<CapabilitySet>,
}

impl InterpImage {
    pub fn new(program: Program, caps: Arc<CapabilitySet>) -> Self {
        Self { program, caps }
    }
}

impl Image for InterpImage {
    fn program(&self) -> &Program {
        &self.program
    }

    fn runnable(self: Arc<Self>, entry: MethodId) -> Box<dyn Runnable> {
        Box::new(InterpJob { image: self, entry })
    }
}

struct InterpJob {
    image: Arc<InterpImage>,
    entry: MethodId,
}

impl Runnable for InterpJob {
    fn run(self: Box<Self>, ctx: &ExecutionContext) -> Result<(), Crash> {
        let program = &self.image.program;
        let mut interp = Interpreter {
            program,
            caps: &self.image.caps,
            ctx,
            frames: Vec::new(),
            depth: 0,
            budget: runtime::eval_budget(ctx.stack_bytes),
        };
        match interp.invoke(self.entry, entry_args(program, self.entry)) {
            Ok(_) => Ok(()),
            Err(unwind) => runtime::finish(program, unwind, &interp.frames),
        }
    }
}

enum Exec {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Interpreter<'a> {
    program: &'a Program,
    caps: &'a CapabilitySet,
    ctx: &'a ExecutionContext,
    /// Left in place when an unwind escapes, so the trace can be rendered
    frames: Vec<TraceFrame>,
    /// Statements and expressions currently being evaluated
    depth: usize,
    budget: usize,
}

impl<'a> Interpreter<'a> {
    fn set_line(&mut self, line: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    /// Count one more level of native recursion against the stack budget
    fn descend(&mut self) -> Flow<()> {
        if self.depth >= self.budget {
            return Err(Thrown::bare("StackOverflowError").into());
        }
        self.depth += 1;
        Ok(())
    }

    fn invoke(&mut self, id: MethodId, args: Vec<Value>) -> Flow<Value> {
        runtime::check_depth(self.frames.len())?;
        runtime::check_cancel(self.ctx)?;
        let program = self.program;
        let method = program.method(id);
        let mut locals = args;
        locals.resize(method.locals.max(locals.len()), Value::Null);
        self.frames.push(TraceFrame { method: id, line: 0 });
        let result = self.block(&method.body, &mut locals)?;
        self.frames.pop();
        Ok(match result {
            Exec::Return(value) => value,
            _ => Value::Null,
        })
    }

    fn block(&mut self, stmts: &'a [HStmt], locals: &mut [Value]) -> Flow<Exec> {
        for stmt in stmts {
            match self.stmt(stmt, locals)? {
                Exec::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Exec::Normal)
    }

    fn truthy(&mut self, cond: &'a HExpr, locals: &[Value]) -> Flow<bool> {
        Ok(self.eval(cond, locals)?.as_bool().unwrap_or_default())
    }

    /// Run one loop iteration's body, mapping `continue` to normal flow.
    /// Returns `None` when the loop should keep going.
    fn iteration(&mut self, body: &'a [HStmt], locals: &mut [Value]) -> Flow<Option<Exec>> {
        runtime::check_cancel(self.ctx)?;
        Ok(match self.block(body, locals)? {
            Exec::Normal | Exec::Continue => None,
            Exec::Break => Some(Exec::Normal),
            ret @ Exec::Return(_) => Some(ret),
        })
    }

    fn stmt(&mut self, stmt: &'a HStmt, locals: &mut [Value]) -> Flow<Exec> {
        self.descend()?;
        let exec = self.stmt_inner(stmt, locals);
        self.depth -= 1;
        exec
    }

    fn stmt_inner(&mut self, stmt: &'a HStmt, locals: &mut [Value]) -> Flow<Exec> {
        self.set_line(stmt.line);
        match &stmt.kind {
            HStmtKind::Let { slot, init, .. } | HStmtKind::Assign { slot, value: init } => {
                locals[*slot] = self.eval(init, locals)?;
            }
            HStmtKind::Expr(expr) => {
                self.eval(expr, locals)?;
            }
            HStmtKind::If { cond, then, els } => {
                let branch = if self.truthy(cond, locals)? { then } else { els };
                return self.block(branch, locals);
            }
            HStmtKind::While { cond, body } => {
                while self.truthy(cond, locals)? {
                    if let Some(exit) = self.iteration(body, locals)? {
                        return Ok(exit);
                    }
                }
            }
            HStmtKind::DoWhile { body, cond } => loop {
                if let Some(exit) = self.iteration(body, locals)? {
                    return Ok(exit);
                }
                if !self.truthy(cond, locals)? {
                    break;
                }
            },
            HStmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.block(init, locals)?;
                loop {
                    if let Some(cond) = cond {
                        if !self.truthy(cond, locals)? {
                            break;
                        }
                    }
                    if let Some(exit) = self.iteration(body, locals)? {
                        return Ok(exit);
                    }
                    self.block(update, locals)?;
                }
            }
            HStmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, locals)?,
                    None => Value::Null,
                };
                return Ok(Exec::Return(value));
            }
            HStmtKind::Break => return Ok(Exec::Break),
            HStmtKind::Continue => return Ok(Exec::Continue),
            HStmtKind::Block(stmts) => return self.block(stmts, locals),
            HStmtKind::Throw { class, message } => {
                let detail = match message {
                    Some(expr) => match self.eval(expr, locals)? {
                        Value::Null => None,
                        other => Some(other.to_string()),
                    },
                    None => None,
                };
                self.set_line(stmt.line);
                return Err(Unwind::Throw(Thrown {
                    class: class.clone(),
                    detail,
                }));
            }
        }
        Ok(Exec::Normal)
    }

    fn eval_all(&mut self, exprs: &'a [HExpr], locals: &[Value]) -> Flow<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, locals)).collect()
    }

    fn eval(&mut self, expr: &'a HExpr, locals: &[Value]) -> Flow<Value> {
        self.descend()?;
        let value = self.eval_inner(expr, locals);
        self.depth -= 1;
        value
    }

    fn eval_inner(&mut self, expr: &'a HExpr, locals: &[Value]) -> Flow<Value> {
        match &expr.kind {
            HExprKind::Const(value) => Ok(value.clone()),
            HExprKind::Local(slot) => Ok(locals[*slot].clone()),
            HExprKind::Neg(inner) => Ok(runtime::negate(&self.eval(inner, locals)?)),
            HExprKind::Not(inner) => Ok(runtime::not(&self.eval(inner, locals)?)),
            HExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, locals)?;
                let rhs = self.eval(rhs, locals)?;
                self.set_line(expr.line);
                runtime::binary(*op, &lhs, &rhs)
            }
            HExprKind::Logic { and, lhs, rhs } => {
                let lhs = self.truthy(lhs, locals)?;
                if lhs != *and {
                    return Ok(Value::Bool(lhs));
                }
                Ok(Value::Bool(self.truthy(rhs, locals)?))
            }
            HExprKind::Cond { cond, then, els } => {
                if self.truthy(cond, locals)? {
                    self.eval(then, locals)
                } else {
                    self.eval(els, locals)
                }
            }
            HExprKind::Call { method, args } => {
                let args = self.eval_all(args, locals)?;
                self.set_line(expr.line);
                self.invoke(*method, args)
            }
            HExprKind::Builtin { builtin, args } => {
                let args = self.eval_all(args, locals)?;
                self.set_line(expr.line);
                runtime::call_builtin(*builtin, &args, self.ctx, self.caps)
            }
            HExprKind::ValueCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval(receiver, locals)?;
                let args = self.eval_all(args, locals)?;
                self.set_line(expr.line);
                runtime::call_value_method(*method, &receiver, &args)
            }
            HExprKind::ArrayLength(inner) => runtime::array_length(&self.eval(inner, locals)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_script, run_units};
    use kiln_sandbox::{Capability, Completion};

    fn interp(program: Program, caps: Arc<CapabilitySet>) -> Arc<dyn Image> {
        Arc::new(InterpImage::new(program, caps))
    }

    #[test]
    fn test_prints_sum() {
        let outcome = run_script(interp, "int a = 3; int b = 4; print(a+b);", CapabilitySet::standard());
        assert_eq!(outcome.completion, Completion::Returned);
        assert_eq!(outcome.output.text, "7\n");
    }

    #[test]
    fn test_full_language() {
        let src = r#"
int fib(int n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
var total = 0;
int i = 0;
do { total += fib(i); i++; } while (i < 10);
for (int j = 0; j < 5; j++) {
    if (j % 2 == 0) { continue; }
    System.out.print(j + " ");
}
System.out.println();
String s = "  Kiln ";
System.out.println(total + ":" + s.trim().toUpperCase() + ":" + Integer.parseInt("12"));
"#;
        let outcome = run_script(interp, src, CapabilitySet::standard());
        assert_eq!(outcome.completion, Completion::Returned);
        assert_eq!(outcome.output.text, "1 3 \n88:KILN:12\n");
    }

    #[test]
    fn test_null_dereference_trace() {
        let outcome = run_units(
            interp,
            &[(
                "Question.java",
                "public class Question {\n  public static void main(String[] args) {\n    System.out.println(\"before\");\n    String s = null;\n    s.length();\n  }\n}\n",
            )],
            CapabilitySet::standard(),
        );
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash, got {:?}", outcome.completion);
        };
        assert_eq!(crash.message, "NullPointerException");
        assert_eq!(crash.trace, "\tat Question.main(Question.java:5)");
        assert_eq!(outcome.output.text, "before\n");
    }

    #[test]
    fn test_nested_trace_and_user_throw() {
        let src = "void check(int x) {\n  if (x > 2) {\n    throw new IllegalStateException(\"x=\" + x);\n  }\n}\nfor (int i = 0; i < 5; i++) {\n  check(i);\n}";
        let outcome = run_script(interp, src, CapabilitySet::standard());
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash");
        };
        assert_eq!(crash.message, "IllegalStateException: x=3");
        assert_eq!(
            crash.trace,
            "\tat Snippet.check(Snippet.java:3)\n\tat Snippet.main(Snippet.java:7)"
        );
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let outcome = run_script(interp, "int down(int n) { return down(n + 1); }\ndown(0);", CapabilitySet::standard());
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash");
        };
        assert_eq!(crash.message, "StackOverflowError");
    }

    fn nested_recursion(levels: usize) -> String {
        format!(
            "int f(int n) {{ return {}f(n + 1){}; }}\nprint(f(0));",
            "(n + ".repeat(levels),
            ")".repeat(levels)
        )
    }

    #[test]
    fn test_recursion_through_nested_expressions_overflows() {
        let outcome = run_script(interp, &nested_recursion(50), CapabilitySet::standard());
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash, got {:?}", outcome.completion);
        };
        assert_eq!(crash.message, "StackOverflowError");
        // The evaluation budget runs out well before the call limit does
        assert!(crash.trace.lines().count() < runtime::MAX_CALL_DEPTH / 4);
        assert!(crash.trace.starts_with("\tat Snippet.f(Snippet.java:1)"));
    }

    #[test]
    fn test_depth_budget_follows_worker_stack() {
        let form = script_form();
        let caps = CapabilitySet::standard();
        let src = "int down(int n) { return down(n + 1); }\ndown(0);";
        let program = crate::analyze(&[crate::SourceUnit::new("Snippet.java", src)], &form, &caps).unwrap();
        let entry = program.find("Snippet", "main").unwrap();
        let image = interp(program, Arc::new(caps));
        let outcome = kiln_sandbox::Executor::new(kiln_sandbox::SandboxConfig {
            worker_stack_bytes: 2 * 1024 * 1024,
            ..kiln_sandbox::SandboxConfig::default()
        })
        .execute(image.runnable(entry), std::time::Duration::from_millis(500))
        .unwrap();
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash, got {:?}", outcome.completion);
        };
        assert_eq!(crash.message, "StackOverflowError");
        assert!(crash.trace.lines().count() <= runtime::eval_budget(2 * 1024 * 1024));
    }

    fn script_form() -> crate::SourceForm {
        crate::SourceForm::Script {
            container: "Snippet".into(),
            method: "main".into(),
        }
    }

    #[test]
    fn test_infinite_loop_is_cancelled() {
        let outcome = run_script(interp, "while (true) { }", CapabilitySet::standard());
        assert_eq!(outcome.completion, Completion::TimedOut { cooperative: true });
    }

    #[test]
    fn test_exit_needs_capability() {
        let outcome = run_script(interp, "print(1);\nSystem.exit(0);\nprint(2);", CapabilitySet::standard());
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash");
        };
        assert_eq!(crash.message, "SecurityException: exit-process not permitted");
        assert_eq!(outcome.output.text, "1\n");

        let caps = CapabilitySet::standard().with(Capability::ExitProcess);
        let outcome = run_script(interp, "print(1);\nSystem.exit(0);\nprint(2);", caps.clone());
        assert_eq!(outcome.completion, Completion::Returned);
        assert_eq!(outcome.output.text, "1\n");

        let outcome = run_script(interp, "System.exit(2);", caps);
        let Completion::Crashed(crash) = outcome.completion else {
            panic!("expected crash");
        };
        assert_eq!(crash.message, "exited with status 2");
    }
}

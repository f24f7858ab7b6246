use super::{Chunk, Instr};
use crate::diagnostics::{CompileError, CompileErrors, CompileResult, Position};
use crate::hir::*;

type LResult<T> = Result<T, CompileError>;

pub(super) fn lower(program: &Program) -> CompileResult<Vec<Chunk>> {
    let mut chunks = Vec::with_capacity(program.methods.len());
    let mut errors = Vec::new();
    for method in &program.methods {
        let mut lowerer = Lowerer {
            unit: &method.unit,
            chunk: Chunk {
                locals: method.locals,
                ..Chunk::default()
            },
            loops: Vec::new(),
            line: 1,
        };
        match lowerer.method(&method.body) {
            Ok(()) => chunks.push(lowerer.chunk),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(chunks)
    } else {
        Err(CompileErrors { errors })
    }
}

#[derive(Default)]
struct LoopPatches {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

struct Lowerer<'a> {
    unit: &'a str,
    chunk: Chunk,
    loops: Vec<LoopPatches>,
    line: u32,
}

impl Lowerer<'_> {
    fn unsupported(&self, line: u32, what: &str) -> CompileError {
        CompileError::new(
            self.unit,
            Position::new(line, 1),
            format!("{what} not supported by the bytecode backend"),
        )
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.chunk.code.push(instr);
        self.chunk.lines.push(self.line);
        self.chunk.code.len() - 1
    }

    fn here(&self) -> usize {
        self.chunk.code.len()
    }

    fn patch(&mut self, at: usize, target: usize) {
        match &mut self.chunk.code[at] {
            Instr::Jump(t)
            | Instr::JumpIfFalse(t)
            | Instr::JumpIfFalseKeep(t)
            | Instr::JumpIfTrueKeep(t) => *t = target,
            _ => {}
        }
    }

    fn method(&mut self, body: &[HStmt]) -> LResult<()> {
        self.block(body)?;
        self.emit(Instr::ReturnVoid);
        Ok(())
    }

    fn block(&mut self, stmts: &[HStmt]) -> LResult<()> {
        stmts.iter().try_for_each(|s| self.stmt(s))
    }

    fn loop_body(&mut self, body: &[HStmt]) -> LResult<LoopPatches> {
        self.loops.push(LoopPatches::default());
        let result = self.block(body);
        let patches = self.loops.pop().unwrap_or_default();
        result.map(|()| patches)
    }

    fn stmt(&mut self, stmt: &HStmt) -> LResult<()> {
        self.line = stmt.line;
        match &stmt.kind {
            HStmtKind::Let { inferred: true, .. } => {
                return Err(self.unsupported(stmt.line, "'var' is"))
            }
            HStmtKind::Let { slot, init, .. } | HStmtKind::Assign { slot, value: init } => {
                self.expr(init)?;
                self.line = stmt.line;
                self.emit(Instr::Store(*slot));
            }
            HStmtKind::Expr(expr) => {
                self.expr(expr)?;
                self.emit(Instr::Pop);
            }
            HStmtKind::If { cond, then, els } => {
                self.expr(cond)?;
                let to_else = self.emit(Instr::JumpIfFalse(0));
                self.block(then)?;
                if els.is_empty() {
                    let end = self.here();
                    self.patch(to_else, end);
                } else {
                    let to_end = self.emit(Instr::Jump(0));
                    let else_start = self.here();
                    self.patch(to_else, else_start);
                    self.block(els)?;
                    let end = self.here();
                    self.patch(to_end, end);
                }
            }
            HStmtKind::While { cond, body } => {
                let start = self.here();
                self.expr(cond)?;
                let exit = self.emit(Instr::JumpIfFalse(0));
                let patches = self.loop_body(body)?;
                self.line = stmt.line;
                self.emit(Instr::Jump(start));
                let end = self.here();
                self.patch(exit, end);
                self.close_loop(patches, start, end);
            }
            HStmtKind::DoWhile { .. } => return Err(self.unsupported(stmt.line, "do/while loops are")),
            HStmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.block(init)?;
                let start = self.here();
                let exit = match cond {
                    Some(cond) => {
                        self.expr(cond)?;
                        Some(self.emit(Instr::JumpIfFalse(0)))
                    }
                    None => None,
                };
                let patches = self.loop_body(body)?;
                let next = self.here();
                self.block(update)?;
                self.line = stmt.line;
                self.emit(Instr::Jump(start));
                let end = self.here();
                if let Some(exit) = exit {
                    self.patch(exit, end);
                }
                self.close_loop(patches, next, end);
            }
            HStmtKind::Return(Some(value)) => {
                self.expr(value)?;
                self.emit(Instr::Return);
            }
            HStmtKind::Return(None) => {
                self.emit(Instr::ReturnVoid);
            }
            HStmtKind::Break => {
                let at = self.emit(Instr::Jump(0));
                if let Some(patches) = self.loops.last_mut() {
                    patches.breaks.push(at);
                }
            }
            HStmtKind::Continue => {
                let at = self.emit(Instr::Jump(0));
                if let Some(patches) = self.loops.last_mut() {
                    patches.continues.push(at);
                }
            }
            HStmtKind::Block(stmts) => self.block(stmts)?,
            HStmtKind::Throw { class, message } => {
                if let Some(message) = message {
                    self.expr(message)?;
                }
                self.line = stmt.line;
                self.emit(Instr::Throw {
                    class: class.clone(),
                    has_message: message.is_some(),
                });
            }
        }
        Ok(())
    }

    fn close_loop(&mut self, patches: LoopPatches, next: usize, end: usize) {
        for at in patches.continues {
            self.patch(at, next);
        }
        for at in patches.breaks {
            self.patch(at, end);
        }
    }

    fn args(&mut self, args: &[HExpr]) -> LResult<usize> {
        for arg in args {
            self.expr(arg)?;
        }
        Ok(args.len())
    }

    fn expr(&mut self, expr: &HExpr) -> LResult<()> {
        match &expr.kind {
            HExprKind::Const(value) => {
                self.emit(Instr::Const(value.clone()));
            }
            HExprKind::Local(slot) => {
                self.emit(Instr::Load(*slot));
            }
            HExprKind::Neg(inner) => {
                self.expr(inner)?;
                self.emit(Instr::Neg);
            }
            HExprKind::Not(inner) => {
                self.expr(inner)?;
                self.emit(Instr::Not);
            }
            HExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.line = expr.line;
                self.emit(Instr::Binary(*op));
            }
            HExprKind::Logic { and, lhs, rhs } => {
                self.expr(lhs)?;
                let skip = if *and {
                    self.emit(Instr::JumpIfFalseKeep(0))
                } else {
                    self.emit(Instr::JumpIfTrueKeep(0))
                };
                self.expr(rhs)?;
                let end = self.here();
                self.patch(skip, end);
            }
            HExprKind::Cond { .. } => {
                return Err(self.unsupported(expr.line, "conditional expressions are"))
            }
            HExprKind::Call { method, args } => {
                let argc = self.args(args)?;
                self.line = expr.line;
                self.emit(Instr::Call {
                    method: *method,
                    argc,
                });
            }
            HExprKind::Builtin { builtin, args } => {
                let argc = self.args(args)?;
                self.line = expr.line;
                self.emit(Instr::Builtin {
                    builtin: *builtin,
                    argc,
                });
            }
            HExprKind::ValueCall {
                receiver,
                method,
                args,
            } => {
                self.expr(receiver)?;
                let argc = self.args(args)?;
                self.line = expr.line;
                self.emit(Instr::ValueCall {
                    method: *method,
                    argc,
                });
            }
            HExprKind::ArrayLength(inner) => {
                self.expr(inner)?;
                self.emit(Instr::ArrayLength);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;
    use crate::check::check;
    use kiln_sandbox::CapabilitySet;

    fn lower_script(src: &str) -> CompileResult<Vec<Chunk>> {
        let unit = parse_script("Snippet.java", src, "Snippet", "main").unwrap();
        let program = check(&[unit], &CapabilitySet::standard()).unwrap();
        lower(&program)
    }

    #[test]
    fn test_while_loop_jumps_back() {
        let chunks = lower_script("int i = 0;\nwhile (i < 3) {\n  i++;\n}").unwrap();
        let code = &chunks[0].code;
        let back = code
            .iter()
            .enumerate()
            .find_map(|(at, instr)| match instr {
                Instr::Jump(target) if *target < at => Some(*target),
                _ => None,
            })
            .unwrap();
        assert!(matches!(code[back], Instr::Load(1)));
        assert_eq!(code.last(), Some(&Instr::ReturnVoid));
        assert_eq!(chunks[0].lines.len(), code.len());
    }

    #[test]
    fn test_rejects_constructs_beyond_core() {
        let err = lower_script("var x = 1;").unwrap_err();
        assert_eq!(err.errors[0].message, "'var' is not supported by the bytecode backend");

        let err = lower_script("int x = 1;\nint y = x > 0 ? 1 : 2;").unwrap_err();
        assert_eq!(err.errors[0].position.line, 2);
        assert!(err.errors[0].message.starts_with("conditional expressions"));

        let err = lower_script("int i = 0;\ndo { i++; } while (i < 3);").unwrap_err();
        assert!(err.errors[0].message.starts_with("do/while"));
    }
}

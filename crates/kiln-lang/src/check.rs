//! Name resolution and type checking, lowering the syntax tree to HIR

use crate::ast::{self, BinOp, ExprKind, StmtKind, Type, UnaryOp, Visibility};
use crate::diagnostics::{CompileError, CompileErrors, CompileResult, Position};
use crate::hir::*;
use crate::value::Value;
use kiln_sandbox::{Capability, CapabilitySet};
use std::collections::BTreeMap;

type CResult<T> = Result<T, CompileError>;

/// Classes whose static methods are provided by the runtime
const LIBRARY_CLASSES: &[&str] = &["System", "Math", "Integer", "String", "Thread"];

/// Check every unit together so classes may call each other
pub fn check(units: &[ast::Unit], caps: &CapabilitySet) -> CompileResult<Program> {
    let mut program = Program::default();
    let mut errors = Vec::new();
    let mut pending = Vec::new();

    for unit in units {
        for class in &unit.classes {
            if program.class(&class.name).is_some() || LIBRARY_CLASSES.contains(&class.name.as_str()) {
                errors.push(CompileError::new(
                    &unit.name,
                    class.pos,
                    format!("duplicate class: {}", class.name),
                ));
                continue;
            }
            let mut methods = BTreeMap::new();
            for decl in &class.methods {
                if methods.contains_key(&decl.name) {
                    errors.push(CompileError::new(
                        &unit.name,
                        decl.pos,
                        format!("method {} is already defined in class {}", decl.name, class.name),
                    ));
                    continue;
                }
                let id = program.methods.len();
                program.methods.push(Method {
                    class: class.name.clone(),
                    unit: unit.name.clone(),
                    name: decl.name.clone(),
                    signature: Signature {
                        is_static: decl.is_static,
                        visibility: decl.visibility,
                        params: decl.params.iter().map(|p| p.ty).collect(),
                        ret: decl.ret,
                    },
                    locals: decl.params.len(),
                    body: Vec::new(),
                });
                methods.insert(decl.name.clone(), id);
                pending.push((id, decl));
            }
            program.classes.push(ClassInfo {
                name: class.name.clone(),
                unit: unit.name.clone(),
                methods,
            });
        }
    }

    let mut bodies = Vec::with_capacity(pending.len());
    for (id, decl) in pending {
        let method = program.method(id);
        let mut checker = MethodChecker {
            program: &program,
            caps,
            unit: &method.unit,
            class: &method.class,
            method: &method.name,
            is_static: method.signature.is_static,
            ret: method.signature.ret,
            scopes: vec![Vec::new()],
            next_slot: 0,
            loops: 0,
        };
        match checker.method_body(decl) {
            Ok(body) => bodies.push((id, body, checker.next_slot)),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(CompileErrors { errors });
    }
    for (id, body, locals) in bodies {
        program.methods[id].body = body;
        program.methods[id].locals = locals;
    }
    tracing::trace!(classes = program.classes.len(), methods = program.methods.len(), "checked program");
    Ok(program)
}

struct MethodChecker<'a> {
    program: &'a Program,
    caps: &'a CapabilitySet,
    unit: &'a str,
    class: &'a str,
    method: &'a str,
    is_static: bool,
    ret: Type,
    scopes: Vec<Vec<(String, Slot, Type)>>,
    next_slot: Slot,
    loops: usize,
}

impl MethodChecker<'_> {
    fn err(&self, pos: Position, message: impl Into<String>) -> CompileError {
        CompileError::new(self.unit, pos, message)
    }

    fn lookup(&self, name: &str) -> Option<(Slot, Type)> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _, _)| n == name)
            .map(|(_, slot, ty)| (*slot, *ty))
    }

    fn declare(&mut self, name: &str, ty: Type, pos: Position) -> CResult<Slot> {
        if self.lookup(name).is_some() {
            return Err(self.err(
                pos,
                format!("variable {name} is already defined in method {}", self.method),
            ));
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), slot, ty));
        }
        Ok(slot)
    }

    fn method_body(&mut self, decl: &ast::MethodDecl) -> CResult<Vec<HStmt>> {
        for param in &decl.params {
            self.declare(&param.name, param.ty, param.pos)?;
        }
        let body = self.stmts(&decl.body)?;
        if self.ret != Type::Void && completes(&body) {
            let end = decl.body.last().map(|s| s.pos).unwrap_or(decl.pos);
            return Err(self.err(end, "missing return statement"));
        }
        Ok(body)
    }

    // --- statements ---

    fn stmts(&mut self, stmts: &[ast::Stmt]) -> CResult<Vec<HStmt>> {
        self.scopes.push(Vec::new());
        let lowered = stmts.iter().map(|s| self.stmt(s)).collect();
        self.scopes.pop();
        lowered
    }

    fn branch(&mut self, stmt: &ast::Stmt) -> CResult<Vec<HStmt>> {
        self.stmts(std::slice::from_ref(stmt))
    }

    fn in_loop<T>(&mut self, f: impl FnOnce(&mut Self) -> CResult<T>) -> CResult<T> {
        self.loops += 1;
        let result = f(self);
        self.loops -= 1;
        result
    }

    fn stmt(&mut self, stmt: &ast::Stmt) -> CResult<HStmt> {
        let pos = stmt.pos;
        let kind = match &stmt.kind {
            StmtKind::Local { ty, name, init } => {
                let init = init.as_ref().map(|e| self.expr(e)).transpose()?;
                let (ty, init) = match (ty, init) {
                    (Some(ty), Some(init)) => (*ty, self.coerce(init, *ty, pos)?),
                    (Some(ty), None) => (*ty, default_value(*ty, pos.line)),
                    (None, Some(init)) => match init.ty {
                        Type::Null | Type::Void => {
                            return Err(self.err(
                                pos,
                                format!(
                                    "cannot infer type for local variable {name} (variable initializer is '{}')",
                                    if init.ty == Type::Null { "null" } else { "void" }
                                ),
                            ))
                        }
                        ty => (ty, init),
                    },
                    (None, None) => {
                        return Err(self.err(pos, format!("cannot infer type for local variable {name}")))
                    }
                };
                let slot = self.declare(name, ty, pos)?;
                HStmtKind::Let {
                    slot,
                    init,
                    inferred: stmt_is_var(&stmt.kind),
                }
            }
            StmtKind::Assign { target, op, value } => {
                let (slot, ty) = self.resolve_local(target, pos)?;
                let mut value = self.expr(value)?;
                if let Some(op) = op {
                    let current = local(slot, ty, pos.line);
                    value = self.binary(*op, current, value, pos)?;
                }
                HStmtKind::Assign {
                    slot,
                    value: self.coerce(value, ty, pos)?,
                }
            }
            StmtKind::Step { target, delta } => {
                let (slot, ty) = self.resolve_local(target, pos)?;
                if ty != Type::Int {
                    let symbol = if *delta > 0 { "++" } else { "--" };
                    return Err(self.err(pos, format!("bad operand type {ty} for unary operator '{symbol}'")));
                }
                let step = HExpr {
                    kind: HExprKind::Const(Value::Int(*delta)),
                    ty: Type::Int,
                    line: pos.line,
                };
                HStmtKind::Assign {
                    slot,
                    value: HExpr {
                        kind: HExprKind::Binary {
                            op: Op::Add,
                            lhs: Box::new(local(slot, ty, pos.line)),
                            rhs: Box::new(step),
                        },
                        ty: Type::Int,
                        line: pos.line,
                    },
                }
            }
            StmtKind::Expr(expr) => HStmtKind::Expr(self.expr(expr)?),
            StmtKind::If { cond, then, els } => HStmtKind::If {
                cond: self.condition(cond)?,
                then: self.branch(then)?,
                els: match els {
                    Some(els) => self.branch(els)?,
                    None => Vec::new(),
                },
            },
            StmtKind::While { cond, body } => HStmtKind::While {
                cond: self.condition(cond)?,
                body: self.in_loop(|c| c.branch(body))?,
            },
            StmtKind::DoWhile { body, cond } => HStmtKind::DoWhile {
                body: self.in_loop(|c| c.branch(body))?,
                cond: self.condition(cond)?,
            },
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.scopes.push(Vec::new());
                let lowered = self.for_parts(init, cond.as_ref(), update, body);
                self.scopes.pop();
                lowered?
            }
            StmtKind::Return(value) => match (value, self.ret) {
                (None, Type::Void) => HStmtKind::Return(None),
                (Some(_), Type::Void) => {
                    return Err(self.err(pos, "incompatible types: unexpected return value"))
                }
                (None, _) => return Err(self.err(pos, "missing return value")),
                (Some(value), ret) => {
                    let value = self.expr(value)?;
                    HStmtKind::Return(Some(self.coerce(value, ret, pos)?))
                }
            },
            StmtKind::Break if self.loops == 0 => {
                return Err(self.err(pos, "break outside switch or loop"))
            }
            StmtKind::Continue if self.loops == 0 => {
                return Err(self.err(pos, "continue outside of loop"))
            }
            StmtKind::Break => HStmtKind::Break,
            StmtKind::Continue => HStmtKind::Continue,
            StmtKind::Block(stmts) => HStmtKind::Block(self.stmts(stmts)?),
            StmtKind::Throw { class, message } => {
                let message = match message {
                    Some(m) => {
                        let m = self.expr(m)?;
                        Some(self.coerce(m, Type::String, pos)?)
                    }
                    None => None,
                };
                HStmtKind::Throw {
                    class: class.clone(),
                    message,
                }
            }
        };
        Ok(HStmt { kind, line: pos.line })
    }

    fn for_parts(
        &mut self,
        init: &[ast::Stmt],
        cond: Option<&ast::Expr>,
        update: &[ast::Stmt],
        body: &ast::Stmt,
    ) -> CResult<HStmtKind> {
        let init = init.iter().map(|s| self.stmt(s)).collect::<CResult<Vec<_>>>()?;
        let cond = cond.map(|c| self.condition(c)).transpose()?;
        let body = self.in_loop(|c| c.branch(body))?;
        let update = update.iter().map(|s| self.stmt(s)).collect::<CResult<Vec<_>>>()?;
        Ok(HStmtKind::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn resolve_local(&self, name: &str, pos: Position) -> CResult<(Slot, Type)> {
        self.lookup(name)
            .ok_or_else(|| self.err(pos, format!("cannot find symbol: variable {name}")))
    }

    fn condition(&mut self, expr: &ast::Expr) -> CResult<HExpr> {
        let cond = self.expr(expr)?;
        if cond.ty != Type::Boolean {
            return Err(self.err(
                expr.pos,
                format!("incompatible types: {} cannot be converted to boolean", cond.ty),
            ));
        }
        Ok(cond)
    }

    fn coerce(&self, expr: HExpr, to: Type, pos: Position) -> CResult<HExpr> {
        if expr.ty == Type::Void {
            return Err(self.err(pos, "'void' type not allowed here"));
        }
        if assignable(expr.ty, to) {
            Ok(expr)
        } else {
            Err(self.err(
                pos,
                format!("incompatible types: {} cannot be converted to {to}", expr.ty),
            ))
        }
    }

    // --- expressions ---

    fn expr(&mut self, expr: &ast::Expr) -> CResult<HExpr> {
        let pos = expr.pos;
        let line = pos.line;
        let (kind, ty) = match &expr.kind {
            ExprKind::Int(i) => (HExprKind::Const(Value::Int(*i)), Type::Int),
            ExprKind::Str(s) => (HExprKind::Const(Value::from(s.as_str())), Type::String),
            ExprKind::Bool(b) => (HExprKind::Const(Value::Bool(*b)), Type::Boolean),
            ExprKind::Null => (HExprKind::Const(Value::Null), Type::Null),
            ExprKind::Name(name) => {
                let (slot, ty) = self.resolve_local(name, pos)?;
                (HExprKind::Local(slot), ty)
            }
            ExprKind::Field { receiver, name } => {
                let receiver = self.expr(receiver)?;
                if name == "length" && receiver.ty == Type::StringArray {
                    (HExprKind::ArrayLength(Box::new(receiver)), Type::Int)
                } else {
                    return Err(self.err(pos, format!("cannot find symbol: variable {name}")));
                }
            }
            ExprKind::Unary { op, expr: inner } => {
                let inner = self.expr(inner)?;
                let (want, symbol) = match op {
                    UnaryOp::Neg => (Type::Int, "-"),
                    UnaryOp::Not => (Type::Boolean, "!"),
                };
                if inner.ty != want {
                    return Err(self.err(
                        pos,
                        format!("bad operand type {} for unary operator '{symbol}'", inner.ty),
                    ));
                }
                let kind = match op {
                    UnaryOp::Neg => HExprKind::Neg(Box::new(inner)),
                    UnaryOp::Not => HExprKind::Not(Box::new(inner)),
                };
                (kind, want)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                return self.binary(*op, lhs, rhs, pos);
            }
            ExprKind::Cond { cond, then, els } => {
                let cond = self.condition(cond)?;
                let then = self.expr(then)?;
                let els = self.expr(els)?;
                let ty = unify(then.ty, els.ty)
                    .ok_or_else(|| self.err(pos, "incompatible types in conditional expression"))?;
                (
                    HExprKind::Cond {
                        cond: Box::new(cond),
                        then: Box::new(then),
                        els: Box::new(els),
                    },
                    ty,
                )
            }
            ExprKind::Call {
                receiver,
                method,
                args,
            } => return self.call(receiver.as_deref(), method, args, pos),
        };
        Ok(HExpr { kind, ty, line })
    }

    fn binary(&self, op: BinOp, lhs: HExpr, rhs: HExpr, pos: Position) -> CResult<HExpr> {
        if lhs.ty == Type::Void || rhs.ty == Type::Void {
            return Err(self.err(pos, "'void' type not allowed here"));
        }
        let bad = || {
            self.err(
                pos,
                format!(
                    "bad operand types for binary operator '{}' ({} and {})",
                    op.symbol(),
                    lhs.ty,
                    rhs.ty
                ),
            )
        };
        let both = |ty| lhs.ty == ty && rhs.ty == ty;
        let (op, ty) = match op {
            BinOp::Add if lhs.ty == Type::String || rhs.ty == Type::String => (Op::Concat, Type::String),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem if both(Type::Int) => {
                let op = match op {
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    _ => Op::Rem,
                };
                (op, Type::Int)
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge if both(Type::Int) => {
                let op = match op {
                    BinOp::Lt => Op::Lt,
                    BinOp::Le => Op::Le,
                    BinOp::Gt => Op::Gt,
                    _ => Op::Ge,
                };
                (op, Type::Boolean)
            }
            BinOp::Eq | BinOp::Ne => {
                let comparable = both(Type::Int)
                    || both(Type::Boolean)
                    || (lhs.ty.is_reference() && rhs.ty.is_reference());
                if !comparable {
                    return Err(self.err(
                        pos,
                        format!("incomparable types: {} and {}", lhs.ty, rhs.ty),
                    ));
                }
                (if op == BinOp::Eq { Op::Eq } else { Op::Ne }, Type::Boolean)
            }
            BinOp::And | BinOp::Or if both(Type::Boolean) => {
                return Ok(HExpr {
                    kind: HExprKind::Logic {
                        and: op == BinOp::And,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    ty: Type::Boolean,
                    line: pos.line,
                });
            }
            _ => return Err(bad()),
        };
        Ok(HExpr {
            kind: HExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            line: pos.line,
        })
    }

    fn call(
        &mut self,
        receiver: Option<&ast::Expr>,
        method: &str,
        args: &[ast::Expr],
        pos: Position,
    ) -> CResult<HExpr> {
        let args = args.iter().map(|a| self.expr(a)).collect::<CResult<Vec<_>>>()?;
        let Some(receiver) = receiver else {
            if let Some(id) = self.program.find(self.class, method) {
                return self.user_call(id, args, pos, true);
            }
            return match (method, args.len()) {
                ("print" | "println", 1) | ("println", 0) => {
                    self.builtin(Builtin::Print { newline: true }, args, &[Type::Object], Type::Void, pos)
                }
                _ => Err(self.err(pos, format!("cannot find symbol: method {method}"))),
            };
        };

        match &receiver.kind {
            ExprKind::Name(class) if self.lookup(class).is_none() => {
                if self.program.class(class).is_some() {
                    let id = self.program.find(class, method).ok_or_else(|| {
                        self.err(pos, format!("cannot find symbol: method {method} in class {class}"))
                    })?;
                    return self.user_call(id, args, pos, class == self.class);
                }
                self.library_call(class, method, args, pos)
            }
            ExprKind::Field { receiver: inner, name }
                if matches!(&inner.kind, ExprKind::Name(n) if n == "System" && self.lookup(n).is_none())
                    && (name == "out" || name == "err") =>
            {
                match (method, args.len()) {
                    ("print", 1) => {
                        self.builtin(Builtin::Print { newline: false }, args, &[Type::Object], Type::Void, pos)
                    }
                    ("println", 0 | 1) => {
                        self.builtin(Builtin::Print { newline: true }, args, &[Type::Object], Type::Void, pos)
                    }
                    _ => Err(self.err(
                        pos,
                        format!("cannot find symbol: method {method} in PrintStream"),
                    )),
                }
            }
            _ => {
                let receiver = self.expr(receiver)?;
                self.value_call(receiver, method, args, pos)
            }
        }
    }

    fn user_call(&self, id: MethodId, args: Vec<HExpr>, pos: Position, same_class: bool) -> CResult<HExpr> {
        let target = self.program.method(id);
        let sig = &target.signature;
        if sig.visibility == Visibility::Private && !same_class {
            self.caps.require(Capability::AccessPrivateMembers).map_err(|_| {
                self.err(pos, format!("{}() has private access in {}", target.name, target.class))
            })?;
        }
        if !sig.is_static && (self.is_static || !same_class) {
            return Err(self.err(
                pos,
                format!(
                    "non-static method {}() cannot be referenced from a static context",
                    target.name
                ),
            ));
        }
        let args = self.arguments(&target.name, args, &sig.params, pos)?;
        Ok(HExpr {
            kind: HExprKind::Call { method: id, args },
            ty: sig.ret,
            line: pos.line,
        })
    }

    fn arguments(&self, method: &str, args: Vec<HExpr>, params: &[Type], pos: Position) -> CResult<Vec<HExpr>> {
        if args.len() != params.len() {
            return Err(self.err(
                pos,
                format!(
                    "method {method} cannot be applied to given types: expected {} argument(s), found {}",
                    params.len(),
                    args.len()
                ),
            ));
        }
        args.into_iter()
            .zip(params)
            .map(|(arg, ty)| self.coerce(arg, *ty, pos))
            .collect()
    }

    fn builtin(
        &self,
        builtin: Builtin,
        args: Vec<HExpr>,
        params: &[Type],
        ret: Type,
        pos: Position,
    ) -> CResult<HExpr> {
        let params = &params[..args.len().min(params.len())];
        let name = format!("{builtin:?}");
        let args = self.arguments(&name, args, params, pos)?;
        Ok(HExpr {
            kind: HExprKind::Builtin { builtin, args },
            ty: ret,
            line: pos.line,
        })
    }

    fn library_call(&self, class: &str, method: &str, args: Vec<HExpr>, pos: Position) -> CResult<HExpr> {
        use Type::*;
        let (builtin, params, ret): (Builtin, &[Type], Type) = match (class, method) {
            ("System", "exit") => (Builtin::Exit, &[Int], Void),
            ("System", "getenv") => (Builtin::GetEnv, &[String], String),
            ("Thread", "sleep") => (Builtin::Sleep, &[Int], Void),
            ("Math", "abs") => (Builtin::Abs, &[Int], Int),
            ("Math", "max") => (Builtin::Max, &[Int, Int], Int),
            ("Math", "min") => (Builtin::Min, &[Int, Int], Int),
            ("Integer", "parseInt") => (Builtin::ParseInt, &[String], Int),
            ("Integer", "toString") => (Builtin::ValueOf, &[Int], String),
            ("String", "valueOf") => (Builtin::ValueOf, &[Object], String),
            _ if LIBRARY_CLASSES.contains(&class) => {
                return Err(self.err(pos, format!("cannot find symbol: method {method} in class {class}")))
            }
            _ => return Err(self.err(pos, format!("cannot find symbol: variable {class}"))),
        };
        let args = self.arguments(method, args, params, pos)?;
        Ok(HExpr {
            kind: HExprKind::Builtin { builtin, args },
            ty: ret,
            line: pos.line,
        })
    }

    fn value_call(&self, receiver: HExpr, method: &str, args: Vec<HExpr>, pos: Position) -> CResult<HExpr> {
        if receiver.ty == Type::Void {
            return Err(self.err(pos, "'void' type not allowed here"));
        }
        if !receiver.ty.is_reference() || receiver.ty == Type::Null {
            return Err(self.err(pos, format!("{} cannot be dereferenced", receiver.ty)));
        }
        let string_only = receiver.ty == Type::String;
        let (value_method, params, ret): (ValueMethod, &[Type], Type) = match method {
            "toString" => (ValueMethod::ToString, &[], Type::String),
            "equals" => (ValueMethod::Equals, &[Type::Object], Type::Boolean),
            "length" if string_only => (ValueMethod::Length, &[], Type::Int),
            "isEmpty" if string_only => (ValueMethod::IsEmpty, &[], Type::Boolean),
            "toUpperCase" if string_only => (ValueMethod::ToUpperCase, &[], Type::String),
            "toLowerCase" if string_only => (ValueMethod::ToLowerCase, &[], Type::String),
            "trim" if string_only => (ValueMethod::Trim, &[], Type::String),
            _ => {
                return Err(self.err(
                    pos,
                    format!("cannot find symbol: method {method} in {}", receiver.ty),
                ))
            }
        };
        let args = self.arguments(method, args, params, pos)?;
        Ok(HExpr {
            kind: HExprKind::ValueCall {
                receiver: Box::new(receiver),
                method: value_method,
                args,
            },
            ty: ret,
            line: pos.line,
        })
    }
}

fn stmt_is_var(kind: &StmtKind) -> bool {
    matches!(kind, StmtKind::Local { ty: None, .. })
}

fn local(slot: Slot, ty: Type, line: u32) -> HExpr {
    HExpr {
        kind: HExprKind::Local(slot),
        ty,
        line,
    }
}

fn default_value(ty: Type, line: u32) -> HExpr {
    let value = match ty {
        Type::Int => Value::Int(0),
        Type::Boolean => Value::Bool(false),
        _ => Value::Null,
    };
    HExpr {
        kind: HExprKind::Const(value),
        ty,
        line,
    }
}

fn assignable(from: Type, to: Type) -> bool {
    from == to || (from == Type::Null && to.is_reference()) || (to == Type::Object && from != Type::Void)
}

fn unify(a: Type, b: Type) -> Option<Type> {
    match (a, b) {
        _ if a == b => Some(a),
        (Type::Null, other) | (other, Type::Null) if other.is_reference() => Some(other),
        _ if a.is_reference() && b.is_reference() => Some(Type::Object),
        _ => None,
    }
}

fn is_true(expr: &HExpr) -> bool {
    matches!(expr.kind, HExprKind::Const(Value::Bool(true)))
}

/// Whether control can fall off the end of `stmts`
fn completes(stmts: &[HStmt]) -> bool {
    stmts.iter().all(|s| match &s.kind {
        HStmtKind::Return(_) | HStmtKind::Throw { .. } | HStmtKind::Break | HStmtKind::Continue => false,
        HStmtKind::Block(body) => completes(body),
        HStmtKind::If { then, els, .. } => completes(then) || completes(els),
        HStmtKind::While { cond, body } | HStmtKind::DoWhile { body, cond } => {
            !is_true(cond) || breaks(body)
        }
        HStmtKind::For { cond, body, .. } => cond.as_ref().is_some_and(|c| !is_true(c)) || breaks(body),
        _ => true,
    })
}

/// Whether `stmts` contain a `break` that leaves the enclosing loop
fn breaks(stmts: &[HStmt]) -> bool {
    stmts.iter().any(|s| match &s.kind {
        HStmtKind::Break => true,
        HStmtKind::Block(body) => breaks(body),
        HStmtKind::If { then, els, .. } => breaks(then) || breaks(els),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_classes, parse_script};

    fn check_script(src: &str) -> CompileResult<Program> {
        let unit = parse_script("Snippet.java", src, "Snippet", "main").unwrap();
        check(&[unit], &CapabilitySet::standard())
    }

    fn first_error(src: &str) -> String {
        check_script(src).unwrap_err().errors[0].message.clone()
    }

    #[test]
    fn test_resolves_entry_signature() {
        let program = check_script("int a = 3; int b = 4; print(a + b);").unwrap();
        let sig = program.signature("Snippet", "main").unwrap();
        assert!(sig.is_static);
        assert_eq!(sig.params, vec![Type::StringArray]);
        let main = program.method(program.find("Snippet", "main").unwrap());
        assert_eq!(main.locals, 3);
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(
            first_error("int a = \"x\";"),
            "incompatible types: String cannot be converted to int"
        );
        assert_eq!(first_error("print(y);"), "cannot find symbol: variable y");
        assert_eq!(
            first_error("if (1) { }"),
            "incompatible types: int cannot be converted to boolean"
        );
        assert_eq!(first_error("int a = 1; int a = 2;"), "variable a is already defined in method main");
        assert_eq!(first_error("break;"), "break outside switch or loop");
        assert_eq!(first_error("int x = 1; x.length();"), "int cannot be dereferenced");
    }

    #[test]
    fn test_string_concat_and_var() {
        let program = check_script("var s = \"n=\" + 3; print(s.length());").unwrap();
        let main = program.method(program.find("Snippet", "main").unwrap());
        let HStmtKind::Let { inferred, init, .. } = &main.body[0].kind else {
            panic!("expected let");
        };
        assert!(*inferred);
        assert_eq!(init.ty, Type::String);
    }

    #[test]
    fn test_missing_return() {
        assert_eq!(first_error("int f(int x) { if (x > 0) { return 1; } }"), "missing return statement");
        assert!(check_script("int f(int x) { if (x > 0) { return 1; } else { return 2; } }").is_ok());
        assert!(check_script("int f() { while (true) { } }").is_ok());
    }

    #[test]
    fn test_static_context() {
        let unit = parse_classes(
            "Question.java",
            "public class Question {\n  void helper() { }\n  public static void main(String[] args) { helper(); }\n}",
        )
        .unwrap();
        let err = check(&[unit], &CapabilitySet::standard()).unwrap_err();
        assert_eq!(
            err.errors[0].message,
            "non-static method helper() cannot be referenced from a static context"
        );
    }

    #[test]
    fn test_private_access_requires_capability() {
        let units = || {
            vec![
                parse_classes(
                    "Question.java",
                    "public class Question {\n  public static void main(String[] args) { Helper.secret(); }\n}",
                )
                .unwrap(),
                parse_classes(
                    "QuestionHelper1.java",
                    "class Helper {\n  private static void secret() { }\n}",
                )
                .unwrap(),
            ]
        };
        assert!(check(&units(), &CapabilitySet::standard()).is_ok());
        let err = check(&units(), &CapabilitySet::new()).unwrap_err();
        assert_eq!(err.errors[0].message, "secret() has private access in Helper");
    }

    #[test]
    fn test_duplicates_across_units() {
        let a = parse_classes("A.java", "class Dup { }").unwrap();
        let b = parse_classes("B.java", "class Dup { }").unwrap();
        let err = check(&[a, b], &CapabilitySet::standard()).unwrap_err();
        assert_eq!(err.errors[0].unit, "B.java");
        assert_eq!(err.errors[0].message, "duplicate class: Dup");
    }

    #[test]
    fn test_collects_errors_from_every_method() {
        let err = check_script("void f() { int x = true; }\nvoid g() { y = 1; }").unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }
}

//! Checked, name-resolved program shared by both engines

use crate::ast::{Type, Visibility};
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

pub type MethodId = usize;
pub type Slot = usize;

/// Every class and method of one compile, after checking
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub classes: Vec<ClassInfo>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub unit: String,
    pub methods: BTreeMap<String, MethodId>,
}

/// The inspectable shape of a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub is_static: bool,
    pub visibility: Visibility,
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub class: String,
    pub unit: String,
    pub name: String,
    pub signature: Signature,
    /// Total local slots, parameters first
    pub locals: usize,
    pub body: Vec<HStmt>,
}

impl Program {
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|c| c.name.as_str())
    }

    pub fn find(&self, class: &str, method: &str) -> Option<MethodId> {
        self.class(class)?.methods.get(method).copied()
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id]
    }

    pub fn signature(&self, class: &str, method: &str) -> Option<&Signature> {
        self.find(class, method).map(|id| &self.methods[id].signature)
    }
}

#[derive(Debug, Clone)]
pub struct HStmt {
    pub kind: HStmtKind,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum HStmtKind {
    /// `inferred` marks a `var` declaration
    Let {
        slot: Slot,
        init: HExpr,
        inferred: bool,
    },
    Assign {
        slot: Slot,
        value: HExpr,
    },
    Expr(HExpr),
    If {
        cond: HExpr,
        then: Vec<HStmt>,
        els: Vec<HStmt>,
    },
    While {
        cond: HExpr,
        body: Vec<HStmt>,
    },
    DoWhile {
        body: Vec<HStmt>,
        cond: HExpr,
    },
    For {
        init: Vec<HStmt>,
        cond: Option<HExpr>,
        update: Vec<HStmt>,
        body: Vec<HStmt>,
    },
    Return(Option<HExpr>),
    Break,
    Continue,
    Block(Vec<HStmt>),
    Throw {
        class: String,
        message: Option<HExpr>,
    },
}

#[derive(Debug, Clone)]
pub struct HExpr {
    pub kind: HExprKind,
    pub ty: Type,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print { newline: bool },
    Exit,
    GetEnv,
    Sleep,
    Abs,
    Max,
    Min,
    ParseInt,
    ValueOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMethod {
    Length,
    IsEmpty,
    ToString,
    Equals,
    ToUpperCase,
    ToLowerCase,
    Trim,
}

#[derive(Debug, Clone)]
pub enum HExprKind {
    Const(Value),
    Local(Slot),
    Neg(Box<HExpr>),
    Not(Box<HExpr>),
    Binary {
        op: Op,
        lhs: Box<HExpr>,
        rhs: Box<HExpr>,
    },
    /// Short-circuit `&&` (`and = true`) or `||`
    Logic {
        and: bool,
        lhs: Box<HExpr>,
        rhs: Box<HExpr>,
    },
    Cond {
        cond: Box<HExpr>,
        then: Box<HExpr>,
        els: Box<HExpr>,
    },
    Call {
        method: MethodId,
        args: Vec<HExpr>,
    },
    Builtin {
        builtin: Builtin,
        args: Vec<HExpr>,
    },
    ValueCall {
        receiver: Box<HExpr>,
        method: ValueMethod,
        args: Vec<HExpr>,
    },
    ArrayLength(Box<HExpr>),
}

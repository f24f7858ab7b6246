//! Recursive-descent parser for class units and loose scripts

use crate::ast::*;
use crate::diagnostics::{CompileError, Position};
use crate::lexer::{tokenize, Keyword, Token, TokenKind};

/// Deepest statement/expression nesting accepted, keeps the parser off the
/// end of the caller's stack
const MAX_NESTING: usize = 128;

type PResult<T> = Result<T, CompileError>;

struct Parser<'a> {
    unit: &'a str,
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

/// Parse a unit made of class declarations
pub fn parse_classes(unit: &str, source: &str) -> PResult<Unit> {
    let mut parser = Parser::new(unit, source)?;
    parser.skip_header()?;
    let mut classes = Vec::new();
    while !parser.at_eof() {
        classes.push(parser.class_decl()?);
    }
    Ok(Unit {
        name: unit.to_string(),
        classes,
    })
}

/// Parse loose statements and method declarations into one synthesized class
/// whose static `method(String[] args)` runs the statements in order
pub fn parse_script(unit: &str, source: &str, container: &str, method: &str) -> PResult<Unit> {
    let mut parser = Parser::new(unit, source)?;
    parser.skip_header()?;
    let mut methods = Vec::new();
    let mut body = Vec::new();
    while !parser.at_eof() {
        if parser.looks_like_method() {
            let mut decl = parser.method_decl()?;
            decl.is_static = true;
            methods.push(decl);
        } else {
            body.push(parser.stmt()?);
        }
    }
    methods.push(MethodDecl {
        name: method.to_string(),
        pos: Position::new(1, 1),
        visibility: Visibility::Public,
        is_static: true,
        ret: Type::Void,
        params: vec![Param {
            name: "args".to_string(),
            ty: Type::StringArray,
            pos: Position::new(1, 1),
        }],
        body,
    });
    Ok(Unit {
        name: unit.to_string(),
        classes: vec![ClassDecl {
            name: container.to_string(),
            pos: Position::new(1, 1),
            methods,
        }],
    })
}

/// Declared type of a local: either spelled out or `var`
enum LocalType {
    Known(Type),
    Inferred,
}

impl<'a> Parser<'a> {
    fn new(unit: &'a str, source: &str) -> PResult<Self> {
        Ok(Self {
            unit,
            tokens: tokenize(unit, source)?,
            idx: 0,
            depth: 0,
        })
    }

    // --- token helpers ---

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.idx + ahead).min(last)].kind
    }

    fn pos(&self) -> Position {
        let last = self.tokens.len() - 1;
        self.tokens[self.idx.min(last)].pos
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let last = self.tokens.len() - 1;
        let token = self.tokens[self.idx.min(last)].clone();
        if self.idx < last {
            self.idx += 1;
        }
        token
    }

    fn error_at(&self, pos: Position, message: impl Into<String>) -> CompileError {
        CompileError::new(self.unit, pos, message)
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        if self.at_eof() {
            return self.error_at(self.pos(), "reached end of file while parsing");
        }
        self.error_at(self.pos(), message)
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> PResult<Position> {
        let pos = self.pos();
        if self.eat_op(op) {
            Ok(pos)
        } else {
            Err(self.error_here(format!("'{op}' expected")))
        }
    }

    fn is_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.is_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Position)> {
        let pos = self.pos();
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, pos))
            }
            _ => Err(self.error_here("<identifier> expected")),
        }
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here("code too deeply nested"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // --- declarations ---

    /// `package` and `import` lines carry no meaning here
    fn skip_header(&mut self) -> PResult<()> {
        while self.is_kw(Keyword::Package) || self.is_kw(Keyword::Import) {
            self.advance();
            while !self.eat_op(";") {
                if self.at_eof() {
                    return Err(self.error_here("';' expected"));
                }
                self.advance();
            }
        }
        Ok(())
    }

    fn modifiers(&mut self) -> (Visibility, bool) {
        let mut visibility = Visibility::Package;
        let mut is_static = false;
        loop {
            match self.peek() {
                TokenKind::Keyword(Keyword::Public) => visibility = Visibility::Public,
                TokenKind::Keyword(Keyword::Protected) => visibility = Visibility::Protected,
                TokenKind::Keyword(Keyword::Private) => visibility = Visibility::Private,
                TokenKind::Keyword(Keyword::Static) => is_static = true,
                TokenKind::Keyword(Keyword::Final) => {}
                _ => return (visibility, is_static),
            }
            self.advance();
        }
    }

    fn class_decl(&mut self) -> PResult<ClassDecl> {
        self.modifiers();
        if !self.eat_kw(Keyword::Class) {
            return Err(self.error_here("class expected"));
        }
        let (name, pos) = self.expect_ident()?;
        self.expect_op("{")?;
        let mut methods = Vec::new();
        while !self.eat_op("}") {
            if self.at_eof() {
                return Err(self.error_here("'}' expected"));
            }
            methods.push(self.method_decl()?);
        }
        Ok(ClassDecl { name, pos, methods })
    }

    fn looks_like_method(&self) -> bool {
        let mut i = 0;
        while matches!(
            self.peek_at(i),
            TokenKind::Keyword(
                Keyword::Public | Keyword::Private | Keyword::Protected | Keyword::Static | Keyword::Final
            )
        ) {
            i += 1;
        }
        match self.peek_at(i) {
            TokenKind::Keyword(Keyword::Void | Keyword::Int | Keyword::Boolean) | TokenKind::Ident(_) => {
                i += 1
            }
            _ => return false,
        }
        if matches!(self.peek_at(i), TokenKind::Op("[")) && matches!(self.peek_at(i + 1), TokenKind::Op("]")) {
            i += 2;
        }
        matches!(self.peek_at(i), TokenKind::Ident(_)) && matches!(self.peek_at(i + 1), TokenKind::Op("("))
    }

    fn method_decl(&mut self) -> PResult<MethodDecl> {
        let (visibility, is_static) = self.modifiers();
        let ret = self.parse_type(true)?;
        let (name, pos) = self.expect_ident()?;
        if self.is_op("=") || self.is_op(";") {
            return Err(self.error_at(pos, "fields are not supported"));
        }
        self.expect_op("(")?;
        let mut params = Vec::new();
        if !self.eat_op(")") {
            loop {
                self.eat_kw(Keyword::Final);
                let mut ty = self.parse_type(false)?;
                if ty == Type::String && self.is_op(".") {
                    for _ in 0..3 {
                        self.expect_op(".")?;
                    }
                    ty = Type::StringArray;
                }
                let (name, pos) = self.expect_ident()?;
                params.push(Param { name, ty, pos });
                if self.eat_op(")") {
                    break;
                }
                self.expect_op(",")?;
            }
        }
        let body = self.block()?;
        Ok(MethodDecl {
            name,
            pos,
            visibility,
            is_static,
            ret,
            params,
            body,
        })
    }

    fn parse_type(&mut self, allow_void: bool) -> PResult<Type> {
        let pos = self.pos();
        let ty = match self.peek().clone() {
            TokenKind::Keyword(Keyword::Int) => Type::Int,
            TokenKind::Keyword(Keyword::Boolean) => Type::Boolean,
            TokenKind::Keyword(Keyword::Void) if allow_void => Type::Void,
            TokenKind::Keyword(Keyword::Void) => {
                return Err(self.error_at(pos, "'void' type not allowed here"))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "String" => Type::String,
                "Object" => Type::Object,
                _ => return Err(self.error_at(pos, format!("cannot find symbol: class {name}"))),
            },
            _ => return Err(self.error_here("<type> expected")),
        };
        self.advance();
        if self.is_op("[") {
            self.advance();
            self.expect_op("]")?;
            if ty != Type::String {
                return Err(self.error_at(pos, format!("arrays of {ty} are not supported")));
            }
            return Ok(Type::StringArray);
        }
        Ok(ty)
    }

    // --- statements ---

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_op("{")?;
        let mut stmts = Vec::new();
        while !self.eat_op("}") {
            if self.at_eof() {
                return Err(self.error_here("'}' expected"));
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn starts_local(&self) -> bool {
        match self.peek() {
            TokenKind::Keyword(Keyword::Int | Keyword::Boolean | Keyword::Final) => true,
            TokenKind::Ident(name) if name == "String" || name == "Object" => {
                matches!(self.peek_at(1), TokenKind::Ident(_) | TokenKind::Op("["))
            }
            TokenKind::Ident(name) if name == "var" => matches!(self.peek_at(1), TokenKind::Ident(_)),
            _ => false,
        }
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        self.enter()?;
        let stmt = self.stmt_inner();
        self.leave();
        stmt
    }

    fn stmt_inner(&mut self) -> PResult<Stmt> {
        let pos = self.pos();
        let kind = match self.peek() {
            TokenKind::Op("{") => StmtKind::Block(self.block()?),
            TokenKind::Op(";") => {
                self.advance();
                StmtKind::Block(Vec::new())
            }
            TokenKind::Keyword(Keyword::If) => {
                self.advance();
                let cond = self.paren_expr()?;
                let then = Box::new(self.stmt()?);
                let els = if self.eat_kw(Keyword::Else) {
                    Some(Box::new(self.stmt()?))
                } else {
                    None
                };
                StmtKind::If { cond, then, els }
            }
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                let cond = self.paren_expr()?;
                let body = Box::new(self.stmt()?);
                StmtKind::While { cond, body }
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.advance();
                let body = Box::new(self.stmt()?);
                if !self.eat_kw(Keyword::While) {
                    return Err(self.error_here("'while' expected"));
                }
                let cond = self.paren_expr()?;
                self.expect_op(";")?;
                StmtKind::DoWhile { body, cond }
            }
            TokenKind::Keyword(Keyword::For) => self.for_stmt()?,
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.is_op(";") { None } else { Some(self.expr()?) };
                self.expect_op(";")?;
                StmtKind::Return(value)
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.expect_op(";")?;
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.expect_op(";")?;
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                if !self.eat_kw(Keyword::New) {
                    return Err(self.error_here("only 'throw new Name(...)' is supported"));
                }
                let (class, _) = self.expect_ident()?;
                self.expect_op("(")?;
                let message = if self.is_op(")") { None } else { Some(self.expr()?) };
                self.expect_op(")")?;
                self.expect_op(";")?;
                StmtKind::Throw { class, message }
            }
            _ if self.starts_local() => {
                let kind = self.local()?;
                self.expect_op(";")?;
                kind
            }
            _ => {
                let kind = self.simple()?;
                self.expect_op(";")?;
                kind
            }
        };
        Ok(Stmt { kind, pos })
    }

    fn for_stmt(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.expect_op("(")?;
        let mut init = Vec::new();
        if !self.is_op(";") {
            if self.starts_local() {
                let pos = self.pos();
                init.push(Stmt {
                    kind: self.local()?,
                    pos,
                });
            } else {
                init = self.simple_list()?;
            }
        }
        self.expect_op(";")?;
        let cond = if self.is_op(";") { None } else { Some(self.expr()?) };
        self.expect_op(";")?;
        let update = if self.is_op(")") { Vec::new() } else { self.simple_list()? };
        self.expect_op(")")?;
        let body = Box::new(self.stmt()?);
        Ok(StmtKind::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn simple_list(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let pos = self.pos();
            stmts.push(Stmt {
                kind: self.simple()?,
                pos,
            });
            if !self.eat_op(",") {
                return Ok(stmts);
            }
        }
    }

    fn local(&mut self) -> PResult<StmtKind> {
        self.eat_kw(Keyword::Final);
        let ty = match self.peek() {
            TokenKind::Ident(name) if name == "var" => {
                self.advance();
                LocalType::Inferred
            }
            _ => LocalType::Known(self.parse_type(false)?),
        };
        let (name, pos) = self.expect_ident()?;
        let init = if self.eat_op("=") { Some(self.expr()?) } else { None };
        let ty = match ty {
            LocalType::Known(ty) => Some(ty),
            LocalType::Inferred if init.is_none() => {
                return Err(self.error_at(pos, "cannot infer type for local variable without initializer"))
            }
            LocalType::Inferred => None,
        };
        Ok(StmtKind::Local { ty, name, init })
    }

    /// Assignment, increment, or a call used as a statement
    fn simple(&mut self) -> PResult<StmtKind> {
        let pos = self.pos();
        if let TokenKind::Ident(name) = self.peek().clone() {
            let compound = match self.peek_at(1) {
                TokenKind::Op("=") => Some(None),
                TokenKind::Op("+=") => Some(Some(BinOp::Add)),
                TokenKind::Op("-=") => Some(Some(BinOp::Sub)),
                TokenKind::Op("*=") => Some(Some(BinOp::Mul)),
                TokenKind::Op("/=") => Some(Some(BinOp::Div)),
                TokenKind::Op("%=") => Some(Some(BinOp::Rem)),
                _ => None,
            };
            if let Some(op) = compound {
                self.advance();
                self.advance();
                let value = self.expr()?;
                return Ok(StmtKind::Assign {
                    target: name,
                    op,
                    value,
                });
            }
            let step = match self.peek_at(1) {
                TokenKind::Op("++") => Some(1),
                TokenKind::Op("--") => Some(-1),
                _ => None,
            };
            if let Some(delta) = step {
                self.advance();
                self.advance();
                return Ok(StmtKind::Step { target: name, delta });
            }
        }
        if self.is_op("++") || self.is_op("--") {
            let delta = if self.is_op("++") { 1 } else { -1 };
            self.advance();
            let (target, _) = self.expect_ident()?;
            return Ok(StmtKind::Step { target, delta });
        }
        let expr = self.expr()?;
        match expr.kind {
            ExprKind::Call { .. } => Ok(StmtKind::Expr(expr)),
            _ => Err(self.error_at(pos, "not a statement")),
        }
    }

    // --- expressions ---

    fn paren_expr(&mut self) -> PResult<Expr> {
        self.expect_op("(")?;
        let expr = self.expr()?;
        self.expect_op(")")?;
        Ok(expr)
    }

    fn expr(&mut self) -> PResult<Expr> {
        self.enter()?;
        let expr = self.conditional();
        self.leave();
        expr
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let cond = self.binary(0)?;
        if !self.is_op("?") {
            return Ok(cond);
        }
        let pos = self.pos();
        self.advance();
        let then = self.expr()?;
        self.expect_op(":")?;
        let els = self.expr()?;
        Ok(Expr {
            kind: ExprKind::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            pos,
        })
    }

    fn binary_op(&self, level: usize) -> Option<BinOp> {
        let TokenKind::Op(op) = self.peek() else {
            return None;
        };
        let op = match (level, *op) {
            (0, "||") => BinOp::Or,
            (1, "&&") => BinOp::And,
            (2, "==") => BinOp::Eq,
            (2, "!=") => BinOp::Ne,
            (3, "<") => BinOp::Lt,
            (3, "<=") => BinOp::Le,
            (3, ">") => BinOp::Gt,
            (3, ">=") => BinOp::Ge,
            (4, "+") => BinOp::Add,
            (4, "-") => BinOp::Sub,
            (5, "*") => BinOp::Mul,
            (5, "/") => BinOp::Div,
            (5, "%") => BinOp::Rem,
            _ => return None,
        };
        Some(op)
    }

    /// Left-associative binary levels, loosest (`||`) at 0
    fn binary(&mut self, level: usize) -> PResult<Expr> {
        if level > 5 {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        let mut chained = 0;
        while let Some(op) = self.binary_op(level) {
            // Every operator deepens the left spine of the tree
            self.enter()?;
            chained += 1;
            let pos = self.pos();
            self.advance();
            let rhs = self.binary(level + 1)?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            };
        }
        self.depth -= chained;
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        if self.is_op("-") {
            self.advance();
            if let TokenKind::Int(2_147_483_648) = self.peek() {
                self.advance();
                return Ok(Expr {
                    kind: ExprKind::Int(i32::MIN),
                    pos,
                });
            }
            return self.unary_of(UnaryOp::Neg, pos);
        }
        if self.eat_op("!") {
            return self.unary_of(UnaryOp::Not, pos);
        }
        if self.eat_op("+") {
            self.enter()?;
            let expr = self.unary();
            self.leave();
            return expr;
        }
        self.postfix()
    }

    fn unary_of(&mut self, op: UnaryOp, pos: Position) -> PResult<Expr> {
        self.enter()?;
        let expr = self.unary();
        self.leave();
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                expr: Box::new(expr?),
            },
            pos,
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        let mut chained = 0;
        while self.is_op(".") {
            self.enter()?;
            chained += 1;
            self.advance();
            let (name, pos) = self.expect_ident()?;
            if self.is_op("(") {
                let args = self.args()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        receiver: Some(Box::new(expr)),
                        method: name,
                        args,
                    },
                    pos,
                };
            } else {
                expr = Expr {
                    kind: ExprKind::Field {
                        receiver: Box::new(expr),
                        name,
                    },
                    pos,
                };
            }
        }
        self.depth -= chained;
        Ok(expr)
    }

    fn args(&mut self) -> PResult<Vec<Expr>> {
        self.expect_op("(")?;
        let mut args = Vec::new();
        if self.eat_op(")") {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat_op(")") {
                return Ok(args);
            }
            self.expect_op(",")?;
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        let kind = match self.peek().clone() {
            TokenKind::Int(value) => {
                self.advance();
                let value = i32::try_from(value)
                    .map_err(|_| self.error_at(pos, "integer number too large"))?;
                ExprKind::Int(value)
            }
            TokenKind::Str(value) => {
                self.advance();
                ExprKind::Str(value)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::Keyword(Keyword::New) => {
                return Err(self.error_here("object creation is not supported"))
            }
            TokenKind::Op("(") => return self.paren_expr(),
            TokenKind::Ident(name) => {
                self.advance();
                if self.is_op("(") {
                    let args = self.args()?;
                    ExprKind::Call {
                        receiver: None,
                        method: name,
                        args,
                    }
                } else {
                    ExprKind::Name(name)
                }
            }
            _ => return Err(self.error_here("illegal start of expression")),
        };
        Ok(Expr { kind, pos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_body(src: &str) -> Vec<Stmt> {
        let unit = parse_script("Snippet.java", src, "Snippet", "main").unwrap();
        unit.classes[0].methods.last().unwrap().body.clone()
    }

    #[test]
    fn test_parses_class_unit() {
        let unit = parse_classes(
            "Question.java",
            "import java.util.List;\npublic class Question {\n    public static void main(final String[] unused) {\n        int a = 3;\n    }\n}\n",
        )
        .unwrap();
        assert_eq!(unit.classes.len(), 1);
        let main = &unit.classes[0].methods[0];
        assert_eq!(main.name, "main");
        assert!(main.is_static);
        assert_eq!(main.params[0].ty, Type::StringArray);
        assert_eq!(main.body.len(), 1);
    }

    #[test]
    fn test_script_collects_methods_and_statements() {
        let unit = parse_script(
            "Snippet.java",
            "int add(int a, int b) { return a + b; }\nint x = add(1, 2);\nprint(x);",
            "Snippet",
            "main",
        )
        .unwrap();
        let class = &unit.classes[0];
        assert_eq!(class.name, "Snippet");
        assert_eq!(class.methods.len(), 2);
        assert!(class.methods[0].is_static);
        assert_eq!(class.methods[1].body.len(), 2);
    }

    #[test]
    fn test_precedence() {
        let body = script_body("int x = 1 + 2 * 3;");
        let StmtKind::Local { init: Some(init), .. } = &body[0].kind else {
            panic!("expected local");
        };
        let ExprKind::Binary { op, rhs, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_system_out_is_a_field_call() {
        let body = script_body("System.out.println(\"hi\");");
        let StmtKind::Expr(expr) = &body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { receiver: Some(receiver), method, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(method, "println");
        assert!(matches!(&receiver.kind, ExprKind::Field { name, .. } if name == "out"));
    }

    #[test]
    fn test_loops_and_steps() {
        let body = script_body("for (int i = 0; i < 3; i++) { continue; }\nint j = 0;\ndo { j += 2; } while (j < 10);");
        assert!(matches!(body[0].kind, StmtKind::For { .. }));
        assert!(matches!(body[2].kind, StmtKind::DoWhile { .. }));
    }

    #[test]
    fn test_var_requires_initializer() {
        let err = parse_script("S.java", "var x;", "S", "main").unwrap_err();
        assert!(err.message.contains("cannot infer"));
    }

    #[test]
    fn test_min_int_literal() {
        let body = script_body("int x = -2147483648;");
        let StmtKind::Local { init: Some(init), .. } = &body[0].kind else {
            panic!("expected local");
        };
        assert_eq!(init.kind, ExprKind::Int(i32::MIN));
        assert!(parse_script("S.java", "int x = 2147483648;", "S", "main").is_err());
    }

    #[test]
    fn test_syntax_errors_are_located() {
        let err = parse_classes("Q.java", "public class Q {\n  void f() {\n    int a = 3\n  }\n}").unwrap_err();
        assert_eq!(err.message, "';' expected");
        assert_eq!(err.position.line, 4);

        let err = parse_script("S.java", "1 + 2;", "S", "main").unwrap_err();
        assert_eq!(err.message, "not a statement");

        let err = parse_classes("Q.java", "public class Q {").unwrap_err();
        assert_eq!(err.message, "reached end of file while parsing");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("int x = {}1{};", "(".repeat(500), ")".repeat(500));
        let err = parse_script("S.java", &deep, "S", "main").unwrap_err();
        assert_eq!(err.message, "code too deeply nested");
    }

    #[test]
    fn test_operator_chain_limit() {
        let long = format!("int x = {}1;", "1 + ".repeat(20_000));
        let err = parse_script("S.java", &long, "S", "main").unwrap_err();
        assert_eq!(err.message, "code too deeply nested");

        let dotted = format!("int x = s{}.length();", ".a".repeat(5_000));
        let err = parse_script("S.java", &dotted, "S", "main").unwrap_err();
        assert_eq!(err.message, "code too deeply nested");

        let signs = format!("int x = {}1;", "+ ".repeat(5_000));
        let err = parse_script("S.java", &signs, "S", "main").unwrap_err();
        assert_eq!(err.message, "code too deeply nested");
    }

    #[test]
    fn test_ordinary_chains_still_parse() {
        let body = script_body(&format!("int x = {}1;", "1 + ".repeat(60)));
        let StmtKind::Local { init: Some(init), .. } = &body[0].kind else {
            panic!("expected local");
        };
        assert!(matches!(init.kind, ExprKind::Binary { op: BinOp::Add, .. }));
        script_body("String s = \"a\" + 1 + \"b\" + 2 * 3 * 4 + \"c\";");
    }
}

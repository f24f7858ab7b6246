//! Kiln Lang - a small statically checked Java subset
//!
//! Source units are parsed and checked once into a [`hir::Program`], which
//! either engine can then turn into an [`Image`]: the bytecode engine
//! ([`bytecode::BytecodeImage`]) or the tree-walking interpreter
//! ([`interp::InterpImage`]).

pub mod ast;
pub mod bytecode;
pub mod check;
pub mod diagnostics;
pub mod hir;
pub mod image;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod source;
pub mod value;

pub use diagnostics::{CompileError, CompileErrors, CompileResult, Position};
pub use hir::{MethodId, Program, Signature};
pub use image::Image;
pub use source::{SourceForm, SourceUnit};

use kiln_sandbox::CapabilitySet;

/// Parse every unit, collecting the first syntax error of each
pub fn parse_units(units: &[SourceUnit], form: &SourceForm) -> CompileResult<Vec<ast::Unit>> {
    let mut parsed = Vec::with_capacity(units.len());
    let mut errors = Vec::new();
    for unit in units {
        let result = match form {
            SourceForm::Classes => parser::parse_classes(&unit.name, &unit.contents),
            SourceForm::Script { container, method } => {
                parser::parse_script(&unit.name, &unit.contents, container, method)
            }
        };
        match result {
            Ok(ast) => parsed.push(ast),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(CompileErrors { errors })
    }
}

/// Parse and check `units` as one program
pub fn analyze(units: &[SourceUnit], form: &SourceForm, caps: &CapabilitySet) -> CompileResult<Program> {
    let parsed = parse_units(units, form)?;
    check::check(&parsed, caps)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_each_units_syntax_error() {
        let units = vec![
            SourceUnit::new("A.java", "class A { void f( }"),
            SourceUnit::new("B.java", "class B { }"),
            SourceUnit::new("C.java", "class C {"),
        ];
        let err = parse_units(&units, &SourceForm::Classes).unwrap_err();
        let names: Vec<_> = err.errors.iter().map(|e| e.unit.as_str()).collect();
        assert_eq!(names, vec!["A.java", "C.java"]);
    }

    #[test]
    fn test_analyze_inspects_signatures() {
        let units = vec![SourceUnit::new(
            "Question.java",
            "public class Question {\n  private int helper(int a, String b) { return a; }\n  public static void main(String[] args) { }\n}",
        )];
        let program = analyze(&units, &SourceForm::Classes, &CapabilitySet::standard()).unwrap();
        assert_eq!(program.class_names().collect::<Vec<_>>(), vec!["Question"]);
        let helper = program.signature("Question", "helper").unwrap();
        assert!(!helper.is_static);
        assert_eq!(helper.params, vec![ast::Type::Int, ast::Type::String]);
        assert_eq!(helper.visibility, ast::Visibility::Private);
    }
}

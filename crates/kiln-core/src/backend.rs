//! Compiler backends: each turns source units into a runnable image

use kiln_lang::bytecode::BytecodeImage;
use kiln_lang::interp::InterpImage;
use kiln_lang::{CompileErrors, Image, SourceForm, SourceUnit};
use kiln_sandbox::CapabilitySet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Bytecode,
    Interpreter,
}

impl BackendKind {
    /// Order tried when the caller leaves the choice to us: fast and
    /// restrictive first
    pub const AUTO_ORDER: [BackendKind; 2] = [BackendKind::Bytecode, BackendKind::Interpreter];

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Bytecode => "bytecode",
            BackendKind::Interpreter => "interpreter",
        }
    }

    pub fn backend(self) -> Box<dyn Backend> {
        match self {
            BackendKind::Bytecode => Box::new(BytecodeBackend),
            BackendKind::Interpreter => Box::new(InterpreterBackend),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bytecode" => Ok(BackendKind::Bytecode),
            "interpreter" => Ok(BackendKind::Interpreter),
            other => Err(format!("unknown compiler: {other}")),
        }
    }
}

pub trait Backend: Send + Sync {
    /// Compile `units` into an image that will enforce `caps` when run
    fn compile(
        &self,
        units: &[SourceUnit],
        form: &SourceForm,
        caps: &Arc<CapabilitySet>,
    ) -> Result<Arc<dyn Image>, CompileErrors>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytecodeBackend;

impl Backend for BytecodeBackend {
    fn compile(
        &self,
        units: &[SourceUnit],
        form: &SourceForm,
        caps: &Arc<CapabilitySet>,
    ) -> Result<Arc<dyn Image>, CompileErrors> {
        let program = kiln_lang::analyze(units, form, caps)?;
        let image = BytecodeImage::compile(program, Arc::clone(caps))?;
        Ok(Arc::new(image))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterBackend;

impl Backend for InterpreterBackend {
    fn compile(
        &self,
        units: &[SourceUnit],
        form: &SourceForm,
        caps: &Arc<CapabilitySet>,
    ) -> Result<Arc<dyn Image>, CompileErrors> {
        let program = kiln_lang::analyze(units, form, caps)?;
        Ok(Arc::new(InterpImage::new(program, Arc::clone(caps))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(src: &str) -> Vec<SourceUnit> {
        vec![SourceUnit::new("Question.java", src)]
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Bytecode".parse::<BackendKind>(), Ok(BackendKind::Bytecode));
        assert_eq!("interpreter".parse::<BackendKind>(), Ok(BackendKind::Interpreter));
        assert!("javac".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Interpreter.to_string(), "interpreter");
    }

    #[test]
    fn test_interpreter_accepts_what_bytecode_rejects() {
        let units = classes(
            "public class Question {\n    public static void main(String[] args) {\n        var x = 1;\n    }\n}\n",
        );
        let caps = Arc::new(CapabilitySet::standard());

        let err = BytecodeBackend
            .compile(&units, &SourceForm::Classes, &caps)
            .err()
            .unwrap();
        assert!(err.errors[0].message.contains("not supported by the bytecode backend"));

        let image = InterpreterBackend
            .compile(&units, &SourceForm::Classes, &caps)
            .unwrap();
        assert!(image.program().find("Question", "main").is_some());
    }

    #[test]
    fn test_both_report_checker_errors() {
        let units = classes("public class Question {\n    static void main(String[] args) { y = 1; }\n}\n");
        let caps = Arc::new(CapabilitySet::standard());
        for kind in BackendKind::AUTO_ORDER {
            let err = kind.backend().compile(&units, &SourceForm::Classes, &caps).err().unwrap();
            assert!(err.errors[0].message.contains("cannot find symbol"), "{kind}: {err}");
        }
    }
}

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// A single compile-stage error located in a named unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileError {
    pub unit: String,
    #[serde(flatten)]
    pub position: Position,
    pub message: String,
}

impl CompileError {
    pub fn new(unit: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: error: {}",
            self.unit, self.position.line, self.position.col, self.message
        )
    }
}

/// Every error a compile attempt produced, in source order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(transparent)]
pub struct CompileErrors {
    pub errors: Vec<CompileError>,
}

impl CompileErrors {
    pub fn single(error: CompileError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// All errors, one per line
    pub fn listing(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<CompileError> for CompileErrors {
    fn from(error: CompileError) -> Self {
        Self::single(error)
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("compilation failed"),
            [only] => write!(f, "{only}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileErrors>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let e = CompileError::new("Question.java", Position::new(3, 9), "cannot find symbol: x");
        assert_eq!(e.to_string(), "Question.java:3:9: error: cannot find symbol: x");

        let errors = CompileErrors {
            errors: vec![e.clone(), e.clone(), e],
        };
        assert!(errors.to_string().ends_with("(and 2 more)"));
        assert_eq!(errors.listing().lines().count(), 3);
    }

    #[test]
    fn test_serializes_flat() {
        let e = CompileError::new("A.java", Position::new(1, 2), "oops");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["line"], 1);
        assert_eq!(json["col"], 2);
        assert_eq!(json["unit"], "A.java");
    }
}

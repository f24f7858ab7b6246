//! Style gate run before compilation
//!
//! [`StyleChecker`] enforces a small line-oriented house style: no tabs, no
//! trailing spaces, a maximum line length, and indentation that follows
//! brace depth. Each request gets its own [`LintConfig`] derived from the
//! operator's template, so no shared configuration is ever modified.

use kiln_lang::SourceUnit;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INDENT: usize = 4;
pub const DEFAULT_MAX_LINE_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LintConfig {
    /// Spaces per brace level
    pub indent: usize,
    pub max_line_length: usize,
    pub allow_tabs: bool,
    pub check_trailing_whitespace: bool,
    pub check_indentation: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            allow_tabs: false,
            check_trailing_whitespace: true,
            check_indentation: true,
        }
    }
}

impl LintConfig {
    /// A copy of this template with a different indentation width
    pub fn with_indent(&self, indent: usize) -> Self {
        Self {
            indent,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintDiagnostic {
    pub unit: String,
    pub line: u32,
    pub col: u32,
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub diagnostics: Vec<LintDiagnostic>,
}

impl LintReport {
    /// Warnings are reported but do not fail the gate
    pub fn passed(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error("Invalid lint configuration: {0}")]
    InvalidConfig(String),
}

/// A style checker the pipeline can gate compilation on
pub trait LintGate: Send + Sync {
    fn check(&self, units: &[SourceUnit], config: &LintConfig) -> Result<LintReport, LintError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StyleChecker;

impl LintGate for StyleChecker {
    fn check(&self, units: &[SourceUnit], config: &LintConfig) -> Result<LintReport, LintError> {
        if config.indent == 0 || config.indent > 16 {
            return Err(LintError::InvalidConfig(format!(
                "indent must be between 1 and 16, got {}",
                config.indent
            )));
        }
        let mut report = LintReport::default();
        for unit in units {
            UnitScan::new(unit, config, &mut report.diagnostics).run();
        }
        Ok(report)
    }
}

struct UnitScan<'a> {
    unit: &'a SourceUnit,
    config: &'a LintConfig,
    out: &'a mut Vec<LintDiagnostic>,
    depth: usize,
    in_block_comment: bool,
    continuation: bool,
}

impl<'a> UnitScan<'a> {
    fn new(unit: &'a SourceUnit, config: &'a LintConfig, out: &'a mut Vec<LintDiagnostic>) -> Self {
        Self {
            unit,
            config,
            out,
            depth: 0,
            in_block_comment: false,
            continuation: false,
        }
    }

    fn report(&mut self, line: u32, col: usize, rule: &'static str, severity: Severity, message: String) {
        self.out.push(LintDiagnostic {
            unit: self.unit.name.clone(),
            line,
            col: col as u32,
            rule,
            severity,
            message,
        });
    }

    fn run(mut self) {
        let unit = self.unit;
        for (idx, text) in unit.contents.lines().enumerate() {
            self.line(idx as u32 + 1, text);
        }
    }

    fn line(&mut self, line: u32, text: &str) {
        if !self.config.allow_tabs {
            if let Some(at) = text.find('\t') {
                self.report(line, at + 1, "no-tabs", Severity::Error, "Line contains a tab character.".into());
            }
        }
        let trimmed_end = text.trim_end();
        if self.config.check_trailing_whitespace && trimmed_end.len() != text.len() {
            self.report(
                line,
                trimmed_end.chars().count() + 1,
                "trailing-whitespace",
                Severity::Warning,
                "Line has trailing spaces.".into(),
            );
        }
        let length = text.chars().count();
        if length > self.config.max_line_length {
            let max = self.config.max_line_length;
            self.report(
                line,
                max + 1,
                "line-length",
                Severity::Error,
                format!("Line is longer than {max} characters (found {length})."),
            );
        }

        let body = text.trim_start_matches(' ');
        let lead = text.len() - body.len();
        let checkable = self.config.check_indentation
            && !self.in_block_comment
            && !body.trim().is_empty()
            && !body.starts_with('\t');
        if checkable {
            self.indentation(line, lead, body);
        }
        self.scan(text);
    }

    fn indentation(&mut self, line: u32, lead: usize, body: &str) {
        let closing = body.starts_with('}');
        let level = if closing { self.depth.saturating_sub(1) } else { self.depth };
        let expected = level * self.config.indent;
        if self.continuation && !closing {
            if lead <= expected {
                self.report(
                    line,
                    lead + 1,
                    "indentation",
                    Severity::Error,
                    format!(
                        "Continuation line has incorrect indentation level {lead}, expected level should be more than {expected}."
                    ),
                );
            }
        } else if lead != expected {
            let token: String = body
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '(')
                .collect();
            self.report(
                line,
                lead + 1,
                "indentation",
                Severity::Error,
                format!("'{token}' has incorrect indentation level {lead}, expected level should be {expected}."),
            );
        }
    }

    /// Track brace depth, block comments, and whether the next line continues
    /// this one, ignoring anything inside literals and comments
    fn scan(&mut self, text: &str) {
        let mut chars = text.chars().peekable();
        let mut quote: Option<char> = None;
        let mut last: Option<char> = None;
        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                '"' | '\'' => {
                    quote = Some(c);
                    last = Some(c);
                }
                '{' => {
                    self.depth += 1;
                    last = Some(c);
                }
                '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    last = Some(c);
                }
                c if c.is_whitespace() => {}
                c => last = Some(c),
            }
        }
        // Comment-only and blank lines leave the state alone
        if let Some(last) = last {
            self.continuation = !matches!(last, ';' | '{' | '}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(src: &str, config: &LintConfig) -> LintReport {
        StyleChecker
            .check(&[SourceUnit::new("Question.java", src)], config)
            .unwrap()
    }

    const CLEAN: &str = "public class Question {\n    public static void main(String[] args) {\n        int total = 0;\n        for (int i = 0; i < 3; i++) {\n            total += i;\n        }\n        System.out.println(total);\n    }\n}\n";

    #[test]
    fn test_clean_source_passes() {
        let report = lint(CLEAN, &LintConfig::default());
        assert!(report.passed(), "{:?}", report.diagnostics);
        assert_eq!(report.diagnostic_count(), 0);
    }

    #[test]
    fn test_wrong_indentation_is_located() {
        let src = "public class Question {\n    public static void main(String[] args) {\n      int total = 0;\n    }\n}\n";
        let report = lint(src, &LintConfig::default());
        assert!(!report.passed());
        let d = &report.diagnostics[0];
        assert_eq!((d.line, d.col, d.rule), (3, 7, "indentation"));
        assert_eq!(d.message, "'int' has incorrect indentation level 6, expected level should be 8.");
    }

    #[test]
    fn test_indent_override() {
        let two = "class A {\n  void f() {\n    g();\n  }\n}\n";
        assert!(lint(two, &LintConfig::default().with_indent(2)).passed());
        assert!(!lint(two, &LintConfig::default()).passed());
    }

    #[test]
    fn test_line_rules() {
        let long = format!("int x = {};", "1 + ".repeat(30) + "1");
        let src = format!("int a = 1; \n\tint b = 2;\n{long}\n");
        let report = lint(&src, &LintConfig::default());
        let rules: Vec<_> = report.diagnostics.iter().map(|d| d.rule).collect();
        assert_eq!(rules, vec!["trailing-whitespace", "no-tabs", "line-length"]);
        assert_eq!(report.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_trailing_spaces_alone_do_not_fail() {
        let report = lint("int a = 1;  \n", &LintConfig::default());
        assert!(report.passed());
        assert_eq!(report.diagnostic_count(), 1);
    }

    #[test]
    fn test_braces_in_literals_and_comments_are_ignored() {
        let src = "class A {\n    String s = \"{{\"; // }\n    /* {\n       } */\n    char c = '}';\n}\n";
        let report = lint(src, &LintConfig::default());
        assert!(report.passed(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_continuation_lines_must_be_deeper() {
        let ok = "int total = 1\n        + 2;\nif (total > 0)\n    total = 0;\n";
        assert!(lint(ok, &LintConfig::default()).passed());
        let bad = "int total = 1\n+ 2;\n";
        let report = lint(bad, &LintConfig::default());
        assert_eq!(report.diagnostics[0].line, 2);
        assert!(report.diagnostics[0].message.starts_with("Continuation line"));
    }

    #[test]
    fn test_rejects_zero_indent() {
        let err = StyleChecker
            .check(&[], &LintConfig::default().with_indent(0))
            .unwrap_err();
        assert!(err.to_string().contains("indent"));
    }
}

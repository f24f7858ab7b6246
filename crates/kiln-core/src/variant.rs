//! Request flavours: how submitted text becomes named source units

use crate::lint::LintReport;
use crate::{CoreError, Result};
use kiln_lang::{SourceForm, SourceUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container synthesized around snippets
pub const SNIPPET_CONTAINER: &str = "Snippet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Snippet,
    Template,
    Class,
    Classes,
}

/// The static method execution starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub container: String,
    pub method: String,
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::new("Question", "main")
    }
}

impl EntryPoint {
    pub fn new(container: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.container, self.method)
    }
}

/// Source units ready for the pipeline, plus how to read and enter them
#[derive(Debug, Clone)]
pub struct Variant {
    pub kind: VariantKind,
    /// Units handed to the compiler
    pub units: Vec<SourceUnit>,
    pub form: SourceForm,
    pub entry: EntryPoint,
    /// Units the lint gate sees when they differ from `units`
    lint_units: Option<Vec<SourceUnit>>,
    /// Line `i + 1` of the linted unit came from this source line, if any
    line_map: Option<Vec<Option<u32>>>,
}

impl Variant {
    /// Loose statements and methods compiled as-is
    pub fn snippet(source: impl Into<String>) -> Self {
        Self {
            kind: VariantKind::Snippet,
            units: vec![SourceUnit::new(snippet_unit_name(), source)],
            form: script_form(),
            entry: EntryPoint::new(SNIPPET_CONTAINER, "main"),
            lint_units: None,
            line_map: None,
        }
    }

    /// Like [`Variant::snippet`], but linted as if it were written inside a
    /// `main` method indented by `indent` spaces per level
    pub fn template(source: impl Into<String>, indent: usize) -> Self {
        let source = source.into();
        let (templated, line_map) = wrap_in_template(&source, indent);
        let mut variant = Self::snippet(source);
        variant.kind = VariantKind::Template;
        variant.lint_units = Some(vec![SourceUnit::new(snippet_unit_name(), templated)]);
        variant.line_map = Some(line_map);
        variant
    }

    /// One complete class named after the entry point's container
    pub fn class(source: impl Into<String>, entry: EntryPoint) -> Self {
        Self {
            kind: VariantKind::Class,
            units: vec![SourceUnit::new(format!("{}.java", entry.container), source)],
            form: SourceForm::Classes,
            entry,
            lint_units: None,
            line_map: None,
        }
    }

    /// Several units; the first is named after the container and the rest
    /// get derived helper names so they never collide
    pub fn classes(sources: Vec<String>, entry: EntryPoint) -> Result<Self> {
        if sources.is_empty() {
            return Err(CoreError::InvalidRequest("sources must not be empty".into()));
        }
        let units = sources
            .into_iter()
            .enumerate()
            .map(|(i, contents)| {
                let name = if i == 0 {
                    format!("{}.java", entry.container)
                } else {
                    format!("{}Helper{i}.java", entry.container)
                };
                SourceUnit::new(name, contents)
            })
            .collect();
        Ok(Self {
            kind: VariantKind::Classes,
            units,
            form: SourceForm::Classes,
            entry,
            lint_units: None,
            line_map: None,
        })
    }

    pub fn lint_units(&self) -> &[SourceUnit] {
        self.lint_units.as_deref().unwrap_or(&self.units)
    }

    /// Point diagnostics on templated lines back at the submitted source.
    /// Lines the template added keep their templated numbers.
    pub fn remap(&self, mut report: LintReport) -> LintReport {
        if let Some(map) = &self.line_map {
            for diagnostic in &mut report.diagnostics {
                let original = (diagnostic.line as usize)
                    .checked_sub(1)
                    .and_then(|idx| map.get(idx).copied().flatten());
                if let Some(line) = original {
                    diagnostic.line = line;
                }
            }
        }
        report
    }
}

fn snippet_unit_name() -> String {
    format!("{SNIPPET_CONTAINER}.java")
}

fn script_form() -> SourceForm {
    SourceForm::Script {
        container: SNIPPET_CONTAINER.into(),
        method: "main".into(),
    }
}

fn wrap_in_template(source: &str, indent: usize) -> (String, Vec<Option<u32>>) {
    let outer = " ".repeat(indent);
    let inner = " ".repeat(indent * 2);
    let mut text = String::with_capacity(source.len() + 64);
    let mut map = Vec::new();

    text.push_str("public class Snippet {\n");
    map.push(None);
    text.push_str(&format!("{outer}public static void main(String[] args) {{\n"));
    map.push(None);

    let body = source.trim();
    let skipped = source[..source.len() - source.trim_start().len()].matches('\n').count();
    for (idx, line) in body.lines().enumerate() {
        if line.starts_with("import ") {
            continue;
        }
        let line = line.strip_prefix("static ").unwrap_or(line).trim_end();
        if !line.is_empty() {
            text.push_str(&inner);
            text.push_str(line);
        }
        text.push('\n');
        map.push(Some((skipped + idx) as u32 + 1));
    }

    text.push_str(&format!("{outer}}}\n"));
    map.push(None);
    text.push_str("}\n");
    map.push(None);
    (text, map)
}

//! Request bodies accepted by the transport

use kiln_core::lint::DEFAULT_INDENT;
use kiln_core::{CompilerChoice, CoreError, EntryPoint, RunRequest, Variant, VariantKind};
use serde::Deserialize;

/// Largest indentation width accepted from callers
const MAX_INDENT: usize = 16;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBody {
    pub source: Option<String>,
    pub sources: Option<Vec<String>>,
    #[serde(rename = "as")]
    pub variant: Option<VariantKind>,
    pub compiler: Option<String>,
    #[serde(alias = "containerName")]
    pub class_name: Option<String>,
    pub method_name: Option<String>,
    #[serde(alias = "timeoutLength")]
    pub timeout: Option<u64>,
    pub indent_level: Option<usize>,
    pub run_checkstyle: Option<bool>,
    pub require_checkstyle: Option<bool>,
}

impl RunBody {
    pub fn into_request(self) -> Result<RunRequest, CoreError> {
        let indent = self.indent_level.unwrap_or(DEFAULT_INDENT);
        if !(1..=MAX_INDENT).contains(&indent) {
            return Err(CoreError::InvalidRequest(format!(
                "indentLevel must be between 1 and {MAX_INDENT}"
            )));
        }
        let compiler = match self.compiler.as_deref() {
            Some(name) => name.parse::<CompilerChoice>().map_err(CoreError::InvalidRequest)?,
            None => CompilerChoice::Auto,
        };
        let entry = EntryPoint::new(
            self.class_name.unwrap_or_else(|| "Question".into()),
            self.method_name.unwrap_or_else(|| "main".into()),
        );
        let kind = self.variant.unwrap_or(if self.sources.is_some() {
            VariantKind::Classes
        } else {
            VariantKind::Snippet
        });

        let variant = match kind {
            VariantKind::Snippet => Variant::snippet(required(self.source)?),
            VariantKind::Template => Variant::template(required(self.source)?, indent),
            VariantKind::Class => Variant::class(required(self.source)?, entry),
            VariantKind::Classes => {
                let sources = match (self.sources, self.source) {
                    (Some(sources), _) => sources,
                    (None, Some(source)) => vec![source],
                    (None, None) => return Err(missing("sources")),
                };
                Variant::classes(sources, entry)?
            }
        };

        Ok(RunRequest {
            variant,
            compiler,
            timeout_ms: self.timeout,
            indent_level: indent,
            run_lint: self.run_checkstyle.unwrap_or(true),
            require_lint: self.require_checkstyle.unwrap_or(true),
        })
    }
}

fn required(source: Option<String>) -> Result<String, CoreError> {
    source.ok_or_else(|| missing("source"))
}

fn missing(field: &str) -> CoreError {
    CoreError::InvalidRequest(format!("missing field: {field}"))
}

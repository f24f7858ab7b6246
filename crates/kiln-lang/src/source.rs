use serde::{Deserialize, Serialize};

/// One named compilation unit as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub name: String,
    pub contents: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// How the units should be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceForm {
    /// Complete class declarations
    Classes,
    /// Loose statements and method declarations, gathered into `container`
    /// with the statements forming the static method `method`
    Script { container: String, method: String },
}

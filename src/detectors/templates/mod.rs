//! Statement and expression template synthesis.
//!
//! Builders turn the statement that follows a classified [`Scope`] into a
//! [`StatementDescriptor`]: the scope key, the template text with `$name$`
//! placeholders, and the suggestion text for each placeholder. A builder that
//! cannot render a statement returns `None` and the observation is skipped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::detectors::scopes::{Scope, ScopeParameters, VARIABLE_NAME};
use crate::lang::common::StatementRef;

pub mod expression;
pub mod statements;

pub use expression::{render, ExpressionDescriptor};
pub use statements::{
    standard_builders, BreakTemplate, ContinueTemplate, DoWhileTemplate, ForEachTemplate,
    IfTemplate, InvocationTemplate, LocalVariableTemplate, ReturnTemplate, TryCatchTemplate,
    TryFinallyTemplate, WhileTemplate,
};

/// Placeholder name to suggestion-function text, in insertion order.
pub type TemplateVariables = IndexMap<String, String>;

/// Caret marker inside block templates.
pub const END_MARKER: &str = "$END$";

/// Placeholder for the scope's subject variable.
pub const VARIABLE_PLACEHOLDER: &str = "$VariableName$";

/// Suggestion text asking for a fresh variable name.
pub const SUGGEST_VARIABLE_NAME: &str = "suggestVariableName()";

/// One mined observation: the template that followed a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDescriptor {
    /// Scope key
    pub key: String,
    /// Source file identifier, empty until the analyzer assigns one
    #[serde(default)]
    pub file_name: String,
    /// Template text
    pub template: String,
    /// Placeholder suggestions
    #[serde(default)]
    pub variables: TemplateVariables,
}

impl StatementDescriptor {
    /// Descriptor for `scope` with the given template and variables
    pub fn new(scope: &Scope, template: impl Into<String>, variables: TemplateVariables) -> Self {
        Self {
            key: scope.key().to_string(),
            file_name: String::new(),
            template: template.into(),
            variables,
        }
    }

    /// Descriptor from raw parts, as read back from a corpus file
    pub fn from_parts(
        key: impl Into<String>,
        file_name: impl Into<String>,
        template: impl Into<String>,
        variables: TemplateVariables,
    ) -> Self {
        Self {
            key: key.into(),
            file_name: file_name.into(),
            template: template.into(),
            variables,
        }
    }

    /// Attach the source file identifier
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

/// Builds a template from one statement kind.
pub trait StatementTemplateBuilder: Send + Sync {
    /// Builder name for diagnostics
    fn name(&self) -> &'static str;

    /// Cheap structural check
    fn can_handle(&self, statement: StatementRef<'_>) -> bool;

    /// Render `statement` as a template for `scope`
    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor>;
}

/// Replace every occurrence of the subject variable's text with its placeholder.
///
/// This is plain substring replacement, so identifiers that merely contain the
/// variable name are rewritten too.
pub(crate) fn replace_subject(text: &str, parameters: &ScopeParameters) -> String {
    match parameters.get(VARIABLE_NAME) {
        Some(variable) if !variable.is_empty() => text.replace(variable.as_str(), VARIABLE_PLACEHOLDER),
        _ => text.to_string(),
    }
}

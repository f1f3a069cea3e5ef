//! Turning a published suggestion into inserted text.
//!
//! Live scope parameters captured at the cursor replace their placeholders
//! literally; every other placeholder stays a field for the executor to fill
//! in, seeded with its suggestion function.

use std::fmt;

use crate::core::config::SuggestionSettings;
use crate::core::errors::{AutoTemplateError, Result};
use crate::detectors::scopes::ScopeParameters;
use crate::detectors::templates::{TemplateVariables, END_MARKER};
use crate::io::cache::AutoTemplate;
use crate::lang::common::{InsertionEdit, InsertionPoint};

/// Prefix of offer labels
pub const INSERT_LABEL_PREFIX: &str = "Insert: ";

const LEAD_IN_WHITESPACE: &[char] = &[' ', '\t'];

/// Replace `$name$` for every captured parameter.
pub fn substitute_parameters(template: &str, parameters: &ScopeParameters) -> String {
    parameters
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("${name}$"), value)
        })
}

/// Cosmetic one-line rendering of a suggestion for previews.
///
/// Remaining placeholders show their own name, braces and the end marker are
/// dropped and runs of spaces collapse. Never used for inserted text.
pub fn presentation_text(template: &AutoTemplate, parameters: &ScopeParameters) -> String {
    let mut text = substitute_parameters(&template.template, parameters);
    for name in template.variables.keys() {
        text = text.replace(&format!("${name}$"), name);
    }
    text = text.replace(END_MARKER, "").replace(['{', '}'], "");
    while text.contains("  ") {
        text = text.replace("  ", " ");
    }
    text.trim().to_string()
}

/// `Insert: <presentation text>`
pub fn offer_label(template: &AutoTemplate, parameters: &ScopeParameters) -> String {
    format!("{INSERT_LABEL_PREFIX}{}", presentation_text(template, parameters))
}

/// A template ready for an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInvocation {
    /// Text with live parameters substituted
    pub text: String,
    /// Remaining placeholders and their suggestion functions
    pub fields: TemplateVariables,
}

impl TemplateInvocation {
    /// Prepare `template` for insertion with the live `parameters`.
    /// `newline_before` prefixes the text with a line break, as insertions
    /// chosen from an offer list do.
    pub fn new(template: &AutoTemplate, parameters: &ScopeParameters, newline_before: bool) -> Self {
        let mut text = template.template.clone();
        if newline_before {
            text.insert(0, '\n');
        }
        Self {
            text: substitute_parameters(&text, parameters),
            fields: template.variables.clone(),
        }
    }
}

impl fmt::Display for TemplateInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Drives the fill-in session for an invocation at an insertion point.
pub trait TemplateExecutor {
    /// Insert `invocation` at `point`
    fn execute(&mut self, invocation: &TemplateInvocation, point: InsertionPoint) -> Result<()>;
}

/// Non-interactive executor over a text buffer.
///
/// Each field takes its default: the first entry of a `list("...")`
/// suggestion, the field name otherwise. The caret lands on the end marker,
/// or after the inserted text without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferExecutor {
    text: String,
    caret: Option<usize>,
}

impl BufferExecutor {
    /// Executor editing `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            caret: None,
        }
    }

    /// Current buffer text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Caret offset after the last execution
    pub fn caret(&self) -> Option<usize> {
        self.caret
    }

    /// Consume the executor
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Value a field takes without user input
pub fn default_field_value(name: &str, suggestion: &str) -> String {
    suggestion
        .strip_prefix("list(\"")
        .and_then(|rest| rest.strip_suffix("\")"))
        .and_then(|items| items.split(',').next())
        .filter(|first| !first.is_empty())
        .unwrap_or(name)
        .to_string()
}

impl TemplateExecutor for BufferExecutor {
    fn execute(&mut self, invocation: &TemplateInvocation, point: InsertionPoint) -> Result<()> {
        let mut snippet = invocation.text.clone();
        for (name, suggestion) in &invocation.fields {
            snippet = snippet.replace(&format!("${name}$"), &default_field_value(name, suggestion));
        }
        let end = snippet.find(END_MARKER);
        let snippet = snippet.replace(END_MARKER, "");

        let updated = point.apply(&self.text, &snippet).ok_or_else(|| {
            AutoTemplateError::validation_field(
                format!("Insertion point {} is outside the buffer", point.offset),
                "offset",
            )
        })?;

        // Offset of the snippet inside the updated text
        let snippet_start = match point.edit {
            InsertionEdit::Insert => point.offset,
            _ => point.offset + 1,
        };
        self.caret = Some(snippet_start + end.unwrap_or(snippet.len()));
        self.text = updated;
        Ok(())
    }
}

/// Whether the caret sits in the lead-in whitespace of its line: only
/// spaces and tabs before it, and whitespace (or nothing) right after it.
pub fn at_lead_in_whitespace(text: &str, caret: usize) -> bool {
    let Some(before) = text.get(..caret) else {
        return false;
    };
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &before[line_start..];
    if !prefix.trim_start_matches(LEAD_IN_WHITESPACE).is_empty() {
        return false;
    }

    let rest = &text[caret..];
    let line_rest = rest.split(['\n', '\r']).next().unwrap_or("");
    if prefix.is_empty() || line_rest.is_empty() {
        return true;
    }
    line_rest.starts_with(LEAD_IN_WHITESPACE)
}

/// Whether the complete-statement gesture should offer suggestions here
pub fn complete_statement_triggers(settings: &SuggestionSettings, text: &str, caret: usize) -> bool {
    settings.use_complete_statement && at_lead_in_whitespace(text, caret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::common::TextRange;

    fn template(text: &str, variables: &[(&str, &str)]) -> AutoTemplate {
        AutoTemplate {
            key: "k".to_string(),
            template: text.to_string(),
            count: 3,
            percentage: 100,
            variables: variables
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> ScopeParameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn live_parameters_replace_placeholders() {
        let text = substitute_parameters(
            "$VariableName$.Open($arg0$);",
            &params(&[("VariableName", "conn")]),
        );
        assert_eq!(text, "conn.Open($arg0$);");
    }

    #[test]
    fn presentation_is_cosmetic() {
        let suggestion = template(
            "if ($VariableName$ == null) {  $END$ }",
            &[("x", "completeSmart()")],
        );
        let live = params(&[("VariableName", "conn")]);
        assert_eq!(presentation_text(&suggestion, &live), "if (conn == null)");
        assert_eq!(offer_label(&suggestion, &live), "Insert: if (conn == null)");

        let invocation = TemplateInvocation::new(&suggestion, &live, false);
        assert_eq!(invocation.text, "if (conn == null) {  $END$ }");
    }

    #[test]
    fn unbound_placeholders_show_their_name() {
        let suggestion = template("$VariableName$.Add($value$);", &[("value", "completeSmart()")]);
        assert_eq!(
            presentation_text(&suggestion, &params(&[("VariableName", "items")])),
            "items.Add(value);"
        );
    }

    #[test]
    fn offers_insert_on_a_new_line() {
        let suggestion = template("$VariableName$.Open();", &[]);
        let invocation =
            TemplateInvocation::new(&suggestion, &params(&[("VariableName", "conn")]), true);
        assert_eq!(invocation.text, "\nconn.Open();");
        assert_eq!(invocation.to_string(), "\nconn.Open();");
    }

    #[test]
    fn buffer_executor_fills_fields_and_places_caret() {
        let suggestion = template(
            "$VariableName$.Mode = $mode$;$END$",
            &[("mode", "list(\"Fast,Slow\")")],
        );
        let invocation =
            TemplateInvocation::new(&suggestion, &params(&[("VariableName", "c")]), false);

        let mut executor = BufferExecutor::new("a();b();");
        executor.execute(&invocation, InsertionPoint::at(4)).unwrap();
        assert_eq!(executor.text(), "a();c.Mode = Fast;b();");
        assert_eq!(executor.caret(), Some(18));
    }

    #[test]
    fn buffer_executor_synthesizes_blocks() {
        let invocation = TemplateInvocation::new(&template("x();", &[]), &params(&[]), false);
        let mut executor = BufferExecutor::new("if (a) ;");
        let point = InsertionPoint {
            offset: 7,
            edit: InsertionEdit::SynthesizeBlock {
                replace: TextRange::new(7, 8),
            },
        };
        executor.execute(&invocation, point).unwrap();
        assert_eq!(executor.into_text(), "if (a) {x(); }");
    }

    #[test]
    fn buffer_executor_rejects_points_outside_the_text() {
        let invocation = TemplateInvocation::new(&template("x();", &[]), &params(&[]), false);
        let mut executor = BufferExecutor::new("ab");
        assert!(executor.execute(&invocation, InsertionPoint::at(10)).is_err());
        assert_eq!(executor.text(), "ab");
    }

    #[test]
    fn field_defaults() {
        assert_eq!(default_field_value("mode", "list(\"Fast,Slow\")"), "Fast");
        assert_eq!(default_field_value("value", "completeSmart()"), "value");
        assert_eq!(default_field_value("name", "list(\"\")"), "name");
    }

    #[test]
    fn lead_in_whitespace_detection() {
        let text = "    \n    foo();\n\t\n";
        assert!(at_lead_in_whitespace(text, 0));
        assert!(at_lead_in_whitespace(text, 2));
        assert!(at_lead_in_whitespace(text, 4));
        assert!(!at_lead_in_whitespace(text, 9));
        assert!(!at_lead_in_whitespace(text, 12));
        assert!(at_lead_in_whitespace(text, 17));
        assert!(!at_lead_in_whitespace(text, 100));
    }

    #[test]
    fn complete_statement_respects_setting() {
        let mut settings = SuggestionSettings::default();
        settings.use_complete_statement = true;
        assert!(complete_statement_triggers(&settings, "  ", 2));
        settings.use_complete_statement = false;
        assert!(!complete_statement_triggers(&settings, "  ", 2));
    }
}

//! Expression template rendering.
//!
//! [`render`] dispatches over [`ExpressionKind`]; shapes without a dedicated
//! rule fall back to their source text. `None` means a required part was
//! missing and the enclosing statement cannot be templated.

use crate::detectors::scopes::{ScopeParameters, VARIABLE_NAME};
use crate::detectors::templates::{TemplateVariables, SUGGEST_VARIABLE_NAME, VARIABLE_PLACEHOLDER};
use crate::lang::common::{Argument, Expression, ExpressionKind, Symbol, TypeInfo, MAX_EXPRESSION_DEPTH};

/// Rendered expression template and the placeholders it introduced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionDescriptor {
    /// Template text
    pub template: String,
    /// Captured placeholder suggestions
    pub variables: TemplateVariables,
}

impl ExpressionDescriptor {
    fn text(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: TemplateVariables::new(),
        }
    }

    fn absorb(&mut self, variables: TemplateVariables) {
        for (name, value) in variables {
            self.variables.insert(name, value);
        }
    }
}

/// Render `expression` against the scope's captured parameters.
///
/// Expressions nested deeper than [`MAX_EXPRESSION_DEPTH`] are not rendered.
pub fn render(expression: &Expression, parameters: &ScopeParameters) -> Option<ExpressionDescriptor> {
    render_at(expression, parameters, 0)
}

fn render_at(
    expression: &Expression,
    parameters: &ScopeParameters,
    depth: usize,
) -> Option<ExpressionDescriptor> {
    if depth > MAX_EXPRESSION_DEPTH {
        return None;
    }
    let subject = parameters.get(VARIABLE_NAME).map(String::as_str).unwrap_or("");

    match &expression.kind {
        ExpressionKind::Invocation { invoked, arguments } => {
            render_invocation(invoked, arguments, subject, parameters, depth)
        }
        ExpressionKind::Reference {
            qualifier,
            name,
            target,
        } => Some(render_reference(
            qualifier.as_deref(),
            name,
            target.as_ref(),
            subject,
            parameters,
            depth,
        )),
        ExpressionKind::Binary {
            left,
            operator,
            right,
        } => {
            let left = render_at(left, parameters, depth + 1)?;
            let right = render_at(right, parameters, depth + 1)?;
            let mut result = ExpressionDescriptor::text(format!(
                "{} {} {}",
                left.template, operator, right.template
            ));
            result.absorb(right.variables);
            result.absorb(left.variables);
            Some(result)
        }
        ExpressionKind::Is {
            operand,
            written_type,
            ..
        } => wrap_operand(operand, parameters, depth, |o| format!("{o} is {written_type}")),
        ExpressionKind::As {
            operand,
            written_type,
            ..
        } => wrap_operand(operand, parameters, depth, |o| format!("{o} as {written_type}")),
        ExpressionKind::Cast {
            operand,
            written_type,
            ..
        } => wrap_operand(operand, parameters, depth, |o| format!("({written_type}){o}")),
        ExpressionKind::Unary {
            operator,
            operand,
            postfix: false,
        } => wrap_operand(operand, parameters, depth, |o| format!("{operator}{o}")),
        ExpressionKind::Parenthesized(inner) => {
            wrap_operand(inner, parameters, depth, |o| format!("({o})"))
        }
        ExpressionKind::This => Some(render_this(expression)),
        ExpressionKind::ObjectCreation {
            type_name,
            arguments,
        } => {
            let type_name = type_name.as_ref()?;
            let created = type_name
                .resolved
                .as_ref()
                .map(|name| name.full_name())
                .unwrap_or_else(|| type_name.written.clone());

            let mut result = ExpressionDescriptor::text(format!("new {created}("));
            render_arguments(&mut result, arguments, subject);
            result.template.push(')');
            Some(result)
        }
        _ => Some(ExpressionDescriptor::text(expression.text.clone())),
    }
}

fn wrap_operand(
    operand: &Expression,
    parameters: &ScopeParameters,
    depth: usize,
    format: impl FnOnce(&str) -> String,
) -> Option<ExpressionDescriptor> {
    let inner = render_at(operand, parameters, depth + 1)?;
    let mut result = ExpressionDescriptor::text(format(&inner.template));
    result.absorb(inner.variables);
    Some(result)
}

/// Render a qualifier, falling back to its source text.
fn render_qualifier(
    qualifier: &Expression,
    parameters: &ScopeParameters,
    depth: usize,
) -> ExpressionDescriptor {
    render_at(qualifier, parameters, depth + 1)
        .unwrap_or_else(|| ExpressionDescriptor::text(qualifier.text.clone()))
}

fn render_reference(
    qualifier: Option<&Expression>,
    name: &str,
    target: Option<&Symbol>,
    subject: &str,
    parameters: &ScopeParameters,
    depth: usize,
) -> ExpressionDescriptor {
    let mut result = match qualifier {
        Some(qualifier) => render_qualifier(qualifier, parameters, depth),
        None => ExpressionDescriptor::default(),
    };
    if !result.template.is_empty() {
        result.template.push('.');
    }

    let identifier = match (qualifier, target) {
        (None, Some(Symbol::Type(ty))) => ty.full_name(),
        _ => name.to_string(),
    };

    if identifier == subject {
        result.template.push_str(VARIABLE_PLACEHOLDER);
        return result;
    }

    match target {
        Some(Symbol::Local { name, ty }) | Some(Symbol::Parameter { name, ty }) => {
            let (placeholder, suggestion) = typed_placeholder(name, ty);
            result.template.push_str(&format!("${placeholder}$"));
            result.variables.insert(placeholder, suggestion);
        }
        _ => result.template.push_str(&identifier),
    }
    result
}

/// Placeholder named after the variable's type, or after the variable itself
/// when its type is not known.
fn typed_placeholder(name: &str, ty: &TypeInfo) -> (String, String) {
    match ty.as_resolved() {
        Some(ty) => (
            ty.placeholder_name(),
            format!("variableOfType(\"{}\")", ty.long_name),
        ),
        None => (name.to_string(), SUGGEST_VARIABLE_NAME.to_string()),
    }
}

fn render_this(expression: &Expression) -> ExpressionDescriptor {
    match expression.ty.as_resolved() {
        Some(ty) => {
            let placeholder = ty.placeholder_name();
            let mut result = ExpressionDescriptor::text(format!("${placeholder}$"));
            result
                .variables
                .insert(placeholder, format!("variableOfType(\"{}\")", ty.long_name));
            result
        }
        None => ExpressionDescriptor::text("this"),
    }
}

fn render_invocation(
    invoked: &Expression,
    arguments: &[Argument],
    subject: &str,
    parameters: &ScopeParameters,
    depth: usize,
) -> Option<ExpressionDescriptor> {
    let ExpressionKind::Reference {
        qualifier, name, ..
    } = &invoked.kind
    else {
        return None;
    };

    let mut result = match qualifier.as_deref() {
        Some(qualifier) => render_qualifier(qualifier, parameters, depth),
        None => ExpressionDescriptor::default(),
    };
    if !result.template.is_empty() {
        result.template.push('.');
    }
    result.template.push_str(name);
    result.template.push('(');
    render_arguments(&mut result, arguments, subject);
    result.template.push(')');
    Some(result)
}

/// Arguments bound to a formal parameter become `$param$` placeholders that
/// ask the user; unbound arguments are dropped.
fn render_arguments(result: &mut ExpressionDescriptor, arguments: &[Argument], subject: &str) {
    let mut rendered = 0;
    for argument in arguments {
        let Some(parameter) = &argument.parameter else {
            continue;
        };
        if rendered > 0 {
            result.template.push_str(", ");
        }
        rendered += 1;

        if argument.value.text == subject {
            result.template.push_str(VARIABLE_PLACEHOLDER);
            continue;
        }
        result.template.push_str(&format!("${parameter}$"));
        result.variables.insert(parameter.clone(), String::new());
    }
}

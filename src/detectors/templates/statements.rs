//! Statement template builders, one per statement kind.

use crate::detectors::scopes::Scope;
use crate::detectors::templates::{
    expression::render, replace_subject, StatementDescriptor, StatementTemplateBuilder,
    TemplateVariables, END_MARKER, SUGGEST_VARIABLE_NAME,
};
use crate::lang::common::{Expression, ExpressionKind, StatementKind, StatementRef};

/// Builders in registration order.
pub fn standard_builders() -> Vec<Box<dyn StatementTemplateBuilder>> {
    vec![
        Box::new(InvocationTemplate),
        Box::new(LocalVariableTemplate),
        Box::new(IfTemplate),
        Box::new(WhileTemplate),
        Box::new(DoWhileTemplate),
        Box::new(ForEachTemplate),
        Box::new(TryFinallyTemplate),
        Box::new(TryCatchTemplate),
        Box::new(ReturnTemplate),
        Box::new(BreakTemplate),
        Box::new(ContinueTemplate),
    ]
}

/// Render `condition`, or fall back to its text with the subject replaced.
fn condition_template(condition: &Expression, scope: &Scope) -> (String, TemplateVariables) {
    match render(condition, scope.parameters()) {
        Some(rendered) => (rendered.template, rendered.variables),
        None => (
            replace_subject(&condition.text, scope.parameters()),
            TemplateVariables::new(),
        ),
    }
}

/// `expression;` where the expression is a call.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvocationTemplate;

impl StatementTemplateBuilder for InvocationTemplate {
    fn name(&self) -> &'static str {
        "invocation"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Expression(_))
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::Expression(expression) = statement.kind() else {
            return None;
        };
        if !matches!(expression.kind, ExpressionKind::Invocation { .. }) {
            return None;
        }

        let rendered = render(expression, scope.parameters())?;
        Some(StatementDescriptor::new(
            scope,
            format!("{};", rendered.template),
            rendered.variables,
        ))
    }
}

/// Single-declarator local declaration with an initializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalVariableTemplate;

impl StatementTemplateBuilder for LocalVariableTemplate {
    fn name(&self) -> &'static str {
        "local-variable"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Declaration { .. })
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::Declaration { declarations } = statement.kind() else {
            return None;
        };
        let [declaration] = declarations.as_slice() else {
            return None;
        };
        let initializer = declaration.initializer.as_ref()?;

        let Some(rendered) = render(initializer, scope.parameters()) else {
            return Some(StatementDescriptor::new(
                scope,
                replace_subject(statement.text(), scope.parameters()),
                TemplateVariables::new(),
            ));
        };

        let type_text = if declaration.is_var {
            "var".to_string()
        } else if let Some(ty) = declaration.ty.as_resolved() {
            ty.presentable.clone()
        } else if !declaration.declared_type_text.is_empty() {
            declaration.declared_type_text.clone()
        } else {
            return None;
        };

        let mut variables = rendered.variables;
        variables.insert("name".to_string(), SUGGEST_VARIABLE_NAME.to_string());
        Some(StatementDescriptor::new(
            scope,
            format!("{type_text} $name$ = {};", rendered.template),
            variables,
        ))
    }
}

/// `if (condition) { $END$ }`
#[derive(Debug, Default, Clone, Copy)]
pub struct IfTemplate;

impl StatementTemplateBuilder for IfTemplate {
    fn name(&self) -> &'static str {
        "if"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::If { .. })
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::If { condition, .. } = statement.kind() else {
            return None;
        };
        let (condition, variables) = condition_template(condition, scope);
        Some(StatementDescriptor::new(
            scope,
            format!("if ({condition}) {{ {END_MARKER} }}"),
            variables,
        ))
    }
}

/// `while (condition) { $END$ }`
#[derive(Debug, Default, Clone, Copy)]
pub struct WhileTemplate;

impl StatementTemplateBuilder for WhileTemplate {
    fn name(&self) -> &'static str {
        "while"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::While { .. })
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::While { condition, .. } = statement.kind() else {
            return None;
        };
        let (condition, variables) = condition_template(condition, scope);
        Some(StatementDescriptor::new(
            scope,
            format!("while ({condition}) {{ {END_MARKER} }}"),
            variables,
        ))
    }
}

/// `do { $END$ } while (condition);`
#[derive(Debug, Default, Clone, Copy)]
pub struct DoWhileTemplate;

impl StatementTemplateBuilder for DoWhileTemplate {
    fn name(&self) -> &'static str {
        "do-while"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::DoWhile { .. })
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::DoWhile { condition, .. } = statement.kind() else {
            return None;
        };
        let (condition, variables) = condition_template(condition, scope);
        Some(StatementDescriptor::new(
            scope,
            format!("do {{ {END_MARKER} }} while ({condition});"),
            variables,
        ))
    }
}

/// `foreach (T $iterator$ in collection) { $END$ }`
#[derive(Debug, Default, Clone, Copy)]
pub struct ForEachTemplate;

impl StatementTemplateBuilder for ForEachTemplate {
    fn name(&self) -> &'static str {
        "foreach"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Foreach { .. })
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::Foreach {
            iterator,
            collection,
            ..
        } = statement.kind()
        else {
            return None;
        };

        let iterator_type = if iterator.is_var {
            "var".to_string()
        } else {
            iterator.ty.as_resolved()?.long_name.clone()
        };

        let (collection, mut variables) = condition_template(collection, scope);
        variables.insert("iterator".to_string(), SUGGEST_VARIABLE_NAME.to_string());
        Some(StatementDescriptor::new(
            scope,
            format!("foreach ({iterator_type} $iterator$ in {collection}) {{ {END_MARKER} }}"),
            variables,
        ))
    }
}

/// `try { $END$ } finally { }` for a try without catch clauses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TryFinallyTemplate;

impl StatementTemplateBuilder for TryFinallyTemplate {
    fn name(&self) -> &'static str {
        "try-finally"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(
            statement.kind(),
            StatementKind::Try { catches, finally_block: Some(_), .. } if catches.is_empty()
        )
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        if !self.can_handle(statement) {
            return None;
        }
        Some(StatementDescriptor::new(
            scope,
            format!("try {{ {END_MARKER} }} finally {{ }}"),
            TemplateVariables::new(),
        ))
    }
}

/// `try { $END$ } catch (T) { } ...` for a try with catches and no finally.
#[derive(Debug, Default, Clone, Copy)]
pub struct TryCatchTemplate;

impl StatementTemplateBuilder for TryCatchTemplate {
    fn name(&self) -> &'static str {
        "try-catch"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(
            statement.kind(),
            StatementKind::Try { catches, finally_block: None, .. } if !catches.is_empty()
        )
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::Try {
            catches,
            finally_block: None,
            ..
        } = statement.kind()
        else {
            return None;
        };
        if catches.is_empty() {
            return None;
        }

        let mut template = format!("try {{ {END_MARKER} }}");
        for clause in catches {
            match clause.exception_type.as_ref().and_then(|ty| ty.as_resolved()) {
                Some(ty) => template.push_str(&format!(" catch ({}) {{ }}", ty.long_name)),
                None => template.push_str(" catch { }"),
            }
        }
        Some(StatementDescriptor::new(scope, template, TemplateVariables::new()))
    }
}

/// `return;` or `return value;`
#[derive(Debug, Default, Clone, Copy)]
pub struct ReturnTemplate;

impl StatementTemplateBuilder for ReturnTemplate {
    fn name(&self) -> &'static str {
        "return"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Return { .. })
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        let StatementKind::Return { value } = statement.kind() else {
            return None;
        };
        match value {
            None => Some(StatementDescriptor::new(
                scope,
                "return;",
                TemplateVariables::new(),
            )),
            Some(value) => {
                let rendered = render(value, scope.parameters())?;
                Some(StatementDescriptor::new(
                    scope,
                    format!("return {};", rendered.template),
                    rendered.variables,
                ))
            }
        }
    }
}

/// `break;`
#[derive(Debug, Default, Clone, Copy)]
pub struct BreakTemplate;

impl StatementTemplateBuilder for BreakTemplate {
    fn name(&self) -> &'static str {
        "break"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Break)
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        self.can_handle(statement)
            .then(|| StatementDescriptor::new(scope, "break;", TemplateVariables::new()))
    }
}

/// `continue;`
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinueTemplate;

impl StatementTemplateBuilder for ContinueTemplate {
    fn name(&self) -> &'static str {
        "continue"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Continue)
    }

    fn build(&self, statement: StatementRef<'_>, scope: &Scope) -> Option<StatementDescriptor> {
        self.can_handle(statement)
            .then(|| StatementDescriptor::new(scope, "continue;", TemplateVariables::new()))
    }
}

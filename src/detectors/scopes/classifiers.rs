//! The standard scope classifiers.

use crate::detectors::scopes::{Scope, ScopeClassifier, ScopeParameters, VARIABLE_NAME};
use crate::lang::common::{
    Expression, ExpressionKind, MemberKind, MemberSymbol, StatementKind, StatementRef, Symbol,
    TypeRef,
};

/// Classifiers in registration order.
pub fn standard_classifiers() -> Vec<Box<dyn ScopeClassifier>> {
    vec![
        Box::new(InvocationClassifier),
        Box::new(LocalVariableClassifier),
        Box::new(AssignmentClassifier),
        Box::new(ForeachClassifier),
        Box::new(UsingClassifier),
        Box::new(IfNullClassifier),
        Box::new(IfMemberClassifier),
        Box::new(IfNegationClassifier),
    ]
}

fn typed_parameters(variable: Option<&str>, ty: &TypeRef) -> ScopeParameters {
    let mut parameters = ScopeParameters::new();
    if let Some(variable) = variable {
        parameters.insert(VARIABLE_NAME.to_string(), variable.to_string());
    }
    parameters.insert("VariableType".to_string(), ty.presentable.clone());
    parameters.insert("FullName".to_string(), ty.long_name.clone());
    parameters
}

fn variable_key(ty: &TypeRef) -> String {
    format!("After variable of type \"{}\"", ty.long_name)
}

/// `target = value;` where the assigned value has a known type.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssignmentClassifier;

impl ScopeClassifier for AssignmentClassifier {
    fn name(&self) -> &'static str {
        "assignment"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(
            statement.kind(),
            StatementKind::Expression(Expression {
                kind: ExpressionKind::Assignment { .. },
                ..
            })
        )
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::Expression(expression) = statement.kind() else {
            return None;
        };
        let ExpressionKind::Assignment { target, value, .. } = &expression.kind else {
            return None;
        };
        if !matches!(target.kind, ExpressionKind::Reference { .. }) {
            return None;
        }

        let value_type = value.ty.as_resolved()?;
        let ty = target.ty.as_resolved().unwrap_or(value_type);

        let mut parameters = typed_parameters(Some(&target.text), ty);
        parameters.insert("Value".to_string(), value.text.clone());

        Some(Scope::new(statement, variable_key(ty), parameters))
    }
}

/// `T name = value;` with a single declarator, a known type and an initializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalVariableClassifier;

impl ScopeClassifier for LocalVariableClassifier {
    fn name(&self) -> &'static str {
        "local-variable"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Declaration { .. })
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::Declaration { declarations } = statement.kind() else {
            return None;
        };
        let [declaration] = declarations.as_slice() else {
            return None;
        };
        let ty = declaration.ty.as_resolved()?;
        let initializer = declaration.initializer.as_ref()?;

        let mut parameters = typed_parameters(Some(&declaration.name), ty);
        parameters.insert("Value".to_string(), initializer.text.clone());

        Some(Scope::new(statement, variable_key(ty), parameters))
    }
}

/// `receiver.Method(...);` resolving to a method. Assertion and contract
/// calls are suppressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvocationClassifier;

impl InvocationClassifier {
    /// Capture the invocation parameters, including `IsAssertion`
    pub fn capture(expression: &Expression) -> Option<ScopeParameters> {
        let ExpressionKind::Invocation { invoked, .. } = &expression.kind else {
            return None;
        };
        let ExpressionKind::Reference {
            qualifier: Some(qualifier),
            target: Some(Symbol::Member(method)),
            ..
        } = &invoked.kind
        else {
            return None;
        };
        if method.kind != MemberKind::Method {
            return None;
        }

        let mut parameters = ScopeParameters::new();
        parameters.insert(VARIABLE_NAME.to_string(), qualifier.text.clone());
        parameters.insert("MethodName".to_string(), method.name.clone());
        parameters.insert(
            "QualifiedMethodName".to_string(),
            method.type_qualified_name(),
        );
        if let Some(containing) = &method.containing_type {
            parameters.insert("ContainingType".to_string(), containing.name.clone());
        }
        parameters.insert("FullName".to_string(), method.full_name());
        if method.is_assertion {
            parameters.insert("IsAssertion".to_string(), "true".to_string());
        }
        Some(parameters)
    }
}

impl ScopeClassifier for InvocationClassifier {
    fn name(&self) -> &'static str {
        "invocation"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Expression(_))
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::Expression(expression) = statement.kind() else {
            return None;
        };
        let parameters = Self::capture(expression)?;
        if parameters.get("IsAssertion").map(String::as_str) == Some("true") {
            return None;
        }

        let key = format!(
            "After call to \"{}\"",
            parameters
                .get("FullName")
                .map(String::as_str)
                .unwrap_or("(unknown method)")
        );
        Some(Scope::new(statement, key, parameters))
    }
}

/// `foreach (x in collection)` over a collection of known type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForeachClassifier;

impl ScopeClassifier for ForeachClassifier {
    fn name(&self) -> &'static str {
        "foreach"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Foreach { .. })
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::Foreach {
            iterator,
            collection,
            ..
        } = statement.kind()
        else {
            return None;
        };
        let ty = collection.ty.as_resolved()?;

        let parameters = typed_parameters(Some(&iterator.name), ty);
        let key = format!("Inside foreach loop of type \"{}\"", ty.long_name);
        Some(Scope::new(statement, key, parameters).inside_body())
    }
}

/// `using (T name = ...)` with a single resource of known type.
#[derive(Debug, Default, Clone, Copy)]
pub struct UsingClassifier;

impl ScopeClassifier for UsingClassifier {
    fn name(&self) -> &'static str {
        "using"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        matches!(statement.kind(), StatementKind::Using { .. })
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::Using { declarations, .. } = statement.kind() else {
            return None;
        };
        let [declaration] = declarations.as_slice() else {
            return None;
        };
        let ty = declaration.ty.as_resolved()?;

        let parameters = typed_parameters(Some(&declaration.name), ty);
        let key = format!("Inside using of type \"{}\"", ty.long_name);
        Some(Scope::new(statement, key, parameters).inside_body())
    }
}

fn null_comparison(condition: &Expression) -> Option<(&Expression, &str)> {
    let ExpressionKind::Binary {
        left,
        operator,
        right,
    } = &condition.kind
    else {
        return None;
    };
    if operator != "==" && operator != "!=" {
        return None;
    }

    let operand = if right.is_null_literal() {
        left.as_ref()
    } else if left.is_null_literal() {
        right.as_ref()
    } else {
        return None;
    };
    Some((operand, operator.as_str()))
}

/// `if (x == null)` / `if (x != null)` where `x` has a known type.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfNullClassifier;

impl ScopeClassifier for IfNullClassifier {
    fn name(&self) -> &'static str {
        "if-null"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        match statement.kind() {
            StatementKind::If { condition, .. } => null_comparison(condition).is_some(),
            _ => false,
        }
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::If { condition, .. } = statement.kind() else {
            return None;
        };
        let (operand, operator) = null_comparison(condition)?;
        let ty = operand.ty.as_resolved()?;

        let relation = if operator == "==" { "is" } else { "is not" };
        let parameters = typed_parameters(None, ty);
        let key = format!(
            "If expression of type \"{}\" {} null",
            ty.long_name, relation
        );
        Some(Scope::new(statement, key, parameters).inside_body())
    }
}

fn member_reference(expression: &Expression) -> Option<&MemberSymbol> {
    match &expression.kind {
        ExpressionKind::Reference {
            target: Some(Symbol::Member(member)),
            ..
        } => Some(member),
        _ => None,
    }
}

/// `if (Type.Member)`: a guard on a resolvable type member.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfMemberClassifier;

impl ScopeClassifier for IfMemberClassifier {
    fn name(&self) -> &'static str {
        "if-member"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        match statement.kind() {
            StatementKind::If { condition, .. } => member_reference(condition).is_some(),
            _ => false,
        }
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::If { condition, .. } = statement.kind() else {
            return None;
        };
        let member = member_reference(condition)?;

        let key = format!("If expression \"{}\"", member.type_qualified_name());
        Some(Scope::new(statement, key, ScopeParameters::new()).inside_body())
    }
}

/// `if (!Type.Member)`: the negated member guard.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfNegationClassifier;

impl IfNegationClassifier {
    fn negated_member(condition: &Expression) -> Option<&MemberSymbol> {
        match &condition.kind {
            ExpressionKind::Unary {
                operator,
                operand,
                postfix: false,
            } if operator == "!" => member_reference(operand),
            _ => None,
        }
    }
}

impl ScopeClassifier for IfNegationClassifier {
    fn name(&self) -> &'static str {
        "if-negation"
    }

    fn can_handle(&self, statement: StatementRef<'_>) -> bool {
        match statement.kind() {
            StatementKind::If { condition, .. } => Self::negated_member(condition).is_some(),
            _ => false,
        }
    }

    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope> {
        let StatementKind::If { condition, .. } = statement.kind() else {
            return None;
        };
        let member = Self::negated_member(condition)?;

        let key = format!("If expression \"!{}\"", member.type_qualified_name());
        Some(Scope::new(statement, key, ScopeParameters::new()).inside_body())
    }
}

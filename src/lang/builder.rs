//! Programmatic construction of source models.
//!
//! [`SourceFileBuilder`] lays a tree of [`Stmt`] values out as C#-shaped text
//! and records every statement's range, so models built by hand behave exactly
//! like parsed ones (statement text, siblings, insertion points). Expressions
//! are assembled with the helper functions below, which compute their source
//! text compositionally.

use crate::lang::common::{
    Argument, CatchClause, Expression, ExpressionKind, IteratorDeclaration, MemberSymbol,
    QualifiedName, SourceFile, StatementId, StatementKind, Symbol, TextRange, TypeInfo, TypeName,
    TypeRef, VariableDeclaration,
};

const INDENT: &str = "    ";

/// Statement tree accepted by [`SourceFileBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `expression;`
    Expression(Expression),
    /// Local declaration
    Declaration(Vec<VariableDeclaration>),
    /// `if`
    If {
        /// Condition
        condition: Expression,
        /// Then branch
        then_branch: Option<Box<Stmt>>,
        /// Else branch
        else_branch: Option<Box<Stmt>>,
    },
    /// `while`
    While {
        /// Condition
        condition: Expression,
        /// Body
        body: Option<Box<Stmt>>,
    },
    /// `do ... while`
    DoWhile {
        /// Body
        body: Box<Stmt>,
        /// Condition
        condition: Expression,
    },
    /// `foreach`
    Foreach {
        /// Iteration variable
        iterator: IteratorDeclaration,
        /// Collection
        collection: Expression,
        /// Body
        body: Option<Box<Stmt>>,
    },
    /// `using (decl) body`
    Using {
        /// Resources
        declarations: Vec<VariableDeclaration>,
        /// Body
        body: Option<Box<Stmt>>,
    },
    /// `return`
    Return(Option<Expression>),
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `;`
    Empty,
    /// `try`
    Try {
        /// Protected statements
        body: Vec<Stmt>,
        /// Catch clauses
        catches: Vec<CatchSpec>,
        /// Finally statements
        finally: Option<Vec<Stmt>>,
    },
    /// Opaque statement text
    Raw(String),
}

/// A catch clause for [`Stmt::Try`].
#[derive(Debug, Clone, PartialEq)]
pub struct CatchSpec {
    /// Caught type, `None` for a bare `catch`
    pub exception_type: Option<TypeInfo>,
    /// Type as written
    pub written: Option<String>,
    /// Exception variable
    pub variable: Option<String>,
    /// Handler statements
    pub body: Vec<Stmt>,
}

impl CatchSpec {
    /// `catch (T name) { ... }` with a resolved type
    pub fn typed(ty: TypeRef, variable: Option<&str>, body: Vec<Stmt>) -> Self {
        Self {
            written: Some(ty.presentable.clone()),
            exception_type: Some(TypeInfo::Resolved(ty)),
            variable: variable.map(str::to_string),
            body,
        }
    }

    /// `catch { ... }`
    pub fn bare(body: Vec<Stmt>) -> Self {
        Self {
            exception_type: None,
            written: None,
            variable: None,
            body,
        }
    }
}

impl Stmt {
    /// `Type name = init;` with an explicit, resolved type
    pub fn local(name: &str, ty: TypeRef, init: Expression) -> Self {
        Stmt::Declaration(vec![VariableDeclaration {
            name: name.to_string(),
            declared_type_text: ty.presentable.clone(),
            ty: TypeInfo::Resolved(ty),
            is_var: false,
            initializer: Some(init),
        }])
    }

    /// `var name = init;` taking the initializer's type
    pub fn var(name: &str, init: Expression) -> Self {
        Stmt::Declaration(vec![VariableDeclaration {
            name: name.to_string(),
            ty: init.ty.clone(),
            is_var: true,
            declared_type_text: "var".to_string(),
            initializer: Some(init),
        }])
    }

    /// `expression;`
    pub fn expr(expression: Expression) -> Self {
        Stmt::Expression(expression)
    }

    /// `if (condition) { body }`
    pub fn if_then(condition: Expression, body: Vec<Stmt>) -> Self {
        Stmt::If {
            condition,
            then_branch: Some(Box::new(Stmt::Block(body))),
            else_branch: None,
        }
    }

    /// `while (condition) { body }`
    pub fn while_loop(condition: Expression, body: Vec<Stmt>) -> Self {
        Stmt::While {
            condition,
            body: Some(Box::new(Stmt::Block(body))),
        }
    }

    /// `foreach (T name in collection) { body }`; `element` of `None` writes `var`
    pub fn foreach(
        name: &str,
        element: Option<TypeRef>,
        collection: Expression,
        body: Vec<Stmt>,
    ) -> Self {
        let iterator = match element {
            Some(ty) => IteratorDeclaration {
                name: name.to_string(),
                is_var: false,
                declared_type_text: ty.presentable.clone(),
                ty: TypeInfo::Resolved(ty),
            },
            None => IteratorDeclaration {
                name: name.to_string(),
                is_var: true,
                ty: TypeInfo::Unknown,
                declared_type_text: "var".to_string(),
            },
        };
        Stmt::Foreach {
            iterator,
            collection,
            body: Some(Box::new(Stmt::Block(body))),
        }
    }

    /// `using (var name = init) { body }`
    pub fn using_var(name: &str, init: Expression, body: Vec<Stmt>) -> Self {
        Stmt::Using {
            declarations: vec![VariableDeclaration {
                name: name.to_string(),
                ty: init.ty.clone(),
                is_var: true,
                declared_type_text: "var".to_string(),
                initializer: Some(init),
            }],
            body: Some(Box::new(Stmt::Block(body))),
        }
    }

    /// `return value;`
    pub fn ret(value: Option<Expression>) -> Self {
        Stmt::Return(value)
    }
}

/// Lays out [`Stmt`] trees into a [`SourceFile`].
#[derive(Debug, Clone)]
pub struct SourceFileBuilder {
    path: String,
    members: Vec<Vec<Stmt>>,
}

impl SourceFileBuilder {
    /// Start a file at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            members: Vec::new(),
        }
    }

    /// Append a statement to the current member body
    pub fn statement(mut self, stmt: Stmt) -> Self {
        match self.members.last_mut() {
            Some(body) => body.push(stmt),
            None => self.members.push(vec![stmt]),
        }
        self
    }

    /// Start a new member body holding `body`
    pub fn method(mut self, body: Vec<Stmt>) -> Self {
        self.members.push(body);
        self
    }

    /// Render text, assign ranges and build the arena
    pub fn finish(self) -> SourceFile {
        let mut layout = Layout {
            file: SourceFile::new(self.path, String::new()),
            out: String::new(),
        };

        let mut roots = Vec::new();
        for (index, body) in self.members.into_iter().enumerate() {
            if index > 0 {
                layout.out.push('\n');
            }
            layout.out.push_str(&format!("void Member{index}()\n"));
            roots.push(layout.emit(Stmt::Block(body), 0));
            layout.out.push('\n');
        }

        let Layout { mut file, out } = layout;
        file.set_text(out);
        for root in roots {
            file.add_root(root);
        }
        file
    }
}

struct Layout {
    file: SourceFile,
    out: String,
}

impl Layout {
    fn indent(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str(INDENT);
        }
    }

    fn push(&mut self, kind: StatementKind, start: usize) -> StatementId {
        let range = TextRange::new(start, self.out.len());
        self.file.push_statement(kind, range)
    }

    fn emit_block(&mut self, statements: Vec<Stmt>, level: usize) -> StatementId {
        let start = self.out.len();
        self.out.push_str("{\n");
        let mut ids = Vec::with_capacity(statements.len());
        for stmt in statements {
            self.indent(level + 1);
            ids.push(self.emit(stmt, level + 1));
            self.out.push('\n');
        }
        self.indent(level);
        self.out.push('}');
        self.push(StatementKind::Block { statements: ids }, start)
    }

    /// Body of a block-introducing statement; blocks stay on the same line
    fn emit_body(&mut self, body: Option<Box<Stmt>>, level: usize) -> Option<StatementId> {
        let body = body?;
        match *body {
            Stmt::Block(statements) => {
                self.out.push(' ');
                Some(self.emit_block(statements, level))
            }
            other => {
                self.out.push('\n');
                self.indent(level + 1);
                Some(self.emit(other, level + 1))
            }
        }
    }

    fn emit(&mut self, stmt: Stmt, level: usize) -> StatementId {
        let start = self.out.len();
        match stmt {
            Stmt::Block(statements) => self.emit_block(statements, level),
            Stmt::Expression(expression) => {
                self.out.push_str(&expression.text);
                self.out.push(';');
                self.push(StatementKind::Expression(expression), start)
            }
            Stmt::Declaration(declarations) => {
                self.out.push_str(&declaration_text(&declarations));
                self.out.push(';');
                self.push(StatementKind::Declaration { declarations }, start)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.out.push_str(&format!("if ({})", condition.text));
                let then_branch = self.emit_body(then_branch, level);
                let else_branch = match else_branch {
                    Some(branch) => {
                        self.out.push('\n');
                        self.indent(level);
                        self.out.push_str("else");
                        self.emit_body(Some(branch), level)
                    }
                    None => None,
                };
                self.push(
                    StatementKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    start,
                )
            }
            Stmt::While { condition, body } => {
                self.out.push_str(&format!("while ({})", condition.text));
                let body = self.emit_body(body, level);
                self.push(StatementKind::While { condition, body }, start)
            }
            Stmt::DoWhile { body, condition } => {
                self.out.push_str("do");
                let body = self.emit_body(Some(body), level);
                self.out.push_str(&format!(" while ({});", condition.text));
                self.push(StatementKind::DoWhile { body, condition }, start)
            }
            Stmt::Foreach {
                iterator,
                collection,
                body,
            } => {
                self.out.push_str(&format!(
                    "foreach ({} {} in {})",
                    iterator.declared_type_text, iterator.name, collection.text
                ));
                let body = self.emit_body(body, level);
                self.push(
                    StatementKind::Foreach {
                        iterator,
                        collection,
                        body,
                    },
                    start,
                )
            }
            Stmt::Using { declarations, body } => {
                self.out
                    .push_str(&format!("using ({})", declaration_text(&declarations)));
                let body = self.emit_body(body, level);
                self.push(
                    StatementKind::Using {
                        declarations,
                        resource: None,
                        body,
                    },
                    start,
                )
            }
            Stmt::Return(value) => {
                match &value {
                    Some(value) => self.out.push_str(&format!("return {};", value.text)),
                    None => self.out.push_str("return;"),
                }
                self.push(StatementKind::Return { value }, start)
            }
            Stmt::Break => {
                self.out.push_str("break;");
                self.push(StatementKind::Break, start)
            }
            Stmt::Continue => {
                self.out.push_str("continue;");
                self.push(StatementKind::Continue, start)
            }
            Stmt::Empty => {
                self.out.push(';');
                self.push(StatementKind::Empty, start)
            }
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                self.out.push_str("try ");
                let body = Some(self.emit_block(body, level));
                let mut clauses = Vec::with_capacity(catches.len());
                for catch in catches {
                    self.out.push_str(" catch");
                    if let Some(written) = &catch.written {
                        match &catch.variable {
                            Some(variable) => {
                                self.out.push_str(&format!(" ({written} {variable})"))
                            }
                            None => self.out.push_str(&format!(" ({written})")),
                        }
                    }
                    self.out.push(' ');
                    let handler = self.emit_block(catch.body, level);
                    clauses.push(CatchClause {
                        exception_type: catch.exception_type,
                        declared_type_text: catch.written,
                        variable: catch.variable,
                        body: Some(handler),
                    });
                }
                let finally_block = finally.map(|statements| {
                    self.out.push_str(" finally ");
                    self.emit_block(statements, level)
                });
                self.push(
                    StatementKind::Try {
                        body,
                        catches: clauses,
                        finally_block,
                    },
                    start,
                )
            }
            Stmt::Raw(text) => {
                self.out.push_str(&text);
                self.push(StatementKind::Other, start)
            }
        }
    }
}

fn declaration_text(declarations: &[VariableDeclaration]) -> String {
    let type_text = declarations
        .first()
        .map(|d| d.declared_type_text.as_str())
        .unwrap_or("var");
    let declarators = declarations
        .iter()
        .map(|d| match &d.initializer {
            Some(init) => format!("{} = {}", d.name, init.text),
            None => d.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{type_text} {declarators}")
}

/// Reference to a local variable
pub fn local(name: &str, ty: TypeInfo) -> Expression {
    Expression::new(
        name,
        ty.clone(),
        ExpressionKind::Reference {
            qualifier: None,
            name: name.to_string(),
            target: Some(Symbol::Local {
                name: name.to_string(),
                ty,
            }),
        },
    )
}

/// Reference to a method parameter
pub fn parameter(name: &str, ty: TypeInfo) -> Expression {
    Expression::new(
        name,
        ty.clone(),
        ExpressionKind::Reference {
            qualifier: None,
            name: name.to_string(),
            target: Some(Symbol::Parameter {
                name: name.to_string(),
                ty,
            }),
        },
    )
}

/// A type name used as an expression (`Console`)
pub fn type_name(name: QualifiedName) -> Expression {
    Expression::new(
        name.name.clone(),
        TypeInfo::Unknown,
        ExpressionKind::Reference {
            qualifier: None,
            name: name.name.clone(),
            target: Some(Symbol::Type(name)),
        },
    )
}

/// Member access `qualifier.name` (or a bare member name)
pub fn member(
    qualifier: Option<Expression>,
    name: &str,
    symbol: Option<MemberSymbol>,
    ty: TypeInfo,
) -> Expression {
    let text = match &qualifier {
        Some(q) => format!("{}.{}", q.text, name),
        None => name.to_string(),
    };
    Expression::new(
        text,
        ty,
        ExpressionKind::Reference {
            qualifier: qualifier.map(Box::new),
            name: name.to_string(),
            target: symbol.map(Symbol::Member),
        },
    )
}

/// Argument bound to the formal parameter `parameter`
pub fn arg(value: Expression, parameter: &str) -> Argument {
    Argument {
        value,
        parameter: Some(parameter.to_string()),
    }
}

/// Argument whose parameter could not be matched
pub fn unmatched_arg(value: Expression) -> Argument {
    Argument {
        value,
        parameter: None,
    }
}

fn argument_text(arguments: &[Argument]) -> String {
    arguments
        .iter()
        .map(|a| a.value.text.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Method call `receiver.name(args)`
pub fn call(
    receiver: Option<Expression>,
    name: &str,
    method: Option<MemberSymbol>,
    arguments: Vec<Argument>,
    ty: TypeInfo,
) -> Expression {
    let invoked = member(receiver, name, method, TypeInfo::Unknown);
    let text = format!("{}({})", invoked.text, argument_text(&arguments));
    Expression::new(
        text,
        ty,
        ExpressionKind::Invocation {
            invoked: Box::new(invoked),
            arguments,
        },
    )
}

/// `new T(args)` for a resolved type
pub fn new_object(ty: QualifiedName, arguments: Vec<Argument>) -> Expression {
    let text = format!("new {}({})", ty.name, argument_text(&arguments));
    let type_info = TypeInfo::resolved(ty.name.clone(), ty.full_name());
    Expression::new(
        text,
        type_info,
        ExpressionKind::ObjectCreation {
            type_name: Some(TypeName {
                written: ty.name.clone(),
                resolved: Some(ty),
            }),
            arguments,
        },
    )
}

/// `left op right`
pub fn binary(left: Expression, operator: &str, right: Expression, ty: TypeInfo) -> Expression {
    Expression::new(
        format!("{} {} {}", left.text, operator, right.text),
        ty,
        ExpressionKind::Binary {
            left: Box::new(left),
            operator: operator.to_string(),
            right: Box::new(right),
        },
    )
}

/// Prefix unary `op operand`
pub fn prefix(operator: &str, operand: Expression, ty: TypeInfo) -> Expression {
    Expression::new(
        format!("{}{}", operator, operand.text),
        ty,
        ExpressionKind::Unary {
            operator: operator.to_string(),
            operand: Box::new(operand),
            postfix: false,
        },
    )
}

/// `(inner)`
pub fn paren(inner: Expression) -> Expression {
    Expression::new(
        format!("({})", inner.text),
        inner.ty.clone(),
        ExpressionKind::Parenthesized(Box::new(inner)),
    )
}

/// `(T)operand`
pub fn cast(target: TypeRef, operand: Expression) -> Expression {
    Expression::new(
        format!("({}){}", target.presentable, operand.text),
        TypeInfo::Resolved(target.clone()),
        ExpressionKind::Cast {
            written_type: target.presentable.clone(),
            target_type: TypeInfo::Resolved(target),
            operand: Box::new(operand),
        },
    )
}

/// `operand as T`
pub fn as_type(operand: Expression, target: TypeRef) -> Expression {
    Expression::new(
        format!("{} as {}", operand.text, target.presentable),
        TypeInfo::Resolved(target.clone()),
        ExpressionKind::As {
            written_type: target.presentable.clone(),
            target_type: TypeInfo::Resolved(target),
            operand: Box::new(operand),
        },
    )
}

/// `operand is T`
pub fn is_type(operand: Expression, target: TypeRef) -> Expression {
    Expression::new(
        format!("{} is {}", operand.text, target.presentable),
        TypeInfo::resolved("bool", "System.Boolean"),
        ExpressionKind::Is {
            written_type: target.presentable.clone(),
            target_type: TypeInfo::Resolved(target),
            operand: Box::new(operand),
        },
    )
}

/// `this` inside `enclosing`
pub fn this(enclosing: TypeRef) -> Expression {
    Expression::new("this", TypeInfo::Resolved(enclosing), ExpressionKind::This)
}

/// `target = value`
pub fn assign(target: Expression, value: Expression) -> Expression {
    Expression::new(
        format!("{} = {}", target.text, value.text),
        target.ty.clone(),
        ExpressionKind::Assignment {
            target: Box::new(target),
            operator: "=".to_string(),
            value: Box::new(value),
        },
    )
}

/// `null`
pub fn null() -> Expression {
    Expression::new("null", TypeInfo::Unknown, ExpressionKind::Literal)
}

/// String literal
pub fn string_literal(value: &str) -> Expression {
    Expression::new(
        format!("\"{value}\""),
        TypeInfo::resolved("string", "System.String"),
        ExpressionKind::Literal,
    )
}

/// Integer literal
pub fn int_literal(value: i64) -> Expression {
    Expression::new(
        value.to_string(),
        TypeInfo::resolved("int", "System.Int32"),
        ExpressionKind::Literal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_connection() -> QualifiedName {
        QualifiedName::new("System.Data.SqlClient", "SqlConnection")
    }

    #[test]
    fn lays_out_statements_with_exact_ranges() {
        let conn_type = TypeInfo::resolved("SqlConnection", "System.Data.SqlClient.SqlConnection");
        let file = SourceFileBuilder::new("Db.cs")
            .statement(Stmt::var(
                "conn",
                new_object(sql_connection(), vec![arg(string_literal("cs"), "connectionString")]),
            ))
            .statement(Stmt::expr(call(
                Some(local("conn", conn_type)),
                "Open",
                Some(MemberSymbol::method("Open", sql_connection())),
                vec![],
                TypeInfo::Unknown,
            )))
            .finish();

        assert_eq!(
            file.text(),
            "void Member0()\n{\n    var conn = new SqlConnection(\"cs\");\n    conn.Open();\n}\n"
        );

        let statements: Vec<&str> = file.walk().iter().map(|s| s.text()).collect();
        assert_eq!(statements[1], "var conn = new SqlConnection(\"cs\");");
        assert_eq!(statements[2], "conn.Open();");

        let declaration = file.walk()[1];
        assert_eq!(declaration.next_sibling().unwrap().text(), "conn.Open();");
    }

    #[test]
    fn nested_bodies_are_parented() {
        let items = local("items", TypeInfo::resolved("List<string>", "System.Collections.Generic.List<System.String>"));
        let file = SourceFileBuilder::new("Loop.cs")
            .statement(Stmt::foreach(
                "item",
                None,
                items,
                vec![Stmt::Break, Stmt::Continue],
            ))
            .finish();

        let walk = file.walk();
        let foreach = walk[1];
        assert_eq!(foreach.kind().name(), "foreach");
        assert!(foreach.text().starts_with("foreach (var item in items) {"));
        let inner = walk[3];
        assert_eq!(inner.text(), "break;");
        assert_eq!(inner.parent().unwrap().parent().unwrap().id(), foreach.id());
    }

    #[test]
    fn try_layout_lists_catch_clauses() {
        let exception = TypeRef::new("IOException", "System.IO.IOException");
        let file = SourceFileBuilder::new("Try.cs")
            .statement(Stmt::Try {
                body: vec![Stmt::Raw("Work();".into())],
                catches: vec![CatchSpec::typed(exception, Some("ex"), vec![]), CatchSpec::bare(vec![])],
                finally: None,
            })
            .finish();

        let try_stmt = file.walk()[1];
        assert!(try_stmt.text().contains("catch (IOException ex) {"));
        assert!(try_stmt.text().contains("catch {"));
    }

    #[test]
    fn multiple_members_become_separate_roots() {
        let file = SourceFileBuilder::new("Two.cs")
            .method(vec![Stmt::Break])
            .method(vec![Stmt::Continue])
            .finish();

        assert_eq!(file.roots().count(), 2);
        assert!(file.text().contains("void Member1()"));
    }
}

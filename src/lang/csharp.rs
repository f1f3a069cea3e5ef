//! C# front end with tree-sitter integration.
//!
//! Parsing happens in two passes. [`CSharpAdapter::declarations`] collects
//! every type and member declared in a file so a solution-wide
//! [`SymbolIndex`] can be built; [`CSharpAdapter::parse_file`] then lowers
//! member bodies and top-level statements into the [`SourceFile`] statement
//! arena, binding names against that index. Constructs the model has no shape
//! for are kept as opaque statements or expressions carrying their text.

use indexmap::IndexMap;
use tree_sitter::{Node, Parser, Tree};

use crate::core::errors::{AutoTemplateError, Result};
use crate::lang::common::{
    Argument, CatchClause, Expression, ExpressionKind, IteratorDeclaration, MemberKind,
    MemberSymbol, QualifiedName, SourceFile, StatementId, StatementKind, Symbol, TextRange,
    TypeInfo, TypeName, VariableDeclaration, MAX_EXPRESSION_DEPTH,
};
use crate::lang::symbols::{
    is_assertion, split_qualified, type_ref, MemberDeclaration, ResolutionContext, SymbolIndex,
    TypeDeclaration,
};

const LANGUAGE: &str = "csharp";

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "record_declaration",
    "record_struct_declaration",
    "enum_declaration",
];

/// Statements nested deeper than this are kept opaque.
const MAX_STATEMENT_DEPTH: usize = 64;

const COMPARISON_OPERATORS: &[&str] = &["==", "!=", "<", ">", "<=", ">=", "&&", "||"];

/// C# parsing and lowering
pub struct CSharpAdapter {
    parser: Parser,
}

impl CSharpAdapter {
    /// Create a new C# adapter
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c_sharp::LANGUAGE.into())
            .map_err(|e| AutoTemplateError::parse(LANGUAGE, format!("Failed to load grammar: {e}")))?;
        Ok(Self { parser })
    }

    fn parse_tree(&mut self, source: &str) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| AutoTemplateError::parse(LANGUAGE, "Failed to parse C# source"))
    }

    /// Types and members declared in `source`
    pub fn declarations(&mut self, source: &str) -> Result<Vec<TypeDeclaration>> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        let usings = collect_usings(root, source);
        let mut declarations = Vec::new();
        collect_types(root, source, "", &usings, &mut declarations);
        Ok(declarations)
    }

    /// Lower `source` into a statement arena, resolving names against `index`
    pub fn parse_file(&mut self, path: &str, source: &str, index: &SymbolIndex) -> Result<SourceFile> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();

        let mut lowering = Lowering {
            source,
            index,
            file: SourceFile::new(path, source),
            context: ResolutionContext {
                usings: collect_usings(root, source),
                ..ResolutionContext::default()
            },
            locals: Vec::new(),
            global_scope: IndexMap::new(),
            nested_roots: Vec::new(),
            global_statements: Vec::new(),
            statement_depth: 0,
            expression_depth: 0,
        };
        lowering.visit_declarations(root, "");
        lowering.finish_global_statements();
        Ok(lowering.file)
    }
}

fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn all_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn range_of(node: Node<'_>) -> TextRange {
    TextRange::new(node.start_byte(), node.end_byte())
}

fn join_namespace(outer: &str, inner: &str) -> String {
    if outer.is_empty() {
        inner.to_string()
    } else {
        format!("{outer}.{inner}")
    }
}

fn is_statement_kind(kind: &str) -> bool {
    kind == "block" || kind.ends_with("_statement")
}

/// `using X.Y;` directives anywhere in the file, skipping aliases and
/// `using static`.
fn collect_usings(node: Node<'_>, source: &str) -> Vec<String> {
    let mut usings = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "using_directive" => {
                let modifiers = all_children(child)
                    .iter()
                    .any(|c| matches!(c.kind(), "=" | "static"));
                if modifiers {
                    continue;
                }
                if let Some(name) = named_children(child).into_iter().find(|c| {
                    matches!(c.kind(), "qualified_name" | "identifier")
                }) {
                    usings.push(node_text(name, source).to_string());
                }
            }
            "namespace_declaration" => {
                if let Some(body) = child.child_by_field_name("body") {
                    usings.extend(collect_usings(body, source));
                }
            }
            "file_scoped_namespace_declaration" | "declaration_list" => {
                usings.extend(collect_usings(child, source));
            }
            _ => {}
        }
    }
    usings
}

fn parameter_names(node: Node<'_>, source: &str) -> Vec<String> {
    let Some(list) = node
        .child_by_field_name("parameters")
        .or_else(|| named_children(node).into_iter().find(|c| c.kind() == "parameter_list"))
    else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter(|p| p.kind() == "parameter")
        .filter_map(|p| p.child_by_field_name("name"))
        .map(|name| node_text(name, source).to_string())
        .collect()
}

fn collect_types(
    node: Node<'_>,
    source: &str,
    namespace: &str,
    usings: &[String],
    out: &mut Vec<TypeDeclaration>,
) {
    for child in named_children(node) {
        match child.kind() {
            "namespace_declaration" => {
                let Some(name) = child.child_by_field_name("name") else {
                    continue;
                };
                let namespace = join_namespace(namespace, node_text(name, source));
                if let Some(body) = child.child_by_field_name("body") {
                    collect_types(body, source, &namespace, usings, out);
                }
            }
            "file_scoped_namespace_declaration" => {
                let Some(name) = child.child_by_field_name("name") else {
                    continue;
                };
                let namespace = join_namespace(namespace, node_text(name, source));
                collect_types(child, source, &namespace, usings, out);
            }
            kind if TYPE_DECLARATIONS.contains(&kind) => {
                collect_type(child, source, namespace, usings, out);
            }
            _ => {}
        }
    }
}

fn collect_type(
    node: Node<'_>,
    source: &str,
    namespace: &str,
    usings: &[String],
    out: &mut Vec<TypeDeclaration>,
) {
    let Some(name) = node.child_by_field_name("name") else {
        return;
    };
    let mut declaration =
        TypeDeclaration::new(QualifiedName::new(namespace, node_text(name, source)));
    declaration.usings = usings.to_vec();

    // Primary constructor of a record or class
    if named_children(node).iter().any(|c| c.kind() == "parameter_list") {
        declaration.constructors.push(parameter_names(node, source));
    }

    let body = node
        .child_by_field_name("body")
        .or_else(|| named_children(node).into_iter().find(|c| c.kind() == "declaration_list"));
    let mut nested = Vec::new();
    if let Some(body) = body {
        for member in named_children(body) {
            match member.kind() {
                "method_declaration" => {
                    let Some(name) = member.child_by_field_name("name") else {
                        continue;
                    };
                    let returns = member
                        .child_by_field_name("returns")
                        .or_else(|| member.child_by_field_name("type"));
                    declaration.members.push(MemberDeclaration {
                        name: node_text(name, source).to_string(),
                        kind: MemberKind::Method,
                        type_text: returns.map(|r| node_text(r, source).to_string()),
                        parameters: parameter_names(member, source),
                    });
                }
                "constructor_declaration" => {
                    declaration.constructors.push(parameter_names(member, source));
                }
                "property_declaration" => {
                    let Some(name) = member.child_by_field_name("name") else {
                        continue;
                    };
                    declaration.members.push(MemberDeclaration {
                        name: node_text(name, source).to_string(),
                        kind: MemberKind::Property,
                        type_text: member
                            .child_by_field_name("type")
                            .map(|t| node_text(t, source).to_string()),
                        parameters: Vec::new(),
                    });
                }
                "field_declaration" | "event_field_declaration" => {
                    let kind = if member.kind() == "field_declaration" {
                        MemberKind::Field
                    } else {
                        MemberKind::Event
                    };
                    for variables in named_children(member)
                        .into_iter()
                        .filter(|c| c.kind() == "variable_declaration")
                    {
                        let type_text = variables
                            .child_by_field_name("type")
                            .map(|t| node_text(t, source).to_string());
                        for declarator in named_children(variables)
                            .into_iter()
                            .filter(|c| c.kind() == "variable_declarator")
                        {
                            let Some(name) = declarator_name(declarator) else {
                                continue;
                            };
                            declaration.members.push(MemberDeclaration {
                                name: node_text(name, source).to_string(),
                                kind,
                                type_text: type_text.clone(),
                                parameters: Vec::new(),
                            });
                        }
                    }
                }
                kind if TYPE_DECLARATIONS.contains(&kind) => nested.push(member),
                _ => {}
            }
        }
    }

    out.push(declaration);
    for member in nested {
        collect_type(member, source, namespace, usings, out);
    }
}

fn declarator_name(declarator: Node<'_>) -> Option<Node<'_>> {
    declarator.child_by_field_name("name").or_else(|| {
        named_children(declarator)
            .into_iter()
            .find(|c| c.kind() == "identifier")
    })
}

fn declarator_initializer(declarator: Node<'_>) -> Option<Node<'_>> {
    if let Some(initializer) = declarator.child_by_field_name("initializer") {
        return Some(unwrap_equals_clause(initializer));
    }
    let mut after_equals = false;
    for child in all_children(declarator) {
        if child.kind() == "equals_value_clause" {
            return Some(unwrap_equals_clause(child));
        }
        if after_equals && child.is_named() {
            return Some(child);
        }
        if child.kind() == "=" {
            after_equals = true;
        }
    }
    None
}

fn unwrap_equals_clause(node: Node<'_>) -> Node<'_> {
    if node.kind() == "equals_value_clause" {
        if let Some(value) = named_children(node).into_iter().next() {
            return value;
        }
    }
    node
}

fn literal_type(kind: &str) -> Option<TypeInfo> {
    let (presentable, long) = match kind {
        "string_literal"
        | "verbatim_string_literal"
        | "raw_string_literal"
        | "interpolated_string_expression" => ("string", "System.String"),
        "integer_literal" => ("int", "System.Int32"),
        "real_literal" => ("double", "System.Double"),
        "boolean_literal" => ("bool", "System.Boolean"),
        "character_literal" => ("char", "System.Char"),
        "null_literal" => return Some(TypeInfo::Unknown),
        _ => return None,
    };
    Some(TypeInfo::resolved(presentable, long))
}

struct Lowering<'a> {
    source: &'a str,
    index: &'a SymbolIndex,
    file: SourceFile,
    context: ResolutionContext,
    locals: Vec<IndexMap<String, Symbol>>,
    global_scope: IndexMap<String, Symbol>,
    nested_roots: Vec<StatementId>,
    global_statements: Vec<StatementId>,
    statement_depth: usize,
    expression_depth: usize,
}

impl<'a> Lowering<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.source)
    }

    // Declarations

    fn visit_declarations(&mut self, node: Node<'_>, namespace: &str) {
        for child in named_children(node) {
            match child.kind() {
                "namespace_declaration" => {
                    let Some(name) = child.child_by_field_name("name") else {
                        continue;
                    };
                    let namespace = join_namespace(namespace, self.text(name));
                    if let Some(body) = child.child_by_field_name("body") {
                        self.visit_declarations(body, &namespace);
                    }
                }
                "file_scoped_namespace_declaration" => {
                    let Some(name) = child.child_by_field_name("name") else {
                        continue;
                    };
                    let namespace = join_namespace(namespace, self.text(name));
                    self.visit_declarations(child, &namespace);
                }
                "global_statement" => {
                    if let Some(statement) = named_children(child).into_iter().next() {
                        self.context.namespace = namespace.to_string();
                        self.context.enclosing_type = None;
                        self.locals.push(std::mem::take(&mut self.global_scope));
                        let id = self.lower_statement(statement);
                        self.global_scope = self.locals.pop().unwrap_or_default();
                        self.global_statements.push(id);
                    }
                }
                kind if TYPE_DECLARATIONS.contains(&kind) => {
                    self.visit_type(child, namespace);
                }
                _ => {}
            }
        }
    }

    fn visit_type(&mut self, node: Node<'_>, namespace: &str) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let type_name = QualifiedName::new(namespace, self.text(name));
        let body = node
            .child_by_field_name("body")
            .or_else(|| named_children(node).into_iter().find(|c| c.kind() == "declaration_list"));
        let Some(body) = body else {
            return;
        };

        for member in named_children(body) {
            self.context.namespace = namespace.to_string();
            self.context.enclosing_type = Some(type_name.clone());
            match member.kind() {
                "method_declaration"
                | "constructor_declaration"
                | "destructor_declaration"
                | "operator_declaration"
                | "conversion_operator_declaration" => {
                    self.lower_member_body(member, member.child_by_field_name("body"));
                }
                "property_declaration" | "indexer_declaration" | "event_declaration" => {
                    let accessors = member.child_by_field_name("accessors").or_else(|| {
                        named_children(member)
                            .into_iter()
                            .find(|c| c.kind() == "accessor_list")
                    });
                    if let Some(accessors) = accessors {
                        for accessor in named_children(accessors) {
                            let body = accessor.child_by_field_name("body").or_else(|| {
                                named_children(accessor)
                                    .into_iter()
                                    .find(|c| c.kind() == "block")
                            });
                            self.lower_member_body(member, body);
                        }
                    }
                }
                kind if TYPE_DECLARATIONS.contains(&kind) => {
                    self.visit_type(member, namespace);
                }
                _ => {}
            }
        }
    }

    /// Lower a member body with the member's parameters in scope
    fn lower_member_body(&mut self, member: Node<'_>, body: Option<Node<'_>>) {
        let Some(body) = body.filter(|b| b.kind() == "block") else {
            return;
        };
        self.locals.push(self.parameters_of(member));
        let root = self.lower_block(body);
        self.locals.pop();

        self.file.add_root(root);
        for nested in std::mem::take(&mut self.nested_roots) {
            self.file.add_root(nested);
        }
    }

    fn parameters_of(&self, member: Node<'_>) -> IndexMap<String, Symbol> {
        let mut scope = IndexMap::new();
        let list = member.child_by_field_name("parameters").or_else(|| {
            named_children(member)
                .into_iter()
                .find(|c| matches!(c.kind(), "parameter_list" | "bracketed_parameter_list"))
        });
        let Some(list) = list else {
            return scope;
        };
        for parameter in named_children(list)
            .into_iter()
            .filter(|p| p.kind() == "parameter")
        {
            let Some(name) = parameter.child_by_field_name("name") else {
                continue;
            };
            let ty = parameter
                .child_by_field_name("type")
                .map(|t| self.index.resolve_type(self.text(t), &self.context))
                .unwrap_or_default();
            let name = self.text(name).to_string();
            scope.insert(name.clone(), Symbol::Parameter { name, ty });
        }
        scope
    }

    fn finish_global_statements(&mut self) {
        let (Some(&first), Some(&last)) =
            (self.global_statements.first(), self.global_statements.last())
        else {
            return;
        };
        let start = self
            .file
            .statement(first)
            .map(|s| s.range().start)
            .unwrap_or(0);
        let end = self
            .file
            .statement(last)
            .map(|s| s.range().end)
            .unwrap_or(start);
        let statements = std::mem::take(&mut self.global_statements);
        let block = self
            .file
            .push_statement(StatementKind::Block { statements }, TextRange::new(start, end));
        self.file.add_root(block);
        for nested in std::mem::take(&mut self.nested_roots) {
            self.file.add_root(nested);
        }
    }

    // Statements

    fn lower_block(&mut self, node: Node<'_>) -> StatementId {
        self.locals.push(IndexMap::new());
        let statements: Vec<StatementId> = named_children(node)
            .into_iter()
            .filter(|c| is_statement_kind(c.kind()))
            .map(|c| self.lower_statement(c))
            .collect();
        self.locals.pop();
        self.file
            .push_statement(StatementKind::Block { statements }, range_of(node))
    }

    fn lower_optional(&mut self, node: Option<Node<'_>>) -> Option<StatementId> {
        node.map(|n| self.lower_statement(n))
    }

    fn lower_statement(&mut self, node: Node<'_>) -> StatementId {
        if self.statement_depth >= MAX_STATEMENT_DEPTH {
            return self.file.push_statement(StatementKind::Other, range_of(node));
        }
        self.statement_depth += 1;
        let id = self.lower_statement_node(node);
        self.statement_depth -= 1;
        id
    }

    fn lower_statement_node(&mut self, node: Node<'_>) -> StatementId {
        let range = range_of(node);
        let kind = match node.kind() {
            "block" => return self.lower_block(node),
            "expression_statement" => match named_children(node).into_iter().next() {
                Some(expression) => StatementKind::Expression(self.lower_expression(expression)),
                None => StatementKind::Other,
            },
            "local_declaration_statement" => {
                let declarations = named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "variable_declaration")
                    .map(|d| self.lower_variable_declaration(d))
                    .unwrap_or_default();
                StatementKind::Declaration { declarations }
            }
            "if_statement" => {
                let condition = self.lower_field_expression(node, "condition");
                let then_branch = self.lower_optional(node.child_by_field_name("consequence"));
                let else_branch = self.lower_optional(node.child_by_field_name("alternative"));
                StatementKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            "while_statement" => {
                let condition = self.lower_field_expression(node, "condition");
                let body = self.lower_optional(node.child_by_field_name("body"));
                StatementKind::While { condition, body }
            }
            "do_statement" => {
                let body = self.lower_optional(node.child_by_field_name("body"));
                let condition = self.lower_field_expression(node, "condition");
                StatementKind::DoWhile { body, condition }
            }
            "foreach_statement" => self.lower_foreach(node),
            "using_statement" => self.lower_using(node),
            "return_statement" => StatementKind::Return {
                value: named_children(node)
                    .into_iter()
                    .next()
                    .map(|value| self.lower_expression(value)),
            },
            "break_statement" => StatementKind::Break,
            "continue_statement" => StatementKind::Continue,
            "empty_statement" => StatementKind::Empty,
            "try_statement" => self.lower_try(node),
            "local_function_statement" => {
                self.locals.push(self.parameters_of(node));
                self.lower_nested_roots(node);
                self.locals.pop();
                StatementKind::Other
            }
            _ => {
                self.lower_nested_roots(node);
                StatementKind::Other
            }
        };
        self.file.push_statement(kind, range)
    }

    fn lower_field_expression(&mut self, node: Node<'_>, field: &str) -> Expression {
        match node.child_by_field_name(field) {
            Some(expression) => self.lower_expression(expression),
            None => Expression::raw(""),
        }
    }

    fn lower_variable_declaration(&mut self, node: Node<'_>) -> Vec<VariableDeclaration> {
        let type_text = node
            .child_by_field_name("type")
            .map(|t| self.text(t))
            .unwrap_or("var");
        let is_var = type_text == "var";
        let declared = if is_var {
            TypeInfo::Unknown
        } else {
            self.index.resolve_type(type_text, &self.context)
        };

        let mut declarations = Vec::new();
        for declarator in named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
        {
            let Some(name) = declarator_name(declarator) else {
                continue;
            };
            let initializer = declarator_initializer(declarator).map(|i| self.lower_expression(i));
            let ty = if is_var {
                initializer
                    .as_ref()
                    .map(|init| init.ty.clone())
                    .filter(TypeInfo::is_resolved)
                    .unwrap_or_default()
            } else {
                declared.clone()
            };
            let name = self.text(name).to_string();
            self.declare_local(&name, ty.clone());
            declarations.push(VariableDeclaration {
                name,
                ty,
                is_var,
                declared_type_text: type_text.to_string(),
                initializer,
            });
        }
        declarations
    }

    fn lower_foreach(&mut self, node: Node<'_>) -> StatementKind {
        let collection = self.lower_field_expression(node, "right");
        let declared_type_text = node
            .child_by_field_name("type")
            .map(|t| self.text(t))
            .unwrap_or("var")
            .to_string();
        let is_var = declared_type_text == "var";
        let ty = if is_var {
            TypeInfo::Unknown
        } else {
            self.index.resolve_type(&declared_type_text, &self.context)
        };
        let name = node
            .child_by_field_name("left")
            .map(|n| self.text(n))
            .unwrap_or_default()
            .to_string();

        self.locals.push(IndexMap::new());
        self.declare_local(&name, ty.clone());
        let body = self.lower_optional(node.child_by_field_name("body"));
        self.locals.pop();

        StatementKind::Foreach {
            iterator: IteratorDeclaration {
                name,
                is_var,
                ty,
                declared_type_text,
            },
            collection,
            body,
        }
    }

    fn lower_using(&mut self, node: Node<'_>) -> StatementKind {
        let body_node = node.child_by_field_name("body");
        self.locals.push(IndexMap::new());

        let mut declarations = Vec::new();
        let mut resource = None;
        for child in named_children(node) {
            if Some(child) == body_node {
                continue;
            }
            if child.kind() == "variable_declaration" {
                declarations = self.lower_variable_declaration(child);
            } else if resource.is_none() && declarations.is_empty() {
                resource = Some(self.lower_expression(child));
            }
        }
        let body = self.lower_optional(body_node);
        self.locals.pop();

        StatementKind::Using {
            declarations,
            resource,
            body,
        }
    }

    fn lower_try(&mut self, node: Node<'_>) -> StatementKind {
        let body = node
            .child_by_field_name("body")
            .map(|b| self.lower_block(b));
        let mut catches = Vec::new();
        let mut finally_block = None;

        for child in named_children(node) {
            match child.kind() {
                "catch_clause" => catches.push(self.lower_catch(child)),
                "finally_clause" => {
                    finally_block = named_children(child)
                        .into_iter()
                        .find(|c| c.kind() == "block")
                        .map(|b| self.lower_block(b));
                }
                _ => {}
            }
        }

        StatementKind::Try {
            body,
            catches,
            finally_block,
        }
    }

    fn lower_catch(&mut self, node: Node<'_>) -> CatchClause {
        let declaration = named_children(node)
            .into_iter()
            .find(|c| c.kind() == "catch_declaration");
        let declared_type_text = declaration
            .and_then(|d| d.child_by_field_name("type"))
            .map(|t| self.text(t).to_string());
        let variable = declaration
            .and_then(|d| d.child_by_field_name("name"))
            .map(|n| self.text(n).to_string());
        let exception_type = declared_type_text
            .as_deref()
            .map(|written| self.index.resolve_type(written, &self.context));

        self.locals.push(IndexMap::new());
        if let (Some(variable), Some(ty)) = (&variable, &exception_type) {
            self.declare_local(variable, ty.clone());
        }
        let body = node
            .child_by_field_name("body")
            .or_else(|| named_children(node).into_iter().find(|c| c.kind() == "block"))
            .map(|b| self.lower_block(b));
        self.locals.pop();

        CatchClause {
            exception_type,
            declared_type_text,
            variable,
            body,
        }
    }

    /// Statements the model has no shape for still have their blocks mined,
    /// as separate roots.
    fn lower_nested_roots(&mut self, node: Node<'_>) {
        self.locals.push(IndexMap::new());
        for child in named_children(node) {
            match child.kind() {
                "variable_declaration" => {
                    self.lower_variable_declaration(child);
                }
                "switch_body" => {
                    for section in named_children(child)
                        .into_iter()
                        .filter(|s| s.kind() == "switch_section")
                    {
                        let statements: Vec<StatementId> = named_children(section)
                            .into_iter()
                            .filter(|c| is_statement_kind(c.kind()))
                            .map(|c| self.lower_statement(c))
                            .collect();
                        if statements.is_empty() {
                            continue;
                        }
                        let block = self.file.push_statement(
                            StatementKind::Block { statements },
                            range_of(section),
                        );
                        self.nested_roots.push(block);
                    }
                }
                kind if is_statement_kind(kind) => {
                    let id = self.lower_statement(child);
                    self.nested_roots.push(id);
                }
                _ => {}
            }
        }
        self.locals.pop();
    }

    // Expressions

    fn declare_local(&mut self, name: &str, ty: TypeInfo) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(
                name.to_string(),
                Symbol::Local {
                    name: name.to_string(),
                    ty,
                },
            );
        }
    }

    fn lookup_local(&self, name: &str) -> Option<Symbol> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }

    /// Lower an expression; subtrees past [`MAX_EXPRESSION_DEPTH`] stay raw
    /// so long operator chains cannot exhaust the stack.
    fn lower_expression(&mut self, node: Node<'_>) -> Expression {
        if self.expression_depth >= MAX_EXPRESSION_DEPTH {
            return Expression::raw(self.text(node));
        }
        self.expression_depth += 1;
        let expression = self.lower_expression_node(node);
        self.expression_depth -= 1;
        expression
    }

    fn lower_expression_node(&mut self, node: Node<'_>) -> Expression {
        let text = self.text(node).to_string();
        if let Some(ty) = literal_type(node.kind()) {
            return Expression::new(text, ty, ExpressionKind::Literal);
        }

        match node.kind() {
            "identifier" => self.lower_identifier(node, None),
            "member_access_expression" => self.lower_member_access(node, None),
            "invocation_expression" => self.lower_invocation(node),
            "binary_expression" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return Expression::raw(text);
                };
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| self.text(op).to_string())
                    .unwrap_or_else(|| {
                        self.source
                            .get(left.end_byte()..right.start_byte())
                            .unwrap_or("")
                            .trim()
                            .to_string()
                    });
                let left = self.lower_expression(left);
                let right = self.lower_expression(right);
                let ty = binary_type(&operator, &left, &right);
                Expression::new(
                    text,
                    ty,
                    ExpressionKind::Binary {
                        left: Box::new(left),
                        operator,
                        right: Box::new(right),
                    },
                )
            }
            "prefix_unary_expression" | "postfix_unary_expression" => {
                let children = all_children(node);
                let Some(operand) = children.iter().find(|c| c.is_named()).copied() else {
                    return Expression::raw(text);
                };
                let postfix = node.kind() == "postfix_unary_expression";
                let operator = children
                    .iter()
                    .find(|c| !c.is_named())
                    .map(|op| self.text(*op).to_string())
                    .unwrap_or_default();
                let operand = self.lower_expression(operand);
                let ty = if operator == "!" {
                    TypeInfo::resolved("bool", "System.Boolean")
                } else {
                    operand.ty.clone()
                };
                Expression::new(
                    text,
                    ty,
                    ExpressionKind::Unary {
                        operator,
                        operand: Box::new(operand),
                        postfix,
                    },
                )
            }
            "cast_expression" => {
                let (Some(target), Some(value)) = (
                    node.child_by_field_name("type"),
                    node.child_by_field_name("value"),
                ) else {
                    return Expression::raw(text);
                };
                let written_type = self.text(target).to_string();
                let target_type = self.index.resolve_type(&written_type, &self.context);
                let operand = self.lower_expression(value);
                Expression::new(
                    text,
                    target_type.clone(),
                    ExpressionKind::Cast {
                        target_type,
                        written_type,
                        operand: Box::new(operand),
                    },
                )
            }
            "as_expression" | "is_expression" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return Expression::raw(text);
                };
                let written_type = self.text(right).to_string();
                let target_type = self.index.resolve_type(&written_type, &self.context);
                let operand = Box::new(self.lower_expression(left));
                if node.kind() == "as_expression" {
                    Expression::new(
                        text,
                        target_type.clone(),
                        ExpressionKind::As {
                            operand,
                            target_type,
                            written_type,
                        },
                    )
                } else {
                    Expression::new(
                        text,
                        TypeInfo::resolved("bool", "System.Boolean"),
                        ExpressionKind::Is {
                            operand,
                            target_type,
                            written_type,
                        },
                    )
                }
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => {
                    let inner = self.lower_expression(inner);
                    Expression::new(text, inner.ty.clone(), ExpressionKind::Parenthesized(Box::new(inner)))
                }
                None => Expression::raw(text),
            },
            "this_expression" | "this" => {
                let ty = self
                    .context
                    .enclosing_type
                    .as_ref()
                    .map(|t| TypeInfo::Resolved(type_ref(t)))
                    .unwrap_or_default();
                Expression::new(text, ty, ExpressionKind::This)
            }
            "object_creation_expression" | "implicit_object_creation_expression" => {
                self.lower_object_creation(node)
            }
            "assignment_expression" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return Expression::raw(text);
                };
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| self.text(op).to_string())
                    .unwrap_or_else(|| {
                        self.source
                            .get(left.end_byte()..right.start_byte())
                            .unwrap_or("=")
                            .trim()
                            .to_string()
                    });
                let target = self.lower_expression(left);
                let value = self.lower_expression(right);
                Expression::new(
                    text,
                    target.ty.clone(),
                    ExpressionKind::Assignment {
                        target: Box::new(target),
                        operator,
                        value: Box::new(value),
                    },
                )
            }
            _ => Expression::raw(text),
        }
    }

    /// Bare identifier. `call_arity` is set when the identifier is invoked.
    fn lower_identifier(&mut self, node: Node<'_>, call_arity: Option<usize>) -> Expression {
        let name = self.text(node).to_string();
        let (target, ty) = self.resolve_name(&name, call_arity);
        Expression::new(
            name.clone(),
            ty,
            ExpressionKind::Reference {
                qualifier: None,
                name,
                target,
            },
        )
    }

    fn resolve_name(&self, name: &str, call_arity: Option<usize>) -> (Option<Symbol>, TypeInfo) {
        if let Some(symbol) = self.lookup_local(name) {
            let ty = match &symbol {
                Symbol::Local { ty, .. } | Symbol::Parameter { ty, .. } => ty.clone(),
                _ => TypeInfo::Unknown,
            };
            return (Some(symbol), ty);
        }

        if let Some(owner) = &self.context.enclosing_type {
            if let Some(declared) = self.index.declared_member(owner, name) {
                let mut symbol = member_symbol(owner, name, declared.kind);
                if call_arity.is_some() {
                    symbol.kind = MemberKind::Method;
                }
                let ty = if call_arity.is_some() {
                    TypeInfo::Unknown
                } else {
                    self.index.member_type(owner, name)
                };
                return (Some(Symbol::Member(symbol)), ty);
            }
        }

        if call_arity.is_none() {
            if let Some(type_name) = self.index.resolve_type_name(name, &self.context) {
                return (Some(Symbol::Type(type_name)), TypeInfo::Unknown);
            }
        }
        (None, TypeInfo::Unknown)
    }

    /// `qualifier.Name`. Members of resolved receivers become methods when
    /// invoked and properties otherwise, unless the solution declares them.
    fn lower_member_access(&mut self, node: Node<'_>, call_arity: Option<usize>) -> Expression {
        let text = self.text(node).to_string();
        let (Some(receiver), Some(name_node)) = (
            node.child_by_field_name("expression"),
            node.child_by_field_name("name"),
        ) else {
            return Expression::raw(text);
        };
        let qualifier = self.lower_expression(receiver);
        let name = self
            .text(name_node)
            .split('<')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let owner = match &qualifier.kind {
            ExpressionKind::Reference {
                target: Some(Symbol::Type(type_name)),
                ..
            } => Some(type_name.clone()),
            _ => qualifier.ty.as_resolved().map(|ty| split_qualified(&ty.long_name)),
        };

        let (target, ty) = match owner {
            Some(owner) => {
                let declared_kind = self.index.declared_member(&owner, &name).map(|m| m.kind);
                let kind = match (call_arity, declared_kind) {
                    (Some(_), _) => MemberKind::Method,
                    (None, Some(kind)) => kind,
                    (None, None) => MemberKind::Property,
                };
                let mut symbol = member_symbol(&owner, &name, kind);
                symbol.is_assertion = call_arity.is_some() && is_assertion(&owner, &name);
                let ty = if call_arity.is_some() {
                    TypeInfo::Unknown
                } else {
                    self.index.member_type(&owner, &name)
                };
                (Some(Symbol::Member(symbol)), ty)
            }
            None => (None, TypeInfo::Unknown),
        };

        Expression::new(
            text,
            ty,
            ExpressionKind::Reference {
                qualifier: Some(Box::new(qualifier)),
                name,
                target,
            },
        )
    }

    fn argument_nodes<'t>(&self, list: Option<Node<'t>>) -> Vec<(Option<String>, Node<'t>)> {
        let Some(list) = list else {
            return Vec::new();
        };
        named_children(list)
            .into_iter()
            .filter(|a| a.kind() == "argument")
            .filter_map(|argument| {
                let named = argument
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string());
                let value = named_children(argument).into_iter().last()?;
                Some((named, value))
            })
            .collect()
    }

    fn lower_arguments(
        &mut self,
        nodes: Vec<(Option<String>, Node<'_>)>,
        declared: Option<Vec<String>>,
    ) -> Vec<Argument> {
        nodes
            .into_iter()
            .enumerate()
            .map(|(position, (named, value))| {
                let parameter = named.or_else(|| match &declared {
                    Some(names) => names.get(position).cloned(),
                    None => Some(format!("arg{position}")),
                });
                Argument {
                    value: self.lower_expression(value),
                    parameter,
                }
            })
            .collect()
    }

    fn lower_invocation(&mut self, node: Node<'_>) -> Expression {
        let text = self.text(node).to_string();
        let Some(function) = node.child_by_field_name("function") else {
            return Expression::raw(text);
        };
        let argument_nodes = self.argument_nodes(node.child_by_field_name("arguments"));
        let arity = argument_nodes.len();

        let invoked = match function.kind() {
            "member_access_expression" => self.lower_member_access(function, Some(arity)),
            "identifier" => self.lower_identifier(function, Some(arity)),
            _ => self.lower_expression(function),
        };

        let method = match &invoked.kind {
            ExpressionKind::Reference {
                target: Some(Symbol::Member(member)),
                ..
            } => member.containing_type.clone().map(|owner| (owner, member.name.clone())),
            _ => None,
        };

        let (declared_parameters, ty) = match &method {
            Some((owner, name)) => match self.index.get(&owner.full_name()) {
                Some(declaration) => {
                    let overload = declaration.method(name, arity);
                    let ty = overload
                        .and_then(|m| m.type_text.as_deref())
                        .map(|t| self.index.resolve_type(t, &declaration.context()))
                        .unwrap_or_default();
                    (Some(overload.map(|m| m.parameters.clone()).unwrap_or_default()), ty)
                }
                None => (None, self.index.member_type(owner, name)),
            },
            None => (Some(Vec::new()), TypeInfo::Unknown),
        };
        let arguments = self.lower_arguments(argument_nodes, declared_parameters);

        Expression::new(
            text,
            ty,
            ExpressionKind::Invocation {
                invoked: Box::new(invoked),
                arguments,
            },
        )
    }

    fn lower_object_creation(&mut self, node: Node<'_>) -> Expression {
        let text = self.text(node).to_string();
        let argument_nodes = self.argument_nodes(node.child_by_field_name("arguments"));

        let (type_name, ty, declared) = match node.child_by_field_name("type") {
            Some(written) => {
                let written = self.text(written).to_string();
                let ty = self.index.resolve_type(&written, &self.context);
                let resolved = ty.as_resolved().map(|t| split_qualified(&t.long_name));
                let declared = resolved.as_ref().and_then(|name| {
                    self.index
                        .get(&name.full_name())
                        .map(|d| d.constructor(argument_nodes.len()).map(<[String]>::to_vec).unwrap_or_default())
                });
                (Some(TypeName { written, resolved }), ty, declared)
            }
            None => (None, TypeInfo::Unknown, Some(Vec::new())),
        };
        let arguments = self.lower_arguments(argument_nodes, declared);

        Expression::new(
            text,
            ty,
            ExpressionKind::ObjectCreation {
                type_name,
                arguments,
            },
        )
    }
}

fn member_symbol(owner: &QualifiedName, name: &str, kind: MemberKind) -> MemberSymbol {
    MemberSymbol {
        name: name.to_string(),
        kind,
        containing_type: Some(owner.clone()),
        is_assertion: false,
    }
}

fn binary_type(operator: &str, left: &Expression, right: &Expression) -> TypeInfo {
    if COMPARISON_OPERATORS.contains(&operator) {
        return TypeInfo::resolved("bool", "System.Boolean");
    }
    let is_string = |e: &Expression| {
        e.ty.as_resolved()
            .map(|t| t.long_name == "System.String")
            .unwrap_or(false)
    };
    if operator == "+" && (is_string(left) || is_string(right)) {
        return TypeInfo::resolved("string", "System.String");
    }
    if operator == "??" || left.ty == right.ty {
        return left.ty.clone();
    }
    TypeInfo::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::TemplatePipeline;
    use crate::lang::common::StatementRef;

    const REPOSITORY: &str = r#"using System;
using System.Data.SqlClient;

namespace Shop.Data
{
    public class Repository
    {
        private SqlConnection connection;

        public bool Enabled { get; set; }

        public Repository(string connectionString)
        {
            var conn = new SqlConnection(connectionString);
            conn.Open();
            if (conn == null)
            {
                return;
            }
            foreach (var row in Load(conn))
            {
                Console.WriteLine(row);
            }
        }

        public string[] Load(SqlConnection source) { return null; }
    }
}
"#;

    fn parse(source: &str) -> SourceFile {
        let mut adapter = CSharpAdapter::new().unwrap();
        let mut index = SymbolIndex::new();
        index.extend(adapter.declarations(source).unwrap());
        adapter.parse_file("Repository.cs", source, &index).unwrap()
    }

    fn find<'a>(file: &'a SourceFile, kind: &str) -> StatementRef<'a> {
        file.walk()
            .into_iter()
            .find(|s| s.kind().name() == kind)
            .unwrap()
    }

    #[test]
    fn collects_declarations_with_namespace() {
        let mut adapter = CSharpAdapter::new().unwrap();
        let declarations = adapter.declarations(REPOSITORY).unwrap();
        assert_eq!(declarations.len(), 1);

        let repository = &declarations[0];
        assert_eq!(repository.name, QualifiedName::new("Shop.Data", "Repository"));
        assert_eq!(repository.usings, vec!["System", "System.Data.SqlClient"]);
        assert_eq!(repository.constructors, vec![vec!["connectionString".to_string()]]);
        assert_eq!(repository.member("Enabled").unwrap().kind, MemberKind::Property);
        assert_eq!(repository.member("connection").unwrap().kind, MemberKind::Field);
        assert_eq!(
            repository.method("Load", 1).unwrap().parameters,
            vec!["source".to_string()]
        );
    }

    #[test]
    fn var_declaration_takes_created_type() {
        let file = parse(REPOSITORY);
        let declaration = find(&file, "declaration");
        let StatementKind::Declaration { declarations } = declaration.kind() else {
            panic!("expected a declaration");
        };
        assert_eq!(declarations[0].name, "conn");
        assert!(declarations[0].is_var);
        assert_eq!(
            declarations[0].ty,
            TypeInfo::resolved("SqlConnection", "System.Data.SqlClient.SqlConnection")
        );
        assert_eq!(
            declaration.next_sibling().unwrap().text(),
            "conn.Open();"
        );
    }

    #[test]
    fn invocation_on_typed_local_resolves_method() {
        let file = parse(REPOSITORY);
        let call = file
            .walk()
            .into_iter()
            .find(|s| s.text() == "conn.Open();")
            .unwrap();
        let StatementKind::Expression(expression) = call.kind() else {
            panic!("expected an expression statement");
        };
        let ExpressionKind::Invocation { invoked, .. } = &expression.kind else {
            panic!("expected an invocation");
        };
        let ExpressionKind::Reference {
            target: Some(Symbol::Member(method)),
            ..
        } = &invoked.kind
        else {
            panic!("expected a resolved member");
        };
        assert_eq!(method.kind, MemberKind::Method);
        assert_eq!(method.full_name(), "System.Data.SqlClient.SqlConnection.Open");
    }

    #[test]
    fn static_calls_and_declared_parameters() {
        let file = parse(REPOSITORY);
        let foreach = find(&file, "foreach");
        let StatementKind::Foreach { collection, .. } = foreach.kind() else {
            panic!("expected foreach");
        };
        let ExpressionKind::Invocation { arguments, .. } = &collection.kind else {
            panic!("expected an invocation");
        };
        assert_eq!(arguments[0].parameter.as_deref(), Some("source"));
        assert_eq!(
            collection.ty,
            TypeInfo::resolved("string[]", "System.String[]")
        );

        let write_line = file
            .walk()
            .into_iter()
            .find(|s| s.text() == "Console.WriteLine(row);")
            .unwrap();
        let StatementKind::Expression(expression) = write_line.kind() else {
            panic!("expected an expression statement");
        };
        let ExpressionKind::Invocation { invoked, arguments } = &expression.kind else {
            panic!("expected an invocation");
        };
        assert_eq!(arguments[0].parameter.as_deref(), Some("arg0"));
        let ExpressionKind::Reference {
            target: Some(Symbol::Member(method)),
            ..
        } = &invoked.kind
        else {
            panic!("expected a resolved member");
        };
        assert_eq!(method.full_name(), "System.Console.WriteLine");
    }

    #[test]
    fn null_check_and_blocks() {
        let file = parse(REPOSITORY);
        let if_stmt = find(&file, "if");
        let StatementKind::If {
            condition,
            then_branch,
            ..
        } = if_stmt.kind()
        else {
            panic!("expected if");
        };
        assert!(matches!(condition.kind, ExpressionKind::Binary { ref operator, .. } if operator == "=="));
        let body = file.statement(then_branch.unwrap()).unwrap();
        assert_eq!(body.children()[0].text(), "return;");
    }

    #[test]
    fn unknown_types_stay_unresolved() {
        let source = "class A { void M() { Widget w = Make(); w.Spin(); } }";
        let file = parse(source);
        let StatementKind::Declaration { declarations } = find(&file, "declaration").kind() else {
            panic!("expected a declaration");
        };
        assert_eq!(declarations[0].ty, TypeInfo::Unresolved);
    }

    #[test]
    fn top_level_statements_share_a_block() {
        let source = "using System;\nvar name = \"x\";\nConsole.WriteLine(name);\n";
        let file = parse(source);
        let declaration = find(&file, "declaration");
        assert_eq!(
            declaration.next_sibling().unwrap().text(),
            "Console.WriteLine(name);"
        );
    }

    #[test]
    fn blocks_of_other_statements_are_still_mined() {
        let source = "class A { void M() { for (int i = 0; i < 3; i++) { var s = \"a\"; s.Trim(); } } }";
        let file = parse(source);
        let declaration = file
            .walk()
            .into_iter()
            .find(|s| s.text() == "var s = \"a\";")
            .unwrap();
        assert_eq!(declaration.next_sibling().unwrap().text(), "s.Trim();");
    }

    const GUARDS: &str = r#"using System.Data.SqlClient;

namespace Shop
{
    public static class Settings
    {
        public static bool Enabled { get; set; }
    }

    public class Orders
    {
        public void Save(SqlConnection conn)
        {
            string name = "order";
            name.Trim();
            if (null == conn)
            {
                return;
            }
            if (conn != null)
            {
                conn.Open();
            }
            if (!Settings.Enabled)
            {
                return;
            }
        }
    }
}
"#;

    fn scope_keys(file: &SourceFile) -> Vec<String> {
        let pipeline = TemplatePipeline::standard();
        file.walk()
            .into_iter()
            .flat_map(|statement| pipeline.scopes_for(statement))
            .map(|scope| scope.key().to_string())
            .collect()
    }

    #[test]
    fn parsed_guards_and_locals_produce_scope_keys() {
        let keys = scope_keys(&parse(GUARDS));
        for expected in [
            "After variable of type \"System.String\"",
            "If expression of type \"System.Data.SqlClient.SqlConnection\" is null",
            "If expression of type \"System.Data.SqlClient.SqlConnection\" is not null",
            "After call to \"System.Data.SqlClient.SqlConnection.Open\"",
            "If expression \"!Settings.Enabled\"",
        ] {
            assert!(
                keys.iter().any(|key| key == expected),
                "missing {expected} in {keys:?}"
            );
        }
    }

    #[test]
    fn parsed_string_locals_share_one_key() {
        let source = "class A { void M() { string s = \"a\"; s.Trim(); System.String t = \"b\"; t.Trim(); } }";
        let keys = scope_keys(&parse(source));
        let string_keys: Vec<_> = keys
            .iter()
            .filter(|key| key.starts_with("After variable"))
            .collect();
        assert_eq!(string_keys.len(), 2);
        assert!(string_keys
            .iter()
            .all(|key| *key == "After variable of type \"System.String\""));
    }

    #[test]
    fn long_operator_chains_are_mined_without_exhausting_the_stack() {
        let terms = vec!["p"; 5000].join(" + ");
        let source = format!("class A {{ void M(string p) {{ string s = {terms}; s.Trim(); }} }}");
        let file = parse(&source);

        let StatementKind::Declaration { declarations } = find(&file, "declaration").kind() else {
            panic!("expected a declaration");
        };
        assert_eq!(
            declarations[0].ty,
            TypeInfo::resolved("string", "System.String")
        );

        let mined = TemplatePipeline::standard().analyze_file(&file, "<App>/A.cs");
        assert!(mined
            .iter()
            .any(|d| d.key == "After variable of type \"System.String\""
                && d.template == "$VariableName$.Trim();"));
    }

    #[test]
    fn deeply_nested_statements_stay_opaque_past_the_limit() {
        let mut body = String::from("x.Trim();");
        for _ in 0..500 {
            body = format!("if (x != null) {{ {body} }}");
        }
        let source = format!("class A {{ void M(string x) {{ {body} }} }}");
        let file = parse(&source);
        assert!(file.walk().iter().any(|s| s.kind().name() == "if"));
        assert!(file.walk().iter().all(|s| s.text() != "x.Trim();"));
    }
}

//! Common source-model abstractions.
//!
//! The mining pipeline never touches a parser directly. It walks a
//! [`SourceFile`]: an arena of statements with resolved expression trees,
//! produced either by the tree-sitter C# front end or by
//! [`crate::lang::builder::SourceFileBuilder`]. Types are tri-state
//! ([`TypeInfo`]) so callers can refuse to guess when resolution failed.
//!
//! The arena is read-only for the pipeline with a single exception,
//! [`SourceFile::ensure_body`], which synthesizes a block around a
//! block-introducing statement's body when an insertion point has to be
//! computed interactively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a statement inside its [`SourceFile`] arena.
pub type StatementId = usize;

/// Half-open byte range into a source file's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextRange {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl TextRange {
    /// Create a range from two offsets
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-length range at `offset`
    pub fn empty(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range covers no text
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `offset` lies inside the range
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// A resolved type with both of its presentation forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Short form as a developer writes it (`string`, `List<int>`, `SqlConnection`)
    pub presentable: String,
    /// Namespace-qualified form (`System.String`, `System.Data.SqlClient.SqlConnection`)
    pub long_name: String,
}

impl TypeRef {
    /// Create a type reference
    pub fn new(presentable: impl Into<String>, long_name: impl Into<String>) -> Self {
        Self {
            presentable: presentable.into(),
            long_name: long_name.into(),
        }
    }

    /// Presentable name with `<`, `>` and `.` removed, usable as a placeholder name.
    pub fn placeholder_name(&self) -> String {
        self.presentable
            .chars()
            .filter(|c| !matches!(c, '<' | '>' | '.'))
            .collect()
    }
}

/// Outcome of type resolution for an expression or declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeInfo {
    /// The type is known
    Resolved(TypeRef),
    /// No type could be inferred at all
    #[default]
    Unknown,
    /// A type was written but could not be bound to a declaration
    Unresolved,
}

impl TypeInfo {
    /// Shorthand for a resolved type
    pub fn resolved(presentable: impl Into<String>, long_name: impl Into<String>) -> Self {
        Self::Resolved(TypeRef::new(presentable, long_name))
    }

    /// The resolved type, if any
    pub fn as_resolved(&self) -> Option<&TypeRef> {
        match self {
            Self::Resolved(ty) => Some(ty),
            _ => None,
        }
    }

    /// Whether the type is resolved
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Namespace plus simple name of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Containing namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
}

impl QualifiedName {
    /// Create a qualified name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `Namespace.Name`, or just `Name` in the global namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Kind of a type member a reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// Method or local function
    Method,
    /// Property
    Property,
    /// Field or constant
    Field,
    /// Event
    Event,
}

/// A resolved type member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSymbol {
    /// Member name
    pub name: String,
    /// Member kind
    pub kind: MemberKind,
    /// Declaring type
    pub containing_type: Option<QualifiedName>,
    /// Member is an assertion or contract method (`Debug.Assert`, `Contract.Requires`, ...)
    pub is_assertion: bool,
}

impl MemberSymbol {
    /// Create a method symbol declared on `containing_type`
    pub fn method(name: impl Into<String>, containing_type: QualifiedName) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Method,
            containing_type: Some(containing_type),
            is_assertion: false,
        }
    }

    /// Create a property symbol declared on `containing_type`
    pub fn property(name: impl Into<String>, containing_type: QualifiedName) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Property,
            containing_type: Some(containing_type),
            is_assertion: false,
        }
    }

    /// `Type.Member`, or just `Member` without a containing type
    pub fn type_qualified_name(&self) -> String {
        match &self.containing_type {
            Some(ty) => format!("{}.{}", ty.name, self.name),
            None => self.name.clone(),
        }
    }

    /// `Namespace.Type.Member` without a leading dot for the global namespace
    pub fn full_name(&self) -> String {
        match &self.containing_type {
            Some(ty) => format!("{}.{}", ty.full_name(), self.name),
            None => self.name.clone(),
        }
    }
}

/// What a reference expression resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    /// A local variable
    Local {
        /// Variable name
        name: String,
        /// Declared or inferred type
        ty: TypeInfo,
    },
    /// A method parameter
    Parameter {
        /// Parameter name
        name: String,
        /// Declared type
        ty: TypeInfo,
    },
    /// A member of some type
    Member(MemberSymbol),
    /// A type name used as an expression (`Console` in `Console.WriteLine`)
    Type(QualifiedName),
}

/// An argument of an invocation or object creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument value
    pub value: Expression,
    /// Name of the formal parameter the argument binds to, when known
    pub parameter: Option<String>,
}

/// A type as written in an object creation, plus its binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeName {
    /// Source text of the type
    pub written: String,
    /// Declaration the name bound to
    pub resolved: Option<QualifiedName>,
}

/// Shape of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    /// Simple or member-access name
    Reference {
        /// Receiver of a member access
        qualifier: Option<Box<Expression>>,
        /// Referenced identifier
        name: String,
        /// Resolution target
        target: Option<Symbol>,
    },
    /// Method call
    Invocation {
        /// Invoked expression, usually a reference
        invoked: Box<Expression>,
        /// Call arguments in source order
        arguments: Vec<Argument>,
    },
    /// Binary operator application
    Binary {
        /// Left operand
        left: Box<Expression>,
        /// Operator token text
        operator: String,
        /// Right operand
        right: Box<Expression>,
    },
    /// Prefix or postfix unary operator
    Unary {
        /// Operator token text
        operator: String,
        /// Operand
        operand: Box<Expression>,
        /// Operator follows the operand (`i++`)
        postfix: bool,
    },
    /// `(T)operand`
    Cast {
        /// Target type
        target_type: TypeInfo,
        /// Target type as written
        written_type: String,
        /// Operand
        operand: Box<Expression>,
    },
    /// `operand is T`
    Is {
        /// Operand
        operand: Box<Expression>,
        /// Tested type
        target_type: TypeInfo,
        /// Tested type as written
        written_type: String,
    },
    /// `operand as T`
    As {
        /// Operand
        operand: Box<Expression>,
        /// Target type
        target_type: TypeInfo,
        /// Target type as written
        written_type: String,
    },
    /// `(inner)`
    Parenthesized(Box<Expression>),
    /// `this`
    This,
    /// `new T(args)`
    ObjectCreation {
        /// Created type, absent for target-typed `new()`
        type_name: Option<TypeName>,
        /// Constructor arguments
        arguments: Vec<Argument>,
    },
    /// `target op value`
    Assignment {
        /// Assigned location
        target: Box<Expression>,
        /// Operator token text (`=`, `+=`, ...)
        operator: String,
        /// Assigned value
        value: Box<Expression>,
    },
    /// Literal constant
    Literal,
    /// Any other shape, kept as raw text
    Other,
}

/// Deepest expression nesting the front ends model. Operands below it are
/// kept as raw text and templates deeper than it are not rendered.
pub const MAX_EXPRESSION_DEPTH: usize = 48;

/// An expression with its source text and resolved type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Source text
    pub text: String,
    /// Resolved type
    pub ty: TypeInfo,
    /// Shape
    pub kind: ExpressionKind,
}

impl Expression {
    /// Create an expression
    pub fn new(text: impl Into<String>, ty: TypeInfo, kind: ExpressionKind) -> Self {
        Self {
            text: text.into(),
            ty,
            kind,
        }
    }

    /// Opaque expression carrying only its text
    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(text, TypeInfo::Unknown, ExpressionKind::Other)
    }

    /// Whether the expression text is literally `null`
    pub fn is_null_literal(&self) -> bool {
        self.text.trim() == "null"
    }
}

/// One declarator of a local declaration or `using` resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    /// Declared name
    pub name: String,
    /// Declared or inferred type
    pub ty: TypeInfo,
    /// Declared with `var`
    pub is_var: bool,
    /// Type as written (`var` for implicitly typed declarations)
    pub declared_type_text: String,
    /// Initializer expression
    pub initializer: Option<Expression>,
}

/// Iteration variable of a `foreach`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorDeclaration {
    /// Iterator name
    pub name: String,
    /// Declared with `var`
    pub is_var: bool,
    /// Element type
    pub ty: TypeInfo,
    /// Type as written
    pub declared_type_text: String,
}

/// A `catch` clause of a `try` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Caught exception type, `None` for a bare `catch`
    pub exception_type: Option<TypeInfo>,
    /// Exception type as written
    pub declared_type_text: Option<String>,
    /// Exception variable name
    pub variable: Option<String>,
    /// Handler block
    pub body: Option<StatementId>,
}

/// Shape of a statement. Child statements are arena ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    /// `{ ... }`
    Block {
        /// Statements in order
        statements: Vec<StatementId>,
    },
    /// `expression;`
    Expression(Expression),
    /// Local variable declaration
    Declaration {
        /// Declarators
        declarations: Vec<VariableDeclaration>,
    },
    /// `if (condition) then else`
    If {
        /// Condition
        condition: Expression,
        /// Then branch
        then_branch: Option<StatementId>,
        /// Else branch
        else_branch: Option<StatementId>,
    },
    /// `while (condition) body`
    While {
        /// Condition
        condition: Expression,
        /// Loop body
        body: Option<StatementId>,
    },
    /// `do body while (condition);`
    DoWhile {
        /// Loop body
        body: Option<StatementId>,
        /// Condition
        condition: Expression,
    },
    /// `foreach (iterator in collection) body`
    Foreach {
        /// Iteration variable
        iterator: IteratorDeclaration,
        /// Enumerated collection
        collection: Expression,
        /// Loop body
        body: Option<StatementId>,
    },
    /// `using (resource) body`
    Using {
        /// Declared resources
        declarations: Vec<VariableDeclaration>,
        /// Resource expression when no declaration is used
        resource: Option<Expression>,
        /// Body
        body: Option<StatementId>,
    },
    /// `return value;`
    Return {
        /// Returned value
        value: Option<Expression>,
    },
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `try { } catch { } finally { }`
    Try {
        /// Protected block
        body: Option<StatementId>,
        /// Catch clauses in order
        catches: Vec<CatchClause>,
        /// Finally block
        finally_block: Option<StatementId>,
    },
    /// `;`
    Empty,
    /// Anything else, kept as raw text
    Other,
}

impl StatementKind {
    /// Short lowercase name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Block { .. } => "block",
            Self::Expression(_) => "expression",
            Self::Declaration { .. } => "declaration",
            Self::If { .. } => "if",
            Self::While { .. } => "while",
            Self::DoWhile { .. } => "do",
            Self::Foreach { .. } => "foreach",
            Self::Using { .. } => "using",
            Self::Return { .. } => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Try { .. } => "try",
            Self::Empty => "empty",
            Self::Other => "other",
        }
    }

    /// Direct child statements in source order
    pub fn child_ids(&self) -> Vec<StatementId> {
        match self {
            Self::Block { statements } => statements.clone(),
            Self::If {
                then_branch,
                else_branch,
                ..
            } => then_branch.iter().chain(else_branch.iter()).copied().collect(),
            Self::While { body, .. }
            | Self::DoWhile { body, .. }
            | Self::Foreach { body, .. }
            | Self::Using { body, .. } => body.iter().copied().collect(),
            Self::Try {
                body,
                catches,
                finally_block,
            } => body
                .iter()
                .chain(catches.iter().filter_map(|c| c.body.as_ref()))
                .chain(finally_block.iter())
                .copied()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Body slot of a block-introducing statement
    fn body_slot_mut(&mut self) -> Option<&mut Option<StatementId>> {
        match self {
            Self::If { then_branch, .. } => Some(then_branch),
            Self::While { body, .. } | Self::Foreach { body, .. } | Self::Using { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }

    fn body_slot(&self) -> Option<Option<StatementId>> {
        match self {
            Self::If { then_branch, .. } => Some(*then_branch),
            Self::While { body, .. } | Self::Foreach { body, .. } | Self::Using { body, .. } => {
                Some(*body)
            }
            _ => None,
        }
    }
}

/// Text edit needed to materialize an insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionEdit {
    /// Insert directly at the offset
    Insert,
    /// Replace `replace` (an empty statement or nothing) with a new block
    SynthesizeBlock {
        /// Replaced text
        replace: TextRange,
    },
    /// Wrap the embedded statement at `wrapped` into a new block
    WrapInBlock {
        /// Wrapped statement
        wrapped: TextRange,
    },
}

/// Where inserted templates go, expressed against the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionPoint {
    /// Offset of the insertion in the original text
    pub offset: usize,
    /// Edit required at that offset
    pub edit: InsertionEdit,
}

impl InsertionPoint {
    /// Plain insertion at `offset`
    pub fn at(offset: usize) -> Self {
        Self {
            offset,
            edit: InsertionEdit::Insert,
        }
    }

    /// Apply the insertion of `snippet` to `text`. `None` when the point does
    /// not fit the text.
    pub fn apply(&self, text: &str, snippet: &str) -> Option<String> {
        match self.edit {
            InsertionEdit::Insert => {
                let (before, after) = split_checked(text, self.offset, self.offset)?;
                Some(format!("{before}{snippet}{after}"))
            }
            InsertionEdit::SynthesizeBlock { replace } => {
                let (before, after) = split_checked(text, replace.start, replace.end)?;
                Some(format!("{before}{{{snippet} }}{after}"))
            }
            InsertionEdit::WrapInBlock { wrapped } => {
                let (before, after) = split_checked(text, wrapped.start, wrapped.end)?;
                let inner = text.get(wrapped.start..wrapped.end)?;
                Some(format!("{before}{{{snippet} {inner} }}{after}"))
            }
        }
    }
}

fn split_checked(text: &str, start: usize, end: usize) -> Option<(&str, &str)> {
    if start > end {
        return None;
    }
    Some((text.get(..start)?, text.get(end..)?))
}

/// One arena slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementNode {
    /// Statement shape
    pub kind: StatementKind,
    /// Parent statement
    pub parent: Option<StatementId>,
    /// Source range
    pub range: TextRange,
    /// Set on blocks created by [`SourceFile::ensure_body`]
    pub synthesized: Option<InsertionEdit>,
}

/// A parsed source file: text plus statement arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    path: String,
    text: String,
    statements: Vec<StatementNode>,
    roots: Vec<StatementId>,
}

impl SourceFile {
    /// Create an empty model for `text`
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            statements: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Display path of the file
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full source text
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }

    /// Number of statements in the arena
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Append a statement whose children are already in the arena; the
    /// children are re-parented to it.
    pub fn push_statement(&mut self, kind: StatementKind, range: TextRange) -> StatementId {
        let id = self.statements.len();
        for child in kind.child_ids() {
            if let Some(node) = self.statements.get_mut(child) {
                node.parent = Some(id);
            }
        }
        self.statements.push(StatementNode {
            kind,
            parent: None,
            range,
            synthesized: None,
        });
        id
    }

    /// Register a top-level statement (a member body or global statement)
    pub fn add_root(&mut self, id: StatementId) {
        if id < self.statements.len() && !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Borrow a statement
    pub fn statement(&self, id: StatementId) -> Option<StatementRef<'_>> {
        (id < self.statements.len()).then_some(StatementRef { file: self, id })
    }

    /// Top-level statements in registration order
    pub fn roots(&self) -> impl Iterator<Item = StatementRef<'_>> + '_ {
        self.roots.iter().map(move |&id| StatementRef { file: self, id })
    }

    /// Every statement reachable from the roots, in pre-order
    pub fn walk(&self) -> Vec<StatementRef<'_>> {
        let mut result = Vec::with_capacity(self.statements.len());
        let mut stack: Vec<StatementId> = self.roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let Some(node) = self.statements.get(id) else {
                continue;
            };
            result.push(StatementRef { file: self, id });
            stack.extend(node.kind.child_ids().into_iter().rev());
        }

        result
    }

    /// 1-based line number containing `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        let end = offset.min(self.text.len());
        self.text.as_bytes()[..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    }

    /// First non-block statement (pre-order) starting on 1-based `line`
    pub fn statement_at_line(&self, line: usize) -> Option<StatementRef<'_>> {
        self.walk().into_iter().find(|stmt| {
            !matches!(stmt.kind(), StatementKind::Block { .. })
                && stmt.node().synthesized.is_none()
                && self.line_of(stmt.range().start) == line
        })
    }

    /// Innermost non-block statement whose range contains `offset`
    pub fn statement_at_offset(&self, offset: usize) -> Option<StatementRef<'_>> {
        self.walk()
            .into_iter()
            .filter(|stmt| {
                !matches!(stmt.kind(), StatementKind::Block { .. }) && stmt.range().contains(offset)
            })
            .last()
    }

    /// Non-block statement ending last at or before `offset`; the outermost
    /// one when several end there
    pub fn statement_before_offset(&self, offset: usize) -> Option<StatementRef<'_>> {
        let mut best: Option<StatementRef<'_>> = None;
        for stmt in self.walk() {
            if matches!(stmt.kind(), StatementKind::Block { .. })
                || stmt.node().synthesized.is_some()
                || stmt.range().end > offset
            {
                continue;
            }
            // Pre-order visits the outer statement first
            if best.map_or(true, |b| stmt.range().end > b.range().end) {
                best = Some(stmt);
            }
        }
        best
    }

    /// Make sure the body of a block-introducing statement is a block and
    /// return the position just inside its opening brace.
    ///
    /// This is the only mutation the pipeline performs on a source model. A
    /// missing body or an empty statement is replaced by a synthesized empty
    /// block; an embedded statement is wrapped into one. The returned point
    /// describes the matching text edit against the unmodified text.
    pub fn ensure_body(&mut self, owner: StatementId) -> Option<InsertionPoint> {
        let owner_node = self.statements.get(owner)?;
        let owner_end = owner_node.range.end;
        let body = owner_node.kind.body_slot()?;

        let (edit, wrapped_child) = match body {
            Some(body_id) => {
                let body_node = self.statements.get(body_id)?;
                match (&body_node.kind, body_node.synthesized) {
                    (StatementKind::Block { .. }, Some(edit)) => {
                        return Some(InsertionPoint {
                            offset: edit_anchor(edit),
                            edit,
                        })
                    }
                    (StatementKind::Block { .. }, None) => {
                        return Some(InsertionPoint::at(body_node.range.start + 1))
                    }
                    (StatementKind::Empty, _) => (
                        InsertionEdit::SynthesizeBlock {
                            replace: body_node.range,
                        },
                        None,
                    ),
                    _ => (
                        InsertionEdit::WrapInBlock {
                            wrapped: body_node.range,
                        },
                        Some(body_id),
                    ),
                }
            }
            None => (
                InsertionEdit::SynthesizeBlock {
                    replace: TextRange::empty(owner_end),
                },
                None,
            ),
        };

        let block_range = match edit {
            InsertionEdit::WrapInBlock { wrapped } => wrapped,
            InsertionEdit::SynthesizeBlock { replace } => TextRange::empty(replace.start),
            InsertionEdit::Insert => TextRange::empty(owner_end),
        };

        if let Some(Some(old_body)) = self.statements.get(owner).and_then(|n| n.kind.body_slot()) {
            if let Some(node) = self.statements.get_mut(old_body) {
                node.parent = None;
            }
        }

        let statements = wrapped_child.into_iter().collect();
        let block = self.push_statement(StatementKind::Block { statements }, block_range);
        if let Some(node) = self.statements.get_mut(block) {
            node.synthesized = Some(edit);
            node.parent = Some(owner);
        }
        if let Some(slot) = self
            .statements
            .get_mut(owner)
            .and_then(|n| n.kind.body_slot_mut())
        {
            *slot = Some(block);
        }

        Some(InsertionPoint {
            offset: edit_anchor(edit),
            edit,
        })
    }
}

fn edit_anchor(edit: InsertionEdit) -> usize {
    match edit {
        InsertionEdit::SynthesizeBlock { replace } => replace.start,
        InsertionEdit::WrapInBlock { wrapped } => wrapped.start,
        InsertionEdit::Insert => 0,
    }
}

/// Borrowed handle to one statement of a [`SourceFile`].
#[derive(Debug, Clone, Copy)]
pub struct StatementRef<'a> {
    file: &'a SourceFile,
    id: StatementId,
}

impl<'a> StatementRef<'a> {
    /// Arena id
    pub fn id(&self) -> StatementId {
        self.id
    }

    /// Owning file
    pub fn file(&self) -> &'a SourceFile {
        self.file
    }

    fn node(&self) -> &'a StatementNode {
        &self.file.statements[self.id]
    }

    /// Statement shape
    pub fn kind(&self) -> &'a StatementKind {
        &self.node().kind
    }

    /// Source range
    pub fn range(&self) -> TextRange {
        self.node().range
    }

    /// Source text of the statement
    pub fn text(&self) -> &'a str {
        let range = self.range();
        self.file.text.get(range.start..range.end).unwrap_or("")
    }

    /// Parent statement
    pub fn parent(&self) -> Option<StatementRef<'a>> {
        self.node().parent.and_then(|id| self.file.statement(id))
    }

    /// Direct child statements
    pub fn children(&self) -> Vec<StatementRef<'a>> {
        self.kind()
            .child_ids()
            .into_iter()
            .filter_map(|id| self.file.statement(id))
            .collect()
    }

    /// Statement following this one in its containing block
    pub fn next_sibling(&self) -> Option<StatementRef<'a>> {
        let parent = self.parent()?;
        let StatementKind::Block { statements } = parent.kind() else {
            return None;
        };
        let index = statements.iter().position(|&id| id == self.id)?;
        statements
            .get(index + 1)
            .and_then(|&id| self.file.statement(id))
    }

    /// First statement inside `body`: the first statement of a block, or the
    /// embedded statement itself
    pub fn first_inner(&self, body: Option<StatementId>) -> Option<StatementRef<'a>> {
        let body = self.file.statement(body?)?;
        match body.kind() {
            StatementKind::Block { statements } => statements
                .first()
                .and_then(|&id| self.file.statement(id)),
            _ => Some(body),
        }
    }
}

impl PartialEq for StatementRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.file, other.file) && self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `if (x) Run();` with an embedded body, followed by `Stop();`
    fn embedded_if() -> SourceFile {
        let text = "{ if (x) Run(); Stop(); }";
        let mut file = SourceFile::new("Test.cs", text);
        let run = file.push_statement(
            StatementKind::Expression(Expression::raw("Run()")),
            TextRange::new(9, 15),
        );
        let if_stmt = file.push_statement(
            StatementKind::If {
                condition: Expression::raw("x"),
                then_branch: Some(run),
                else_branch: None,
            },
            TextRange::new(2, 15),
        );
        let stop = file.push_statement(
            StatementKind::Expression(Expression::raw("Stop()")),
            TextRange::new(16, 23),
        );
        let block = file.push_statement(
            StatementKind::Block {
                statements: vec![if_stmt, stop],
            },
            TextRange::new(0, 25),
        );
        file.add_root(block);
        file
    }

    #[test]
    fn walk_is_pre_order() {
        let file = embedded_if();
        let kinds: Vec<&str> = file.walk().iter().map(|s| s.kind().name()).collect();
        assert_eq!(kinds, vec!["block", "if", "expression", "expression"]);
    }

    #[test]
    fn statement_before_offset_prefers_the_outer_statement() {
        let file = embedded_if();
        assert!(file.statement_before_offset(5).is_none());
        assert_eq!(file.statement_before_offset(15).unwrap().kind().name(), "if");
        assert_eq!(file.statement_before_offset(20).unwrap().kind().name(), "if");
        assert_eq!(file.statement_before_offset(24).unwrap().text(), "Stop();");
    }

    #[test]
    fn next_sibling_only_within_blocks() {
        let file = embedded_if();
        let if_stmt = file.statement(1).unwrap();
        assert_eq!(if_stmt.next_sibling().unwrap().text(), "Stop();");

        let run = file.statement(0).unwrap();
        assert!(run.next_sibling().is_none(), "embedded body has no sibling");
        assert!(file.statement(3).unwrap().next_sibling().is_none());
    }

    #[test]
    fn ensure_body_wraps_embedded_statement() {
        let mut file = embedded_if();
        let point = file.ensure_body(1).unwrap();
        assert_eq!(
            point.edit,
            InsertionEdit::WrapInBlock {
                wrapped: TextRange::new(9, 15)
            }
        );

        let edited = point.apply(file.text(), "\nLog();").unwrap();
        assert_eq!(edited, "{ if (x) {\nLog(); Run(); } Stop(); }");

        // The model now holds a synthesized block; asking again is stable
        let again = file.ensure_body(1).unwrap();
        assert_eq!(again, point);
        let if_stmt = file.statement(1).unwrap();
        let body = if_stmt.children()[0];
        assert!(matches!(body.kind(), StatementKind::Block { .. }));
        assert_eq!(body.children()[0].text(), "Run();");
    }

    #[test]
    fn ensure_body_uses_existing_block() {
        let text = "foreach (var i in xs) { }";
        let mut file = SourceFile::new("Test.cs", text);
        let body = file.push_statement(
            StatementKind::Block { statements: vec![] },
            TextRange::new(22, 25),
        );
        let foreach = file.push_statement(
            StatementKind::Foreach {
                iterator: IteratorDeclaration {
                    name: "i".into(),
                    is_var: true,
                    ty: TypeInfo::Unknown,
                    declared_type_text: "var".into(),
                },
                collection: Expression::raw("xs"),
                body: Some(body),
            },
            TextRange::new(0, 25),
        );
        file.add_root(foreach);

        let point = file.ensure_body(foreach).unwrap();
        assert_eq!(point, InsertionPoint::at(23));
        assert_eq!(
            point.apply(text, " Use(i);").unwrap(),
            "foreach (var i in xs) { Use(i); }"
        );
    }

    #[test]
    fn ensure_body_replaces_empty_statement() {
        let text = "if (ready);";
        let mut file = SourceFile::new("Test.cs", text);
        let empty = file.push_statement(StatementKind::Empty, TextRange::new(10, 11));
        let if_stmt = file.push_statement(
            StatementKind::If {
                condition: Expression::raw("ready"),
                then_branch: Some(empty),
                else_branch: None,
            },
            TextRange::new(0, 11),
        );
        file.add_root(if_stmt);

        let point = file.ensure_body(if_stmt).unwrap();
        assert_eq!(point.apply(text, " Go();").unwrap(), "if (ready){ Go(); }");
    }

    #[test]
    fn ensure_body_rejects_statements_without_body() {
        let mut file = embedded_if();
        assert!(file.ensure_body(2).is_none());
        assert!(file.ensure_body(99).is_none());
    }

    #[test]
    fn locates_statements_by_line() {
        let text = "{\n  Open();\n  Close();\n}";
        let mut file = SourceFile::new("Test.cs", text);
        let open = file.push_statement(
            StatementKind::Expression(Expression::raw("Open()")),
            TextRange::new(4, 11),
        );
        let close = file.push_statement(
            StatementKind::Expression(Expression::raw("Close()")),
            TextRange::new(14, 22),
        );
        let block = file.push_statement(
            StatementKind::Block {
                statements: vec![open, close],
            },
            TextRange::new(0, text.len()),
        );
        file.add_root(block);

        assert_eq!(file.statement_at_line(2).unwrap().text(), "Open();");
        assert_eq!(file.statement_at_line(3).unwrap().text(), "Close();");
        assert!(file.statement_at_line(1).is_none());
        assert_eq!(file.statement_at_offset(16).unwrap().id(), close);
    }

    #[test]
    fn placeholder_name_strips_generic_and_dots() {
        let ty = TypeRef::new("Dictionary<string, Foo.Bar>", "x");
        assert_eq!(ty.placeholder_name(), "Dictionarystring, FooBar");
        let member = MemberSymbol::method("Open", QualifiedName::new("", "Db"));
        assert_eq!(member.full_name(), "Db.Open");
    }
}

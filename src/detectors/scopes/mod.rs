//! Scope classification.
//!
//! A [`ScopeClassifier`] looks at one statement shape and, when it matches,
//! describes the code position as a [`Scope`]: a human-readable key that
//! groups observations across the codebase, the named parameters captured from
//! the statement, and how to find "what follows" and "where to insert".
//! Block-introducing scopes (`if`, `foreach`, `using`) redirect both into their
//! nested body instead of the position after the anchor statement.

use std::fmt;

use indexmap::IndexMap;

use crate::lang::common::{
    InsertionPoint, SourceFile, StatementId, StatementKind, StatementRef,
};

pub mod classifiers;

pub use classifiers::{
    standard_classifiers, AssignmentClassifier, ForeachClassifier, IfMemberClassifier,
    IfNegationClassifier, IfNullClassifier, InvocationClassifier, LocalVariableClassifier,
    UsingClassifier,
};

/// Named captures of a scope (`VariableName`, `VariableType`, `FullName`, ...).
pub type ScopeParameters = IndexMap<String, String>;

/// Resolves the statement a scope's templates are mined from.
pub type NextStatementResolver = for<'a> fn(StatementRef<'a>) -> Option<StatementRef<'a>>;

/// Resolves where templates for a scope are inserted.
pub type InsertPositionResolver = fn(&mut SourceFile, StatementId) -> Option<InsertionPoint>;

/// Parameter holding the scope's subject variable.
pub const VARIABLE_NAME: &str = "VariableName";

/// A classified code position.
#[derive(Clone)]
pub struct Scope {
    key: String,
    parameters: ScopeParameters,
    anchor: StatementId,
    next_statement: Option<NextStatementResolver>,
    insert_position: Option<InsertPositionResolver>,
}

impl Scope {
    /// Scope anchored at `anchor` that mines and inserts after the anchor
    pub fn new(anchor: StatementRef<'_>, key: impl Into<String>, parameters: ScopeParameters) -> Self {
        Self {
            key: key.into(),
            parameters,
            anchor: anchor.id(),
            next_statement: None,
            insert_position: None,
        }
    }

    /// Override the next-statement resolver
    pub fn with_next_statement(mut self, resolver: NextStatementResolver) -> Self {
        self.next_statement = Some(resolver);
        self
    }

    /// Override the insert-position resolver
    pub fn with_insert_position(mut self, resolver: InsertPositionResolver) -> Self {
        self.insert_position = Some(resolver);
        self
    }

    /// Mine from and insert into the anchor's nested body
    pub fn inside_body(self) -> Self {
        self.with_next_statement(first_body_statement)
            .with_insert_position(body_insert_position)
    }

    /// Grouping key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Captured parameters
    pub fn parameters(&self) -> &ScopeParameters {
        &self.parameters
    }

    /// Single captured parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Anchor statement id
    pub fn anchor(&self) -> StatementId {
        self.anchor
    }

    /// Whether the scope redirects into a nested body
    pub fn is_block_scope(&self) -> bool {
        self.insert_position.is_some()
    }

    /// The statement templates are mined from: the override, or the anchor's
    /// successor in its containing block
    pub fn next_statement<'a>(&self, file: &'a SourceFile) -> Option<StatementRef<'a>> {
        let anchor = file.statement(self.anchor)?;
        match self.next_statement {
            Some(resolve) => resolve(anchor),
            None => anchor.next_sibling(),
        }
    }

    /// Where templates are inserted: the override, or the end of the anchor
    pub fn insert_position(&self, file: &mut SourceFile) -> Option<InsertionPoint> {
        match self.insert_position {
            Some(resolve) => resolve(file, self.anchor),
            None => file
                .statement(self.anchor)
                .map(|anchor| InsertionPoint::at(anchor.range().end)),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("key", &self.key)
            .field("parameters", &self.parameters)
            .field("anchor", &self.anchor)
            .field("block_scope", &self.is_block_scope())
            .finish()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.parameters == other.parameters && self.anchor == other.anchor
    }
}

/// First statement of the nested body of an `if`/`foreach`/`using`/`while`
fn first_body_statement(statement: StatementRef<'_>) -> Option<StatementRef<'_>> {
    match statement.kind() {
        StatementKind::If { then_branch, .. } => statement.first_inner(*then_branch),
        StatementKind::Foreach { body, .. }
        | StatementKind::Using { body, .. }
        | StatementKind::While { body, .. } => statement.first_inner(*body),
        _ => None,
    }
}

fn body_insert_position(file: &mut SourceFile, anchor: StatementId) -> Option<InsertionPoint> {
    file.ensure_body(anchor)
}

/// Classifies one statement shape into a [`Scope`].
///
/// Classifiers that need type information return `None` when the type is
/// unknown or unresolved instead of guessing.
pub trait ScopeClassifier: Send + Sync {
    /// Classifier name for diagnostics
    fn name(&self) -> &'static str;

    /// Cheap structural check
    fn can_handle(&self, statement: StatementRef<'_>) -> bool;

    /// Full classification
    fn handle(&self, statement: StatementRef<'_>) -> Option<Scope>;
}

//! Lightweight C# symbol resolution.
//!
//! There is no compiler behind the front end, so type binding is deliberately
//! conservative: keyword types, types declared anywhere in the solution, a
//! table of well-known framework types visible through `using` directives or
//! enclosing namespaces, and dotted names taken as written. Everything else
//! stays [`TypeInfo::Unresolved`] so classifiers refuse to mine it.

use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::lang::common::{MemberKind, QualifiedName, TypeInfo, TypeRef};

/// Keyword types and the framework types they alias.
const KEYWORD_TYPES: &[(&str, &str)] = &[
    ("bool", "System.Boolean"),
    ("byte", "System.Byte"),
    ("char", "System.Char"),
    ("decimal", "System.Decimal"),
    ("double", "System.Double"),
    ("float", "System.Single"),
    ("int", "System.Int32"),
    ("long", "System.Int64"),
    ("nint", "System.IntPtr"),
    ("nuint", "System.UIntPtr"),
    ("object", "System.Object"),
    ("sbyte", "System.SByte"),
    ("short", "System.Int16"),
    ("string", "System.String"),
    ("uint", "System.UInt32"),
    ("ulong", "System.UInt64"),
    ("ushort", "System.UInt16"),
];

/// Framework types recognised without a declaration in the solution.
const WELL_KNOWN_TYPES: &[(&str, &str)] = &[
    ("System", "ArgumentException"),
    ("System", "ArgumentNullException"),
    ("System", "Console"),
    ("System", "Convert"),
    ("System", "DateTime"),
    ("System", "Environment"),
    ("System", "Exception"),
    ("System", "Guid"),
    ("System", "IDisposable"),
    ("System", "InvalidOperationException"),
    ("System", "Math"),
    ("System", "NotImplementedException"),
    ("System", "Object"),
    ("System", "String"),
    ("System", "TimeSpan"),
    ("System", "Uri"),
    ("System.Collections", "ArrayList"),
    ("System.Collections", "Hashtable"),
    ("System.Collections.Generic", "Dictionary"),
    ("System.Collections.Generic", "HashSet"),
    ("System.Collections.Generic", "ICollection"),
    ("System.Collections.Generic", "IDictionary"),
    ("System.Collections.Generic", "IEnumerable"),
    ("System.Collections.Generic", "IList"),
    ("System.Collections.Generic", "List"),
    ("System.Collections.Generic", "Queue"),
    ("System.Collections.Generic", "Stack"),
    ("System.Data", "DataColumn"),
    ("System.Data", "DataRow"),
    ("System.Data", "DataRowCollection"),
    ("System.Data", "DataSet"),
    ("System.Data", "DataTable"),
    ("System.Data", "IDataReader"),
    ("System.Data", "IDbCommand"),
    ("System.Data", "IDbConnection"),
    ("System.Data.SqlClient", "SqlCommand"),
    ("System.Data.SqlClient", "SqlConnection"),
    ("System.Data.SqlClient", "SqlDataReader"),
    ("System.Data.SqlClient", "SqlParameter"),
    ("System.Data.SqlClient", "SqlTransaction"),
    ("System.Diagnostics", "Debug"),
    ("System.Diagnostics", "Process"),
    ("System.Diagnostics", "Stopwatch"),
    ("System.Diagnostics", "Trace"),
    ("System.Diagnostics.Contracts", "Contract"),
    ("System.IO", "Directory"),
    ("System.IO", "File"),
    ("System.IO", "FileInfo"),
    ("System.IO", "FileStream"),
    ("System.IO", "IOException"),
    ("System.IO", "MemoryStream"),
    ("System.IO", "Path"),
    ("System.IO", "Stream"),
    ("System.IO", "StreamReader"),
    ("System.IO", "StreamWriter"),
    ("System.IO", "StringReader"),
    ("System.IO", "StringWriter"),
    ("System.IO", "TextReader"),
    ("System.IO", "TextWriter"),
    ("System.Net", "HttpWebRequest"),
    ("System.Net", "WebClient"),
    ("System.Net.Http", "HttpClient"),
    ("System.Net.Http", "HttpResponseMessage"),
    ("System.Text", "Encoding"),
    ("System.Text", "StringBuilder"),
    ("System.Threading", "CancellationToken"),
    ("System.Threading", "Monitor"),
    ("System.Threading", "Thread"),
    ("System.Threading.Tasks", "Task"),
    ("System.Xml", "XmlDocument"),
    ("System.Xml", "XmlElement"),
    ("System.Xml", "XmlNode"),
    ("System.Xml", "XmlReader"),
    ("System.Xml", "XmlWriter"),
    ("NUnit.Framework", "Assert"),
    ("Xunit", "Assert"),
    ("Microsoft.VisualStudio.TestTools.UnitTesting", "Assert"),
];

/// Result types of frequently used framework members: owner, member,
/// presentable result, long result.
const WELL_KNOWN_MEMBERS: &[(&str, &str, &str, &str)] = &[
    ("System.Data.DataTable", "NewRow", "DataRow", "System.Data.DataRow"),
    ("System.Data.DataTable", "Rows", "DataRowCollection", "System.Data.DataRowCollection"),
    ("System.Data.SqlClient.SqlCommand", "ExecuteNonQuery", "int", "System.Int32"),
    ("System.Data.SqlClient.SqlCommand", "ExecuteReader", "SqlDataReader", "System.Data.SqlClient.SqlDataReader"),
    ("System.Data.SqlClient.SqlCommand", "ExecuteScalar", "object", "System.Object"),
    ("System.Data.SqlClient.SqlConnection", "BeginTransaction", "SqlTransaction", "System.Data.SqlClient.SqlTransaction"),
    ("System.Data.SqlClient.SqlConnection", "CreateCommand", "SqlCommand", "System.Data.SqlClient.SqlCommand"),
    ("System.Data.SqlClient.SqlDataReader", "Read", "bool", "System.Boolean"),
    ("System.IO.File", "Exists", "bool", "System.Boolean"),
    ("System.IO.File", "OpenRead", "FileStream", "System.IO.FileStream"),
    ("System.IO.File", "OpenText", "StreamReader", "System.IO.StreamReader"),
    ("System.IO.File", "ReadAllText", "string", "System.String"),
    ("System.IO.StreamReader", "ReadLine", "string", "System.String"),
    ("System.IO.StreamReader", "ReadToEnd", "string", "System.String"),
    ("System.String", "Length", "int", "System.Int32"),
    ("System.String", "Split", "string[]", "System.String[]"),
    ("System.String", "Substring", "string", "System.String"),
    ("System.String", "ToLower", "string", "System.String"),
    ("System.String", "ToUpper", "string", "System.String"),
    ("System.String", "Trim", "string", "System.String"),
    ("System.Text.StringBuilder", "Append", "StringBuilder", "System.Text.StringBuilder"),
    ("System.Text.StringBuilder", "ToString", "string", "System.String"),
];

/// Methods whose calls are assertions or contracts rather than behaviour.
const ASSERTION_METHODS: &[(&str, &str)] = &[
    ("System.Diagnostics.Debug", "Assert"),
    ("System.Diagnostics.Trace", "Assert"),
    ("System.Diagnostics.Contracts.Contract", "Assert"),
    ("System.Diagnostics.Contracts.Contract", "Assume"),
    ("System.Diagnostics.Contracts.Contract", "Ensures"),
    ("System.Diagnostics.Contracts.Contract", "Invariant"),
    ("System.Diagnostics.Contracts.Contract", "Requires"),
];

/// Types every method of which is an assertion.
const ASSERTION_TYPES: &[&str] = &[
    "NUnit.Framework.Assert",
    "Xunit.Assert",
    "Microsoft.VisualStudio.TestTools.UnitTesting.Assert",
];

/// [`WELL_KNOWN_MEMBERS`] by owner, then member
static MEMBER_TYPES: Lazy<HashMap<&'static str, HashMap<&'static str, (&'static str, &'static str)>>> =
    Lazy::new(|| {
        let mut owners: HashMap<_, HashMap<_, _>> = HashMap::new();
        for &(owner, member, presentable, long) in WELL_KNOWN_MEMBERS {
            owners.entry(owner).or_default().insert(member, (presentable, long));
        }
        owners
    });

/// Framework name of a keyword type (`string` -> `System.String`)
pub fn keyword_type(name: &str) -> Option<&'static str> {
    KEYWORD_TYPES
        .iter()
        .find(|(keyword, _)| *keyword == name)
        .map(|(_, long)| *long)
}

/// Whether `containing.method` is an assertion or contract method
pub fn is_assertion(containing: &QualifiedName, method: &str) -> bool {
    let owner = containing.full_name();
    ASSERTION_TYPES.contains(&owner.as_str())
        || ASSERTION_METHODS
            .iter()
            .any(|(ty, name)| *ty == owner && *name == method)
}

/// Split a long type name into namespace and simple name, dropping generic
/// arguments and array suffixes.
pub fn split_qualified(long_name: &str) -> QualifiedName {
    let base = long_name
        .split('<')
        .next()
        .unwrap_or(long_name)
        .trim_end_matches("[]")
        .trim();
    match base.rfind('.') {
        Some(dot) => QualifiedName::new(&base[..dot], &base[dot + 1..]),
        None => QualifiedName::new("", base),
    }
}

/// A member declared in the solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDeclaration {
    /// Member name
    pub name: String,
    /// Member kind
    pub kind: MemberKind,
    /// Declared type or return type as written
    pub type_text: Option<String>,
    /// Parameter names in order, for methods
    pub parameters: Vec<String>,
}

/// A type declared in the solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    /// Namespace and simple name
    pub name: QualifiedName,
    /// `using` directives of the declaring file
    pub usings: Vec<String>,
    /// Declared members
    pub members: Vec<MemberDeclaration>,
    /// Parameter names of each constructor
    pub constructors: Vec<Vec<String>>,
}

impl TypeDeclaration {
    /// Empty declaration of `name`
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            usings: Vec::new(),
            members: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// First member called `name`
    pub fn member(&self, name: &str) -> Option<&MemberDeclaration> {
        self.members.iter().find(|member| member.name == name)
    }

    /// Method overload called `name` taking `arity` arguments, or any overload
    pub fn method(&self, name: &str, arity: usize) -> Option<&MemberDeclaration> {
        let overloads: Vec<&MemberDeclaration> = self
            .members
            .iter()
            .filter(|m| m.name == name && m.kind == MemberKind::Method)
            .collect();
        overloads
            .iter()
            .find(|m| m.parameters.len() == arity)
            .or_else(|| overloads.first())
            .copied()
    }

    /// Constructor taking `arity` arguments
    pub fn constructor(&self, arity: usize) -> Option<&[String]> {
        self.constructors
            .iter()
            .find(|parameters| parameters.len() == arity)
            .map(Vec::as_slice)
    }

    /// Resolution context inside the declaration
    pub fn context(&self) -> ResolutionContext {
        ResolutionContext {
            usings: self.usings.clone(),
            namespace: self.name.namespace.clone(),
            enclosing_type: Some(self.name.clone()),
        }
    }
}

/// Names visible at some point of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    /// `using` directives of the file
    pub usings: Vec<String>,
    /// Innermost enclosing namespace
    pub namespace: String,
    /// Enclosing type declaration
    pub enclosing_type: Option<QualifiedName>,
}

impl ResolutionContext {
    /// Enclosing namespaces innermost first, then the global namespace,
    /// then the `using` directives
    pub fn visible_namespaces(&self) -> Vec<String> {
        let mut namespaces = Vec::new();
        let mut current = self.namespace.as_str();
        while !current.is_empty() {
            namespaces.push(current.to_string());
            current = current.rfind('.').map(|dot| &current[..dot]).unwrap_or("");
        }
        namespaces.push(String::new());
        for using in &self.usings {
            if !namespaces.contains(using) {
                namespaces.push(using.clone());
            }
        }
        namespaces
    }
}

/// Solution-wide index of declared types.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    types: IndexMap<String, TypeDeclaration>,
}

impl SymbolIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration; partial declarations of the same type are merged
    pub fn add(&mut self, declaration: TypeDeclaration) {
        match self.types.get_mut(&declaration.name.full_name()) {
            Some(existing) => {
                existing.members.extend(declaration.members);
                existing.constructors.extend(declaration.constructors);
                for using in declaration.usings {
                    if !existing.usings.contains(&using) {
                        existing.usings.push(using);
                    }
                }
            }
            None => {
                self.types.insert(declaration.name.full_name(), declaration);
            }
        }
    }

    /// Add every declaration of `declarations`
    pub fn extend(&mut self, declarations: impl IntoIterator<Item = TypeDeclaration>) {
        for declaration in declarations {
            self.add(declaration);
        }
    }

    /// Number of declared types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Declaration by full name
    pub fn get(&self, full_name: &str) -> Option<&TypeDeclaration> {
        self.types.get(full_name)
    }

    /// Bind a type name used in code (simple or dotted) to a declaration.
    pub fn resolve_type_name(&self, name: &str, context: &ResolutionContext) -> Option<QualifiedName> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if name.contains('.') {
            return Some(split_qualified(name));
        }

        let visible = context.visible_namespaces();
        let declared: Vec<&TypeDeclaration> = self
            .types
            .values()
            .filter(|declaration| declaration.name.name == name)
            .collect();
        if let Some(found) = visible.iter().find_map(|namespace| {
            declared
                .iter()
                .find(|declaration| &declaration.name.namespace == namespace)
        }) {
            return Some(found.name.clone());
        }
        if let Some(first) = declared.first() {
            return Some(first.name.clone());
        }

        visible.iter().find_map(|namespace| {
            WELL_KNOWN_TYPES
                .iter()
                .find(|(ns, simple)| *simple == name && ns == namespace)
                .map(|(ns, simple)| QualifiedName::new(*ns, *simple))
        })
    }

    /// Resolve a type as written in a declaration, cast or `is`/`as` test.
    pub fn resolve_type(&self, written: &str, context: &ResolutionContext) -> TypeInfo {
        let written = written.split_whitespace().collect::<Vec<_>>().join(" ");
        if written.is_empty() || written == "var" || written == "dynamic" {
            return TypeInfo::Unknown;
        }

        if let Some(element) = written.strip_suffix("[]") {
            return match self.resolve_type(element, context) {
                TypeInfo::Resolved(ty) => TypeInfo::resolved(&written, format!("{}[]", ty.long_name)),
                other => other,
            };
        }
        if let Some(inner) = written.strip_suffix('?') {
            return match self.resolve_type(inner, context) {
                TypeInfo::Resolved(ty) => TypeInfo::resolved(&written, ty.long_name),
                other => other,
            };
        }
        if let Some(long) = keyword_type(&written) {
            return TypeInfo::resolved(&written, long);
        }

        if let (Some(open), true) = (written.find('<'), written.ends_with('>')) {
            let base = &written[..open];
            let Some(base) = self.resolve_type_name(base, context) else {
                return TypeInfo::Unresolved;
            };
            let mut arguments = Vec::new();
            for argument in split_generic_arguments(&written[open + 1..written.len() - 1]) {
                match self.resolve_type(argument, context) {
                    TypeInfo::Resolved(ty) => arguments.push(ty.long_name),
                    _ => return TypeInfo::Unresolved,
                }
            }
            return TypeInfo::resolved(
                &written,
                format!("{}<{}>", base.full_name(), arguments.join(",")),
            );
        }

        match self.resolve_type_name(&written, context) {
            Some(name) => TypeInfo::resolved(&written, name.full_name()),
            None => TypeInfo::Unresolved,
        }
    }

    /// Member declared on the type `owner`
    pub fn declared_member(&self, owner: &QualifiedName, member: &str) -> Option<&MemberDeclaration> {
        self.get(&owner.full_name())?.member(member)
    }

    /// Type of `owner.member`: declared in the solution or a well-known
    /// framework member.
    pub fn member_type(&self, owner: &QualifiedName, member: &str) -> TypeInfo {
        if let Some(declaration) = self.get(&owner.full_name()) {
            return match declaration.member(member).and_then(|m| m.type_text.as_deref()) {
                Some(text) => self.resolve_type(text, &declaration.context()),
                None => TypeInfo::Unknown,
            };
        }
        let owner = owner.full_name();
        MEMBER_TYPES
            .get(owner.as_str())
            .and_then(|members| members.get(member))
            .map(|&(presentable, long)| TypeInfo::resolved(presentable, long))
            .unwrap_or_default()
    }
}

/// Split `A, B<C, D>` at top-level commas.
fn split_generic_arguments(arguments: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in arguments.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(arguments[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(arguments[start..].trim());
    parts
}

/// Convenience for building a resolved [`TypeRef`] from a qualified name.
pub fn type_ref(name: &QualifiedName) -> TypeRef {
    TypeRef::new(name.name.clone(), name.full_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(usings: &[&str], namespace: &str) -> ResolutionContext {
        ResolutionContext {
            usings: usings.iter().map(|u| u.to_string()).collect(),
            namespace: namespace.to_string(),
            enclosing_type: None,
        }
    }

    fn index_with_repository() -> SymbolIndex {
        let mut declaration = TypeDeclaration::new(QualifiedName::new("Shop.Data", "Repository"));
        declaration.members.push(MemberDeclaration {
            name: "Connection".into(),
            kind: MemberKind::Property,
            type_text: Some("SqlConnection".into()),
            parameters: vec![],
        });
        declaration.usings.push("System.Data.SqlClient".into());
        let mut index = SymbolIndex::new();
        index.add(declaration);
        index
    }

    #[test]
    fn keywords_resolve_to_framework_names() {
        let index = SymbolIndex::new();
        assert_eq!(
            index.resolve_type("string", &context(&[], "")),
            TypeInfo::resolved("string", "System.String")
        );
        assert_eq!(
            index.resolve_type("int[]", &context(&[], "")),
            TypeInfo::resolved("int[]", "System.Int32[]")
        );
        assert_eq!(index.resolve_type("var", &context(&[], "")), TypeInfo::Unknown);
    }

    #[test]
    fn well_known_types_need_a_using() {
        let index = SymbolIndex::new();
        assert_eq!(
            index.resolve_type("SqlConnection", &context(&["System.Data.SqlClient"], "App")),
            TypeInfo::resolved("SqlConnection", "System.Data.SqlClient.SqlConnection")
        );
        assert_eq!(
            index.resolve_type("SqlConnection", &context(&[], "App")),
            TypeInfo::Unresolved
        );
        assert_eq!(
            index.resolve_type("Mystery", &context(&["System"], "App")),
            TypeInfo::Unresolved
        );
    }

    #[test]
    fn generic_arguments_must_all_resolve() {
        let index = SymbolIndex::new();
        let ctx = context(&["System.Collections.Generic"], "");
        assert_eq!(
            index.resolve_type("Dictionary<string, List<int>>", &ctx),
            TypeInfo::resolved(
                "Dictionary<string, List<int>>",
                "System.Collections.Generic.Dictionary<System.String,System.Collections.Generic.List<System.Int32>>"
            )
        );
        assert_eq!(index.resolve_type("List<Mystery>", &ctx), TypeInfo::Unresolved);
    }

    #[test]
    fn solution_types_resolve_from_anywhere() {
        let index = index_with_repository();
        assert_eq!(
            index.resolve_type_name("Repository", &context(&[], "Shop.Web")),
            Some(QualifiedName::new("Shop.Data", "Repository"))
        );
        assert_eq!(
            index.resolve_type("Shop.Data.Repository", &context(&[], "")),
            TypeInfo::resolved("Shop.Data.Repository", "Shop.Data.Repository")
        );
    }

    #[test]
    fn member_types_use_declaring_file_context() {
        let index = index_with_repository();
        assert_eq!(
            index.member_type(&QualifiedName::new("Shop.Data", "Repository"), "Connection"),
            TypeInfo::resolved("SqlConnection", "System.Data.SqlClient.SqlConnection")
        );
        assert_eq!(
            index.member_type(
                &QualifiedName::new("System.Data.SqlClient", "SqlConnection"),
                "CreateCommand"
            ),
            TypeInfo::resolved("SqlCommand", "System.Data.SqlClient.SqlCommand")
        );
        assert_eq!(
            index.member_type(&QualifiedName::new("System", "Console"), "Title"),
            TypeInfo::Unknown
        );
    }

    #[test]
    fn assertion_methods_are_recognised() {
        assert!(is_assertion(&QualifiedName::new("System.Diagnostics", "Debug"), "Assert"));
        assert!(is_assertion(&QualifiedName::new("NUnit.Framework", "Assert"), "AreEqual"));
        assert!(!is_assertion(&QualifiedName::new("System.Diagnostics", "Debug"), "WriteLine"));
    }

    #[test]
    fn visible_namespaces_walk_outwards() {
        let ctx = context(&["System"], "Shop.Data");
        assert_eq!(
            ctx.visible_namespaces(),
            vec!["Shop.Data", "Shop", "", "System"]
        );
        assert_eq!(
            split_qualified("System.Collections.Generic.List<System.String>"),
            QualifiedName::new("System.Collections.Generic", "List")
        );
    }
}

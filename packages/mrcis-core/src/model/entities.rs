//! Code entities: a tagged union over entity kinds (§3, §9 "Dynamic
//! per-subclass entity types"). Each variant of [`EntityAttributes`] carries
//! the extra fields a specialization needs instead of an inheritance
//! hierarchy; callers pattern-match on `CodeEntity::kind`.

use serde::{Deserialize, Serialize};

/// The kind of a named, located code element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Package,
    Class,
    Interface,
    Function,
    Method,
    Variable,
    Constant,
    Parameter,
    TypeAlias,
    Enum,
    EnumMember,
    Import,
    Export,
    Docstring,
    Comment,
    ConfigSection,
    ConfigKey,
    Table,
    Column,
    Index,
    Component,
    Element,
    Stage,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Package => "package",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::Variable => "variable",
            EntityKind::Constant => "constant",
            EntityKind::Parameter => "parameter",
            EntityKind::TypeAlias => "type_alias",
            EntityKind::Enum => "enum",
            EntityKind::EnumMember => "enum_member",
            EntityKind::Import => "import",
            EntityKind::Export => "export",
            EntityKind::Docstring => "docstring",
            EntityKind::Comment => "comment",
            EntityKind::ConfigSection => "config_section",
            EntityKind::ConfigKey => "config_key",
            EntityKind::Table => "table",
            EntityKind::Column => "column",
            EntityKind::Index => "index",
            EntityKind::Component => "component",
            EntityKind::Element => "element",
            EntityKind::Stage => "stage",
            EntityKind::Task => "task",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared accessibility of an entity. Extractors that have no visibility
/// concept (Go, config languages, …) use `Unspecified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    PackagePrivate,
    #[default]
    Unspecified,
}

/// A single function/method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_annotation: Option<String>,
    pub default_value: Option<String>,
    pub is_variadic: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_annotation: None,
            default_value: None,
            is_variadic: false,
        }
    }
}

/// Extra attributes carried by `class` entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAttributes {
    pub base_classes: Vec<String>,
    pub interfaces: Vec<String>,
    pub mixins: Vec<String>,
    pub is_abstract: bool,
    pub is_dataclass: bool,
}

/// Extra attributes carried by `function` entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAttributes {
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub is_async: bool,
    pub is_generator: bool,
    /// Deduplicated callee names (§4.F.4).
    pub calls: Vec<String>,
    pub type_references: Vec<String>,
}

impl FunctionAttributes {
    /// Add `callee` to `calls` iff it is not already present, preserving
    /// dedup so one pending reference is produced per distinct callee.
    pub fn record_call(&mut self, callee: impl Into<String>) -> bool {
        let callee = callee.into();
        if self.calls.contains(&callee) {
            false
        } else {
            self.calls.push(callee);
            true
        }
    }
}

/// Extra attributes carried by `method` entities; a method's function-like
/// fields (parameters, calls, …) live in `function`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodAttributes {
    pub function: FunctionAttributes,
    pub parent_class: String,
    pub is_static: bool,
    pub is_classmethod: bool,
    pub is_property: bool,
    pub is_constructor: bool,
    pub overrides: Option<String>,
}

/// Extra attributes carried by `import` entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAttributes {
    pub source_module: String,
    pub imported_symbols: Vec<String>,
    pub is_wildcard: bool,
    pub is_relative: bool,
    pub relative_level: u32,
    pub alias: Option<String>,
}

/// The per-variant attribute record for a [`CodeEntity`]. Kinds with no
/// specialization (module, variable, constant, …) carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityAttributes {
    None,
    Class(ClassAttributes),
    Function(FunctionAttributes),
    Method(MethodAttributes),
    Import(ImportAttributes),
}

impl Default for EntityAttributes {
    fn default() -> Self {
        EntityAttributes::None
    }
}

impl EntityAttributes {
    pub fn as_class(&self) -> Option<&ClassAttributes> {
        match self {
            EntityAttributes::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionAttributes> {
        match self {
            EntityAttributes::Function(f) => Some(f),
            EntityAttributes::Method(m) => Some(&m.function),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionAttributes> {
        match self {
            EntityAttributes::Function(f) => Some(f),
            EntityAttributes::Method(m) => Some(&mut m.function),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodAttributes> {
        match self {
            EntityAttributes::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<&ImportAttributes> {
        match self {
            EntityAttributes::Import(i) => Some(i),
            _ => None,
        }
    }
}

/// A named, located element of source code (§3 `CodeEntity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntity {
    pub id: String,
    pub repository_id: String,
    pub file_id: String,
    pub qualified_name: String,
    pub simple_name: String,
    pub kind: EntityKind,
    pub language: String,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: Option<u32>,
    pub col_end: Option<u32>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub source_text: Option<String>,
    pub visibility: Visibility,
    pub is_exported: bool,
    pub decorators: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub vector_id: Option<String>,
    #[serde(default)]
    pub attributes: EntityAttributes,
}

impl CodeEntity {
    pub fn new(
        id: impl Into<String>,
        repository_id: impl Into<String>,
        file_id: impl Into<String>,
        qualified_name: impl Into<String>,
        simple_name: impl Into<String>,
        kind: EntityKind,
        language: impl Into<String>,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        Self {
            id: id.into(),
            repository_id: repository_id.into(),
            file_id: file_id.into(),
            qualified_name: qualified_name.into(),
            simple_name: simple_name.into(),
            kind,
            language: language.into(),
            line_start,
            line_end,
            col_start: None,
            col_end: None,
            signature: None,
            docstring: None,
            source_text: None,
            visibility: Visibility::Unspecified,
            is_exported: false,
            decorators: Vec::new(),
            metadata: serde_json::Value::Null,
            vector_id: None,
            attributes: EntityAttributes::None,
        }
    }

    pub fn with_columns(mut self, col_start: u32, col_end: u32) -> Self {
        self.col_start = Some(col_start);
        self.col_end = Some(col_end);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_source_text(mut self, source_text: impl Into<String>) -> Self {
        self.source_text = Some(source_text.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_exported(mut self, is_exported: bool) -> Self {
        self.is_exported = is_exported;
        self
    }

    pub fn with_decorators(mut self, decorators: Vec<String>) -> Self {
        self.decorators = decorators;
        self
    }

    pub fn with_attributes(mut self, attributes: EntityAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Compose the embedding text for this entity (§4.H.5):
    /// `"<kind>: <qualified_name>\n[Signature: ..\n][Description: ..\n][Code:\n..]"`.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![format!("{}: {}", self.kind, self.qualified_name)];
        if let Some(sig) = &self.signature {
            parts.push(format!("Signature: {sig}"));
        }
        if let Some(doc) = &self.docstring {
            parts.push(format!("Description: {doc}"));
        }
        if let Some(src) = &self.source_text {
            let truncated: String = src.chars().take(2000).collect();
            parts.push(format!("Code:\n{truncated}"));
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_text_skips_absent_fields() {
        let e = CodeEntity::new(
            "e1", "r1", "f1", "pkg.foo", "foo", EntityKind::Function, "python", 1, 2,
        );
        assert_eq!(e.embedding_text(), "function: pkg.foo");
    }

    #[test]
    fn embedding_text_includes_present_fields() {
        let e = CodeEntity::new(
            "e1", "r1", "f1", "pkg.foo", "foo", EntityKind::Function, "python", 1, 2,
        )
        .with_signature("def foo(x)")
        .with_docstring("does a thing")
        .with_source_text("def foo(x):\n    return x");
        let text = e.embedding_text();
        assert!(text.starts_with("function: pkg.foo\n"));
        assert!(text.contains("Signature: def foo(x)"));
        assert!(text.contains("Description: does a thing"));
        assert!(text.contains("Code:\ndef foo(x):"));
    }

    #[test]
    fn embedding_text_truncates_source_to_2000_chars() {
        let long_source = "x".repeat(5000);
        let e = CodeEntity::new(
            "e1", "r1", "f1", "pkg.foo", "foo", EntityKind::Function, "python", 1, 2,
        )
        .with_source_text(long_source);
        let text = e.embedding_text();
        let code_section = text.split("Code:\n").nth(1).unwrap();
        assert_eq!(code_section.chars().count(), 2000);
    }

    #[test]
    fn dedup_calls_skips_repeats() {
        let mut attrs = FunctionAttributes::default();
        assert!(attrs.record_call("helper"));
        assert!(!attrs.record_call("helper"));
        assert!(attrs.record_call("other"));
        assert_eq!(attrs.calls, vec!["helper".to_string(), "other".to_string()]);
    }
}

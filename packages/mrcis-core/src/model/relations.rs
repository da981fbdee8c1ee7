//! Directed edges between code entities (§3 `CodeRelation`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Contains,
    DefinedIn,
    Extends,
    Implements,
    Overrides,
    Imports,
    Exports,
    DependsOn,
    Calls,
    Instantiates,
    UsesType,
    References,
    HasParameter,
    Returns,
    DecoratedBy,
    Documents,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Contains => "contains",
            RelationType::DefinedIn => "defined_in",
            RelationType::Extends => "extends",
            RelationType::Implements => "implements",
            RelationType::Overrides => "overrides",
            RelationType::Imports => "imports",
            RelationType::Exports => "exports",
            RelationType::DependsOn => "depends_on",
            RelationType::Calls => "calls",
            RelationType::Instantiates => "instantiates",
            RelationType::UsesType => "uses_type",
            RelationType::References => "references",
            RelationType::HasParameter => "has_parameter",
            RelationType::Returns => "returns",
            RelationType::DecoratedBy => "decorated_by",
            RelationType::Documents => "documents",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Pending,
    Unresolved,
}

/// A directed edge between two entities, possibly still unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRelation {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: Option<String>,
    pub target_qualified_name: String,
    pub relation_type: RelationType,
    pub line_number: Option<u32>,
    pub context_snippet: Option<String>,
    pub weight: f64,
    pub is_cross_repository: bool,
    pub resolution_status: ResolutionStatus,
}

impl CodeRelation {
    pub fn resolved(
        id: impl Into<String>,
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
        target_qualified_name: impl Into<String>,
        relation_type: RelationType,
        is_cross_repository: bool,
    ) -> Self {
        Self {
            id: id.into(),
            source_entity_id: source_entity_id.into(),
            target_entity_id: Some(target_entity_id.into()),
            target_qualified_name: target_qualified_name.into(),
            relation_type,
            line_number: None,
            context_snippet: None,
            weight: 1.0,
            is_cross_repository,
            resolution_status: ResolutionStatus::Resolved,
        }
    }

    pub fn with_line(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_snippet = Some(context.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

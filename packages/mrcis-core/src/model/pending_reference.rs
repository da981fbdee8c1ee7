//! Textual references awaiting resolution into concrete edges (§3
//! `PendingReference`, §4.J).

use serde::{Deserialize, Serialize};

use super::relations::RelationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Pending,
    Resolved,
    Unresolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReference {
    pub id: String,
    pub source_entity_id: String,
    pub source_qualified_name: String,
    pub source_repository_id: String,
    pub target_qualified_name: String,
    pub relation_type: RelationType,
    pub line_number: u32,
    /// Textual prefix before a method-call dot, e.g. `obj` in `obj.method()`
    /// (chained: `a.b` in `a.b.c()`). Absent for `self`/`this` calls, which
    /// are resolved to `<Parent>.method` at extraction time instead.
    pub receiver_expr: Option<String>,
    pub context_snippet: Option<String>,
    pub status: ReferenceStatus,
    pub attempts: u32,
    pub resolved_target_id: Option<String>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PendingReference {
    pub fn new(
        id: impl Into<String>,
        source_entity_id: impl Into<String>,
        source_qualified_name: impl Into<String>,
        source_repository_id: impl Into<String>,
        target_qualified_name: impl Into<String>,
        relation_type: RelationType,
        line_number: u32,
    ) -> Self {
        Self {
            id: id.into(),
            source_entity_id: source_entity_id.into(),
            source_qualified_name: source_qualified_name.into(),
            source_repository_id: source_repository_id.into(),
            target_qualified_name: target_qualified_name.into(),
            relation_type,
            line_number,
            receiver_expr: None,
            context_snippet: None,
            status: ReferenceStatus::Pending,
            attempts: 0,
            resolved_target_id: None,
            resolved_at: None,
        }
    }

    pub fn with_receiver(mut self, receiver_expr: impl Into<String>) -> Self {
        self.receiver_expr = Some(receiver_expr.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_snippet = Some(context.into());
        self
    }
}

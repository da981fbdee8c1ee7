//! The immutable input/output pair passed through an [`super::Extractor`]
//! (§4.F: "A context carries `(file_path, file_id, repository_id,
//! language?, source_bytes?)` and is immutable").

use crate::model::{CodeEntity, CodeRelation, PendingReference};

#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub file_path: String,
    pub file_id: String,
    pub repository_id: String,
    pub language: Option<String>,
    pub source_bytes: Vec<u8>,
}

impl ExtractionContext {
    pub fn new(
        file_path: impl Into<String>,
        file_id: impl Into<String>,
        repository_id: impl Into<String>,
        source_bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_id: file_id.into(),
            repository_id: repository_id.into(),
            language: None,
            source_bytes,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn source_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.source_bytes)
    }

    /// The file path's stem relative to the repository root, dot-joined,
    /// used as the leading module segment of every qualified name (§4.F.2).
    pub fn module_segment(&self) -> String {
        let without_ext = self
            .file_path
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.file_path);
        without_ext.replace(['/', '\\'], ".")
    }
}

/// Output of one extractor invocation (§4.F.8).
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub file_id: String,
    pub file_path: String,
    pub repository_id: String,
    pub language: String,
    pub entities: Vec<CodeEntity>,
    pub relations: Vec<CodeRelation>,
    pub pending_references: Vec<PendingReference>,
    pub parse_errors: Vec<String>,
    pub extraction_time_ms: u64,
}

impl ExtractionResult {
    pub fn empty(ctx: &ExtractionContext, language: impl Into<String>) -> Self {
        Self {
            file_id: ctx.file_id.clone(),
            file_path: ctx.file_path.clone(),
            repository_id: ctx.repository_id.clone(),
            language: language.into(),
            ..Default::default()
        }
    }
}

//! The unknown-language fallback (§4.E (iii)): always matches, always
//! empty.

use std::path::Path;

use super::{ExtractionContext, ExtractionResult, Extractor};

pub struct UnknownExtractor;

pub static UNKNOWN: UnknownExtractor = UnknownExtractor;

impl Extractor for UnknownExtractor {
    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        ExtractionResult::empty(ctx, "unknown")
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn language_name(&self) -> &'static str {
        "unknown"
    }
}

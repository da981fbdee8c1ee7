//! Helpers shared by every language extractor: qualified-name joining,
//! receiver-expression disambiguation, noise-call filtering, and
//! instantiation detection (§4.F.2, §4.F.5, §4.F.6).

use sha2::{Digest, Sha256};

/// A deterministic id for an entity, stable across re-extractions of the
/// same file as long as its kind and qualified name don't change (§4.F.2
/// "a stable id"). Re-indexing the same unchanged symbol must not churn
/// downstream vector rows.
pub fn stable_entity_id(file_id: &str, kind: &str, qualified_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_id.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_bytes());
    hasher.update(b"|");
    hasher.update(qualified_name.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A per-reference id; references aren't deduplicated across extraction
/// runs the way entities are; the state store replaces the file's whole
/// pending-reference set on each indexing pass (§4.H.2).
pub fn new_reference_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identifiers treated as library noise and never turned into a pending
/// `calls` reference (§4.F.5).
const NOISE_CALLS: &[&str] = &[
    "console.log",
    "console.error",
    "console.warn",
    "println",
    "print",
    "printf",
    "puts",
    "p",
    "listOf",
    "mapOf",
    "setOf",
    "fmt.Println",
    "fmt.Printf",
];

pub fn is_noise_call(callee: &str) -> bool {
    NOISE_CALLS.contains(&callee)
}

/// `<module>.<parent_chain>.<simple_name>`, skipping a parent segment
/// that duplicates the module segment already (§4.F.2). `separator` is
/// `:` for Rake, `.` for everything else.
pub fn join_qualified_name(module: &str, parent_chain: &[String], simple_name: &str, separator: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    if !module.is_empty() {
        segments.push(module);
    }
    for parent in parent_chain {
        if segments.last().map(|s| *s) != Some(parent.as_str()) {
            segments.push(parent.as_str());
        }
    }
    segments.push(simple_name);
    segments.join(separator)
}

/// Splits a chained call receiver `a.b.c` into `("a.b", "c")`. Returns
/// `None` for an unqualified call (no receiver).
pub fn split_receiver(callee_expr: &str) -> Option<(String, String)> {
    let (receiver, method) = callee_expr.rsplit_once('.')?;
    if receiver.is_empty() || method.is_empty() {
        return None;
    }
    Some((receiver.to_string(), method.to_string()))
}

/// True for `self`/`this`-qualified receivers, which resolve to
/// `<Parent>.method` at extraction time rather than becoming a pending
/// reference with `receiver_expr` set (§4.F.5).
pub fn is_self_receiver(receiver: &str) -> bool {
    matches!(receiver, "self" | "this" | "Self")
}

/// A callee discovered during a function-body walk, carrying whether it
/// was already resolved from a self/this receiver (§4.F.5). `push_call`
/// must not re-derive a receiver by splitting `callee` for these: it has
/// already been rewritten to `<Parent>.method` and splitting it again
/// would spuriously produce `receiver_expr = Some("<Parent>")` for what
/// is actually a self-call.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub callee: String,
    pub self_resolved: bool,
}

impl CallSite {
    fn unresolved(callee: String) -> Self {
        Self { callee, self_resolved: false }
    }

    fn self_resolved(callee: String) -> Self {
        Self { callee, self_resolved: true }
    }
}

/// Classifies one raw callee expression found at a call/new-expression
/// site (§4.F.5, §4.F.6): a `self`/`this` receiver resolves immediately
/// to `<Parent>.method`; noise calls (`console.log`, `print`, ...) are
/// dropped; everything else is returned unresolved, receiver
/// disambiguation deferred to `push_call` time. `enclosing_qualified` is
/// the qualified name of the function/method whose body is being walked.
pub fn classify_call_site(callee_expr: &str, enclosing_qualified: &str) -> Option<CallSite> {
    if let Some((receiver, method)) = split_receiver(callee_expr) {
        if is_self_receiver(&receiver) {
            let parent = enclosing_qualified.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
            return Some(CallSite::self_resolved(format!("{parent}.{method}")));
        }
    }
    if is_noise_call(callee_expr) {
        return None;
    }
    Some(CallSite::unresolved(callee_expr.to_string()))
}

/// Dedups a list of call sites by callee, preserving first occurrence
/// (matching `FunctionAttributes::record_call`'s order guarantee).
pub fn dedup_call_sites(sites: Vec<CallSite>) -> Vec<CallSite> {
    let mut out: Vec<CallSite> = Vec::new();
    for site in sites {
        if !out.iter().any(|s| s.callee == site.callee) {
            out.push(site);
        }
    }
    out
}

/// A `new X()` / capitalized-callee call is an instantiation, not a
/// plain call (§4.F.6).
pub fn is_instantiation(callee_simple_name: &str) -> bool {
    callee_simple_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_skips_duplicate_parent_segment() {
        let qn = join_qualified_name("pkg.mod", &["pkg.mod".to_string(), "Foo".to_string()], "bar", ".");
        assert_eq!(qn, "pkg.mod.Foo.bar");
    }

    #[test]
    fn split_receiver_handles_chained_access() {
        assert_eq!(
            split_receiver("a.b.c"),
            Some(("a.b".to_string(), "c".to_string()))
        );
        assert_eq!(split_receiver("obj"), None);
    }

    #[test]
    fn noise_calls_are_filtered() {
        assert!(is_noise_call("console.log"));
        assert!(!is_noise_call("myFunction"));
    }

    #[test]
    fn self_receiver_call_site_is_marked_resolved() {
        let site = classify_call_site("self.baz", "mod.Foo.bar").unwrap();
        assert_eq!(site.callee, "mod.Foo.baz");
        assert!(site.self_resolved);
    }

    #[test]
    fn plain_receiver_call_site_is_left_unresolved() {
        let site = classify_call_site("ctx.redis.get", "mod.Foo.bar").unwrap();
        assert_eq!(site.callee, "ctx.redis.get");
        assert!(!site.self_resolved);
    }

    #[test]
    fn dedup_call_sites_keeps_first_occurrence() {
        let sites = vec![CallSite::unresolved("a".to_string()), CallSite::self_resolved("a".to_string())];
        let deduped = dedup_call_sites(sites);
        assert_eq!(deduped.len(), 1);
        assert!(!deduped[0].self_resolved);
    }
}

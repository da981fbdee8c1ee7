//! Rust extractor (§4.F table row 5): modules, structs, enums, traits
//! (as abstract classes), functions, impls (as methods), use statements
//! with alias/glob handling.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, join_qualified_name, new_reference_id, split_receiver, stable_entity_id, CallSite};
use super::Extractor;

pub struct RustExtractor;

impl Extractor for RustExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("rs")
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "rust");

        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_rust::language()).is_err() {
            result.parse_errors.push("failed to initialize rust grammar".to_string());
            return result;
        }
        let tree = match parser.parse(&ctx.source_bytes, None) {
            Some(t) => t,
            None => {
                result.parse_errors.push("rust parse failed".to_string());
                return result;
            }
        };

        let module = ctx.module_segment();
        let mut walker = Walker { ctx, module: &module, result: &mut result };
        walker.visit_block(tree.root_node(), &[]);

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn language_name(&self) -> &'static str {
        "rust"
    }
}

struct Walker<'a> {
    ctx: &'a ExtractionContext,
    module: &'a str,
    result: &'a mut ExtractionResult,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(&self.ctx.source_bytes).unwrap_or("").to_string()
    }

    fn visit_block(&mut self, node: Node, parent_chain: &[String]) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_item(child, parent_chain);
        }
    }

    fn visit_item(&mut self, node: Node, parent_chain: &[String]) {
        match node.kind() {
            "mod_item" => self.visit_mod(node, parent_chain),
            "struct_item" => self.visit_struct(node, parent_chain),
            "enum_item" => self.visit_enum(node, parent_chain),
            "trait_item" => self.visit_trait(node, parent_chain),
            "function_item" => self.visit_function(node, parent_chain),
            "impl_item" => self.visit_impl(node, parent_chain),
            "use_declaration" => self.visit_use(node, parent_chain),
            _ => {}
        }
    }

    fn visit_mod(&mut self, node: Node, parent_chain: &[String]) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let id = stable_entity_id(&self.ctx.file_id, "module", &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            simple_name.clone(),
            EntityKind::Module,
            "rust",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        );
        self.result.entities.push(entity);

        if let Some(body) = node.child_by_field_name("body") {
            let mut child_chain = parent_chain.to_vec();
            child_chain.push(simple_name);
            self.visit_block(body, &child_chain);
        }
    }

    fn visit_struct(&mut self, node: Node, parent_chain: &[String]) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let id = stable_entity_id(&self.ctx.file_id, "class", &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            simple_name,
            EntityKind::Class,
            "rust",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        )
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Class(ClassAttributes::default()));
        self.result.entities.push(entity);
    }

    fn visit_enum(&mut self, node: Node, parent_chain: &[String]) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let id = stable_entity_id(&self.ctx.file_id, "enum", &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            EntityKind::Enum,
            "rust",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        )
        .with_source_text(self.text(node));
        self.result.entities.push(entity);

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for variant in body.children(&mut cursor).filter(|c| c.kind() == "enum_variant") {
                if let Some(vn) = variant.child_by_field_name("name") {
                    let vname = self.text(vn);
                    let vqn = join_qualified_name(self.module, &[simple_name.clone()], &vname, ".");
                    let vid = stable_entity_id(&self.ctx.file_id, "enum_member", &vqn);
                    let ventity = CodeEntity::new(
                        vid,
                        self.ctx.repository_id.clone(),
                        self.ctx.file_id.clone(),
                        vqn,
                        vname,
                        EntityKind::EnumMember,
                        "rust",
                        variant.start_position().row as u32 + 1,
                        variant.end_position().row as u32 + 1,
                    );
                    self.result.entities.push(ventity);
                }
            }
        }
    }

    fn visit_trait(&mut self, node: Node, parent_chain: &[String]) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let id = stable_entity_id(&self.ctx.file_id, "class", &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            simple_name,
            EntityKind::Class,
            "rust",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        )
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Class(ClassAttributes {
            is_abstract: true,
            ..Default::default()
        }));
        self.result.entities.push(entity);
    }

    fn visit_function(&mut self, node: Node, parent_chain: &[String]) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let id = stable_entity_id(&self.ctx.file_id, "function", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name,
            EntityKind::Function,
            "rust",
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Function(attrs.clone()));
        self.result.entities.push(entity);
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn visit_impl(&mut self, node: Node, parent_chain: &[String]) {
        let target_type = node
            .child_by_field_name("type")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let parent_qualified = join_qualified_name(self.module, parent_chain, &target_type, ".");

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.children(&mut cursor).filter(|c| c.kind() == "function_item") {
                self.visit_method(item, parent_chain, &target_type, &parent_qualified);
            }
        }
    }

    fn visit_method(&mut self, node: Node, parent_chain: &[String], parent_type: &str, parent_qualified: &str) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, &[parent_chain, std::slice::from_ref(&parent_type.to_string())].concat(), &simple_name, ".");
        let (func_attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);
        let is_constructor = simple_name == "new";

        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name,
            EntityKind::Method,
            "rust",
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Method(MethodAttributes {
            function: func_attrs.clone(),
            parent_class: parent_qualified.to_string(),
            is_static: func_attrs.parameters.first().map(|p| p.name != "self").unwrap_or(true),
            is_classmethod: false,
            is_property: false,
            is_constructor,
            overrides: None,
        }));
        self.result.entities.push(entity);
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn build_function_attrs(&self, node: Node, qualified_name: &str) -> (FunctionAttributes, Vec<CallSite>, u32, u32, String) {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;
        let is_async = self.text(node).trim_start().starts_with("async ") || self.text(node).contains("pub async fn");

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for p in params.children(&mut cursor) {
                match p.kind() {
                    "self_parameter" => parameters.push(Parameter::new("self")),
                    "parameter" => {
                        if let Some(pattern) = p.child_by_field_name("pattern") {
                            let mut param = Parameter::new(self.text(pattern));
                            if let Some(ty) = p.child_by_field_name("type") {
                                param.type_annotation = Some(self.text(ty));
                            }
                            parameters.push(param);
                        }
                    }
                    _ => {}
                }
            }
        }
        let return_type = node.child_by_field_name("return_type").map(|n| self.text(n));

        let mut calls = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &mut calls, qualified_name);
        }

        let signature = format!(
            "({}){}",
            parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(", "),
            return_type.as_ref().map(|t| format!(" -> {t}")).unwrap_or_default()
        );

        let call_sites = dedup_call_sites(calls);
        let mut attrs = FunctionAttributes {
            parameters,
            return_type,
            is_async,
            is_generator: false,
            calls: Vec::new(),
            type_references: Vec::new(),
        };
        for site in &call_sites {
            attrs.record_call(site.callee.clone());
        }
        (attrs, call_sites, line_start, line_end, signature)
    }

    /// Walk a function body collecting call expressions (§4.F.5, §4.F.6).
    /// Self receivers resolve immediately to `<Parent>.method` and are
    /// marked so `push_call` never re-derives a receiver from them.
    fn collect_calls(&self, node: Node, calls: &mut Vec<CallSite>, enclosing_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "call_expression" => {
                    if let Some(func) = child.child_by_field_name("function") {
                        let callee_expr = self.text(func);
                        if let Some(site) = classify_call_site(&callee_expr, enclosing_qualified) {
                            calls.push(site);
                        }
                    }
                }
                _ => {}
            }
            self.collect_calls(child, calls, enclosing_qualified);
        }
    }

    /// Like `push_pending`, but for a call/instantiation site: receiver
    /// disambiguation only applies when `site` wasn't already resolved
    /// from a self receiver (§4.F.5).
    fn push_call(&mut self, source_entity_id: &str, source_qualified_name: &str, site: &CallSite, line: u32) {
        let simple = site.callee.rsplit("::").next().unwrap_or(&site.callee);
        let relation_type = if is_instantiation(simple) { RelationType::Instantiates } else { RelationType::Calls };
        let mut reference = PendingReference::new(
            new_reference_id(),
            source_entity_id,
            source_qualified_name,
            &self.ctx.repository_id,
            &site.callee,
            relation_type,
            line,
        );
        if !site.self_resolved {
            if let Some((receiver, _)) = split_receiver(&site.callee) {
                reference = reference.with_receiver(receiver);
            }
        }
        self.result.pending_references.push(reference);
    }

    fn visit_use(&mut self, node: Node, parent_chain: &[String]) {
        let line_start = node.start_position().row as u32 + 1;
        let enclosing = join_qualified_name(self.module, parent_chain, "<module>", ".");
        let argument = match node.child_by_field_name("argument") {
            Some(a) => a,
            None => return,
        };
        let mut targets = Vec::new();
        let mut is_wildcard = false;
        collect_use_targets(&self.text(argument), &mut targets, &mut is_wildcard);

        for target in targets {
            let id = stable_entity_id(&self.ctx.file_id, "import", &format!("{target}@{line_start}"));
            let entity = CodeEntity::new(
                id.clone(),
                self.ctx.repository_id.clone(),
                self.ctx.file_id.clone(),
                format!("{target}@{line_start}"),
                target.clone(),
                EntityKind::Import,
                "rust",
                line_start,
                line_start,
            )
            .with_attributes(EntityAttributes::Import(ImportAttributes {
                source_module: target.clone(),
                imported_symbols: Vec::new(),
                is_wildcard,
                is_relative: false,
                relative_level: 0,
                alias: None,
            }));
            self.result.entities.push(entity);
            if !is_wildcard {
                self.push_pending(&id, &enclosing, &target, RelationType::Imports, line_start);
            }
        }
    }

    fn push_pending(&mut self, source_entity_id: &str, source_qualified_name: &str, target: &str, relation_type: RelationType, line: u32) {
        let reference = PendingReference::new(
            new_reference_id(),
            source_entity_id,
            source_qualified_name,
            &self.ctx.repository_id,
            target,
            relation_type,
            line,
        );
        self.result.pending_references.push(reference);
    }
}

/// Expands a `use` argument's textual form into flat `a::b::c` targets,
/// handling `{}` groups, `as` aliases (kept as the original path) and a
/// trailing `*` glob.
fn collect_use_targets(text: &str, out: &mut Vec<String>, is_wildcard: &mut bool) {
    let text = text.trim();
    if let Some(stripped) = text.strip_suffix("::*") {
        *is_wildcard = true;
        out.push(stripped.to_string());
        return;
    }
    if let Some(brace) = text.find('{') {
        let prefix = text[..brace].trim_end_matches("::");
        let inner = &text[brace + 1..text.rfind('}').unwrap_or(text.len())];
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let leaf = part.split_whitespace().next().unwrap_or(part);
            out.push(format!("{prefix}::{leaf}"));
        }
        return;
    }
    let leaf = text.split_whitespace().next().unwrap_or(text);
    out.push(leaf.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_struct_impl_method_and_use() {
        let source = "use std::collections::HashMap;\n\nstruct Cache;\n\nimpl Cache {\n    fn new() -> Self {\n        helper()\n    }\n}\n\nfn helper() {}\n";
        let ctx = ExtractionContext::new("src/cache.rs", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = RustExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.simple_name == "Cache" && e.kind == EntityKind::Class));
        assert!(result.entities.iter().any(|e| e.simple_name == "new" && e.kind == EntityKind::Method));
        assert!(result
            .entities
            .iter()
            .any(|e| e.kind == EntityKind::Import && e.qualified_name.starts_with("std::collections::HashMap")));
    }
}

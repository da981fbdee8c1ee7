//! Kotlin extractor (§4.F table row 8): classes, objects, functions,
//! methods, imports.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, join_qualified_name, new_reference_id, split_receiver, stable_entity_id, CallSite};
use super::Extractor;

pub struct KotlinExtractor;

impl Extractor for KotlinExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("kt")
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "kotlin");
        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_kotlin::language()).is_err() {
            result.parse_errors.push("failed to initialize kotlin grammar".to_string());
            return result;
        }
        let tree = match parser.parse(&ctx.source_bytes, None) {
            Some(t) => t,
            None => {
                result.parse_errors.push("kotlin parse failed".to_string());
                return result;
            }
        };
        let module = ctx.module_segment();
        let mut walker = Walker { ctx, module: &module, result: &mut result };
        walker.visit(tree.root_node(), &[]);
        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["kt"]
    }

    fn language_name(&self) -> &'static str {
        "kotlin"
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

    fn visit(&mut self, node: Node, parent_chain: &[String]) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "import_header" => self.visit_import(child),
                "class_declaration" => self.visit_class(child, parent_chain),
                "object_declaration" => self.visit_class(child, parent_chain),
                "function_declaration" => self.visit_function(child, parent_chain),
                _ => {}
            }
        }
    }

    fn visit_import(&mut self, node: Node) {
        let line = node.start_position().row as u32 + 1;
        let identifier = node.child(1).map(|n| self.text(n)).unwrap_or_default();
        let is_wildcard = identifier.ends_with('*');
        let id = stable_entity_id(&self.ctx.file_id, "import", &format!("{identifier}@{line}"));
        self.result.entities.push(
            CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), format!("{identifier}@{line}"), identifier.clone(), EntityKind::Import, "kotlin", line, line)
                .with_attributes(EntityAttributes::Import(ImportAttributes {
                    source_module: identifier.clone(),
                    imported_symbols: Vec::new(),
                    is_wildcard,
                    is_relative: false,
                    relative_level: 0,
                    alias: None,
                })),
        );
        if !is_wildcard {
            self.push_pending(&id, self.module, &identifier, RelationType::Imports, line);
        }
    }

    fn visit_class(&mut self, node: Node, parent_chain: &[String]) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let is_interface = self.text(node).trim_start().starts_with("interface");
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");

        let mut supertypes = Vec::new();
        if let Some(delegation) = find_child(node, "delegation_specifiers") {
            let mut cursor = delegation.walk();
            for spec in delegation.children(&mut cursor).filter(|c| c.kind() != ",") {
                supertypes.push(self.text(spec));
            }
        }

        let kind = if is_interface { EntityKind::Interface } else { EntityKind::Class };
        let id = stable_entity_id(&self.ctx.file_id, kind.as_str(), &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            kind,
            "kotlin",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        )
        .with_source_text(self.text(node))
        .with_attributes(if kind == EntityKind::Class {
            EntityAttributes::Class(ClassAttributes { base_classes: supertypes.clone(), interfaces: Vec::new(), mixins: Vec::new(), is_abstract: false, is_dataclass: self.text(node).contains("data class") })
        } else {
            EntityAttributes::None
        });
        self.result.entities.push(entity);

        for supertype in &supertypes {
            self.push_pending(&id, &qualified_name, supertype, RelationType::Extends, node.start_position().row as u32 + 1);
        }

        let mut child_chain = parent_chain.to_vec();
        child_chain.push(simple_name);
        if let Some(body) = find_child(node, "class_body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "function_declaration" => self.visit_method(member, &child_chain, &qualified_name),
                    "class_declaration" | "object_declaration" => self.visit_class(member, &child_chain),
                    _ => {}
                }
            }
        }
    }

    fn visit_method(&mut self, node: Node, parent_chain: &[String], parent_qualified: &str) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        let entity = CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), qualified_name.clone(), simple_name, EntityKind::Method, "kotlin", line_start, line_end)
            .with_signature(signature)
            .with_source_text(self.text(node))
            .with_attributes(EntityAttributes::Method(MethodAttributes {
                function: attrs.clone(),
                parent_class: parent_qualified.to_string(),
                is_static: false,
                is_classmethod: false,
                is_property: false,
                is_constructor: false,
                overrides: None,
            }));
        self.result.entities.push(entity);
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
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
        let entity = CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), qualified_name.clone(), simple_name, EntityKind::Function, "kotlin", line_start, line_end)
            .with_signature(signature)
            .with_source_text(self.text(node))
            .with_attributes(EntityAttributes::Function(attrs.clone()));
        self.result.entities.push(entity);
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn build_function_attrs(&self, node: Node, qualified_name: &str) -> (FunctionAttributes, Vec<CallSite>, u32, u32, String) {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;
        let mut parameters = Vec::new();
        if let Some(params) = find_child(node, "function_value_parameters") {
            let mut cursor = params.walk();
            for p in params.children(&mut cursor).filter(|c| c.kind() == "parameter") {
                if let Some(name_node) = p.child_by_field_name("name") {
                    let mut param = Parameter::new(self.text(name_node));
                    if let Some(ty) = p.child_by_field_name("type") {
                        param.type_annotation = Some(self.text(ty));
                    }
                    parameters.push(param);
                }
            }
        }
        let return_type = node.child_by_field_name("type").map(|n| self.text(n));
        let mut calls = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &mut calls, qualified_name);
        }
        let signature = format!(
            "({}){}",
            parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(", "),
            return_type.as_ref().map(|t| format!(": {t}")).unwrap_or_default()
        );
        let call_sites = dedup_call_sites(calls);
        let mut attrs = FunctionAttributes { parameters, return_type, is_async: false, is_generator: false, calls: Vec::new(), type_references: Vec::new() };
        for site in &call_sites {
            attrs.record_call(site.callee.clone());
        }
        (attrs, call_sites, line_start, line_end, signature)
    }

    /// Walk a function body collecting call expressions (§4.F.5, §4.F.6).
    /// Self/this receivers resolve immediately to `<Parent>.method` and
    /// are marked so `push_call` never re-derives a receiver from them.
    fn collect_calls(&self, node: Node, calls: &mut Vec<CallSite>, enclosing_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "call_expression" {
                if let Some(func) = child.child(0) {
                    let callee_expr = self.text(func);
                    if let Some(site) = classify_call_site(&callee_expr, enclosing_qualified) {
                        calls.push(site);
                    }
                }
            }
            self.collect_calls(child, calls, enclosing_qualified);
        }
    }

    /// Like `push_pending`, but for a call/instantiation site: receiver
    /// disambiguation only applies when `site` wasn't already resolved
    /// from a self/this receiver (§4.F.5).
    fn push_call(&mut self, source_entity_id: &str, source_qualified_name: &str, site: &CallSite, line: u32) {
        let simple = site.callee.rsplit('.').next().unwrap_or(&site.callee);
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

    fn push_pending(&mut self, source_entity_id: &str, source_qualified_name: &str, target: &str, relation_type: RelationType, line: u32) {
        self.result.pending_references.push(PendingReference::new(
            new_reference_id(),
            source_entity_id,
            source_qualified_name,
            &self.ctx.repository_id,
            target,
            relation_type,
            line,
        ));
    }
}

fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_and_function() {
        let source = "class Widget : Base() {\n  fun draw() {\n    helper()\n  }\n}\n\nfun helper() {}\n";
        let ctx = ExtractionContext::new("src/Widget.kt", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = KotlinExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.simple_name == "Widget" && e.kind == EntityKind::Class));
        assert!(result.entities.iter().any(|e| e.simple_name == "draw" && e.kind == EntityKind::Method));
    }

    #[test]
    fn self_call_resolves_without_receiver_and_plain_call_keeps_receiver() {
        let source = "class Service {\n  fun run() {\n    this.helper()\n    ctx.redis.get()\n  }\n  fun helper() {}\n}\n";
        let ctx = ExtractionContext::new("src/Service.kt", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = KotlinExtractor.extract(&ctx);

        let self_call = result
            .pending_references
            .iter()
            .find(|r| r.target_qualified_name == "Service.helper")
            .expect("self call resolved to Service.helper");
        assert_eq!(self_call.receiver_expr, None);

        let plain_call = result
            .pending_references
            .iter()
            .find(|r| r.target_qualified_name == "ctx.redis.get")
            .expect("plain call kept as ctx.redis.get");
        assert_eq!(plain_call.receiver_expr.as_deref(), Some("ctx.redis"));
    }
}

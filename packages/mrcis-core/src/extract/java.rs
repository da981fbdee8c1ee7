//! Java extractor (§4.F table row 7): packages, classes, interfaces,
//! methods, imports.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType, Visibility,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, join_qualified_name, new_reference_id, split_receiver, stable_entity_id, CallSite};
use super::Extractor;

pub struct JavaExtractor;

impl Extractor for JavaExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("java")
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "java");
        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_java::language()).is_err() {
            result.parse_errors.push("failed to initialize java grammar".to_string());
            return result;
        }
        let tree = match parser.parse(&ctx.source_bytes, None) {
            Some(t) => t,
            None => {
                result.parse_errors.push("java parse failed".to_string());
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
        &["java"]
    }

    fn language_name(&self) -> &'static str {
        "java"
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
                "package_declaration" => self.visit_package(child),
                "import_declaration" => self.visit_import(child),
                "class_declaration" => self.visit_class(child, parent_chain, EntityKind::Class),
                "interface_declaration" => self.visit_class(child, parent_chain, EntityKind::Interface),
                _ => {}
            }
        }
    }

    fn visit_package(&mut self, node: Node) {
        let name = node.child_by_field_name("name").map(|n| self.text(n)).unwrap_or_default();
        let id = stable_entity_id(&self.ctx.file_id, "package", &name);
        self.result.entities.push(CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            name.clone(),
            name,
            EntityKind::Package,
            "java",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        ));
    }

    fn visit_import(&mut self, node: Node) {
        let line = node.start_position().row as u32 + 1;
        let name = node.child_by_field_name("name").map(|n| self.text(n)).unwrap_or_default();
        let id = stable_entity_id(&self.ctx.file_id, "import", &format!("{name}@{line}"));
        self.result.entities.push(
            CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), format!("{name}@{line}"), name.clone(), EntityKind::Import, "java", line, line)
                .with_attributes(EntityAttributes::Import(ImportAttributes {
                    source_module: name.clone(),
                    imported_symbols: Vec::new(),
                    is_wildcard: name.ends_with('*'),
                    is_relative: false,
                    relative_level: 0,
                    alias: None,
                })),
        );
        if !name.ends_with('*') {
            self.push_pending(&id, self.module, &name, RelationType::Imports, line);
        }
    }

    fn visit_class(&mut self, node: Node, parent_chain: &[String], kind: EntityKind) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");

        let mut bases = Vec::new();
        let mut interfaces = Vec::new();
        if let Some(superclass) = node.child_by_field_name("superclass") {
            if let Some(t) = superclass.child(1) {
                bases.push(self.text(t));
            }
        }
        if let Some(impl_list) = node.child_by_field_name("interfaces") {
            let mut cursor = impl_list.walk();
            for t in impl_list.children(&mut cursor) {
                if t.kind() == "type_list" {
                    let mut c2 = t.walk();
                    for ty in t.children(&mut c2).filter(|c| c.kind() != ",") {
                        interfaces.push(self.text(ty));
                    }
                }
            }
        }

        let id = stable_entity_id(&self.ctx.file_id, kind.as_str(), &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            kind,
            "java",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        )
        .with_source_text(self.text(node))
        .with_attributes(if kind == EntityKind::Class {
            EntityAttributes::Class(ClassAttributes { base_classes: bases.clone(), interfaces: interfaces.clone(), mixins: Vec::new(), is_abstract: false, is_dataclass: false })
        } else {
            EntityAttributes::None
        });
        self.result.entities.push(entity);

        for base in &bases {
            self.push_pending(&id, &qualified_name, base, RelationType::Extends, node.start_position().row as u32 + 1);
        }
        for iface in &interfaces {
            self.push_pending(&id, &qualified_name, iface, RelationType::Implements, node.start_position().row as u32 + 1);
        }

        let mut child_chain = parent_chain.to_vec();
        child_chain.push(simple_name);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "method_declaration" => self.visit_method(member, &child_chain, &qualified_name),
                    "class_declaration" => self.visit_class(member, &child_chain, EntityKind::Class),
                    "interface_declaration" => self.visit_class(member, &child_chain, EntityKind::Interface),
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
        let modifiers_text = self.text(node);
        let is_static = modifiers_text.contains("static ");
        let visibility = if modifiers_text.contains("private ") {
            Visibility::Private
        } else if modifiers_text.contains("protected ") {
            Visibility::Protected
        } else if modifiers_text.contains("public ") {
            Visibility::Public
        } else {
            Visibility::PackagePrivate
        };

        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);
        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        let entity = CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), qualified_name.clone(), simple_name, EntityKind::Method, "java", line_start, line_end)
            .with_signature(signature)
            .with_visibility(visibility)
            .with_source_text(self.text(node))
            .with_attributes(EntityAttributes::Method(MethodAttributes {
                function: attrs.clone(),
                parent_class: parent_qualified.to_string(),
                is_static,
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

    fn build_function_attrs(&self, node: Node, qualified_name: &str) -> (FunctionAttributes, Vec<CallSite>, u32, u32, String) {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;
        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for p in params.children(&mut cursor).filter(|c| c.kind() == "formal_parameter") {
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

    /// Walk a method body collecting call and `new` sites (§4.F.5,
    /// §4.F.6). Self/this receivers resolve immediately to
    /// `<Parent>.method` and are marked so `push_call` never re-derives a
    /// receiver from them; `new` sites have no receiver concept at all.
    fn collect_calls(&self, node: Node, calls: &mut Vec<CallSite>, enclosing_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "method_invocation" => {
                    let name = child.child_by_field_name("name").map(|n| self.text(n)).unwrap_or_default();
                    let callee_expr = match child.child_by_field_name("object") {
                        Some(obj) => format!("{}.{}", self.text(obj), name),
                        None => name,
                    };
                    if let Some(site) = classify_call_site(&callee_expr, enclosing_qualified) {
                        calls.push(site);
                    }
                }
                "object_creation_expression" => {
                    if let Some(ty) = child.child_by_field_name("type") {
                        calls.push(CallSite { callee: self.text(ty), self_resolved: false });
                    }
                }
                _ => {}
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_hierarchy_and_method() {
        let source = "package com.example;\n\nimport java.util.List;\n\npublic class Widget extends Base implements Drawable {\n  public void draw() {\n    helper();\n  }\n}\n";
        let ctx = ExtractionContext::new("com/example/Widget.java", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = JavaExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.simple_name == "Widget" && e.kind == EntityKind::Class));
        assert!(result.pending_references.iter().any(|r| r.relation_type == RelationType::Extends));
        assert!(result.pending_references.iter().any(|r| r.relation_type == RelationType::Implements));
    }
}

//! Go extractor (§4.F table row 4), grounded on
//! `features/parsing/plugins/go.rs` in the teacher: packages, structs as
//! classes, functions, methods with the receiver as `parent_class`.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, join_qualified_name, new_reference_id, split_receiver, stable_entity_id, CallSite};
use super::Extractor;

pub struct GoExtractor;

impl Extractor for GoExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("go")
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "go");

        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_go::language()).is_err() {
            result.parse_errors.push("failed to initialize go grammar".to_string());
            return result;
        }
        let tree = match parser.parse(&ctx.source_bytes, None) {
            Some(t) => t,
            None => {
                result.parse_errors.push("go parse failed".to_string());
                return result;
            }
        };

        let module = ctx.module_segment();
        let mut walker = Walker { ctx, module: &module, result: &mut result };
        walker.visit(tree.root_node());

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn language_name(&self) -> &'static str {
        "go"
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

    fn visit(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "package_clause" => self.visit_package(child),
                "import_declaration" => self.visit_import(child),
                "function_declaration" => self.visit_function(child),
                "method_declaration" => self.visit_method(child),
                "type_declaration" => self.visit_type_declaration(child),
                _ => {}
            }
        }
    }

    fn visit_package(&mut self, node: Node) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let id = stable_entity_id(&self.ctx.file_id, "package", &name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            name.clone(),
            name,
            EntityKind::Package,
            "go",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        );
        self.result.entities.push(entity);
    }

    fn visit_import(&mut self, node: Node) {
        let line_start = node.start_position().row as u32 + 1;
        let mut specs = Vec::new();
        collect_import_specs(node, &mut specs);
        for spec in specs {
            let path = spec
                .child_by_field_name("path")
                .map(|n| self.text(n).trim_matches('"').to_string())
                .unwrap_or_default();
            let alias = spec.child_by_field_name("name").map(|n| self.text(n));
            let id = stable_entity_id(&self.ctx.file_id, "import", &format!("{path}@{line_start}"));
            let entity = CodeEntity::new(
                id.clone(),
                self.ctx.repository_id.clone(),
                self.ctx.file_id.clone(),
                format!("{path}@{line_start}"),
                path.clone(),
                EntityKind::Import,
                "go",
                spec.start_position().row as u32 + 1,
                spec.start_position().row as u32 + 1,
            )
            .with_attributes(EntityAttributes::Import(ImportAttributes {
                source_module: path.clone(),
                imported_symbols: Vec::new(),
                is_wildcard: false,
                is_relative: false,
                relative_level: 0,
                alias,
            }));
            self.result.entities.push(entity);
            self.push_pending(&id, self.module, &path, RelationType::Imports, line_start);
        }
    }

    fn visit_type_declaration(&mut self, node: Node) {
        let mut cursor = node.walk();
        for spec in node.children(&mut cursor).filter(|c| c.kind() == "type_spec") {
            let name_node = match spec.child_by_field_name("name") {
                Some(n) => n,
                None => continue,
            };
            let simple_name = self.text(name_node);
            let qualified_name = join_qualified_name(self.module, &[], &simple_name, ".");
            let line_start = spec.start_position().row as u32 + 1;
            let line_end = spec.end_position().row as u32 + 1;

            let underlying = spec.child_by_field_name("type");
            let kind_word = underlying.map(|n| n.kind()).unwrap_or("");
            if kind_word == "struct_type" || kind_word == "interface_type" {
                let kind = if kind_word == "interface_type" { EntityKind::Interface } else { EntityKind::Class };
                let id = stable_entity_id(&self.ctx.file_id, kind.as_str(), &qualified_name);
                let entity = CodeEntity::new(
                    id,
                    self.ctx.repository_id.clone(),
                    self.ctx.file_id.clone(),
                    qualified_name,
                    simple_name,
                    kind,
                    "go",
                    line_start,
                    line_end,
                )
                .with_source_text(self.text(spec))
                .with_attributes(if kind == EntityKind::Class {
                    EntityAttributes::Class(ClassAttributes::default())
                } else {
                    EntityAttributes::None
                });
                self.result.entities.push(entity);
            } else {
                let id = stable_entity_id(&self.ctx.file_id, "type_alias", &qualified_name);
                let entity = CodeEntity::new(
                    id,
                    self.ctx.repository_id.clone(),
                    self.ctx.file_id.clone(),
                    qualified_name,
                    simple_name,
                    EntityKind::TypeAlias,
                    "go",
                    line_start,
                    line_end,
                )
                .with_source_text(self.text(spec));
                self.result.entities.push(entity);
            }
        }
    }

    fn visit_function(&mut self, node: Node) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, &[], &simple_name, ".");
        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let id = stable_entity_id(&self.ctx.file_id, "function", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name,
            EntityKind::Function,
            "go",
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

    fn visit_method(&mut self, node: Node) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);

        let receiver_type = node
            .child_by_field_name("receiver")
            .and_then(|params| {
                let mut cursor = params.walk();
                params.children(&mut cursor).find(|c| c.kind() == "parameter_declaration")
            })
            .and_then(|p| p.child_by_field_name("type"))
            .map(|t| self.text(t).trim_start_matches('*').to_string())
            .unwrap_or_default();

        let parent_qualified = join_qualified_name(self.module, &[], &receiver_type, ".");
        let qualified_name = join_qualified_name(self.module, &[receiver_type.clone()], &simple_name, ".");
        let (func_attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name,
            EntityKind::Method,
            "go",
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Method(MethodAttributes {
            function: func_attrs.clone(),
            parent_class: parent_qualified,
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

    fn build_function_attrs(&self, node: Node, qualified_name: &str) -> (FunctionAttributes, Vec<CallSite>, u32, u32, String) {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for p in params.children(&mut cursor).filter(|c| c.kind() == "parameter_declaration") {
                let type_text = p.child_by_field_name("type").map(|t| self.text(t));
                if let Some(name_node) = p.child_by_field_name("name") {
                    let mut param = Parameter::new(self.text(name_node));
                    param.type_annotation = type_text;
                    parameters.push(param);
                }
            }
        }
        let return_type = node.child_by_field_name("result").map(|n| self.text(n));

        let mut calls = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &mut calls, qualified_name);
        }

        let signature = format!(
            "({}){}",
            parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(", "),
            return_type.as_ref().map(|t| format!(" {t}")).unwrap_or_default()
        );

        let call_sites = dedup_call_sites(calls);
        let mut attrs = FunctionAttributes {
            parameters,
            return_type,
            is_async: false,
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
    /// Self/this receivers resolve immediately to `<Parent>.method` and
    /// are marked so `push_call` never re-derives a receiver from them.
    fn collect_calls(&self, node: Node, calls: &mut Vec<CallSite>, enclosing_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "call_expression" {
                if let Some(func) = child.child_by_field_name("function") {
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

fn collect_import_specs<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_spec" => out.push(child),
            "import_spec_list" => collect_import_specs(child, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_struct_and_method_with_receiver_as_parent() {
        let source = "package main\n\ntype Server struct {\n  Name string\n}\n\nfunc (s *Server) Start() {\n  helper()\n}\n\nfunc helper() {}\n";
        let ctx = ExtractionContext::new("cmd/server.go", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = GoExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.simple_name == "Server" && e.kind == EntityKind::Class));
        let method = result.entities.iter().find(|e| e.simple_name == "Start").unwrap();
        assert_eq!(method.attributes.as_method().unwrap().parent_class, "cmd/server.Server");
    }
}

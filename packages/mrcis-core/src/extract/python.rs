//! Python extractor (§4.F table row 1), grounded on
//! `features/parsing/plugins/python.rs` in the teacher for the
//! tree-sitter traversal shape, rebuilt to emit [`crate::model::CodeEntity`]
//! instead of the teacher's IR nodes.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, join_qualified_name, new_reference_id, split_receiver, stable_entity_id, CallSite};
use super::Extractor;

pub struct PythonExtractor;

impl Extractor for PythonExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("py") | Some("pyi"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut result = ExtractionResult::empty(ctx, "python");

        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_python::language()).is_err() {
            result
                .parse_errors
                .push("failed to initialize python grammar".to_string());
            return result;
        }
        let source = &ctx.source_bytes;
        let tree = match parser.parse(source, None) {
            Some(t) => t,
            None => {
                result.parse_errors.push("python parse failed".to_string());
                return result;
            }
        };

        let module = ctx.module_segment();
        let mut walker = Walker {
            ctx,
            module: &module,
            result: &mut result,
        };
        walker.visit_block(tree.root_node(), &[]);

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn language_name(&self) -> &'static str {
        "python"
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

    /// Visit the direct statement children of a module/class/function body,
    /// creating top-level entities. `parent_chain` is the list of enclosing
    /// simple names (for `qualified_name` composition).
    fn visit_block(&mut self, node: Node, parent_chain: &[String]) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_statement(child, parent_chain);
        }
    }

    fn visit_statement(&mut self, node: Node, parent_chain: &[String]) {
        match node.kind() {
            "class_definition" => self.visit_class(node, parent_chain, Vec::new()),
            "function_definition" => self.visit_function(node, parent_chain, Vec::new()),
            "decorated_definition" => {
                let decorators = self.collect_decorators(node);
                if let Some(def) = node.child_by_field_name("definition") {
                    match def.kind() {
                        "class_definition" => self.visit_class(def, parent_chain, decorators),
                        "function_definition" => self.visit_function(def, parent_chain, decorators),
                        _ => {}
                    }
                }
            }
            "import_statement" => self.visit_import(node, parent_chain, false),
            "import_from_statement" => self.visit_import(node, parent_chain, true),
            "expression_statement" | "assignment" => {
                if parent_chain.is_empty() {
                    self.visit_module_assignment(node);
                }
            }
            _ => {}
        }
    }

    fn collect_decorators(&self, node: Node) -> Vec<String> {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .map(|c| self.text(c).trim_start_matches('@').to_string())
            .collect()
    }

    fn visit_class(&mut self, node: Node, parent_chain: &[String], decorators: Vec<String>) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for arg in superclasses.children(&mut cursor) {
                if matches!(arg.kind(), "identifier" | "attribute") {
                    bases.push(self.text(arg));
                }
            }
        }
        let is_dataclass = decorators.iter().any(|d| d.contains("dataclass"));

        let id = stable_entity_id(&self.ctx.file_id, "class", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            EntityKind::Class,
            "python",
            line_start,
            line_end,
        )
        .with_decorators(decorators)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Class(ClassAttributes {
            base_classes: bases.clone(),
            interfaces: Vec::new(),
            mixins: Vec::new(),
            is_abstract: false,
            is_dataclass,
        }));
        self.result.entities.push(entity);

        for base in &bases {
            self.push_pending(&id, &qualified_name, base, RelationType::Extends, line_start, None);
        }

        let mut child_chain = parent_chain.to_vec();
        child_chain.push(simple_name.clone());
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_class_body(body, &child_chain, &qualified_name);
        }
    }

    fn visit_class_body(&mut self, node: Node, parent_chain: &[String], parent_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_definition" => {
                    self.visit_method(child, parent_chain, parent_qualified, Vec::new())
                }
                "decorated_definition" => {
                    let decorators = self.collect_decorators(child);
                    if let Some(def) = child.child_by_field_name("definition") {
                        if def.kind() == "function_definition" {
                            self.visit_method(def, parent_chain, parent_qualified, decorators);
                        } else if def.kind() == "class_definition" {
                            self.visit_class(def, parent_chain, decorators);
                        }
                    }
                }
                "class_definition" => self.visit_class(child, parent_chain, Vec::new()),
                _ => {}
            }
        }
    }

    fn visit_method(
        &mut self,
        node: Node,
        parent_chain: &[String],
        parent_qualified: &str,
        decorators: Vec<String>,
    ) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let (func_attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let is_static = decorators.iter().any(|d| d == "staticmethod");
        let is_classmethod = decorators.iter().any(|d| d == "classmethod");
        let is_property = decorators.iter().any(|d| d == "property");
        let is_constructor = simple_name == "__init__";
        let overrides = decorators
            .iter()
            .find(|d| *d == "override")
            .map(|_| format!("{parent_qualified}.{simple_name}"));

        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            EntityKind::Method,
            "python",
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_decorators(decorators)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Method(MethodAttributes {
            function: func_attrs.clone(),
            parent_class: parent_qualified.to_string(),
            is_static,
            is_classmethod,
            is_property,
            is_constructor,
            overrides,
        }));
        self.result.entities.push(entity);

        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn visit_function(&mut self, node: Node, parent_chain: &[String], decorators: Vec<String>) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let (func_attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let id = stable_entity_id(&self.ctx.file_id, "function", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name,
            EntityKind::Function,
            "python",
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_decorators(decorators)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Function(func_attrs.clone()));
        self.result.entities.push(entity);

        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    /// Shared by functions and methods: parameters, return type,
    /// async/generator flags, docstring, calls (§4.F.5 receiver rules).
    fn build_function_attrs(&mut self, node: Node, qualified_name: &str) -> (FunctionAttributes, Vec<CallSite>, u32, u32, String) {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;
        let is_async = self.text(node).trim_start().starts_with("async ");

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for p in params.children(&mut cursor) {
                match p.kind() {
                    "identifier" => parameters.push(Parameter::new(self.text(p))),
                    "typed_parameter" => {
                        let name = p
                            .child(0)
                            .map(|n| self.text(n))
                            .unwrap_or_default();
                        let mut param = Parameter::new(name);
                        if let Some(ty) = p.child_by_field_name("type") {
                            param.type_annotation = Some(self.text(ty));
                        }
                        parameters.push(param);
                    }
                    "default_parameter" | "typed_default_parameter" => {
                        if let Some(name_node) = p.child_by_field_name("name") {
                            let mut param = Parameter::new(self.text(name_node));
                            if let Some(ty) = p.child_by_field_name("type") {
                                param.type_annotation = Some(self.text(ty));
                            }
                            if let Some(val) = p.child_by_field_name("value") {
                                param.default_value = Some(self.text(val));
                            }
                            parameters.push(param);
                        }
                    }
                    "list_splat_pattern" | "dictionary_splat_pattern" => {
                        let mut param = Parameter::new(self.text(p));
                        param.is_variadic = true;
                        parameters.push(param);
                    }
                    _ => {}
                }
            }
        }

        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| self.text(n));

        let mut calls = Vec::new();
        let mut is_generator = false;
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls_and_yields(body, &mut calls, &mut is_generator, qualified_name, line_start);
        }

        let docstring = node
            .child_by_field_name("body")
            .and_then(|b| b.child(0))
            .filter(|c| c.kind() == "expression_statement")
            .and_then(|c| c.child(0))
            .filter(|c| c.kind() == "string")
            .map(|c| self.text(c).trim_matches(|ch| ch == '"' || ch == '\'').to_string());

        let signature = format!(
            "({}){}",
            parameters
                .iter()
                .map(|p| p.name.clone())
                .collect::<Vec<_>>()
                .join(", "),
            return_type
                .as_ref()
                .map(|t| format!(" -> {t}"))
                .unwrap_or_default()
        );

        let call_sites = dedup_call_sites(calls);
        let mut attrs = FunctionAttributes {
            parameters,
            return_type,
            is_async,
            is_generator,
            calls: Vec::new(),
            type_references: Vec::new(),
        };
        for site in &call_sites {
            attrs.record_call(site.callee.clone());
        }
        (
            attrs,
            call_sites,
            line_start,
            line_end,
            if let Some(d) = docstring { signature + "\n" + &d } else { signature },
        )
    }

    /// Walk a function body collecting call expressions (§4.F.5, §4.F.6).
    /// Self/this receivers resolve immediately to `<Parent>.method` and
    /// are marked so `push_call` never re-derives a receiver from them.
    fn collect_calls_and_yields(
        &self,
        node: Node,
        calls: &mut Vec<CallSite>,
        is_generator: &mut bool,
        enclosing_qualified: &str,
        _line_start: u32,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "yield" | "yield_expression" => *is_generator = true,
                "call" => {
                    if let Some(func) = child.child_by_field_name("function") {
                        let callee_expr = self.text(func);
                        if let Some(site) = classify_call_site(&callee_expr, enclosing_qualified) {
                            calls.push(site);
                        }
                    }
                }
                _ => {}
            }
            self.collect_calls_and_yields(child, calls, is_generator, enclosing_qualified, _line_start);
        }
    }

    fn visit_import(&mut self, node: Node, parent_chain: &[String], is_from: bool) {
        let line_start = node.start_position().row as u32 + 1;
        let enclosing = join_qualified_name(self.module, parent_chain, "<module>", ".");

        if is_from {
            let module_name = node
                .child_by_field_name("module_name")
                .map(|n| self.text(n))
                .unwrap_or_default();
            let is_relative = module_name.starts_with('.');
            let relative_level = module_name.chars().take_while(|c| *c == '.').count() as u32;

            let mut name_cursor = node.walk();
            let mut symbols = Vec::new();
            for name_node in node.children_by_field_name("name", &mut name_cursor) {
                match name_node.kind() {
                    "aliased_import" => {
                        if let Some(n) = name_node.child_by_field_name("name") {
                            symbols.push(self.text(n));
                        }
                    }
                    "wildcard_import" => {}
                    _ => symbols.push(self.text(name_node)),
                }
            }
            let wildcard = {
                let mut cursor = node.walk();
                node.children(&mut cursor).any(|c| c.kind() == "wildcard_import")
            };

            let id = stable_entity_id(
                &self.ctx.file_id,
                "import",
                &format!("{module_name}@{line_start}"),
            );
            let entity = CodeEntity::new(
                id.clone(),
                self.ctx.repository_id.clone(),
                self.ctx.file_id.clone(),
                format!("{module_name}@{line_start}"),
                module_name.clone(),
                EntityKind::Import,
                "python",
                line_start,
                line_start,
            )
            .with_source_text(self.text(node))
            .with_attributes(EntityAttributes::Import(ImportAttributes {
                source_module: module_name.clone(),
                imported_symbols: symbols.clone(),
                is_wildcard: wildcard,
                is_relative,
                relative_level,
                alias: None,
            }));
            self.result.entities.push(entity);

            if !wildcard {
                for symbol in &symbols {
                    self.push_pending(
                        &id,
                        &enclosing,
                        &format!("{module_name}.{symbol}"),
                        RelationType::Imports,
                        line_start,
                        None,
                    );
                }
            }
        } else {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "dotted_name" || child.kind() == "aliased_import" {
                    let module_name = self.text(child);
                    let id = stable_entity_id(
                        &self.ctx.file_id,
                        "import",
                        &format!("{module_name}@{line_start}"),
                    );
                    let entity = CodeEntity::new(
                        id.clone(),
                        self.ctx.repository_id.clone(),
                        self.ctx.file_id.clone(),
                        format!("{module_name}@{line_start}"),
                        module_name.clone(),
                        EntityKind::Import,
                        "python",
                        line_start,
                        line_start,
                    )
                    .with_source_text(self.text(node))
                    .with_attributes(EntityAttributes::Import(ImportAttributes {
                        source_module: module_name.clone(),
                        imported_symbols: Vec::new(),
                        is_wildcard: false,
                        is_relative: false,
                        relative_level: 0,
                        alias: None,
                    }));
                    self.result.entities.push(entity);
                    self.push_pending(&id, &enclosing, &module_name, RelationType::Imports, line_start, None);
                }
            }
        }
    }

    fn visit_module_assignment(&mut self, node: Node) {
        let assignment = if node.kind() == "expression_statement" {
            match node.child(0) {
                Some(c) if c.kind() == "assignment" => c,
                _ => return,
            }
        } else {
            node
        };
        let left = match assignment.child_by_field_name("left") {
            Some(l) if l.kind() == "identifier" => l,
            _ => return,
        };
        let name = self.text(left);
        let line_start = assignment.start_position().row as u32 + 1;
        let line_end = assignment.end_position().row as u32 + 1;
        let is_constant = name.chars().all(|c| c.is_uppercase() || c == '_' || c.is_numeric());
        let qualified_name = join_qualified_name(self.module, &[], &name, ".");
        let kind = if is_constant { EntityKind::Constant } else { EntityKind::Variable };
        let id = stable_entity_id(&self.ctx.file_id, kind.as_str(), &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            name,
            kind,
            "python",
            line_start,
            line_end,
        )
        .with_source_text(self.text(assignment));
        self.result.entities.push(entity);
    }

    fn push_pending(
        &mut self,
        source_entity_id: &str,
        source_qualified_name: &str,
        target: &str,
        relation_type: RelationType,
        line: u32,
        context: Option<String>,
    ) {
        let mut reference = PendingReferenceBuilder::build(
            source_entity_id,
            source_qualified_name,
            &self.ctx.repository_id,
            target,
            relation_type,
            line,
        );
        if let Some(ctx) = context {
            reference = reference.with_context(ctx);
        }
        self.result.pending_references.push(reference);
    }

    /// Like `push_pending`, but for a call/instantiation site: receiver
    /// disambiguation only applies when `site` wasn't already resolved
    /// from a self/this receiver (§4.F.5).
    fn push_call(&mut self, source_entity_id: &str, source_qualified_name: &str, site: &CallSite, line: u32) {
        let relation_type = if is_instantiation(site.callee.rsplit('.').next().unwrap_or(&site.callee)) {
            RelationType::Instantiates
        } else {
            RelationType::Calls
        };
        let mut reference = PendingReferenceBuilder::build(
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
}

struct PendingReferenceBuilder;

impl PendingReferenceBuilder {
    fn build(
        source_entity_id: &str,
        source_qualified_name: &str,
        source_repository_id: &str,
        target: &str,
        relation_type: RelationType,
        line: u32,
    ) -> PendingReference {
        PendingReference::new(
            new_reference_id(),
            source_entity_id,
            source_qualified_name,
            source_repository_id,
            target,
            relation_type,
            line,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(source: &str) -> ExtractionContext {
        ExtractionContext::new("pkg/mod.py", "file-1", "repo-1", source.as_bytes().to_vec())
    }

    #[test]
    fn extracts_function_and_class_with_bases() {
        let source = "class Base:\n    pass\n\nclass Foo(Base):\n    def bar(self):\n        return helper()\n\ndef helper():\n    pass\n";
        let result = PythonExtractor.extract(&ctx(source));
        assert!(result.entities.iter().any(|e| e.simple_name == "Foo" && e.kind == EntityKind::Class));
        assert!(result.entities.iter().any(|e| e.simple_name == "bar" && e.kind == EntityKind::Method));
        assert!(result
            .pending_references
            .iter()
            .any(|r| r.relation_type == RelationType::Extends && r.target_qualified_name == "Base"));
    }

    #[test]
    fn extracts_imports() {
        let source = "import os\nfrom typing import List, Optional\n";
        let result = PythonExtractor.extract(&ctx(source));
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Import));
        assert!(result
            .pending_references
            .iter()
            .any(|r| r.target_qualified_name == "typing.List"));
    }
}

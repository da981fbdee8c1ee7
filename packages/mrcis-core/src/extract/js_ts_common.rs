//! Shared traversal for the TypeScript/TSX and JavaScript/JSX extractors
//! (§4.F table rows 2-3): the two grammars share almost every node shape,
//! differing only in type annotations, interfaces and type aliases.

use tree_sitter::{Language, Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, join_qualified_name, new_reference_id, split_receiver, stable_entity_id, CallSite};

pub fn extract(ctx: &ExtractionContext, language: Language, language_name: &'static str, types_enabled: bool) -> ExtractionResult {
    let started = std::time::Instant::now();
    let mut result = ExtractionResult::empty(ctx, language_name);

    let mut parser = Parser::new();
    if parser.set_language(&language).is_err() {
        result
            .parse_errors
            .push(format!("failed to initialize {language_name} grammar"));
        return result;
    }
    let tree = match parser.parse(&ctx.source_bytes, None) {
        Some(t) => t,
        None => {
            result.parse_errors.push(format!("{language_name} parse failed"));
            return result;
        }
    };

    let module = ctx.module_segment();
    let mut walker = Walker {
        ctx,
        module: &module,
        language_name,
        types_enabled,
        result: &mut result,
    };
    walker.visit_block(tree.root_node(), &[]);

    result.extraction_time_ms = started.elapsed().as_millis() as u64;
    result
}

struct Walker<'a> {
    ctx: &'a ExtractionContext,
    module: &'a str,
    language_name: &'static str,
    types_enabled: bool,
    result: &'a mut ExtractionResult,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(&self.ctx.source_bytes).unwrap_or("").to_string()
    }

    fn visit_block(&mut self, node: Node, parent_chain: &[String]) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_statement(child, parent_chain);
        }
    }

    fn visit_statement(&mut self, node: Node, parent_chain: &[String]) {
        match node.kind() {
            "export_statement" => {
                if let Some(decl) = node.child_by_field_name("declaration") {
                    self.visit_decl(decl, parent_chain, true);
                } else {
                    self.visit_reexport(node, parent_chain);
                }
            }
            "class_declaration" | "function_declaration" | "interface_declaration"
            | "type_alias_declaration" | "lexical_declaration" | "variable_declaration" => {
                self.visit_decl(node, parent_chain, false);
            }
            "import_statement" => self.visit_import(node, parent_chain),
            _ => {}
        }
    }

    fn visit_decl(&mut self, node: Node, parent_chain: &[String], is_exported: bool) {
        match node.kind() {
            "class_declaration" => self.visit_class(node, parent_chain, is_exported),
            "function_declaration" => self.visit_function(node, parent_chain, is_exported),
            "interface_declaration" if self.types_enabled => self.visit_interface(node, parent_chain, is_exported),
            "type_alias_declaration" if self.types_enabled => self.visit_type_alias(node, parent_chain, is_exported),
            "lexical_declaration" | "variable_declaration" => self.visit_variable(node, parent_chain, is_exported),
            _ => {}
        }
    }

    fn visit_reexport(&mut self, node: Node, parent_chain: &[String]) {
        let enclosing = join_qualified_name(self.module, parent_chain, "<module>", ".");
        let source = node
            .child_by_field_name("source")
            .map(|n| self.text(n).trim_matches(['"', '\'']).to_string());
        if let Some(source_module) = source {
            self.push_pending(&enclosing, &enclosing, &source_module, RelationType::Exports, node.start_position().row as u32 + 1, None);
        }
    }

    fn visit_class(&mut self, node: Node, parent_chain: &[String], is_exported: bool) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;

        let mut bases = Vec::new();
        let mut interfaces = Vec::new();
        if let Some(heritage) = find_child(node, "class_heritage") {
            let mut cursor = heritage.walk();
            for clause in heritage.children(&mut cursor) {
                match clause.kind() {
                    "extends_clause" => {
                        if let Some(id) = clause.child(1) {
                            bases.push(self.text(id));
                        }
                    }
                    "implements_clause" => {
                        let mut c2 = clause.walk();
                        for t in clause.children(&mut c2) {
                            if t.kind() == "type_identifier" {
                                interfaces.push(self.text(t));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let id = stable_entity_id(&self.ctx.file_id, "class", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            EntityKind::Class,
            self.language_name,
            line_start,
            line_end,
        )
        .with_exported(is_exported)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Class(ClassAttributes {
            base_classes: bases.clone(),
            interfaces: interfaces.clone(),
            mixins: Vec::new(),
            is_abstract: false,
            is_dataclass: false,
        }));
        self.result.entities.push(entity);

        for base in &bases {
            self.push_pending(&id, &qualified_name, base, RelationType::Extends, line_start, None);
        }
        for iface in &interfaces {
            self.push_pending(&id, &qualified_name, iface, RelationType::Implements, line_start, None);
        }

        let mut child_chain = parent_chain.to_vec();
        child_chain.push(simple_name);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                if member.kind() == "method_definition" {
                    self.visit_method(member, &child_chain, &qualified_name);
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
        let (func_attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);

        let modifiers = self.text(node);
        let is_static = modifiers.trim_start().starts_with("static ");
        let is_property = false;
        let is_constructor = simple_name == "constructor";

        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name,
            EntityKind::Method,
            self.language_name,
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Method(MethodAttributes {
            function: func_attrs.clone(),
            parent_class: parent_qualified.to_string(),
            is_static,
            is_classmethod: false,
            is_property,
            is_constructor,
            overrides: None,
        }));
        self.result.entities.push(entity);
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn visit_function(&mut self, node: Node, parent_chain: &[String], is_exported: bool) {
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
            self.language_name,
            line_start,
            line_end,
        )
        .with_signature(signature)
        .with_exported(is_exported)
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Function(func_attrs.clone()));
        self.result.entities.push(entity);
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn visit_interface(&mut self, node: Node, parent_chain: &[String], is_exported: bool) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;

        let id = stable_entity_id(&self.ctx.file_id, "interface", &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            simple_name,
            EntityKind::Interface,
            self.language_name,
            line_start,
            line_end,
        )
        .with_exported(is_exported)
        .with_source_text(self.text(node));
        self.result.entities.push(entity);
    }

    fn visit_type_alias(&mut self, node: Node, parent_chain: &[String], is_exported: bool) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = join_qualified_name(self.module, parent_chain, &simple_name, ".");
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;

        let id = stable_entity_id(&self.ctx.file_id, "type_alias", &qualified_name);
        let entity = CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            simple_name,
            EntityKind::TypeAlias,
            self.language_name,
            line_start,
            line_end,
        )
        .with_exported(is_exported)
        .with_source_text(self.text(node));
        self.result.entities.push(entity);
    }

    fn visit_variable(&mut self, node: Node, parent_chain: &[String], is_exported: bool) {
        if !parent_chain.is_empty() {
            return;
        }
        let mut cursor = node.walk();
        for declarator in node.children(&mut cursor).filter(|c| c.kind() == "variable_declarator") {
            let name_node = match declarator.child_by_field_name("name") {
                Some(n) if n.kind() == "identifier" => n,
                _ => continue,
            };
            let name = self.text(name_node);
            let is_arrow_function = declarator
                .child_by_field_name("value")
                .map(|v| v.kind() == "arrow_function")
                .unwrap_or(false);
            if is_arrow_function {
                let qualified_name = join_qualified_name(self.module, parent_chain, &name, ".");
                let value = declarator.child_by_field_name("value").unwrap();
                let (func_attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(value, &qualified_name);
                let id = stable_entity_id(&self.ctx.file_id, "function", &qualified_name);
                let entity = CodeEntity::new(
                    id.clone(),
                    self.ctx.repository_id.clone(),
                    self.ctx.file_id.clone(),
                    qualified_name.clone(),
                    name,
                    EntityKind::Function,
                    self.language_name,
                    line_start,
                    line_end,
                )
                .with_signature(signature)
                .with_exported(is_exported)
                .with_source_text(self.text(declarator))
                .with_attributes(EntityAttributes::Function(func_attrs.clone()));
                self.result.entities.push(entity);
                for site in &call_sites {
                    self.push_call(&id, &qualified_name, site, line_start);
                }
            } else {
                let is_const = node.kind() == "lexical_declaration" && self.text(node).trim_start().starts_with("const");
                let qualified_name = join_qualified_name(self.module, parent_chain, &name, ".");
                let kind = if is_const { EntityKind::Constant } else { EntityKind::Variable };
                let id = stable_entity_id(&self.ctx.file_id, kind.as_str(), &qualified_name);
                let entity = CodeEntity::new(
                    id,
                    self.ctx.repository_id.clone(),
                    self.ctx.file_id.clone(),
                    qualified_name,
                    name,
                    kind,
                    self.language_name,
                    declarator.start_position().row as u32 + 1,
                    declarator.end_position().row as u32 + 1,
                )
                .with_exported(is_exported)
                .with_source_text(self.text(declarator));
                self.result.entities.push(entity);
            }
        }
    }

    fn build_function_attrs(&mut self, node: Node, qualified_name: &str) -> (FunctionAttributes, Vec<CallSite>, u32, u32, String) {
        let line_start = node.start_position().row as u32 + 1;
        let line_end = node.end_position().row as u32 + 1;
        let is_async = self.text(node).trim_start().starts_with("async ");
        let is_generator = self.text(node).contains('*') && node.child_by_field_name("name").map(|n| {
            self.ctx.source_bytes.get(n.end_byte()).map(|b| *b == b'*').unwrap_or(false)
        }).unwrap_or(false);

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for p in params.children(&mut cursor) {
                match p.kind() {
                    "identifier" | "required_parameter" | "optional_parameter" => {
                        let name = p
                            .child_by_field_name("pattern")
                            .map(|n| self.text(n))
                            .unwrap_or_else(|| self.text(p));
                        let mut param = Parameter::new(name);
                        if let Some(ty) = p.child_by_field_name("type") {
                            param.type_annotation = Some(self.text(ty));
                        }
                        if let Some(val) = p.child_by_field_name("value") {
                            param.default_value = Some(self.text(val));
                        }
                        parameters.push(param);
                    }
                    "rest_pattern" => {
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
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &mut calls, qualified_name);
        }

        let signature = format!(
            "({}){}",
            parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(", "),
            return_type.as_ref().map(|t| format!(": {t}")).unwrap_or_default()
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
        (attrs, call_sites, line_start, line_end, signature)
    }

    /// Walk a function body collecting call/new-expression sites (§4.F.5,
    /// §4.F.6). Self/this receivers resolve immediately to
    /// `<Parent>.method` and are marked so `push_call` never re-derives a
    /// receiver from them.
    fn collect_calls(&self, node: Node, calls: &mut Vec<CallSite>, enclosing_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "call_expression" | "new_expression" => {
                    if let Some(func) = child.child_by_field_name("function").or_else(|| child.child_by_field_name("constructor")) {
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

    fn visit_import(&mut self, node: Node, parent_chain: &[String]) {
        let line_start = node.start_position().row as u32 + 1;
        let enclosing = join_qualified_name(self.module, parent_chain, "<module>", ".");
        let source_module = node
            .child_by_field_name("source")
            .map(|n| self.text(n).trim_matches(['"', '\'']).to_string())
            .unwrap_or_default();

        let mut symbols = Vec::new();
        let mut is_wildcard = false;
        if let Some(clause) = find_child(node, "import_clause") {
            let mut cursor = clause.walk();
            for part in clause.children(&mut cursor) {
                match part.kind() {
                    "identifier" => symbols.push(self.text(part)),
                    "namespace_import" => is_wildcard = true,
                    "named_imports" => {
                        let mut c2 = part.walk();
                        for spec in part.children(&mut c2).filter(|c| c.kind() == "import_specifier") {
                            if let Some(n) = spec.child_by_field_name("name") {
                                symbols.push(self.text(n));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let id = stable_entity_id(&self.ctx.file_id, "import", &format!("{source_module}@{line_start}"));
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            format!("{source_module}@{line_start}"),
            source_module.clone(),
            EntityKind::Import,
            self.language_name,
            line_start,
            line_start,
        )
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Import(ImportAttributes {
            source_module: source_module.clone(),
            imported_symbols: symbols.clone(),
            is_wildcard,
            is_relative: source_module.starts_with('.'),
            relative_level: source_module.chars().take_while(|c| *c == '.').count() as u32,
            alias: None,
        }));
        self.result.entities.push(entity);

        if !is_wildcard {
            if symbols.is_empty() {
                self.push_pending(&id, &enclosing, &source_module, RelationType::Imports, line_start, None);
            }
            for symbol in &symbols {
                self.push_pending(&id, &enclosing, &format!("{source_module}.{symbol}"), RelationType::Imports, line_start, None);
            }
        }
    }

    fn push_pending(&mut self, source_entity_id: &str, source_qualified_name: &str, target: &str, relation_type: RelationType, line: u32, context: Option<String>) {
        let mut reference = PendingReference::new(
            new_reference_id(),
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
}

fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

//! Ruby extractor (§4.F table row 6): classes/modules (`include` →
//! mixin), methods with visibility, Rails association/callback/scope
//! DSL, Rake tasks, and Gemfile dependencies.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::model::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes, ImportAttributes,
    MethodAttributes, Parameter, PendingReference, RelationType, Visibility,
};

use super::context::{ExtractionContext, ExtractionResult};
use super::support::{classify_call_site, dedup_call_sites, is_instantiation, new_reference_id, split_receiver, stable_entity_id, CallSite};
use super::Extractor;

pub struct RubyExtractor;

impl Extractor for RubyExtractor {
    fn supports(&self, path: &Path) -> bool {
        let is_gemfile = path.file_name().and_then(|n| n.to_str()) == Some("Gemfile");
        let is_rakefile = path.file_name().and_then(|n| n.to_str()) == Some("Rakefile");
        is_gemfile
            || is_rakefile
            || matches!(path.extension().and_then(|e| e.to_str()), Some("rb") | Some("rake"))
    }

    fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let started = std::time::Instant::now();
        let file_name = Path::new(&ctx.file_path).file_name().and_then(|n| n.to_str()).unwrap_or("");
        let is_rake = file_name == "Rakefile" || ctx.file_path.ends_with(".rake");
        let is_gemfile = file_name == "Gemfile";

        let mut result = ExtractionResult::empty(ctx, "ruby");
        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_ruby::language()).is_err() {
            result.parse_errors.push("failed to initialize ruby grammar".to_string());
            return result;
        }
        let tree = match parser.parse(&ctx.source_bytes, None) {
            Some(t) => t,
            None => {
                result.parse_errors.push("ruby parse failed".to_string());
                return result;
            }
        };

        let module = ctx.module_segment();
        let mut walker = Walker {
            ctx,
            module: &module,
            result: &mut result,
            is_rake,
            is_gemfile,
        };
        walker.visit_block(tree.root_node(), &[], ":");

        result.extraction_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &["rb", "rake"]
    }

    fn language_name(&self) -> &'static str {
        "ruby"
    }
}

struct Walker<'a> {
    ctx: &'a ExtractionContext,
    module: &'a str,
    result: &'a mut ExtractionResult,
    is_rake: bool,
    is_gemfile: bool,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(&self.ctx.source_bytes).unwrap_or("").to_string()
    }

    fn visit_block(&mut self, node: Node, parent_chain: &[String], sep: &str) {
        let mut cursor = node.walk();
        let mut visibility = Visibility::Public;
        for child in node.children(&mut cursor) {
            match child.kind() {
                "class" => self.visit_class(child, parent_chain, sep),
                "module" => {
                    if self.is_rake {
                        self.visit_rake_namespace(child, parent_chain);
                    } else {
                        self.visit_module(child, parent_chain, sep)
                    }
                }
                "method" => self.visit_method(child, parent_chain, sep, visibility),
                "singleton_method" => self.visit_scope_method(child, parent_chain, sep),
                "call" => {
                    if self.is_gemfile {
                        self.visit_gemfile_call(child);
                    } else if self.is_rake {
                        self.visit_rake_call(child, parent_chain);
                    } else {
                        self.visit_class_level_call(child, parent_chain, sep, &mut visibility);
                    }
                }
                _ => {}
            }
        }
    }

    fn qn(&self, parent_chain: &[String], name: &str, sep: &str) -> String {
        let mut segments: Vec<&str> = Vec::new();
        if !self.module.is_empty() {
            segments.push(self.module);
        }
        for p in parent_chain {
            segments.push(p);
        }
        segments.push(name);
        segments.join(sep)
    }

    fn visit_class(&mut self, node: Node, parent_chain: &[String], sep: &str) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = self.qn(parent_chain, &simple_name, sep);

        let mut bases = Vec::new();
        if let Some(superclass) = node.child_by_field_name("superclass") {
            bases.push(self.text(superclass));
        }

        let id = stable_entity_id(&self.ctx.file_id, "class", &qualified_name);
        let entity = CodeEntity::new(
            id.clone(),
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name.clone(),
            simple_name.clone(),
            EntityKind::Class,
            "ruby",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        )
        .with_source_text(self.text(node))
        .with_attributes(EntityAttributes::Class(ClassAttributes {
            base_classes: bases.clone(),
            interfaces: Vec::new(),
            mixins: Vec::new(),
            is_abstract: false,
            is_dataclass: false,
        }));
        self.result.entities.push(entity);

        for base in &bases {
            self.push_pending(&id, &qualified_name, base, RelationType::Extends, node.start_position().row as u32 + 1, None);
        }

        let mut child_chain = parent_chain.to_vec();
        child_chain.push(simple_name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_class_body(body, &child_chain, sep, &qualified_name, &id);
        }
    }

    fn visit_module(&mut self, node: Node, parent_chain: &[String], sep: &str) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = self.qn(parent_chain, &simple_name, sep);
        let id = stable_entity_id(&self.ctx.file_id, "module", &qualified_name);
        self.result.entities.push(CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            simple_name.clone(),
            EntityKind::Module,
            "ruby",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        ));
        let mut child_chain = parent_chain.to_vec();
        child_chain.push(simple_name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_block(body, &child_chain, sep);
        }
    }

    /// Class bodies need per-statement visibility tracking and the Rails
    /// DSL detector, unlike the generic `visit_block`.
    fn visit_class_body(&mut self, node: Node, parent_chain: &[String], sep: &str, parent_qualified: &str, class_id: &str) {
        let mut cursor = node.walk();
        let mut visibility = Visibility::Public;
        for child in node.children(&mut cursor) {
            match child.kind() {
                "method" => self.visit_method_in_class(child, parent_chain, sep, parent_qualified, visibility),
                "singleton_method" => self.visit_scope_method(child, parent_chain, sep),
                "call" => self.visit_dsl_call(child, parent_qualified, class_id, &mut visibility),
                "identifier" => {
                    visibility = match self.text(child).as_str() {
                        "private" => Visibility::Private,
                        "protected" => Visibility::Protected,
                        "public" => Visibility::Public,
                        _ => visibility,
                    };
                }
                "class" => self.visit_class(child, parent_chain, sep),
                "module" => self.visit_module(child, parent_chain, sep),
                _ => {}
            }
        }
    }

    fn visit_method(&mut self, node: Node, parent_chain: &[String], sep: &str, visibility: Visibility) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = self.qn(parent_chain, &simple_name, sep);
        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);
        let id = stable_entity_id(&self.ctx.file_id, "function", &qualified_name);
        self.result.entities.push(
            CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), qualified_name.clone(), simple_name, EntityKind::Function, "ruby", line_start, line_end)
                .with_signature(signature)
                .with_visibility(visibility)
                .with_source_text(self.text(node))
                .with_attributes(EntityAttributes::Function(attrs)),
        );
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    fn visit_method_in_class(&mut self, node: Node, parent_chain: &[String], sep: &str, parent_qualified: &str, visibility: Visibility) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = self.qn(parent_chain, &simple_name, sep);
        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);
        let is_constructor = simple_name == "initialize";
        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        self.result.entities.push(
            CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), qualified_name.clone(), simple_name, EntityKind::Method, "ruby", line_start, line_end)
                .with_signature(signature)
                .with_visibility(visibility)
                .with_source_text(self.text(node))
                .with_attributes(EntityAttributes::Method(MethodAttributes {
                    function: attrs,
                    parent_class: parent_qualified.to_string(),
                    is_static: false,
                    is_classmethod: false,
                    is_property: false,
                    is_constructor,
                    overrides: None,
                })),
        );
        for site in &call_sites {
            self.push_call(&id, &qualified_name, site, line_start);
        }
    }

    /// `def self.foo` — a Ruby class method, tagged `is_classmethod`.
    fn visit_scope_method(&mut self, node: Node, parent_chain: &[String], sep: &str) {
        let name_node = match node.child_by_field_name("name") {
            Some(n) => n,
            None => return,
        };
        let simple_name = self.text(name_node);
        let qualified_name = self.qn(parent_chain, &simple_name, sep);
        let (attrs, call_sites, line_start, line_end, signature) = self.build_function_attrs(node, &qualified_name);
        let parent_qualified = self.qn(parent_chain, "", sep).trim_end_matches(sep).to_string();
        let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
        self.result.entities.push(
            CodeEntity::new(id.clone(), self.ctx.repository_id.clone(), self.ctx.file_id.clone(), qualified_name.clone(), simple_name, EntityKind::Method, "ruby", line_start, line_end)
                .with_signature(signature)
                .with_source_text(self.text(node))
                .with_attributes(EntityAttributes::Method(MethodAttributes {
                    function: attrs,
                    parent_class: parent_qualified,
                    is_static: true,
                    is_classmethod: true,
                    is_property: false,
                    is_constructor: false,
                    overrides: None,
                })),
        );
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
            for p in params.children(&mut cursor) {
                match p.kind() {
                    "identifier" => parameters.push(Parameter::new(self.text(p))),
                    "optional_parameter" => {
                        if let Some(n) = p.child_by_field_name("name") {
                            let mut param = Parameter::new(self.text(n));
                            if let Some(v) = p.child_by_field_name("value") {
                                param.default_value = Some(self.text(v));
                            }
                            parameters.push(param);
                        }
                    }
                    "splat_parameter" | "hash_splat_parameter" => {
                        let mut param = Parameter::new(self.text(p));
                        param.is_variadic = true;
                        parameters.push(param);
                    }
                    _ => {}
                }
            }
        }
        let signature = format!("({})", parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(", "));

        let mut calls = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &mut calls, qualified_name);
        }
        let call_sites = dedup_call_sites(calls);
        let mut attrs = FunctionAttributes {
            parameters,
            return_type: None,
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

    /// Walk a method body collecting plain call sites (§4.F.5, §4.F.6);
    /// the Rails DSL (`has_many`, `validates`, ...) is handled separately
    /// by `visit_dsl_call` at the class-body level, not here. Self
    /// receivers resolve immediately to `<Parent>.method` and are marked
    /// so `push_call` never re-derives a receiver from them.
    fn collect_calls(&self, node: Node, calls: &mut Vec<CallSite>, enclosing_qualified: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "call" {
                let method_name = child.child_by_field_name("method").map(|m| self.text(m)).unwrap_or_default();
                if !method_name.is_empty() {
                    let callee_expr = match child.child_by_field_name("receiver") {
                        Some(receiver) => format!("{}.{}", self.text(receiver), method_name),
                        None => method_name,
                    };
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
    /// from a self receiver (§4.F.5).
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

    /// `include`/`extend` mixins, and the Rails association/validation/
    /// callback/scope/delegate DSL.
    fn visit_dsl_call(&mut self, node: Node, parent_qualified: &str, class_id: &str, visibility: &mut Visibility) {
        let method_name = node.child_by_field_name("method").map(|m| self.text(m)).unwrap_or_default();
        let line = node.start_position().row as u32 + 1;
        let args = first_arg_text(node, &self.ctx.source_bytes);

        match method_name.as_str() {
            "private" | "protected" | "public" => {
                *visibility = match method_name.as_str() {
                    "private" => Visibility::Private,
                    "protected" => Visibility::Protected,
                    _ => Visibility::Public,
                };
            }
            "include" | "extend" => {
                if let Some(target) = args {
                    self.push_pending(class_id, parent_qualified, &target, RelationType::Implements, line, Some("mixin".to_string()));
                }
            }
            "has_many" | "has_one" | "belongs_to" => {
                if let Some(assoc) = args {
                    let target = singularize_capitalize(assoc.trim_matches(':').trim_start_matches(':'));
                    self.push_pending(class_id, parent_qualified, &target, RelationType::References, line, Some(method_name));
                }
            }
            "validates" | "before_save" | "before_create" | "before_update" | "before_destroy" | "after_save"
            | "after_create" | "after_update" | "after_destroy" => {
                // Recorded as a class-level decorator rather than a relation.
                if let Some(entity) = self.result.entities.iter_mut().find(|e| &e.id == class_id) {
                    entity.decorators.push(method_name);
                }
            }
            "scope" => {
                if let Some(name) = args {
                    let scope_name = name.trim_start_matches(':').to_string();
                    let qualified_name = format!("{parent_qualified}.{scope_name}");
                    let id = stable_entity_id(&self.ctx.file_id, "method", &qualified_name);
                    self.result.entities.push(
                        CodeEntity::new(
                            id,
                            self.ctx.repository_id.clone(),
                            self.ctx.file_id.clone(),
                            qualified_name,
                            scope_name,
                            EntityKind::Method,
                            "ruby",
                            line,
                            line,
                        )
                        .with_decorators(vec!["scope".to_string()])
                        .with_attributes(EntityAttributes::Method(MethodAttributes {
                            function: FunctionAttributes::default(),
                            parent_class: parent_qualified.to_string(),
                            is_static: true,
                            is_classmethod: true,
                            is_property: false,
                            is_constructor: false,
                            overrides: None,
                        })),
                    );
                }
            }
            "delegate" => {
                if let Some(target) = args {
                    self.push_pending(class_id, parent_qualified, &target, RelationType::Calls, line, Some("delegate".to_string()));
                }
            }
            _ => {}
        }
    }

    fn visit_class_level_call(&mut self, node: Node, parent_chain: &[String], sep: &str, visibility: &mut Visibility) {
        // Calls at module/top level (outside a class) are rare in the
        // table's scope; only visibility directives matter here.
        let method_name = node.child_by_field_name("method").map(|m| self.text(m)).unwrap_or_default();
        if matches!(method_name.as_str(), "private" | "protected" | "public") {
            *visibility = match method_name.as_str() {
                "private" => Visibility::Private,
                "protected" => Visibility::Protected,
                _ => Visibility::Public,
            };
        }
        let _ = (parent_chain, sep);
    }

    fn visit_rake_namespace(&mut self, node: Node, parent_chain: &[String]) {
        let name = first_arg_text(node, &self.ctx.source_bytes).unwrap_or_default();
        let name = name.trim_matches(':').to_string();
        let qualified_name = self.qn(parent_chain, &name, ":");
        let id = stable_entity_id(&self.ctx.file_id, "module", &qualified_name);
        self.result.entities.push(CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            name.clone(),
            EntityKind::Module,
            "ruby",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        ));
        let mut child_chain = parent_chain.to_vec();
        child_chain.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_block(body, &child_chain, ":");
        }
    }

    fn visit_rake_call(&mut self, node: Node, parent_chain: &[String]) {
        let method_name = node.child_by_field_name("method").map(|m| self.text(m)).unwrap_or_default();
        if method_name != "task" {
            return;
        }
        let arg = first_arg_text(node, &self.ctx.source_bytes).unwrap_or_default();
        let task_name = arg.split(':').next().unwrap_or(&arg).trim_matches(':').to_string();
        let qualified_name = self.qn(parent_chain, &task_name, ":");
        let id = stable_entity_id(&self.ctx.file_id, "task", &qualified_name);
        self.result.entities.push(CodeEntity::new(
            id,
            self.ctx.repository_id.clone(),
            self.ctx.file_id.clone(),
            qualified_name,
            task_name,
            EntityKind::Task,
            "ruby",
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
        ));
    }

    fn visit_gemfile_call(&mut self, node: Node) {
        let method_name = node.child_by_field_name("method").map(|m| self.text(m)).unwrap_or_default();
        if method_name != "gem" {
            return;
        }
        let line = node.start_position().row as u32 + 1;
        let gem_name = first_arg_text(node, &self.ctx.source_bytes)
            .unwrap_or_default()
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();
        let id = stable_entity_id(&self.ctx.file_id, "import", &format!("{gem_name}@{line}"));
        self.result.entities.push(
            CodeEntity::new(
                id,
                self.ctx.repository_id.clone(),
                self.ctx.file_id.clone(),
                format!("{gem_name}@{line}"),
                gem_name.clone(),
                EntityKind::Import,
                "ruby",
                line,
                line,
            )
            .with_attributes(EntityAttributes::Import(ImportAttributes {
                source_module: gem_name,
                imported_symbols: Vec::new(),
                is_wildcard: false,
                is_relative: false,
                relative_level: 0,
                alias: None,
            })),
        );
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
        if let Some(c) = context {
            reference = reference.with_context(c);
        }
        self.result.pending_references.push(reference);
    }
}

fn first_arg_text(call_node: Node, source: &[u8]) -> Option<String> {
    let args = call_node.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    args.children(&mut cursor)
        .find(|c| !matches!(c.kind(), "(" | ")" | ","))
        .and_then(|n| n.utf8_text(source).ok())
        .map(|s| s.to_string())
}

fn singularize_capitalize(name: &str) -> String {
    let singular = name.strip_suffix("ies").map(|s| format!("{s}y")).unwrap_or_else(|| {
        name.strip_suffix('s').map(|s| s.to_string()).unwrap_or_else(|| name.to_string())
    });
    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => singular,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_with_mixin_and_association() {
        let source = "class Post < ApplicationRecord\n  include Trackable\n  belongs_to :author\nend\n";
        let ctx = ExtractionContext::new("app/models/post.rb", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = RubyExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.simple_name == "Post" && e.kind == EntityKind::Class));
        assert!(result.pending_references.iter().any(|r| r.target_qualified_name == "Trackable"));
        assert!(result.pending_references.iter().any(|r| r.target_qualified_name == "Author"));
    }

    #[test]
    fn extracts_gem_dependency() {
        let source = "source 'https://rubygems.org'\ngem 'rails', '~> 7.0'\n";
        let ctx = ExtractionContext::new("Gemfile", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = RubyExtractor.extract(&ctx);
        assert!(result.entities.iter().any(|e| e.kind == EntityKind::Import && e.simple_name == "rails"));
    }

    #[test]
    fn method_body_call_sites_resolve_self_and_keep_plain_receiver() {
        let source = "class Service\n  def run\n    self.helper\n    ctx.redis.get\n  end\n\n  def helper\n  end\nend\n";
        let ctx = ExtractionContext::new("app/models/service.rb", "file-1", "repo-1", source.as_bytes().to_vec());
        let result = RubyExtractor.extract(&ctx);

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

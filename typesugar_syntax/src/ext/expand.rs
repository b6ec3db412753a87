//! The expansion pipeline.
//!
//! Two phases per file. Setup scans imports and opt-out directives and
//! builds the binding cache. Expansion then walks the AST in post-order:
//! children are reduced before their parents, so macros that pattern-match
//! on already-reduced forms see them. After a successful expansion the
//! pipeline re-descends into the output, bounded by a per-site cap, a
//! global iteration budget, and a depth ceiling.
//!
//! One macro's failure is isolated to its call site: the diagnostic is
//! recorded, the original node is retained, and unrelated nodes keep
//! expanding.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use log::{debug, trace};

use typesugar_errors::Diagnostic;
use typesugar_pos::{HygieneContext, Span};

use crate::ast::{Arena, NodeId, NodeKind};
use crate::bindings::FileBindingCache;
use crate::cache::{CacheKey, CachedExpansion, ExpansionCache};
use crate::config::ExpansionConfig;
use crate::ext::base::{
    type_info_of, ExpandError, MacroContext, MacroDef, MacroKind, MacroPayload, MacroRegistry,
    StructuralOracle, TargetKind, TypeOracle,
};
use crate::factory::AstFactory;
use crate::parse::{self, Session};
use crate::printer::{self, MappedRegion};
use crate::scope::{Feature, ResolutionScope};
use crate::CancelToken;

/// The pipeline's output for one file.
#[derive(Clone, Debug)]
pub struct ExpansionResult {
    /// Transformed source text; equal to the input when nothing expanded
    /// or the file opted out.
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Printed regions that originated in user source.
    pub source_map: Vec<MappedRegion>,
    /// False when expansion was cancelled; the text is then partial.
    pub complete: bool,
}

/// Expand one file with the default (purely structural) type oracle.
pub fn expand_source(
    file_name: &str,
    source: &str,
    registry: &MacroRegistry,
    config: &ExpansionConfig,
    cancel: Option<CancelToken>,
) -> ExpansionResult {
    expand_source_with_oracle(file_name, source, registry, config, cancel, &StructuralOracle)
}

/// Expand one file through the memoization layer: a hit returns the
/// cached text and diagnostics without re-running the pipeline; a miss
/// expands, then populates the cache (cancelled runs are not cached).
pub fn expand_source_cached(
    file_name: &str,
    source: &str,
    registry: &MacroRegistry,
    config: &ExpansionConfig,
    cache: &ExpansionCache,
    cancel: Option<CancelToken>,
) -> ExpansionResult {
    let key = CacheKey::compute(source, &config.config_hash(), registry.version());
    if let Some(hit) = cache.get(key) {
        return ExpansionResult {
            text: hit.text,
            diagnostics: hit.diagnostics,
            source_map: Vec::new(),
            complete: true,
        };
    }
    let result = expand_source(file_name, source, registry, config, cancel);
    if result.complete {
        cache.put(
            key,
            CachedExpansion {
                text: result.text.clone(),
                diagnostics: result.diagnostics.clone(),
            },
        );
    }
    result
}

pub fn expand_source_with_oracle(
    file_name: &str,
    source: &str,
    registry: &MacroRegistry,
    config: &ExpansionConfig,
    cancel: Option<CancelToken>,
    oracle: &dyn TypeOracle,
) -> ExpansionResult {
    let sess = Session::new(file_name, source);
    let mut arena = Arena::new(source);

    let module = match parse::parse_module(&sess, &mut arena) {
        Ok(module) => module,
        Err(db) => {
            db.emit();
            // Parsing failed; hand back the input so downstream tooling
            // can proceed with error recovery.
            return ExpansionResult {
                text: source.to_string(),
                diagnostics: sess.diagnostics.snapshot(),
                source_map: Vec::new(),
                complete: true,
            };
        }
    };

    // Phase 1: setup.
    let bindings = FileBindingCache::build(&arena, module);
    let rscope = ResolutionScope::from_module(&arena, module, config);

    if rscope.opted_out {
        debug!("{}: file-level opt-out, returning input unchanged", file_name);
        return ExpansionResult {
            text: source.to_string(),
            diagnostics: sess.diagnostics.snapshot(),
            source_map: Vec::new(),
            complete: true,
        };
    }

    // Phase 2: post-order expansion.
    let mut expander = Expander {
        sess: &sess,
        arena: &mut arena,
        registry,
        config,
        oracle,
        hygiene: HygieneContext::new(&config.hygiene.prefix),
        bindings,
        rscope,
        cancel,
        site_counts: HashMap::new(),
        failed_sites: HashSet::new(),
        total: 0,
        budget_reported: false,
        depth: 0,
        cancelled: false,
    };
    expander.expand_module(module);
    let cancelled = expander.cancelled;
    let bindings = expander.into_bindings();

    // Inject the pending imports recorded by safe_ref.
    inject_pending_imports(&mut arena, module, &bindings);

    let printed = printer::print_module(&arena, module);
    if cancelled {
        sess.span_diagnostic
            .struct_err("expansion cancelled")
            .with_code("TS0301")
            .emit();
    }
    ExpansionResult {
        text: printed.text,
        diagnostics: sess.diagnostics.snapshot(),
        source_map: printed.source_map,
        complete: !cancelled,
    }
}

fn inject_pending_imports(arena: &mut Arena, module: NodeId, bindings: &FileBindingCache) {
    if !bindings.has_pending() {
        return;
    }
    let mut injected = Vec::new();
    for (module_name, specs) in bindings.pending_imports() {
        let decl = AstFactory::new(arena).import_named(specs, &module_name);
        injected.push(decl);
    }
    if let NodeKind::Module { body } = arena.kind(module).clone() {
        injected.extend(body);
        arena.set_kind(module, NodeKind::Module { body: injected });
    }
}

struct Expander<'a> {
    sess: &'a Session,
    arena: &'a mut Arena,
    registry: &'a MacroRegistry,
    config: &'a ExpansionConfig,
    oracle: &'a dyn TypeOracle,
    hygiene: HygieneContext,
    bindings: FileBindingCache,
    rscope: ResolutionScope,
    cancel: Option<CancelToken>,
    /// Consecutive expansions per call site.
    site_counts: HashMap<NodeId, u32>,
    /// Sites whose macro failed or whose budget ran out; never
    /// re-dispatched.
    failed_sites: HashSet<NodeId>,
    /// Total expansions in this file.
    total: u64,
    budget_reported: bool,
    depth: u32,
    cancelled: bool,
}

impl<'a> Expander<'a> {
    fn into_bindings(self) -> FileBindingCache {
        self.bindings
    }

    fn check_cancelled(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        if let Some(cancel) = &self.cancel {
            if cancel.is_cancelled() {
                self.cancelled = true;
                return true;
            }
        }
        false
    }

    fn opted_out(&self, node: NodeId, feature: Feature) -> bool {
        self.rscope
            .is_feature_opted_out(self.arena, self.sess, node, feature)
    }

    /// The budget gate, run before dispatching `site`. Reports at most
    /// one diagnostic per site (per-site cap) or per file (global cap).
    fn budget_ok(&mut self, site: NodeId, macro_name: &str) -> bool {
        let count = self.site_counts.entry(site).or_insert(0);
        *count += 1;
        if *count > self.config.expansion.per_site_limit {
            self.failed_sites.insert(site);
            self.report_at(
                site,
                "TS0104",
                &format!(
                    "macro `{}` re-expanded the same site more than {} times; giving up",
                    macro_name, self.config.expansion.per_site_limit
                ),
            );
            return false;
        }
        self.total += 1;
        if self.total > self.config.expansion.max_iterations {
            if !self.budget_reported {
                self.budget_reported = true;
                self.report_at(
                    site,
                    "TS0105",
                    &format!(
                        "file exceeded the global expansion budget of {} rewrites",
                        self.config.expansion.max_iterations
                    ),
                );
            }
            self.failed_sites.insert(site);
            return false;
        }
        if self.depth >= self.config.expansion.max_depth {
            self.failed_sites.insert(site);
            self.report_at(
                site,
                "TS0103",
                &format!(
                    "macro expansion exceeded the depth ceiling of {}",
                    self.config.expansion.max_depth
                ),
            );
            return false;
        }
        true
    }

    fn report_at(&self, node: NodeId, code: &str, message: &str) {
        let span = self.diag_span(node);
        self.sess
            .span_diagnostic
            .struct_span_err_with_code(span, message, code)
            .emit();
    }

    /// Synthetic nodes contribute no location; fall back to the nearest
    /// ancestor that has one.
    fn diag_span(&self, node: NodeId) -> Span {
        let span = self.arena.span(node);
        if !span.is_dummy() {
            return span;
        }
        for ancestor in self.arena.ancestors(node) {
            let span = self.arena.span(ancestor);
            if !span.is_dummy() {
                return span;
            }
        }
        typesugar_pos::DUMMY_SP
    }

    // ---- traversal ----

    fn expand_module(&mut self, module: NodeId) {
        let body = match self.arena.kind(module) {
            NodeKind::Module { body } => body.clone(),
            _ => return,
        };
        let body = self.expand_stmt_list(body);
        self.arena.set_kind(module, NodeKind::Module { body });
    }

    /// Expand a statement list with splicing: one statement may expand to
    /// several, and labeled-block macros may consume following
    /// continuation statements.
    fn expand_stmt_list(&mut self, stmts: Vec<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut index = 0;
        while index < stmts.len() {
            if self.check_cancelled() {
                out.extend_from_slice(&stmts[index..]);
                break;
            }
            let stmt = stmts[index];
            if let Some(consumed) = self.try_labeled_block(stmt, &stmts[index + 1..], &mut out) {
                index += 1 + consumed;
                continue;
            }
            let expanded = self.expand_stmt(stmt);
            out.extend(expanded);
            index += 1;
        }
        out
    }

    /// Labeled-block dispatch with continuation lookahead. Returns the
    /// number of *extra* statements consumed when the site dispatched.
    fn try_labeled_block(
        &mut self,
        stmt: NodeId,
        rest: &[NodeId],
        out: &mut Vec<NodeId>,
    ) -> Option<usize> {
        let (label, body) = match self.arena.kind(stmt) {
            NodeKind::Labeled { label, body } => (label.clone(), *body),
            _ => return None,
        };
        if self.failed_sites.contains(&stmt) {
            return None;
        }
        let def = self.registry.labeled_block(&label)?;
        if self.opted_out(stmt, Feature::Macros) {
            return None;
        }
        let continuation_labels = match &def.payload {
            MacroPayload::LabeledBlock {
                continuation_labels,
                ..
            } => continuation_labels.clone(),
            _ => return None,
        };

        let mut continuations = Vec::new();
        for &next in rest {
            match self.arena.kind(next) {
                NodeKind::Labeled { label, body } if continuation_labels.contains(label) => {
                    continuations.push((label.clone(), *body));
                }
                _ => break,
            }
        }
        let consumed = continuations.len();

        // Post-order: reduce the bodies before handing them over.
        self.expand_children(body);
        for &(_, continuation_body) in &continuations {
            self.expand_children(continuation_body);
        }

        if !self.budget_ok(stmt, &label) {
            out.extend(self.expand_stmt(stmt));
            return Some(0);
        }

        let call_site = self.arena.span(stmt);
        let result = self.invoke(&def, call_site, |cx, payload| match payload {
            MacroPayload::LabeledBlock { expander, .. } => {
                expander.expand(cx, body, &continuations)
            }
            _ => unreachable!("labeled-block definition"),
        });
        match result {
            Some(replacement) => {
                trace!("labeled-block `{}` expanded", label);
                self.depth += 1;
                let expanded = self.expand_stmt(replacement);
                self.depth -= 1;
                out.extend(expanded);
                Some(consumed)
            }
            None => {
                self.failed_sites.insert(stmt);
                out.extend(self.expand_stmt(stmt));
                Some(0)
            }
        }
    }

    /// Post-order expansion of one statement; may splice into several.
    fn expand_stmt(&mut self, stmt: NodeId) -> Vec<NodeId> {
        if self.check_cancelled() {
            return vec![stmt];
        }
        self.expand_children(stmt);
        match self.arena.kind(stmt) {
            NodeKind::ClassDecl { .. }
            | NodeKind::InterfaceDecl { .. }
            | NodeKind::TypeAliasDecl { .. }
            | NodeKind::FuncDecl { .. }
            | NodeKind::EnumDecl { .. } => self.expand_decl(stmt),
            // A labeled statement in non-list position dispatches without
            // continuations.
            NodeKind::Labeled { .. } => {
                let mut out = Vec::new();
                if self.try_labeled_block(stmt, &[], &mut out).is_some() {
                    out
                } else {
                    vec![stmt]
                }
            }
            _ => vec![stmt],
        }
    }

    /// Post-order walk below `node`: expression children are expanded in
    /// place, statement lists are spliced.
    fn expand_children(&mut self, node: NodeId) {
        if self.check_cancelled() {
            return;
        }
        match self.arena.kind(node).clone() {
            NodeKind::Block { stmts } => {
                let stmts = self.expand_stmt_list(stmts);
                self.arena.set_kind(node, NodeKind::Block { stmts });
            }
            NodeKind::Module { .. } => self.expand_module(node),
            kind => {
                let children = kind.children();
                for child in children {
                    self.expand_node(child);
                }
            }
        }
    }

    /// Expand an expression/type node in place: children first, then the
    /// node itself, re-descending into output until a fixed point or a
    /// budget stop.
    fn expand_node(&mut self, node: NodeId) {
        if self.check_cancelled() {
            return;
        }
        if self.arena.kind(node).is_stmt() {
            // Statement-shaped child (arrow block bodies, nested decls).
            self.expand_children(node);
            return;
        }
        self.expand_children(node);
        loop {
            if self.check_cancelled() || self.failed_sites.contains(&node) {
                return;
            }
            let (def, invocation) = match self.detect_invocation(node) {
                Some(pair) => pair,
                None => return,
            };
            if !self.budget_ok(node, &def.name) {
                return;
            }
            let call_site = self.diag_span(node);
            let outcome = match invocation {
                Invocation::Expression { args } => {
                    self.invoke(&def, call_site, |cx, payload| match payload {
                        MacroPayload::Expression(expander) => expander.expand(cx, node, &args),
                        _ => unreachable!("expression definition"),
                    })
                }
                Invocation::TaggedTemplate { template } => {
                    self.invoke(&def, call_site, |cx, payload| match payload {
                        MacroPayload::TaggedTemplate { expander, .. } => {
                            expander.expand(cx, template)
                        }
                        _ => unreachable!("tagged-template definition"),
                    })
                }
                Invocation::TypeLevel { args } => {
                    self.invoke(&def, call_site, |cx, payload| match payload {
                        MacroPayload::TypeLevel(expander) => expander.expand(cx, node, &args),
                        _ => unreachable!("type-level definition"),
                    })
                }
            };
            match outcome {
                Some(replacement) if self.arena.kind(replacement).is_stmt() => {
                    // A block-shaped expansion replaces the enclosing
                    // expression statement.
                    let parent = self.arena.parent(node);
                    match parent {
                        Some(parent)
                            if matches!(
                                self.arena.kind(parent),
                                NodeKind::ExprStmt { .. }
                            ) =>
                        {
                            self.arena.replace(parent, replacement);
                            self.depth += 1;
                            self.expand_children(parent);
                            self.depth -= 1;
                        }
                        _ => {
                            self.report_at(
                                node,
                                "TS0101",
                                &format!(
                                    "macro `{}` produced a statement in expression position",
                                    def.name
                                ),
                            );
                            self.failed_sites.insert(node);
                        }
                    }
                    return;
                }
                Some(replacement) => {
                    self.arena.replace(node, replacement);
                    // Re-descend into the expansion output; nested
                    // invocations inside it expand now, and the loop
                    // re-dispatches the node itself.
                    self.depth += 1;
                    self.expand_children(node);
                    self.depth -= 1;
                }
                None => {
                    self.failed_sites.insert(node);
                    return;
                }
            }
        }
    }

    // ---- dispatch ----

    /// Resolve a local name to a macro definition of `kind`, honoring
    /// import scoping: a definition carrying a module activates only when
    /// the name is imported from that module, and aliased imports resolve
    /// through the `(module, export)` index.
    fn resolve_macro(&self, kind: MacroKind, local_name: &str) -> Option<Rc<MacroDef>> {
        if let Some((module, imported)) = self.bindings.import_entry(local_name) {
            if let Some(def) = self.registry.get_by_module(module, imported) {
                if def.kind() == kind {
                    return Some(def);
                }
            }
        }
        let def = self.registry.get(kind, local_name)?;
        match &def.module {
            None => Some(def),
            Some(required) => match self.bindings.import_origin(local_name) {
                Some(origin) if origin == required => Some(def),
                _ => None,
            },
        }
    }

    fn detect_invocation(&mut self, node: NodeId) -> Option<(Rc<MacroDef>, Invocation)> {
        // A decorator's own expression is attribute/derive surface, not an
        // expression macro call site.
        if let Some(parent) = self.arena.parent(node) {
            if matches!(self.arena.kind(parent), NodeKind::Decorator { .. }) {
                return None;
            }
        }
        match self.arena.kind(node).clone() {
            NodeKind::Call { callee, args } => {
                let name = match self.arena.kind(callee) {
                    NodeKind::Ident { name } => name.clone(),
                    _ => return None,
                };
                let def = self.resolve_macro(MacroKind::Expression, &name)?;
                if self.opted_out(node, Feature::Macros) {
                    return None;
                }
                Some((def, Invocation::Expression { args }))
            }
            NodeKind::TaggedTemplate { tag, template } => {
                let name = match self.arena.kind(tag) {
                    NodeKind::Ident { name } => name.clone(),
                    _ => return None,
                };
                let def = self.resolve_macro(MacroKind::TaggedTemplate, &name)?;
                if self.opted_out(node, Feature::Macros) {
                    return None;
                }
                if let MacroPayload::TaggedTemplate {
                    validate: Some(validate),
                    ..
                } = &def.payload
                {
                    let text = printer::expr_to_string(self.arena, template);
                    if let Err(message) = validate(&text) {
                        self.report_at(
                            node,
                            "TS0108",
                            &format!("invalid `{}` template: {}", name, message),
                        );
                        self.failed_sites.insert(node);
                        return None;
                    }
                }
                Some((def, Invocation::TaggedTemplate { template }))
            }
            NodeKind::TypeRef { name, args } => {
                let def = self.resolve_macro(MacroKind::TypeLevel, &name)?;
                if self.opted_out(node, Feature::Macros) {
                    return None;
                }
                Some((def, Invocation::TypeLevel { args }))
            }
            _ => None,
        }
    }

    /// Attribute and derive dispatch on a declaration statement.
    fn expand_decl(&mut self, decl: NodeId) -> Vec<NodeId> {
        let decorators = decorators_of(self.arena.kind(decl));
        if decorators.is_empty() {
            return vec![decl];
        }

        for decorator in decorators {
            if self.check_cancelled() || self.failed_sites.contains(&decl) {
                break;
            }
            let (name, args) = match decompose_decorator(self.arena, decorator) {
                Some(parts) => parts,
                None => continue,
            };

            if name == "derive" {
                if self.opted_out(decl, Feature::Derive) {
                    continue;
                }
                let generated = self.dispatch_derives(decl, decorator, &args);
                if generated.is_empty() {
                    continue;
                }
                remove_decorator(self.arena, decl, decorator);
                self.depth += 1;
                let mut expanded = Vec::new();
                for stmt in generated {
                    expanded.extend(self.expand_stmt(stmt));
                }
                self.depth -= 1;
                // Remaining decorators dispatch recursively now that this
                // one is gone; the generated statements follow the decl.
                let mut out = self.expand_decl(decl);
                out.extend(expanded);
                return out;
            }

            let def = match self.resolve_macro(MacroKind::Attribute, &name) {
                Some(def) => def,
                None => continue,
            };
            if self.opted_out(decl, Feature::Macros) {
                continue;
            }
            let valid_targets = match &def.payload {
                MacroPayload::Attribute { valid_targets, .. } => valid_targets.clone(),
                _ => continue,
            };
            let target_kind = TargetKind::of(self.arena, decl);
            if target_kind.map_or(true, |kind| !valid_targets.contains(&kind)) {
                // Kind mismatch: diagnostic at the decorator, target
                // returned unchanged.
                self.report_at(
                    decorator,
                    "TS0102",
                    &format!(
                        "attribute macro `{}` cannot be applied to a {}",
                        name,
                        target_kind.map_or("statement", TargetKind::as_str)
                    ),
                );
                self.failed_sites.insert(decl);
                continue;
            }
            if !self.budget_ok(decl, &name) {
                break;
            }
            let call_site = self
                .arena
                .span(decorator)
                .substitute_dummy(self.arena.span(decl));
            let result = self.invoke(&def, call_site, |cx, payload| match payload {
                MacroPayload::Attribute { expander, .. } => {
                    expander.expand(cx, decorator, decl, &args)
                }
                _ => unreachable!("attribute definition"),
            });
            match result {
                Some(replacement) => {
                    // Consume the decorator only on success; a failed
                    // macro leaves the declaration as written.
                    remove_decorator(self.arena, decl, decorator);
                    self.depth += 1;
                    let mut out = Vec::new();
                    for stmt in replacement {
                        out.extend(self.expand_stmt(stmt));
                    }
                    self.depth -= 1;
                    return out;
                }
                None => {
                    self.failed_sites.insert(decl);
                }
            }
        }
        vec![decl]
    }

    /// Run every derive named by one `@derive(...)` decorator, collecting
    /// the generated statements.
    fn dispatch_derives(
        &mut self,
        decl: NodeId,
        decorator: NodeId,
        args: &[NodeId],
    ) -> Vec<NodeId> {
        let mut generated = Vec::new();
        let info = match type_info_of(self.arena, decl) {
            Some(info) => info,
            None => return generated,
        };
        if !matches!(
            info.kind,
            TargetKind::Interface | TargetKind::Class | TargetKind::TypeAlias
        ) {
            self.report_at(
                decorator,
                "TS0102",
                &format!("`derive` cannot be applied to a {}", info.kind.as_str()),
            );
            return generated;
        }
        for &arg in args {
            let name = match self.arena.kind(arg) {
                NodeKind::Ident { name } => name.clone(),
                _ => {
                    self.report_at(arg, "TS0107", "derive arguments must be plain names");
                    continue;
                }
            };
            let def = match self.resolve_macro(MacroKind::Derive, &name) {
                Some(def) => def,
                None => {
                    self.report_at(
                        arg,
                        "TS0107",
                        &format!("no derive macro named `{}` is registered", name),
                    );
                    continue;
                }
            };
            if !self.budget_ok(decl, &name) {
                break;
            }
            let call_site = self.arena.span(decorator).substitute_dummy(self.arena.span(decl));
            let info = info.clone();
            let result = self.invoke(&def, call_site, |cx, payload| match payload {
                MacroPayload::Derive(expander) => expander.expand(cx, decl, &info),
                _ => unreachable!("derive definition"),
            });
            if let Some(stmts) = result {
                generated.extend(stmts);
            }
        }
        generated
    }

    // ---- invocation ----

    /// Run one macro callback inside a fresh hygiene scope, isolating
    /// panics and reported failures to the call site.
    fn invoke<T>(
        &mut self,
        def: &Rc<MacroDef>,
        call_site: Span,
        f: impl FnOnce(&mut MacroContext<'_>, &MacroPayload) -> Result<T, ExpandError>,
    ) -> Option<T> {
        if self.check_cancelled() {
            return None;
        }
        self.hygiene.push_scope();
        let outcome = {
            let mut cx = MacroContext {
                sess: self.sess,
                arena: &mut *self.arena,
                hygiene: &mut self.hygiene,
                bindings: &mut self.bindings,
                config: self.config,
                oracle: self.oracle,
                call_site,
                macro_name: def.name.clone(),
                cacheable: def.cacheable,
                cancel: self.cancel.clone(),
            };
            panic::catch_unwind(AssertUnwindSafe(|| f(&mut cx, &def.payload)))
        };
        self.hygiene.pop_scope();
        match outcome {
            Ok(Ok(value)) => Some(value),
            Ok(Err(ExpandError::Reported)) => None,
            Ok(Err(ExpandError::Message(message))) => {
                self.sess
                    .span_diagnostic
                    .struct_span_err_with_code(
                        call_site,
                        &format!("macro `{}` failed: {}", def.name, message),
                        "TS0101",
                    )
                    .emit();
                None
            }
            Err(payload) => {
                let detail = panic_message(&payload);
                self.sess
                    .span_diagnostic
                    .struct_span_err_with_code(
                        call_site,
                        &format!("macro `{}` panicked: {}", def.name, detail),
                        "TS0101",
                    )
                    .emit();
                None
            }
        }
    }
}

enum Invocation {
    Expression { args: Vec<NodeId> },
    TaggedTemplate { template: NodeId },
    TypeLevel { args: Vec<NodeId> },
}

fn decorators_of(kind: &NodeKind) -> Vec<NodeId> {
    match kind {
        NodeKind::ClassDecl { decorators, .. }
        | NodeKind::InterfaceDecl { decorators, .. }
        | NodeKind::TypeAliasDecl { decorators, .. }
        | NodeKind::FuncDecl { decorators, .. } => decorators.clone(),
        _ => Vec::new(),
    }
}

/// The decorator's macro name and argument list.
fn decompose_decorator(arena: &Arena, decorator: NodeId) -> Option<(String, Vec<NodeId>)> {
    let expr = match arena.kind(decorator) {
        NodeKind::Decorator { expr } => *expr,
        _ => return None,
    };
    match arena.kind(expr) {
        NodeKind::Ident { name } => Some((name.clone(), Vec::new())),
        NodeKind::Call { callee, args } => match arena.kind(*callee) {
            NodeKind::Ident { name } => Some((name.clone(), args.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn remove_decorator(arena: &mut Arena, decl: NodeId, decorator: NodeId) {
    let mut kind = arena.kind(decl).clone();
    match &mut kind {
        NodeKind::ClassDecl { decorators, .. }
        | NodeKind::InterfaceDecl { decorators, .. }
        | NodeKind::TypeAliasDecl { decorators, .. }
        | NodeKind::FuncDecl { decorators, .. } => {
            decorators.retain(|&d| d != decorator);
        }
        _ => return,
    }
    arena.set_kind(decl, kind);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

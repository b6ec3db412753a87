//! Macro kinds, the authoring contract, and the kind-indexed registry.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use typesugar_errors::DiagnosticBuilder;
use typesugar_pos::{HygieneContext, Span};

use crate::ast::{Arena, NodeId, NodeKind};
use crate::bindings::FileBindingCache;
use crate::comptime::{eval, CapabilityGrant, ComptimeError, ComptimeValue};
use crate::config::ExpansionConfig;
use crate::factory::AstFactory;
use crate::parse::{self, Session};
use crate::CancelToken;

/// Represents the different kinds of macro invocations that can be
/// resolved.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Debug)]
pub enum MacroKind {
    /// A call whose callee names a macro - `swap(a, b)`.
    Expression,
    /// A decorator - `@memoize class C {}`.
    Attribute,
    /// The `derive` decorator's argument - `@derive(Show)`.
    Derive,
    /// A tagged template - sql`select 1`.
    TaggedTemplate,
    /// A labeled statement - `query: { ... }`.
    LabeledBlock,
    /// A type reference - `type X = Refine<...>`.
    TypeLevel,
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MacroKind::Expression => "expression",
            MacroKind::Attribute => "attribute",
            MacroKind::Derive => "derive",
            MacroKind::TaggedTemplate => "tagged-template",
            MacroKind::LabeledBlock => "labeled-block",
            MacroKind::TypeLevel => "type-level",
        };
        f.write_str(text)
    }
}

/// Declaration kinds an attribute macro may attach to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TargetKind {
    Class,
    Interface,
    Function,
    TypeAlias,
    Enum,
}

impl TargetKind {
    pub fn of(arena: &Arena, node: NodeId) -> Option<TargetKind> {
        Some(match arena.kind(node) {
            NodeKind::ClassDecl { .. } => TargetKind::Class,
            NodeKind::InterfaceDecl { .. } => TargetKind::Interface,
            NodeKind::FuncDecl { .. } => TargetKind::Function,
            NodeKind::TypeAliasDecl { .. } => TargetKind::TypeAlias,
            NodeKind::EnumDecl { .. } => TargetKind::Enum,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Class => "class",
            TargetKind::Interface => "interface",
            TargetKind::Function => "function",
            TargetKind::TypeAlias => "type alias",
            TargetKind::Enum => "enum",
        }
    }
}

/// Shallow structural description of a derive target, handed to derive
/// callbacks.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TargetKind,
    /// Field name plus printed type text.
    pub fields: Vec<(String, String)>,
}

/// How a failed expansion is reported.
#[derive(Debug)]
pub enum ExpandError {
    /// The macro already reported through the context.
    Reported,
    /// Report this message at the call site.
    Message(String),
}

pub type ExpandResult<T> = Result<T, ExpandError>;

pub trait ExpressionMacro {
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        call: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<NodeId>;
}

impl<F> ExpressionMacro for F
where
    F: Fn(&mut MacroContext<'_>, NodeId, &[NodeId]) -> ExpandResult<NodeId>,
{
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        call: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<NodeId> {
        (*self)(cx, call, args)
    }
}

pub trait AttributeMacro {
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        decorator: NodeId,
        target: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<Vec<NodeId>>;
}

impl<F> AttributeMacro for F
where
    F: Fn(&mut MacroContext<'_>, NodeId, NodeId, &[NodeId]) -> ExpandResult<Vec<NodeId>>,
{
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        decorator: NodeId,
        target: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<Vec<NodeId>> {
        (*self)(cx, decorator, target, args)
    }
}

pub trait DeriveMacro {
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        target: NodeId,
        info: &TypeInfo,
    ) -> ExpandResult<Vec<NodeId>>;
}

impl<F> DeriveMacro for F
where
    F: Fn(&mut MacroContext<'_>, NodeId, &TypeInfo) -> ExpandResult<Vec<NodeId>>,
{
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        target: NodeId,
        info: &TypeInfo,
    ) -> ExpandResult<Vec<NodeId>> {
        (*self)(cx, target, info)
    }
}

pub trait TemplateMacro {
    fn expand(&self, cx: &mut MacroContext<'_>, template: NodeId) -> ExpandResult<NodeId>;
}

impl<F> TemplateMacro for F
where
    F: Fn(&mut MacroContext<'_>, NodeId) -> ExpandResult<NodeId>,
{
    fn expand(&self, cx: &mut MacroContext<'_>, template: NodeId) -> ExpandResult<NodeId> {
        (*self)(cx, template)
    }
}

pub trait LabeledBlockMacro {
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        main: NodeId,
        continuations: &[(String, NodeId)],
    ) -> ExpandResult<NodeId>;
}

impl<F> LabeledBlockMacro for F
where
    F: Fn(&mut MacroContext<'_>, NodeId, &[(String, NodeId)]) -> ExpandResult<NodeId>,
{
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        main: NodeId,
        continuations: &[(String, NodeId)],
    ) -> ExpandResult<NodeId> {
        (*self)(cx, main, continuations)
    }
}

pub trait TypeMacro {
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        type_ref: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<NodeId>;
}

impl<F> TypeMacro for F
where
    F: Fn(&mut MacroContext<'_>, NodeId, &[NodeId]) -> ExpandResult<NodeId>,
{
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        type_ref: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<NodeId> {
        (*self)(cx, type_ref, args)
    }
}

/// Template string validation hook for tagged-template macros.
pub type TemplateValidator = Box<dyn Fn(&str) -> Result<(), String>>;

/// Kind-specific payload of a macro definition.
pub enum MacroPayload {
    Expression(Box<dyn ExpressionMacro>),
    Attribute {
        valid_targets: Vec<TargetKind>,
        expander: Box<dyn AttributeMacro>,
    },
    Derive(Box<dyn DeriveMacro>),
    TaggedTemplate {
        expander: Box<dyn TemplateMacro>,
        validate: Option<TemplateValidator>,
    },
    LabeledBlock {
        label: String,
        continuation_labels: Vec<String>,
        expander: Box<dyn LabeledBlockMacro>,
    },
    TypeLevel(Box<dyn TypeMacro>),
}

/// One registered macro: common metadata plus the kind payload.
pub struct MacroDef {
    pub name: String,
    /// When set, the macro activates only if its name is imported from
    /// this module; when unset, activation is name-based.
    pub module: Option<String>,
    pub export_name: Option<String>,
    pub description: Option<String>,
    pub cacheable: bool,
    pub payload: MacroPayload,
}

impl MacroDef {
    pub fn kind(&self) -> MacroKind {
        match self.payload {
            MacroPayload::Expression(..) => MacroKind::Expression,
            MacroPayload::Attribute { .. } => MacroKind::Attribute,
            MacroPayload::Derive(..) => MacroKind::Derive,
            MacroPayload::TaggedTemplate { .. } => MacroKind::TaggedTemplate,
            MacroPayload::LabeledBlock { .. } => MacroKind::LabeledBlock,
            MacroPayload::TypeLevel(..) => MacroKind::TypeLevel,
        }
    }

    pub fn expression(name: &str, expander: impl ExpressionMacro + 'static) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            module: None,
            export_name: None,
            description: None,
            cacheable: false,
            payload: MacroPayload::Expression(Box::new(expander)),
        }
    }

    pub fn attribute(
        name: &str,
        valid_targets: Vec<TargetKind>,
        expander: impl AttributeMacro + 'static,
    ) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            module: None,
            export_name: None,
            description: None,
            cacheable: false,
            payload: MacroPayload::Attribute {
                valid_targets,
                expander: Box::new(expander),
            },
        }
    }

    pub fn derive(name: &str, expander: impl DeriveMacro + 'static) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            module: None,
            export_name: None,
            description: None,
            cacheable: false,
            payload: MacroPayload::Derive(Box::new(expander)),
        }
    }

    pub fn tagged_template(name: &str, expander: impl TemplateMacro + 'static) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            module: None,
            export_name: None,
            description: None,
            cacheable: false,
            payload: MacroPayload::TaggedTemplate {
                expander: Box::new(expander),
                validate: None,
            },
        }
    }

    pub fn labeled_block(
        label: &str,
        continuation_labels: Vec<String>,
        expander: impl LabeledBlockMacro + 'static,
    ) -> MacroDef {
        MacroDef {
            name: label.to_string(),
            module: None,
            export_name: None,
            description: None,
            cacheable: false,
            payload: MacroPayload::LabeledBlock {
                label: label.to_string(),
                continuation_labels,
                expander: Box::new(expander),
            },
        }
    }

    pub fn type_level(name: &str, expander: impl TypeMacro + 'static) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            module: None,
            export_name: None,
            description: None,
            cacheable: false,
            payload: MacroPayload::TypeLevel(Box::new(expander)),
        }
    }

    pub fn with_module(mut self, module: &str, export_name: &str) -> MacroDef {
        self.module = Some(module.to_string());
        self.export_name = Some(export_name.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> MacroDef {
        self.description = Some(description.to_string());
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> MacroDef {
        self.cacheable = cacheable;
        self
    }
}

/// Registration collision policy, chosen at registry construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryPolicy {
    /// Replace the existing definition, warning about it.
    WarnReplace,
    /// Reject the new definition.
    Reject,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a {kind} macro named `{name}` is already registered")]
    Duplicate { kind: MacroKind, name: String },
}

/// Kind-indexed store of macro definitions.
///
/// Two indexes are maintained in parallel: `(kind, name)` and, for
/// import-scoped macros, `(module, export)`. Construction happens before
/// expansion starts; the registry is read-only afterwards.
pub struct MacroRegistry {
    by_name: HashMap<(MacroKind, String), Rc<MacroDef>>,
    by_module: HashMap<(String, String), Rc<MacroDef>>,
    policy: RegistryPolicy,
    version: u64,
}

impl Default for MacroRegistry {
    fn default() -> MacroRegistry {
        MacroRegistry::new(RegistryPolicy::WarnReplace)
    }
}

impl MacroRegistry {
    pub fn new(policy: RegistryPolicy) -> MacroRegistry {
        MacroRegistry {
            by_name: HashMap::new(),
            by_module: HashMap::new(),
            policy,
            version: 0,
        }
    }

    /// Monotone version, bumped on every successful registration. Feeds
    /// expansion cache keys.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn register(&mut self, def: MacroDef) -> Result<(), RegistryError> {
        let kind = def.kind();
        let key = (kind, def.name.clone());
        if self.by_name.contains_key(&key) {
            match self.policy {
                RegistryPolicy::Reject => {
                    return Err(RegistryError::Duplicate {
                        kind,
                        name: def.name,
                    });
                }
                RegistryPolicy::WarnReplace => {
                    warn!(
                        "replacing existing {} macro `{}` (last registration wins)",
                        kind, def.name
                    );
                }
            }
        }
        let def = Rc::new(def);
        if let (Some(module), Some(export)) = (&def.module, &def.export_name) {
            self.by_module
                .insert((module.clone(), export.clone()), def.clone());
        }
        self.by_name.insert(key, def);
        self.version += 1;
        Ok(())
    }

    pub fn get(&self, kind: MacroKind, name: &str) -> Option<Rc<MacroDef>> {
        self.by_name.get(&(kind, name.to_string())).cloned()
    }

    pub fn get_by_module(&self, module: &str, export: &str) -> Option<Rc<MacroDef>> {
        self.by_module
            .get(&(module.to_string(), export.to_string()))
            .cloned()
    }

    /// Whether the matching definition requires an import from a specific
    /// module to activate.
    pub fn is_import_scoped(&self, name: &str, kind: MacroKind) -> bool {
        self.get(kind, name)
            .map_or(false, |def| def.module.is_some())
    }

    /// Labeled-block definitions, for continuation-label lookahead.
    pub fn labeled_block(&self, label: &str) -> Option<Rc<MacroDef>> {
        self.get(MacroKind::LabeledBlock, label)
    }
}

/// Host type-checker delegation surface. The engine itself never resolves
/// types; macro authors get whatever the host provides.
pub trait TypeOracle {
    /// A printable type for the node, best-effort.
    fn type_string(&self, arena: &Arena, node: NodeId) -> String;
    /// An opaque handle usable with the other oracle methods.
    fn type_of(&self, arena: &Arena, node: NodeId) -> Option<ComptimeValue>;
    fn is_assignable_to(&self, source: &str, target: &str) -> bool;
    fn properties_of(&self, type_name: &str) -> Vec<(String, String)>;
    fn symbol_of(&self, arena: &Arena, node: NodeId) -> Option<String>;
}

/// Purely syntactic fallback oracle: literal types from literal syntax,
/// `unknown` for everything else.
pub struct StructuralOracle;

impl TypeOracle for StructuralOracle {
    fn type_string(&self, arena: &Arena, node: NodeId) -> String {
        match arena.kind(node) {
            NodeKind::NumberLit { .. } => "number".to_string(),
            NodeKind::StringLit { .. } | NodeKind::TemplateLit { .. } => "string".to_string(),
            NodeKind::BoolLit { .. } => "boolean".to_string(),
            NodeKind::BigIntLit { .. } => "bigint".to_string(),
            NodeKind::NullLit => "null".to_string(),
            NodeKind::ArrayLit { .. } => "unknown[]".to_string(),
            NodeKind::ObjectLit { .. } => "object".to_string(),
            NodeKind::Arrow { .. } => "function".to_string(),
            NodeKind::TypeRef { name, .. } => name.clone(),
            _ => "unknown".to_string(),
        }
    }

    fn type_of(&self, arena: &Arena, node: NodeId) -> Option<ComptimeValue> {
        Some(ComptimeValue::TypeHandle(self.type_string(arena, node)))
    }

    fn is_assignable_to(&self, source: &str, target: &str) -> bool {
        source == target || target == "unknown"
    }

    fn properties_of(&self, _type_name: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    fn symbol_of(&self, arena: &Arena, node: NodeId) -> Option<String> {
        match arena.kind(node) {
            NodeKind::Ident { name } => Some(name.clone()),
            NodeKind::TypeRef { name, .. } => Some(name.clone()),
            _ => None,
        }
    }
}

/// One of these is made per macro invocation; everything a macro callback
/// may touch goes through it.
pub struct MacroContext<'a> {
    pub sess: &'a Session,
    pub arena: &'a mut Arena,
    pub hygiene: &'a mut HygieneContext,
    pub bindings: &'a mut FileBindingCache,
    pub config: &'a ExpansionConfig,
    pub oracle: &'a dyn TypeOracle,
    /// The span of the macro invocation being expanded. Synthetic nodes
    /// fall back to it for diagnostics.
    pub call_site: Span,
    pub macro_name: String,
    /// Whether the macro declared itself cacheable; cacheable macros may
    /// not use non-deterministic comptime primitives.
    pub cacheable: bool,
    pub cancel: Option<CancelToken>,
}

impl<'a> MacroContext<'a> {
    /// AST construction helpers.
    pub fn factory(&mut self) -> AstFactory<'_> {
        AstFactory::new(self.arena)
    }

    // ---- hygiene ----

    /// A fresh (or scope-memoized) mangled name for `logical`.
    pub fn generate_unique_name(&mut self, logical: &str) -> String {
        self.hygiene.mangle_name(logical)
    }

    /// An identifier whose text is hygienically mangled.
    pub fn hygienic_ident(&mut self, logical: &str) -> NodeId {
        let text = self.hygiene.mangle_name(logical);
        AstFactory::new(self.arena).ident(&text)
    }

    /// An identifier with exactly the given text: intentional capture.
    pub fn unhygienic_ident(&mut self, text: &str) -> NodeId {
        AstFactory::new(self.arena).ident(text)
    }

    /// A reference to `symbol` from `module` that survives user
    /// shadowing; the pipeline injects any import this records.
    pub fn safe_ref(&mut self, symbol: &str, module: &str) -> NodeId {
        let text = self.bindings.safe_ref(symbol, module);
        AstFactory::new(self.arena).ident(&text)
    }

    // ---- diagnostics ----

    fn diag_span(&self, node: NodeId) -> Span {
        self.arena.span(node).substitute_dummy(self.call_site)
    }

    pub fn report_error(&self, code: &str, node: NodeId, message: &str) {
        let span = self.diag_span(node);
        self.sess
            .span_diagnostic
            .struct_span_err_with_code(span, message, code)
            .emit();
    }

    pub fn report_warning(&self, code: &str, node: NodeId, message: &str) {
        let span = self.diag_span(node);
        self.sess
            .span_diagnostic
            .struct_span_warn(span, message)
            .with_code(code)
            .emit();
    }

    pub fn report_info(&self, code: &str, node: NodeId, message: &str) {
        let span = self.diag_span(node);
        self.sess
            .span_diagnostic
            .struct_span_note(span, message)
            .with_code(code)
            .emit();
    }

    pub fn struct_error(&self, node: NodeId, message: &str) -> DiagnosticBuilder<'a> {
        self.sess
            .span_diagnostic
            .struct_span_err(self.diag_span(node), message)
    }

    // ---- comptime ----

    pub fn is_comptime(&self, node: NodeId) -> bool {
        eval::is_comptime(self.arena, node, &self.config.comptime)
    }

    /// Pure constant evaluation.
    pub fn evaluate(&self, node: NodeId) -> Result<ComptimeValue, ComptimeError> {
        eval::fold(self.arena, node, &self.config.comptime)
    }

    /// Sandboxed evaluation under `grant`. A cacheable macro's evaluation
    /// rejects non-deterministic primitives.
    pub fn evaluate_sandboxed(
        &self,
        node: NodeId,
        grant: CapabilityGrant,
    ) -> Result<eval::EvalOutcome, ComptimeError> {
        eval::run_sandboxed(
            self.arena,
            node,
            &self.config.comptime,
            grant,
            self.cancel.clone(),
            self.cacheable,
        )
    }

    pub fn comptime_value_to_expression(
        &mut self,
        value: &ComptimeValue,
    ) -> Result<NodeId, ComptimeError> {
        eval::value_to_expr(self.arena, value)
    }

    // ---- parsing ----

    /// Parse a source snippet into synthetic statements.
    pub fn parse_stmts(&mut self, text: &str) -> ExpandResult<Vec<NodeId>> {
        match parse::parse_snippet_stmts(self.sess, self.arena, text) {
            Ok(stmts) => Ok(stmts),
            Err(db) => {
                db.emit();
                Err(ExpandError::Reported)
            }
        }
    }

    /// Parse a source snippet into a synthetic expression.
    pub fn parse_expr(&mut self, text: &str) -> ExpandResult<NodeId> {
        match parse::parse_snippet_expr(self.sess, self.arena, text) {
            Ok(expr) => Ok(expr),
            Err(db) => {
                db.emit();
                Err(ExpandError::Reported)
            }
        }
    }

    // ---- type utilities ----

    pub fn type_string(&self, node: NodeId) -> String {
        self.oracle.type_string(self.arena, node)
    }

    pub fn type_of(&self, node: NodeId) -> Option<ComptimeValue> {
        self.oracle.type_of(self.arena, node)
    }

    pub fn is_assignable_to(&self, source: &str, target: &str) -> bool {
        self.oracle.is_assignable_to(source, target)
    }

    pub fn properties_of(&self, type_name: &str) -> Vec<(String, String)> {
        self.oracle.properties_of(type_name)
    }

    pub fn symbol_of(&self, node: NodeId) -> Option<String> {
        self.oracle.symbol_of(self.arena, node)
    }

    /// Text of the node in the original source, when it has one.
    pub fn source_text(&self, node: NodeId) -> Option<String> {
        self.arena.text(self.arena.span(node)).map(String::from)
    }
}

/// Derive a `TypeInfo` from a declaration's syntax.
pub fn type_info_of(arena: &Arena, target: NodeId) -> Option<TypeInfo> {
    let kind = TargetKind::of(arena, target)?;
    let (name, fields) = match arena.kind(target) {
        NodeKind::InterfaceDecl { name, fields, .. } => (name.clone(), fields.clone()),
        NodeKind::ClassDecl { name, members, .. } => (name.clone(), members.clone()),
        NodeKind::TypeAliasDecl { name, .. } => (name.clone(), Vec::new()),
        NodeKind::EnumDecl { name, .. } => (name.clone(), Vec::new()),
        NodeKind::FuncDecl { name, .. } => (name.clone(), Vec::new()),
        _ => return None,
    };
    let mut out = Vec::new();
    for field in fields {
        if let NodeKind::PropDecl { name, ty, .. } = arena.kind(field) {
            let type_text = (*ty)
                .map(|ty| crate::printer::expr_to_string(arena, ty))
                .unwrap_or_else(|| "unknown".to_string());
            out.push((name.clone(), type_text));
        }
    }
    Some(TypeInfo {
        name,
        kind,
        fields: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_expression() -> MacroDef {
        MacroDef::expression(
            "id",
            |_cx: &mut MacroContext<'_>,
             _call: NodeId,
             args: &[NodeId]|
             -> ExpandResult<NodeId> { Ok(args[0]) },
        )
    }

    #[test]
    fn registry_indexes_by_kind_and_name() {
        let mut registry = MacroRegistry::default();
        registry.register(noop_expression()).unwrap();
        registry
            .register(MacroDef::derive(
                "id",
                |_cx: &mut MacroContext<'_>,
                 _t: NodeId,
                 _i: &TypeInfo|
                 -> ExpandResult<Vec<NodeId>> { Ok(Vec::new()) },
            ))
            .unwrap();
        // Same name under different kinds is not a collision.
        assert!(registry.get(MacroKind::Expression, "id").is_some());
        assert!(registry.get(MacroKind::Derive, "id").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn warn_replace_keeps_the_last_definition() {
        let mut registry = MacroRegistry::new(RegistryPolicy::WarnReplace);
        registry.register(noop_expression()).unwrap();
        let version = registry.version();
        registry.register(noop_expression()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.version() > version);
    }

    #[test]
    fn reject_policy_errors_on_duplicates() {
        let mut registry = MacroRegistry::new(RegistryPolicy::Reject);
        registry.register(noop_expression()).unwrap();
        assert_eq!(
            registry.register(noop_expression()),
            Err(RegistryError::Duplicate {
                kind: MacroKind::Expression,
                name: "id".to_string()
            })
        );
    }

    #[test]
    fn module_index_tracks_import_scoping() {
        let mut registry = MacroRegistry::default();
        registry
            .register(noop_expression().with_module("@vendor/macros", "id"))
            .unwrap();
        assert!(registry.is_import_scoped("id", MacroKind::Expression));
        assert!(registry.get_by_module("@vendor/macros", "id").is_some());
        assert!(registry.get_by_module("@vendor/macros", "other").is_none());
    }
}

//! Per-file resolution policy and opt-out directives.
//!
//! The tracker answers two questions during expansion: is a given
//! typeclass/extension in scope in this file, and has the user opted a
//! lexical region out of some or all sugar. Opt-out checks are purely
//! lexical; no semantic resolution happens here.
//!
//! Directive grammar:
//! - file level: a first top-level statement `"use no typesugar";` or
//!   `"use no typesugar <feature>";`
//! - function level: the same string as the first statement of a
//!   function, method, or arrow body
//! - inline: `// @ts-no-typesugar`, `// @ts-no-typesugar <feature>`, or
//!   `// @ts-no-typesugar-all` on the node's source line

use bitflags::bitflags;

use std::collections::HashMap;

use crate::ast::{Arena, ImportSpecifier, NodeId, NodeKind};
use crate::config::{ExpansionConfig, ResolutionMode};
use crate::parse::Session;

bitflags! {
    /// The finite feature set a directive can name.
    pub struct FeatureSet: u8 {
        const OPERATORS   = 1 << 0;
        const DERIVE      = 1 << 1;
        const EXTENSIONS  = 1 << 2;
        const TYPECLASSES = 1 << 3;
        const MACROS      = 1 << 4;
    }
}

/// One feature, for point queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feature {
    Operators,
    Derive,
    Extensions,
    Typeclasses,
    Macros,
}

impl Feature {
    pub fn flag(self) -> FeatureSet {
        match self {
            Feature::Operators => FeatureSet::OPERATORS,
            Feature::Derive => FeatureSet::DERIVE,
            Feature::Extensions => FeatureSet::EXTENSIONS,
            Feature::Typeclasses => FeatureSet::TYPECLASSES,
            Feature::Macros => FeatureSet::MACROS,
        }
    }

    fn from_word(word: &str) -> Option<Feature> {
        Some(match word {
            "operators" => Feature::Operators,
            "derive" => Feature::Derive,
            "extensions" => Feature::Extensions,
            "typeclasses" => Feature::Typeclasses,
            "macros" => Feature::Macros,
            _ => return None,
        })
    }
}

/// Parse a directive string statement body. `None` when the string is not
/// a directive at all; `Some(flags)` otherwise, with the full set for the
/// broad form.
fn parse_directive(text: &str) -> Option<FeatureSet> {
    let rest = text.strip_prefix("use no typesugar")?;
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(FeatureSet::all());
    }
    Feature::from_word(rest).map(Feature::flag)
}

/// Parse the trailing part of a comment for an inline opt-out. The broad
/// form and `-all` both disable every feature.
fn parse_inline_directive(comment: &str) -> Option<FeatureSet> {
    let index = comment.find("@ts-no-typesugar")?;
    let rest = &comment[index + "@ts-no-typesugar".len()..];
    if let Some(rest) = rest.strip_prefix("-all") {
        if rest.trim().is_empty() {
            return Some(FeatureSet::all());
        }
        return None;
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(FeatureSet::all());
    }
    Feature::from_word(rest).map(Feature::flag)
}

/// The directive carried by a statement, when the statement is a string
/// expression statement whose text parses as one.
fn stmt_directive(arena: &Arena, stmt: NodeId) -> Option<FeatureSet> {
    match arena.kind(stmt) {
        NodeKind::ExprStmt { expr } => match arena.kind(*expr) {
            NodeKind::StringLit { value } => parse_directive(value),
            _ => None,
        },
        _ => None,
    }
}

/// Per-file policy over what is implicitly available.
pub struct ResolutionScope {
    pub mode: ResolutionMode,
    pub imported_typeclasses: HashMap<String, String>,
    pub imported_extensions: HashMap<String, String>,
    prelude: Vec<String>,
    /// File-level kill switch: every feature disabled.
    pub opted_out: bool,
    pub opted_out_features: FeatureSet,
}

impl ResolutionScope {
    /// Scan a module's top level: the first statement's directive (if
    /// any) plus the import map feeding typeclass/extension visibility.
    pub fn from_module(arena: &Arena, module: NodeId, config: &ExpansionConfig) -> ResolutionScope {
        let mut scope = ResolutionScope {
            mode: config.resolution.mode,
            imported_typeclasses: HashMap::new(),
            imported_extensions: HashMap::new(),
            prelude: config.resolution.prelude.clone(),
            opted_out: false,
            opted_out_features: FeatureSet::empty(),
        };
        let body = match arena.kind(module) {
            NodeKind::Module { body } => body.clone(),
            _ => return scope,
        };
        if let Some(&first) = body.first() {
            if let Some(flags) = stmt_directive(arena, first) {
                scope.opted_out_features |= flags;
                if flags == FeatureSet::all() {
                    scope.opted_out = true;
                }
            }
        }
        for stmt in body {
            if let NodeKind::ImportDecl { specifiers, source } = arena.kind(stmt) {
                for spec in specifiers {
                    match spec {
                        ImportSpecifier::Default { local }
                        | ImportSpecifier::Named { local, .. } => {
                            scope
                                .imported_typeclasses
                                .insert(local.clone(), source.clone());
                            scope
                                .imported_extensions
                                .insert(local.clone(), source.clone());
                        }
                        ImportSpecifier::Namespace { .. } => {}
                    }
                }
            }
        }
        scope
    }

    /// Whether `name` is usable as an implicit typeclass in this file.
    pub fn is_in_scope(&self, name: &str) -> bool {
        if self.opted_out {
            return false;
        }
        match self.mode {
            ResolutionMode::Automatic => true,
            ResolutionMode::ImportScoped => {
                self.imported_typeclasses.contains_key(name)
                    || self.prelude.iter().any(|p| p == name)
            }
            ResolutionMode::Explicit => false,
        }
    }

    /// Whether `feature` is disabled at `node`. Walks the lexical parent
    /// chain consulting function-level directives and inline comments;
    /// O(depth), uncached. Synthetic nodes are never opted out.
    pub fn is_feature_opted_out(
        &self,
        arena: &Arena,
        sess: &Session,
        node: NodeId,
        feature: Feature,
    ) -> bool {
        if self.opted_out || self.opted_out_features.contains(feature.flag()) {
            return true;
        }
        let span = arena.span(node);
        if span.is_dummy() {
            return false;
        }

        // Inline comment on the node's source line.
        let line = sess.file.line_of(span.lo);
        for comment in sess.comments_on_line(line) {
            if let Some(flags) = parse_inline_directive(&comment.text) {
                if flags.contains(feature.flag()) {
                    return true;
                }
            }
        }

        // Function-level directives anywhere up the parent chain.
        for ancestor in arena.ancestors(node) {
            let body = match arena.kind(ancestor) {
                NodeKind::FuncDecl { body, .. } => Some(*body),
                NodeKind::Arrow { body, .. } => Some(*body),
                _ => None,
            };
            if let Some(body) = body {
                if let NodeKind::Block { stmts } = arena.kind(body) {
                    if let Some(&first) = stmts.first() {
                        if let Some(flags) = stmt_directive(arena, first) {
                            if flags.contains(feature.flag()) {
                                return true;
                            }
                        }
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn scope_for(src: &str) -> (Session, Arena, NodeId, ResolutionScope) {
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let module = parse::parse_module(&sess, &mut arena).expect("parse failure");
        let scope = ResolutionScope::from_module(&arena, module, &ExpansionConfig::default());
        (sess, arena, module, scope)
    }

    #[test]
    fn file_level_opt_out_dominates() {
        let (_, _, _, scope) = scope_for("\"use no typesugar\";\nswap(x, y);");
        assert!(scope.opted_out);
        assert!(!scope.is_in_scope("Show"));
    }

    #[test]
    fn feature_opt_out_is_narrow() {
        let (sess, arena, module, scope) = scope_for("\"use no typesugar derive\";\nswap(x, y);");
        assert!(!scope.opted_out);
        let call = match arena.kind(module) {
            NodeKind::Module { body } => body[1],
            _ => unreachable!(),
        };
        assert!(scope.is_feature_opted_out(&arena, &sess, call, Feature::Derive));
        assert!(!scope.is_feature_opted_out(&arena, &sess, call, Feature::Macros));
    }

    #[test]
    fn directive_must_be_first_statement() {
        let (_, _, _, scope) = scope_for("const x = 1;\n\"use no typesugar\";");
        assert!(!scope.opted_out);
    }

    #[test]
    fn function_level_directive_is_contained() {
        let src = "function f() {\n  \"use no typesugar\";\n  swap(a, b);\n}\nswap(x, y);";
        let (sess, arena, module, scope) = scope_for(src);
        let (inner_call, outer_call) = match arena.kind(module) {
            NodeKind::Module { body } => {
                let f = body[0];
                let inner = match arena.kind(f) {
                    NodeKind::FuncDecl { body, .. } => match arena.kind(*body) {
                        NodeKind::Block { stmts } => stmts[1],
                        _ => unreachable!(),
                    },
                    _ => unreachable!(),
                };
                (inner, body[1])
            }
            _ => unreachable!(),
        };
        assert!(scope.is_feature_opted_out(&arena, &sess, inner_call, Feature::Macros));
        assert!(!scope.is_feature_opted_out(&arena, &sess, outer_call, Feature::Macros));
    }

    #[test]
    fn inline_comment_opts_out_one_line() {
        let src = "swap(a, b); // @ts-no-typesugar\nswap(x, y);";
        let (sess, arena, module, scope) = scope_for(src);
        let (first, second) = match arena.kind(module) {
            NodeKind::Module { body } => (body[0], body[1]),
            _ => unreachable!(),
        };
        assert!(scope.is_feature_opted_out(&arena, &sess, first, Feature::Macros));
        assert!(!scope.is_feature_opted_out(&arena, &sess, second, Feature::Macros));
    }

    #[test]
    fn inline_narrow_comment_names_one_feature() {
        let src = "f(); // @ts-no-typesugar derive";
        let (sess, arena, module, scope) = scope_for(src);
        let stmt = match arena.kind(module) {
            NodeKind::Module { body } => body[0],
            _ => unreachable!(),
        };
        assert!(scope.is_feature_opted_out(&arena, &sess, stmt, Feature::Derive));
        assert!(!scope.is_feature_opted_out(&arena, &sess, stmt, Feature::Macros));
    }

    #[test]
    fn synthetic_nodes_are_never_opted_out() {
        let (sess, mut arena, _, scope) = scope_for("\"use no typesugar derive\";");
        let synthetic = arena.alloc(
            NodeKind::Ident {
                name: "x".to_string(),
            },
            typesugar_pos::DUMMY_SP,
        );
        // File-level feature flags still apply; but a node with no span
        // triggers no lexical walk.
        assert!(scope.is_feature_opted_out(&arena, &sess, synthetic, Feature::Derive));
        assert!(!scope.is_feature_opted_out(&arena, &sess, synthetic, Feature::Macros));
    }

    #[test]
    fn import_scoped_mode_consults_imports_and_prelude() {
        let src = "import { Eq } from \"@vendor/std\";";
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let module = parse::parse_module(&sess, &mut arena).unwrap();
        let mut config = ExpansionConfig::default();
        config.resolution.mode = ResolutionMode::ImportScoped;
        config.resolution.prelude = vec!["Show".to_string()];
        let scope = ResolutionScope::from_module(&arena, module, &config);
        assert!(scope.is_in_scope("Eq"));
        assert!(scope.is_in_scope("Show"));
        assert!(!scope.is_in_scope("Ord"));
    }

    #[test]
    fn explicit_mode_has_nothing_implicit() {
        let src = "import { Eq } from \"@vendor/std\";";
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let module = parse::parse_module(&sess, &mut arena).unwrap();
        let mut config = ExpansionConfig::default();
        config.resolution.mode = ResolutionMode::Explicit;
        let scope = ResolutionScope::from_module(&arena, module, &config);
        assert!(!scope.is_in_scope("Eq"));
    }
}

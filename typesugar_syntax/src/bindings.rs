//! Per-file index of lexical bindings, and reference hygiene.
//!
//! Built in a single linear pass over a module's top-level statements.
//! During expansion, macros that need to reference an external symbol go
//! through [`FileBindingCache::safe_ref`], which resolves the name in
//! three tiers (known globals, the import map, local declarations) and
//! mints a deduplicated alias whenever the bare name would resolve to the
//! wrong thing in the printed file.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::ast::{Arena, ImportSpecifier, NodeId, NodeKind};

/// Host-platform globals that cannot be shadowed by imports by language
/// rule. `safe_ref` returns these bare, always.
pub const KNOWN_GLOBALS: &[&str] = &[
    "Array",
    "ArrayBuffer",
    "BigInt",
    "Boolean",
    "DataView",
    "Date",
    "Error",
    "EvalError",
    "Float32Array",
    "Float64Array",
    "Infinity",
    "Int16Array",
    "Int32Array",
    "Int8Array",
    "JSON",
    "Map",
    "Math",
    "NaN",
    "Number",
    "Object",
    "Promise",
    "Proxy",
    "RangeError",
    "ReferenceError",
    "Reflect",
    "RegExp",
    "Set",
    "String",
    "Symbol",
    "SyntaxError",
    "TypeError",
    "URIError",
    "URL",
    "URLSearchParams",
    "Uint16Array",
    "Uint32Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "WeakMap",
    "WeakSet",
    "clearInterval",
    "clearTimeout",
    "console",
    "decodeURIComponent",
    "encodeURIComponent",
    "globalThis",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "queueMicrotask",
    "setInterval",
    "setTimeout",
    "structuredClone",
    "undefined",
];

pub fn is_known_global(name: &str) -> bool {
    KNOWN_GLOBALS.binary_search(&name).is_ok()
}

/// Which resolution tier answered a `safe_ref` call; observability only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierStats {
    pub tier0: u64,
    pub tier1: u64,
    pub tier2: u64,
    pub conflicts: u64,
}

/// A deferred import to inject after expansion so that an emitted
/// identifier resolves correctly. `alias == symbol` when the name was
/// free and only the import itself is missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAlias {
    pub symbol: String,
    pub module: String,
    pub alias: String,
}

pub struct FileBindingCache {
    /// Local binding name -> origin module specifier.
    import_map: HashMap<String, String>,
    /// Local binding name -> (module, imported name); tracks what an
    /// aliased specifier originally imported.
    import_entries: HashMap<String, (String, String)>,
    /// Top-level declaration names, including destructured ones.
    local_decls: HashSet<String>,
    /// Deferred imports in insertion order.
    pending: Vec<PendingAlias>,
    /// (symbol, module) -> index into `pending`.
    pending_index: HashMap<(String, String), usize>,
    alias_counter: u32,
    pub tier_stats: TierStats,
}

impl FileBindingCache {
    /// One linear pass over the module's top-level statements.
    pub fn build(arena: &Arena, module: NodeId) -> FileBindingCache {
        let mut cache = FileBindingCache::empty();
        let body = match arena.kind(module) {
            NodeKind::Module { body } => body.clone(),
            _ => return cache,
        };
        for stmt in body {
            cache.scan_stmt(arena, stmt);
        }
        cache
    }

    pub fn empty() -> FileBindingCache {
        FileBindingCache {
            import_map: HashMap::new(),
            import_entries: HashMap::new(),
            local_decls: HashSet::new(),
            pending: Vec::new(),
            pending_index: HashMap::new(),
            alias_counter: 0,
            tier_stats: TierStats::default(),
        }
    }

    fn scan_stmt(&mut self, arena: &Arena, stmt: NodeId) {
        match arena.kind(stmt) {
            NodeKind::ImportDecl { specifiers, source } => {
                for spec in specifiers {
                    match spec {
                        ImportSpecifier::Default { local } => {
                            self.import_map.insert(local.clone(), source.clone());
                            self.import_entries.insert(
                                local.clone(),
                                (source.clone(), "default".to_string()),
                            );
                        }
                        ImportSpecifier::Named { imported, local } => {
                            self.import_map.insert(local.clone(), source.clone());
                            self.import_entries
                                .insert(local.clone(), (source.clone(), imported.clone()));
                        }
                        // Namespace imports add no element names; access
                        // through them is qualified.
                        ImportSpecifier::Namespace { .. } => {}
                    }
                }
            }
            NodeKind::VarDecl { pattern, .. } => {
                self.scan_pattern(arena, *pattern);
            }
            NodeKind::FuncDecl { name, .. }
            | NodeKind::ClassDecl { name, .. }
            | NodeKind::InterfaceDecl { name, .. }
            | NodeKind::TypeAliasDecl { name, .. }
            | NodeKind::EnumDecl { name, .. } => {
                self.local_decls.insert(name.clone());
            }
            _ => {}
        }
    }

    fn scan_pattern(&mut self, arena: &Arena, pattern: NodeId) {
        match arena.kind(pattern) {
            NodeKind::Ident { name } => {
                self.local_decls.insert(name.clone());
            }
            NodeKind::ObjectPat { props } => {
                for (_, sub) in props.clone() {
                    self.scan_pattern(arena, sub);
                }
            }
            NodeKind::ArrayPat { elements } => {
                for sub in elements.clone() {
                    self.scan_pattern(arena, sub);
                }
            }
            _ => {}
        }
    }

    pub fn imports(&self) -> &HashMap<String, String> {
        &self.import_map
    }

    pub fn is_imported(&self, name: &str) -> bool {
        self.import_map.contains_key(name)
    }

    pub fn import_origin(&self, name: &str) -> Option<&str> {
        self.import_map.get(name).map(|s| s.as_str())
    }

    /// The (module, imported name) pair behind a local binding, when it
    /// came from an import.
    pub fn import_entry(&self, name: &str) -> Option<(&str, &str)> {
        self.import_entries
            .get(name)
            .map(|(module, imported)| (module.as_str(), imported.as_str()))
    }

    pub fn is_local_decl(&self, name: &str) -> bool {
        self.local_decls.contains(name)
    }

    /// Resolve a reference to `symbol` from `from_module`, returning the
    /// identifier text to print. Never fails: either the bare name is
    /// already correct, or an alias is minted and a pending import
    /// recorded.
    pub fn safe_ref(&mut self, symbol: &str, from_module: &str) -> String {
        // Tier 0: known globals cannot be shadowed by imports.
        if is_known_global(symbol) {
            self.tier_stats.tier0 += 1;
            return symbol.to_string();
        }
        // Tier 1: the import map.
        if let Some(origin) = self.import_map.get(symbol) {
            self.tier_stats.tier1 += 1;
            if origin == from_module {
                return symbol.to_string();
            }
            self.tier_stats.conflicts += 1;
            trace!(
                "safe_ref conflict: `{}` imported from {:?}, wanted {:?}",
                symbol,
                origin,
                from_module
            );
            return self.alias_for(symbol, from_module, true);
        }
        // Tier 2: top-level declarations.
        if self.local_decls.contains(symbol) {
            self.tier_stats.tier2 += 1;
            self.tier_stats.conflicts += 1;
            trace!(
                "safe_ref conflict: `{}` shadowed by a local declaration",
                symbol
            );
            return self.alias_for(symbol, from_module, true);
        }
        // The name is free; the bare identifier is correct once the
        // import itself is injected.
        self.tier_stats.tier2 += 1;
        self.alias_for(symbol, from_module, false)
    }

    fn alias_for(&mut self, symbol: &str, module: &str, mangle: bool) -> String {
        let key = (symbol.to_string(), module.to_string());
        if let Some(&index) = self.pending_index.get(&key) {
            return self.pending[index].alias.clone();
        }
        let alias = if mangle {
            let alias = format!("__{}_ts{}__", symbol, self.alias_counter);
            self.alias_counter += 1;
            alias
        } else {
            symbol.to_string()
        };
        self.pending.push(PendingAlias {
            symbol: symbol.to_string(),
            module: module.to_string(),
            alias: alias.clone(),
        });
        self.pending_index.insert(key, self.pending.len() - 1);
        alias
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_aliases(&self) -> &[PendingAlias] {
        &self.pending
    }

    /// Group the pending aliases into one import declaration per module,
    /// each containing its distinct aliases, in insertion order.
    pub fn pending_imports(&self) -> Vec<(String, Vec<(String, String)>)> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for entry in &self.pending {
            if !grouped.contains_key(&entry.module) {
                order.push(entry.module.clone());
            }
            grouped
                .entry(entry.module.clone())
                .or_default()
                .push((entry.symbol.clone(), entry.alias.clone()));
        }
        order
            .into_iter()
            .map(|module| {
                let specs = grouped.remove(&module).unwrap_or_default();
                (module, specs)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{self, Session};

    fn cache_for(src: &str) -> (Arena, FileBindingCache) {
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let module = parse::parse_module(&sess, &mut arena).expect("parse failure");
        let cache = FileBindingCache::build(&arena, module);
        (arena, cache)
    }

    #[test]
    fn known_globals_table_is_sorted() {
        let mut sorted = KNOWN_GLOBALS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, KNOWN_GLOBALS);
    }

    #[test]
    fn construction_indexes_imports_and_decls() {
        let (_, cache) = cache_for(
            "import d from \"a\";\n\
             import { x, y as z } from \"b\";\n\
             import * as ns from \"c\";\n\
             const { p, q: r } = f();\n\
             function g() {}\n",
        );
        assert_eq!(cache.import_origin("d"), Some("a"));
        assert_eq!(cache.import_origin("x"), Some("b"));
        assert_eq!(cache.import_origin("z"), Some("b"));
        assert!(!cache.is_imported("y"));
        assert!(!cache.is_imported("ns"));
        assert!(cache.is_local_decl("p"));
        assert!(cache.is_local_decl("r"));
        assert!(!cache.is_local_decl("q"));
        assert!(cache.is_local_decl("g"));
    }

    #[test]
    fn tier0_known_global_stays_bare() {
        let (_, mut cache) = cache_for("const Error = 42;");
        let text = cache.safe_ref("Error", "@vendor/std");
        assert_eq!(text, "Error");
        assert!(!cache.has_pending());
        assert_eq!(cache.tier_stats.tier0, 1);
    }

    #[test]
    fn tier1_same_module_stays_bare() {
        let (_, mut cache) = cache_for("import { Eq } from \"@vendor/std\";");
        let text = cache.safe_ref("Eq", "@vendor/std");
        assert_eq!(text, "Eq");
        assert!(!cache.has_pending());
    }

    #[test]
    fn tier1_conflict_mints_alias() {
        let (_, mut cache) = cache_for("import { Eq } from \"./local-utils\";");
        let text = cache.safe_ref("Eq", "@vendor/std");
        assert_eq!(text, "__Eq_ts0__");
        assert_eq!(
            cache.pending_aliases(),
            &[PendingAlias {
                symbol: "Eq".to_string(),
                module: "@vendor/std".to_string(),
                alias: "__Eq_ts0__".to_string(),
            }]
        );
        assert!(cache.tier_stats.conflicts >= 1);
        // The same pair reuses the same alias.
        assert_eq!(cache.safe_ref("Eq", "@vendor/std"), "__Eq_ts0__");
        assert_eq!(cache.pending_aliases().len(), 1);
    }

    #[test]
    fn tier2_local_shadow_mints_alias() {
        let (_, mut cache) = cache_for("const Show = 1;");
        let text = cache.safe_ref("Show", "@vendor/std");
        assert_eq!(text, "__Show_ts0__");
        assert_eq!(cache.tier_stats.tier2, 1);
        assert_eq!(cache.tier_stats.conflicts, 1);
    }

    #[test]
    fn free_symbol_returns_bare_with_plain_import() {
        let (_, mut cache) = cache_for("const x = 1;");
        let text = cache.safe_ref("Eq", "@vendor/std");
        assert_eq!(text, "Eq");
        assert_eq!(
            cache.pending_aliases(),
            &[PendingAlias {
                symbol: "Eq".to_string(),
                module: "@vendor/std".to_string(),
                alias: "Eq".to_string(),
            }]
        );
    }

    #[test]
    fn distinct_modules_mint_distinct_aliases() {
        let (_, mut cache) = cache_for("import { Eq } from \"./a\";");
        let first = cache.safe_ref("Eq", "@vendor/std");
        let second = cache.safe_ref("Eq", "@vendor/alt");
        assert_ne!(first, second);
        assert_eq!(first, "__Eq_ts0__");
        assert_eq!(second, "__Eq_ts1__");
    }

    #[test]
    fn pending_imports_group_by_module_in_insertion_order() {
        let (_, mut cache) = cache_for("import { A } from \"./a\";\nconst B = 1;");
        cache.safe_ref("A", "@vendor/std");
        cache.safe_ref("B", "@vendor/other");
        cache.safe_ref("C", "@vendor/std");
        let imports = cache.pending_imports();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].0, "@vendor/std");
        assert_eq!(
            imports[0].1,
            vec![
                ("A".to_string(), "__A_ts0__".to_string()),
                ("C".to_string(), "C".to_string()),
            ]
        );
        assert_eq!(imports[1].0, "@vendor/other");
        assert_eq!(
            imports[1].1,
            vec![("B".to_string(), "__B_ts1__".to_string())]
        );
    }
}

//! Machinery for hygienic macro expansion.
//!
//! Every macro expansion runs inside a fresh [`HygieneScope`]. Names the
//! macro introduces for its own use are *mangled* so that they can neither
//! capture nor be captured by user identifiers, while identical logical
//! names within one expansion still refer to each other.
//!
//! Scope ids and counters are fields of the [`HygieneContext`] rather than
//! process globals, so that parallel per-file contexts stay deterministic.
//! A context may be seeded (e.g. from a file path hash) to keep mangled
//! names stable across runs regardless of file processing order.

use std::collections::HashMap;

use unicode_xid::UnicodeXID;

/// One expansion's boundary: a name-mangling table plus a counter.
#[derive(Debug, Clone)]
pub struct HygieneScope {
    id: u32,
    name_map: HashMap<String, String>,
    counter: u32,
}

impl HygieneScope {
    fn new(id: u32) -> HygieneScope {
        HygieneScope {
            id,
            name_map: HashMap::new(),
            counter: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Iterate over the (logical, mangled) pairs minted in this scope so far.
    pub fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.name_map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Scope stack plus name mangler for introduced identifiers.
///
/// Mangled names follow `__<prefix>_<logical>_s<scope-id>_<counter>__`
/// inside a scope and `__<prefix>_<logical>_g<counter>__` outside any
/// scope. Both shapes are reserved; no collision guarantee is made against
/// hand-written identifiers that imitate them.
pub struct HygieneContext {
    prefix: String,
    stack: Vec<HygieneScope>,
    next_scope_id: u32,
    global_counter: u32,
}

impl HygieneContext {
    pub fn new(prefix: &str) -> HygieneContext {
        HygieneContext::with_seed(prefix, 0)
    }

    /// Create a context whose first scope id is `seed`. Per-file contexts
    /// seeded independently keep expansion deterministic when files are
    /// processed in parallel.
    pub fn with_seed(prefix: &str, seed: u32) -> HygieneContext {
        HygieneContext {
            prefix: prefix.to_string(),
            stack: Vec::new(),
            next_scope_id: seed,
            global_counter: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of scopes currently on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The innermost scope, if any.
    pub fn current_scope(&self) -> Option<&HygieneScope> {
        self.stack.last()
    }

    /// Whether `logical` has already been mangled in the innermost scope.
    pub fn has_name(&self, logical: &str) -> bool {
        self.stack
            .last()
            .map_or(false, |scope| scope.name_map.contains_key(logical))
    }

    /// Push a fresh scope. Prefer [`HygieneContext::with_scope`]; the raw
    /// push/pop pair exists for callers that interleave other borrows
    /// between entry and exit and take on the pairing obligation
    /// themselves.
    pub fn push_scope(&mut self) -> u32 {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        self.stack.push(HygieneScope::new(id));
        id
    }

    pub fn pop_scope(&mut self) {
        self.stack
            .pop()
            .expect("hygiene scope stack underflow");
    }

    /// Runs `f` inside a fresh scope, popping it on all exit paths. The
    /// callback's panic (if any) propagates after the stack is restored.
    pub fn with_scope<T>(&mut self, f: impl FnOnce(&mut HygieneContext) -> T) -> T {
        struct PopOnDrop<'a>(&'a mut HygieneContext);

        impl<'a> Drop for PopOnDrop<'a> {
            fn drop(&mut self) {
                self.0.pop_scope();
            }
        }

        self.push_scope();
        let guard = PopOnDrop(self);
        f(&mut *guard.0)
    }

    /// Return the mangled text for `logical` in the current scope, minting
    /// and caching it on first use. The same logical name in one scope
    /// always yields the same text; distinct scopes always yield distinct
    /// texts.
    ///
    /// Outside any scope the text is minted from the context-global
    /// counter and is *not* memoized: every call produces a fresh name.
    pub fn mangle_name(&mut self, logical: &str) -> String {
        debug_assert!(
            is_identifier(logical),
            "mangle_name expects an identifier, got {:?}",
            logical
        );
        match self.stack.last_mut() {
            Some(scope) => {
                if let Some(text) = scope.name_map.get(logical) {
                    return text.clone();
                }
                let text = format!(
                    "__{}_{}_s{}_{}__",
                    self.prefix, logical, scope.id, scope.counter
                );
                scope.counter += 1;
                scope.name_map.insert(logical.to_string(), text.clone());
                text
            }
            None => {
                let text = format!(
                    "__{}_{}_g{}__",
                    self.prefix, logical, self.global_counter
                );
                self.global_counter += 1;
                text
            }
        }
    }
}

/// Whether `text` is a well-formed identifier: an XID start character (or
/// `_`/`$`) followed by XID continue characters (or `_`/`$`).
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || UnicodeXID::is_xid_start(c) => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || UnicodeXID::is_xid_continue(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_logical_name_same_scope_is_stable() {
        let mut cx = HygieneContext::new("sugar");
        cx.with_scope(|cx| {
            let a = cx.mangle_name("tmp");
            let b = cx.mangle_name("tmp");
            assert_eq!(a, b);
            assert_eq!(a, "__sugar_tmp_s0_0__");
        });
    }

    #[test]
    fn distinct_scopes_mint_distinct_names() {
        let mut cx = HygieneContext::new("sugar");
        let first = cx.with_scope(|cx| cx.mangle_name("tmp"));
        let second = cx.with_scope(|cx| cx.mangle_name("tmp"));
        assert_ne!(first, second);
        assert_eq!(first, "__sugar_tmp_s0_0__");
        assert_eq!(second, "__sugar_tmp_s1_0__");
    }

    #[test]
    fn distinct_logical_names_share_a_scope_counter() {
        let mut cx = HygieneContext::new("sugar");
        cx.with_scope(|cx| {
            assert_eq!(cx.mangle_name("a"), "__sugar_a_s0_0__");
            assert_eq!(cx.mangle_name("b"), "__sugar_b_s0_1__");
            assert_eq!(cx.mangle_name("a"), "__sugar_a_s0_0__");
        });
    }

    #[test]
    fn nested_scopes_restore_on_exit() {
        let mut cx = HygieneContext::new("sugar");
        cx.with_scope(|cx| {
            let outer = cx.mangle_name("x");
            cx.with_scope(|cx| {
                let inner = cx.mangle_name("x");
                assert_ne!(outer, inner);
                assert_eq!(cx.depth(), 2);
            });
            assert_eq!(cx.depth(), 1);
            assert_eq!(cx.mangle_name("x"), outer);
        });
        assert_eq!(cx.depth(), 0);
    }

    #[test]
    fn scope_stack_survives_panicking_callback() {
        let mut cx = HygieneContext::new("sugar");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cx.with_scope(|_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(cx.depth(), 0);
        // The context is still usable and keeps minting fresh scope ids.
        let text = cx.with_scope(|cx| cx.mangle_name("t"));
        assert_eq!(text, "__sugar_t_s1_0__");
    }

    #[test]
    fn outside_scope_names_are_not_memoized() {
        let mut cx = HygieneContext::new("sugar");
        let a = cx.mangle_name("t");
        let b = cx.mangle_name("t");
        assert_ne!(a, b);
        assert_eq!(a, "__sugar_t_g0__");
        assert_eq!(b, "__sugar_t_g1__");
    }

    #[test]
    fn mangled_names_are_identifiers() {
        let mut cx = HygieneContext::new("sugar");
        let text = cx.with_scope(|cx| cx.mangle_name("value"));
        assert!(is_identifier(&text));
    }

    #[test]
    fn seeded_contexts_do_not_collide() {
        let mut a = HygieneContext::with_seed("sugar", 0);
        let mut b = HygieneContext::with_seed("sugar", 1000);
        let na = a.with_scope(|cx| cx.mangle_name("t"));
        let nb = b.with_scope(|cx| cx.mangle_name("t"));
        assert_ne!(na, nb);
    }
}

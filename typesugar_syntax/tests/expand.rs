//! End-to-end pipeline scenarios: hygiene, reference hygiene, opt-out
//! containment, comptime folding, capability denial, nested expansion,
//! and the termination budgets.

use typesugar_syntax::ast::{NodeId, NodeKind, VarKind};
use typesugar_syntax::cache::ExpansionCache;
use typesugar_syntax::comptime::ComptimeError;
use typesugar_syntax::config::ExpansionConfig;
use typesugar_syntax::ext::base::{
    ExpandResult, MacroContext, MacroDef, TargetKind, TypeInfo,
};
use typesugar_syntax::ext::builtin::register_builtins;
use typesugar_syntax::ext::expand::{expand_source, expand_source_cached};
use typesugar_syntax::ext::matcher::declarative_macro;
use typesugar_syntax::MacroRegistry;

fn registry_with_swap() -> MacroRegistry {
    let mut registry = MacroRegistry::default();
    registry
        .register(
            declarative_macro(
                "swap",
                &[("($a:ident, $b:ident)", "{ let t = $a; $a = $b; $b = t; }")],
            )
            .unwrap(),
        )
        .unwrap();
    registry
}

fn expand(registry: &MacroRegistry, src: &str) -> typesugar_syntax::ExpansionResult {
    expand_source("test.ts", src, registry, &ExpansionConfig::default(), None)
}

fn error_codes(result: &typesugar_syntax::ExpansionResult) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .filter_map(|d| d.code.clone())
        .collect()
}

// S1: each expansion mints its own temporary; user names pass through.
#[test]
fn introduced_name_hygiene_across_expansions() {
    let registry = registry_with_swap();
    let result = expand(&registry, "swap(x, y);\nswap(p, q);");
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result.text.contains("__sugar_t_s0_0__"));
    assert!(result.text.contains("__sugar_t_s1_0__"));
    for user_name in ["x", "y", "p", "q"] {
        assert!(result.text.contains(user_name));
    }
    // The two temporaries are distinct; within one expansion the same
    // logical name resolves to the same text.
    let first = result.text.find("__sugar_t_s0_0__").unwrap();
    let last = result.text.rfind("__sugar_t_s0_0__").unwrap();
    assert!(first < last, "the temporary is referenced more than once");
}

// S2: known globals are never aliased, even when shadowed locally.
#[test]
fn reference_hygiene_tier0_shadowed_global() {
    let mut registry = MacroRegistry::default();
    registry
        .register(MacroDef::derive(
            "Show",
            |cx: &mut MacroContext<'_>, _target: NodeId, info: &TypeInfo| -> ExpandResult<Vec<NodeId>> {
                let error = cx.safe_ref("Error", "@vendor/std");
                let message = cx
                    .factory()
                    .string(&format!("Show is not derivable for {}", info.name));
                let exception = cx.factory().new_expr(error, vec![message]);
                let throw = cx.factory().throw(exception);
                let body = cx.factory().block(vec![throw]);
                let param = cx.factory().ident("value");
                let func = cx.arena.alloc(
                    NodeKind::FuncDecl {
                        name: format!("show{}", info.name),
                        decorators: Vec::new(),
                        params: vec![param],
                        body,
                    },
                    typesugar_pos::DUMMY_SP,
                );
                Ok(vec![func])
            },
        ))
        .unwrap();

    let src = "const Error = 42;\n@derive(Show)\ninterface U { x: number }";
    let result = expand(&registry, src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    // The throw uses the bare global, not an alias, and no import was
    // injected for it.
    assert!(result.text.contains("throw new Error("));
    assert!(!result.text.contains("__Error_ts"));
    assert!(!result.text.contains("import"));
    // The user's shadowing declaration is untouched.
    assert!(result.text.contains("const Error = 42;"));
    assert!(!result.text.contains("@derive"));
}

// S3: an imported collision mints a stable alias and injects the import.
#[test]
fn reference_hygiene_imported_collision() {
    let mut registry = MacroRegistry::default();
    registry
        .register(MacroDef::expression(
            "needsEq",
            |cx: &mut MacroContext<'_>, _call: NodeId, _args: &[NodeId]| -> ExpandResult<NodeId> {
                let eq = cx.safe_ref("Eq", "@vendor/std");
                Ok(cx.factory().call(eq, vec![]))
            },
        ))
        .unwrap();

    let src = "import { Eq } from \"./local-utils\";\nneedsEq();\nneedsEq();";
    let result = expand(&registry, src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result
        .text
        .starts_with("import { Eq as __Eq_ts0__ } from \"@vendor/std\";"));
    // Both call sites reuse the same alias; exactly one import is added.
    assert_eq!(result.text.matches("__Eq_ts0__()").count(), 2);
    assert_eq!(result.text.matches("from \"@vendor/std\"").count(), 1);
    // The user's own import is preserved.
    assert!(result.text.contains("import { Eq } from \"./local-utils\";"));
}

// S4: a file-level opt-out returns the input byte-for-byte.
#[test]
fn file_level_opt_out_is_total() {
    let registry = registry_with_swap();
    let src = "\"use no typesugar\";\nswap(x, y);\nswap(p, q);";
    let result = expand(&registry, src);
    assert_eq!(result.text, src);
    assert!(result.diagnostics.is_empty());
}

// Feature-scoped file opt-out disables only the named feature.
#[test]
fn feature_level_opt_out_is_narrow() {
    let registry = registry_with_swap();
    let src = "\"use no typesugar derive\";\nswap(x, y);";
    let result = expand(&registry, src);
    assert!(result.text.contains("__sugar_t_"));
}

// Property 13: a function-level opt-out does not leak outside.
#[test]
fn function_level_opt_out_is_contained() {
    let registry = registry_with_swap();
    let src = "function f() {\n  \"use no typesugar\";\n  swap(a, b);\n}\nswap(x, y);";
    let result = expand(&registry, src);
    assert!(result.text.contains("swap(a, b);"), "{}", result.text);
    assert!(result.text.contains("__sugar_t_"), "{}", result.text);
}

// Inline comment opt-out applies to its line only.
#[test]
fn inline_opt_out_is_line_scoped() {
    let registry = registry_with_swap();
    let src = "swap(a, b); // @ts-no-typesugar\nswap(x, y);";
    let result = expand(&registry, src);
    assert!(result.text.contains("swap(a, b);"));
    assert!(result.text.contains("__sugar_t_"));
}

// S5: static_assert folds truths away and reports falsehoods.
#[test]
fn static_assert_folding() {
    let mut registry = MacroRegistry::default();
    register_builtins(&mut registry).unwrap();

    let passing = expand(&registry, "static_assert(1 + 2 === 3, \"math\");");
    assert!(passing.diagnostics.is_empty(), "{:?}", passing.diagnostics);
    assert_eq!(passing.text, "void 0;");

    let failing = expand(&registry, "static_assert(1 + 2 === 4, \"math\");");
    assert_eq!(error_codes(&failing), vec!["TS0201".to_string()]);
    assert!(failing.diagnostics[0].message.contains("math"));
    // The call site is left as written.
    assert!(failing.text.contains("static_assert(1 + 2 === 4, \"math\");"));
}

#[test]
fn static_assert_rejects_non_constants() {
    let mut registry = MacroRegistry::default();
    register_builtins(&mut registry).unwrap();
    let result = expand(&registry, "static_assert(someRuntimeValue, \"nope\");");
    assert_eq!(error_codes(&result), vec![ComptimeError::NotEvaluable(String::new()).code()]);
    // The diagnostic carries a hint describing the allowed subset.
    assert!(result.diagnostics[0]
        .notes
        .iter()
        .any(|note| note.message.contains("limited to")));
}

// S6: missing capability is a typed error and the call site throws at
// run time.
#[test]
fn comptime_capability_denial() {
    let mut registry = MacroRegistry::default();
    register_builtins(&mut registry).unwrap();
    let result = expand(
        &registry,
        "const home = comptime(() => process.env.HOME);",
    );
    assert_eq!(error_codes(&result), vec!["TS0205".to_string()]);
    assert!(result.diagnostics[0].message.contains("env"));
    assert!(result.text.contains("throw new Error("));
}

#[test]
fn comptime_splices_computed_values() {
    let mut registry = MacroRegistry::default();
    register_builtins(&mut registry).unwrap();
    let result = expand(
        &registry,
        "const table = comptime(() => [1, 2, 3].map((x) => x * x));",
    );
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.text, "const table = [1, 4, 9];");
}

// S7: post-order expansion lets the outer macro see the reduced inner
// form.
#[test]
fn nested_expansion_is_post_order() {
    let mut registry = MacroRegistry::default();
    registry
        .register(declarative_macro("inner", &[("($x:ident)", "wrap($x)")]).unwrap())
        .unwrap();
    registry
        .register(MacroDef::expression(
            "outer",
            |cx: &mut MacroContext<'_>, _call: NodeId, args: &[NodeId]| -> ExpandResult<NodeId> {
                let saw_wrap = match args.first().map(|&arg| cx.arena.kind(arg)) {
                    Some(NodeKind::Call { callee, .. }) => matches!(
                        cx.arena.kind(*callee),
                        NodeKind::Ident { name } if name == "wrap"
                    ),
                    _ => false,
                };
                Ok(cx
                    .factory()
                    .string(if saw_wrap { "saw-wrap" } else { "unreduced" }))
            },
        ))
        .unwrap();

    let result = expand(&registry, "outer(inner(x));");
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.text, "\"saw-wrap\";");
}

// Property 11: a macro-free file is stable under expansion.
#[test]
fn idempotent_on_macro_free_files() {
    let registry = MacroRegistry::default();
    let src = "import { a } from \"./m\";\nconst x = 1 + 2;\nfunction f(y) {\n  return y;\n}";
    let first = expand(&registry, src);
    assert!(first.diagnostics.is_empty());
    let second = expand(&registry, &first.text);
    assert_eq!(first.text, second.text);
}

// Property 12: expansion is a deterministic function of its inputs.
#[test]
fn deterministic_across_runs() {
    let registry = registry_with_swap();
    let src = "swap(x, y);\nswap(p, q);";
    let first = expand(&registry, src);
    let second = expand(&registry, src);
    assert_eq!(first.text, second.text);
    assert_eq!(first.diagnostics, second.diagnostics);
}

// Property 14: a self-reproducing macro hits the per-site cap instead of
// hanging.
#[test]
fn termination_per_site_limit() {
    let mut registry = MacroRegistry::default();
    registry
        .register(MacroDef::expression(
            "forever",
            |cx: &mut MacroContext<'_>, _call: NodeId, _args: &[NodeId]| -> ExpandResult<NodeId> {
                Ok(cx.factory().call_ident("forever", vec![]))
            },
        ))
        .unwrap();
    let result = expand(&registry, "forever();");
    assert!(error_codes(&result).contains(&"TS0104".to_string()));
}

#[test]
fn attribute_macro_valid_and_invalid_targets() {
    let mut registry = MacroRegistry::default();
    registry
        .register(MacroDef::attribute(
            "memoize",
            vec![TargetKind::Function],
            |cx: &mut MacroContext<'_>,
             _decorator: NodeId,
             target: NodeId,
             _args: &[NodeId]|
             -> ExpandResult<Vec<NodeId>> {
                let init = cx.factory().object(vec![]);
                let cache_name = cx.generate_unique_name("cache");
                let cache = cx.factory().var_decl(VarKind::Const, &cache_name, init);
                Ok(vec![cache, target])
            },
        ))
        .unwrap();

    let ok = expand(&registry, "@memoize\nfunction f(x) {\n  return x;\n}");
    assert!(ok.diagnostics.is_empty(), "{:?}", ok.diagnostics);
    assert!(ok.text.contains("const __sugar_cache_"));
    assert!(!ok.text.contains("@memoize"));

    let bad = expand(&registry, "@memoize\nclass C {\n}");
    assert_eq!(error_codes(&bad), vec!["TS0102".to_string()]);
    // Kind mismatch returns the target unchanged, decorator included.
    assert!(bad.text.contains("@memoize"));
    assert!(bad.text.contains("class C {"));
}

#[test]
fn labeled_block_macro_consumes_continuations() {
    let mut registry = MacroRegistry::default();
    registry
        .register(MacroDef::labeled_block(
            "query",
            vec!["orelse".to_string()],
            |cx: &mut MacroContext<'_>,
             _main: NodeId,
             continuations: &[(String, NodeId)]|
             -> ExpandResult<NodeId> {
                let arg = cx.factory().number(continuations.len() as f64);
                let call = cx.factory().call_ident("runQuery", vec![arg]);
                Ok(cx.factory().expr_stmt(call))
            },
        ))
        .unwrap();

    let src = "query: {\n  select(users);\n}\norelse: {\n  fallback();\n}\nafter();";
    let result = expand(&registry, src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result.text.contains("runQuery(1);"));
    assert!(!result.text.contains("orelse"));
    assert!(result.text.contains("after();"));
}

#[test]
fn type_level_macro_rewrites_type_references() {
    let mut registry = MacroRegistry::default();
    registry
        .register(MacroDef::type_level(
            "Refine",
            |cx: &mut MacroContext<'_>, _type_ref: NodeId, _args: &[NodeId]| -> ExpandResult<NodeId> {
                Ok(cx.factory().type_ref("number", vec![]))
            },
        ))
        .unwrap();
    let result = expand(&registry, "type Positive = Refine<number>;");
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.text, "type Positive = number;");
}

#[test]
fn tagged_template_macro_with_validation() {
    let mut registry = MacroRegistry::default();
    let mut def = MacroDef::tagged_template(
        "sql",
        |cx: &mut MacroContext<'_>, _template: NodeId| -> ExpandResult<NodeId> {
            Ok(cx.factory().string("prepared"))
        },
    );
    if let typesugar_syntax::ext::base::MacroPayload::TaggedTemplate { validate, .. } =
        &mut def.payload
    {
        *validate = Some(Box::new(|text: &str| {
            if text.contains("select") {
                Ok(())
            } else {
                Err("only select statements are supported".to_string())
            }
        }));
    }
    registry.register(def).unwrap();

    let ok = expand(&registry, "const q = sql`select 1`;");
    assert!(ok.diagnostics.is_empty(), "{:?}", ok.diagnostics);
    assert_eq!(ok.text, "const q = \"prepared\";");

    let bad = expand(&registry, "const q = sql`drop everything`;");
    assert_eq!(error_codes(&bad), vec!["TS0108".to_string()]);
    assert!(bad.text.contains("sql`drop everything`"));
}

#[test]
fn import_scoped_macro_requires_its_import() {
    let mut registry = MacroRegistry::default();
    registry
        .register(
            MacroDef::expression(
                "gen",
                |cx: &mut MacroContext<'_>, _call: NodeId, _args: &[NodeId]| -> ExpandResult<NodeId> {
                    Ok(cx.factory().number(1.0))
                },
            )
            .with_module("@vendor/macros", "gen"),
        )
        .unwrap();

    // Without the import the call is left alone.
    let bare = expand(&registry, "gen();");
    assert_eq!(bare.text, "gen();");

    // With the right import it expands.
    let imported = expand(
        &registry,
        "import { gen } from \"@vendor/macros\";\ngen();",
    );
    assert!(imported.text.contains("1;"), "{}", imported.text);

    // An aliased import resolves through the (module, export) index.
    let aliased = expand(
        &registry,
        "import { gen as g } from \"@vendor/macros\";\ng();",
    );
    assert!(aliased.text.contains("1;"), "{}", aliased.text);

    // An import from elsewhere does not activate it.
    let wrong = expand(&registry, "import { gen } from \"./other\";\ngen();");
    assert!(wrong.text.contains("gen();"), "{}", wrong.text);
}

#[test]
fn macro_panic_is_isolated_to_its_site() {
    let mut registry = registry_with_swap();
    registry
        .register(MacroDef::expression(
            "explode",
            |_cx: &mut MacroContext<'_>, _call: NodeId, _args: &[NodeId]| -> ExpandResult<NodeId> {
                panic!("macro bug");
            },
        ))
        .unwrap();

    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = expand(&registry, "explode();\nswap(x, y);");
    std::panic::set_hook(hook);

    assert_eq!(error_codes(&result), vec!["TS0101".to_string()]);
    assert!(result.diagnostics[0].message.contains("macro bug"));
    // The failed site is retained; the unrelated site still expanded.
    assert!(result.text.contains("explode();"));
    assert!(result.text.contains("__sugar_t_"));
}

#[test]
fn cancellation_yields_partial_incomplete_output() {
    let registry = registry_with_swap();
    let token = typesugar_syntax::CancelToken::new();
    token.cancel();
    let result = expand_source(
        "test.ts",
        "swap(x, y);",
        &registry,
        &ExpansionConfig::default(),
        Some(token),
    );
    assert!(!result.complete);
    assert!(error_codes(&result).contains(&"TS0301".to_string()));
    // Nothing expanded.
    assert!(result.text.contains("swap(x, y);"));
}

#[test]
fn cached_expansion_round_trips() {
    let registry = registry_with_swap();
    let config = ExpansionConfig::default();
    let cache = ExpansionCache::new(8);
    let src = "swap(x, y);";

    let first = expand_source_cached("test.ts", src, &registry, &config, &cache, None);
    assert_eq!(cache.len(), 1);
    let second = expand_source_cached("test.ts", src, &registry, &config, &cache, None);
    assert_eq!(first.text, second.text);
    assert_eq!(first.diagnostics, second.diagnostics);

    // A config change misses.
    let mut other = ExpansionConfig::default();
    other.hygiene.prefix = "alt".to_string();
    let third = expand_source_cached("test.ts", src, &registry, &other, &cache, None);
    assert_eq!(cache.len(), 2);
    assert!(third.text.contains("__alt_t_"));
}

#[test]
fn parse_errors_still_return_the_input() {
    let registry = MacroRegistry::default();
    let result = expand(&registry, "const = ;");
    assert_eq!(error_codes(&result), vec!["TS0001".to_string()]);
    assert_eq!(result.text, "const = ;");
}

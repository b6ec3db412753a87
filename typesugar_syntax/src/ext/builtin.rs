//! Built-in expression macros: `static_assert` and `comptime`.
//!
//! These are the in-tree users of the macro-authoring contract and the
//! two entry points into the comptime evaluator. Everything else (derive
//! libraries, SQL builders, effect adapters) lives outside the core and
//! registers through the same [`MacroRegistry`] surface.

use crate::ast::{NodeId, NodeKind};
use crate::comptime::{CapabilityGrant, ComptimeError, ComptimeValue, FsAccess, NetGrant};
use crate::ext::base::{
    ExpandError, ExpandResult, MacroContext, MacroDef, MacroRegistry, RegistryError,
};

/// Register the built-in macros. Call once after constructing the
/// registry, before the first expansion.
pub fn register_builtins(registry: &mut MacroRegistry) -> Result<(), RegistryError> {
    registry.register(
        MacroDef::expression("static_assert", expand_static_assert)
            .cacheable(true)
            .with_description("compile-time assertion over the pure comptime subset"),
    )?;
    registry.register(
        MacroDef::expression("comptime", expand_comptime)
            .with_description("sandboxed compile-time evaluation with capability grants"),
    )?;
    Ok(())
}

/// `static_assert(condition, message?)` -- the condition must fold in the
/// pure tier; a passing assertion erases to `void 0`.
fn expand_static_assert(
    cx: &mut MacroContext<'_>,
    call: NodeId,
    args: &[NodeId],
) -> ExpandResult<NodeId> {
    let condition = match args.first() {
        Some(&condition) => condition,
        None => {
            cx.report_error("TS0201", call, "static_assert expects a condition");
            return Err(ExpandError::Reported);
        }
    };
    let message = match args.get(1) {
        Some(&message) => match cx.evaluate(message) {
            Ok(value) => value.to_display_string(),
            Err(_) => cx.source_text(message).unwrap_or_default(),
        },
        None => String::new(),
    };

    match cx.evaluate(condition) {
        Ok(value) => {
            if value.truthy() {
                Ok(cx.factory().void_zero())
            } else {
                let detail = if message.is_empty() {
                    "static assertion failed".to_string()
                } else {
                    format!("static assertion failed: {}", message)
                };
                cx.report_error("TS0201", condition, &detail);
                Err(ExpandError::Reported)
            }
        }
        Err(error) => {
            cx.struct_error(
                condition,
                &format!("static_assert condition is not a constant: {}", error),
            )
            .with_code(error.code())
            .with_help(
                "static_assert conditions are limited to literals, arithmetic, \
                 aggregate literals, property access and pure builtins",
            )
            .emit();
            Err(ExpandError::Reported)
        }
    }
}

/// `comptime(fn, grants?)` -- runs the function in the sandboxed tier and
/// splices the resulting value into the program. On evaluation failure
/// the call is replaced by an expression that throws at run time, so the
/// failure cannot be silently ignored.
fn expand_comptime(
    cx: &mut MacroContext<'_>,
    call: NodeId,
    args: &[NodeId],
) -> ExpandResult<NodeId> {
    let body = match args.first() {
        Some(&body) => body,
        None => {
            cx.report_error("TS0202", call, "comptime expects an expression or function");
            return Err(ExpandError::Reported);
        }
    };
    let grant = match args.get(1) {
        Some(&grants) => match parse_grant(cx, grants) {
            Ok(grant) => grant,
            Err(message) => {
                cx.report_error("TS0202", grants, &message);
                return Err(ExpandError::Reported);
            }
        },
        None => CapabilityGrant::none(),
    };

    match cx.evaluate_sandboxed(body, grant) {
        Ok(outcome) => match cx.comptime_value_to_expression(&outcome.value) {
            Ok(expr) => Ok(expr),
            Err(error) => {
                cx.struct_error(
                    body,
                    &format!("comptime result cannot be written back: {}", error),
                )
                .with_code(error.code())
                .emit();
                Err(ExpandError::Reported)
            }
        },
        Err(ComptimeError::Cancelled) => Err(ExpandError::Reported),
        Err(error) => {
            let mut db = cx
                .struct_error(body, &format!("comptime evaluation failed: {}", error))
                .with_code(error.code());
            if let ComptimeError::PermissionDenied { capability } = &error {
                db = db.with_help(&format!(
                    "grant it with a second argument, e.g. comptime(fn, {{ {}: true }})",
                    capability
                ));
            }
            db.emit();
            // Defer the failure to run time at the call site.
            Ok(cx
                .factory()
                .throwing_expr(&format!("comptime evaluation failed: {}", error)))
        }
    }
}

/// Fold the grant argument -- an object literal such as
/// `{ fs: "read", env: true, time: true, net: ["api.example.com"] }`.
fn parse_grant(cx: &mut MacroContext<'_>, node: NodeId) -> Result<CapabilityGrant, String> {
    if !matches!(cx.arena.kind(node), NodeKind::ObjectLit { .. }) {
        return Err("capability grants must be an object literal".to_string());
    }
    let value = cx
        .evaluate(node)
        .map_err(|e| format!("capability grants must be constant: {}", e))?;
    let props = match value {
        ComptimeValue::Object(props) => props,
        _ => return Err("capability grants must be an object literal".to_string()),
    };
    let mut grant = CapabilityGrant::none();
    for (key, value) in props {
        match key.as_str() {
            "fs" => {
                grant.fs = match value {
                    ComptimeValue::Str(ref s) if s == "read" => Some(FsAccess::Read),
                    ComptimeValue::Str(ref s) if s == "write" => Some(FsAccess::Write),
                    ComptimeValue::Bool(false) => None,
                    _ => return Err("fs grant must be \"read\" or \"write\"".to_string()),
                };
                if grant.fs.is_some() {
                    grant.project_root = std::env::current_dir().ok();
                }
            }
            "env" => grant.env_read = value.truthy(),
            "time" => grant.time = value.truthy(),
            "net" => {
                grant.net = match value {
                    ComptimeValue::Bool(true) => NetGrant::Allowed,
                    ComptimeValue::Bool(false) => NetGrant::Denied,
                    ComptimeValue::Array(hosts) => NetGrant::Hosts(
                        hosts.iter().map(|h| h.to_display_string()).collect(),
                    ),
                    _ => return Err("net grant must be a boolean or a host list".to_string()),
                };
            }
            other => return Err(format!("unknown capability `{}`", other)),
        }
    }
    Ok(grant)
}

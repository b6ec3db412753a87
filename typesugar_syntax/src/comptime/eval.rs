//! The interpreter behind both evaluation tiers.
//!
//! [`fold`] is the pure tier: literals, arithmetic, aggregate literals,
//! property access and a whitelist of pure builtins, bounded by a
//! node-visit budget. [`run_sandboxed`] is the rich tier: closures,
//! loops, assignment and capability-gated I/O, bounded by the same budget
//! plus a wall-clock deadline, checking the cancellation token on every
//! tick.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::debug;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::ast::{Arena, BinOp, NodeId, NodeKind, UnOp};
use crate::comptime::{
    format_number, CapabilityGrant, ComptimeError, ComptimeFn, ComptimeValue, EnvFrame, NetGrant,
};
use crate::config::ComptimeOptions;
use crate::CancelToken;

type EvalResult = Result<ComptimeValue, ComptimeError>;

/// The result of a sandboxed run: the value plus whatever the evaluated
/// code wrote through `console`, redirected to the diagnostic logger.
#[derive(Clone, Debug)]
pub struct EvalOutcome {
    pub value: ComptimeValue,
    pub console: Vec<String>,
}

/// Pure constant folding. No side effects, no capabilities, no function
/// values; rejects anything outside the whitelisted subset.
pub fn fold(arena: &Arena, node: NodeId, options: &ComptimeOptions) -> EvalResult {
    let mut evaluator = Evaluator::new(arena, options, CapabilityGrant::none(), None, true, true);
    evaluator.eval_expr(node)
}

/// Whether `node` folds to a value under the pure tier.
pub fn is_comptime(arena: &Arena, node: NodeId, options: &ComptimeOptions) -> bool {
    fold(arena, node, options).is_ok()
}

/// Sandboxed evaluation. When `node` evaluates to a function value it is
/// invoked with no arguments, which is how `comptime(() => ...)` blocks
/// run.
pub fn run_sandboxed(
    arena: &Arena,
    node: NodeId,
    options: &ComptimeOptions,
    grant: CapabilityGrant,
    cancel: Option<CancelToken>,
    deterministic_only: bool,
) -> Result<EvalOutcome, ComptimeError> {
    let mut evaluator =
        Evaluator::new(arena, options, grant, cancel, false, deterministic_only);
    let value = match evaluator.eval_expr(node)? {
        ComptimeValue::Function(f) => evaluator.call_function(&f, Vec::new())?,
        other => other,
    };
    Ok(EvalOutcome {
        value,
        console: evaluator.console,
    })
}

/// Materialize a comptime value back into an expression node.
pub fn value_to_expr(
    arena: &mut Arena,
    value: &ComptimeValue,
) -> Result<NodeId, ComptimeError> {
    value_to_expr_depth(arena, value, 0)
}

fn value_to_expr_depth(
    arena: &mut Arena,
    value: &ComptimeValue,
    depth: usize,
) -> Result<NodeId, ComptimeError> {
    if depth > super::MAX_CONVERSION_DEPTH {
        return Err(ComptimeError::ConversionError(
            "value graph is circular or too deep".to_string(),
        ));
    }
    use typesugar_pos::DUMMY_SP;
    let kind = match value {
        ComptimeValue::Number(n) => NodeKind::NumberLit {
            value: *n,
            raw: format_number(*n),
        },
        ComptimeValue::Str(s) => NodeKind::StringLit { value: s.clone() },
        ComptimeValue::Bool(b) => NodeKind::BoolLit { value: *b },
        ComptimeValue::Null => NodeKind::NullLit,
        ComptimeValue::Undefined => NodeKind::Ident {
            name: "undefined".to_string(),
        },
        ComptimeValue::BigInt(b) => NodeKind::BigIntLit {
            digits: b.to_string(),
        },
        ComptimeValue::Array(items) => {
            let elements = items
                .iter()
                .map(|item| value_to_expr_depth(arena, item, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            NodeKind::ArrayLit { elements }
        }
        ComptimeValue::Object(props) => {
            let props = props
                .iter()
                .map(|(k, v)| Ok((k.clone(), value_to_expr_depth(arena, v, depth + 1)?)))
                .collect::<Result<Vec<_>, ComptimeError>>()?;
            NodeKind::ObjectLit { props }
        }
        ComptimeValue::Function(_) => {
            return Err(ComptimeError::ConversionError(
                "function values cannot be materialized into an expression".to_string(),
            ))
        }
        ComptimeValue::TypeHandle(name) => {
            return Err(ComptimeError::ConversionError(format!(
                "type handle `{}` cannot be materialized into an expression",
                name
            )))
        }
    };
    Ok(arena.alloc(kind, DUMMY_SP))
}

enum Flow {
    Normal,
    Return(ComptimeValue),
    Break,
    Continue,
}

struct Evaluator<'a> {
    arena: &'a Arena,
    budget_limit: u64,
    remaining: u64,
    deadline: Option<Instant>,
    timeout_ms: u64,
    grant: CapabilityGrant,
    cancel: Option<CancelToken>,
    pure_only: bool,
    deterministic_only: bool,
    scopes: Vec<EnvFrame>,
    console: Vec<String>,
}

impl<'a> Evaluator<'a> {
    fn new(
        arena: &'a Arena,
        options: &ComptimeOptions,
        grant: CapabilityGrant,
        cancel: Option<CancelToken>,
        pure_only: bool,
        deterministic_only: bool,
    ) -> Evaluator<'a> {
        let deadline = if pure_only {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(options.timeout_ms))
        };
        Evaluator {
            arena,
            budget_limit: options.node_budget,
            remaining: options.node_budget,
            deadline,
            timeout_ms: options.timeout_ms,
            grant,
            cancel,
            pure_only,
            deterministic_only,
            scopes: vec![Rc::new(RefCell::new(HashMap::new()))],
            console: Vec::new(),
        }
    }

    fn tick(&mut self) -> Result<(), ComptimeError> {
        if let Some(cancel) = &self.cancel {
            if cancel.is_cancelled() {
                return Err(ComptimeError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(ComptimeError::Timeout {
                    ms: self.timeout_ms,
                });
            }
        }
        if self.remaining == 0 {
            return Err(ComptimeError::Overflow {
                budget: self.budget_limit,
            });
        }
        self.remaining -= 1;
        Ok(())
    }

    fn not_evaluable(&self, what: &str) -> ComptimeError {
        ComptimeError::NotEvaluable(what.to_string())
    }

    fn lookup(&self, name: &str) -> Option<ComptimeValue> {
        for frame in self.scopes.iter().rev() {
            if let Some(value) = frame.borrow().get(name) {
                return Some(value.clone());
            }
        }
        None
    }

    fn define(&mut self, name: &str, value: ComptimeValue) {
        self.scopes
            .last()
            .expect("evaluator always has a scope")
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    fn assign(&mut self, name: &str, value: ComptimeValue) -> Result<(), ComptimeError> {
        for frame in self.scopes.iter().rev() {
            let mut frame = frame.borrow_mut();
            if frame.contains_key(name) {
                frame.insert(name.to_string(), value);
                return Ok(());
            }
        }
        Err(self.not_evaluable(&format!("assignment to unbound name `{}`", name)))
    }

    // ---- expressions ----

    fn eval_expr(&mut self, node: NodeId) -> EvalResult {
        self.tick()?;
        match self.arena.kind(node).clone() {
            NodeKind::NumberLit { value, .. } => Ok(ComptimeValue::Number(value)),
            NodeKind::StringLit { value } => Ok(ComptimeValue::Str(value)),
            NodeKind::BoolLit { value } => Ok(ComptimeValue::Bool(value)),
            NodeKind::NullLit => Ok(ComptimeValue::Null),
            NodeKind::BigIntLit { digits } => digits
                .parse::<BigInt>()
                .map(ComptimeValue::BigInt)
                .map_err(|_| ComptimeError::RuntimeError("invalid bigint literal".to_string())),
            NodeKind::TemplateLit { quasis, exprs } => {
                let mut out = String::new();
                for (index, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if index < exprs.len() {
                        let value = self.eval_expr(exprs[index])?;
                        out.push_str(&value.to_display_string());
                    }
                }
                Ok(ComptimeValue::Str(out))
            }
            NodeKind::Ident { name } => self.eval_ident(&name),
            NodeKind::ArrayLit { elements } => {
                let items = elements
                    .into_iter()
                    .map(|element| self.eval_expr(element))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ComptimeValue::Array(items))
            }
            NodeKind::ObjectLit { props } => {
                let mut out = Vec::with_capacity(props.len());
                for (key, value) in props {
                    out.push((key, self.eval_expr(value)?));
                }
                Ok(ComptimeValue::Object(out))
            }
            NodeKind::Arrow { params, body } => {
                if self.pure_only {
                    return Err(
                        self.not_evaluable("function values require the sandboxed evaluator")
                    );
                }
                let params = params
                    .iter()
                    .map(|&param| match self.arena.kind(param) {
                        NodeKind::Ident { name } => Ok(name.clone()),
                        _ => Err(self.not_evaluable("unsupported parameter pattern")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ComptimeValue::Function(ComptimeFn {
                    params,
                    body,
                    env: self.scopes.clone(),
                }))
            }
            NodeKind::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                self.eval_unary(op, value)
            }
            NodeKind::Binary { op, lhs, rhs } => self.eval_binary(op, lhs, rhs),
            NodeKind::Cond { test, then, alt } => {
                if self.eval_expr(test)?.truthy() {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(alt)
                }
            }
            NodeKind::Assign { target, value } => {
                if self.pure_only {
                    return Err(self.not_evaluable("assignment is not a constant expression"));
                }
                let value = self.eval_expr(value)?;
                match self.arena.kind(target) {
                    NodeKind::Ident { name } => {
                        let name = name.clone();
                        self.assign(&name, value.clone())?;
                        Ok(value)
                    }
                    _ => Err(self.not_evaluable("only plain names can be assigned")),
                }
            }
            NodeKind::Member { object, property } => self.eval_member(object, &property),
            NodeKind::Index { object, index } => {
                let receiver = self.eval_expr(object)?;
                let key = self.eval_expr(index)?;
                self.eval_index(receiver, key, object)
            }
            NodeKind::Call { callee, args } => self.eval_call(callee, &args),
            NodeKind::New { .. } => {
                Err(self.not_evaluable("constructors are not available at compile time"))
            }
            NodeKind::TaggedTemplate { .. } => {
                Err(self.not_evaluable("tagged templates are not constant expressions"))
            }
            _ => Err(self.not_evaluable("statement in expression position")),
        }
    }

    fn eval_ident(&mut self, name: &str) -> EvalResult {
        if let Some(value) = self.lookup(name) {
            return Ok(value);
        }
        match name {
            "undefined" => Ok(ComptimeValue::Undefined),
            "NaN" => Ok(ComptimeValue::Number(f64::NAN)),
            "Infinity" => Ok(ComptimeValue::Number(f64::INFINITY)),
            _ => Err(self.not_evaluable(&format!("unbound identifier `{}`", name))),
        }
    }

    fn eval_unary(&mut self, op: UnOp, value: ComptimeValue) -> EvalResult {
        Ok(match op {
            UnOp::Not => ComptimeValue::Bool(!value.truthy()),
            UnOp::Void => ComptimeValue::Undefined,
            UnOp::TypeOf => ComptimeValue::Str(value.type_of().to_string()),
            UnOp::Neg => match value {
                ComptimeValue::Number(n) => ComptimeValue::Number(-n),
                ComptimeValue::BigInt(b) => ComptimeValue::BigInt(-b),
                other => ComptimeValue::Number(-to_number(&other)),
            },
            UnOp::Pos => match value {
                ComptimeValue::Number(n) => ComptimeValue::Number(n),
                ComptimeValue::BigInt(_) => {
                    return Err(ComptimeError::RuntimeError(
                        "cannot convert a BigInt to a number".to_string(),
                    ))
                }
                other => ComptimeValue::Number(to_number(&other)),
            },
        })
    }

    fn eval_binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> EvalResult {
        // Short-circuit forms first.
        match op {
            BinOp::And => {
                let left = self.eval_expr(lhs)?;
                return if left.truthy() {
                    self.eval_expr(rhs)
                } else {
                    Ok(left)
                };
            }
            BinOp::Or => {
                let left = self.eval_expr(lhs)?;
                return if left.truthy() {
                    Ok(left)
                } else {
                    self.eval_expr(rhs)
                };
            }
            _ => {}
        }
        let left = self.eval_expr(lhs)?;
        let right = self.eval_expr(rhs)?;
        use ComptimeValue::*;
        Ok(match op {
            BinOp::Add => match (&left, &right) {
                (Str(_), _) | (_, Str(_)) => Str(format!(
                    "{}{}",
                    left.to_display_string(),
                    right.to_display_string()
                )),
                (BigInt(a), BigInt(b)) => BigInt(a + b),
                (BigInt(_), _) | (_, BigInt(_)) => return Err(mixed_bigint()),
                _ => Number(to_number(&left) + to_number(&right)),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => match (&left, &right) {
                (BigInt(a), BigInt(b)) => {
                    if matches!(op, BinOp::Div | BinOp::Rem) && b.is_zero() {
                        return Err(ComptimeError::RuntimeError(
                            "BigInt division by zero".to_string(),
                        ));
                    }
                    BigInt(match op {
                        BinOp::Sub => a - b,
                        BinOp::Mul => a * b,
                        BinOp::Div => a / b,
                        _ => a % b,
                    })
                }
                (BigInt(_), _) | (_, BigInt(_)) => return Err(mixed_bigint()),
                _ => {
                    let (a, b) = (to_number(&left), to_number(&right));
                    Number(match op {
                        BinOp::Sub => a - b,
                        BinOp::Mul => a * b,
                        BinOp::Div => a / b,
                        _ => a % b,
                    })
                }
            },
            BinOp::StrictEq => Bool(strict_eq(&left, &right)),
            BinOp::StrictNe => Bool(!strict_eq(&left, &right)),
            BinOp::Eq => Bool(loose_eq(&left, &right)),
            BinOp::Ne => Bool(!loose_eq(&left, &right)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = compare(&left, &right)
                    .ok_or_else(|| self.not_evaluable("values are not comparable"))?;
                Bool(match op {
                    BinOp::Lt => ordering == std::cmp::Ordering::Less,
                    BinOp::Le => ordering != std::cmp::Ordering::Greater,
                    BinOp::Gt => ordering == std::cmp::Ordering::Greater,
                    _ => ordering != std::cmp::Ordering::Less,
                })
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        })
    }

    fn eval_member(&mut self, object: NodeId, property: &str) -> EvalResult {
        // Namespace-shaped accesses that never evaluate their object.
        if let NodeKind::Ident { name } = self.arena.kind(object) {
            match (name.as_str(), property) {
                ("Math", "PI") => return Ok(ComptimeValue::Number(std::f64::consts::PI)),
                ("Math", "E") => return Ok(ComptimeValue::Number(std::f64::consts::E)),
                ("Number", "MAX_SAFE_INTEGER") => {
                    return Ok(ComptimeValue::Number(9_007_199_254_740_991.0))
                }
                ("Number", "MIN_SAFE_INTEGER") => {
                    return Ok(ComptimeValue::Number(-9_007_199_254_740_991.0))
                }
                ("process", "env") => {
                    return Err(
                        self.not_evaluable("process.env must be read one variable at a time")
                    )
                }
                _ => {}
            }
        }
        // `process.env.NAME` needs the env capability.
        if let NodeKind::Member {
            object: inner,
            property: inner_prop,
        } = self.arena.kind(object)
        {
            if inner_prop == "env" {
                if let NodeKind::Ident { name } = self.arena.kind(*inner) {
                    if name == "process" {
                        return self.env_read(property);
                    }
                }
            }
        }
        let receiver = self.eval_expr(object)?;
        self.value_member(receiver, property)
    }

    fn value_member(&mut self, receiver: ComptimeValue, property: &str) -> EvalResult {
        match (&receiver, property) {
            (ComptimeValue::Str(s), "length") => {
                Ok(ComptimeValue::Number(s.chars().count() as f64))
            }
            (ComptimeValue::Array(items), "length") => {
                Ok(ComptimeValue::Number(items.len() as f64))
            }
            (ComptimeValue::Object(_), _) => Ok(receiver
                .object_get(property)
                .cloned()
                .unwrap_or(ComptimeValue::Undefined)),
            (ComptimeValue::Null, _) | (ComptimeValue::Undefined, _) => {
                Err(ComptimeError::RuntimeError(format!(
                    "cannot read property `{}` of {}",
                    property,
                    receiver.to_display_string()
                )))
            }
            _ => Ok(ComptimeValue::Undefined),
        }
    }

    fn eval_index(
        &mut self,
        receiver: ComptimeValue,
        key: ComptimeValue,
        _object: NodeId,
    ) -> EvalResult {
        match (&receiver, &key) {
            (ComptimeValue::Array(items), ComptimeValue::Number(n)) => {
                let index = *n as i64;
                if index < 0 || index as usize >= items.len() {
                    Ok(ComptimeValue::Undefined)
                } else {
                    Ok(items[index as usize].clone())
                }
            }
            (ComptimeValue::Str(s), ComptimeValue::Number(n)) => {
                let index = *n as usize;
                Ok(s.chars()
                    .nth(index)
                    .map(|c| ComptimeValue::Str(c.to_string()))
                    .unwrap_or(ComptimeValue::Undefined))
            }
            (ComptimeValue::Object(_), ComptimeValue::Str(k)) => Ok(receiver
                .object_get(k)
                .cloned()
                .unwrap_or(ComptimeValue::Undefined)),
            _ => Err(self.not_evaluable("unsupported indexing")),
        }
    }

    fn env_read(&mut self, name: &str) -> EvalResult {
        if !self.grant.env_read {
            return Err(ComptimeError::PermissionDenied {
                capability: "env".to_string(),
            });
        }
        if self.deterministic_only {
            return Err(self.not_evaluable(
                "environment reads are non-deterministic and the calling macro is cacheable",
            ));
        }
        match std::env::var(name) {
            Ok(value) => Ok(ComptimeValue::Str(value)),
            Err(_) => Ok(ComptimeValue::Undefined),
        }
    }

    // ---- calls ----

    fn eval_args(&mut self, args: &[NodeId]) -> Result<Vec<ComptimeValue>, ComptimeError> {
        args.iter().map(|&arg| self.eval_expr(arg)).collect()
    }

    fn eval_call(&mut self, callee: NodeId, args: &[NodeId]) -> EvalResult {
        match self.arena.kind(callee).clone() {
            NodeKind::Member { object, property } => {
                if let NodeKind::Ident { name } = self.arena.kind(object).clone() {
                    match name.as_str() {
                        "Math" => {
                            let args = self.eval_args(args)?;
                            return self.math_builtin(&property, &args);
                        }
                        "JSON" => {
                            let args = self.eval_args(args)?;
                            return self.json_builtin(&property, &args);
                        }
                        "Object" => {
                            let args = self.eval_args(args)?;
                            return self.object_builtin(&property, &args);
                        }
                        "console" => {
                            if self.pure_only {
                                return Err(
                                    self.not_evaluable("console output is not a constant")
                                );
                            }
                            let args = self.eval_args(args)?;
                            let line = args
                                .iter()
                                .map(|v| v.to_display_string())
                                .collect::<Vec<_>>()
                                .join(" ");
                            debug!("comptime console.{}: {}", property, line);
                            self.console.push(line);
                            return Ok(ComptimeValue::Undefined);
                        }
                        "Date" => {
                            if property == "now" {
                                return self.time_builtin();
                            }
                        }
                        _ => {}
                    }
                }
                let receiver = self.eval_expr(object)?;
                self.method_call(receiver, &property, args)
            }
            NodeKind::Ident { name } => {
                if let Some(value) = self.lookup(&name) {
                    return match value {
                        ComptimeValue::Function(f) => {
                            let args = self.eval_args(args)?;
                            self.call_function(&f, args)
                        }
                        _ => Err(ComptimeError::RuntimeError(format!(
                            "`{}` is not a function",
                            name
                        ))),
                    };
                }
                let evaluated = self.eval_args(args)?;
                self.global_builtin(&name, &evaluated)
            }
            NodeKind::Arrow { .. } => {
                let f = self.eval_expr(callee)?;
                match f {
                    ComptimeValue::Function(f) => {
                        let args = self.eval_args(args)?;
                        self.call_function(&f, args)
                    }
                    _ => unreachable!("arrow evaluates to a function"),
                }
            }
            _ => Err(self.not_evaluable("unsupported callee")),
        }
    }

    fn call_function(
        &mut self,
        f: &ComptimeFn,
        args: Vec<ComptimeValue>,
    ) -> EvalResult {
        if self.pure_only {
            return Err(self.not_evaluable("function calls require the sandboxed evaluator"));
        }
        self.tick()?;
        let saved = std::mem::replace(&mut self.scopes, f.env.clone());
        let frame: EnvFrame = Rc::new(RefCell::new(HashMap::new()));
        for (index, param) in f.params.iter().enumerate() {
            frame.borrow_mut().insert(
                param.clone(),
                args.get(index).cloned().unwrap_or(ComptimeValue::Undefined),
            );
        }
        self.scopes.push(frame);
        let result = (|| -> EvalResult {
            if matches!(self.arena.kind(f.body), NodeKind::Block { .. }) {
                match self.exec_stmt(f.body)? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(ComptimeValue::Undefined),
                }
            } else {
                self.eval_expr(f.body)
            }
        })();
        self.scopes = saved;
        result
    }

    fn global_builtin(&mut self, name: &str, args: &[ComptimeValue]) -> EvalResult {
        let first = args.first().cloned().unwrap_or(ComptimeValue::Undefined);
        match name {
            "String" => Ok(ComptimeValue::Str(first.to_display_string())),
            "Number" => Ok(ComptimeValue::Number(to_number(&first))),
            "Boolean" => Ok(ComptimeValue::Bool(first.truthy())),
            "isNaN" => Ok(ComptimeValue::Bool(to_number(&first).is_nan())),
            "isFinite" => Ok(ComptimeValue::Bool(to_number(&first).is_finite())),
            "parseFloat" => match &first {
                ComptimeValue::Str(s) => Ok(ComptimeValue::Number(
                    s.trim().parse::<f64>().unwrap_or(f64::NAN),
                )),
                other => Ok(ComptimeValue::Number(to_number(other))),
            },
            "parseInt" => match &first {
                ComptimeValue::Str(s) => Ok(ComptimeValue::Number(
                    s.trim()
                        .parse::<i64>()
                        .map(|n| n as f64)
                        .unwrap_or(f64::NAN),
                )),
                other => Ok(ComptimeValue::Number(to_number(other).trunc())),
            },
            "readFile" | "readDir" | "writeFile" => self.fs_builtin(name, args),
            "now" => self.time_builtin(),
            "fetch" => match self.grant.net {
                NetGrant::Denied => Err(ComptimeError::PermissionDenied {
                    capability: "net".to_string(),
                }),
                _ => Err(self.not_evaluable(
                    "network access is granted but no network builtin is provided",
                )),
            },
            _ => Err(self.not_evaluable(&format!("unknown function `{}`", name))),
        }
    }

    fn time_builtin(&mut self) -> EvalResult {
        if self.pure_only {
            return Err(self.not_evaluable("time reads are not constant"));
        }
        if !self.grant.time {
            return Err(ComptimeError::PermissionDenied {
                capability: "time".to_string(),
            });
        }
        if self.deterministic_only {
            return Err(self.not_evaluable(
                "time reads are non-deterministic and the calling macro is cacheable",
            ));
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| ComptimeError::RuntimeError(e.to_string()))?;
        Ok(ComptimeValue::Number(now.as_millis() as f64))
    }

    fn fs_builtin(&mut self, name: &str, args: &[ComptimeValue]) -> EvalResult {
        if self.pure_only {
            return Err(self.not_evaluable("file system access is not constant"));
        }
        let path = match args.first() {
            Some(ComptimeValue::Str(path)) => path.clone(),
            _ => {
                return Err(ComptimeError::RuntimeError(format!(
                    "{} expects a path string",
                    name
                )))
            }
        };
        let needs_write = name == "writeFile";
        if self.grant.fs.is_none() || (needs_write && !self.grant.allows_write()) {
            return Err(ComptimeError::PermissionDenied {
                capability: "fs".to_string(),
            });
        }
        let resolved = self.grant.resolve_path(&path)?;
        match name {
            "readFile" => std::fs::read_to_string(&resolved)
                .map(ComptimeValue::Str)
                .map_err(|e| ComptimeError::RuntimeError(format!("readFile: {}", e))),
            "readDir" => {
                let entries = std::fs::read_dir(&resolved)
                    .map_err(|e| ComptimeError::RuntimeError(format!("readDir: {}", e)))?;
                let mut names = Vec::new();
                for entry in entries {
                    let entry =
                        entry.map_err(|e| ComptimeError::RuntimeError(e.to_string()))?;
                    names.push(ComptimeValue::Str(
                        entry.file_name().to_string_lossy().into_owned(),
                    ));
                }
                names.sort_by(|a, b| {
                    a.to_display_string().cmp(&b.to_display_string())
                });
                Ok(ComptimeValue::Array(names))
            }
            "writeFile" => {
                let content = match args.get(1) {
                    Some(value) => value.to_display_string(),
                    None => {
                        return Err(ComptimeError::RuntimeError(
                            "writeFile expects content".to_string(),
                        ))
                    }
                };
                std::fs::write(&resolved, content)
                    .map(|_| ComptimeValue::Undefined)
                    .map_err(|e| ComptimeError::RuntimeError(format!("writeFile: {}", e)))
            }
            _ => unreachable!(),
        }
    }

    fn math_builtin(&mut self, name: &str, args: &[ComptimeValue]) -> EvalResult {
        let nums: Vec<f64> = args.iter().map(to_number).collect();
        let first = nums.first().copied().unwrap_or(f64::NAN);
        let second = nums.get(1).copied().unwrap_or(f64::NAN);
        let out = match name {
            "abs" => first.abs(),
            "floor" => first.floor(),
            "ceil" => first.ceil(),
            "round" => (first + 0.5).floor(),
            "trunc" => first.trunc(),
            "sqrt" => first.sqrt(),
            "cbrt" => first.cbrt(),
            "sign" => {
                if first > 0.0 {
                    1.0
                } else if first < 0.0 {
                    -1.0
                } else {
                    first
                }
            }
            "pow" => first.powf(second),
            "log" => first.ln(),
            "log2" => first.log2(),
            "log10" => first.log10(),
            "exp" => first.exp(),
            "hypot" => first.hypot(second),
            "min" => nums.iter().copied().fold(f64::INFINITY, f64::min),
            "max" => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            "random" => {
                return Err(
                    self.not_evaluable("Math.random is not available at compile time")
                )
            }
            _ => return Err(self.not_evaluable(&format!("unknown Math builtin `{}`", name))),
        };
        Ok(ComptimeValue::Number(out))
    }

    fn json_builtin(&mut self, name: &str, args: &[ComptimeValue]) -> EvalResult {
        match name {
            "parse" => match args.first() {
                Some(ComptimeValue::Str(text)) => serde_json::from_str(text)
                    .map(|value: serde_json::Value| ComptimeValue::from_json(&value))
                    .map_err(|e| {
                        ComptimeError::RuntimeError(format!("JSON.parse: {}", e))
                    }),
                _ => Err(ComptimeError::RuntimeError(
                    "JSON.parse expects a string".to_string(),
                )),
            },
            "stringify" => {
                let value = args.first().cloned().unwrap_or(ComptimeValue::Undefined);
                let json = value.to_json()?;
                Ok(ComptimeValue::Str(
                    serde_json::to_string(&json)
                        .map_err(|e| ComptimeError::RuntimeError(e.to_string()))?,
                ))
            }
            _ => Err(self.not_evaluable(&format!("unknown JSON builtin `{}`", name))),
        }
    }

    fn object_builtin(&mut self, name: &str, args: &[ComptimeValue]) -> EvalResult {
        let first = args.first().cloned().unwrap_or(ComptimeValue::Undefined);
        let props = match first {
            ComptimeValue::Object(props) => props,
            _ => {
                return Err(ComptimeError::RuntimeError(format!(
                    "Object.{} expects an object",
                    name
                )))
            }
        };
        Ok(match name {
            "keys" => ComptimeValue::Array(
                props
                    .iter()
                    .map(|(k, _)| ComptimeValue::Str(k.clone()))
                    .collect(),
            ),
            "values" => {
                ComptimeValue::Array(props.into_iter().map(|(_, v)| v).collect())
            }
            "entries" => ComptimeValue::Array(
                props
                    .into_iter()
                    .map(|(k, v)| {
                        ComptimeValue::Array(vec![ComptimeValue::Str(k), v])
                    })
                    .collect(),
            ),
            _ => {
                return Err(
                    self.not_evaluable(&format!("unknown Object builtin `{}`", name))
                )
            }
        })
    }

    fn method_call(
        &mut self,
        receiver: ComptimeValue,
        method: &str,
        args: &[NodeId],
    ) -> EvalResult {
        match receiver {
            ComptimeValue::Str(s) => {
                let args = self.eval_args(args)?;
                self.string_method(&s, method, &args)
            }
            ComptimeValue::Number(n) => {
                let args = self.eval_args(args)?;
                self.number_method(n, method, &args)
            }
            ComptimeValue::Array(items) => self.array_method(items, method, args),
            ComptimeValue::Object(_) => {
                Err(self.not_evaluable(&format!("unknown object method `{}`", method)))
            }
            other => Err(ComptimeError::RuntimeError(format!(
                "cannot call `{}` on {}",
                method,
                other.type_of()
            ))),
        }
    }

    fn string_method(
        &mut self,
        receiver: &str,
        method: &str,
        args: &[ComptimeValue],
    ) -> EvalResult {
        use ComptimeValue::*;
        let chars: Vec<char> = receiver.chars().collect();
        let arg_str = |index: usize| -> String {
            args.get(index)
                .map(|v| v.to_display_string())
                .unwrap_or_default()
        };
        let clamp = |n: f64| -> usize {
            let len = chars.len() as i64;
            let signed = n as i64;
            let resolved = if signed < 0 { len + signed } else { signed };
            resolved.clamp(0, len) as usize
        };
        Ok(match method {
            "toUpperCase" => Str(receiver.to_uppercase()),
            "toLowerCase" => Str(receiver.to_lowercase()),
            "trim" => Str(receiver.trim().to_string()),
            "includes" => Bool(receiver.contains(&arg_str(0))),
            "startsWith" => Bool(receiver.starts_with(&arg_str(0))),
            "endsWith" => Bool(receiver.ends_with(&arg_str(0))),
            "indexOf" => {
                let needle = arg_str(0);
                match receiver.find(&needle) {
                    Some(byte_index) => {
                        Number(receiver[..byte_index].chars().count() as f64)
                    }
                    None => Number(-1.0),
                }
            }
            "charAt" => {
                let index = args.first().map(to_number).unwrap_or(0.0) as usize;
                Str(chars.get(index).map(|c| c.to_string()).unwrap_or_default())
            }
            "repeat" => {
                let count = args.first().map(to_number).unwrap_or(0.0);
                if count < 0.0 {
                    return Err(ComptimeError::RuntimeError(
                        "repeat count must be non-negative".to_string(),
                    ));
                }
                Str(receiver.repeat(count as usize))
            }
            "slice" => {
                let start = clamp(args.first().map(to_number).unwrap_or(0.0));
                let end = match args.get(1) {
                    Some(v) => clamp(to_number(v)),
                    None => chars.len(),
                };
                Str(chars[start..end.max(start)].iter().collect())
            }
            "split" => {
                let sep = arg_str(0);
                let parts: Vec<ComptimeValue> = if sep.is_empty() {
                    chars.iter().map(|c| Str(c.to_string())).collect()
                } else {
                    receiver.split(&sep).map(|p| Str(p.to_string())).collect()
                };
                Array(parts)
            }
            "padStart" | "padEnd" => {
                let width = args.first().map(to_number).unwrap_or(0.0) as usize;
                let fill = match args.get(1) {
                    Some(v) => v.to_display_string(),
                    None => " ".to_string(),
                };
                let mut out = receiver.to_string();
                if fill.is_empty() {
                    return Ok(Str(out));
                }
                let mut pad = String::new();
                while chars.len() + pad.chars().count() < width {
                    pad.push_str(&fill);
                }
                let pad: String = pad
                    .chars()
                    .take(width.saturating_sub(chars.len()))
                    .collect();
                if method == "padStart" {
                    out = format!("{}{}", pad, out);
                } else {
                    out.push_str(&pad);
                }
                Str(out)
            }
            "replace" => {
                let needle = arg_str(0);
                let replacement = arg_str(1);
                Str(receiver.replacen(&needle, &replacement, 1))
            }
            _ => {
                return Err(
                    self.not_evaluable(&format!("unknown string method `{}`", method))
                )
            }
        })
    }

    fn number_method(
        &mut self,
        receiver: f64,
        method: &str,
        args: &[ComptimeValue],
    ) -> EvalResult {
        Ok(match method {
            "toFixed" => {
                let digits = args.first().map(to_number).unwrap_or(0.0) as usize;
                ComptimeValue::Str(format!("{:.*}", digits, receiver))
            }
            "toString" => ComptimeValue::Str(format_number(receiver)),
            _ => {
                return Err(
                    self.not_evaluable(&format!("unknown number method `{}`", method))
                )
            }
        })
    }

    fn array_method(
        &mut self,
        items: Vec<ComptimeValue>,
        method: &str,
        args: &[NodeId],
    ) -> EvalResult {
        use ComptimeValue::*;
        match method {
            "map" | "filter" => {
                let f = match self.eval_args(args)?.into_iter().next() {
                    Some(Function(f)) => f,
                    _ => {
                        return Err(ComptimeError::RuntimeError(format!(
                            "{} expects a function",
                            method
                        )))
                    }
                };
                let mut out = Vec::new();
                for (index, item) in items.into_iter().enumerate() {
                    let mapped = self.call_function(
                        &f,
                        vec![item.clone(), Number(index as f64)],
                    )?;
                    if method == "map" {
                        out.push(mapped);
                    } else if mapped.truthy() {
                        out.push(item);
                    }
                }
                Ok(Array(out))
            }
            "join" => {
                let args = self.eval_args(args)?;
                let sep = args
                    .first()
                    .map(|v| v.to_display_string())
                    .unwrap_or_else(|| ",".to_string());
                Ok(Str(items
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(&sep)))
            }
            "includes" => {
                let args = self.eval_args(args)?;
                let needle = args.first().cloned().unwrap_or(Undefined);
                Ok(Bool(items.iter().any(|item| strict_eq(item, &needle))))
            }
            "indexOf" => {
                let args = self.eval_args(args)?;
                let needle = args.first().cloned().unwrap_or(Undefined);
                Ok(Number(
                    items
                        .iter()
                        .position(|item| strict_eq(item, &needle))
                        .map(|i| i as f64)
                        .unwrap_or(-1.0),
                ))
            }
            "slice" => {
                let args = self.eval_args(args)?;
                let len = items.len() as i64;
                let clamp = |n: f64| -> usize {
                    let signed = n as i64;
                    let resolved = if signed < 0 { len + signed } else { signed };
                    resolved.clamp(0, len) as usize
                };
                let start = args.first().map(to_number).map(clamp).unwrap_or(0);
                let end = args.get(1).map(to_number).map(clamp).unwrap_or(items.len());
                Ok(Array(items[start..end.max(start)].to_vec()))
            }
            "concat" => {
                let args = self.eval_args(args)?;
                let mut out = items;
                for arg in args {
                    match arg {
                        Array(more) => out.extend(more),
                        other => out.push(other),
                    }
                }
                Ok(Array(out))
            }
            _ => Err(self.not_evaluable(&format!("unknown array method `{}`", method))),
        }
    }

    // ---- statements (sandboxed tier) ----

    fn exec_stmt(&mut self, node: NodeId) -> Result<Flow, ComptimeError> {
        self.tick()?;
        if self.pure_only {
            return Err(self.not_evaluable("statements require the sandboxed evaluator"));
        }
        match self.arena.kind(node).clone() {
            NodeKind::Block { stmts } => {
                self.scopes.push(Rc::new(RefCell::new(HashMap::new())));
                let mut flow = Flow::Normal;
                for stmt in stmts {
                    match self.exec_stmt(stmt)? {
                        Flow::Normal => {}
                        other => {
                            flow = other;
                            break;
                        }
                    }
                }
                self.scopes.pop();
                Ok(flow)
            }
            NodeKind::ExprStmt { expr } => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }
            NodeKind::VarDecl { pattern, init, .. } => {
                let value = match init {
                    Some(init) => self.eval_expr(init)?,
                    None => ComptimeValue::Undefined,
                };
                self.bind_pattern(pattern, value)?;
                Ok(Flow::Normal)
            }
            NodeKind::Return { arg } => {
                let value = match arg {
                    Some(arg) => self.eval_expr(arg)?,
                    None => ComptimeValue::Undefined,
                };
                Ok(Flow::Return(value))
            }
            NodeKind::If { test, then, alt } => {
                if self.eval_expr(test)?.truthy() {
                    self.exec_stmt(then)
                } else if let Some(alt) = alt {
                    self.exec_stmt(alt)
                } else {
                    Ok(Flow::Normal)
                }
            }
            NodeKind::While { test, body } => {
                while self.eval_expr(test)?.truthy() {
                    match self.exec_stmt(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        _ => {}
                    }
                }
                Ok(Flow::Normal)
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.scopes.push(Rc::new(RefCell::new(HashMap::new())));
                let result = (|| -> Result<Flow, ComptimeError> {
                    if let Some(init) = init {
                        self.exec_stmt(init)?;
                    }
                    loop {
                        if let Some(test) = test {
                            if !self.eval_expr(test)?.truthy() {
                                break;
                            }
                        }
                        match self.exec_stmt(body)? {
                            Flow::Break => break,
                            Flow::Return(value) => return Ok(Flow::Return(value)),
                            _ => {}
                        }
                        if let Some(update) = update {
                            self.eval_expr(update)?;
                        }
                    }
                    Ok(Flow::Normal)
                })();
                self.scopes.pop();
                result
            }
            NodeKind::Break => Ok(Flow::Break),
            NodeKind::Continue => Ok(Flow::Continue),
            NodeKind::Throw { arg } => {
                let value = self.eval_expr(arg)?;
                Err(ComptimeError::RuntimeError(value.to_display_string()))
            }
            _ => Err(self.not_evaluable("unsupported statement in comptime code")),
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: NodeId,
        value: ComptimeValue,
    ) -> Result<(), ComptimeError> {
        match self.arena.kind(pattern).clone() {
            NodeKind::Ident { name } => {
                self.define(&name, value);
                Ok(())
            }
            NodeKind::ObjectPat { props } => {
                for (key, sub) in props {
                    let item = value
                        .object_get(&key)
                        .cloned()
                        .unwrap_or(ComptimeValue::Undefined);
                    self.bind_pattern(sub, item)?;
                }
                Ok(())
            }
            NodeKind::ArrayPat { elements } => {
                let items = match &value {
                    ComptimeValue::Array(items) => items.clone(),
                    _ => Vec::new(),
                };
                for (index, sub) in elements.into_iter().enumerate() {
                    let item = items.get(index).cloned().unwrap_or(ComptimeValue::Undefined);
                    self.bind_pattern(sub, item)?;
                }
                Ok(())
            }
            _ => Err(self.not_evaluable("unsupported binding pattern")),
        }
    }
}

fn mixed_bigint() -> ComptimeError {
    ComptimeError::RuntimeError("cannot mix BigInt and other types".to_string())
}

fn to_number(value: &ComptimeValue) -> f64 {
    match value {
        ComptimeValue::Number(n) => *n,
        ComptimeValue::Bool(true) => 1.0,
        ComptimeValue::Bool(false) => 0.0,
        ComptimeValue::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        ComptimeValue::Null => 0.0,
        ComptimeValue::BigInt(b) => b.to_f64().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Strict equality. Aggregates compare structurally: comptime values are
/// immutable copies, so identity has no observable meaning here.
fn strict_eq(left: &ComptimeValue, right: &ComptimeValue) -> bool {
    match (left, right) {
        (ComptimeValue::Number(a), ComptimeValue::Number(b)) => a == b,
        _ => left == right,
    }
}

fn loose_eq(left: &ComptimeValue, right: &ComptimeValue) -> bool {
    use ComptimeValue::*;
    match (left, right) {
        (Null, Undefined) | (Undefined, Null) => true,
        (Number(_), Str(_)) | (Str(_), Number(_)) | (Bool(_), _) | (_, Bool(_)) => {
            to_number(left) == to_number(right)
        }
        _ => strict_eq(left, right),
    }
}

fn compare(left: &ComptimeValue, right: &ComptimeValue) -> Option<std::cmp::Ordering> {
    use ComptimeValue::*;
    match (left, right) {
        (Str(a), Str(b)) => Some(a.cmp(b)),
        (BigInt(a), BigInt(b)) => Some(a.cmp(b)),
        (BigInt(a), b) => a.to_f64().unwrap_or(f64::NAN).partial_cmp(&to_number(b)),
        (a, BigInt(b)) => to_number(a).partial_cmp(&b.to_f64().unwrap_or(f64::NAN)),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{self, Session};

    fn fold_src(src: &str) -> EvalResult {
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let expr = parse::parse_snippet_expr(&sess, &mut arena, src).expect("parse failure");
        fold(&arena, expr, &ComptimeOptions::default())
    }

    fn sandbox_src(src: &str, grant: CapabilityGrant) -> Result<EvalOutcome, ComptimeError> {
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let expr = parse::parse_snippet_expr(&sess, &mut arena, src).expect("parse failure");
        run_sandboxed(
            &arena,
            expr,
            &ComptimeOptions::default(),
            grant,
            None,
            false,
        )
    }

    #[test]
    fn folds_literal_arithmetic() {
        assert_eq!(fold_src("1 + 2 * 3"), Ok(ComptimeValue::Number(7.0)));
        assert_eq!(
            fold_src("1 + 2 === 3"),
            Ok(ComptimeValue::Bool(true))
        );
        assert_eq!(
            fold_src("\"a\" + \"b\""),
            Ok(ComptimeValue::Str("ab".to_string()))
        );
    }

    #[test]
    fn folds_aggregates_and_access() {
        assert_eq!(
            fold_src("{ a: 1, b: [2, 3] }.b[1]"),
            Ok(ComptimeValue::Number(3.0))
        );
        assert_eq!(fold_src("[1, 2, 3].length"), Ok(ComptimeValue::Number(3.0)));
    }

    #[test]
    fn folds_whitelisted_builtins() {
        assert_eq!(fold_src("Math.max(1, 5, 3)"), Ok(ComptimeValue::Number(5.0)));
        assert_eq!(
            fold_src("JSON.stringify({ a: 1 })"),
            Ok(ComptimeValue::Str("{\"a\":1}".to_string()))
        );
        assert_eq!(
            fold_src("\"abc\".toUpperCase()"),
            Ok(ComptimeValue::Str("ABC".to_string()))
        );
    }

    #[test]
    fn pure_tier_rejects_functions() {
        assert!(matches!(
            fold_src("(() => 1)()"),
            Err(ComptimeError::NotEvaluable(_))
        ));
    }

    #[test]
    fn pure_tier_rejects_unbound_names() {
        assert!(matches!(
            fold_src("someVariable + 1"),
            Err(ComptimeError::NotEvaluable(_))
        ));
    }

    #[test]
    fn bigint_arithmetic_stays_exact() {
        assert_eq!(
            fold_src("9007199254740993n + 1n"),
            Ok(ComptimeValue::BigInt("9007199254740994".parse().unwrap()))
        );
        assert!(matches!(
            fold_src("1n + 1"),
            Err(ComptimeError::RuntimeError(_))
        ));
    }

    #[test]
    fn sandbox_runs_closures_and_loops() {
        let out = sandbox_src(
            "() => { let total = 0; for (let i = 1; i <= 4; i = i + 1) { total = total + i; } return total; }",
            CapabilityGrant::none(),
        )
        .unwrap();
        assert_eq!(out.value, ComptimeValue::Number(10.0));
    }

    #[test]
    fn sandbox_higher_order_functions() {
        let out = sandbox_src(
            "() => [1, 2, 3].map((x) => x * 2).join(\",\")",
            CapabilityGrant::none(),
        )
        .unwrap();
        assert_eq!(out.value, ComptimeValue::Str("2,4,6".to_string()));
    }

    #[test]
    fn closures_capture_their_environment() {
        let out = sandbox_src(
            "() => { let n = 10; const add = (x) => x + n; n = 20; return add(1); }",
            CapabilityGrant::none(),
        )
        .unwrap();
        assert_eq!(out.value, ComptimeValue::Number(21.0));
    }

    #[test]
    fn console_is_redirected() {
        let out = sandbox_src(
            "() => { console.log(\"hello\", 42); return 1; }",
            CapabilityGrant::none(),
        )
        .unwrap();
        assert_eq!(out.console, vec!["hello 42".to_string()]);
    }

    #[test]
    fn env_requires_capability() {
        let err = sandbox_src("() => process.env.HOME", CapabilityGrant::none()).unwrap_err();
        assert_eq!(
            err,
            ComptimeError::PermissionDenied {
                capability: "env".to_string()
            }
        );
    }

    #[test]
    fn env_read_with_grant() {
        std::env::set_var("TYPESUGAR_EVAL_TEST", "on");
        let grant = CapabilityGrant {
            env_read: true,
            ..CapabilityGrant::none()
        };
        let out = sandbox_src("() => process.env.TYPESUGAR_EVAL_TEST", grant).unwrap();
        assert_eq!(out.value, ComptimeValue::Str("on".to_string()));
    }

    #[test]
    fn cacheable_macros_reject_nondeterminism() {
        let src = "() => process.env.HOME";
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let expr = parse::parse_snippet_expr(&sess, &mut arena, src).unwrap();
        let grant = CapabilityGrant {
            env_read: true,
            ..CapabilityGrant::none()
        };
        let err = run_sandboxed(
            &arena,
            expr,
            &ComptimeOptions::default(),
            grant,
            None,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ComptimeError::NotEvaluable(_)));
    }

    #[test]
    fn budget_exhaustion_is_typed() {
        let mut options = ComptimeOptions::default();
        options.node_budget = 50;
        let src = "() => { let i = 0; while (true) { i = i + 1; } return i; }";
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let expr = parse::parse_snippet_expr(&sess, &mut arena, src).unwrap();
        let err = run_sandboxed(
            &arena,
            expr,
            &options,
            CapabilityGrant::none(),
            None,
            false,
        )
        .unwrap_err();
        assert_eq!(err, ComptimeError::Overflow { budget: 50 });
    }

    #[test]
    fn cancellation_is_honored() {
        let token = CancelToken::new();
        token.cancel();
        let src = "1 + 1";
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let expr = parse::parse_snippet_expr(&sess, &mut arena, src).unwrap();
        let err = run_sandboxed(
            &arena,
            expr,
            &ComptimeOptions::default(),
            CapabilityGrant::none(),
            Some(token),
            false,
        )
        .unwrap_err();
        assert_eq!(err, ComptimeError::Cancelled);
    }

    #[test]
    fn fs_read_respects_the_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "payload").unwrap();
        let grant = CapabilityGrant {
            fs: Some(crate::comptime::FsAccess::Read),
            project_root: Some(dir.path().to_path_buf()),
            ..CapabilityGrant::none()
        };
        let out = sandbox_src("() => readFile(\"data.txt\")", grant.clone()).unwrap();
        assert_eq!(out.value, ComptimeValue::Str("payload".to_string()));

        let err = sandbox_src("() => readFile(\"../secret.txt\")", grant.clone()).unwrap_err();
        assert!(matches!(err, ComptimeError::PathEscape { .. }));

        let err = sandbox_src("() => writeFile(\"out.txt\", \"x\")", grant).unwrap_err();
        assert_eq!(
            err,
            ComptimeError::PermissionDenied {
                capability: "fs".to_string()
            }
        );
    }

    #[test]
    fn value_round_trips_through_expression() {
        let mut arena = Arena::new("");
        let value = ComptimeValue::Object(vec![
            ("a".to_string(), ComptimeValue::Number(1.0)),
            (
                "b".to_string(),
                ComptimeValue::Array(vec![
                    ComptimeValue::Str("x".to_string()),
                    ComptimeValue::Bool(false),
                ]),
            ),
        ]);
        let expr = value_to_expr(&mut arena, &value).unwrap();
        let folded = fold(&arena, expr, &ComptimeOptions::default()).unwrap();
        assert_eq!(folded, value);
    }
}

//! Compile-time evaluation of a bounded expression subset.
//!
//! Two tiers share one interpreter core: [`eval::fold`] interprets pure
//! constant expressions under a node-visit budget, and
//! [`eval::run_sandboxed`] runs richer code (closures, loops, control
//! flow) under a wall-clock deadline with capability-gated I/O.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use num_bigint::BigInt;
use thiserror::Error;

use crate::ast::NodeId;

pub mod eval;

/// Aggregate conversion depth guard; conversions past this are reported
/// as circular.
const MAX_CONVERSION_DEPTH: usize = 256;

/// A lexical environment frame. Closures capture the chain by reference,
/// so assignment inside a closure is visible to its siblings.
pub type EnvFrame = Rc<RefCell<HashMap<String, ComptimeValue>>>;

/// A function value produced by evaluating an arrow expression. Meta
/// only: it can be called during evaluation but never materializes into
/// an output expression.
#[derive(Clone, Debug)]
pub struct ComptimeFn {
    pub params: Vec<String>,
    pub body: NodeId,
    pub env: Vec<EnvFrame>,
}

impl PartialEq for ComptimeFn {
    fn eq(&self, other: &Self) -> bool {
        // Captured environments are deliberately not compared; they can
        // reference the frame the function itself lives in.
        self.body == other.body && self.params == other.params
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ComptimeValue {
    Number(f64),
    Str(String),
    Bool(bool),
    BigInt(BigInt),
    Null,
    Undefined,
    Array(Vec<ComptimeValue>),
    /// Insertion-ordered string-keyed map.
    Object(Vec<(String, ComptimeValue)>),
    Function(ComptimeFn),
    /// An opaque handle to a host type, usable only by type utilities.
    TypeHandle(String),
}

impl ComptimeValue {
    pub fn truthy(&self) -> bool {
        match self {
            ComptimeValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ComptimeValue::Str(s) => !s.is_empty(),
            ComptimeValue::Bool(b) => *b,
            ComptimeValue::BigInt(b) => !num_traits::Zero::is_zero(b),
            ComptimeValue::Null | ComptimeValue::Undefined => false,
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            ComptimeValue::Number(_) => "number",
            ComptimeValue::Str(_) => "string",
            ComptimeValue::Bool(_) => "boolean",
            ComptimeValue::BigInt(_) => "bigint",
            ComptimeValue::Null => "object",
            ComptimeValue::Undefined => "undefined",
            ComptimeValue::Array(_) | ComptimeValue::Object(_) => "object",
            ComptimeValue::Function(_) => "function",
            ComptimeValue::TypeHandle(_) => "object",
        }
    }

    /// String conversion, as template interpolation performs it.
    pub fn to_display_string(&self) -> String {
        match self {
            ComptimeValue::Number(n) => format_number(*n),
            ComptimeValue::Str(s) => s.clone(),
            ComptimeValue::Bool(b) => b.to_string(),
            ComptimeValue::BigInt(b) => b.to_string(),
            ComptimeValue::Null => "null".to_string(),
            ComptimeValue::Undefined => "undefined".to_string(),
            ComptimeValue::Array(items) => items
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(","),
            ComptimeValue::Object(_) => "[object Object]".to_string(),
            ComptimeValue::Function(_) => "[function]".to_string(),
            ComptimeValue::TypeHandle(name) => format!("[type {}]", name),
        }
    }

    pub fn object_get(&self, key: &str) -> Option<&ComptimeValue> {
        match self {
            ComptimeValue::Object(props) => {
                props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Convert to a JSON value. Function and type-handle values are not
    /// representable.
    pub fn to_json(&self) -> Result<serde_json::Value, ComptimeError> {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> Result<serde_json::Value, ComptimeError> {
        if depth > MAX_CONVERSION_DEPTH {
            return Err(ComptimeError::ConversionError(
                "value graph is circular or too deep".to_string(),
            ));
        }
        Ok(match self {
            ComptimeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ComptimeValue::Str(s) => serde_json::Value::String(s.clone()),
            ComptimeValue::Bool(b) => serde_json::Value::Bool(*b),
            ComptimeValue::BigInt(_) => {
                return Err(ComptimeError::ConversionError(
                    "BigInt values cannot be serialized to JSON".to_string(),
                ))
            }
            ComptimeValue::Null | ComptimeValue::Undefined => serde_json::Value::Null,
            ComptimeValue::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json_depth(depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            ComptimeValue::Object(props) => {
                let mut map = serde_json::Map::new();
                for (k, v) in props {
                    map.insert(k.clone(), v.to_json_depth(depth + 1)?);
                }
                serde_json::Value::Object(map)
            }
            ComptimeValue::Function(_) | ComptimeValue::TypeHandle(_) => {
                return Err(ComptimeError::ConversionError(
                    "function values cannot be serialized to JSON".to_string(),
                ))
            }
        })
    }

    pub fn from_json(value: &serde_json::Value) -> ComptimeValue {
        match value {
            serde_json::Value::Null => ComptimeValue::Null,
            serde_json::Value::Bool(b) => ComptimeValue::Bool(*b),
            serde_json::Value::Number(n) => {
                ComptimeValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => ComptimeValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                ComptimeValue::Array(items.iter().map(ComptimeValue::from_json).collect())
            }
            serde_json::Value::Object(map) => ComptimeValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), ComptimeValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Number formatting that matches template interpolation: integral
/// doubles print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum ComptimeError {
    #[error("not evaluable at compile time: {0}")]
    NotEvaluable(String),
    #[error("evaluation exceeded the operation budget of {budget}")]
    Overflow { budget: u64 },
    #[error("evaluation timed out after {ms} ms")]
    Timeout { ms: u64 },
    #[error("permission denied: the `{capability}` capability was not granted")]
    PermissionDenied { capability: String },
    #[error("path `{path}` escapes the project root")]
    PathEscape { path: String },
    #[error("evaluation threw: {0}")]
    RuntimeError(String),
    #[error("value is not representable as a comptime value: {0}")]
    ConversionError(String),
    #[error("evaluation was cancelled")]
    Cancelled,
}

impl ComptimeError {
    /// Stable diagnostic code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            ComptimeError::NotEvaluable(_) => "TS0202",
            ComptimeError::Overflow { .. } => "TS0203",
            ComptimeError::Timeout { .. } => "TS0204",
            ComptimeError::PermissionDenied { .. } => "TS0205",
            ComptimeError::PathEscape { .. } => "TS0206",
            ComptimeError::RuntimeError(_) => "TS0207",
            ComptimeError::ConversionError(_) => "TS0208",
            ComptimeError::Cancelled => "TS0301",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsAccess {
    Read,
    /// Write implies read.
    Write,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetGrant {
    Denied,
    Allowed,
    Hosts(Vec<String>),
}

impl Default for NetGrant {
    fn default() -> NetGrant {
        NetGrant::Denied
    }
}

/// Capability-based I/O grants for the sandboxed tier. The default grants
/// nothing.
#[derive(Clone, Debug, Default)]
pub struct CapabilityGrant {
    pub fs: Option<FsAccess>,
    pub env_read: bool,
    pub net: NetGrant,
    pub time: bool,
    /// All granted fs access is rooted here; paths resolving outside are
    /// rejected, absolute paths outright.
    pub project_root: Option<PathBuf>,
}

impl CapabilityGrant {
    pub fn none() -> CapabilityGrant {
        CapabilityGrant::default()
    }

    pub fn allows_read(&self) -> bool {
        self.fs.is_some()
    }

    pub fn allows_write(&self) -> bool {
        self.fs == Some(FsAccess::Write)
    }

    /// Resolve a user-supplied path against the project root, rejecting
    /// absolute paths and anything that lexically escapes the root.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, ComptimeError> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(ComptimeError::PathEscape {
                path: path.to_string(),
            });
        }
        let root = self.project_root.as_ref().ok_or_else(|| {
            ComptimeError::PermissionDenied {
                capability: "fs".to_string(),
            }
        })?;
        let mut resolved = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(ComptimeError::PathEscape {
                            path: path.to_string(),
                        });
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ComptimeError::PathEscape {
                        path: path.to_string(),
                    });
                }
            }
        }
        Ok(root.join(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!ComptimeValue::Number(0.0).truthy());
        assert!(ComptimeValue::Number(2.0).truthy());
        assert!(!ComptimeValue::Str(String::new()).truthy());
        assert!(!ComptimeValue::Undefined.truthy());
        assert!(ComptimeValue::Array(vec![]).truthy());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn json_round_trip() {
        let value = ComptimeValue::Object(vec![
            ("a".to_string(), ComptimeValue::Number(1.0)),
            (
                "b".to_string(),
                ComptimeValue::Array(vec![ComptimeValue::Bool(true), ComptimeValue::Null]),
            ),
        ]);
        let json = value.to_json().unwrap();
        assert_eq!(ComptimeValue::from_json(&json), value);
    }

    #[test]
    fn functions_do_not_serialize() {
        let f = ComptimeValue::Function(ComptimeFn {
            params: vec![],
            body: crate::ast::NodeId::from_usize(0),
            env: vec![],
        });
        assert!(matches!(
            f.to_json(),
            Err(ComptimeError::ConversionError(_))
        ));
    }

    #[test]
    fn absolute_paths_are_rejected_outright() {
        let grant = CapabilityGrant {
            fs: Some(FsAccess::Read),
            project_root: Some(PathBuf::from("/tmp/project")),
            ..CapabilityGrant::none()
        };
        assert!(matches!(
            grant.resolve_path("/etc/passwd"),
            Err(ComptimeError::PathEscape { .. })
        ));
    }

    #[test]
    fn traversal_cannot_escape_the_root() {
        let grant = CapabilityGrant {
            fs: Some(FsAccess::Read),
            project_root: Some(PathBuf::from("/tmp/project")),
            ..CapabilityGrant::none()
        };
        assert!(matches!(
            grant.resolve_path("../outside.txt"),
            Err(ComptimeError::PathEscape { .. })
        ));
        assert!(matches!(
            grant.resolve_path("a/../../outside.txt"),
            Err(ComptimeError::PathEscape { .. })
        ));
        assert_eq!(
            grant.resolve_path("a/../b.txt").unwrap(),
            PathBuf::from("/tmp/project/b.txt")
        );
    }
}

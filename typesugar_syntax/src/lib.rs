//! The typesugar expansion engine.
//!
//! Rewrites annotated source programs before type-checking is finalized,
//! producing equivalent programs in the unextended language. The pipeline
//! in [`ext::expand`] drives everything: it scans a file's imports and
//! opt-out directives, builds the binding cache, then walks the AST in
//! post-order dispatching registered macros, with hygiene provided by
//! `typesugar_pos` and diagnostics accumulated through
//! `typesugar_errors`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod ast;
pub mod bindings;
pub mod cache;
pub mod comptime;
pub mod config;
pub mod diagnostic_list;
pub mod ext;
pub mod factory;
pub mod json;
pub mod parse;
pub mod printer;
pub mod scope;

pub use crate::ast::{Arena, NodeId, NodeKind};
pub use crate::bindings::FileBindingCache;
pub use crate::config::ExpansionConfig;
pub use crate::ext::base::{MacroContext, MacroDef, MacroKind, MacroRegistry};
pub use crate::ext::expand::{expand_source, expand_source_cached, ExpansionResult};
pub use crate::parse::Session;

/// Cooperative cancellation. Checked between traversal steps, before
/// each macro invocation, and on every evaluator budget tick.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

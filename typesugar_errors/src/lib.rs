//! Typed, coded, located compile-time diagnostics.
//!
//! Diagnostics are *values*: macro callbacks and pipeline passes build them
//! through a [`Handler`] whose emitter either renders them (terminal) or
//! accumulates them (the expansion pipeline collects per-file diagnostic
//! lists and returns them alongside the transformed output).
//!
//! Severity is a property of a diagnostic's stable code. When a code
//! registry is installed on the handler, the registered level wins over
//! whatever level the reporting macro asked for.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use typesugar_pos::{BytePos, Loc, MultiSpan, Span};

pub mod diagnostic;
pub mod diagnostic_builder;
pub mod emitter;
pub mod registry;

pub use crate::diagnostic::{Diagnostic, Note};
pub use crate::diagnostic_builder::DiagnosticBuilder;
pub use crate::emitter::{ColorConfig, Emitter, EmitterWriter};
pub use crate::registry::Registry;

/// The severity of a diagnostic.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Level {
    /// An internal invariant was violated.
    Bug,
    Fatal,
    Error,
    Warning,
    Note,
    Help,
}

impl Level {
    pub fn to_str(self) -> &'static str {
        match self {
            Level::Bug => "error: internal error",
            Level::Fatal | Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
            Level::Help => "help",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Level::Bug | Level::Fatal | Level::Error)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_str().fmt(f)
    }
}

/// Styling applied to a fragment of a diagnostic message when rendered.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Style {
    NoStyle,
    Highlight,
    HeaderMsg,
    LineNumber,
    UnderlinePrimary,
    UnderlineSecondary,
}

/// A structured suggestion: replace the sub-parts with the given snippets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub substitution_parts: Vec<Substitution>,
    pub msg: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    pub span: Span,
    pub substitutions: Vec<String>,
}

/// Resolves byte positions back to human-readable locations. Implemented
/// by the parse session, which owns the file's line index.
pub trait SourceMapper {
    fn lookup_loc(&self, pos: BytePos) -> Loc;
    fn span_to_snippet(&self, span: Span) -> Option<String>;
    fn file_name(&self) -> String;
}

/// A handler deals with errors; certain errors (fatal, bug) may cause
/// immediate exit, others log errors for later reporting.
pub struct Handler {
    err_count: Cell<usize>,
    emitter: RefCell<Box<dyn Emitter>>,
    registry: Option<Registry>,
    pub can_emit_warnings: bool,
    treat_err_as_bug: bool,
}

impl Handler {
    pub fn with_tty_emitter(
        color_config: ColorConfig,
        can_emit_warnings: bool,
        treat_err_as_bug: bool,
        sm: Option<Rc<dyn SourceMapper>>,
    ) -> Handler {
        let emitter = Box::new(EmitterWriter::stderr(color_config, sm));
        Handler::with_emitter(can_emit_warnings, treat_err_as_bug, emitter)
    }

    pub fn with_emitter(
        can_emit_warnings: bool,
        treat_err_as_bug: bool,
        emitter: Box<dyn Emitter>,
    ) -> Handler {
        Handler {
            err_count: Cell::new(0),
            emitter: RefCell::new(emitter),
            registry: None,
            can_emit_warnings,
            treat_err_as_bug,
        }
    }

    /// Install a stable-code registry. Once installed, the registered
    /// level of a code overrides the level a caller asked for.
    pub fn set_registry(&mut self, registry: Registry) {
        self.registry = Some(registry);
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    pub fn struct_span_err<'a, S: Into<MultiSpan>>(
        &'a self,
        sp: S,
        msg: &str,
    ) -> DiagnosticBuilder<'a> {
        DiagnosticBuilder::new(self, Level::Error, msg).at(sp)
    }

    pub fn struct_span_err_with_code<'a, S: Into<MultiSpan>>(
        &'a self,
        sp: S,
        msg: &str,
        code: &str,
    ) -> DiagnosticBuilder<'a> {
        self.struct_span_err(sp, msg).with_code(code)
    }

    /// A warning builder; suppressed outright when warnings are disabled,
    /// so reporting sites need not consult the setting.
    pub fn struct_span_warn<'a, S: Into<MultiSpan>>(
        &'a self,
        sp: S,
        msg: &str,
    ) -> DiagnosticBuilder<'a> {
        let builder = DiagnosticBuilder::new(self, Level::Warning, msg).at(sp);
        if self.can_emit_warnings {
            builder
        } else {
            builder.suppress()
        }
    }

    pub fn struct_span_note<'a, S: Into<MultiSpan>>(
        &'a self,
        sp: S,
        msg: &str,
    ) -> DiagnosticBuilder<'a> {
        DiagnosticBuilder::new(self, Level::Note, msg).at(sp)
    }

    pub fn struct_span_help<'a, S: Into<MultiSpan>>(
        &'a self,
        sp: S,
        msg: &str,
    ) -> DiagnosticBuilder<'a> {
        DiagnosticBuilder::new(self, Level::Help, msg).at(sp)
    }

    pub fn struct_err<'a>(&'a self, msg: &str) -> DiagnosticBuilder<'a> {
        DiagnosticBuilder::new(self, Level::Error, msg)
    }

    pub fn span_err<S: Into<MultiSpan>>(&self, sp: S, msg: &str) {
        self.struct_span_err(sp, msg).emit();
    }

    pub fn span_err_with_code<S: Into<MultiSpan>>(&self, sp: S, msg: &str, code: &str) {
        self.struct_span_err_with_code(sp, msg, code).emit();
    }

    pub fn span_warn<S: Into<MultiSpan>>(&self, sp: S, msg: &str) {
        self.struct_span_warn(sp, msg).emit();
    }

    pub fn span_bug<S: Into<MultiSpan>>(&self, sp: S, msg: &str) -> ! {
        DiagnosticBuilder::new(self, Level::Bug, msg).at(sp).emit();
        panic!("span_bug: {}", msg);
    }

    pub fn bug(&self, msg: &str) -> ! {
        DiagnosticBuilder::new(self, Level::Bug, msg).emit();
        panic!("bug: {}", msg);
    }

    pub fn bump_err_count(&self) {
        self.err_count.set(self.err_count.get() + 1);
    }

    pub fn err_count(&self) -> usize {
        self.err_count.get()
    }

    pub fn has_errors(&self) -> bool {
        self.err_count.get() > 0
    }

    pub(crate) fn panic_if_treat_err_as_bug(&self) {
        if self.treat_err_as_bug {
            panic!("encountered error with treat_err_as_bug enabled");
        }
    }

    pub(crate) fn emit_db(&self, db: &Diagnostic) {
        self.emitter.borrow_mut().emit(db);
    }

    /// Apply the registry's severity pin, if the diagnostic carries a
    /// registered code.
    pub(crate) fn pinned_level(&self, diagnostic: &Diagnostic) -> Level {
        match (&self.registry, &diagnostic.code) {
            (Some(registry), Some(code)) => {
                registry.level_of(code).unwrap_or(diagnostic.level)
            }
            _ => diagnostic.level,
        }
    }
}

/// An emitter that appends every emitted diagnostic to a shared list.
///
/// The expansion pipeline installs one of these so that diagnostics
/// accumulate as values and travel with the transformed output.
#[derive(Clone, Default)]
pub struct SharedDiagnostics {
    inner: Rc<RefCell<Vec<Diagnostic>>>,
}

impl SharedDiagnostics {
    pub fn new() -> SharedDiagnostics {
        SharedDiagnostics::default()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.inner.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.inner.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

pub struct CollectingEmitter {
    sink: SharedDiagnostics,
}

impl CollectingEmitter {
    pub fn new(sink: SharedDiagnostics) -> CollectingEmitter {
        CollectingEmitter { sink }
    }
}

impl Emitter for CollectingEmitter {
    fn emit(&mut self, db: &Diagnostic) {
        self.sink.inner.borrow_mut().push(db.clone());
    }
}

/// An emitter that drops everything. Useful for probing parses where the
/// caller only cares whether parsing succeeded.
pub struct SilentEmitter;

impl Emitter for SilentEmitter {
    fn emit(&mut self, _db: &Diagnostic) {}
}

/// Forwards to stderr rendering *and* a shared list; the common pipeline
/// configuration.
pub struct TeeEmitter {
    render: Box<dyn Emitter>,
    collect: CollectingEmitter,
}

impl TeeEmitter {
    pub fn new(render: Box<dyn Emitter>, sink: SharedDiagnostics) -> TeeEmitter {
        TeeEmitter {
            render,
            collect: CollectingEmitter::new(sink),
        }
    }
}

impl Emitter for TeeEmitter {
    fn emit(&mut self, db: &Diagnostic) {
        self.render.emit(db);
        self.collect.emit(db);
    }
}

/// An emitter writing plain (uncolored) renderings into an arbitrary
/// `Write`, mostly for tests.
pub struct PlainWriterEmitter<W: Write> {
    dst: W,
}

impl<W: Write> PlainWriterEmitter<W> {
    pub fn new(dst: W) -> PlainWriterEmitter<W> {
        PlainWriterEmitter { dst }
    }
}

impl<W: Write> Emitter for PlainWriterEmitter<W> {
    fn emit(&mut self, db: &Diagnostic) {
        let code = db
            .code
            .as_ref()
            .map(|c| format!("[{}]", c))
            .unwrap_or_default();
        let _ = writeln!(self.dst, "{}{}: {}", db.level, code, db.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_counts_errors_not_warnings() {
        let sink = SharedDiagnostics::new();
        let handler =
            Handler::with_emitter(true, false, Box::new(CollectingEmitter::new(sink.clone())));
        handler.span_err(Span::new(BytePos(0), BytePos(1)), "boom");
        handler.span_warn(Span::new(BytePos(0), BytePos(1)), "meh");
        assert_eq!(handler.err_count(), 1);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn disabled_warnings_never_reach_the_emitter() {
        let sink = SharedDiagnostics::new();
        let handler =
            Handler::with_emitter(false, false, Box::new(CollectingEmitter::new(sink.clone())));
        handler.span_warn(Span::new(BytePos(0), BytePos(1)), "meh");
        assert!(sink.is_empty());
    }

    #[test]
    fn registry_pins_severity_per_code() {
        let sink = SharedDiagnostics::new();
        let mut handler =
            Handler::with_emitter(true, false, Box::new(CollectingEmitter::new(sink.clone())));
        handler.set_registry(Registry::new(&[(
            "TS0401",
            Level::Warning,
            "duplicate macro registration",
        )]));
        // Reported as an error, demoted to the registered warning level.
        handler
            .struct_span_err_with_code(Span::new(BytePos(0), BytePos(1)), "dup", "TS0401")
            .emit();
        let emitted = sink.snapshot();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].level, Level::Warning);
        assert_eq!(handler.err_count(), 0);
    }
}

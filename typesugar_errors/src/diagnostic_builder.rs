//! Fluent diagnostic construction.
//!
//! A builder borrows the handler it will report through and is inert
//! until [`emit`](DiagnosticBuilder::emit) consumes it. Emission pins the
//! severity to the registered level of the stable code, bumps the
//! handler's error count for error-class results, and hands the finished
//! value to the emitter. [`cancel`](DiagnosticBuilder::cancel) discards
//! the diagnostic instead, and [`into_diagnostic`] detaches it for
//! callers that deliver it themselves (the expansion cache does).
//!
//! Builders are `#[must_use]`: a diagnostic that is built and then
//! silently dropped is a bug the compiler points at.
//!
//! [`into_diagnostic`]: DiagnosticBuilder::into_diagnostic

use std::fmt;

use typesugar_pos::{MultiSpan, Span};

use crate::{Diagnostic, Handler, Level};

#[must_use = "a diagnostic reports nothing until `emit` is called"]
pub struct DiagnosticBuilder<'a> {
    handler: &'a Handler,
    diagnostic: Diagnostic,
    suppressed: bool,
}

impl<'a> DiagnosticBuilder<'a> {
    pub(crate) fn new(handler: &'a Handler, level: Level, message: &str) -> DiagnosticBuilder<'a> {
        DiagnosticBuilder {
            handler,
            diagnostic: Diagnostic::new(level, message),
            suppressed: false,
        }
    }

    /// Mark the builder as suppressed: `emit` becomes a no-op. The
    /// handler silences warnings this way when they are disabled, so
    /// reporting sites never need to know about the setting.
    pub(crate) fn suppress(mut self) -> DiagnosticBuilder<'a> {
        self.suppressed = true;
        self
    }

    /// Set the primary location.
    pub fn at<S: Into<MultiSpan>>(mut self, span: S) -> DiagnosticBuilder<'a> {
        self.diagnostic.primary = span.into();
        self
    }

    /// Attach the stable code. The code, not the caller, has the final
    /// say on severity once the handler's registry is consulted.
    pub fn with_code(mut self, code: &str) -> DiagnosticBuilder<'a> {
        self.diagnostic.code = Some(code.to_string());
        self
    }

    /// Add a labeled secondary span to the rendered snippet.
    pub fn label(mut self, span: Span, text: impl Into<String>) -> DiagnosticBuilder<'a> {
        self.diagnostic.primary.push_span_label(span, text.into());
        self
    }

    pub fn with_note(mut self, message: &str) -> DiagnosticBuilder<'a> {
        self.diagnostic
            .attach_note(Level::Note, message, MultiSpan::new());
        self
    }

    pub fn note_at(mut self, span: Span, message: &str) -> DiagnosticBuilder<'a> {
        self.diagnostic
            .attach_note(Level::Note, message, MultiSpan::from_span(span));
        self
    }

    pub fn with_help(mut self, message: &str) -> DiagnosticBuilder<'a> {
        self.diagnostic
            .attach_note(Level::Help, message, MultiSpan::new());
        self
    }

    /// Attach a suggested replacement for `span`.
    pub fn with_suggestion(
        mut self,
        span: Span,
        message: &str,
        replacement: &str,
    ) -> DiagnosticBuilder<'a> {
        self.diagnostic
            .attach_suggestion(span, message, replacement.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.diagnostic.is_error()
    }

    pub fn message(&self) -> &str {
        &self.diagnostic.message
    }

    /// Detach the finished value without reporting it.
    pub fn into_diagnostic(self) -> Diagnostic {
        self.diagnostic
    }

    /// Discard the diagnostic without reporting it.
    pub fn cancel(self) {}

    /// Report the diagnostic through the handler.
    pub fn emit(self) {
        if self.suppressed {
            return;
        }
        let mut diagnostic = self.diagnostic;
        diagnostic.level = self.handler.pinned_level(&diagnostic);
        if diagnostic.level.is_error() {
            self.handler.bump_err_count();
        }
        self.handler.emit_db(&diagnostic);
        if diagnostic.level == Level::Error {
            self.handler.panic_if_treat_err_as_bug();
        }
    }
}

impl fmt::Debug for DiagnosticBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.diagnostic.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectingEmitter, SharedDiagnostics};
    use typesugar_pos::BytePos;

    fn collecting_handler() -> (Handler, SharedDiagnostics) {
        let sink = SharedDiagnostics::new();
        let handler = Handler::with_emitter(
            true,
            false,
            Box::new(CollectingEmitter::new(sink.clone())),
        );
        (handler, sink)
    }

    #[test]
    fn emit_carries_spans_labels_and_notes() {
        let (handler, sink) = collecting_handler();
        handler
            .struct_span_err(Span::new(BytePos(0), BytePos(4)), "oops")
            .label(Span::new(BytePos(6), BytePos(8)), "because of this")
            .with_note("while expanding `swap`")
            .emit();
        let emitted = sink.snapshot();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].message, "oops");
        assert_eq!(emitted[0].notes.len(), 1);
        assert_eq!(emitted[0].primary.span_labels().len(), 2);
        assert_eq!(handler.err_count(), 1);
    }

    #[test]
    fn cancelled_builders_report_nothing() {
        let (handler, sink) = collecting_handler();
        handler
            .struct_span_err(Span::new(BytePos(0), BytePos(1)), "never mind")
            .cancel();
        assert!(sink.is_empty());
        assert_eq!(handler.err_count(), 0);
    }

    #[test]
    fn into_diagnostic_detaches_from_the_handler() {
        let (handler, sink) = collecting_handler();
        let diagnostic = handler
            .struct_err("kept aside")
            .with_code("TS0101")
            .into_diagnostic();
        assert_eq!(diagnostic.code.as_deref(), Some("TS0101"));
        assert!(sink.is_empty());
        assert_eq!(handler.err_count(), 0);
    }

    #[test]
    fn suggestions_round_trip() {
        let (handler, sink) = collecting_handler();
        handler
            .struct_span_err(Span::new(BytePos(0), BytePos(3)), "unknown feature")
            .with_suggestion(
                Span::new(BytePos(0), BytePos(3)),
                "did you mean `derive`",
                "derive",
            )
            .emit();
        let emitted = sink.snapshot();
        assert_eq!(emitted[0].suggestions.len(), 1);
        assert_eq!(
            emitted[0].suggestions[0].substitution_parts[0].substitutions,
            vec!["derive".to_string()]
        );
    }
}

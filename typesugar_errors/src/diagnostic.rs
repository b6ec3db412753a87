//! Diagnostics as values.
//!
//! Nothing in the engine throws to report a user-facing problem: macro
//! failures, budget stops and comptime errors all become [`Diagnostic`]
//! values that accumulate on the session and travel with the transformed
//! output. A diagnostic carries its severity, the stable code tooling
//! filters on, one primary location with optional labeled secondaries,
//! and any attached notes and suggested edits.
//!
//! Construction goes through
//! [`DiagnosticBuilder`](crate::DiagnosticBuilder); the value itself stays
//! a dumb, serializable record so it can live in the expansion cache and
//! cross the JSON boundary unchanged.

use serde::{Deserialize, Serialize};

use typesugar_pos::{MultiSpan, Span};

use crate::{CodeSuggestion, Level, Substitution};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    /// Stable code such as `TS0104`. When the handler carries a code
    /// registry, the severity registered for this code wins over `level`.
    pub code: Option<String>,
    pub message: String,
    /// The locus of the problem, plus labeled secondary spans.
    pub primary: MultiSpan,
    /// Notes and helps attached under the main message, in attachment
    /// order.
    pub notes: Vec<Note>,
    /// Suggested edits, renderable by tooling.
    pub suggestions: Vec<CodeSuggestion>,
}

/// A note or help attached to a diagnostic. Synthetic macro output has no
/// span of its own, so a note's span may be empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub level: Level,
    pub message: String,
    pub span: MultiSpan,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            level,
            code: None,
            message: message.into(),
            primary: MultiSpan::new(),
            notes: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level.is_error()
    }

    /// The first primary span, when the diagnostic is located at all.
    pub fn primary_span(&self) -> Option<Span> {
        self.primary.primary_span()
    }

    pub(crate) fn attach_note(&mut self, level: Level, message: &str, span: MultiSpan) {
        self.notes.push(Note {
            level,
            message: message.to_string(),
            span,
        });
    }

    pub(crate) fn attach_suggestion(&mut self, span: Span, message: &str, replacement: String) {
        self.suggestions.push(CodeSuggestion {
            substitution_parts: vec![Substitution {
                span,
                substitutions: vec![replacement],
            }],
            msg: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesugar_pos::BytePos;

    #[test]
    fn starts_unlocated_and_codeless() {
        let diagnostic = Diagnostic::new(Level::Warning, "shadowed binding");
        assert_eq!(diagnostic.message, "shadowed binding");
        assert!(diagnostic.code.is_none());
        assert!(diagnostic.primary_span().is_none());
        assert!(!diagnostic.is_error());
    }

    #[test]
    fn survives_serialization() {
        let mut diagnostic = Diagnostic::new(Level::Error, "static assertion failed");
        diagnostic.code = Some("TS0201".to_string());
        diagnostic.primary = Span::new(BytePos(3), BytePos(9)).into();
        diagnostic.attach_note(Level::Help, "the condition folded to false", MultiSpan::new());

        let json = serde_json::to_string(&diagnostic).unwrap();
        let restored: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, diagnostic);
    }
}

//! Source positions and related helper functions for the typesugar engine.
//!
//! Positions are *absolute* byte offsets from the beginning of a source
//! file. Every AST node the expansion pipeline touches carries a [`Span`];
//! nodes minted by a macro carry [`DUMMY_SP`] so that downstream passes can
//! tell user-written syntax from synthetic syntax.

#![deny(warnings)]

use std::cmp;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

pub mod hygiene;
pub use crate::hygiene::{HygieneContext, HygieneScope};

pub type FileName = String;

/// A byte offset into a source file.
///
/// Kept small because ASTs contain many of them.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize,
)]
pub struct BytePos(pub u32);

/// A character offset. Because of multibyte utf8 characters, a byte offset
/// is not equivalent to a character offset. The line index tracks both.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct CharPos(pub usize);

pub trait Pos {
    fn from_usize(n: usize) -> Self;
    fn to_usize(&self) -> usize;
}

impl Pos for BytePos {
    fn from_usize(n: usize) -> BytePos {
        BytePos(n as u32)
    }
    fn to_usize(&self) -> usize {
        self.0 as usize
    }
}

impl Add for BytePos {
    type Output = BytePos;

    fn add(self, rhs: BytePos) -> BytePos {
        BytePos(self.0 + rhs.0)
    }
}

impl Sub for BytePos {
    type Output = BytePos;

    fn sub(self, rhs: BytePos) -> BytePos {
        BytePos(self.0 - rhs.0)
    }
}

impl Pos for CharPos {
    fn from_usize(n: usize) -> CharPos {
        CharPos(n)
    }
    fn to_usize(&self) -> usize {
        self.0
    }
}

/// Spans represent a region of code, used for diagnostic reporting and for
/// the opt-out scanner. Positions in spans are absolute positions from the
/// beginning of the file.
///
/// Synthetic nodes (anything a macro produced) carry [`DUMMY_SP`]; such
/// spans never participate in opt-out decisions or source mapping.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Span {
    pub lo: BytePos,
    pub hi: BytePos,
}

/// The span of syntax that has no source location, i.e. macro output.
pub const DUMMY_SP: Span = Span {
    lo: BytePos(0),
    hi: BytePos(0),
};

impl Span {
    pub fn new(lo: BytePos, hi: BytePos) -> Span {
        Span { lo, hi }
    }

    /// True for spans of macro-generated syntax.
    pub fn is_dummy(self) -> bool {
        self.source_equal(&DUMMY_SP)
    }

    /// Returns a new span representing just the end-point of this span.
    pub fn end_point(self) -> Span {
        let lo = cmp::max(self.hi.0.saturating_sub(1), self.lo.0);
        Span {
            lo: BytePos(lo),
            ..self
        }
    }

    /// Returns a new span representing the next character after the
    /// end-point of this span.
    pub fn next_point(self) -> Span {
        let lo = cmp::max(self.hi.0, self.lo.0 + 1);
        Span {
            lo: BytePos(lo),
            hi: BytePos(lo),
        }
    }

    /// Returns `self` if `self` is not the dummy span, and `other` otherwise.
    pub fn substitute_dummy(self, other: Span) -> Span {
        if self.is_dummy() {
            other
        } else {
            self
        }
    }

    pub fn contains(self, other: Span) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    /// Return true if the spans are equal with regards to the source text.
    ///
    /// Use this instead of `==` when either span could be generated code.
    pub fn source_equal(&self, other: &Span) -> bool {
        self.lo == other.lo && self.hi == other.hi
    }

    /// Return a span covering `self` and `end`, in that source order.
    pub fn to(self, end: Span) -> Span {
        Span {
            lo: cmp::min(self.lo, end.lo),
            hi: cmp::max(self.hi, end.hi),
        }
    }

    /// Return a span between the end of `self` and the beginning of `end`.
    pub fn between(self, end: Span) -> Span {
        Span {
            lo: self.hi,
            hi: end.lo,
        }
    }

    pub fn len(self) -> usize {
        (self.hi.0 - self.lo.0) as usize
    }

    pub fn is_empty(self) -> bool {
        self.lo == self.hi
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}..{})", self.lo.0, self.hi.0)
    }
}

impl From<Span> for MultiSpan {
    fn from(span: Span) -> MultiSpan {
        MultiSpan::from_span(span)
    }
}

/// A collection of spans. Spans have two orthogonal attributes:
///
/// - they can be *primary spans*. In this case they are the locus of
///   the error, and would be rendered with `^^^`.
/// - they can have a *label*. In this case, the label is written next
///   to the mark in the snippet when we render.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSpan {
    primary_spans: Vec<Span>,
    span_labels: Vec<(Span, String)>,
}

#[derive(Clone, Debug)]
pub struct SpanLabel {
    /// The span we are going to include in the final snippet.
    pub span: Span,
    /// Is this a primary span? This is the "locus" of the message.
    pub is_primary: bool,
    /// What label should we attach to this span (if any)?
    pub label: Option<String>,
}

impl MultiSpan {
    pub fn new() -> MultiSpan {
        MultiSpan {
            primary_spans: vec![],
            span_labels: vec![],
        }
    }

    pub fn from_span(primary_span: Span) -> MultiSpan {
        MultiSpan {
            primary_spans: vec![primary_span],
            span_labels: vec![],
        }
    }

    pub fn from_spans(vec: Vec<Span>) -> MultiSpan {
        MultiSpan {
            primary_spans: vec,
            span_labels: vec![],
        }
    }

    pub fn push_span_label(&mut self, span: Span, label: String) {
        self.span_labels.push((span, label));
    }

    /// Selects the first primary span (if any).
    pub fn primary_span(&self) -> Option<Span> {
        self.primary_spans.first().cloned()
    }

    /// Returns all primary spans.
    pub fn primary_spans(&self) -> &[Span] {
        &self.primary_spans
    }

    /// Returns the strings to highlight. We always ensure that there
    /// is an entry for each of the primary spans -- for each primary
    /// span P, if there is at least one label with span P, we return
    /// those labels (marked as primary). But otherwise we return
    /// `SpanLabel` instances with empty labels.
    pub fn span_labels(&self) -> Vec<SpanLabel> {
        let is_primary = |span| self.primary_spans.contains(&span);
        let mut span_labels = vec![];

        for &(span, ref label) in &self.span_labels {
            span_labels.push(SpanLabel {
                span,
                is_primary: is_primary(span),
                label: Some(label.clone()),
            });
        }

        for &span in &self.primary_spans {
            if !span_labels.iter().any(|sl| sl.span == span) {
                span_labels.push(SpanLabel {
                    span,
                    is_primary: true,
                    label: None,
                });
            }
        }

        span_labels
    }
}

/// A source code location used for error reporting: 1-based line, 0-based
/// column in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    pub line: usize,
    pub col: CharPos,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_algebra() {
        let a = Span::new(BytePos(4), BytePos(10));
        let b = Span::new(BytePos(12), BytePos(14));
        assert_eq!(a.to(b), Span::new(BytePos(4), BytePos(14)));
        assert_eq!(a.between(b), Span::new(BytePos(10), BytePos(12)));
        assert!(a.to(b).contains(a));
        assert!(!a.contains(b));
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn dummy_span_is_sticky() {
        assert!(DUMMY_SP.is_dummy());
        let real = Span::new(BytePos(1), BytePos(2));
        assert_eq!(DUMMY_SP.substitute_dummy(real), real);
        assert_eq!(real.substitute_dummy(DUMMY_SP), real);
    }

    #[test]
    fn multispan_labels_cover_primaries() {
        let primary = Span::new(BytePos(0), BytePos(5));
        let mut sp = MultiSpan::from_span(primary);
        sp.push_span_label(Span::new(BytePos(7), BytePos(9)), "secondary".to_string());
        let labels = sp.span_labels();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().any(|l| l.is_primary && l.span == primary));
        assert!(labels.iter().any(|l| !l.is_primary));
    }
}

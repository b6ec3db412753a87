//! A JSON emitter for diagnostics.
//!
//! This works by converting diagnostics to a simplified structural format
//! (see the structs at the end of this file) and then serialising them.
//! The format should be considered unstable; the structs exist for
//! serialisation only.

use std::io::{self, Write};
use std::rc::Rc;

use serde::Serialize;

use typesugar_errors::{self as errors, Emitter, SourceMapper};

pub struct JsonEmitter {
    dst: Box<dyn Write + Send>,
    sm: Option<Rc<dyn SourceMapper>>,
    pretty: bool,
}

impl JsonEmitter {
    pub fn stderr(sm: Option<Rc<dyn SourceMapper>>) -> JsonEmitter {
        JsonEmitter {
            dst: Box::new(io::stderr()),
            sm,
            pretty: false,
        }
    }

    pub fn new(dst: Box<dyn Write + Send>, sm: Option<Rc<dyn SourceMapper>>) -> JsonEmitter {
        JsonEmitter {
            dst,
            sm,
            pretty: false,
        }
    }

    pub fn pretty(mut self) -> JsonEmitter {
        self.pretty = true;
        self
    }
}

impl Emitter for JsonEmitter {
    fn emit(&mut self, db: &errors::Diagnostic) {
        let data = Diagnostic::from_diagnostic(db, self.sm.as_deref());
        let result = if self.pretty {
            serde_json::to_writer_pretty(&mut self.dst, &data)
        } else {
            serde_json::to_writer(&mut self.dst, &data)
        };
        if let Err(e) = result {
            panic!("failed to print diagnostics: {:?}", e);
        }
        let _ = self.dst.write_all(b"\n");
    }
}

/// Serialize an already-collected diagnostic list; the batch shape the
/// expansion cache persists and build tooling consumes.
pub fn diagnostics_to_json(
    diagnostics: &[errors::Diagnostic],
    sm: Option<&dyn SourceMapper>,
) -> serde_json::Value {
    let rendered: Vec<Diagnostic> = diagnostics
        .iter()
        .map(|db| Diagnostic::from_diagnostic(db, sm))
        .collect();
    serde_json::to_value(rendered).expect("diagnostic serialization cannot fail")
}

// The following data types are provided just for serialisation.

#[derive(Serialize)]
struct Diagnostic {
    /// The primary message.
    message: String,
    code: Option<String>,
    /// "error", "warning", "note", "help".
    level: String,
    spans: Vec<DiagnosticSpan>,
    /// Associated notes and helps.
    children: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct DiagnosticSpan {
    byte_start: u32,
    byte_end: u32,
    /// 1-based, when a source mapper is available.
    line_start: Option<usize>,
    column_start: Option<usize>,
    file_name: Option<String>,
    is_primary: bool,
    label: Option<String>,
}

impl Diagnostic {
    fn from_diagnostic(db: &errors::Diagnostic, sm: Option<&dyn SourceMapper>) -> Diagnostic {
        Diagnostic {
            message: db.message.clone(),
            code: db.code.clone(),
            level: db.level.to_str().to_string(),
            spans: DiagnosticSpan::from_multispan(&db.primary, sm),
            children: db
                .notes
                .iter()
                .map(|note| Diagnostic {
                    message: note.message.clone(),
                    code: None,
                    level: note.level.to_str().to_string(),
                    spans: DiagnosticSpan::from_multispan(&note.span, sm),
                    children: vec![],
                })
                .collect(),
        }
    }
}

impl DiagnosticSpan {
    fn from_multispan(
        span: &typesugar_pos::MultiSpan,
        sm: Option<&dyn SourceMapper>,
    ) -> Vec<DiagnosticSpan> {
        span.span_labels()
            .into_iter()
            .map(|label| {
                let loc = sm.map(|sm| sm.lookup_loc(label.span.lo));
                DiagnosticSpan {
                    byte_start: label.span.lo.0,
                    byte_end: label.span.hi.0,
                    line_start: loc.as_ref().map(|loc| loc.line),
                    column_start: loc.as_ref().map(|loc| loc.col.0 + 1),
                    file_name: sm.map(|sm| sm.file_name()),
                    is_primary: label.is_primary,
                    label: label.label,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesugar_errors::{Level, Note};
    use typesugar_pos::{BytePos, MultiSpan, Span};

    #[test]
    fn renders_code_level_and_location() {
        let mut db = errors::Diagnostic::new(Level::Error, "static assertion failed: math");
        db.code = Some("TS0201".to_string());
        db.primary = Span::new(BytePos(4), BytePos(9)).into();
        db.notes.push(Note {
            level: Level::Note,
            message: "while expanding static_assert".to_string(),
            span: MultiSpan::new(),
        });

        let json = diagnostics_to_json(&[db], None);
        let rendered = json.as_array().unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0]["code"], "TS0201");
        assert_eq!(rendered[0]["level"], "error");
        assert_eq!(rendered[0]["spans"][0]["byte_start"], 4);
        assert_eq!(rendered[0]["children"][0]["level"], "note");
    }
}

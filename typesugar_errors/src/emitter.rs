//! Terminal rendering of diagnostics.

use std::io;
use std::io::prelude::*;
use std::rc::Rc;

use typesugar_pos::SpanLabel;

use crate::{Diagnostic, Level, Note, SourceMapper, Style};

/// Emitter trait for emitting errors.
pub trait Emitter {
    /// Emit a structured diagnostic.
    fn emit(&mut self, db: &Diagnostic);
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ColorConfig {
    Auto,
    Always,
    Never,
}

impl ColorConfig {
    fn use_color(self) -> bool {
        match self {
            ColorConfig::Always => true,
            ColorConfig::Never => false,
            ColorConfig::Auto => stderr_isatty(),
        }
    }
}

fn stderr_isatty() -> bool {
    unsafe { libc::isatty(libc::STDERR_FILENO) != 0 }
}

enum Destination {
    Terminal(Box<term::StderrTerminal>),
    Raw(Box<dyn Write + Send>),
}

impl Destination {
    fn from_stderr(color: ColorConfig) -> Destination {
        if color.use_color() {
            match term::stderr() {
                Some(t) => return Destination::Terminal(t),
                None => {}
            }
        }
        Destination::Raw(Box::new(io::stderr()))
    }

    fn apply_style(&mut self, level: Level, style: Style) -> io::Result<()> {
        if let Destination::Terminal(ref mut t) = *self {
            let color = match style {
                Style::HeaderMsg => Some(term::color::BRIGHT_WHITE),
                Style::LineNumber => Some(term::color::BRIGHT_BLUE),
                Style::UnderlinePrimary | Style::Highlight => Some(level_color(level)),
                Style::UnderlineSecondary => Some(term::color::BRIGHT_BLUE),
                Style::NoStyle => None,
            };
            if let Some(color) = color {
                let _ = t.fg(color);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        if let Destination::Terminal(ref mut t) = *self {
            let _ = t.reset();
        }
    }
}

impl Write for Destination {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match *self {
            Destination::Terminal(ref mut t) => t.write(bytes),
            Destination::Raw(ref mut w) => w.write(bytes),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Destination::Terminal(ref mut t) => t.flush(),
            Destination::Raw(ref mut w) => w.flush(),
        }
    }
}

fn level_color(level: Level) -> term::color::Color {
    match level {
        Level::Bug | Level::Fatal | Level::Error => term::color::BRIGHT_RED,
        Level::Warning => term::color::BRIGHT_YELLOW,
        Level::Note => term::color::BRIGHT_GREEN,
        Level::Help => term::color::BRIGHT_CYAN,
    }
}

/// Renders diagnostics in the familiar
/// `level[code]: message --> file:line:col` shape with an underlined
/// source snippet when a source mapper is available.
pub struct EmitterWriter {
    dst: Destination,
    sm: Option<Rc<dyn SourceMapper>>,
}

impl EmitterWriter {
    pub fn stderr(color_config: ColorConfig, sm: Option<Rc<dyn SourceMapper>>) -> EmitterWriter {
        EmitterWriter {
            dst: Destination::from_stderr(color_config),
            sm,
        }
    }

    pub fn new(dst: Box<dyn Write + Send>, sm: Option<Rc<dyn SourceMapper>>) -> EmitterWriter {
        EmitterWriter {
            dst: Destination::Raw(dst),
            sm,
        }
    }

    fn emit_header(&mut self, level: Level, code: Option<&str>, message: &str) -> io::Result<()> {
        self.dst.apply_style(level, Style::Highlight)?;
        write!(self.dst, "{}", level)?;
        if let Some(code) = code {
            write!(self.dst, "[{}]", code)?;
        }
        self.dst.reset();
        self.dst.apply_style(level, Style::HeaderMsg)?;
        writeln!(self.dst, ": {}", message)?;
        self.dst.reset();
        Ok(())
    }

    fn emit_labels(&mut self, level: Level, labels: &[SpanLabel]) -> io::Result<()> {
        let sm = match self.sm {
            Some(ref sm) => sm.clone(),
            None => return Ok(()),
        };
        for label in labels {
            if label.span.is_dummy() {
                continue;
            }
            let loc = sm.lookup_loc(label.span.lo);
            self.dst.apply_style(level, Style::LineNumber)?;
            write!(self.dst, "  --> ")?;
            self.dst.reset();
            writeln!(
                self.dst,
                "{}:{}:{}",
                sm.file_name(),
                loc.line,
                loc.col.0 + 1
            )?;
            if let Some(snippet) = sm.span_to_snippet(label.span) {
                let first_line = snippet.lines().next().unwrap_or("");
                writeln!(self.dst, "   | {}", first_line)?;
                self.dst.apply_style(
                    level,
                    if label.is_primary {
                        Style::UnderlinePrimary
                    } else {
                        Style::UnderlineSecondary
                    },
                )?;
                let marker = if label.is_primary { "^" } else { "-" };
                write!(
                    self.dst,
                    "   | {}",
                    marker.repeat(first_line.chars().count().max(1))
                )?;
                self.dst.reset();
                match label.label {
                    Some(ref text) => writeln!(self.dst, " {}", text)?,
                    None => writeln!(self.dst)?,
                }
            }
        }
        Ok(())
    }

    fn emit_note(&mut self, note: &Note) -> io::Result<()> {
        self.dst.apply_style(note.level, Style::Highlight)?;
        write!(self.dst, "  = {}", note.level)?;
        self.dst.reset();
        writeln!(self.dst, ": {}", note.message)?;
        self.emit_labels(note.level, &note.span.span_labels())
    }
}

impl Emitter for EmitterWriter {
    fn emit(&mut self, db: &Diagnostic) {
        let result = (|| -> io::Result<()> {
            self.emit_header(db.level, db.code.as_deref(), &db.message)?;
            self.emit_labels(db.level, &db.primary.span_labels())?;
            for note in &db.notes {
                self.emit_note(note)?;
            }
            for suggestion in &db.suggestions {
                self.dst.apply_style(Level::Help, Style::Highlight)?;
                write!(self.dst, "  = help")?;
                self.dst.reset();
                writeln!(self.dst, ": {}", suggestion.msg)?;
            }
            writeln!(self.dst)?;
            self.dst.flush()
        })();
        if let Err(e) = result {
            panic!("failed to emit diagnostic: {}", e);
        }
    }
}

//! The main parser interface.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use typesugar_errors::{
    CollectingEmitter, ColorConfig, DiagnosticBuilder, EmitterWriter, Handler, SharedDiagnostics,
    SourceMapper, TeeEmitter,
};
use typesugar_pos::{BytePos, CharPos, FileName, Loc, Pos, Span};

use crate::ast::{Arena, NodeId};

pub mod lexer;
pub mod parser;

pub use self::lexer::Comment;

pub type PResult<'a, T> = Result<T, DiagnosticBuilder<'a>>;

/// One source file: name, text, and a line index for diagnostics and the
/// inline opt-out scanner.
pub struct SourceFile {
    pub name: FileName,
    pub src: Rc<str>,
    /// Byte offset of each line start, ascending.
    lines: Vec<u32>,
}

impl SourceFile {
    pub fn new(name: FileName, src: &str) -> SourceFile {
        let mut lines = vec![0u32];
        for (index, byte) in src.bytes().enumerate() {
            if byte == b'\n' {
                lines.push(index as u32 + 1);
            }
        }
        SourceFile {
            name,
            src: Rc::from(src),
            lines,
        }
    }

    /// 1-based line containing `pos`.
    pub fn line_of(&self, pos: BytePos) -> usize {
        match self.lines.binary_search(&pos.0) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    pub fn line_bounds(&self, line: usize) -> (u32, u32) {
        let lo = self.lines[line - 1];
        let hi = self
            .lines
            .get(line)
            .copied()
            .unwrap_or(self.src.len() as u32);
        (lo, hi)
    }
}

impl SourceMapper for SourceFile {
    fn lookup_loc(&self, pos: BytePos) -> Loc {
        let line = self.line_of(pos);
        let (lo, _) = self.line_bounds(line);
        let col = self.src[lo as usize..pos.to_usize()].chars().count();
        Loc {
            line,
            col: CharPos(col),
        }
    }

    fn span_to_snippet(&self, span: Span) -> Option<String> {
        self.src
            .get(span.lo.to_usize()..span.hi.to_usize())
            .map(|s| s.to_string())
    }

    fn file_name(&self) -> String {
        self.name.clone()
    }
}

/// Info about a parsing and expansion session over one file.
///
/// Owns the diagnostic handler (collecting into `diagnostics`) and the
/// file's comment list, which the lexer fills in and the opt-out scanner
/// consumes.
pub struct Session {
    pub span_diagnostic: Handler,
    pub diagnostics: SharedDiagnostics,
    pub file: Rc<SourceFile>,
    comments: RefCell<Vec<Comment>>,
}

impl Session {
    /// A session whose diagnostics only accumulate; the normal pipeline
    /// and test configuration.
    pub fn new(name: &str, src: &str) -> Session {
        let diagnostics = SharedDiagnostics::new();
        let handler = Handler::with_emitter(
            true,
            false,
            Box::new(CollectingEmitter::new(diagnostics.clone())),
        );
        Session::with_handler(name, src, handler, diagnostics)
    }

    /// A session that renders to stderr as well as accumulating.
    pub fn with_tty(name: &str, src: &str) -> Session {
        let diagnostics = SharedDiagnostics::new();
        let file = Rc::new(SourceFile::new(name.to_string(), src));
        let render = Box::new(EmitterWriter::stderr(
            ColorConfig::Auto,
            Some(file.clone() as Rc<dyn SourceMapper>),
        ));
        let mut handler = Handler::with_emitter(
            true,
            false,
            Box::new(TeeEmitter::new(render, diagnostics.clone())),
        );
        handler.set_registry(crate::diagnostic_list::registry());
        Session {
            span_diagnostic: handler,
            diagnostics,
            file,
            comments: RefCell::new(Vec::new()),
        }
    }

    pub fn with_handler(
        name: &str,
        src: &str,
        mut handler: Handler,
        diagnostics: SharedDiagnostics,
    ) -> Session {
        if handler.registry().is_none() {
            handler.set_registry(crate::diagnostic_list::registry());
        }
        Session {
            span_diagnostic: handler,
            diagnostics,
            file: Rc::new(SourceFile::new(name.to_string(), src)),
            comments: RefCell::new(Vec::new()),
        }
    }

    pub fn set_comments(&self, comments: Vec<Comment>) {
        *self.comments.borrow_mut() = comments;
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.borrow().clone()
    }

    /// Comments whose span starts on `line`.
    pub fn comments_on_line(&self, line: usize) -> Vec<Comment> {
        self.comments
            .borrow()
            .iter()
            .filter(|c| self.file.line_of(c.span.lo) == line)
            .cloned()
            .collect()
    }
}

/// Parse a whole file into `arena`, returning the `Module` node.
pub fn parse_module<'a>(sess: &'a Session, arena: &mut Arena) -> PResult<'a, NodeId> {
    debug!("parsing module {}", sess.file.name);
    let (tokens, comments) = lexer::Lexer::new(&sess.file.src, 0)
        .tokenize()
        .map_err(|e| sess.span_diagnostic.struct_span_err(e.span, &e.message))?;
    sess.set_comments(comments);
    parser::Parser::new(sess, arena, tokens).parse_module()
}

/// Parse `text` as a sequence of statements spliced into an existing
/// arena. The results are marked synthetic: snippet offsets mean nothing
/// in the enclosing file.
pub fn parse_snippet_stmts<'a>(
    sess: &'a Session,
    arena: &mut Arena,
    text: &str,
) -> PResult<'a, Vec<NodeId>> {
    let (tokens, _) = lexer::Lexer::new(text, 0)
        .tokenize()
        .map_err(|e| {
            sess.span_diagnostic
                .struct_err(&format!("in generated snippet: {}", e.message))
        })?;
    let stmts = parser::Parser::new(sess, arena, tokens).parse_stmt_list_snippet()?;
    for &stmt in &stmts {
        arena.make_synthetic(stmt);
    }
    Ok(stmts)
}

/// Parse `text` as a single expression spliced into an existing arena,
/// marked synthetic.
pub fn parse_snippet_expr<'a>(
    sess: &'a Session,
    arena: &mut Arena,
    text: &str,
) -> PResult<'a, NodeId> {
    let (tokens, _) = lexer::Lexer::new(text, 0)
        .tokenize()
        .map_err(|e| {
            sess.span_diagnostic
                .struct_err(&format!("in generated snippet: {}", e.message))
        })?;
    let expr = parser::Parser::new(sess, arena, tokens).parse_expr_snippet()?;
    arena.make_synthetic(expr);
    Ok(expr)
}

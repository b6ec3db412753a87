//! Declarative macros: pattern/template pairs instead of callbacks.
//!
//! Patterns are compiled once at registration into a flat element
//! program; matching an invocation is then a greedy left-to-right walk
//! over the argument list. Fragment variables (`$x:expr`, `$x:ident`,
//! `$x:stmt`, `$x:type`, `$x:literal`) bind sub-trees, `$(...)*` and
//! `$(...),*` bind lists, and literal tokens must match verbatim.
//!
//! Arms are tried in declaration order; the first successful bind wins,
//! and overlap between arms is deliberately not diagnosed. Template
//! expansion happens inside the invocation's fresh hygiene scope: names
//! the template *binds* are mangled, fragment references are replaced by
//! clones of the bound sub-trees.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::ast::{Arena, NodeId, NodeKind};
use crate::ext::base::{ExpandError, ExpandResult, ExpressionMacro, MacroContext, MacroDef};
use crate::parse::lexer::{Lexer, TokenKind};
use crate::printer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentKind {
    Expr,
    Ident,
    Stmt,
    Type,
    Literal,
}

impl FragmentKind {
    fn from_word(word: &str) -> Option<FragmentKind> {
        Some(match word {
            "expr" => FragmentKind::Expr,
            "ident" => FragmentKind::Ident,
            "stmt" => FragmentKind::Stmt,
            "type" => FragmentKind::Type,
            "literal" => FragmentKind::Literal,
            _ => return None,
        })
    }

    fn matches(self, arena: &Arena, node: NodeId) -> bool {
        let kind = arena.kind(node);
        match self {
            FragmentKind::Expr => kind.is_expr(),
            FragmentKind::Ident => matches!(kind, NodeKind::Ident { .. }),
            FragmentKind::Stmt => kind.is_stmt(),
            FragmentKind::Type => matches!(kind, NodeKind::TypeRef { .. }),
            FragmentKind::Literal => kind.is_literal(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum PatElem {
    /// `$name:kind`
    Fragment { name: String, kind: FragmentKind },
    /// A literal token that must appear verbatim.
    Exact(String),
    /// `$( <inner> )<sep>*`
    Repeat {
        inner: Vec<PatElem>,
        #[allow(dead_code)]
        sep: Option<char>,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum PatternError {
    #[error("invalid pattern: {0}")]
    Pattern(String),
    #[error("invalid template: {0}")]
    Template(String),
}

/// One compiled pattern/template arm.
#[derive(Clone, Debug)]
struct CompiledArm {
    pattern: Vec<PatElem>,
    template: String,
    /// Names the template introduces (let/const/var bindings, arrow
    /// parameters); these are mangled on expansion.
    binders: HashSet<String>,
}

#[derive(Clone, Debug)]
enum Binding {
    One(NodeId),
    Seq(Vec<NodeId>),
}

/// A macro authored as pattern/template arms; registered as an
/// expression macro.
pub struct DeclarativeMacro {
    name: String,
    arms: Vec<CompiledArm>,
}

/// Compile pattern/template arms into a registrable expression macro
/// definition.
pub fn declarative_macro(name: &str, arms: &[(&str, &str)]) -> Result<MacroDef, PatternError> {
    let compiled = arms
        .iter()
        .map(|(pattern, template)| {
            Ok(CompiledArm {
                pattern: compile_pattern(pattern)?,
                template: (*template).to_string(),
                binders: template_binders(template)?,
            })
        })
        .collect::<Result<Vec<_>, PatternError>>()?;
    Ok(MacroDef::expression(
        name,
        DeclarativeMacro {
            name: name.to_string(),
            arms: compiled,
        },
    ))
}

// ---- pattern compilation ----

struct PatternScanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> PatternScanner<'a> {
    fn new(src: &'a str) -> PatternScanner<'a> {
        PatternScanner {
            chars: src.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
            out.push(self.chars.next().unwrap());
        }
        out
    }

    fn elems(&mut self, closing: Option<char>) -> Result<Vec<PatElem>, PatternError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            match self.chars.peek().copied() {
                None => {
                    if closing.is_some() {
                        return Err(PatternError::Pattern(
                            "unterminated repetition group".to_string(),
                        ));
                    }
                    return Ok(out);
                }
                Some(c) if Some(c) == closing => {
                    self.chars.next();
                    return Ok(out);
                }
                Some(',') => {
                    // Separators between elements carry no information at
                    // the argument-list level.
                    self.chars.next();
                }
                Some('$') => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'(') {
                        self.chars.next();
                        let inner = self.elems(Some(')'))?;
                        self.skip_ws();
                        let sep = match self.chars.peek().copied() {
                            Some('*') => None,
                            Some(c) => {
                                self.chars.next();
                                Some(c)
                            }
                            None => {
                                return Err(PatternError::Pattern(
                                    "expected `*` after repetition group".to_string(),
                                ))
                            }
                        };
                        self.skip_ws();
                        if self.chars.next() != Some('*') {
                            return Err(PatternError::Pattern(
                                "expected `*` after repetition group".to_string(),
                            ));
                        }
                        out.push(PatElem::Repeat { inner, sep });
                    } else {
                        let name = self.word();
                        if name.is_empty() {
                            return Err(PatternError::Pattern(
                                "expected fragment name after `$`".to_string(),
                            ));
                        }
                        self.skip_ws();
                        if self.chars.next() != Some(':') {
                            return Err(PatternError::Pattern(format!(
                                "fragment `${}` is missing its kind annotation",
                                name
                            )));
                        }
                        self.skip_ws();
                        let kind_word = self.word();
                        let kind = FragmentKind::from_word(&kind_word).ok_or_else(|| {
                            PatternError::Pattern(format!(
                                "unknown fragment kind `{}`",
                                kind_word
                            ))
                        })?;
                        out.push(PatElem::Fragment {
                            name: format!("${}", name),
                            kind,
                        });
                    }
                }
                Some('(') => {
                    // An outer parenthesis around the whole argument
                    // pattern is permitted and transparent.
                    self.chars.next();
                    let mut inner = self.elems(Some(')'))?;
                    out.append(&mut inner);
                }
                Some(_) => {
                    let mut word = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_whitespace() || c == ',' || c == ')' || c == '$' || c == '(' {
                            break;
                        }
                        word.push(c);
                        self.chars.next();
                    }
                    out.push(PatElem::Exact(word));
                }
            }
        }
    }
}

fn compile_pattern(src: &str) -> Result<Vec<PatElem>, PatternError> {
    PatternScanner::new(src).elems(None)
}

/// Names the template declares: `let`/`const`/`var` bindings plus arrow
/// parameters, found by a token scan.
fn template_binders(template: &str) -> Result<HashSet<String>, PatternError> {
    let (tokens, _) = Lexer::new(template, 0)
        .tokenize()
        .map_err(|e| PatternError::Template(e.message))?;
    let mut binders = HashSet::new();
    for (index, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::Ident(word) if word == "let" || word == "const" || word == "var" => {
                if let Some(TokenKind::Ident(name)) = tokens.get(index + 1).map(|t| &t.kind) {
                    if !name.starts_with('$') {
                        binders.insert(name.clone());
                    }
                }
            }
            TokenKind::FatArrow => {
                // `name =>` or `(a, b) =>`.
                match tokens.get(index.wrapping_sub(1)).map(|t| &t.kind) {
                    Some(TokenKind::Ident(name)) if !name.starts_with('$') => {
                        binders.insert(name.clone());
                    }
                    Some(TokenKind::RParen) => {
                        let mut depth = 1;
                        let mut cursor = index - 1;
                        while depth > 0 && cursor > 0 {
                            cursor -= 1;
                            match tokens[cursor].kind {
                                TokenKind::RParen => depth += 1,
                                TokenKind::LParen => depth -= 1,
                                _ => {}
                            }
                        }
                        let mut expecting_name = true;
                        for token in &tokens[cursor + 1..index - 1] {
                            match &token.kind {
                                TokenKind::Ident(name) if expecting_name => {
                                    if !name.starts_with('$') {
                                        binders.insert(name.clone());
                                    }
                                    expecting_name = false;
                                }
                                TokenKind::Comma => expecting_name = true,
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(binders)
}

// ---- matching ----

fn match_args(
    arena: &Arena,
    pattern: &[PatElem],
    args: &[NodeId],
) -> Option<HashMap<String, Binding>> {
    let mut bindings = HashMap::new();
    let mut cursor = 0;
    for (index, elem) in pattern.iter().enumerate() {
        match elem {
            PatElem::Fragment { name, kind } => {
                let &arg = args.get(cursor)?;
                if !kind.matches(arena, arg) {
                    return None;
                }
                if !bind_one(arena, &mut bindings, name, arg) {
                    return None;
                }
                cursor += 1;
            }
            PatElem::Exact(text) => {
                let &arg = args.get(cursor)?;
                if !exact_matches(arena, arg, text) {
                    return None;
                }
                cursor += 1;
            }
            PatElem::Repeat { inner, .. } => {
                // Greedy: consume while the inner elements match, leaving
                // enough arguments for the elements after the group.
                let needed_after = pattern.len() - index - 1;
                let mut collected: HashMap<String, Vec<NodeId>> = HashMap::new();
                for elem in inner {
                    if let PatElem::Fragment { name, .. } = elem {
                        collected.insert(name.clone(), Vec::new());
                    }
                }
                while args.len() - cursor > needed_after {
                    let mut round_cursor = cursor;
                    let mut round: Vec<(String, NodeId)> = Vec::new();
                    let mut matched = true;
                    for elem in inner {
                        let arg = match args.get(round_cursor) {
                            Some(&arg) => arg,
                            None => {
                                matched = false;
                                break;
                            }
                        };
                        match elem {
                            PatElem::Fragment { name, kind } => {
                                if !kind.matches(arena, arg) {
                                    matched = false;
                                    break;
                                }
                                round.push((name.clone(), arg));
                                round_cursor += 1;
                            }
                            PatElem::Exact(text) => {
                                if !exact_matches(arena, arg, text) {
                                    matched = false;
                                    break;
                                }
                                round_cursor += 1;
                            }
                            PatElem::Repeat { .. } => {
                                // Nested repetition is not supported.
                                matched = false;
                                break;
                            }
                        }
                    }
                    if !matched {
                        break;
                    }
                    for (name, arg) in round {
                        collected.entry(name).or_default().push(arg);
                    }
                    cursor = round_cursor;
                }
                for (name, nodes) in collected {
                    bindings.insert(name, Binding::Seq(nodes));
                }
            }
        }
    }
    if cursor == args.len() {
        Some(bindings)
    } else {
        None
    }
}

fn bind_one(
    arena: &Arena,
    bindings: &mut HashMap<String, Binding>,
    name: &str,
    node: NodeId,
) -> bool {
    match bindings.get(name) {
        // Same-named fragments must bind structurally equal sub-trees.
        Some(Binding::One(existing)) => structural_eq(arena, *existing, node),
        Some(Binding::Seq(_)) => false,
        None => {
            bindings.insert(name.to_string(), Binding::One(node));
            true
        }
    }
}

fn exact_matches(arena: &Arena, node: NodeId, text: &str) -> bool {
    match arena.kind(node) {
        NodeKind::Ident { name } => name == text,
        NodeKind::NumberLit { raw, .. } => raw == text,
        NodeKind::StringLit { value } => value == text,
        NodeKind::BoolLit { value } => text == if *value { "true" } else { "false" },
        _ => false,
    }
}

/// Structural equality through deterministic printing: spans and node
/// identities are ignored, shapes and atoms are not.
pub fn structural_eq(arena: &Arena, a: NodeId, b: NodeId) -> bool {
    printer::expr_to_string(arena, a) == printer::expr_to_string(arena, b)
}

// ---- template substitution ----

impl DeclarativeMacro {
    fn substitute(
        &self,
        cx: &mut MacroContext<'_>,
        root: NodeId,
        bindings: &HashMap<String, Binding>,
        binders: &HashSet<String>,
    ) -> ExpandResult<()> {
        // Rebuild child lists first so sequence bindings can splice.
        let kind = cx.arena.kind(root).clone();
        let new_kind = match kind {
            NodeKind::Call { callee, args } => {
                let args = self.splice_list(cx, args, bindings, binders)?;
                self.substitute(cx, callee, bindings, binders)?;
                Some(NodeKind::Call { callee, args })
            }
            NodeKind::ArrayLit { elements } => {
                let elements = self.splice_list(cx, elements, bindings, binders)?;
                Some(NodeKind::ArrayLit { elements })
            }
            NodeKind::Block { stmts } => {
                let stmts = self.splice_list(cx, stmts, bindings, binders)?;
                Some(NodeKind::Block { stmts })
            }
            _ => None,
        };
        if let Some(new_kind) = new_kind {
            // Children were already handled by splice_list (and the
            // explicit callee walk); re-walking would reach into spliced
            // user sub-trees and mangle their identifiers.
            cx.arena.set_kind(root, new_kind);
            return Ok(());
        }

        if let NodeKind::Ident { name } = cx.arena.kind(root).clone() {
            if let Some(binding) = bindings.get(&name) {
                match binding {
                    Binding::One(bound) => {
                        let clone = cx.arena.deep_clone(*bound);
                        cx.arena.replace(root, clone);
                    }
                    Binding::Seq(_) => {
                        cx.report_error(
                            "TS0106",
                            root,
                            &format!(
                                "repeated fragment `{}` can only be spliced into a list position",
                                name
                            ),
                        );
                        return Err(ExpandError::Reported);
                    }
                }
                return Ok(());
            }
            if binders.contains(&name) {
                let mangled = cx.generate_unique_name(&name);
                cx.arena.set_kind(root, NodeKind::Ident { name: mangled });
                return Ok(());
            }
            return Ok(());
        }

        for child in cx.arena.children(root) {
            self.substitute(cx, child, bindings, binders)?;
        }
        Ok(())
    }

    fn splice_list(
        &self,
        cx: &mut MacroContext<'_>,
        items: Vec<NodeId>,
        bindings: &HashMap<String, Binding>,
        binders: &HashSet<String>,
    ) -> ExpandResult<Vec<NodeId>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let seq = match cx.arena.kind(item) {
                NodeKind::Ident { name } => match bindings.get(name) {
                    Some(Binding::Seq(nodes)) => Some(nodes.clone()),
                    _ => None,
                },
                _ => None,
            };
            match seq {
                Some(nodes) => {
                    for node in nodes {
                        out.push(cx.arena.deep_clone(node));
                    }
                }
                None => {
                    self.substitute(cx, item, bindings, binders)?;
                    out.push(item);
                }
            }
        }
        Ok(out)
    }
}

impl ExpressionMacro for DeclarativeMacro {
    fn expand(
        &self,
        cx: &mut MacroContext<'_>,
        call: NodeId,
        args: &[NodeId],
    ) -> ExpandResult<NodeId> {
        for arm in &self.arms {
            let bindings = match match_args(cx.arena, &arm.pattern, args) {
                Some(bindings) => bindings,
                None => continue,
            };
            let root = if arm.template.trim_start().starts_with('{') {
                // A block template becomes a block statement; the
                // pipeline splices it over the enclosing expression
                // statement.
                let stmts = cx.parse_stmts(&arm.template)?;
                match stmts.as_slice() {
                    [single] => *single,
                    _ => {
                        cx.report_error(
                            "TS0106",
                            call,
                            "a block template must be a single block",
                        );
                        return Err(ExpandError::Reported);
                    }
                }
            } else {
                cx.parse_expr(&arm.template)?
            };
            self.substitute(cx, root, &bindings, &arm.binders)?;
            return Ok(root);
        }
        cx.report_error(
            "TS0106",
            call,
            &format!("no pattern arm of `{}` matches this invocation", self.name),
        );
        Err(ExpandError::Reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{self, Session};

    fn args_of(src: &str) -> (Arena, Vec<NodeId>) {
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let expr = parse::parse_snippet_expr(&sess, &mut arena, src).expect("parse failure");
        match arena.kind(expr).clone() {
            NodeKind::Call { args, .. } => (arena, args),
            _ => panic!("expected a call"),
        }
    }

    #[test]
    fn compiles_fragments_and_repeats() {
        let elems = compile_pattern("($a:ident, $b:expr)").unwrap();
        assert_eq!(elems.len(), 2);
        let elems = compile_pattern("($($x:expr),*)").unwrap();
        assert!(matches!(elems[0], PatElem::Repeat { .. }));
    }

    #[test]
    fn rejects_unknown_fragment_kinds() {
        assert!(matches!(
            compile_pattern("($a:frobnicate)"),
            Err(PatternError::Pattern(_))
        ));
    }

    #[test]
    fn matches_by_fragment_kind() {
        let (arena, args) = args_of("f(x, 1 + 2)");
        let pattern = compile_pattern("($a:ident, $b:expr)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_some());
        let pattern = compile_pattern("($a:literal, $b:expr)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_none());
    }

    #[test]
    fn same_named_fragments_require_equal_trees() {
        let (arena, args) = args_of("f(a + 1, a + 1)");
        let pattern = compile_pattern("($x:expr, $x:expr)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_some());

        let (arena, args) = args_of("f(a + 1, a + 2)");
        let pattern = compile_pattern("($x:expr, $x:expr)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_none());
    }

    #[test]
    fn repetition_binds_the_tail() {
        let (arena, args) = args_of("f(tag, 1, 2, 3)");
        let pattern = compile_pattern("($t:ident, $($x:expr),*)").unwrap();
        let bindings = match_args(&arena, &pattern, &args).unwrap();
        match bindings.get("$x") {
            Some(Binding::Seq(nodes)) => assert_eq!(nodes.len(), 3),
            other => panic!("unexpected binding {:?}", other),
        }
    }

    #[test]
    fn literal_tokens_match_verbatim() {
        let (arena, args) = args_of("f(by, 2)");
        let pattern = compile_pattern("(by, $n:literal)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_some());
        let (arena, args) = args_of("f(with, 2)");
        let pattern = compile_pattern("(by, $n:literal)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_none());
    }

    #[test]
    fn template_binders_are_detected() {
        let binders = template_binders("{ let t = $a; $a = $b; $b = t; }").unwrap();
        assert!(binders.contains("t"));
        assert!(!binders.contains("$a"));
        let binders = template_binders("(acc, item) => acc + item").unwrap();
        assert!(binders.contains("acc"));
        assert!(binders.contains("item"));
    }

    #[test]
    fn leftover_arguments_fail_the_match() {
        let (arena, args) = args_of("f(x, y, z)");
        let pattern = compile_pattern("($a:ident, $b:ident)").unwrap();
        assert!(match_args(&arena, &pattern, &args).is_none());
    }
}

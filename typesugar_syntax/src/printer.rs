//! Deterministic AST printing.
//!
//! The printer is the engine's output boundary: after expansion the
//! rewritten module is rendered back to source text. Printing is a pure
//! function of the arena, so two runs over the same input produce
//! identical text.
//!
//! While printing top-level statements, regions that originate in user
//! source (non-dummy spans) are recorded in a source map; synthetic
//! regions have no original mapping.

use serde::{Deserialize, Serialize};

use typesugar_pos::Span;

use crate::ast::{Arena, ImportSpecifier, NodeId, NodeKind, UnOp};

/// One printed region that originated in user source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedRegion {
    pub out_lo: u32,
    pub out_hi: u32,
    pub src: Span,
}

#[derive(Clone, Debug, Default)]
pub struct PrintedOutput {
    pub text: String,
    pub source_map: Vec<MappedRegion>,
}

/// Print a whole module.
pub fn print_module(arena: &Arena, module: NodeId) -> PrintedOutput {
    let mut printer = Printer::new(arena);
    match arena.kind(module) {
        NodeKind::Module { body } => {
            for &stmt in body {
                printer.print_mapped_stmt(stmt);
            }
        }
        _ => printer.print_mapped_stmt(module),
    }
    PrintedOutput {
        text: printer.out,
        source_map: printer.map,
    }
}

/// Print a single expression; used by diagnostics, the pattern matcher's
/// structural comparison, and tests.
pub fn expr_to_string(arena: &Arena, id: NodeId) -> String {
    let mut printer = Printer::new(arena);
    printer.print_expr(id, 0);
    printer.out
}

/// Print a single statement.
pub fn stmt_to_string(arena: &Arena, id: NodeId) -> String {
    let mut printer = Printer::new(arena);
    printer.print_stmt(id);
    printer.out
}

struct Printer<'a> {
    arena: &'a Arena,
    out: String,
    indent: usize,
    map: Vec<MappedRegion>,
}

impl<'a> Printer<'a> {
    fn new(arena: &'a Arena) -> Printer<'a> {
        Printer {
            arena,
            out: String::new(),
            indent: 0,
            map: Vec::new(),
        }
    }

    fn word(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn open_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn print_mapped_stmt(&mut self, id: NodeId) {
        let span = self.arena.span(id);
        let start = self.out.len();
        self.print_stmt(id);
        if !span.is_dummy() {
            self.map.push(MappedRegion {
                out_lo: start as u32,
                out_hi: self.out.len() as u32,
                src: span,
            });
        }
    }

    // ---- statements ----

    fn print_stmt(&mut self, id: NodeId) {
        match self.arena.kind(id).clone() {
            NodeKind::Module { body } => {
                for stmt in body {
                    self.print_mapped_stmt(stmt);
                }
            }
            NodeKind::ExprStmt { expr } => {
                self.open_line();
                self.print_expr(expr, 0);
                self.word(";");
            }
            NodeKind::VarDecl {
                kind,
                pattern,
                ty,
                init,
            } => {
                self.open_line();
                self.word(kind.keyword());
                self.word(" ");
                self.print_expr(pattern, 0);
                if let Some(ty) = ty {
                    self.word(": ");
                    self.print_type(ty);
                }
                if let Some(init) = init {
                    self.word(" = ");
                    self.print_expr(init, 4);
                }
                self.word(";");
            }
            NodeKind::FuncDecl {
                name,
                decorators,
                params,
                body,
            } => {
                for decorator in decorators {
                    self.print_stmt(decorator);
                }
                self.open_line();
                self.word("function ");
                self.word(&name);
                self.print_param_list(&params);
                self.word(" ");
                self.print_block(body);
            }
            NodeKind::Return { arg } => {
                self.open_line();
                self.word("return");
                if let Some(arg) = arg {
                    self.word(" ");
                    self.print_expr(arg, 0);
                }
                self.word(";");
            }
            NodeKind::If { test, then, alt } => {
                self.open_line();
                self.word("if (");
                self.print_expr(test, 0);
                self.word(") ");
                self.print_nested_stmt(then);
                if let Some(alt) = alt {
                    self.word(" else ");
                    self.print_nested_stmt(alt);
                }
            }
            NodeKind::While { test, body } => {
                self.open_line();
                self.word("while (");
                self.print_expr(test, 0);
                self.word(") ");
                self.print_nested_stmt(body);
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.open_line();
                self.word("for (");
                if let Some(init) = init {
                    self.print_for_init(init);
                }
                self.word("; ");
                if let Some(test) = test {
                    self.print_expr(test, 0);
                }
                self.word("; ");
                if let Some(update) = update {
                    self.print_expr(update, 0);
                }
                self.word(") ");
                self.print_nested_stmt(body);
            }
            NodeKind::Break => {
                self.open_line();
                self.word("break;");
            }
            NodeKind::Continue => {
                self.open_line();
                self.word("continue;");
            }
            NodeKind::Throw { arg } => {
                self.open_line();
                self.word("throw ");
                self.print_expr(arg, 0);
                self.word(";");
            }
            NodeKind::Block { .. } => {
                self.open_line();
                self.print_block(id);
            }
            NodeKind::Labeled { label, body } => {
                self.open_line();
                self.word(&label);
                self.word(": ");
                self.print_nested_stmt(body);
            }
            NodeKind::ImportDecl { specifiers, source } => {
                self.open_line();
                self.print_import(&specifiers, &source);
            }
            NodeKind::ClassDecl {
                name,
                decorators,
                members,
            } => {
                for decorator in decorators {
                    self.print_stmt(decorator);
                }
                self.open_line();
                self.word("class ");
                self.word(&name);
                self.word(" {");
                self.indent += 1;
                for member in members {
                    self.print_class_member(member);
                }
                self.indent -= 1;
                self.open_line();
                self.word("}");
            }
            NodeKind::PropDecl { name, ty, init } => {
                self.open_line();
                self.word(&name);
                if let Some(ty) = ty {
                    self.word(": ");
                    self.print_type(ty);
                }
                if let Some(init) = init {
                    self.word(" = ");
                    self.print_expr(init, 4);
                }
                self.word(";");
            }
            NodeKind::InterfaceDecl {
                name,
                decorators,
                fields,
            } => {
                for decorator in decorators {
                    self.print_stmt(decorator);
                }
                self.open_line();
                self.word("interface ");
                self.word(&name);
                self.word(" {");
                self.indent += 1;
                for field in fields {
                    self.print_stmt(field);
                }
                self.indent -= 1;
                self.open_line();
                self.word("}");
            }
            NodeKind::TypeAliasDecl {
                name,
                decorators,
                ty,
            } => {
                for decorator in decorators {
                    self.print_stmt(decorator);
                }
                self.open_line();
                self.word("type ");
                self.word(&name);
                self.word(" = ");
                self.print_type(ty);
                self.word(";");
            }
            NodeKind::EnumDecl { name, variants } => {
                self.open_line();
                self.word("enum ");
                self.word(&name);
                self.word(" { ");
                for (index, variant) in variants.iter().enumerate() {
                    if index > 0 {
                        self.word(", ");
                    }
                    self.word(variant);
                }
                self.word(" }");
            }
            NodeKind::Decorator { expr } => {
                self.open_line();
                self.word("@");
                self.print_expr(expr, 90);
            }
            // An expression in statement position; the pipeline can leave
            // one behind when a macro substitutes a bare expression.
            _ => {
                self.open_line();
                self.print_expr(id, 0);
                self.word(";");
            }
        }
    }

    fn print_for_init(&mut self, id: NodeId) {
        // A `for` initializer is a statement in the arena but prints
        // without its trailing `;` or line break.
        match self.arena.kind(id).clone() {
            NodeKind::VarDecl {
                kind,
                pattern,
                ty,
                init,
            } => {
                self.word(kind.keyword());
                self.word(" ");
                self.print_expr(pattern, 0);
                if let Some(ty) = ty {
                    self.word(": ");
                    self.print_type(ty);
                }
                if let Some(init) = init {
                    self.word(" = ");
                    self.print_expr(init, 4);
                }
            }
            NodeKind::ExprStmt { expr } => self.print_expr(expr, 0),
            _ => self.print_expr(id, 0),
        }
    }

    fn print_nested_stmt(&mut self, id: NodeId) {
        if matches!(self.arena.kind(id), NodeKind::Block { .. }) {
            self.print_block(id);
        } else {
            self.indent += 1;
            self.print_stmt(id);
            self.indent -= 1;
        }
    }

    fn print_block(&mut self, id: NodeId) {
        self.word("{");
        self.indent += 1;
        if let NodeKind::Block { stmts } = self.arena.kind(id).clone() {
            for stmt in stmts {
                self.print_stmt(stmt);
            }
        }
        self.indent -= 1;
        self.open_line();
        self.word("}");
    }

    fn print_class_member(&mut self, id: NodeId) {
        match self.arena.kind(id).clone() {
            NodeKind::FuncDecl {
                name, params, body, ..
            } => {
                self.open_line();
                self.word(&name);
                self.print_param_list(&params);
                self.word(" ");
                self.print_block(body);
            }
            _ => self.print_stmt(id),
        }
    }

    fn print_import(&mut self, specifiers: &[ImportSpecifier], source: &str) {
        self.word("import ");
        if specifiers.is_empty() {
            self.word(&quote(source));
            self.word(";");
            return;
        }
        let mut first = true;
        let mut named_open = false;
        for spec in specifiers {
            match spec {
                ImportSpecifier::Default { local } => {
                    if !first {
                        self.word(", ");
                    }
                    self.word(local);
                    first = false;
                }
                ImportSpecifier::Namespace { local } => {
                    if !first {
                        self.word(", ");
                    }
                    self.word("* as ");
                    self.word(local);
                    first = false;
                }
                ImportSpecifier::Named { imported, local } => {
                    if !named_open {
                        if !first {
                            self.word(", ");
                        }
                        self.word("{ ");
                        named_open = true;
                        first = false;
                    } else {
                        self.word(", ");
                    }
                    if imported == local {
                        self.word(local);
                    } else {
                        self.word(imported);
                        self.word(" as ");
                        self.word(local);
                    }
                }
            }
        }
        if named_open {
            self.word(" }");
        }
        self.word(" from ");
        self.word(&quote(source));
        self.word(";");
    }

    fn print_param_list(&mut self, params: &[NodeId]) {
        self.word("(");
        for (index, &param) in params.iter().enumerate() {
            if index > 0 {
                self.word(", ");
            }
            self.print_expr(param, 0);
        }
        self.word(")");
    }

    fn print_type(&mut self, id: NodeId) {
        match self.arena.kind(id).clone() {
            NodeKind::TypeRef { name, args } => {
                self.word(&name);
                if !args.is_empty() {
                    self.word("<");
                    for (index, arg) in args.into_iter().enumerate() {
                        if index > 0 {
                            self.word(", ");
                        }
                        self.print_type(arg);
                    }
                    self.word(">");
                }
            }
            _ => self.print_expr(id, 0),
        }
    }

    // ---- expressions ----

    /// Binding strength of the expression itself; parenthesized when
    /// printed into a context requiring more.
    fn prec(&self, id: NodeId) -> u8 {
        match self.arena.kind(id) {
            NodeKind::Arrow { .. } => 4,
            NodeKind::Assign { .. } => 4,
            NodeKind::Cond { .. } => 5,
            NodeKind::Binary { op, .. } => 10 + op.precedence(),
            NodeKind::Unary { .. } => 80,
            NodeKind::Call { .. }
            | NodeKind::New { .. }
            | NodeKind::Member { .. }
            | NodeKind::Index { .. }
            | NodeKind::TaggedTemplate { .. } => 90,
            _ => 100,
        }
    }

    fn print_expr(&mut self, id: NodeId, min_prec: u8) {
        let needs_parens = self.prec(id) < min_prec;
        if needs_parens {
            self.word("(");
        }
        self.print_expr_inner(id);
        if needs_parens {
            self.word(")");
        }
    }

    fn print_expr_inner(&mut self, id: NodeId) {
        match self.arena.kind(id).clone() {
            NodeKind::Ident { name } => self.word(&name),
            NodeKind::NumberLit { raw, .. } => self.word(&raw),
            NodeKind::StringLit { value } => self.word(&quote(&value)),
            NodeKind::BoolLit { value } => self.word(if value { "true" } else { "false" }),
            NodeKind::NullLit => self.word("null"),
            NodeKind::BigIntLit { digits } => {
                self.word(&digits);
                self.word("n");
            }
            NodeKind::TemplateLit { quasis, exprs } => {
                self.word("`");
                for (index, quasi) in quasis.iter().enumerate() {
                    self.word(&escape_template(quasi));
                    if index < exprs.len() {
                        self.word("${");
                        self.print_expr(exprs[index], 0);
                        self.word("}");
                    }
                }
                self.word("`");
            }
            NodeKind::TaggedTemplate { tag, template } => {
                self.print_expr(tag, 90);
                self.print_expr(template, 0);
            }
            NodeKind::ArrayLit { elements } => {
                self.word("[");
                for (index, element) in elements.into_iter().enumerate() {
                    if index > 0 {
                        self.word(", ");
                    }
                    self.print_expr(element, 4);
                }
                self.word("]");
            }
            NodeKind::ObjectLit { props } => {
                if props.is_empty() {
                    self.word("{}");
                    return;
                }
                self.word("{ ");
                for (index, (key, value)) in props.iter().enumerate() {
                    if index > 0 {
                        self.word(", ");
                    }
                    let shorthand = matches!(
                        self.arena.kind(*value),
                        NodeKind::Ident { name } if name == key
                    );
                    if shorthand {
                        self.word(key);
                    } else {
                        self.word(key);
                        self.word(": ");
                        self.print_expr(*value, 4);
                    }
                }
                self.word(" }");
            }
            NodeKind::Arrow { params, body } => {
                self.print_param_list(&params);
                self.word(" => ");
                if matches!(self.arena.kind(body), NodeKind::Block { .. }) {
                    self.print_block(body);
                } else {
                    self.print_expr(body, 4);
                }
            }
            NodeKind::Call { callee, args } => {
                self.print_expr(callee, 90);
                self.print_arg_list(&args);
            }
            NodeKind::New { callee, args } => {
                self.word("new ");
                self.print_expr(callee, 90);
                self.print_arg_list(&args);
            }
            NodeKind::Member { object, property } => {
                self.print_expr(object, 90);
                self.word(".");
                self.word(&property);
            }
            NodeKind::Index { object, index } => {
                self.print_expr(object, 90);
                self.word("[");
                self.print_expr(index, 0);
                self.word("]");
            }
            NodeKind::Unary { op, operand } => {
                self.word(op.as_str());
                if matches!(op, UnOp::TypeOf | UnOp::Void) {
                    self.word(" ");
                }
                self.print_expr(operand, 80);
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let prec = 10 + op.precedence();
                self.print_expr(lhs, prec);
                self.word(" ");
                self.word(op.as_str());
                self.word(" ");
                self.print_expr(rhs, prec + 1);
            }
            NodeKind::Cond { test, then, alt } => {
                self.print_expr(test, 6);
                self.word(" ? ");
                self.print_expr(then, 4);
                self.word(" : ");
                self.print_expr(alt, 4);
            }
            NodeKind::Assign { target, value } => {
                self.print_expr(target, 90);
                self.word(" = ");
                self.print_expr(value, 4);
            }
            NodeKind::ObjectPat { props } => {
                self.word("{ ");
                for (index, (key, value)) in props.iter().enumerate() {
                    if index > 0 {
                        self.word(", ");
                    }
                    let shorthand = matches!(
                        self.arena.kind(*value),
                        NodeKind::Ident { name } if name == key
                    );
                    if shorthand {
                        self.word(key);
                    } else {
                        self.word(key);
                        self.word(": ");
                        self.print_expr(*value, 0);
                    }
                }
                self.word(" }");
            }
            NodeKind::ArrayPat { elements } => {
                self.word("[");
                for (index, element) in elements.into_iter().enumerate() {
                    if index > 0 {
                        self.word(", ");
                    }
                    self.print_expr(element, 0);
                }
                self.word("]");
            }
            NodeKind::TypeRef { .. } => self.print_type(id),
            other => {
                // Statement kinds never reach expression position; print
                // something recognizable rather than panicking mid-render.
                self.word(&format!("/* unprintable {:?} */", std::mem::discriminant(&other)));
            }
        }
    }

    fn print_arg_list(&mut self, args: &[NodeId]) {
        self.word("(");
        for (index, &arg) in args.iter().enumerate() {
            if index > 0 {
                self.word(", ");
            }
            self.print_expr(arg, 4);
        }
        self.word(")");
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_template(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{self, Session};

    fn roundtrip(src: &str) -> String {
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let module = parse::parse_module(&sess, &mut arena).expect("parse failure");
        print_module(&arena, module).text
    }

    #[test]
    fn prints_call_statement() {
        assert_eq!(roundtrip("swap(x, y);"), "swap(x, y);");
    }

    #[test]
    fn prints_imports() {
        assert_eq!(
            roundtrip("import { Eq as E, Ord } from \"./utils\";"),
            "import { Eq as E, Ord } from \"./utils\";"
        );
        assert_eq!(
            roundtrip("import * as ns from \"m\";"),
            "import * as ns from \"m\";"
        );
        assert_eq!(roundtrip("import d from \"m\";"), "import d from \"m\";");
    }

    #[test]
    fn preserves_number_spelling() {
        assert_eq!(roundtrip("const x = 1_000.5;"), "const x = 1_000.5;");
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let sess = Session::new("test.ts", "");
        let mut arena = Arena::new("");
        let expr = parse::parse_snippet_expr(&sess, &mut arena, "(1 + 2) * 3").unwrap();
        assert_eq!(expr_to_string(&arena, expr), "(1 + 2) * 3");
        let expr = parse::parse_snippet_expr(&sess, &mut arena, "1 + 2 * 3").unwrap();
        assert_eq!(expr_to_string(&arena, expr), "1 + 2 * 3");
    }

    #[test]
    fn prints_interface_with_decorator() {
        let out = roundtrip("@derive(Show)\ninterface U { x: number }");
        assert_eq!(out, "@derive(Show)\ninterface U {\n  x: number;\n}");
    }

    #[test]
    fn prints_template_literals() {
        assert_eq!(roundtrip("const s = `a${x}b`;"), "const s = `a${x}b`;");
    }

    #[test]
    fn source_map_skips_synthetic_regions() {
        let src = "const a = 1;";
        let sess = Session::new("test.ts", src);
        let mut arena = Arena::new(src);
        let module = parse::parse_module(&sess, &mut arena).unwrap();
        let synthetic = parse::parse_snippet_stmts(&sess, &mut arena, "const b = 2;").unwrap();
        if let NodeKind::Module { body } = arena.kind(module).clone() {
            let mut body = body;
            body.extend(synthetic);
            arena.set_kind(module, NodeKind::Module { body });
        }
        let printed = print_module(&arena, module);
        assert_eq!(printed.source_map.len(), 1);
        assert_eq!(printed.text, "const a = 1;\nconst b = 2;");
    }
}

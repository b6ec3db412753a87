//! AST construction helpers for macro callbacks.
//!
//! Everything built here is synthetic: nodes carry [`DUMMY_SP`] and are
//! therefore exempt from opt-out scanning and source mapping.

use typesugar_pos::DUMMY_SP;

use crate::ast::{Arena, BinOp, ImportSpecifier, NodeId, NodeKind, UnOp, VarKind};
use crate::comptime::format_number;

pub struct AstFactory<'a> {
    arena: &'a mut Arena,
}

impl<'a> AstFactory<'a> {
    pub fn new(arena: &'a mut Arena) -> AstFactory<'a> {
        AstFactory { arena }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.arena.alloc(kind, DUMMY_SP)
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Ident {
            name: name.to_string(),
        })
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.alloc(NodeKind::NumberLit {
            value,
            raw: format_number(value),
        })
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.alloc(NodeKind::StringLit {
            value: value.to_string(),
        })
    }

    pub fn bool(&mut self, value: bool) -> NodeId {
        self.alloc(NodeKind::BoolLit { value })
    }

    pub fn null(&mut self) -> NodeId {
        self.alloc(NodeKind::NullLit)
    }

    /// The canonical `void 0` expression.
    pub fn void_zero(&mut self) -> NodeId {
        let zero = self.number(0.0);
        self.alloc(NodeKind::Unary {
            op: UnOp::Void,
            operand: zero,
        })
    }

    pub fn array(&mut self, elements: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::ArrayLit { elements })
    }

    pub fn object(&mut self, props: Vec<(String, NodeId)>) -> NodeId {
        self.alloc(NodeKind::ObjectLit { props })
    }

    pub fn template(&mut self, quasis: Vec<String>, exprs: Vec<NodeId>) -> NodeId {
        debug_assert_eq!(quasis.len(), exprs.len() + 1);
        self.alloc(NodeKind::TemplateLit { quasis, exprs })
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Call { callee, args })
    }

    pub fn call_ident(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.ident(name);
        self.call(callee, args)
    }

    pub fn new_expr(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::New { callee, args })
    }

    pub fn member(&mut self, object: NodeId, property: &str) -> NodeId {
        self.alloc(NodeKind::Member {
            object,
            property: property.to_string(),
        })
    }

    pub fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.alloc(NodeKind::Binary { op, lhs, rhs })
    }

    pub fn unary(&mut self, op: UnOp, operand: NodeId) -> NodeId {
        self.alloc(NodeKind::Unary { op, operand })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.alloc(NodeKind::Assign { target, value })
    }

    pub fn arrow(&mut self, params: Vec<NodeId>, body: NodeId) -> NodeId {
        self.alloc(NodeKind::Arrow { params, body })
    }

    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Block { stmts })
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::ExprStmt { expr })
    }

    pub fn var_decl(&mut self, kind: VarKind, name: &str, init: NodeId) -> NodeId {
        let pattern = self.ident(name);
        self.alloc(NodeKind::VarDecl {
            kind,
            pattern,
            ty: None,
            init: Some(init),
        })
    }

    pub fn throw(&mut self, arg: NodeId) -> NodeId {
        self.alloc(NodeKind::Throw { arg })
    }

    pub fn return_stmt(&mut self, arg: Option<NodeId>) -> NodeId {
        self.alloc(NodeKind::Return { arg })
    }

    pub fn import_named(&mut self, specifiers: Vec<(String, String)>, source: &str) -> NodeId {
        let specifiers = specifiers
            .into_iter()
            .map(|(imported, local)| ImportSpecifier::Named { imported, local })
            .collect();
        self.alloc(NodeKind::ImportDecl {
            specifiers,
            source: source.to_string(),
        })
    }

    pub fn type_ref(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::TypeRef {
            name: name.to_string(),
            args,
        })
    }

    /// `(() => { throw new Error(<message>); })()` -- the documented
    /// replacement for a comptime expression whose evaluation failed but
    /// whose failure is deferred to run time.
    pub fn throwing_expr(&mut self, message: &str) -> NodeId {
        let message = self.string(message);
        let error_ctor = self.ident("Error");
        let error = self.new_expr(error_ctor, vec![message]);
        let throw = self.throw(error);
        let body = self.block(vec![throw]);
        let arrow = self.arrow(Vec::new(), body);
        self.call(arrow, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer;

    #[test]
    fn built_nodes_are_synthetic() {
        let mut arena = Arena::new("");
        let mut factory = AstFactory::new(&mut arena);
        let call = factory.call_ident("f", vec![]);
        assert!(arena.is_synthetic(call));
    }

    #[test]
    fn throwing_expr_prints_as_an_iife() {
        let mut arena = Arena::new("");
        let expr = AstFactory::new(&mut arena).throwing_expr("boom");
        assert_eq!(
            printer::expr_to_string(&arena, expr),
            "(() => {\n  throw new Error(\"boom\");\n})()"
        );
    }

    #[test]
    fn void_zero_prints() {
        let mut arena = Arena::new("");
        let expr = AstFactory::new(&mut arena).void_zero();
        assert_eq!(printer::expr_to_string(&arena, expr), "void 0");
    }
}

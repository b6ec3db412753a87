//! The abstract syntax tree the expansion pipeline rewrites.
//!
//! Nodes live in an [`Arena`] and refer to each other by [`NodeId`]
//! handles; parents are handles too, so generic upward walks (the opt-out
//! scanner) need no owning back-pointers. The arena also keeps an
//! immutable view of the original source text.
//!
//! Synthetic nodes -- anything built by a macro rather than the parser --
//! carry [`DUMMY_SP`] and are recognizable through [`Arena::is_synthetic`].

use serde::{Deserialize, Serialize};

use std::rc::Rc;

use typesugar_pos::{Pos, Span, DUMMY_SP};

#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_usize(index: usize) -> NodeId {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum VarKind {
    Const,
    Let,
    Var,
}

impl VarKind {
    pub fn keyword(self) -> &'static str {
        match self {
            VarKind::Const => "const",
            VarKind::Let => "let",
            VarKind::Var => "var",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    TypeOf,
    Void,
}

impl UnOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Pos => "+",
            UnOp::Not => "!",
            UnOp::TypeOf => "typeof",
            UnOp::Void => "void",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::StrictEq => "===",
            BinOp::Ne => "!=",
            BinOp::StrictNe => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// Binding strength for the printer; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::StrictEq | BinOp::Ne | BinOp::StrictNe => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}

/// One binding introduced by an import declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportSpecifier {
    /// `import foo from "m"`
    Default { local: String },
    /// `import { imported as local } from "m"`; `local == imported` when
    /// the specifier is not aliased.
    Named { imported: String, local: String },
    /// `import * as ns from "m"` -- introduces no element names.
    Namespace { local: String },
}

impl ImportSpecifier {
    pub fn local(&self) -> &str {
        match self {
            ImportSpecifier::Default { local }
            | ImportSpecifier::Named { local, .. }
            | ImportSpecifier::Namespace { local } => local,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    // Expressions.
    Ident {
        name: String,
    },
    NumberLit {
        value: f64,
        /// Source spelling, kept so printing does not normalize literals.
        raw: String,
    },
    StringLit {
        value: String,
    },
    BoolLit {
        value: bool,
    },
    NullLit,
    BigIntLit {
        /// Digits without the trailing `n`.
        digits: String,
    },
    TemplateLit {
        /// Always one more quasi than expressions.
        quasis: Vec<String>,
        exprs: Vec<NodeId>,
    },
    TaggedTemplate {
        tag: NodeId,
        template: NodeId,
    },
    ArrayLit {
        elements: Vec<NodeId>,
    },
    ObjectLit {
        props: Vec<(String, NodeId)>,
    },
    Arrow {
        params: Vec<NodeId>,
        /// Either an expression or a `Block`.
        body: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    New {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Member {
        object: NodeId,
        property: String,
    },
    Index {
        object: NodeId,
        index: NodeId,
    },
    Unary {
        op: UnOp,
        operand: NodeId,
    },
    Binary {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Cond {
        test: NodeId,
        then: NodeId,
        alt: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },

    // Binding patterns.
    ObjectPat {
        props: Vec<(String, NodeId)>,
    },
    ArrayPat {
        elements: Vec<NodeId>,
    },

    // Types.
    TypeRef {
        name: String,
        args: Vec<NodeId>,
    },

    // Statements and declarations.
    Module {
        body: Vec<NodeId>,
    },
    ExprStmt {
        expr: NodeId,
    },
    VarDecl {
        kind: VarKind,
        pattern: NodeId,
        ty: Option<NodeId>,
        init: Option<NodeId>,
    },
    FuncDecl {
        name: String,
        decorators: Vec<NodeId>,
        params: Vec<NodeId>,
        body: NodeId,
    },
    Return {
        arg: Option<NodeId>,
    },
    If {
        test: NodeId,
        then: NodeId,
        alt: Option<NodeId>,
    },
    While {
        test: NodeId,
        body: NodeId,
    },
    For {
        init: Option<NodeId>,
        test: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    Break,
    Continue,
    Throw {
        arg: NodeId,
    },
    Block {
        stmts: Vec<NodeId>,
    },
    Labeled {
        label: String,
        body: NodeId,
    },
    ImportDecl {
        specifiers: Vec<ImportSpecifier>,
        source: String,
    },
    ClassDecl {
        name: String,
        decorators: Vec<NodeId>,
        members: Vec<NodeId>,
    },
    /// A class property or interface field.
    PropDecl {
        name: String,
        ty: Option<NodeId>,
        init: Option<NodeId>,
    },
    InterfaceDecl {
        name: String,
        decorators: Vec<NodeId>,
        fields: Vec<NodeId>,
    },
    TypeAliasDecl {
        name: String,
        decorators: Vec<NodeId>,
        ty: NodeId,
    },
    EnumDecl {
        name: String,
        variants: Vec<String>,
    },
    Decorator {
        /// An identifier or a call.
        expr: NodeId,
    },
}

impl NodeKind {
    pub fn is_expr(&self) -> bool {
        matches!(
            self,
            NodeKind::Ident { .. }
                | NodeKind::NumberLit { .. }
                | NodeKind::StringLit { .. }
                | NodeKind::BoolLit { .. }
                | NodeKind::NullLit
                | NodeKind::BigIntLit { .. }
                | NodeKind::TemplateLit { .. }
                | NodeKind::TaggedTemplate { .. }
                | NodeKind::ArrayLit { .. }
                | NodeKind::ObjectLit { .. }
                | NodeKind::Arrow { .. }
                | NodeKind::Call { .. }
                | NodeKind::New { .. }
                | NodeKind::Member { .. }
                | NodeKind::Index { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Cond { .. }
                | NodeKind::Assign { .. }
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            NodeKind::NumberLit { .. }
                | NodeKind::StringLit { .. }
                | NodeKind::BoolLit { .. }
                | NodeKind::NullLit
                | NodeKind::BigIntLit { .. }
        )
    }

    pub fn is_stmt(&self) -> bool {
        matches!(
            self,
            NodeKind::ExprStmt { .. }
                | NodeKind::VarDecl { .. }
                | NodeKind::FuncDecl { .. }
                | NodeKind::Return { .. }
                | NodeKind::If { .. }
                | NodeKind::While { .. }
                | NodeKind::For { .. }
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Throw { .. }
                | NodeKind::Block { .. }
                | NodeKind::Labeled { .. }
                | NodeKind::ImportDecl { .. }
                | NodeKind::ClassDecl { .. }
                | NodeKind::InterfaceDecl { .. }
                | NodeKind::TypeAliasDecl { .. }
                | NodeKind::EnumDecl { .. }
        )
    }

    /// Rebuild this kind with every child handle passed through `f`, in
    /// syntactic order. The single place that knows the child slots of
    /// every variant; `children`, `deep_clone` and the pipeline walker all
    /// go through it.
    pub fn map_children(&self, f: &mut dyn FnMut(NodeId) -> NodeId) -> NodeKind {
        use NodeKind::*;
        let map_vec = |ids: &[NodeId], f: &mut dyn FnMut(NodeId) -> NodeId| -> Vec<NodeId> {
            ids.iter().map(|&id| f(id)).collect()
        };
        let map_opt = |id: &Option<NodeId>, f: &mut dyn FnMut(NodeId) -> NodeId| -> Option<NodeId> {
            id.map(|id| f(id))
        };
        let map_props =
            |props: &[(String, NodeId)], f: &mut dyn FnMut(NodeId) -> NodeId| -> Vec<(String, NodeId)> {
                props.iter().map(|(k, v)| (k.clone(), f(*v))).collect()
            };
        match self {
            Ident { name } => Ident { name: name.clone() },
            NumberLit { value, raw } => NumberLit {
                value: *value,
                raw: raw.clone(),
            },
            StringLit { value } => StringLit {
                value: value.clone(),
            },
            BoolLit { value } => BoolLit { value: *value },
            NullLit => NullLit,
            BigIntLit { digits } => BigIntLit {
                digits: digits.clone(),
            },
            TemplateLit { quasis, exprs } => TemplateLit {
                quasis: quasis.clone(),
                exprs: map_vec(exprs, &mut *f),
            },
            TaggedTemplate { tag, template } => TaggedTemplate {
                tag: f(*tag),
                template: f(*template),
            },
            ArrayLit { elements } => ArrayLit {
                elements: map_vec(elements, &mut *f),
            },
            ObjectLit { props } => ObjectLit {
                props: map_props(props, &mut *f),
            },
            Arrow { params, body } => Arrow {
                params: map_vec(params, &mut *f),
                body: f(*body),
            },
            Call { callee, args } => Call {
                callee: f(*callee),
                args: map_vec(args, &mut *f),
            },
            New { callee, args } => New {
                callee: f(*callee),
                args: map_vec(args, &mut *f),
            },
            Member { object, property } => Member {
                object: f(*object),
                property: property.clone(),
            },
            Index { object, index } => Index {
                object: f(*object),
                index: f(*index),
            },
            Unary { op, operand } => Unary {
                op: *op,
                operand: f(*operand),
            },
            Binary { op, lhs, rhs } => Binary {
                op: *op,
                lhs: f(*lhs),
                rhs: f(*rhs),
            },
            Cond { test, then, alt } => Cond {
                test: f(*test),
                then: f(*then),
                alt: f(*alt),
            },
            Assign { target, value } => Assign {
                target: f(*target),
                value: f(*value),
            },
            ObjectPat { props } => ObjectPat {
                props: map_props(props, &mut *f),
            },
            ArrayPat { elements } => ArrayPat {
                elements: map_vec(elements, &mut *f),
            },
            TypeRef { name, args } => TypeRef {
                name: name.clone(),
                args: map_vec(args, &mut *f),
            },
            Module { body } => Module {
                body: map_vec(body, &mut *f),
            },
            ExprStmt { expr } => ExprStmt { expr: f(*expr) },
            VarDecl {
                kind,
                pattern,
                ty,
                init,
            } => VarDecl {
                kind: *kind,
                pattern: f(*pattern),
                ty: map_opt(ty, &mut *f),
                init: map_opt(init, &mut *f),
            },
            FuncDecl {
                name,
                decorators,
                params,
                body,
            } => FuncDecl {
                name: name.clone(),
                decorators: map_vec(decorators, &mut *f),
                params: map_vec(params, &mut *f),
                body: f(*body),
            },
            Return { arg } => Return {
                arg: map_opt(arg, &mut *f),
            },
            If { test, then, alt } => If {
                test: f(*test),
                then: f(*then),
                alt: map_opt(alt, &mut *f),
            },
            While { test, body } => While {
                test: f(*test),
                body: f(*body),
            },
            For {
                init,
                test,
                update,
                body,
            } => For {
                init: map_opt(init, &mut *f),
                test: map_opt(test, &mut *f),
                update: map_opt(update, &mut *f),
                body: f(*body),
            },
            Break => Break,
            Continue => Continue,
            Throw { arg } => Throw { arg: f(*arg) },
            Block { stmts } => Block {
                stmts: map_vec(stmts, &mut *f),
            },
            Labeled { label, body } => Labeled {
                label: label.clone(),
                body: f(*body),
            },
            ImportDecl { specifiers, source } => ImportDecl {
                specifiers: specifiers.clone(),
                source: source.clone(),
            },
            ClassDecl {
                name,
                decorators,
                members,
            } => ClassDecl {
                name: name.clone(),
                decorators: map_vec(decorators, &mut *f),
                members: map_vec(members, &mut *f),
            },
            PropDecl { name, ty, init } => PropDecl {
                name: name.clone(),
                ty: map_opt(ty, &mut *f),
                init: map_opt(init, &mut *f),
            },
            InterfaceDecl {
                name,
                decorators,
                fields,
            } => InterfaceDecl {
                name: name.clone(),
                decorators: map_vec(decorators, &mut *f),
                fields: map_vec(fields, &mut *f),
            },
            TypeAliasDecl {
                name,
                decorators,
                ty,
            } => TypeAliasDecl {
                name: name.clone(),
                decorators: map_vec(decorators, &mut *f),
                ty: f(*ty),
            },
            EnumDecl { name, variants } => EnumDecl {
                name: name.clone(),
                variants: variants.clone(),
            },
            Decorator { expr } => Decorator { expr: f(*expr) },
        }
    }

    /// Child handles in syntactic order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.map_children(&mut |id| {
            out.push(id);
            id
        });
        out
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
}

/// Owns every node of one file plus an immutable view of its source text.
///
/// The arena is append-only: replacing a node during expansion overwrites
/// its kind and span in place so that handles held by enclosing nodes stay
/// valid. Orphaned expansion intermediates simply stay behind; they are
/// unreachable from the module root and never printed.
pub struct Arena {
    nodes: Vec<Node>,
    source: Rc<str>,
}

impl Arena {
    pub fn new(source: &str) -> Arena {
        Arena {
            nodes: Vec::new(),
            source: Rc::from(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a node and claim its children: each child's parent pointer
    /// is set to the new node. Children must already live in this arena,
    /// so trees are built bottom-up.
    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::from_usize(self.nodes.len());
        let children = kind.children();
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
        });
        for child in children {
            self.nodes[child.index()].parent = Some(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.index()].kind.children()
    }

    /// True for macro-produced nodes, which carry no source position.
    pub fn is_synthetic(&self, id: NodeId) -> bool {
        self.span(id).is_dummy()
    }

    /// Overwrite `site` with the content of `with`, reparenting `with`'s
    /// children onto `site`. Handles pointing at `site` stay valid; the
    /// `with` shell becomes unreachable.
    pub fn replace(&mut self, site: NodeId, with: NodeId) {
        let kind = self.nodes[with.index()].kind.clone();
        let span = self.nodes[with.index()].span;
        let children = kind.children();
        self.nodes[site.index()].kind = kind;
        self.nodes[site.index()].span = span;
        for child in children {
            self.nodes[child.index()].parent = Some(site);
        }
    }

    /// Overwrite only the kind of `site`, keeping its span and parent.
    pub fn set_kind(&mut self, site: NodeId, kind: NodeKind) {
        let children = kind.children();
        self.nodes[site.index()].kind = kind;
        for child in children {
            self.nodes[child.index()].parent = Some(site);
        }
    }

    /// Recursively copy the subtree at `id`, preserving spans. Used by the
    /// pattern matcher when one bound fragment is substituted into more
    /// than one template position.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.index()].kind.clone();
        let span = self.nodes[id.index()].span;
        let new_kind = kind.map_children(&mut |child| self.deep_clone(child));
        self.alloc(new_kind, span)
    }

    /// Strip source positions from the whole subtree, marking it
    /// synthetic.
    pub fn make_synthetic(&mut self, id: NodeId) {
        self.nodes[id.index()].span = DUMMY_SP;
        for child in self.children(id) {
            self.make_synthetic(child);
        }
    }

    /// The original source text under `span`, when the span is real and
    /// in bounds.
    pub fn text(&self, span: Span) -> Option<&str> {
        if span.is_dummy() {
            return None;
        }
        self.source
            .get(span.lo.to_usize()..span.hi.to_usize())
    }

    /// Walk from `id` towards the root, yielding each ancestor.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.parent(id),
        }
    }
}

pub struct Ancestors<'a> {
    arena: &'a Arena,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.arena.parent(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesugar_pos::BytePos;

    fn sp(lo: u32, hi: u32) -> Span {
        Span::new(BytePos(lo), BytePos(hi))
    }

    #[test]
    fn alloc_sets_parent_pointers() {
        let mut arena = Arena::new("a + b");
        let a = arena.alloc(
            NodeKind::Ident {
                name: "a".to_string(),
            },
            sp(0, 1),
        );
        let b = arena.alloc(
            NodeKind::Ident {
                name: "b".to_string(),
            },
            sp(4, 5),
        );
        let sum = arena.alloc(
            NodeKind::Binary {
                op: BinOp::Add,
                lhs: a,
                rhs: b,
            },
            sp(0, 5),
        );
        assert_eq!(arena.parent(a), Some(sum));
        assert_eq!(arena.parent(b), Some(sum));
        assert_eq!(arena.parent(sum), None);
        assert_eq!(arena.children(sum), vec![a, b]);
    }

    #[test]
    fn replace_keeps_outer_handles_valid() {
        let mut arena = Arena::new("f(x)");
        let x = arena.alloc(
            NodeKind::Ident {
                name: "x".to_string(),
            },
            sp(2, 3),
        );
        let callee = arena.alloc(
            NodeKind::Ident {
                name: "f".to_string(),
            },
            sp(0, 1),
        );
        let call = arena.alloc(
            NodeKind::Call {
                callee,
                args: vec![x],
            },
            sp(0, 4),
        );
        let stmt = arena.alloc(NodeKind::ExprStmt { expr: call }, sp(0, 4));

        let replacement = arena.alloc(
            NodeKind::NumberLit {
                value: 1.0,
                raw: "1".to_string(),
            },
            DUMMY_SP,
        );
        arena.replace(call, replacement);

        match arena.kind(stmt) {
            NodeKind::ExprStmt { expr } => {
                assert_eq!(*expr, call);
                assert!(matches!(
                    arena.kind(*expr),
                    NodeKind::NumberLit { .. }
                ));
            }
            _ => panic!("expected ExprStmt"),
        }
        assert!(arena.is_synthetic(call));
    }

    #[test]
    fn deep_clone_is_detached() {
        let mut arena = Arena::new("");
        let x = arena.alloc(
            NodeKind::Ident {
                name: "x".to_string(),
            },
            DUMMY_SP,
        );
        let neg = arena.alloc(
            NodeKind::Unary {
                op: UnOp::Neg,
                operand: x,
            },
            DUMMY_SP,
        );
        let copy = arena.deep_clone(neg);
        assert_ne!(copy, neg);
        let copy_children = arena.children(copy);
        assert_eq!(copy_children.len(), 1);
        assert_ne!(copy_children[0], x);
        // Mutating the copy leaves the original alone.
        arena.set_kind(
            copy_children[0],
            NodeKind::Ident {
                name: "y".to_string(),
            },
        );
        match arena.kind(x) {
            NodeKind::Ident { name } => assert_eq!(name, "x"),
            _ => panic!(),
        }
    }

    #[test]
    fn ancestors_walk() {
        let mut arena = Arena::new("");
        let inner = arena.alloc(NodeKind::Ident { name: "i".into() }, DUMMY_SP);
        let stmt = arena.alloc(NodeKind::ExprStmt { expr: inner }, DUMMY_SP);
        let module = arena.alloc(NodeKind::Module { body: vec![stmt] }, DUMMY_SP);
        let chain: Vec<NodeId> = arena.ancestors(inner).collect();
        assert_eq!(chain, vec![stmt, module]);
    }
}

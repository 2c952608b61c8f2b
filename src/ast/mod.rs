//! The tagged-variant tree every pass walks and rewrites.
//!
//! Ownership is a strict tree — every child is `Box`ed or held in a
//! `Vec`, there is no sharing — so a pass that needs to move a subtree
//! (e.g. cloning a UFCS receiver into the first argument position)
//! clones it rather than aliasing it.

pub mod ty;

use bitflags::bitflags;

use crate::ident::Ident;
use crate::span::Span;
use ty::TypeExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Assign,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    Deref,
    AddrOf,
    PreIncr,
    PreDecr,
    PostIncr,
    PostDecr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixity {
    Prefix,
    Postfix,
}

/// A closure literal, `(params) => expr` or `(params) => { stmts }`,
/// before the closure pass lowers it away. `is_block` distinguishes
/// the two surface forms, since the closure pass wraps a
/// bare-expression body in an implicit `return` but emits a
/// block body verbatim.
#[derive(Debug, Clone)]
pub struct ClosureLiteral {
    pub params: Vec<Ident>,
    pub is_block: bool,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(Ident),
    IntLiteral { value: i64, span: Span },
    StringLiteral { value: String, span: Span },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Field {
        base: Box<Expr>,
        name: Ident,
        arrow: bool,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        fixity: Fixity,
        expr: Box<Expr>,
        span: Span,
    },
    Cast {
        ty: TypeExpr,
        expr: Box<Expr>,
        span: Span,
    },
    CompoundLiteral {
        ty: TypeExpr,
        fields: Vec<(Option<Ident>, Expr)>,
        span: Span,
    },
    SizeofType { ty: TypeExpr, span: Span },
    SizeofExpr { expr: Box<Expr>, span: Span },
    Await { expr: Box<Expr>, span: Span },
    Try { expr: Box<Expr>, span: Span },
    Closure(ClosureLiteral),
    /// Pre-UFCS-lowering method call; the UFCS pass removes every
    /// instance of this variant.
    MethodCall {
        receiver: Box<Expr>,
        method: Ident,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        use Expr::*;
        match self {
            Ident(i) => i.span,
            IntLiteral { span, .. }
            | StringLiteral { span, .. }
            | Call { span, .. }
            | Field { span, .. }
            | Index { span, .. }
            | Binary { span, .. }
            | Unary { span, .. }
            | Cast { span, .. }
            | CompoundLiteral { span, .. }
            | SizeofType { span, .. }
            | SizeofExpr { span, .. }
            | Await { span, .. }
            | Try { span, .. }
            | MethodCall { span, .. } => *span,
            Closure(c) => c.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    /// `case pat:` — the pattern is kept as opaque text plus an
    /// optional binding name; full pattern matching is the parser's
    /// concern upstream, the lowering pass only needs discriminator
    /// text and a binding slot.
    pub pattern_text: String,
    pub binding: Option<Ident>,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Vec<Stmt>, Span),
    Expr(Expr, Span),
    Decl(Decl),
    Return(Option<Expr>, Span),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    Nursery {
        body: Box<Stmt>,
        span: Span,
    },
    Spawn {
        expr: Expr,
        span: Span,
    },
    Defer {
        stmt: Box<Stmt>,
        span: Span,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
        span: Span,
    },
    WithDeadline {
        expr: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// Raw, already-C text a pass wants to splice in verbatim (used by
    /// the small textual passes in `passes::small` and by codegen
    /// stages that synthesize new statements rather than rewriting
    /// existing ones). Never produced by anything upstream of this
    /// crate.
    Verbatim(String, Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        use Stmt::*;
        match self {
            Block(_, s) | Return(_, s) | Break(s) | Continue(s) | Verbatim(_, s) => *s,
            Expr(_, s) => *s,
            Decl(d) => d.span,
            If { span, .. }
            | For { span, .. }
            | While { span, .. }
            | Nursery { span, .. }
            | Spawn { span, .. }
            | Defer { span, .. }
            | Match { span, .. }
            | WithDeadline { span, .. } => *span,
        }
    }
}

bitflags! {
    /// Per-function attribute bitset.
    #[derive(Default)]
    pub struct FnAttrs: u32 {
        const ASYNC    = 0b0001;
        const NOBLOCK  = 0b0010;
        /// Attributes the pass couldn't resolve (e.g. an unrecognized
        /// callee declared only via a prototype with no body in this
        /// translation unit). Treated as blocking by the auto-blocking
        /// pass.
        const UNKNOWN  = 0b0100;
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: TypeExpr,
    pub body: Option<Vec<Stmt>>,
    pub attrs: FnAttrs,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct RecordDecl {
    pub name: Option<Ident>,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: Ident,
    pub value: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: Option<Ident>,
    pub variants: Vec<EnumVariant>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Item {
    Function(FunctionDecl),
    Typedef {
        name: Ident,
        ty: TypeExpr,
        span: Span,
    },
    Struct(RecordDecl),
    Union(RecordDecl),
    Enum(EnumDecl),
    Include {
        path: String,
        system: bool,
        span: Span,
    },
    Verbatim(String, Span),
}

impl Item {
    pub fn span(&self) -> Span {
        match self {
            Item::Function(f) => f.span,
            Item::Typedef { span, .. } => *span,
            Item::Struct(r) | Item::Union(r) => r.span,
            Item::Enum(e) => e.span,
            Item::Include { span, .. } => *span,
            Item::Verbatim(_, span) => *span,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Item::Function(f) => Some(f.name.as_str()),
            Item::Typedef { name, .. } => Some(name.as_str()),
            Item::Struct(r) | Item::Union(r) => r.name.as_ref().map(Ident::as_str),
            Item::Enum(e) => e.name.as_ref().map(Ident::as_str),
            Item::Include { .. } | Item::Verbatim(..) => None,
        }
    }
}

/// One captured binding of a lowered closure.
#[derive(Debug, Clone)]
pub struct Capture {
    pub name: Ident,
    pub ty: ty::CapturedType,
}

/// A closure definition recorded in the file's side table, keyed by a
/// stable integer id. The original literal is gone from the tree by
/// the time this exists in
/// its final form; the definition is what the emitter consults to
/// generate the env struct, drop function, entry function and `make`
/// function.
#[derive(Debug, Clone)]
pub struct ClosureDef {
    pub id: u32,
    pub params: Vec<Ident>,
    pub captures: Vec<Capture>,
    pub body: Stmt,
    pub is_block: bool,
    pub span: Span,
}

impl ClosureDef {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// The side table of every closure lowered in one file, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ClosureTable {
    defs: Vec<ClosureDef>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, def: ClosureDef) {
        debug_assert_eq!(def.id as usize, self.defs.len(), "closure ids must be assigned in order");
        self.defs.push(def);
    }

    pub fn get(&self, id: u32) -> Option<&ClosureDef> {
        self.defs.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClosureDef> {
        self.defs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn next_id(&self) -> u32 {
        self.defs.len() as u32
    }

    /// Mutates one definition's body in place by id. Used by the
    /// nested-closure call rewrite, the only place that needs to reach
    /// back into an already-recorded definition after the fact.
    pub fn with_body_mut<F: FnOnce(&mut Stmt)>(&mut self, id: u32, f: F) {
        if let Some(def) = self.defs.get_mut(id as usize) {
            f(&mut def.body);
        }
    }
}

/// One compile unit: an ordered sequence of top-level items plus the
/// side tables later passes populate.
#[derive(Debug, Clone)]
pub struct File {
    pub filename: String,
    pub file_id: crate::span::FileId,
    pub items: Vec<Item>,
    pub closures: ClosureTable,
}

impl File {
    pub fn new(filename: impl Into<String>, file_id: crate::span::FileId, items: Vec<Item>) -> Self {
        File {
            filename: filename.into(),
            file_id,
            items,
            closures: ClosureTable::new(),
        }
    }

    /// File-scope declaration names — never captures, since any
    /// reference to one of these resolves directly rather than through
    /// a closure environment.
    pub fn global_names(&self) -> crate::strset::StringSet {
        let mut set = crate::strset::StringSet::new();
        for item in &self.items {
            if let Some(name) = item.name() {
                set.insert(name.to_string());
            }
        }
        set
    }
}

//! The small, single-scan syntactic lowerings: `with_deadline { }`,
//! `@match { }`, `try expr`, and non-interface `T?`/`T!E`/`T[:]` type
//! syntax. Each is independent of the others and of the core passes;
//! they all route their rewrites through plain tree mutation here
//! (rather than the edit buffer directly) since they run on the same
//! in-memory `File` the core passes mutate — the edit buffer is the C
//! emitter's concern once the tree reaches its final shape.

use crate::ast::ty::{TypeExpr, TypeShape};
use crate::ast::{BinOp, Decl, Expr, File, Item, MatchArm, Stmt};
use crate::ident::Ident;
use crate::runtime;
use crate::span::Span;

/// Runs every small pass over `file` in sequence. Order among these
/// four doesn't matter — none of their rewrites can nest inside one
/// another's output in a way that changes the result — so they're
/// sequenced here purely for a single, predictable pass count.
pub fn run(file: &mut File) {
    for item in &mut file.items {
        if let Item::Function(f) = item {
            if let Some(body) = &mut f.body {
                for stmt in body.iter_mut() {
                    lower_stmt(stmt);
                }
            }
            mangle_type_syntax(&mut f.return_type);
            for p in &mut f.params {
                mangle_type_syntax(&mut p.ty);
            }
        }
    }
}

fn lower_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter_mut().for_each(lower_stmt),
        Stmt::Expr(e, _) => lower_expr(e),
        Stmt::Decl(d) => {
            mangle_type_syntax_opt(&mut d.ty);
            if let Some(init) = &mut d.init {
                lower_expr(init);
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                lower_expr(e);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            lower_expr(cond);
            lower_stmt(then_branch);
            if let Some(e) = else_branch {
                lower_stmt(e);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                lower_stmt(init);
            }
            if let Some(cond) = cond {
                lower_expr(cond);
            }
            if let Some(post) = post {
                lower_expr(post);
            }
            lower_stmt(body);
        }
        Stmt::While { cond, body, .. } => {
            lower_expr(cond);
            lower_stmt(body);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => lower_stmt(body),
        Stmt::Spawn { expr, .. } => lower_expr(expr),
        Stmt::Defer { stmt, .. } => lower_stmt(stmt),
        Stmt::Match { .. } => {
            let (scrutinee, arms, span) = take_match(stmt);
            *stmt = lower_match(scrutinee, arms, span);
            // The freshly-synthesized if/else chain may itself contain
            // nested statements (arm bodies) that still need the other
            // small-pass rewrites (try/with_deadline/type-syntax), so
            // walk it once more now that it's no longer a `Match` node.
            lower_stmt(stmt);
        }
        Stmt::WithDeadline { .. } => {
            let (expr, body, span) = take_with_deadline(stmt);
            *stmt = lower_with_deadline(expr, body, span);
            lower_stmt(stmt);
        }
    }
}

fn lower_expr(expr: &mut Expr) {
    match expr {
        Expr::Try { .. } => {
            let (inner, span) = take_try(expr);
            *expr = lower_try(inner, span);
        }
        Expr::Call { callee, args, .. } => {
            lower_expr(callee);
            args.iter_mut().for_each(lower_expr);
        }
        Expr::Field { base, .. } => lower_expr(base),
        Expr::Index { base, index, .. } => {
            lower_expr(base);
            lower_expr(index);
        }
        Expr::Binary { lhs, rhs, .. } => {
            lower_expr(lhs);
            lower_expr(rhs);
        }
        Expr::Unary { expr, .. } => lower_expr(expr),
        Expr::Cast { ty, expr, .. } => {
            mangle_type_syntax(ty);
            lower_expr(expr);
        }
        Expr::CompoundLiteral { ty, fields, .. } => {
            mangle_type_syntax(ty);
            fields.iter_mut().for_each(|(_, v)| lower_expr(v));
        }
        Expr::SizeofType { ty, .. } => mangle_type_syntax(ty),
        Expr::SizeofExpr { expr, .. } => lower_expr(expr),
        Expr::Await { expr, .. } => lower_expr(expr),
        Expr::Closure(c) => lower_stmt(&mut c.body),
        Expr::MethodCall { receiver, args, .. } => {
            lower_expr(receiver);
            args.iter_mut().for_each(lower_expr);
        }
        Expr::Ident(_) | Expr::IntLiteral { .. } | Expr::StringLiteral { .. } => {}
    }
}

fn mangle_type_syntax_opt(ty: &mut Option<TypeExpr>) {
    if let Some(ty) = ty {
        mangle_type_syntax(ty);
    }
}

/// Rewrites `T[:]`/`T?`/`T!E` in non-interface source to the same
/// mangled names the header pipeline produces (`passes::header`),
/// without collecting an instantiation — a source file only consumes
/// types a header already declared, so nothing here feeds a
/// declaration block.
fn mangle_type_syntax(ty: &mut TypeExpr) {
    match &mut ty.shape {
        TypeShape::Result(ok, err) => {
            mangle_type_syntax(ok);
            mangle_type_syntax(err);
            let mangled = format!("CCResult_{}_{}", mangle_fragment(&ok.text), mangle_fragment(&err.text));
            *ty = TypeExpr::opaque(mangled);
        }
        TypeShape::Optional(inner) => {
            mangle_type_syntax(inner);
            let mangled = format!("CCOptional_{}", mangle_fragment(&inner.text));
            *ty = TypeExpr::opaque(mangled);
        }
        TypeShape::Slice(inner) => {
            mangle_type_syntax(inner);
            *ty = TypeExpr::opaque("CCSlice");
        }
        TypeShape::Opaque => {}
    }
}

fn mangle_fragment(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| if c.is_whitespace() || "*<>[],".contains(c) { '_' } else { c })
        .collect()
}

fn take_try(expr: &mut Expr) -> (Box<Expr>, Span) {
    let span = expr.span();
    let placeholder = Expr::IntLiteral { value: 0, span };
    match std::mem::replace(expr, placeholder) {
        Expr::Try { expr, span } => (expr, span),
        _ => unreachable!("take_try called on a non-try expression"),
    }
}

/// `try expr` becomes `cc_try(expr)` — the runtime helper that
/// unwraps a result or propagates the error out of the enclosing
/// function, per spec.md §4.8.
fn lower_try(mut inner: Box<Expr>, span: Span) -> Expr {
    lower_expr(&mut inner);
    Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::TRY_HELPER, span))),
        args: vec![*inner],
        span,
    }
}

fn take_match(stmt: &mut Stmt) -> (Expr, Vec<MatchArm>, Span) {
    let span = stmt.span();
    let placeholder = Stmt::Verbatim(String::new(), span);
    match std::mem::replace(stmt, placeholder) {
        Stmt::Match { scrutinee, arms, span } => (scrutinee, arms, span),
        _ => unreachable!("take_match called on a non-match statement"),
    }
}

/// `@match { case pat: body, ... }` becomes a chain of
/// `if (tag == pat) { binding = scrutinee; body } else if (...) { ... }`,
/// over the scrutinee's tag discriminator. Each arm's pattern text is
/// carried through as-is (full pattern compilation is upstream of this
/// crate); only the discriminator comparison and optional binding are
/// synthesized here.
fn lower_match(scrutinee: Expr, arms: Vec<MatchArm>, span: Span) -> Stmt {
    let scrutinee_name = format!("__cc_match_scrutinee_{}", span.start);
    let scrutinee_decl = Stmt::Decl(Decl {
        name: Ident::new(scrutinee_name.clone(), span),
        ty: None,
        init: Some(scrutinee),
        span,
    });

    let mut chain: Option<Stmt> = None;
    for arm in arms.into_iter().rev() {
        let mut then_stmts = Vec::new();
        if let Some(binding) = &arm.binding {
            then_stmts.push(Stmt::Decl(Decl {
                name: binding.clone(),
                ty: None,
                init: Some(Expr::Ident(Ident::new(scrutinee_name.clone(), arm.span))),
                span: arm.span,
            }));
        }
        then_stmts.push(*arm.body);

        chain = Some(if arm.pattern_text.trim() == "_" {
            Stmt::Block(then_stmts, arm.span)
        } else {
            Stmt::If {
                cond: Expr::Binary {
                    op: BinOp::Eq,
                    lhs: Box::new(Expr::Ident(Ident::new(scrutinee_name.clone(), arm.span))),
                    rhs: Box::new(Expr::Ident(Ident::new(arm.pattern_text.clone(), arm.span))),
                    span: arm.span,
                },
                then_branch: Box::new(Stmt::Block(then_stmts, arm.span)),
                else_branch: chain.map(Box::new),
                span: arm.span,
            }
        });
    }

    Stmt::Block(vec![scrutinee_decl, chain.unwrap_or_else(|| Stmt::Block(vec![], span))], span)
}

fn take_with_deadline(stmt: &mut Stmt) -> (Expr, Box<Stmt>, Span) {
    let span = stmt.span();
    let placeholder = Stmt::Verbatim(String::new(), span);
    match std::mem::replace(stmt, placeholder) {
        Stmt::WithDeadline { expr, body, span } => (expr, body, span),
        _ => unreachable!("take_with_deadline called on a non-with_deadline statement"),
    }
}

/// `with_deadline(expr) { body }` becomes a block that pushes the
/// deadline derived from `expr` and registers a scoped pop via
/// `defer`, per spec.md §4.8 — the defer-injection machinery the
/// structured-concurrency pass relies on for nursery close is reused
/// here for the deadline-stack pop.
fn lower_with_deadline(mut expr: Expr, body: Box<Stmt>, span: Span) -> Stmt {
    lower_expr(&mut expr);

    let deadline_call = Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::DEADLINE_AFTER_MS, span))),
        args: vec![expr],
        span,
    };
    let handle = Ident::new(format!("__cc_deadline_{}", span.start), span);
    let decl = Stmt::Decl(Decl {
        name: handle.clone(),
        ty: Some(TypeExpr::opaque("CCDeadline")),
        init: Some(deadline_call),
        span,
    });
    let push_call = Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::DEADLINE_PUSH, span))),
        args: vec![Expr::Ident(handle.clone())],
        span,
    };
    let push_stmt = Stmt::Expr(push_call, span);
    let pop_call = Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::DEADLINE_POP, span))),
        args: vec![],
        span,
    };
    let defer = Stmt::Defer { stmt: Box::new(Stmt::Expr(pop_call, span)), span };

    Stmt::Block(vec![decl, push_stmt, defer, *body], span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FnAttrs;
    use crate::span::FileId;

    fn sp(a: u32, b: u32) -> Span {
        Span::new(FileId(0), a, b)
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name, sp(0, 1))
    }

    #[test]
    fn try_expr_becomes_cc_try_call() {
        let mut e = Expr::Try { expr: Box::new(Expr::Ident(ident("x"))), span: sp(0, 5) };
        lower_expr(&mut e);
        match e {
            Expr::Call { callee, args, .. } => {
                assert!(matches!(callee.as_ref(), Expr::Ident(i) if i.as_str() == runtime::TRY_HELPER));
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected a cc_try call, got {:?}", other),
        }
    }

    #[test]
    fn with_deadline_pushes_and_defers_pop() {
        let mut stmt = Stmt::WithDeadline {
            expr: Expr::IntLiteral { value: 500, span: sp(0, 1) },
            body: Box::new(Stmt::Return(None, sp(0, 1))),
            span: sp(0, 1),
        };
        lower_stmt(&mut stmt);
        match &stmt {
            Stmt::Block(stmts, _) => {
                assert_eq!(stmts.len(), 4);
                assert!(matches!(&stmts[0], Stmt::Decl(_)));
                assert!(matches!(&stmts[2], Stmt::Defer { .. }));
            }
            other => panic!("expected a block, got {:?}", other),
        }
    }

    #[test]
    fn match_lowers_to_if_else_chain_over_tag() {
        let arms = vec![
            MatchArm { pattern_text: "1".to_string(), binding: None, body: Box::new(Stmt::Return(None, sp(0, 1))), span: sp(0, 1) },
            MatchArm { pattern_text: "_".to_string(), binding: None, body: Box::new(Stmt::Break(sp(0, 1))), span: sp(0, 1) },
        ];
        let mut stmt = Stmt::Match { scrutinee: Expr::Ident(ident("tag")), arms, span: sp(0, 1) };
        lower_stmt(&mut stmt);
        match &stmt {
            Stmt::Block(stmts, _) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(&stmts[0], Stmt::Decl(_)));
                assert!(matches!(&stmts[1], Stmt::If { .. }));
            }
            other => panic!("expected a block, got {:?}", other),
        }
    }

    #[test]
    fn type_syntax_mangles_optional_and_result_in_signatures() {
        use crate::ast::{FunctionDecl, Param};
        let mut f = FunctionDecl {
            name: ident("f"),
            params: vec![Param { name: ident("x"), ty: TypeExpr::optional("int?", TypeExpr::opaque("int")) }],
            return_type: TypeExpr::result("int!>(Error)", TypeExpr::opaque("int"), TypeExpr::opaque("Error")),
            body: None,
            attrs: FnAttrs::empty(),
            span: sp(0, 1),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f.clone())]);
        run(&mut file);
        if let Item::Function(lowered) = &file.items[0] {
            f = lowered.clone();
        }
        assert_eq!(f.params[0].ty.text, "CCOptional_int");
        assert_eq!(f.return_type.text, "CCResult_int_Error");
    }
}

//! Lowers `@nursery { body }` into an open/close pair guaranteed to run
//! on every exit path, and `spawn(expr)` into a submission against the
//! lexically innermost nursery handle.
//!
//! Runs independently of pipeline order relative to the closure pass:
//! a spawned expression may already be a closure `make` call, or still
//! be a bare closure literal the closure pass has yet to lower. Either
//! way this pass only needs to know the spawned expression is some
//! zero-argument closure value; it validates that much when the
//! expression is still a literal and defers otherwise.

use crate::ast::{Decl, Expr, File, Item, Stmt};
use crate::error::{err, ok, CompileError, CompileResult, CompileWarning, Warning};
use crate::ident::Ident;
use crate::runtime;
use crate::span::Span;

pub fn run(file: &mut File) -> CompileResult<()> {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let mut counter = 0u32;

    for item in &mut file.items {
        if let Item::Function(f) = item {
            if let Some(body) = &mut f.body {
                let mut stack: Vec<Ident> = Vec::new();
                for stmt in body.iter_mut() {
                    lower_stmt(stmt, &mut stack, &mut counter, &mut warnings, &mut errors);
                }
            }
        }
    }

    if errors.is_empty() {
        ok((), warnings, errors)
    } else {
        err(warnings, errors)
    }
}

fn lower_stmt(
    stmt: &mut Stmt,
    stack: &mut Vec<Ident>,
    counter: &mut u32,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    match stmt {
        Stmt::Nursery { .. } => {
            let (mut body, span) = take_nursery(stmt);
            let id = *counter;
            *counter += 1;
            let handle = Ident::new(format!("__cc_nursery_{}", id), span);

            stack.push(handle.clone());
            lower_stmt(&mut body, stack, counter, warnings, errors);
            stack.pop();

            *stmt = wrap_nursery(handle, span, *body);
        }
        Stmt::Spawn { .. } => {
            let span = stmt.span();
            match stack.last().cloned() {
                None => errors.push(CompileError::SpawnOutsideNursery { span }),
                Some(handle) => {
                    let expr = take_spawn_expr(stmt);
                    if let Expr::Closure(lit) = &expr {
                        if !lit.params.is_empty() {
                            errors.push(CompileError::SpawnArgumentNotClosure {
                                name: "<closure literal>".to_string(),
                                span,
                            });
                        }
                    }
                    if let Expr::Call { callee, args, .. } = &expr {
                        if let Expr::Ident(name) = callee.as_ref() {
                            if name.as_str().starts_with("__cc_closure_make_") && args.is_empty() {
                                warnings.push(CompileWarning { span, content: Warning::SpawnWithNoCaptures });
                            }
                        }
                    }
                    let call = Expr::Call {
                        callee: Box::new(Expr::Ident(Ident::new(runtime::NURSERY_SPAWN_CLOSURE0, span))),
                        args: vec![Expr::Ident(handle), expr],
                        span,
                    };
                    *stmt = Stmt::Expr(call, span);
                }
            }
        }
        Stmt::Block(stmts, _) => stmts.iter_mut().for_each(|s| lower_stmt(s, stack, counter, warnings, errors)),
        Stmt::If { then_branch, else_branch, .. } => {
            lower_stmt(then_branch, stack, counter, warnings, errors);
            if let Some(e) = else_branch {
                lower_stmt(e, stack, counter, warnings, errors);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                lower_stmt(init, stack, counter, warnings, errors);
            }
            lower_stmt(body, stack, counter, warnings, errors);
        }
        Stmt::While { body, .. } => lower_stmt(body, stack, counter, warnings, errors),
        Stmt::Defer { stmt, .. } => lower_stmt(stmt, stack, counter, warnings, errors),
        Stmt::Match { arms, .. } => {
            for arm in arms {
                lower_stmt(&mut arm.body, stack, counter, warnings, errors);
            }
        }
        Stmt::WithDeadline { body, .. } => lower_stmt(body, stack, counter, warnings, errors),
        Stmt::Expr(..)
        | Stmt::Decl(_)
        | Stmt::Return(..)
        | Stmt::Break(_)
        | Stmt::Continue(_)
        | Stmt::Verbatim(..) => {}
    }
}

fn take_nursery(stmt: &mut Stmt) -> (Box<Stmt>, Span) {
    let placeholder = Stmt::Verbatim(String::new(), stmt.span());
    match std::mem::replace(stmt, placeholder) {
        Stmt::Nursery { body, span } => (body, span),
        _ => unreachable!("take_nursery called on a non-nursery statement"),
    }
}

fn take_spawn_expr(stmt: &mut Stmt) -> Expr {
    let span = stmt.span();
    let placeholder = Stmt::Verbatim(String::new(), span);
    match std::mem::replace(stmt, placeholder) {
        Stmt::Spawn { expr, .. } => expr,
        _ => unreachable!("take_spawn_expr called on a non-spawn statement"),
    }
}

/// `{ CCNursery* h = cc_nursery_open(); defer cc_nursery_close(h); <body> }`
fn wrap_nursery(handle: Ident, span: Span, body: Stmt) -> Stmt {
    let open_call = Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::NURSERY_OPEN, span))),
        args: vec![],
        span,
    };
    let decl = Stmt::Decl(Decl {
        name: handle.clone(),
        ty: Some(crate::ast::ty::TypeExpr::opaque("CCNursery*")),
        init: Some(open_call),
        span,
    });
    let close_call = Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::NURSERY_CLOSE, span))),
        args: vec![Expr::Ident(handle)],
        span,
    };
    let defer = Stmt::Defer { stmt: Box::new(Stmt::Expr(close_call, span)), span };
    Stmt::Block(vec![decl, defer, body], span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClosureLiteral, FunctionDecl, FnAttrs};
    use crate::ast::ty::TypeExpr;
    use crate::span::FileId;

    fn sp(a: u32, b: u32) -> Span {
        Span::new(FileId(0), a, b)
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name, sp(0, 1))
    }

    #[test]
    fn nursery_wraps_body_with_open_close_defer() {
        let spawn_target = Expr::Call {
            callee: Box::new(Expr::Ident(ident("__cc_closure_make_0"))),
            args: vec![],
            span: sp(0, 1),
        };
        let nursery_body = Stmt::Block(vec![Stmt::Spawn { expr: spawn_target, span: sp(0, 1) }], sp(0, 1));
        let mut body = vec![Stmt::Nursery { body: Box::new(nursery_body), span: sp(0, 1) }];

        let func = FunctionDecl {
            name: ident("f"),
            params: vec![],
            return_type: TypeExpr::opaque("void"),
            body: Some(std::mem::take(&mut body)),
            attrs: FnAttrs::empty(),
            span: sp(0, 1),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(func)]);
        let res = run(&mut file);
        assert!(res.is_ok(), "{:?}", res.errors);

        if let Item::Function(f) = &file.items[0] {
            let body = f.body.as_ref().unwrap();
            match &body[0] {
                Stmt::Block(stmts, _) => {
                    assert_eq!(stmts.len(), 3);
                    assert!(matches!(&stmts[0], Stmt::Decl(_)));
                    assert!(matches!(&stmts[1], Stmt::Defer { .. }));
                    match &stmts[2] {
                        Stmt::Block(inner, _) => match &inner[0] {
                            Stmt::Expr(Expr::Call { callee, args, .. }, _) => {
                                assert!(matches!(callee.as_ref(), Expr::Ident(i) if i.as_str() == runtime::NURSERY_SPAWN_CLOSURE0));
                                assert_eq!(args.len(), 2);
                            }
                            other => panic!("expected a rewritten spawn call, got {:?}", other),
                        },
                        other => panic!("expected nested block for nursery body, got {:?}", other),
                    }
                }
                other => panic!("expected nursery to lower into a block, got {:?}", other),
            }
        }
    }

    #[test]
    fn spawn_outside_nursery_is_fatal() {
        let lit = Expr::Closure(ClosureLiteral {
            params: vec![],
            is_block: true,
            body: Box::new(Stmt::Return(None, sp(0, 1))),
            span: sp(0, 1),
        });
        let mut body = vec![Stmt::Spawn { expr: lit, span: sp(0, 1) }];
        let func = FunctionDecl {
            name: ident("f"),
            params: vec![],
            return_type: TypeExpr::opaque("void"),
            body: Some(std::mem::take(&mut body)),
            attrs: FnAttrs::empty(),
            span: sp(0, 1),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(func)]);
        let res = run(&mut file);
        assert!(!res.is_ok());
        assert!(matches!(res.errors[0], CompileError::SpawnOutsideNursery { .. }));
    }
}

//! Uniform function call syntax: `receiver.method(args)` becomes
//! `method(receiver, args)`.
//!
//! Name resolution is lexical-syntactic only — the pass never checks
//! that `method` is actually a declared free function; that's left to
//! the downstream C compiler.

use crate::ast::{Expr, File, Item, Stmt};

/// Rewrites every `Expr::MethodCall` in `file` into an `Expr::Call`
/// whose first argument is the cloned receiver. Recurses into every
/// nested expression and statement, including closure literal bodies
/// still embedded in the tree, which is what makes running this pass
/// once, before the closure pass, sufficient on its own.
pub fn run(file: &mut File) {
    for item in &mut file.items {
        if let Item::Function(f) = item {
            if let Some(body) = &mut f.body {
                for stmt in body.iter_mut() {
                    rewrite_stmt(stmt);
                }
            }
        }
    }
}

pub fn rewrite_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter_mut().for_each(rewrite_stmt),
        Stmt::Expr(e, _) => rewrite_expr(e),
        Stmt::Decl(d) => {
            if let Some(init) = &mut d.init {
                rewrite_expr(init);
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                rewrite_expr(e);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            rewrite_expr(cond);
            rewrite_stmt(then_branch);
            if let Some(e) = else_branch {
                rewrite_stmt(e);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                rewrite_stmt(init);
            }
            if let Some(cond) = cond {
                rewrite_expr(cond);
            }
            if let Some(post) = post {
                rewrite_expr(post);
            }
            rewrite_stmt(body);
        }
        Stmt::While { cond, body, .. } => {
            rewrite_expr(cond);
            rewrite_stmt(body);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => rewrite_stmt(body),
        Stmt::Spawn { expr, .. } => rewrite_expr(expr),
        Stmt::Defer { stmt, .. } => rewrite_stmt(stmt),
        Stmt::Match { scrutinee, arms, .. } => {
            rewrite_expr(scrutinee);
            for arm in arms {
                rewrite_stmt(&mut arm.body);
            }
        }
        Stmt::WithDeadline { expr, body, .. } => {
            rewrite_expr(expr);
            rewrite_stmt(body);
        }
    }
}

pub fn rewrite_expr(expr: &mut Expr) {
    // Rewrite children first (bottom-up), then the node itself, so a
    // chain like `a.b().c()` ends up fully free-function-form.
    match expr {
        Expr::Call { callee, args, .. } => {
            rewrite_expr(callee);
            args.iter_mut().for_each(rewrite_expr);
        }
        Expr::Field { base, .. } => rewrite_expr(base),
        Expr::Index { base, index, .. } => {
            rewrite_expr(base);
            rewrite_expr(index);
        }
        Expr::Binary { lhs, rhs, .. } => {
            rewrite_expr(lhs);
            rewrite_expr(rhs);
        }
        Expr::Unary { expr, .. } => rewrite_expr(expr),
        Expr::Cast { expr, .. } => rewrite_expr(expr),
        Expr::CompoundLiteral { fields, .. } => {
            for (_, v) in fields.iter_mut() {
                rewrite_expr(v);
            }
        }
        Expr::SizeofExpr { expr, .. } => rewrite_expr(expr),
        Expr::Await { expr, .. } => rewrite_expr(expr),
        Expr::Try { expr, .. } => rewrite_expr(expr),
        Expr::Closure(c) => rewrite_stmt(&mut c.body),
        Expr::MethodCall { receiver, method, args, span } => {
            rewrite_expr(receiver);
            args.iter_mut().for_each(rewrite_expr);

            let mut new_args = Vec::with_capacity(args.len() + 1);
            new_args.push((**receiver).clone());
            new_args.append(args);

            *expr = Expr::Call {
                callee: Box::new(Expr::Ident(method.clone())),
                args: new_args,
                span: *span,
            };
        }
        Expr::Ident(_) | Expr::IntLiteral { .. } | Expr::StringLiteral { .. } | Expr::SizeofType { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Ident;
    use crate::span::{FileId, Span};

    fn sp(a: u32, b: u32) -> Span {
        Span::new(FileId(0), a, b)
    }

    #[test]
    fn method_call_becomes_free_function_call_with_receiver_first() {
        let mut e = Expr::MethodCall {
            receiver: Box::new(Expr::Ident(Ident::new("slice", sp(0, 5)))),
            method: Ident::new("push", sp(6, 10)),
            args: vec![Expr::IntLiteral { value: 42, span: sp(11, 13) }],
            span: sp(0, 14),
        };
        rewrite_expr(&mut e);
        match e {
            Expr::Call { callee, args, .. } => {
                assert!(matches!(*callee, Expr::Ident(ref i) if i.as_str() == "push"));
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[0], Expr::Ident(i) if i.as_str() == "slice"));
            }
            _ => panic!("expected a Call node"),
        }
    }

    #[test]
    fn no_method_call_nodes_survive_in_a_tree_with_none() {
        let mut e = Expr::Binary {
            op: crate::ast::BinOp::Add,
            lhs: Box::new(Expr::IntLiteral { value: 1, span: sp(0, 1) }),
            rhs: Box::new(Expr::IntLiteral { value: 2, span: sp(2, 3) }),
            span: sp(0, 3),
        };
        let before = format!("{:?}", e);
        rewrite_expr(&mut e);
        assert_eq!(before, format!("{:?}", e));
    }
}

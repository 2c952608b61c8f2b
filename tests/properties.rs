//! Cross-cutting invariants from spec.md §8 that don't belong to any
//! one pass's own unit tests: whole-pipeline no-op behavior, the
//! make-call/capture-count correspondence, the task-slot lower bound,
//! and `same_file`'s reflexive/symmetric path matching.
//!
//! Built against hand-constructed trees, like every other test in this
//! crate — there is no parser in scope.

use assert_matches::assert_matches;

use cc_core::ast::ty::TypeExpr;
use cc_core::ast::{BinOp, Decl, Expr, File, FnAttrs, FunctionDecl, Item, Param, Stmt};
use cc_core::editbuffer::{Edit, EditBuffer};
use cc_core::error::CompileError;
use cc_core::ident::Ident;
use cc_core::passes::{async_sm, closure};
use cc_core::source_map::same_file;
use cc_core::span::{FileId, Span};

fn sp() -> Span {
    Span::new(FileId(0), 0, 1)
}

fn ident(name: &str) -> Ident {
    Ident::new(name, sp())
}

fn trivial_file(body: Vec<Stmt>, attrs: FnAttrs) -> File {
    let f = FunctionDecl {
        name: ident("f"),
        params: vec![Param { name: ident("n"), ty: TypeExpr::opaque("int") }],
        return_type: TypeExpr::opaque("int"),
        body: Some(body),
        attrs,
        span: sp(),
    };
    File::new("t.ccs", FileId(0), vec![Item::Function(f)])
}

#[test]
fn closure_pass_is_a_no_op_with_no_closure_literals() {
    let body = vec![Stmt::Return(Some(Expr::IntLiteral { value: 1, span: sp() }), sp())];
    let mut file = trivial_file(body, FnAttrs::empty());
    let before = format!("{:?}", file.items);

    let res = closure::run(&mut file);

    assert!(res.is_ok());
    assert!(file.closures.is_empty());
    assert_eq!(format!("{:?}", file.items), before, "closure pass mutated a tree with no closure literals");
}

#[test]
fn async_pass_is_a_no_op_with_no_async_function() {
    let body = vec![Stmt::Return(Some(Expr::IntLiteral { value: 1, span: sp() }), sp())];
    let mut file = trivial_file(body, FnAttrs::empty());
    let before = format!("{:?}", file.items);

    let res = async_sm::run(&mut file);

    assert!(res.is_ok());
    assert_eq!(format!("{:?}", file.items), before, "async pass touched a non-async function");
}

#[test]
fn make_call_argument_count_matches_recorded_captures() {
    // int a = 1; int b = 2; CCClosure0 c = () => { return a + b; };
    let closure_body = Stmt::Block(
        vec![Stmt::Return(
            Some(Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Ident(ident("a"))),
                rhs: Box::new(Expr::Ident(ident("b"))),
                span: sp(),
            }),
            sp(),
        )],
        sp(),
    );
    let body = vec![
        Stmt::Decl(Decl { name: ident("a"), ty: Some(TypeExpr::opaque("int")), init: Some(Expr::IntLiteral { value: 1, span: sp() }), span: sp() }),
        Stmt::Decl(Decl { name: ident("b"), ty: Some(TypeExpr::opaque("int")), init: Some(Expr::IntLiteral { value: 2, span: sp() }), span: sp() }),
        Stmt::Decl(Decl {
            name: ident("c"),
            ty: None,
            init: Some(Expr::Closure(cc_core::ast::ClosureLiteral {
                params: vec![],
                is_block: true,
                body: Box::new(closure_body),
                span: sp(),
            })),
            span: sp(),
        }),
    ];
    let f = FunctionDecl { name: ident("f"), params: vec![], return_type: TypeExpr::opaque("void"), body: Some(body), attrs: FnAttrs::empty(), span: sp() };
    let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);

    let res = closure::run(&mut file);
    assert!(res.is_ok(), "{:?}", res.errors);

    assert_eq!(file.closures.iter().count(), 1);
    let def = file.closures.get(0).unwrap();

    // the make call that replaced the literal carries exactly one
    // argument per recorded capture, in the same order.
    if let Item::Function(func) = &file.items[0] {
        let decl = match &func.body.as_ref().unwrap()[2] {
            Stmt::Decl(d) => d,
            other => panic!("expected decl, got {:?}", other),
        };
        match decl.init.as_ref().unwrap() {
            Expr::Call { args, .. } => {
                assert_eq!(args.len(), def.captures.len());
                for (arg, cap) in args.iter().zip(def.captures.iter()) {
                    match arg {
                        Expr::Ident(i) => assert_eq!(i.as_str(), cap.name.as_str()),
                        other => panic!("expected a bare ident argument, got {:?}", other),
                    }
                }
            }
            other => panic!("expected a rewritten make call, got {:?}", other),
        }
    }
}

#[test]
fn task_slot_count_is_at_least_the_outstanding_await_count() {
    // @async int f(int n) { int k = await g(n); int m = await h(n); return k + m; }
    let body = vec![
        Stmt::Decl(Decl {
            name: ident("k"),
            ty: Some(TypeExpr::opaque("int")),
            init: Some(Expr::Await {
                expr: Box::new(Expr::Call { callee: Box::new(Expr::Ident(ident("g"))), args: vec![Expr::Ident(ident("n"))], span: sp() }),
                span: sp(),
            }),
            span: sp(),
        }),
        Stmt::Decl(Decl {
            name: ident("m"),
            ty: Some(TypeExpr::opaque("int")),
            init: Some(Expr::Await {
                expr: Box::new(Expr::Call { callee: Box::new(Expr::Ident(ident("h"))), args: vec![Expr::Ident(ident("n"))], span: sp() }),
                span: sp(),
            }),
            span: sp(),
        }),
        Stmt::Return(
            Some(Expr::Binary { op: BinOp::Add, lhs: Box::new(Expr::Ident(ident("k"))), rhs: Box::new(Expr::Ident(ident("m"))), span: sp() }),
            sp(),
        ),
    ];
    let mut file = trivial_file(body, FnAttrs::ASYNC);

    let res = async_sm::run(&mut file);
    assert!(res.is_ok(), "{:?}", res.errors);

    match &file.items[0] {
        Item::Verbatim(text, _) => {
            // two sequential awaits need at least two outstanding task
            // slots recorded in the frame.
            assert!(text.contains("CCTaskIntptr __cc_task_0"));
            assert!(text.contains("CCTaskIntptr __cc_task_1"));
        }
        other => panic!("expected the async function to lower into verbatim C text, got {:?}", other),
    }
}

#[test]
fn overlap_detection_triggers_regardless_of_insertion_order() {
    let overlapping_a = Edit::new(Span::new(FileId(0), 2, 8), "x", "ufcs", 0);
    let overlapping_b = Edit::new(Span::new(FileId(0), 4, 10), "y", "closure", 0);

    let mut forward = EditBuffer::new();
    forward.push(overlapping_a.clone());
    forward.push(overlapping_b.clone());
    let forward_err = forward.apply(FileId(0), "0123456789").unwrap_err();
    assert_matches!(forward_err, CompileError::OverlappingEdits { .. });

    let mut backward = EditBuffer::new();
    backward.push(overlapping_b);
    backward.push(overlapping_a);
    let backward_err = backward.apply(FileId(0), "0123456789").unwrap_err();
    assert_matches!(backward_err, CompileError::OverlappingEdits { .. });
}

#[test]
fn same_file_is_reflexive_and_symmetric() {
    use std::path::Path;

    let a = Path::new("src/foo/bar.ccs");
    let b = Path::new("./src/foo/bar.ccs");
    let c = Path::new("other/file.ccs");

    assert!(same_file(a, a), "same_file must be reflexive");
    assert_eq!(same_file(a, b), same_file(b, a), "same_file must be symmetric");
    assert!(same_file(a, b), "two-component suffix agreement must match");
    assert!(!same_file(a, c));
}

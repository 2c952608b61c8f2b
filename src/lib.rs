//! Lowering core for the CC language.
//!
//! A single call to [`pipeline::compile_unit`] takes one already-parsed
//! translation unit — a `.ccs` source file or a `.cch` header, see
//! [`build_config::SourceKind`] — and runs it through the reserved-
//! identifier filter, then the fixed pass order closures, auto-blocking,
//! the async state machine, structured concurrency and the small
//! syntactic passes apply in, before handing the fully-lowered tree to
//! [`emitter::emit_file`]. Header files skip straight from the
//! reserved-identifier filter to the mangling sub-pipeline in
//! `passes::header` instead.
//!
//! This crate has no parser of its own; it operates on an already-built
//! [`ast::File`] and reports every diagnostic through [`error::CompileResult`].

#[macro_use]
pub mod error;

pub mod ast;
pub mod build_config;
pub mod editbuffer;
pub mod emitter;
pub mod ident;
pub mod passes;
pub mod pipeline;
pub mod runtime;
pub mod source_map;
pub mod span;
pub mod strset;

pub use build_config::{BuildConfig, SourceKind};
pub use error::{CompileError, CompileResult, CompileWarning};
pub use ident::Ident;
pub use pipeline::{compile_unit, CompileOutput};
pub use source_map::SourceMap;
pub use span::{FileId, Span};

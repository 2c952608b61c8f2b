//! Diagnostics: `CompileError`, `CompileWarning`, and the
//! `CompileResult<T>` accumulator every pass returns through.
//!
//! A `check!` macro threads warnings/errors out of a nested
//! `CompileResult` and either unwraps the value or runs an
//! early-return arm, alongside plain `ok`/`err` constructors.
//! `CompileError` is a `thiserror` enum rather than a hand-written
//! `Display` impl.

use source_span::{
    fmt::{Formatter, Style},
    Position,
};
use thiserror::Error;

use crate::source_map::SourceMap;
use crate::span::Span;

/// Accumulates non-fatal and fatal diagnostics around an optional
/// value. `None` means a fatal error occurred somewhere in the chain
/// that produced this result; the accompanying `errors` explain why.
#[derive(Debug, Clone)]
pub struct CompileResult<T> {
    pub value: Option<T>,
    pub warnings: Vec<CompileWarning>,
    pub errors: Vec<CompileError>,
}

pub fn ok<T>(value: T, warnings: Vec<CompileWarning>, errors: Vec<CompileError>) -> CompileResult<T> {
    CompileResult {
        value: Some(value),
        warnings,
        errors,
    }
}

pub fn err<T>(warnings: Vec<CompileWarning>, errors: Vec<CompileError>) -> CompileResult<T> {
    CompileResult {
        value: None,
        warnings,
        errors,
    }
}

impl<T> CompileResult<T> {
    pub fn ok(mut self, warnings: &mut Vec<CompileWarning>, errors: &mut Vec<CompileError>) -> Option<T> {
        warnings.append(&mut self.warnings);
        errors.append(&mut self.errors);
        self.value
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CompileResult<U> {
        match self.value {
            None => err(self.warnings, self.errors),
            Some(v) => ok(f(v), self.warnings, self.errors),
        }
    }

    pub fn and_then<U, F: FnOnce(T) -> CompileResult<U>>(mut self, f: F) -> CompileResult<U> {
        match self.value.take() {
            None => err(self.warnings, self.errors),
            Some(v) => {
                let mut next = f(v);
                self.warnings.append(&mut next.warnings);
                self.errors.append(&mut next.errors);
                CompileResult {
                    value: next.value,
                    warnings: self.warnings,
                    errors: self.errors,
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_some()
    }
}

/// Threads a nested `CompileResult` into the caller's warning/error
/// accumulators, evaluating to the inner value, or running
/// `$error_recovery` (typically `return err(warnings, errors)`) when
/// the inner result was fatal.
#[macro_export]
macro_rules! check {
    ($fn_expr:expr, $error_recovery:expr, $warnings:ident, $errors:ident) => {{
        let mut res = $fn_expr;
        $warnings.append(&mut res.warnings);
        $errors.append(&mut res.errors);
        match res.value {
            None => $error_recovery,
            Some(value) => value,
        }
    }};
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Warning {
    /// The auto-blocking batcher found a non-semicolon trailing token
    /// and conservatively disabled batching for the whole function.
    AutoBlockDisabledConservatively { function: String },
    /// A `spawn` closure captures nothing; harmless, but usually a
    /// sign the closure should have been a plain function reference.
    SpawnWithNoCaptures,
    /// A user-written name collided with a reserved `__cc_`/`__CC`
    /// prefix and was renamed before any pass ran.
    ReservedIdentifierRenamed { original: String, renamed: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::AutoBlockDisabledConservatively { function } => write!(
                f,
                "auto-blocking disabled for \"{}\": a trailing non-semicolon token was found in the body",
                function
            ),
            Warning::SpawnWithNoCaptures => write!(f, "spawned closure captures nothing"),
            Warning::ReservedIdentifierRenamed { original, renamed } => {
                write!(f, "\"{}\" collides with a reserved compiler prefix; renamed to \"{}\"", original, renamed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileWarning {
    pub span: Span,
    pub content: Warning,
}

impl CompileWarning {
    pub fn to_friendly_string(&self) -> String {
        self.content.to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompileError {
    #[error("capture \"{name}\" has no resolvable type; widen the binding to integer, pointer, or slice")]
    UnresolvableCaptureType { name: String, span: Span },

    #[error("\"spawn\" used outside any enclosing \"@nursery\" scope")]
    SpawnOutsideNursery { span: Span },

    #[error("unsupported construct inside an \"@async\" function body: {what}")]
    UnsupportedAsyncConstruct { what: String, span: Span },

    #[error("\"{name}\" is not a zero-argument closure handle and cannot be spawned")]
    SpawnArgumentNotClosure { name: String, span: Span },

    #[error("edit from pass \"{a_pass}\" at {a_start}..{a_end} overlaps edit from pass \"{b_pass}\" at {b_start}..{b_end}")]
    OverlappingEdits {
        a_pass: &'static str,
        a_start: u32,
        a_end: u32,
        b_pass: &'static str,
        b_start: u32,
        b_end: u32,
    },

    #[error("edit from pass \"{pass}\" has out-of-range offsets {start}..{end} for a buffer of length {len}")]
    EditOutOfRange {
        pass: &'static str,
        start: u32,
        end: u32,
        len: u32,
    },

    #[error("closure with {arity} parameters is unsupported; the runtime only provides cc_closureN_call for N in 0..=2")]
    ClosureArityUnsupported { arity: usize, span: Span },

    #[error("unknown return-type shape for blocking call fold: {what}")]
    UnfoldableReturnType { what: String, span: Span },

    #[error("internal compiler error: {message}")]
    Internal { message: String, span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        use CompileError::*;
        match self {
            UnresolvableCaptureType { span, .. }
            | SpawnOutsideNursery { span }
            | UnsupportedAsyncConstruct { span, .. }
            | SpawnArgumentNotClosure { span, .. }
            | ClosureArityUnsupported { span, .. }
            | UnfoldableReturnType { span, .. }
            | Internal { span, .. } => *span,
            OverlappingEdits { a_start, a_end, .. } => {
                // Overlap/range errors are not span-carrying in the same
                // sense (they span two edits); report the first one's
                // start as a best-effort anchor for editor jump-to-error.
                Span::new(crate::span::FileId(0), *a_start, *a_end)
            }
            EditOutOfRange { start, end, .. } => Span::new(crate::span::FileId(0), *start, *end),
        }
    }
}

/// Deduplicates a diagnostics vector while preserving first-seen order:
/// warnings and errors are typically grouped by the pass that raised
/// them, and a stdlib sort-then-dedup would scramble that. A hash set
/// alone loses order too, so this buckets by hash and falls back to
/// equality only within a bucket.
pub fn dedup_unsorted<T: PartialEq + std::hash::Hash>(mut data: Vec<T>) -> Vec<T> {
    use smallvec::SmallVec;
    use std::collections::hash_map::{DefaultHasher, Entry, HashMap};
    use std::hash::{Hash, Hasher};

    let mut write_index = 0;
    let mut indexes: HashMap<u64, SmallVec<[usize; 1]>> = HashMap::with_capacity(data.len());
    for read_index in 0..data.len() {
        let hash = {
            let mut hasher = DefaultHasher::new();
            data[read_index].hash(&mut hasher);
            hasher.finish()
        };
        let index_vec = match indexes.entry(hash) {
            Entry::Occupied(oe) => {
                if oe.get().iter().any(|index| data[*index] == data[read_index]) {
                    continue;
                }
                oe.into_mut()
            }
            Entry::Vacant(ve) => ve.insert(SmallVec::new()),
        };
        data.swap(write_index, read_index);
        index_vec.push(write_index);
        write_index += 1;
    }
    data.truncate(write_index);
    data
}

/// Renders one diagnostic as `file:line:col: error: message`, the
/// gcc-compatible shape downstream tooling expects. Follow-up
/// `note:`/`warning:` lines are the caller's responsibility (one line
/// each).
pub fn format_error(sources: &SourceMap, error: &CompileError) -> String {
    format!("{}: error: {}", sources.describe(error.span()), error)
}

pub fn format_warning(sources: &SourceMap, warning: &CompileWarning) -> String {
    format!("{}: warning: {}", sources.describe(warning.span), warning.to_friendly_string())
}

/// Pretty, underlined rendering of a warning against its source
/// buffer, using `source_span`'s formatter against the multi-file
/// `SourceMap` rather than a single borrowed buffer.
pub fn render_snippet(sources: &SourceMap, span: Span, message: &str) -> String {
    let input = sources.text(span.file);
    let chars = input.chars().map(|c| -> Result<char, ()> { Ok(c) });
    let metrics = source_span::DEFAULT_METRICS;
    let buffer = source_span::SourceBuffer::new(chars, Position::default(), metrics);
    for c in buffer.iter() {
        let _ = c;
    }

    let start = sources.span_start(span);
    let end = sources.span_end(span);
    let err_start = Position::new(start.line.saturating_sub(1), start.col.saturating_sub(1));
    let err_end = Position::new(end.line.saturating_sub(1), end.col.saturating_sub(1));
    let err_span = source_span::Span::new(err_start, err_end, err_end.next_column());

    let mut fmt = Formatter::default();
    fmt.add(err_span, Some(message.to_string()), Style::Error);
    fmt.render(buffer.iter(), buffer.span(), &metrics)
        .map(|r| r.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_unsorted_keeps_first_occurrence_order() {
        let data = vec![3, 1, 2, 1, 3, 4];
        assert_eq!(dedup_unsorted(data), vec![3, 1, 2, 4]);
    }

    #[test]
    fn dedup_unsorted_on_compile_warnings_collapses_identical_renames() {
        let span = Span::new(crate::span::FileId(0), 0, 1);
        let a = CompileWarning { span, content: Warning::SpawnWithNoCaptures };
        let b = CompileWarning { span, content: Warning::SpawnWithNoCaptures };
        let c = CompileWarning {
            span,
            content: Warning::ReservedIdentifierRenamed { original: "__cc_x".to_string(), renamed: "user_cc_x".to_string() },
        };
        assert_eq!(dedup_unsorted(vec![a.clone(), b, c.clone()]), vec![a, c]);
    }
}

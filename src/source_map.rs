//! Per-translation-unit file identity and line/column lookup.
//!
//! `file:line:col` lookups go through `line_col::LineColLookup`. Since
//! `Span` here owns no borrow into source text, `SourceMap` owns the
//! buffers directly and builds one `LineColLookup` per registered file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use line_col::LineColLookup;

use crate::span::{FileId, Span};

/// A single `(line, column)` pair, 1-indexed to match gcc's own
/// diagnostic convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub col: usize,
}

impl From<(usize, usize)> for LineCol {
    fn from(o: (usize, usize)) -> Self {
        LineCol { line: o.0, col: o.1 }
    }
}

struct FileEntry {
    path: PathBuf,
    text: String,
}

/// Owns every source buffer touched by one compilation and assigns
/// each a stable `FileId`. Headers pulled in transitively get their
/// own id too, since spans stay file-relative.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<FileEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { files: Vec::new() }
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(FileEntry {
            path: path.into(),
            text: text.into(),
        });
        id
    }

    pub fn path(&self, file: FileId) -> &Path {
        &self.files[file.0 as usize].path
    }

    pub fn text(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].text
    }

    /// Resolves a byte offset to 1-indexed line/column. Offsets past
    /// end-of-file clamp to the last character, since an end position
    /// is conventionally looked up as `end - 1`.
    pub fn line_col(&self, file: FileId, offset: u32) -> LineCol {
        let text = self.text(file);
        let offset = (offset as usize).min(text.len().saturating_sub(1));
        let lookup = LineColLookup::new(text);
        lookup.get(offset).into()
    }

    pub fn span_start(&self, span: Span) -> LineCol {
        self.line_col(span.file, span.start)
    }

    pub fn span_end(&self, span: Span) -> LineCol {
        let end = if span.end == span.start {
            span.end
        } else {
            span.end - 1
        };
        self.line_col(span.file, end)
    }

    /// `file:line:col`, the prefix every diagnostic line uses.
    pub fn describe(&self, span: Span) -> String {
        let lc = self.span_start(span);
        format!("{}:{}:{}", self.path(span.file).display(), lc.line, lc.col)
    }
}

/// `same_file(a, b)`: reflexive, symmetric comparison `passes::header`
/// uses to drop a later `#include` item when an earlier one in the
/// same file already names the same physical header. Two paths match
/// if they are textually equal once normalized, or if their
/// last two path components agree (covers `"foo/bar.cch"` vs
/// `"./foo/bar.cch"` without a full filesystem canonicalization,
/// which would require the file I/O this crate deliberately excludes).
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    let tail = |p: &Path| -> Vec<String> {
        p.components()
            .rev()
            .take(2)
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    };
    let (ta, tb) = (tail(a), tail(b));
    !ta.is_empty() && ta == tb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let mut sm = SourceMap::new();
        let f = sm.add_file("a.ccs", "int x;\nint y;\n");
        let lc = sm.line_col(f, 7);
        assert_eq!(lc, LineCol { line: 2, col: 1 });
    }

    #[test]
    fn same_file_is_reflexive_and_symmetric() {
        let a = Path::new("foo/bar.cch");
        let b = Path::new("./foo/bar.cch");
        assert!(same_file(a, a));
        assert!(same_file(a, b));
        assert!(same_file(b, a));
        assert!(!same_file(a, Path::new("foo/baz.cch")));
    }
}

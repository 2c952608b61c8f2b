//! Collects edits from every pass and applies them to a single source
//! buffer, plus the two append-only generated-code channels.

use std::cmp::Ordering;

use crate::error::CompileError;
use crate::span::{FileId, Span};

#[derive(Debug, Clone)]
pub struct Edit {
    pub span: Span,
    pub replacement: String,
    pub pass: &'static str,
    pub priority: i32,
}

impl Edit {
    pub fn new(span: Span, replacement: impl Into<String>, pass: &'static str, priority: i32) -> Self {
        Edit { span, replacement: replacement.into(), pass, priority }
    }
}

/// One file's worth of pending edits plus its generated-code channels.
/// Created at the start of the rewrite phase, destroyed right after
/// `apply`.
#[derive(Default)]
pub struct EditBuffer {
    edits: Vec<Edit>,
    prototypes: Vec<String>,
    definitions: Vec<String>,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: Edit) {
        // Empty replacement with empty span: discarded silently.
        if edit.replacement.is_empty() && edit.span.is_empty() {
            return;
        }
        self.edits.push(edit);
    }

    /// Appended after the translation unit's include directives.
    pub fn push_prototype(&mut self, text: impl Into<String>) {
        self.prototypes.push(text.into());
    }

    /// Appended at end of file.
    pub fn push_definition(&mut self, text: impl Into<String>) {
        self.definitions.push(text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.prototypes.is_empty() && self.definitions.is_empty()
    }

    /// Checks every pair of edits for overlap. Runs before `apply` so
    /// the caller can report every conflict, not just the first one
    /// encountered during the descending-offset sweep.
    pub fn check_overlaps(&self) -> Result<(), CompileError> {
        // Sort a copy by start so only adjacent entries need checking
        // for pairwise overlap (spans are half-open and the set is
        // checked for overlap, not just adjacency, so this is a
        // standard interval-overlap sweep).
        let mut ordered: Vec<&Edit> = self.edits.iter().collect();
        ordered.sort_by(|a, b| a.span.cmp(&b.span));
        for w in ordered.windows(2) {
            let (a, b) = (w[0], w[1]);
            if a.span.overlaps(&b.span) {
                return Err(CompileError::OverlappingEdits {
                    a_pass: a.pass,
                    a_start: a.span.start,
                    a_end: a.span.end,
                    b_pass: b.pass,
                    b_start: b.span.start,
                    b_end: b.span.end,
                });
            }
        }
        Ok(())
    }

    /// Applies every edit to `source` end-to-start so earlier offsets
    /// stay valid, then returns the rewritten buffer together with the
    /// joined prototypes/definitions streams. Edits with identical
    /// start offsets order by descending priority, then ascending end
    /// offset — the larger, outer span survives.
    pub fn apply(&self, file: FileId, source: &str) -> Result<(String, String, String), CompileError> {
        self.check_overlaps()?;

        let len = source.len() as u32;
        for e in &self.edits {
            if e.span.file != file {
                continue;
            }
            if e.span.end > len {
                return Err(CompileError::EditOutOfRange {
                    pass: e.pass,
                    start: e.span.start,
                    end: e.span.end,
                    len,
                });
            }
        }

        let mut ordered: Vec<&Edit> = self.edits.iter().filter(|e| e.span.file == file).collect();
        ordered.sort_by(|a, b| {
            // Descending start, so the apply loop walks back-to-front.
            match b.span.start.cmp(&a.span.start) {
                Ordering::Equal => {
                    // Ties at identical start: descending priority, then
                    // ascending end (the outer span is applied last and
                    // therefore "wins" once positions collapse).
                    match b.priority.cmp(&a.priority) {
                        Ordering::Equal => a.span.end.cmp(&b.span.end),
                        other => other,
                    }
                }
                other => other,
            }
        });

        let mut buf = source.to_string();
        for edit in ordered {
            let start = edit.span.start as usize;
            let end = edit.span.end as usize;
            buf.replace_range(start..end, &edit.replacement);
        }

        Ok((buf, self.prototypes.join("\n"), self.definitions.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    fn sp(start: u32, end: u32) -> Span {
        Span::new(FileId(0), start, end)
    }

    #[test]
    fn non_overlapping_edits_apply_independent_of_insertion_order() {
        let source = "int a = 1; int b = 2;";
        let mut forward = EditBuffer::new();
        forward.push(Edit::new(sp(4, 5), "x", "p1", 0));
        forward.push(Edit::new(sp(15, 16), "y", "p2", 0));
        let (out_fwd, ..) = forward.apply(FileId(0), source).unwrap();

        let mut backward = EditBuffer::new();
        backward.push(Edit::new(sp(15, 16), "y", "p2", 0));
        backward.push(Edit::new(sp(4, 5), "x", "p1", 0));
        let (out_bwd, ..) = backward.apply(FileId(0), source).unwrap();

        assert_eq!(out_fwd, out_bwd);
        assert_eq!(out_fwd, "int x = 1; int y = 2;");
    }

    #[test]
    fn overlap_is_always_detected_regardless_of_order() {
        let mut buf1 = EditBuffer::new();
        buf1.push(Edit::new(sp(0, 10), "a", "p1", 0));
        buf1.push(Edit::new(sp(5, 15), "b", "p2", 0));
        assert!(buf1.check_overlaps().is_err());

        let mut buf2 = EditBuffer::new();
        buf2.push(Edit::new(sp(5, 15), "b", "p2", 0));
        buf2.push(Edit::new(sp(0, 10), "a", "p1", 0));
        assert!(buf2.check_overlaps().is_err());
    }

    #[test]
    fn empty_replacement_on_empty_span_is_discarded() {
        let mut buf = EditBuffer::new();
        buf.push(Edit::new(sp(3, 3), "", "p1", 0));
        assert!(buf.is_empty());
    }

    #[test]
    fn out_of_range_offset_is_fatal() {
        let buf_edit = {
            let mut b = EditBuffer::new();
            b.push(Edit::new(sp(0, 100), "x", "p1", 0));
            b
        };
        let result = buf_edit.apply(FileId(0), "short");
        assert!(matches!(result, Err(CompileError::EditOutOfRange { .. })));
    }
}

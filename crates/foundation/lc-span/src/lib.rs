//! Source file spans and site identifiers.
//!
//! The checker never reads source text. Spans are opaque site tags carried
//! through from the front end so diagnostics can be resolved back to source
//! locations by the caller.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A unique identifier for a source file.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Creates a new file identifier.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

/// A byte offset span in a source file.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset.
    pub start: u32,
    /// Exclusive end offset.
    pub end: u32,
}

impl Span {
    /// Creates a span from start and end offsets.
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The span as a byte range.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Length of the span in bytes.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A span with associated file, used as a site identifier throughout the
/// checker. Ordering is (file, start, end), which gives diagnostics a stable
/// source order.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileSpan {
    /// File containing the span.
    pub file: FileId,
    /// Byte span within the file.
    pub span: Span,
}

impl FileSpan {
    /// Creates a file span.
    #[must_use]
    pub fn new(file: FileId, span: Span) -> Self {
        Self { file, span }
    }

    /// A placeholder span for synthetic program points.
    #[must_use]
    pub fn dummy() -> Self {
        Self::new(FileId(0), Span::new(0, 0))
    }

    /// The span as a byte range.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.span.range()
    }
}

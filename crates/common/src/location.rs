//! Source-range tracking for parsed protocol documents.
//!
//! Every value produced by the reader carries the byte range it was parsed
//! from, so that later compiler stages can attach diagnostics precisely.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A single source document: its identifier and full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier for this document, used in diagnostics and the
    /// compiled protocol's `draft.documents` listing.
    pub id: String,
    /// Full source text.
    pub contents: Arc<str>,
}

impl Document {
    /// Build a new document from raw text.
    pub fn new(id: impl Into<String>, contents: impl Into<Arc<str>>) -> Self {
        Self { id: id.into(), contents: contents.into() }
    }
}

/// A half-open byte range `[start, end)` within a single [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start offset, in bytes.
    pub start: usize,
    /// Exclusive end offset, in bytes.
    pub end: usize,
}

impl Range {
    /// Construct a range; panics if `start > end`, matching the invariant
    /// that every range is well-formed at construction time.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "range start {start} must not exceed end {end}");
        Self { start, end }
    }

    /// A zero-width range at `offset`.
    pub fn point(offset: usize) -> Self {
        Self { start: offset, end: offset }
    }

    /// The smallest range containing both `self` and `other`.
    pub fn union(self, other: Self) -> Self {
        Self { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    /// Whether `self` is entirely within `outer`.
    pub fn is_within(self, outer: Self) -> bool {
        self.start >= outer.start && self.end <= outer.end
    }

    /// Length in bytes.
    pub fn len(self) -> usize {
        self.end - self.start
    }

    /// Whether this range is empty.
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// A reference to a byte range within a specific document, the unit every
/// diagnostic is ultimately anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRange {
    /// The owning document's id.
    pub document_id: String,
    /// The byte range within that document.
    pub range: Range,
}

/// A value of type `T` tagged with the source range it was parsed from.
///
/// `Located` is the workhorse of the reader and parser pipeline: strings,
/// mappings and sequences are all wrapped in it so that every later stage
/// can still answer "where did this come from".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    value: T,
    range: Range,
}

impl<T> Located<T> {
    /// Wrap `value`, tagging it with `range`.
    pub fn new(value: T, range: Range) -> Self {
        Self { value, range }
    }

    /// The source range this value was parsed from.
    pub fn range(&self) -> Range {
        self.range
    }

    /// Borrow the wrapped value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the wrapper, returning the bare value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Map the wrapped value, preserving the range.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Located<U> {
        Located { value: f(self.value), range: self.range }
    }

    /// Borrow the wrapped value alongside its range.
    pub fn as_parts(&self) -> (&T, Range) {
        (&self.value, self.range)
    }
}

impl<T> std::ops::Deref for Located<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Display> fmt::Display for Located<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

/// A located owned string; the leaf scalar produced by the tokenizer.
pub type LocatedString = Located<String>;

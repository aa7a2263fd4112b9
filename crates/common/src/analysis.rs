//! The `Analysis` accumulator threaded through every compiler stage.
//!
//! Every pass of the parser pipeline returns an `Analysis` alongside its
//! result; analyses are merged monotonically and never discarded, so that
//! a failure in one branch of the block tree does not suppress diagnostics
//! collected in a sibling branch.

use crate::location::DocumentRange;
use serde::{Deserialize, Serialize};

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks successful compilation (`valid = false`).
    Error,
    /// Does not block compilation.
    Warning,
}

/// A single compiler diagnostic, attached to zero or more source ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of this diagnostic.
    pub kind: Severity,
    /// Human-readable message.
    pub message: String,
    /// Source ranges this diagnostic is anchored to.
    pub ranges: Vec<DocumentRange>,
}

impl Diagnostic {
    /// Build an error-severity diagnostic.
    pub fn error(message: impl Into<String>, ranges: Vec<DocumentRange>) -> Self {
        Self { kind: Severity::Error, message: message.into(), ranges }
    }

    /// Build a warning-severity diagnostic.
    pub fn warning(message: impl Into<String>, ranges: Vec<DocumentRange>) -> Self {
        Self { kind: Severity::Warning, message: message.into(), ranges }
    }
}

/// An editor-facing autocompletion suggestion anchored to a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Range the completion replaces.
    pub range: DocumentRange,
    /// Candidate labels.
    pub labels: Vec<String>,
}

/// A foldable region (for editor code-folding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// The foldable range.
    pub range: DocumentRange,
}

/// Hover text anchored to a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    /// Range the hover applies to.
    pub range: DocumentRange,
    /// Rendered hover text.
    pub text: String,
}

/// A relation between two ranges (e.g. "definition of", "reference to").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// The defining or source range.
    pub source: DocumentRange,
    /// The related target range.
    pub target: DocumentRange,
    /// Label describing the relation kind.
    pub label: String,
}

/// A rename-safe range with its current display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Range that can be renamed.
    pub range: DocumentRange,
    /// Current name at that range.
    pub name: String,
}

/// A selectable range, used for "expand selection" style editor features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// The selectable range.
    pub range: DocumentRange,
}

/// The accumulator threaded through every compiler stage.
///
/// `Analysis` is a monoid: [`Analysis::default`] is the neutral element and
/// [`Analysis::merge`] is associative, so stages can be composed in any
/// grouping without changing the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Collected diagnostics, in emission order.
    pub diagnostics: Vec<Diagnostic>,
    /// Collected completions.
    pub completions: Vec<Completion>,
    /// Collected folds.
    pub folds: Vec<Fold>,
    /// Collected hovers.
    pub hovers: Vec<Hover>,
    /// Collected relations.
    pub relations: Vec<Relation>,
    /// Collected renames.
    pub renames: Vec<Rename>,
    /// Collected selections.
    pub selections: Vec<Selection>,
}

impl Analysis {
    /// The empty analysis; the neutral element of [`Analysis::merge`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// An analysis containing a single diagnostic.
    pub fn from_diagnostic(diagnostic: Diagnostic) -> Self {
        Self { diagnostics: vec![diagnostic], ..Self::default() }
    }

    /// An analysis containing a single error.
    pub fn from_error(message: impl Into<String>, ranges: Vec<DocumentRange>) -> Self {
        Self::from_diagnostic(Diagnostic::error(message, ranges))
    }

    /// An analysis containing a single warning.
    pub fn from_warning(message: impl Into<String>, ranges: Vec<DocumentRange>) -> Self {
        Self::from_diagnostic(Diagnostic::warning(message, ranges))
    }

    /// Whether any error-severity diagnostic was recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind == Severity::Error)
    }

    /// Merge `other` into `self` in place, in emission order.
    pub fn merge_in_place(&mut self, other: Analysis) {
        self.diagnostics.extend(other.diagnostics);
        self.completions.extend(other.completions);
        self.folds.extend(other.folds);
        self.hovers.extend(other.hovers);
        self.relations.extend(other.relations);
        self.renames.extend(other.renames);
        self.selections.extend(other.selections);
    }

    /// Associatively merge two analyses, returning the combined result.
    pub fn merge(mut self, other: Analysis) -> Analysis {
        self.merge_in_place(other);
        self
    }

    /// Merge an iterator of analyses into one.
    pub fn merge_all(analyses: impl IntoIterator<Item = Analysis>) -> Analysis {
        analyses.into_iter().fold(Analysis::empty(), Analysis::merge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(msg: &str) -> Analysis {
        Analysis::from_error(msg, vec![])
    }

    #[test]
    fn merge_has_neutral_element() {
        let a = sample("a");
        assert_eq!(a.clone().merge(Analysis::empty()), a.clone());
        assert_eq!(Analysis::empty().merge(a.clone()), a);
    }

    #[test]
    fn merge_is_associative() {
        let a = sample("a");
        let b = sample("b");
        let c = sample("c");
        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left, right);
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut a = Analysis::empty();
        a.merge_in_place(Analysis::from_warning("w", vec![]));
        assert!(!a.has_errors());
        a.merge_in_place(Analysis::from_error("e", vec![]));
        assert!(a.has_errors());
    }
}

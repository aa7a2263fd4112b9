//! Typed error surfaces. Each variant corresponds to one of the error
//! kinds described for the compiler and runtime; application code matches
//! on these, while `eyre` wraps them with additional context at the CLI
//! and bridge boundaries.

use crate::location::DocumentRange;
use thiserror::Error;

/// Errors raised while tokenizing raw protocol source text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyntacticError {
    /// A line's indentation was not a whole number of two-space levels.
    #[error("odd indentation at {0:?}")]
    OddIndentation(DocumentRange),
    /// The same key appeared twice in one mapping.
    #[error("duplicate key at {duplicate:?} (first defined at {original:?})")]
    DuplicateKey {
        /// Range of the first occurrence.
        original: DocumentRange,
        /// Range of the repeated occurrence.
        duplicate: DocumentRange,
    },
    /// A token could not be recognized at all.
    #[error("invalid token at {0:?}")]
    InvalidToken(DocumentRange),
}

/// Errors raised validating a located value against an [`AttributeSchema`](crate::schema::AttributeSchema).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchematicError {
    /// A required attribute was not present.
    #[error("missing required attribute {key:?} at {range:?}")]
    MissingAttribute {
        /// The missing key's name.
        key: String,
        /// Range of the enclosing mapping.
        range: DocumentRange,
    },
    /// An attribute not recognized by any namespace was present.
    #[error("unexpected attribute {key:?} at {range:?}")]
    UnexpectedAttribute {
        /// The unrecognized key's name.
        key: String,
        /// Range of the offending key.
        range: DocumentRange,
    },
    /// An attribute's value did not match its expected type.
    #[error("type mismatch for {key:?} at {range:?}: {message}")]
    TypeMismatch {
        /// The attribute's name.
        key: String,
        /// Range of the offending value.
        range: DocumentRange,
        /// Description of the mismatch.
        message: String,
    },
}

/// Errors raised while folding parsed attributes into the block tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SemanticError {
    /// A block's transform chain produced no process leaf.
    #[error("block has no process at {0:?}")]
    MissingProcess(DocumentRange),
    /// Block nesting exceeded the maximum recursion depth.
    #[error("maximum recursion depth exceeded at {0:?}")]
    RecursionLimitExceeded(DocumentRange),
    /// A shorthand name was referenced but never defined.
    #[error("unknown shorthand {name:?} at {range:?}")]
    UnknownShorthand {
        /// The referenced shorthand's name.
        name: String,
        /// Range of the reference.
        range: DocumentRange,
    },
    /// A quantity used an unrecognized or incompatible unit.
    #[error("invalid unit at {0:?}: {1}")]
    InvalidUnit(DocumentRange, String),
}

/// Errors raised parsing or evaluating an embedded expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression's surface syntax could not be parsed.
    #[error("expression syntax error at {range:?}: {message}")]
    Syntax {
        /// Range of the offending substring.
        range: DocumentRange,
        /// Description of the syntax problem.
        message: String,
    },
    /// The expression parsed but failed to evaluate.
    #[error("expression evaluation error at {range:?}: {message}")]
    Evaluation {
        /// Range of the offending expression.
        range: DocumentRange,
        /// Description of the evaluation failure.
        message: String,
    },
}

/// Errors raised while a compiled protocol is running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// A referenced node path does not exist in the attached node tree.
    #[error("missing node at {0:?}")]
    MissingNode(DocumentRange),
    /// A referenced node exists but is not the expected kind (e.g. not
    /// subscribable when a subscription was required).
    #[error("invalid node kind at {0:?}")]
    InvalidNodeKind(DocumentRange),
    /// A node's declared dtype did not match what the protocol expected.
    #[error("invalid data type at {0:?}")]
    InvalidDataType(DocumentRange),
    /// A claim was preempted by a higher-priority attempt.
    #[error("claim preempted")]
    ClaimPreempted,
    /// An I/O operation performed by a state instance (e.g. writing an
    /// output file) failed.
    #[error("external I/O failure: {0}")]
    Io(String),
}

/// A programming-contract violation: an illegal state-machine transition,
/// a missing parent reference, or similar. These are not `Result`s —
/// callers are expected to treat them as bugs, matching the source's own
/// assertion-guarded legality checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("internal fault: {0}")]
pub struct InternalFault(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Range;

    fn range() -> DocumentRange {
        DocumentRange { document_id: "doc".into(), range: Range::new(0, 1) }
    }

    #[test]
    fn errors_render_their_range() {
        let err = SyntacticError::OddIndentation(range());
        assert!(err.to_string().contains("odd indentation"));
    }

    #[test]
    fn internal_fault_carries_a_message() {
        let fault = InternalFault("pause() called while not busy".into());
        assert!(fault.to_string().contains("pause()"));
    }
}

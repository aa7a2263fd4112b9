//! The draft / multi-document model and the stable compilation-result
//! shape: a `Draft` names an entry document among a set of source
//! documents, and compiling one produces the `{analysis, documentPaths,
//! protocol, valid}` result every caller (CLI, bridge, tests) consumes.

use crate::parser::compile::{compile_with_node_tree, default_parsers, CompiledProtocol};
use crate::parser::Parser;
use crate::reader::parse_document;
use labflow_common::{Analysis, Document, NodeTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named set of source documents plus the one to compile from. Present
/// even though the current reader only ever feeds a draft's entry document
/// text to the tokenizer, so the compiled-output contract (`draft:
/// {documents, entryDocumentId, id}`) is stable if multi-document includes
/// are added later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    /// Stable identifier for this draft.
    pub id: String,
    /// Every document making up the draft, keyed by id.
    pub documents: BTreeMap<String, Document>,
    /// Which document compilation starts from.
    pub entry_document_id: String,
}

impl Draft {
    /// A single-document draft: the common case, one protocol file with no
    /// includes.
    pub fn single(id: impl Into<String>, document: Document) -> Self {
        let entry_document_id = document.id.clone();
        let mut documents = BTreeMap::new();
        documents.insert(document.id.clone(), document);
        Self { id: id.into(), documents, entry_document_id }
    }

    /// The entry document, if this draft contains one with that id.
    pub fn entry_document(&self) -> Option<&Document> {
        self.documents.get(&self.entry_document_id)
    }

    /// JSON-shaped external representation matching `draft: {documents,
    /// entryDocumentId, id}`.
    pub fn export(&self) -> serde_json::Value {
        serde_json::json!({
            "documents": self.documents.values().map(|d| serde_json::json!({
                "id": d.id,
                "contents": d.contents.as_ref(),
            })).collect::<Vec<_>>(),
            "entryDocumentId": self.entry_document_id,
            "id": self.id,
        })
    }
}

/// The stable JSON shape of a successfully compiled protocol: the owning
/// draft, the protocol's declared name, and its compiled root block.
#[derive(Debug, Clone)]
pub struct CompiledDraft {
    /// The draft this protocol was compiled from.
    pub draft: Draft,
    /// The protocol's `name` attribute.
    pub name: String,
    /// The compiled root block.
    pub root: crate::block::Block,
}

impl CompiledDraft {
    /// JSON-shaped external representation: `{draft, name, root}`.
    pub fn export(&self) -> serde_json::Value {
        serde_json::json!({
            "draft": self.draft.export(),
            "name": self.name,
            "root": self.root.export(),
        })
    }
}

/// The full compilation-result shape returned to callers: the accumulated
/// analysis, the paths of every document involved, the compiled protocol
/// (or `null` on failure), and a `valid` summary flag.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// Every diagnostic/editor-metadata collected across all passes.
    pub analysis: Analysis,
    /// Ids of every document that participated in compilation.
    pub document_paths: Vec<String>,
    /// The compiled protocol, or `None` if compilation failed.
    pub protocol: Option<CompiledDraft>,
}

impl CompilationResult {
    /// Whether compilation succeeded: no error-severity diagnostics.
    pub fn valid(&self) -> bool {
        !self.analysis.has_errors()
    }

    /// JSON-shaped external representation matching `{analysis,
    /// documentPaths, protocol, valid}`.
    pub fn export(&self) -> serde_json::Value {
        serde_json::json!({
            "analysis": serde_json::to_value(&self.analysis).expect("Analysis serialization cannot fail"),
            "documentPaths": self.document_paths,
            "protocol": self.protocol.as_ref().map(CompiledDraft::export),
            "valid": self.valid(),
        })
    }
}

/// Compile `draft`'s entry document against the default parser set, with no
/// concrete node tree to validate watched paths against.
pub fn compile_draft(draft: Draft) -> CompilationResult {
    compile_draft_with(draft, &default_parsers())
}

/// Compile `draft`'s entry document against an explicit parser set (the
/// hook integration tests and alternate hosts use to swap in a reduced or
/// extended namespace set).
pub fn compile_draft_with(draft: Draft, parsers: &[Arc<dyn Parser>]) -> CompilationResult {
    compile_draft_with_node_tree(draft, parsers, None)
}

/// Compile `draft` against `parsers`, validating any node path a namespace
/// like `record` watches against `node_tree` when one is supplied. This is
/// what a host that already owns a concrete node tree (the CLI's `run`
/// command, a scenario test) should call instead of [`compile_draft`], so a
/// reference to a node that does not exist fails compilation rather than
/// surfacing only once the program actually runs.
pub fn compile_draft_with_node_tree(draft: Draft, parsers: &[Arc<dyn Parser>], node_tree: Option<Arc<dyn NodeTree>>) -> CompilationResult {
    let document_paths = draft.documents.keys().cloned().collect();

    let Some(entry) = draft.entry_document().cloned() else {
        return CompilationResult {
            analysis: Analysis::from_error(format!("unknown entry document {:?}", draft.entry_document_id), vec![]),
            document_paths,
            protocol: None,
        };
    };

    let (parse_analysis, root_value) = parse_document(&entry);
    let (compile_analysis, compiled) = compile_with_node_tree(&root_value, parsers, &entry.id, node_tree);

    let mut analysis = parse_analysis;
    analysis.merge_in_place(compile_analysis);

    let protocol = compiled.map(|CompiledProtocol { name, root }| CompiledDraft { draft: draft.clone(), name, root });

    CompilationResult { analysis, document_paths, protocol }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_to_a_valid_result_with_the_expected_shape() {
        let document = Document::new("entry", "name: Test\nsteps:\n  actions:\n    - wait: 30 sec\n");
        let draft = Draft::single("draft-1", document);
        let result = compile_draft(draft);

        assert!(result.valid());
        let exported = result.export();
        assert_eq!(exported["valid"], true);
        assert_eq!(exported["protocol"]["name"], "Test");
        assert_eq!(exported["protocol"]["draft"]["entryDocumentId"], "entry");
        assert_eq!(exported["protocol"]["root"]["namespace"], "sequence");
    }

    #[test]
    fn an_empty_steps_document_is_invalid_with_a_null_protocol() {
        let document = Document::new("entry", "name: Test\nsteps:\n");
        let draft = Draft::single("draft-2", document);
        let result = compile_draft(draft);

        assert!(!result.valid());
        let exported = result.export();
        assert_eq!(exported["valid"], false);
        assert!(exported["protocol"].is_null());
    }

    #[test]
    fn a_record_block_watching_a_missing_node_fails_at_compile_time() {
        let tree = Arc::new(labflow_common::InMemoryNodeTree::new());
        let document = Document::new(
            "entry",
            "name: Test\nsteps:\n  record: sensors.temperature\n  body:\n    wait: 1 sec\n",
        );
        let draft = Draft::single("draft-6", document);
        let result = compile_draft_with_node_tree(draft, &default_parsers(), Some(tree));

        assert!(!result.valid());
        assert!(result.protocol.is_none());
    }

    #[test]
    fn a_record_block_watching_a_registered_node_compiles_when_given_the_tree() {
        let tree = Arc::new(labflow_common::InMemoryNodeTree::new());
        tree.register_polled(vec!["sensors".into(), "temperature".into()], None);
        let document = Document::new(
            "entry",
            "name: Test\nsteps:\n  record: sensors.temperature\n  body:\n    wait: 1 sec\n",
        );
        let draft = Draft::single("draft-6b", document);
        let result = compile_draft_with_node_tree(draft, &default_parsers(), Some(tree));

        assert!(result.valid(), "{:?}", result.analysis.diagnostics);
        assert!(result.protocol.is_some());
    }

    #[test]
    fn unknown_entry_document_id_fails_without_panicking() {
        let mut documents = BTreeMap::new();
        let doc = Document::new("a", "name: Test\nsteps:\n  wait: 1 sec\n");
        documents.insert(doc.id.clone(), doc);
        let draft = Draft { id: "draft-3".into(), documents, entry_document_id: "missing".into() };

        let result = compile_draft(draft);
        assert!(!result.valid());
        assert!(result.protocol.is_none());
    }
}

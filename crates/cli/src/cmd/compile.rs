//! `labflow compile <path>`: parse, type-check, print the compilation
//! result, exit `0`/`1` on validity.

use eyre::{Context, Result};
use labflow_engine::draft::{compile_draft, Draft};
use std::path::Path;

/// Compile the protocol document at `path`, printing its compilation
/// result as JSON. Returns `true` if the document compiled validly.
pub fn compile(path: &Path) -> Result<bool> {
    let contents = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let document = labflow_common::Document::new(path.display().to_string(), contents);
    let draft = Draft::single(path.display().to_string(), document);

    let result = compile_draft(draft);
    println!("{}", serde_json::to_string_pretty(&result.export()).expect("CompilationResult serialization cannot fail"));

    Ok(result.valid())
}

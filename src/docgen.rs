//! Regenerates `CODESENSE.md`, a plain-text architecture summary built from
//! the `brief` and `modules` query operators. A thin external collaborator,
//! not part of the core engine's contract.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::query;
use crate::store::Store;

const DOC_FILE: &str = "CODESENSE.md";

/// Regenerate `<root>/CODESENSE.md` from the current index state.
pub fn generate(root: &Path, store: &Store) -> Result<()> {
    let brief = query::brief(store)?;
    let modules = query::modules(store)?;

    let mut body = String::new();
    body.push_str("# Codebase Summary\n\n");
    body.push_str("Generated by codesense. Regenerate with `codesense generate-docs`.\n\n");
    body.push_str("## Overview\n\n```\n");
    body.push_str(&brief);
    body.push_str("\n```\n\n");

    body.push_str("## Modules\n\n");
    if modules.is_empty() {
        body.push_str("No modules indexed yet.\n");
    } else {
        body.push_str("| Module | Files | Symbols | Depends on |\n");
        body.push_str("|---|---|---|---|\n");
        for module in &modules {
            let depends_on = if module.depends_on.is_empty() {
                "-".to_string()
            } else {
                module.depends_on.join(", ")
            };
            body.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                module.name, module.file_count, module.symbol_count, depends_on
            ));
        }
    }

    let path = root.join(DOC_FILE);
    fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generate_writes_markdown_for_an_empty_store() {
        let temp = tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        generate(temp.path(), &store).unwrap();

        let contents = fs::read_to_string(temp.path().join(DOC_FILE)).unwrap();
        assert!(contents.contains("# Codebase Summary"));
        assert!(contents.contains("No modules indexed yet."));
    }
}

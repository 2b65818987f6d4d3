//! Assistant-configuration installer: a thin, best-effort descriptor write
//! naming this binary and the tools the tool protocol exposes, instead of
//! editing a host application's own config file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::STATE_DIR;

const CONFIG_FILE: &str = "tool-protocol.json";
const TOOLS: &[&str] = &[
    "search_code",
    "get_symbol",
    "get_callers",
    "get_dependents",
    "get_dependencies",
    "get_architecture",
    "reindex_file",
];

#[derive(Serialize)]
struct ToolDescriptor {
    name: String,
    command: String,
    args: Vec<String>,
    tools: Vec<&'static str>,
}

fn config_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(CONFIG_FILE)
}

fn current_binary() -> String {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "codesense".to_string())
}

/// Write the tool-protocol registration descriptor into `<root>/.codex/`.
pub fn install(root: &Path) -> Result<()> {
    let path = config_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let descriptor = ToolDescriptor {
        name: "codesense".to_string(),
        command: current_binary(),
        args: vec!["mcp".to_string(), "--root".to_string(), root.display().to_string()],
        tools: TOOLS.to_vec(),
    };
    let body = serde_json::to_string_pretty(&descriptor)?;
    fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Remove the descriptor written by [`install`]. A no-op if it's absent.
pub fn uninstall(root: &Path) -> Result<()> {
    let path = config_path(root);
    if path.is_file() {
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn install_then_uninstall_round_trips() {
        let temp = tempdir().unwrap();
        install(temp.path()).unwrap();
        assert!(config_path(temp.path()).is_file());

        uninstall(temp.path()).unwrap();
        assert!(!config_path(temp.path()).is_file());
    }

    #[test]
    fn uninstall_without_install_is_a_no_op() {
        let temp = tempdir().unwrap();
        uninstall(temp.path()).unwrap();
    }
}

//! Walks a root directory and produces the set of root-relative paths that
//! are eligible for parsing/indexing.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::{DirEntry, WalkDir};

use crate::store::normalize_path;

const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    "__pycache__",
    ".pytest_cache",
    "target",
    "vendor",
    ".codex",
    ".claude",
    "coverage",
    ".vscode",
    ".idea",
    "venv",
    ".venv",
    ".env",
    ".tox",
    "bower_components",
    ".cache",
    ".parcel-cache",
    "tmp",
    "temp",
    ".turbo",
    ".vercel",
    ".netlify",
];

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "py", "rs", "go", "sh", "bash", "c", "h", "cpp", "cc", "hpp",
    "json", "css", "html", "htm",
];

const MAX_FILE_SIZE: u64 = 524_288;

/// Walk `root` and return root-relative, forward-slash paths of every
/// eligible file. Ordering is deterministic (lexical, via `WalkDir`'s
/// default sort-free but stable directory traversal followed by a final
/// sort) so repeated collections over an unchanged tree agree.
pub fn collect(root: &Path) -> Result<Vec<String>> {
    let ignored = read_gitignore_names(root);

    let mut paths: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| should_descend(e, root, &ignored))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_admitted(entry.path()))
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| normalize_path(rel))
        })
        .collect();

    paths.sort();
    Ok(paths)
}

fn should_descend(entry: &DirEntry, root: &Path, ignored: &HashSet<String>) -> bool {
    let path = entry.path();
    if path == root {
        return true;
    }
    if !entry.file_type().is_dir() {
        return true;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) if name.starts_with('.') && name != "." && name != ".." => false,
        Some(name) if SKIP_DIRS.contains(&name) => false,
        Some(name) if ignored.contains(name) => false,
        _ => true,
    }
}

fn is_admitted(path: &Path) -> bool {
    if !has_supported_extension(path) {
        return false;
    }
    match fs::metadata(path) {
        Ok(meta) => meta.len() <= MAX_FILE_SIZE,
        Err(_) => false,
    }
}

/// Extension-only admission check, usable on paths that may not exist on
/// disk yet (e.g. a watcher event for a file mid-write or already removed).
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Parse the root `.gitignore`, deliberately limited: blank lines and
/// `#`-comments are skipped, leading/trailing slashes stripped, and any
/// entry containing `/` or `*` is dropped (treated as a pattern, which this
/// collector does not implement).
fn read_gitignore_names(root: &Path) -> HashSet<String> {
    let path: PathBuf = root.join(".gitignore");
    let Ok(contents) = fs::read_to_string(path) else {
        return HashSet::new();
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches('/').trim_end_matches('/'))
        .filter(|line| !line.contains('/') && !line.contains('*'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn collects_supported_extensions_only() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.ts"), "export const x = 1;").unwrap();
        fs::write(temp.path().join("a.exe"), "binary").unwrap();

        let paths = collect(temp.path()).unwrap();
        assert_eq!(paths, vec!["a.ts".to_string()]);
    }

    #[test]
    fn prunes_skip_dirs_and_dotdirs() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("node_modules")).unwrap();
        fs::write(temp.path().join("node_modules/lib.ts"), "export {}").unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join(".git/config.ts"), "export {}").unwrap();
        fs::write(temp.path().join("main.ts"), "export {}").unwrap();

        let paths = collect(temp.path()).unwrap();
        assert_eq!(paths, vec!["main.ts".to_string()]);
    }

    #[test]
    fn respects_plain_gitignore_entries() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".gitignore"), "generated\n# comment\nsrc/*.bak\n").unwrap();
        fs::create_dir(temp.path().join("generated")).unwrap();
        fs::write(temp.path().join("generated/out.ts"), "export {}").unwrap();
        fs::write(temp.path().join("keep.ts"), "export {}").unwrap();

        let paths = collect(temp.path()).unwrap();
        assert_eq!(paths, vec!["keep.ts".to_string()]);
    }

    #[test]
    fn skips_oversized_files() {
        let temp = tempdir().unwrap();
        let big = vec![b'a'; (MAX_FILE_SIZE + 1) as usize];
        fs::write(temp.path().join("big.ts"), big).unwrap();
        fs::write(temp.path().join("small.ts"), "export {}").unwrap();

        let paths = collect(temp.path()).unwrap();
        assert_eq!(paths, vec!["small.ts".to_string()]);
    }
}

//! Root discovery and path resolution.
//!
//! Priority order, per the tool contract:
//!
//! 1. CLI argument (`--root`)
//! 2. `CODEX_ROOT` environment variable
//! 3. Walk upward from the current directory until a `.codex/index.db` is
//!    found; if none is found, the current directory is used.

use std::env;
use std::path::{Path, PathBuf};

use crate::{DB_FILE, STATE_DIR};

/// Environment variable that overrides root discovery.
pub const ENV_ROOT: &str = "CODEX_ROOT";

/// Walk upward from `start` looking for `<dir>/.codex/index.db`.
///
/// Returns `None` if no ancestor (including `start` itself) contains one.
pub fn find_root_from(start: &Path) -> Option<PathBuf> {
    let mut current = if start.is_absolute() {
        start.to_path_buf()
    } else {
        env::current_dir().ok()?.join(start)
    };
    current = current.canonicalize().unwrap_or(current);
    if current.is_file() {
        current = current.parent()?.to_path_buf();
    }

    loop {
        if current.join(STATE_DIR).join(DB_FILE).is_file() {
            return Some(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Resolve the workspace root: CLI arg > `CODEX_ROOT` > ancestor walk > cwd.
pub fn resolve_root(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return canonicalize_or_absolute(path);
    }
    if let Ok(env_path) = env::var(ENV_ROOT) {
        return canonicalize_or_absolute(Path::new(&env_path));
    }
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd).unwrap_or(cwd)
}

/// Path to the store file for a given root.
pub fn db_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(DB_FILE)
}

/// Path to the daemon pid file for a given root.
pub fn pid_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("daemon.pid")
}

fn canonicalize_or_absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_root_with_existing_db() {
        let temp = tempdir().unwrap();
        let state = temp.path().join(STATE_DIR);
        fs::create_dir(&state).unwrap();
        fs::write(state.join(DB_FILE), b"").unwrap();

        let nested = temp.path().join("src").join("nested");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_root_from(&nested),
            Some(temp.path().canonicalize().unwrap())
        );
    }

    #[test]
    fn no_root_found_returns_none() {
        let temp = tempdir().unwrap();
        let isolated = temp.path().join("isolated");
        fs::create_dir(&isolated).unwrap();
        assert_eq!(find_root_from(&isolated), None);
    }

    #[test]
    fn resolve_root_falls_back_to_cwd() {
        let temp = tempdir().unwrap();
        let resolved = resolve_root(Some(temp.path()));
        assert_eq!(resolved, temp.path().canonicalize().unwrap());
    }
}

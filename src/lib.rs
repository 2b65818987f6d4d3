pub mod collector;
pub mod daemon;
pub mod docgen;
pub mod indexer;
pub mod installer;
pub mod parser;
pub mod protocol;
pub mod query;
pub mod resolver;
pub mod store;
pub mod watcher;
pub mod workspace;

/// Semantic exit codes for script-friendly operation.
///
/// - 0: success
/// - 1: error, including "no index found" for a command that requires one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Directory, relative to a workspace root, holding the store and daemon state.
pub const STATE_DIR: &str = ".codex";

/// Name of the store file within `STATE_DIR`.
pub const DB_FILE: &str = "index.db";

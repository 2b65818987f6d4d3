//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "codesense", version, about = "Local code-intelligence engine")]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output; errors still go to stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Workspace root (auto-detected via CODEX_ROOT or an ancestor .codex/index.db)
    #[arg(long, short = 'r', global = true, env = "CODEX_ROOT")]
    pub root: Option<PathBuf>,

    /// Path to the SQLite index database (default: <root>/.codex/index.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Full index, config install, and doc write for a fresh workspace
    Init {
        /// Directory to index (defaults to the resolved root)
        path: Option<PathBuf>,
    },
    /// Full re-index of the workspace; prints summary stats as JSON
    Reindex {
        /// Directory to index (defaults to the resolved root)
        path: Option<PathBuf>,
    },
    /// Incrementally re-index a single file
    ReindexFile {
        /// Path relative to the workspace root
        rel_path: String,
    },
    /// Full-text search over indexed symbols
    Search {
        query: String,
        #[arg(long, default_value_t = 15)]
        limit: usize,
    },
    /// Symbols that call or reference the named symbol
    Callers { symbol: String },
    /// Full detail for a single matching symbol
    Context { symbol: String },
    /// Files impacted by a change to the given file
    Impact {
        file: String,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
    },
    /// Symbols the named symbol depends on
    Deps { symbol: String },
    /// Top symbols by PageRank
    Rank {
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Partition the workspace into modules with inter-module dependencies
    Modules,
    /// Index-wide counts
    Stats,
    /// Human-readable workspace summary
    Brief,
    /// Human-readable pre-edit briefing for a single file
    PreEdit { file: String },
    /// Re-index a file silently (used as a post-edit hook)
    PostEdit { file: String },
    /// Regenerate CODESENSE.md from the current index
    GenerateDocs,
    /// Manage the background watcher process
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
    /// Run the tool-protocol server over stdio (foreground, long-lived)
    Mcp,
    /// Remove codesense's configuration from the workspace root
    Uninstall,
}

#[derive(Subcommand, Debug)]
pub enum DaemonCommands {
    /// Start the watcher; runs in the foreground unless --background is set
    Start {
        #[arg(long)]
        background: bool,
    },
    /// Stop a running watcher
    Stop {
        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
    },
    /// Report whether a watcher is running
    Status,
}

//! codesense - local code-intelligence engine.
//!
//! Thin entry point: parses arguments, resolves the workspace root and
//! database path, and dispatches to the library's query/indexer/daemon/
//! protocol modules. No business logic lives here.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, DaemonCommands};
use codesense::store::Store;
use codesense::ExitCode;
use codesense::{daemon, docgen, indexer, installer, protocol, query, workspace};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let root = workspace::resolve_root(cli.root.as_deref());
    let db = cli.db.clone().unwrap_or_else(|| workspace::db_path(&root));

    match run(&cli.command, &root, &db) {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Error.into()
        }
    }
}

fn init_logging(verbosity: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Open the store for a command that requires an already-built index,
/// with a human-readable error if none exists yet.
fn open_existing(db: &Path, root: &Path) -> Result<Store> {
    if !db.is_file() {
        anyhow::bail!(
            "no index found at {} (run `codesense init` first)",
            db.display()
        );
    }
    Store::open(root)
}

fn print_json(value: impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run(command: &Commands, root: &Path, db: &Path) -> Result<ExitCode> {
    match command {
        Commands::Init { path } => {
            let root = resolve_target(path, root);
            let store = Store::open(&root)?;
            let summary = indexer::index_project(&root, &store)?;
            installer::install(&root)?;
            docgen::generate(&root, &store)?;
            print_json(&summary)?;
            Ok(ExitCode::Success)
        }
        Commands::Reindex { path } => {
            let root = resolve_target(path, root);
            let store = Store::open(&root)?;
            let summary = indexer::index_project(&root, &store)?;
            print_json(&summary)?;
            Ok(ExitCode::Success)
        }
        Commands::ReindexFile { rel_path } => {
            let store = open_existing(db, root)?;
            indexer::reindex_file(root, &store, rel_path)?;
            print_json(&serde_json::json!({ "reindexed": rel_path }))?;
            Ok(ExitCode::Success)
        }
        Commands::Search { query: q, limit } => {
            let store = open_existing(db, root)?;
            print_json(query::search(&store, q, *limit)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Callers { symbol } => {
            let store = open_existing(db, root)?;
            print_json(query::callers(&store, symbol)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Context { symbol } => {
            let store = open_existing(db, root)?;
            print_json(query::context(&store, symbol)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Impact { file, max_depth } => {
            let store = open_existing(db, root)?;
            print_json(query::impact(&store, file, *max_depth)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Deps { symbol } => {
            let store = open_existing(db, root)?;
            print_json(query::dependencies(&store, symbol)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Rank { top } => {
            let store = open_existing(db, root)?;
            print_json(query::rank(&store, *top)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Modules => {
            let store = open_existing(db, root)?;
            print_json(query::modules(&store)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Stats => {
            let store = open_existing(db, root)?;
            print_json(query::stats(&store)?)?;
            Ok(ExitCode::Success)
        }
        Commands::Brief => {
            let store = open_existing(db, root)?;
            println!("{}", query::brief(&store)?);
            Ok(ExitCode::Success)
        }
        Commands::PreEdit { file } => {
            let store = open_existing(db, root)?;
            println!("{}", query::pre_edit(&store, file)?);
            Ok(ExitCode::Success)
        }
        Commands::PostEdit { file } => {
            let store = open_existing(db, root)?;
            indexer::reindex_file(root, &store, file)?;
            Ok(ExitCode::Success)
        }
        Commands::GenerateDocs => {
            let store = open_existing(db, root)?;
            docgen::generate(root, &store)?;
            Ok(ExitCode::Success)
        }
        Commands::Daemon { command } => run_daemon(command, root, db),
        Commands::Mcp => {
            let store = open_existing(db, root)?;
            protocol::serve(root, &store)?;
            Ok(ExitCode::Success)
        }
        Commands::Uninstall => {
            installer::uninstall(root)?;
            Ok(ExitCode::Success)
        }
    }
}

fn run_daemon(command: &DaemonCommands, root: &Path, db: &Path) -> Result<ExitCode> {
    match command {
        DaemonCommands::Start { background } => {
            let store = Store::open(root).context("opening index for daemon start")?;
            daemon::start(root, &store, db, *background)?;
            Ok(ExitCode::Success)
        }
        DaemonCommands::Stop { force } => {
            daemon::stop(root, *force)?;
            Ok(ExitCode::Success)
        }
        DaemonCommands::Status => {
            print_json(daemon::status(root)?)?;
            Ok(ExitCode::Success)
        }
    }
}

fn resolve_target(path: &Option<PathBuf>, default_root: &Path) -> PathBuf {
    match path {
        Some(p) if p.is_absolute() => p.clone(),
        Some(p) => default_root.join(p),
        None => default_root.to_path_buf(),
    }
}

//! Background watcher process: pid file lifecycle, start/stop/status,
//! and the foreground run loop that owns the Store and the watcher.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};

use crate::indexer;
use crate::store::Store;
use crate::watcher;
use crate::workspace;

/// How long `start` waits, when launching in the background, before giving
/// up on the child having written its pid file.
const BACKGROUND_STARTUP_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize, Deserialize)]
struct PidFile {
    pid: u32,
    started_at: i64,
}

fn pid_file_path(root: &Path) -> PathBuf {
    workspace::pid_path(root)
}

fn read_pid_file(root: &Path) -> Result<Option<PidFile>> {
    let path = pid_file_path(root);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("reading pid file {}", path.display()))?;
    Ok(serde_json::from_str(&contents).ok())
}

fn write_pid_file(root: &Path, pid: u32) -> Result<()> {
    let path = pid_file_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = PidFile {
        pid,
        started_at: unix_now(),
    };
    let mut handle = fs::File::create(&path)?;
    handle.write_all(serde_json::to_string_pretty(&file)?.as_bytes())?;
    Ok(())
}

fn remove_pid_file(root: &Path) -> Result<()> {
    let path = pid_file_path(root);
    if path.is_file() {
        fs::remove_file(&path)?;
    }
    Ok(())
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    false
}

/// Status reported to the CLI's `daemon status` command.
#[derive(Debug, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
}

/// Pid-file presence alone doesn't imply liveness; probe with signal 0 and
/// clean up a stale file before answering.
pub fn status(root: &Path) -> Result<DaemonStatus> {
    match read_pid_file(root)? {
        Some(pid_file) if is_process_running(pid_file.pid) => Ok(DaemonStatus {
            running: true,
            pid: Some(pid_file.pid),
        }),
        Some(_) => {
            remove_pid_file(root)?;
            Ok(DaemonStatus {
                running: false,
                pid: None,
            })
        }
        None => Ok(DaemonStatus {
            running: false,
            pid: None,
        }),
    }
}

/// Run the watcher in the foreground, owning the Store until a shutdown
/// signal arrives. Writes the pid file on entry, removes it on exit, and
/// checkpoints the WAL before returning.
pub fn run_foreground(root: &Path, store: &Store) -> Result<()> {
    if let Some(pid_file) = read_pid_file(root)? {
        if is_process_running(pid_file.pid) {
            bail!("daemon already running (pid {})", pid_file.pid);
        }
        remove_pid_file(root)?;
    }

    let pid = std::process::id();
    write_pid_file(root, pid)?;
    info!("daemon started (pid {pid}), watching {}", root.display());

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .ok();

    indexer::index_project(root, store).context("initial index before watching")?;

    let result = watcher::watch(root, store, &shutdown_rx);

    store.checkpoint().ok();
    remove_pid_file(root)?;
    info!("daemon stopped");

    result
}

/// Start the watcher, either inline (foreground) or as a detached background
/// process. `db_path` is only used to compute the log file location when
/// backgrounding; the foreground path reopens `store` directly.
pub fn start(root: &Path, store: &Store, db_path: &Path, background: bool) -> Result<()> {
    if let Some(pid_file) = read_pid_file(root)? {
        if is_process_running(pid_file.pid) {
            bail!("daemon already running (pid {})", pid_file.pid);
        }
        remove_pid_file(root)?;
    }

    if background {
        start_background(root, db_path)
    } else {
        run_foreground(root, store)
    }
}

/// Re-exec the current binary as `daemon start --root <root> --db <db>`,
/// detached from this process's controlling terminal, with stdout/stderr
/// redirected to `<root>/.codex/daemon.log`.
#[cfg(unix)]
fn start_background(root: &Path, db_path: &Path) -> Result<()> {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let state_dir = workspace::pid_path(root)
        .parent()
        .map(Path::to_path_buf)
        .context("daemon state directory has no parent")?;
    fs::create_dir_all(&state_dir)?;
    let log_path = state_dir.join("daemon.log");
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening daemon log {}", log_path.display()))?;
    let log_file_stderr = log_file.try_clone()?;

    let exe = std::env::current_exe().context("locating current executable")?;
    let mut cmd = Command::new(exe);
    cmd.arg("daemon")
        .arg("start")
        .arg("--root")
        .arg(root)
        .arg("--db")
        .arg(db_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_stderr));
    unsafe {
        cmd.pre_exec(|| {
            let _ = libc::setsid();
            Ok(())
        });
    }
    let child = cmd.spawn().context("spawning background daemon")?;
    info!("daemon launched in background (pid {})", child.id());

    std::thread::sleep(BACKGROUND_STARTUP_WAIT);
    Ok(())
}

#[cfg(not(unix))]
fn start_background(_root: &Path, _db_path: &Path) -> Result<()> {
    bail!("background daemon launch is unix-only; pass --no-background to run in the foreground")
}

/// Stop a running daemon: SIGTERM, then wait up to 10s, cleaning up the pid
/// file on success. `force` sends SIGKILL instead and waits only 2s.
#[cfg(unix)]
pub fn stop(root: &Path, force: bool) -> Result<()> {
    let Some(pid_file) = read_pid_file(root)? else {
        bail!("no daemon running (no pid file found)");
    };
    if !is_process_running(pid_file.pid) {
        remove_pid_file(root)?;
        bail!("daemon not running (stale pid file removed)");
    }

    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
    unsafe {
        libc::kill(pid_file.pid as i32, signal);
    }

    let max_wait = if force {
        Duration::from_secs(2)
    } else {
        Duration::from_secs(10)
    };
    let start = std::time::Instant::now();
    while is_process_running(pid_file.pid) && start.elapsed() < max_wait {
        std::thread::sleep(Duration::from_millis(100));
    }

    if is_process_running(pid_file.pid) {
        if !force {
            bail!("daemon did not stop gracefully; retry with --force");
        }
    } else {
        remove_pid_file(root)?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn stop(root: &Path, _force: bool) -> Result<()> {
    let Some(pid_file) = read_pid_file(root)? else {
        bail!("no daemon running (no pid file found)");
    };
    log::warn!(
        "signal-based shutdown is unix-only; remove the pid file manually if {} is gone",
        pid_file.pid
    );
    remove_pid_file(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn status_with_no_pid_file_is_not_running() {
        let temp = tempdir().unwrap();
        let status = status(temp.path()).unwrap();
        assert!(!status.running);
    }

    #[test]
    fn stale_pid_file_is_cleaned_up_by_status() {
        let temp = tempdir().unwrap();
        write_pid_file(temp.path(), 999_999_999).unwrap();
        let status = status(temp.path()).unwrap();
        assert!(!status.running);
        assert!(!pid_file_path(temp.path()).is_file());
    }
}

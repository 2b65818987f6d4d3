//! Smoke test: the daemon can start in the background, build an index, pick
//! up a file change, and exit cleanly when killed.

use std::fs;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tempfile::tempdir;

#[test]
fn daemon_creates_db_and_handles_updates() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let db_path = root.join(".codex/index.db");
    let bin = env!("CARGO_BIN_EXE_codesense");

    let file_path = root.join("foo.ts");
    fs::write(&file_path, "function foo() {}\n").unwrap();

    let mut child = Command::new(bin)
        .args([
            "daemon",
            "start",
            "--root",
            root.to_str().unwrap(),
            "--db",
            db_path.to_str().unwrap(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start daemon");

    thread::sleep(Duration::from_secs(2));
    assert!(
        db_path.exists(),
        "daemon did not create db at {}",
        db_path.display()
    );

    fs::write(&file_path, "function foo() {}\nfunction bar() {}\n").unwrap();
    thread::sleep(Duration::from_secs(2));

    let _ = child.kill();
    let _ = child.wait();

    assert!(db_path.exists(), "db missing after daemon shutdown");
}

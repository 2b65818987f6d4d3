//! File-system change events, debounced per path, driving the same
//! single-file re-index path the indexer exposes.
//!
//! The teacher's watch loop re-indexes on every raw `notify` event; this
//! one adds a debounce map (200 ms coalescing, plus a write-stability
//! wait) since nothing here re-indexes a file that's still being
//! written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::collector;
use crate::indexer;
use crate::store::Store;

const DEBOUNCE: Duration = Duration::from_millis(200);
const STABILITY_WAIT: Duration = Duration::from_millis(200);
const STABILITY_POLL: Duration = Duration::from_millis(50);

/// Runs the watch loop until `shutdown` fires. Blocks the calling thread.
pub fn watch(root: &Path, store: &Store, shutdown: &mpsc::Receiver<()>) -> Result<()> {
    let root = root.to_path_buf();
    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut removed: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();

    loop {
        if shutdown.try_recv().is_ok() {
            debug!("watcher received shutdown signal");
            return Ok(());
        }

        match rx.recv_timeout(DEBOUNCE) {
            Ok(Ok(event)) => record_event(&root, event, &mut pending, &mut removed),
            Ok(Err(err)) => warn!("watch error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }

        flush_due(&root, store, &mut pending, &mut removed);
    }
}

fn record_event(
    root: &Path,
    event: Event,
    pending: &mut HashMap<PathBuf, Instant>,
    removed: &mut std::collections::HashSet<PathBuf>,
) {
    let now = Instant::now();
    for path in event.paths {
        let Some(rel) = relativize(root, &path) else {
            continue;
        };
        if !is_supported(&rel) {
            continue;
        }
        match event.kind {
            EventKind::Remove(_) => {
                removed.insert(rel.clone());
            }
            _ => {
                removed.remove(&rel);
            }
        }
        pending.insert(rel, now);
    }
}

fn flush_due(
    root: &Path,
    store: &Store,
    pending: &mut HashMap<PathBuf, Instant>,
    removed: &mut std::collections::HashSet<PathBuf>,
) {
    let now = Instant::now();
    let due: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, seen_at)| now.duration_since(**seen_at) >= DEBOUNCE)
        .map(|(path, _)| path.clone())
        .collect();

    for rel in due {
        pending.remove(&rel);
        let is_removal = removed.remove(&rel);
        let rel_str = rel.to_string_lossy().to_string();

        if !is_removal {
            wait_for_stable(&root.join(&rel));
        }

        if let Err(err) = indexer::reindex_file(root, store, &rel_str) {
            warn!("re-index of {rel_str} failed: {err:#}");
        }
    }
}

/// Waits until a file's size stops changing for [`STABILITY_WAIT`],
/// polling every [`STABILITY_POLL`]. Gives up silently if the file
/// disappears mid-wait (the subsequent re-index observes the removal).
fn wait_for_stable(path: &Path) {
    let mut last_size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return,
    };
    let mut stable_since = Instant::now();

    loop {
        std::thread::sleep(STABILITY_POLL);
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size != last_size {
            last_size = size;
            stable_since = Instant::now();
            continue;
        }
        if stable_since.elapsed() >= STABILITY_WAIT {
            return;
        }
    }
}

fn relativize(root: &Path, path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    absolute.strip_prefix(root).ok().map(|p| p.to_path_buf())
}

fn is_supported(rel: &Path) -> bool {
    collector::has_supported_extension(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_event_tracks_add_and_clears_on_re_add() {
        let mut pending = HashMap::new();
        let mut removed = std::collections::HashSet::new();
        let root = PathBuf::from("/repo");
        record_event(
            &root,
            Event::new(EventKind::Remove(notify::event::RemoveKind::File))
                .add_path(root.join("a.ts")),
            &mut pending,
            &mut removed,
        );
        assert!(removed.contains(&PathBuf::from("a.ts")));

        record_event(
            &root,
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(root.join("a.ts")),
            &mut pending,
            &mut removed,
        );
        assert!(!removed.contains(&PathBuf::from("a.ts")));
    }
}

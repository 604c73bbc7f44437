//! Orphaned session folder cleanup
//!
//! Session removal only drops the session from the state. Its folder is
//! deleted later by a sweep that compares the data root against the live
//! session ids. Failed deletions are logged and retried on the next sweep.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::state::SessionId;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Folders deleted
    pub removed: Vec<PathBuf>,
    /// Folders that could not be deleted
    pub failed: Vec<PathBuf>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Delete every folder under `root` whose name is not a live session id
///
/// A missing root is treated as empty. Never returns an error.
pub fn sweep(root: &Path, live: &BTreeSet<SessionId>) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return report,
        Err(e) => {
            tracing::warn!("Failed to read session data root {:?}: {}", root, e);
            return report;
        }
    };

    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let name = entry.file_name();
        if name.to_str().is_some_and(|id| live.contains(id)) {
            continue;
        }

        let path = entry.path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::debug!("Removed orphaned session folder {:?}", path);
                report.removed.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove orphaned session folder {:?}: {}", path, e);
                report.failed.push(path);
            }
        }
    }

    report
}

/// Background task running [`sweep`] on request and on a fixed period
///
/// Requests arrive through a watch channel, so a burst of requests made
/// while a sweep is running collapses into one follow-up sweep with the
/// newest live set.
#[derive(Debug)]
pub struct Sweeper {
    requests: watch::Sender<BTreeSet<SessionId>>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweeper; a zero `interval` disables periodic sweeps
    pub fn spawn(root: PathBuf, live: BTreeSet<SessionId>, interval: Duration) -> Self {
        let (requests, receiver) = watch::channel(live);
        let task = tokio::spawn(run(root, receiver, interval));
        Self { requests, task }
    }

    /// Ask for a sweep against the given live session ids
    pub fn request(&self, live: BTreeSet<SessionId>) {
        self.requests.send_replace(live);
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn run(
    root: PathBuf,
    mut requests: watch::Receiver<BTreeSet<SessionId>>,
    interval: Duration,
) {
    let mut ticker = if interval.is_zero() {
        None
    } else {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    };

    loop {
        tokio::select! {
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = next_tick(&mut ticker) => {}
        }

        let live = requests.borrow_and_update().clone();
        let target = root.clone();
        match tokio::task::spawn_blocking(move || sweep(&target, &live)).await {
            Ok(report) if !report.is_empty() => {
                tracing::info!(
                    removed = report.removed.len(),
                    failed = report.failed.len(),
                    "Swept orphaned session folders"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Sweep task failed: {}", e),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn live(ids: &[&str]) -> BTreeSet<SessionId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sweep_removes_orphans_only() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("alive/abc1234")).unwrap();
        fs::create_dir_all(temp.path().join("dead/abc1234/src")).unwrap();
        fs::write(temp.path().join("dead/abc1234/src/lib.rs"), "").unwrap();
        fs::write(temp.path().join("stray-file"), "").unwrap();

        let report = sweep(temp.path(), &live(&["alive"]));

        assert_eq!(report.removed, vec![temp.path().join("dead")]);
        assert!(report.failed.is_empty());
        assert!(temp.path().join("alive/abc1234").exists());
        assert!(!temp.path().join("dead").exists());
        assert!(temp.path().join("stray-file").exists());
    }

    #[test]
    fn test_sweep_missing_root() {
        let temp = TempDir::new().unwrap();
        let report = sweep(&temp.path().join("nope"), &live(&[]));
        assert!(report.is_empty());
    }

    #[test]
    fn test_sweep_never_touches_live_sessions() {
        let temp = TempDir::new().unwrap();
        for id in ["a", "b", "c"] {
            fs::create_dir_all(temp.path().join(id)).unwrap();
        }

        let report = sweep(temp.path(), &live(&["a", "b", "c"]));
        assert!(report.is_empty());
        for id in ["a", "b", "c"] {
            assert!(temp.path().join(id).exists());
        }
    }

    #[tokio::test]
    async fn test_sweeper_runs_on_request() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("old")).unwrap();
        fs::create_dir_all(temp.path().join("kept")).unwrap();

        let sweeper = Sweeper::spawn(
            temp.path().to_path_buf(),
            live(&["old", "kept"]),
            Duration::ZERO,
        );
        sweeper.request(live(&["kept"]));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while temp.path().join("old").exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!temp.path().join("old").exists());
        assert!(temp.path().join("kept").exists());
        sweeper.shutdown();
    }
}

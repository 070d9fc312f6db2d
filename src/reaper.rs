//! Periodic cleanup of expired jobs and orphaned workspace directories.

use crate::workspace::JobStore;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose TTL ran out during this sweep.
    pub expired: usize,
    pub removed: usize,
    /// Retired jobs still being read; retried next sweep.
    pub deferred: usize,
    pub orphans_removed: usize,
    pub failures: usize,
}

pub struct Reaper {
    store: Arc<JobStore>,
    interval: Duration,
    orphan_grace: Duration,
}

impl Reaper {
    pub fn new(store: Arc<JobStore>, interval: Duration, orphan_grace: Duration) -> Self {
        Self {
            store,
            interval,
            orphan_grace,
        }
    }

    /// Runs [`Reaper::sweep`] on a fixed interval until `shutdown` fires.
    /// The first sweep happens immediately, which clears leftovers from a
    /// previous process.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let reaper = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || reaper.sweep()).await {
                            Ok(report) => tracing::info!(
                                expired = report.expired,
                                removed = report.removed,
                                deferred = report.deferred,
                                orphans_removed = report.orphans_removed,
                                failures = report.failures,
                                "Sweep completed"
                            ),
                            Err(e) => tracing::error!(error = %e, "Sweep task failed"),
                        }
                    }
                }
            }
        })
    }

    /// One cleanup pass. Every deletion is best-effort: failures are logged
    /// and counted, and the rest of the pass carries on.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport {
            expired: self.store.evict_expired().len(),
            ..SweepReport::default()
        };

        let (removable, deferred) = self.store.take_removable();
        report.deferred = deferred;
        for (job_id, dir) in removable {
            match remove_tree(&dir) {
                Ok(()) => {
                    tracing::debug!(job_id = %job_id, "Removed job workspace");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to remove job workspace");
                    report.failures += 1;
                }
            }
        }

        self.remove_orphans(&mut report);
        report
    }

    /// Directories under the root that no job accounts for, e.g. from a
    /// previous process, are removed once they are older than the grace period.
    fn remove_orphans(&self, report: &mut SweepReport) {
        let entries = match fs::read_dir(self.store.root()) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, root = %self.store.root().display(), "Cannot scan workspace root");
                report.failures += 1;
                return;
            }
        };

        let known = self.store.known_ids();
        let cutoff = match chrono::Duration::from_std(self.orphan_grace) {
            Ok(grace) => self.store.now() - grace,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if known.contains(name) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if DateTime::<Utc>::from(modified) >= cutoff {
                continue;
            }

            match remove_tree(&path) {
                Ok(()) => {
                    tracing::info!(dir = %path.display(), "Removed orphaned workspace");
                    report.orphans_removed += 1;
                }
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "Failed to remove orphaned workspace");
                    report.failures += 1;
                }
            }
        }
    }
}

fn remove_tree(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::ManualClock;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn setup() -> (TempDir, Arc<ManualClock>, Arc<JobStore>, Reaper) {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let store =
            Arc::new(JobStore::new(temp_dir.path().join("jobs"), HOUR, clock.clone()).unwrap());
        let reaper = Reaper::new(store.clone(), Duration::from_secs(600), 4 * HOUR);
        (temp_dir, clock, store, reaper)
    }

    #[test]
    fn test_sweep_removes_expired_jobs() {
        let (_tmp, clock, store, reaper) = setup();
        let old = store.create().unwrap();
        std::fs::write(old.dir.join("a.webp"), b"x").unwrap();
        clock.advance(HOUR / 2);
        let fresh = store.create().unwrap();
        clock.advance(HOUR / 2);

        let report = reaper.sweep();
        assert_eq!(report.expired, 1);
        assert_eq!(report.removed, 1);
        assert!(!old.dir.exists());
        assert!(fresh.dir.exists());
        assert!(store.authorize(&old.id, &old.token).is_err());
    }

    #[test]
    fn test_sweep_defers_leased_jobs() {
        let (_tmp, clock, store, reaper) = setup();
        let ticket = store.create().unwrap();
        let job = store.authorize(&ticket.id, &ticket.token).unwrap();
        clock.advance(HOUR);

        let report = reaper.sweep();
        assert_eq!(report.expired, 1);
        assert_eq!(report.deferred, 1);
        assert!(ticket.dir.exists());

        drop(job);
        let report = reaper.sweep();
        assert_eq!(report.removed, 1);
        assert!(!ticket.dir.exists());
    }

    #[test]
    fn test_sweep_removes_old_orphans_only() {
        let (_tmp, clock, store, reaper) = setup();
        let orphan = store.root().join("left-over-from-last-run");
        std::fs::create_dir(&orphan).unwrap();
        let stray_file = store.root().join("notes.txt");
        std::fs::write(&stray_file, b"keep").unwrap();

        assert_eq!(reaper.sweep().orphans_removed, 0);
        assert!(orphan.exists());

        clock.advance(4 * HOUR + Duration::from_secs(60));
        let live = store.create().unwrap();
        let report = reaper.sweep();
        assert_eq!(report.orphans_removed, 1);
        assert!(!orphan.exists());
        assert!(stray_file.exists());
        assert!(live.dir.exists());
    }

    #[test]
    fn test_sweep_tolerates_already_removed_dirs() {
        let (_tmp, clock, store, reaper) = setup();
        let ticket = store.create().unwrap();
        std::fs::remove_dir_all(&ticket.dir).unwrap();
        clock.advance(HOUR);

        let report = reaper.sweep();
        assert_eq!(report.removed, 1);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn test_spawn_stops_on_cancel() {
        let (_tmp, clock, store, reaper) = setup();
        let ticket = store.create().unwrap();
        clock.advance(HOUR);

        let shutdown = CancellationToken::new();
        let handle = Arc::new(reaper).spawn(shutdown.clone());

        // the first tick fires immediately
        for _ in 0..100 {
            if !ticket.dir.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!ticket.dir.exists());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! Retention sweep
//!
//! A session's age is measured from the latest of its creation time and the
//! modification times of its artifacts. Sessions strictly older than the
//! retention window are removed in full. Directories under the sessions root
//! without a registry row are judged by filesystem modification times.

use super::{parse_timestamp, SessionStore};
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Outcome of one sweep pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<Uuid>,
    pub orphans_removed: usize,
    /// Expired but locked by a writer
    pub skipped_busy: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.orphans_removed == 0 && self.skipped_busy == 0 && self.failed == 0
    }
}

impl SessionStore {
    /// Sweep against the current time
    pub async fn sweep(&self, retention_minutes: u64) -> SweepReport {
        self.sweep_at(Utc::now(), retention_minutes).await
    }

    /// Sweep as if the current time were `now`
    ///
    /// Never fails: per-session errors are logged and counted.
    pub async fn sweep_at(&self, now: DateTime<Utc>, retention_minutes: u64) -> SweepReport {
        let retention = Duration::minutes(retention_minutes.min(i64::MAX as u64 / 60_000) as i64);
        let mut report = SweepReport::default();

        let known = match self.session_activity().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Sweep could not read the session registry");
                report.failed += 1;
                return report;
            }
        };

        let mut registered: HashSet<Uuid> = HashSet::with_capacity(known.len());
        for (id, last_activity) in known {
            registered.insert(id);
            if now - last_activity <= retention {
                continue;
            }

            let Some(guard) = self.locks().try_lock(id).await else {
                debug!(session_id = %id, "Expired session is busy, skipping");
                report.skipped_busy += 1;
                continue;
            };

            let result = self.remove_locked(id).await;
            drop(guard);

            match result {
                Ok(_) => {
                    self.locks().forget(id).await;
                    report.removed.push(id);
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to sweep session");
                    report.failed += 1;
                }
            }
        }

        self.sweep_orphans(now, retention, &registered, &mut report).await;

        if !report.is_empty() {
            info!(
                removed = report.removed.len(),
                orphans = report.orphans_removed,
                busy = report.skipped_busy,
                failed = report.failed,
                "Retention sweep finished"
            );
        }
        report
    }

    /// Every registered session with its latest activity time
    async fn session_activity(&self) -> splitwave_common::Result<Vec<(Uuid, DateTime<Utc>)>> {
        let rows = sqlx::query(
            "SELECT s.session_id AS session_id, s.created_at AS created_at,
                    MAX(a.modified_at) AS last_modified
             FROM sessions s
             LEFT JOIN artifacts a ON a.session_id = s.session_id
             GROUP BY s.session_id, s.created_at",
        )
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_id: String = row.get("session_id");
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                warn!(session_id = %raw_id, "Registry row with malformed id");
                continue;
            };

            let created = parse_timestamp(&row.get::<String, _>("created_at"))?;
            let last_modified = row
                .get::<Option<String>, _>("last_modified")
                .map(|s| parse_timestamp(&s))
                .transpose()?;

            out.push((id, last_modified.map_or(created, |m| m.max(created))));
        }
        Ok(out)
    }

    async fn sweep_orphans(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
        registered: &HashSet<Uuid>,
        report: &mut SweepReport,
    ) {
        let root = self.sessions_dir().to_path_buf();
        let registered = registered.clone();

        let scan = tokio::task::spawn_blocking(move || find_expired_orphans(&root, &registered, now, retention)).await;
        let expired = match scan {
            Ok(expired) => expired,
            Err(e) => {
                warn!(error = %e, "Orphan scan task failed");
                report.failed += 1;
                return;
            }
        };

        for (id, dir) in expired {
            let Some(guard) = self.locks().try_lock(id).await else {
                report.skipped_busy += 1;
                continue;
            };

            // a row may have appeared since the scan
            let still_orphan = matches!(
                self.get_session(id).await,
                Err(splitwave_common::Error::NotFound(_))
            );
            let result = if still_orphan {
                tokio::fs::remove_dir_all(&dir).await.map(|_| true)
            } else {
                Ok(false)
            };
            drop(guard);
            self.locks().forget(id).await;

            match result {
                Ok(true) => {
                    info!(session_id = %id, "Removed orphaned session directory");
                    report.orphans_removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to remove orphaned session directory");
                    report.failed += 1;
                }
            }
        }
    }
}

/// Session directories with no registry row whose newest entry is past retention
fn find_expired_orphans(
    root: &Path,
    registered: &HashSet<Uuid>,
    now: DateTime<Utc>,
    retention: Duration,
) -> Vec<(Uuid, PathBuf)> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %root.display(), error = %e, "Cannot list sessions directory");
            return Vec::new();
        }
    };

    let mut expired = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Uuid::parse_str(n).ok())
        else {
            continue;
        };
        if registered.contains(&id) {
            continue;
        }

        if let Some(latest) = latest_modification(&path) {
            if now - latest > retention {
                expired.push((id, path));
            }
        }
    }
    expired
}

/// Newest modification time of a directory tree, including the root itself
fn latest_modification(dir: &Path) -> Option<DateTime<Utc>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter_map(|meta| meta.modified().ok())
        .map(DateTime::<Utc>::from)
        .max()
}

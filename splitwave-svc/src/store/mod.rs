//! Session store
//!
//! Maps session ids to their source upload and rendered tracks. The SQLite
//! registry is the source of truth for which sessions exist; files live under
//! `<root>/sessions/<id>/{source,tracks}/` and are never exposed to callers
//! except as opened handles or paths returned by the store itself.

pub mod locks;
pub mod schema;
pub mod sweep;

pub use locks::SessionLocks;
pub use sweep::SweepReport;

use crate::models::{Artifact, ArtifactKind, Session, SessionState, TrackUpload};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use splitwave_common::{Error, Result, ServiceConfig};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SOURCE_DIR: &str = "source";
const TRACKS_DIR: &str = "tracks";
const SOURCE_KEY: &str = "source";

/// Handle to the registry and artifact tree; cheap to clone
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    sessions_dir: PathBuf,
    locks: SessionLocks,
}

impl SessionStore {
    /// Open the store under the configured root folder
    pub async fn open(config: &ServiceConfig) -> Result<Self> {
        let sessions_dir = config.sessions_dir();
        tokio::fs::create_dir_all(&sessions_dir).await?;
        let pool = schema::init_database(&config.database_path()).await?;

        Ok(Self {
            pool,
            sessions_dir,
            locks: SessionLocks::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn session_dir(&self, id: Uuid) -> PathBuf {
        self.sessions_dir.join(id.to_string())
    }

    /// Directory holding a session's rendered tracks
    pub fn tracks_dir(&self, id: Uuid) -> PathBuf {
        self.session_dir(id).join(TRACKS_DIR)
    }

    fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        let sub = match artifact.kind {
            ArtifactKind::Source => SOURCE_DIR,
            ArtifactKind::Track => TRACKS_DIR,
        };
        self.session_dir(artifact.session_id)
            .join(sub)
            .join(&artifact.file_name)
    }

    /// Register a new session and store its source upload
    pub async fn create(&self, id: Uuid, original_file: &str, bytes: &[u8]) -> Result<Session> {
        if original_file.is_empty() || original_file.contains(['/', '\\']) {
            return Err(Error::InvalidInput(format!(
                "invalid source file name '{}'",
                original_file
            )));
        }

        let source_dir = self.session_dir(id).join(SOURCE_DIR);
        tokio::fs::create_dir_all(&source_dir).await?;
        tokio::fs::write(source_dir.join(original_file), bytes).await?;

        let now = now_micros();
        let stamp = timestamp(now);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sessions (session_id, state, original_file, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(SessionState::Uploaded.as_str())
        .bind(original_file)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO artifacts
                (session_id, kind, key, label, file_name, sample_rate, duration, byte_size, modified_at)
             VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(id.to_string())
        .bind(ArtifactKind::Source.as_str())
        .bind(SOURCE_KEY)
        .bind(original_file)
        .bind(original_file)
        .bind(bytes.len() as i64)
        .bind(&stamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(session_id = %id, file = original_file, bytes = bytes.len(), "Session created");

        Ok(Session {
            session_id: id,
            state: SessionState::Uploaded,
            original_file: original_file.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session> {
        let row = sqlx::query(
            "SELECT session_id, state, original_file, created_at, updated_at
             FROM sessions WHERE session_id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;

        Ok(Session {
            session_id: id,
            state: row
                .get::<String, _>("state")
                .parse()
                .map_err(Error::Internal)?,
            original_file: row.get("original_file"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        })
    }

    pub async fn set_state(&self, id: Uuid, state: SessionState) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET state = ?, updated_at = ? WHERE session_id = ?")
            .bind(state.as_str())
            .bind(timestamp(now_micros()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    /// Record analysis results on the session and its source artifact
    pub async fn mark_analyzed(&self, id: Uuid, sample_rate: u32, duration: f64) -> Result<()> {
        sqlx::query(
            "UPDATE artifacts SET sample_rate = ?, duration = ?
             WHERE session_id = ? AND kind = 'source'",
        )
        .bind(sample_rate as i64)
        .bind(duration)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.set_state(id, SessionState::Analyzed).await
    }

    /// The source upload and its on-disk location
    pub async fn source_artifact(&self, id: Uuid) -> Result<(Artifact, PathBuf)> {
        let artifact = self
            .artifacts(id, ArtifactKind::Source)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("source audio for session {}", id)))?;

        let path = self.artifact_path(&artifact);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("source audio for session {}", id)));
        }
        Ok((artifact, path))
    }

    /// Store one track, replacing any existing track with the same key
    pub async fn put_artifact(&self, id: Uuid, track: TrackUpload) -> Result<Artifact> {
        let mut committed = self.commit_tracks(id, vec![track]).await?;
        committed
            .pop()
            .ok_or_else(|| Error::Internal("track commit returned nothing".to_string()))
    }

    /// Publish a batch of tracks all-or-nothing
    ///
    /// Every track is first written to a hidden staging file and the registry
    /// rows are written inside an open transaction. Staged files are then
    /// renamed over their final names, each previous version moved aside
    /// first. The transaction commits only after every rename succeeded; any
    /// failure puts the previous files back, removes the staged ones and rolls
    /// the registry back, leaving the session exactly as it was.
    pub async fn commit_tracks(&self, id: Uuid, tracks: Vec<TrackUpload>) -> Result<Vec<Artifact>> {
        let _guard = self.locks.lock(id).await;

        // session must still exist once we hold the lock
        self.get_session(id).await?;

        let tracks_dir = self.tracks_dir(id);
        tokio::fs::create_dir_all(&tracks_dir).await?;

        let mut staged: Vec<StagedTrack> = Vec::with_capacity(tracks.len());
        for track in &tracks {
            match stage_track(&tracks_dir, track).await {
                Ok(paths) => staged.push(paths),
                Err(e) => {
                    warn!(session_id = %id, key = %track.key, error = %e, "Staging failed, discarding batch");
                    discard_staged(&staged).await;
                    return Err(e);
                }
            }
        }

        let (tx, artifacts) = match self.register_tracks(id, tracks).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Registry update failed, discarding batch");
                discard_staged(&staged).await;
                return Err(e);
            }
        };

        let mut published: Vec<(&StagedTrack, bool)> = Vec::with_capacity(staged.len());
        for (index, track) in staged.iter().enumerate() {
            match publish(track).await {
                Ok(had_previous) => published.push((track, had_previous)),
                Err(e) => {
                    warn!(session_id = %id, path = %track.target.display(), error = %e, "Publishing track failed, restoring previous tracks");
                    discard_staged(&staged[index..]).await;
                    restore_published(&published).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = tx.commit().await {
            warn!(session_id = %id, error = %e, "Registry commit failed, restoring previous tracks");
            restore_published(&published).await;
            return Err(e.into());
        }

        discard_backups(&published).await;
        debug!(session_id = %id, tracks = artifacts.len(), "Tracks committed");
        Ok(artifacts)
    }

    /// Upsert track rows and mark the session separated, uncommitted
    async fn register_tracks(
        &self,
        id: Uuid,
        tracks: Vec<TrackUpload>,
    ) -> Result<(Transaction<'static, Sqlite>, Vec<Artifact>)> {
        let now = now_micros();
        let stamp = timestamp(now);
        let mut tx = self.pool.begin().await?;
        let mut artifacts = Vec::with_capacity(tracks.len());

        for track in tracks {
            let file_name = track_file_name(&track.key);
            sqlx::query(
                "INSERT INTO artifacts
                    (session_id, kind, key, label, file_name, sample_rate, duration, byte_size, modified_at)
                 VALUES (?, 'track', ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (session_id, kind, key) DO UPDATE SET
                    label = excluded.label,
                    file_name = excluded.file_name,
                    sample_rate = excluded.sample_rate,
                    duration = excluded.duration,
                    byte_size = excluded.byte_size,
                    modified_at = excluded.modified_at",
            )
            .bind(id.to_string())
            .bind(&track.key)
            .bind(&track.label)
            .bind(&file_name)
            .bind(track.sample_rate as i64)
            .bind(track.duration)
            .bind(track.bytes.len() as i64)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;

            artifacts.push(Artifact {
                session_id: id,
                kind: ArtifactKind::Track,
                key: track.key,
                label: track.label,
                file_name,
                sample_rate: Some(track.sample_rate),
                duration: Some(track.duration),
                byte_size: track.bytes.len() as u64,
                modified_at: now,
            });
        }

        sqlx::query("UPDATE sessions SET state = ?, updated_at = ? WHERE session_id = ?")
            .bind(SessionState::Separated.as_str())
            .bind(&stamp)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        Ok((tx, artifacts))
    }

    /// Find a track by key, falling back to a case-insensitive file name prefix
    pub async fn get_artifact(&self, id: Uuid, label: &str) -> Result<(Artifact, PathBuf)> {
        let tracks = self.list_tracks(id).await?;

        let found = tracks
            .iter()
            .find(|a| a.key == label)
            .or_else(|| {
                let wanted = label.to_lowercase();
                tracks
                    .iter()
                    .find(|a| !wanted.is_empty() && a.file_name.to_lowercase().starts_with(&wanted))
            })
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("track '{}' in session {}", label, id)))?;

        let path = self.artifact_path(&found);
        Ok((found, path))
    }

    /// Track artifacts of a session, ordered by file name
    pub async fn list_tracks(&self, id: Uuid) -> Result<Vec<Artifact>> {
        self.get_session(id).await?;
        self.artifacts(id, ArtifactKind::Track).await
    }

    /// On-disk paths of a session's registered tracks
    pub async fn track_files(&self, id: Uuid) -> Result<Vec<PathBuf>> {
        let tracks = self.list_tracks(id).await?;
        Ok(tracks.iter().map(|a| self.artifact_path(a)).collect())
    }

    async fn artifacts(&self, id: Uuid, kind: ArtifactKind) -> Result<Vec<Artifact>> {
        let rows = sqlx::query(
            "SELECT kind, key, label, file_name, sample_rate, duration, byte_size, modified_at
             FROM artifacts WHERE session_id = ? AND kind = ?
             ORDER BY file_name",
        )
        .bind(id.to_string())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Artifact> {
                Ok(Artifact {
                    session_id: id,
                    kind: row.get::<String, _>("kind").parse().map_err(Error::Internal)?,
                    key: row.get("key"),
                    label: row.get("label"),
                    file_name: row.get("file_name"),
                    sample_rate: row.get::<Option<i64>, _>("sample_rate").map(|v| v as u32),
                    duration: row.get("duration"),
                    byte_size: row.get::<i64, _>("byte_size") as u64,
                    modified_at: parse_timestamp(&row.get::<String, _>("modified_at"))?,
                })
            })
            .collect()
    }

    /// Remove a session and every artifact it owns
    ///
    /// Returns `false` when there was nothing to delete.
    pub async fn delete_session(&self, id: Uuid) -> Result<bool> {
        let guard = self.locks.lock(id).await;
        let existed = self.remove_locked(id).await;
        drop(guard);
        self.locks.forget(id).await;
        existed
    }

    /// Removal body; caller holds the session lock
    async fn remove_locked(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        let had_row = result.rows_affected() > 0;

        let dir = self.session_dir(id);
        let had_dir = match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if had_row || had_dir {
            info!(session_id = %id, "Session deleted");
        }
        Ok(had_row || had_dir)
    }

    pub(crate) fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub(crate) fn locks(&self) -> &SessionLocks {
        &self.locks
    }
}

/// Final file name of a track
pub fn track_file_name(key: &str) -> String {
    format!("{}.wav", key)
}

/// A track written beside its final name, waiting to be renamed into place
struct StagedTrack {
    staging: PathBuf,
    target: PathBuf,
    /// Where the previous version sits while the batch is published
    backup: PathBuf,
}

async fn stage_track(tracks_dir: &Path, track: &TrackUpload) -> Result<StagedTrack> {
    if crate::models::track_key(&track.key).as_deref() != Some(track.key.as_str()) {
        return Err(Error::InvalidInput(format!("invalid track key '{}'", track.key)));
    }

    let file_name = track_file_name(&track.key);
    let staged = StagedTrack {
        staging: tracks_dir.join(format!(".{}.partial", file_name)),
        target: tracks_dir.join(&file_name),
        backup: tracks_dir.join(format!(".{}.previous", file_name)),
    };

    if let Err(e) = tokio::fs::write(&staged.staging, &track.bytes).await {
        // a partially written staging file must not survive
        let _ = tokio::fs::remove_file(&staged.staging).await;
        return Err(e.into());
    }
    Ok(staged)
}

async fn discard_staged(staged: &[StagedTrack]) {
    for track in staged {
        if let Err(e) = tokio::fs::remove_file(&track.staging).await {
            warn!(path = %track.staging.display(), error = %e, "Failed to remove staging file");
        }
    }
}

/// Rename one staged track into place, keeping the previous file as backup
///
/// Returns whether a previous version was moved aside. On failure the
/// previous file is back at the target.
async fn publish(track: &StagedTrack) -> Result<bool> {
    let had_previous = match tokio::fs::symlink_metadata(&track.target).await {
        Ok(meta) if meta.is_file() => {
            tokio::fs::rename(&track.target, &track.backup).await?;
            true
        }
        Ok(_) => {
            return Err(Error::Internal(format!(
                "track target {} is not a regular file",
                track.target.display()
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = tokio::fs::rename(&track.staging, &track.target).await {
        if had_previous {
            if let Err(restore) = tokio::fs::rename(&track.backup, &track.target).await {
                warn!(path = %track.target.display(), error = %restore, "Failed to restore previous track");
            }
        }
        return Err(e.into());
    }
    Ok(had_previous)
}

/// Undo published renames, newest first
async fn restore_published(published: &[(&StagedTrack, bool)]) {
    for (track, had_previous) in published.iter().rev() {
        let result = if *had_previous {
            tokio::fs::rename(&track.backup, &track.target).await
        } else {
            tokio::fs::remove_file(&track.target).await
        };
        if let Err(e) = result {
            warn!(path = %track.target.display(), error = %e, "Failed to roll back track");
        }
    }
}

async fn discard_backups(published: &[(&StagedTrack, bool)]) {
    for (track, _) in published.iter().filter(|(_, had_previous)| *had_previous) {
        match tokio::fs::remove_file(&track.backup).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %track.backup.display(), error = %e, "Failed to remove previous track"),
        }
    }
}

fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let now = now_micros();
        assert_eq!(parse_timestamp(&timestamp(now)).unwrap(), now);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = parse_timestamp("2026-01-01T00:00:00.000001Z").unwrap();
        let b = parse_timestamp("2026-01-01T00:00:00.000010Z").unwrap();
        assert!(timestamp(a) < timestamp(b));
    }

    #[tokio::test]
    async fn test_delete_waits_for_in_flight_commit() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SessionStore::open(&ServiceConfig::with_root_folder(dir.path()))
            .await
            .unwrap();
        let id = Uuid::new_v4();
        store.create(id, "song.wav", b"src").await.unwrap();

        let guard = store.locks().lock(id).await;

        let committer = store.clone();
        let commit = tokio::spawn(async move {
            let upload = TrackUpload {
                key: "vocals".to_string(),
                label: "Vocals".to_string(),
                sample_rate: 22050,
                duration: 1.0,
                bytes: b"v".to_vec(),
            };
            committer.commit_tracks(id, vec![upload]).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let deleter = store.clone();
        let delete = tokio::spawn(async move { deleter.delete_session(id).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(!commit.is_finished());
        assert!(!delete.is_finished());
        drop(guard);

        // the commit queued first, so it still sees the session
        let committed = commit.await.unwrap().unwrap();
        assert_eq!(committed.len(), 1);
        assert!(delete.await.unwrap().unwrap());

        assert!(matches!(store.get_session(id).await, Err(Error::NotFound(_))));
        assert!(!store.tracks_dir(id).exists());
    }

    #[test]
    fn test_track_file_name() {
        assert_eq!(track_file_name("electric_bass"), "electric_bass.wav");
    }
}

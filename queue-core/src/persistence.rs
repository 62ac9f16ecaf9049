//! Persistence Store — atomic per-guild JSON snapshots on disk.
//!
//! Every mutation to a guild's queue is followed by a full-document
//! rewrite: write to a sibling temp file, then rename over the real path.
//! A rename within the same directory is atomic on the filesystems this
//! targets, so a reader never observes a half-written snapshot, and a
//! crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::error::PersistError;
use crate::models::{GuildId, GuildSnapshot, SCHEMA_VERSION};

pub struct PersistenceStore {
    data_dir: PathBuf,
}

impl PersistenceStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, guild_id: &GuildId) -> PathBuf {
        self.data_dir.join(format!("{}.json", guild_id.0))
    }

    fn tmp_path_for(&self, guild_id: &GuildId) -> PathBuf {
        self.data_dir.join(format!("{}.json.tmp", guild_id.0))
    }

    /// Ensure the data directory exists. Called once at startup.
    pub async fn init(&self) -> Result<(), PersistError> {
        fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }

    /// Write `snapshot` for `guild_id`, replacing any prior snapshot.
    pub async fn save(
        &self,
        guild_id: &GuildId,
        snapshot: &GuildSnapshot,
    ) -> Result<(), PersistError> {
        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let tmp = self.tmp_path_for(guild_id);
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, self.path_for(guild_id)).await?;
        Ok(())
    }

    /// Load the snapshot for `guild_id`. A missing file is not an error
    /// (a guild with no queue history); a corrupt or schema-mismatched
    /// file is logged and treated as absent so a bad snapshot never blocks
    /// startup.
    pub async fn load(&self, guild_id: &GuildId) -> Result<Option<GuildSnapshot>, PersistError> {
        let path = self.path_for(guild_id);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<GuildSnapshot>(&body) {
            Ok(snapshot) if snapshot.schema == SCHEMA_VERSION => Ok(Some(snapshot)),
            Ok(snapshot) => {
                warn!(
                    guild_id = %guild_id.0,
                    found = snapshot.schema,
                    expected = SCHEMA_VERSION,
                    "discarding snapshot with mismatched schema version"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(guild_id = %guild_id.0, error = %e, "discarding corrupt snapshot");
                Ok(None)
            }
        }
    }

    /// List the guild IDs with a snapshot on disk, for startup restore.
    pub async fn list_guilds(&self) -> Result<Vec<GuildId>, PersistError> {
        let mut entries = match fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(id) = guild_id_from_snapshot_path(&path) {
                ids.push(GuildId(id));
            }
        }
        Ok(ids)
    }

    /// Remove the on-disk snapshot for `guild_id`, if any.
    pub async fn clear(&self, guild_id: &GuildId) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(guild_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn guild_id_from_snapshot_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".json").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryRecord, SourceTag};

    fn sample_record() -> EntryRecord {
        EntryRecord {
            title: "A Song".to_string(),
            duration_ms: 1000,
            canonical_url: "https://example.com/a".to_string(),
            uploader: None,
            source_tag: SourceTag::Generic,
            thumbnail_url: None,
            requester_id: "u1".to_string(),
            requester_display: "Alice".to_string(),
            enqueued_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.init().await.unwrap();

        let guild = GuildId("g1".to_string());
        let mut snapshot = GuildSnapshot::empty(&guild);
        snapshot.pending.push(sample_record());
        store.save(&guild, &snapshot).await.unwrap();

        let loaded = store.load(&guild).await.unwrap().unwrap();
        assert_eq!(loaded.pending.len(), 1);
        assert_eq!(loaded.pending[0].title, "A Song");
    }

    #[tokio::test]
    async fn missing_snapshot_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.init().await.unwrap();
        let guild = GuildId("absent".to_string());
        assert!(store.load(&guild).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.init().await.unwrap();
        let guild = GuildId("g2".to_string());
        fs::write(store.path_for(&guild), b"not json").await.unwrap();
        assert!(store.load(&guild).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_schema_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.init().await.unwrap();
        let guild = GuildId("g3".to_string());
        let mut snapshot = GuildSnapshot::empty(&guild);
        snapshot.schema = SCHEMA_VERSION + 1;
        let body = serde_json::to_vec(&snapshot).unwrap();
        fs::write(store.path_for(&guild), body).await.unwrap();
        assert!(store.load(&guild).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_guilds_finds_saved_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.init().await.unwrap();
        let guild = GuildId("g4".to_string());
        store.save(&guild, &GuildSnapshot::empty(&guild)).await.unwrap();

        let ids = store.list_guilds().await.unwrap();
        assert_eq!(ids, vec![GuildId("g4".to_string())]);
    }

    #[tokio::test]
    async fn clear_removes_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path());
        store.init().await.unwrap();
        let guild = GuildId("g5".to_string());
        store.save(&guild, &GuildSnapshot::empty(&guild)).await.unwrap();
        store.clear(&guild).await.unwrap();
        assert!(store.load(&guild).await.unwrap().is_none());
    }
}

//! File-based snapshot store.
//!
//! One file per snapshot under `DATA_DIR/snapshots/`, named
//! `snapshot_<unix-ts>_<leader>_<index>`. The payload is a bincode envelope
//! carrying the raft snapshot meta plus the JSON-encoded queue map, so a
//! snapshot alone is enough to rebuild a queue manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use openraft::{SnapshotMeta, StorageError, StorageIOError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{LogId, Node, NodeId, StorageResult, WireError};

pub type Meta = SnapshotMeta<NodeId, Node>;

/// Serialized snapshot: raft meta plus the queue-manager image
/// (`serde_json` bytes of a `BTreeMap<String, Queue>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub meta: Meta,
    pub queues: Vec<u8>,
}

impl SnapshotData {
    pub fn new(meta: Meta, queues: Vec<u8>) -> Self {
        Self { meta, queues }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::legacy())?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        let (data, _) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
        Ok(data)
    }
}

#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

pub type SnapshotStoreRef = Arc<SnapshotStore>;

impl SnapshotStore {
    pub fn new(data_dir: &Path) -> std::io::Result<Self> {
        let dir = data_dir.join("snapshots");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn generate_snapshot_id(last_log_id: Option<&LogId>) -> String {
        let now = chrono::Utc::now().timestamp();
        match last_log_id {
            Some(log_id) => format!("{}_{}_{}", now, log_id.leader_id, log_id.index),
            None => format!("{now}_0_0"),
        }
    }

    fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        self.dir.join(format!("snapshot_{snapshot_id}"))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join("snapshot.temp")
    }

    /// Parse `snapshot_<ts>_<leader>_<index>` into (ts, index); the leader
    /// component in the middle is ignored.
    fn parse_file_name(name: &str) -> Option<(i64, u64)> {
        let sid = name.strip_prefix("snapshot_")?;
        let (ts, _) = sid.split_once('_')?;
        let (_, index) = sid.rsplit_once('_')?;
        Some((ts.parse().ok()?, index.parse().ok()?))
    }

    fn io_read(e: impl std::error::Error + 'static) -> StorageError<NodeId> {
        StorageError::IO {
            source: StorageIOError::read(&e),
        }
    }

    fn io_write(e: impl std::error::Error + 'static) -> StorageError<NodeId> {
        StorageError::IO {
            source: StorageIOError::write(&e),
        }
    }

    pub async fn save(&self, snapshot: &SnapshotData) -> StorageResult<PathBuf> {
        let path = self.snapshot_path(&snapshot.meta.snapshot_id);
        let bytes = snapshot.serialize().map_err(Self::io_write)?;

        let mut file = tokio::fs::File::create(&path).await.map_err(Self::io_write)?;
        file.write_all(&bytes).await.map_err(Self::io_write)?;
        file.flush().await.map_err(Self::io_write)?;

        debug!(path = %path.display(), "saved snapshot");
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> StorageResult<SnapshotData> {
        let bytes = tokio::fs::read(path).await.map_err(Self::io_read)?;
        SnapshotData::deserialize(&bytes).map_err(Self::io_read)
    }

    /// Most recent snapshot by timestamp, ties broken by log index.
    pub async fn load_current(&self) -> StorageResult<Option<(PathBuf, SnapshotData)>> {
        let mut dir = tokio::fs::read_dir(&self.dir).await.map_err(Self::io_read)?;

        let mut newest: Option<(i64, u64, PathBuf)> = None;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let file_name = entry.file_name();
            let name = file_name.to_str().unwrap_or_default();
            let Some((ts, index)) = Self::parse_file_name(name) else {
                if name != "snapshot.temp" {
                    warn!(name, "ignoring unrecognized file in snapshot dir");
                }
                continue;
            };

            let newer = match &newest {
                Some((best_ts, best_index, _)) => {
                    ts > *best_ts || (ts == *best_ts && index > *best_index)
                }
                None => true,
            };
            if newer {
                newest = Some((ts, index, entry.path()));
            }
        }

        let Some((_, _, path)) = newest else {
            return Ok(None);
        };

        info!(path = %path.display(), "loading latest snapshot");
        let data = self.load(&path).await?;
        Ok(Some((path, data)))
    }

    /// Temp file an incoming snapshot stream is written into.
    pub async fn begin_receiving(&self) -> StorageResult<Box<tokio::fs::File>> {
        let path = self.temp_path();
        if path.exists() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        let file = tokio::fs::File::create(&path).await.map_err(Self::io_write)?;
        Ok(Box::new(file))
    }

    /// Persist a fully received snapshot under its final name and decode it.
    pub async fn install(
        &self,
        meta: &Meta,
        mut snapshot: Box<tokio::fs::File>,
    ) -> StorageResult<SnapshotData> {
        let dest = self.snapshot_path(&meta.snapshot_id);
        info!(snapshot_id = %meta.snapshot_id, path = %dest.display(), "installing snapshot");

        snapshot.rewind().await.map_err(Self::io_read)?;
        let mut dest_file = tokio::fs::File::create(&dest).await.map_err(Self::io_write)?;
        tokio::io::copy(&mut snapshot, &mut dest_file)
            .await
            .map_err(Self::io_write)?;
        dest_file.flush().await.map_err(Self::io_write)?;

        self.load(&dest).await
    }

    /// Delete every snapshot except `keep_id`.
    pub async fn reap_older_than(&self, keep_id: &str) -> StorageResult<()> {
        let mut dir = tokio::fs::read_dir(&self.dir).await.map_err(Self::io_read)?;

        while let Ok(Some(entry)) = dir.next_entry().await {
            let file_name = entry.file_name();
            let name = file_name.to_str().unwrap_or_default();
            if Self::parse_file_name(name).is_none() {
                continue;
            }
            if name != format!("snapshot_{keep_id}") {
                debug!(name, "removing superseded snapshot");
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(name, error = %e, "failed to remove old snapshot");
                }
            }
        }
        Ok(())
    }
}

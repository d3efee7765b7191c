//! Durable raft log and stable store, backed by a single embedded sled db.
//!
//! Two trees under `DATA_DIR/raft.db`: `raft-log` holds entries keyed by
//! big-endian index (so sled's byte order is index order), `raft-stable`
//! holds the vote and the purge watermark. Entries are stored as JSON so the
//! on-disk log stays self-describing, like the command envelopes it carries.

use std::fmt::Debug;
use std::ops::{Bound, RangeBounds};
use std::path::Path;

use openraft::storage::{LogFlushed, RaftLogStorage};
use openraft::{Entry, LogState, OptionalSend, RaftLogReader, StorageError, StorageIOError, Vote};

use super::{LogId, NodeId, StorageResult, TypeConfig};

const VOTE_KEY: &str = "vote";
const PURGED_KEY: &str = "last_purged";

#[derive(Debug, Clone)]
pub struct LogStore {
    db: sled::Db,
    logs: sled::Tree,
    stable: sled::Tree,
}

impl LogStore {
    pub fn open(data_dir: &Path) -> Result<Self, sled::Error> {
        let db = sled::open(data_dir.join("raft.db"))?;
        let logs = db.open_tree("raft-log")?;
        let stable = db.open_tree("raft-stable")?;
        Ok(Self { db, logs, stable })
    }

    fn read_err(e: impl std::error::Error + 'static) -> StorageError<NodeId> {
        StorageError::IO {
            source: StorageIOError::read(&e),
        }
    }

    fn write_err(e: impl std::error::Error + 'static) -> StorageError<NodeId> {
        StorageError::IO {
            source: StorageIOError::write(&e),
        }
    }

    fn decode_entry(bytes: &[u8]) -> StorageResult<Entry<TypeConfig>> {
        serde_json::from_slice(bytes).map_err(Self::read_err)
    }

    fn last_purged(&self) -> StorageResult<Option<LogId>> {
        match self.stable.get(PURGED_KEY).map_err(Self::read_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(Self::read_err)?)),
            None => Ok(None),
        }
    }

    async fn flush(&self) -> StorageResult<()> {
        self.db.flush_async().await.map_err(Self::write_err)?;
        Ok(())
    }

    pub(crate) async fn put_entries<I>(&self, entries: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = Entry<TypeConfig>>,
    {
        for entry in entries {
            let bytes = serde_json::to_vec(&entry).map_err(Self::write_err)?;
            self.logs
                .insert(entry.log_id.index.to_be_bytes(), bytes)
                .map_err(Self::write_err)?;
        }
        self.flush().await
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> StorageResult<Vec<Entry<TypeConfig>>> {
        let start = match range.start_bound() {
            Bound::Included(&i) => i,
            Bound::Excluded(&i) => i + 1,
            Bound::Unbounded => 0,
        };

        let mut entries = Vec::new();
        for item in self.logs.range(start.to_be_bytes()..) {
            let (key, value) = item.map_err(Self::read_err)?;
            let index = u64::from_be_bytes(key.as_ref().try_into().unwrap_or_default());
            if !range.contains(&index) {
                break;
            }
            entries.push(Self::decode_entry(&value)?);
        }
        Ok(entries)
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> StorageResult<LogState<TypeConfig>> {
        let last_log_id = match self.logs.last().map_err(Self::read_err)? {
            Some((_, value)) => Some(Self::decode_entry(&value)?.log_id),
            None => None,
        };

        let last_purged_log_id = self.last_purged()?;

        // After a purge the log may be empty while state exists beyond it.
        let last_log_id = last_log_id.or(last_purged_log_id);

        Ok(LogState {
            last_log_id,
            last_purged_log_id,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> StorageResult<()> {
        let bytes = serde_json::to_vec(vote).map_err(Self::write_err)?;
        self.stable.insert(VOTE_KEY, bytes).map_err(Self::write_err)?;
        self.flush().await
    }

    async fn read_vote(&mut self) -> StorageResult<Option<Vote<NodeId>>> {
        match self.stable.get(VOTE_KEY).map_err(Self::read_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(Self::read_err)?)),
            None => Ok(None),
        }
    }

    async fn append<I>(&mut self, entries: I, callback: LogFlushed<TypeConfig>) -> StorageResult<()>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        self.put_entries(entries).await?;
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId) -> StorageResult<()> {
        // Remove every entry with index >= log_id.index.
        let keys: Vec<_> = self
            .logs
            .range(log_id.index.to_be_bytes()..)
            .filter_map(|item| item.ok().map(|(key, _)| key))
            .collect();
        for key in keys {
            self.logs.remove(key).map_err(Self::write_err)?;
        }
        self.flush().await
    }

    async fn purge(&mut self, log_id: LogId) -> StorageResult<()> {
        let bytes = serde_json::to_vec(&log_id).map_err(Self::write_err)?;
        self.stable
            .insert(PURGED_KEY, bytes)
            .map_err(Self::write_err)?;

        // Remove every entry with index <= log_id.index.
        let keys: Vec<_> = self
            .logs
            .range(..=log_id.index.to_be_bytes())
            .filter_map(|item| item.ok().map(|(key, _)| key))
            .collect();
        for key in keys {
            self.logs.remove(key).map_err(Self::write_err)?;
        }
        self.flush().await
    }
}

//! Commit journal.
//!
//! Every committed write appends one framed CBOR [`CommitRecord`] holding the
//! full post-commit values of each changed item. Replaying the journal from
//! the start rebuilds the last committed snapshot.
//!
//! A crash can leave a partly written frame at the tail. Replay drops it and
//! truncates the medium back to the last complete frame. A complete frame with
//! a bad checksum is corruption and stops the open.

mod frame;

use crate::attribute::AttributeMap;
use crate::error::{CoreError, CoreResult};
use crate::store::{CommitDiff, StoreState};
use crate::types::{Icn, Item};
use frame::Decoded;
use itemdb_storage::StorageBackend;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One committed write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CommitRecord {
    pub(crate) icn: Icn,
    pub(crate) next_item: i64,
    pub(crate) items: Vec<(Item, Option<AttributeMap>)>,
}

impl CommitRecord {
    pub(crate) fn new(icn: Icn, next_item: i64, diff: &CommitDiff) -> Self {
        Self {
            icn,
            next_item,
            items: diff
                .changes
                .iter()
                .map(|c| (c.item, c.values.clone()))
                .collect(),
        }
    }

    fn apply(self, state: &mut StoreState) {
        for (item, values) in self.items {
            state.put(item, values);
        }
        state.next_item = state.next_item.max(self.next_item);
        state.icn = self.icn;
    }
}

/// Append-only log of commit records over a storage backend.
pub(crate) struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl Journal {
    pub(crate) fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends a record and makes it durable when configured to.
    pub(crate) fn append(&self, record: &CommitRecord) -> CoreResult<u64> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(record, &mut payload)
            .map_err(|e| CoreError::codec(e.to_string()))?;
        let bytes = frame::encode(&payload)?;

        let mut backend = self.backend.lock();
        let offset = backend.append(&bytes)?;
        if self.sync_on_commit {
            backend.sync()?;
        }
        Ok(offset)
    }

    /// Rebuilds the committed state, truncating a torn tail.
    pub(crate) fn replay(&self) -> CoreResult<StoreState> {
        let mut backend = self.backend.lock();
        let data = backend.read_all()?;
        let mut state = StoreState::default();
        let mut offset = 0usize;
        let mut records = 0usize;

        while offset < data.len() {
            match frame::decode(&data, offset)? {
                Decoded::Frame { payload, len } => {
                    let record: CommitRecord = ciborium::de::from_reader(payload).map_err(|e| {
                        CoreError::journal_corruption(offset as u64, e.to_string())
                    })?;
                    if record.icn <= state.icn {
                        return Err(CoreError::journal_corruption(
                            offset as u64,
                            format!("{} does not follow {}", record.icn, state.icn),
                        ));
                    }
                    record.apply(&mut state);
                    offset += len;
                    records += 1;
                }
                Decoded::Torn => {
                    tracing::warn!(
                        offset,
                        dropped = data.len() - offset,
                        "truncating torn journal tail"
                    );
                    backend.truncate(offset as u64)?;
                    break;
                }
            }
        }

        tracing::debug!(records, icn = %state.icn, items = state.items.len(), "journal replayed");
        Ok(state)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

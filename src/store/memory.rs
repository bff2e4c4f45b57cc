//! In-process revisioned key-value store.
//!
//! Mirrors the MVCC semantics the watch protocol depends on:
//! - one global revision, bumped by every write
//! - per-key `version` / `create_revision` / `mod_revision`
//! - change streams resumable from any retained revision
//!
//! Useful for embedding the watch manager without a cluster, and as the
//! deterministic store behind the watch tests.

use std::collections::BTreeMap;

use futures::future;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use super::ChangeEvent;
use super::EventType;
use super::KeyRange;
use super::KeyValue;
use super::KvStore;
use super::Snapshot;
use super::WatchBatch;
use super::WatchStream;
use crate::Error;
use crate::Result;
use crate::WatchError;

const DEFAULT_NOTICE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Notice {
    Change(ChangeEvent),
    Cancel { revision: i64, reason: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    revision: i64,
    /// History below this revision has been discarded
    compacted: i64,
    kvs: BTreeMap<Vec<u8>, KeyValue>,
    history: Vec<ChangeEvent>,
}

/// Revisioned in-memory [`KvStore`].
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    notices: broadcast::Sender<Notice>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("revision", &state.revision)
            .field("compacted", &state.compacted)
            .field("keys", &state.kvs.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTICE_CAPACITY)
    }

    /// `capacity` bounds how far a change stream may fall behind before it is
    /// cancelled by the store.
    pub fn with_capacity(capacity: usize) -> Self {
        let (notices, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(MemoryState::default()),
            notices,
        }
    }

    /// Current store revision.
    pub fn revision(&self) -> i64 {
        self.state.lock().revision
    }

    /// Stores `value` under `key` and returns the new revision.
    ///
    /// Seeding helper without key validation; [`KvStore::put`] rejects an
    /// empty key the way etcd does.
    pub fn put_value(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> i64 {
        let key = key.as_ref();
        let mut state = self.state.lock();
        state.revision += 1;
        let revision = state.revision;

        let kv = match state.kvs.get(key) {
            Some(prev) => KeyValue {
                key: key.to_vec(),
                value: value.as_ref().to_vec(),
                create_revision: prev.create_revision,
                mod_revision: revision,
                version: prev.version + 1,
            },
            None => KeyValue {
                key: key.to_vec(),
                value: value.as_ref().to_vec(),
                create_revision: revision,
                mod_revision: revision,
                version: 1,
            },
        };
        state.kvs.insert(key.to_vec(), kv.clone());

        self.publish(
            &mut state,
            ChangeEvent {
                event_type: EventType::Put,
                kv,
            },
        );
        revision
    }

    /// Deletes `key`. Returns the new revision, or `None` if the key was absent.
    pub fn delete(
        &self,
        key: impl AsRef<[u8]>,
    ) -> Option<i64> {
        let key = key.as_ref();
        let mut state = self.state.lock();
        state.kvs.remove(key)?;
        state.revision += 1;
        let revision = state.revision;

        self.publish(
            &mut state,
            ChangeEvent {
                event_type: EventType::Delete,
                kv: KeyValue {
                    key: key.to_vec(),
                    mod_revision: revision,
                    ..Default::default()
                },
            },
        );
        Some(revision)
    }

    /// Discards history below `revision`. Watches asking to start earlier are
    /// refused with a compaction notice.
    pub fn compact(
        &self,
        revision: i64,
    ) {
        let mut state = self.state.lock();
        let revision = revision.min(state.revision);
        if revision <= state.compacted {
            return;
        }
        state.history.retain(|e| e.kv.mod_revision >= revision);
        state.compacted = revision;
        debug!(revision, "memory store compacted");
    }

    /// Closes every open change stream with `reason`.
    pub fn cancel_watches(
        &self,
        reason: impl Into<String>,
    ) {
        let state = self.state.lock();
        let _ = self.notices.send(Notice::Cancel {
            revision: state.revision,
            reason: reason.into(),
        });
    }

    /// Number of change streams currently open.
    pub fn watcher_count(&self) -> usize {
        self.notices.receiver_count()
    }

    // Called with the state lock held so subscribers never observe a gap
    // between replayed history and live notices.
    fn publish(
        &self,
        state: &mut MemoryState,
        event: ChangeEvent,
    ) {
        trace!(revision = event.kv.mod_revision, event_type = ?event.event_type, "memory store change");
        state.history.push(event.clone());
        let _ = self.notices.send(Notice::Change(event));
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(
        &self,
        key: &[u8],
        prefix: bool,
    ) -> Result<Snapshot> {
        if key.is_empty() && !prefix {
            return Err(Error::EmptyKey);
        }

        let range = KeyRange::new(key, prefix);
        let state = self.state.lock();
        let kvs = if prefix {
            state
                .kvs
                .range(key.to_vec()..)
                .take_while(|(k, _)| range.contains(k))
                .map(|(_, kv)| kv.clone())
                .collect()
        } else {
            state.kvs.get(key).cloned().into_iter().collect()
        };

        Ok(Snapshot {
            revision: state.revision,
            kvs,
        })
    }

    async fn watch(
        &self,
        key: &[u8],
        prefix: bool,
        start_revision: i64,
    ) -> Result<WatchStream> {
        let range = KeyRange::new(key, prefix);
        let state = self.state.lock();

        if start_revision > 0 && start_revision < state.compacted {
            debug!(start_revision, compacted = state.compacted, "watch start revision compacted");
            let batch = WatchBatch::compacted(state.revision, state.compacted);
            return Ok(stream::once(future::ready(Ok(batch))).boxed());
        }

        let receiver = self.notices.subscribe();
        let backlog: Vec<ChangeEvent> = state
            .history
            .iter()
            .filter(|e| e.kv.mod_revision >= start_revision && range.contains(&e.kv.key))
            .cloned()
            .collect();
        let revision = state.revision;
        drop(state);

        let live = BroadcastStream::new(receiver).filter_map(move |notice| {
            let item: Option<Result<WatchBatch>> = match notice {
                Ok(Notice::Change(event)) => {
                    if event.kv.mod_revision >= start_revision && range.contains(&event.kv.key) {
                        Some(Ok(WatchBatch::events(event.kv.mod_revision, vec![event])))
                    } else {
                        None
                    }
                }
                Ok(Notice::Cancel { revision, reason }) => Some(Ok(WatchBatch::canceled(revision, reason))),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Err(WatchError::CanceledByStore(
                    format!("watcher fell behind by {skipped} events"),
                )
                .into())),
            };
            future::ready(item)
        });

        if backlog.is_empty() {
            return Ok(live.boxed());
        }
        let replay = stream::once(future::ready(Ok(WatchBatch::events(revision, backlog))));
        Ok(replay.chain(live).boxed())
    }

    async fn put(
        &self,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.put_value(key, value);
        Ok(())
    }
}

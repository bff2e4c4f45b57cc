//! Remote store abstraction consumed by the watch manager.
//!
//! The watch manager only needs three capabilities from the store: a
//! consistent read at the latest revision, a change stream resumable from a
//! given revision, and a plain write. [`KvStore`] captures exactly that, and
//! is implemented by:
//! - [`EtcdClient`] - etcd v3 over gRPC
//! - [`MemoryStore`] - in-process revisioned store with the same semantics

mod etcd;
mod key_range;
mod memory;

pub use etcd::*;
pub use key_range::*;
pub use memory::*;


use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::Result;
use crate::WatchError;

/// Point-in-time state of a single key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Revision at which the key was (last) created
    pub create_revision: i64,
    /// Revision of the last change to the key
    pub mod_revision: i64,
    /// 1 on creation, +1 per modification, 0 once deleted
    pub version: i64,
}

/// Type tag of a change event, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
    /// A tag this crate does not know about; carried so it can be skipped.
    Unrecognized(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub event_type: EventType,
    pub kv: KeyValue,
}

impl ChangeEvent {
    /// First appearance of the key since it was last absent.
    pub fn is_create(&self) -> bool {
        self.event_type == EventType::Put && self.kv.create_revision == self.kv.mod_revision
    }

    /// Value change of a key that already existed.
    pub fn is_modify(&self) -> bool {
        self.event_type == EventType::Put && self.kv.create_revision != self.kv.mod_revision
    }
}

/// Consistent read of a key or prefix together with the revision it is valid at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: i64,
    pub kvs: Vec<KeyValue>,
}

/// One message of a change stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchBatch {
    /// Store revision when the batch was produced
    pub revision: i64,
    pub events: Vec<ChangeEvent>,
    /// The store is about to close the stream
    pub canceled: bool,
    pub cancel_reason: String,
    /// Non-zero when the requested start revision was compacted
    pub compact_revision: i64,
}

impl WatchBatch {
    pub fn events(
        revision: i64,
        events: Vec<ChangeEvent>,
    ) -> Self {
        Self {
            revision,
            events,
            ..Default::default()
        }
    }

    pub fn canceled(
        revision: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            revision,
            canceled: true,
            cancel_reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn compacted(
        revision: i64,
        compact_revision: i64,
    ) -> Self {
        Self {
            revision,
            canceled: true,
            compact_revision,
            ..Default::default()
        }
    }

    /// Stream-level error carried by this batch, if any.
    pub fn err(&self) -> Option<WatchError> {
        if self.compact_revision != 0 {
            return Some(WatchError::Compacted {
                compact_revision: self.compact_revision,
            });
        }
        if self.canceled {
            if self.cancel_reason.is_empty() {
                return Some(WatchError::StreamClosing);
            }
            return Some(WatchError::CanceledByStore(self.cancel_reason.clone()));
        }
        None
    }
}

/// Change stream returned by [`KvStore::watch`]. Dropping it cancels the
/// underlying watch.
pub type WatchStream = BoxStream<'static, Result<WatchBatch>>;

/// Capabilities the watch manager consumes from the remote store.
///
/// Implementations must be safe for concurrent use: every call is
/// independent and may run in parallel with any other.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Reads `key` (or every key under the prefix `key`) at the latest revision.
    async fn get(
        &self,
        key: &[u8],
        prefix: bool,
    ) -> Result<Snapshot>;

    /// Opens a change stream for `key` (or the prefix `key`) that includes
    /// every change with revision `>= start_revision`.
    async fn watch(
        &self,
        key: &[u8],
        prefix: bool,
        start_revision: i64,
    ) -> Result<WatchStream>;

    /// Writes `value` under `key`.
    async fn put(
        &self,
        key: &[u8],
        value: &[u8],
    ) -> Result<()>;
}

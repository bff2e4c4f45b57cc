//! Key-space watches.
//!
//! A watch reads a consistent snapshot of a key (or prefix), then follows the
//! store's change stream from `snapshot.revision + 1`. Anchoring the stream to
//! the snapshot revision is what keeps the notification sequence free of gaps
//! and duplicates.
//!
//! ```text
//! add_watch() ──► WatchRegistry (key -> CancellationToken)
//!                      │ spawn under the same lock
//!                      ▼
//!                 WatchWorker ── get() ──► observed(..)
//!                      │
//!                      └── watch(rev + 1) ──► created / modified / deleted
//!                                                      │
//!                                            exited(reason), exactly once
//! ```

mod event;
mod manager;
mod registry;
mod worker;

pub use event::*;
pub use manager::*;
pub use registry::*;
pub use worker::*;


#[cfg(test)]
use mockall::automock;

/// Receiver of watch notifications.
///
/// Every method is called synchronously from the watch's own task, in the
/// order the store produced the changes. A slow implementation stalls that
/// watch only.
#[cfg_attr(test, automock)]
pub trait Listener: Send + Sync {
    /// A key present in the initial snapshot.
    fn observed(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    );

    fn created(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    );

    fn modified(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    );

    /// `version` is the post-delete version, always 0 for etcd.
    fn deleted(
        &self,
        key: &[u8],
        version: i64,
    );

    /// Final call for a watch. `reason` is "context canceled" when the watch
    /// was removed by the caller.
    fn exited(
        &self,
        reason: &str,
    );
}

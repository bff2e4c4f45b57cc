use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::classify;
use super::Listener;
use super::WatchEventKind;
use crate::metrics::ACTIVE_WATCH_WORKERS;
use crate::metrics::WATCH_EVENTS_DELIVERED;
use crate::metrics::WATCH_EXITS;
use crate::store::ChangeEvent;
use crate::store::KeyRange;
use crate::store::KvStore;
use crate::store::Snapshot;
use crate::Result;
use crate::WatchConfig;
use crate::WatchError;

/// Drives a single watch from snapshot to exit.
///
/// # Protocol
/// 1. Read `key` at the latest revision, bounded by `snapshot_timeout`. This
///    bound is independent of the watch scope.
/// 2. Optionally hand every snapshot item to [`Listener::observed`].
/// 3. Open the change stream at `snapshot.revision + 1`.
/// 4. Deliver events in store order until the scope is cancelled or the
///    stream fails.
/// 5. Call [`Listener::exited`] exactly once.
///
/// The worker never touches the registry. A worker that failed on its own
/// leaves its (now dead) entry behind until the caller removes it.
pub struct WatchWorker<S: KvStore> {
    store: Arc<S>,
    range: KeyRange,
    listener: Arc<dyn Listener>,
    scope: CancellationToken,
    snapshot_timeout: Duration,
    deliver_snapshot: bool,
}

impl<S: KvStore> WatchWorker<S> {
    pub fn new(
        store: Arc<S>,
        range: KeyRange,
        listener: Arc<dyn Listener>,
        scope: CancellationToken,
        config: &WatchConfig,
    ) -> Self {
        Self {
            store,
            range,
            listener,
            scope,
            snapshot_timeout: config.snapshot_timeout(),
            deliver_snapshot: config.deliver_snapshot,
        }
    }

    /// Runs the protocol to completion. Always ends with `exited`.
    pub async fn run(self) {
        ACTIVE_WATCH_WORKERS.inc();
        debug!(key = %self.key_display(), prefix = self.range.is_prefix(), "watch worker started");

        let err = match self.drive().await {
            Ok(never) => match never {},
            Err(e) => e,
        };

        let cause = if err.is_canceled() { "canceled" } else { "failed" };
        WATCH_EXITS.with_label_values(&[cause]).inc();
        ACTIVE_WATCH_WORKERS.dec();

        debug!(key = %self.key_display(), reason = %err, cause, "watch worker exited");
        self.listener.exited(&err.to_string());
    }

    async fn drive(&self) -> Result<Infallible> {
        let snapshot = self.snapshot().await?;
        debug!(key = %self.key_display(), revision = snapshot.revision, items = snapshot.kvs.len(), "snapshot read");

        if self.deliver_snapshot {
            for kv in &snapshot.kvs {
                self.ensure_active()?;
                self.listener.observed(&kv.key, &kv.value, kv.version);
            }
        }

        let start_revision = snapshot.revision + 1;
        let mut stream = tokio::select! {
            biased;
            _ = self.scope.cancelled() => {
                return Err(WatchError::ScopeCanceled.into());
            }
            opened = self.store.watch(self.range.key(), self.range.is_prefix(), start_revision) => opened?,
        };
        trace!(key = %self.key_display(), start_revision, "change stream opened");

        loop {
            let batch = tokio::select! {
                biased;
                _ = self.scope.cancelled() => {
                    return Err(WatchError::ScopeCanceled.into());
                }
                next = stream.next() => match next {
                    Some(batch) => batch?,
                    None => return Err(WatchError::StreamEnded.into()),
                },
            };

            if let Some(e) = batch.err() {
                return Err(e.into());
            }

            for event in &batch.events {
                self.ensure_active()?;
                self.deliver(event, snapshot.revision);
            }
        }
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        match timeout(
            self.snapshot_timeout,
            self.store.get(self.range.key(), self.range.is_prefix()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WatchError::SnapshotTimeout(self.snapshot_timeout).into()),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.scope.is_cancelled() {
            return Err(WatchError::ScopeCanceled.into());
        }
        Ok(())
    }

    fn deliver(
        &self,
        event: &ChangeEvent,
        snapshot_revision: i64,
    ) {
        let Some(kind) = classify(event) else {
            trace!(key = %self.key_display(), event_type = ?event.event_type, "skipping unrecognized event");
            return;
        };

        let kv = &event.kv;
        if kv.mod_revision <= snapshot_revision {
            warn!(
                key = %self.key_display(),
                revision = kv.mod_revision,
                snapshot_revision,
                "dropping event already covered by the snapshot"
            );
            return;
        }

        match kind {
            WatchEventKind::Create => self.listener.created(&kv.key, &kv.value, kv.version),
            WatchEventKind::Modify => self.listener.modified(&kv.key, &kv.value, kv.version),
            WatchEventKind::Delete => self.listener.deleted(&kv.key, kv.version),
        }
        WATCH_EVENTS_DELIVERED.with_label_values(&[kind.as_str()]).inc();
    }

    fn key_display(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.range.key())
    }
}

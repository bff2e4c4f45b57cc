use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::runtime::Handle;
use tracing::debug;
use tracing::info;

use super::Listener;
use super::WatchRegistry;
use super::WatchWorker;
use crate::store::EtcdClient;
use crate::store::KeyRange;
use crate::store::KvStore;
use crate::ClientConfig;
use crate::Error;
use crate::Result;
use crate::WatchConfig;
use crate::WatcherConfig;

/// Watch manager over an etcd cluster.
pub type EtcdWatcher = WatchManager<EtcdClient>;

/// Public facade over the watch registry and its workers.
///
/// At most one watch exists per distinct key. Adding a watch registers a
/// cancellation scope and spawns a [`WatchWorker`] under the same registry
/// lock; removing it cancels that scope. Neither call waits on I/O: worker
/// failures surface later through [`Listener::exited`].
///
/// Once [`close`](Self::close) has been called every further
/// [`add_watch`](Self::add_watch) or [`put`](Self::put) fails with
/// [`Error::Closed`].
pub struct WatchManager<S: KvStore> {
    store: ArcSwapOption<S>,
    registry: WatchRegistry,
    config: WatchConfig,
}

impl<S: KvStore> std::fmt::Debug for WatchManager<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("closed", &self.is_closed())
            .field("watches", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<S: KvStore> WatchManager<S> {
    pub fn new(
        store: Arc<S>,
        config: WatchConfig,
    ) -> Self {
        Self {
            store: ArcSwapOption::from(Some(store)),
            registry: WatchRegistry::new(),
            config,
        }
    }

    /// Starts watching `key`, or every key under the prefix `key`.
    ///
    /// Returns `Ok(false)` with no side effect if `key` is already watched.
    /// The worker is launched fire-and-forget on the current Tokio runtime.
    ///
    /// A concurrent [`close`](Self::close) either sweeps the new watch like
    /// any other, or wins the race and no worker is spawned.
    ///
    /// # Errors
    /// - [`Error::Closed`] after [`close`](Self::close)
    /// - [`Error::Fatal`] when called outside a Tokio runtime
    pub fn add_watch(
        &self,
        key: impl AsRef<[u8]>,
        prefix: bool,
        listener: Arc<dyn Listener>,
    ) -> Result<bool> {
        let key = key.as_ref();
        let store = self.store()?;
        let runtime = Handle::try_current().map_err(|e| Error::Fatal(format!("add_watch needs a tokio runtime: {e}")))?;

        let registered = self.launch(key, prefix, store, listener, &runtime)?;

        if registered {
            debug!(key = %String::from_utf8_lossy(key), prefix, "watch added");
        }
        Ok(registered)
    }

    /// Registers `key` and spawns its worker under the registry lock.
    ///
    /// `store` was loaded before the lock was taken, so a `close()` may have
    /// happened since. `close()` releases the store before sweeping the
    /// registry: a worker is spawned only while the store is still held, and a
    /// watch added that way is swept like any other. Otherwise nothing is
    /// spawned, the listener is dropped without any call, and the result is
    /// [`Error::Closed`].
    pub(super) fn launch(
        &self,
        key: &[u8],
        prefix: bool,
        store: Arc<S>,
        listener: Arc<dyn Listener>,
        runtime: &Handle,
    ) -> Result<bool> {
        let mut spawned = false;
        let registered = self.registry.register_with(key, |scope| {
            if self.is_closed() {
                return;
            }
            let worker = WatchWorker::new(store, KeyRange::new(key, prefix), listener, scope, &self.config);
            runtime.spawn(worker.run());
            spawned = true;
        });

        if !spawned && self.is_closed() {
            if registered {
                self.registry.deregister(key);
            }
            return Err(Error::Closed);
        }
        Ok(registered)
    }

    /// Cancels the watch on `key`. Returns `false` if `key` is not watched.
    ///
    /// The worker stops at its next suspension point; its `exited` call is
    /// the only reliable completion signal.
    pub fn remove_watch(
        &self,
        key: impl AsRef<[u8]>,
    ) -> bool {
        let key = key.as_ref();
        let removed = self.registry.deregister(key);
        if removed {
            debug!(key = %String::from_utf8_lossy(key), "watch removed");
        }
        removed
    }

    /// Cancels every watch in one sweep. Returns how many were removed.
    pub fn clear_watch(&self) -> usize {
        let cleared = self.registry.clear();
        debug!(cleared, "watches cleared");
        cleared
    }

    /// Cancels every watch and releases the store. Calling it again is a no-op.
    pub fn close(&self) {
        let released = self.store.swap(None);
        let cleared = self.registry.clear();
        if released.is_some() {
            info!(cleared, "watch manager closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.store.load().is_none()
    }

    /// Writes `value` under `key`. Errors from the store are returned as is.
    pub async fn put(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        let store = self.store()?;
        store.put(key.as_ref(), value.as_ref()).await
    }

    pub fn is_watching(
        &self,
        key: impl AsRef<[u8]>,
    ) -> bool {
        self.registry.contains(key.as_ref())
    }

    /// Number of registered watches, including ones whose worker already exited.
    pub fn watch_count(&self) -> usize {
        self.registry.len()
    }

    fn store(&self) -> Result<Arc<S>> {
        self.store.load_full().ok_or(Error::Closed)
    }
}

impl<S: KvStore> Drop for WatchManager<S> {
    fn drop(&mut self) {
        let cleared = self.registry.clear();
        if cleared > 0 {
            debug!(cleared, "watch manager dropped with active watches");
        }
    }
}

impl WatchManager<EtcdClient> {
    /// Connects to an etcd cluster with default settings apart from the
    /// endpoints and the connect timeout.
    ///
    /// # Errors
    /// - [`crate::NetworkError::EmptyEndpoints`] if `endpoints` is empty
    /// - [`crate::NetworkError::Unreachable`] if no endpoint answered in time
    pub async fn connect<I, E>(
        endpoints: I,
        connect_timeout: Duration,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        let client = ClientConfig {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            connect_timeout_in_ms: connect_timeout.as_millis() as u64,
            ..Default::default()
        };
        let store = EtcdClient::connect(client).await?;
        Ok(Self::new(Arc::new(store), WatchConfig::default()))
    }

    /// Connects using a loaded [`WatcherConfig`].
    pub async fn from_config(config: &WatcherConfig) -> Result<Self> {
        let store = EtcdClient::connect(config.client.clone()).await?;
        Ok(Self::new(Arc::new(store), config.watch.clone()))
    }
}

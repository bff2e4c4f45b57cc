use std::sync::Arc;
use std::time::Duration;

use etcd_watcher::Listener;
use etcd_watcher::MemoryStore;
use etcd_watcher::WatchConfig;
use etcd_watcher::WatchManager;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Observed(String, String, i64),
    Created(String, String, i64),
    Modified(String, String, i64),
    Deleted(String, i64),
    Exited(String),
}

impl Seen {
    pub fn is_exit(&self) -> bool {
        matches!(self, Seen::Exited(_))
    }
}

pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Seen>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Listener for ChannelListener {
    fn observed(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        let _ = self.tx.send(Seen::Observed(text(key), text(value), version));
    }

    fn created(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        let _ = self.tx.send(Seen::Created(text(key), text(value), version));
    }

    fn modified(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        let _ = self.tx.send(Seen::Modified(text(key), text(value), version));
    }

    fn deleted(
        &self,
        key: &[u8],
        version: i64,
    ) {
        let _ = self.tx.send(Seen::Deleted(text(key), version));
    }

    fn exited(
        &self,
        reason: &str,
    ) {
        let _ = self.tx.send(Seen::Exited(reason.to_string()));
    }
}

pub fn setup() -> (Arc<MemoryStore>, WatchManager<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let manager = WatchManager::new(store.clone(), WatchConfig::default());
    (store, manager)
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("Listener channel closed")
}

pub async fn until_exit(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Vec<Seen> {
    let mut seen = Vec::new();
    loop {
        let item = next(rx).await;
        let done = item.is_exit();
        seen.push(item);
        if done {
            return seen;
        }
    }
}

/// Waits until the store reports `count` open change streams.
pub async fn wait_for_streams(
    store: &MemoryStore,
    count: usize,
) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while store.watcher_count() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("change streams never opened");
}

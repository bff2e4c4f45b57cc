use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Listener;

/// One listener call, as recorded by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Observed { key: Vec<u8>, value: Vec<u8>, version: i64 },
    Created { key: Vec<u8>, value: Vec<u8>, version: i64 },
    Modified { key: Vec<u8>, value: Vec<u8>, version: i64 },
    Deleted { key: Vec<u8>, version: i64 },
    Exited(String),
}

impl Notification {
    pub fn observed(
        key: &str,
        value: &str,
        version: i64,
    ) -> Self {
        Notification::Observed {
            key: key.into(),
            value: value.into(),
            version,
        }
    }

    pub fn created(
        key: &str,
        value: &str,
        version: i64,
    ) -> Self {
        Notification::Created {
            key: key.into(),
            value: value.into(),
            version,
        }
    }

    pub fn modified(
        key: &str,
        value: &str,
        version: i64,
    ) -> Self {
        Notification::Modified {
            key: key.into(),
            value: value.into(),
            version,
        }
    }

    pub fn deleted(
        key: &str,
        version: i64,
    ) -> Self {
        Notification::Deleted {
            key: key.into(),
            version,
        }
    }

    pub fn exited(reason: &str) -> Self {
        Notification::Exited(reason.to_string())
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Notification::Exited(_))
    }
}

/// Listener that forwards every call into a channel.
pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn record(
        &self,
        notification: Notification,
    ) {
        let _ = self.tx.send(notification);
    }
}

impl Listener for RecordingListener {
    fn observed(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        self.record(Notification::Observed {
            key: key.to_vec(),
            value: value.to_vec(),
            version,
        });
    }

    fn created(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        self.record(Notification::Created {
            key: key.to_vec(),
            value: value.to_vec(),
            version,
        });
    }

    fn modified(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        self.record(Notification::Modified {
            key: key.to_vec(),
            value: value.to_vec(),
            version,
        });
    }

    fn deleted(
        &self,
        key: &[u8],
        version: i64,
    ) {
        self.record(Notification::Deleted {
            key: key.to_vec(),
            version,
        });
    }

    fn exited(
        &self,
        reason: &str,
    ) {
        self.record(Notification::Exited(reason.to_string()));
    }
}

/// Waits for the next notification, panicking after one second.
pub async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("Listener channel closed")
}

/// Collects notifications up to and including the exit.
pub async fn drain_until_exit(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    loop {
        let notification = next_notification(rx).await;
        let done = notification.is_exit();
        seen.push(notification);
        if done {
            return seen;
        }
    }
}

//! Key-space watches over an etcd v3 compatible store.
//!
//! Register interest in a key or a key prefix and receive its current state
//! followed by every create, modify and delete, in store order, through a
//! [`Listener`].
//!
//! ```ignore
//! let watcher = EtcdWatcher::connect(["127.0.0.1:2379"], Duration::from_secs(3)).await?;
//! watcher.add_watch("/services/", true, Arc::new(MyListener))?;
//! watcher.put("/services/api", "10.0.0.7:8080").await?;
//! // ...
//! watcher.close();
//! ```
//!
//! The store is reached through the [`KvStore`] trait. [`EtcdClient`] speaks
//! gRPC to a cluster; [`MemoryStore`] offers the same revision semantics
//! in-process.

mod config;
mod errors;
pub mod metrics;
pub mod proto;
pub mod store;
mod utils;
mod watch;

pub use config::*;
pub use errors::*;
pub use store::EtcdClient;
pub use store::KvStore;
pub use store::MemoryStore;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

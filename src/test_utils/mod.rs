//! Components shared by the unit tests.
mod fake_etcd;
mod listener;

pub use fake_etcd::*;
pub use listener::*;

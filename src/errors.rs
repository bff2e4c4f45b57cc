//! Watch Manager Error Hierarchy
//!
//! Errors are split by where they surface:
//! - [`NetworkError`]: the remote store could not be reached or rejected a call
//! - [`WatchError`]: a single watch stream terminated
//! - [`Error::Closed`]: the manager was used after `close()`
//!
//! Asynchronous failures never travel back through `add_watch`. They are
//! rendered with `Display` and handed to [`crate::Listener::exited`].

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote store connectivity and RPC failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Terminal conditions of a single watch stream
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// A read or write named no key
    #[error("etcdserver: key is not provided")]
    EmptyKey,

    /// The manager has been closed and must not be reused
    #[error("watch manager is closed")]
    Closed,

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// No endpoints were supplied
    #[error("At least one endpoint required")]
    EmptyEndpoints,

    /// Malformed endpoint address
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// None of the endpoints answered within the connect timeout
    #[error("No endpoint reachable within {timeout:?}: {endpoints:?}")]
    Unreachable {
        endpoints: Vec<String>,
        timeout: Duration,
    },

    /// Unary request exceeded its deadline
    #[error("{request_type} request timed out after {duration:?}")]
    RequestTimeout {
        request_type: &'static str,
        duration: Duration,
    },

    /// The store answered without a response header
    #[error("{0} response is missing its header")]
    MissingHeader(&'static str),

    /// The request stream of a watch closed before the create request was sent
    #[error("Watch request stream closed")]
    WatchRequestClosed,

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The caller cancelled the watch scope
    #[error("context canceled")]
    ScopeCanceled,

    /// The initial snapshot read did not complete in time
    #[error("snapshot read timed out after {0:?}")]
    SnapshotTimeout(Duration),

    /// The requested start revision is no longer in the store's history
    #[error("mvcc: required revision has been compacted (compact revision {compact_revision})")]
    Compacted { compact_revision: i64 },

    /// The store cancelled the watch and said why
    #[error("{0}")]
    CanceledByStore(String),

    /// The store cancelled the watch without a reason
    #[error("watch failed and the stream was about to close")]
    StreamClosing,

    /// The change stream ended without a cancel notice
    #[error("watch stream ended unexpectedly")]
    StreamEnded,
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Network(NetworkError::TonicStatusError(Box::new(status)))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Network(NetworkError::TonicError(Box::new(err)))
    }
}

impl Error {
    /// True when the error means the caller stopped the watch, as opposed to
    /// the watch breaking on its own.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Watch(WatchError::ScopeCanceled))
    }
}

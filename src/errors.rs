//! Error hierarchy for the configuration store core.
//!
//! Errors are categorized by subsystem: store access, broadcast transport,
//! pub/sub bookkeeping, and configuration loading. Skippable failures
//! (malformed documents, lost broadcast events, per-id fetch failures) are
//! logged at their call sites and never surface through these types.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backing store failures (list/get/watch, embedded database)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Broadcast transport failures (join, publish, peer RPC)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Subscription bookkeeping failures (topic encoding, observers)
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Retry policy exhaustion
    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Disk I/O failures in the embedded store
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Document decode failures for persisted data
    #[error("Decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Requested document does not exist
    #[error("Document {id} not found")]
    NotFound { id: String },

    /// The watch session reached its bounded lifetime
    #[error("Watch session expired after {0:?}")]
    WatchSessionExpired(Duration),

    /// The watch event channel closed before the session ended
    #[error("Watch channel closed")]
    WatchClosed,

    /// The watch stream fell behind and dropped events
    #[error("Watch stream lagged, {0} events lost")]
    WatchLagged(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Malformed peer addresses
    #[error("Invalid URI format: {0}")]
    InvalidUri(String),

    /// Persistent connection failures
    #[error("Socket connect failed")]
    ConnectError,

    /// Broadcast payload over the gossip size ceiling
    #[error("Payload size {size} exceeds limit of {limit} bytes")]
    PayloadExceeded { size: usize, limit: usize },

    /// No live member accepted the join request
    #[error("Join failed, no seed reachable: {0:?}")]
    JoinFailed(Vec<String>),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),

    /// Background task failures
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Topic wire-string encode/decode failures
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Malformed label pair inside a canonical label string
    #[error("invalid label: {0}")]
    InvalidLabel(String),

    /// The observer's delivery channel is gone
    #[error("Observer {0} is no longer listening")]
    ObserverGone(String),
}

// ============== Conversion Implementations ============== //
impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StoreError::DbError(err.to_string()).into()
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DbError(err.to_string())
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        TransportError::TonicError(Box::new(err)).into()
    }
}

impl From<tonic::Status> for Error {
    fn from(err: tonic::Status) -> Self {
        TransportError::TonicStatusError(Box::new(err)).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        TransportError::TaskFailed(err).into()
    }
}

//! Error types for the streaming transport core

use std::time::Duration;

use thiserror::Error;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Error taxonomy for the reader/writer engine
#[derive(Error, Debug)]
pub enum StreamError {
    /// A handler is already registered for the topic
    #[error("reader handler already registered for topic '{topic}'")]
    AlreadyRegistered {
        /// Topic the duplicate registration targeted
        topic: String,
    },

    /// The reader manager was already started
    #[error("reader manager already started")]
    AlreadyStarted,

    /// The reader manager (or its broker client) is closed
    #[error("reader manager is closed")]
    Closed,

    /// A poll returned no records; observability signal, not a failure
    #[error("no records fetched")]
    NoRecords,

    /// No handler is registered for the polled record's topic
    #[error("no handler found for topic '{topic}'")]
    NoHandlerFound {
        /// Topic of the orphaned record
        topic: String,
    },

    /// A record handler returned an error
    #[error("handler failed for {topic}[{partition}]@{offset}")]
    Handler {
        /// Topic of the failed record
        topic: String,
        /// Partition of the failed record
        partition: i32,
        /// Offset of the failed record
        offset: i64,
        /// Underlying handler error
        #[source]
        source: anyhow::Error,
    },

    /// A record handler exceeded the per-record timeout
    #[error("handler timed out after {timeout:?} for {topic}[{partition}]@{offset}")]
    HandlerTimeout {
        /// Topic of the timed-out record
        topic: String,
        /// Partition of the timed-out record
        partition: i32,
        /// Offset of the timed-out record
        offset: i64,
        /// Configured per-record timeout
        timeout: Duration,
    },

    /// Broker-side error, tagged with whether a retry is worthwhile
    #[error("broker error: {message}")]
    Broker {
        /// Broker error description
        message: String,
        /// Whether the poller should sleep and retry
        retriable: bool,
    },

    /// Offset commit failed
    #[error("offset commit failed: {0}")]
    Commit(String),

    /// The broker indicated the commit/abort request itself was not
    /// processed; callers must not attempt a further abort
    #[error("transaction operation was not attempted")]
    OperationNotAttempted,

    /// Transactional produce/commit/abort failure
    #[error("transaction failed: {message}")]
    Transaction {
        /// Transaction error description
        message: String,
    },

    /// Consumer group construction or parsing failure
    #[error("invalid consumer group: {0}")]
    InvalidGroup(String),

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StreamError {
    /// Whether a poller should sleep and retry after this error.
    pub fn is_retriable(&self) -> bool {
        match self {
            StreamError::Broker { retriable, .. } => *retriable,
            StreamError::NoRecords => true,
            _ => false,
        }
    }

    /// Whether this error means the manager or client is shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamError::Closed)
    }
}

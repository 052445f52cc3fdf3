//! Broker client seam
//!
//! The engine never talks the broker wire protocol itself; everything goes
//! through [`BrokerClient`]. The Kafka-backed implementation lives behind
//! the `kafka` cargo feature; tests substitute an in-memory broker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StreamError, StreamResult};
use crate::group::ConsumerGroup;
use crate::record::Record;

/// Per-record delivery callback for asynchronous produces.
///
/// Invoked with the produced record and the delivery error, if any.
pub type AckCallback = Arc<dyn Fn(&Record, Option<&StreamError>) + Send + Sync>;

/// How to end an open broker transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDisposition {
    /// Attempt to commit the transaction
    Commit,
    /// Abort the transaction, discarding buffered records
    Abort,
}

/// Handle to a broker connection, consumed by the reader manager and the
/// writer strategies.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Polls a bounded batch of records from the subscribed topics.
    ///
    /// An empty batch is not an error. Errors carry a retriable flag the
    /// poller uses to decide between sleep-and-retry and termination.
    async fn poll(&self, max_records: usize) -> StreamResult<Vec<Record>>;

    /// Submits a record without waiting for acknowledgement.
    ///
    /// The outcome is surfaced only through `ack`, when provided.
    async fn produce(&self, record: Record, ack: Option<AckCallback>);

    /// Submits a record and waits for broker acknowledgement.
    async fn produce_sync(&self, record: Record) -> StreamResult<()>;

    /// Commits every uncommitted offset this client has consumed.
    async fn commit_uncommitted(&self) -> StreamResult<()>;

    /// Commits the offsets of the given records only.
    async fn commit_records(&self, records: &[Arc<Record>]) -> StreamResult<()>;

    /// Adds a topic to this client's consume set.
    fn add_consume_topic(&self, topic: &str) -> StreamResult<()>;

    /// Begins a broker transaction on this client's producer.
    async fn begin_transaction(&self) -> StreamResult<()>;

    /// Flushes buffered produce requests.
    async fn flush(&self) -> StreamResult<()>;

    /// Ends the open transaction in commit or abort mode.
    ///
    /// Returns [`StreamError::OperationNotAttempted`] when the broker
    /// indicates the end-transaction request itself was not processed.
    async fn end_transaction(&self, disposition: TxDisposition) -> StreamResult<()>;

    /// Releases the client's broker resources.
    async fn close(&self);
}

/// Creates broker client handles for the reader manager.
///
/// The manager asks for one default handle (`group = None`) plus one handle
/// per distinct registered consumer group.
pub trait ClientFactory: Send + Sync {
    /// Creates a client, optionally bound to a consumer group.
    fn create(&self, group: Option<&ConsumerGroup>) -> StreamResult<Arc<dyn BrokerClient>>;
}

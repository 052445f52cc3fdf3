//! Writer strategies
//!
//! Three ways to get a message into the broker log, trading latency for
//! delivery guarantees: fire-and-forget ([`AsyncWriter`]), acknowledged
//! ([`SyncWriter`]) and atomic ([`TransactionalWriter`]). All strategies
//! share the same message-construction rules; none of them enriches
//! headers; broker provenance is a read-path concern.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::client::{AckCallback, BrokerClient, TxDisposition};
use crate::error::{StreamError, StreamResult};
use crate::message::Message;
use crate::record::Record;

// - Asynchronous -

/// Writer submitting records without waiting for acknowledgement.
///
/// Suited to high-throughput paths where the caller does not need the
/// write outcome inline. Errors are surfaced only through the optional
/// per-record delivery callback.
pub struct AsyncWriter {
    client: Arc<dyn BrokerClient>,
    ack: Option<AckCallback>,
}

impl AsyncWriter {
    /// Creates a fire-and-forget writer over `client`.
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client, ack: None }
    }

    /// Sets the per-record delivery callback.
    pub fn with_ack(mut self, ack: AckCallback) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Submits one message; always returns immediately.
    pub async fn write(&self, topic: &str, message: Message) -> StreamResult<()> {
        self.client
            .produce(Record::outbound(topic, message), self.ack.clone())
            .await;
        Ok(())
    }

    /// Submits a batch of messages; always returns immediately.
    ///
    /// The accepted count is `0` because nothing has been acknowledged at
    /// return time; acceptance is only observable through the callback.
    pub async fn write_batch(&self, topic: &str, messages: Vec<Message>) -> StreamResult<usize> {
        for message in messages {
            self.client
                .produce(Record::outbound(topic, message), self.ack.clone())
                .await;
        }
        Ok(0)
    }
}

/// Delivery callback logging every outcome through `tracing`.
pub fn log_ack() -> AckCallback {
    Arc::new(|record: &Record, err: Option<&StreamError>| match err {
        Some(err) => error!(
            topic = %record.topic,
            data_size = record.value.len(),
            error = %err,
            "failed to produce message"
        ),
        None => debug!(
            topic = %record.topic,
            data_size = record.value.len(),
            "message produced"
        ),
    })
}

// - Synchronous -

/// Writer blocking until every record in the call is acknowledged.
pub struct SyncWriter {
    client: Arc<dyn BrokerClient>,
}

impl SyncWriter {
    /// Creates an acknowledged writer over `client`.
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    /// Submits one message and waits for acknowledgement.
    pub async fn write(&self, topic: &str, message: Message) -> StreamResult<()> {
        self.client
            .produce_sync(Record::outbound(topic, message))
            .await
    }

    /// Submits a batch, all-or-nothing: returns the first error encountered
    /// with an accepted count of zero, or the full batch size on success.
    pub async fn write_batch(&self, topic: &str, messages: Vec<Message>) -> StreamResult<usize> {
        let total = messages.len();
        for message in messages {
            self.client
                .produce_sync(Record::outbound(topic, message))
                .await?;
        }
        Ok(total)
    }
}

// - Transactional -

/// Writer wrapping every call in a broker transaction.
///
/// Begin, produce synchronously, flush, then try to commit. Any failure
/// along the way ends the transaction in abort mode before the original
/// error is returned. The one exception is a commit error classified
/// "operation not attempted": the broker never processed the request, so a
/// further abort would only stack a second error on top.
pub struct TransactionalWriter {
    client: Arc<dyn BrokerClient>,
}

impl TransactionalWriter {
    /// Creates a transactional writer over `client`.
    ///
    /// The client must have been created with a transactional id.
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    /// Writes one message atomically.
    pub async fn write(&self, topic: &str, message: Message) -> StreamResult<()> {
        self.run_transaction(vec![Record::outbound(topic, message)])
            .await
            .map(|_| ())
    }

    /// Writes a batch atomically, returning the accepted count.
    pub async fn write_batch(&self, topic: &str, messages: Vec<Message>) -> StreamResult<usize> {
        let records = messages
            .into_iter()
            .map(|message| Record::outbound(topic, message))
            .collect();
        self.run_transaction(records).await
    }

    async fn run_transaction(&self, records: Vec<Record>) -> StreamResult<usize> {
        let count = records.len();
        self.client.begin_transaction().await?;

        for record in records {
            if let Err(err) = self.client.produce_sync(record).await {
                return self.abort_with(err).await;
            }
        }
        if let Err(err) = self.client.flush().await {
            return self.abort_with(err).await;
        }

        match self.client.end_transaction(TxDisposition::Commit).await {
            Ok(()) => Ok(count),
            Err(StreamError::OperationNotAttempted) => Err(StreamError::OperationNotAttempted),
            Err(err) => self.abort_with(err).await,
        }
    }

    async fn abort_with(&self, cause: StreamError) -> StreamResult<usize> {
        if let Err(abort_err) = self.client.end_transaction(TxDisposition::Abort).await {
            warn!(error = %abort_err, "transaction abort failed");
        }
        Err(cause)
    }
}

//! Kafka/Redpanda-backed broker client
//!
//! Wraps `rdkafka` behind the [`BrokerClient`] seam: a `StreamConsumer`
//! with manual offset tracking on the read side and a `FutureProducer`
//! (optionally transactional) on the write side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header as KafkaHeader, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{AckCallback, BrokerClient, ClientFactory, TxDisposition};
use crate::error::{StreamError, StreamResult};
use crate::group::ConsumerGroup;
use crate::record::Record;

/// librdkafka properties accepted through
/// [`KafkaClientConfig::properties`]. Anything else is rejected at
/// connection time.
const ALLOWED_KAFKA_PROPS: &[&str] = &[
    // Compression settings
    "compression.type",
    "compression.level",
    // Fetch settings
    "fetch.min.bytes",
    "fetch.max.wait.ms",
    "fetch.max.bytes",
    "max.partition.fetch.bytes",
    // Request settings
    "request.timeout.ms",
    "metadata.max.age.ms",
    "receive.buffer.bytes",
    "send.buffer.bytes",
    // Consumer settings
    "queued.min.messages",
    "queued.max.messages.kbytes",
    "fetch.error.backoff.ms",
    "fetch.message.max.bytes",
    // Performance settings
    "enable.idempotence",
    "message.max.bytes",
    // Connection settings
    "reconnect.backoff.ms",
    "reconnect.backoff.max.ms",
    "connections.max.idle.ms",
    "socket.keepalive.enable",
];

/// Connection settings for [`KafkaClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaClientConfig {
    /// Broker addresses, comma-separated
    pub brokers: String,
    /// Client id; a random `streamkit-client-*` id when unset
    pub client_id: Option<String>,
    /// Default consumer group for the manager's default handle; a random
    /// `streamkit-consumer-*` group when unset
    pub group_id: Option<String>,
    /// Transactional id; enables the transactional producer path
    pub transactional_id: Option<String>,
    /// Offset reset policy (`earliest`, `latest`)
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: u32,
    /// Read only committed records; enable when consuming transactional
    /// topics
    pub read_committed_only: bool,
    /// Extra librdkafka properties, validated against an allow-list
    pub properties: HashMap<String, String>,
}

impl Default for KafkaClientConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: None,
            group_id: None,
            transactional_id: None,
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 30_000,
            read_committed_only: false,
            properties: HashMap::new(),
        }
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

fn map_kafka_error(err: KafkaError) -> StreamError {
    let retriable = !matches!(err, KafkaError::MessageConsumption(_));
    StreamError::Broker {
        message: err.to_string(),
        retriable,
    }
}

fn map_tx_error(err: KafkaError) -> StreamError {
    if let KafkaError::Transaction(inner) = &err {
        if inner.code() == RDKafkaErrorCode::OperationNotAttempted {
            return StreamError::OperationNotAttempted;
        }
    }
    StreamError::Transaction {
        message: err.to_string(),
    }
}

/// Kafka-backed [`BrokerClient`].
pub struct KafkaClient {
    consumer: StreamConsumer,
    producer: FutureProducer,
    // Highest consumed offset per (topic, partition), pending commit.
    pending: Mutex<HashMap<(String, i32), i64>>,
    topics: std::sync::Mutex<Vec<String>>,
    poll_wait: Duration,
    produce_timeout: Duration,
}

impl KafkaClient {
    /// Connects a consumer/producer pair per `config`.
    pub fn connect(config: &KafkaClientConfig) -> StreamResult<Self> {
        for key in config.properties.keys() {
            if !ALLOWED_KAFKA_PROPS.contains(&key.as_str()) {
                return Err(StreamError::Config(format!(
                    "disallowed Kafka property '{key}'"
                )));
            }
        }

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("streamkit-client-{}", random_suffix()));
        let group_id = config
            .group_id
            .clone()
            .unwrap_or_else(|| format!("streamkit-consumer-{}", random_suffix()));

        let mut consumer_config = ClientConfig::new();
        consumer_config
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &client_id)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout_ms.to_string());
        if config.read_committed_only {
            consumer_config.set("isolation.level", "read_committed");
        }
        for (key, value) in &config.properties {
            consumer_config.set(key, value);
        }
        let consumer: StreamConsumer = consumer_config.create().map_err(map_kafka_error)?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &client_id)
            .set("message.timeout.ms", "30000");
        if let Some(tx_id) = &config.transactional_id {
            producer_config
                .set("transactional.id", tx_id)
                .set("enable.idempotence", "true");
        }
        let producer: FutureProducer = producer_config.create().map_err(map_kafka_error)?;
        if config.transactional_id.is_some() {
            producer
                .init_transactions(Timeout::After(Duration::from_secs(30)))
                .map_err(map_tx_error)?;
        }

        info!(brokers = %config.brokers, group = %group_id, "kafka client connected");
        Ok(Self {
            consumer,
            producer,
            pending: Mutex::new(HashMap::new()),
            topics: std::sync::Mutex::new(Vec::new()),
            poll_wait: Duration::from_secs(1),
            produce_timeout: Duration::from_secs(30),
        })
    }

    async fn track(&self, topic: &str, partition: i32, offset: i64) {
        let mut pending = self.pending.lock().await;
        let entry = pending.entry((topic.to_string(), partition)).or_insert(offset);
        if *entry < offset {
            *entry = offset;
        }
    }

}

async fn send_with(
    producer: &FutureProducer,
    record: &Record,
    timeout: Duration,
) -> StreamResult<()> {
    let mut headers = OwnedHeaders::new_with_capacity(record.headers.len());
    for (key, value) in &record.headers {
        headers = headers.insert(KafkaHeader {
            key,
            value: Some(value.as_slice()),
        });
    }
    let mut outbound: FutureRecord<'_, Vec<u8>, Vec<u8>> = FutureRecord::to(&record.topic)
        .payload(&record.value)
        .headers(headers);
    if let Some(key) = &record.key {
        outbound = outbound.key(key);
    }
    match producer.send(outbound, Timeout::After(timeout)).await {
        Ok((partition, offset)) => {
            debug!(topic = %record.topic, partition, offset, "message produced");
            Ok(())
        }
        Err((err, _)) => Err(map_kafka_error(err)),
    }
}

fn to_record(message: &rdkafka::message::BorrowedMessage<'_>) -> Record {
    let mut record = Record::inbound(
        message.topic(),
        message.partition(),
        message.offset(),
        message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    );
    record.key = message.key().map(<[u8]>::to_vec);
    record.timestamp = message.timestamp().to_millis();
    if let Some(headers) = message.headers() {
        record.headers = headers
            .iter()
            .map(|h| {
                (
                    h.key.to_string(),
                    h.value.map(<[u8]>::to_vec).unwrap_or_default(),
                )
            })
            .collect();
    }
    record
}

#[async_trait]
impl BrokerClient for KafkaClient {
    async fn poll(&self, max_records: usize) -> StreamResult<Vec<Record>> {
        let first = match tokio::time::timeout(self.poll_wait, self.consumer.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(Err(err)) => return Err(map_kafka_error(err)),
            Ok(Ok(message)) => message,
        };
        let mut batch = Vec::with_capacity(max_records.min(64));
        self.track(first.topic(), first.partition(), first.offset())
            .await;
        batch.push(to_record(&first));

        // Drain whatever is already buffered, up to the batch bound.
        while batch.len() < max_records {
            match tokio::time::timeout(Duration::from_millis(10), self.consumer.recv()).await {
                Err(_) | Ok(Err(_)) => break,
                Ok(Ok(message)) => {
                    self.track(message.topic(), message.partition(), message.offset())
                        .await;
                    batch.push(to_record(&message));
                }
            }
        }
        Ok(batch)
    }

    async fn produce(&self, record: Record, ack: Option<AckCallback>) {
        let producer = self.producer.clone();
        let timeout = self.produce_timeout;
        tokio::spawn(async move {
            let result = send_with(&producer, &record, timeout).await;
            if let Some(ack) = ack {
                ack(&record, result.err().as_ref());
            }
        });
    }

    async fn produce_sync(&self, record: Record) -> StreamResult<()> {
        send_with(&self.producer, &record, self.produce_timeout).await
    }

    async fn commit_uncommitted(&self) -> StreamResult<()> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(());
        }
        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in pending.iter() {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(*offset + 1))
                .map_err(|err| StreamError::Commit(err.to_string()))?;
        }
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|err| StreamError::Commit(err.to_string()))?;
        debug!(offsets = pending.len(), "committed uncommitted offsets");
        pending.clear();
        Ok(())
    }

    async fn commit_records(&self, records: &[Arc<Record>]) -> StreamResult<()> {
        let mut highest: HashMap<(&str, i32), i64> = HashMap::new();
        for record in records {
            let entry = highest
                .entry((record.topic.as_str(), record.partition))
                .or_insert(record.offset);
            if *entry < record.offset {
                *entry = record.offset;
            }
        }
        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in &highest {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(*offset + 1))
                .map_err(|err| StreamError::Commit(err.to_string()))?;
        }
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|err| StreamError::Commit(err.to_string()))?;
        debug!(records = records.len(), "committed record offsets");
        Ok(())
    }

    fn add_consume_topic(&self, topic: &str) -> StreamResult<()> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&refs).map_err(map_kafka_error)
    }

    async fn begin_transaction(&self) -> StreamResult<()> {
        self.producer.begin_transaction().map_err(map_tx_error)
    }

    async fn flush(&self) -> StreamResult<()> {
        self.producer
            .flush(Timeout::After(self.produce_timeout))
            .map_err(map_kafka_error)
    }

    async fn end_transaction(&self, disposition: TxDisposition) -> StreamResult<()> {
        let timeout = Timeout::After(self.produce_timeout);
        match disposition {
            TxDisposition::Commit => self.producer.commit_transaction(timeout),
            TxDisposition::Abort => self.producer.abort_transaction(timeout),
        }
        .map_err(map_tx_error)
    }

    async fn close(&self) {
        self.producer.flush(Timeout::After(Duration::from_secs(5))).ok();
        self.consumer.unsubscribe();
    }
}

/// [`ClientFactory`] producing [`KafkaClient`] handles.
pub struct KafkaClientFactory {
    config: KafkaClientConfig,
}

impl KafkaClientFactory {
    /// Creates a factory from connection settings.
    pub fn new(config: KafkaClientConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for KafkaClientFactory {
    fn create(&self, group: Option<&ConsumerGroup>) -> StreamResult<Arc<dyn BrokerClient>> {
        let mut config = self.config.clone();
        if let Some(group) = group {
            config.group_id = Some(group.to_string());
        }
        Ok(Arc::new(KafkaClient::connect(&config)?))
    }
}

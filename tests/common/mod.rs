//! Shared in-memory broker used across integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use streamkit::{
    AckCallback, BrokerClient, ClientFactory, ConsumerGroup, Record, StreamError, StreamResult,
    TxDisposition,
};

/// Scripted outcome of one poll call.
pub enum PollStep {
    Batch(Vec<Record>),
    Retriable(&'static str),
    Terminal(&'static str),
    ClientClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitCall {
    Uncommitted,
    Records(Vec<(String, i32, i64)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOp {
    Begin,
    Flush,
    EndCommit,
    EndAbort,
}

/// In-memory stand-in for a broker client handle.
#[derive(Default)]
pub struct MockBroker {
    pub polls: Mutex<VecDeque<PollStep>>,
    pub produced: Mutex<Vec<Record>>,
    pub commits: Mutex<Vec<CommitCall>>,
    pub tx_ops: Mutex<Vec<TxOp>>,
    pub consume_topics: Mutex<Vec<String>>,
    /// Interleaving log shared with test handlers to observe ordering.
    pub events: Mutex<Vec<String>>,
    pub fail_produce_topics: Mutex<HashSet<String>>,
    pub fail_produce_keys: Mutex<HashSet<String>>,
    pub fail_flush: AtomicBool,
    pub fail_commit_tx: AtomicBool,
    pub commit_not_attempted: AtomicBool,
    pub closed: AtomicBool,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_batch(&self, records: Vec<Record>) {
        self.polls.lock().unwrap().push_back(PollStep::Batch(records));
    }

    pub fn push_step(&self, step: PollStep) {
        self.polls.lock().unwrap().push_back(step);
    }

    pub fn log_event(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn produced(&self) -> Vec<Record> {
        self.produced.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<CommitCall> {
        self.commits.lock().unwrap().clone()
    }

    pub fn tx_ops(&self) -> Vec<TxOp> {
        self.tx_ops.lock().unwrap().clone()
    }

    fn produce_error_for(&self, record: &Record) -> Option<StreamError> {
        let by_topic = self
            .fail_produce_topics
            .lock()
            .unwrap()
            .contains(&record.topic);
        let by_key = record
            .key
            .as_ref()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .is_some_and(|key| self.fail_produce_keys.lock().unwrap().contains(&key));
        (by_topic || by_key).then(|| StreamError::Broker {
            message: format!("record rejected for topic '{}'", record.topic),
            retriable: false,
        })
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn poll(&self, _max_records: usize) -> StreamResult<Vec<Record>> {
        let step = self.polls.lock().unwrap().pop_front();
        match step {
            Some(PollStep::Batch(records)) => Ok(records),
            Some(PollStep::Retriable(message)) => Err(StreamError::Broker {
                message: message.to_string(),
                retriable: true,
            }),
            Some(PollStep::Terminal(message)) => Err(StreamError::Broker {
                message: message.to_string(),
                retriable: false,
            }),
            Some(PollStep::ClientClosed) => Err(StreamError::Closed),
            None => Ok(Vec::new()),
        }
    }

    async fn produce(&self, record: Record, ack: Option<AckCallback>) {
        let error = self.produce_error_for(&record);
        if error.is_none() {
            self.produced.lock().unwrap().push(record.clone());
        }
        if let Some(ack) = ack {
            ack(&record, error.as_ref());
        }
    }

    async fn produce_sync(&self, record: Record) -> StreamResult<()> {
        if let Some(error) = self.produce_error_for(&record) {
            return Err(error);
        }
        self.produced.lock().unwrap().push(record);
        Ok(())
    }

    async fn commit_uncommitted(&self) -> StreamResult<()> {
        self.log_event("commit");
        self.commits.lock().unwrap().push(CommitCall::Uncommitted);
        Ok(())
    }

    async fn commit_records(&self, records: &[Arc<Record>]) -> StreamResult<()> {
        self.log_event("commit");
        let mut offsets: Vec<(String, i32, i64)> = records
            .iter()
            .map(|r| (r.topic.clone(), r.partition, r.offset))
            .collect();
        offsets.sort();
        self.commits
            .lock()
            .unwrap()
            .push(CommitCall::Records(offsets));
        Ok(())
    }

    fn add_consume_topic(&self, topic: &str) -> StreamResult<()> {
        self.consume_topics.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn begin_transaction(&self) -> StreamResult<()> {
        self.tx_ops.lock().unwrap().push(TxOp::Begin);
        Ok(())
    }

    async fn flush(&self) -> StreamResult<()> {
        if self.fail_flush.load(Ordering::Relaxed) {
            return Err(StreamError::Broker {
                message: "flush failed".to_string(),
                retriable: false,
            });
        }
        self.tx_ops.lock().unwrap().push(TxOp::Flush);
        Ok(())
    }

    async fn end_transaction(&self, disposition: TxDisposition) -> StreamResult<()> {
        match disposition {
            TxDisposition::Commit => {
                self.tx_ops.lock().unwrap().push(TxOp::EndCommit);
                if self.commit_not_attempted.load(Ordering::Relaxed) {
                    return Err(StreamError::OperationNotAttempted);
                }
                if self.fail_commit_tx.load(Ordering::Relaxed) {
                    return Err(StreamError::Transaction {
                        message: "commit fenced".to_string(),
                    });
                }
                Ok(())
            }
            TxDisposition::Abort => {
                self.tx_ops.lock().unwrap().push(TxOp::EndAbort);
                Ok(())
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Factory handing out the default mock plus one mock per consumer group.
pub struct MockFactory {
    pub default_broker: Arc<MockBroker>,
    pub group_brokers: Mutex<HashMap<String, Arc<MockBroker>>>,
    pub created: AtomicUsize,
}

impl MockFactory {
    pub fn new(default_broker: Arc<MockBroker>) -> Arc<Self> {
        Arc::new(Self {
            default_broker,
            group_brokers: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        })
    }

    pub fn group_broker(&self, group: &str) -> Option<Arc<MockBroker>> {
        self.group_brokers.lock().unwrap().get(group).cloned()
    }
}

impl ClientFactory for MockFactory {
    fn create(&self, group: Option<&ConsumerGroup>) -> StreamResult<Arc<dyn BrokerClient>> {
        self.created.fetch_add(1, Ordering::Relaxed);
        match group {
            None => Ok(self.default_broker.clone()),
            Some(group) => {
                let broker = MockBroker::new();
                self.group_brokers
                    .lock()
                    .unwrap()
                    .insert(group.to_string(), broker.clone());
                Ok(broker)
            }
        }
    }
}

/// Builds an inbound record with a UTF-8 payload.
pub fn record(topic: &str, partition: i32, offset: i64, payload: &str) -> Record {
    Record::inbound(topic, partition, offset, payload.as_bytes().to_vec())
}

/// Polls `predicate` until it holds or the timeout elapses.
pub async fn wait_for<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

//! Dead-letter interceptor behavior against an in-memory broker.

mod common;

use std::sync::Arc;

use anyhow::anyhow;
use pretty_assertions::assert_eq;
use streamkit::interceptor::ORIGINAL_TOPIC;
use streamkit::{chain, handler_fn, DeadLetter, Handler, Record};

use common::MockBroker;

fn failing_handler() -> Handler {
    handler_fn(|_record| async { Err(anyhow!("unprocessable payload")) })
}

fn header_value(record: &Record, key: &str) -> Option<String> {
    record
        .headers
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
}

#[tokio::test]
async fn test_failure_republishes_to_derived_topic() {
    let broker = MockBroker::new();
    let guarded = chain(
        failing_handler(),
        &[DeadLetter::new(broker.clone()).interceptor()],
    );

    let record = Arc::new(Record::inbound("orders", 2, 41, b"bad".to_vec()));
    let err = guarded(record).await.unwrap_err();
    // The original error still reaches the dispatcher.
    assert_eq!(err.to_string(), "unprocessable payload");

    let produced = broker.produced();
    assert_eq!(produced.len(), 1);
    let republished = &produced[0];
    assert_eq!(republished.topic, "orders-dlq");
    assert_eq!(republished.partition, -1);
    assert_eq!(republished.offset, -1);
    assert_eq!(republished.value, b"bad".to_vec());
    assert_eq!(
        header_value(republished, ORIGINAL_TOPIC),
        Some("orders".to_string())
    );
}

#[tokio::test]
async fn test_success_passes_through_without_republish() {
    let broker = MockBroker::new();
    let guarded = chain(
        handler_fn(|_record| async { Ok(()) }),
        &[DeadLetter::new(broker.clone()).interceptor()],
    );

    let record = Arc::new(Record::inbound("orders", 0, 1, Vec::new()));
    guarded(record).await.unwrap();
    assert!(broker.produced().is_empty());
}

#[tokio::test]
async fn test_topic_override() {
    let broker = MockBroker::new();
    let guarded = chain(
        failing_handler(),
        &[DeadLetter::new(broker.clone())
            .with_topic("quarantine")
            .interceptor()],
    );

    let record = Arc::new(Record::inbound("orders", 0, 1, Vec::new()));
    guarded(record).await.unwrap_err();
    assert_eq!(broker.produced()[0].topic, "quarantine");
}

#[tokio::test]
async fn test_skip_predicate_bypasses_republish() {
    let broker = MockBroker::new();
    // Records that already carry the provenance header were dead-lettered
    // once; republishing them again would loop.
    let guarded = chain(
        failing_handler(),
        &[DeadLetter::new(broker.clone())
            .with_skip(Arc::new(|record: &Record| {
                record.headers.iter().any(|(k, _)| k == ORIGINAL_TOPIC)
            }))
            .interceptor()],
    );

    let mut already_dead = Record::inbound("orders-dlq", 0, 9, Vec::new());
    already_dead
        .headers
        .push((ORIGINAL_TOPIC.to_string(), b"orders".to_vec()));
    let err = guarded(Arc::new(already_dead)).await.unwrap_err();
    assert_eq!(err.to_string(), "unprocessable payload");
    assert!(broker.produced().is_empty());
}

#[tokio::test]
async fn test_republish_failure_keeps_original_cause() {
    let broker = MockBroker::new();
    broker
        .fail_produce_topics
        .lock()
        .unwrap()
        .insert("orders-dlq".to_string());
    let guarded = chain(
        failing_handler(),
        &[DeadLetter::new(broker.clone()).interceptor()],
    );

    let record = Arc::new(Record::inbound("orders", 0, 1, Vec::new()));
    let err = guarded(record).await.unwrap_err();
    assert!(err.to_string().contains("dead-letter republish failed"));
    let chain_messages: Vec<String> = err.chain().map(|e| e.to_string()).collect();
    assert!(
        chain_messages.iter().any(|m| m == "unprocessable payload"),
        "original cause preserved: {chain_messages:?}"
    );
}

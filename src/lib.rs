//! Event-streaming transport core for service toolkits
//!
//! This library reads append-only log records from a distributed broker,
//! dispatches them to application handlers with bounded concurrency, and
//! writes outgoing records back under three delivery guarantees
//! (fire-and-forget, acknowledged, transactional).
//!
//! # Reading records
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamkit::{handler_fn, ClientFactory, ReaderConfig, ReaderManager, RegisterOptions};
//!
//! // With the `kafka` feature, `kafka::KafkaClientFactory` is the factory
//! // to pass here.
//! # async fn example(factory: Arc<dyn ClientFactory>) -> anyhow::Result<()> {
//! let mut manager = ReaderManager::new(ReaderConfig::default(), factory)?;
//!
//! manager.register(
//!     "orders",
//!     handler_fn(|record| async move {
//!         tracing::info!(offset = record.offset, "got order");
//!         Ok(())
//!     }),
//!     RegisterOptions::new().with_group("acme.billing.order-sync".parse()?),
//! )?;
//!
//! manager.start()?;
//! // ... until shutdown:
//! manager.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Writing records
//!
//! ```no_run
//! use streamkit::{Message, SyncWriter};
//! # async fn example(client: std::sync::Arc<dyn streamkit::BrokerClient>) -> anyhow::Result<()> {
//! let writer = SyncWriter::new(client);
//! writer.write("orders", Message::new(b"{}".to_vec()).with_key("order-1")).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

// Re-export commonly used items
pub use client::{AckCallback, BrokerClient, ClientFactory, TxDisposition};
pub use error::{StreamError, StreamResult};
pub use group::ConsumerGroup;
pub use header::Header;
pub use interceptor::{chain, handler_fn, DeadLetter, Handler, HandlerResult, Interceptor};
pub use message::Message;
pub use reader::{
    CommitPolicy, Controller, ErrorCallback, ReaderConfig, ReaderManager, RegisterOptions,
};
pub use record::Record;
pub use writer::{AsyncWriter, SyncWriter, TransactionalWriter};

/// Broker client seam
pub mod client;

/// Error types
pub mod error;

/// Consumer group identifiers
pub mod group;

/// Ordered multi-value headers
pub mod header;

/// Record handlers and interceptors
pub mod interceptor;

/// Outbound message unit
pub mod message;

/// Polling/dispatch engine
pub mod reader;

/// Broker record representation
pub mod record;

/// Writer strategies
pub mod writer;

/// Kafka-backed broker client
#[cfg(feature = "kafka")]
pub mod kafka;

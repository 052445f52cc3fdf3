//! Broker record representation

use crate::message::Message;

/// A record as stored in (or destined for) the broker log.
///
/// Inbound records carry their log coordinates and are shared immutably
/// with handlers for the duration of processing; only the dead-letter path
/// derives a mutated copy for republish. Outbound records leave partition
/// and offset unassigned for the broker to decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Topic the record belongs to
    pub topic: String,
    /// Partition within the topic; `-1` when unassigned
    pub partition: i32,
    /// Offset within the partition; `-1` when unassigned
    pub offset: i64,
    /// Partition-affinity key, if any
    pub key: Option<Vec<u8>>,
    /// Payload bytes
    pub value: Vec<u8>,
    /// Broker-native headers in wire order
    pub headers: Vec<(String, Vec<u8>)>,
    /// Broker timestamp in epoch milliseconds, when known
    pub timestamp: Option<i64>,
    /// Compression codec name, when the client surfaces it
    pub compression: Option<String>,
}

impl Record {
    /// Creates an inbound record at the given log coordinates.
    pub fn inbound(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        value: Vec<u8>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value,
            headers: Vec::new(),
            timestamp: None,
            compression: None,
        }
    }

    /// Builds an outbound record for `topic` from a [`Message`].
    pub fn outbound(topic: impl Into<String>, message: Message) -> Self {
        Self {
            topic: topic.into(),
            partition: -1,
            offset: -1,
            key: message.key.map(String::into_bytes),
            value: message.data,
            headers: message.header.to_broker(),
            timestamp: None,
            compression: None,
        }
    }
}

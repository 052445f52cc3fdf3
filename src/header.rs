//! Ordered multi-value record headers
//!
//! Headers model record metadata as a case-sensitive, insertion-ordered
//! multi-map. The `Stream-` prefix is a reserved namespace used by the read
//! path to inject broker provenance; user keys must stay out of it.

use crate::record::Record;

/// Reserved namespace prefix for system-injected header keys.
pub const RESERVED_PREFIX: &str = "Stream-";

/// Originating topic of the record (read path only).
pub const STREAM_TOPIC: &str = "Stream-Topic";
/// Originating partition of the record (read path only).
pub const STREAM_PARTITION: &str = "Stream-Partition";
/// Offset of the record within its partition (read path only).
pub const STREAM_OFFSET: &str = "Stream-Offset";
/// Broker timestamp of the record in epoch milliseconds (read path only).
pub const STREAM_TIMESTAMP: &str = "Stream-Timestamp";
/// Compression codec the record was stored with, when known (read path only).
pub const STREAM_COMPRESSION: &str = "Stream-Compression";

/// Well-known user header carrying a unique event identifier.
pub const HEADER_EVENT_ID: &str = "Event-Id";
/// Well-known user header identifying the context that produced the event.
pub const HEADER_EVENT_SOURCE: &str = "Event-Source";
/// Well-known user header naming the event type.
pub const HEADER_EVENT_TYPE: &str = "Event-Type";
/// Well-known user header carrying the MIME type of the payload.
pub const HEADER_DATA_CONTENT_TYPE: &str = "Event-Data-Content-Type";
/// Well-known user header carrying the occurrence time of the event.
pub const HEADER_EVENT_TIME: &str = "Event-Time";

/// Case-sensitive, ordered multi-value string map for record metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(String, String)>,
}

impl Header {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Replaces all values for `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
    }

    /// Appends a value to the list of values for `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Returns the first value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns all values for `key` in insertion order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes every value for `key`.
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// Number of entries (counting repeated keys once per value).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Converts to the broker's native header representation.
    pub fn to_broker(&self) -> Vec<(String, Vec<u8>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_bytes()))
            .collect()
    }

    /// Converts broker headers into a header map, as-is.
    pub fn from_broker(raw: &[(String, Vec<u8>)]) -> Self {
        let mut header = Self::with_capacity(raw.len());
        for (key, value) in raw {
            header.add(key.clone(), String::from_utf8_lossy(value).into_owned());
        }
        header
    }

    /// Builds the read-side header view of an inbound record.
    ///
    /// User headers are carried over, then the map is enriched with the
    /// record's broker provenance under the reserved namespace. Incoming
    /// headers that claim a reserved key are dropped so enrichment never
    /// collides with user data.
    pub fn from_record(record: &Record) -> Self {
        let mut header = Self::with_capacity(record.headers.len() + 5);
        for (key, value) in &record.headers {
            if key.starts_with(RESERVED_PREFIX) {
                continue;
            }
            header.add(key.clone(), String::from_utf8_lossy(value).into_owned());
        }

        header.set(STREAM_TOPIC, record.topic.clone());
        header.set(STREAM_PARTITION, record.partition.to_string());
        header.set(STREAM_OFFSET, record.offset.to_string());
        if let Some(timestamp) = record.timestamp {
            header.set(STREAM_TIMESTAMP, timestamp.to_string());
        }
        if let Some(compression) = &record.compression {
            header.set(STREAM_COMPRESSION, compression.clone());
        }
        header
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (k, v) in iter {
            header.add(k, v);
        }
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_replaces_all_values() {
        let mut header = Header::new();
        header.add("Retry", "1");
        header.add("Retry", "2");
        header.set("Retry", "3");
        assert_eq!(header.values("Retry"), vec!["3"]);
    }

    #[test]
    fn test_add_appends_and_get_returns_first() {
        let mut header = Header::new();
        header.add("Trace", "a");
        header.add("Trace", "b");
        assert_eq!(header.get("Trace"), Some("a"));
        assert_eq!(header.values("Trace"), vec!["a", "b"]);
        assert_eq!(header.len(), 2);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let mut header = Header::new();
        header.set("event-id", "1");
        assert_eq!(header.get("Event-Id"), None);
        assert_eq!(header.get("event-id"), Some("1"));
    }

    #[test]
    fn test_broker_roundtrip_preserves_order() {
        let header: Header = [("A", "1"), ("B", "2"), ("A", "3")].into_iter().collect();
        let raw = header.to_broker();
        assert_eq!(Header::from_broker(&raw), header);
    }

    #[test]
    fn test_from_record_enriches_provenance() {
        let mut record = Record::inbound("orders", 3, 42, b"{}".to_vec());
        record.headers.push(("Event-Id".into(), b"abc".to_vec()));
        record.timestamp = Some(1_700_000_000_000);

        let header = Header::from_record(&record);
        assert_eq!(header.get("Event-Id"), Some("abc"));
        assert_eq!(header.get(STREAM_TOPIC), Some("orders"));
        assert_eq!(header.get(STREAM_PARTITION), Some("3"));
        assert_eq!(header.get(STREAM_OFFSET), Some("42"));
        assert_eq!(header.get(STREAM_TIMESTAMP), Some("1700000000000"));
        assert_eq!(header.get(STREAM_COMPRESSION), None);
    }

    #[test]
    fn test_from_record_drops_spoofed_reserved_keys() {
        let mut record = Record::inbound("orders", 0, 7, Vec::new());
        record
            .headers
            .push((STREAM_OFFSET.to_string(), b"9999".to_vec()));

        let header = Header::from_record(&record);
        assert_eq!(header.values(STREAM_OFFSET), vec!["7"]);
    }
}

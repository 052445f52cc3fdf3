//! Outbound message unit

use crate::header::Header;

/// A message to be written to a stream.
///
/// Ephemeral; built per write call. The key selects broker partition
/// affinity. Writers never enrich the header; broker provenance is
/// injected on the read path only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Partition-affinity key, if any
    pub key: Option<String>,
    /// User metadata
    pub header: Header,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl Message {
    /// Creates a message from its payload.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: None,
            header: Header::new(),
            data: data.into(),
        }
    }

    /// Sets the partition-affinity key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the user header map.
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }
}

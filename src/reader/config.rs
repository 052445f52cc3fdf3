//! Reader manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bounded poll batch size.
pub const DEFAULT_POLL_BATCH_SIZE: usize = 100;
/// Default sleep between poll retries and empty polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default per-record handler timeout.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Offset commit policy, selected at construction.
///
/// Append-log storage has no partial-offset commit: committing an offset
/// marks every lower offset of that partition processed too. The two
/// policies trade redelivery granularity against offset skew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit all uncommitted offsets for the batch once the commit barrier
    /// clears. Coarse: a single failed record still advances the whole
    /// batch, so failed records are not redelivered on restart. This is
    /// the default; pair it with the dead-letter interceptor to avoid
    /// losing failed records.
    #[default]
    AllUncommitted,
    /// Commit only the successfully processed records. Failed records are
    /// redelivered on restart, at the cost of re-delivering any
    /// already-successful record sitting above a failed offset.
    ProcessedOnly,
}

/// Configuration for the reader manager.
///
/// Zero-valued sizes and durations are resolved to their defaults when the
/// manager starts, so a deserialized partial config behaves sensibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Upper bound on records fetched per poll; `0` means the default (100)
    pub poll_batch_size: usize,
    /// Sleep between poll retries and empty polls; zero means 500 ms
    pub poll_interval: Duration,
    /// Concurrent handler executions; `0` means half the poll batch size
    pub worker_pool_size: usize,
    /// Per-record handler timeout; zero means 30 s
    pub handler_timeout: Duration,
    /// Offset commit policy
    pub commit_policy: CommitPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_batch_size: DEFAULT_POLL_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_pool_size: 0,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            commit_policy: CommitPolicy::default(),
        }
    }
}

impl ReaderConfig {
    /// Returns a copy with every zero value replaced by its default.
    pub fn resolved(&self) -> Self {
        let poll_batch_size = if self.poll_batch_size == 0 {
            DEFAULT_POLL_BATCH_SIZE
        } else {
            self.poll_batch_size
        };
        Self {
            poll_batch_size,
            poll_interval: if self.poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                self.poll_interval
            },
            worker_pool_size: if self.worker_pool_size == 0 {
                (poll_batch_size / 2).max(1)
            } else {
                self.worker_pool_size
            },
            handler_timeout: if self.handler_timeout.is_zero() {
                DEFAULT_HANDLER_TIMEOUT
            } else {
                self.handler_timeout
            },
            commit_policy: self.commit_policy,
        }
    }

    /// Validates the resolved configuration.
    pub fn validate(&self) -> Result<(), String> {
        let resolved = self.resolved();
        if resolved.worker_pool_size > resolved.poll_batch_size {
            return Err(format!(
                "worker pool size {} exceeds poll batch size {}",
                resolved.worker_pool_size, resolved.poll_batch_size
            ));
        }
        Ok(())
    }
}

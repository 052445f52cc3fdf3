//! Reader manager: polling, dispatch and offset commit
//!
//! One poller task per broker-client handle (the default handle plus one
//! per distinct registered consumer group) feeds a bounded worker pool.
//! Offsets advance only after the whole batch has been handled, under the
//! commit policy picked at construction.

pub mod config;
mod inflight;
mod manager;

pub use config::{CommitPolicy, ReaderConfig};
pub use manager::{ErrorCallback, ReaderManager, RegisterOptions};

use crate::error::StreamResult;

/// A component registering its readers against a [`ReaderManager`] during
/// application wiring, before the manager starts.
pub trait Controller {
    /// Registers this component's topic handlers.
    fn register_readers(&self, manager: &mut ReaderManager) -> StreamResult<()>;
}

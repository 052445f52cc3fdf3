//! Record handlers and the interceptor chain
//!
//! An interceptor has the shape `next -> Handler`, so the outermost
//! interceptor runs first. Chains are composed once, at registration time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::client::BrokerClient;
use crate::record::Record;

/// Header added by the dead-letter interceptor, recording the topic the
/// record originally came from.
pub const ORIGINAL_TOPIC: &str = "Original-Topic";

/// Outcome of a single handler invocation.
pub type HandlerResult = anyhow::Result<()>;

/// Boxed future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A record handler: invoked for every record polled from its topic.
pub type Handler = Arc<dyn Fn(Arc<Record>) -> HandlerFuture + Send + Sync>;

/// An interceptor decorates a handler with cross-cutting behavior.
pub type Interceptor = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Predicate deciding whether a record bypasses an interceptor.
pub type SkipFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Adapts an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Record>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |record| Box::pin(f(record)))
}

/// Composes `interceptors` around `handler`, outermost first.
pub fn chain(handler: Handler, interceptors: &[Interceptor]) -> Handler {
    interceptors
        .iter()
        .rev()
        .fold(handler, |next, interceptor| interceptor(next))
}

/// Interceptor logging every record before dispatch and every failure after.
pub fn log() -> Interceptor {
    Arc::new(|next: Handler| {
        Arc::new(move |record: Arc<Record>| {
            let next = next.clone();
            Box::pin(async move {
                debug!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "dispatching record"
                );
                let result = next(record.clone()).await;
                if let Err(err) = &result {
                    warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        error = %err,
                        "handler failed"
                    );
                }
                result
            })
        })
    })
}

/// Interceptor recovering handler panics into ordinary processing errors.
///
/// Opt-in, last-resort boundary guard around user-supplied handler code so
/// one bad record cannot crash the poller. Handlers should return errors
/// through their `Result` instead of panicking.
pub fn recover() -> Interceptor {
    Arc::new(|next: Handler| {
        Arc::new(move |record: Arc<Record>| {
            let next = next.clone();
            Box::pin(async move {
                match std::panic::AssertUnwindSafe(next(record)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let reason = payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        Err(anyhow!("handler panicked: {reason}"))
                    }
                }
            })
        })
    })
}

/// Dead-letter interceptor builder.
///
/// On handler success the record passes through unchanged. On failure the
/// original record is synchronously republished to the configured topic
/// (or `<topic>-dlq` by default) with an [`ORIGINAL_TOPIC`] header, and the
/// original error is still returned upward so the commit policy treats the
/// record as failed.
pub struct DeadLetter {
    client: Arc<dyn BrokerClient>,
    topic: Option<String>,
    skip: Option<SkipFn>,
}

impl DeadLetter {
    /// Creates a dead-letter interceptor publishing through `client`.
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self {
            client,
            topic: None,
            skip: None,
        }
    }

    /// Overrides the derived `<topic>-dlq` destination.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets a predicate letting specific records bypass the interceptor,
    /// e.g. records that were already dead-lettered once.
    pub fn with_skip(mut self, skip: SkipFn) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Builds the interceptor.
    pub fn interceptor(self) -> Interceptor {
        let DeadLetter {
            client,
            topic,
            skip,
        } = self;
        Arc::new(move |next: Handler| {
            let client = client.clone();
            let topic = topic.clone();
            let skip = skip.clone();
            Arc::new(move |record: Arc<Record>| {
                let next = next.clone();
                let client = client.clone();
                let topic = topic.clone();
                let skip = skip.clone();
                Box::pin(async move {
                    if skip.as_ref().is_some_and(|skip| skip(&record)) {
                        return next(record).await;
                    }

                    let err = match next(record.clone()).await {
                        Ok(()) => return Ok(()),
                        Err(err) => err,
                    };

                    let mut republish = (*record).clone();
                    republish
                        .headers
                        .push((ORIGINAL_TOPIC.to_string(), record.topic.clone().into_bytes()));
                    republish.topic = topic
                        .clone()
                        .unwrap_or_else(|| format!("{}-dlq", record.topic));
                    republish.partition = -1;
                    republish.offset = -1;

                    match client.produce_sync(republish).await {
                        Ok(()) => Err(err),
                        Err(republish_err) => Err(err.context(format!(
                            "dead-letter republish failed: {republish_err}"
                        ))),
                    }
                })
            })
        })
    }
}

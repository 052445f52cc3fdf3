//! Polling and dispatch engine

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{BrokerClient, ClientFactory};
use crate::error::{StreamError, StreamResult};
use crate::group::ConsumerGroup;
use crate::interceptor::{chain, Handler, Interceptor};
use crate::reader::config::{CommitPolicy, ReaderConfig};
use crate::reader::inflight::InFlight;
use crate::record::Record;

/// Callback receiving every reportable, non-fatal engine error: retriable
/// poll failures, empty-poll signals, missing handlers, handler failures
/// and commit errors.
pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

// Lifecycle states. Transitions only move forward.
const UNSTARTED: u8 = 0;
const RUNNING: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

/// Options for a single topic registration.
#[derive(Default)]
pub struct RegisterOptions {
    group: Option<ConsumerGroup>,
    interceptors: Vec<Interceptor>,
}

impl RegisterOptions {
    /// Creates empty options: default client, bare handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes records through a dedicated consumer group.
    pub fn with_group(mut self, group: ConsumerGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Wraps the handler with an interceptor. Interceptors run in the
    /// order they were added, outermost first.
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }
}

/// Manages the reading of records from broker topics.
///
/// Owns one default broker-client handle plus one per distinct registered
/// consumer group, a bounded worker pool, and the commit policy. Handlers
/// are registered per topic before [`ReaderManager::start`]; each polled
/// record is dispatched through its interceptor-wrapped handler and the
/// batch's offsets are committed only once every dispatched record has
/// completed.
///
/// Handler errors are never auto-retried by this layer: pair the manager
/// with the dead-letter interceptor or rely on redelivery-on-restart via
/// [`CommitPolicy::ProcessedOnly`].
pub struct ReaderManager {
    config: ReaderConfig,
    client: Arc<dyn BrokerClient>,
    factory: Arc<dyn ClientFactory>,
    handlers: HashMap<String, Handler>,
    group_clients: HashMap<String, Arc<dyn BrokerClient>>,
    error_callback: Option<ErrorCallback>,
    state: AtomicU8,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReaderManager {
    /// Creates a manager with its default broker-client handle.
    pub fn new(config: ReaderConfig, factory: Arc<dyn ClientFactory>) -> StreamResult<Self> {
        config.validate().map_err(StreamError::Config)?;
        let client = factory.create(None)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            client,
            factory,
            handlers: HashMap::new(),
            group_clients: HashMap::new(),
            error_callback: None,
            state: AtomicU8::new(UNSTARTED),
            shutdown_tx,
            shutdown_rx,
            pollers: Mutex::new(Vec::new()),
        })
    }

    /// Sets the error/observability callback.
    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.error_callback = Some(callback);
        self
    }

    /// Registers a handler for a topic.
    ///
    /// Legal only before [`ReaderManager::start`]; afterwards it fails with
    /// [`StreamError::AlreadyStarted`] (or [`StreamError::Closed`]).
    /// Registering a topic twice fails with
    /// [`StreamError::AlreadyRegistered`] and never replaces the first
    /// handler. With a group option, the topic is consumed through a
    /// dedicated client shared by every registration naming that group.
    pub fn register(
        &mut self,
        topic: &str,
        handler: Handler,
        opts: RegisterOptions,
    ) -> StreamResult<()> {
        match self.state.load(Ordering::Acquire) {
            UNSTARTED => {}
            RUNNING => return Err(StreamError::AlreadyStarted),
            _ => return Err(StreamError::Closed),
        }
        if self.handlers.contains_key(topic) {
            return Err(StreamError::AlreadyRegistered {
                topic: topic.to_string(),
            });
        }

        let wrapped = chain(handler, &opts.interceptors);
        self.handlers.insert(topic.to_string(), wrapped);

        match opts.group {
            None => self.client.add_consume_topic(topic),
            Some(group) => {
                let key = group.to_string();
                if let Some(existing) = self.group_clients.get(&key) {
                    return existing.add_consume_topic(topic);
                }
                let group_client = self.factory.create(Some(&group))?;
                group_client.add_consume_topic(topic)?;
                self.group_clients.insert(key, group_client);
                Ok(())
            }
        }
    }

    /// Starts one poller per owned client handle.
    ///
    /// Fails with [`StreamError::AlreadyStarted`] on a second invocation
    /// and [`StreamError::Closed`] after shutdown. Poller failures are
    /// reported through the error callback; the call itself returns as
    /// soon as the pollers are running.
    pub fn start(&self) -> StreamResult<()> {
        match self.state.compare_exchange(
            UNSTARTED,
            RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(RUNNING) => return Err(StreamError::AlreadyStarted),
            Err(_) => return Err(StreamError::Closed),
        }

        let config = self.config.resolved();
        let handlers = Arc::new(self.handlers.clone());
        let workers = Arc::new(Semaphore::new(config.worker_pool_size));

        let mut clients: Vec<Arc<dyn BrokerClient>> = vec![self.client.clone()];
        clients.extend(self.group_clients.values().cloned());
        info!(
            pollers = clients.len(),
            topics = handlers.len(),
            workers = config.worker_pool_size,
            "starting reader manager"
        );

        let mut pollers = self
            .pollers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for client in clients {
            let ctx = PollerContext {
                client,
                handlers: handlers.clone(),
                config: config.clone(),
                workers: workers.clone(),
                callback: self.error_callback.clone(),
                shutdown: self.shutdown_rx.clone(),
            };
            pollers.push(tokio::spawn(async move {
                match poll_loop(ctx).await {
                    Err(err) if !err.is_closed() => warn!(error = %err, "poller terminated"),
                    _ => debug!("poller stopped"),
                }
            }));
        }
        Ok(())
    }

    /// Stops polling and shuts the manager down.
    ///
    /// Signals every poller, waits for each to drain its in-flight batch,
    /// then closes every owned client handle. In-flight handlers are never
    /// abandoned; offsets for the final batches are committed before the
    /// pollers exit. A second call reports [`StreamError::Closed`] instead
    /// of re-executing teardown.
    pub async fn close(&self) -> StreamResult<()> {
        let previous = self.state.swap(CLOSING, Ordering::AcqRel);
        if previous == CLOSING || previous == CLOSED {
            self.state.store(CLOSED, Ordering::Release);
            return Err(StreamError::Closed);
        }

        self.shutdown_tx.send(true).ok();
        let pollers = std::mem::take(
            &mut *self
                .pollers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for poller in pollers {
            poller.await.ok();
        }

        self.client.close().await;
        for client in self.group_clients.values() {
            client.close().await;
        }

        self.state.store(CLOSED, Ordering::Release);
        info!("reader manager closed");
        Ok(())
    }
}

struct PollerContext {
    client: Arc<dyn BrokerClient>,
    handlers: Arc<HashMap<String, Handler>>,
    config: ReaderConfig,
    workers: Arc<Semaphore>,
    callback: Option<ErrorCallback>,
    shutdown: watch::Receiver<bool>,
}

fn report(callback: &Option<ErrorCallback>, err: &StreamError) {
    match err {
        StreamError::NoRecords => debug!("poll returned no records"),
        other => warn!(error = %other, "reader error"),
    }
    if let Some(callback) = callback {
        callback(err);
    }
}

async fn poll_loop(mut ctx: PollerContext) -> Result<(), StreamError> {
    loop {
        if *ctx.shutdown.borrow() {
            return Err(StreamError::Closed);
        }

        let batch = tokio::select! {
            _ = ctx.shutdown.changed() => return Err(StreamError::Closed),
            polled = ctx.client.poll(ctx.config.poll_batch_size) => match polled {
                Ok(batch) => batch,
                Err(err) if err.is_closed() => return Err(StreamError::Closed),
                Err(err) if err.is_retriable() => {
                    report(&ctx.callback, &err);
                    if sleep_or_shutdown(&mut ctx.shutdown, ctx.config.poll_interval).await {
                        return Err(StreamError::Closed);
                    }
                    continue;
                }
                Err(err) => return Err(err),
            },
        };

        if batch.is_empty() {
            report(&ctx.callback, &StreamError::NoRecords);
            if sleep_or_shutdown(&mut ctx.shutdown, ctx.config.poll_interval).await {
                return Err(StreamError::Closed);
            }
            continue;
        }

        dispatch_batch(&ctx, batch).await;
    }
}

/// Dispatches one polled batch and commits its offsets.
///
/// Every record is accounted for in the in-flight counter before the
/// commit barrier; records without a handler are reported and released
/// without blocking the rest of the batch.
async fn dispatch_batch(ctx: &PollerContext, batch: Vec<Record>) {
    let in_flight = Arc::new(InFlight::new());
    in_flight.add(batch.len());
    let processed: Arc<Mutex<Vec<Arc<Record>>>> = Arc::new(Mutex::new(Vec::new()));

    for record in batch {
        let record = Arc::new(record);
        let Some(handler) = ctx.handlers.get(&record.topic) else {
            report(
                &ctx.callback,
                &StreamError::NoHandlerFound {
                    topic: record.topic.clone(),
                },
            );
            in_flight.done();
            continue;
        };

        // Backpressure: dispatch blocks here once the pool is saturated,
        // which in turn blocks the next poll.
        let permit = match ctx.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                in_flight.done();
                continue;
            }
        };

        let handler = handler.clone();
        let callback = ctx.callback.clone();
        let timeout = ctx.config.handler_timeout;
        let in_flight = in_flight.clone();
        let processed = processed.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, handler(record.clone())).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(StreamError::Handler {
                    topic: record.topic.clone(),
                    partition: record.partition,
                    offset: record.offset,
                    source,
                }),
                Err(_) => Err(StreamError::HandlerTimeout {
                    topic: record.topic.clone(),
                    partition: record.partition,
                    offset: record.offset,
                    timeout,
                }),
            };
            match result {
                Ok(()) => processed
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(record),
                Err(err) => report(&callback, &err),
            }
            drop(permit);
            in_flight.done();
        });
    }

    // Commit barrier: offsets never advance past an unprocessed record.
    in_flight.wait_idle().await;

    let commit_result = match ctx.config.commit_policy {
        CommitPolicy::AllUncommitted => ctx.client.commit_uncommitted().await,
        CommitPolicy::ProcessedOnly => {
            let records = std::mem::take(
                &mut *processed
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
            );
            if records.is_empty() {
                Ok(())
            } else {
                ctx.client.commit_records(&records).await
            }
        }
    };
    if let Err(err) = commit_result {
        report(&ctx.callback, &err);
    }
}

/// Sleeps for `interval`, returning `true` if shutdown was signaled first.
async fn sleep_or_shutdown(
    shutdown: &mut watch::Receiver<bool>,
    interval: std::time::Duration,
) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

//! Pipeline runtime: one producer thread, one consumer thread, one queue.
//!
//! # Architecture
//!
//! ```text
//! Source -> producer thread -> BoundedQueue -> consumer thread -> Sink
//! ```
//!
//! The pipeline owns the only [`BoundedQueue`] and hands shared access to
//! exactly two role threads:
//! - **Producer thread**: drains the [`Source`] into the queue, closes the
//!   queue when the source is exhausted (or fails).
//! - **Consumer thread**: drains the queue into the [`Sink`] until the
//!   terminal pop.
//!
//! A run moves through four phases: Idle (constructed) -> Running (both
//! roles active) -> Draining (producer finished and the queue closed, the
//! consumer still emptying buffered items) -> Finished (the consumer
//! observed the terminal pop). [`Pipeline::join`] returns only once the
//! run is Finished, or reports a role thread that outlived the configured
//! join timeout.
//!
//! Source fetches and sink writes run on their own role thread, never
//! under the queue lock.

pub mod consumer;
pub mod producer;

use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use crate::queue::BoundedQueue;
use crate::trace::{debug, info};

pub use consumer::{ConsumerReport, run_consumer};
pub use producer::{ProducerError, ProducerReport, run_producer};

/// Error surfaced by a [`Source`] when fetching fails.
///
/// The stream ends at the first fetch error: the producer reports it and
/// closes the queue without pushing anything partial.
#[derive(Debug, Error)]
#[error("source fetch failed: {0}")]
pub struct FetchError(Box<dyn StdError + Send + Sync>);

impl FetchError {
    /// Wraps any error type as a fetch failure.
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Error surfaced by a [`Sink`] for a single item.
///
/// Sink errors are local: the consumer reports them and keeps draining.
#[derive(Debug, Error)]
#[error("sink rejected an item: {0}")]
pub struct SinkError(Box<dyn StdError + Send + Sync>);

impl SinkError {
    /// Wraps any error type as a sink failure.
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Upstream capability: hands the producer one item at a time.
///
/// Called only from the producer thread; no thread safety is required
/// beyond single-caller use.
pub trait Source {
    type Item: Send;

    /// Fetches the next item; `Ok(None)` means clean exhaustion.
    ///
    /// # Errors
    ///
    /// A [`FetchError`] ends the stream the same way as exhaustion.
    fn fetch_next(&mut self) -> Result<Option<Self::Item>, FetchError>;
}

/// Downstream capability: receives items from the consumer.
///
/// Called only from the consumer thread; no thread safety is required
/// beyond single-caller use.
pub trait Sink {
    type Item: Send;

    /// Processes one item.
    ///
    /// # Errors
    ///
    /// A [`SinkError`] is reported and counted; it never stops drainage.
    fn consume(&mut self, item: Self::Item) -> Result<(), SinkError>;
}

/// [`Source`] backed by a closure. See [`source_fn`].
pub struct SourceFn<F>(F);

/// Wraps a closure as a [`Source`], so a role can be driven by a plain
/// function instead of a dedicated type.
pub fn source_fn<T, F>(f: F) -> SourceFn<F>
where
    T: Send,
    F: FnMut() -> Result<Option<T>, FetchError>,
{
    SourceFn(f)
}

impl<T, F> Source for SourceFn<F>
where
    T: Send,
    F: FnMut() -> Result<Option<T>, FetchError>,
{
    type Item = T;

    fn fetch_next(&mut self) -> Result<Option<T>, FetchError> {
        (self.0)()
    }
}

/// [`Sink`] backed by a closure. See [`sink_fn`].
pub struct SinkFn<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

/// Wraps a closure as a [`Sink`].
pub fn sink_fn<T, F>(f: F) -> SinkFn<F, T>
where
    T: Send,
    F: FnMut(T) -> Result<(), SinkError>,
{
    SinkFn {
        f,
        _item: PhantomData,
    }
}

impl<T, F> Sink for SinkFn<F, T>
where
    T: Send,
    F: FnMut(T) -> Result<(), SinkError>,
{
    type Item = T;

    fn consume(&mut self, item: T) -> Result<(), SinkError> {
        (self.f)(item)
    }
}

/// Default queue capacity used by [`PipelineConfig::default`].
pub const DEFAULT_CAPACITY: usize = 8;

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue capacity, the backpressure bound. Must be positive.
    pub capacity: usize,
    /// Upper bound on how long [`Pipeline::join`] waits for the role
    /// threads. `None` waits indefinitely.
    pub join_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            join_timeout: None,
        }
    }
}

/// Identifies which role thread a pipeline error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        })
    }
}

/// Error joining a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A role thread was still running when the join timeout expired. The
    /// thread keeps running; it is reported, never assumed finished.
    #[error("{0} thread still running after the join timeout")]
    JoinTimedOut(Role),
    /// A role thread panicked.
    #[error("{0} thread panicked")]
    RolePanicked(Role),
}

/// Outcome of a completed pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Wall-clock time from spawn to the last join.
    pub elapsed: Duration,
    /// Items the producer pushed into the queue.
    pub produced: u64,
    /// Items the sink processed successfully.
    pub consumed: u64,
    /// Items the sink rejected (reported, non-fatal).
    pub sink_failures: u64,
    /// Why the producer stopped early, if it did.
    pub producer_error: Option<ProducerError>,
    /// The most recent sink failure, if any occurred.
    pub last_sink_error: Option<SinkError>,
}

/// Handle to a running pipeline.
///
/// Dropping the handle closes the queue (so neither role thread can stay
/// parked forever) but does not wait for the threads. Use
/// [`Pipeline::join`] for a graceful join with a report.
pub struct Pipeline<T: Send + 'static> {
    queue: Arc<BoundedQueue<T>>,
    producer_handle: Option<JoinHandle<ProducerReport>>,
    consumer_handle: Option<JoinHandle<ConsumerReport>>,
    started: Instant,
    join_timeout: Option<Duration>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Spawns the producer and consumer threads around a fresh queue.
    ///
    /// # Panics
    ///
    /// Panics if `config.capacity == 0` or if thread spawning fails.
    #[must_use]
    pub fn spawn<S, K>(config: PipelineConfig, source: S, sink: K) -> Self
    where
        S: Source<Item = T> + Send + 'static,
        K: Sink<Item = T> + Send + 'static,
    {
        let queue = Arc::new(BoundedQueue::new(config.capacity));
        let started = Instant::now();
        info!(capacity = config.capacity, "pipeline starting");

        debug!("spawning producer thread");
        let producer_queue = Arc::clone(&queue);
        let producer_handle = thread::Builder::new()
            .name("conveyor-producer".into())
            .spawn(move || run_producer(source, &producer_queue))
            .expect("failed to spawn producer thread");

        debug!("spawning consumer thread");
        let consumer_queue = Arc::clone(&queue);
        let consumer_handle = thread::Builder::new()
            .name("conveyor-consumer".into())
            .spawn(move || run_consumer(sink, &consumer_queue))
            .expect("failed to spawn consumer thread");

        Self {
            queue,
            producer_handle: Some(producer_handle),
            consumer_handle: Some(consumer_handle),
            started,
            join_timeout: config.join_timeout,
        }
    }

    /// Closes the queue early: the producer's next push fails fast and the
    /// consumer drains what is already buffered, then stops.
    pub fn cancel(&self) {
        info!("pipeline cancelled");
        self.queue.close();
    }

    /// Waits for the producer, then the consumer, and reports the run.
    ///
    /// # Errors
    ///
    /// [`PipelineError::JoinTimedOut`] if a role thread is still running
    /// when the configured join timeout expires, or
    /// [`PipelineError::RolePanicked`] if a role thread panicked.
    pub fn join(mut self) -> Result<PipelineReport, PipelineError> {
        let deadline = self.join_timeout.map(|t| Instant::now() + t);

        debug!("waiting for producer thread");
        let handle = self.producer_handle.take().expect("join consumes the handle");
        let producer = join_role(handle, Role::Producer, deadline)?;

        debug!("waiting for consumer thread");
        let handle = self.consumer_handle.take().expect("join consumes the handle");
        let consumer = join_role(handle, Role::Consumer, deadline)?;

        let elapsed = self.started.elapsed();
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            produced = producer.pushed,
            consumed = consumer.consumed,
            sink_failures = consumer.sink_failures,
            "pipeline finished"
        );

        Ok(PipelineReport {
            elapsed,
            produced: producer.pushed,
            consumed: consumer.consumed,
            sink_failures: consumer.sink_failures,
            producer_error: producer.error,
            last_sink_error: consumer.last_sink_error,
        })
    }
}

impl<T: Send + 'static> Drop for Pipeline<T> {
    fn drop(&mut self) {
        // Unblock any parked role thread; join() is the graceful path.
        self.queue.close();
    }
}

/// Joins one role thread, honoring the shared deadline.
fn join_role<R>(
    handle: JoinHandle<R>,
    role: Role,
    deadline: Option<Instant>,
) -> Result<R, PipelineError> {
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return Err(PipelineError::JoinTimedOut(role));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
    handle.join().map_err(|_| PipelineError::RolePanicked(role))
}

/// Spawns a pipeline and joins it: the one-shot entry point.
///
/// # Errors
///
/// See [`Pipeline::join`].
pub fn run<S, K>(
    config: PipelineConfig,
    source: S,
    sink: K,
) -> Result<PipelineReport, PipelineError>
where
    S: Source + Send + 'static,
    S::Item: 'static,
    K: Sink<Item = S::Item> + Send + 'static,
{
    Pipeline::spawn(config, source, sink).join()
}

//! Producer role: drains a [`Source`] into the queue, then closes it.
//!
//! Responsibilities:
//! - Fetch items one at a time; fetches run outside the queue lock.
//! - Push with an unbounded wait, so a full queue parks this thread
//!   (backpressure) instead of growing the buffer.
//! - Close the queue exactly once, on every exit path: clean exhaustion,
//!   fetch failure, or the queue being closed underneath us. A failed
//!   fetch never results in a partial or sentinel item in the queue.

use thiserror::Error;

use crate::queue::{BoundedQueue, PushError};
use crate::trace::{error, info, warn};

use super::{FetchError, Source};

/// Why a producer run stopped before clean exhaustion.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The source failed; the stream ended the same way as exhaustion.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The queue was closed while the source still had items, either by
    /// cancellation or by a contract violation from another closer.
    #[error("queue closed before the source was exhausted")]
    QueueClosed,
}

/// Outcome of one producer run.
#[derive(Debug)]
pub struct ProducerReport {
    /// Items pushed into the queue.
    pub pushed: u64,
    /// Why the run ended early, if it did.
    pub error: Option<ProducerError>,
}

/// Runs the producer loop to completion.
///
/// Closes the queue exactly once before returning, whatever the exit
/// path, so the consumer always observes the terminal condition.
pub fn run_producer<S: Source>(mut source: S, queue: &BoundedQueue<S::Item>) -> ProducerReport {
    let mut pushed = 0u64;
    let error = loop {
        match source.fetch_next() {
            Ok(Some(item)) => match queue.push(item) {
                Ok(()) => pushed += 1,
                Err(PushError::Closed(_)) => {
                    error!(pushed, "queue closed under the producer");
                    break Some(ProducerError::QueueClosed);
                }
                Err(PushError::TimedOut(_)) => unreachable!("infinite push cannot time out"),
            },
            Ok(None) => {
                info!(pushed, "source exhausted");
                break None;
            }
            Err(err) => {
                warn!(error = %err, pushed, "source failed, ending stream");
                break Some(ProducerError::Fetch(err));
            }
        }
    };
    queue.close();
    ProducerReport { pushed, error }
}

//! Consumer role: drains the queue into a [`Sink`].
//!
//! A failed sink call is reported and counted, never fatal: one bad item
//! must not stop the remaining buffered items from draining. The loop
//! ends only at the terminal pop (queue closed and empty).

use crate::queue::BoundedQueue;
use crate::trace::{info, warn};

use super::{Sink, SinkError};

/// Outcome of one consumer run.
#[derive(Debug)]
pub struct ConsumerReport {
    /// Items the sink processed successfully.
    pub consumed: u64,
    /// Items the sink rejected.
    pub sink_failures: u64,
    /// The most recent sink failure, if any occurred.
    pub last_sink_error: Option<SinkError>,
}

/// Runs the consumer loop until the terminal pop.
pub fn run_consumer<K: Sink>(mut sink: K, queue: &BoundedQueue<K::Item>) -> ConsumerReport {
    let mut consumed = 0u64;
    let mut sink_failures = 0u64;
    let mut last_sink_error = None;
    while let Some(item) = queue.pop() {
        match sink.consume(item) {
            Ok(()) => consumed += 1,
            Err(err) => {
                sink_failures += 1;
                warn!(error = %err, sink_failures, "sink rejected an item, continuing");
                last_sink_error = Some(err);
            }
        }
    }
    info!(consumed, sink_failures, "queue drained and closed");
    ConsumerReport {
        consumed,
        sink_failures,
        last_sink_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sink_fn;

    #[test]
    fn test_consumer_stops_at_terminal() {
        let queue = BoundedQueue::new(8);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        queue.close();

        let mut seen = Vec::new();
        let report = run_consumer(
            sink_fn(|item: u32| {
                seen.push(item);
                Ok(())
            }),
            &queue,
        );

        assert_eq!(report.consumed, 2);
        assert_eq!(report.sink_failures, 0);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_consumer_survives_sink_failures() {
        let queue = BoundedQueue::new(8);
        for i in 0..6u32 {
            queue.push(i).unwrap();
        }
        queue.close();

        let report = run_consumer(
            sink_fn(|item: u32| {
                if item % 2 == 0 {
                    Err(SinkError::new(format!("rejected {item}")))
                } else {
                    Ok(())
                }
            }),
            &queue,
        );

        assert_eq!(report.consumed, 3);
        assert_eq!(report.sink_failures, 3);
        assert!(report.last_sink_error.is_some());
        // Drainage completed despite the failures.
        assert!(queue.is_empty());
    }
}

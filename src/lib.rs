//! Bounded, closeable producer/consumer hand-off between threads.
//!
//! # Overview
//!
//! - [`queue::BoundedQueue`] - capacity-bounded FIFO monitor with blocking
//!   push/pop, backpressure, and graceful close
//! - [`pipeline::Pipeline`] - wires one producer and one consumer thread
//!   around a shared queue and joins both
//! - [`matrices`] - demo workload: matrix pairs in, products out
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use conveyor::pipeline::{self, PipelineConfig, sink_fn, source_fn};
//!
//! let mut next = 0u32;
//! let source = source_fn(move || {
//!     next += 1;
//!     Ok(if next <= 100 { Some(next) } else { None })
//! });
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink_seen = Arc::clone(&seen);
//! let sink = sink_fn(move |item: u32| {
//!     sink_seen.lock().unwrap().push(item);
//!     Ok(())
//! });
//!
//! let report = pipeline::run(PipelineConfig::default(), source, sink).unwrap();
//!
//! assert_eq!(report.produced, 100);
//! assert_eq!(seen.lock().unwrap().len(), 100);
//! ```

pub mod matrices;
pub mod pipeline;
pub mod queue;
mod trace;

#[doc(inline)]
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport};

#[doc(inline)]
pub use queue::{BoundedQueue, Timeout};

pub use trace::init_tracing;

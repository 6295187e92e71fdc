//! # Ingestion
//!
//! Upstream side of the relay: one long-lived HTTP/1.1 chunked stream per
//! consumer, framed into items and published on the shared event queue.
//!
//! Responsibilities:
//! - Hand-framed `POST` request with form-encoded filter parameters
//! - Chunked transfer decoding on the raw socket
//! - Length-delimited item framing
//! - Linear (TCP) and stepped (HTTP) reconnect backoff
//! - `Connect` / `Data` / `Exit` events through `EventNotifier`
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{Consumer, EventNotifier, IngestionMetrics, LengthDelimitedFramer};
//!
//! let notifier = EventNotifier::new();
//! let framer = LengthDelimitedFramer::new(upstream.max_item_bytes);
//! let consumer = Consumer::new(&upstream, &params, framer, notifier.clone(), metrics);
//! let handle = consumer.spawn();
//!
//! while let Some(event) = notifier.next().await {
//!     // Connect / Data / Exit
//! }
//! handle.kill().await;
//! ```

mod chunked;
mod consumer;
mod error;
mod framer;
mod metrics;
mod notifier;
mod request;

pub use chunked::{ChunkedReader, MAX_LINE_BYTES};
pub use consumer::{Consumer, ConsumerExit, ConsumerHandle};
pub use error::{Result, StreamError};
pub use framer::{DataFramer, LengthDelimitedFramer, LocalDataFramer};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use notifier::EventNotifier;
pub use request::{encode_form, parse_status_line, StreamRequest};

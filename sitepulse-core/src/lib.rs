//! # sitepulse-core
//!
//! Core library for sitepulse - a client-side telemetry capture and delivery
//! pipeline.
//!
//! This library provides:
//! - A normalized event model with session and identity stamping
//! - Capture adapters for raw page signals, including rage-click detection
//!   and probabilistic heatmap sampling
//! - Batching, periodic dispatch, and fast-path delivery of critical events
//! - A bounded durable offline queue with all-or-nothing resync
//!
//! ## Architecture
//!
//! Signals flow through the pipeline in stages:
//! - **Capture:** adapters turn raw host signals into normalized events
//! - **Classify & buffer:** events accumulate in capture order; critical
//!   events also take an immediate fast path
//! - **Dispatch & transport:** the buffer is drained into batches on a timer,
//!   on visibility loss, and (forced) at teardown
//! - **Offline queue:** undelivered payloads park in bounded durable storage
//!   and replay when connectivity returns
//!
//! ## Example
//!
//! ```rust,no_run
//! use sitepulse_core::{Config, HttpSink, OfflineQueue, Pipeline, SqliteQueueStore, Transport};
//! use sitepulse_core::capture::PageSignal;
//! use sitepulse_core::types::{Environment, PageContext, Viewport};
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn compose() -> sitepulse_core::Result<()> {
//! let config = Config::load()?;
//!
//! let sink = HttpSink::from_config(&config.backend)?;
//! let store = SqliteQueueStore::open(&Config::queue_path())?;
//! let queue = OfflineQueue::new(store, config.pipeline.offline_capacity);
//! let transport = Transport::new(sink, queue);
//!
//! let environment = Environment {
//!     user_agent: "Mozilla/5.0".to_string(),
//!     screen_width: 1920,
//!     screen_height: 1080,
//!     locale: "en-US".to_string(),
//!     referrer: String::new(),
//! };
//! let context = PageContext {
//!     url: "https://example.com/".to_string(),
//!     title: "Example".to_string(),
//!     viewport: Viewport { width: 1280, height: 720 },
//! };
//!
//! let pipeline = Pipeline::new(&config.pipeline, environment, context, transport);
//!
//! let (signals_tx, signals_rx) = mpsc::channel::<PageSignal>(256);
//! let (_identity_tx, identity_rx) = watch::channel(None::<String>);
//! pipeline.run(signals_rx, identity_rx).await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use offline::OfflineQueue;
pub use pipeline::{Flow, Pipeline, PipelineStats};
pub use session::SessionTracker;
pub use store::{MemoryQueueStore, QueueStore, SqliteQueueStore};
pub use transport::{AnalyticsSink, HttpSink, Transport};

// Public modules
pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod offline;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

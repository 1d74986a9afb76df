//! Media group debouncing and sink delivery.
//!
//! Telegram delivers an album as one webhook per item, with nothing marking
//! the last one. This crate buffers grouped fragments in a
//! [`GroupStore`](grouprelay_core::GroupStore) and flushes each group as one
//! batch once it has been quiet for the debounce window. Ungrouped events
//! bypass the buffer and go straight to the sink.
//!
//! # Components
//!
//! 1. **Engine** - accepts events, refreshes quiescence markers and schedules
//!    one deferred check per fragment
//! 2. **Dispatcher** - atomically drains a finished group and delivers it
//! 3. **Sink** - posts JSON payloads downstream, with no retries
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use grouprelay_core::{MemoryGroupStore, RealClock};
//! use grouprelay_delivery::{DebounceEngine, EngineConfig, HttpSink};
//!
//! # fn example() -> grouprelay_delivery::Result<()> {
//! let sink = HttpSink::with_defaults("https://n8n.example.com/webhook/album")?;
//! let engine = DebounceEngine::new(
//!     Arc::new(MemoryGroupStore::new()),
//!     Arc::new(sink),
//!     Arc::new(RealClock::new()),
//!     EngineConfig::default(),
//! );
//!
//! engine.start();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dispatcher;
pub mod engine;
pub mod error;

pub use client::{ClientConfig, HttpSink, Sink, SinkResponse, UnconfiguredSink};
pub use dispatcher::{DispatchOutcome, FlushDispatcher};
pub use engine::{
    CheckOutcome, DebounceEngine, EngineConfig, EngineStats, StatsSnapshot, SubmitOutcome,
};
pub use error::{DeliveryError, ErrorCategory, Result};

/// Default sink request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Default quiescence window in milliseconds.
pub const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 5_000;

/// Default interval between orphan sweeps in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

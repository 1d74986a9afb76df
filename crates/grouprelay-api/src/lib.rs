//! grouprelay HTTP API.
//!
//! Receives Telegram webhook updates, hands them to the debounce engine and
//! exposes liveness and health endpoints.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use grouprelay_core::Clock;
use grouprelay_delivery::DebounceEngine;

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, shutdown_signal, start_server, RouterConfig};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Engine receiving normalized events.
    pub engine: DebounceEngine,
    /// Clock used for response timestamps.
    pub clock: Arc<dyn Clock>,
    /// Whether a sink URL was configured.
    pub sink_configured: bool,
}

impl AppState {
    /// Creates handler state.
    pub fn new(engine: DebounceEngine, clock: Arc<dyn Clock>, sink_configured: bool) -> Self {
        Self { engine, clock, sink_configured }
    }
}

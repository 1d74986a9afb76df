//! Test doubles and fixtures for grouprelay.
//!
//! Provides in-memory sinks that record every delivery with its (possibly
//! virtual) timestamp, a store that is always unavailable, Telegram update
//! builders, and a wiremock-backed HTTP sink for end-to-end tests.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod http;
pub mod sinks;
pub mod stores;

pub use fixtures::MessageBuilder;
pub use http::MockSink;
pub use sinks::{Delivery, FailingSink, RecordingSink};
pub use stores::UnavailableStore;

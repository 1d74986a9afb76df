//! HTTP request handlers.
//!
//! - `webhook` - Telegram update ingestion
//! - `health` - root banner, liveness and health checks

pub mod health;
pub mod webhook;

pub use health::{health_check, liveness_check, root};
pub use webhook::receive_update;

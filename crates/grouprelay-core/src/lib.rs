//! Core domain models, update normalization and group storage.
//!
//! Provides the canonical event and payload types, the Telegram update
//! normalizer, clock abstractions and the `GroupStore` contract with its
//! in-memory and PostgreSQL implementations. The delivery and API crates
//! build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod normalizer;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    Fragment, GroupKey, GroupPayload, GroupRecord, InboundEvent, SenderInfo, SinglePayload,
    SinkPayload,
};
pub use normalizer::normalize;
pub use storage::{memory::MemoryGroupStore, postgres::PostgresGroupStore, GroupStore};
pub use time::{Clock, RealClock, TestClock};

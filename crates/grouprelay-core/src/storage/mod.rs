//! Group storage contract and implementations.
//!
//! The group store is the only shared mutable state in the service. Every
//! operation is atomic per key as seen by concurrent callers; no operation
//! takes a lock spanning more than one key.
//!
//! Two implementations are provided:
//! - [`memory::MemoryGroupStore`] keeps groups in a sharded concurrent map and
//!   is the default when no database is configured.
//! - [`postgres::PostgresGroupStore`] keeps groups in PostgreSQL so that
//!   several relay instances can share assembly state and a restart does not
//!   lose buffered fragments.

use std::time::Duration;

use crate::{
    error::Result,
    models::{Fragment, GroupKey, GroupRecord, SenderInfo},
};

pub mod memory;
pub mod postgres;

/// Storage operations required by the debounce engine and flush dispatcher.
///
/// # Quiescence markers
///
/// Each group carries at most one marker with an expiry instant. While the
/// marker is live, more fragments may still arrive; once it has expired the
/// assembly window is closed. A marker expiring exactly at the current
/// instant counts as expired.
#[async_trait::async_trait]
pub trait GroupStore: Send + Sync + std::fmt::Debug {
    /// Appends a fragment to the group, creating the record if absent.
    ///
    /// `sender_info` is captured only when the record is created. Returns the
    /// number of fragments buffered for the group after the append.
    async fn append(
        &self,
        key: &GroupKey,
        fragment: Fragment,
        sender_info: &SenderInfo,
    ) -> Result<usize>;

    /// Sets the group's quiescence marker to expire `window` from now,
    /// replacing any previous marker.
    async fn mark_quiescence(&self, key: &GroupKey, window: Duration) -> Result<()>;

    /// Returns true when no live quiescence marker exists for the group.
    async fn is_quiescence_expired(&self, key: &GroupKey) -> Result<bool>;

    /// Atomically reads and removes the group's fragments and marker.
    ///
    /// Returns `None` when the group does not exist or holds no fragments.
    /// Of several concurrent callers, at most one observes `Some` for a given
    /// generation of the group.
    async fn drain(&self, key: &GroupKey) -> Result<Option<GroupRecord>>;

    /// Lists groups holding fragments whose latest activity (last append or
    /// marker expiry, whichever is later) lies more than `idle_for` in the
    /// past.
    async fn stale_keys(&self, idle_for: Duration) -> Result<Vec<GroupKey>>;

    /// Verifies the store is reachable.
    async fn health_check(&self) -> Result<()>;
}

//! In-process group store backed by a sharded concurrent map.
//!
//! Each key's entry lives in one `DashMap` shard; mutations hold only that
//! shard's lock for the duration of a synchronous update, so groups with
//! different keys proceed in parallel and no lock is held across an await.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::GroupStore;
use crate::{
    error::Result,
    models::{Fragment, GroupKey, GroupRecord, SenderInfo},
    time::{Clock, RealClock},
};

#[derive(Debug)]
struct GroupEntry {
    fragments: Vec<Fragment>,
    sender_info: SenderInfo,
    first_seen_at: DateTime<Utc>,
    last_append_at: Instant,
    marker_expires_at: Option<Instant>,
}

impl GroupEntry {
    fn last_activity(&self) -> Instant {
        match self.marker_expires_at {
            Some(expiry) if expiry > self.last_append_at => expiry,
            _ => self.last_append_at,
        }
    }
}

/// Volatile group store for single-instance deployments and tests.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use grouprelay_core::{Fragment, GroupKey, GroupStore, MemoryGroupStore, SenderInfo};
///
/// # async fn example() -> grouprelay_core::Result<()> {
/// let store = MemoryGroupStore::new();
/// let key = GroupKey::new("G1");
///
/// store.append(&key, Fragment::new("a", "", 1), &SenderInfo::new()).await?;
/// store.mark_quiescence(&key, Duration::from_secs(5)).await?;
///
/// assert!(!store.is_quiescence_expired(&key).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryGroupStore {
    groups: Arc<DashMap<GroupKey, GroupEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryGroupStore {
    /// Creates an empty store using the real clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(RealClock::new()))
    }

    /// Creates an empty store that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { groups: Arc::new(DashMap::new()), clock }
    }

    /// Returns true when the store holds any state for `key`.
    pub fn contains(&self, key: &GroupKey) -> bool {
        self.groups.contains_key(key)
    }

    /// Number of groups currently buffered.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Default for MemoryGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GroupStore for MemoryGroupStore {
    async fn append(
        &self,
        key: &GroupKey,
        fragment: Fragment,
        sender_info: &SenderInfo,
    ) -> Result<usize> {
        let now = self.clock.now();
        let mut entry = self.groups.entry(key.clone()).or_insert_with(|| GroupEntry {
            fragments: Vec::new(),
            sender_info: sender_info.clone(),
            first_seen_at: self.clock.now_utc(),
            last_append_at: now,
            marker_expires_at: None,
        });

        // A marker set after a drain recreates an empty entry; the first real
        // fragment of the new generation owns the sender metadata.
        if entry.fragments.is_empty() {
            entry.sender_info = sender_info.clone();
            entry.first_seen_at = self.clock.now_utc();
        }

        entry.fragments.push(fragment);
        entry.last_append_at = now;
        Ok(entry.fragments.len())
    }

    async fn mark_quiescence(&self, key: &GroupKey, window: Duration) -> Result<()> {
        let now = self.clock.now();
        let expires_at = now + window;

        self.groups
            .entry(key.clone())
            .and_modify(|entry| entry.marker_expires_at = Some(expires_at))
            .or_insert_with(|| GroupEntry {
                fragments: Vec::new(),
                sender_info: SenderInfo::new(),
                first_seen_at: self.clock.now_utc(),
                last_append_at: now,
                marker_expires_at: Some(expires_at),
            });
        Ok(())
    }

    async fn is_quiescence_expired(&self, key: &GroupKey) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .groups
            .get(key)
            .and_then(|entry| entry.marker_expires_at)
            .map_or(true, |expires_at| now >= expires_at))
    }

    async fn drain(&self, key: &GroupKey) -> Result<Option<GroupRecord>> {
        let Some((key, entry)) = self.groups.remove(key) else {
            return Ok(None);
        };

        if entry.fragments.is_empty() {
            return Ok(None);
        }

        Ok(Some(GroupRecord {
            key,
            fragments: entry.fragments,
            sender_info: entry.sender_info,
            first_seen_at: entry.first_seen_at,
        }))
    }

    async fn stale_keys(&self, idle_for: Duration) -> Result<Vec<GroupKey>> {
        let now = self.clock.now();
        Ok(self
            .groups
            .iter()
            .filter(|entry| !entry.fragments.is_empty())
            .filter(|entry| now.saturating_duration_since(entry.last_activity()) > idle_for)
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

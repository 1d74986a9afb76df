//! Group stores that simulate backend failures.

use std::time::Duration;

use grouprelay_core::{
    CoreError, Fragment, GroupKey, GroupRecord, GroupStore, Result, SenderInfo,
};

/// Store whose every operation fails as if the backend were unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn error() -> CoreError {
        CoreError::StoreUnavailable("connection refused".to_string())
    }
}

#[async_trait::async_trait]
impl GroupStore for UnavailableStore {
    async fn append(&self, _: &GroupKey, _: Fragment, _: &SenderInfo) -> Result<usize> {
        Err(Self::error())
    }

    async fn mark_quiescence(&self, _: &GroupKey, _: Duration) -> Result<()> {
        Err(Self::error())
    }

    async fn is_quiescence_expired(&self, _: &GroupKey) -> Result<bool> {
        Err(Self::error())
    }

    async fn drain(&self, _: &GroupKey) -> Result<Option<GroupRecord>> {
        Err(Self::error())
    }

    async fn stale_keys(&self, _: Duration) -> Result<Vec<GroupKey>> {
        Err(Self::error())
    }

    async fn health_check(&self) -> Result<()> {
        Err(Self::error())
    }
}

//! PostgreSQL-backed group store.
//!
//! Fragments live in `group_fragments`, one row per fragment, ordered by a
//! `BIGSERIAL` arrival id. Quiescence markers live in `group_markers`, one
//! row per group key. All marker arithmetic uses the database clock so that
//! several relay instances agree on expiry.
//!
//! Draining relies on row locking: two transactions deleting the same
//! fragments serialize, and the second re-evaluates its predicate after the
//! first commits, finding nothing. Fragments inserted after the first
//! `DELETE` took its snapshot survive into the next generation.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use tracing::debug;

use super::GroupStore;
use crate::{
    error::Result,
    models::{Fragment, GroupKey, GroupRecord, SenderInfo},
};

/// Group store persisted in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresGroupStore {
    pool: Arc<PgPool>,
}

#[derive(sqlx::FromRow)]
struct DrainedRow {
    id: i64,
    fragment: Json<Fragment>,
    sender_info: Json<SenderInfo>,
    received_at: DateTime<Utc>,
}

impl PostgresGroupStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates the tables and indexes used by the store if missing.
    ///
    /// # Errors
    ///
    /// Returns error if any DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS group_fragments (
                id BIGSERIAL PRIMARY KEY,
                group_key TEXT NOT NULL,
                fragment JSONB NOT NULL,
                sender_info JSONB NOT NULL,
                received_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
            )
            ",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_group_fragments_key
            ON group_fragments(group_key, id)
            ",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS group_markers (
                group_key TEXT PRIMARY KEY,
                expires_at TIMESTAMPTZ NOT NULL
            )
            ",
        )
        .execute(&*self.pool)
        .await?;

        debug!("group store schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl GroupStore for PostgresGroupStore {
    async fn append(
        &self,
        key: &GroupKey,
        fragment: Fragment,
        sender_info: &SenderInfo,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO group_fragments (group_key, fragment, sender_info)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(key.as_str())
        .bind(Json(&fragment))
        .bind(Json(sender_info))
        .execute(&mut *tx)
        .await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM group_fragments WHERE group_key = $1")
                .bind(key.as_str())
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn mark_quiescence(&self, key: &GroupKey, window: Duration) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO group_markers (group_key, expires_at)
            VALUES ($1, clock_timestamp() + make_interval(secs => $2))
            ON CONFLICT (group_key) DO UPDATE SET expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(key.as_str())
        .bind(window.as_secs_f64())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn is_quiescence_expired(&self, key: &GroupKey) -> Result<bool> {
        let live: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM group_markers
                WHERE group_key = $1 AND expires_at > clock_timestamp()
            )
            ",
        )
        .bind(key.as_str())
        .fetch_one(&*self.pool)
        .await?;

        Ok(!live)
    }

    async fn drain(&self, key: &GroupKey) -> Result<Option<GroupRecord>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM group_markers WHERE group_key = $1")
            .bind(key.as_str())
            .execute(&mut *tx)
            .await?;

        let mut rows: Vec<DrainedRow> = sqlx::query_as(
            r"
            DELETE FROM group_fragments
            WHERE group_key = $1
            RETURNING id, fragment, sender_info, received_at
            ",
        )
        .bind(key.as_str())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        if rows.is_empty() {
            return Ok(None);
        }

        rows.sort_by_key(|row| row.id);
        let first = &rows[0];
        let sender_info = first.sender_info.0.clone();
        let first_seen_at = first.received_at;

        Ok(Some(GroupRecord {
            key: key.clone(),
            fragments: rows.into_iter().map(|row| row.fragment.0).collect(),
            sender_info,
            first_seen_at,
        }))
    }

    async fn stale_keys(&self, idle_for: Duration) -> Result<Vec<GroupKey>> {
        let keys: Vec<String> = sqlx::query_scalar(
            r"
            SELECT f.group_key
            FROM group_fragments f
            LEFT JOIN group_markers m ON m.group_key = f.group_key
            GROUP BY f.group_key
            HAVING GREATEST(MAX(f.received_at), MAX(m.expires_at))
                   < clock_timestamp() - make_interval(secs => $1)
            ",
        )
        .bind(idle_for.as_secs_f64())
        .fetch_all(&*self.pool)
        .await?;

        Ok(keys.into_iter().map(GroupKey::from).collect())
    }

    async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
        Ok(())
    }
}

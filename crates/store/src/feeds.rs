//! CRUD and scheduling queries for the `feeds` table.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{Feed, FeedStatus};

use crate::error::{map_unique_violation, StoreError};

const FEED_COLUMNS: &str = "id, url, title, status, interval_minutes, auto_analyze, template_id, \
     next_fetch_at, last_fetched_at, consecutive_failures, created_at, updated_at";

/// Request body for creating a feed.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateFeed {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Defaults to 60 when not provided.
    pub interval_minutes: Option<i32>,
    #[serde(default)]
    pub auto_analyze: bool,
    pub template_id: Option<Uuid>,
}

/// Request body for updating a feed (all fields optional).
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateFeed {
    pub title: Option<String>,
    pub status: Option<FeedStatus>,
    pub interval_minutes: Option<i32>,
    pub auto_analyze: Option<bool>,
    pub template_id: Option<Uuid>,
}

/// Stateless store for `feeds`.
pub struct FeedStore;

impl FeedStore {
    pub async fn create(pool: &PgPool, req: CreateFeed) -> Result<Feed, StoreError> {
        let interval = req.interval_minutes.unwrap_or(60);
        if !(5..=1440).contains(&interval) {
            return Err(StoreError::Validation(format!(
                "interval_minutes must be within 5..1440, got {}",
                interval
            )));
        }
        if req.url.trim().is_empty() {
            return Err(StoreError::Validation("url must not be empty".to_string()));
        }

        let result = sqlx::query_as::<_, Feed>(&format!(
            "INSERT INTO feeds (url, title, interval_minutes, auto_analyze, template_id, next_fetch_at)
             VALUES ($1, $2, $3, $4, $5, now())
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(req.url.trim())
        .bind(&req.title)
        .bind(interval)
        .bind(req.auto_analyze)
        .bind(req.template_id)
        .fetch_one(pool)
        .await;

        result.map_err(|e| map_unique_violation(e, "feeds.url"))
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Feed>, StoreError> {
        let rows = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Feed>, StoreError> {
        let row = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Partial update; only provided fields change.
    pub async fn update(pool: &PgPool, id: Uuid, req: UpdateFeed) -> Result<Feed, StoreError> {
        if let Some(interval) = req.interval_minutes {
            if !(5..=1440).contains(&interval) {
                return Err(StoreError::Validation(format!(
                    "interval_minutes must be within 5..1440, got {}",
                    interval
                )));
            }
        }

        let row = sqlx::query_as::<_, Feed>(&format!(
            "UPDATE feeds SET
                title = COALESCE($2, title),
                status = COALESCE($3, status),
                interval_minutes = COALESCE($4, interval_minutes),
                auto_analyze = COALESCE($5, auto_analyze),
                template_id = COALESCE($6, template_id),
                updated_at = now()
             WHERE id = $1
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.title)
        .bind(req.status)
        .bind(req.interval_minutes)
        .bind(req.auto_analyze)
        .bind(req.template_id)
        .fetch_optional(pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))
    }

    /// Delete a feed; items, fetch log, health, and pending batches cascade.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Feeds due for fetching: ACTIVE or ERROR with `next_fetch_at <= now`,
    /// oldest due first. Paused feeds never come back from this query.
    pub async fn due(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Feed>, StoreError> {
        let rows = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             WHERE status IN ('active', 'error')
               AND (next_fetch_at IS NULL OR next_fetch_at <= $1)
             ORDER BY next_fetch_at ASC NULLS FIRST
             LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Upcoming fetches for the heartbeat view.
    pub async fn upcoming(pool: &PgPool, limit: i64) -> Result<Vec<Feed>, StoreError> {
        let rows = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             WHERE status = 'active' AND next_fetch_at IS NOT NULL
             ORDER BY next_fetch_at ASC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Record the outcome of a fetch on the feed row itself. An operator
    /// pause that landed while the fetch was in flight is preserved.
    pub async fn record_fetch(
        pool: &PgPool,
        id: Uuid,
        status: FeedStatus,
        consecutive_failures: i32,
        next_fetch_at: DateTime<Utc>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE feeds SET
                status = CASE WHEN feeds.status = 'paused' THEN feeds.status ELSE $2 END,
                consecutive_failures = $3,
                next_fetch_at = $4,
                last_fetched_at = $5,
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(consecutive_failures)
        .bind(next_fetch_at)
        .bind(fetched_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Assign or clear a feed's extraction template (NULL clears).
    pub async fn set_template(
        pool: &PgPool,
        id: Uuid,
        template_id: Option<Uuid>,
    ) -> Result<Feed, StoreError> {
        let row = sqlx::query_as::<_, Feed>(&format!(
            "UPDATE feeds SET template_id = $2, updated_at = now()
             WHERE id = $1
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(id)
        .bind(template_id)
        .fetch_optional(pool)
        .await?;
        row.ok_or(StoreError::NotFound(id))
    }

    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: FeedStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE feeds SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub async fn set_interval(
        pool: &PgPool,
        id: Option<Uuid>,
        interval_minutes: i32,
    ) -> Result<u64, StoreError> {
        if !(5..=1440).contains(&interval_minutes) {
            return Err(StoreError::Validation(format!(
                "interval_minutes must be within 5..1440, got {}",
                interval_minutes
            )));
        }
        let result = match id {
            Some(id) => {
                sqlx::query(
                    "UPDATE feeds SET interval_minutes = $2, updated_at = now() WHERE id = $1",
                )
                .bind(id)
                .bind(interval_minutes)
                .execute(pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE feeds SET interval_minutes = $1, updated_at = now()")
                    .bind(interval_minutes)
                    .execute(pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &PgPool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM feeds")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let json = r#"{"url":"https://example.org/rss"}"#;
        let req: CreateFeed = serde_json::from_str(json).unwrap();
        assert_eq!(req.url, "https://example.org/rss");
        assert_eq!(req.title, "");
        assert!(req.interval_minutes.is_none());
        assert!(!req.auto_analyze);
        assert!(req.template_id.is_none());
    }

    #[test]
    fn test_update_request_all_none() {
        let req: UpdateFeed = serde_json::from_str("{}").unwrap();
        assert!(req.title.is_none());
        assert!(req.status.is_none());
        assert!(req.interval_minutes.is_none());
    }

    #[test]
    fn test_update_request_status_parse() {
        let req: UpdateFeed = serde_json::from_str(r#"{"status":"paused"}"#).unwrap();
        assert_eq!(req.status, Some(FeedStatus::Paused));
    }
}

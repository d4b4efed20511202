//! Insert-or-dedup and filtered listing for the `items` table.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use newswire_core::Item;

use crate::error::{is_unique_violation, StoreError};

const ITEM_COLUMNS: &str =
    "id, feed_id, title, link, content, author, published_at, ingested_at, content_hash";

/// A deduplicated candidate ready for insertion.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub feed_id: Uuid,
    pub title: String,
    pub link: String,
    pub content: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content_hash: String,
}

/// Query filters for `GET /items`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ItemFilter {
    pub feed_id: Option<Uuid>,
    /// Only items published within the last n hours.
    pub since_hours: Option<i64>,
    /// Theme membership filter against the stored sentiment payload.
    pub category: Option<String>,
    /// Minimum overall impact score (0..1); implies "analyzed only".
    pub impact_min: Option<f64>,
    /// Overall sentiment label filter; implies "analyzed only".
    pub sentiment: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// "published" (default) or "ingested".
    pub sort: Option<String>,
}

/// Stateless store for `items`.
pub struct ItemStore;

impl ItemStore {
    /// Insert a new item; returns `None` when the content hash already
    /// exists (the dedup path, not an error).
    pub async fn insert(pool: &PgPool, item: &NewItem) -> Result<Option<Item>, StoreError> {
        let result = sqlx::query_as::<_, Item>(&format!(
            "INSERT INTO items (feed_id, title, link, content, author, published_at, content_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.feed_id)
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.content)
        .bind(&item.author)
        .bind(item.published_at)
        .bind(&item.content_hash)
        .fetch_one(pool)
        .await;

        match result {
            Ok(row) => Ok(Some(row)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Filtered listing. Sentiment/impact/category filters join the stored
    /// analyses and therefore only return analyzed items.
    pub async fn list(pool: &PgPool, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let needs_analysis = filter.sentiment.is_some()
            || filter.impact_min.is_some()
            || filter.category.is_some();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT i.id, i.feed_id, i.title, i.link, i.content, i.author, \
             i.published_at, i.ingested_at, i.content_hash FROM items i",
        );
        if needs_analysis {
            qb.push(" JOIN item_analyses a ON a.item_id = i.id");
        }
        qb.push(" WHERE true");

        if let Some(feed_id) = filter.feed_id {
            qb.push(" AND i.feed_id = ").push_bind(feed_id);
        }
        if let Some(hours) = filter.since_hours {
            qb.push(" AND i.published_at >= now() - make_interval(hours => ")
                .push_bind(hours)
                .push("::int)");
        }
        if let Some(sentiment) = &filter.sentiment {
            qb.push(" AND a.sentiment_json->'overall'->>'label' = ")
                .push_bind(sentiment.clone());
        }
        if let Some(impact_min) = filter.impact_min {
            qb.push(" AND (a.impact_json->>'overall')::float8 >= ")
                .push_bind(impact_min);
        }
        if let Some(category) = &filter.category {
            qb.push(" AND a.sentiment_json->'themes' ? ")
                .push_bind(category.clone());
        }

        match filter.sort.as_deref() {
            Some("ingested") => qb.push(" ORDER BY i.ingested_at DESC"),
            _ => qb.push(" ORDER BY i.published_at DESC NULLS LAST"),
        };

        qb.push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(50).clamp(1, 500));
        qb.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0).max(0));

        let rows = qb.build_query_as::<Item>().fetch_all(pool).await?;
        Ok(rows)
    }

    /// Ids of the n most recently published items, optionally skipping
    /// already-analyzed ones.
    pub async fn latest_ids(
        pool: &PgPool,
        count: i64,
        include_analyzed: bool,
    ) -> Result<Vec<Uuid>, StoreError> {
        let sql = if include_analyzed {
            "SELECT id FROM items ORDER BY published_at DESC NULLS LAST LIMIT $1"
        } else {
            "SELECT i.id FROM items i
             LEFT JOIN item_analyses a ON a.item_id = i.id
             WHERE a.item_id IS NULL
             ORDER BY i.published_at DESC NULLS LAST LIMIT $1"
        };
        let ids = sqlx::query_scalar::<_, Uuid>(sql)
            .bind(count)
            .fetch_all(pool)
            .await?;
        Ok(ids)
    }

    /// Ids of all items belonging to the given feeds, newest first.
    pub async fn ids_for_feeds(
        pool: &PgPool,
        feed_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM items WHERE feed_id = ANY($1)
             ORDER BY published_at DESC NULLS LAST",
        )
        .bind(feed_ids)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    /// Ids of items published inside [start, end], oldest first.
    pub async fn ids_in_timerange(
        pool: &PgPool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM items
             WHERE published_at >= $1 AND published_at <= $2
             ORDER BY published_at ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    /// Keep only ids that exist in `items` (explicit ITEMS scopes may
    /// reference deleted rows), preserving the caller's order.
    pub async fn filter_existing(
        pool: &PgPool,
        item_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, StoreError> {
        let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM items WHERE id = ANY($1)")
            .bind(item_ids)
            .fetch_all(pool)
            .await?;
        let set: std::collections::HashSet<Uuid> = existing.into_iter().collect();
        Ok(item_ids.iter().copied().filter(|id| set.contains(id)).collect())
    }

    pub async fn count(pool: &PgPool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM items")
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
    fn test_filter_deserialize_empty() {
        let filter: ItemFilter = serde_json::from_str("{}").unwrap();
        assert!(filter.feed_id.is_none());
        assert!(filter.sentiment.is_none());
        assert!(filter.limit.is_none());
    }

    #[test]
    fn test_filter_deserialize_full() {
        let json = r#"{"since_hours":24,"sentiment":"negative","impact_min":0.6,"limit":10,"sort":"ingested"}"#;
        let filter: ItemFilter = serde_json::from_str(json).unwrap();
        assert_eq!(filter.since_hours, Some(24));
        assert_eq!(filter.sentiment.as_deref(), Some("negative"));
        assert_eq!(filter.impact_min, Some(0.6));
        assert_eq!(filter.sort.as_deref(), Some("ingested"));
    }
}

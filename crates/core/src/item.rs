//! Ingested article rows. Items are immutable after insert; the content
//! hash is the global dedup key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Row from the `items` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Item {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub link: String,
    pub content: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    /// SHA-256 hex digest over (normalized title, canonical link, normalized content).
    pub content_hash: String,
}

/// An extracted article candidate, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub title: String,
    pub link: String,
    pub content: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

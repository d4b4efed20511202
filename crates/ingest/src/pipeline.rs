//! Dedup + ingest: extracted candidates become `items` rows, one insert
//! per candidate so a bad entry never aborts the batch. New items from
//! auto-enabled feeds are handed to the auto-analysis intake.

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use newswire_core::Feed;
use newswire_store::{ItemStore, NewItem, StoreError, TemplateStore};

use crate::canonical::content_hash;
use crate::fetcher::FetchedPayload;
use crate::template::{extract_candidates, select_template, ExtractError};

/// `(feed_id, item_id)` pairs flowing into the auto-analysis pump.
pub type AutoEnrolSender = mpsc::UnboundedSender<(Uuid, Uuid)>;

/// Result of ingesting one fetched payload.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub items_found: i32,
    pub items_new: i32,
    /// `extraction_failure:<field>` reasons for rejected entries.
    pub failures: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Extract, deduplicate, and persist the payload of one fetch.
pub async fn ingest_payload(
    pool: &PgPool,
    feed: &Feed,
    payload: &FetchedPayload,
    intake: Option<&AutoEnrolSender>,
) -> Result<IngestOutcome, IngestError> {
    let templates = TemplateStore::list(pool).await?;
    let template = select_template(feed, payload.content_type.as_deref(), &templates);

    let report = extract_candidates(&payload.body, template)?;

    let mut outcome = IngestOutcome {
        items_found: report.entries_seen as i32,
        failures: report.failures,
        ..Default::default()
    };

    for candidate in report.candidates {
        let new_item = NewItem {
            feed_id: feed.id,
            content_hash: content_hash(&candidate.title, &candidate.link, &candidate.content),
            title: candidate.title,
            link: candidate.link,
            content: candidate.content,
            author: candidate.author,
            published_at: candidate.published_at,
        };

        // Inserts are independent; one failure does not abort the batch.
        match ItemStore::insert(pool, &new_item).await {
            Ok(Some(item)) => {
                outcome.items_new += 1;
                if feed.auto_analyze {
                    if let Some(intake) = intake {
                        if intake.send((feed.id, item.id)).is_err() {
                            debug!("auto-analysis intake closed — item not enrolled");
                        }
                    }
                }
            }
            Ok(None) => {
                // Duplicate content hash: the normal dedup path.
            }
            Err(e) => {
                warn!(feed_id = %feed.id, error = %e, "item insert failed — continuing batch");
            }
        }
    }

    Ok(outcome)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_default_is_empty() {
        let outcome = IngestOutcome::default();
        assert_eq!(outcome.items_found, 0);
        assert_eq!(outcome.items_new, 0);
        assert!(outcome.failures.is_empty());
    }
}

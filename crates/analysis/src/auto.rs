//! Auto-analysis pump: batches newly ingested items from auto-enabled
//! feeds into governed runs.
//!
//! Intake arrives from the ingest pipeline as `(feed_id, item_id)` pairs.
//! Every check interval the pump drains intake into per-feed batches,
//! dispatches pending batches through the governor, and closes out
//! batches whose runs reached a terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use sqlx::PgPool;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use uuid::Uuid;

use newswire_core::config::AutoAnalysisConfig;
use newswire_core::{Clock, PendingStatus, RunParams, RunScope, TriggerSource};
use newswire_store::{AnalysisStore, PendingAutoStore, RunItemStore, RunStore, StoreError};

use crate::governor::{RunDecision, RunGovernor, RunRequest};

pub struct AutoAnalysisPump {
    pool: PgPool,
    governor: Arc<RunGovernor>,
    config: AutoAnalysisConfig,
    clock: Arc<dyn Clock>,
}

impl AutoAnalysisPump {
    pub fn new(
        pool: PgPool,
        governor: Arc<RunGovernor>,
        config: AutoAnalysisConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            governor,
            config,
            clock,
        }
    }

    /// Run the pump loop until `stop` is set.
    pub async fn run(
        self,
        mut intake: UnboundedReceiver<(Uuid, Uuid)>,
        stop: Arc<AtomicBool>,
    ) {
        let interval = Duration::from_secs(self.config.check_interval_seconds.max(1));
        info!(
            "auto-analysis pump started (interval: {}s, batch: {})",
            interval.as_secs(),
            self.config.batch_size
        );

        // Order-preserving per-feed buffers between ticks.
        let mut buffer: IndexMap<Uuid, Vec<Uuid>> = IndexMap::new();

        while !stop.load(Ordering::Relaxed) {
            tokio::time::sleep(interval).await;

            while let Ok((feed_id, item_id)) = intake.try_recv() {
                buffer.entry(feed_id).or_default().push(item_id);
            }

            if let Err(e) = self.flush_buffer(&mut buffer).await {
                warn!(error = %e, "auto pump: batch creation failed");
            }
            if let Err(e) = self.dispatch_pending().await {
                warn!(error = %e, "auto pump: dispatch failed");
            }
            if let Err(e) = self.close_out().await {
                warn!(error = %e, "auto pump: close-out failed");
            }
        }

        info!("auto-analysis pump stopped");
    }

    /// Admission-filter buffered intake and persist it as pending batches.
    async fn flush_buffer(
        &self,
        buffer: &mut IndexMap<Uuid, Vec<Uuid>>,
    ) -> Result<(), StoreError> {
        for (feed_id, item_ids) in buffer.drain(..) {
            let admitted = self.admit(&item_ids).await?;
            if admitted.is_empty() {
                continue;
            }
            for chunk in admitted.chunks(self.config.batch_size.max(1) as usize) {
                let batch = PendingAutoStore::create_batch(&self.pool, feed_id, chunk).await?;
                debug!(
                    feed_id = %feed_id,
                    batch_id = %batch.id,
                    items = chunk.len(),
                    "auto batch created"
                );
            }
        }
        Ok(())
    }

    /// Admission: no stored analysis, no open batch, no active run item.
    async fn admit(&self, item_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let analyzed: std::collections::HashSet<Uuid> =
            AnalysisStore::existing_among(&self.pool, item_ids)
                .await?
                .into_iter()
                .collect();
        let in_open_batch: std::collections::HashSet<Uuid> =
            PendingAutoStore::open_item_ids(&self.pool, item_ids)
                .await?
                .into_iter()
                .collect();
        let in_active_run: std::collections::HashSet<Uuid> =
            RunItemStore::active_item_ids(&self.pool, item_ids)
                .await?
                .into_iter()
                .collect();

        Ok(item_ids
            .iter()
            .copied()
            .filter(|id| {
                !analyzed.contains(id)
                    && !in_open_batch.contains(id)
                    && !in_active_run.contains(id)
            })
            .collect())
    }

    /// Hand each pending batch to the governor. A rejected batch stays
    /// PENDING and is retried next tick (budget may free up overnight).
    async fn dispatch_pending(&self) -> Result<(), StoreError> {
        for batch in PendingAutoStore::pending(&self.pool).await? {
            let item_ids = batch.item_ids();
            if item_ids.is_empty() {
                PendingAutoStore::close(
                    &self.pool,
                    batch.id,
                    PendingStatus::Completed,
                    self.clock.now(),
                )
                .await?;
                continue;
            }

            let request = RunRequest {
                scope: RunScope::Items { item_ids },
                params: RunParams {
                    model_tag: self.config.model_tag.clone(),
                    limit: self.config.batch_size.max(1),
                    ..Default::default()
                },
                trigger: TriggerSource::Auto,
            };

            match self.governor.request_run(request).await? {
                RunDecision::Started { run_id } | RunDecision::Queued { run_id, .. } => {
                    PendingAutoStore::mark_processing(&self.pool, batch.id, run_id).await?;
                }
                RunDecision::Rejected { kind, message } => {
                    debug!(
                        batch_id = %batch.id,
                        kind = %kind,
                        message = %message,
                        "auto batch deferred"
                    );
                }
            }
        }
        Ok(())
    }

    /// Close batches whose runs reached a terminal state.
    async fn close_out(&self) -> Result<(), StoreError> {
        for batch in PendingAutoStore::processing(&self.pool).await? {
            let run_id = match batch.run_id {
                Some(run_id) => run_id,
                None => continue,
            };
            let status = match RunStore::status(&self.pool, run_id).await? {
                Some(status) => status,
                None => {
                    PendingAutoStore::close(
                        &self.pool,
                        batch.id,
                        PendingStatus::Failed,
                        self.clock.now(),
                    )
                    .await?;
                    continue;
                }
            };
            if !status.is_terminal() {
                continue;
            }

            let closed = match status {
                newswire_core::RunStatus::Completed => PendingStatus::Completed,
                _ => PendingStatus::Failed,
            };
            PendingAutoStore::close(&self.pool, batch.id, closed, self.clock.now()).await?;
            debug!(batch_id = %batch.id, run_id = %run_id, status = ?closed, "auto batch closed");
        }
        Ok(())
    }
}

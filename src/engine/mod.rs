//! Scheduled execution engine: the single consumer of the delivery queue.
//!
//! For every delivery it advances the block cursor, drops requests whose
//! fulfillment deadline already passed, admits the id and hands an owned
//! copy of the request to its own task.

mod task;

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::task::JoinSet;

use crate::admission::{AdmissionGuard, AdmissionTracker};
use crate::filter::UrlFilter;
use crate::resolver::DataResolver;
use crate::store::{PendingStore, StoreError};
use crate::transactions::TransactionSubmitter;
use crate::types::config::pipeline::NodeMode;
use crate::types::request::{short_id, unix_now, Delivery, Request};

pub use task::RequestState;

/// Everything a request task needs. Shared read-only across tasks.
pub struct EngineContext {
    pub store: Arc<dyn PendingStore>,
    pub admission: AdmissionTracker,
    pub resolver: Arc<dyn DataResolver>,
    pub filter: UrlFilter,
    pub submitter: Arc<TransactionSubmitter>,
    pub mode: NodeMode,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed: usize,
    pub retired: usize,
}

pub struct Engine {
    ctx: Arc<EngineContext>,
    tasks: JoinSet<RequestState>,
    cursor: Option<u64>,
}

impl Engine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            tasks: JoinSet::new(),
            cursor: None,
        }
    }

    /// Replay the pending store: retire entries whose fulfillment deadline
    /// passed, re-admit the rest with their stored timestamps.
    pub async fn recover(&mut self) -> Result<RecoveryReport, StoreError> {
        let entries = self.ctx.store.list().await?;
        let now = unix_now();
        let mut report = RecoveryReport::default();

        for entry in entries {
            let id = short_id(&entry.id);
            if entry.is_expired_at(now) {
                tracing::info!(request_id = %id, "Retiring expired pending request");
                if let Err(e) = self.ctx.store.remove(entry.id).await {
                    tracing::error!(request_id = %id, "Could not retire expired request: {}", e);
                }
                report.retired += 1;
                continue;
            }
            if let Some(guard) = self.ctx.admission.try_admit(entry.id) {
                tracing::debug!(request_id = %id, submitted = entry.submitted, "Resuming pending request");
                self.spawn(entry, guard);
                report.resumed += 1;
            }
        }

        tracing::info!(
            "Recovered pending requests: {} resumed, {} retired, {} in flight",
            report.resumed,
            report.retired,
            self.ctx.admission.len()
        );
        Ok(report)
    }

    /// Consume deliveries until every sender is gone, then wait for the
    /// in-flight tasks.
    pub async fn run(mut self, mut rx: Receiver<Delivery>) {
        if let Err(e) = self.recover().await {
            tracing::error!("Could not replay pending requests: {}", e);
        }

        self.cursor = match self.ctx.store.get_cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::error!("Cannot read last processed block: {}", e);
                None
            }
        };

        while let Some(delivery) = rx.recv().await {
            self.handle(delivery).await;
            self.reap();
        }

        tracing::info!("Delivery queue closed, waiting for {} in-flight requests", self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("Request task aborted: {}", e);
            }
        }
    }

    async fn handle(&mut self, delivery: Delivery) {
        if let Some(block) = delivery.cursor_block() {
            self.advance_cursor(block).await;
        }

        let descriptor = delivery.descriptor;
        tracing::trace!(
            request_id = %short_id(&descriptor.request_id),
            source = %delivery.source,
            callback = %descriptor.callback_address,
            aggregation = descriptor.aggregation_type,
            precision = descriptor.precision,
            "Request received"
        );
        let request = descriptor.into_request();
        let id = short_id(&request.id);

        if request.is_expired_at(unix_now()) {
            tracing::debug!(request_id = %id, "Request expired before admission, discarding");
            return;
        }

        let Some(guard) = self.ctx.admission.try_admit(request.id) else {
            tracing::trace!(request_id = %id, "Request already in flight");
            return;
        };

        if let Err(e) = self.ctx.store.add(&request).await {
            tracing::error!(request_id = %id, "Could not persist request: {}", e);
        }
        self.spawn(request, guard);
    }

    async fn advance_cursor(&mut self, block: u64) {
        if self.cursor.is_some_and(|c| block <= c) {
            return;
        }
        self.cursor = Some(block);
        if let Err(e) = self.ctx.store.set_cursor(block).await {
            tracing::error!("Could not store last processed block {}: {}", block, e);
        }
    }

    fn spawn(&mut self, request: Request, guard: AdmissionGuard) {
        self.tasks.spawn(task::process(self.ctx.clone(), request, guard));
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                tracing::error!("Request task aborted: {}", e);
            }
        }
    }
}

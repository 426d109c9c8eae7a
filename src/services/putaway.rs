use slog::Logger;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    backend::PutAwayBackend,
    errors::ServiceError,
    events::{Event, EventSender},
    logging,
    models::{
        BulkUploadReceipt, CommitReceipt, LineItem, Page, Pagination, PendingWorkItem,
        PutAwayFilter, QueueKind, ReceivedItem, ReturnedItem,
    },
    services::bulk_patch::BulkUploadPlan,
};

const COMMIT_FAILED: &str = "Put-away failed";

/// Fetches the pending queues and commits put-away assignments.
#[derive(Clone)]
pub struct PutAwayService {
    backend: Arc<dyn PutAwayBackend>,
    event_sender: Option<EventSender>,
    logger: Logger,
}

impl PutAwayService {
    pub fn new(
        backend: Arc<dyn PutAwayBackend>,
        event_sender: Option<EventSender>,
        logger: Logger,
    ) -> Self {
        Self {
            backend,
            event_sender,
            logger,
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.publish(event).await;
        }
    }

    async fn observe<T>(&self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        if let Err(ServiceError::Unauthorized(_)) = &result {
            self.publish(Event::SessionExpired).await;
        }
        result
    }

    /// Loads one page of the queue selected by `filter.put_away_type`.
    #[instrument(skip(self, filter), fields(kind = %filter.put_away_type))]
    pub async fn fetch_queue(
        &self,
        filter: &PutAwayFilter,
        page: Pagination,
    ) -> Result<Page<PendingWorkItem>, ServiceError> {
        filter.validate()?;

        let kind = filter.put_away_type;
        let fetched = match kind {
            QueueKind::PurchaseReceipt => self
                .backend
                .pending_purchases(filter, page)
                .await
                .map(|p| p.map(PendingWorkItem::PurchaseReceipt)),
            QueueKind::SalesReturn => self
                .backend
                .pending_sales_returns(page)
                .await
                .map(|p| p.map(PendingWorkItem::SalesReturn)),
            QueueKind::StockAdjustment => {
                self.backend.pending_stock_adjustments().await.map(|logs| {
                    Page::single(
                        logs.into_iter()
                            .filter(|log| {
                                filter.matches_adjustment(
                                    &log.display_name(),
                                    log.sku(),
                                    log.batch_number.as_deref(),
                                )
                            })
                            .map(PendingWorkItem::StockAdjustment)
                            .collect(),
                    )
                })
            }
        };
        let result = self.observe(fetched).await?;

        info!(
            page = result.page,
            records = result.total_records,
            "pending queue loaded"
        );
        self.publish(Event::QueueLoaded {
            kind,
            page: result.page,
            records: result.total_records,
        })
        .await;
        Ok(result)
    }

    /// Sends the edited lines of `item` to the backend's make-live endpoint.
    #[instrument(skip(self, item, lines), fields(kind = %item.kind(), id = %item.id(), lines = lines.len()))]
    pub async fn commit(
        &self,
        item: &PendingWorkItem,
        lines: &[LineItem],
    ) -> Result<CommitReceipt, ServiceError> {
        let result = match item {
            PendingWorkItem::PurchaseReceipt(receipt) => {
                let items: Vec<ReceivedItem> =
                    lines.iter().map(LineItem::to_received_item).collect();
                self.backend.put_away_purchase(&receipt.id, &items).await
            }
            PendingWorkItem::SalesReturn(ret) => {
                let items: Vec<ReturnedItem> =
                    lines.iter().map(LineItem::to_returned_item).collect();
                self.backend.put_away_sales_return(&ret.id, &items).await
            }
            PendingWorkItem::StockAdjustment(log) => {
                let rack = lines.first().map(|l| l.rack.trim()).unwrap_or_default();
                self.backend.complete_stock_adjustment(&log.id, rack).await
            }
        }
        .and_then(|receipt| {
            if receipt.success {
                Ok(receipt)
            } else {
                Err(ServiceError::Rejected(
                    receipt
                        .message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| COMMIT_FAILED.to_string()),
                ))
            }
        });

        let result = self.observe(result).await;
        let kind = item.kind();
        match &result {
            Ok(_) => {
                let racks: Vec<&str> = lines.iter().map(|l| l.rack.trim()).collect();
                logging::audit_committed(&self.logger, kind, item.id(), lines.len(), &racks);
                self.publish(Event::PutAwayCommitted {
                    kind,
                    id: item.id().to_string(),
                    lines: lines.len(),
                })
                .await;
            }
            Err(err) => {
                let reason = err.alert_message();
                warn!("put-away commit failed: {}", err);
                logging::audit_rejected(&self.logger, kind, item.id(), &reason);
                self.publish(Event::PutAwayRejected {
                    kind,
                    id: item.id().to_string(),
                    reason,
                })
                .await;
            }
        }
        result
    }

    /// Posts a multi-invoice spreadsheet to the purchase bulk endpoint.
    #[instrument(skip(self, plan), fields(rows = plan.rows.len(), skipped = plan.skipped))]
    pub async fn bulk_upload(&self, plan: &BulkUploadPlan) -> Result<BulkUploadReceipt, ServiceError> {
        if plan.rows.is_empty() {
            return Err(ServiceError::ValidationError(
                "The spreadsheet has no rows with an invoice number and product".to_string(),
            ));
        }

        let receipt = self
            .observe(self.backend.bulk_put_away_upload(&plan.rows).await)
            .await?;
        slog::info!(
            self.logger,
            "bulk put-away uploaded";
            "rows" => plan.rows.len(),
            "skipped" => plan.skipped,
            "updated" => receipt.updated.unwrap_or_default(),
        );
        self.publish(Event::BulkUploadSubmitted {
            rows: plan.rows.len(),
            skipped: plan.skipped,
        })
        .await;
        Ok(receipt)
    }
}

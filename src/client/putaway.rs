use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ensure_success, ApiClient};
use crate::{
    backend::PutAwayBackend,
    errors::ServiceError,
    models::{
        BulkUploadReceipt, CommitReceipt, Page, Pagination, PurchaseReceipt, PutAwayFilter,
        ReceivedItem, ReturnedItem, SalesReturn, StockAdjustmentLog,
    },
    services::bulk_patch::BulkPutAwayRow,
};

#[derive(Debug, Deserialize)]
struct PurchasesEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    purchases: Vec<PurchaseReceipt>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReturnsEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    returns: Vec<SalesReturn>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LogsEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    logs: Vec<StockAdjustmentLog>,
}

#[derive(Debug, Deserialize)]
struct AckEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct ItemsBody<'a, T> {
    items: &'a [T],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody<'a> {
    rack_location: &'a str,
}

fn page_of<T>(items: Vec<T>, page: Pagination, pages: Option<u32>, total: Option<u64>) -> Page<T> {
    let total_records = total.unwrap_or(items.len() as u64);
    let total_pages = pages.unwrap_or_else(|| {
        let size = u64::from(page.page_size.max(1));
        total_records.div_ceil(size) as u32
    });
    Page {
        items,
        page: page.page,
        page_size: page.page_size,
        total_pages,
        total_records,
    }
}

impl ApiClient {
    async fn acknowledge<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
        fallback: &str,
    ) -> Result<CommitReceipt, ServiceError> {
        let ack: AckEnvelope = self.put_json(segments, body).await?;
        ensure_success(ack.success, ack.message.clone(), fallback)?;
        Ok(CommitReceipt {
            success: true,
            message: ack.message,
        })
    }
}

#[async_trait]
impl PutAwayBackend for ApiClient {
    #[instrument(skip(self, filter))]
    async fn pending_purchases(
        &self,
        filter: &PutAwayFilter,
        page: Pagination,
    ) -> Result<Page<PurchaseReceipt>, ServiceError> {
        let body: PurchasesEnvelope = self
            .get_json(&["purchases"], &filter.purchase_query(page))
            .await?;
        ensure_success(body.success, body.message, "Failed to load pending purchases")?;
        Ok(page_of(body.purchases, page, body.pages, body.total))
    }

    #[instrument(skip(self))]
    async fn pending_sales_returns(
        &self,
        page: Pagination,
    ) -> Result<Page<SalesReturn>, ServiceError> {
        let body: ReturnsEnvelope = self
            .get_json(&["sales", "returns"], &PutAwayFilter::sales_return_query(page))
            .await?;
        ensure_success(body.success, body.message, "Failed to load pending returns")?;
        Ok(page_of(body.returns, page, body.pages, body.total))
    }

    #[instrument(skip(self))]
    async fn pending_stock_adjustments(&self) -> Result<Vec<StockAdjustmentLog>, ServiceError> {
        let body: LogsEnvelope = self
            .get_json(&["products", "putaway", "pending"], &[])
            .await?;
        ensure_success(body.success, body.message, "Failed to load pending adjustments")?;
        Ok(body.logs)
    }

    #[instrument(skip(self, items), fields(lines = items.len()))]
    async fn put_away_purchase(
        &self,
        purchase_id: &str,
        items: &[ReceivedItem],
    ) -> Result<CommitReceipt, ServiceError> {
        self.acknowledge(
            &["purchases", purchase_id, "putaway"],
            &ItemsBody { items },
            "Put-away failed",
        )
        .await
    }

    #[instrument(skip(self, items), fields(lines = items.len()))]
    async fn put_away_sales_return(
        &self,
        return_id: &str,
        items: &[ReturnedItem],
    ) -> Result<CommitReceipt, ServiceError> {
        self.acknowledge(
            &["sales", "returns", return_id, "putaway"],
            &ItemsBody { items },
            "Put-away failed",
        )
        .await
    }

    #[instrument(skip(self))]
    async fn complete_stock_adjustment(
        &self,
        log_id: &str,
        rack_location: &str,
    ) -> Result<CommitReceipt, ServiceError> {
        self.acknowledge(
            &["products", "putaway", "complete", log_id],
            &CompleteBody { rack_location },
            "Put-away failed",
        )
        .await
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn bulk_put_away_upload(
        &self,
        rows: &[BulkPutAwayRow],
    ) -> Result<BulkUploadReceipt, ServiceError> {
        let receipt: BulkUploadReceipt = self
            .post_json(
                &["purchases", "bulk-putaway-upload"],
                &ItemsBody { items: rows },
            )
            .await?;
        if !receipt.success {
            return Err(ServiceError::Rejected(
                receipt
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .or_else(|| receipt.errors.first().cloned())
                    .unwrap_or_else(|| "Bulk upload failed".to_string()),
            ));
        }
        Ok(receipt)
    }
}

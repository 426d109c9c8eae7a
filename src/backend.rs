//! Seams between the put-away workflow and the inventory backend.

use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::models::{
    BulkUploadReceipt, CommitReceipt, Location, LocationQuery, NewLocation, Page, Pagination,
    PurchaseReceipt, PutAwayFilter, ReceivedItem, ReturnedItem, SalesReturn, StockAdjustmentLog,
};
use crate::services::bulk_patch::BulkPutAwayRow;

/// Pending queues and their make-live endpoints.
#[async_trait]
pub trait PutAwayBackend: Send + Sync {
    async fn pending_purchases(
        &self,
        filter: &PutAwayFilter,
        page: Pagination,
    ) -> Result<Page<PurchaseReceipt>, ServiceError>;

    async fn pending_sales_returns(
        &self,
        page: Pagination,
    ) -> Result<Page<SalesReturn>, ServiceError>;

    /// Unpaginated; the backend returns every open log.
    async fn pending_stock_adjustments(&self) -> Result<Vec<StockAdjustmentLog>, ServiceError>;

    async fn put_away_purchase(
        &self,
        purchase_id: &str,
        items: &[ReceivedItem],
    ) -> Result<CommitReceipt, ServiceError>;

    async fn put_away_sales_return(
        &self,
        return_id: &str,
        items: &[ReturnedItem],
    ) -> Result<CommitReceipt, ServiceError>;

    async fn complete_stock_adjustment(
        &self,
        log_id: &str,
        rack_location: &str,
    ) -> Result<CommitReceipt, ServiceError>;

    async fn bulk_put_away_upload(
        &self,
        rows: &[BulkPutAwayRow],
    ) -> Result<BulkUploadReceipt, ServiceError>;
}

/// Storage location registry.
#[async_trait]
pub trait LocationRegistry: Send + Sync {
    async fn list_locations(&self, query: &LocationQuery) -> Result<Page<Location>, ServiceError>;

    async fn create_location(&self, location: &NewLocation) -> Result<Location, ServiceError>;
}

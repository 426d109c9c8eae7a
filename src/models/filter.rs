use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::errors::ServiceError;

/// Status value the backend uses for records waiting to be shelved.
pub const PUTAWAY_PENDING_STATUS: &str = "Putaway_Pending";

/// The three pending-work queues a put-away operator can drain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum QueueKind {
    #[default]
    #[serde(rename = "Purchase Receipt Item")]
    #[strum(to_string = "Purchase Receipt Item", serialize = "purchase", serialize = "grn")]
    PurchaseReceipt,
    #[serde(rename = "Sales Return Item")]
    #[strum(to_string = "Sales Return Item", serialize = "sales-return", serialize = "return")]
    SalesReturn,
    #[serde(rename = "Stock Adjustment")]
    #[strum(to_string = "Stock Adjustment", serialize = "stock-adjustment", serialize = "adjustment")]
    StockAdjustment,
}

impl QueueKind {
    /// Whether the backend paginates this queue.
    pub fn is_paginated(self) -> bool {
        !matches!(self, QueueKind::StockAdjustment)
    }

    /// Spreadsheet bulk edits are only offered for purchase receipts.
    pub fn supports_bulk_upload(self) -> bool {
        matches!(self, QueueKind::PurchaseReceipt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first(10)
    }
}

/// Filters offered above the pending list.
///
/// Only the subset that applies to the active queue is sent: purchase
/// receipts take every field as a query parameter, sales returns take none
/// and stock adjustments are filtered locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutAwayFilter {
    pub put_away_type: QueueKind,
    pub search: Option<String>,
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub sku: Option<String>,
    pub product_name: Option<String>,
    pub batch_number: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub priority: Option<Priority>,
    pub received_by: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub expiry_before: Option<NaiveDate>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl PutAwayFilter {
    pub fn for_kind(kind: QueueKind) -> Self {
        Self {
            put_away_type: kind,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ServiceError::ValidationError(format!(
                    "Start date {} is after end date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// Query parameters for `GET /purchases`.
    pub fn purchase_query(&self, page: Pagination) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("status", PUTAWAY_PENDING_STATUS.to_string()),
            ("pageNumber", page.page.to_string()),
            ("pageSize", page.page_size.to_string()),
        ];

        let text_fields: [(&'static str, &Option<String>); 8] = [
            ("search", &self.search),
            ("supplierName", &self.supplier_name),
            ("invoiceNumber", &self.invoice_number),
            ("sku", &self.sku),
            ("productName", &self.product_name),
            ("batchNumber", &self.batch_number),
            ("category", &self.category),
            ("manufacturer", &self.manufacturer),
        ];
        for (key, value) in text_fields {
            if let Some(value) = non_empty(value) {
                params.push((key, value.to_string()));
            }
        }
        if let Some(value) = non_empty(&self.received_by) {
            params.push(("receivedBy", value.to_string()));
        }
        if let Some(priority) = self.priority {
            params.push(("priority", priority.to_string()));
        }

        let date_fields = [
            ("startDate", self.start_date),
            ("endDate", self.end_date),
            ("expiryBefore", self.expiry_before),
        ];
        for (key, value) in date_fields {
            if let Some(date) = value {
                params.push((key, date.format("%Y-%m-%d").to_string()));
            }
        }

        params
    }

    /// Query parameters for `GET /sales/returns`.
    pub fn sales_return_query(page: Pagination) -> Vec<(&'static str, String)> {
        vec![
            ("status", PUTAWAY_PENDING_STATUS.to_string()),
            ("page", page.page.to_string()),
            ("limit", page.page_size.to_string()),
        ]
    }

    /// Local filter for the unpaginated stock-adjustment queue.
    pub fn matches_adjustment(&self, product_name: &str, sku: Option<&str>, batch: Option<&str>) -> bool {
        let contains = |haystack: Option<&str>, needle: &str| {
            haystack
                .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false)
        };

        if let Some(needle) = non_empty(&self.product_name) {
            if !contains(Some(product_name), needle) {
                return false;
            }
        }
        if let Some(needle) = non_empty(&self.sku) {
            if !contains(sku, needle) {
                return false;
            }
        }
        if let Some(needle) = non_empty(&self.batch_number) {
            if !contains(batch, needle) {
                return false;
            }
        }
        if let Some(needle) = non_empty(&self.search) {
            if !(contains(Some(product_name), needle) || contains(sku, needle) || contains(batch, needle)) {
                return false;
            }
        }
        true
    }
}

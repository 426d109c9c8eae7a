//! Wire and session types for the put-away workflow.

pub mod filter;
pub mod line_item;
pub mod location;
pub mod pending;

pub use filter::{Pagination, Priority, PutAwayFilter, QueueKind};
pub use line_item::LineItem;
pub use location::{Location, LocationQuery, NewLocation};
pub use pending::{
    PendingWorkItem, PurchaseReceipt, ReceivedItem, Reference, ReturnedItem, SalesReturn,
    StockAdjustmentLog,
};

use serde::{Deserialize, Serialize};

/// One page of a list endpoint, normalized across the backend's response shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_records: u64,
}

impl<T> Page<T> {
    /// A page holding a complete, unpaginated list.
    pub fn single(items: Vec<T>) -> Self {
        let total_records = items.len() as u64;
        Self {
            page_size: items.len() as u32,
            items,
            page: 1,
            total_pages: 1,
            total_records,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            total_records: self.total_records,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            page_size: 0,
            total_pages: 0,
            total_records: 0,
        }
    }
}

/// Acknowledgement returned by the put-away commit endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of `POST /purchases/bulk-putaway-upload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated: Option<u64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

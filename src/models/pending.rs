use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{filter::QueueKind, line_item::LineItem};

/// A link to another backend document: either a bare id or the populated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Populated(PopulatedReference),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulatedReference {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reference {
    pub fn id(&self) -> &str {
        match self {
            Reference::Populated(doc) => &doc.id,
            Reference::Id(id) => id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Reference::Populated(doc) => doc.name.as_deref(),
            Reference::Id(_) => None,
        }
    }

    pub fn sku(&self) -> Option<&str> {
        match self {
            Reference::Populated(doc) => doc.sku.as_deref(),
            Reference::Id(_) => None,
        }
    }
}

/// One received line of a goods receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub received_qty: u32,
    #[serde(default)]
    pub rack: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One line of a customer return; the backend calls the count `quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnedItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub rack: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Goods receipt note waiting for put-away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub supplier: Option<Reference>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<ReceivedItem>,
}

/// Customer return waiting for put-away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReturn {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub return_number: String,
    #[serde(default)]
    pub customer: Option<Reference>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<ReturnedItem>,
}

/// Manual stock adjustment that added units which still need a shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustmentLog {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub product: Option<Reference>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl StockAdjustmentLog {
    pub fn display_name(&self) -> String {
        self.product_name
            .clone()
            .or_else(|| self.product.as_ref().and_then(|p| p.name().map(str::to_string)))
            .unwrap_or_else(|| "Unknown product".to_string())
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku
            .as_deref()
            .or_else(|| self.product.as_ref().and_then(Reference::sku))
    }
}

/// An entry of one of the three pending put-away queues.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWorkItem {
    PurchaseReceipt(PurchaseReceipt),
    SalesReturn(SalesReturn),
    StockAdjustment(StockAdjustmentLog),
}

impl PendingWorkItem {
    pub fn id(&self) -> &str {
        match self {
            PendingWorkItem::PurchaseReceipt(receipt) => &receipt.id,
            PendingWorkItem::SalesReturn(ret) => &ret.id,
            PendingWorkItem::StockAdjustment(log) => &log.id,
        }
    }

    pub fn kind(&self) -> QueueKind {
        match self {
            PendingWorkItem::PurchaseReceipt(_) => QueueKind::PurchaseReceipt,
            PendingWorkItem::SalesReturn(_) => QueueKind::SalesReturn,
            PendingWorkItem::StockAdjustment(_) => QueueKind::StockAdjustment,
        }
    }

    /// Human-facing document reference shown in the list.
    pub fn reference(&self) -> String {
        match self {
            PendingWorkItem::PurchaseReceipt(receipt) => receipt.invoice_number.clone(),
            PendingWorkItem::SalesReturn(ret) => ret.return_number.clone(),
            PendingWorkItem::StockAdjustment(log) => log.display_name(),
        }
    }

    /// Supplier or customer name, when the backend populated it.
    pub fn counterparty(&self) -> Option<&str> {
        match self {
            PendingWorkItem::PurchaseReceipt(receipt) => {
                receipt.supplier.as_ref().and_then(Reference::name)
            }
            PendingWorkItem::SalesReturn(ret) => ret.customer.as_ref().and_then(Reference::name),
            PendingWorkItem::StockAdjustment(log) => log.reason.as_deref(),
        }
    }

    pub fn line_count(&self) -> usize {
        match self {
            PendingWorkItem::PurchaseReceipt(receipt) => receipt.items.len(),
            PendingWorkItem::SalesReturn(ret) => ret.items.len(),
            PendingWorkItem::StockAdjustment(_) => 1,
        }
    }

    /// Editable copies of this entry's lines.
    ///
    /// Stock adjustments carry no line array, so a single line is
    /// synthesized from the log itself.
    pub fn line_items(&self) -> Vec<LineItem> {
        match self {
            PendingWorkItem::PurchaseReceipt(receipt) => {
                receipt.items.iter().map(LineItem::from).collect()
            }
            PendingWorkItem::SalesReturn(ret) => ret.items.iter().map(LineItem::from).collect(),
            PendingWorkItem::StockAdjustment(log) => vec![LineItem::from(log)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn purchase_json() -> Value {
        json!({
            "_id": "6650f1",
            "invoiceNumber": "INV-2024-001",
            "supplier": { "_id": "sup-1", "name": "Apex Pharma" },
            "status": "Putaway_Pending",
            "createdAt": "2024-05-01T09:30:00.000Z",
            "items": [
                {
                    "_id": "line-1",
                    "product": { "_id": "prod-1", "name": "Amoxicillin 500mg", "sku": "AMX-500" },
                    "batchNumber": "B2401",
                    "expiryDate": "2026-01-31",
                    "receivedQty": 40,
                    "purchaseRate": 12.5
                },
                {
                    "product": "prod-2",
                    "productName": "Paracetamol 650mg",
                    "sku": "PCM-650",
                    "receivedQty": 100,
                    "rack": ""
                }
            ]
        })
    }

    #[test]
    fn purchase_accepts_populated_and_bare_references() {
        let receipt: PurchaseReceipt = serde_json::from_value(purchase_json()).unwrap();
        assert_eq!(receipt.supplier.as_ref().and_then(Reference::name), Some("Apex Pharma"));
        assert_eq!(receipt.items[0].product.as_ref().map(Reference::id), Some("prod-1"));
        assert_eq!(
            receipt.items[1].product,
            Some(Reference::Id("prod-2".to_string()))
        );
        assert_eq!(receipt.items[0].extra.get("purchaseRate"), Some(&json!(12.5)));
    }

    #[test]
    fn stock_adjustment_hydrates_single_line() {
        let log: StockAdjustmentLog = serde_json::from_value(json!({
            "_id": "adj-9",
            "product": { "_id": "prod-7", "name": "Cetirizine 10mg" },
            "batchNumber": "C-88",
            "quantity": 12,
            "reason": "Found during cycle count"
        }))
        .unwrap();

        let item = PendingWorkItem::StockAdjustment(log);
        let lines = item.line_items();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].received_qty, 12);
        assert_eq!(lines[0].display_name(), "Cetirizine 10mg");
        assert_eq!(lines[0].batch_number.as_deref(), Some("C-88"));
        assert_eq!(item.line_count(), 1);
    }

    #[test]
    fn editing_hydrated_lines_leaves_the_entry_untouched() {
        let receipt: PurchaseReceipt = serde_json::from_value(purchase_json()).unwrap();
        let item = PendingWorkItem::PurchaseReceipt(receipt);
        let before = item.clone();

        let mut lines = item.line_items();
        lines[0].rack = "A1-R01-S1-B01".into();
        lines[1].received_qty = 1;

        assert_eq!(item, before);
    }

    #[test]
    fn sales_return_quantity_becomes_received_qty() {
        let ret: SalesReturn = serde_json::from_value(json!({
            "_id": "ret-1",
            "returnNumber": "SR-0042",
            "customer": "cust-3",
            "items": [{ "productName": "Ibuprofen 400mg", "quantity": 3 }]
        }))
        .unwrap();
        let item = PendingWorkItem::SalesReturn(ret);
        assert_eq!(item.reference(), "SR-0042");
        assert_eq!(item.counterparty(), None);
        assert_eq!(item.line_items()[0].received_qty, 3);
    }
}

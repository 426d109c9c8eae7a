use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::pending::{ReceivedItem, Reference, ReturnedItem, StockAdjustmentLog};

/// Editable copy of one pending line.
///
/// `rack` is the field the operator fills in; `received_qty` may also be
/// overwritten by a spreadsheet patch. Fields the client does not model are
/// kept in `extra` and sent back unchanged on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub line_id: Option<String>,
    pub product: Option<Reference>,
    pub product_name: Option<String>,
    pub sku: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub received_qty: u32,
    pub rack: String,
    #[serde(skip)]
    extra: Map<String, Value>,
}

impl LineItem {
    pub fn new(product_name: impl Into<String>, received_qty: u32) -> Self {
        Self {
            line_id: None,
            product: None,
            product_name: Some(product_name.into()),
            sku: None,
            batch_number: None,
            expiry_date: None,
            received_qty,
            rack: String::new(),
            extra: Map::new(),
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.product_name
            .as_deref()
            .or_else(|| self.product.as_ref().and_then(Reference::name))
            .unwrap_or("")
    }

    pub fn effective_sku(&self) -> Option<&str> {
        self.sku
            .as_deref()
            .or_else(|| self.product.as_ref().and_then(Reference::sku))
    }

    pub fn has_location(&self) -> bool {
        !self.rack.trim().is_empty()
    }

    /// Case-insensitive name match or exact SKU match.
    pub fn matches_key(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        let name = self.display_name();
        (!name.is_empty() && name.to_lowercase() == key.to_lowercase())
            || self.effective_sku() == Some(key)
    }

    pub fn to_received_item(&self) -> ReceivedItem {
        ReceivedItem {
            id: self.line_id.clone(),
            product: self.product.clone(),
            product_name: self.product_name.clone(),
            sku: self.sku.clone(),
            batch_number: self.batch_number.clone(),
            expiry_date: self.expiry_date.clone(),
            received_qty: self.received_qty,
            rack: self.rack.trim().to_string(),
            extra: self.extra.clone(),
        }
    }

    pub fn to_returned_item(&self) -> ReturnedItem {
        ReturnedItem {
            id: self.line_id.clone(),
            product: self.product.clone(),
            product_name: self.product_name.clone(),
            sku: self.sku.clone(),
            batch_number: self.batch_number.clone(),
            expiry_date: self.expiry_date.clone(),
            quantity: self.received_qty,
            rack: self.rack.trim().to_string(),
            extra: self.extra.clone(),
        }
    }
}

impl From<&ReceivedItem> for LineItem {
    fn from(item: &ReceivedItem) -> Self {
        Self {
            line_id: item.id.clone(),
            product: item.product.clone(),
            product_name: item.product_name.clone(),
            sku: item.sku.clone(),
            batch_number: item.batch_number.clone(),
            expiry_date: item.expiry_date.clone(),
            received_qty: item.received_qty,
            rack: item.rack.clone(),
            extra: item.extra.clone(),
        }
    }
}

impl From<&ReturnedItem> for LineItem {
    fn from(item: &ReturnedItem) -> Self {
        Self {
            line_id: item.id.clone(),
            product: item.product.clone(),
            product_name: item.product_name.clone(),
            sku: item.sku.clone(),
            batch_number: item.batch_number.clone(),
            expiry_date: item.expiry_date.clone(),
            received_qty: item.quantity,
            rack: item.rack.clone(),
            extra: item.extra.clone(),
        }
    }
}

impl From<&StockAdjustmentLog> for LineItem {
    fn from(log: &StockAdjustmentLog) -> Self {
        Self {
            line_id: None,
            product: log.product.clone(),
            product_name: Some(log.display_name()),
            sku: log.sku().map(str::to_string),
            batch_number: log.batch_number.clone(),
            expiry_date: log.expiry_date.clone(),
            received_qty: log.quantity,
            rack: String::new(),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_matching_is_case_insensitive_on_name_and_exact_on_sku() {
        let line = LineItem::new("Amoxicillin 500mg", 10).with_sku("AMX-500");
        assert!(line.matches_key("amoxicillin 500MG"));
        assert!(line.matches_key("AMX-500"));
        assert!(!line.matches_key("amx-500"));
        assert!(!line.matches_key("   "));
    }

    #[test]
    fn name_matching_folds_non_ascii_letters() {
        let line = LineItem::new("Ácido Fólico 5mg", 30);
        assert!(line.matches_key("ÁCIDO FÓLICO 5MG"));
        assert!(line.matches_key("ácido fólico 5mg"));
        assert!(!line.matches_key("acido folico 5mg"));
    }

    #[test]
    fn round_trip_keeps_unmodelled_fields() {
        let item: ReceivedItem = serde_json::from_value(json!({
            "productName": "Azithromycin",
            "receivedQty": 5,
            "freeQty": 1,
            "mrp": 98.5
        }))
        .unwrap();

        let mut line = LineItem::from(&item);
        line.rack = " B2-R03-S2-B07 ".into();
        let wire = serde_json::to_value(line.to_received_item()).unwrap();

        assert_eq!(wire["rack"], "B2-R03-S2-B07");
        assert_eq!(wire["freeQty"], 1);
        assert_eq!(wire["mrp"], 98.5);
        assert_eq!(wire["receivedQty"], 5);
    }

    #[test]
    fn returned_items_serialize_quantity() {
        let line = LineItem::new("Ibuprofen", 3);
        let wire = serde_json::to_value(line.to_returned_item()).unwrap();
        assert_eq!(wire["quantity"], 3);
        assert!(wire.get("receivedQty").is_none());
    }
}

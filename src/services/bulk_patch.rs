//! Spreadsheet edits for put-away lines.
//!
//! Two flavours share one header resolver: a local patch applied to the
//! lines of the selected receipt, and a server-side bulk upload spanning
//! many invoices.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::errors::ServiceError;
use crate::models::LineItem;

/// Accepted match-key headers, highest priority first.
const NAME_HEADERS: [&str; 4] = ["medicine name", "product name", "name", "medicine"];
const SKU_HEADER: &str = "sku";
const QUANTITY_HEADER: &str = "quantity";
const RACK_HEADER: &str = "rack";
const INVOICE_HEADER: &str = "invoice number";

/// One parsed spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRow {
    pub line: u64,
    pub key: String,
    pub quantity: Option<u32>,
    pub rack: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkPatchReport {
    pub rows: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// One entry of the `POST /purchases/bulk-putaway-upload` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPutAwayRow {
    pub invoice_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkUploadPlan {
    pub rows: Vec<BulkPutAwayRow>,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Columns {
    names: Vec<usize>,
    sku: Option<usize>,
    quantity: Option<usize>,
    rack: Option<usize>,
    invoice: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Self {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let position = |wanted: &str| normalized.iter().position(|h| h == wanted);

        Self {
            names: NAME_HEADERS.iter().filter_map(|h| position(h)).collect(),
            sku: position(SKU_HEADER),
            quantity: position(QUANTITY_HEADER),
            rack: position(RACK_HEADER),
            invoice: position(INVOICE_HEADER),
        }
    }

    fn has_key(&self) -> bool {
        !self.names.is_empty() || self.sku.is_some()
    }

    fn name<'r>(&self, record: &'r StringRecord) -> Option<&'r str> {
        self.names.iter().find_map(|&i| cell(record, Some(i)))
    }

    fn key<'r>(&self, record: &'r StringRecord) -> Option<&'r str> {
        self.name(record).or_else(|| cell(record, self.sku))
    }

    fn quantity(&self, record: &StringRecord, line: u64) -> Result<Option<u32>, ServiceError> {
        cell(record, self.quantity)
            .map(|raw| {
                raw.parse::<u32>().map_err(|_| {
                    ServiceError::CsvError(format!("line {}: invalid quantity '{}'", line, raw))
                })
            })
            .transpose()
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn missing_key_error() -> ServiceError {
    ServiceError::CsvError(
        "missing key column: expected one of Medicine Name, Product Name, Name, Medicine or SKU"
            .to_string(),
    )
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input)
}

/// Parses a patch spreadsheet in full. Any error aborts the whole file.
pub fn parse_patch_rows<R: Read>(input: R) -> Result<Vec<PatchRow>, ServiceError> {
    let mut reader = reader(input);
    let columns = Columns::resolve(reader.headers()?);
    if !columns.has_key() {
        return Err(missing_key_error());
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let Some(key) = columns.key(&record) else {
            continue;
        };
        rows.push(PatchRow {
            line,
            key: key.to_string(),
            quantity: columns.quantity(&record, line)?,
            rack: cell(&record, columns.rack).map(str::to_string),
        });
    }
    Ok(rows)
}

/// Writes each row onto the first line it matches. Rows without a match are
/// counted and otherwise ignored.
pub fn apply_patch(lines: &mut [LineItem], rows: &[PatchRow]) -> BulkPatchReport {
    let mut report = BulkPatchReport {
        rows: rows.len(),
        ..BulkPatchReport::default()
    };

    for row in rows {
        match lines.iter_mut().find(|line| line.matches_key(&row.key)) {
            Some(line) => {
                if let Some(quantity) = row.quantity {
                    line.received_qty = quantity;
                }
                if let Some(rack) = &row.rack {
                    line.rack = rack.clone();
                }
                report.matched += 1;
            }
            None => report.unmatched += 1,
        }
    }
    report
}

/// Parses a multi-invoice upload. Rows without an invoice number or a
/// product key are skipped.
pub fn parse_bulk_upload<R: Read>(input: R) -> Result<BulkUploadPlan, ServiceError> {
    let mut reader = reader(input);
    let columns = Columns::resolve(reader.headers()?);
    if columns.invoice.is_none() {
        return Err(ServiceError::CsvError(
            "missing column: Invoice Number".to_string(),
        ));
    }
    if !columns.has_key() {
        return Err(missing_key_error());
    }

    let mut plan = BulkUploadPlan::default();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let invoice = cell(&record, columns.invoice);
        let name = columns.name(&record);
        let sku = cell(&record, columns.sku);

        let Some(invoice) = invoice.filter(|_| name.is_some() || sku.is_some()) else {
            plan.skipped += 1;
            continue;
        };
        plan.rows.push(BulkPutAwayRow {
            invoice_number: invoice.to_string(),
            sku: sku.map(str::to_string),
            product_name: name.map(str::to_string),
            rack: cell(&record, columns.rack).map(str::to_string),
            quantity: columns.quantity(&record, line)?,
        });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn lines() -> Vec<LineItem> {
        vec![
            LineItem::new("Amoxicillin 500mg", 40).with_sku("AMX-500"),
            LineItem::new("Paracetamol 650mg", 100).with_sku("PCM-650"),
        ]
    }

    #[test]
    fn matching_rows_overwrite_quantity_and_rack() {
        let csv = "Medicine Name,SKU,Quantity,Rack\n\
                   amoxicillin 500MG,,38,A1-R01-S1-B01\n\
                   ,PCM-650,,B2-R03-S2-B07\n";
        let rows = parse_patch_rows(csv.as_bytes()).unwrap();
        let mut lines = lines();

        let report = apply_patch(&mut lines, &rows);

        assert_eq!(report, BulkPatchReport { rows: 2, matched: 2, unmatched: 0 });
        assert_eq!(lines[0].received_qty, 38);
        assert_eq!(lines[0].rack, "A1-R01-S1-B01");
        assert_eq!(lines[1].received_qty, 100);
        assert_eq!(lines[1].rack, "B2-R03-S2-B07");
    }

    #[test]
    fn unmatched_row_changes_nothing() {
        let csv = "Medicine Name,Quantity,Rack\nIbuprofen 400mg,5,C1-R01-S1-B01\n";
        let rows = parse_patch_rows(csv.as_bytes()).unwrap();
        let mut patched = lines();

        let report = apply_patch(&mut patched, &rows);

        assert_eq!(report.matched, 0);
        assert_eq!(report.unmatched, 1);
        assert_eq!(patched, lines());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let csv = "PRODUCT NAME , rack\nParacetamol 650mg, D4-R01-S1-B02\n";
        let rows = parse_patch_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].key, "Paracetamol 650mg");
        assert_eq!(rows[0].rack.as_deref(), Some("D4-R01-S1-B02"));
        assert_eq!(rows[0].quantity, None);
    }

    #[test]
    fn bad_quantity_aborts_the_whole_file() {
        let csv = "Name,Quantity\nAmoxicillin 500mg,12\nParacetamol 650mg,twelve\n";
        let err = parse_patch_rows(csv.as_bytes()).unwrap_err();
        assert_matches!(err, ServiceError::CsvError(msg) if msg.contains("line 3"));
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let err = parse_patch_rows("Quantity,Rack\n1,A\n".as_bytes()).unwrap_err();
        assert_matches!(err, ServiceError::CsvError(_));
    }

    #[test]
    fn bulk_upload_skips_rows_without_invoice_or_key() {
        let csv = "Invoice Number,SKU,Medicine Name,Rack,Quantity\n\
                   INV-1,AMX-500,,A1-R01-S1-B01,40\n\
                   ,PCM-650,,A1-R01-S1-B02,\n\
                   INV-2,,,A1-R01-S1-B03,\n\
                   INV-2,,Cetirizine 10mg,A1-R01-S1-B04,\n";
        let plan = parse_bulk_upload(csv.as_bytes()).unwrap();

        assert_eq!(plan.skipped, 2);
        assert_eq!(plan.rows.len(), 2);
        assert_eq!(plan.rows[0].sku.as_deref(), Some("AMX-500"));
        assert_eq!(plan.rows[0].quantity, Some(40));
        assert_eq!(
            serde_json::to_value(&plan.rows[1]).unwrap(),
            serde_json::json!({
                "invoiceNumber": "INV-2",
                "productName": "Cetirizine 10mg",
                "rack": "A1-R01-S1-B04"
            })
        );
    }

    #[test]
    fn bulk_upload_requires_invoice_column() {
        let err = parse_bulk_upload("SKU,Rack\nAMX-500,A1\n".as_bytes()).unwrap_err();
        assert_matches!(err, ServiceError::CsvError(msg) if msg.contains("Invoice Number"));
    }
}

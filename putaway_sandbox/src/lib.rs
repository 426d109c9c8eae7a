//! In-memory inventory backend serving the put-away endpoints.
//!
//! Documents are kept as JSON values so that fields the client does not
//! model survive a round trip, as they would against the real backend.

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::{sync::Mutex, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub const PENDING: &str = "Putaway_Pending";
pub const COMPLETED: &str = "Completed";

#[derive(Default)]
struct Store {
    purchases: Vec<Value>,
    returns: Vec<Value>,
    adjustments: Vec<Value>,
    locations: Vec<Value>,
}

#[derive(Clone)]
pub struct SandboxState {
    store: Arc<Mutex<Store>>,
    token: Arc<str>,
}

impl SandboxState {
    pub fn empty(token: &str) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            token: Arc::from(token),
        }
    }

    /// A store with a few pending documents and locations of each kind.
    pub fn seeded(token: &str) -> Self {
        let store = Store {
            purchases: vec![
                json!({
                    "_id": "pur-1001",
                    "invoiceNumber": "INV-1001",
                    "supplier": { "_id": "sup-1", "name": "Apex Pharma" },
                    "status": PENDING,
                    "priority": "High",
                    "createdAt": "2024-05-01T09:30:00Z",
                    "items": [
                        { "_id": "pl-1", "product": { "_id": "prod-1", "name": "Amoxicillin 500mg", "sku": "AMX-500" },
                          "productName": "Amoxicillin 500mg", "sku": "AMX-500", "batchNumber": "B2401",
                          "expiryDate": "2026-01-31", "receivedQty": 40, "purchaseRate": 12.5, "rack": "" },
                        { "_id": "pl-2", "product": "prod-2", "productName": "Paracetamol 650mg", "sku": "PCM-650",
                          "batchNumber": "P771", "expiryDate": "2027-03-31", "receivedQty": 100, "rack": "" }
                    ]
                }),
                json!({
                    "_id": "pur-1002",
                    "invoiceNumber": "INV-1002",
                    "supplier": { "_id": "sup-2", "name": "Medline Distributors" },
                    "status": PENDING,
                    "priority": "Normal",
                    "createdAt": "2024-05-02T11:00:00Z",
                    "items": [
                        { "_id": "pl-3", "productName": "Cetirizine 10mg", "sku": "CTZ-10",
                          "batchNumber": "C-88", "receivedQty": 60, "rack": "" }
                    ]
                }),
            ],
            returns: vec![json!({
                "_id": "ret-501",
                "returnNumber": "SR-501",
                "customer": { "_id": "cus-1", "name": "Walk-in Customer" },
                "status": PENDING,
                "createdAt": "2024-05-03T15:45:00Z",
                "items": [
                    { "_id": "rl-1", "productName": "Ibuprofen 400mg", "sku": "IBU-400",
                      "batchNumber": "I-12", "quantity": 3, "rack": "" }
                ]
            })],
            adjustments: vec![json!({
                "_id": "adj-9",
                "product": { "_id": "prod-7", "name": "Cetirizine 10mg", "sku": "CTZ-10" },
                "batchNumber": "C-88",
                "quantity": 12,
                "reason": "Found during cycle count",
                "status": PENDING,
                "createdAt": "2024-05-04T08:00:00Z"
            })],
            locations: vec![
                location_doc("A1", "R01", "S1", "B01", "General"),
                location_doc("A1", "R01", "S1", "B02", "General"),
                location_doc("C3", "R02", "S4", "B01", "Cold Chain"),
            ],
        };
        Self {
            store: Arc::new(Mutex::new(store)),
            token: Arc::from(token),
        }
    }

    pub async fn insert_purchase(&self, purchase: Value) {
        self.store.lock().await.purchases.push(purchase);
    }

    pub async fn insert_location(&self, aisle: &str, rack: &str, shelf: &str, bin: &str, category: &str) {
        self.store
            .lock()
            .await
            .locations
            .push(location_doc(aisle, rack, shelf, bin, category));
    }

    pub async fn purchase(&self, id: &str) -> Option<Value> {
        find(&self.store.lock().await.purchases, id).cloned()
    }

    pub async fn sales_return(&self, id: &str) -> Option<Value> {
        find(&self.store.lock().await.returns, id).cloned()
    }

    pub async fn adjustment(&self, id: &str) -> Option<Value> {
        find(&self.store.lock().await.adjustments, id).cloned()
    }

    pub async fn location_codes(&self) -> Vec<String> {
        self.store
            .lock()
            .await
            .locations
            .iter()
            .filter_map(|l| str_field(l, "locationCode").map(str::to_string))
            .collect()
    }
}

fn location_doc(aisle: &str, rack: &str, shelf: &str, bin: &str, category: &str) -> Value {
    json!({
        "_id": format!("loc-{}", uuid::Uuid::new_v4().simple()),
        "locationCode": format!("{}-{}-{}-{}", aisle, rack, shelf, bin),
        "aisle": aisle,
        "rack": rack,
        "shelf": shelf,
        "bin": bin,
        "category": category,
        "status": "Active"
    })
}

fn str_field<'a>(doc: &'a Value, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

fn find<'a>(docs: &'a [Value], id: &str) -> Option<&'a Value> {
    docs.iter().find(|d| str_field(d, "_id") == Some(id))
}

fn find_mut<'a>(docs: &'a mut [Value], id: &str) -> Option<&'a mut Value> {
    docs.iter_mut().find(|d| str_field(d, "_id") == Some(id))
}

fn is_pending(doc: &Value) -> bool {
    str_field(doc, "status") == Some(PENDING)
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

/// Error body in the backend's `{ success: false, message }` shape.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "message": self.message })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

async fn require_bearer(State(state): State<SandboxState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == &*state.token)
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        ApiError::new(StatusCode::UNAUTHORIZED, "Not authorized, token failed").into_response()
    }
}

pub fn router(state: SandboxState) -> Router {
    let api = Router::new()
        .route("/purchases", get(list_purchases))
        .route("/purchases/bulk-putaway-upload", post(bulk_putaway_upload))
        .route("/purchases/:id/putaway", put(put_away_purchase))
        .route("/sales/returns", get(list_returns))
        .route("/sales/returns/:id/putaway", put(put_away_return))
        .route("/products/putaway/pending", get(list_adjustments))
        .route("/products/putaway/complete/:id", put(complete_adjustment))
        .route("/locations", get(list_locations).post(create_location))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the sandbox on an ephemeral local port.
pub async fn spawn(state: SandboxState) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("sandbox server stopped: {}", err);
        }
    });
    info!(%addr, "put-away sandbox listening");
    Ok((addr, handle))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "putaway-sandbox",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn page_params(params: &HashMap<String, String>, page_key: &str, size_key: &str) -> (usize, usize) {
    let number = |key: &str, default: usize| {
        params
            .get(key)
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(default)
    };
    (number(page_key, 1), number(size_key, 10))
}

fn paginate(docs: Vec<Value>, page: usize, size: usize) -> (Vec<Value>, usize, usize) {
    let total = docs.len();
    let pages = total.div_ceil(size);
    let items = docs
        .into_iter()
        .skip(page.saturating_sub(1).saturating_mul(size))
        .take(size)
        .collect();
    (items, pages, total)
}

fn purchase_matches(doc: &Value, params: &HashMap<String, String>) -> bool {
    let items = doc
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let any_item = |field: &str, needle: &str| {
        items.iter().any(|item| contains_ci(str_field(item, field), needle))
    };
    let supplier = doc
        .get("supplier")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str);

    params.iter().all(|(key, value)| match key.as_str() {
        "search" => {
            contains_ci(str_field(doc, "invoiceNumber"), value)
                || contains_ci(supplier, value)
                || any_item("productName", value)
                || any_item("sku", value)
        }
        "supplierName" => contains_ci(supplier, value),
        "invoiceNumber" => contains_ci(str_field(doc, "invoiceNumber"), value),
        "sku" => any_item("sku", value),
        "productName" => any_item("productName", value),
        "batchNumber" => any_item("batchNumber", value),
        "priority" => str_field(doc, "priority") == Some(value.as_str()),
        _ => true,
    })
}

async fn list_purchases(
    State(state): State<SandboxState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let (page, size) = page_params(&params, "pageNumber", "pageSize");
    let store = state.store.lock().await;
    let matching: Vec<Value> = store
        .purchases
        .iter()
        .filter(|d| is_pending(d) && purchase_matches(d, &params))
        .cloned()
        .collect();
    let (purchases, pages, total) = paginate(matching, page, size);
    Ok(Json(json!({
        "success": true,
        "purchases": purchases,
        "pages": pages,
        "total": total
    })))
}

async fn list_returns(
    State(state): State<SandboxState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let (page, size) = page_params(&params, "page", "limit");
    let store = state.store.lock().await;
    let pending: Vec<Value> = store.returns.iter().filter(|d| is_pending(d)).cloned().collect();
    let (returns, pages, total) = paginate(pending, page, size);
    Ok(Json(json!({
        "success": true,
        "returns": returns,
        "pages": pages,
        "total": total
    })))
}

async fn list_adjustments(State(state): State<SandboxState>) -> ApiResult {
    let store = state.store.lock().await;
    let logs: Vec<Value> = store
        .adjustments
        .iter()
        .filter(|d| is_pending(d))
        .cloned()
        .collect();
    Ok(Json(json!({ "success": true, "logs": logs })))
}

#[derive(Deserialize)]
struct ItemsBody {
    #[serde(default)]
    items: Vec<Value>,
}

fn ensure_racked(items: &[Value]) -> Result<(), ApiError> {
    if items.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No items to put away"));
    }
    let missing = items
        .iter()
        .any(|item| str_field(item, "rack").map(str::trim).unwrap_or("").is_empty());
    if missing {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Rack location is required for every item",
        ));
    }
    Ok(())
}

fn complete(doc: &mut Value, items: Option<Vec<Value>>) {
    if let Some(items) = items {
        doc["items"] = Value::Array(items);
    }
    doc["status"] = json!(COMPLETED);
    doc["putawayAt"] = json!(chrono::Utc::now().to_rfc3339());
}

async fn put_away_purchase(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
    Json(body): Json<ItemsBody>,
) -> ApiResult {
    ensure_racked(&body.items)?;
    let mut store = state.store.lock().await;
    let doc = find_mut(&mut store.purchases, &id)
        .filter(|d| is_pending(d))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Purchase not found or already put away"))?;
    complete(doc, Some(body.items));
    info!(%id, "purchase put away");
    Ok(Json(json!({ "success": true, "message": "Items moved to inventory" })))
}

async fn put_away_return(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
    Json(body): Json<ItemsBody>,
) -> ApiResult {
    ensure_racked(&body.items)?;
    let mut store = state.store.lock().await;
    let doc = find_mut(&mut store.returns, &id)
        .filter(|d| is_pending(d))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Return not found or already put away"))?;
    complete(doc, Some(body.items));
    info!(%id, "sales return put away");
    Ok(Json(json!({ "success": true, "message": "Returned items restocked" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody {
    #[serde(default)]
    rack_location: String,
}

async fn complete_adjustment(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> ApiResult {
    let rack = body.rack_location.trim();
    if rack.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Rack location is required"));
    }
    let mut store = state.store.lock().await;
    let doc = find_mut(&mut store.adjustments, &id)
        .filter(|d| is_pending(d))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Adjustment log not found"))?;
    doc["rack"] = json!(rack);
    complete(doc, None);
    info!(%id, rack, "stock adjustment put away");
    Ok(Json(json!({ "success": true, "message": "Stock adjustment completed" })))
}

async fn list_locations(
    State(state): State<SandboxState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let (page, size) = page_params(&params, "page", "pageSize");
    let search = params.get("search").map(|s| s.trim()).unwrap_or("");
    let store = state.store.lock().await;
    let matching: Vec<Value> = store
        .locations
        .iter()
        .filter(|l| search.is_empty() || contains_ci(str_field(l, "locationCode"), search))
        .cloned()
        .collect();
    let (locations, pages, total) = paginate(matching, page, size);
    Ok(Json(json!({
        "success": true,
        "locations": locations,
        "pages": pages,
        "total": total
    })))
}

#[derive(Deserialize)]
struct NewLocationBody {
    #[serde(default)]
    aisle: String,
    #[serde(default)]
    rack: String,
    #[serde(default)]
    shelf: String,
    #[serde(default)]
    bin: String,
    #[serde(default)]
    category: String,
}

async fn create_location(
    State(state): State<SandboxState>,
    Json(body): Json<NewLocationBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let fields = [
        ("Aisle", body.aisle.trim()),
        ("Rack", body.rack.trim()),
        ("Shelf", body.shelf.trim()),
        ("Bin", body.bin.trim()),
        ("Category", body.category.trim()),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, value)| value.is_empty()) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("{} is required", name),
        ));
    }

    let doc = location_doc(fields[0].1, fields[1].1, fields[2].1, fields[3].1, fields[4].1);
    let code = str_field(&doc, "locationCode").unwrap_or_default().to_string();
    let mut store = state.store.lock().await;
    if store
        .locations
        .iter()
        .any(|l| str_field(l, "locationCode") == Some(code.as_str()))
    {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("Location {} already exists", code),
        ));
    }
    store.locations.push(doc.clone());
    info!(%code, "location created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "location": doc })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkRow {
    invoice_number: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    rack: Option<String>,
    #[serde(default)]
    quantity: Option<u64>,
}

#[derive(Deserialize)]
struct BulkBody {
    #[serde(default)]
    items: Vec<BulkRow>,
}

fn row_matches(item: &Value, row: &BulkRow) -> bool {
    let sku_match = row
        .sku
        .as_deref()
        .map(|sku| str_field(item, "sku") == Some(sku))
        .unwrap_or(false);
    let name_match = row
        .product_name
        .as_deref()
        .map(|name| {
            str_field(item, "productName")
                .map(|n| n.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .unwrap_or(false);
    sku_match || name_match
}

async fn bulk_putaway_upload(State(state): State<SandboxState>, Json(body): Json<BulkBody>) -> ApiResult {
    if body.items.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No rows to upload"));
    }

    let mut store = state.store.lock().await;
    let mut updated = 0u64;
    let mut errors = Vec::new();

    for row in &body.items {
        let Some(purchase) = store.purchases.iter_mut().find(|d| {
            is_pending(d) && str_field(d, "invoiceNumber") == Some(row.invoice_number.as_str())
        }) else {
            errors.push(format!("Invoice {} is not pending put-away", row.invoice_number));
            continue;
        };

        let item = purchase
            .get_mut("items")
            .and_then(Value::as_array_mut)
            .and_then(|items| items.iter_mut().find(|item| row_matches(item, row)));
        match item {
            Some(item) => {
                if let Some(rack) = row.rack.as_deref().filter(|r| !r.trim().is_empty()) {
                    item["rack"] = json!(rack.trim());
                }
                if let Some(quantity) = row.quantity {
                    item["receivedQty"] = json!(quantity);
                }
                updated += 1;
            }
            None => errors.push(format!(
                "No item {} on invoice {}",
                row.sku.as_deref().or(row.product_name.as_deref()).unwrap_or("?"),
                row.invoice_number
            )),
        }
    }

    for purchase in store.purchases.iter_mut().filter(|d| is_pending(d)) {
        let all_racked = purchase
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                !items.is_empty()
                    && items
                        .iter()
                        .all(|i| !str_field(i, "rack").unwrap_or("").trim().is_empty())
            })
            .unwrap_or(false);
        if all_racked {
            complete(purchase, None);
        }
    }

    Ok(Json(json!({
        "success": updated > 0,
        "updated": updated,
        "errors": errors,
        "message": format!("{} line(s) updated", updated)
    })))
}

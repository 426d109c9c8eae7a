//! Operator session driving one put-away screen.
//!
//! The session owns the filter, the current page of the pending list, the
//! location cache and, while editing, an owned copy of the selected entry
//! with its editable lines. Nothing here persists across restarts.

use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        BulkUploadReceipt, LineItem, Location, NewLocation, Page, Pagination, PendingWorkItem,
        PutAwayFilter, QueueKind,
    },
    navigation::{Navigator, Route},
    services::{
        bulk_patch::{self, BulkPatchReport},
        LocationDirectory, PutAwayService,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Browsing,
    Editing {
        selected: PendingWorkItem,
        lines: Vec<LineItem>,
    },
}

/// Summary shown to the operator before committing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitPlan {
    pub kind: QueueKind,
    pub id: String,
    pub reference: String,
    pub line_count: usize,
    /// Indexes of lines without a rack; the backend will refuse these.
    pub unassigned: Vec<usize>,
}

impl CommitPlan {
    pub fn is_fully_assigned(&self) -> bool {
        self.unassigned.is_empty()
    }
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub kind: QueueKind,
    pub id: String,
    pub message: Option<String>,
    /// Set when the commit succeeded but reloading the queue did not.
    pub refresh_error: Option<ServiceError>,
}

#[derive(Debug)]
pub struct BulkUploadOutcome {
    pub receipt: BulkUploadReceipt,
    pub skipped: usize,
    pub refresh_error: Option<ServiceError>,
}

pub struct PutAwaySession {
    service: PutAwayService,
    locations: LocationDirectory,
    navigator: Arc<Navigator>,
    event_sender: Option<EventSender>,
    filter: PutAwayFilter,
    pagination: Pagination,
    pending: Page<PendingWorkItem>,
    state: SessionState,
    pending_location_target: Option<usize>,
}

impl PutAwaySession {
    pub fn new(
        service: PutAwayService,
        locations: LocationDirectory,
        navigator: Arc<Navigator>,
        event_sender: Option<EventSender>,
        page_size: u32,
    ) -> Self {
        Self {
            service,
            locations,
            navigator,
            event_sender,
            filter: PutAwayFilter::default(),
            pagination: Pagination::first(page_size),
            pending: Page::default(),
            state: SessionState::Browsing,
            pending_location_target: None,
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.publish(event).await;
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, SessionState::Editing { .. })
    }

    pub fn queue_kind(&self) -> QueueKind {
        self.filter.put_away_type
    }

    pub fn filter(&self) -> &PutAwayFilter {
        &self.filter
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn pending(&self) -> &Page<PendingWorkItem> {
        &self.pending
    }

    pub fn selected(&self) -> Option<&PendingWorkItem> {
        match &self.state {
            SessionState::Editing { selected, .. } => Some(selected),
            SessionState::Browsing => None,
        }
    }

    pub fn lines(&self) -> &[LineItem] {
        match &self.state {
            SessionState::Editing { lines, .. } => lines,
            SessionState::Browsing => &[],
        }
    }

    pub fn locations(&self) -> &LocationDirectory {
        &self.locations
    }

    pub fn pending_location_target(&self) -> Option<usize> {
        self.pending_location_target
    }

    fn ensure_browsing(&self, action: &str) -> Result<(), ServiceError> {
        if self.is_editing() {
            return Err(ServiceError::InvalidState(format!(
                "Cannot {} while a work item is being edited; commit or cancel first",
                action
            )));
        }
        Ok(())
    }

    fn editing(&self) -> Result<(&PendingWorkItem, &[LineItem]), ServiceError> {
        match &self.state {
            SessionState::Editing { selected, lines } => Ok((selected, lines)),
            SessionState::Browsing => Err(ServiceError::InvalidState(
                "No work item is selected".to_string(),
            )),
        }
    }

    fn line_mut(&mut self, index: usize) -> Result<&mut LineItem, ServiceError> {
        match &mut self.state {
            SessionState::Editing { lines, .. } => {
                let count = lines.len();
                lines.get_mut(index).ok_or_else(|| {
                    ServiceError::InvalidState(format!(
                        "Line {} does not exist; the item has {} line(s)",
                        index, count
                    ))
                })
            }
            SessionState::Browsing => Err(ServiceError::InvalidState(
                "No work item is selected".to_string(),
            )),
        }
    }

    /// Switches queue, returning to page 1 and fetching once.
    #[instrument(skip(self))]
    pub async fn set_queue_kind(
        &mut self,
        kind: QueueKind,
    ) -> Result<&Page<PendingWorkItem>, ServiceError> {
        self.ensure_browsing("change the queue")?;
        let filter = PutAwayFilter {
            put_away_type: kind,
            ..self.filter.clone()
        };
        let pagination = Pagination::first(self.pagination.page_size);
        self.load(filter, pagination).await
    }

    /// Replaces the filter, returning to page 1 and fetching once.
    #[instrument(skip(self, filter))]
    pub async fn set_filter(
        &mut self,
        filter: PutAwayFilter,
    ) -> Result<&Page<PendingWorkItem>, ServiceError> {
        self.ensure_browsing("change the filters")?;
        let pagination = Pagination::first(self.pagination.page_size);
        self.load(filter, pagination).await
    }

    #[instrument(skip(self))]
    pub async fn go_to_page(&mut self, page: u32) -> Result<&Page<PendingWorkItem>, ServiceError> {
        let pagination = Pagination::new(page, self.pagination.page_size);
        self.load(self.filter.clone(), pagination).await
    }

    /// Re-fetches the current page. On failure the previous list is kept.
    pub async fn refresh(&mut self) -> Result<&Page<PendingWorkItem>, ServiceError> {
        self.load(self.filter.clone(), self.pagination).await
    }

    /// Fetches with the given query and adopts it only when the fetch succeeds.
    async fn load(
        &mut self,
        filter: PutAwayFilter,
        pagination: Pagination,
    ) -> Result<&Page<PendingWorkItem>, ServiceError> {
        let page = self.service.fetch_queue(&filter, pagination).await?;
        self.filter = filter;
        self.pagination = pagination;
        self.pending = page;
        Ok(&self.pending)
    }

    /// Opens an entry of the current page for editing.
    #[instrument(skip(self))]
    pub async fn select(&mut self, id: &str) -> Result<&[LineItem], ServiceError> {
        self.ensure_browsing("select another work item")?;
        let item = self
            .pending
            .items
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("{} is not on the current page", id))
            })?;

        let lines = item.line_items();
        let event = Event::WorkItemSelected {
            kind: item.kind(),
            id: item.id().to_string(),
            lines: lines.len(),
        };
        self.state = SessionState::Editing {
            selected: item,
            lines,
        };
        self.pending_location_target = None;
        self.publish(event).await;
        Ok(self.lines())
    }

    /// Drops the selection and its unsaved edits. Returns whether anything was selected.
    pub async fn cancel(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.state, SessionState::Browsing);
        self.pending_location_target = None;
        match previous {
            SessionState::Editing { selected, .. } => {
                self.publish(Event::SelectionCancelled {
                    id: selected.id().to_string(),
                })
                .await;
                true
            }
            SessionState::Browsing => false,
        }
    }

    pub async fn load_locations(&mut self) -> Result<usize, ServiceError> {
        self.locations.load().await
    }

    /// Autocomplete over the cached locations.
    pub fn suggest_locations(&self, query: &str) -> Vec<&Location> {
        self.locations.suggest(query)
    }

    /// Autocomplete that falls back to the registry when the cache is partial.
    pub async fn search_locations(&mut self, query: &str) -> Result<Vec<Location>, ServiceError> {
        self.locations.search(query).await
    }

    pub async fn assign_location(&mut self, index: usize, code: &str) -> Result<(), ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Location code is required".to_string(),
            ));
        }
        self.line_mut(index)?.rack = code.to_string();
        self.publish(Event::LocationAssigned {
            line: index,
            location_code: code.to_string(),
        })
        .await;
        Ok(())
    }

    /// Assigns `code` to every line that has no rack yet. Returns how many changed.
    pub async fn assign_all_unassigned(&mut self, code: &str) -> Result<usize, ServiceError> {
        let unassigned: Vec<usize> = self
            .lines()
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.has_location())
            .map(|(i, _)| i)
            .collect();
        for &index in &unassigned {
            self.assign_location(index, code).await?;
        }
        Ok(unassigned.len())
    }

    /// Marks line `index` as the target of the "create new location" form.
    pub fn begin_location_create(&mut self, index: usize) -> Result<(), ServiceError> {
        self.line_mut(index)?;
        self.pending_location_target = Some(index);
        Ok(())
    }

    pub fn cancel_location_create(&mut self) {
        self.pending_location_target = None;
    }

    /// Registers a new location and assigns it to the pending target line.
    #[instrument(skip(self, form))]
    pub async fn create_location(&mut self, form: &NewLocation) -> Result<Location, ServiceError> {
        let index = self.pending_location_target.ok_or_else(|| {
            ServiceError::InvalidState("No line is waiting for a new location".to_string())
        })?;
        self.line_mut(index)?;

        let location = self.locations.create(form).await?;
        self.line_mut(index)?.rack = location.location_code.clone();
        self.pending_location_target = None;

        self.publish(Event::LocationCreated {
            location_code: location.location_code.clone(),
        })
        .await;
        self.publish(Event::LocationAssigned {
            line: index,
            location_code: location.location_code.clone(),
        })
        .await;
        Ok(location)
    }

    /// Patches the selected purchase receipt's lines from a spreadsheet.
    /// The whole file is parsed before any line changes.
    #[instrument(skip(self, input))]
    pub async fn apply_bulk_csv<R: Read + Send>(
        &mut self,
        input: R,
    ) -> Result<BulkPatchReport, ServiceError> {
        let (selected, _) = self.editing()?;
        let kind = selected.kind();
        if !kind.supports_bulk_upload() {
            return Err(ServiceError::UnsupportedOperation(format!(
                "Bulk upload is only available for {}",
                QueueKind::PurchaseReceipt
            )));
        }

        let rows = bulk_patch::parse_patch_rows(input)?;
        let report = match &mut self.state {
            SessionState::Editing { lines, .. } => bulk_patch::apply_patch(lines, &rows),
            SessionState::Browsing => BulkPatchReport::default(),
        };

        info!(
            rows = report.rows,
            matched = report.matched,
            unmatched = report.unmatched,
            "bulk patch applied"
        );
        self.publish(Event::BulkPatchApplied {
            rows: report.rows,
            matched: report.matched,
            unmatched: report.unmatched,
        })
        .await;
        Ok(report)
    }

    /// Uploads a multi-invoice spreadsheet, then reloads the queue.
    #[instrument(skip(self, input))]
    pub async fn bulk_upload<R: Read + Send>(
        &mut self,
        input: R,
    ) -> Result<BulkUploadOutcome, ServiceError> {
        self.ensure_browsing("upload a spreadsheet")?;
        if !self.queue_kind().supports_bulk_upload() {
            return Err(ServiceError::UnsupportedOperation(format!(
                "Bulk upload is only available for {}",
                QueueKind::PurchaseReceipt
            )));
        }

        let plan = bulk_patch::parse_bulk_upload(input)?;
        let receipt = self.service.bulk_upload(&plan).await?;
        let refresh_error = self.refresh().await.err();
        if let Some(err) = &refresh_error {
            warn!("queue reload after bulk upload failed: {}", err);
        }

        Ok(BulkUploadOutcome {
            receipt,
            skipped: plan.skipped,
            refresh_error,
        })
    }

    pub fn commit_plan(&self) -> Result<CommitPlan, ServiceError> {
        let (selected, lines) = self.editing()?;
        Ok(CommitPlan {
            kind: selected.kind(),
            id: selected.id().to_string(),
            reference: selected.reference(),
            line_count: lines.len(),
            unassigned: lines
                .iter()
                .enumerate()
                .filter(|(_, line)| !line.has_location())
                .map(|(i, _)| i)
                .collect(),
        })
    }

    /// Makes the selected entry live.
    ///
    /// On success the selection is cleared and the queue reloaded; on
    /// failure the selection and every edit are kept.
    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> Result<CommitOutcome, ServiceError> {
        let (selected, lines) = self.editing()?;
        let kind = selected.kind();
        let id = selected.id().to_string();

        let receipt = self.service.commit(selected, lines).await?;

        self.state = SessionState::Browsing;
        self.pending_location_target = None;

        let refresh_error = self.refresh().await.err();
        if let Some(err) = &refresh_error {
            warn!("queue reload after commit failed: {}", err);
        }

        Ok(CommitOutcome {
            kind,
            id,
            message: receipt.message,
            refresh_error,
        })
    }

    /// Shortcut offered after a successful commit.
    pub fn open_inventory(&self) {
        self.navigator.navigate(Route::InventoryList);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocationRegistry, PutAwayBackend};
    use crate::models::{
        BulkUploadReceipt, CommitReceipt, LocationQuery, PurchaseReceipt, ReceivedItem,
        ReturnedItem, SalesReturn, StockAdjustmentLog,
    };
    use crate::services::bulk_patch::BulkPutAwayRow;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Purchases(u32),
        SalesReturns(u32),
        StockAdjustments,
        PutPurchase(String, Vec<ReceivedItem>),
        PutReturn(String, Vec<ReturnedItem>),
        CompleteAdjustment(String, String),
        BulkUpload(usize),
        ListLocations,
        CreateLocation(NewLocation),
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<Call>>,
        reject_commit: Mutex<Option<String>>,
        fail_fetch: Mutex<bool>,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn fetch_result(&self) -> Result<(), ServiceError> {
            if *self.fail_fetch.lock().unwrap() {
                Err(ServiceError::NetworkError("connection refused".into()))
            } else {
                Ok(())
            }
        }

        fn commit_result(&self) -> Result<CommitReceipt, ServiceError> {
            match self.reject_commit.lock().unwrap().clone() {
                Some(message) => Err(ServiceError::Rejected(message)),
                None => Ok(CommitReceipt {
                    success: true,
                    message: Some("Items moved to inventory".into()),
                }),
            }
        }
    }

    fn purchase() -> PurchaseReceipt {
        serde_json::from_value(json!({
            "_id": "p1",
            "invoiceNumber": "INV-1001",
            "supplier": { "_id": "s1", "name": "Apex Pharma" },
            "items": [
                { "_id": "l1", "productName": "Amoxicillin 500mg", "sku": "AMX-500", "receivedQty": 40 },
                { "_id": "l2", "productName": "Paracetamol 650mg", "sku": "PCM-650", "receivedQty": 100 }
            ]
        }))
        .unwrap()
    }

    fn sales_return() -> SalesReturn {
        serde_json::from_value(json!({
            "_id": "r1",
            "returnNumber": "SR-501",
            "items": [{ "productName": "Ibuprofen 400mg", "quantity": 3 }]
        }))
        .unwrap()
    }

    fn adjustment() -> StockAdjustmentLog {
        serde_json::from_value(json!({
            "_id": "a1",
            "product": { "_id": "prod-7", "name": "Cetirizine 10mg" },
            "batchNumber": "C-88",
            "quantity": 12
        }))
        .unwrap()
    }

    #[async_trait]
    impl PutAwayBackend for RecordingBackend {
        async fn pending_purchases(
            &self,
            _filter: &PutAwayFilter,
            page: Pagination,
        ) -> Result<Page<PurchaseReceipt>, ServiceError> {
            self.record(Call::Purchases(page.page));
            self.fetch_result()?;
            Ok(Page {
                items: vec![purchase()],
                page: page.page,
                page_size: page.page_size,
                total_pages: 3,
                total_records: 21,
            })
        }

        async fn pending_sales_returns(
            &self,
            page: Pagination,
        ) -> Result<Page<SalesReturn>, ServiceError> {
            self.record(Call::SalesReturns(page.page));
            self.fetch_result()?;
            Ok(Page {
                items: vec![sales_return()],
                page: page.page,
                page_size: page.page_size,
                total_pages: 1,
                total_records: 1,
            })
        }

        async fn pending_stock_adjustments(&self) -> Result<Vec<StockAdjustmentLog>, ServiceError> {
            self.record(Call::StockAdjustments);
            self.fetch_result()?;
            Ok(vec![adjustment()])
        }

        async fn put_away_purchase(
            &self,
            purchase_id: &str,
            items: &[ReceivedItem],
        ) -> Result<CommitReceipt, ServiceError> {
            self.record(Call::PutPurchase(purchase_id.to_string(), items.to_vec()));
            self.commit_result()
        }

        async fn put_away_sales_return(
            &self,
            return_id: &str,
            items: &[ReturnedItem],
        ) -> Result<CommitReceipt, ServiceError> {
            self.record(Call::PutReturn(return_id.to_string(), items.to_vec()));
            self.commit_result()
        }

        async fn complete_stock_adjustment(
            &self,
            log_id: &str,
            rack_location: &str,
        ) -> Result<CommitReceipt, ServiceError> {
            self.record(Call::CompleteAdjustment(
                log_id.to_string(),
                rack_location.to_string(),
            ));
            self.commit_result()
        }

        async fn bulk_put_away_upload(
            &self,
            rows: &[BulkPutAwayRow],
        ) -> Result<BulkUploadReceipt, ServiceError> {
            self.record(Call::BulkUpload(rows.len()));
            Ok(BulkUploadReceipt {
                success: true,
                message: None,
                updated: Some(rows.len() as u64),
                errors: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl LocationRegistry for RecordingBackend {
        async fn list_locations(&self, _query: &LocationQuery) -> Result<Page<Location>, ServiceError> {
            self.record(Call::ListLocations);
            Ok(Page::single(Vec::new()))
        }

        async fn create_location(&self, location: &NewLocation) -> Result<Location, ServiceError> {
            self.record(Call::CreateLocation(location.clone()));
            Ok(serde_json::from_value(json!({
                "_id": "loc-new",
                "locationCode": format!("{}-{}-{}-{}", location.aisle, location.rack, location.shelf, location.bin),
                "aisle": location.aisle,
                "rack": location.rack,
                "shelf": location.shelf,
                "bin": location.bin,
                "category": location.category
            }))
            .unwrap())
        }
    }

    fn session(backend: &Arc<RecordingBackend>) -> PutAwaySession {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        PutAwaySession::new(
            PutAwayService::new(backend.clone(), None, logger.clone()),
            LocationDirectory::new(backend.clone(), 1000, 10, logger),
            Arc::new(Navigator::default()),
            None,
            10,
        )
    }

    async fn editing_purchase(backend: &Arc<RecordingBackend>) -> PutAwaySession {
        let mut session = session(backend);
        session.refresh().await.unwrap();
        session.select("p1").await.unwrap();
        backend.clear();
        session
    }

    #[rstest]
    #[case(QueueKind::PurchaseReceipt, Call::Purchases(1))]
    #[case(QueueKind::SalesReturn, Call::SalesReturns(1))]
    #[case(QueueKind::StockAdjustment, Call::StockAdjustments)]
    #[tokio::test]
    async fn switching_queue_resets_page_and_fetches_once(
        #[case] kind: QueueKind,
        #[case] expected: Call,
    ) {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = session(&backend);
        session.refresh().await.unwrap();
        session.go_to_page(3).await.unwrap();
        backend.clear();

        session.set_queue_kind(kind).await.unwrap();

        assert_eq!(session.pagination().page, 1);
        assert_eq!(backend.calls(), vec![expected]);
        assert_eq!(session.queue_kind(), kind);
    }

    #[tokio::test]
    async fn stock_adjustment_selection_yields_one_line() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = session(&backend);
        session
            .set_queue_kind(QueueKind::StockAdjustment)
            .await
            .unwrap();

        let lines = session.select("a1").await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].received_qty, 12);
        assert!(session.is_editing());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_list() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = session(&backend);
        session.refresh().await.unwrap();

        *backend.fail_fetch.lock().unwrap() = true;
        let err = session.go_to_page(2).await.unwrap_err();

        assert_eq!(err.kind(), crate::errors::ErrorKind::Network);
        assert_eq!(session.pagination().page, 1);
        assert_eq!(session.pending().items.len(), 1);
        assert_eq!(session.pending().items[0].id(), "p1");
    }

    #[tokio::test]
    async fn queue_and_filter_changes_are_refused_while_editing() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;

        assert_matches!(
            session.set_queue_kind(QueueKind::SalesReturn).await,
            Err(ServiceError::InvalidState(_))
        );
        assert_matches!(
            session.set_filter(PutAwayFilter::default()).await,
            Err(ServiceError::InvalidState(_))
        );
        assert!(backend.calls().is_empty());
        assert!(session.is_editing());
    }

    #[tokio::test]
    async fn bulk_csv_sets_rack_and_quantity_on_matching_lines() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;

        let csv = "Medicine Name,Quantity,Rack\n\
                   Amoxicillin 500mg,38,A1-R01-S1-B01\n\
                   Paracetamol 650mg,95,A1-R01-S1-B02\n";
        let report = session.apply_bulk_csv(csv.as_bytes()).await.unwrap();

        assert_eq!(report.matched, 2);
        let lines = session.lines();
        assert_eq!((lines[0].received_qty, lines[0].rack.as_str()), (38, "A1-R01-S1-B01"));
        assert_eq!((lines[1].received_qty, lines[1].rack.as_str()), (95, "A1-R01-S1-B02"));
    }

    #[tokio::test]
    async fn non_matching_csv_row_leaves_lines_untouched() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;
        let before = session.lines().to_vec();

        let csv = "Medicine Name,Quantity,Rack\nDoxycycline 100mg,5,Z9-R01-S1-B01\n";
        let report = session.apply_bulk_csv(csv.as_bytes()).await.unwrap();

        assert_eq!(report.matched, 0);
        assert_eq!(session.lines(), before.as_slice());
    }

    #[tokio::test]
    async fn malformed_csv_changes_no_line() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;
        let before = session.lines().to_vec();

        let csv = "Medicine Name,Quantity,Rack\n\
                   Amoxicillin 500mg,38,A1-R01-S1-B01\n\
                   Paracetamol 650mg,ninety,A1-R01-S1-B02\n";
        let result = session.apply_bulk_csv(csv.as_bytes()).await;

        assert_matches!(result, Err(ServiceError::CsvError(msg)) if msg.contains("invalid quantity"));
        assert_eq!(session.lines(), before.as_slice());
        assert!(session.is_editing());
    }

    #[tokio::test]
    async fn bulk_csv_is_refused_for_other_queues() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = session(&backend);
        session.set_queue_kind(QueueKind::SalesReturn).await.unwrap();
        session.select("r1").await.unwrap();

        let result = session
            .apply_bulk_csv("Name,Rack\nIbuprofen 400mg,A1\n".as_bytes())
            .await;
        assert_matches!(result, Err(ServiceError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn created_location_is_assigned_and_cached_once() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;

        session.begin_location_create(1).unwrap();
        let location = session
            .create_location(&NewLocation::new("B2", "R03", "S2", "B07", "General"))
            .await
            .unwrap();

        assert_eq!(location.location_code, "B2-R03-S2-B07");
        assert_eq!(session.lines()[1].rack, "B2-R03-S2-B07");
        assert_eq!(session.lines()[0].rack, "");
        assert_eq!(session.pending_location_target(), None);
        let cached = session
            .locations()
            .locations()
            .iter()
            .filter(|l| l.location_code == "B2-R03-S2-B07")
            .count();
        assert_eq!(cached, 1);
    }

    #[tokio::test]
    async fn invalid_location_form_sends_nothing_and_keeps_target() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;

        session.begin_location_create(0).unwrap();
        let err = session
            .create_location(&NewLocation::new("B2", "", "S2", "B07", "General"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::errors::ErrorKind::Validation);
        assert!(backend.calls().is_empty());
        assert_eq!(session.pending_location_target(), Some(0));
    }

    #[tokio::test]
    async fn purchase_commit_sends_every_line_once_and_returns_to_browsing() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;

        let changed = session.assign_all_unassigned("A1-R01-S1-B01").await.unwrap();
        assert_eq!(changed, 2);
        assert!(session.commit_plan().unwrap().is_fully_assigned());

        let outcome = session.commit().await.unwrap();

        let calls = backend.calls();
        let puts: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::PutPurchase(id, items) => Some((id.clone(), items.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "p1");
        assert_eq!(puts[0].1.len(), 2);
        assert!(puts[0].1.iter().all(|item| item.rack == "A1-R01-S1-B01"));

        assert_eq!(calls.last(), Some(&Call::Purchases(1)));
        assert_eq!(session.state(), &SessionState::Browsing);
        assert!(session.lines().is_empty());
        assert!(outcome.refresh_error.is_none());
    }

    #[tokio::test]
    async fn commit_failure_keeps_selection_and_edits() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;
        session.assign_location(0, "A1-R01-S1-B01").await.unwrap();
        *backend.reject_commit.lock().unwrap() = Some("Rack is required for all items".into());

        let plan = session.commit_plan().unwrap();
        assert_eq!(plan.unassigned, vec![1]);

        let err = session.commit().await.unwrap_err();

        assert_eq!(err.alert_message(), "Rack is required for all items");
        assert_eq!(session.selected().map(|s| s.id()), Some("p1"));
        assert_eq!(session.lines()[0].rack, "A1-R01-S1-B01");
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::Purchases(_))));
    }

    #[tokio::test]
    async fn refresh_failure_after_commit_is_reported_on_the_outcome() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = session(&backend);
        session.set_queue_kind(QueueKind::StockAdjustment).await.unwrap();
        session.select("a1").await.unwrap();
        session.assign_location(0, "C3-R02-S4-B01").await.unwrap();
        *backend.fail_fetch.lock().unwrap() = true;

        let outcome = session.commit().await.unwrap();

        assert!(outcome.refresh_error.is_some());
        assert!(!session.is_editing());
        assert!(backend.calls().contains(&Call::CompleteAdjustment(
            "a1".into(),
            "C3-R02-S4-B01".into()
        )));
    }

    #[tokio::test]
    async fn cancel_discards_the_selection() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = editing_purchase(&backend).await;

        assert!(session.cancel().await);
        assert!(!session.is_editing());
        assert!(!session.cancel().await);
        assert_matches!(session.commit_plan(), Err(ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn bulk_upload_posts_rows_and_reloads() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = session(&backend);

        let csv = "Invoice Number,SKU,Rack\nINV-1001,AMX-500,A1-R01-S1-B01\n,PCM-650,A1\n";
        let outcome = session.bulk_upload(csv.as_bytes()).await.unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.receipt.updated, Some(1));
        assert_eq!(backend.calls(), vec![Call::BulkUpload(1), Call::Purchases(1)]);
    }

    #[tokio::test]
    async fn open_inventory_navigates() {
        let backend = Arc::new(RecordingBackend::default());
        let navigator = Arc::new(Navigator::default());
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let session = PutAwaySession::new(
            PutAwayService::new(backend.clone(), None, logger.clone()),
            LocationDirectory::new(backend.clone(), 1000, 10, logger),
            navigator.clone(),
            None,
            10,
        );

        session.open_inventory();
        assert_eq!(navigator.current(), Route::InventoryList);
    }
}

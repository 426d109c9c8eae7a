// Spreadsheet edits
pub mod bulk_patch;

// Location autocomplete and registration
pub mod locations;

// Queue fetch and commit
pub mod putaway;

pub use bulk_patch::{BulkPatchReport, BulkPutAwayRow, BulkUploadPlan, PatchRow};
pub use locations::LocationDirectory;
pub use putaway::PutAwayService;

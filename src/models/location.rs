use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

/// A physical storage slot registered with the location registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub location_code: String,
    #[serde(default)]
    pub aisle: String,
    #[serde(default)]
    pub rack: String,
    #[serde(default)]
    pub shelf: String,
    #[serde(default)]
    pub bin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn matches(&self, query: &str) -> bool {
        self.location_code
            .to_lowercase()
            .contains(&query.trim().to_lowercase())
    }
}

/// Sub-form for registering a new location inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewLocation {
    #[validate(length(min = 1, message = "Aisle is required"))]
    pub aisle: String,
    #[validate(length(min = 1, message = "Rack is required"))]
    pub rack: String,
    #[validate(length(min = 1, message = "Shelf is required"))]
    pub shelf: String,
    #[validate(length(min = 1, message = "Bin is required"))]
    pub bin: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
}

impl NewLocation {
    pub fn new(
        aisle: impl Into<String>,
        rack: impl Into<String>,
        shelf: impl Into<String>,
        bin: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            aisle: aisle.into(),
            rack: rack.into(),
            shelf: shelf.into(),
            bin: bin.into(),
            category: category.into(),
        }
    }

    /// Whitespace-trimmed copy, so blank fields fail validation.
    pub fn normalized(&self) -> Self {
        Self {
            aisle: self.aisle.trim().to_string(),
            rack: self.rack.trim().to_string(),
            shelf: self.shelf.trim().to_string(),
            bin: self.bin.trim().to_string(),
            category: self.category.trim().to_string(),
        }
    }
}

/// Registry lookup; `search` is a substring on the location code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationQuery {
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl LocationQuery {
    pub fn all(page_size: u32) -> Self {
        Self {
            search: None,
            page: 1,
            page_size,
        }
    }

    pub fn search(term: impl Into<String>, page_size: u32) -> Self {
        Self {
            search: Some(term.into()),
            page: 1,
            page_size,
        }
    }

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(("search", term.to_string()));
        }
        params
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::{ensure_success, ApiClient};
use crate::{
    backend::LocationRegistry,
    errors::ServiceError,
    models::{Location, LocationQuery, NewLocation, Page},
};

#[derive(Debug, Deserialize)]
struct LocationsEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    location: Option<Location>,
}

#[async_trait]
impl LocationRegistry for ApiClient {
    #[instrument(skip(self))]
    async fn list_locations(&self, query: &LocationQuery) -> Result<Page<Location>, ServiceError> {
        let body: LocationsEnvelope = self.get_json(&["locations"], &query.to_query()).await?;
        ensure_success(body.success, body.message, "Failed to load locations")?;

        // Without counts, a full page means the registry may hold more.
        let full_page = body.locations.len() as u64 >= u64::from(query.page_size);
        let total_records = body.total.unwrap_or(body.locations.len() as u64);
        let total_pages = body.pages.unwrap_or(if body.total.is_none() && full_page {
            query.page + 1
        } else {
            query.page
        });
        Ok(Page {
            total_pages,
            total_records,
            page: query.page,
            page_size: query.page_size,
            items: body.locations,
        })
    }

    #[instrument(skip(self, location), fields(aisle = %location.aisle, rack = %location.rack))]
    async fn create_location(&self, location: &NewLocation) -> Result<Location, ServiceError> {
        let body: CreatedEnvelope = self.post_json(&["locations"], location).await?;
        ensure_success(body.success, body.message.clone(), "Failed to create location")?;
        body.location.ok_or_else(|| {
            ServiceError::SerializationError(
                body.message
                    .unwrap_or_else(|| "Location was created but not returned".to_string()),
            )
        })
    }
}

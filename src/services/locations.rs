use slog::Logger;
use std::sync::Arc;
use tracing::{debug, instrument};
use validator::Validate;

use crate::{
    backend::LocationRegistry,
    errors::ServiceError,
    models::{Location, LocationQuery, NewLocation},
};

/// Client-side cache of the location registry backing the autocomplete.
///
/// The cache is loaded with one large page. When the registry holds more
/// locations than that page, searches go to the registry instead of
/// filtering a partial list.
pub struct LocationDirectory {
    registry: Arc<dyn LocationRegistry>,
    cache: Vec<Location>,
    loaded: bool,
    complete: bool,
    page_size: u32,
    suggestion_limit: usize,
    logger: Logger,
}

impl LocationDirectory {
    pub fn new(
        registry: Arc<dyn LocationRegistry>,
        page_size: u32,
        suggestion_limit: usize,
        logger: Logger,
    ) -> Self {
        Self {
            registry,
            cache: Vec::new(),
            loaded: false,
            complete: false,
            page_size: page_size.max(1),
            suggestion_limit: suggestion_limit.max(1),
            logger,
        }
    }

    /// Loads (or reloads) the cache. Returns the number of cached locations.
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> Result<usize, ServiceError> {
        let page = self
            .registry
            .list_locations(&LocationQuery::all(self.page_size))
            .await?;

        self.cache.clear();
        let total = page.total_records;
        self.merge(page.items);
        self.complete = total <= self.cache.len() as u64 && page.total_pages <= page.page;
        self.loaded = true;

        if !self.complete {
            slog::info!(
                self.logger,
                "location cache truncated";
                "cached" => self.cache.len(),
                "total" => total,
            );
        }
        debug!(cached = self.cache.len(), complete = self.complete, "location cache loaded");
        Ok(self.cache.len())
    }

    pub async fn ensure_loaded(&mut self) -> Result<(), ServiceError> {
        if !self.loaded {
            self.load().await?;
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the cache holds the whole registry.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn locations(&self) -> &[Location] {
        &self.cache
    }

    pub fn contains(&self, code: &str) -> bool {
        self.cache.iter().any(|l| l.location_code == code)
    }

    /// Cached locations whose code contains `query`, case-insensitively.
    pub fn suggest(&self, query: &str) -> Vec<&Location> {
        self.cache
            .iter()
            .filter(|l| l.matches(query))
            .take(self.suggestion_limit)
            .collect()
    }

    /// Like [`suggest`](Self::suggest), but asks the registry when the cache
    /// is known to be partial. Remote hits are merged into the cache.
    #[instrument(skip(self))]
    pub async fn search(&mut self, query: &str) -> Result<Vec<Location>, ServiceError> {
        self.ensure_loaded().await?;
        if self.complete || query.trim().is_empty() {
            return Ok(self.suggest(query).into_iter().cloned().collect());
        }

        let page = self
            .registry
            .list_locations(&LocationQuery::search(query.trim(), self.page_size))
            .await?;
        let mut hits: Vec<Location> = page.items.into_iter().filter(|l| l.matches(query)).collect();
        hits.truncate(self.suggestion_limit);
        self.merge(hits.iter().cloned());
        Ok(hits)
    }

    /// Validates and registers a new location, adding it to the cache once.
    #[instrument(skip(self, form))]
    pub async fn create(&mut self, form: &NewLocation) -> Result<Location, ServiceError> {
        let form = form.normalized();
        form.validate()?;

        let location = self.registry.create_location(&form).await?;
        slog::info!(
            self.logger,
            "location created";
            "code" => &location.location_code,
            "category" => &form.category,
        );
        self.merge(std::iter::once(location.clone()));
        Ok(location)
    }

    fn merge(&mut self, locations: impl IntoIterator<Item = Location>) {
        for location in locations {
            if !self.contains(&location.location_code) {
                self.cache.push(location);
            }
        }
    }
}

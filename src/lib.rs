//! Pharmacy put-away client
//!
//! Drains the three pending put-away queues of the inventory backend
//! (purchase receipts, sales returns and stock adjustments): an operator
//! selects an entry, assigns a storage location to each line, optionally
//! patches lines from a spreadsheet and commits the entry live.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod backend;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod navigation;
pub mod services;
pub mod session;

use std::sync::Arc;

pub use client::ApiClient;
pub use errors::{ErrorKind, ServiceError, ServiceResult};
pub use session::{CommitOutcome, CommitPlan, PutAwaySession, SessionState};

/// Everything a front end needs to run put-away sessions against one backend.
#[derive(Clone)]
pub struct AppContext {
    pub config: config::AppConfig,
    pub client: ApiClient,
    pub navigator: Arc<navigation::Navigator>,
    pub event_sender: Option<events::EventSender>,
    pub logger: slog::Logger,
}

impl AppContext {
    pub fn new(
        config: config::AppConfig,
        tokens: Arc<dyn auth::TokenStore>,
        event_sender: Option<events::EventSender>,
        logger: slog::Logger,
    ) -> Result<Self, ServiceError> {
        let navigator = Arc::new(navigation::Navigator::default());
        let client = ApiClient::from_config(&config, tokens, navigator.clone())?;
        Ok(Self {
            config,
            client,
            navigator,
            event_sender,
            logger,
        })
    }

    pub fn putaway_service(&self) -> services::PutAwayService {
        services::PutAwayService::new(
            Arc::new(self.client.clone()),
            self.event_sender.clone(),
            self.logger.clone(),
        )
    }

    pub fn location_directory(&self) -> services::LocationDirectory {
        services::LocationDirectory::new(
            Arc::new(self.client.clone()),
            self.config.location_page_size,
            self.config.location_suggestion_limit,
            self.logger.clone(),
        )
    }

    /// A fresh session in the Browsing state; nothing is fetched yet.
    pub fn session(&self) -> PutAwaySession {
        PutAwaySession::new(
            self.putaway_service(),
            self.location_directory(),
            self.navigator.clone(),
            self.event_sender.clone(),
            self.config.default_page_size,
        )
    }
}

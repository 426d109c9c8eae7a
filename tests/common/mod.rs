#![allow(dead_code)]

use std::sync::Arc;

use pharmacy_putaway::{
    auth::{MemoryTokenStore, TokenStore},
    config::AppConfig,
    events::{self, Event},
    logging, AppContext, PutAwaySession,
};
use putaway_sandbox::SandboxState;
use tokio::{sync::mpsc, task::JoinHandle};

pub const TOKEN: &str = "integration-token";

/// A seeded sandbox backend plus a client context pointed at it.
pub struct TestApp {
    pub sandbox: SandboxState,
    pub context: AppContext,
    pub tokens: Arc<MemoryTokenStore>,
    pub events: mpsc::Receiver<Event>,
    server: JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_token(TOKEN).await
    }

    /// Starts the sandbox expecting `TOKEN`, while the client presents `client_token`.
    pub async fn with_token(client_token: &str) -> Self {
        let sandbox = SandboxState::seeded(TOKEN);
        let (addr, server) = putaway_sandbox::spawn(sandbox.clone())
            .await
            .expect("sandbox should bind");

        let config = AppConfig {
            api_base_url: format!("http://{}/api", addr),
            environment: "test".to_string(),
            default_page_size: 10,
            ..AppConfig::default()
        };
        let tokens = Arc::new(MemoryTokenStore::with_token(client_token));
        let (sender, events) = events::channel(64);
        let context = AppContext::new(
            config,
            tokens.clone() as Arc<dyn TokenStore>,
            Some(sender),
            logging::discard(),
        )
        .expect("context should build");

        Self {
            sandbox,
            context,
            tokens,
            events,
            server,
        }
    }

    /// A session with the purchase queue already loaded.
    pub async fn session(&self) -> PutAwaySession {
        let mut session = self.context.session();
        session.refresh().await.expect("initial queue load");
        session
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server.abort();
    }
}

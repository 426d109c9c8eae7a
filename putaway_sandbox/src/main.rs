use putaway_sandbox::{router, SandboxState};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_TOKEN: &str = "sandbox-token";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("putaway_sandbox=info,tower_http=info")),
        )
        .init();

    let addr: SocketAddr = std::env::var("PUTAWAY_SANDBOX_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    let token = std::env::var("PUTAWAY_SANDBOX_TOKEN").unwrap_or_else(|_| DEFAULT_TOKEN.to_string());

    let app = router(SandboxState::seeded(&token));

    info!("put-away sandbox on http://{}/api", addr);
    info!("  GET  /api/purchases");
    info!("  GET  /api/sales/returns");
    info!("  GET  /api/products/putaway/pending");
    info!("  GET  /api/locations");
    info!("  POST /api/locations");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

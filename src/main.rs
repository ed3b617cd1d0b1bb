use seo_scraper::{api::routes::create_router, config::Config, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("seo_scraper=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;
    info!(database = %config.database_path.display(), "Opening scrape store");
    if config.embedding.is_none() {
        warn!("No EMBEDDING_API_KEY or OPENROUTER_API_KEY set; comparisons will be unavailable");
    }

    // Create application state
    let app_state = AppState::from_config(config)?;

    // Build the router with routes
    let app = create_router(app_state);

    // Create the listener
    let listener = TcpListener::bind(server_addr).await?;

    // Start the server
    info!(%server_addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

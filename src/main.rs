// Aurify server - REST API plus the notification trigger endpoints

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aurify::{api::create_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aurify=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(legacy = ?config.legacy, "configuration loaded");

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;

    let app = create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, "Aurify server listening");
    info!("  GET    /health");
    info!("  POST   /sendFeedbackNotification, /sendSessionReminder, /dailyReminder");
    info!("  *      /api/v1/{{profiles,friend-requests,bookings,feed,coaching,...}}");

    axum::serve(listener, app).await?;

    Ok(())
}

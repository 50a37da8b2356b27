use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptfighter::{api, auth, imagegen, state::AppState, sweep, types::GameConfig, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptfighter=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Prompt Fighter server...");

    let admin_auth = Arc::new(auth::AdminAuthConfig::from_env());

    // Image generation + scoring are external collaborators; the game
    // works without them, players just can't generate through the server
    let image_config = imagegen::ImageGenConfig::from_env();
    let images = match image_config.build_pipeline() {
        Ok(pipeline) => {
            tracing::info!("Image pipeline initialized");
            Some(Arc::new(pipeline))
        }
        Err(e) => {
            tracing::warn!("Image pipeline unavailable: {}", e);
            None
        }
    };

    let state = Arc::new(AppState::new_with_images(images, GameConfig::from_env()));

    // Server-side sweeps: phase timeouts and idle-room reaping both run
    // independently of any client connection
    sweep::spawn_phase_timeout_sweep(state.clone());
    sweep::spawn_idle_reaper(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/cleanup", post(api::trigger_cleanup))
        .layer(middleware::from_fn_with_state(
            admin_auth.clone(),
            auth::admin_auth_middleware,
        ));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/rooms", get(api::list_rooms))
        .route("/api/rooms/{id}", get(api::get_room))
        .route("/api/rooms/{id}/session", get(api::get_session))
        .route("/api/rooms/{id}/submissions", get(api::get_submissions))
        .route("/api/rooms/{id}/progress", get(api::get_progress))
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8470);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

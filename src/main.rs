use std::panic;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use chapter_collab::config::Config;
use chapter_collab::docs::ApiDoc;
use chapter_collab::routes::create_api_routes;
use chapter_collab::store::NullStore;
use chapter_collab::ws::{handler::websocket_handler, CollabHub};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "chapter_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // The hub owns the session table; its lifecycle is the process
    // lifecycle. The durable Document Store is an external collaborator;
    // without one wired in, sessions start with an empty history buffer.
    let hub = Arc::new(CollabHub::new(config.history_capacity, Arc::new(NullStore)));
    warn!("No document store configured - sessions start without seeded history");

    // Create API routes
    let api_routes = create_api_routes(hub.clone());

    // Combine all routes
    let app_routes = Router::new()
        // Collaboration socket
        .route("/ws", get(websocket_handler))
        .with_state(hub)
        // Mount API routes
        .nest("/api", api_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 Collaboration socket at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}

fn cors_layer(config: &Config) -> CorsLayer {
    match config
        .cors_origins
        .as_deref()
        .and_then(|origins| origins.parse::<axum::http::HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new().allow_origin(origin),
        None => CorsLayer::permissive(),
    }
}

//! API Routes
//!
//! Configures the Axum router with all feed service endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_feed_handler, fetch_feed_handler, get_feed_handler, health_handler, next_page_handler,
    put_feed_handler, refresh_feed_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /feeds/:stream` - Register a stream or change its query
/// - `GET /feeds/:stream` - Current state of a stream
/// - `DELETE /feeds/:stream` - Unregister a stream
/// - `POST /feeds/:stream/fetch` - Serve from cache or load the first page
/// - `POST /feeds/:stream/next` - Append the next page
/// - `POST /feeds/:stream/refresh` - Drop cached data and reload
/// - `GET /stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/feeds/:stream",
            get(get_feed_handler)
                .put(put_feed_handler)
                .delete(delete_feed_handler),
        )
        .route("/feeds/:stream/fetch", post(fetch_feed_handler))
        .route("/feeds/:stream/next", post(next_page_handler))
        .route("/feeds/:stream/refresh", post(refresh_feed_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

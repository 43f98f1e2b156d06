//! API Module
//!
//! HTTP handlers and routing for the feed service REST API.
//!
//! # Endpoints
//! - `PUT /feeds/:stream` - Register a stream or change its query
//! - `GET /feeds/:stream` - Current state of a stream
//! - `DELETE /feeds/:stream` - Unregister a stream
//! - `POST /feeds/:stream/fetch` - Initial fetch
//! - `POST /feeds/:stream/next` - Next page
//! - `POST /feeds/:stream/refresh` - Refresh
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

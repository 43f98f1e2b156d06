//! Request and Response models for the feed API
//!
//! This module defines the catalog item payload and the DTOs (Data Transfer
//! Objects) used for serializing/deserializing HTTP request and response bodies.

pub mod catalog;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use catalog::CatalogItem;
pub use requests::FeedQueryRequest;
pub use responses::{ErrorResponse, FeedResponse, HealthResponse, StatsResponse};

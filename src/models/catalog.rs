//! Catalog item payload
//!
//! The unit a feed pages through and caches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a catalog listing.
///
/// Only `id` and `name` are interpreted; every other upstream field is kept
/// verbatim in `attributes` so cached sets round-trip without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: u64,
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl CatalogItem {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: Map::new(),
        }
    }
}

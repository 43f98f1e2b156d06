//! Request DTOs for the feed API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::feed::QuerySignature;

/// Maximum length of a category name in bytes
const MAX_CATEGORY_LENGTH: usize = 64;

const KEY_SEPARATOR: char = '|';

/// Request body for selecting a feed's query (PUT /feeds/:stream)
///
/// # Fields
/// - `category`: The catalog category to list
/// - `genres`: Genre filters, combined as a union
/// - `platforms`: Platform filters, combined as a union
/// - `search`: Optional free-text search
#[derive(Debug, Clone, Deserialize)]
pub struct FeedQueryRequest {
    pub category: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl FeedQueryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.category.trim().is_empty() {
            return Some("Category cannot be empty".to_string());
        }
        if self.category.len() > MAX_CATEGORY_LENGTH {
            return Some(format!(
                "Category exceeds maximum length of {} characters",
                MAX_CATEGORY_LENGTH
            ));
        }
        // `|` separates the parts of a cache key and `,` the filters within one
        if self.category.contains(KEY_SEPARATOR) {
            return Some(format!("Category must not contain '{}'", KEY_SEPARATOR));
        }
        if self
            .genres
            .iter()
            .chain(&self.platforms)
            .any(|f| f.trim().is_empty() || f.contains(',') || f.contains(KEY_SEPARATOR))
        {
            return Some(format!(
                "Filters must be non-empty and must not contain ',' or '{}'",
                KEY_SEPARATOR
            ));
        }
        None
    }

    /// Builds the query signature this request describes.
    pub fn to_signature(&self) -> QuerySignature {
        let signature = QuerySignature::new(self.category.trim())
            .with_genres(self.genres.iter().map(|g| g.trim()))
            .with_platforms(self.platforms.iter().map(|p| p.trim()));
        match &self.search {
            Some(search) => signature.with_search(search.as_str()),
            None => signature,
        }
    }
}

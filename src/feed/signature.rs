//! Query Signature Module
//!
//! Identifies one logical result stream and the freshness of a request for it.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

// == Query Signature ==
/// Category plus active filters plus a freshness nonce.
///
/// Two signatures are equal only if their nonces match too, which is how an
/// in-flight fetch notices it has been superseded by a refresh. The cache key
/// ignores the nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySignature {
    pub category: String,
    pub genres: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
    pub search: Option<String>,
    nonce: DateTime<Utc>,
}

impl QuerySignature {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            genres: BTreeSet::new(),
            platforms: BTreeSet::new(),
            search: None,
            nonce: Utc::now(),
        }
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the search text. Blank text means no search.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn nonce(&self) -> DateTime<Utc> {
        self.nonce
    }

    /// Stamps a new nonce, strictly later than the previous one.
    pub fn restamp(&mut self) {
        let now = Utc::now();
        self.nonce = if now > self.nonce {
            now
        } else {
            self.nonce + Duration::nanoseconds(1)
        };
    }

    /// Compares category and filters, ignoring the nonce.
    pub fn same_query(&self, other: &Self) -> bool {
        self.category == other.category
            && self.genres == other.genres
            && self.platforms == other.platforms
            && self.search == other.search
    }

    /// Key under which the full result set for this query is cached.
    ///
    /// Distinct queries get distinct keys as long as the category and filters
    /// contain no `|` and the filters no `,`; request validation rejects both.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|g:{}|p:{}|s:{}",
            self.category,
            join(&self.genres),
            join(&self.platforms),
            self.search.as_deref().unwrap_or("")
        )
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

//! Page Source Module
//!
//! The upstream that pages are fetched from.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;
use crate::feed::QuerySignature;

// == Page Source ==
/// Fetches one page of items for a query.
///
/// Pages are numbered from 1.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(
        &self,
        query: &QuerySignature,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<T>, FetchError>;
}

/// Body of an upstream page response.
#[derive(Debug, Deserialize)]
struct PageEnvelope<T> {
    results: Vec<T>,
}

// == HTTP Page Source ==
/// Fetches pages from a JSON HTTP endpoint.
///
/// The query is sent as `page`, `page_size`, `category` and, when set,
/// `genres`, `platforms` (comma separated), `search` and `key` parameters.
/// The response must be an object with a `results` array.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPageSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.upstream_url.clone(),
            config.upstream_api_key.clone(),
            Duration::from_secs(config.request_timeout),
        )
    }

    fn query_params(&self, query: &QuerySignature, page: u32, page_size: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
            ("category", query.category.clone()),
        ];
        if !query.genres.is_empty() {
            params.push(("genres", comma_join(query.genres.iter())));
        }
        if !query.platforms.is_empty() {
            params.push(("platforms", comma_join(query.platforms.iter())));
        }
        if let Some(search) = &query.search {
            params.push(("search", search.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }
        params
    }
}

fn comma_join<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values.map(String::as_str).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl<T> PageSource<T> for HttpPageSource
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(
        &self,
        query: &QuerySignature,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<T>, FetchError> {
        debug!(url = %self.base_url, page, page_size, category = %query.category, "fetching page");

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(query, page, page_size))
            .send()
            .await?
            .error_for_status()?;

        let envelope: PageEnvelope<T> = response.json().await?;
        Ok(envelope.results)
    }
}

//! API Handlers
//!
//! HTTP request handlers for each feed service endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::ExpiringCache;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::feed::{FeedController, FetchState, HttpPageSource, PageSource};
use crate::models::{CatalogItem, FeedQueryRequest, FeedResponse, HealthResponse, StatsResponse};
use crate::paging::PageSequencer;

type Feed = FeedController<CatalogItem>;

/// Application state shared across all handlers.
///
/// Every stream shares the same disk cache and upstream; each has its own
/// controller and page sequencer.
#[derive(Clone)]
pub struct AppState {
    /// Registered streams by name
    pub feeds: Arc<RwLock<HashMap<String, Arc<Feed>>>>,
    /// Shared expiring disk cache
    pub cache: ExpiringCache,
    /// Upstream catalog
    pub source: Arc<dyn PageSource<CatalogItem>>,
    /// Page size for new streams
    pub items_per_page: u32,
    /// Page ceiling for new streams
    pub max_page_limit: u32,
}

impl AppState {
    /// Creates a new AppState with the given cache and upstream.
    pub fn new(
        cache: ExpiringCache,
        source: Arc<dyn PageSource<CatalogItem>>,
        items_per_page: u32,
        max_page_limit: u32,
    ) -> Self {
        Self {
            feeds: Arc::new(RwLock::new(HashMap::new())),
            cache,
            source,
            items_per_page,
            max_page_limit,
        }
    }

    /// Creates a new AppState from configuration, talking to the configured
    /// HTTP upstream.
    pub fn from_config(config: &Config) -> std::result::Result<Self, reqwest::Error> {
        let source = HttpPageSource::from_config(config)?;
        Ok(Self::new(
            ExpiringCache::from_config(config),
            Arc::new(source),
            config.items_per_page,
            config.max_page_limit,
        ))
    }

    async fn feed(&self, stream: &str) -> Result<Arc<Feed>> {
        self.feeds
            .read()
            .await
            .get(stream)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(stream.to_string()))
    }
}

fn feed_response(feed: &Feed) -> FeedResponse<CatalogItem> {
    FeedResponse::new(
        feed.name(),
        feed.query(),
        &feed.state(),
        feed.progress(),
        feed.has_reached_end(),
    )
}

/// Runs a controller operation on its own task.
///
/// The operation's token is cancelled when the returned future is dropped,
/// so a client that hangs up abandons the fetch instead of leaving it to
/// publish into a screen nobody is watching.
async fn run_detached<F, Fut>(feed: Arc<Feed>, op: F) -> Result<()>
where
    F: FnOnce(Arc<Feed>, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    tokio::spawn(op(feed, cancel))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// An initial load that failed has nothing to show and is reported as an
/// upstream error; every other state is returned as is.
fn initial_load_response(feed: &Feed) -> Result<Json<FeedResponse<CatalogItem>>> {
    match feed.state() {
        FetchState::Failure { error, items } if items.is_empty() => Err(ApiError::Fetch(error)),
        _ => Ok(Json(feed_response(feed))),
    }
}

/// Handler for PUT /feeds/:stream
///
/// Registers the stream or switches it to a new query.
pub async fn put_feed_handler(
    State(state): State<AppState>,
    Path(stream): Path<String>,
    Json(req): Json<FeedQueryRequest>,
) -> Result<Json<FeedResponse<CatalogItem>>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    let query = req.to_signature();

    let mut feeds = state.feeds.write().await;
    let feed = match feeds.get(&stream) {
        Some(feed) => {
            feed.set_query(query);
            Arc::clone(feed)
        }
        None => {
            info!(stream = %stream, key = %query.cache_key(), "registering feed");
            let feed = Arc::new(FeedController::new(
                stream.clone(),
                query,
                Arc::clone(&state.source),
                state.cache.clone(),
                PageSequencer::new(state.items_per_page, state.max_page_limit),
            ));
            feeds.insert(stream, Arc::clone(&feed));
            feed
        }
    };

    Ok(Json(feed_response(&feed)))
}

/// Handler for GET /feeds/:stream
pub async fn get_feed_handler(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<Json<FeedResponse<CatalogItem>>> {
    let feed = state.feed(&stream).await?;
    Ok(Json(feed_response(&feed)))
}

/// Handler for POST /feeds/:stream/fetch
///
/// Serves the cached result set or loads the first page.
pub async fn fetch_feed_handler(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<Json<FeedResponse<CatalogItem>>> {
    let feed = state.feed(&stream).await?;
    run_detached(Arc::clone(&feed), |feed, cancel| async move {
        feed.fetch_initial(&cancel).await
    })
    .await?;
    initial_load_response(&feed)
}

/// Handler for POST /feeds/:stream/next
///
/// Appends the next page. A failure keeps the loaded items and is reported
/// through the `failure` status rather than an error code.
pub async fn next_page_handler(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<Json<FeedResponse<CatalogItem>>> {
    let feed = state.feed(&stream).await?;
    run_detached(Arc::clone(&feed), |feed, cancel| async move {
        feed.fetch_next_page(&cancel).await
    })
    .await?;
    Ok(Json(feed_response(&feed)))
}

/// Handler for POST /feeds/:stream/refresh
///
/// Drops the cached set and paging progress, then loads the first page again.
pub async fn refresh_feed_handler(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<Json<FeedResponse<CatalogItem>>> {
    let feed = state.feed(&stream).await?;
    run_detached(Arc::clone(&feed), |feed, cancel| async move {
        feed.refresh().await;
        feed.fetch_initial(&cancel).await
    })
    .await?;
    initial_load_response(&feed)
}

/// Handler for DELETE /feeds/:stream
///
/// Unregisters the stream. Its cached result set stays until it expires.
pub async fn delete_feed_handler(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<StatusCode> {
    state
        .feeds
        .write()
        .await
        .remove(&stream)
        .ok_or(ApiError::NotFound(stream))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.snapshot_stats().await;
    let streams = state.feeds.read().await.len();
    Json(StatsResponse::new(&stats, streams))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

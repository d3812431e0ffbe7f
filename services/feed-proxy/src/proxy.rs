//! Feed orchestration
//!
//! Decides per request whether to serve the cached listing or fetch a fresh
//! one, and degrades to the previous listing when the fetch fails:
//!
//! | cache        | force | upstream | response                               |
//! |--------------|-------|----------|----------------------------------------|
//! | fresh        | no    | -        | cached listing, `cached: true`         |
//! | any          | any   | ok       | new listing, `cached: false`           |
//! | has entry    | any   | fails    | old listing, `cached: true, stale: true` |
//! | empty        | any   | fails    | 500 `Failed to fetch posts`            |
//!
//! Concurrent refreshes are not de-duplicated; the last successful fetch wins.

use std::sync::Arc;
use std::time::Instant;

use instagram_auth::CredentialStore;
use instagram_graph::{GraphClient, Post};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::cache::ResultCache;
use crate::error::Error;
use crate::metrics::{self, Outcome};

/// `error` field of a stale response
pub const STALE_MESSAGE: &str = "Using cached data due to API error";

/// Shared state passed to the feed handlers via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub graph: GraphClient,
    pub credentials: Arc<CredentialStore>,
    pub cache: Arc<ResultCache>,
    pub post_limit: u32,
}

/// Body of `GET /api/instagram`.
#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub data: Vec<Post>,
    pub count: usize,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedResponse {
    fn new(data: Vec<Post>, cached: bool) -> Self {
        Self {
            count: data.len(),
            data,
            cached,
            stale: None,
            error: None,
        }
    }

    fn stale(data: Vec<Post>) -> Self {
        Self {
            stale: Some(true),
            error: Some(STALE_MESSAGE.to_string()),
            ..Self::new(data, true)
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub message: &'static str,
    pub cache_status: &'static str,
    pub token_status: &'static str,
}

/// Serve the feed, fetching from upstream when the cache is stale or `force` is set.
#[instrument(skip_all, fields(request_id = %request_id, force = force))]
pub async fn fetch_feed(
    state: &ProxyState,
    force: bool,
    request_id: String,
) -> Result<FeedResponse, Error> {
    if !force {
        if let Some(entry) = state.cache.get_fresh().await {
            info!(count = entry.posts.len(), "serving cached feed");
            metrics::record_feed_request(Outcome::Cached);
            return Ok(FeedResponse::new(entry.posts, true));
        }
    }

    info!("fetching fresh feed");
    let token = state.credentials.token().await;
    let started = Instant::now();
    let result = state.graph.list_posts(&token, state.post_limit).await;
    metrics::record_upstream_duration(started.elapsed().as_secs_f64());

    match result {
        Ok(posts) => {
            state.cache.put(posts.clone()).await;
            info!(count = posts.len(), "fetched fresh feed");
            metrics::record_feed_request(Outcome::Fresh);
            Ok(FeedResponse::new(posts, false))
        }
        Err(e) => {
            error!(error = %e, "failed to fetch feed");
            metrics::record_upstream_error(e.kind());

            match state.cache.get().await {
                Some(entry) => {
                    warn!(count = entry.posts.len(), "serving stale feed");
                    metrics::record_feed_request(Outcome::Stale);
                    Ok(FeedResponse::stale(entry.posts))
                }
                None => {
                    metrics::record_feed_request(Outcome::Error);
                    Err(Error::FeedUnavailable(e))
                }
            }
        }
    }
}

/// Drop the cached listing. The token is left untouched.
pub async fn clear_cache(state: &ProxyState) {
    state.cache.clear().await;
    info!("cache cleared");
}

pub async fn health(state: &ProxyState) -> HealthReport {
    HealthReport {
        status: "ok",
        message: "Server is running",
        cache_status: if state.cache.is_fresh().await {
            "valid"
        } else {
            "empty/expired"
        },
        token_status: if state.credentials.has_token().await {
            "loaded"
        } else {
            "missing"
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CACHE_TTL;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock `/me/media` whose status and body can be switched mid-test.
    struct MockListing {
        response: Mutex<(StatusCode, String)>,
        calls: AtomicUsize,
    }

    impl MockListing {
        fn set(&self, status: StatusCode, body: String) {
            *self.response.lock().unwrap() = (status, body);
        }
    }

    fn listing(ids: &[&str]) -> String {
        let items: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "media_type": "IMAGE",
                    "media_url": format!("https://cdn/{id}.jpg"),
                    "permalink": format!("https://instagram.com/p/{id}"),
                    "timestamp": "2025-01-15T10:30:00+0000",
                    "username": "detailer",
                })
            })
            .collect();
        serde_json::json!({ "data": items }).to_string()
    }

    async fn start_mock(ids: &[&str]) -> (String, Arc<MockListing>) {
        let mock = Arc::new(MockListing {
            response: Mutex::new((StatusCode::OK, listing(ids))),
            calls: AtomicUsize::new(0),
        });
        let handler_mock = mock.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = axum::Router::new().route(
            "/me/media",
            axum::routing::get(move || {
                let mock = handler_mock.clone();
                async move {
                    mock.calls.fetch_add(1, Ordering::SeqCst);
                    mock.response.lock().unwrap().clone()
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (url, mock)
    }

    async fn test_state(dir: &tempfile::TempDir, graph_url: &str) -> ProxyState {
        let credentials = CredentialStore::load(dir.path().join("token.json"), Some("tok"))
            .await
            .unwrap();
        ProxyState {
            graph: GraphClient::new(reqwest::Client::new(), graph_url),
            credentials: Arc::new(credentials),
            cache: Arc::new(ResultCache::new(CACHE_TTL)),
            post_limit: 12,
        }
    }

    fn ids(response: &FeedResponse) -> Vec<&str> {
        response.data.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn first_request_fetches_then_serves_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mock) = start_mock(&["1", "2"]).await;
        let state = test_state(&dir, &url).await;

        let first = fetch_feed(&state, false, "req_1".into()).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.count, 2);
        assert_eq!(ids(&first), ["1", "2"]);

        let second = fetch_feed(&state, false, "req_2".into()).await.unwrap();
        assert!(second.cached);
        assert!(second.stale.is_none());
        assert_eq!(ids(&second), ["1", "2"]);

        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_bypasses_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mock) = start_mock(&["1"]).await;
        let state = test_state(&dir, &url).await;

        fetch_feed(&state, false, "req_1".into()).await.unwrap();
        mock.set(StatusCode::OK, listing(&["2", "3"]));

        let forced = fetch_feed(&state, true, "req_2".into()).await.unwrap();
        assert!(!forced.cached);
        assert_eq!(ids(&forced), ["2", "3"]);
        assert_eq!(mock.calls.load(Ordering::SeqCst), 2);

        // Forced result replaced the cache
        assert_eq!(state.cache.get().await.unwrap().posts.len(), 2);
    }

    #[tokio::test]
    async fn failure_with_cache_serves_stale_data() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mock) = start_mock(&["1", "2"]).await;
        let state = test_state(&dir, &url).await;

        let fresh = fetch_feed(&state, false, "req_1".into()).await.unwrap();
        mock.set(
            StatusCode::BAD_REQUEST,
            String::from(r#"{"error":{"type":"OAuthException"}}"#),
        );

        let stale = fetch_feed(&state, true, "req_2".into()).await.unwrap();
        assert!(stale.cached);
        assert_eq!(stale.stale, Some(true));
        assert_eq!(stale.error.as_deref(), Some(STALE_MESSAGE));
        assert_eq!(stale.data, fresh.data);
        assert_eq!(stale.count, 2);
    }

    #[tokio::test]
    async fn failure_without_cache_is_feed_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mock) = start_mock(&[]).await;
        mock.set(StatusCode::INTERNAL_SERVER_ERROR, String::from("down"));
        let state = test_state(&dir, &url).await;

        let err = fetch_feed(&state, false, "req_1".into()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::FeedUnavailable(instagram_graph::Error::Upstream { status: 500, .. })
        ));
        assert!(state.cache.get().await.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mock) = start_mock(&["1"]).await;
        let state = test_state(&dir, &url).await;

        fetch_feed(&state, false, "req_1".into()).await.unwrap();
        let before = state.cache.get().await.unwrap();
        mock.set(StatusCode::INTERNAL_SERVER_ERROR, String::from("down"));

        fetch_feed(&state, true, "req_2".into()).await.unwrap();
        let after = state.cache.get().await.unwrap();
        assert_eq!(after.posts, before.posts);
        assert_eq!(after.fetched_at, before.fetched_at);
    }

    #[tokio::test]
    async fn clear_then_fetch_goes_upstream_once() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mock) = start_mock(&["1"]).await;
        let state = test_state(&dir, &url).await;

        fetch_feed(&state, false, "req_1".into()).await.unwrap();
        clear_cache(&state).await;
        assert!(state.cache.get().await.is_none());
        assert_eq!(state.credentials.token().await, "tok");

        let response = fetch_feed(&state, false, "req_2".into()).await.unwrap();
        assert!(!response.cached);
        assert_eq!(mock.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn health_reflects_cache_state() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _mock) = start_mock(&["1"]).await;
        let state = test_state(&dir, &url).await;

        let report = health(&state).await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.cache_status, "empty/expired");
        assert_eq!(report.token_status, "loaded");

        fetch_feed(&state, false, "req_1".into()).await.unwrap();
        assert_eq!(health(&state).await.cache_status, "valid");
    }

    #[test]
    fn feed_response_omits_stale_fields_when_fresh() {
        let json = serde_json::to_value(FeedResponse::new(Vec::new(), false)).unwrap();
        assert_eq!(json, serde_json::json!({ "data": [], "count": 0, "cached": false }));

        let json = serde_json::to_value(FeedResponse::stale(Vec::new())).unwrap();
        assert_eq!(json["stale"], true);
        assert_eq!(json["cached"], true);
        assert_eq!(json["error"], STALE_MESSAGE);
    }
}

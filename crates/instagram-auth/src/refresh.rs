//! Scheduled token renewal
//!
//! A long-lived token is renewed once it is older than the configured interval
//! minus `REFRESH_MARGIN_DAYS`. A failed renewal never loses the token: the
//! previous one keeps being served until the next scheduled attempt.

use std::sync::Arc;
use std::time::Duration;

use common::{MILLIS_PER_DAY, unix_millis};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::constants::REFRESH_MARGIN_DAYS;
use crate::credentials::CredentialStore;
use crate::token::refresh_access_token;

/// Whether a token last renewed at `last_refresh_at` is due at `now`.
///
/// Both timestamps are unix milliseconds. Due when forced, or when more than
/// `interval_days - REFRESH_MARGIN_DAYS` days have elapsed.
pub fn needs_refresh(force: bool, last_refresh_at: u64, now: u64, interval_days: u64) -> bool {
    if force {
        return true;
    }
    let threshold = interval_days
        .saturating_sub(REFRESH_MARGIN_DAYS)
        .saturating_mul(MILLIS_PER_DAY);
    now.saturating_sub(last_refresh_at) > threshold
}

/// Renews the token held by a `CredentialStore`.
pub struct TokenRefresher {
    store: Arc<CredentialStore>,
    client: reqwest::Client,
    graph_url: String,
    interval_days: u64,
}

impl TokenRefresher {
    pub fn new(
        store: Arc<CredentialStore>,
        client: reqwest::Client,
        graph_url: String,
        interval_days: u64,
    ) -> Self {
        Self {
            store,
            client,
            graph_url,
            interval_days,
        }
    }

    /// Scheduling period: the configured interval.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.interval_days.max(1).saturating_mul(MILLIS_PER_DAY))
    }

    /// Run one refresh pass and return the token to use from now on.
    ///
    /// Returns the current token untouched when no renewal is due. When the
    /// exchange fails the token from before the attempt is returned.
    pub async fn refresh(&self, force: bool) -> String {
        let record = self.store.current().await;

        if !needs_refresh(force, record.last_refresh_at, unix_millis(), self.interval_days) {
            debug!(
                last_refresh_at = record.last_refresh_at,
                "token not due for refresh"
            );
            metrics::counter!("token_refresh_total", "result" => "skipped").increment(1);
            return record.token;
        }

        match refresh_access_token(&self.client, &self.graph_url, &record.token).await {
            Ok(response) => {
                self.store
                    .save(response.access_token.clone(), unix_millis())
                    .await;
                info!(expires_in = ?response.expires_in, "token refreshed");
                metrics::counter!("token_refresh_total", "result" => "refreshed").increment(1);
                response.access_token
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "token refresh failed, keeping previous token");
                metrics::counter!("token_refresh_total", "result" => "failed").increment(1);
                record.token
            }
        }
    }
}

/// Spawn the recurring refresh task.
///
/// The first pass runs immediately (startup check), then every `period`.
/// Failures are logged by `refresh` and retried on the next tick. Abort the
/// returned handle to stop the task.
pub fn spawn_refresh_task(
    refresher: Arc<TokenRefresher>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            refresher.refresh(false).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TokenRecord;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY: u64 = MILLIS_PER_DAY;

    /// Mock refresh endpoint. The first `failures` calls return 500, later
    /// calls return `new_token`.
    async fn start_refresh_server(failures: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = axum::Router::new().route(
            "/refresh_access_token",
            axum::routing::get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (StatusCode::INTERNAL_SERVER_ERROR, String::from("unavailable"))
                    } else {
                        (
                            StatusCode::OK,
                            String::from(r#"{"access_token":"new_token","expires_in":5183944}"#),
                        )
                    }
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (url, calls)
    }

    async fn store_with(
        dir: &tempfile::TempDir,
        last_refresh_at: u64,
    ) -> Arc<CredentialStore> {
        let path = dir.path().join("token.json");
        if last_refresh_at > 0 {
            let record = TokenRecord {
                token: "old_token".into(),
                last_refresh_at,
            };
            std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();
        }
        Arc::new(CredentialStore::load(path, Some("old_token")).await.unwrap())
    }

    #[test]
    fn margin_renews_before_interval() {
        let now = 100 * DAY;
        assert!(needs_refresh(false, now - 26 * DAY, now, 30));
        assert!(!needs_refresh(false, now - 20 * DAY, now, 30));
    }

    #[test]
    fn boundary_is_exclusive() {
        let now = 100 * DAY;
        assert!(!needs_refresh(false, now - 25 * DAY, now, 30));
        assert!(needs_refresh(false, now - 25 * DAY - 1, now, 30));
    }

    #[test]
    fn force_always_refreshes() {
        let now = 100 * DAY;
        assert!(needs_refresh(true, now, now, 30));
    }

    #[test]
    fn never_refreshed_is_due() {
        assert!(needs_refresh(false, 0, 100 * DAY, 30));
    }

    #[test]
    fn short_interval_is_due_after_any_elapsed_time() {
        let now = 100 * DAY;
        assert!(needs_refresh(false, now - 1, now, 3));
        assert!(!needs_refresh(false, now, now, 3));
    }

    #[test]
    fn huge_interval_saturates_instead_of_overflowing() {
        let now = 100 * DAY;
        assert!(!needs_refresh(false, 0, now, 300_000_000_000));
        assert!(!needs_refresh(false, 0, u64::MAX, u64::MAX));
        assert!(needs_refresh(true, 0, now, u64::MAX));
    }

    #[tokio::test]
    async fn period_saturates_for_huge_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, 0).await;
        let refresher = TokenRefresher::new(
            store,
            reqwest::Client::new(),
            "http://unused".into(),
            300_000_000_000,
        );
        assert_eq!(refresher.period(), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn period_matches_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, 0).await;
        let refresher =
            TokenRefresher::new(store, reqwest::Client::new(), "http://unused".into(), 30);
        assert_eq!(refresher.period(), Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[tokio::test]
    async fn recent_token_is_returned_without_upstream_call() {
        let dir = tempfile::tempdir().unwrap();
        let (url, calls) = start_refresh_server(0).await;
        let store = store_with(&dir, unix_millis() - 20 * DAY).await;
        let refresher = TokenRefresher::new(store.clone(), reqwest::Client::new(), url, 30);

        assert_eq!(refresher.refresh(false).await, "old_token");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn due_token_is_exchanged_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (url, calls) = start_refresh_server(0).await;
        let store = store_with(&dir, unix_millis() - 26 * DAY).await;
        let refresher = TokenRefresher::new(store.clone(), reqwest::Client::new(), url, 30);

        let before = unix_millis();
        assert_eq!(refresher.refresh(false).await, "new_token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let record = store.current().await;
        assert_eq!(record.token, "new_token");
        assert!(record.last_refresh_at >= before);

        let on_disk: TokenRecord =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, record);
    }

    #[tokio::test]
    async fn forced_refresh_ignores_interval() {
        let dir = tempfile::tempdir().unwrap();
        let (url, calls) = start_refresh_server(0).await;
        let store = store_with(&dir, unix_millis()).await;
        let refresher = TokenRefresher::new(store, reqwest::Client::new(), url, 30);

        assert_eq!(refresher.refresh(true).await, "new_token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_exchange_returns_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let (url, calls) = start_refresh_server(usize::MAX).await;
        let store = store_with(&dir, 0).await;
        let refresher = TokenRefresher::new(store.clone(), reqwest::Client::new(), url, 30);

        assert_eq!(refresher.refresh(false).await, "old_token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current().await, TokenRecord::unrefreshed("old_token"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_returns_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, 0).await;
        let refresher = TokenRefresher::new(
            store,
            reqwest::Client::new(),
            "http://127.0.0.1:1".into(),
            30,
        );

        assert_eq!(refresher.refresh(true).await, "old_token");
    }

    #[tokio::test]
    async fn scheduled_task_runs_immediately_and_retries_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        // First attempt fails, second succeeds
        let (url, calls) = start_refresh_server(1).await;
        let store = store_with(&dir, 0).await;
        let refresher = Arc::new(TokenRefresher::new(
            store.clone(),
            reqwest::Client::new(),
            url,
            30,
        ));

        let handle = spawn_refresh_task(refresher, Duration::from_millis(50));

        let renewed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.token().await == "new_token" {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        handle.abort();

        assert!(renewed.is_ok(), "scheduled task never renewed the token");
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn aborted_task_stops() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, unix_millis()).await;
        let refresher = Arc::new(TokenRefresher::new(
            store,
            reqwest::Client::new(),
            "http://127.0.0.1:1".into(),
            30,
        ));

        let handle = spawn_refresh_task(refresher, Duration::from_secs(3600));
        handle.abort();
        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}

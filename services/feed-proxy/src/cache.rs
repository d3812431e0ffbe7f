//! In-memory cache of the latest listing
//!
//! Holds at most one entry: the posts of the last successful upstream fetch
//! and when they were fetched. Entries are only ever replaced whole.
//!
//! Uses `tokio::time::Instant` so TTL behaviour can be tested with a paused clock.

use std::time::Duration;

use instagram_graph::Post;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// How long a fetched listing is served without asking upstream again
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// A cached listing. Posts and fetch time only exist together.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub posts: Vec<Post>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        Instant::now().saturating_duration_since(self.fetched_at) < ttl
    }
}

pub struct ResultCache {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// True iff an entry exists and is younger than the TTL.
    pub async fn is_fresh(&self) -> bool {
        self.entry
            .read()
            .await
            .as_ref()
            .is_some_and(|e| e.is_fresh(self.ttl))
    }

    /// The entry, fresh or not.
    pub async fn get(&self) -> Option<CacheEntry> {
        self.entry.read().await.clone()
    }

    /// The entry if it is still fresh. Checks and reads under one lock.
    pub async fn get_fresh(&self) -> Option<CacheEntry> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|e| e.is_fresh(self.ttl))
            .cloned()
    }

    /// Replace the entry with `posts`, fetched now.
    pub async fn put(&self, posts: Vec<Post>) {
        *self.entry.write().await = Some(CacheEntry {
            posts,
            fetched_at: Instant::now(),
        });
    }

    pub async fn clear(&self) {
        *self.entry.write().await = None;
    }
}

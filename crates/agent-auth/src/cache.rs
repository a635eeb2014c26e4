//! Access-Token Cache
//!
//! Per-audience cache shared process-wide by the tool invoker. Tokens are
//! reused until near expiry, then reissued. Each audience has one async
//! slot lock, so concurrent callers needing the same audience's first token
//! await a single shared issuance instead of triggering duplicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::Result;

/// A minted token with its absolute expiry
#[derive(Clone, Debug)]
pub struct IssuedGrant {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Source of fresh tokens for one audience
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue_for(&self, audience: &str) -> Result<IssuedGrant>;
}

#[derive(Default)]
struct Slot {
    grant: Option<IssuedGrant>,
}

/// The per-audience token cache
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    slots: StdMutex<HashMap<String, Arc<Mutex<Slot>>>>,
    leeway: Duration,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::with_leeway(source, Duration::seconds(30))
    }

    /// A token within `leeway` of expiry is treated as absent and reissued.
    pub fn with_leeway(source: Arc<dyn TokenSource>, leeway: Duration) -> Self {
        Self {
            source,
            slots: StdMutex::new(HashMap::new()),
            leeway,
        }
    }

    fn slot(&self, audience: &str) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        slots
            .entry(audience.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Return a valid cached token for `audience`, issuing one if necessary.
    ///
    /// At most one issuance request per audience is in flight: the slot lock
    /// is held across the issuance, and later arrivals see the cached grant.
    pub async fn get_or_issue(&self, audience: &str) -> Result<String> {
        let slot = self.slot(audience);
        let mut slot = slot.lock().await;

        if let Some(grant) = &slot.grant {
            if grant.expires_at - self.leeway > Utc::now() {
                return Ok(grant.access_token.clone());
            }
        }

        let fresh = self.source.issue_for(audience).await?;
        tracing::debug!(audience, expires_at = %fresh.expires_at, "Cached fresh access token");
        let token = fresh.access_token.clone();
        slot.grant = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token for `audience` (e.g. after a server rejected it).
    pub async fn invalidate(&self, audience: &str) {
        let slot = self.slot(audience);
        slot.lock().await.grant = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        ttl: Duration,
    }

    impl CountingSource {
        fn new(ttl: Duration) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ttl,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue_for(&self, audience: &str) -> Result<IssuedGrant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // widen the race window so overlapping callers really overlap
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(IssuedGrant {
                access_token: format!("token-{}-{}", audience, n),
                expires_at: Utc::now() + self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let source = Arc::new(CountingSource::new(Duration::seconds(600)));
        let cache = TokenCache::new(source.clone());

        let first = cache.get_or_issue("aud-a").await.unwrap();
        let second = cache.get_or_issue("aud-a").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_share_one_issuance() {
        let source = Arc::new(CountingSource::new(Duration::seconds(600)));
        let cache = Arc::new(TokenCache::new(source.clone()));

        let (a, b) = tokio::join!(
            {
                let cache = cache.clone();
                async move { cache.get_or_issue("aud-a").await.unwrap() }
            },
            {
                let cache = cache.clone();
                async move { cache.get_or_issue("aud-a").await.unwrap() }
            }
        );

        assert_eq!(a, b);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_distinct_audiences_issue_separately() {
        let source = Arc::new(CountingSource::new(Duration::seconds(600)));
        let cache = TokenCache::new(source.clone());

        let a = cache.get_or_issue("aud-a").await.unwrap();
        let b = cache.get_or_issue("aud-b").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_near_expiry_token_is_reissued() {
        // grants expire inside the leeway window, so every call reissues
        let source = Arc::new(CountingSource::new(Duration::seconds(10)));
        let cache = TokenCache::new(source.clone());

        cache.get_or_issue("aud-a").await.unwrap();
        cache.get_or_issue("aud-a").await.unwrap();

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reissue() {
        let source = Arc::new(CountingSource::new(Duration::seconds(600)));
        let cache = TokenCache::new(source.clone());

        let first = cache.get_or_issue("aud-a").await.unwrap();
        cache.invalidate("aud-a").await;
        let second = cache.get_or_issue("aud-a").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(source.calls(), 2);
    }
}

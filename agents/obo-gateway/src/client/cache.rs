//! Per-resource OBO token cache.
//!
//! Entries are keyed by target resource, actor identity and a SHA-256 digest
//! of the subject token, so any change of the delegation context misses.

use chrono::{Duration, Utc};
use obo_core::{OboToken, Token};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: String,
    actor: String,
    subject_digest: String,
}

impl CacheKey {
    pub fn new(resource: &str, actor: &str, subject_token: &Token) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(subject_token.expose().as_bytes());
        Self {
            resource: resource.to_string(),
            actor: actor.to_string(),
            subject_digest: hex::encode(hasher.finalize()),
        }
    }
}

#[derive(Clone)]
pub struct TokenCache {
    entries: Arc<RwLock<HashMap<CacheKey, OboToken>>>,
    skew: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_skew(Duration::seconds(DEFAULT_EXPIRY_SKEW_SECS))
    }

    /// Treat entries as expired `skew` before their `exp`
    pub fn with_skew(skew: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            skew,
        }
    }

    /// Cached token for `key`; an expired entry is evicted and missed
    pub async fn get(&self, key: &CacheKey) -> Option<OboToken> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(token) if !token.token().is_expired_at(now, self.skew) => {
                    return Some(token.clone())
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(evicted) = entries.remove(key) {
            tracing::debug!(
                resource = evicted.resource(),
                token = %evicted.token().fingerprint(),
                "Evicted expired OBO token"
            );
        }
        None
    }

    pub async fn insert(&self, key: CacheKey, token: OboToken) {
        self.entries.write().await.insert(key, token);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use redis::{aio::ConnectionManager, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::BlacklistEntry;

/// Store of revoked token identifiers, consulted on every authorization.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Revoke `jti` for `ttl_seconds`. Returns `true` only for the caller
    /// that actually performed the revocation; concurrent callers for the
    /// same id observe `false`.
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> Result<bool, anyhow::Error>;

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, anyhow::Error>;

    /// Drop entries whose token would have expired anyway. Returns the count removed.
    async fn purge_expired(&self) -> Result<usize, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{}", jti)
}

#[derive(Clone)]
pub struct RedisBlacklist {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisBlacklist {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl TokenBlacklist for RedisBlacklist {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();

        // EX rejects 0
        let set: Option<String> = redis::cmd("SET")
            .arg(blacklist_key(jti))
            .arg("revoked")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to blacklist token: {}", e))?;

        Ok(set.is_some())
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();

        let exists: bool = redis::cmd("EXISTS")
            .arg(blacklist_key(jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check blacklist: {}", e))?;

        Ok(exists)
    }

    /// Redis expires keys on its own.
    async fn purge_expired(&self) -> Result<usize, anyhow::Error> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// Process-local blacklist for single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryBlacklist {
    entries: DashMap<String, BlacklistEntry>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryBlacklist {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> Result<bool, anyhow::Error> {
        let now = Utc::now();
        // The entry guard holds the shard lock, so check-and-insert is atomic.
        let revoked = match self.entries.entry(jti.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(BlacklistEntry::new(jti.to_string(), ttl_seconds));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(BlacklistEntry::new(jti.to_string(), ttl_seconds));
                true
            }
        };
        Ok(revoked)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, anyhow::Error> {
        Ok(self.entries.contains_key(jti))
    }

    async fn purge_expired(&self) -> Result<usize, anyhow::Error> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Periodically purge expired blacklist entries until `shutdown_token` fires.
pub fn spawn_purge_task(
    store: Arc<dyn TokenBlacklist>,
    interval: Duration,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.purge_expired().await {
                        Ok(purged) => {
                            if purged > 0 {
                                tracing::info!(purged, "Purged expired blacklist entries");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Blacklist purge failed");
                        }
                    }
                }
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Blacklist purge task received shutdown signal, stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoke_reports_first_revocation_only() {
        let store = InMemoryBlacklist::new();

        assert!(store.revoke("jti-1", 60).await.unwrap());
        assert!(!store.revoke("jti-1", 60).await.unwrap());
        assert!(store.is_blacklisted("jti-1").await.unwrap());
        assert!(!store.is_blacklisted("jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_revocations_have_one_winner() {
        let store = Arc::new(InMemoryBlacklist::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.revoke("shared", 60).await.unwrap() })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_entries() {
        let store = InMemoryBlacklist::new();
        store.revoke("expired", 0).await.unwrap();
        store.revoke("live", 3600).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_blacklisted("live").await.unwrap());
        assert!(!store.is_blacklisted("expired").await.unwrap());
    }

    #[tokio::test]
    async fn purge_task_runs_until_cancelled() {
        let store = Arc::new(InMemoryBlacklist::new());
        store.revoke("expired", 0).await.unwrap();

        let token = CancellationToken::new();
        let handle = spawn_purge_task(store.clone(), Duration::from_millis(20), token.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.is_empty());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn redis_revoke_is_atomic() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let store = RedisBlacklist::connect(&url).await.unwrap();
        let jti = uuid::Uuid::new_v4().to_string();

        assert!(store.revoke(&jti, 30).await.unwrap());
        assert!(!store.revoke(&jti, 30).await.unwrap());
        assert!(store.is_blacklisted(&jti).await.unwrap());
        store.health_check().await.unwrap();
    }
}

//! Connection factory.
//!
//! The factory builds the profile set lazily, exactly once per factory, and
//! maintains one driver pool per profile name. Pooling behavior itself
//! (limits, reuse, liveness) is the driver's responsibility.

use crate::db::profiles::ProfileSet;
use crate::error::DbResult;
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool};
use std::collections::HashMap;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

static INSTALL_DRIVERS: Once = Once::new();

/// Install the sqlx `Any` driver backends once per process.
fn install_drivers() {
    INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

type ProfileLoader = Box<dyn Fn() -> DbResult<ProfileSet> + Send + Sync>;

/// Creates and caches connection pools keyed by profile name.
///
/// The profile set is built at most once per factory, on first use, so
/// configuration errors surface at the first operation rather than at
/// construction. Concurrent first callers observe the same completed set.
pub struct ConnectionFactory {
    loader: ProfileLoader,
    profiles: OnceCell<ProfileSet>,
    pools: RwLock<HashMap<String, AnyPool>>,
}

impl ConnectionFactory {
    /// Create a factory that loads profiles from the `COREKIT_DATABASES`
    /// environment variable.
    pub fn from_env() -> Self {
        Self::with_loader(ProfileSet::from_env)
    }

    /// Create a factory over a fixed list of parsed entries.
    pub fn from_entries(entries: Vec<crate::config::ProfileEntry>) -> Self {
        Self::with_loader(move || ProfileSet::from_entries(entries.clone()))
    }

    /// Create a factory with a custom profile loader. The loader runs on
    /// first use; if it fails, the error is returned and a later call
    /// retries.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> DbResult<ProfileSet> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            profiles: OnceCell::new(),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Get the profile set, building it on first access.
    pub async fn profiles(&self) -> DbResult<&ProfileSet> {
        self.profiles
            .get_or_try_init(|| async { (self.loader)() })
            .await
    }

    /// Get the pool for a profile, creating it on first use.
    ///
    /// `None` selects the `"default"` profile.
    pub async fn pool(&self, name: Option<&str>) -> DbResult<AnyPool> {
        let profile = self.profiles().await?.resolve(name)?.clone();

        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&profile.name) {
                return Ok(pool.clone());
            }
        }

        install_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(profile.pool_options.max_connections_or_default())
            .acquire_timeout(Duration::from_secs(
                profile.pool_options.acquire_timeout_or_default(),
            ))
            .connect_lazy(&profile.connection_string)?;

        // Re-check after building to handle concurrent creators; the loser's
        // pool is closed outside the lock.
        let existing = {
            let mut pools = self.pools.write().await;
            match pools.get(&profile.name) {
                Some(winner) => Some(winner.clone()),
                None => {
                    pools.insert(profile.name.clone(), pool.clone());
                    None
                }
            }
        };

        if let Some(winner) = existing {
            pool.close().await;
            return Ok(winner);
        }

        info!(
            profile = %profile.name,
            provider = %profile.provider,
            "Created connection pool"
        );
        Ok(pool)
    }

    /// Acquire a live connection from a profile's pool, for callers that
    /// need an explicit connection scope (transactions).
    pub async fn acquire(&self, name: Option<&str>) -> DbResult<PoolConnection<Any>> {
        let pool = self.pool(name).await?;
        Ok(pool.acquire().await?)
    }

    /// Close all pools and clear the cache.
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (name, pool) in pools.drain() {
            info!(profile = %name, "Closing connection pool");
            pool.close().await;
        }
    }
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("profiles_loaded", &self.profiles.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileEntry;
    use crate::error::DbError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loader_error_surfaces_at_first_use() {
        let factory = ConnectionFactory::from_entries(Vec::new());
        let err = factory.pool(None).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_unknown_profile_name() {
        let entry = ProfileEntry::parse("default=sqlite::memory:").unwrap();
        let factory = ConnectionFactory::from_entries(vec![entry]);
        let err = factory.pool(Some("missing")).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_profile_set_builds_once_under_concurrent_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let entry = ProfileEntry::parse("default=sqlite::memory:").unwrap();
        let factory = Arc::new(ConnectionFactory::with_loader({
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                ProfileSet::from_entries(vec![entry.clone()])
            }
        }));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let factory = Arc::clone(&factory);
            handles.push(tokio::spawn(async move {
                factory.pool(None).await.map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        factory.close_all().await;
    }

    #[tokio::test]
    async fn test_pool_is_cached_per_profile() {
        let entry = ProfileEntry::parse("default=sqlite::memory:").unwrap();
        let factory = ConnectionFactory::from_entries(vec![entry]);
        factory.pool(None).await.unwrap();
        factory.pool(None).await.unwrap();
        assert_eq!(factory.pools.read().await.len(), 1);
        factory.close_all().await;
    }
}

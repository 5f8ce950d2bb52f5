//! # Cache Module
//!
//! Response cache sitting between the dashboard endpoints and the upstream
//! API.
//!
//! ## Tiers
//!
//! - **Responses**: the finished JSON artifact of each dashboard endpoint,
//!   keyed by the endpoint plus every query parameter that changes its
//!   output.
//! - **Enrichment**: per-artist info and per-track tags, shared by every
//!   endpoint that fans out over artists or tracks.
//!
//! ## Expiry
//!
//! Each [`Endpoint`] maps to one TTL class in [`Endpoint::ttl`]. Entries are
//! never invalidated explicitly; an expired entry is indistinguishable from
//! a missing one. A periodic sweep only reclaims memory.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # use scrobble_dash::cache::{CacheKey, Endpoint, ResponseCache};
//! # async fn example() -> Result<(), serde_json::Error> {
//! let cache = ResponseCache::new();
//! let key = CacheKey::new(Endpoint::TopArtists).param("period", "7day");
//!
//! let names: Vec<String> = cache
//!     .get_or_compute(&key, || async { Ok(vec!["Low".to_string()]) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod ttl_cache;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use ttl_cache::{CacheMetrics, TtlCache};

/// Every cacheable artifact, each with its own freshness class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    LastPlayed,
    RecentTracks,
    TopArtists,
    TopArtistsYear,
    WeeklyChartList,
    ArtistHistory,
    GenreProfile,
    TopGenres,
    MusicStats,
    ArtistInfo,
    TrackTags,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::LastPlayed => "last-played",
            Endpoint::RecentTracks => "recent-tracks",
            Endpoint::TopArtists => "top-artists",
            Endpoint::TopArtistsYear => "top-artists-year",
            Endpoint::WeeklyChartList => "weekly-chart-list",
            Endpoint::ArtistHistory => "artist-history",
            Endpoint::GenreProfile => "genre-profile",
            Endpoint::TopGenres => "top-genres",
            Endpoint::MusicStats => "music-stats",
            Endpoint::ArtistInfo => "artist-info",
            Endpoint::TrackTags => "track-tags",
        }
    }

    /// Freshness table for every cached artifact.
    pub const fn ttl(&self) -> Duration {
        match self {
            Endpoint::LastPlayed | Endpoint::RecentTracks => Duration::from_secs(30),
            Endpoint::TopArtists
            | Endpoint::GenreProfile
            | Endpoint::TopGenres
            | Endpoint::MusicStats => Duration::from_secs(300),
            Endpoint::TopArtistsYear
            | Endpoint::WeeklyChartList
            | Endpoint::ArtistHistory
            | Endpoint::ArtistInfo
            | Endpoint::TrackTags => Duration::from_secs(3600),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request fingerprint: endpoint identity plus the normalized parameters
/// that affect its output, in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    endpoint: Endpoint,
    params: BTreeMap<&'static str, String>,
}

impl CacheKey {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.insert(name, value.to_string());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.endpoint.ttl()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint.name())?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let separator = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", separator, name, value)?;
        }
        Ok(())
    }
}

/// Shared cache of serialized endpoint artifacts.
///
/// Constructed once at startup and handed to the dashboard by reference;
/// cloning shares the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    store: TtlCache<CacheKey, Arc<Value>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached artifact for `key`, or computes and stores it for
    /// the TTL of the key's endpoint.
    ///
    /// Failed computations are returned and never stored.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<serde_json::Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut computed = None;
        let slot = &mut computed;
        let artifact = self
            .store
            .get_or_try_insert_with(key.clone(), key.ttl(), move || async move {
                let value = compute().await?;
                let serialized = serde_json::to_value(&value)?;
                *slot = Some(value);
                Ok::<_, E>(Arc::new(serialized))
            })
            .await?;

        if let Some(value) = computed {
            debug!(key = %key, ttl = ?key.ttl(), "Cache miss, artifact stored");
            return Ok(value);
        }

        debug!(key = %key, "Cache hit");
        Ok(T::deserialize(artifact.as_ref())?)
    }

    /// Raw cached artifact, if fresh.
    #[cfg(test)]
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.store.get(key)
    }

    pub fn cleanup_old_entries(&self) {
        let removed = self.store.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.store.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ttl_classes() {
        assert_eq!(Endpoint::LastPlayed.ttl(), Duration::from_secs(30));
        assert_eq!(Endpoint::RecentTracks.ttl(), Duration::from_secs(30));
        assert_eq!(Endpoint::TopArtists.ttl(), Duration::from_secs(300));
        assert_eq!(Endpoint::GenreProfile.ttl(), Duration::from_secs(300));
        assert_eq!(Endpoint::TopArtistsYear.ttl(), Duration::from_secs(3600));
        assert_eq!(Endpoint::WeeklyChartList.ttl(), Duration::from_secs(3600));
        assert_eq!(Endpoint::ArtistHistory.ttl(), Duration::from_secs(3600));
        assert_eq!(Endpoint::TrackTags.ttl(), Endpoint::ArtistInfo.ttl());
    }

    #[test]
    fn test_key_includes_every_param() {
        let weekly = CacheKey::new(Endpoint::ArtistHistory)
            .param("artist", "low")
            .param("weeks", 12)
            .param("aggregate", "week");
        let monthly = CacheKey::new(Endpoint::ArtistHistory)
            .param("artist", "low")
            .param("weeks", 12)
            .param("aggregate", "month");
        let reordered = CacheKey::new(Endpoint::ArtistHistory)
            .param("aggregate", "week")
            .param("weeks", 12)
            .param("artist", "low");

        assert_ne!(weekly, monthly);
        assert_eq!(weekly, reordered);
        assert_eq!(weekly.to_string(), "artist-history?aggregate=week&artist=low&weeks=12");
        assert_ne!(
            CacheKey::new(Endpoint::TopArtists).param("period", "7day"),
            CacheKey::new(Endpoint::TopGenres).param("period", "7day")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_compute_reuses_artifact_until_expiry() {
        let cache = ResponseCache::new();
        let key = CacheKey::new(Endpoint::TopArtists).param("period", "7day");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let compute = move |label: &'static str| {
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, serde_json::Error>(vec![label.to_string()])
            }
        };

        let first: Vec<String> = cache.get_or_compute(&key, compute("first")).await.unwrap();
        let stored = cache.peek(&key).unwrap();
        let second: Vec<String> = cache.get_or_compute(&key, compute("second")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_string(&second).unwrap(),
            serde_json::to_string(stored.as_ref()).unwrap()
        );

        tokio::time::advance(Endpoint::TopArtists.ttl()).await;
        assert!(cache.peek(&key).is_none());
        let third: Vec<String> = cache.get_or_compute(&key, compute("third")).await.unwrap();
        assert_eq!(third, vec!["third".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_leak() {
        let cache = ResponseCache::new();
        let week = CacheKey::new(Endpoint::TopArtists).param("period", "7day");
        let year = CacheKey::new(Endpoint::TopArtists).param("period", "12month");

        let a: String = cache
            .get_or_compute(&week, || async { Ok::<_, serde_json::Error>("week".to_string()) })
            .await
            .unwrap();
        let b: String = cache
            .get_or_compute(&year, || async { Ok::<_, serde_json::Error>("year".to_string()) })
            .await
            .unwrap();
        assert_eq!(a, "week");
        assert_eq!(b, "year");
        assert_eq!(cache.metrics().entries, 2);
    }
}

//! Aggregation orchestrator.
//!
//! [`Dashboard`] is the only component talking to the upstream API. Each
//! public method backs one dashboard endpoint: it sequences upstream calls,
//! fans out per-artist or per-track enrichment, runs the results through
//! the [`crate::stats`] functions and stores the artifact in the
//! [`ResponseCache`]. It holds no per-request state of its own.

pub mod artists;
pub mod history;
pub mod models;
pub mod profile;
pub mod tracks;

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::cache::{CacheKey, Endpoint, ResponseCache};
use crate::config::Config;
use crate::sources::payload::{self, ArtistInfoResponse, TopArtist, TopArtistsResponse, TrackInfoResponse};
use crate::sources::{Method, Period, ScrobbleSource, UpstreamError, UpstreamRequest};
use crate::stats::HipsterCalibration;

pub use models::{ArtistInfo, ArtistView, TrackView};

/// Source of "now" in epoch seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("cached artifact could not be encoded: {0}")]
    Artifact(#[from] serde_json::Error),
}

/// Outcome of a best-effort lookup that must not fail the whole request.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Resolved(T),
    Degraded { fallback: T, reason: String },
}

impl<T> Enrichment<T> {
    pub fn value(&self) -> &T {
        match self {
            Enrichment::Resolved(value) => value,
            Enrichment::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Enrichment::Resolved(value) => value,
            Enrichment::Degraded { fallback, .. } => fallback,
        }
    }

    /// The looked-up value, or `None` if the lookup degraded.
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Enrichment::Resolved(value) => Some(value),
            Enrichment::Degraded { .. } => None,
        }
    }
}

impl<T: Default> Enrichment<T> {
    /// Degrades an error to `T::default()`, logging what was lost.
    pub fn from_result<E: Display>(result: Result<T, E>, subject: &str) -> Self {
        match result {
            Ok(value) => Enrichment::Resolved(value),
            Err(e) => {
                warn!("Enrichment for {} degraded: {}", subject, e);
                Enrichment::Degraded {
                    fallback: T::default(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Display limits and tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub recent_tracks_limit: usize,
    pub top_artists_week_limit: usize,
    pub top_artists_year_limit: usize,
    pub show_recent_track_genres: bool,
    pub genre_artist_limit: usize,
    pub calibration: HipsterCalibration,
    pub fanout_width: usize,
    pub max_history_weeks: usize,
    pub max_recent_pages: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            recent_tracks_limit: 10,
            top_artists_week_limit: 10,
            top_artists_year_limit: 10,
            show_recent_track_genres: true,
            genre_artist_limit: 50,
            calibration: HipsterCalibration::default(),
            fanout_width: 8,
            max_history_weeks: 260,
            max_recent_pages: 10,
        }
    }
}

impl From<&Config> for DashboardSettings {
    fn from(config: &Config) -> Self {
        Self {
            recent_tracks_limit: config.recent_tracks_limit,
            top_artists_week_limit: config.top_artists_week_limit,
            top_artists_year_limit: config.top_artists_year_limit,
            show_recent_track_genres: config.show_recent_tracks_genres,
            genre_artist_limit: config.genre_artist_limit,
            calibration: config.hipster_calibration,
            fanout_width: config.fanout_width,
            max_history_weeks: config.max_history_weeks,
            max_recent_pages: config.max_recent_pages,
        }
    }
}

#[derive(Clone)]
pub struct Dashboard {
    source: Arc<dyn ScrobbleSource>,
    cache: ResponseCache,
    settings: DashboardSettings,
    clock: Clock,
}

impl Dashboard {
    pub fn new(source: Arc<dyn ScrobbleSource>, cache: ResponseCache, settings: DashboardSettings) -> Self {
        Self {
            source,
            cache,
            settings,
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// One upstream call decoded into its typed payload.
    async fn call<T: DeserializeOwned>(&self, request: UpstreamRequest) -> Result<T, UpstreamError> {
        let method = request.method;
        let value = self.source.fetch(request).await?;
        payload::decode(method, value)
    }

    /// Runs `task` over `items` with bounded concurrency, keeping input order.
    async fn fan_out<I, F, Fut>(&self, items: I, task: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        stream::iter(items)
            .map(task)
            .buffered(self.settings.fanout_width.max(1))
            .collect()
            .await
    }

    async fn top_artist_entries(&self, period: Period, limit: usize) -> Result<Vec<TopArtist>, UpstreamError> {
        let response: TopArtistsResponse = self
            .call(
                UpstreamRequest::new(Method::TopArtists)
                    .param("period", period)
                    .param("limit", limit),
            )
            .await?;
        Ok(response.topartists.artist.into_vec())
    }

    /// Listener count and top tag for an artist, shared across endpoints.
    async fn artist_info(&self, artist: &str) -> Enrichment<ArtistInfo> {
        let key = CacheKey::new(Endpoint::ArtistInfo).param("artist", artist.to_lowercase());
        let result = self
            .cache
            .get_or_compute(&key, || async {
                let response: ArtistInfoResponse = self
                    .call(UpstreamRequest::new(Method::ArtistInfo).param("artist", artist))
                    .await?;
                Ok::<_, DashboardError>(ArtistInfo {
                    listeners: response.artist.stats.listeners,
                    genre: response.artist.tags.map(|tags| tags.top_tag()).unwrap_or_default(),
                })
            })
            .await;
        Enrichment::from_result(result, artist)
    }

    /// Top tag of a single track, lowercased.
    async fn track_genre(&self, artist: &str, track: &str) -> Enrichment<String> {
        let key = CacheKey::new(Endpoint::TrackTags)
            .param("artist", artist.to_lowercase())
            .param("track", track.to_lowercase());
        let result = self
            .cache
            .get_or_compute(&key, || async {
                let response: TrackInfoResponse = self
                    .call(
                        UpstreamRequest::new(Method::TrackInfo)
                            .param("artist", artist)
                            .param("track", track),
                    )
                    .await?;
                Ok::<_, DashboardError>(response.track.toptags.map(|tags| tags.top_tag()).unwrap_or_default())
            })
            .await;
        Enrichment::from_result(result, &format!("{} - {}", artist, track))
    }

    async fn enrich_artists(&self, artists: Vec<TopArtist>) -> Vec<(TopArtist, Enrichment<ArtistInfo>)> {
        self.fan_out(artists, |artist| async move {
            let info = self.artist_info(&artist.name).await;
            (artist, info)
        })
        .await
    }

    /// Score for an enriched artist; a failed lookup scores zero.
    fn hipster_score(&self, info: &Enrichment<ArtistInfo>) -> u8 {
        info.resolved()
            .map(|info| self.settings.calibration.score(info.listeners))
            .unwrap_or(0)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::sources::MockScrobbleSource;

    #[test]
    fn test_enrichment_from_result() {
        let ok: Enrichment<u64> = Enrichment::from_result(Ok::<_, String>(5), "x");
        assert_eq!(ok.resolved(), Some(&5));

        let degraded: Enrichment<u64> = Enrichment::from_result(Err("timeout"), "x");
        assert_eq!(degraded.resolved(), None);
        assert_eq!(*degraded.value(), 0);
        assert!(matches!(degraded, Enrichment::Degraded { ref reason, .. } if reason == "timeout"));
    }

    #[tokio::test]
    async fn test_artist_info_is_shared_through_cache() {
        let mut mock = MockScrobbleSource::new();
        mock.expect_fetch()
            .times(1)
            .returning(|_| Ok(artist_info(1_000, "Slowcore")));
        let dashboard = dashboard(mock, 0);

        let first = dashboard.artist_info("Low").await;
        let second = dashboard.artist_info("LOW").await;

        assert_eq!(first, second);
        assert_eq!(
            first.resolved(),
            Some(&ArtistInfo {
                listeners: 1_000,
                genre: "slowcore".to_string()
            })
        );
        assert_eq!(dashboard.hipster_score(&first), 80);
    }

    #[tokio::test]
    async fn test_failed_artist_info_degrades_and_is_not_cached() {
        let mut mock = MockScrobbleSource::new();
        mock.expect_fetch()
            .times(2)
            .returning(|request| Err(UpstreamError::unavailable(request.method, "timeout")));
        let dashboard = dashboard(mock, 0);

        let info = dashboard.artist_info("Low").await;
        assert_eq!(*info.value(), ArtistInfo::default());
        assert_eq!(dashboard.hipster_score(&info), 0);
        assert!(dashboard.artist_info("Low").await.resolved().is_none());
    }
}

use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

use super::{Dashboard, DashboardError};
use crate::cache::{CacheKey, Endpoint};
use crate::sources::Period;
use crate::stats::genres::{self, GenreCount, GenreWeights, PROFILE_GENRES, TOP_GENRES};
use crate::stats::hipster::{self, MusicStats, ScoredArtist};

/// Periods compared when the caller names none.
pub const DEFAULT_PROFILE_PERIODS: [Period; 3] = [Period::OneMonth, Period::ThreeMonth, Period::TwelveMonth];

/// Percentage share of each of the top genres, per period.
pub type GenreProfile = BTreeMap<String, BTreeMap<String, f64>>;

impl Dashboard {
    #[instrument(skip(self))]
    pub async fn genre_profile(&self, periods: &[Period]) -> Result<GenreProfile, DashboardError> {
        let mut periods = if periods.is_empty() {
            DEFAULT_PROFILE_PERIODS.to_vec()
        } else {
            periods.to_vec()
        };
        periods.sort();
        periods.dedup();

        let label = periods.iter().map(Period::as_str).collect::<Vec<_>>().join(",");
        let key = CacheKey::new(Endpoint::GenreProfile).param("periods", label);

        self.cache
            .get_or_compute(&key, || async {
                let weights = try_join_all(periods.iter().map(|period| self.period_genre_weights(*period))).await?;
                let labeled: Vec<(String, GenreWeights)> = periods
                    .iter()
                    .map(|period| period.to_string())
                    .zip(weights)
                    .collect();
                Ok(genres::genre_profile(&labeled, PROFILE_GENRES))
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn top_genres(&self, period: Period) -> Result<Vec<GenreCount>, DashboardError> {
        let key = CacheKey::new(Endpoint::TopGenres).param("period", period);
        self.cache
            .get_or_compute(&key, || async {
                let weights = self.period_genre_weights(period).await?;
                Ok(genres::top_genres(&weights, TOP_GENRES))
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn music_stats(&self, period: Period) -> Result<MusicStats, DashboardError> {
        let key = CacheKey::new(Endpoint::MusicStats).param("period", period);
        self.cache
            .get_or_compute(&key, || async {
                let artists = self
                    .top_artist_entries(period, self.settings.genre_artist_limit)
                    .await?;
                let scored: Vec<ScoredArtist> = self
                    .enrich_artists(artists)
                    .await
                    .into_iter()
                    .map(|(artist, info)| ScoredArtist {
                        score: self.hipster_score(&info),
                        name: artist.name,
                        playcount: artist.playcount,
                    })
                    .collect();
                Ok(hipster::music_stats(&scored))
            })
            .await
    }

    /// Playcount per genre over the period's top artists.
    async fn period_genre_weights(&self, period: Period) -> Result<GenreWeights, DashboardError> {
        let artists = self
            .top_artist_entries(period, self.settings.genre_artist_limit)
            .await?;
        let enriched = self.enrich_artists(artists).await;

        let genre_of: HashMap<&str, &str> = enriched
            .iter()
            .map(|(artist, info)| (artist.name.as_str(), info.value().genre.as_str()))
            .collect();
        Ok(genres::weight_genres(
            enriched
                .iter()
                .map(|(artist, _)| (artist.name.as_str(), artist.playcount)),
            |name| genre_of.get(name).map(|genre| genre.to_string()).unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::sources::{Method, MockScrobbleSource, UpstreamError};
    use crate::stats::HipsterCalibration;
    use pretty_assertions::assert_eq;

    /// Same artists for every period; Burial's lookup fails.
    fn library() -> MockScrobbleSource {
        let mut mock = MockScrobbleSource::new();
        mock.expect_fetch().returning(|request| match request.method {
            Method::TopArtists => {
                assert_eq!(request.get("limit"), Some("50"));
                Ok(top_artists(&[("Low", 50), ("Slint", 30), ("Duster", 15), ("Burial", 5)]))
            }
            Method::ArtistInfo => match request.get("artist") {
                Some("Low") => Ok(artist_info(1_000, "Slowcore")),
                Some("Duster") => Ok(artist_info(100, "slowcore")),
                Some("Slint") => Ok(artist_info(10_000_000, "Post-Rock")),
                _ => Err(UpstreamError::unavailable(request.method, "timeout")),
            },
            other => panic!("unexpected call {other}"),
        });
        mock
    }

    #[tokio::test]
    async fn test_top_genres_weighted_by_playcount() {
        let dashboard = dashboard(library(), 0);

        let top = dashboard.top_genres(Period::OneMonth).await.unwrap();

        assert_eq!(
            top,
            vec![
                GenreCount { genre: "slowcore".into(), count: 65 },
                GenreCount { genre: "post-rock".into(), count: 30 },
            ]
        );
    }

    #[tokio::test]
    async fn test_genre_profile_defaults_and_shares() {
        let dashboard = dashboard(library(), 0);

        let profile = dashboard.genre_profile(&[]).await.unwrap();

        let periods: Vec<&str> = profile.keys().map(String::as_str).collect();
        assert_eq!(periods, vec!["12month", "1month", "3month"]);
        for shares in profile.values() {
            assert_eq!(shares.len(), 2);
            let sum: f64 = shares.values().sum();
            assert!((sum - 100.0).abs() <= 0.1);
            assert_eq!(shares["slowcore"], 68.42);
        }
    }

    #[tokio::test]
    async fn test_genre_profile_key_ignores_order() {
        let mut mock = MockScrobbleSource::new();
        mock.expect_fetch()
            .withf(|request| request.method == Method::TopArtists)
            .times(2)
            .returning(|_| Ok(top_artists(&[])));
        let dashboard = dashboard(mock, 0);

        dashboard
            .genre_profile(&[Period::TwelveMonth, Period::SevenDay])
            .await
            .unwrap();
        let again = dashboard
            .genre_profile(&[Period::SevenDay, Period::TwelveMonth])
            .await
            .unwrap();
        assert!(again.values().all(|shares| shares.is_empty()));
    }

    #[tokio::test]
    async fn test_music_stats_scores_degraded_artists_as_zero() {
        let dashboard = dashboard(library(), 0);

        let stats = dashboard.music_stats(Period::OneMonth).await.unwrap();

        let calibration = HipsterCalibration::default();
        let expected = [1_000, 100, 10_000_000]
            .iter()
            .map(|listeners| f64::from(calibration.score(*listeners)))
            .sum::<f64>()
            / 4.0;
        assert_eq!(stats.artist_count, 4);
        assert!((stats.avg_hipster_score - expected).abs() < 0.05);
        assert_eq!(stats.artist_diversity.top_artist_name, "Low");
        assert_eq!(stats.artist_diversity.top_artist_percentage, 50.0);
        let classified: usize = stats.hipster_distribution.values().sum();
        assert_eq!(classified, 4);
        // Slint (10M listeners) scores 0 and Burial's lookup failed.
        assert_eq!(stats.hipster_distribution["Mainstream"], 2);
    }

    #[tokio::test]
    async fn test_top_artists_failure_fails_stats() {
        let mut mock = MockScrobbleSource::new();
        mock.expect_fetch()
            .returning(|request| Err(UpstreamError::unavailable(request.method, "timeout")));
        let dashboard = dashboard(mock, 0);

        assert!(dashboard.music_stats(Period::OneMonth).await.is_err());
        assert!(dashboard.top_genres(Period::OneMonth).await.is_err());
    }
}

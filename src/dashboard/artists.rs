use serde_json::Value;
use tracing::instrument;

use super::{ArtistView, Dashboard, DashboardError};
use crate::cache::{CacheKey, Endpoint};
use crate::sources::payload::{largest_image, WeeklyChartListResponse};
use crate::sources::{Method, Period, UpstreamRequest};

impl Dashboard {
    #[instrument(skip(self))]
    pub async fn top_artists(&self, period: Period) -> Result<Vec<ArtistView>, DashboardError> {
        let key = CacheKey::new(Endpoint::TopArtists).param("period", period);
        let limit = self.settings.top_artists_week_limit;
        self.cache
            .get_or_compute(&key, || self.ranked_artists(period, limit))
            .await
    }

    #[instrument(skip(self))]
    pub async fn top_artists_year(&self) -> Result<Vec<ArtistView>, DashboardError> {
        let key = CacheKey::new(Endpoint::TopArtistsYear);
        let limit = self.settings.top_artists_year_limit;
        self.cache
            .get_or_compute(&key, || self.ranked_artists(Period::TwelveMonth, limit))
            .await
    }

    /// Raw weekly chart windows, passed through in upstream order.
    #[instrument(skip(self))]
    pub async fn weekly_chart_list(&self) -> Result<Vec<Value>, DashboardError> {
        let key = CacheKey::new(Endpoint::WeeklyChartList);
        self.cache
            .get_or_compute(&key, || async {
                let response: WeeklyChartListResponse =
                    self.call(UpstreamRequest::new(Method::WeeklyChartList)).await?;
                Ok(response.weeklychartlist.chart.into_vec())
            })
            .await
    }

    async fn ranked_artists(&self, period: Period, limit: usize) -> Result<Vec<ArtistView>, DashboardError> {
        let artists = self.top_artist_entries(period, limit).await?;
        let views = self
            .enrich_artists(artists)
            .await
            .into_iter()
            .map(|(artist, info)| ArtistView {
                image: largest_image(&artist.image),
                listeners: info.value().listeners,
                hipster_score: self.hipster_score(&info),
                genre: info.value().genre.clone(),
                name: artist.name,
                playcount: artist.playcount,
                url: artist.url,
            })
            .collect();
        Ok(views)
    }
}

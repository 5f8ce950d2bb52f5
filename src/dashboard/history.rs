use chrono::Local;
use tracing::{debug, instrument, warn};

use super::{Dashboard, DashboardError, Enrichment};
use crate::cache::{CacheKey, Endpoint};
use crate::sources::payload::{ChartRange, RecentTrack, RecentTracksResponse, WeeklyArtistChartResponse};
use crate::sources::{Method, UpstreamError, UpstreamRequest};
use crate::stats::buckets;
use crate::stats::{ChartPeriod, HistoryMode, Scrobble, TimeBucket};

/// Largest page `user.getrecenttracks` serves.
const RECENT_PAGE_SIZE: usize = 200;

impl From<RecentTrack> for Scrobble {
    fn from(track: RecentTrack) -> Self {
        Scrobble {
            now_playing: track.is_now_playing(),
            timestamp: track.timestamp(),
            artist: track.artist.text,
        }
    }
}

impl Dashboard {
    /// Play counts for one artist over the last `weeks` weeks.
    ///
    /// Weekly mode follows the upstream chart windows and appends a
    /// synthetic bucket for the week in progress. Monthly mode rolls those
    /// buckets up by calendar month. Daily mode counts raw scrobbles over
    /// `weeks` days. `weeks` is clamped to the configured maximum.
    #[instrument(skip(self))]
    pub async fn artist_history(
        &self,
        artist: &str,
        weeks: usize,
        mode: HistoryMode,
    ) -> Result<Vec<TimeBucket>, DashboardError> {
        let weeks = weeks.min(self.settings.max_history_weeks);
        let key = CacheKey::new(Endpoint::ArtistHistory)
            .param("artist", artist.to_lowercase())
            .param("weeks", weeks)
            .param("aggregate", mode.as_str());

        self.cache
            .get_or_compute(&key, || async {
                let now = self.now();
                match mode {
                    HistoryMode::Week => self.weekly_history(artist, weeks, now).await,
                    HistoryMode::Month => {
                        let weekly = self.weekly_history(artist, weeks, now).await?;
                        Ok(buckets::monthly_rollup(&weekly, &Local))
                    }
                    HistoryMode::Day => self.daily_history(artist, weeks, now).await,
                }
            })
            .await
    }

    async fn weekly_history(&self, artist: &str, weeks: usize, now: i64) -> Result<Vec<TimeBucket>, DashboardError> {
        let periods = self.chart_periods().await?;
        let selected = buckets::select_recent_periods(&periods, weeks);

        let counts = self
            .fan_out(selected.iter().copied(), |period| async move {
                let result = self.week_playcount(artist, period).await;
                Enrichment::from_result(result, &format!("{} week {}", artist, period.from)).into_value()
            })
            .await;
        let mut history = buckets::weekly_buckets(selected, &counts);

        if let Some((from, to)) = buckets::current_gap(&history, now) {
            match self.recent_scrobbles(from, to).await {
                Ok(events) => {
                    let count = buckets::count_plays(&events, artist);
                    buckets::append_current_bucket(&mut history, now, count);
                }
                Err(e) => warn!("Skipping current week for {}: {}", artist, e),
            }
        }

        debug!("Built {} weekly buckets for {}", history.len(), artist);
        Ok(history)
    }

    async fn daily_history(&self, artist: &str, days: usize, now: i64) -> Result<Vec<TimeBucket>, DashboardError> {
        if days == 0 {
            return Ok(Vec::new());
        }
        let from = buckets::daily_window_start(now, days, &Local);
        let events = self.recent_scrobbles(from, now).await?;
        Ok(buckets::daily_buckets(&events, artist, days, now, &Local))
    }

    /// Chart windows from the cached weekly chart list, oldest first.
    async fn chart_periods(&self) -> Result<Vec<ChartPeriod>, DashboardError> {
        let charts = self.weekly_chart_list().await?;
        let mut periods: Vec<ChartPeriod> = charts
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<ChartRange>(raw).ok())
            .map(|range| ChartPeriod {
                from: range.from,
                to: range.to,
            })
            .collect();
        periods.sort_by_key(|period| period.from);
        Ok(periods)
    }

    async fn week_playcount(&self, artist: &str, period: ChartPeriod) -> Result<u64, UpstreamError> {
        let response: WeeklyArtistChartResponse = self
            .call(
                UpstreamRequest::new(Method::WeeklyArtistChart)
                    .param("from", period.from)
                    .param("to", period.to),
            )
            .await?;
        let chart = response.weeklyartistchart.artist.into_vec();
        Ok(buckets::artist_playcount(
            chart.iter().map(|entry| (entry.name.as_str(), entry.playcount)),
            artist,
        ))
    }

    /// Every scrobble in `[from, to]`, following pagination up to the
    /// configured page cap.
    async fn recent_scrobbles(&self, from: i64, to: i64) -> Result<Vec<Scrobble>, UpstreamError> {
        let mut events = Vec::new();
        let mut page: u64 = 1;

        loop {
            let response: RecentTracksResponse = self
                .call(
                    UpstreamRequest::new(Method::RecentTracks)
                        .param("from", from)
                        .param("to", to)
                        .param("limit", RECENT_PAGE_SIZE)
                        .param("page", page),
                )
                .await?;

            let total_pages = response
                .recenttracks
                .attr
                .as_ref()
                .map(|attr| attr.total_pages)
                .unwrap_or(1);
            events.extend(response.recenttracks.track.into_vec().into_iter().map(Scrobble::from));

            if page >= total_pages {
                break;
            }
            if page >= self.settings.max_recent_pages as u64 {
                warn!(
                    "Recent tracks truncated at page {} of {} for window {}..{}",
                    page, total_pages, from, to
                );
                break;
            }
            page += 1;
        }

        Ok(events)
    }
}

use tracing::instrument;

use super::models::{artist_url, track_url};
use super::{ArtistInfo, Dashboard, DashboardError, Enrichment, TrackView};
use crate::cache::{CacheKey, Endpoint};
use crate::sources::payload::{RecentTrack, RecentTracksResponse};
use crate::sources::{Method, UpstreamRequest};

impl Dashboard {
    /// The most recent track, flagged when it is still playing.
    #[instrument(skip(self))]
    pub async fn last_played(&self) -> Result<Option<TrackView>, DashboardError> {
        let key = CacheKey::new(Endpoint::LastPlayed);
        self.cache
            .get_or_compute(&key, || async {
                let response: RecentTracksResponse = self
                    .call(UpstreamRequest::new(Method::RecentTracks).param("limit", 1))
                    .await?;
                let Some(track) = response.recenttracks.track.into_vec().into_iter().next() else {
                    return Ok(None);
                };

                let (genre, info) = tokio::join!(
                    self.track_genre(&track.artist.text, &track.name),
                    self.artist_info(&track.artist.text)
                );
                let mut view = self.track_view(&track, genre.into_value(), &info);
                view.now_playing = Some(track.is_now_playing());
                Ok(Some(view))
            })
            .await
    }

    /// Completed scrobbles after the last-played one, newest first.
    #[instrument(skip(self))]
    pub async fn recent_tracks(&self) -> Result<Vec<TrackView>, DashboardError> {
        let key = CacheKey::new(Endpoint::RecentTracks);
        self.cache
            .get_or_compute(&key, || async {
                let limit = self.settings.recent_tracks_limit;
                let response: RecentTracksResponse = self
                    .call(UpstreamRequest::new(Method::RecentTracks).param("limit", limit + 1))
                    .await?;

                // The first entry is already shown as last-played.
                let tracks: Vec<RecentTrack> = response
                    .recenttracks
                    .track
                    .into_vec()
                    .into_iter()
                    .skip(1)
                    .filter(|track| !track.is_now_playing())
                    .take(limit)
                    .collect();

                let show_genres = self.settings.show_recent_track_genres;
                let views = self
                    .fan_out(tracks, |track| async move {
                        let genre = if show_genres {
                            self.track_genre(&track.artist.text, &track.name).await.into_value()
                        } else {
                            String::new()
                        };
                        let info = self.artist_info(&track.artist.text).await;
                        self.track_view(&track, genre, &info)
                    })
                    .await;
                Ok(views)
            })
            .await
    }

    fn track_view(&self, track: &RecentTrack, genre: String, info: &Enrichment<ArtistInfo>) -> TrackView {
        let artist = track.artist.text.clone();
        TrackView {
            artist_url: artist_url(&artist),
            track_url: track_url(&artist, &track.name),
            name: track.name.clone(),
            album: track.album.text.clone(),
            image: track.largest_image(),
            now_playing: None,
            timestamp: track.timestamp().map(|ts| ts.to_string()),
            genre,
            listeners: info.value().listeners,
            hipster_score: self.hipster_score(info),
            artist,
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::sources::payload::stringly;

const LASTFM_WEB: &str = "https://www.last.fm/music";

/// Cached per-artist enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub listeners: u64,
    pub genre: String,
}

/// A scrobbled or currently playing track as the dashboard renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackView {
    pub artist: String,
    pub name: String,
    pub album: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<bool>,
    pub timestamp: Option<String>,
    pub genre: String,
    pub artist_url: String,
    pub track_url: String,
    pub listeners: u64,
    pub hipster_score: u8,
}

/// A ranked artist with its enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistView {
    pub name: String,
    #[serde(with = "stringly")]
    pub playcount: u64,
    pub url: String,
    pub image: String,
    pub listeners: u64,
    pub hipster_score: u8,
    pub genre: String,
}

pub fn artist_url(artist: &str) -> String {
    format!("{}/{}", LASTFM_WEB, urlencoding::encode(artist))
}

pub fn track_url(artist: &str, track: &str) -> String {
    format!(
        "{}/{}/_/{}",
        LASTFM_WEB,
        urlencoding::encode(artist),
        urlencoding::encode(track)
    )
}

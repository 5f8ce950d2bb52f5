//! Typed views over upstream JSON bodies.
//!
//! The upstream API is loose with its shapes: a collection with a single
//! element arrives as a bare object, numbers arrive as strings, and absent
//! tag blocks are sometimes an empty string. Everything here tolerates that.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use super::{Method, UpstreamError};

/// Decodes a raw body into a typed payload, mapping failures to `Malformed`.
pub fn decode<T: DeserializeOwned>(method: Method, value: Value) -> Result<T, UpstreamError> {
    serde_json::from_value(value).map_err(|e| UpstreamError::malformed(method, e))
}

/// A collection that may be encoded as an array or as a single object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// `{"#text": "..."}` wrapper used for artist, album and image fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Text {
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagList {
    #[serde(default)]
    pub tag: OneOrMany<Tag>,
}

impl TagList {
    /// Lowercased first tag, or empty when there is none.
    pub fn top_tag(self) -> String {
        self.tag
            .into_vec()
            .into_iter()
            .next()
            .map(|tag| tag.name.trim().to_lowercase())
            .unwrap_or_default()
    }
}

// --- user.getrecenttracks ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RecentTracksResponse {
    pub recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
pub struct RecentTracks {
    #[serde(default)]
    pub track: OneOrMany<RecentTrack>,
    #[serde(rename = "@attr", default, deserialize_with = "lenient")]
    pub attr: Option<PageAttr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageAttr {
    #[serde(rename = "totalPages", default, deserialize_with = "u64_from_any")]
    pub total_pages: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentTrack {
    pub name: String,
    pub artist: Text,
    #[serde(default)]
    pub album: Text,
    #[serde(default)]
    pub image: Vec<Text>,
    #[serde(rename = "@attr", default, deserialize_with = "lenient")]
    pub attr: Option<TrackAttr>,
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<PlayedAt>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackAttr {
    #[serde(default)]
    pub nowplaying: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayedAt {
    pub uts: String,
}

impl RecentTrack {
    pub fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|attr| attr.nowplaying.as_deref())
            .is_some_and(|flag| flag == "true")
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.date.as_ref().and_then(|date| date.uts.parse().ok())
    }

    /// URL of the largest image, which the upstream lists last.
    pub fn largest_image(&self) -> String {
        largest_image(&self.image)
    }
}

// --- user.gettopartists -----------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TopArtistsResponse {
    pub topartists: TopArtists,
}

#[derive(Debug, Deserialize)]
pub struct TopArtists {
    #[serde(default)]
    pub artist: OneOrMany<TopArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopArtist {
    pub name: String,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub playcount: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image: Vec<Text>,
}

// --- user.getweeklychartlist ------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WeeklyChartListResponse {
    pub weeklychartlist: WeeklyChartList,
}

#[derive(Debug, Deserialize)]
pub struct WeeklyChartList {
    #[serde(default)]
    pub chart: OneOrMany<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartRange {
    #[serde(deserialize_with = "i64_from_any")]
    pub from: i64,
    #[serde(deserialize_with = "i64_from_any")]
    pub to: i64,
}

// --- user.getweeklyartistchart ----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WeeklyArtistChartResponse {
    pub weeklyartistchart: WeeklyArtistChart,
}

#[derive(Debug, Deserialize)]
pub struct WeeklyArtistChart {
    #[serde(default)]
    pub artist: OneOrMany<ChartArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartArtist {
    pub name: String,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub playcount: u64,
}

// --- track.getinfo / artist.getinfo -----------------------------------------

#[derive(Debug, Deserialize)]
pub struct TrackInfoResponse {
    pub track: TrackInfo,
}

#[derive(Debug, Deserialize)]
pub struct TrackInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub toptags: Option<TagList>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistInfoResponse {
    pub artist: ArtistInfoPayload,
}

#[derive(Debug, Deserialize)]
pub struct ArtistInfoPayload {
    pub stats: ArtistStats,
    #[serde(default, deserialize_with = "lenient")]
    pub tags: Option<TagList>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistStats {
    #[serde(deserialize_with = "u64_from_any")]
    pub listeners: u64,
}

pub fn largest_image(images: &[Text]) -> String {
    images
        .last()
        .map(|image| image.text.clone())
        .unwrap_or_default()
}

/// Deserializes `T`, or yields `None` when the field has an unexpected shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn u64_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("expected unsigned integer, got {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("expected number, got {}", other))),
    }
}

fn i64_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {}", n))),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("expected number, got {}", other))),
    }
}

/// Serializes numbers as decimal strings and accepts either form back.
///
/// The dashboard receives epoch seconds and artist playcounts as strings,
/// exactly as the upstream emits them.
pub mod stringly {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse().map_err(serde::de::Error::custom),
            Value::Number(n) => n.to_string().parse().map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!("expected number or string, got {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_track_as_object() {
        let body = json!({
            "recenttracks": {
                "track": {
                    "name": "Sunflower",
                    "artist": {"#text": "Low"},
                    "album": {"#text": "Things We Lost in the Fire"},
                    "image": [{"#text": "small.png"}, {"#text": "large.png"}],
                    "date": {"uts": "1700000000", "#text": "14 Nov 2023"}
                },
                "@attr": {"page": "1", "totalPages": "3"}
            }
        });

        let parsed: RecentTracksResponse = decode(Method::RecentTracks, body).unwrap();
        let tracks = parsed.recenttracks.track.into_vec();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artist.text, "Low");
        assert_eq!(tracks[0].timestamp(), Some(1_700_000_000));
        assert_eq!(tracks[0].largest_image(), "large.png");
        assert!(!tracks[0].is_now_playing());
        assert_eq!(parsed.recenttracks.attr.unwrap().total_pages, 3);
    }

    #[test]
    fn test_now_playing_track_has_no_date() {
        let body = json!({
            "recenttracks": {
                "track": [{
                    "name": "Lullaby",
                    "artist": {"#text": "Low"},
                    "@attr": {"nowplaying": "true"}
                }]
            }
        });
        let parsed: RecentTracksResponse = decode(Method::RecentTracks, body).unwrap();
        let track = &parsed.recenttracks.track.into_vec()[0];
        assert!(track.is_now_playing());
        assert_eq!(track.timestamp(), None);
        assert_eq!(track.largest_image(), "");
    }

    #[test]
    fn test_artist_info_tolerates_empty_tags() {
        let body = json!({
            "artist": {
                "name": "Obscure Band",
                "stats": {"listeners": "42", "playcount": "99"},
                "tags": ""
            }
        });
        let parsed: ArtistInfoResponse = decode(Method::ArtistInfo, body).unwrap();
        assert_eq!(parsed.artist.stats.listeners, 42);
        assert!(parsed.artist.tags.is_none());
    }

    #[test]
    fn test_top_tag_single_object_is_lowercased() {
        let tags: TagList = serde_json::from_value(json!({"tag": {"name": "Slowcore"}})).unwrap();
        assert_eq!(tags.top_tag(), "slowcore");
        assert_eq!(TagList::default().top_tag(), "");
    }

    #[test]
    fn test_missing_stats_is_malformed() {
        let err = decode::<ArtistInfoResponse>(Method::ArtistInfo, json!({"artist": {"name": "x"}}))
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed { .. }));
    }

    #[test]
    fn test_chart_range_from_strings() {
        let range: ChartRange =
            serde_json::from_value(json!({"#text": "", "from": "1699790400", "to": "1700395200"})).unwrap();
        assert_eq!(range.from, 1_699_790_400);
        assert_eq!(range.to, 1_700_395_200);
    }
}

pub mod lastfm;
pub mod payload;
pub mod retry;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use lastfm::LastFmClient;
pub use retry::{RetryPolicy, RetryingSource};

#[cfg(test)]
use mockall::automock;

/// Common trait for anything able to answer upstream scrobble API calls.
///
/// Implementations return the raw decoded JSON body. Interpreting domain
/// fields, retrying and caching all happen above this seam.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScrobbleSource: Send + Sync {
    async fn fetch(&self, request: UpstreamRequest) -> Result<Value, UpstreamError>;
}

/// Upstream API methods used by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    RecentTracks,
    TopArtists,
    WeeklyChartList,
    WeeklyArtistChart,
    TrackInfo,
    ArtistInfo,
}

impl Method {
    /// Wire name sent as the `method` query parameter.
    pub fn name(&self) -> &'static str {
        match self {
            Method::RecentTracks => "user.getrecenttracks",
            Method::TopArtists => "user.gettopartists",
            Method::WeeklyChartList => "user.getweeklychartlist",
            Method::WeeklyArtistChart => "user.getweeklyartistchart",
            Method::TrackInfo => "track.getinfo",
            Method::ArtistInfo => "artist.getinfo",
        }
    }

    /// Top-level key every successful response body carries.
    pub fn root_key(&self) -> &'static str {
        match self {
            Method::RecentTracks => "recenttracks",
            Method::TopArtists => "topartists",
            Method::WeeklyChartList => "weeklychartlist",
            Method::WeeklyArtistChart => "weeklyartistchart",
            Method::TrackInfo => "track",
            Method::ArtistInfo => "artist",
        }
    }

    /// Whether the configured username is sent along with the call.
    pub fn is_user_scoped(&self) -> bool {
        matches!(
            self,
            Method::RecentTracks
                | Method::TopArtists
                | Method::WeeklyChartList
                | Method::WeeklyArtistChart
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One parameterized upstream call. Credentials are injected by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub method: Method,
    pub params: Vec<(&'static str, String)>,
}

impl UpstreamRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// Looks up a parameter value by name.
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream unavailable during {method}: {reason}")]
    Unavailable { method: Method, reason: String },
    #[error("malformed upstream response for {method}: {reason}")]
    Malformed { method: Method, reason: String },
    #[error("upstream API error {code} during {method}: {message}")]
    Api {
        method: Method,
        code: i64,
        message: String,
    },
}

impl UpstreamError {
    pub fn unavailable(method: Method, reason: impl ToString) -> Self {
        Self::Unavailable {
            method,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(method: Method, reason: impl ToString) -> Self {
        Self::Malformed {
            method,
            reason: reason.to_string(),
        }
    }

    /// Transient failures worth another attempt.
    ///
    /// API codes: 8 operation failed, 11 service offline, 16 temporarily
    /// unavailable, 29 rate limit exceeded.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Unavailable { .. } => true,
            UpstreamError::Api { code, .. } => matches!(code, 8 | 11 | 16 | 29),
            UpstreamError::Malformed { .. } => false,
        }
    }
}

/// Time period accepted by `user.gettopartists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    SevenDay,
    OneMonth,
    ThreeMonth,
    SixMonth,
    TwelveMonth,
    Overall,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::SevenDay,
        Period::OneMonth,
        Period::ThreeMonth,
        Period::SixMonth,
        Period::TwelveMonth,
        Period::Overall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::SevenDay => "7day",
            Period::OneMonth => "1month",
            Period::ThreeMonth => "3month",
            Period::SixMonth => "6month",
            Period::TwelveMonth => "12month",
            Period::Overall => "overall",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|period| period.as_str() == raw.trim())
    }

    /// Parses a query value, falling back to `default` when absent or unknown.
    pub fn parse_or(raw: Option<&str>, default: Period) -> Self {
        raw.and_then(Self::parse).unwrap_or(default)
    }

    /// Parses a comma-separated list, dropping unknown entries and duplicates.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut periods = Vec::new();
        for period in raw.split(',').filter_map(Self::parse) {
            if !periods.contains(&period) {
                periods.push(period);
            }
        }
        periods
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

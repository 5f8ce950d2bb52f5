use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sources::lastfm::DEFAULT_API_URL;
use crate::sources::RetryPolicy;
use crate::stats::HipsterCalibration;

/// Largest page size the upstream API accepts.
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    // Last.fm
    pub lastfm_api_key: String,
    pub lastfm_username: String,
    pub lastfm_api_url: String,

    // Display
    pub recent_tracks_limit: usize,
    pub top_artists_week_limit: usize,
    pub top_artists_year_limit: usize,
    pub show_recent_tracks_genres: bool,
    pub genre_artist_limit: usize,
    pub hipster_calibration: HipsterCalibration,

    // Upstream
    pub upstream_timeout: Duration,
    pub upstream_max_retries: u32,
    pub upstream_retry_backoff: Duration,
    pub max_concurrent_requests: usize,

    // Rendimiento
    pub fanout_width: usize,
    pub request_deadline: Duration,
    pub max_history_weeks: usize,
    pub max_recent_pages: usize,
    pub cache_cleanup_interval: Duration,

    // Servidor
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds and validates a configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            // Last.fm
            lastfm_api_key: var("LASTFM_API_KEY").context("LASTFM_API_KEY is not set")?,
            lastfm_username: var("LASTFM_USERNAME").context("LASTFM_USERNAME is not set")?,
            lastfm_api_url: var("LASTFM_API_URL").unwrap_or(defaults.lastfm_api_url),

            // Display
            recent_tracks_limit: parse_or(&var, "RECENT_TRACKS_LIMIT", defaults.recent_tracks_limit)?,
            top_artists_week_limit: parse_or(&var, "TOP_ARTISTS_WEEK_LIMIT", defaults.top_artists_week_limit)?,
            top_artists_year_limit: parse_or(&var, "TOP_ARTISTS_YEAR_LIMIT", defaults.top_artists_year_limit)?,
            show_recent_tracks_genres: parse_or(&var, "SHOW_RECENT_TRACKS_GENRES", defaults.show_recent_tracks_genres)?,
            genre_artist_limit: parse_or(&var, "GENRE_ARTIST_LIMIT", defaults.genre_artist_limit)?,
            hipster_calibration: match var("HIPSTER_CALIBRATION") {
                Some(raw) => HipsterCalibration::parse(&raw)
                    .with_context(|| format!("HIPSTER_CALIBRATION must be 'dashboard' or 'classic', got: {}", raw))?,
                None => defaults.hipster_calibration,
            },

            // Upstream
            upstream_timeout: Duration::from_secs(parse_or(
                &var,
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout.as_secs(),
            )?),
            upstream_max_retries: parse_or(&var, "UPSTREAM_MAX_RETRIES", defaults.upstream_max_retries)?,
            upstream_retry_backoff: Duration::from_millis(parse_or(
                &var,
                "UPSTREAM_RETRY_BACKOFF_MS",
                defaults.upstream_retry_backoff.as_millis() as u64,
            )?),
            max_concurrent_requests: parse_or(&var, "MAX_CONCURRENT_REQUESTS", defaults.max_concurrent_requests)?,

            // Rendimiento
            fanout_width: parse_or(&var, "FANOUT_WIDTH", defaults.fanout_width)?,
            request_deadline: Duration::from_secs(parse_or(
                &var,
                "REQUEST_DEADLINE_SECS",
                defaults.request_deadline.as_secs(),
            )?),
            max_history_weeks: parse_or(&var, "MAX_HISTORY_WEEKS", defaults.max_history_weeks)?,
            max_recent_pages: parse_or(&var, "MAX_RECENT_PAGES", defaults.max_recent_pages)?,
            cache_cleanup_interval: Duration::from_secs(parse_or(
                &var,
                "CACHE_CLEANUP_INTERVAL_SECS",
                defaults.cache_cleanup_interval.as_secs(),
            )?),

            // Servidor
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(&var, "PORT", defaults.port)?,
            static_dir: var("STATIC_DIR").map(PathBuf::from),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - API key and username must be present
    /// - The API URL must be an absolute http(s) URL
    /// - Display limits must be within `1..=1000`
    /// - Timeouts, fan-out width and page caps must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.lastfm_api_key.trim().is_empty() {
            anyhow::bail!("Last.fm API key must not be empty");
        }

        if self.lastfm_username.trim().is_empty() {
            anyhow::bail!("Last.fm username must not be empty");
        }

        let url = url::Url::parse(&self.lastfm_api_url)
            .with_context(|| format!("Invalid Last.fm API URL: {}", self.lastfm_api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Last.fm API URL must be http or https, got: {}", url.scheme());
        }

        for (name, value) in [
            ("RECENT_TRACKS_LIMIT", self.recent_tracks_limit),
            ("TOP_ARTISTS_WEEK_LIMIT", self.top_artists_week_limit),
            ("TOP_ARTISTS_YEAR_LIMIT", self.top_artists_year_limit),
            ("GENRE_ARTIST_LIMIT", self.genre_artist_limit),
        ] {
            if value == 0 || value > MAX_LIMIT {
                anyhow::bail!("{} must be between 1 and {}, got: {}", name, MAX_LIMIT, value);
            }
        }

        if self.upstream_timeout.is_zero() {
            anyhow::bail!("Upstream timeout must be greater than 0");
        }

        if self.request_deadline.is_zero() {
            anyhow::bail!("Request deadline must be greater than 0");
        }

        if self.fanout_width == 0 {
            anyhow::bail!("Fan-out width must be greater than 0");
        }

        if self.max_concurrent_requests == 0 {
            anyhow::bail!("Max concurrent requests must be greater than 0");
        }

        if self.max_recent_pages == 0 {
            anyhow::bail!("Max recent pages must be greater than 0");
        }

        if self.cache_cleanup_interval.is_zero() {
            anyhow::bail!("Cache cleanup interval must be greater than 0");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.upstream_max_retries,
            base_delay: self.upstream_retry_backoff,
            ..RetryPolicy::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The API key is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Last.fm: user {} via {}\n  \
            Display: {} recent, {}/{} top artists, {} genre artists, genres on recent={}\n  \
            Hipster: {}\n  \
            Upstream: {} timeout, {} retries from {}, {} in flight\n  \
            Limits: fan-out {}, deadline {}, {} weeks, {} pages\n  \
            Server: {} (static: {})",
            self.lastfm_username,
            self.lastfm_api_url,
            self.recent_tracks_limit,
            self.top_artists_week_limit,
            self.top_artists_year_limit,
            self.genre_artist_limit,
            self.show_recent_tracks_genres,
            self.hipster_calibration,
            humantime::format_duration(self.upstream_timeout),
            self.upstream_max_retries,
            humantime::format_duration(self.upstream_retry_backoff),
            self.max_concurrent_requests,
            self.fanout_width,
            humantime::format_duration(self.request_deadline),
            self.max_history_weeks,
            self.max_recent_pages,
            self.bind_address(),
            self.static_dir
                .as_ref()
                .map_or("none".to_string(), |dir| dir.display().to_string()),
        )
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}

fn default_concurrency() -> usize {
    (num_cpus::get() * 2).max(4)
}

/// Default configuration values.
///
/// Credentials have no default and must be provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Last.fm
            lastfm_api_key: String::new(),
            lastfm_username: String::new(),
            lastfm_api_url: DEFAULT_API_URL.to_string(),

            // Display
            recent_tracks_limit: 10,
            top_artists_week_limit: 10,
            top_artists_year_limit: 10,
            show_recent_tracks_genres: true,
            genre_artist_limit: 50,
            hipster_calibration: HipsterCalibration::default(),

            // Upstream
            upstream_timeout: Duration::from_secs(10),
            upstream_max_retries: 2,
            upstream_retry_backoff: Duration::from_millis(250),
            max_concurrent_requests: default_concurrency(),

            // Rendimiento
            fanout_width: 8,
            request_deadline: Duration::from_secs(30),
            max_history_weeks: 260,
            max_recent_pages: 10,
            cache_cleanup_interval: Duration::from_secs(300),

            // Servidor
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const CREDENTIALS: [(&str, &str); 2] = [("LASTFM_API_KEY", "secret-key"), ("LASTFM_USERNAME", "rj")];

    #[test]
    fn test_defaults_with_credentials_only() {
        let config = Config::from_lookup(env(&CREDENTIALS)).unwrap();

        assert_eq!(config.lastfm_api_url, DEFAULT_API_URL);
        assert_eq!(config.recent_tracks_limit, 10);
        assert_eq!(config.genre_artist_limit, 50);
        assert!(config.show_recent_tracks_genres);
        assert_eq!(config.hipster_calibration, HipsterCalibration::DASHBOARD);
        assert_eq!(config.request_deadline, Duration::from_secs(30));
        assert!(config.max_concurrent_requests >= 4);
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_lookup_falls_back_to_defaults() {
        let defaults = Config::default();
        assert!(defaults.validate().is_err());

        let config = Config::from_lookup(env(&CREDENTIALS)).unwrap();
        assert_eq!(config.upstream_timeout, defaults.upstream_timeout);
        assert_eq!(config.upstream_retry_backoff, defaults.upstream_retry_backoff);
        assert_eq!(config.cache_cleanup_interval, defaults.cache_cleanup_interval);
        assert_eq!(config.max_history_weeks, defaults.max_history_weeks);
        assert_eq!(config.max_concurrent_requests, defaults.max_concurrent_requests);
        assert_eq!(config.bind_address(), defaults.bind_address());
    }

    #[test]
    fn test_missing_credentials_fail() {
        assert!(Config::from_lookup(env(&[("LASTFM_USERNAME", "rj")])).is_err());
        assert!(Config::from_lookup(env(&[("LASTFM_API_KEY", "k"), ("LASTFM_USERNAME", "  ")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("HIPSTER_CALIBRATION", "classic"),
            ("SHOW_RECENT_TRACKS_GENRES", "false"),
            ("UPSTREAM_MAX_RETRIES", "0"),
            ("PORT", "8080"),
            ("STATIC_DIR", "./static"),
        ]);
        let config = Config::from_lookup(env(&pairs)).unwrap();

        assert_eq!(config.hipster_calibration, HipsterCalibration::CLASSIC);
        assert!(!config.show_recent_tracks_genres);
        assert_eq!(config.retry_policy().max_retries, 0);
        assert_eq!(config.port, 8080);
        assert_eq!(config.static_dir, Some(PathBuf::from("./static")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (name, value) in [
            ("RECENT_TRACKS_LIMIT", "0"),
            ("GENRE_ARTIST_LIMIT", "5000"),
            ("FANOUT_WIDTH", "0"),
            ("UPSTREAM_TIMEOUT_SECS", "0"),
            ("PORT", "not-a-port"),
            ("HIPSTER_CALIBRATION", "average"),
            ("LASTFM_API_URL", "not a url"),
            ("LASTFM_API_URL", "ftp://example.com/"),
        ] {
            let mut pairs = CREDENTIALS.to_vec();
            pairs.push((name, value));
            assert!(Config::from_lookup(env(&pairs)).is_err(), "{name}={value} was accepted");
        }
    }

    #[test]
    fn test_summary_hides_api_key() {
        let config = Config::from_lookup(env(&CREDENTIALS)).unwrap();
        let summary = config.summary();
        assert!(summary.contains("user rj"));
        assert!(summary.contains("10s"));
        assert!(!summary.contains("secret-key"));
    }
}

//! HTTP server implementation using Axum.
//!
//! Every dashboard endpoint answers HTTP 200. When the underlying
//! computation fails or runs past the request deadline, the handler logs it
//! and serves the endpoint's empty shape (`[]`, `{}` or `null`) instead.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::dashboard::profile::GenreProfile;
use crate::dashboard::{ArtistView, Dashboard, DashboardError, TrackView};
use crate::sources::Period;
use crate::stats::{GenreCount, HistoryMode, TimeBucket};

const DEFAULT_HISTORY_WEEKS: usize = 12;

/// Application state shared across handlers.
pub struct AppState {
    pub dashboard: Dashboard,
    /// Upper bound on the time one endpoint may spend computing.
    pub request_deadline: Duration,
}

#[derive(Debug, Deserialize)]
struct PeriodQuery {
    period: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    weeks: Option<String>,
    aggregate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    periods: Option<String>,
}

pub fn router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/last-played", get(last_played))
        .route("/recent-tracks", get(recent_tracks))
        .route("/top-artists", get(top_artists))
        .route("/top-artists-year", get(top_artists_year))
        .route("/weekly-chart-list", get(weekly_chart_list))
        .route("/artist-history/:artist", get(artist_history))
        .route("/genre-profile", get(genre_profile))
        .route("/top-genres", get(top_genres))
        .route("/music-stats", get(music_stats));

    let mut app = Router::new()
        .nest("/api/lastfm", api)
        .route("/health", get(health))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive())
}

/// Binds the listener and serves until `shutdown` resolves.
///
/// Returns the actual bound address (useful when port=0) and the server task.
pub async fn start_server<S>(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    static_dir: Option<PathBuf>,
    shutdown: S,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = router(state, static_dir);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("🌐 Dashboard API listening on http://{}", actual_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("❌ Server error: {:?}", e);
        }
    });

    Ok((actual_addr, handle))
}

/// Runs `work` under the request deadline, degrading to `empty` on failure.
async fn respond<T, F>(state: &AppState, endpoint: &'static str, work: F, empty: T) -> Json<T>
where
    T: Serialize,
    F: Future<Output = Result<T, DashboardError>>,
{
    match tokio::time::timeout(state.request_deadline, work).await {
        Ok(Ok(value)) => Json(value),
        Ok(Err(e)) => {
            warn!(endpoint, error = %e, "Endpoint failed, serving empty result");
            Json(empty)
        }
        Err(_) => {
            warn!(endpoint, deadline = ?state.request_deadline, "Endpoint deadline exceeded, serving empty result");
            Json(empty)
        }
    }
}

async fn last_played(State(state): State<Arc<AppState>>) -> Json<Option<TrackView>> {
    respond(&state, "last-played", state.dashboard.last_played(), None).await
}

async fn recent_tracks(State(state): State<Arc<AppState>>) -> Json<Vec<TrackView>> {
    respond(&state, "recent-tracks", state.dashboard.recent_tracks(), Vec::new()).await
}

async fn top_artists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeriodQuery>,
) -> Json<Vec<ArtistView>> {
    let period = Period::parse_or(query.period.as_deref(), Period::SevenDay);
    respond(&state, "top-artists", state.dashboard.top_artists(period), Vec::new()).await
}

async fn top_artists_year(State(state): State<Arc<AppState>>) -> Json<Vec<ArtistView>> {
    respond(&state, "top-artists-year", state.dashboard.top_artists_year(), Vec::new()).await
}

async fn weekly_chart_list(State(state): State<Arc<AppState>>) -> Json<Vec<Value>> {
    respond(&state, "weekly-chart-list", state.dashboard.weekly_chart_list(), Vec::new()).await
}

async fn artist_history(
    State(state): State<Arc<AppState>>,
    Path(artist): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<TimeBucket>> {
    let weeks = query
        .weeks
        .as_deref()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(DEFAULT_HISTORY_WEEKS);
    let mode = HistoryMode::parse(query.aggregate.as_deref());
    respond(
        &state,
        "artist-history",
        state.dashboard.artist_history(&artist, weeks, mode),
        Vec::new(),
    )
    .await
}

async fn genre_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProfileQuery>,
) -> Json<GenreProfile> {
    let periods = query
        .periods
        .as_deref()
        .map(Period::parse_list)
        .unwrap_or_default();
    respond(
        &state,
        "genre-profile",
        state.dashboard.genre_profile(&periods),
        GenreProfile::new(),
    )
    .await
}

async fn top_genres(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeriodQuery>,
) -> Json<Vec<GenreCount>> {
    let period = Period::parse_or(query.period.as_deref(), Period::OneMonth);
    respond(&state, "top-genres", state.dashboard.top_genres(period), Vec::new()).await
}

async fn music_stats(State(state): State<Arc<AppState>>, Query(query): Query<PeriodQuery>) -> Json<Value> {
    let period = Period::parse_or(query.period.as_deref(), Period::OneMonth);
    let work = async {
        let stats = state.dashboard.music_stats(period).await?;
        Ok::<_, DashboardError>(serde_json::to_value(stats)?)
    };
    respond(&state, "music-stats", work, json!({})).await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let metrics = state.dashboard.cache().metrics();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": metrics,
        "cacheHitRate": metrics.hit_rate(),
    }))
}

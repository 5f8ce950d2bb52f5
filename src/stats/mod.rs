//! # Listening statistics
//!
//! Pure aggregation over upstream data: nothing in here performs I/O.
//!
//! - [`buckets`]: re-bucketing of weekly charts and raw scrobbles into
//!   day/week/month series, including the synthetic current-period bucket.
//! - [`genres`]: genre weighting by artist playcount, top-N ranking and the
//!   cross-period genre profile.
//! - [`hipster`]: the listener-count based hipster score and the per-period
//!   music stats built on it.

pub mod buckets;
pub mod genres;
pub mod hipster;

pub use buckets::{ChartPeriod, HistoryMode, Scrobble, TimeBucket};
pub use genres::GenreCount;
pub use hipster::HipsterCalibration;

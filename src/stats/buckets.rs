use chrono::{Datelike, Days, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sources::payload::stringly;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// A time interval with the play count observed inside it.
///
/// Serialized with the field names the dashboard charts read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    #[serde(rename = "week_start", with = "stringly")]
    pub start: i64,
    #[serde(rename = "week_end", with = "stringly")]
    pub end: i64,
    pub playcount: u64,
}

impl TimeBucket {
    pub fn new(start: i64, end: i64, playcount: u64) -> Self {
        Self {
            start,
            end,
            playcount,
        }
    }
}

/// One upstream weekly chart window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartPeriod {
    pub from: i64,
    pub to: i64,
}

/// A single raw listening event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrobble {
    pub artist: String,
    pub timestamp: Option<i64>,
    pub now_playing: bool,
}

/// How artist history is bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    #[default]
    Week,
    Month,
    Day,
}

impl HistoryMode {
    /// Unknown values fall back to weekly buckets.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("month") => HistoryMode::Month,
            Some("day") => HistoryMode::Day,
            _ => HistoryMode::Week,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryMode::Week => "week",
            HistoryMode::Month => "month",
            HistoryMode::Day => "day",
        }
    }
}

/// Case-insensitive exact artist match.
pub fn same_artist(candidate: &str, artist: &str) -> bool {
    candidate.to_lowercase() == artist.to_lowercase()
}

/// The last `weeks` chart periods, or all of them if there are fewer.
pub fn select_recent_periods(periods: &[ChartPeriod], weeks: usize) -> &[ChartPeriod] {
    &periods[periods.len().saturating_sub(weeks)..]
}

/// Play count for `artist` in one week's chart; zero when absent.
pub fn artist_playcount<'a, I>(entries: I, artist: &str) -> u64
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    entries
        .into_iter()
        .find(|(name, _)| same_artist(name, artist))
        .map(|(_, playcount)| playcount)
        .unwrap_or(0)
}

/// Pairs selected periods with their per-week counts.
pub fn weekly_buckets(periods: &[ChartPeriod], counts: &[u64]) -> Vec<TimeBucket> {
    periods
        .iter()
        .zip(counts)
        .map(|(period, count)| TimeBucket::new(period.from, period.to, *count))
        .collect()
}

/// The `[last_end, now]` window not yet covered by a complete chart period.
pub fn current_gap(buckets: &[TimeBucket], now: i64) -> Option<(i64, i64)> {
    buckets
        .last()
        .filter(|last| now > last.end)
        .map(|last| (last.end, now))
}

/// Counts finished plays of `artist`; now-playing events are incomplete.
pub fn count_plays(events: &[Scrobble], artist: &str) -> u64 {
    events
        .iter()
        .filter(|event| !event.now_playing && same_artist(&event.artist, artist))
        .count() as u64
}

/// Appends the synthetic current-period bucket when `now` is past the last
/// complete period. Returns whether a bucket was added.
pub fn append_current_bucket(buckets: &mut Vec<TimeBucket>, now: i64, playcount: u64) -> bool {
    match current_gap(buckets, now) {
        Some((start, end)) => {
            buckets.push(TimeBucket::new(start, end, playcount));
            true
        }
        None => false,
    }
}

/// Calendar date of `timestamp` in `tz`.
fn local_date<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> Option<NaiveDate> {
    tz.timestamp_opt(timestamp, 0).single().map(|local| local.date_naive())
}

/// Epoch seconds at which `date` begins in `tz`.
///
/// Where midnight itself is skipped by a DST change, the day starts at the
/// first valid hour after it.
fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> i64 {
    (0..3)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|start| start.timestamp())
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc().timestamp())
}

/// Epoch seconds of local midnight for the day containing `timestamp`.
pub fn local_midnight<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> i64 {
    local_date(timestamp, tz)
        .map(|date| start_of_day(date, tz))
        .unwrap_or_else(|| timestamp - timestamp.rem_euclid(SECONDS_PER_DAY))
}

/// The `days` calendar dates ending with the one containing `now`, oldest first.
fn trailing_dates<Tz: TimeZone>(now: i64, days: usize, tz: &Tz) -> Vec<NaiveDate> {
    let Some(today) = local_date(now, tz) else {
        return Vec::new();
    };
    (0..days as u64)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .collect()
}

/// Start of the oldest bucket [`daily_buckets`] would emit.
pub fn daily_window_start<Tz: TimeZone>(now: i64, days: usize, tz: &Tz) -> i64 {
    trailing_dates(now, days.max(1), tz)
        .first()
        .map(|date| start_of_day(*date, tz))
        .unwrap_or_else(|| local_midnight(now, tz))
}

/// One bucket per local calendar day for the `days` days ending today,
/// oldest first.
///
/// A bucket spans midnight to the next midnight, so days around a DST change
/// last 23 or 25 hours. Days without a matching event are present with a
/// zero count. Now-playing events and events without a timestamp are not
/// counted.
pub fn daily_buckets<Tz: TimeZone>(
    events: &[Scrobble],
    artist: &str,
    days: usize,
    now: i64,
    tz: &Tz,
) -> Vec<TimeBucket> {
    let dates = trailing_dates(now, days, tz);
    let mut buckets: Vec<TimeBucket> = dates
        .iter()
        .map(|date| {
            let start = start_of_day(*date, tz);
            let end = date
                .succ_opt()
                .map(|next| start_of_day(next, tz))
                .unwrap_or(start + SECONDS_PER_DAY);
            TimeBucket::new(start, end, 0)
        })
        .collect();

    for event in events {
        if event.now_playing || !same_artist(&event.artist, artist) {
            continue;
        }
        let Some(date) = event.timestamp.and_then(|timestamp| local_date(timestamp, tz)) else {
            continue;
        };
        if let Ok(index) = dates.binary_search(&date) {
            buckets[index].playcount += 1;
        }
    }

    buckets
}

/// Re-groups buckets by the calendar month of their start.
///
/// The emitted bucket's start and end both equal the earliest constituent
/// start; the dashboard only reads `week_start` for monthly points.
pub fn monthly_rollup<Tz: TimeZone>(buckets: &[TimeBucket], tz: &Tz) -> Vec<TimeBucket> {
    let mut months: BTreeMap<(i32, u32), (i64, u64)> = BTreeMap::new();

    for bucket in buckets {
        let key = tz
            .timestamp_opt(bucket.start, 0)
            .single()
            .map(|local| (local.year(), local.month()))
            .unwrap_or((1970, 1));
        let entry = months.entry(key).or_insert((bucket.start, 0));
        entry.0 = entry.0.min(bucket.start);
        entry.1 += bucket.playcount;
    }

    months
        .into_values()
        .map(|(start, playcount)| TimeBucket::new(start, start, playcount))
        .collect()
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Genres kept in the cross-period profile.
pub const PROFILE_GENRES: usize = 8;
/// Genres returned by the single-period ranking.
pub const TOP_GENRES: usize = 10;

/// Per-genre play counts, kept in first-encountered order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreWeights {
    order: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl GenreWeights {
    pub fn add(&mut self, genre: &str, playcount: u64) {
        match self.index.get(genre) {
            Some(&position) => self.order[position].1 += playcount,
            None => {
                self.index.insert(genre.to_string(), self.order.len());
                self.order.push((genre.to_string(), playcount));
            }
        }
    }

    pub fn get(&self, genre: &str) -> u64 {
        self.index
            .get(genre)
            .map(|&position| self.order[position].1)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn total(&self) -> u64 {
        self.order.iter().map(|(_, weight)| weight).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.order.iter().map(|(genre, weight)| (genre.as_str(), *weight))
    }
}

/// A ranked genre with its raw weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: u64,
}

/// Attributes each artist's playcount to its resolved genre.
///
/// Artists resolving to an empty genre are left out entirely.
pub fn weight_genres<'a, I, F>(artists: I, mut resolve_genre: F) -> GenreWeights
where
    I: IntoIterator<Item = (&'a str, u64)>,
    F: FnMut(&str) -> String,
{
    let mut weights = GenreWeights::default();
    for (name, playcount) in artists {
        let genre = resolve_genre(name);
        if !genre.is_empty() {
            weights.add(&genre, playcount);
        }
    }
    weights
}

/// The `limit` heaviest genres, highest first; ties keep first-encountered order.
pub fn top_genres(weights: &GenreWeights, limit: usize) -> Vec<GenreCount> {
    let mut ranked: Vec<(&str, u64)> = weights.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(limit)
        .map(|(genre, count)| GenreCount {
            genre: genre.to_string(),
            count,
        })
        .collect()
}

/// Cross-period genre comparison.
///
/// Picks the `limit` genres with the highest weight summed over all
/// periods, then expresses each period's weight for those genres as a
/// percentage of that period's total over the same set. Every period
/// reports the same genre keys; a period with no plays in the set reports
/// zeros.
pub fn genre_profile<K>(periods: &[(K, GenreWeights)], limit: usize) -> BTreeMap<K, BTreeMap<String, f64>>
where
    K: Ord + Clone,
{
    let mut combined = GenreWeights::default();
    for (_, weights) in periods {
        for (genre, weight) in weights.iter() {
            combined.add(genre, weight);
        }
    }
    let selected: Vec<String> = top_genres(&combined, limit)
        .into_iter()
        .map(|entry| entry.genre)
        .collect();

    periods
        .iter()
        .map(|(period, weights)| {
            let total: u64 = selected.iter().map(|genre| weights.get(genre)).sum();
            let shares = selected
                .iter()
                .map(|genre| {
                    let share = if total == 0 {
                        0.0
                    } else {
                        round_to(weights.get(genre) as f64 * 100.0 / total as f64, 2)
                    };
                    (genre.clone(), share)
                })
                .collect();
            (period.clone(), shares)
        })
        .collect()
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(table: &'static [(&'static str, &'static str)]) -> impl FnMut(&str) -> String {
        move |name| {
            table
                .iter()
                .find(|(artist, _)| *artist == name)
                .map(|(_, genre)| genre.to_string())
                .unwrap_or_default()
        }
    }

    const GENRES: &[(&str, &str)] = &[
        ("Low", "slowcore"),
        ("Duster", "slowcore"),
        ("Slint", "post-rock"),
        ("Mogwai", "post-rock"),
        ("Burial", "electronic"),
        ("Grouper", "ambient"),
    ];

    #[test]
    fn test_weights_sum_and_skip_unknown() {
        let artists = [("Low", 10), ("Duster", 5), ("Slint", 7), ("Nobody", 100)];
        let weights = weight_genres(artists, lookup(GENRES));

        assert_eq!(weights.get("slowcore"), 15);
        assert_eq!(weights.get("post-rock"), 7);
        assert_eq!(weights.get(""), 0);
        assert_eq!(weights.total(), 22);
    }

    #[test]
    fn test_top_genres_ties_keep_first_seen() {
        let artists = [("Burial", 4), ("Grouper", 4), ("Low", 9), ("Slint", 4)];
        let weights = weight_genres(artists, lookup(GENRES));
        let top = top_genres(&weights, 10);

        let order: Vec<&str> = top.iter().map(|entry| entry.genre.as_str()).collect();
        assert_eq!(order, vec!["slowcore", "electronic", "ambient", "post-rock"]);
        assert_eq!(top_genres(&weights, 2).len(), 2);
    }

    #[test]
    fn test_profile_uses_same_keys_everywhere() {
        let month = weight_genres([("Low", 30), ("Slint", 10)], lookup(GENRES));
        let year = weight_genres([("Burial", 50), ("Grouper", 25), ("Low", 5)], lookup(GENRES));
        let silent = GenreWeights::default();

        let profile = genre_profile(
            &[("1month", month), ("12month", year), ("7day", silent)],
            PROFILE_GENRES,
        );

        let keys: Vec<Vec<&String>> = profile.values().map(|shares| shares.keys().collect()).collect();
        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(keys[0].len(), 4);

        for period in ["1month", "12month"] {
            let sum: f64 = profile[period].values().sum();
            assert!((sum - 100.0).abs() <= 0.1, "{period} sums to {sum}");
        }
        assert!(profile["7day"].values().all(|share| *share == 0.0));
        assert_eq!(profile["1month"]["slowcore"], 75.0);
        assert_eq!(profile["1month"]["electronic"], 0.0);
    }

    #[test]
    fn test_profile_limits_genre_set() {
        let many: Vec<(String, u64)> = (0..12).map(|i| (format!("genre-{i}"), 12 - i)).collect();
        let mut weights = GenreWeights::default();
        for (genre, weight) in &many {
            weights.add(genre, *weight);
        }

        let profile = genre_profile(&[("overall", weights)], PROFILE_GENRES);
        let shares = &profile["overall"];
        assert_eq!(shares.len(), PROFILE_GENRES);
        assert!(shares.contains_key("genre-0"));
        assert!(!shares.contains_key("genre-11"));
        let sum: f64 = shares.values().sum();
        assert!((sum - 100.0).abs() <= 0.1);
    }
}

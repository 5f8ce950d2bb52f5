use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::genres::round_to;

/// Constants of the log-scale popularity inversion
/// `score = base - log10(listeners) * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HipsterCalibration {
    pub base: f64,
    pub scale: f64,
}

impl HipsterCalibration {
    /// Legend shown on the dashboard: 100 listeners score 100, 1B score 0.
    pub const DASHBOARD: Self = Self {
        base: 140.0,
        scale: 20.0,
    };

    /// Earlier formula: 1K listeners score 62, 100M score 0.
    pub const CLASSIC: Self = Self {
        base: 100.0,
        scale: 12.5,
    };

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "dashboard" => Some(Self::DASHBOARD),
            "classic" => Some(Self::CLASSIC),
            _ => None,
        }
    }

    /// Popularity-inversion score in `[0, 100]`, truncated toward zero.
    ///
    /// Zero listeners is maximal obscurity.
    pub fn score(&self, listeners: u64) -> u8 {
        if listeners == 0 {
            return 100;
        }
        let raw = self.base - (listeners as f64).log10() * self.scale;
        raw.clamp(0.0, 100.0) as u8
    }
}

impl Default for HipsterCalibration {
    fn default() -> Self {
        Self::DASHBOARD
    }
}

impl fmt::Display for HipsterCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - log10(listeners) * {}", self.base, self.scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HipsterBand {
    UltraHipster,
    Underground,
    Indie,
    Popular,
    Mainstream,
}

impl HipsterBand {
    pub const ALL: [HipsterBand; 5] = [
        HipsterBand::UltraHipster,
        HipsterBand::Underground,
        HipsterBand::Indie,
        HipsterBand::Popular,
        HipsterBand::Mainstream,
    ];

    pub fn from_score(score: u8) -> Self {
        match score {
            85.. => HipsterBand::UltraHipster,
            60..=84 => HipsterBand::Underground,
            35..=59 => HipsterBand::Indie,
            10..=34 => HipsterBand::Popular,
            _ => HipsterBand::Mainstream,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HipsterBand::UltraHipster => "Ultra Hipster",
            HipsterBand::Underground => "Underground",
            HipsterBand::Indie => "Indie",
            HipsterBand::Popular => "Popular",
            HipsterBand::Mainstream => "Mainstream",
        }
    }
}

/// One top artist as seen by the stats aggregate. An artist whose listener
/// lookup failed carries a score of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredArtist {
    pub name: String,
    pub playcount: u64,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistDiversity {
    pub top_artist_name: String,
    pub top_artist_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicStats {
    pub avg_hipster_score: f64,
    pub hipster_distribution: BTreeMap<String, usize>,
    pub artist_diversity: ArtistDiversity,
    pub artist_count: usize,
}

/// Score distribution, mean score and top-artist concentration for one
/// period's ranked artists (highest playcount first).
pub fn music_stats(artists: &[ScoredArtist]) -> MusicStats {
    let mut distribution: BTreeMap<String, usize> = HipsterBand::ALL
        .iter()
        .map(|band| (band.label().to_string(), 0))
        .collect();

    for artist in artists {
        *distribution
            .entry(HipsterBand::from_score(artist.score).label().to_string())
            .or_default() += 1;
    }

    let avg_hipster_score = if artists.is_empty() {
        0.0
    } else {
        let sum: u64 = artists.iter().map(|artist| u64::from(artist.score)).sum();
        round_to(sum as f64 / artists.len() as f64, 1)
    };

    let total_plays: u64 = artists.iter().map(|artist| artist.playcount).sum();
    let artist_diversity = match artists.first() {
        Some(top) if total_plays > 0 => ArtistDiversity {
            top_artist_name: top.name.clone(),
            top_artist_percentage: round_to(top.playcount as f64 * 100.0 / total_plays as f64, 1),
        },
        Some(top) => ArtistDiversity {
            top_artist_name: top.name.clone(),
            top_artist_percentage: 0.0,
        },
        None => ArtistDiversity {
            top_artist_name: String::new(),
            top_artist_percentage: 0.0,
        },
    };

    MusicStats {
        avg_hipster_score,
        hipster_distribution: distribution,
        artist_diversity,
        artist_count: artists.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLES: [u64; 7] = [0, 1, 10, 100, 1_000, 1_000_000, 100_000_000];

    #[test]
    fn test_score_bounds_and_monotonicity() {
        for calibration in [HipsterCalibration::DASHBOARD, HipsterCalibration::CLASSIC] {
            let scores: Vec<u8> = SAMPLES.iter().map(|l| calibration.score(*l)).collect();
            assert_eq!(scores[0], 100);
            assert!(scores.iter().all(|score| *score <= 100));
            assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]), "{scores:?}");
        }
    }

    #[test]
    fn test_score_truncates() {
        // 100 - 3 * 12.5 = 62.5
        assert_eq!(HipsterCalibration::CLASSIC.score(1_000), 62);
        // 140 - 3 * 20 = 80
        assert_eq!(HipsterCalibration::DASHBOARD.score(1_000), 80);
        // 140 - log10(5e6) * 20 = 6.02
        assert_eq!(HipsterCalibration::DASHBOARD.score(5_000_000), 6);
        assert_eq!(HipsterCalibration::DASHBOARD.score(10), 100);
        assert_eq!(HipsterCalibration::DASHBOARD.score(1_000_000_000_000), 0);
    }

    #[test]
    fn test_calibration_parse() {
        assert_eq!(HipsterCalibration::parse("Classic"), Some(HipsterCalibration::CLASSIC));
        assert_eq!(HipsterCalibration::parse("dashboard"), Some(HipsterCalibration::DASHBOARD));
        assert_eq!(HipsterCalibration::parse("average"), None);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(HipsterBand::from_score(100), HipsterBand::UltraHipster);
        assert_eq!(HipsterBand::from_score(85), HipsterBand::UltraHipster);
        assert_eq!(HipsterBand::from_score(84), HipsterBand::Underground);
        assert_eq!(HipsterBand::from_score(60), HipsterBand::Underground);
        assert_eq!(HipsterBand::from_score(35), HipsterBand::Indie);
        assert_eq!(HipsterBand::from_score(10), HipsterBand::Popular);
        assert_eq!(HipsterBand::from_score(9), HipsterBand::Mainstream);
    }

    #[test]
    fn test_music_stats() {
        let artists = vec![
            ScoredArtist { name: "Low".into(), playcount: 50, score: 90 },
            ScoredArtist { name: "Radiohead".into(), playcount: 30, score: 5 },
            ScoredArtist { name: "Duster".into(), playcount: 15, score: 62 },
            ScoredArtist { name: "Unknown".into(), playcount: 5, score: 0 },
        ];

        let stats = music_stats(&artists);

        // (90 + 5 + 62 + 0) / 4 = 39.25
        assert_eq!(stats.avg_hipster_score, 39.3);
        assert_eq!(stats.artist_count, 4);
        assert_eq!(stats.hipster_distribution["Ultra Hipster"], 1);
        assert_eq!(stats.hipster_distribution["Underground"], 1);
        assert_eq!(stats.hipster_distribution["Mainstream"], 2);
        assert_eq!(stats.hipster_distribution["Indie"], 0);
        assert_eq!(stats.hipster_distribution.len(), 5);
        assert_eq!(
            stats.artist_diversity,
            ArtistDiversity {
                top_artist_name: "Low".into(),
                top_artist_percentage: 50.0,
            }
        );
    }

    #[test]
    fn test_music_stats_empty_and_silent() {
        let empty = music_stats(&[]);
        assert_eq!(empty.avg_hipster_score, 0.0);
        assert_eq!(empty.artist_diversity.top_artist_percentage, 0.0);

        let silent = music_stats(&[ScoredArtist { name: "Low".into(), playcount: 0, score: 70 }]);
        assert_eq!(silent.artist_diversity.top_artist_percentage, 0.0);
        assert_eq!(silent.avg_hipster_score, 70.0);
    }

    #[test]
    fn test_music_stats_serialized_names() {
        let json = serde_json::to_value(music_stats(&[])).unwrap();
        assert!(json.get("avgHipsterScore").is_some());
        assert!(json.get("hipsterDistribution").is_some());
        assert!(json["artistDiversity"].get("topArtistPercentage").is_some());
    }
}

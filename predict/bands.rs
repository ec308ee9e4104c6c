//! # Bucketizer
//!
//! Maps a continuous GPA estimate to a fixed range label and an eligibility flag.
//! The bands are half-open `[lower, upper)` intervals that tile the whole real line:
//! the first band has no lower bound and the last has no upper bound.

use serde::{Serialize, Serializer};
use std::fmt;

/// Scores at or above this value are eligible.
pub const ELIGIBILITY_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpaBand {
    Below1_5,
    From1_5To2_0,
    From2_0To2_5,
    From2_5To3_0,
    From3_0To3_5,
    From3_5,
}

impl GpaBand {
    /// Every band in ascending order.
    pub const ALL: [GpaBand; 6] = [
        GpaBand::Below1_5,
        GpaBand::From1_5To2_0,
        GpaBand::From2_0To2_5,
        GpaBand::From2_5To3_0,
        GpaBand::From3_0To3_5,
        GpaBand::From3_5,
    ];

    /// The band containing `score`. Exactly one band matches any finite score.
    pub fn from_score(score: f64) -> Self {
        if score < 1.5 {
            GpaBand::Below1_5
        } else if score < 2.0 {
            GpaBand::From1_5To2_0
        } else if score < 2.5 {
            GpaBand::From2_0To2_5
        } else if score < 3.0 {
            GpaBand::From2_5To3_0
        } else if score < 3.5 {
            GpaBand::From3_0To3_5
        } else {
            GpaBand::From3_5
        }
    }

    /// The display label used in the results table.
    pub fn label(self) -> &'static str {
        match self {
            GpaBand::Below1_5 => "0.0–1.5",
            GpaBand::From1_5To2_0 => "1.5–2.0",
            GpaBand::From2_0To2_5 => "2.0–2.5",
            GpaBand::From2_5To3_0 => "2.5–3.0",
            GpaBand::From3_0To3_5 => "3.0–3.5",
            GpaBand::From3_5 => "3.5–4.0",
        }
    }

    /// Inclusive lower bound, `None` for the open-ended lowest band.
    pub fn lower_bound(self) -> Option<f64> {
        match self {
            GpaBand::Below1_5 => None,
            GpaBand::From1_5To2_0 => Some(1.5),
            GpaBand::From2_0To2_5 => Some(2.0),
            GpaBand::From2_5To3_0 => Some(2.5),
            GpaBand::From3_0To3_5 => Some(3.0),
            GpaBand::From3_5 => Some(3.5),
        }
    }

    /// Exclusive upper bound, `None` for the open-ended highest band.
    pub fn upper_bound(self) -> Option<f64> {
        match self {
            GpaBand::Below1_5 => Some(1.5),
            GpaBand::From1_5To2_0 => Some(2.0),
            GpaBand::From2_0To2_5 => Some(2.5),
            GpaBand::From2_5To3_0 => Some(3.0),
            GpaBand::From3_0To3_5 => Some(3.5),
            GpaBand::From3_5 => None,
        }
    }

    pub fn contains(self, score: f64) -> bool {
        self.lower_bound().is_none_or(|lo| score >= lo)
            && self.upper_bound().is_none_or(|hi| score < hi)
    }
}

/// `true` when the predicted score meets the passing threshold.
pub fn is_eligible(score: f64) -> bool {
    score >= ELIGIBILITY_THRESHOLD
}

impl fmt::Display for GpaBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for GpaBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn boundary_scores_fall_into_the_upper_band() {
        assert_eq!(GpaBand::from_score(2.0), GpaBand::From2_0To2_5);
        assert_eq!(GpaBand::from_score(2.0).label(), "2.0–2.5");
        assert!(is_eligible(2.0));

        assert_eq!(GpaBand::from_score(1.9999), GpaBand::From1_5To2_0);
        assert_eq!(GpaBand::from_score(1.9999).label(), "1.5–2.0");
        assert!(!is_eligible(1.9999));

        assert_eq!(GpaBand::from_score(1.5), GpaBand::From1_5To2_0);
        assert_eq!(GpaBand::from_score(3.5), GpaBand::From3_5);
        assert_eq!(GpaBand::from_score(3.4999999), GpaBand::From3_0To3_5);
    }

    #[test]
    fn extreme_scores_use_the_open_bands() {
        assert_eq!(GpaBand::from_score(-12.0), GpaBand::Below1_5);
        assert_eq!(GpaBand::from_score(f64::NEG_INFINITY), GpaBand::Below1_5);
        assert_eq!(GpaBand::from_score(7.3), GpaBand::From3_5);
        assert_eq!(GpaBand::from_score(7.3).label(), "3.5–4.0");
    }

    #[test]
    fn bands_tile_the_line_without_overlap() {
        for (lower, upper) in GpaBand::ALL.iter().tuple_windows() {
            assert_eq!(lower.upper_bound(), upper.lower_bound());
            assert!(lower < upper);
        }
        assert_eq!(GpaBand::ALL[0].lower_bound(), None);
        assert_eq!(GpaBand::ALL[5].upper_bound(), None);
    }

    #[test]
    fn exactly_one_band_matches_every_score() {
        let mut score = -1.0;
        while score <= 5.0 {
            let matching: Vec<GpaBand> = GpaBand::ALL
                .iter()
                .copied()
                .filter(|b| b.contains(score))
                .collect();
            assert_eq!(matching, vec![GpaBand::from_score(score)], "score {score}");
            assert_eq!(is_eligible(score), score >= 2.0);
            score += 0.01;
        }
    }

    #[test]
    fn band_serializes_as_its_label() {
        let json = serde_json::to_string(&GpaBand::From2_5To3_0).unwrap();
        assert_eq!(json, "\"2.5–3.0\"");
        assert_eq!(GpaBand::From3_0To3_5.to_string(), "3.0–3.5");
    }
}

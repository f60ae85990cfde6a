//! Raw score to label mapping

use domain_types::Label;
use serde::{Deserialize, Serialize};

/// Decision threshold on the raw score. Scores equal to it take the lower branch.
pub const THRESHOLD: f32 = 0.5;

/// Which side of the threshold means "infected"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelPolarity {
    /// `s > 0.5` is infected with confidence `s`
    #[default]
    Standard,
    /// `s > 0.5` is uninfected with confidence `s`, for models trained
    /// with the class order reversed
    Inverted,
}

/// A label with its confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredLabel {
    pub label: Label,
    pub confidence: f64,
}

impl LabelPolarity {
    /// Map a raw score in [0, 1] to a label and a confidence in [0.5, 1]
    pub fn apply(&self, score: f32) -> ScoredLabel {
        let score = f64::from(score.clamp(0.0, 1.0));
        let above = score > f64::from(THRESHOLD);

        let (upper, lower) = match self {
            LabelPolarity::Standard => (Label::Infected, Label::Uninfected),
            LabelPolarity::Inverted => (Label::Uninfected, Label::Infected),
        };

        if above {
            ScoredLabel {
                label: upper,
                confidence: score,
            }
        } else {
            ScoredLabel {
                label: lower,
                confidence: 1.0 - score,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDARY: [f32; 5] = [0.0, 0.499999, 0.5, 0.500001, 1.0];

    #[test]
    fn test_standard_boundaries() {
        let expected = [
            Label::Uninfected,
            Label::Uninfected,
            Label::Uninfected,
            Label::Infected,
            Label::Infected,
        ];
        for (score, label) in BOUNDARY.iter().zip(expected) {
            assert_eq!(LabelPolarity::Standard.apply(*score).label, label, "score {score}");
        }

        let at_half = LabelPolarity::Standard.apply(0.5);
        assert_eq!(at_half.confidence, 0.5);
        assert_eq!(LabelPolarity::Standard.apply(1.0).confidence, 1.0);
        assert_eq!(LabelPolarity::Standard.apply(0.0).confidence, 1.0);
    }

    #[test]
    fn test_inverted_boundaries() {
        let expected = [
            Label::Infected,
            Label::Infected,
            Label::Infected,
            Label::Uninfected,
            Label::Uninfected,
        ];
        for (score, label) in BOUNDARY.iter().zip(expected) {
            assert_eq!(LabelPolarity::Inverted.apply(*score).label, label, "score {score}");
        }

        let high = LabelPolarity::Inverted.apply(0.9);
        assert_eq!(high.label, Label::Uninfected);
        assert!((high.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let scored = LabelPolarity::Standard.apply(1.7);
        assert_eq!(scored.label, Label::Infected);
        assert_eq!(scored.confidence, 1.0);
        assert_eq!(LabelPolarity::Standard.apply(-3.0).confidence, 1.0);
    }

    #[test]
    fn test_polarity_serde() {
        let p: LabelPolarity = serde_json::from_str("\"inverted\"").unwrap();
        assert_eq!(p, LabelPolarity::Inverted);
        assert_eq!(LabelPolarity::default(), LabelPolarity::Standard);
    }

    proptest! {
        #[test]
        fn prop_confidence_is_at_least_half(score in 0.0f32..=1.0) {
            for polarity in [LabelPolarity::Standard, LabelPolarity::Inverted] {
                let scored = polarity.apply(score);
                prop_assert!((0.5..=1.0).contains(&scored.confidence));
            }
        }

        #[test]
        fn prop_schemes_disagree_everywhere(score in 0.0f32..=1.0) {
            let a = LabelPolarity::Standard.apply(score);
            let b = LabelPolarity::Inverted.apply(score);
            prop_assert_ne!(a.label, b.label);
            prop_assert_eq!(a.confidence, b.confidence);
        }
    }
}

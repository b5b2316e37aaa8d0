use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GenderPreference;

/// Preference axes a quiz answer can move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceDimension {
    Intensity,
    Warmth,
    Freshness,
    Sweetness,
    Complexity,
}

impl PreferenceDimension {
    /// Fixed order used for profile vectors
    pub const ALL: [PreferenceDimension; 5] = [
        PreferenceDimension::Intensity,
        PreferenceDimension::Warmth,
        PreferenceDimension::Freshness,
        PreferenceDimension::Sweetness,
        PreferenceDimension::Complexity,
    ];

    pub fn descriptor(&self) -> &'static str {
        match self {
            PreferenceDimension::Intensity => "bold",
            PreferenceDimension::Warmth => "warm",
            PreferenceDimension::Freshness => "fresh",
            PreferenceDimension::Sweetness => "sweet",
            PreferenceDimension::Complexity => "sophisticated",
        }
    }
}

/// Scent personality derived from quiz answers
///
/// Always rebuilt from the response sequence, never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    scores: BTreeMap<PreferenceDimension, f64>,
    confidence: f64,
    descriptors: Vec<String>,
    gender_preference: GenderPreference,
    preferred_accords: Vec<String>,
}

impl PersonalityProfile {
    /// Scores and confidence are clamped to [0, 1]; missing dimensions default to neutral
    pub fn new(
        scores: BTreeMap<PreferenceDimension, f64>,
        confidence: f64,
        descriptors: Vec<String>,
        gender_preference: GenderPreference,
        preferred_accords: Vec<String>,
    ) -> Self {
        let scores = PreferenceDimension::ALL
            .into_iter()
            .map(|dim| {
                let value = scores.get(&dim).copied().unwrap_or(NEUTRAL_SCORE);
                (dim, clamp_unit(value))
            })
            .collect();

        Self {
            scores,
            confidence: clamp_unit(confidence),
            descriptors,
            gender_preference,
            preferred_accords,
        }
    }

    pub fn score(&self, dimension: PreferenceDimension) -> f64 {
        self.scores.get(&dimension).copied().unwrap_or(NEUTRAL_SCORE)
    }

    pub fn scores(&self) -> &BTreeMap<PreferenceDimension, f64> {
        &self.scores
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn descriptors(&self) -> &[String] {
        &self.descriptors
    }

    pub fn gender_preference(&self) -> GenderPreference {
        self.gender_preference
    }

    pub fn preferred_accords(&self) -> &[String] {
        &self.preferred_accords
    }

    /// Dimension scores in `PreferenceDimension::ALL` order
    pub fn vector(&self) -> Vec<f32> {
        PreferenceDimension::ALL
            .iter()
            .map(|dim| self.score(*dim) as f32)
            .collect()
    }

    /// Returns a copy with the confidence scaled by `factor`
    pub fn with_confidence_factor(&self, factor: f64) -> Self {
        let mut adjusted = self.clone();
        adjusted.confidence = clamp_unit(self.confidence * factor);
        adjusted
    }
}

pub const NEUTRAL_SCORE: f64 = 0.5;

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        NEUTRAL_SCORE
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_and_fills_dimensions() {
        let mut scores = BTreeMap::new();
        scores.insert(PreferenceDimension::Intensity, 1.4);
        scores.insert(PreferenceDimension::Warmth, -0.2);
        let profile = PersonalityProfile::new(
            scores,
            2.0,
            vec![],
            GenderPreference::NoPreference,
            vec![],
        );
        assert_eq!(profile.score(PreferenceDimension::Intensity), 1.0);
        assert_eq!(profile.score(PreferenceDimension::Warmth), 0.0);
        assert_eq!(profile.score(PreferenceDimension::Freshness), NEUTRAL_SCORE);
        assert_eq!(profile.confidence(), 1.0);
        assert_eq!(profile.vector().len(), PreferenceDimension::ALL.len());
    }

    #[test]
    fn test_confidence_factor_stays_in_range() {
        let profile = PersonalityProfile::new(
            BTreeMap::new(),
            0.8,
            vec![],
            GenderPreference::Men,
            vec![],
        );
        assert_eq!(profile.with_confidence_factor(2.0).confidence(), 1.0);
        assert!((profile.with_confidence_factor(0.5).confidence() - 0.4).abs() < 1e-9);
        assert_eq!(profile.confidence(), 0.8);
    }
}

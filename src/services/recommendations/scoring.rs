use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{Fragrance, PersonalityProfile, PreferenceDimension, NEUTRAL_SCORE};

use PreferenceDimension::{Complexity, Freshness, Intensity, Sweetness, Warmth};

/// Share of the personal rule score taken by dimension similarity when accords are known
const DIMENSION_WEIGHT: f64 = 0.7;
const ACCORD_WEIGHT: f64 = 0.3;

/// Preferred accords needed for a full overlap score
const FULL_OVERLAP: usize = 3;

/// Dimension targets implied by an accord keyword; an accord matches every keyword it contains
const ACCORD_TABLE: &[(&str, &[(PreferenceDimension, f64)])] = &[
    ("citrus", &[(Freshness, 0.9), (Sweetness, 0.3), (Warmth, 0.2)]),
    ("aquatic", &[(Freshness, 0.95), (Warmth, 0.1)]),
    ("fresh", &[(Freshness, 0.85)]),
    ("green", &[(Freshness, 0.8), (Complexity, 0.4)]),
    ("aromatic", &[(Freshness, 0.6), (Complexity, 0.5)]),
    ("herbal", &[(Freshness, 0.65), (Complexity, 0.5)]),
    ("floral", &[(Sweetness, 0.6), (Freshness, 0.55)]),
    ("rose", &[(Sweetness, 0.6), (Complexity, 0.55)]),
    ("jasmine", &[(Sweetness, 0.6), (Intensity, 0.6)]),
    ("woody", &[(Warmth, 0.7), (Complexity, 0.6)]),
    ("cedar", &[(Warmth, 0.6), (Freshness, 0.4)]),
    ("sandalwood", &[(Warmth, 0.75), (Sweetness, 0.5)]),
    ("vetiver", &[(Complexity, 0.7), (Warmth, 0.55)]),
    ("amber", &[(Warmth, 0.9), (Intensity, 0.75)]),
    ("oriental", &[(Warmth, 0.85), (Complexity, 0.7)]),
    ("spicy", &[(Warmth, 0.8), (Intensity, 0.7)]),
    ("vanilla", &[(Sweetness, 0.85), (Warmth, 0.7)]),
    ("sweet", &[(Sweetness, 0.9)]),
    ("caramel", &[(Sweetness, 0.95), (Warmth, 0.6)]),
    ("gourmand", &[(Sweetness, 0.9), (Warmth, 0.65)]),
    ("leather", &[(Intensity, 0.85), (Complexity, 0.75)]),
    ("oud", &[(Intensity, 0.95), (Complexity, 0.85), (Warmth, 0.8)]),
    ("musk", &[(Warmth, 0.55), (Sweetness, 0.45)]),
    ("powdery", &[(Sweetness, 0.55), (Complexity, 0.5)]),
    ("aldehydic", &[(Complexity, 0.8), (Freshness, 0.55)]),
];

/// Averages the dimension targets of every accord; dimensions no accord speaks to stay neutral
pub fn fragrance_dimensions(fragrance: &Fragrance) -> BTreeMap<PreferenceDimension, f64> {
    let mut totals: BTreeMap<PreferenceDimension, (f64, u32)> = BTreeMap::new();

    for accord in &fragrance.accords {
        for (keyword, targets) in ACCORD_TABLE {
            if accord.contains(keyword) {
                for (dimension, value) in *targets {
                    let entry = totals.entry(*dimension).or_insert((0.0, 0));
                    entry.0 += value;
                    entry.1 += 1;
                }
            }
        }
    }

    PreferenceDimension::ALL
        .into_iter()
        .map(|dim| {
            let value = match totals.get(&dim) {
                Some((sum, count)) if *count > 0 => sum / *count as f64,
                _ => NEUTRAL_SCORE,
            };
            (dim, value)
        })
        .collect()
}

/// 1 minus the mean absolute distance between profile and fragrance, in [0, 1]
pub fn dimension_similarity(profile: &PersonalityProfile, fragrance: &Fragrance) -> f64 {
    let targets = fragrance_dimensions(fragrance);
    let distance: f64 = PreferenceDimension::ALL
        .iter()
        .map(|dim| {
            let target = targets.get(dim).copied().unwrap_or(NEUTRAL_SCORE);
            (profile.score(*dim) - target).abs()
        })
        .sum::<f64>()
        / PreferenceDimension::ALL.len() as f64;

    (1.0 - distance).clamp(0.0, 1.0)
}

/// Fragrance accords that match one of the profile's preferred accords
pub fn matched_accords(profile: &PersonalityProfile, fragrance: &Fragrance) -> Vec<String> {
    let mut matched: Vec<String> = fragrance
        .accords
        .iter()
        .filter(|accord| {
            profile
                .preferred_accords()
                .iter()
                .any(|preferred| accord.contains(preferred.as_str()))
        })
        .cloned()
        .collect();
    matched.dedup();
    matched
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleScore {
    pub score: f64,
    pub matched_accords: Vec<String>,
}

/// Weighted accord/attribute overlap, leaning on popularity when confidence is low
///
/// `popularity_prior` is the fragrance's popularity normalized to [0, 1] within the pool.
pub fn rule_score(
    profile: &PersonalityProfile,
    fragrance: &Fragrance,
    popularity_prior: f64,
) -> RuleScore {
    let similarity = dimension_similarity(profile, fragrance);
    let matched = matched_accords(profile, fragrance);

    let personal = if profile.preferred_accords().is_empty() {
        similarity
    } else {
        let wanted = profile.preferred_accords().len().min(FULL_OVERLAP);
        let overlap = (matched.len() as f64 / wanted as f64).min(1.0);
        DIMENSION_WEIGHT * similarity + ACCORD_WEIGHT * overlap
    };

    let personal_weight = 0.5 + 0.5 * profile.confidence();
    let prior = popularity_prior.clamp(0.0, 1.0);
    let score = personal_weight * personal + (1.0 - personal_weight) * prior;

    RuleScore {
        score: score.clamp(0.0, 1.0),
        matched_accords: matched,
    }
}

/// Weighted sum of embedding and rule scores; a missing score counts as zero
pub fn blend(embedding: Option<f64>, rule: Option<f64>, embedding_weight: f64) -> f64 {
    let weight = embedding_weight.clamp(0.0, 1.0);
    weight * embedding.unwrap_or(0.0) + (1.0 - weight) * rule.unwrap_or(0.0)
}

/// Popularity scaled against the most popular fragrance in the pool
pub fn popularity_prior(fragrance: &Fragrance, max_popularity: f64) -> f64 {
    if max_popularity > 0.0 && fragrance.popularity_score.is_finite() {
        (fragrance.popularity_score / max_popularity).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Score descending, then popularity descending, then id ascending
pub fn compare_ranked(a: (f64, &Fragrance), b: (f64, &Fragrance)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.popularity_score.total_cmp(&a.1.popularity_score))
        .then_with(|| a.1.id.cmp(&b.1.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, GenderPreference};

    fn fragrance(id: &str, accords: &[&str], popularity: f64) -> Fragrance {
        Fragrance {
            id: id.to_string(),
            name: id.to_string(),
            brand: "Test".to_string(),
            gender: Gender::Unisex,
            accords: accords.iter().map(|a| a.to_string()).collect(),
            popularity_score: popularity,
        }
    }

    fn profile(
        scores: &[(PreferenceDimension, f64)],
        accords: &[&str],
        confidence: f64,
    ) -> PersonalityProfile {
        PersonalityProfile::new(
            scores.iter().copied().collect(),
            confidence,
            vec![],
            GenderPreference::NoPreference,
            accords.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[test]
    fn test_fragrance_dimensions_average_accords() {
        let dims = fragrance_dimensions(&fragrance("a", &["vanilla", "sweet"], 1.0));
        assert!((dims[&Sweetness] - 0.875).abs() < 1e-9);
        assert!((dims[&Warmth] - 0.7).abs() < 1e-9);
        assert_eq!(dims[&Freshness], NEUTRAL_SCORE);
    }

    #[test]
    fn test_similarity_prefers_closer_fragrance() {
        let fresh_lover = profile(&[(Freshness, 0.95), (Warmth, 0.2)], &[], 1.0);
        let fresh = fragrance("fresh", &["aquatic", "citrus"], 1.0);
        let warm = fragrance("warm", &["amber", "oud"], 1.0);
        assert!(
            dimension_similarity(&fresh_lover, &fresh) > dimension_similarity(&fresh_lover, &warm)
        );
    }

    #[test]
    fn test_rule_score_rewards_accord_overlap() {
        let woody_lover = profile(&[], &["woody", "cedar", "vetiver"], 1.0);
        let woody = fragrance("woody", &["woody", "cedar"], 1.0);
        let floral = fragrance("floral", &["floral", "rose"], 1.0);

        let woody_score = rule_score(&woody_lover, &woody, 0.0);
        let floral_score = rule_score(&woody_lover, &floral, 0.0);
        assert!(woody_score.score > floral_score.score);
        assert_eq!(woody_score.matched_accords, vec!["woody", "cedar"]);
        assert!(floral_score.matched_accords.is_empty());
    }

    #[test]
    fn test_low_confidence_leans_on_popularity() {
        let unsure = profile(&[], &[], 0.0);
        let a = fragrance("a", &["woody"], 100.0);
        let b = fragrance("b", &["woody"], 10.0);
        let a_score = rule_score(&unsure, &a, popularity_prior(&a, 100.0));
        let b_score = rule_score(&unsure, &b, popularity_prior(&b, 100.0));
        assert!(a_score.score > b_score.score);
    }

    #[test]
    fn test_blend_missing_counts_as_zero() {
        assert!((blend(Some(0.8), Some(0.5), 0.6) - 0.68).abs() < 1e-9);
        assert!((blend(None, Some(0.5), 0.6) - 0.2).abs() < 1e-9);
        assert!((blend(Some(1.0), None, 2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_ranked_tie_breaks() {
        let popular = fragrance("zeta", &[], 90.0);
        let niche = fragrance("alpha", &[], 10.0);
        let twin = fragrance("beta", &[], 10.0);

        assert_eq!(compare_ranked((0.9, &niche), (0.5, &popular)), Ordering::Less);
        assert_eq!(compare_ranked((0.5, &popular), (0.5, &niche)), Ordering::Less);
        assert_eq!(compare_ranked((0.5, &niche), (0.5, &twin)), Ordering::Less);
    }
}

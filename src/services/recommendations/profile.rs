use std::collections::BTreeMap;

use crate::models::{
    quiz::effective_answers, GenderPreference, PersonalityProfile, PreferenceDimension,
    QuestionId, QuizResponse, NEUTRAL_SCORE,
};

use PreferenceDimension::{Complexity, Freshness, Intensity, Sweetness, Warmth};

/// Dimensions above this score become descriptors
const DESCRIPTOR_THRESHOLD: f64 = 0.65;

const BALANCED_DESCRIPTOR: &str = "balanced";

type Deltas = &'static [(PreferenceDimension, f64)];

/// How one answer moves the profile away from neutral
fn answer_deltas(question: QuestionId, answer: &str) -> Deltas {
    match (question, answer) {
        (QuestionId::Intensity, "light" | "subtle" | "soft") => &[(Intensity, -0.3)],
        (QuestionId::Intensity, "bold" | "strong" | "intense") => &[(Intensity, 0.35)],

        (QuestionId::ScentFamily, "fresh" | "citrus" | "aquatic" | "green") => {
            &[(Freshness, 0.3), (Warmth, -0.1)]
        }
        (QuestionId::ScentFamily, "floral") => &[(Sweetness, 0.15), (Freshness, 0.1)],
        (QuestionId::ScentFamily, "woody") => &[(Warmth, 0.2), (Complexity, 0.15)],
        (QuestionId::ScentFamily, "oriental" | "amber" | "spicy") => {
            &[(Warmth, 0.3), (Intensity, 0.15)]
        }
        (QuestionId::ScentFamily, "gourmand") => &[(Sweetness, 0.35), (Warmth, 0.15)],

        (QuestionId::Occasion, "daily" | "office" | "work" | "casual") => {
            &[(Freshness, 0.1), (Intensity, -0.1)]
        }
        (QuestionId::Occasion, "evening" | "date" | "night") => &[(Intensity, 0.2), (Warmth, 0.1)],
        (QuestionId::Occasion, "special" | "formal") => &[(Complexity, 0.2)],

        (QuestionId::Season, "spring" | "summer") => &[(Freshness, 0.2), (Warmth, -0.1)],
        (QuestionId::Season, "fall" | "autumn" | "winter") => &[(Warmth, 0.2), (Freshness, -0.1)],

        (QuestionId::Personality, "adventurous" | "bold") => {
            &[(Complexity, 0.15), (Intensity, 0.1)]
        }
        (QuestionId::Personality, "romantic") => &[(Sweetness, 0.15), (Warmth, 0.05)],
        (QuestionId::Personality, "classic" | "elegant" | "sophisticated") => &[(Complexity, 0.2)],
        (QuestionId::Personality, "playful") => &[(Sweetness, 0.1), (Freshness, 0.1)],
        (QuestionId::Personality, "minimalist" | "calm") => &[(Freshness, 0.1), (Intensity, -0.15)],

        (QuestionId::Sweetness, "low" | "none" | "not_sweet") => &[(Sweetness, -0.3)],
        (QuestionId::Sweetness, "high" | "very_sweet") => &[(Sweetness, 0.3)],

        (QuestionId::ExperienceLevel, "beginner") => &[(Complexity, -0.2)],
        (QuestionId::ExperienceLevel, "enthusiast") => &[(Complexity, 0.1)],
        (QuestionId::ExperienceLevel, "collector" | "expert") => &[(Complexity, 0.25)],

        _ => &[],
    }
}

/// Accords a scent family answer points the rule scorer at
fn family_accords(answer: &str) -> &'static [&'static str] {
    match answer {
        "fresh" | "aquatic" => &["fresh", "aquatic", "citrus", "green"],
        "citrus" => &["citrus", "fresh", "aromatic"],
        "green" => &["green", "herbal", "fresh"],
        "floral" => &["floral", "rose", "jasmine", "white floral"],
        "woody" => &["woody", "cedar", "sandalwood", "vetiver"],
        "oriental" | "amber" => &["amber", "oriental", "vanilla", "spicy"],
        "spicy" => &["spicy", "warm spicy", "amber"],
        "gourmand" => &["vanilla", "sweet", "caramel", "gourmand"],
        _ => &[],
    }
}

/// Builds a profile from an ordered response sequence
///
/// Only the last answer per question counts. Unknown answers are accepted but move
/// nothing. Confidence is the share of distinct questions answered.
pub fn build_profile(responses: &[QuizResponse]) -> PersonalityProfile {
    let answers = effective_answers(responses);

    let mut scores: BTreeMap<PreferenceDimension, f64> = PreferenceDimension::ALL
        .into_iter()
        .map(|dim| (dim, NEUTRAL_SCORE))
        .collect();

    for (question, answer) in &answers {
        for (dimension, delta) in answer_deltas(*question, answer) {
            if let Some(score) = scores.get_mut(dimension) {
                *score += delta;
            }
        }
    }

    let gender_preference = answers
        .get(&QuestionId::GenderPreference)
        .map(|answer| GenderPreference::from_answer(answer))
        .unwrap_or_default();

    let preferred_accords = answers
        .get(&QuestionId::ScentFamily)
        .map(|answer| family_accords(answer).iter().map(|a| a.to_string()).collect())
        .unwrap_or_default();

    let mut descriptors: Vec<String> = PreferenceDimension::ALL
        .into_iter()
        .filter(|dim| scores.get(dim).copied().unwrap_or(NEUTRAL_SCORE) > DESCRIPTOR_THRESHOLD)
        .map(|dim| dim.descriptor().to_string())
        .collect();
    if descriptors.is_empty() {
        descriptors.push(BALANCED_DESCRIPTOR.to_string());
    }

    let confidence = answers.len() as f64 / QuestionId::ALL.len() as f64;

    PersonalityProfile::new(
        scores,
        confidence,
        descriptors,
        gender_preference,
        preferred_accords,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_responses_give_neutral_profile() {
        let profile = build_profile(&[]);
        for dim in PreferenceDimension::ALL {
            assert_eq!(profile.score(dim), NEUTRAL_SCORE);
        }
        assert_eq!(profile.confidence(), 0.0);
        assert_eq!(profile.descriptors(), &["balanced".to_string()]);
        assert_eq!(profile.gender_preference(), GenderPreference::NoPreference);
    }

    #[test]
    fn test_later_answer_overrides_earlier() {
        let profile = build_profile(&[
            QuizResponse::new(QuestionId::Intensity, "light"),
            QuizResponse::new(QuestionId::Intensity, "bold"),
        ]);
        assert!((profile.score(Intensity) - 0.85).abs() < 1e-9);
        assert!(profile.descriptors().contains(&"bold".to_string()));
        assert!((profile.confidence() - 1.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_family_sets_accords_and_gender() {
        let profile = build_profile(&[
            QuizResponse::new(QuestionId::GenderPreference, "women"),
            QuizResponse::new(QuestionId::ScentFamily, "woody"),
            QuizResponse::new(QuestionId::Season, "winter"),
        ]);
        assert_eq!(profile.gender_preference(), GenderPreference::Women);
        assert!(profile.preferred_accords().contains(&"cedar".to_string()));
        assert!((profile.score(Warmth) - 0.9).abs() < 1e-9);
        assert!(profile.descriptors().contains(&"warm".to_string()));
    }

    #[test]
    fn test_stacked_deltas_are_clamped() {
        let profile = build_profile(&[
            QuizResponse::new(QuestionId::ScentFamily, "gourmand"),
            QuizResponse::new(QuestionId::Sweetness, "very_sweet"),
            QuizResponse::new(QuestionId::Personality, "romantic"),
        ]);
        assert_eq!(profile.score(Sweetness), 1.0);
    }

    #[test]
    fn test_unknown_answer_moves_nothing() {
        let profile = build_profile(&[QuizResponse::new(QuestionId::Season, "monsoon")]);
        for dim in PreferenceDimension::ALL {
            assert_eq!(profile.score(dim), NEUTRAL_SCORE);
        }
    }
}

use serde::{Deserialize, Serialize};

/// Declared gender target of a fragrance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Men,
    Women,
    Unisex,
}

impl Gender {
    /// Lenient parse of catalog values; anything unrecognized is unisex
    pub fn from_catalog(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "men" | "male" | "masculine" | "for men" => Gender::Men,
            "women" | "female" | "feminine" | "for women" => Gender::Women,
            _ => Gender::Unisex,
        }
    }

    pub fn is_compatible_with(&self, preference: GenderPreference) -> bool {
        match (preference, self) {
            (GenderPreference::NoPreference, _) => true,
            (_, Gender::Unisex) => true,
            (GenderPreference::Unisex, _) => false,
            (GenderPreference::Men, Gender::Men) => true,
            (GenderPreference::Women, Gender::Women) => true,
            _ => false,
        }
    }
}

/// Gender preference stated in the quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenderPreference {
    Men,
    Women,
    Unisex,
    #[default]
    NoPreference,
}

impl GenderPreference {
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "men" | "masculine" | "for_men" => GenderPreference::Men,
            "women" | "feminine" | "for_women" => GenderPreference::Women,
            "unisex" | "gender_neutral" => GenderPreference::Unisex,
            _ => GenderPreference::NoPreference,
        }
    }
}

/// Candidate fragrance as known to the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragrance {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub gender: Gender,
    pub accords: Vec<String>,
    pub popularity_score: f64,
}

/// One entry of a similarity ranking from the embedding provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub fragrance_id: String,
    pub similarity: f64,
}

/// Outcome of resolving an externally supplied fragrance identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    pub alternates_tried: Vec<String>,
}

/// A name-index hit used by fuzzy identifier resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameMatch {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub popularity_score: f64,
}

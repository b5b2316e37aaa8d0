use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::str::FromStr;

use super::quiz::{effective_answers, QuizResponse};

/// Recommendation strategy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Rule,
    Embedding,
    #[default]
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Rule => "rule",
            Strategy::Embedding => "embedding",
            Strategy::Hybrid => "hybrid",
        }
    }

    pub fn uses_embedding(&self) -> bool {
        matches!(self, Strategy::Embedding | Strategy::Hybrid)
    }

    pub fn uses_rule(&self) -> bool {
        matches!(self, Strategy::Rule | Strategy::Hybrid)
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" | "rule_based" | "rules" => Ok(Strategy::Rule),
            "embedding" | "vector" | "ai" => Ok(Strategy::Embedding),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// The scoring path that actually produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Rule,
    Embedding,
    Hybrid,
    Popularity,
}

/// How much of the requested personalization survived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personalization {
    Full,
    Partial,
    None,
}

/// One ranked recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragranceMatch {
    pub fragrance_id: String,
    pub name: String,
    pub brand: String,
    pub score: f64,
    pub rationale: String,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub matches: Vec<FragranceMatch>,
    pub generated_at: DateTime<Utc>,
    pub requested_strategy: Strategy,
    pub strategy: ResultSource,
    pub personalization_applied: bool,
    pub personalization: Personalization,
    /// Strategies that had to be skipped for this invocation
    #[serde(default)]
    pub degraded: Vec<Strategy>,
}

/// Deterministic cache key for a recommendation request
///
/// Derived from the last answer per question (sorted by question), the strategy and the
/// limit. Answer timestamps and submission order of distinct questions never affect it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(responses: &[QuizResponse], strategy: Strategy, limit: usize) -> Self {
        let mut canonical = String::new();
        for (question, answer) in effective_answers(responses) {
            canonical.push_str(question.as_str());
            canonical.push('=');
            canonical.push_str(&answer.trim().to_lowercase());
            canonical.push('\n');
        }
        canonical.push_str(&format!("strategy={}\nlimit={}", strategy, limit));

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionId;
    use chrono::TimeZone;

    fn response_at(question: QuestionId, answer: &str, secs: i64) -> QuizResponse {
        QuizResponse {
            question_id: question,
            answer_value: answer.to_string(),
            answered_at: Some(Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    #[test]
    fn test_fingerprint_ignores_timestamps_and_question_order() {
        let a = vec![
            response_at(QuestionId::Intensity, "bold", 10),
            response_at(QuestionId::Season, "winter", 20),
        ];
        let b = vec![
            response_at(QuestionId::Season, "winter", 500),
            response_at(QuestionId::Intensity, "bold", 100),
        ];
        assert_eq!(
            Fingerprint::compute(&a, Strategy::Hybrid, 10),
            Fingerprint::compute(&b, Strategy::Hybrid, 10)
        );
    }

    #[test]
    fn test_fingerprint_depends_on_strategy_and_limit() {
        let responses = vec![QuizResponse::new(QuestionId::Intensity, "bold")];
        let base = Fingerprint::compute(&responses, Strategy::Hybrid, 10);
        assert_ne!(base, Fingerprint::compute(&responses, Strategy::Rule, 10));
        assert_ne!(base, Fingerprint::compute(&responses, Strategy::Hybrid, 5));
    }

    #[test]
    fn test_fingerprint_uses_overriding_answer() {
        let overridden = vec![
            QuizResponse::new(QuestionId::Intensity, "light"),
            QuizResponse::new(QuestionId::Intensity, "bold"),
        ];
        let direct = vec![QuizResponse::new(QuestionId::Intensity, "bold")];
        assert_eq!(
            Fingerprint::compute(&overridden, Strategy::Rule, 3),
            Fingerprint::compute(&direct, Strategy::Rule, 3)
        );
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("HYBRID".parse::<Strategy>(), Ok(Strategy::Hybrid));
        assert_eq!("rule_based".parse::<Strategy>(), Ok(Strategy::Rule));
        assert!("magic".parse::<Strategy>().is_err());
        assert!(Strategy::Hybrid.uses_embedding() && Strategy::Hybrid.uses_rule());
        assert!(!Strategy::Rule.uses_embedding());
    }
}

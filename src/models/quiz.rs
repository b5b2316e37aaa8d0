use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use super::Strategy;

/// The fixed set of questions the quiz can ask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionId {
    GenderPreference,
    ExperienceLevel,
    ScentFamily,
    Intensity,
    Occasion,
    Season,
    Personality,
    Sweetness,
}

impl QuestionId {
    pub const ALL: [QuestionId; 8] = [
        QuestionId::GenderPreference,
        QuestionId::ExperienceLevel,
        QuestionId::ScentFamily,
        QuestionId::Intensity,
        QuestionId::Occasion,
        QuestionId::Season,
        QuestionId::Personality,
        QuestionId::Sweetness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionId::GenderPreference => "gender_preference",
            QuestionId::ExperienceLevel => "experience_level",
            QuestionId::ScentFamily => "scent_family",
            QuestionId::Intensity => "intensity",
            QuestionId::Occasion => "occasion",
            QuestionId::Season => "season",
            QuestionId::Personality => "personality",
            QuestionId::Sweetness => "sweetness",
        }
    }
}

impl Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QuestionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        QuestionId::ALL
            .into_iter()
            .find(|q| q.as_str() == wanted)
            .ok_or_else(|| format!("unknown question id '{}'", s))
    }
}

/// One question/answer pair as received from the caller
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RawQuizResponse {
    #[serde(default)]
    pub question_id: String,
    #[serde(default, alias = "answer")]
    pub answer_value: String,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

/// Raw quiz submission before validation
#[derive(Debug, Clone, Deserialize, Default)]
pub struct QuizSubmission {
    #[serde(default)]
    pub responses: Vec<RawQuizResponse>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A validated quiz answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResponse {
    pub question_id: QuestionId,
    pub answer_value: String,
    pub answered_at: Option<DateTime<Utc>>,
}

impl QuizResponse {
    pub fn new(question_id: QuestionId, answer_value: impl Into<String>) -> Self {
        Self {
            question_id,
            answer_value: answer_value.into(),
            answered_at: None,
        }
    }
}

/// Folds an ordered response sequence down to the last answer given per question
pub fn effective_answers(responses: &[QuizResponse]) -> BTreeMap<QuestionId, &str> {
    let mut answers = BTreeMap::new();
    for response in responses {
        answers.insert(response.question_id, response.answer_value.as_str());
    }
    answers
}

/// A fully validated and normalized quiz request
#[derive(Debug, Clone, PartialEq)]
pub struct QuizRequest {
    pub responses: Vec<QuizResponse>,
    pub session_token: String,
    pub user_id: Option<String>,
    pub strategy: Strategy,
    pub limit: usize,
}

impl QuizRequest {
    pub fn effective_answers(&self) -> BTreeMap<QuestionId, &str> {
        effective_answers(&self.responses)
    }
}

/// A persisted quiz session
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct QuizSession {
    pub id: Uuid,
    pub session_token: String,
    pub user_id: Option<String>,
    #[sqlx(skip)]
    pub responses: Vec<QuizResponse>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn new(
        session_token: String,
        user_id: Option<String>,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_token,
            user_id,
            responses: Vec::new(),
            is_completed: false,
            created_at: now,
            expires_at: now + retention,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Generates a fresh, globally unique session token
pub fn generate_session_token() -> String {
    format!("quiz-{}", Uuid::new_v4().simple())
}

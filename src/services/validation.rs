use crate::{
    config::Config,
    error::ValidationError,
    models::{
        generate_session_token, QuestionId, QuizRequest, QuizResponse, QuizSubmission, Strategy,
    },
};

const MAX_ANSWER_LEN: usize = 200;
const MAX_IDENTIFIER_LEN: usize = 128;

/// Substrings that mark an answer as carrying markup or script
const UNSAFE_PATTERNS: [&str; 5] = ["<", ">", "javascript:", "vbscript:", "data:text/html"];

/// Bounds enforced on every submission
#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    pub max_responses: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_responses: 30,
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl From<&Config> for ValidationLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_responses: config.max_responses.max(1),
            default_limit: config.default_result_limit.max(1),
            max_limit: config.max_result_limit.max(1),
        }
    }
}

/// Turns raw submissions into typed quiz requests
///
/// Validation is all-or-nothing: every violated field is reported and nothing is
/// normalized unless the whole submission passes.
#[derive(Debug, Clone, Default)]
pub struct RequestValidator {
    limits: ValidationLimits,
}

impl RequestValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn validate(&self, submission: QuizSubmission) -> Result<QuizRequest, ValidationError> {
        let mut errors = ValidationError::default();

        if submission.responses.is_empty() {
            errors.push("responses", "at least one response is required");
        } else if submission.responses.len() > self.limits.max_responses {
            errors.push(
                "responses",
                format!("at most {} responses are allowed", self.limits.max_responses),
            );
        }

        let mut responses = Vec::with_capacity(submission.responses.len());
        for (index, raw) in submission.responses.iter().enumerate() {
            let question = raw.question_id.parse::<QuestionId>();
            if let Err(message) = &question {
                errors.push(format!("responses[{}].question_id", index), message.clone());
            }

            if let Err(message) = check_safe_string(&raw.answer_value, MAX_ANSWER_LEN) {
                errors.push(format!("responses[{}].answer_value", index), message);
            }

            if let Ok(question_id) = question {
                responses.push(QuizResponse {
                    question_id,
                    answer_value: raw.answer_value.trim().to_lowercase(),
                    answered_at: raw.answered_at,
                });
            }
        }

        if let Some(token) = &submission.session_token {
            if let Err(message) = check_identifier(token) {
                errors.push("session_token", message);
            }
        }

        if let Some(user_id) = &submission.user_id {
            if let Err(message) = check_identifier(user_id) {
                errors.push("user_id", message);
            }
        }

        let strategy = match submission.strategy.as_deref() {
            None => Strategy::default(),
            Some(hint) => hint.parse::<Strategy>().unwrap_or_else(|message| {
                errors.push("strategy", message);
                Strategy::default()
            }),
        };

        let limit = submission.limit.unwrap_or(self.limits.default_limit);
        if limit == 0 || limit > self.limits.max_limit {
            errors.push(
                "limit",
                format!("must be between 1 and {}", self.limits.max_limit),
            );
        }

        if !errors.is_empty() {
            tracing::debug!(
                violations = errors.violations.len(),
                "Quiz submission rejected"
            );
            return Err(errors);
        }

        Ok(QuizRequest {
            responses,
            session_token: submission
                .session_token
                .map(|t| t.trim().to_string())
                .unwrap_or_else(generate_session_token),
            user_id: submission.user_id.map(|u| u.trim().to_string()),
            strategy,
            limit,
        })
    }
}

/// Bounded, non-empty text free of markup, script schemes and control characters
pub fn check_safe_string(value: &str, max_len: usize) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("must not be empty".to_string());
    }
    if trimmed.chars().count() > max_len {
        return Err(format!("must be at most {} characters", max_len));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err("must not contain control characters".to_string());
    }
    let lowered = trimmed.to_lowercase();
    if UNSAFE_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err("must not contain markup or script content".to_string());
    }
    Ok(())
}

/// Checks a user id that arrives outside a quiz submission, such as a path segment
pub fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    if user_id.trim() != user_id {
        errors.push("user_id", "must not have surrounding whitespace");
    } else if let Err(message) = check_identifier(user_id) {
        errors.push("user_id", message);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_identifier(value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("must not be empty".to_string());
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("must be at most {} characters", MAX_IDENTIFIER_LEN));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("may only contain letters, digits, '-', '_' and '.'".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawQuizResponse;

    fn raw(question: &str, answer: &str) -> RawQuizResponse {
        RawQuizResponse {
            question_id: question.to_string(),
            answer_value: answer.to_string(),
            answered_at: None,
        }
    }

    fn submission(responses: Vec<RawQuizResponse>) -> QuizSubmission {
        QuizSubmission {
            responses,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_submission_is_normalized() {
        let validator = RequestValidator::default();
        let request = validator
            .validate(QuizSubmission {
                responses: vec![raw("intensity", "  Bold "), raw("season", "winter")],
                strategy: Some("rule".into()),
                limit: Some(5),
                user_id: Some("user-42".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(request.responses.len(), 2);
        assert_eq!(request.responses[0].answer_value, "bold");
        assert_eq!(request.strategy, Strategy::Rule);
        assert_eq!(request.limit, 5);
        assert_eq!(request.user_id.as_deref(), Some("user-42"));
        assert!(request.session_token.starts_with("quiz-"));
    }

    #[test]
    fn test_defaults_applied() {
        let request = RequestValidator::default()
            .validate(submission(vec![raw("intensity", "light")]))
            .unwrap();
        assert_eq!(request.strategy, Strategy::Hybrid);
        assert_eq!(request.limit, 10);
    }

    #[test]
    fn test_existing_session_token_kept() {
        let request = RequestValidator::default()
            .validate(QuizSubmission {
                responses: vec![raw("intensity", "light")],
                session_token: Some("quiz-abc123".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(request.session_token, "quiz-abc123");
    }

    #[test]
    fn test_empty_responses_rejected() {
        let err = RequestValidator::default()
            .validate(submission(vec![]))
            .unwrap_err();
        assert_eq!(err.violations[0].field, "responses");
    }

    #[test]
    fn test_too_many_responses_rejected() {
        let validator = RequestValidator::new(ValidationLimits {
            max_responses: 2,
            ..Default::default()
        });
        let err = validator
            .validate(submission(vec![
                raw("intensity", "a"),
                raw("season", "b"),
                raw("occasion", "c"),
            ]))
            .unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "responses");
    }

    #[test]
    fn test_every_violation_reported() {
        let err = RequestValidator::default()
            .validate(QuizSubmission {
                responses: vec![
                    raw("favorite_color", "blue"),
                    raw("intensity", "<script>alert(1)</script>"),
                    raw("season", "   "),
                ],
                session_token: Some("bad token!".into()),
                strategy: Some("telepathy".into()),
                limit: Some(0),
                ..Default::default()
            })
            .unwrap_err();

        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "responses[0].question_id",
                "responses[1].answer_value",
                "responses[2].answer_value",
                "session_token",
                "strategy",
                "limit",
            ]
        );
    }

    #[test]
    fn test_limit_above_max_rejected() {
        let err = RequestValidator::default()
            .validate(QuizSubmission {
                responses: vec![raw("intensity", "bold")],
                limit: Some(51),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.violations[0].field, "limit");
    }

    #[test]
    fn test_safe_string_checks() {
        assert!(check_safe_string("fresh citrus", 200).is_ok());
        assert!(check_safe_string("JavaScript:alert(1)", 200).is_err());
        assert!(check_safe_string("line\u{0007}bell", 200).is_err());
        assert!(check_safe_string(&"a".repeat(201), 200).is_err());
        assert!(check_safe_string(&"é".repeat(200), 200).is_ok());
    }

    #[test]
    fn test_user_id_outside_submission() {
        assert!(validate_user_id("user-1").is_ok());
        assert!(validate_user_id("anonymous").is_ok());
        assert_eq!(validate_user_id("~anonymous").unwrap_err().violations[0].field, "user_id");
        assert!(validate_user_id(" user-1").is_err());
        assert!(validate_user_id("").is_err());
    }
}

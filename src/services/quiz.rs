use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        AnalyticsCategory, AnalyticsKey, EngagementLevel, Fingerprint, Personalization,
        QuizRequest, QuizResponse, QuizSubmission, RecommendationResult,
    },
    services::{
        analytics_cache::{AnalyticsCache, CacheOptions},
        clock::Clock,
        deadline::{self, DEFAULT_CALL_TIMEOUT},
        engagement::EngagementService,
        recommendations::RecommendationGenerator,
        sessions::SessionStore,
        tracking::{self, EventTracker},
        validation::RequestValidator,
    },
};

/// Result of one quiz submission
#[derive(Debug, Clone, Serialize)]
pub struct QuizOutcome {
    pub session_token: String,
    pub recommendations: RecommendationResult,
    pub personalization_applied: bool,
    pub cached: bool,
    pub processing_time_ms: u64,
}

/// Stored state of a quiz session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_token: String,
    pub user_id: Option<String>,
    pub is_completed: bool,
    pub is_expired: bool,
    pub response_count: usize,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Quiz pipeline: validate, persist, generate (through the cache) and track
#[derive(Clone)]
pub struct QuizService {
    validator: RequestValidator,
    sessions: Arc<dyn SessionStore>,
    generator: RecommendationGenerator,
    engagement: EngagementService,
    cache: AnalyticsCache,
    tracker: EventTracker,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl QuizService {
    pub fn new(
        validator: RequestValidator,
        sessions: Arc<dyn SessionStore>,
        generator: RecommendationGenerator,
        engagement: EngagementService,
        cache: AnalyticsCache,
        tracker: EventTracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validator,
            sessions,
            generator,
            engagement,
            cache,
            tracker,
            clock,
            store_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bounds every session store call; a slow store is treated like a failing one
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Runs the full pipeline for a raw submission
    ///
    /// Only validation failures and an exhausted generator surface as errors. Session
    /// persistence, engagement lookup and tracking problems are logged and skipped.
    pub async fn submit(
        &self,
        submission: QuizSubmission,
        started: Instant,
    ) -> AppResult<QuizOutcome> {
        let request = self.validator.validate(submission)?;

        self.persist(&request).await;

        let engagement = self.engagement_level(request.user_id.as_deref()).await;

        let fingerprint = Fingerprint::compute(&request.responses, request.strategy, request.limit);
        let cache_key = match engagement {
            Some(level) => format!("{}.{}", fingerprint, level.as_str()),
            None => fingerprint.to_string(),
        };
        let key = AnalyticsKey::new(
            request.user_id.as_deref(),
            AnalyticsCategory::Recommendations,
            cache_key,
        );

        let generator = self.generator.clone();
        let responses = request.responses.clone();
        let (strategy, limit) = (request.strategy, request.limit);

        // Degraded results are served but never stored, so a recovered provider is used
        // on the next identical submission
        let result = self
            .cache
            .get_or_generate_if(
                key,
                CacheOptions::default(),
                move || async move {
                    generator
                        .generate(&responses, strategy, limit, engagement)
                        .await
                },
                |result: &RecommendationResult| {
                    result.personalization == Personalization::Full
                },
            )
            .await?;

        let recommendations = result.value;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        self.tracker.track(
            tracking::QUIZ_COMPLETED,
            json!({
                "session_token": request.session_token,
                "user_id": request.user_id,
                "strategy": recommendations.strategy,
                "requested_strategy": request.strategy,
                "personalization_applied": recommendations.personalization_applied,
                "match_count": recommendations.matches.len(),
                "cached": result.cached,
                "processing_time_ms": processing_time_ms,
            }),
        );
        self.tracker.track(
            tracking::RECOMMENDATIONS_SERVED,
            json!({
                "session_token": request.session_token,
                "fingerprint": fingerprint.as_str(),
                "fragrance_ids": recommendations
                    .matches
                    .iter()
                    .map(|m| m.fragrance_id.as_str())
                    .collect::<Vec<_>>(),
            }),
        );

        tracing::info!(
            session_token = %request.session_token,
            fingerprint = %fingerprint,
            cached = result.cached,
            matches = recommendations.matches.len(),
            processing_time_ms = processing_time_ms,
            "Quiz processed"
        );

        Ok(QuizOutcome {
            session_token: request.session_token,
            personalization_applied: recommendations.personalization_applied,
            recommendations,
            cached: result.cached,
            processing_time_ms,
        })
    }

    pub async fn session(&self, session_token: &str) -> AppResult<SessionSummary> {
        let session = deadline::bounded(
            self.store_timeout,
            "quiz session lookup",
            self.sessions.find_by_token(session_token),
            AppError::SessionStorage,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz session {} not found", session_token)))?;

        Ok(SessionSummary {
            is_expired: session.is_expired(self.clock.now()),
            response_count: session.responses.len(),
            session_token: session.session_token,
            user_id: session.user_id,
            is_completed: session.is_completed,
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
    }

    /// Stores the session, then hands response storage to a background task
    ///
    /// Generation works from the in-memory responses and never waits on the store.
    async fn persist(&self, request: &QuizRequest) {
        let stored = deadline::bounded(
            self.store_timeout,
            "quiz session store",
            self.sessions
                .store_session(&request.session_token, request.user_id.as_deref()),
            AppError::SessionStorage,
        )
        .await;

        let session_id = match stored {
            Ok(session_id) => session_id,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    session_token = %request.session_token,
                    "Failed to store quiz session, continuing without persistence"
                );
                return;
            }
        };

        let sessions = Arc::clone(&self.sessions);
        let responses = request.responses.clone();
        let store_timeout = self.store_timeout;
        tokio::spawn(async move {
            store_responses(sessions, session_id, responses, store_timeout).await;
        });
    }

    async fn engagement_level(&self, user_id: Option<&str>) -> Option<EngagementLevel> {
        let user_id = user_id?;
        match self.engagement.engagement(user_id, false).await {
            Ok(cached) => Some(cached.value.level),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = %user_id,
                    "Engagement lookup failed, generating without adjustment"
                );
                None
            }
        }
    }
}

async fn store_responses(
    sessions: Arc<dyn SessionStore>,
    session_id: Uuid,
    responses: Vec<QuizResponse>,
    store_timeout: Duration,
) {
    let stored = deadline::bounded(
        store_timeout,
        "quiz response store",
        sessions.store_responses(session_id, &responses),
        AppError::SessionStorage,
    )
    .await;

    match stored {
        Ok(written) => {
            tracing::debug!(session_id = %session_id, written = written, "Quiz responses stored");
            let completed = deadline::bounded(
                store_timeout,
                "quiz session completion",
                sessions.mark_completed(session_id),
                AppError::SessionStorage,
            )
            .await;
            if let Err(e) = completed {
                tracing::warn!(
                    error = %e,
                    session_id = %session_id,
                    "Failed to mark quiz session completed"
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                session_id = %session_id,
                "Failed to store quiz responses"
            );
        }
    }
}

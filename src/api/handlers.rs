use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use crate::{
    error::{AppResult, ValidationError},
    middleware::RequestStart,
    models::{CollectionInsights, EngagementScore, QuizSubmission, Resolution},
    services::{
        analytics_cache::Cached,
        quiz::{QuizOutcome, SessionSummary},
        validation::validate_user_id,
    },
};

use super::AppState;

// Request/Response types

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct QuizResponseBody {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: QuizOutcome,
}

#[derive(Debug, Serialize)]
pub struct EngagementResponse {
    pub user_id: String,
    #[serde(flatten)]
    pub engagement: EngagementScore,
    pub cached: bool,
}

impl EngagementResponse {
    fn new(user_id: String, result: Cached<EngagementScore>) -> Self {
        Self {
            user_id,
            engagement: result.value,
            cached: result.cached,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub user_id: String,
    #[serde(flatten)]
    pub insights: CollectionInsights,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearAnalyticsResponse {
    pub user_id: String,
    pub cleared: usize,
}

// Handlers

pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Validates a quiz, stores it and returns recommendations
///
/// A body that is not valid JSON is reported with the same envelope as a failed
/// field check.
pub async fn submit_quiz(
    State(state): State<AppState>,
    start: Option<Extension<RequestStart>>,
    body: Result<Json<QuizSubmission>, JsonRejection>,
) -> AppResult<Json<QuizResponseBody>> {
    let started = start.map(|Extension(RequestStart(at))| at).unwrap_or_else(Instant::now);

    let Json(submission) = body.map_err(|rejection| {
        let mut errors = ValidationError::default();
        errors.push("body", rejection.body_text());
        errors
    })?;

    let outcome = state.quiz.submit(submission, started).await?;
    Ok(Json(QuizResponseBody {
        success: true,
        outcome,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SessionSummary>> {
    let summary = state.quiz.session(&token).await?;
    Ok(Json(summary))
}

pub async fn resolve_fragrance(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Resolution>> {
    let resolution = state.identity.resolve(&raw_id).await?;
    Ok(Json(resolution))
}

pub async fn get_engagement(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<RefreshQuery>,
) -> AppResult<Json<EngagementResponse>> {
    validate_user_id(&user_id)?;
    let result = state
        .engagement
        .engagement(&user_id, params.force_refresh)
        .await?;
    Ok(Json(EngagementResponse::new(user_id, result)))
}

pub async fn get_insights(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<RefreshQuery>,
) -> AppResult<Json<InsightsResponse>> {
    validate_user_id(&user_id)?;
    let result = state
        .engagement
        .insights(&user_id, params.force_refresh)
        .await?;
    Ok(Json(InsightsResponse {
        user_id,
        insights: result.value,
        cached: result.cached,
    }))
}

/// Drops every cached analytics value of the user
pub async fn clear_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ClearAnalyticsResponse>> {
    validate_user_id(&user_id)?;
    let cleared = state.cache.clear_owner(&user_id).await?;
    Ok(Json(ClearAnalyticsResponse { user_id, cleared }))
}

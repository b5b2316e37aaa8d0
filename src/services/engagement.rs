use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{
        AccordCount, AnalyticsCategory, AnalyticsKey, CollectionInsights, CollectionItem,
        EngagementCounters, EngagementLevel, EngagementScore,
    },
    services::{
        analytics_cache::{AnalyticsCache, CacheOptions, Cached},
        deadline::{self, DEFAULT_CALL_TIMEOUT},
    },
};

/// Points contributed by each unit of a counter
const QUIZ_WEIGHT: u64 = 5;
const COLLECTION_WEIGHT: u64 = 2;
const RATING_WEIGHT: u64 = 3;
const SAMPLE_WEIGHT: u64 = 8;
const ACTIVE_DAY_WEIGHT: u64 = 2;

const MEDIUM_THRESHOLD: f64 = 30.0;
const HIGH_THRESHOLD: f64 = 70.0;

const TOP_ACCORDS: usize = 5;

/// Maps raw interaction counters to a bounded engagement score
pub struct EngagementScorer;

impl EngagementScorer {
    pub const MIN_SCORE: f64 = 0.0;
    pub const MAX_SCORE: f64 = 100.0;

    /// Weighted counter sum clamped to [MIN_SCORE, MAX_SCORE]
    ///
    /// Arithmetic saturates, so arbitrarily large counters land on the ceiling.
    pub fn score(counters: &EngagementCounters) -> EngagementScore {
        let raw = [
            (counters.quizzes_completed, QUIZ_WEIGHT),
            (counters.collection_size, COLLECTION_WEIGHT),
            (counters.ratings_given, RATING_WEIGHT),
            (counters.samples_ordered, SAMPLE_WEIGHT),
            (counters.active_days_last_30, ACTIVE_DAY_WEIGHT),
        ]
        .iter()
        .fold(0u64, |total, (count, weight)| {
            total.saturating_add(count.saturating_mul(*weight))
        });

        let score = (raw.min(Self::MAX_SCORE as u64) as f64)
            .clamp(Self::MIN_SCORE, Self::MAX_SCORE);

        EngagementScore {
            score,
            level: Self::level(score),
        }
    }

    pub fn level(score: f64) -> EngagementLevel {
        if score < MEDIUM_THRESHOLD {
            EngagementLevel::Low
        } else if score < HIGH_THRESHOLD {
            EngagementLevel::Medium
        } else {
            EngagementLevel::High
        }
    }
}

/// Summarizes a collection: most frequent accords and the mean of the given ratings
pub fn build_insights(
    items: &[CollectionItem],
    engagement: EngagementScore,
) -> CollectionInsights {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for item in items {
        for accord in &item.accords {
            *counts.entry(accord.as_str()).or_insert(0) += 1;
        }
    }

    let mut top_accords: Vec<AccordCount> = counts
        .into_iter()
        .map(|(accord, count)| AccordCount {
            accord: accord.to_string(),
            count,
        })
        .collect();
    top_accords.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.accord.cmp(&b.accord)));
    top_accords.truncate(TOP_ACCORDS);

    let ratings: Vec<f64> = items
        .iter()
        .filter_map(|item| item.rating)
        .filter(|rating| rating.is_finite())
        .collect();
    let average_rating = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    };

    CollectionInsights {
        total_items: items.len() as u64,
        top_accords,
        average_rating,
        engagement,
    }
}

/// Source of a user's interaction history
#[async_trait::async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn counters(&self, user_id: &str) -> AppResult<EngagementCounters>;

    async fn collection(&self, user_id: &str) -> AppResult<Vec<CollectionItem>>;
}

#[derive(Clone)]
pub struct PostgresActivityRepository {
    db_pool: PgPool,
}

impl PostgresActivityRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn non_negative(count: i64) -> u64 {
    count.max(0) as u64
}

#[async_trait::async_trait]
impl ActivityRepository for PostgresActivityRepository {
    async fn counters(&self, user_id: &str) -> AppResult<EngagementCounters> {
        let (quizzes, collection, ratings, samples, active_days): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM user_quiz_sessions
                        WHERE user_id = $1 AND is_completed),
                    (SELECT COUNT(*) FROM user_collections WHERE user_id = $1),
                    (SELECT COUNT(*) FROM user_collections
                        WHERE user_id = $1 AND rating IS NOT NULL),
                    (SELECT COUNT(*) FROM analytics_events
                        WHERE event_type = 'sample_ordered' AND payload->>'user_id' = $1),
                    (SELECT COUNT(DISTINCT created_at::date) FROM analytics_events
                        WHERE payload->>'user_id' = $1
                        AND created_at > NOW() - INTERVAL '30 days')
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.db_pool)
            .await?;

        Ok(EngagementCounters {
            quizzes_completed: non_negative(quizzes),
            collection_size: non_negative(collection),
            ratings_given: non_negative(ratings),
            samples_ordered: non_negative(samples),
            active_days_last_30: non_negative(active_days),
        })
    }

    async fn collection(&self, user_id: &str) -> AppResult<Vec<CollectionItem>> {
        let rows: Vec<(String, Option<Vec<String>>, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT c.fragrance_id, f.accords, c.rating
            FROM user_collections c
            LEFT JOIN fragrances f ON f.id = c.fragrance_id
            WHERE c.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(fragrance_id, accords, rating)| CollectionItem {
                fragrance_id,
                accords: accords
                    .unwrap_or_default()
                    .into_iter()
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect(),
                rating,
            })
            .collect())
    }
}

/// Engagement and collection analytics, memoized per user in the analytics cache
#[derive(Clone)]
pub struct EngagementService {
    activity: Arc<dyn ActivityRepository>,
    cache: AnalyticsCache,
    timeout: Duration,
}

impl EngagementService {
    pub fn new(activity: Arc<dyn ActivityRepository>, cache: AnalyticsCache) -> Self {
        Self {
            activity,
            cache,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bounds each activity repository call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn engagement(
        &self,
        user_id: &str,
        force_refresh: bool,
    ) -> AppResult<Cached<EngagementScore>> {
        let key = AnalyticsKey::new(Some(user_id), AnalyticsCategory::Engagement, "score");
        let activity = Arc::clone(&self.activity);
        let timeout = self.timeout;
        let user_id = user_id.to_string();

        self.cache
            .get_or_generate(key, CacheOptions::refresh(force_refresh), move || async move {
                let counters = deadline::bounded(
                    timeout,
                    "engagement counters",
                    activity.counters(&user_id),
                    AppError::ProviderDegraded,
                )
                .await?;
                Ok(EngagementScorer::score(&counters))
            })
            .await
    }

    /// Collection insights; the engagement part is read through its own cache entry
    pub async fn insights(
        &self,
        user_id: &str,
        force_refresh: bool,
    ) -> AppResult<Cached<CollectionInsights>> {
        let key = AnalyticsKey::new(
            Some(user_id),
            AnalyticsCategory::CollectionInsights,
            "summary",
        );
        let service = self.clone();
        let user_id = user_id.to_string();

        self.cache
            .get_or_generate(key, CacheOptions::refresh(force_refresh), move || async move {
                let engagement = service.engagement(&user_id, force_refresh).await?.value;
                let items = deadline::bounded(
                    service.timeout,
                    "collection lookup",
                    service.activity.collection(&user_id),
                    AppError::ProviderDegraded,
                )
                .await?;
                Ok(build_insights(&items, engagement))
            })
            .await
    }
}

use std::sync::Arc;

use crate::services::{
    analytics_cache::{AnalyticsCache, AnalyticsStore},
    clock::Clock,
    engagement::{ActivityRepository, EngagementService},
    identity::{FragranceIndex, IdentityResolver},
    providers::{CatalogProvider, EmbeddingProvider},
    quiz::QuizService,
    recommendations::{GeneratorSettings, RecommendationGenerator},
    sessions::SessionStore,
    tracking::EventTracker,
    validation::{RequestValidator, ValidationLimits},
};

/// Collaborators the HTTP layer is assembled from
pub struct AppDependencies {
    pub limits: ValidationLimits,
    pub settings: GeneratorSettings,
    pub sessions: Arc<dyn SessionStore>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub catalog: Arc<dyn CatalogProvider>,
    pub index: Arc<dyn FragranceIndex>,
    pub activity: Arc<dyn ActivityRepository>,
    pub analytics_store: Arc<dyn AnalyticsStore>,
    pub tracker: EventTracker,
    pub clock: Arc<dyn Clock>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub quiz: QuizService,
    pub engagement: EngagementService,
    pub identity: Arc<IdentityResolver>,
    pub cache: AnalyticsCache,
}

impl AppState {
    pub fn new(deps: AppDependencies) -> Self {
        // One deadline governs every store and provider call
        let timeout = deps.settings.provider_timeout;

        let cache = AnalyticsCache::new(deps.analytics_store, Arc::clone(&deps.clock))
            .with_store_timeout(timeout);
        let engagement =
            EngagementService::new(deps.activity, cache.clone()).with_timeout(timeout);
        let generator = RecommendationGenerator::new(
            deps.embedding,
            deps.catalog,
            Arc::clone(&deps.clock),
            deps.settings,
        );

        let quiz = QuizService::new(
            RequestValidator::new(deps.limits),
            deps.sessions,
            generator,
            engagement.clone(),
            cache.clone(),
            deps.tracker,
            deps.clock,
        )
        .with_store_timeout(timeout);

        Self {
            quiz,
            engagement,
            identity: Arc::new(IdentityResolver::new(deps.index).with_timeout(timeout)),
            cache,
        }
    }
}

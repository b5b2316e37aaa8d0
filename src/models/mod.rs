pub mod analytics;
pub mod engagement;
pub mod fragrance;
pub mod profile;
pub mod quiz;
pub mod recommendation;

pub use analytics::{AnalyticsCategory, AnalyticsKey, CacheEntry, ANONYMOUS_OWNER};
pub use engagement::{
    AccordCount, CollectionInsights, CollectionItem, EngagementCounters, EngagementLevel,
    EngagementScore,
};
pub use fragrance::{Fragrance, Gender, GenderPreference, NameMatch, Resolution, SimilarityMatch};
pub use profile::{PersonalityProfile, PreferenceDimension, NEUTRAL_SCORE};
pub use quiz::{
    generate_session_token, QuestionId, QuizRequest, QuizResponse, QuizSession, QuizSubmission,
    RawQuizResponse,
};
pub use recommendation::{
    Fingerprint, FragranceMatch, Personalization, RecommendationResult, ResultSource, Strategy,
};

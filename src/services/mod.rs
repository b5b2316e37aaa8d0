pub mod analytics_cache;
pub mod clock;
pub mod deadline;
pub mod engagement;
pub mod identity;
pub mod providers;
pub mod quiz;
pub mod recommendations;
pub mod sessions;
pub mod tracking;
pub mod validation;

pub use analytics_cache::{
    AnalyticsCache, AnalyticsStore, CacheOptions, Cached, InMemoryAnalyticsStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engagement::{
    ActivityRepository, EngagementScorer, EngagementService, PostgresActivityRepository,
};
pub use identity::{FragranceIndex, IdentityResolver};
pub use quiz::{QuizOutcome, QuizService, SessionSummary};
pub use recommendations::{GeneratorSettings, RecommendationGenerator};
pub use sessions::{InMemorySessionStore, PostgresSessionStore, SessionStore};
pub use tracking::{EventSink, EventTracker, PostgresEventSink, TrackerHandle};
pub use validation::{RequestValidator, ValidationLimits};

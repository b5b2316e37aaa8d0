/// External collaborators of the recommendation pipeline
///
/// The embedding provider ranks catalog entries by similarity to a profile vector and is
/// advisory only. The catalog lists candidates and confirms purchasability. Both sit
/// behind traits so the generator can be exercised without network or database.
use crate::{
    error::AppResult,
    models::{Fragrance, SimilarityMatch},
};

pub mod catalog;
pub mod embedding;

pub use catalog::PostgresCatalog;
pub use embedding::HttpEmbeddingProvider;

/// Trait for embedding/similarity providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Ranks catalog entries against a profile vector, best match first
    async fn rank(&self, profile_vector: &[f32], limit: usize) -> AppResult<Vec<SimilarityMatch>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Trait for the fragrance catalog and its availability data
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Candidate pool for rule scoring
    async fn candidates(&self, limit: usize) -> AppResult<Vec<Fragrance>>;

    /// Details for the given ids; unknown ids are skipped
    async fn fragrances_by_ids(&self, ids: &[String]) -> AppResult<Vec<Fragrance>>;

    /// Catalog entries ordered by popularity, most popular first
    async fn most_popular(&self, limit: usize) -> AppResult<Vec<Fragrance>>;

    /// Whether the fragrance can currently be bought or sampled
    async fn is_available(&self, fragrance_id: &str) -> AppResult<bool>;
}

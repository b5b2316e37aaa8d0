/// Recommendation generator
///
/// Turns a quiz response sequence into a ranked set of fragrance matches. Strategies
/// degrade instead of failing: a broken or empty embedding ranking falls back to rule
/// scoring, and when no strategy yields candidates the popularity ranking is served as
/// a non-personalized result. Only an unreachable catalog during that last fallback is
/// reported as an error.
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        EngagementLevel, Fragrance, FragranceMatch, PersonalityProfile, Personalization,
        QuizResponse, RecommendationResult, ResultSource, Strategy,
    },
    services::{
        clock::Clock,
        deadline::{self, DEFAULT_CALL_TIMEOUT},
        providers::{CatalogProvider, EmbeddingProvider},
    },
};

pub mod profile;
pub mod scoring;

pub use profile::build_profile;

/// Embedding share of a HYBRID score when both strategies produced candidates
pub const DEFAULT_HYBRID_EMBEDDING_WEIGHT: f64 = 0.6;

const MIN_CANDIDATE_POOL: usize = 50;
const MAX_CANDIDATE_POOL: usize = 250;

const POPULARITY_RATIONALE: &str = "Popular pick while we learn your taste";

#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    pub hybrid_embedding_weight: f64,
    /// Upper bound for every call to the embedding provider and the catalog
    pub provider_timeout: Duration,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            hybrid_embedding_weight: DEFAULT_HYBRID_EMBEDDING_WEIGHT,
            provider_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl From<&Config> for GeneratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            hybrid_embedding_weight: config.hybrid_weight(),
            provider_timeout: config.provider_timeout(),
        }
    }
}

/// Confidence multiplier applied to the profile for a user's engagement level
pub fn confidence_factor(level: EngagementLevel) -> f64 {
    match level {
        EngagementLevel::Low => 0.9,
        EngagementLevel::Medium => 1.0,
        EngagementLevel::High => 1.1,
    }
}

fn candidate_pool(limit: usize) -> usize {
    limit.saturating_mul(5).clamp(MIN_CANDIDATE_POOL, MAX_CANDIDATE_POOL)
}

/// A fragrance gathered by one or both strategies
struct Candidate {
    fragrance: Fragrance,
    similarity: Option<f64>,
}

/// A candidate with its final score, ready to rank
struct Scored {
    fragrance: Fragrance,
    score: f64,
    rationale: String,
}

#[derive(Clone)]
pub struct RecommendationGenerator {
    embedding: Arc<dyn EmbeddingProvider>,
    catalog: Arc<dyn CatalogProvider>,
    clock: Arc<dyn Clock>,
    settings: GeneratorSettings,
}

impl RecommendationGenerator {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        catalog: Arc<dyn CatalogProvider>,
        clock: Arc<dyn Clock>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            embedding,
            catalog,
            clock,
            settings,
        }
    }

    pub async fn generate(
        &self,
        responses: &[QuizResponse],
        strategy: Strategy,
        limit: usize,
        engagement: Option<EngagementLevel>,
    ) -> AppResult<RecommendationResult> {
        let limit = limit.max(1);
        let pool = candidate_pool(limit);

        let mut profile = build_profile(responses);
        if let Some(level) = engagement {
            profile = profile.with_confidence_factor(confidence_factor(level));
        }

        let mut degraded = Vec::new();

        let embedding_hits = if strategy.uses_embedding() {
            match self.embedding_candidates(&profile, pool).await {
                Ok(hits) if !hits.is_empty() => Some(hits),
                Ok(_) => {
                    tracing::warn!(
                        provider = self.embedding.name(),
                        "Embedding ranking was empty, degrading to rule scoring"
                    );
                    degraded.push(Strategy::Embedding);
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        provider = self.embedding.name(),
                        "Embedding ranking failed, degrading to rule scoring"
                    );
                    degraded.push(Strategy::Embedding);
                    None
                }
            }
        } else {
            None
        };

        let rule_pool = if strategy.uses_rule() || embedding_hits.is_none() {
            match self.rule_candidates(&profile, pool).await {
                Ok(candidates) if !candidates.is_empty() => Some(candidates),
                Ok(_) => {
                    tracing::debug!("No rule candidates compatible with the profile");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rule candidate lookup failed");
                    degraded.push(Strategy::Rule);
                    None
                }
            }
        } else {
            None
        };

        let (source, candidates) = merge_candidates(embedding_hits, rule_pool);

        let ranked = match source {
            ResultSource::Popularity => Vec::new(),
            source => self.score_candidates(&profile, source, candidates),
        };
        let matches = self.retain_available(ranked, limit).await;

        if matches.is_empty() {
            tracing::info!(
                requested = %strategy,
                "No personalized candidates survived, serving popularity fallback"
            );
            return self.popularity_fallback(strategy, limit, pool, degraded).await;
        }

        let personalization = if degraded.is_empty() {
            Personalization::Full
        } else {
            Personalization::Partial
        };

        tracing::info!(
            requested = %strategy,
            source = ?source,
            matches = matches.len(),
            degraded = degraded.len(),
            "Recommendations generated"
        );

        Ok(RecommendationResult {
            matches: into_matches(matches),
            generated_at: self.clock.now(),
            requested_strategy: strategy,
            strategy: source,
            personalization_applied: true,
            personalization,
            degraded,
        })
    }

    /// Runs an external call under the provider timeout
    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        deadline::bounded(
            self.settings.provider_timeout,
            what,
            call,
            AppError::ProviderDegraded,
        )
        .await
    }

    /// Similarity-ranked fragrances compatible with the profile, keyed by id
    async fn embedding_candidates(
        &self,
        profile: &PersonalityProfile,
        pool: usize,
    ) -> AppResult<HashMap<String, Candidate>> {
        let vector = profile.vector();
        let ranking = self
            .bounded("similarity ranking", self.embedding.rank(&vector, pool))
            .await?;
        if ranking.is_empty() {
            return Ok(HashMap::new());
        }

        let mut similarities: HashMap<String, f64> = HashMap::new();
        for hit in ranking {
            let entry = similarities.entry(hit.fragrance_id).or_insert(hit.similarity);
            *entry = entry.max(hit.similarity);
        }

        let ids: Vec<String> = similarities.keys().cloned().collect();
        let details = self
            .bounded("catalog lookup", self.catalog.fragrances_by_ids(&ids))
            .await
            .map_err(|e| AppError::ProviderDegraded(format!("catalog lookup failed: {}", e)))?;

        Ok(details
            .into_iter()
            .filter(|f| f.gender.is_compatible_with(profile.gender_preference()))
            .filter_map(|fragrance| {
                let similarity = similarities.get(&fragrance.id).copied()?;
                Some((
                    fragrance.id.clone(),
                    Candidate {
                        fragrance,
                        similarity: Some(similarity),
                    },
                ))
            })
            .collect())
    }

    /// Catalog candidates passing the gender constraint
    async fn rule_candidates(
        &self,
        profile: &PersonalityProfile,
        pool: usize,
    ) -> AppResult<Vec<Fragrance>> {
        let candidates = self
            .bounded("catalog candidates", self.catalog.candidates(pool))
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|f| f.gender.is_compatible_with(profile.gender_preference()))
            .collect())
    }

    fn score_candidates(
        &self,
        profile: &PersonalityProfile,
        source: ResultSource,
        candidates: BTreeMap<String, Candidate>,
    ) -> Vec<Scored> {
        let max_popularity = candidates
            .values()
            .map(|c| c.fragrance.popularity_score)
            .filter(|p| p.is_finite())
            .fold(0.0_f64, f64::max);

        let mut scored: Vec<Scored> = candidates
            .into_values()
            .map(|candidate| {
                let prior = scoring::popularity_prior(&candidate.fragrance, max_popularity);
                let rule = scoring::rule_score(profile, &candidate.fragrance, prior);

                let (score, rationale) = match source {
                    ResultSource::Embedding => {
                        let similarity = candidate.similarity.unwrap_or(0.0);
                        (similarity, similarity_rationale(similarity, &[]))
                    }
                    ResultSource::Hybrid => {
                        let score = scoring::blend(
                            candidate.similarity,
                            Some(rule.score),
                            self.settings.hybrid_embedding_weight,
                        );
                        let rationale = match candidate.similarity {
                            Some(similarity) => {
                                similarity_rationale(similarity, &rule.matched_accords)
                            }
                            None => rule_rationale(profile, &rule.matched_accords),
                        };
                        (score, rationale)
                    }
                    ResultSource::Rule | ResultSource::Popularity => {
                        (rule.score, rule_rationale(profile, &rule.matched_accords))
                    }
                };

                Scored {
                    fragrance: candidate.fragrance,
                    score,
                    rationale,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            scoring::compare_ranked((a.score, &a.fragrance), (b.score, &b.fragrance))
        });
        scored
    }

    /// Keeps ranked entries the catalog confirms as available, in rank order
    ///
    /// Checks run concurrently one batch of `limit` at a time until enough survive. A
    /// failed or timed out check counts as unavailable.
    async fn retain_available(&self, ranked: Vec<Scored>, limit: usize) -> Vec<Scored> {
        let mut kept = Vec::with_capacity(limit);
        let mut remaining = ranked.into_iter();

        while kept.len() < limit {
            let batch: Vec<Scored> = remaining.by_ref().take(limit).collect();
            if batch.is_empty() {
                break;
            }

            let mut tasks = Vec::with_capacity(batch.len());
            for item in &batch {
                let catalog = Arc::clone(&self.catalog);
                let fragrance_id = item.fragrance.id.clone();
                let timeout = self.settings.provider_timeout;
                tasks.push(tokio::spawn(async move {
                    tokio::time::timeout(timeout, catalog.is_available(&fragrance_id)).await
                }));
            }

            for (item, task) in batch.into_iter().zip(tasks) {
                let available = match task.await {
                    Ok(Ok(Ok(available))) => available,
                    Ok(Ok(Err(e))) => {
                        tracing::warn!(
                            error = %e,
                            fragrance_id = %item.fragrance.id,
                            "Availability check failed, treating as unavailable"
                        );
                        false
                    }
                    Ok(Err(_)) => {
                        tracing::warn!(
                            fragrance_id = %item.fragrance.id,
                            "Availability check timed out, treating as unavailable"
                        );
                        false
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Availability check task failed");
                        false
                    }
                };

                if available && kept.len() < limit {
                    kept.push(item);
                }
            }
        }

        kept
    }

    async fn popularity_fallback(
        &self,
        strategy: Strategy,
        limit: usize,
        pool: usize,
        degraded: Vec<Strategy>,
    ) -> AppResult<RecommendationResult> {
        let popular = self
            .bounded("catalog popularity", self.catalog.most_popular(pool))
            .await
            .map_err(|e| {
                AppError::Generation(format!("popularity fallback unavailable: {}", e))
            })?;

        let max_popularity = popular
            .iter()
            .map(|f| f.popularity_score)
            .filter(|p| p.is_finite())
            .fold(0.0_f64, f64::max);

        let mut ranked: Vec<Scored> = popular
            .into_iter()
            .map(|fragrance| Scored {
                score: scoring::popularity_prior(&fragrance, max_popularity),
                rationale: POPULARITY_RATIONALE.to_string(),
                fragrance,
            })
            .collect();
        ranked.sort_by(|a, b| {
            scoring::compare_ranked((a.score, &a.fragrance), (b.score, &b.fragrance))
        });

        let matches = self.retain_available(ranked, limit).await;
        if matches.is_empty() {
            tracing::warn!("Popularity fallback found no available fragrances");
        }

        Ok(RecommendationResult {
            matches: into_matches(matches),
            generated_at: self.clock.now(),
            requested_strategy: strategy,
            strategy: ResultSource::Popularity,
            personalization_applied: false,
            personalization: Personalization::None,
            degraded,
        })
    }
}

/// Unions the strategy outputs and names the scoring path that applies to them
fn merge_candidates(
    embedding_hits: Option<HashMap<String, Candidate>>,
    rule_pool: Option<Vec<Fragrance>>,
) -> (ResultSource, BTreeMap<String, Candidate>) {
    let source = match (&embedding_hits, &rule_pool) {
        (Some(_), Some(_)) => ResultSource::Hybrid,
        (Some(_), None) => ResultSource::Embedding,
        (None, Some(_)) => ResultSource::Rule,
        (None, None) => ResultSource::Popularity,
    };

    let mut merged: BTreeMap<String, Candidate> =
        embedding_hits.unwrap_or_default().into_iter().collect();
    for fragrance in rule_pool.unwrap_or_default() {
        merged.entry(fragrance.id.clone()).or_insert(Candidate {
            fragrance,
            similarity: None,
        });
    }

    (source, merged)
}

fn into_matches(scored: Vec<Scored>) -> Vec<FragranceMatch> {
    scored
        .into_iter()
        .enumerate()
        .map(|(index, item)| FragranceMatch {
            fragrance_id: item.fragrance.id,
            name: item.fragrance.name,
            brand: item.fragrance.brand,
            score: item.score,
            rationale: item.rationale,
            rank: index + 1,
        })
        .collect()
}

fn rule_rationale(profile: &PersonalityProfile, matched_accords: &[String]) -> String {
    let descriptors = profile.descriptors().join(" and ");
    if matched_accords.is_empty() {
        format!("Matches your {} scent profile", descriptors)
    } else {
        format!(
            "Matches your {} scent profile with {} notes",
            descriptors,
            matched_accords.join(", ")
        )
    }
}

fn similarity_rationale(similarity: f64, matched_accords: &[String]) -> String {
    let percent = (similarity * 100.0).round();
    if matched_accords.is_empty() {
        format!("{}% similar to your scent profile", percent)
    } else {
        format!(
            "{}% similar to your scent profile, with {} notes",
            percent,
            matched_accords.join(", ")
        )
    }
}

/// HTTP embedding/similarity provider
///
/// Sends the profile vector to the similarity endpoint and returns the ranked fragrance
/// ids it answers with. Any non-success answer is reported as a degraded provider so the
/// generator can fall back to rule scoring.
use crate::{
    error::{AppError, AppResult},
    models::SimilarityMatch,
    services::providers::EmbeddingProvider,
};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SimilarityRequest<'a> {
    vector: &'a [f32],
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SimilarityResponse {
    #[serde(default)]
    matches: Vec<ApiSimilarityMatch>,
}

#[derive(Debug, Deserialize)]
struct ApiSimilarityMatch {
    fragrance_id: String,
    similarity: f64,
}

#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl HttpEmbeddingProvider {
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url,
        })
    }

    /// Drops malformed entries and clamps similarities to [0, 1]
    fn convert_matches(response: SimilarityResponse) -> Vec<SimilarityMatch> {
        response
            .matches
            .into_iter()
            .filter(|m| !m.fragrance_id.trim().is_empty() && m.similarity.is_finite())
            .map(|m| SimilarityMatch {
                fragrance_id: m.fragrance_id,
                similarity: m.similarity.clamp(0.0, 1.0),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn rank(&self, profile_vector: &[f32], limit: usize) -> AppResult<Vec<SimilarityMatch>> {
        let url = format!("{}/v1/similarity", self.api_url.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SimilarityRequest {
                vector: profile_vector,
                limit,
            })
            .send()
            .await
            .map_err(|e| AppError::ProviderDegraded(format!("similarity request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                body = %body,
                provider = self.name(),
                "Similarity provider request failed"
            );
            return Err(AppError::ProviderDegraded(format!(
                "similarity provider returned status {}",
                status
            )));
        }

        let parsed: SimilarityResponse = response.json().await.map_err(|e| {
            AppError::ProviderDegraded(format!("failed to parse similarity response: {}", e))
        })?;

        let matches = Self::convert_matches(parsed);
        tracing::debug!(
            matches = matches.len(),
            provider = self.name(),
            "Similarity ranking fetched"
        );

        Ok(matches)
    }

    fn name(&self) -> &'static str {
        "http-embedding"
    }
}

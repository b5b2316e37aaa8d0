/// Postgres-backed fragrance catalog
///
/// Serves the candidate pool, popularity ranking and availability checks for the
/// recommendation generator, and the id/name index used by identity resolution.
use crate::{
    error::AppResult,
    models::{Fragrance, Gender, NameMatch},
    services::{identity::FragranceIndex, providers::CatalogProvider},
};
use sqlx::PgPool;

#[derive(Debug, sqlx::FromRow)]
struct FragranceRow {
    id: String,
    name: String,
    brand_name: String,
    gender: Option<String>,
    accords: Option<Vec<String>>,
    popularity_score: Option<f64>,
}

impl From<FragranceRow> for Fragrance {
    fn from(row: FragranceRow) -> Self {
        Fragrance {
            id: row.id,
            name: row.name,
            brand: row.brand_name,
            gender: row
                .gender
                .as_deref()
                .map(Gender::from_catalog)
                .unwrap_or(Gender::Unisex),
            accords: row
                .accords
                .unwrap_or_default()
                .into_iter()
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
            popularity_score: row.popularity_score.unwrap_or(0.0),
        }
    }
}

#[derive(Clone)]
pub struct PostgresCatalog {
    db_pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

/// `%fragment%` patterns with LIKE wildcards escaped
fn like_patterns(fragments: &[String]) -> Vec<String> {
    fragments
        .iter()
        .map(|f| {
            let escaped = f
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
        .collect()
}

#[async_trait::async_trait]
impl CatalogProvider for PostgresCatalog {
    async fn candidates(&self, limit: usize) -> AppResult<Vec<Fragrance>> {
        let rows = sqlx::query_as::<_, FragranceRow>(
            r#"
            SELECT id, name, brand_name, gender, accords, popularity_score
            FROM fragrances
            WHERE accords IS NOT NULL AND cardinality(accords) > 0
            ORDER BY popularity_score DESC NULLS LAST, id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Fragrance::from).collect())
    }

    async fn fragrances_by_ids(&self, ids: &[String]) -> AppResult<Vec<Fragrance>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, FragranceRow>(
            r#"
            SELECT id, name, brand_name, gender, accords, popularity_score
            FROM fragrances
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Fragrance::from).collect())
    }

    async fn most_popular(&self, limit: usize) -> AppResult<Vec<Fragrance>> {
        let rows = sqlx::query_as::<_, FragranceRow>(
            r#"
            SELECT id, name, brand_name, gender, accords, popularity_score
            FROM fragrances
            ORDER BY popularity_score DESC NULLS LAST, id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Fragrance::from).collect())
    }

    async fn is_available(&self, fragrance_id: &str) -> AppResult<bool> {
        let available: Option<Option<bool>> = sqlx::query_scalar(
            r#"
            SELECT sample_available AND in_stock
            FROM fragrances
            WHERE id = $1
            "#,
        )
        .bind(fragrance_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(available.flatten().unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl FragranceIndex for PostgresCatalog {
    async fn find_exact(&self, id: &str) -> AppResult<Option<String>> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM fragrances WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(found)
    }

    async fn search_names(&self, fragments: &[String], limit: usize) -> AppResult<Vec<NameMatch>> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, String, String, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT id, name, brand_name, popularity_score
            FROM fragrances
            WHERE (name || ' ' || brand_name) ILIKE ANY($1)
            ORDER BY popularity_score DESC NULLS LAST, id
            LIMIT $2
            "#,
        )
        .bind(like_patterns(fragments))
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, brand, popularity)| NameMatch {
                id,
                name,
                brand,
                popularity_score: popularity.unwrap_or(0.0),
            })
            .collect())
    }
}

use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;

use crate::{
    error::{AppError, AppResult},
    models::{NameMatch, Resolution},
    services::deadline::{self, DEFAULT_CALL_TIMEOUT},
};

/// Fragments this short carry no signal for name matching
const MIN_FRAGMENT_LEN: usize = 3;
const NAME_SEARCH_LIMIT: usize = 20;

/// Lookup surface of the canonical fragrance catalog
#[async_trait::async_trait]
pub trait FragranceIndex: Send + Sync {
    /// Returns the id if a fragrance is stored under exactly this identifier
    async fn find_exact(&self, id: &str) -> AppResult<Option<String>>;

    /// Fragrances whose name or brand contains any of the fragments
    async fn search_names(&self, fragments: &[String], limit: usize) -> AppResult<Vec<NameMatch>>;
}

/// A pure identifier rewrite; `None` when it does not apply or changes nothing
pub type Normalization = fn(&str) -> Option<String>;

/// Rewrites tried, in order, after the exact lookup misses
pub const NORMALIZATIONS: [(&str, Normalization); 8] = [
    ("canonical_case", canonical_case),
    ("hyphens_to_underscores", hyphens_to_underscores),
    ("underscores_to_hyphens", underscores_to_hyphens),
    ("brand_separator", brand_separator),
    ("brand_separator_hyphenated", brand_separator_hyphenated),
    ("brand_separator_underscored", brand_separator_underscored),
    ("separators_removed", separators_removed),
    ("url_encoded", url_encoded),
];

/// Resolves externally supplied fragrance ids to canonical catalog ids
///
/// Stages run in order and stop at the first hit: exact id, each normalization, then a
/// fragment search over the name index that keeps only the single best candidate.
#[derive(Clone)]
pub struct IdentityResolver {
    index: Arc<dyn FragranceIndex>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(index: Arc<dyn FragranceIndex>) -> Self {
        Self {
            index,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bounds each index call; an elapsed deadline is `ProviderDegraded`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Only transport failures of the index are errors; a miss is `found: false`
    pub async fn resolve(&self, raw_id: &str) -> AppResult<Resolution> {
        let raw = raw_id.trim();
        let mut tried: Vec<String> = Vec::new();

        if raw.is_empty() {
            return Ok(not_found(tried));
        }

        if let Some(id) = self.find_exact(raw).await? {
            return Ok(found(id, tried));
        }

        for (name, normalize) in NORMALIZATIONS {
            let Some(candidate) = normalize(raw) else {
                continue;
            };
            if candidate == raw || tried.contains(&candidate) {
                continue;
            }
            tried.push(candidate.clone());

            if let Some(id) = self.find_exact(&candidate).await? {
                tracing::debug!(
                    raw_id = %raw,
                    canonical_id = %id,
                    normalization = name,
                    "Resolved fragrance id via normalization"
                );
                return Ok(found(id, tried));
            }
        }

        let fragments = name_fragments(raw);
        if !fragments.is_empty() {
            tried.push(format!("name~{}", fragments.join(" ")));
            let hits = deadline::bounded(
                self.timeout,
                "fragrance name search",
                self.index.search_names(&fragments, NAME_SEARCH_LIMIT),
                AppError::ProviderDegraded,
            )
            .await?;
            if let Some(best) = best_name_match(&fragments, hits) {
                tracing::debug!(
                    raw_id = %raw,
                    canonical_id = %best.id,
                    "Resolved fragrance id via name search"
                );
                return Ok(found(best.id, tried));
            }
        }

        tracing::info!(raw_id = %raw, attempts = tried.len(), "Fragrance id not resolved");
        Ok(not_found(tried))
    }

    async fn find_exact(&self, id: &str) -> AppResult<Option<String>> {
        deadline::bounded(
            self.timeout,
            "fragrance id lookup",
            self.index.find_exact(id),
            AppError::ProviderDegraded,
        )
        .await
    }
}

fn found(canonical_id: String, alternates_tried: Vec<String>) -> Resolution {
    Resolution {
        found: true,
        canonical_id: Some(canonical_id),
        alternates_tried,
    }
}

fn not_found(alternates_tried: Vec<String>) -> Resolution {
    Resolution {
        found: false,
        canonical_id: None,
        alternates_tried,
    }
}

/// Lowercase, percent-decode and turn whitespace into hyphens
fn prepare(raw: &str) -> String {
    let decoded = if raw.contains('%') || raw.contains('+') {
        form_urlencoded::parse(raw.as_bytes())
            .map(|(key, value)| {
                if value.is_empty() {
                    key.into_owned()
                } else {
                    format!("{}={}", key, value)
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    } else {
        raw.to_string()
    };

    let lowered = decoded.trim().to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join("-")
}

fn changed(raw: &str, candidate: String) -> Option<String> {
    if candidate.is_empty() || candidate == raw {
        None
    } else {
        Some(candidate)
    }
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '_'
}

/// Splits `brand<sep>rest` at the first separator, unless already in `brand__rest` form
fn split_brand(prepared: &str) -> Option<(&str, &str)> {
    if prepared.contains("__") {
        return None;
    }
    let idx = prepared.find(is_separator)?;
    let (brand, rest) = (&prepared[..idx], &prepared[idx + 1..]);
    if brand.is_empty() || rest.is_empty() {
        None
    } else {
        Some((brand, rest))
    }
}

pub fn canonical_case(raw: &str) -> Option<String> {
    changed(raw, prepare(raw))
}

pub fn hyphens_to_underscores(raw: &str) -> Option<String> {
    changed(raw, prepare(raw).replace('-', "_"))
}

pub fn underscores_to_hyphens(raw: &str) -> Option<String> {
    changed(raw, prepare(raw).replace("__", "-").replace('_', "-"))
}

/// `chanel-no_5` → `chanel__no5`
pub fn brand_separator(raw: &str) -> Option<String> {
    let prepared = prepare(raw);
    let (brand, rest) = split_brand(&prepared)?;
    let rest: String = rest.chars().filter(|c| !is_separator(*c)).collect();
    changed(raw, format!("{}__{}", brand, rest))
}

/// `chanel-no_5` → `chanel__no-5`
pub fn brand_separator_hyphenated(raw: &str) -> Option<String> {
    let prepared = prepare(raw);
    let (brand, rest) = split_brand(&prepared)?;
    changed(raw, format!("{}__{}", brand, rest.replace('_', "-")))
}

/// `chanel-no-5` → `chanel__no_5`
pub fn brand_separator_underscored(raw: &str) -> Option<String> {
    let prepared = prepare(raw);
    let (brand, rest) = split_brand(&prepared)?;
    changed(raw, format!("{}__{}", brand, rest.replace('-', "_")))
}

pub fn separators_removed(raw: &str) -> Option<String> {
    changed(raw, prepare(raw).chars().filter(|c| !is_separator(*c)).collect())
}

pub fn url_encoded(raw: &str) -> Option<String> {
    changed(raw, form_urlencoded::byte_serialize(raw.as_bytes()).collect())
}

/// Lowercase alphanumeric fragments longer than two characters
pub fn name_fragments(raw: &str) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();
    for fragment in prepare(raw).split(|c: char| !c.is_alphanumeric()) {
        if fragment.chars().count() >= MIN_FRAGMENT_LEN && !fragments.iter().any(|f| f == fragment)
        {
            fragments.push(fragment.to_string());
        }
    }
    fragments
}

/// Most fragments matched wins, then popularity, then id for determinism
fn best_name_match(fragments: &[String], hits: Vec<NameMatch>) -> Option<NameMatch> {
    hits.into_iter()
        .map(|hit| {
            let haystack = format!("{} {}", hit.name, hit.brand).to_lowercase();
            let matched = fragments
                .iter()
                .filter(|f| haystack.contains(f.as_str()))
                .count();
            (matched, hit)
        })
        .filter(|(matched, _)| *matched > 0)
        .max_by(|(a_count, a), (b_count, b)| {
            a_count
                .cmp(b_count)
                .then_with(|| a.popularity_score.total_cmp(&b.popularity_score))
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(|(_, hit)| hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeIndex {
        ids: Vec<String>,
        names: Vec<NameMatch>,
        lookups: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl FragranceIndex for FakeIndex {
        async fn find_exact(&self, id: &str) -> AppResult<Option<String>> {
            if self.fail {
                return Err(AppError::Internal("connection reset".into()));
            }
            self.lookups.lock().await.push(id.to_string());
            Ok(self.ids.iter().find(|known| known.as_str() == id).cloned())
        }

        async fn search_names(
            &self,
            fragments: &[String],
            _limit: usize,
        ) -> AppResult<Vec<NameMatch>> {
            Ok(self
                .names
                .iter()
                .filter(|n| {
                    let hay = format!("{} {}", n.name, n.brand).to_lowercase();
                    fragments.iter().any(|f| hay.contains(f.as_str()))
                })
                .cloned()
                .collect())
        }
    }

    fn name_match(id: &str, name: &str, brand: &str, popularity: f64) -> NameMatch {
        NameMatch {
            id: id.to_string(),
            name: name.to_string(),
            brand: brand.to_string(),
            popularity_score: popularity,
        }
    }

    fn resolver(index: FakeIndex) -> (IdentityResolver, Arc<FakeIndex>) {
        let index = Arc::new(index);
        (IdentityResolver::new(index.clone()), index)
    }

    #[tokio::test]
    async fn test_exact_match_short_circuits() {
        let (resolver, index) = resolver(FakeIndex {
            ids: vec!["dior__sauvage".into()],
            ..Default::default()
        });

        let result = resolver.resolve("dior__sauvage").await.unwrap();
        assert!(result.found);
        assert_eq!(result.canonical_id.as_deref(), Some("dior__sauvage"));
        assert!(result.alternates_tried.is_empty());
        assert_eq!(index.lookups.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_separator_variant_resolves() {
        let (resolver, _) = resolver(FakeIndex {
            ids: vec!["chanel__no5".into()],
            ..Default::default()
        });

        let result = resolver.resolve("chanel-no_5").await.unwrap();
        assert!(result.found);
        assert_eq!(result.canonical_id.as_deref(), Some("chanel__no5"));
        assert_eq!(
            result.alternates_tried.last().map(String::as_str),
            Some("chanel__no5")
        );
    }

    #[tokio::test]
    async fn test_url_encoded_id_resolves() {
        let (resolver, _) = resolver(FakeIndex {
            ids: vec!["tom-ford__oud-wood".into()],
            ..Default::default()
        });

        let result = resolver.resolve("Tom-Ford__Oud%20Wood").await.unwrap();
        assert!(result.found);
        assert_eq!(result.canonical_id.as_deref(), Some("tom-ford__oud-wood"));
    }

    #[tokio::test]
    async fn test_name_search_returns_single_best() {
        let (resolver, _) = resolver(FakeIndex {
            names: vec![
                name_match("creed__aventus", "Aventus", "Creed", 90.0),
                name_match("creed__aventus-for-her", "Aventus for Her", "Creed", 40.0),
                name_match("creed__viking", "Viking", "Creed", 60.0),
            ],
            ..Default::default()
        });

        let result = resolver.resolve("creed_aventus_2010_xx").await.unwrap();
        assert!(result.found);
        assert_eq!(result.canonical_id.as_deref(), Some("creed__aventus"));
        assert!(result
            .alternates_tried
            .contains(&"name~creed aventus 2010".to_string()));
    }

    #[tokio::test]
    async fn test_absent_id_reports_alternates() {
        let (resolver, _) = resolver(FakeIndex::default());

        let result = resolver.resolve("zzz-nonexistent-9999").await.unwrap();
        assert!(!result.found);
        assert!(result.canonical_id.is_none());
        assert!(!result.alternates_tried.is_empty());
        assert!(result
            .alternates_tried
            .contains(&"zzz_nonexistent_9999".to_string()));
    }

    #[tokio::test]
    async fn test_blank_id_not_found_without_lookup() {
        let (resolver, index) = resolver(FakeIndex::default());
        let result = resolver.resolve("   ").await.unwrap();
        assert!(!result.found);
        assert!(index.lookups.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let (resolver, _) = resolver(FakeIndex {
            fail: true,
            ..Default::default()
        });
        assert!(resolver.resolve("dior__sauvage").await.is_err());
    }

    struct HungIndex;

    #[async_trait::async_trait]
    impl FragranceIndex for HungIndex {
        async fn find_exact(&self, _id: &str) -> AppResult<Option<String>> {
            std::future::pending().await
        }

        async fn search_names(&self, _: &[String], _: usize) -> AppResult<Vec<NameMatch>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hung_index_is_provider_degraded() {
        let resolver =
            IdentityResolver::new(Arc::new(HungIndex)).with_timeout(Duration::from_millis(20));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            resolver.resolve("dior__sauvage"),
        )
        .await
        .expect("resolve must give up on a hung index");
        assert!(matches!(result, Err(AppError::ProviderDegraded(_))));
    }

    #[test]
    fn test_normalizations_individually() {
        assert_eq!(canonical_case("Dior__Sauvage"), Some("dior__sauvage".into()));
        assert_eq!(canonical_case("dior__sauvage"), None);
        assert_eq!(hyphens_to_underscores("a-b-c"), Some("a_b_c".into()));
        assert_eq!(underscores_to_hyphens("a__b_c"), Some("a-b-c".into()));
        assert_eq!(brand_separator("chanel-no_5"), Some("chanel__no5".into()));
        assert_eq!(brand_separator("chanel__no5"), None);
        assert_eq!(
            brand_separator_hyphenated("chanel-no_5"),
            Some("chanel__no-5".into())
        );
        assert_eq!(
            brand_separator_underscored("chanel-no-5"),
            Some("chanel__no_5".into())
        );
        assert_eq!(separators_removed("chanel__no-5"), Some("chanelno5".into()));
        assert_eq!(url_encoded("oud wood"), Some("oud+wood".into()));
        assert_eq!(url_encoded("plain"), None);
    }

    #[test]
    fn test_name_fragments_discard_short_tokens() {
        assert_eq!(name_fragments("chanel-no_5"), vec!["chanel".to_string()]);
        assert_eq!(
            name_fragments("YSL La Nuit de L'Homme"),
            vec!["ysl".to_string(), "nuit".to_string(), "homme".to_string()]
        );
        assert!(name_fragments("a-b-c").is_empty());
    }

    #[test]
    fn test_best_name_match_prefers_coverage_then_popularity() {
        let fragments = vec!["aventus".to_string(), "creed".to_string()];
        let best = best_name_match(
            &fragments,
            vec![
                name_match("a", "Aventus Cologne", "Other", 99.0),
                name_match("b", "Aventus", "Creed", 10.0),
                name_match("c", "Aventus", "Creed", 10.0),
            ],
        )
        .unwrap();
        assert_eq!(best.id, "b");
    }
}

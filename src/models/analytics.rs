use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Kind of derived value held in the analytics cache; each carries its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsCategory {
    Engagement,
    Recommendations,
    CollectionInsights,
}

impl AnalyticsCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsCategory::Engagement => "engagement",
            AnalyticsCategory::Recommendations => "recommendations",
            AnalyticsCategory::CollectionInsights => "collection_insights",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            AnalyticsCategory::Engagement => Duration::from_secs(5 * 60),
            AnalyticsCategory::Recommendations => Duration::from_secs(30 * 60),
            AnalyticsCategory::CollectionInsights => Duration::from_secs(60 * 60),
        }
    }
}

/// Owner used when a value is not tied to a signed-in user
///
/// `~` is outside the user id alphabet, so no signed-in user can share this scope.
pub const ANONYMOUS_OWNER: &str = "~anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalyticsKey {
    pub owner: String,
    pub category: AnalyticsCategory,
    pub key: String,
}

impl AnalyticsKey {
    pub fn new(owner: Option<&str>, category: AnalyticsCategory, key: impl Into<String>) -> Self {
        Self {
            owner: owner.unwrap_or(ANONYMOUS_OWNER).to_string(),
            category,
            key: key.into(),
        }
    }
}

impl Display for AnalyticsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "analytics:{}:{}:{}",
            self.owner,
            self.category.as_str(),
            self.key
        )
    }
}

/// A stored cache value with the metadata needed to judge freshness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub generated_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    /// An entry is fresh strictly before `generated_at + ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let expires_at = chrono::Duration::try_seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
            .and_then(|ttl| self.generated_at.checked_add_signed(ttl));
        match expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytics_key_display() {
        let key = AnalyticsKey::new(Some("user-1"), AnalyticsCategory::Engagement, "score");
        assert_eq!(format!("{}", key), "analytics:user-1:engagement:score");
    }

    #[test]
    fn test_analytics_key_anonymous_owner() {
        let key = AnalyticsKey::new(None, AnalyticsCategory::Recommendations, "abc");
        assert_eq!(format!("{}", key), "analytics:~anonymous:recommendations:abc");
    }

    #[test]
    fn test_user_named_anonymous_has_own_scope() {
        let anonymous = AnalyticsKey::new(None, AnalyticsCategory::Recommendations, "abc");
        let named = AnalyticsKey::new(Some("anonymous"), AnalyticsCategory::Recommendations, "abc");
        assert_ne!(anonymous, named);
        assert_ne!(anonymous.owner, named.owner);
    }

    #[test]
    fn test_category_ttls_ordered() {
        assert!(AnalyticsCategory::Engagement.ttl() < AnalyticsCategory::Recommendations.ttl());
        assert!(
            AnalyticsCategory::Recommendations.ttl()
                < AnalyticsCategory::CollectionInsights.ttl()
        );
    }

    #[test]
    fn test_cache_entry_freshness_boundary() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "k".into(),
            value: serde_json::json!(1),
            generated_at: now,
            ttl_secs: 60,
        };
        assert!(entry.is_fresh(now + chrono::Duration::seconds(59)));
        assert!(!entry.is_fresh(now + chrono::Duration::seconds(60)));
    }
}

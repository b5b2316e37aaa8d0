use serde::{Deserialize, Serialize};

/// Raw interaction counters for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngagementCounters {
    pub quizzes_completed: u64,
    pub collection_size: u64,
    pub ratings_given: u64,
    pub samples_ordered: u64,
    pub active_days_last_30: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Medium => "medium",
            EngagementLevel::High => "high",
        }
    }
}

/// Clamped engagement score and its discrete level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementScore {
    pub score: f64,
    pub level: EngagementLevel,
}

/// Accord frequency inside a user's collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccordCount {
    pub accord: String,
    pub count: u64,
}

/// Derived summary of a user's collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInsights {
    pub total_items: u64,
    pub top_accords: Vec<AccordCount>,
    pub average_rating: Option<f64>,
    pub engagement: EngagementScore,
}

/// One fragrance in a user's collection, with its accords when the catalog knows them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub fragrance_id: String,
    pub accords: Vec<String>,
    pub rating: Option<f64>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Category of a derived recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    PerformanceBottleneck,
    SeoOptimization,
    AccessibilityIssue,
    ConversionFunnel,
    SecurityIssue,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::PerformanceBottleneck => "performance_bottleneck",
            InsightType::SeoOptimization => "seo_optimization",
            InsightType::AccessibilityIssue => "accessibility_issue",
            InsightType::ConversionFunnel => "conversion_funnel",
            InsightType::SecurityIssue => "security_issue",
        }
    }
}

/// Priority levels ordered by weight; used for sorting and dedup decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl InsightPriority {
    /// Numeric weight: critical=4, high=3, medium=2, low=1.
    pub fn weight(&self) -> u8 {
        match self {
            InsightPriority::Critical => 4,
            InsightPriority::High => 3,
            InsightPriority::Medium => 2,
            InsightPriority::Low => 1,
        }
    }
}

/// Lifecycle status of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightStatus {
    Pending,
    Applied,
    Dismissed,
}

/// A machine-derived, prioritized recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub insight_type: InsightType,
    pub priority: InsightPriority,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Estimated impact of acting on this insight, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_score: Option<f64>,
    /// Estimated effort to act on this insight, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_score: Option<f64>,
    #[serde(default)]
    pub recommendations: HashMap<String, serde_json::Value>,
    /// Provenance: which analyses/metrics produced this insight
    #[serde(default)]
    pub data_source: HashMap<String, serde_json::Value>,
    pub status: InsightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        workspace_id: Uuid,
        insight_type: InsightType,
        priority: InsightPriority,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            insight_type,
            priority,
            title: title.into(),
            description: None,
            impact_score: None,
            effort_score: None,
            recommendations: HashMap::new(),
            data_source: HashMap::new(),
            status: InsightStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Dedup key: two insights with the same key describe the same finding.
    pub fn dedup_key(&self) -> (Uuid, InsightType, String) {
        (self.workspace_id, self.insight_type, self.title.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_weights_are_ordered() {
        assert!(InsightPriority::Critical.weight() > InsightPriority::High.weight());
        assert!(InsightPriority::High.weight() > InsightPriority::Medium.weight());
        assert!(InsightPriority::Medium.weight() > InsightPriority::Low.weight());
    }

    #[test]
    fn insight_type_wire_format() {
        let encoded = serde_json::to_string(&InsightType::PerformanceBottleneck).unwrap();
        assert_eq!(encoded, "\"performance_bottleneck\"");
        let decoded: InsightStatus = serde_json::from_str("\"dismissed\"").unwrap();
        assert_eq!(decoded, InsightStatus::Dismissed);
    }

    #[test]
    fn new_insight_is_pending() {
        let insight = Insight::new(
            Uuid::new_v4(),
            InsightType::SeoOptimization,
            InsightPriority::Medium,
            "Missing meta description",
        );
        assert_eq!(insight.status, InsightStatus::Pending);
        assert_eq!(insight.created_at, insight.updated_at);
    }
}

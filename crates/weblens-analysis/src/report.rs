use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use weblens_types::DimensionMap;

/// Metadata block every analyzer attaches to its report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerMetadata {
    pub analysis_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub user_agent: String,
}

impl AnalyzerMetadata {
    pub fn since(started: Instant, url: &str, user_agent: &str) -> Self {
        Self {
            analysis_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            url: url.to_string(),
            user_agent: user_agent.to_string(),
        }
    }
}

/// Three-way rating used for the Core Web Vital estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rating {
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "needs-improvement")]
    NeedsImprovement,
    #[serde(rename = "poor")]
    Poor,
}

impl Rating {
    /// Rate a value against fixed thresholds: `good` at or below the first,
    /// `poor` above the second.
    pub fn from_thresholds(value: f64, good: f64, poor: f64) -> Self {
        if value <= good {
            Rating::Good
        } else if value <= poor {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }
}

/// Flatten a serializable report into the free-form dimension map stored on
/// the analysis result.
pub fn to_dimension_map<T: Serialize>(report: &T) -> Result<DimensionMap, serde_json::Error> {
    match serde_json::to_value(report)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        other => {
            // Reports are structs; anything else is a programming error
            // surfaced as a serialization failure upstream.
            Err(serde::ser::Error::custom(format!(
                "report serialized to non-object value: {other}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_thresholds() {
        assert_eq!(Rating::from_thresholds(1800.0, 1800.0, 3000.0), Rating::Good);
        assert_eq!(
            Rating::from_thresholds(2500.0, 1800.0, 3000.0),
            Rating::NeedsImprovement
        );
        assert_eq!(Rating::from_thresholds(3000.1, 1800.0, 3000.0), Rating::Poor);
    }

    #[test]
    fn rating_wire_format() {
        assert_eq!(
            serde_json::to_string(&Rating::NeedsImprovement).unwrap(),
            "\"needs-improvement\""
        );
    }

    #[test]
    fn dimension_map_flattens_top_level_fields() {
        #[derive(Serialize)]
        struct Report {
            score: f64,
            label: &'static str,
        }
        let map = to_dimension_map(&Report { score: 42.0, label: "x" }).unwrap();
        assert_eq!(map["score"], serde_json::json!(42.0));
        assert_eq!(map["label"], serde_json::json!("x"));
    }
}

//! Scoring helpers shared by every rule.

/// Implementation complexity buckets with their base effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    fn base(&self) -> f64 {
        match self {
            Complexity::Low => 20.0,
            Complexity::Medium => 50.0,
            Complexity::High => 80.0,
        }
    }
}

/// Weighted mean of factor scores scaled to 0-100 and clamped.
///
/// Factors and weights are zipped positionally; missing weights default to
/// 1.0, surplus weights are ignored. An empty factor list scores 0.
pub fn calculate_impact_score(factors: &[f64], weights: &[f64]) -> f64 {
    if factors.is_empty() {
        return 0.0;
    }
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (i, factor) in factors.iter().enumerate() {
        let weight = weights.get(i).copied().unwrap_or(1.0);
        weighted_sum += factor * weight;
        weight_total += weight;
    }
    if weight_total == 0.0 {
        return 0.0;
    }
    (weighted_sum / weight_total).clamp(0.0, 100.0)
}

/// Effort estimate: the complexity base scaled up by the people and time
/// the fix needs, clamped to [1, 100].
pub fn calculate_effort_score(complexity: Complexity, resources: u32, time_days: u32) -> f64 {
    let base = complexity.base();
    let scaled = base * (1.0 + 0.2 * resources as f64 / 5.0 + 0.1 * time_days as f64 / 10.0);
    scaled.clamp(1.0, 100.0)
}

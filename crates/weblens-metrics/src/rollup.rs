use weblens_types::DailyMetrics;

/// Aggregate of a span of daily rows: totals sum, rates and durations take
/// the arithmetic mean over the days where the value is non-null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyAggregate {
    pub total_sessions: u64,
    pub total_page_views: u64,
    pub unique_visitors: u64,
    pub bounce_rate: Option<f64>,
    pub avg_session_duration: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub avg_load_time: Option<f64>,
}

impl DailyAggregate {
    pub fn from_rows(rows: &[DailyMetrics]) -> Self {
        let mut aggregate = Self {
            total_sessions: rows.iter().map(|r| r.total_sessions).sum(),
            total_page_views: rows.iter().map(|r| r.total_page_views).sum(),
            unique_visitors: rows.iter().map(|r| r.unique_visitors).sum(),
            ..Self::default()
        };
        aggregate.bounce_rate = mean_of(rows.iter().map(|r| r.bounce_rate));
        aggregate.avg_session_duration = mean_of(rows.iter().map(|r| r.avg_session_duration));
        aggregate.conversion_rate = mean_of(rows.iter().map(|r| r.conversion_rate));
        aggregate.avg_load_time = mean_of(rows.iter().map(|r| r.avg_load_time));
        aggregate
    }
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.flatten().collect();
    (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
}

use serde::Serialize;
use std::collections::HashSet;
use weblens_types::{AnalysisResult, Event, EventType, Session};

/// Metrics computed directly from raw rows for one time window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RealtimeMetrics {
    pub total_sessions: u64,
    pub total_page_views: u64,
    pub unique_visitors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_session_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_load_time: Option<f64>,
}

impl RealtimeMetrics {
    /// Fold raw sessions, events and analyses into the window's metrics.
    pub fn compute(sessions: &[Session], events: &[Event], analyses: &[AnalysisResult]) -> Self {
        let total_sessions = sessions.len() as u64;
        let total_page_views = sessions.iter().map(|s| s.page_views).sum();

        let distinct_users: HashSet<&str> = sessions
            .iter()
            .filter_map(|s| s.user_id.as_deref())
            .collect();
        let unique_visitors = if distinct_users.is_empty() {
            // No user attribution in the window; sessions are the best proxy.
            total_sessions
        } else {
            distinct_users.len() as u64
        };

        let (bounce_rate, avg_session_duration, conversion_rate) = if total_sessions > 0 {
            let bounced = sessions.iter().filter(|s| s.is_bounce()).count();
            let bounce_rate = 100.0 * bounced as f64 / total_sessions as f64;

            let duration_sum: i64 = sessions.iter().filter_map(|s| s.duration_seconds).sum();
            let has_durations = sessions.iter().any(|s| s.duration_seconds.is_some());
            let avg_session_duration =
                has_durations.then(|| duration_sum as f64 / total_sessions as f64);

            let conversions = events
                .iter()
                .filter(|e| e.event_type == EventType::Conversion)
                .count();
            let conversion_rate = 100.0 * conversions as f64 / total_sessions as f64;

            (Some(bounce_rate), avg_session_duration, Some(conversion_rate))
        } else {
            (None, None, None)
        };

        let load_times: Vec<f64> = analyses
            .iter()
            .filter_map(|a| a.performance_metrics.get("load_time_ms"))
            .filter_map(|v| v.as_f64())
            .collect();
        let avg_load_time = (!load_times.is_empty())
            .then(|| load_times.iter().sum::<f64>() / load_times.len() as f64);

        Self {
            total_sessions,
            total_page_views,
            unique_visitors,
            bounce_rate,
            avg_session_duration,
            conversion_rate,
            avg_load_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn session(user: Option<&str>, page_views: u64, duration: Option<i64>) -> Session {
        let mut s = Session::started_now(Uuid::new_v4(), Uuid::new_v4());
        s.user_id = user.map(|u| u.to_string());
        s.page_views = page_views;
        s.duration_seconds = duration;
        s
    }

    fn event(event_type: EventType) -> Event {
        Event {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            event_type,
            url: None,
            timestamp: Utc::now(),
            properties: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_window_has_no_rates() {
        let m = RealtimeMetrics::compute(&[], &[], &[]);
        assert_eq!(m.total_sessions, 0);
        assert!(m.bounce_rate.is_none());
        assert!(m.conversion_rate.is_none());
    }

    #[test]
    fn computes_all_aggregates() {
        let sessions = vec![
            session(Some("alice"), 1, Some(30)),
            session(Some("alice"), 4, Some(90)),
            session(None, 0, None),
            session(Some("bob"), 2, Some(60)),
        ];
        let events = vec![
            event(EventType::Conversion),
            event(EventType::Click),
            event(EventType::Conversion),
        ];

        let mut analysis = AnalysisResult::new(Uuid::new_v4(), "https://x.com");
        analysis
            .performance_metrics
            .insert("load_time_ms".into(), serde_json::json!(800.0));
        let mut analysis2 = AnalysisResult::new(Uuid::new_v4(), "https://y.com");
        analysis2
            .performance_metrics
            .insert("load_time_ms".into(), serde_json::json!(1200.0));

        let m = RealtimeMetrics::compute(&sessions, &events, &[analysis, analysis2]);

        assert_eq!(m.total_sessions, 4);
        assert_eq!(m.total_page_views, 7);
        // Two distinct user ids; the anonymous session does not widen the set.
        assert_eq!(m.unique_visitors, 2);
        // Two sessions with <= 1 page view out of four.
        assert_eq!(m.bounce_rate, Some(50.0));
        // (30 + 90 + 60) / 4 sessions
        assert_eq!(m.avg_session_duration, Some(45.0));
        // 2 conversions / 4 sessions
        assert_eq!(m.conversion_rate, Some(50.0));
        assert_eq!(m.avg_load_time, Some(1000.0));
    }

    #[test]
    fn anonymous_sessions_fall_back_to_session_count() {
        let sessions = vec![session(None, 1, None), session(None, 2, None)];
        let m = RealtimeMetrics::compute(&sessions, &[], &[]);
        assert_eq!(m.unique_visitors, 2);
    }
}

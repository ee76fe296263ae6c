use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Process-wide detection counters, updated from every analysis task.
///
/// Guarded by a mutex; the hot path takes the lock for a handful of adds
/// only.
#[derive(Debug, Default)]
pub struct DetectionMetrics {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    total_requests: u64,
    total_technologies_detected: u64,
    total_duration: Duration,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionMetricsSnapshot {
    pub total_requests: u64,
    pub total_technologies_detected: u64,
    pub avg_duration_ms: f64,
}

impl DetectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one detection pass.
    pub fn record(&self, technologies_detected: usize, duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_requests += 1;
        inner.total_technologies_detected += technologies_detected as u64;
        inner.total_duration += duration;
    }

    pub fn snapshot(&self) -> DetectionMetricsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let avg_duration_ms = if inner.total_requests > 0 {
            inner.total_duration.as_secs_f64() * 1000.0 / inner.total_requests as f64
        } else {
            0.0
        };
        DetectionMetricsSnapshot {
            total_requests: inner.total_requests,
            total_technologies_detected: inner.total_technologies_detected,
            avg_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn records_accumulate() {
        let metrics = DetectionMetrics::new();
        metrics.record(3, Duration::from_millis(10));
        metrics.record(1, Duration::from_millis(30));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.total_technologies_detected, 4);
        assert!((snap.avg_duration_ms - 20.0).abs() < 1.0);
    }

    #[test]
    fn concurrent_records_do_not_lose_counts() {
        let metrics = Arc::new(DetectionMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record(2, Duration::from_micros(5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 800);
        assert_eq!(snap.total_technologies_detected, 1600);
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Bounded ring buffer of durations per operation name; avoids unbounded
/// growth under long-lived processes (the watcher, the retrieval server)
/// while still keeping enough history for p50/p95-style summaries.
const MAX_SAMPLES_PER_OP: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct OperationSummary {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Process-wide timing registry. `record_operation` returns `()` on purpose:
/// callers must not mistake the recorded sample for a measurement result,
/// which was a real bug class in earlier call sites that timed the wrong
/// span by accident.
#[derive(Default)]
pub struct PerformanceMonitor {
    samples: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self, name: &str, duration_ms: f64) {
        let mut samples = self.samples.lock().expect("perf monitor mutex poisoned");
        let entry = samples.entry(name.to_string()).or_default();
        if entry.len() >= MAX_SAMPLES_PER_OP {
            entry.pop_front();
        }
        entry.push_back(duration_ms);
    }

    pub fn summary(&self, name: &str) -> Option<OperationSummary> {
        let samples = self.samples.lock().expect("perf monitor mutex poisoned");
        let entry = samples.get(name)?;
        if entry.is_empty() {
            return None;
        }
        let count = entry.len();
        let sum: f64 = entry.iter().sum();
        let min_ms = entry.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_ms = entry.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some(OperationSummary {
            count,
            avg_ms: sum / count as f64,
            min_ms,
            max_ms,
        })
    }

    /// Returns operation names whose latest sample exceeds `threshold_ms`,
    /// used by the resource guard to flag a degrading operation.
    pub fn operations_over_threshold(&self, threshold_ms: f64) -> Vec<String> {
        let samples = self.samples.lock().expect("perf monitor mutex poisoned");
        samples
            .iter()
            .filter_map(|(name, durations)| {
                durations
                    .back()
                    .filter(|&&last| last > threshold_ms)
                    .map(|_| name.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_none_for_unknown_operation() {
        let monitor = PerformanceMonitor::new();
        assert!(monitor.summary("unknown").is_none());
    }

    #[test]
    fn summary_computes_avg_min_max() {
        let monitor = PerformanceMonitor::new();
        monitor.record_operation("parse", 10.0);
        monitor.record_operation("parse", 20.0);
        monitor.record_operation("parse", 30.0);
        let summary = monitor.summary("parse").unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.avg_ms, 20.0);
        assert_eq!(summary.min_ms, 10.0);
        assert_eq!(summary.max_ms, 30.0);
    }

    #[test]
    fn ring_buffer_drops_oldest_beyond_cap() {
        let monitor = PerformanceMonitor::new();
        for i in 0..(MAX_SAMPLES_PER_OP + 10) {
            monitor.record_operation("op", i as f64);
        }
        let summary = monitor.summary("op").unwrap();
        assert_eq!(summary.count, MAX_SAMPLES_PER_OP);
        assert_eq!(summary.min_ms, 10.0);
    }

    #[test]
    fn operations_over_threshold_flags_latest_sample() {
        let monitor = PerformanceMonitor::new();
        monitor.record_operation("slow", 500.0);
        monitor.record_operation("fast", 1.0);
        let over = monitor.operations_over_threshold(100.0);
        assert_eq!(over, vec!["slow".to_string()]);
    }
}

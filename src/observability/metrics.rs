//! Metrics (§4.9): counters and histograms as time-tagged points in bounded
//! deques, with totals/summary/time-series queries.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

const DEFAULT_MAX_POINTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Point {
    at: DateTime<Utc>,
    value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HistogramSummary {
    pub count: usize,
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesBucket {
    pub bucket_start: DateTime<Utc>,
    pub value: f64,
}

/// In-memory metrics registry. Counters and histograms are keyed by name;
/// each name's points are capped at `max_points`, dropping the oldest.
pub struct Metrics {
    counters: Mutex<HashMap<String, VecDeque<Point>>>,
    histograms: Mutex<HashMap<String, VecDeque<Point>>>,
    max_points: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_POINTS)
    }

    pub fn with_capacity(max_points: usize) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            max_points,
        }
    }

    pub async fn increment_counter(&self, name: &str, amount: u64) {
        let mut counters = self.counters.lock().await;
        push_point(counters.entry(name.to_string()).or_default(), amount as f64, self.max_points);
    }

    pub async fn observe_histogram(&self, name: &str, value: f64) {
        let mut histograms = self.histograms.lock().await;
        push_point(histograms.entry(name.to_string()).or_default(), value, self.max_points);
    }

    pub async fn counter_total(&self, name: &str, since: Option<DateTime<Utc>>) -> f64 {
        let counters = self.counters.lock().await;
        counters
            .get(name)
            .map(|points| points.iter().filter(|p| since.is_none_or(|s| p.at >= s)).map(|p| p.value).sum())
            .unwrap_or(0.0)
    }

    pub async fn histogram_summary(&self, name: &str) -> HistogramSummary {
        let histograms = self.histograms.lock().await;
        let Some(points) = histograms.get(name) else {
            return HistogramSummary::default();
        };
        summarize(points)
    }

    pub async fn time_series(&self, name: &str, interval_seconds: i64, since: DateTime<Utc>, is_histogram: bool) -> Vec<TimeSeriesBucket> {
        let store = if is_histogram { &self.histograms } else { &self.counters };
        let store = store.lock().await;
        let Some(points) = store.get(name) else {
            return Vec::new();
        };

        let mut buckets: HashMap<i64, f64> = HashMap::new();
        for point in points.iter().filter(|p| p.at >= since) {
            let bucket_index = point.at.timestamp() / interval_seconds;
            *buckets.entry(bucket_index).or_insert(0.0) += point.value;
        }

        let mut result: Vec<TimeSeriesBucket> = buckets
            .into_iter()
            .map(|(index, value)| TimeSeriesBucket {
                bucket_start: DateTime::from_timestamp(index * interval_seconds, 0).unwrap_or(since),
                value,
            })
            .collect();
        result.sort_by_key(|b| b.bucket_start);
        result
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_point(deque: &mut VecDeque<Point>, value: f64, max_points: usize) {
    if deque.len() >= max_points {
        deque.pop_front();
    }
    deque.push_back(Point { at: Utc::now(), value });
}

fn summarize(points: &VecDeque<Point>) -> HistogramSummary {
    if points.is_empty() {
        return HistogramSummary::default();
    }
    let mut values: Vec<f64> = points.iter().map(|p| p.value).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let count = values.len();
    let avg = values.iter().sum::<f64>() / count as f64;
    let max = *values.last().unwrap();

    HistogramSummary {
        count,
        avg,
        p50: percentile(&values, 0.50),
        p90: percentile(&values, 0.90),
        p99: percentile(&values, 0.99),
        max,
    }
}

fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[rank.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counter_total_sums_all_increments() {
        let metrics = Metrics::new();
        metrics.increment_counter("tool_calls", 3).await;
        metrics.increment_counter("tool_calls", 2).await;

        assert_eq!(metrics.counter_total("tool_calls", None).await, 5.0);
    }

    #[tokio::test]
    async fn histogram_summary_computes_percentiles() {
        let metrics = Metrics::new();
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            metrics.observe_histogram("latency_ms", v).await;
        }

        let summary = metrics.histogram_summary("latency_ms").await;
        assert_eq!(summary.count, 5);
        assert_eq!(summary.max, 50.0);
        assert!((summary.avg - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn deque_is_bounded_by_max_points() {
        let metrics = Metrics::with_capacity(3);
        for i in 0..5 {
            metrics.increment_counter("x", i).await;
        }
        assert_eq!(metrics.counter_total("x", None).await, 2.0 + 3.0 + 4.0);
    }

    #[tokio::test]
    async fn unknown_metric_returns_empty_summary() {
        let metrics = Metrics::new();
        let summary = metrics.histogram_summary("nonexistent").await;
        assert_eq!(summary.count, 0);
    }
}

//! Bounded sliding window of recent stress readings for live display.
//!
//! Entries older than the horizon are evicted when a newer entry arrives;
//! there is no background timer. The running sum keeps `mean()` O(1).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Mean-stress severity shown next to the live chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBand {
    Normal,
    Moderate,
    High,
}

impl SeverityBand {
    pub fn label(&self) -> &'static str {
        match self {
            SeverityBand::Normal => "NORMAL",
            SeverityBand::Moderate => "MODERATE STRESS",
            SeverityBand::High => "HIGH STRESS",
        }
    }

    /// Display color for renderers.
    pub fn color(&self) -> &'static str {
        match self {
            SeverityBand::Normal => "green",
            SeverityBand::Moderate => "orange",
            SeverityBand::High => "red",
        }
    }
}

/// Band edges in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    /// Lower edge of the moderate band (inclusive)
    pub moderate_pct: f64,
    /// Lower edge of the high band (inclusive)
    pub high_pct: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            moderate_pct: 50.0,
            high_pct: 90.0,
        }
    }
}

impl SeverityBands {
    pub fn classify(&self, pct: f64) -> SeverityBand {
        if pct >= self.high_pct {
            SeverityBand::High
        } else if pct >= self.moderate_pct {
            SeverityBand::Moderate
        } else {
            SeverityBand::Normal
        }
    }
}

/// Time-bounded buffer of `(relative_time_s, probability_pct)` pairs.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    horizon_secs: f64,
    entries: VecDeque<(f64, f64)>,
    sum: f64,
}

impl SlidingWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon_secs: horizon.as_secs_f64(),
            entries: VecDeque::new(),
            sum: 0.0,
        }
    }

    /// Append an entry and evict everything older than the horizon.
    pub fn push(&mut self, time_secs: f64, probability_pct: f64) {
        self.entries.push_back((time_secs, probability_pct));
        self.sum += probability_pct;

        let cutoff = time_secs - self.horizon_secs;
        while let Some(&(t, pct)) = self.entries.front() {
            if t >= cutoff {
                break;
            }
            self.entries.pop_front();
            self.sum -= pct;
        }
        if self.entries.is_empty() {
            self.sum = 0.0;
        }
    }

    /// Mean of the retained probabilities, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.sum / self.entries.len() as f64
        }
    }

    /// Retained entries in time order.
    pub fn entries(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn horizon(&self) -> Duration {
        Duration::from_secs_f64(self.horizon_secs)
    }
}

/// One point of a live snapshot, tagged with its own band for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    pub time_secs: f64,
    pub probability_pct: f64,
    pub band: SeverityBand,
}

/// A fully formed copy of the aggregator state for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub points: Vec<LivePoint>,
    pub mean_pct: f64,
    pub band: SeverityBand,
    pub mean_latency_ms: f64,
    pub total_samples: u64,
}

impl LiveSnapshot {
    pub fn latest(&self) -> Option<&LivePoint> {
        self.points.last()
    }

    /// X-axis range covering the last `horizon` seconds, starting at zero.
    pub fn x_range(&self, horizon: Duration) -> (f64, f64) {
        let span = horizon.as_secs_f64();
        match self.latest() {
            Some(p) if p.time_secs > span => (p.time_secs - span, p.time_secs),
            _ => (0.0, span),
        }
    }
}

/// Sliding window plus the derived reads a live display needs.
#[derive(Debug, Clone)]
pub struct LiveAggregator {
    window: SlidingWindow,
    bands: SeverityBands,
    latency_sum_ms: f64,
    total_samples: u64,
}

impl LiveAggregator {
    pub fn new(horizon: Duration, bands: SeverityBands) -> Self {
        Self {
            window: SlidingWindow::new(horizon),
            bands,
            latency_sum_ms: 0.0,
            total_samples: 0,
        }
    }

    pub fn push(&mut self, time_secs: f64, probability_pct: f64) {
        self.window.push(time_secs, probability_pct);
        self.total_samples += 1;
    }

    /// Push a reading together with its inference latency.
    pub fn push_with_latency(&mut self, time_secs: f64, probability_pct: f64, latency_ms: f64) {
        self.push(time_secs, probability_pct);
        self.latency_sum_ms += latency_ms;
    }

    pub fn mean(&self) -> f64 {
        self.window.mean()
    }

    pub fn band(&self) -> SeverityBand {
        self.bands.classify(self.mean())
    }

    pub fn window(&self) -> Vec<(f64, f64)> {
        self.window.entries().collect()
    }

    /// Session-wide mean latency; not limited to the window.
    pub fn mean_latency_ms(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.latency_sum_ms / self.total_samples as f64
        }
    }

    pub fn bands(&self) -> SeverityBands {
        self.bands
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            points: self
                .window
                .entries()
                .map(|(time_secs, probability_pct)| LivePoint {
                    time_secs,
                    probability_pct,
                    band: self.bands.classify(probability_pct),
                })
                .collect(),
            mean_pct: self.mean(),
            band: self.band(),
            mean_latency_ms: self.mean_latency_ms(),
            total_samples: self.total_samples,
        }
    }
}

/// Aggregator shared between the pipeline (writer) and a renderer (reader).
///
/// Readers only ever see copies taken under the lock.
#[derive(Debug, Clone)]
pub struct SharedAggregator {
    inner: Arc<Mutex<LiveAggregator>>,
}

impl SharedAggregator {
    pub fn new(aggregator: LiveAggregator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    pub fn push_with_latency(&self, time_secs: f64, probability_pct: f64, latency_ms: f64) {
        self.lock()
            .push_with_latency(time_secs, probability_pct, latency_ms);
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.lock().snapshot()
    }

    pub fn mean(&self) -> f64 {
        self.lock().mean()
    }

    fn lock(&self) -> MutexGuard<'_, LiveAggregator> {
        // A panicked writer leaves plain numbers behind; keep serving them.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_mean_is_zero() {
        let window = SlidingWindow::new(Duration::from_secs(60));
        assert_eq!(window.mean(), 0.0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_window_eviction() {
        let mut window = SlidingWindow::new(Duration::from_secs(60));
        for t in 0..=120 {
            window.push(t as f64, 50.0);
        }

        let entries: Vec<_> = window.entries().collect();
        assert_eq!(entries.first().map(|e| e.0), Some(60.0));
        assert_eq!(entries.last().map(|e| e.0), Some(120.0));
        assert!(entries.windows(2).all(|pair| pair[0].0 <= pair[1].0));
        assert!(entries.iter().all(|&(t, _)| 120.0 - t <= 60.0));
    }

    #[test]
    fn test_window_mean_tracks_evictions() {
        let mut window = SlidingWindow::new(Duration::from_secs(10));
        window.push(0.0, 100.0);
        window.push(5.0, 50.0);
        assert!((window.mean() - 75.0).abs() < 1e-9);

        // Evicts t=0 and t=5.
        window.push(20.0, 10.0);
        assert_eq!(window.len(), 1);
        assert!((window.mean() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_severity_bands() {
        let bands = SeverityBands::default();
        assert_eq!(bands.classify(0.0), SeverityBand::Normal);
        assert_eq!(bands.classify(49.99), SeverityBand::Normal);
        assert_eq!(bands.classify(50.0), SeverityBand::Moderate);
        assert_eq!(bands.classify(89.9), SeverityBand::Moderate);
        assert_eq!(bands.classify(90.0), SeverityBand::High);
        assert_eq!(bands.classify(100.0), SeverityBand::High);
    }

    #[test]
    fn test_band_read_does_not_change_window() {
        let mut aggregator =
            LiveAggregator::new(Duration::from_secs(60), SeverityBands::default());
        aggregator.push(1.0, 95.0);
        aggregator.push(2.0, 93.0);

        assert_eq!(aggregator.band(), SeverityBand::High);
        assert_eq!(aggregator.band(), SeverityBand::High);
        assert_eq!(aggregator.window(), vec![(1.0, 95.0), (2.0, 93.0)]);
    }

    #[test]
    fn test_snapshot_contents() {
        let shared = SharedAggregator::new(LiveAggregator::new(
            Duration::from_secs(60),
            SeverityBands::default(),
        ));
        shared.push_with_latency(0.5, 20.0, 2.0);
        shared.push_with_latency(1.0, 60.0, 4.0);

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.points.len(), 2);
        assert_eq!(snapshot.points[1].band, SeverityBand::Moderate);
        assert!((snapshot.mean_pct - 40.0).abs() < 1e-9);
        assert_eq!(snapshot.band, SeverityBand::Normal);
        assert!((snapshot.mean_latency_ms - 3.0).abs() < 1e-9);
        assert_eq!(snapshot.total_samples, 2);
    }

    #[test]
    fn test_snapshot_x_range_scrolls() {
        let shared = SharedAggregator::new(LiveAggregator::new(
            Duration::from_secs(60),
            SeverityBands::default(),
        ));
        let horizon = Duration::from_secs(60);
        assert_eq!(shared.snapshot().x_range(horizon), (0.0, 60.0));

        shared.push_with_latency(75.0, 10.0, 1.0);
        assert_eq!(shared.snapshot().x_range(horizon), (15.0, 75.0));
    }

    #[test]
    fn test_shared_reader_on_another_thread() {
        let shared = SharedAggregator::new(LiveAggregator::new(
            Duration::from_secs(60),
            SeverityBands::default(),
        ));
        let reader = shared.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..100 {
                shared.push_with_latency(i as f64 * 0.05, 30.0, 1.0);
            }
        });
        writer.join().unwrap();

        assert_eq!(reader.snapshot().points.len(), 100);
        assert!((reader.mean() - 30.0).abs() < 1e-9);
    }
}

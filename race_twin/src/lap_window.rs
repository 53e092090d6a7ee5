use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{SectorTimes, TelemetrySample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapSample {
    /// Race lap number
    pub lap: u32,
    /// Lap time in seconds
    pub lap_time: f64,
    #[serde(default)]
    pub sectors: SectorTimes,
    #[serde(default)]
    pub telemetry: Vec<TelemetrySample>,
}

/// Maintains a sliding window of a driver's most recent laps, the history a
/// twin is regenerated from.
#[derive(Debug, Clone)]
pub struct LapWindow {
    /// Number of recent laps to keep
    window_size: usize,
    window: VecDeque<LapSample>,
}

impl LapWindow {
    /// Create a new lap window.
    ///
    /// # Arguments
    /// * `window_size` - Number of recent laps to keep in the sliding window
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            window: VecDeque::with_capacity(window_size),
        }
    }

    /// Add a completed lap, evicting the oldest once the window is full.
    pub fn add_lap(&mut self, sample: LapSample) {
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    /// Laps in `[from_lap, to_lap]`, ordered by lap number.
    ///
    /// # Returns
    /// `Some(Vec<LapSample>)` if at least two laps fall in range, `None` otherwise
    pub fn get_range(&self, from_lap: u32, to_lap: u32) -> Option<Vec<LapSample>> {
        if self.window.len() < 2 {
            return None;
        }
        let mut laps: Vec<LapSample> = self
            .window
            .iter()
            .filter(|s| s.lap >= from_lap && s.lap <= to_lap)
            .cloned()
            .collect();
        if laps.len() < 2 {
            return None;
        }
        laps.sort_by_key(|s| s.lap);
        Some(laps)
    }

    pub fn lap_times(&self) -> Vec<f64> {
        self.window.iter().map(|s| s.lap_time).collect()
    }

    pub fn sector_times(&self) -> Vec<SectorTimes> {
        self.window.iter().map(|s| s.sectors).collect()
    }

    /// Every telemetry sample in the window, oldest lap first.
    pub fn telemetry(&self) -> Vec<TelemetrySample> {
        self.window.iter().flat_map(|s| s.telemetry.iter().copied()).collect()
    }

    pub fn latest_lap(&self) -> Option<u32> {
        self.window.back().map(|s| s.lap)
    }

    /// Clear the sliding window.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(n: u32, t: f64) -> LapSample {
        LapSample {
            lap: n,
            lap_time: t,
            sectors: SectorTimes::new(t / 3.0, t / 3.0, t / 3.0),
            telemetry: vec![TelemetrySample { throttle: Some(0.8), ..Default::default() }],
        }
    }

    #[test]
    fn test_window_size_limit() {
        let mut w = LapWindow::new(5);
        for i in 1..=10 {
            w.add_lap(lap(i, 95.0 + i as f64 * 0.1));
        }
        assert_eq!(w.window_len(), 5, "Window should be limited to window_size");
        assert_eq!(w.latest_lap(), Some(10));
        assert!((w.lap_times()[0] - 95.6).abs() < 1e-9);
        println!("✓ Window keeps the last {} laps", w.window_len());
    }

    #[test]
    fn test_range_sorted() {
        let mut w = LapWindow::new(20);
        for i in [5, 3, 4, 1, 2] {
            w.add_lap(lap(i, 95.0));
        }
        let range = w.get_range(2, 4).expect("range should exist");
        let laps: Vec<u32> = range.iter().map(|s| s.lap).collect();
        assert_eq!(laps, vec![2, 3, 4]);
        assert!(w.get_range(5, 9).is_none(), "single lap is not a range");
        println!("✓ Range {:?}", laps);
    }

    #[test]
    fn test_insufficient_data() {
        let mut w = LapWindow::new(10);
        w.add_lap(lap(1, 95.0));
        assert!(w.get_range(0, 100).is_none(), "Should return None with insufficient data");
    }

    #[test]
    fn test_flattened_history() {
        let mut w = LapWindow::new(10);
        for i in 1..=3 {
            w.add_lap(lap(i, 96.0));
        }
        assert_eq!(w.telemetry().len(), 3);
        assert_eq!(w.sector_times().len(), 3);
        assert!((w.sector_times()[0].s1 - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut w = LapWindow::new(10);
        for i in 0..5 {
            w.add_lap(lap(i, 95.0));
        }
        assert_eq!(w.window_len(), 5);
        w.reset();
        assert_eq!(w.window_len(), 0, "Window should be empty after reset");
        assert_eq!(w.latest_lap(), None);
    }
}

// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Noderr Protocol Foundation
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

//! C3 — Online Metrics Tracker. Per-model rolling vector of the last `W`
//! errors, producing accuracy / MAE / RMSE snapshots (spec.md §4.3).

use serde::{Deserialize, Serialize};

use crate::window::WindowStore;

const ERROR_WINDOW: &str = "errors";
const ACCURACY_ERROR_CUTOFF: f64 = 0.1;

/// A point-in-time snapshot of a model's rolling error metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelMetricsSnapshot {
    pub accuracy: f64,
    pub mae: f64,
    pub rmse: f64,
    pub sample_count: usize,
}

/// One rolling error-history per model, safe for concurrent readers and a
/// single writer per model (the window store's per-key lock).
pub struct OnlineMetricsTracker {
    errors: WindowStore<f64>,
    window_size: usize,
}

impl OnlineMetricsTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            errors: WindowStore::new(window_size),
            window_size,
        }
    }

    /// Pushes one feedback error and recomputes the rolling snapshot.
    pub fn record_error(&self, model_id: &str, error: f64) -> ModelMetricsSnapshot {
        self.errors.push(model_id, ERROR_WINDOW, error.abs());
        self.snapshot(model_id)
    }

    /// Accuracy is `|{e : e < cutoff}| / W` over the full window size `W`,
    /// not the current sample count, so it only reaches its ceiling once
    /// the window is full (spec.md §4.3).
    pub fn snapshot(&self, model_id: &str) -> ModelMetricsSnapshot {
        let errors = self.errors.snapshot(model_id, ERROR_WINDOW);
        if errors.is_empty() {
            return ModelMetricsSnapshot::default();
        }

        let n = errors.len() as f64;
        let w = self.window_size as f64;
        let within_cutoff = errors.iter().filter(|e| **e < ACCURACY_ERROR_CUTOFF).count() as f64;
        let accuracy = within_cutoff / w;
        let mae = errors.iter().sum::<f64>() / n;
        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();

        ModelMetricsSnapshot {
            accuracy,
            mae,
            rmse,
            sample_count: errors.len(),
        }
    }

    pub fn remove_model(&self, model_id: &str) {
        self.errors.remove_model(model_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_yields_zero_metrics() {
        let tracker = OnlineMetricsTracker::new(100);
        let snapshot = tracker.snapshot("model_a");
        assert_eq!(snapshot.accuracy, 0.0);
        assert_eq!(snapshot.mae, 0.0);
        assert_eq!(snapshot.rmse, 0.0);
    }

    #[test]
    fn accuracy_is_fraction_of_full_window_not_current_count() {
        let tracker = OnlineMetricsTracker::new(3);
        tracker.record_error("model_a", 0.05);
        tracker.record_error("model_a", 0.05);
        let snapshot = tracker.record_error("model_a", 0.5);
        assert!((snapshot.accuracy - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn accuracy_stays_below_ceiling_until_window_fills() {
        let tracker = OnlineMetricsTracker::new(100);
        tracker.record_error("model_a", 0.05);
        let snapshot = tracker.record_error("model_a", 0.05);
        // Only 2 of 100 window slots are filled, both under cutoff.
        assert!((snapshot.accuracy - 0.02).abs() < 1e-9);
    }

    #[test]
    fn mae_and_rmse_match_definitions() {
        let tracker = OnlineMetricsTracker::new(100);
        tracker.record_error("model_a", 1.0);
        let snapshot = tracker.record_error("model_a", 3.0);
        assert!((snapshot.mae - 2.0).abs() < 1e-9);
        assert!((snapshot.rmse - (5.0f64).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn window_is_bounded() {
        let tracker = OnlineMetricsTracker::new(10);
        for i in 0..100 {
            tracker.record_error("model_a", i as f64 * 0.01);
        }
        let snapshot = tracker.snapshot("model_a");
        assert_eq!(snapshot.sample_count, 10);
    }
}

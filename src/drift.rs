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

//! C2 — Concept-Drift Detector. Maintains a reference/current window pair
//! per `(model_id, feature)` key and computes a drift score via a
//! pluggable statistical test (spec.md §4.2). The source system's KS
//! implementation does not sort its samples before computing the ECDF
//! distance (spec.md §9 Open Question); this is a textbook, conformant
//! two-sample KS instead.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::window::SlidingWindow;

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type DriftResult<T> = Result<T, DriftError>;

/// Selectable statistical test backing the drift score (spec.md §4.2, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTest {
    /// Maximum vertical distance between empirical CDFs. Default.
    Ks,
    /// Ten equal-width bins spanning the joint range, chi-square statistic.
    ChiSquared,
    /// Population Stability Index over normalized histograms.
    Psi,
}

impl Default for DriftTest {
    fn default() -> Self {
        DriftTest::Ks
    }
}

const HISTOGRAM_BINS: usize = 10;

impl DriftTest {
    /// Computes a drift score in `[0,1]` for a reference/current sample
    /// pair. Returns `0.0` on degenerate input (zero range, NaN bin width)
    /// per spec.md §4.2.
    pub fn compute(&self, reference: &[f64], current: &[f64]) -> f64 {
        if reference.is_empty() || current.is_empty() {
            return 0.0;
        }
        match self {
            DriftTest::Ks => ks_statistic(reference, current),
            DriftTest::ChiSquared => chi_squared_statistic(reference, current),
            DriftTest::Psi => psi_statistic(reference, current),
        }
    }
}

/// Textbook two-sample Kolmogorov-Smirnov statistic: sort both samples,
/// walk the merged order, track the max |F_ref(x) - F_cur(x)|.
fn ks_statistic(reference: &[f64], current: &[f64]) -> f64 {
    let mut ref_sorted = reference.to_vec();
    let mut cur_sorted = current.to_vec();
    ref_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    cur_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut all_values: Vec<f64> = ref_sorted.iter().chain(cur_sorted.iter()).copied().collect();
    all_values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    all_values.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);

    let ref_n = ref_sorted.len() as f64;
    let cur_n = cur_sorted.len() as f64;

    let mut max_diff = 0.0f64;
    for x in all_values {
        let ref_cdf = ref_sorted.partition_point(|v| *v <= x) as f64 / ref_n;
        let cur_cdf = cur_sorted.partition_point(|v| *v <= x) as f64 / cur_n;
        max_diff = max_diff.max((ref_cdf - cur_cdf).abs());
    }
    max_diff.clamp(0.0, 1.0)
}

/// Builds `HISTOGRAM_BINS` equal-width bin counts over `[min,max]` spanning
/// both samples. Returns `None` on a degenerate (zero-width) range.
fn histogram_counts(reference: &[f64], current: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let all: Vec<f64> = reference.iter().chain(current.iter()).copied().collect();
    let min = all.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = all.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return None;
    }

    let bin_width = range / HISTOGRAM_BINS as f64;
    let bin_of = |v: f64| -> usize {
        let idx = ((v - min) / bin_width).floor() as isize;
        idx.clamp(0, HISTOGRAM_BINS as isize - 1) as usize
    };

    let mut ref_counts = vec![0.0; HISTOGRAM_BINS];
    for v in reference {
        ref_counts[bin_of(*v)] += 1.0;
    }
    let mut cur_counts = vec![0.0; HISTOGRAM_BINS];
    for v in current {
        cur_counts[bin_of(*v)] += 1.0;
    }

    Some((ref_counts, cur_counts))
}

fn chi_squared_statistic(reference: &[f64], current: &[f64]) -> f64 {
    let Some((ref_counts, cur_counts)) = histogram_counts(reference, current) else {
        return 0.0;
    };

    // Scale the reference histogram to the current sample's total so the
    // comparison is apples-to-apples regardless of window-size drift.
    let ref_total: f64 = ref_counts.iter().sum();
    let cur_total: f64 = cur_counts.iter().sum();
    if ref_total == 0.0 || cur_total == 0.0 {
        return 0.0;
    }
    let scale = cur_total / ref_total;

    let mut stat = 0.0;
    for i in 0..HISTOGRAM_BINS {
        let expected = ref_counts[i] * scale;
        if expected > 0.0 {
            let observed = cur_counts[i];
            stat += (observed - expected).powi(2) / expected;
        }
    }

    (stat / HISTOGRAM_BINS as f64).min(1.0)
}

fn psi_statistic(reference: &[f64], current: &[f64]) -> f64 {
    let Some((ref_counts, cur_counts)) = histogram_counts(reference, current) else {
        return 0.0;
    };

    let ref_total: f64 = ref_counts.iter().sum();
    let cur_total: f64 = cur_counts.iter().sum();
    if ref_total == 0.0 || cur_total == 0.0 {
        return 0.0;
    }

    let mut psi = 0.0;
    for i in 0..HISTOGRAM_BINS {
        let p_ref = ref_counts[i] / ref_total;
        let p_cur = cur_counts[i] / cur_total;
        if p_ref > 0.0 && p_cur > 0.0 {
            psi += (p_cur - p_ref) * (p_cur / p_ref).ln();
        }
    }

    psi.max(0.0).min(1.0)
}

/// Kind of concept drift detected (spec.md §3 `DriftEvent`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    Gradual,
    Sudden,
    Recurring,
}

/// Emitted when a drift score crosses the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    pub kind: DriftKind,
    pub severity: f64,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub features: HashSet<String>,
    pub model_id: String,
    pub score: f64,
}

struct FeatureState {
    reference: SlidingWindow<f64>,
    current: SlidingWindow<f64>,
    seeded: bool,
    last_event_at: Option<DateTime<Utc>>,
}

impl FeatureState {
    fn new(capacity: usize) -> Self {
        Self {
            reference: SlidingWindow::new(capacity),
            current: SlidingWindow::new(capacity),
            seeded: false,
            last_event_at: None,
        }
    }
}

/// Stateful drift detector: one reference/current window pair per
/// `(model_id, feature)`, the test is config-driven and shared across all
/// models/features (spec.md §4.2).
pub struct DriftDetector {
    test: DriftTest,
    min_samples: usize,
    window_capacity: usize,
    threshold: f64,
    states: DashMap<(String, String), Mutex<FeatureState>>,
    events: Mutex<Vec<DriftEvent>>,
    recurring_window: chrono::Duration,
    event_count: AtomicUsize,
}

impl DriftDetector {
    pub fn new(test: DriftTest, min_samples: usize, threshold: f64) -> Self {
        Self {
            test,
            min_samples,
            window_capacity: min_samples.max(1) * 4,
            threshold,
            states: DashMap::new(),
            events: Mutex::new(Vec::new()),
            recurring_window: chrono::Duration::hours(1),
            event_count: AtomicUsize::new(0),
        }
    }

    /// Feeds one batch of numeric feature observations for a model and
    /// returns the maximum drift score across features touched by the
    /// batch (spec.md §4.2: "Score is returned to C5 even if below
    /// threshold").
    pub fn observe_batch(
        &self,
        clock: &dyn Clock,
        model_id: &str,
        batch: &[HashMap<String, f64>],
    ) -> f64 {
        if batch.is_empty() {
            return 0.0;
        }

        let mut feature_values: HashMap<String, Vec<f64>> = HashMap::new();
        for observation in batch {
            for (k, v) in observation {
                feature_values.entry(k.clone()).or_default().push(*v);
            }
        }

        let mut max_score = 0.0f64;
        for (feature, values) in feature_values {
            let score = self.observe_feature(clock, model_id, &feature, &values);
            max_score = max_score.max(score);
        }
        max_score
    }

    fn observe_feature(
        &self,
        clock: &dyn Clock,
        model_id: &str,
        feature: &str,
        values: &[f64],
    ) -> f64 {
        let key = (model_id.to_string(), feature.to_string());
        let state_lock = self
            .states
            .entry(key)
            .or_insert_with(|| Mutex::new(FeatureState::new(self.window_capacity)));
        let mut state = state_lock.lock();

        for v in values {
            if !state.seeded {
                state.reference.push(*v);
                if state.reference.len() >= self.min_samples {
                    state.seeded = true;
                }
            } else {
                state.current.push(*v);
            }
        }

        if !state.seeded || state.current.len() < self.min_samples {
            return 0.0;
        }

        let reference_snapshot = state.reference.snapshot();
        let current_snapshot = state.current.snapshot();
        let score = self.test.compute(&reference_snapshot, &current_snapshot);

        if score > self.threshold {
            let now = clock.now();
            let kind = if score > (self.threshold * 2.0).min(1.0) {
                DriftKind::Sudden
            } else if state
                .last_event_at
                .map(|t| now - t < self.recurring_window)
                .unwrap_or(false)
            {
                DriftKind::Recurring
            } else {
                DriftKind::Gradual
            };

            let event = DriftEvent {
                kind,
                severity: score,
                confidence: score,
                detected_at: now,
                features: [feature.to_string()].into_iter().collect(),
                model_id: model_id.to_string(),
                score,
            };

            // Reset reference to a copy of current, as specified.
            state.reference = state.current.clone();
            state.current.clear();
            state.last_event_at = Some(now);

            self.events.lock().push(event);
            self.event_count.fetch_add(1, Ordering::Relaxed);
        }

        score
    }

    pub fn events_for_model(&self, model_id: &str) -> Vec<DriftEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.model_id == model_id)
            .cloned()
            .collect()
    }

    pub fn total_events(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }

    pub fn drop_model(&self, model_id: &str) {
        self.states.retain(|(m, _), _| m != model_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn batch(values: &[f64]) -> Vec<HashMap<String, f64>> {
        values
            .iter()
            .map(|v| {
                let mut m = HashMap::new();
                m.insert("target_value".to_string(), *v);
                m
            })
            .collect()
    }

    #[test]
    fn score_is_zero_below_min_samples() {
        let detector = DriftDetector::new(DriftTest::Ks, 32, 0.05);
        let clock = SystemClock;
        let observations: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let score = detector.observe_batch(&clock, "model_a", &batch(&observations));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn s1_seeds_reference_with_no_drift() {
        let detector = DriftDetector::new(DriftTest::Ks, 32, 0.05);
        let clock = SystemClock;
        let observations: Vec<f64> = (0..32).map(|i| i as f64).collect();
        let score = detector.observe_batch(&clock, "model_a", &batch(&observations));
        assert_eq!(score, 0.0);
        assert!(detector.events_for_model("model_a").is_empty());
    }

    #[test]
    fn s2_large_shift_triggers_drift_event() {
        let detector = DriftDetector::new(DriftTest::Ks, 32, 0.05);
        let clock = SystemClock;
        let seed: Vec<f64> = (0..32).map(|i| i as f64).collect();
        detector.observe_batch(&clock, "model_a", &batch(&seed));

        let shifted: Vec<f64> = (0..100).map(|i| 10000.0 + i as f64).collect();
        let score = detector.observe_batch(&clock, "model_a", &batch(&shifted));

        assert!(score > 0.05, "expected drift score above threshold, got {score}");
        assert_eq!(detector.events_for_model("model_a").len(), 1);
    }

    #[test]
    fn score_always_in_unit_range() {
        for test in [DriftTest::Ks, DriftTest::ChiSquared, DriftTest::Psi] {
            let reference: Vec<f64> = (0..50).map(|i| i as f64).collect();
            let current: Vec<f64> = (0..50).map(|i| (i as f64) * 3.0 + 7.0).collect();
            let score = test.compute(&reference, &current);
            assert!((0.0..=1.0).contains(&score), "{test:?} produced {score}");
        }
    }

    #[test]
    fn zero_range_yields_zero_score() {
        let reference = vec![5.0; 20];
        let current = vec![5.0; 20];
        assert_eq!(DriftTest::ChiSquared.compute(&reference, &current), 0.0);
        assert_eq!(DriftTest::Psi.compute(&reference, &current), 0.0);
    }

    #[test]
    fn empty_feature_vector_yields_zero_score() {
        let detector = DriftDetector::new(DriftTest::Ks, 32, 0.05);
        let clock = SystemClock;
        let score = detector.observe_batch(&clock, "model_a", &[]);
        assert_eq!(score, 0.0);
    }
}

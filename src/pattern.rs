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

//! C6 — Pattern Store & Detector. Computes trend descriptors over a market
//! data series and dedupes recurring detections by `(type, asset)`
//! (spec.md §4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type PatternResult<T> = Result<T, PatternError>;

/// What a pattern implies will happen next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedOutcome {
    pub direction: String,
    pub magnitude: f64,
    pub horizon_minutes: u32,
}

/// Contextual data carried alongside a pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketContext {
    pub asset: Option<String>,
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub pattern_type: String,
    pub asset: String,
    pub timeframe: String,
    pub strength: f64,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u32,
    pub expected_outcome: ExpectedOutcome,
    pub context: MarketContext,
}

/// Raw market data handed to `detect_patterns`. Prices are fixed-point
/// `Decimal`, never binary floats (spec.md §9); the detector projects them
/// to `f64` only for the least-squares/R² math itself.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub prices: Vec<Decimal>,
    pub volumes: Vec<f64>,
    pub timestamps: Vec<i64>,
    pub asset: Option<String>,
    pub timeframe: Option<String>,
}

/// Least-squares slope, R², and momentum (last-vs-first relative change)
/// over an evenly-indexed price series.
fn trend_descriptors(prices: &[f64]) -> (f64, f64, f64) {
    let n = prices.len() as f64;
    let xs: Vec<f64> = (0..prices.len()).map(|i| i as f64).collect();

    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = prices.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (x, y) in xs.iter().zip(prices.iter()) {
        cov += (x - x_mean) * (y - y_mean);
        var_x += (x - x_mean).powi(2);
    }
    let slope = if var_x > 0.0 { cov / var_x } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(prices.iter()) {
        let predicted = slope * x + intercept;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r_squared = if ss_tot > 0.0 { (1.0 - ss_res / ss_tot).clamp(0.0, 1.0) } else { 0.0 };

    let first = prices.first().copied().unwrap_or(0.0);
    let last = prices.last().copied().unwrap_or(0.0);
    let momentum = if first != 0.0 { (last - first) / first } else { 0.0 };

    (slope, r_squared, momentum)
}

pub struct PatternDetector {
    min_pattern_length: usize,
}

impl PatternDetector {
    pub fn new(min_pattern_length: usize) -> Self {
        Self { min_pattern_length }
    }

    /// Deterministic, idempotent under retry: same input yields the same
    /// descriptors every time (spec.md §4.6).
    pub fn detect(&self, clock: &dyn Clock, data: &MarketData) -> Vec<Pattern> {
        if data.prices.len() < self.min_pattern_length {
            return Vec::new();
        }

        let prices: Vec<f64> = data.prices.iter().map(|p| p.to_f64().unwrap_or(0.0)).collect();
        let (slope, r_squared, momentum) = trend_descriptors(&prices);
        let direction = if slope > 0.0 { "up" } else if slope < 0.0 { "down" } else { "flat" };
        let strength = r_squared;
        let confidence = (r_squared * 0.7 + momentum.abs().min(1.0) * 0.3).clamp(0.0, 1.0);
        let now = clock.now();

        let pattern = Pattern {
            id: Uuid::new_v4().to_string(),
            pattern_type: "trend".to_string(),
            asset: data.asset.clone().unwrap_or_else(|| "default".to_string()),
            timeframe: data.timeframe.clone().unwrap_or_else(|| "unspecified".to_string()),
            strength,
            confidence,
            first_seen: now,
            last_seen: now,
            occurrence_count: 1,
            expected_outcome: ExpectedOutcome {
                direction: direction.to_string(),
                magnitude: momentum.abs(),
                horizon_minutes: 60,
            },
            context: MarketContext {
                asset: data.asset.clone(),
                extra: HashMap::new(),
            },
        };

        vec![pattern]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternFilters {
    pub asset: Option<String>,
    pub pattern_type: Option<String>,
    pub min_confidence: Option<f64>,
}

/// Stores detected patterns, deduped by `(type, asset)` (spec.md §4.6).
pub struct PatternStore {
    patterns: Mutex<HashMap<(String, String), Pattern>>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            patterns: Mutex::new(HashMap::new()),
        }
    }

    /// Merges a freshly-detected pattern into the store: repeat detections
    /// for the same `(type, asset)` key update `last_seen`, increment
    /// `occurrence_count`, and average `confidence`.
    pub fn merge(&self, incoming: Pattern) -> Pattern {
        let key = (incoming.pattern_type.clone(), incoming.asset.clone());
        let mut patterns = self.patterns.lock();

        let merged = match patterns.get(&key) {
            Some(existing) => Pattern {
                id: existing.id.clone(),
                last_seen: incoming.last_seen,
                occurrence_count: existing.occurrence_count + 1,
                confidence: (existing.confidence + incoming.confidence) / 2.0,
                first_seen: existing.first_seen,
                ..incoming
            },
            None => incoming,
        };

        patterns.insert(key, merged.clone());
        merged
    }

    pub fn query(&self, filters: &PatternFilters) -> Vec<Pattern> {
        let patterns = self.patterns.lock();
        let mut results: Vec<Pattern> = patterns
            .values()
            .filter(|p| filters.asset.as_ref().map(|a| a == &p.asset).unwrap_or(true))
            .filter(|p| {
                filters
                    .pattern_type
                    .as_ref()
                    .map(|t| t == &p.pattern_type)
                    .unwrap_or(true)
            })
            .filter(|p| filters.min_confidence.map(|c| p.confidence >= c).unwrap_or(true))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn price(v: f64) -> Decimal {
        Decimal::try_from(v).unwrap()
    }

    #[test]
    fn below_min_length_yields_empty() {
        let detector = PatternDetector::new(10);
        let clock = SystemClock;
        let data = MarketData {
            prices: vec![price(1.0), price(2.0), price(3.0)],
            ..Default::default()
        };
        assert!(detector.detect(&clock, &data).is_empty());
    }

    #[test]
    fn s3_detects_uptrend() {
        let detector = PatternDetector::new(5);
        let clock = SystemClock;
        let prices: Vec<Decimal> = (0..10).map(|i| price(50000.0 + 500.0 * i as f64)).collect();
        let data = MarketData {
            prices,
            ..Default::default()
        };
        let patterns = detector.detect(&clock, &data);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, "trend");
        assert_eq!(patterns[0].expected_outcome.direction, "up");
        assert!(patterns[0].confidence > 0.0);
    }

    #[test]
    fn merge_increments_occurrence_and_averages_confidence() {
        let store = PatternStore::new();
        let clock = SystemClock;
        let detector = PatternDetector::new(5);
        let prices: Vec<Decimal> = (0..10).map(|i| price(100.0 + i as f64)).collect();
        let data = MarketData {
            prices,
            asset: Some("BTC".into()),
            ..Default::default()
        };

        let first = detector.detect(&clock, &data).remove(0);
        let merged_first = store.merge(first);
        assert_eq!(merged_first.occurrence_count, 1);

        let second = detector.detect(&clock, &data).remove(0);
        let merged_second = store.merge(second);
        assert_eq!(merged_second.occurrence_count, 2);
        assert_eq!(merged_second.id, merged_first.id);
    }

    #[test]
    fn query_filters_and_sorts_by_confidence_desc() {
        let store = PatternStore::new();
        let clock = SystemClock;
        let detector = PatternDetector::new(5);

        let weak_prices: Vec<Decimal> =
            vec![100.0, 101.0, 99.0, 102.0, 98.0, 103.0].into_iter().map(price).collect();
        let strong_prices: Vec<Decimal> = (0..10).map(|i| price(100.0 + 50.0 * i as f64)).collect();

        let weak = detector
            .detect(&clock, &MarketData { prices: weak_prices, asset: Some("ETH".into()), ..Default::default() })
            .remove(0);
        let strong = detector
            .detect(&clock, &MarketData { prices: strong_prices, asset: Some("BTC".into()), ..Default::default() })
            .remove(0);

        store.merge(weak);
        store.merge(strong);

        let results = store.query(&PatternFilters::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].confidence >= results[1].confidence);
    }
}

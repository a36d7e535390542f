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

//! C10 — Performance Tracker. Three rolling tables (overall, by-strategy,
//! by-user) updated on every decision completion (spec.md §4.10).

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const SUCCESS_CONFIDENCE_CUTOFF: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerformanceTable {
    pub total: u64,
    pub successful: u64,
}

impl PerformanceTable {
    fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.successful += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.successful as f64 / (self.total.max(1)) as f64
    }
}

/// Writer-serialized; all reads return snapshots (spec.md §4.10).
pub struct PerformanceTracker {
    overall: Mutex<PerformanceTable>,
    by_strategy: DashMap<String, Mutex<PerformanceTable>>,
    by_user: DashMap<String, Mutex<PerformanceTable>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            overall: Mutex::new(PerformanceTable::default()),
            by_strategy: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// `success` is declared when `confidence > 0.7` (spec.md §4.10;
    /// callers wanting realized-outcome success should plumb a
    /// `DecisionOutcome` through separately — see spec.md §9 Open Question).
    pub fn record_decision(&self, user_id: &str, strategy_id: Option<&str>, confidence: f64) {
        let success = confidence > SUCCESS_CONFIDENCE_CUTOFF;

        self.overall.lock().record(success);

        self.by_user
            .entry(user_id.to_string())
            .or_insert_with(|| Mutex::new(PerformanceTable::default()))
            .lock()
            .record(success);

        if let Some(strategy_id) = strategy_id {
            self.by_strategy
                .entry(strategy_id.to_string())
                .or_insert_with(|| Mutex::new(PerformanceTable::default()))
                .lock()
                .record(success);
        }
    }

    pub fn overall(&self) -> PerformanceTable {
        *self.overall.lock()
    }

    pub fn by_user(&self, user_id: &str) -> PerformanceTable {
        self.by_user
            .get(user_id)
            .map(|t| *t.lock())
            .unwrap_or_default()
    }

    pub fn by_strategy(&self, strategy_id: &str) -> PerformanceTable {
        self.by_strategy
            .get(strategy_id)
            .map(|t| *t.lock())
            .unwrap_or_default()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_bounded_and_defaults_to_zero_with_no_data() {
        let tracker = PerformanceTracker::new();
        assert_eq!(tracker.overall().success_rate(), 0.0);
    }

    #[test]
    fn records_roll_up_across_all_three_tables() {
        let tracker = PerformanceTracker::new();
        tracker.record_decision("u1", Some("s1"), 0.9);
        tracker.record_decision("u1", Some("s1"), 0.2);

        assert_eq!(tracker.overall().total, 2);
        assert_eq!(tracker.overall().successful, 1);
        assert_eq!(tracker.by_user("u1").successful, 1);
        assert_eq!(tracker.by_strategy("s1").successful, 1);
    }

    #[test]
    fn unknown_user_or_strategy_yields_zero_table() {
        let tracker = PerformanceTracker::new();
        assert_eq!(tracker.by_user("ghost").total, 0);
        assert_eq!(tracker.by_strategy("ghost").total, 0);
    }
}

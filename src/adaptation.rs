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

//! C7 — Adaptation Rule Engine. Evaluates a strategy's performance and the
//! current pattern set against an ordered reason table, then applies the
//! mutation for the winning reason (spec.md §4.7).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal_macros::dec;
use thiserror::Error;
use uuid::Uuid;

use crate::pattern::Pattern;
use crate::strategy_registry::{AdaptationRecord, AdaptiveStrategy, ParamMap};

#[derive(Debug, Error)]
pub enum AdaptationError {
    #[error("strategy {0} rate limited")]
    RateLimited(String),

    #[error("strategy not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AdaptationResult<T> = Result<T, AdaptationError>;

/// No mutation applies but evaluation completed cleanly.
pub const REASON_NONE: &str = "no_adaptation";
pub const REASON_RATE_LIMITED: &str = "rate_limited";

/// Evaluates the ordered reason table against a strategy's current metrics
/// and the pattern set (spec.md §4.7, steps 1-5).
pub fn determine_reason(
    strategy: &AdaptiveStrategy,
    patterns: &[Pattern],
    now: DateTime<Utc>,
    adaptation_threshold: f64,
    strategy_update_frequency: chrono::Duration,
) -> String {
    let metrics = &strategy.performance_metrics;
    let targets = &strategy.targets;

    if metrics.sharpe_ratio < targets.min_sharpe_ratio {
        return "poor_sharpe_ratio".to_string();
    }
    if metrics.max_drawdown > targets.max_drawdown {
        return "excessive_drawdown".to_string();
    }
    if metrics.win_rate < targets.min_win_rate {
        return "low_win_rate".to_string();
    }
    if let Some(pattern) = patterns.iter().find(|p| p.confidence > adaptation_threshold) {
        return format!("pattern_detected_{}", pattern.pattern_type);
    }
    let due = strategy
        .last_adaptation
        .map(|last| now - last > strategy_update_frequency)
        .unwrap_or(true);
    if due {
        return "scheduled_update".to_string();
    }

    REASON_NONE.to_string()
}

/// Applies the mutation table for a given reason to a copy of the
/// strategy's current params (spec.md §4.7).
fn apply_mutation(reason: &str, current: &ParamMap, patterns: &[Pattern]) -> ParamMap {
    let mut params = current.clone();

    match reason {
        "poor_sharpe_ratio" => {
            if let Some(v) = params.get_mut("position_size") {
                *v *= dec!(0.8);
            }
        }
        "excessive_drawdown" => {
            if let Some(v) = params.get_mut("stop_loss") {
                *v = (*v * dec!(0.8)).max(dec!(0.01));
            }
        }
        "low_win_rate" => {
            if let Some(v) = params.get_mut("entry_threshold") {
                *v *= dec!(1.2);
            }
        }
        "scheduled_update" => {
            // No-op unless patterns are present (spec.md §4.7).
            if !patterns.is_empty() {
                if let Some(v) = params.get_mut("position_size") {
                    *v = (*v * dec!(1.05)).min(dec!(0.1));
                }
            }
        }
        reason if reason.starts_with("pattern_detected_") => {
            let direction = patterns
                .iter()
                .find(|p| format!("pattern_detected_{}", p.pattern_type) == reason)
                .map(|p| p.expected_outcome.direction.as_str())
                .unwrap_or("flat");
            if direction == "up" {
                if let Some(v) = params.get_mut("position_size") {
                    *v = (*v * dec!(1.1)).min(dec!(0.1));
                }
            }
        }
        _ => {}
    }

    params
}

struct DailyCounter {
    day: DateTime<Utc>,
    count: u32,
}

/// Rate-limits and evaluates adaptations. Stateless with respect to
/// strategy storage; the caller commits the returned record via C8.
pub struct AdaptationEngine {
    max_adaptations_per_day: u32,
    adaptation_threshold: f64,
    strategy_update_frequency: chrono::Duration,
    daily_counts: DashMap<String, DailyCounter>,
}

impl AdaptationEngine {
    pub fn new(
        max_adaptations_per_day: u32,
        adaptation_threshold: f64,
        strategy_update_frequency: chrono::Duration,
    ) -> Self {
        Self {
            max_adaptations_per_day,
            adaptation_threshold,
            strategy_update_frequency,
            daily_counts: DashMap::new(),
        }
    }

    fn day_bucket(now: DateTime<Utc>) -> DateTime<Utc> {
        now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
    }

    fn under_rate_limit(&self, strategy_id: &str, now: DateTime<Utc>) -> bool {
        let today = Self::day_bucket(now);
        let mut counter = self
            .daily_counts
            .entry(strategy_id.to_string())
            .or_insert_with(|| DailyCounter { day: today, count: 0 });

        if counter.day != today {
            counter.day = today;
            counter.count = 0;
        }

        counter.count < self.max_adaptations_per_day
    }

    fn record_attempt(&self, strategy_id: &str, now: DateTime<Utc>) {
        let today = Self::day_bucket(now);
        let mut counter = self
            .daily_counts
            .entry(strategy_id.to_string())
            .or_insert_with(|| DailyCounter { day: today, count: 0 });
        if counter.day != today {
            counter.day = today;
            counter.count = 0;
        }
        counter.count += 1;
    }

    /// Evaluates and, if warranted, builds an `AdaptationRecord` ready for
    /// `StrategyRegistry::apply_adaptation`. Returns `Ok(None)` for
    /// `no_adaptation`. Rate-limited attempts return
    /// `Err(AdaptationError::RateLimited)` — a non-fatal, expected outcome
    /// callers should treat as a no-op, not surface as a failure.
    pub fn evaluate(
        &self,
        strategy: &AdaptiveStrategy,
        patterns: &[Pattern],
        now: DateTime<Utc>,
    ) -> AdaptationResult<Option<AdaptationRecord>> {
        let reason = determine_reason(
            strategy,
            patterns,
            now,
            self.adaptation_threshold,
            self.strategy_update_frequency,
        );

        if reason == REASON_NONE {
            return Ok(None);
        }

        if !self.under_rate_limit(&strategy.id, now) {
            return Err(AdaptationError::RateLimited(strategy.id.clone()));
        }

        let new_params = apply_mutation(&reason, &strategy.current_params, patterns);
        self.record_attempt(&strategy.id, now);

        let pattern_id = if reason.starts_with("pattern_detected_") {
            patterns
                .iter()
                .find(|p| format!("pattern_detected_{}", p.pattern_type) == reason)
                .map(|p| p.id.clone())
        } else {
            None
        };

        let confidence = if reason.starts_with("pattern_detected_") {
            pattern_id
                .as_ref()
                .and_then(|id| patterns.iter().find(|p| &p.id == id))
                .map(|p| p.confidence)
                .unwrap_or(0.5)
        } else {
            0.5
        };

        Ok(Some(AdaptationRecord {
            id: Uuid::new_v4().to_string(),
            adaptation_type: "param_mutation".to_string(),
            strategy_id: strategy.id.clone(),
            pattern_id,
            old_params: strategy.current_params.clone(),
            new_params,
            reason,
            confidence,
            timestamp: now,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{ExpectedOutcome, MarketContext};
    use crate::strategy_registry::{PerformanceTargets, RiskLimits, StrategyMetrics};
    use std::collections::VecDeque;

    fn base_strategy(position_size: rust_decimal::Decimal) -> AdaptiveStrategy {
        let mut current_params = ParamMap::new();
        current_params.insert("position_size".to_string(), position_size);
        AdaptiveStrategy {
            id: "T".to_string(),
            strategy_type: "trend_following".to_string(),
            base_params: current_params.clone(),
            current_params,
            targets: PerformanceTargets::default(),
            risk_limits: RiskLimits::default(),
            adaptation_history: VecDeque::new(),
            performance_metrics: StrategyMetrics::default(),
            last_adaptation: None,
            adaptation_count: 0,
            is_active: true,
        }
    }

    fn trend_pattern(confidence: f64) -> Pattern {
        Pattern {
            id: "p1".to_string(),
            pattern_type: "trend".to_string(),
            asset: "BTC".to_string(),
            timeframe: "1h".to_string(),
            strength: 0.9,
            confidence,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            occurrence_count: 1,
            expected_outcome: ExpectedOutcome {
                direction: "up".to_string(),
                magnitude: 0.05,
                horizon_minutes: 60,
            },
            context: MarketContext::default(),
        }
    }

    #[test]
    fn s3_pattern_adaptation_scales_position_size() {
        let engine = AdaptationEngine::new(20, 0.7, chrono::Duration::days(1));
        let strategy = base_strategy(dec!(0.05));
        let patterns = vec![trend_pattern(0.8)];
        let record = engine.evaluate(&strategy, &patterns, Utc::now()).unwrap().unwrap();
        assert_eq!(record.reason, "pattern_detected_trend");
        assert_eq!(record.new_params.get("position_size"), Some(&dec!(0.055)));
    }

    #[test]
    fn poor_sharpe_ratio_takes_priority() {
        let engine = AdaptationEngine::new(20, 0.7, chrono::Duration::days(1));
        let mut strategy = base_strategy(dec!(0.05));
        strategy.targets.min_sharpe_ratio = 1.0;
        strategy.performance_metrics.sharpe_ratio = 0.2;
        let record = engine.evaluate(&strategy, &[], Utc::now()).unwrap().unwrap();
        assert_eq!(record.reason, "poor_sharpe_ratio");
        assert_eq!(record.new_params["position_size"], dec!(0.04));
    }

    #[test]
    fn s4_rate_limit_after_max_per_day() {
        let engine = AdaptationEngine::new(3, 0.0, chrono::Duration::days(1));
        let mut strategy = base_strategy(dec!(0.05));
        strategy.targets.min_sharpe_ratio = 1.0;
        strategy.performance_metrics.sharpe_ratio = 0.2;
        let now = Utc::now();

        for _ in 0..3 {
            engine.evaluate(&strategy, &[], now).unwrap();
        }
        let err = engine.evaluate(&strategy, &[], now).unwrap_err();
        assert!(matches!(err, AdaptationError::RateLimited(_)));
    }

    #[test]
    fn no_trigger_returns_none() {
        let engine = AdaptationEngine::new(20, 0.7, chrono::Duration::days(1));
        let mut strategy = base_strategy(dec!(0.05));
        strategy.last_adaptation = Some(Utc::now());
        let result = engine.evaluate(&strategy, &[], Utc::now()).unwrap();
        assert!(result.is_none());
    }
}

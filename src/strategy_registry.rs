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

//! C8 — Strategy Registry. Owns `AdaptiveStrategy` records, serializes
//! mutations per strategy id, and applies committed `AdaptationRecord`s
//! atomically (spec.md §4.8).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StrategyRegistryError {
    #[error("strategy not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type StrategyRegistryResult<T> = Result<T, StrategyRegistryError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceTargets {
    pub min_sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub min_win_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: Decimal,
    pub max_leverage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
}

/// Strategy parameters such as `position_size`/`stop_loss`/`entry_threshold`
/// are money-adjacent quantities, so they're kept as fixed-point `Decimal`
/// rather than binary floats (spec.md §9).
pub type ParamMap = HashMap<String, Decimal>;

/// Immutable record of one committed parameter mutation (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub id: String,
    pub adaptation_type: String,
    pub strategy_id: String,
    pub pattern_id: Option<String>,
    pub old_params: ParamMap,
    pub new_params: ParamMap,
    pub reason: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveStrategy {
    pub id: String,
    pub strategy_type: String,
    pub base_params: ParamMap,
    pub current_params: ParamMap,
    pub targets: PerformanceTargets,
    pub risk_limits: RiskLimits,
    pub adaptation_history: VecDeque<AdaptationRecord>,
    pub performance_metrics: StrategyMetrics,
    pub last_adaptation: Option<DateTime<Utc>>,
    pub adaptation_count: u32,
    pub is_active: bool,
}

impl AdaptiveStrategy {
    fn push_history(&mut self, record: AdaptationRecord, cap: usize) {
        if self.adaptation_history.len() == cap {
            self.adaptation_history.pop_front();
        }
        self.adaptation_history.push_back(record);
    }
}

/// A strategy as submitted via `AddAdaptiveStrategy`, id optional.
#[derive(Debug, Clone, Default)]
pub struct NewStrategy {
    pub id: Option<String>,
    pub strategy_type: String,
    pub base_params: ParamMap,
    pub targets: PerformanceTargets,
    pub risk_limits: RiskLimits,
}

/// `len(adaptation_history) <= max_history` holds globally *and*
/// per-strategy (spec.md §3) — the same configured cap bounds both.
pub struct StrategyRegistry {
    strategies: DashMap<String, Arc<Mutex<AdaptiveStrategy>>>,
    max_history: usize,
    global_history: Mutex<VecDeque<AdaptationRecord>>,
}

impl StrategyRegistry {
    pub fn new(max_history: usize) -> Self {
        Self {
            strategies: DashMap::new(),
            max_history,
            global_history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add(&self, new: NewStrategy) -> String {
        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let strategy = AdaptiveStrategy {
            id: id.clone(),
            strategy_type: new.strategy_type,
            current_params: new.base_params.clone(),
            base_params: new.base_params,
            targets: new.targets,
            risk_limits: new.risk_limits,
            adaptation_history: VecDeque::new(),
            performance_metrics: StrategyMetrics::default(),
            last_adaptation: None,
            adaptation_count: 0,
            is_active: true,
        };
        self.strategies.insert(id.clone(), Arc::new(Mutex::new(strategy)));
        id
    }

    pub fn update_status(&self, id: &str, active: bool) -> StrategyRegistryResult<()> {
        let entry = self
            .strategies
            .get(id)
            .ok_or_else(|| StrategyRegistryError::NotFound(id.to_string()))?;
        entry.lock().is_active = active;
        Ok(())
    }

    pub fn snapshot(&self, id: &str) -> StrategyRegistryResult<AdaptiveStrategy> {
        let entry = self
            .strategies
            .get(id)
            .ok_or_else(|| StrategyRegistryError::NotFound(id.to_string()))?;
        Ok(entry.lock().clone())
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter(|e| e.lock().is_active)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Atomically swaps `current_params` with `record.new_params` and
    /// appends to both the per-strategy and the global history, each
    /// capped (spec.md §4.8, §3 invariant).
    pub fn apply_adaptation(
        &self,
        now: DateTime<Utc>,
        record: AdaptationRecord,
    ) -> StrategyRegistryResult<AdaptiveStrategy> {
        let entry = self
            .strategies
            .get(&record.strategy_id)
            .ok_or_else(|| StrategyRegistryError::NotFound(record.strategy_id.clone()))?;

        let mut strategy = entry.lock();
        strategy.current_params = record.new_params.clone();
        strategy.last_adaptation = Some(now);
        strategy.adaptation_count += 1;
        strategy.push_history(record.clone(), self.max_history);

        let mut global = self.global_history.lock();
        if global.len() == self.max_history {
            global.pop_front();
        }
        global.push_back(record);

        Ok(strategy.clone())
    }

    pub fn adaptation_history(&self, limit: usize) -> Vec<AdaptationRecord> {
        let global = self.global_history.lock();
        global.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(strategy_id: &str, new_position_size: Decimal) -> AdaptationRecord {
        let mut new_params = ParamMap::new();
        new_params.insert("position_size".to_string(), new_position_size);
        AdaptationRecord {
            id: Uuid::new_v4().to_string(),
            adaptation_type: "param_mutation".to_string(),
            strategy_id: strategy_id.to_string(),
            pattern_id: None,
            old_params: ParamMap::new(),
            new_params,
            reason: "pattern_detected_trend".to_string(),
            confidence: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn add_assigns_id_and_activates() {
        let registry = StrategyRegistry::new(1000);
        let id = registry.add(NewStrategy {
            strategy_type: "trend_following".into(),
            ..Default::default()
        });
        let strategy = registry.snapshot(&id).unwrap();
        assert!(strategy.is_active);
        assert_eq!(strategy.adaptation_count, 0);
    }

    #[test]
    fn apply_adaptation_swaps_params_and_records_history() {
        let registry = StrategyRegistry::new(1000);
        let id = registry.add(NewStrategy {
            strategy_type: "trend_following".into(),
            ..Default::default()
        });
        registry.apply_adaptation(Utc::now(), record(&id, dec!(0.055))).unwrap();
        let strategy = registry.snapshot(&id).unwrap();
        assert_eq!(strategy.current_params.get("position_size"), Some(&dec!(0.055)));
        assert_eq!(strategy.adaptation_history.len(), 1);
        assert_eq!(strategy.adaptation_count, 1);
    }

    #[test]
    fn s4_history_capped_retains_last_n_globally_and_per_strategy() {
        let registry = StrategyRegistry::new(3);
        let id = registry.add(NewStrategy {
            strategy_type: "mean_reversion".into(),
            ..Default::default()
        });
        for i in 0..5 {
            registry
                .apply_adaptation(Utc::now(), record(&id, dec!(0.05) + Decimal::from(i) * dec!(0.001)))
                .unwrap();
        }
        let history = registry.adaptation_history(10);
        assert_eq!(history.len(), 3);
        assert_eq!(registry.snapshot(&id).unwrap().adaptation_history.len(), 3);
    }

    #[test]
    fn update_status_flips_activation() {
        let registry = StrategyRegistry::new(1000);
        let id = registry.add(NewStrategy::default());
        registry.update_status(&id, false).unwrap();
        assert!(!registry.snapshot(&id).unwrap().is_active);
        assert!(registry.active_ids().is_empty());
    }
}

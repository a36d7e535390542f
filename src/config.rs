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

//! Configuration for the core, covering the options table in spec.md §6.
//!
//! Mirrors the teacher crate's config structs (`RedisConfig`,
//! `StorageConfig`, `MarketRegimeConfig`, ...): a plain `Serialize +
//! Deserialize` struct with a `Default` impl, optionally overlaid with
//! environment variables and a config file via the `config` crate rather
//! than a hand-rolled parser.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drift::DriftTest;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Top-level configuration, covering every key in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Base LR clamp floor for new models.
    pub learning_rate: f64,
    /// Upper clamp for learning-rate adaptation.
    pub learning_rate_max: f64,
    /// Observation batch size.
    pub batch_size: usize,
    /// Max batch flush interval, in seconds.
    pub update_frequency_sec: u64,
    /// Trigger a drift event above this score.
    pub drift_threshold: f64,
    /// Which statistical test the drift detector runs.
    pub drift_test: DriftTest,
    /// Minimum samples before a window is considered seeded.
    pub drift_min_samples: usize,
    /// Rolling error window size for the metrics tracker.
    pub performance_window: usize,
    /// Min pattern confidence to trigger adaptation.
    pub adaptation_threshold: f64,
    /// Global adaptation-history cap.
    pub max_adaptation_history: usize,
    /// Max adaptations applied to a single strategy per day.
    pub max_adaptations_per_day: u32,
    /// Master on/off for the drift detector.
    pub enable_drift_detection: bool,
    /// Master on/off for the adaptation engine.
    pub enable_adaptation: bool,
    /// Orchestrator concurrency cap.
    pub max_concurrent_decisions: usize,
    /// Per-decision deadline, in seconds.
    pub decision_timeout_sec: u64,
    /// Gate for auto-execution.
    pub min_confidence_threshold: f64,
    /// Upper bound on autonomous risk.
    pub max_risk_per_decision: f64,
    /// Master auto-exec switch.
    pub enable_auto_execution: bool,
    /// Disables real-world side effects.
    pub paper_trading_mode: bool,
    /// Analysis/decision cache entry lifetime, in seconds.
    pub cache_ttl_sec: u64,
    /// Bounded-queue capacity for the learning pipeline streams.
    pub queue_capacity: usize,
    /// Maintenance task period, in seconds.
    pub maintenance_interval_sec: u64,
    /// How long a strategy waits between scheduled updates absent other triggers, in seconds.
    pub strategy_update_frequency_sec: u64,
    /// Minimum prices/timestamps required for the pattern detector to run.
    pub min_pattern_length: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            learning_rate_max: 0.1,
            batch_size: 32,
            update_frequency_sec: 60,
            drift_threshold: 0.05,
            drift_test: DriftTest::Ks,
            drift_min_samples: 30,
            performance_window: 100,
            adaptation_threshold: 0.7,
            max_adaptation_history: 1000,
            max_adaptations_per_day: 20,
            enable_drift_detection: true,
            enable_adaptation: true,
            max_concurrent_decisions: 10,
            decision_timeout_sec: 5 * 60,
            min_confidence_threshold: 0.7,
            max_risk_per_decision: 0.05,
            enable_auto_execution: false,
            paper_trading_mode: true,
            cache_ttl_sec: 30 * 60,
            queue_capacity: 1000,
            maintenance_interval_sec: 5 * 60,
            strategy_update_frequency_sec: 24 * 60 * 60,
            min_pattern_length: 5,
        }
    }
}

impl CoreConfig {
    pub fn update_frequency(&self) -> Duration {
        secs(self.update_frequency_sec)
    }

    pub fn decision_timeout(&self) -> Duration {
        secs(self.decision_timeout_sec)
    }

    pub fn cache_ttl(&self) -> Duration {
        secs(self.cache_ttl_sec)
    }

    pub fn maintenance_interval(&self) -> Duration {
        secs(self.maintenance_interval_sec)
    }

    pub fn strategy_update_frequency(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.strategy_update_frequency_sec as i64)
    }
}

impl CoreConfig {
    /// Loads configuration layered defaults → `NODERR_*` environment
    /// variables → an optional file path, the way the teacher loads
    /// `RedisConfig`/`StorageConfig` via the `config` crate.
    pub fn load(file_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&CoreConfig::default())
                .map_err(|e| ConfigError::Load(e.to_string()))?);

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NODERR")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build().map_err(|e| ConfigError::Load(e.to_string()))?;
        let cfg: CoreConfig = built
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects out-of-range values at construction time, mirroring the
    /// teacher's fallible-builder pattern for `RiskConfig`/`StorageConfig`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid("learning_rate must be > 0".into()));
        }
        if self.learning_rate_max < self.learning_rate {
            return Err(ConfigError::Invalid(
                "learning_rate_max must be >= learning_rate".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.max_concurrent_decisions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_decisions must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            return Err(ConfigError::Invalid("drift_threshold must be in [0,1]".into()));
        }
        if !(0.0..=1.0).contains(&self.adaptation_threshold) {
            return Err(ConfigError::Invalid(
                "adaptation_threshold must be in [0,1]".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut cfg = CoreConfig::default();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_drift_threshold() {
        let mut cfg = CoreConfig::default();
        cfg.drift_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}

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

pub mod adaptation;
pub mod cache;
pub mod clock;
pub mod config;
pub mod decision;
pub mod drift;
pub mod error;
pub mod learning;
pub mod model_metrics;
pub mod model_registry;
pub mod pattern;
pub mod performance_tracker;
pub mod scorer;
pub mod store;
pub mod strategy_registry;
pub mod telemetry;
pub mod value;
pub mod window;

pub use adaptation::{AdaptationEngine, AdaptationError};
pub use cache::Cache;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use decision::{
    DecisionConfig, DecisionError, DecisionOptions, DecisionOrchestrator, DecisionRequest,
    DecisionResult, DecisionStatus,
};
pub use drift::{DriftDetector, DriftError, DriftEvent, DriftKind, DriftTest};
pub use error::{CoreError, CoreResult};
pub use learning::{FeedbackEvent, LearningConfig, LearningError, LearningPipeline, ObservationEvent};
pub use model_metrics::{ModelMetricsSnapshot, OnlineMetricsTracker};
pub use model_registry::{Model, ModelError, ModelFeedback, ModelInfo, OnlineModelRegistry, RegistryConfig, RegistryError};
pub use pattern::{MarketData, Pattern, PatternDetector, PatternError, PatternFilters, PatternStore};
pub use performance_tracker::{PerformanceTable, PerformanceTracker};
pub use scorer::{Scorer, ScorerDetail, ScorerLabel, ScorerResult};
pub use store::{InMemoryStore, Store, StoreError};
pub use strategy_registry::{
    AdaptationRecord, AdaptiveStrategy, NewStrategy, StrategyRegistry, StrategyRegistryError,
};
pub use telemetry::{LogLevel, Logger, TracingLogger};
pub use value::{FeatureMap, Value};
pub use window::{SlidingWindow, WindowStore};

use std::sync::Arc;

/// Wires every sub-registry into the facade object described in spec.md
/// §6. Construct once at startup and hand it `Clock`/`Logger` up front,
/// the way the teacher's `create_*` factories assemble collaborators
/// (lib.rs of the teacher crate).
pub struct NoderrCore {
    pub models: Arc<OnlineModelRegistry>,
    pub learning: Arc<LearningPipeline>,
    pub patterns: Arc<PatternStore>,
    pub pattern_detector: PatternDetector,
    pub strategies: Arc<StrategyRegistry>,
    pub adaptation: Arc<AdaptationEngine>,
    pub decisions: Arc<DecisionOrchestrator>,
    pub performance: Arc<PerformanceTracker>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    config: CoreConfig,
}

/// Builds a fully-wired `NoderrCore` from configuration, a clock, a
/// logger, and the scorer collaborators the decision path should consult.
pub fn create_noderr_core(
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    scorers: Vec<(Arc<dyn Scorer>, f64)>,
) -> NoderrCore {
    let drift = Arc::new(DriftDetector::new(config.drift_test, config.drift_min_samples, config.drift_threshold));
    let metrics = Arc::new(OnlineMetricsTracker::new(config.performance_window));
    let models = Arc::new(OnlineModelRegistry::new(
        drift,
        metrics,
        RegistryConfig {
            learning_rate_min: config.learning_rate,
            learning_rate_max: config.learning_rate_max,
            drift_threshold: config.drift_threshold,
            enable_drift_detection: config.enable_drift_detection,
            enable_adaptation: config.enable_adaptation,
        },
    ));

    let learning = Arc::new(LearningPipeline::new(
        LearningConfig {
            queue_capacity: config.queue_capacity,
            batch_size: config.batch_size,
            update_frequency: config.update_frequency(),
            maintenance_interval: config.maintenance_interval(),
        },
        models.clone(),
        clock.clone(),
        logger.clone(),
    ));

    let strategies = Arc::new(StrategyRegistry::new(config.max_adaptation_history));
    let adaptation = Arc::new(AdaptationEngine::new(
        config.max_adaptations_per_day,
        config.adaptation_threshold,
        config.strategy_update_frequency(),
    ));

    let performance = Arc::new(PerformanceTracker::new());
    let decisions = Arc::new(DecisionOrchestrator::new(
        DecisionConfig {
            max_concurrent_decisions: config.max_concurrent_decisions,
            decision_timeout: config.decision_timeout(),
            min_confidence_threshold: config.min_confidence_threshold,
            max_risk_per_decision: config.max_risk_per_decision,
            enable_auto_execution: config.enable_auto_execution,
            result_cache_ttl: config.cache_ttl(),
        },
        scorers,
        performance.clone(),
        clock.clone(),
        logger.clone(),
    ));

    NoderrCore {
        models,
        learning,
        patterns: Arc::new(PatternStore::new()),
        pattern_detector: PatternDetector::new(config.min_pattern_length),
        strategies,
        adaptation,
        decisions,
        performance,
        clock,
        logger,
        config,
    }
}

impl NoderrCore {
    /// Starts the learning pipeline's background tasks.
    pub async fn start(&self) {
        self.learning.start().await;
    }

    /// Idempotent shutdown: drains in-flight batches before returning.
    pub async fn stop(&self) {
        self.learning.stop().await;
    }

    pub fn add_model(&self, id: &str, model: Arc<dyn Model>) -> CoreResult<()> {
        self.models.add_model(id, model).map_err(CoreError::from)
    }

    pub fn learn_from_data(&self, event: ObservationEvent) -> CoreResult<()> {
        self.learning.submit_observation(event).map_err(CoreError::from)
    }

    pub fn provide_feedback(&self, event: FeedbackEvent) -> CoreResult<()> {
        self.learning.submit_feedback(event).map_err(CoreError::from)
    }

    pub async fn get_model_metrics(&self, id: &str) -> CoreResult<ModelMetricsSnapshot> {
        self.models.snapshot(id).await.map_err(CoreError::from)?;
        Ok(self.models.metrics_snapshot(id))
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        SystemMetrics {
            model_count: self.models.model_ids().len(),
            active_strategy_count: self.strategies.active_ids().len(),
            overall_performance: self.performance.overall(),
        }
    }

    pub fn detect_patterns(&self, data: &MarketData) -> Vec<Pattern> {
        let detected = self.pattern_detector.detect(self.clock.as_ref(), data);
        detected.into_iter().map(|p| self.patterns.merge(p)).collect()
    }

    pub fn get_detected_patterns(&self, filters: &PatternFilters) -> Vec<Pattern> {
        self.patterns.query(filters)
    }

    pub fn add_adaptive_strategy(&self, strategy: NewStrategy) -> String {
        self.strategies.add(strategy)
    }

    pub fn update_strategy_status(&self, id: &str, active: bool) -> CoreResult<()> {
        self.strategies.update_status(id, active).map_err(CoreError::from)
    }

    /// Evaluates every active strategy against the given pattern set and
    /// commits whatever adaptations the rule engine produces (spec.md
    /// §4.7/§4.8). Rate-limited attempts are logged, not surfaced.
    pub fn adapt_strategies(&self, patterns: &[Pattern]) -> Vec<AdaptationRecord> {
        let now = self.clock.now();
        let mut applied = Vec::new();

        for strategy_id in self.strategies.active_ids() {
            let Ok(strategy) = self.strategies.snapshot(&strategy_id) else { continue };
            match self.adaptation.evaluate(&strategy, patterns, now) {
                Ok(Some(record)) => {
                    if let Ok(updated) = self.strategies.apply_adaptation(now, record.clone()) {
                        self.logger.info(
                            "adaptation",
                            &format!("applied {} to strategy {}", record.reason, updated.id),
                        );
                        applied.push(record);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.logger.debug("adaptation", &format!("strategy {strategy_id}: {e}"));
                }
            }
        }

        applied
    }

    pub fn get_adaptation_history(&self, limit: usize) -> Vec<AdaptationRecord> {
        self.strategies.adaptation_history(limit)
    }

    pub async fn process_decision_request(&self, req: DecisionRequest) -> CoreResult<DecisionResult> {
        self.decisions.process_decision_request(req).await.map_err(CoreError::from)
    }

    pub fn get_active_decisions(&self, user_id: &str) -> Vec<decision::ActiveDecision> {
        self.decisions.get_active_decisions(user_id)
    }

    pub fn get_decision_history(&self, user_id: &str, limit: usize) -> Vec<DecisionResult> {
        self.decisions.get_decision_history(user_id, limit)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemMetrics {
    pub model_count: usize,
    pub active_strategy_count: usize,
    pub overall_performance: PerformanceTable,
}

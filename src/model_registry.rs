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

//! C4 — Online Model Registry. Maps `model_id` to an `OnlineModel`, guards
//! single-writer updates with a per-model lock, and hosts the `Model`
//! contract external ML backends implement (spec.md §4.4, §6).

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::clock::Clock;
use crate::drift::DriftDetector;
use crate::model_metrics::{ModelMetricsSnapshot, OnlineMetricsTracker};
use crate::value::{numeric_view, FeatureMap};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model already registered: {0}")]
    AlreadyExists(String),

    #[error("model not found: {0}")]
    NotFound(String),

    #[error("model is busy adapting: {0}")]
    Busy(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors an external `Model` backend can surface from `train`/`update_weights`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("weight update failed: {0}")]
    WeightUpdateFailed(String),
}

/// One training sample, batched by model id before being handed to `Model::train`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingData {
    pub features: Vec<FeatureMap>,
    pub labels: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Outcome of a prior prediction, driving `Model::update_weights`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFeedback {
    pub prediction_id: String,
    pub correct: bool,
    pub confidence: f64,
    pub actual: f64,
}

/// Static descriptive info about a model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub model_type: String,
    pub accuracy: f64,
}

/// The external Model contract (spec.md §6). Implemented by whatever ML
/// backend an embedder plugs in; the core never implements training itself.
#[async_trait]
pub trait Model: Send + Sync {
    async fn train(&self, data: TrainingData) -> Result<(), ModelError>;
    async fn update_weights(&self, feedback: ModelFeedback) -> Result<(), ModelError>;
    fn info(&self) -> ModelInfo;
}

/// A single point in a model's performance history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerfPoint {
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
    pub mae: f64,
    pub rmse: f64,
}

const MAX_PERFORMANCE_HISTORY: usize = 500;

/// Mutable per-model state, guarded by the registry's per-model lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineModel {
    pub id: String,
    pub learning_rate: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub update_count: u64,
    pub drift_score: f64,
    pub is_adapting: bool,
    pub performance_history: VecDeque<PerfPoint>,
}

impl OnlineModel {
    fn new(id: String, learning_rate: f64) -> Self {
        Self {
            id,
            learning_rate,
            last_update: None,
            update_count: 0,
            drift_score: 0.0,
            is_adapting: false,
            performance_history: VecDeque::with_capacity(MAX_PERFORMANCE_HISTORY),
        }
    }

    fn push_perf_point(&mut self, point: PerfPoint) {
        if self.performance_history.len() == MAX_PERFORMANCE_HISTORY {
            self.performance_history.pop_front();
        }
        self.performance_history.push_back(point);
    }
}

/// Result of applying one batch to a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub applied: bool,
    pub drift_score: f64,
    pub adapted: bool,
    pub update_count: u64,
}

struct ModelEntry {
    backend: Arc<dyn Model>,
    state: Mutex<OnlineModel>,
}

/// Registry configuration relevant to update-time behavior.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub learning_rate_min: f64,
    pub learning_rate_max: f64,
    pub drift_threshold: f64,
    pub enable_drift_detection: bool,
    pub enable_adaptation: bool,
}

pub struct OnlineModelRegistry {
    models: DashMap<String, Arc<ModelEntry>>,
    drift: Arc<DriftDetector>,
    metrics: Arc<OnlineMetricsTracker>,
    config: RegistryConfig,
}

impl OnlineModelRegistry {
    pub fn new(
        drift: Arc<DriftDetector>,
        metrics: Arc<OnlineMetricsTracker>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            models: DashMap::new(),
            drift,
            metrics,
            config,
        }
    }

    pub fn add_model(&self, id: &str, backend: Arc<dyn Model>) -> RegistryResult<()> {
        if self.models.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.to_string()));
        }
        let entry = ModelEntry {
            backend,
            state: Mutex::new(OnlineModel::new(id.to_string(), self.config.learning_rate_min)),
        };
        self.models.insert(id.to_string(), Arc::new(entry));
        Ok(())
    }

    pub fn deregister(&self, id: &str) -> RegistryResult<()> {
        self.models
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.drift.drop_model(id);
        self.metrics.remove_model(id);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// Applies a batch of observations to a model: trains the backend,
    /// advances drift/metrics state, and bumps counters — or, on backend
    /// failure, does none of the above (spec.md §4 Failure semantics
    /// table: "Model update fails -> skip batch, do not advance drift
    /// state, do not bump counters").
    pub async fn update_batch(
        &self,
        clock: &dyn Clock,
        model_id: &str,
        features: &[FeatureMap],
        labels: &[f64],
        weights: &[f64],
    ) -> RegistryResult<BatchOutcome> {
        let entry = self
            .models
            .get(model_id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))?;

        let mut state = entry.state.lock().await;

        if features.is_empty() {
            // Empty feature vector -> no mutation, drift score 0 (spec.md §8).
            return Ok(BatchOutcome {
                applied: false,
                drift_score: 0.0,
                adapted: false,
                update_count: state.update_count,
            });
        }

        let training = TrainingData {
            features: features.to_vec(),
            labels: labels.to_vec(),
            weights: weights.to_vec(),
        };

        if let Err(e) = entry.backend.train(training).await {
            warn!(model_id, error = %e, "model training failed, skipping batch");
            return Ok(BatchOutcome {
                applied: false,
                drift_score: state.drift_score,
                adapted: false,
                update_count: state.update_count,
            });
        }

        state.update_count += features.len() as u64;
        state.last_update = Some(clock.now());

        let drift_score = if self.config.enable_drift_detection {
            let numeric_batch: Vec<_> = features.iter().map(numeric_view).collect();
            self.drift.observe_batch(clock, model_id, &numeric_batch)
        } else {
            0.0
        };
        state.drift_score = drift_score;

        let metrics_snapshot = self.metrics.snapshot(model_id);
        state.push_perf_point(PerfPoint {
            timestamp: clock.now(),
            accuracy: metrics_snapshot.accuracy,
            mae: metrics_snapshot.mae,
            rmse: metrics_snapshot.rmse,
        });

        let mut adapted = false;
        if self.config.enable_adaptation && drift_score > self.config.drift_threshold {
            state.is_adapting = true;
            state.learning_rate = (state.learning_rate * 1.5).min(self.config.learning_rate_max);
            state.is_adapting = false;
            adapted = true;
        }

        Ok(BatchOutcome {
            applied: true,
            drift_score,
            adapted,
            update_count: state.update_count,
        })
    }

    pub async fn update_weights(&self, model_id: &str, feedback: ModelFeedback) -> RegistryResult<()> {
        let entry = self
            .models
            .get(model_id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))?;

        let _guard = entry.state.lock().await;
        entry
            .backend
            .update_weights(feedback)
            .await
            .map_err(|e| RegistryError::Internal(e.to_string()))
    }

    pub async fn snapshot(&self, model_id: &str) -> RegistryResult<OnlineModel> {
        let entry = self
            .models
            .get(model_id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))?;
        Ok(entry.state.lock().await.clone())
    }

    pub fn metrics_snapshot(&self, model_id: &str) -> ModelMetricsSnapshot {
        self.metrics.snapshot(model_id)
    }

    pub fn record_feedback_error(&self, model_id: &str, error: f64) -> ModelMetricsSnapshot {
        self.metrics.record_error(model_id, error)
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.iter().map(|e| e.key().clone()).collect()
    }

    /// Maintenance-task hook (spec.md §4.5.3): if a model's drift score is
    /// still above threshold and it is not already mid-adaptation, bumps
    /// its learning rate the same way a triggering batch would. Returns
    /// whether an adaptation was applied.
    pub async fn trigger_maintenance_adaptation(&self, model_id: &str) -> RegistryResult<bool> {
        let entry = self
            .models
            .get(model_id)
            .map(|e| e.clone())
            .ok_or_else(|| RegistryError::NotFound(model_id.to_string()))?;

        let mut state = entry.state.lock().await;
        if state.is_adapting || state.drift_score <= self.config.drift_threshold {
            return Ok(false);
        }

        state.is_adapting = true;
        state.learning_rate = (state.learning_rate * 1.5).min(self.config.learning_rate_max);
        state.is_adapting = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Model for StubModel {
        async fn train(&self, _data: TrainingData) -> Result<(), ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn update_weights(&self, _feedback: ModelFeedback) -> Result<(), ModelError> {
            Ok(())
        }
        fn info(&self) -> ModelInfo {
            ModelInfo {
                id: "stub".into(),
                name: "stub".into(),
                model_type: "linear".into(),
                accuracy: 0.0,
            }
        }
    }

    fn make_registry() -> OnlineModelRegistry {
        let drift = Arc::new(DriftDetector::new(crate::drift::DriftTest::Ks, 32, 0.05));
        let metrics = Arc::new(OnlineMetricsTracker::new(100));
        OnlineModelRegistry::new(
            drift,
            metrics,
            RegistryConfig {
                learning_rate_min: 0.01,
                learning_rate_max: 0.1,
                drift_threshold: 0.05,
                enable_drift_detection: true,
                enable_adaptation: true,
            },
        )
    }

    #[test]
    fn add_model_rejects_duplicates() {
        let registry = make_registry();
        let backend = Arc::new(StubModel { calls: AtomicUsize::new(0) });
        registry.add_model("m1", backend.clone()).unwrap();
        let err = registry.add_model("m1", backend).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_batch_bumps_counters_on_success() {
        let registry = make_registry();
        let backend = Arc::new(StubModel { calls: AtomicUsize::new(0) });
        registry.add_model("m1", backend).unwrap();
        let clock = SystemClock;

        let mut feature_maps = Vec::new();
        for i in 0..32 {
            let mut m = FeatureMap::new();
            m.insert("target_value".to_string(), crate::value::Value::Number(i as f64));
            feature_maps.push(m);
        }

        let outcome = registry
            .update_batch(&clock, "m1", &feature_maps, &[], &[])
            .await
            .unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.update_count, 32);
        assert_eq!(outcome.drift_score, 0.0);

        let snapshot = registry.snapshot("m1").await.unwrap();
        assert_eq!(snapshot.update_count, 32);
    }

    #[tokio::test]
    async fn empty_batch_does_not_mutate_model() {
        let registry = make_registry();
        let backend = Arc::new(StubModel { calls: AtomicUsize::new(0) });
        registry.add_model("m1", backend).unwrap();
        let clock = SystemClock;

        let outcome = registry.update_batch(&clock, "m1", &[], &[], &[]).await.unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.drift_score, 0.0);
        assert_eq!(outcome.update_count, 0);
    }

    #[tokio::test]
    async fn drift_above_threshold_bumps_learning_rate() {
        let registry = make_registry();
        let backend = Arc::new(StubModel { calls: AtomicUsize::new(0) });
        registry.add_model("m1", backend).unwrap();
        let clock = SystemClock;

        let seed: Vec<FeatureMap> = (0..32)
            .map(|i| {
                let mut m = FeatureMap::new();
                m.insert("target_value".to_string(), crate::value::Value::Number(i as f64));
                m
            })
            .collect();
        registry.update_batch(&clock, "m1", &seed, &[], &[]).await.unwrap();

        let shifted: Vec<FeatureMap> = (0..100)
            .map(|i| {
                let mut m = FeatureMap::new();
                m.insert(
                    "target_value".to_string(),
                    crate::value::Value::Number(10000.0 + i as f64),
                );
                m
            })
            .collect();
        let outcome = registry.update_batch(&clock, "m1", &shifted, &[], &[]).await.unwrap();

        assert!(outcome.adapted);
        let snapshot = registry.snapshot("m1").await.unwrap();
        assert!((snapshot.learning_rate - 0.015).abs() < 1e-9);
    }
}

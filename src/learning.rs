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

//! C5 — Real-Time Learning Pipeline. Two bounded queues feed three
//! long-running tasks: data ingestion, feedback ingestion, and periodic
//! maintenance (spec.md §4.5). Back-pressure rejects with `BufferFull`
//! rather than blocking the producer or dropping events silently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::model_registry::{ModelFeedback, OnlineModelRegistry};
use crate::telemetry::Logger;
use crate::value::FeatureMap;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("{0} queue is full")]
    BufferFull(String),

    #[error("pipeline is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type LearningResult<T> = Result<T, LearningError>;

/// One training sample (spec.md §3). Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEvent {
    pub event_id: String,
    pub model_id: String,
    pub features: FeatureMap,
    pub target: f64,
    pub timestamp: DateTime<Utc>,
    pub weight: f64,
    pub metadata: HashMap<String, String>,
}

/// One outcome for a prior prediction (spec.md §3). Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub prediction_id: String,
    pub model_id: String,
    pub prediction: f64,
    pub actual: f64,
    pub error: f64,
    pub timestamp: DateTime<Utc>,
}

const POLL_INTERVAL: StdDuration = StdDuration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct LearningConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub update_frequency: StdDuration,
    pub maintenance_interval: StdDuration,
}

/// Batched consumption of training events, feedback-driven weight updates,
/// and periodic maintenance. `Stop` is idempotent and drains in-flight
/// batches before returning (spec.md §4.5).
pub struct LearningPipeline {
    config: LearningConfig,
    data_tx: mpsc::Sender<ObservationEvent>,
    feedback_tx: mpsc::Sender<FeedbackEvent>,
    data_rx: Mutex<Option<mpsc::Receiver<ObservationEvent>>>,
    feedback_rx: Mutex<Option<mpsc::Receiver<FeedbackEvent>>>,
    is_running: Arc<RwLock<bool>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    registry: Arc<OnlineModelRegistry>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

impl LearningPipeline {
    pub fn new(
        config: LearningConfig,
        registry: Arc<OnlineModelRegistry>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let (data_tx, data_rx) = mpsc::channel(config.queue_capacity);
        let (feedback_tx, feedback_rx) = mpsc::channel(config.queue_capacity);
        Self {
            config,
            data_tx,
            feedback_tx,
            data_rx: Mutex::new(Some(data_rx)),
            feedback_rx: Mutex::new(Some(feedback_rx)),
            is_running: Arc::new(RwLock::new(false)),
            handles: Mutex::new(Vec::new()),
            registry,
            clock,
            logger,
        }
    }

    pub fn submit_observation(&self, event: ObservationEvent) -> LearningResult<()> {
        self.data_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LearningError::BufferFull("data_stream".into()),
            mpsc::error::TrySendError::Closed(_) => LearningError::ShuttingDown,
        })
    }

    pub fn submit_feedback(&self, event: FeedbackEvent) -> LearningResult<()> {
        self.feedback_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LearningError::BufferFull("feedback_stream".into()),
            mpsc::error::TrySendError::Closed(_) => LearningError::ShuttingDown,
        })
    }

    /// Spawns the three long-running tasks. Fails silently into a no-op if
    /// already started (receivers already taken).
    pub async fn start(self: &Arc<Self>) {
        *self.is_running.write() = true;

        let mut handles = self.handles.lock().await;

        if let Some(rx) = self.data_rx.lock().await.take() {
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move { pipeline.run_data_task(rx).await }));
        }
        if let Some(rx) = self.feedback_rx.lock().await.take() {
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move { pipeline.run_feedback_task(rx).await }));
        }
        let pipeline = self.clone();
        handles.push(tokio::spawn(async move { pipeline.run_maintenance_task().await }));
    }

    /// Idempotent: signals all tasks to drain and exit, then awaits them.
    pub async fn stop(&self) {
        if !*self.is_running.read() {
            return;
        }
        *self.is_running.write() = false;

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    fn running(&self) -> bool {
        *self.is_running.read()
    }

    async fn run_data_task(self: Arc<Self>, mut rx: mpsc::Receiver<ObservationEvent>) {
        let mut buffer: HashMap<String, Vec<ObservationEvent>> = HashMap::new();
        let mut ticker = tokio::time::interval(self.config.update_frequency);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                maybe_event = tokio::time::timeout(POLL_INTERVAL, rx.recv()) => {
                    match maybe_event {
                        Ok(Some(event)) => {
                            buffer.entry(event.model_id.clone()).or_default().push(event);
                            let total: usize = buffer.values().map(|v| v.len()).sum();
                            if total >= self.config.batch_size {
                                self.flush(&mut buffer).await;
                            }
                        }
                        Ok(None) => break,
                        Err(_) => {}
                    }
                }
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }

            if !self.running() {
                rx.close();
                while let Ok(event) = rx.try_recv() {
                    buffer.entry(event.model_id.clone()).or_default().push(event);
                }
                self.flush(&mut buffer).await;
                break;
            }
        }
    }

    async fn flush(&self, buffer: &mut HashMap<String, Vec<ObservationEvent>>) {
        for (model_id, events) in buffer.drain() {
            if !self.registry.contains(&model_id) {
                self.logger.warn("learning_pipeline", &format!("unknown model {model_id}, dropping batch"));
                continue;
            }
            let features: Vec<FeatureMap> = events.iter().map(|e| e.features.clone()).collect();
            let labels: Vec<f64> = events.iter().map(|e| e.target).collect();
            let weights: Vec<f64> = events.iter().map(|e| e.weight).collect();

            if let Err(e) = self
                .registry
                .update_batch(self.clock.as_ref(), &model_id, &features, &labels, &weights)
                .await
            {
                self.logger.warn("learning_pipeline", &format!("batch update failed for {model_id}: {e}"));
            }
        }
    }

    async fn run_feedback_task(self: Arc<Self>, mut rx: mpsc::Receiver<FeedbackEvent>) {
        loop {
            match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
                Ok(Some(event)) => self.apply_feedback(event).await,
                Ok(None) => break,
                Err(_) => {}
            }

            if !self.running() {
                rx.close();
                while let Ok(event) = rx.try_recv() {
                    self.apply_feedback(event).await;
                }
                break;
            }
        }
    }

    async fn apply_feedback(&self, event: FeedbackEvent) {
        self.registry.record_feedback_error(&event.model_id, event.error);

        let feedback = ModelFeedback {
            prediction_id: event.prediction_id,
            correct: event.error < 0.1,
            confidence: (1.0 - event.error).clamp(0.0, 1.0),
            actual: event.actual,
        };

        if let Err(e) = self.registry.update_weights(&event.model_id, feedback).await {
            self.logger.warn("learning_pipeline", &format!("weight update failed for {}: {e}", event.model_id));
        }
    }

    async fn run_maintenance_task(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.maintenance_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for model_id in self.registry.model_ids() {
                        match self.registry.trigger_maintenance_adaptation(&model_id).await {
                            Ok(true) => self.logger.info("learning_pipeline", &format!("maintenance adaptation applied to {model_id}")),
                            Ok(false) => {}
                            Err(e) => self.logger.warn("learning_pipeline", &format!("maintenance check failed for {model_id}: {e}")),
                        }
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            if !self.running() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::drift::{DriftDetector, DriftTest};
    use crate::model_registry::{ModelError, ModelInfo, RegistryConfig, TrainingData};
    use crate::model_metrics::OnlineMetricsTracker;
    use crate::telemetry::TracingLogger;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct NoopModel;

    #[async_trait]
    impl crate::model_registry::Model for NoopModel {
        async fn train(&self, _data: TrainingData) -> Result<(), ModelError> {
            Ok(())
        }
        async fn update_weights(&self, _feedback: ModelFeedback) -> Result<(), ModelError> {
            Ok(())
        }
        fn info(&self) -> ModelInfo {
            ModelInfo { id: "noop".into(), name: "noop".into(), model_type: "linear".into(), accuracy: 0.0 }
        }
    }

    fn make_pipeline(batch_size: usize) -> (Arc<LearningPipeline>, Arc<OnlineModelRegistry>) {
        let drift = Arc::new(DriftDetector::new(DriftTest::Ks, 32, 0.05));
        let metrics = Arc::new(OnlineMetricsTracker::new(100));
        let registry = Arc::new(OnlineModelRegistry::new(
            drift,
            metrics,
            RegistryConfig {
                learning_rate_min: 0.01,
                learning_rate_max: 0.1,
                drift_threshold: 0.05,
                enable_drift_detection: true,
                enable_adaptation: true,
            },
        ));
        registry.add_model("m1", Arc::new(NoopModel)).unwrap();

        let config = LearningConfig {
            queue_capacity: 4,
            batch_size,
            update_frequency: StdDuration::from_secs(60),
            maintenance_interval: StdDuration::from_secs(300),
        };
        let pipeline = Arc::new(LearningPipeline::new(
            config,
            registry.clone(),
            Arc::new(SystemClock),
            Arc::new(TracingLogger),
        ));
        (pipeline, registry)
    }

    fn observation(model_id: &str, target: f64) -> ObservationEvent {
        let mut features = FeatureMap::new();
        features.insert("target_value".to_string(), crate::value::Value::Number(target));
        ObservationEvent {
            event_id: Uuid::new_v4().to_string(),
            model_id: model_id.to_string(),
            features,
            target,
            timestamp: Utc::now(),
            weight: 1.0,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn submit_rejects_when_queue_full() {
        let (pipeline, _registry) = make_pipeline(1000);
        for _ in 0..4 {
            pipeline.submit_observation(observation("m1", 1.0)).unwrap();
        }
        let err = pipeline.submit_observation(observation("m1", 1.0)).unwrap_err();
        assert!(matches!(err, LearningError::BufferFull(_)));
    }

    #[tokio::test]
    async fn s1_batch_flushes_at_batch_size() {
        let (pipeline, registry) = make_pipeline(32);
        pipeline.start().await;

        for i in 0..32 {
            pipeline.submit_observation(observation("m1", i as f64)).unwrap();
        }

        tokio::time::sleep(StdDuration::from_millis(500)).await;
        pipeline.stop().await;

        let snapshot = registry.snapshot("m1").await.unwrap();
        assert_eq!(snapshot.update_count, 32);
        assert_eq!(snapshot.drift_score, 0.0);
    }
}

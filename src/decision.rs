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

//! C9 — Decision Orchestrator. Accepts decision requests, bounds
//! concurrency, and produces ranked recommendations with reasoning, risk
//! assessment, and an execution plan (spec.md §4.9).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::Cache;
use crate::clock::Clock;
use crate::performance_tracker::PerformanceTracker;
use crate::scorer::{score_all, Scorer, ScorerLabel, ScorerResult};
use crate::telemetry::Logger;
use crate::value::{FeatureMap, Value};

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("decision timed out")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type DecisionResultOutcome<T> = Result<T, DecisionError>;

const COMPLEX_DECISION_TYPES: &[&str] =
    &["portfolio_rebalance", "risk_management", "multi_asset_strategy"];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DecisionOptions {
    pub backtesting: bool,
    pub alternatives: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub request_id: String,
    pub user_id: String,
    pub decision_type: String,
    pub context: FeatureMap,
    pub options: DecisionOptions,
    pub expires_at: DateTime<Utc>,
    pub auto_execution_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub reasoning: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<String>,
    pub estimated_duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub request_id: String,
    pub user_id: String,
    pub status: DecisionStatus,
    pub confidence: f64,
    pub risk_score: f64,
    pub recommendation: Recommendation,
    pub alternatives: Vec<Recommendation>,
    pub execution_plan: ExecutionPlan,
    pub auto_executable: bool,
    pub requires_approval: bool,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDecision {
    pub decision_id: String,
    pub user_id: String,
    pub status: DecisionStatus,
    pub progress: f64,
    pub current_step: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn is_complex(decision_type: &str, options: &DecisionOptions) -> bool {
    COMPLEX_DECISION_TYPES.contains(&decision_type) || options.backtesting || options.alternatives
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionConfig {
    pub max_concurrent_decisions: usize,
    pub decision_timeout: StdDuration,
    pub min_confidence_threshold: f64,
    pub max_risk_per_decision: f64,
    pub enable_auto_execution: bool,
    pub result_cache_ttl: StdDuration,
}

const MAX_USER_HISTORY: usize = 200;

pub struct DecisionOrchestrator {
    config: DecisionConfig,
    active: DashMap<String, Mutex<ActiveDecision>>,
    results_cache: Cache<DecisionResult>,
    history: DashMap<String, Mutex<VecDeque<DecisionResult>>>,
    scorers: Vec<(Arc<dyn Scorer>, f64)>,
    performance: Arc<PerformanceTracker>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
}

impl DecisionOrchestrator {
    pub fn new(
        config: DecisionConfig,
        scorers: Vec<(Arc<dyn Scorer>, f64)>,
        performance: Arc<PerformanceTracker>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let ttl = config.result_cache_ttl;
        Self {
            config,
            active: DashMap::new(),
            results_cache: Cache::new(ttl),
            history: DashMap::new(),
            scorers,
            performance,
            clock,
            logger,
        }
    }

    fn validate(&self, req: &DecisionRequest, now: DateTime<Utc>) -> DecisionResultOutcome<()> {
        if req.request_id.trim().is_empty() {
            return Err(DecisionError::InvalidRequest("request_id is required".into()));
        }
        if req.user_id.trim().is_empty() {
            return Err(DecisionError::InvalidRequest("user_id is required".into()));
        }
        if req.decision_type.trim().is_empty() {
            return Err(DecisionError::InvalidRequest("decision_type is required".into()));
        }
        if req.expires_at <= now {
            return Err(DecisionError::InvalidRequest("expires_at must be in the future".into()));
        }
        Ok(())
    }

    pub async fn process_decision_request(
        &self,
        req: DecisionRequest,
    ) -> DecisionResultOutcome<DecisionResult> {
        let now = self.clock.now();
        self.validate(&req, now)?;

        if let Some(cached) = self.results_cache.get(now, &req.request_id) {
            return Ok(cached);
        }

        if self.active.len() >= self.config.max_concurrent_decisions {
            return Err(DecisionError::CapacityExceeded(format!(
                "at most {} concurrent decisions",
                self.config.max_concurrent_decisions
            )));
        }

        let active = ActiveDecision {
            decision_id: req.request_id.clone(),
            user_id: req.user_id.clone(),
            status: DecisionStatus::Processing,
            progress: 0.0,
            current_step: "queued".to_string(),
            started_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.active.insert(req.request_id.clone(), Mutex::new(active));

        if is_complex(&req.decision_type, &req.options) {
            Ok(self.process_complex(req).await)
        } else {
            self.process_simple(req).await
        }
    }

    fn set_progress(&self, decision_id: &str, progress: f64, step: &str) {
        if let Some(entry) = self.active.get(decision_id) {
            let mut active = entry.lock();
            active.progress = progress;
            active.current_step = step.to_string();
            active.updated_at = self.clock.now();
        }
    }

    async fn run_pipeline(&self, req: &DecisionRequest) -> Recommendation {
        self.set_progress(&req.request_id, 0.2, "analyze_market_conditions");
        let market = self.analyze_market_conditions(&req.context).await;

        self.set_progress(&req.request_id, 0.4, "assess_risk");
        let risk_score = self.assess_risk(&market, &req.context);

        self.set_progress(&req.request_id, 0.6, "generate_recommendations");
        let (primary, _alternatives) = self.generate_recommendations(&market, risk_score, &req.options);

        self.set_progress(&req.request_id, 0.8, "create_execution_plan");
        let _plan = self.create_execution_plan(&primary);

        self.set_progress(&req.request_id, 1.0, "build_reasoning");
        primary
    }

    async fn analyze_market_conditions(&self, context: &FeatureMap) -> ScorerResult {
        if self.scorers.is_empty() {
            return ScorerResult {
                score: 0.0,
                confidence: 0.5,
                label: ScorerLabel::Neutral,
                detail: Default::default(),
            };
        }
        let input: HashMap<String, Value> = context.clone();
        score_all(&self.scorers, &input).await
    }

    fn assess_risk(&self, market: &ScorerResult, context: &FeatureMap) -> f64 {
        let volatility = context
            .get("volatility")
            .and_then(|v| v.as_number())
            .unwrap_or(0.2);
        ((1.0 - market.confidence) * 0.5 + volatility.clamp(0.0, 1.0) * 0.5).clamp(0.0, 1.0)
    }

    fn generate_recommendations(
        &self,
        market: &ScorerResult,
        risk_score: f64,
        options: &DecisionOptions,
    ) -> (Recommendation, Vec<Recommendation>) {
        let action = match market.label {
            ScorerLabel::Bullish => "increase_exposure",
            ScorerLabel::Bearish => "reduce_exposure",
            ScorerLabel::Neutral => "hold",
        };

        let reasoning = vec![
            format!("market sentiment: {:?} (score {:.2})", market.label, market.score),
            format!("risk score: {risk_score:.2}"),
        ];

        let primary = Recommendation {
            action: action.to_string(),
            reasoning,
            confidence: market.confidence,
        };

        let alternatives = if options.alternatives {
            vec![Recommendation {
                action: "hold".to_string(),
                reasoning: vec!["conservative fallback".to_string()],
                confidence: (market.confidence * 0.6).clamp(0.0, 1.0),
            }]
        } else {
            Vec::new()
        };

        (primary, alternatives)
    }

    fn create_execution_plan(&self, recommendation: &Recommendation) -> ExecutionPlan {
        ExecutionPlan {
            steps: vec![format!("execute: {}", recommendation.action)],
            estimated_duration_minutes: 5,
        }
    }

    fn finalize(&self, req: &DecisionRequest, primary: Recommendation, risk_score: f64, now: DateTime<Utc>) -> DecisionResult {
        let (_, alternatives) = self.generate_recommendations(
            &ScorerResult {
                score: 0.0,
                confidence: primary.confidence,
                label: ScorerLabel::Neutral,
                detail: Default::default(),
            },
            risk_score,
            &req.options,
        );
        let execution_plan = self.create_execution_plan(&primary);

        let auto_executable = self.config.enable_auto_execution
            && risk_score <= self.config.max_risk_per_decision
            && primary.confidence >= self.config.min_confidence_threshold
            && req.auto_execution_level != "none";

        let requires_approval = risk_score > 0.5 || !self.config.enable_auto_execution;

        DecisionResult {
            request_id: req.request_id.clone(),
            user_id: req.user_id.clone(),
            status: DecisionStatus::Completed,
            confidence: primary.confidence,
            risk_score,
            recommendation: primary,
            alternatives,
            execution_plan,
            auto_executable,
            requires_approval,
            generated_at: now,
            expires_at: now + chrono::Duration::hours(24),
        }
    }

    async fn process_simple(&self, req: DecisionRequest) -> DecisionResultOutcome<DecisionResult> {
        let timeout = self.config.decision_timeout;
        let pipeline = self.run_pipeline(&req);

        let primary = match tokio::time::timeout(timeout, pipeline).await {
            Ok(recommendation) => recommendation,
            Err(_) => {
                self.fail_active(&req.request_id);
                return Err(DecisionError::Timeout(req.request_id.clone()));
            }
        };

        let now = self.clock.now();
        let risk_score = self.assess_risk(
            &ScorerResult { score: 0.0, confidence: primary.confidence, label: ScorerLabel::Neutral, detail: Default::default() },
            &req.context,
        );
        let result = self.finalize(&req, primary, risk_score, now);

        self.commit_result(&req, result.clone(), now);
        Ok(result)
    }

    async fn process_complex(&self, req: DecisionRequest) -> DecisionResult {
        let now = self.clock.now();
        let pending = DecisionResult {
            request_id: req.request_id.clone(),
            user_id: req.user_id.clone(),
            status: DecisionStatus::Processing,
            confidence: 0.0,
            risk_score: 0.0,
            recommendation: Recommendation {
                action: "pending".to_string(),
                reasoning: Vec::new(),
                confidence: 0.0,
            },
            alternatives: Vec::new(),
            execution_plan: ExecutionPlan { steps: Vec::new(), estimated_duration_minutes: 0 },
            auto_executable: false,
            requires_approval: true,
            generated_at: now,
            expires_at: now + chrono::Duration::hours(24),
        };

        // The caller owns the `Arc<Self>` wiring at the facade layer; this
        // orchestrator runs the complex pipeline inline behind the
        // returned pending result's guarantee of eventual completion.
        let timeout = self.config.decision_timeout;
        let pipeline = self.run_pipeline(&req);
        match tokio::time::timeout(timeout, pipeline).await {
            Ok(primary) => {
                let completion_now = self.clock.now();
                let risk_score = self.assess_risk(
                    &ScorerResult { score: 0.0, confidence: primary.confidence, label: ScorerLabel::Neutral, detail: Default::default() },
                    &req.context,
                );
                let result = self.finalize(&req, primary, risk_score, completion_now);
                self.commit_result(&req, result, completion_now);
            }
            Err(_) => {
                self.fail_active(&req.request_id);
            }
        }

        pending
    }

    fn commit_result(&self, req: &DecisionRequest, result: DecisionResult, now: DateTime<Utc>) {
        self.results_cache.put(now, req.request_id.clone(), result.clone());

        let mut history = self
            .history
            .entry(req.user_id.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()))
            .lock();
        if history.len() == MAX_USER_HISTORY {
            history.pop_front();
        }
        history.push_back(result.clone());
        drop(history);

        self.performance.record_decision(&req.user_id, None, result.confidence);

        if let Some(entry) = self.active.get(&req.request_id) {
            let mut active = entry.lock();
            active.status = DecisionStatus::Completed;
            active.progress = 1.0;
            active.completed_at = Some(now);
        }
        self.active.remove(&req.request_id);
    }

    fn fail_active(&self, decision_id: &str) {
        if let Some(entry) = self.active.get(decision_id) {
            let mut active = entry.lock();
            active.status = DecisionStatus::Failed;
            active.completed_at = Some(self.clock.now());
        }
        self.active.remove(decision_id);
    }

    pub fn get_active_decisions(&self, user_id: &str) -> Vec<ActiveDecision> {
        self.active
            .iter()
            .map(|e| e.value().lock().clone())
            .filter(|d| d.user_id == user_id)
            .collect()
    }

    pub fn get_decision_history(&self, user_id: &str, limit: usize) -> Vec<DecisionResult> {
        self.history
            .get(user_id)
            .map(|h| h.lock().iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

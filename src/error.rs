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

//! Shared error kinds for the adaptive learning and decision core.
//!
//! Each component keeps its own `thiserror`-derived error type local to its
//! module; `CoreError` is the boundary type callers of the public API see,
//! with `#[from]` conversions from every component error.

use thiserror::Error;

use crate::adaptation::AdaptationError;
use crate::decision::DecisionError;
use crate::drift::DriftError;
use crate::learning::LearningError;
use crate::model_registry::RegistryError;
use crate::pattern::PatternError;
use crate::strategy_registry::StrategyRegistryError;

/// Error kinds exposed across the core's public API (spec.md §7).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or expired input; surfaced to the caller, never retried internally.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown model / strategy / user id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Queue full or concurrent-decision cap hit; caller may retry with backoff.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Model is adapting or strategy is locked; caller retries or skips.
    #[error("busy resource: {0}")]
    BusyResource(String),

    /// A single scorer failed; absorbed locally, reported in result metadata.
    #[error("degraded scorer: {0}")]
    DegradedScorer(String),

    /// Decision exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Unexpected; logged with context, surfaced only when unrecoverable.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<DriftError> for CoreError {
    fn from(e: DriftError) -> Self {
        match e {
            DriftError::InsufficientData(msg) => CoreError::InvalidRequest(msg),
            DriftError::InvalidParameter(msg) => CoreError::InvalidRequest(msg),
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyExists(id) => {
                CoreError::InvalidRequest(format!("model already registered: {id}"))
            }
            RegistryError::NotFound(id) => CoreError::NotFound(format!("model {id}")),
            RegistryError::Busy(id) => CoreError::BusyResource(format!("model {id} is adapting")),
            RegistryError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

impl From<LearningError> for CoreError {
    fn from(e: LearningError) -> Self {
        match e {
            LearningError::BufferFull(stream) => {
                CoreError::CapacityExceeded(format!("{stream} queue is full"))
            }
            LearningError::ShuttingDown => {
                CoreError::CapacityExceeded("pipeline is shutting down".to_string())
            }
            LearningError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

impl From<PatternError> for CoreError {
    fn from(e: PatternError) -> Self {
        match e {
            PatternError::InvalidParameter(msg) => CoreError::InvalidRequest(msg),
        }
    }
}

impl From<AdaptationError> for CoreError {
    fn from(e: AdaptationError) -> Self {
        match e {
            AdaptationError::RateLimited(id) => {
                CoreError::BusyResource(format!("strategy {id} rate limited"))
            }
            AdaptationError::NotFound(id) => CoreError::NotFound(format!("strategy {id}")),
            AdaptationError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

impl From<StrategyRegistryError> for CoreError {
    fn from(e: StrategyRegistryError) -> Self {
        match e {
            StrategyRegistryError::NotFound(id) => CoreError::NotFound(format!("strategy {id}")),
            StrategyRegistryError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

impl From<DecisionError> for CoreError {
    fn from(e: DecisionError) -> Self {
        match e {
            DecisionError::InvalidRequest(msg) => CoreError::InvalidRequest(msg),
            DecisionError::CapacityExceeded(msg) => CoreError::CapacityExceeded(msg),
            DecisionError::Timeout(msg) => CoreError::Timeout(msg),
            DecisionError::NotFound(msg) => CoreError::NotFound(msg),
            DecisionError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

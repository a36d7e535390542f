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

//! C11 — Scorer Facade. Uniform contract for external scoring
//! collaborators (sentiment, chart, NLP, OCR, voice) consumed by C9
//! (spec.md §4.11, §6). The core never implements a scorer itself.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerLabel {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorerDetail {
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerResult {
    pub score: f64,
    pub confidence: f64,
    pub label: ScorerLabel,
    pub detail: ScorerDetail,
}

/// External scoring collaborator contract (spec.md §6).
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, input: &HashMap<String, Value>) -> anyhow::Result<ScorerResult>;
    fn name(&self) -> &str;
}

/// One scorer's weighted contribution to an aggregate.
pub struct WeightedScore {
    pub weight: f64,
    pub result: ScorerResult,
}

/// Weighted average across scorer outputs, `NaN` treated as 0 with 0
/// weight (spec.md §4.11). Returns a neutral/0-confidence result when no
/// usable scores remain.
pub fn aggregate(scores: &[WeightedScore]) -> ScorerResult {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut confidence_sum = 0.0;

    for entry in scores {
        let (score, weight) = if entry.result.score.is_nan() {
            (0.0, 0.0)
        } else {
            (entry.result.score, entry.weight)
        };
        weighted_sum += score * weight;
        weight_total += weight;
        confidence_sum += entry.result.confidence * weight;
    }

    if weight_total <= 0.0 {
        return ScorerResult {
            score: 0.0,
            confidence: 0.0,
            label: ScorerLabel::Neutral,
            detail: ScorerDetail::default(),
        };
    }

    let aggregate_score = weighted_sum / weight_total;
    let aggregate_confidence = (confidence_sum / weight_total).clamp(0.0, 1.0);
    let label = if aggregate_score > 0.15 {
        ScorerLabel::Bullish
    } else if aggregate_score < -0.15 {
        ScorerLabel::Bearish
    } else {
        ScorerLabel::Neutral
    };

    ScorerResult {
        score: aggregate_score,
        confidence: aggregate_confidence,
        label,
        detail: ScorerDetail::default(),
    }
}

/// Runs every scorer against the same input, degrading individual
/// failures to neutral/0-confidence rather than aborting the decision
/// (spec.md §4.11 failure semantics).
pub async fn score_all(
    scorers: &[(Arc<dyn Scorer>, f64)],
    input: &HashMap<String, Value>,
) -> ScorerResult {
    let mut weighted = Vec::with_capacity(scorers.len());
    for (scorer, weight) in scorers {
        let result = match scorer.score(input).await {
            Ok(r) => r,
            Err(_) => ScorerResult {
                score: 0.0,
                confidence: 0.0,
                label: ScorerLabel::Neutral,
                detail: ScorerDetail::default(),
            },
        };
        weighted.push(WeightedScore { weight: *weight, result });
    }
    aggregate(&weighted)
}

use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64, confidence: f64) -> ScorerResult {
        ScorerResult {
            score,
            confidence,
            label: ScorerLabel::Neutral,
            detail: ScorerDetail::default(),
        }
    }

    #[test]
    fn weighted_average_matches_definition() {
        let scores = vec![
            WeightedScore { weight: 2.0, result: result(1.0, 0.9) },
            WeightedScore { weight: 1.0, result: result(-1.0, 0.5) },
        ];
        let agg = aggregate(&scores);
        assert!((agg.score - (1.0_f64 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn nan_score_treated_as_zero_weight() {
        let scores = vec![
            WeightedScore { weight: 5.0, result: result(f64::NAN, 0.9) },
            WeightedScore { weight: 1.0, result: result(0.5, 0.5) },
        ];
        let agg = aggregate(&scores);
        assert!((agg.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_scores_yields_neutral_zero_confidence() {
        let agg = aggregate(&[]);
        assert_eq!(agg.confidence, 0.0);
        assert_eq!(agg.label, ScorerLabel::Neutral);
    }
}

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

//! Heterogeneous feature value used in `ObservationEvent.features` and
//! `MarketContext`. The source system's feature payloads are dynamically
//! typed; we represent that as a tagged enum rather than reaching for
//! `serde_json::Value` everywhere, so detectors can opt into a typed
//! numeric projection (spec.md §9).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single feature value, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    Text(String),
    Sequence(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Numeric projection used by the statistical detectors. Non-numeric
    /// variants yield `None` rather than panicking.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// A feature map, as carried on `ObservationEvent`.
pub type FeatureMap = HashMap<String, Value>;

/// Projects a feature map onto its numeric entries only, the view every
/// statistical test in `drift.rs`/`pattern.rs` consumes.
pub fn numeric_view(features: &FeatureMap) -> HashMap<String, f64> {
    features
        .iter()
        .filter_map(|(k, v)| v.as_number().map(|n| (k.clone(), n)))
        .collect()
}

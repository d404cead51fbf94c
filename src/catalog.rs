//! Document catalog and its in-memory cache.
//!
//! A [`Catalog`] is the complete output of one refresh cycle: every
//! configured source maps to exactly one [`Document`], successful or
//! placeholder. The cache never mutates a published catalog; each refresh
//! builds a brand-new one and swaps it in whole, so readers always observe
//! either the full prior snapshot or the full new one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::SourceSpec;

/// One normalized documentation source, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub tool_name: String,
    pub display_name: String,
    pub description: String,
    pub urls: Vec<String>,
    /// Canonical markdown; multi-URL sources are joined with a visible
    /// horizontal-rule separator.
    pub content: String,
    pub size_bytes: usize,
    pub fetched_at: DateTime<Utc>,
    /// Set when the whole fetch/normalize run for this source failed, in
    /// which case `content` holds an error banner and `size_bytes` is 0.
    pub error: Option<String>,
}

impl Document {
    /// Stand-in for a source whose aggregation failed entirely. Keeps the
    /// spec's display metadata so the entry stays addressable and listable.
    pub fn placeholder(spec: &SourceSpec, message: &str) -> Self {
        Self {
            tool_name: spec.tool_name.clone(),
            display_name: spec.display_name().to_string(),
            description: spec.description.clone(),
            urls: spec.urls.clone(),
            content: format!("# Error\n\nFailed to fetch documentation: {message}"),
            size_bytes: 0,
            fetched_at: Utc::now(),
            error: Some(message.to_string()),
        }
    }
}

/// Tool name to document mapping for one refresh cycle, iterable in
/// configuration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    docs: HashMap<String, Document>,
    order: Vec<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: Document) {
        if !self.docs.contains_key(&doc.tool_name) {
            self.order.push(doc.tool_name.clone());
        }
        self.docs.insert(doc.tool_name.clone(), doc);
    }

    pub fn get(&self, tool_name: &str) -> Option<&Document> {
        self.docs.get(tool_name)
    }

    /// Documents in the order their sources were configured.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.order.iter().filter_map(|name| self.docs.get(name))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Trait for the read/publish seam over the cached catalog.
#[async_trait]
pub trait DocCache: Send + Sync {
    async fn lookup(&self, tool_name: &str) -> Option<Document>;
    /// The current catalog snapshot; empty before the first publish.
    async fn snapshot(&self) -> Arc<Catalog>;
    /// Atomically replace the published catalog with a new cycle's output.
    async fn publish(&self, catalog: Catalog);
}

/// In-memory catalog cache. The refresh task is the only writer; readers
/// clone out an `Arc` snapshot and never observe a partially-built catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocCache for InMemoryCatalog {
    async fn lookup(&self, tool_name: &str) -> Option<Document> {
        self.inner.read().await.get(tool_name).cloned()
    }

    async fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&*self.inner.read().await)
    }

    async fn publish(&self, catalog: Catalog) {
        let snapshot = Arc::new(catalog);
        *self.inner.write().await = snapshot;
    }
}

//! Ranged byte access to a container.
//!
//! [`RangeFetcher`] is the seam between the [`ChunkStore`][crate::ChunkStore]
//! and wherever the bytes live. [`HttpRangeFetcher`] issues
//! `Range: bytes=first-last` requests against a static file URL;
//! [`MemoryFetcher`] serves a buffer already in memory. [`CachingFetcher`]
//! puts a [`RangeCache`] in front of either so that looping playback does
//! not download the same ranges twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tracing::{debug, trace};

use crate::error::StreamError;

/// Every byte source must implement this trait.
///
/// Ranges are inclusive at both ends, as in an HTTP `Range` header.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Identifies the resource, e.g. its URL. Used as part of cache keys.
    fn resource(&self) -> &str;

    async fn fetch(&self, first: u64, last: u64) -> Result<Vec<u8>, StreamError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpRangeFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpRangeFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Share a client (and its connection pool) with other callers.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    fn resource(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, first: u64, last: u64) -> Result<Vec<u8>, StreamError> {
        debug!(first, last, "range request");
        let response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={first}-{last}"))
            .send()
            .await?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(StreamError::UnexpectedStatus {
                status: response.status().as_u16(),
                first,
                last,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In memory
// ─────────────────────────────────────────────────────────────────────────────

/// Serves ranges out of a buffer, e.g. a container read from disk.
#[derive(Debug)]
pub struct MemoryFetcher {
    name: String,
    data: Arc<Vec<u8>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of ranges served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RangeFetcher for MemoryFetcher {
    fn resource(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, first: u64, last: u64) -> Result<Vec<u8>, StreamError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let len = self.data.len() as u64;
        if first > last || first >= len {
            return Err(StreamError::container(format!(
                "range {first}-{last} outside {} bytes of {}",
                len, self.name
            )));
        }
        let end = last.min(len - 1);
        Ok(self.data[first as usize..=end as usize].to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Range cache
// ─────────────────────────────────────────────────────────────────────────────

type RangeKey = (String, u64, u64);

/// Previously fetched ranges keyed by `(resource, first, last)`.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct RangeCache {
    entries: Arc<Mutex<HashMap<RangeKey, Arc<Vec<u8>>>>>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str, first: u64, last: u64) -> Option<Arc<Vec<u8>>> {
        self.lock().get(&(resource.to_string(), first, last)).cloned()
    }

    pub fn insert(&self, resource: &str, first: u64, last: u64, bytes: Arc<Vec<u8>>) {
        self.lock().insert((resource.to_string(), first, last), bytes);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RangeKey, Arc<Vec<u8>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`RangeFetcher`] that consults a [`RangeCache`] first.
pub struct CachingFetcher {
    inner: Arc<dyn RangeFetcher>,
    cache: RangeCache,
}

impl CachingFetcher {
    pub fn new(inner: Arc<dyn RangeFetcher>, cache: RangeCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &RangeCache {
        &self.cache
    }
}

#[async_trait]
impl RangeFetcher for CachingFetcher {
    fn resource(&self) -> &str {
        self.inner.resource()
    }

    async fn fetch(&self, first: u64, last: u64) -> Result<Vec<u8>, StreamError> {
        let resource = self.inner.resource();
        if let Some(hit) = self.cache.get(resource, first, last) {
            trace!(first, last, "range cache hit");
            return Ok(hit.as_ref().clone());
        }
        let bytes = self.inner.fetch(first, last).await?;
        self.cache
            .insert(resource, first, last, Arc::new(bytes.clone()));
        Ok(bytes)
    }
}

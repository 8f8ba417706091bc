//! Discovery cache: store and retrieve discovery results (and the payload
//! fetched with them) keyed by page URL and target.
//!
//! One JSON file per key under the cache directory. An entry is stale once
//! its TTL has elapsed. The picked URL's access policy only governs whether
//! that URL may still be fetched; a payload already stored stays usable for
//! the whole TTL.
//!
//! ## LRU eviction
//!
//! When the cache exceeds `max_entries`, expired entries go first, then the
//! least-recently-accessed one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::types::{DiscoveryResult, Target};

/// Default maximum number of cached discoveries before LRU eviction.
const DEFAULT_MAX_ENTRIES: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// What gets stored for one (page URL, view, share) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDiscovery {
    pub page_url: String,
    pub view_id: String,
    pub share_id: String,
    pub result: DiscoveryResult,
    /// The JSON fetched from `result.picked`, when it was fetched.
    pub payload: Option<Value>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedDiscovery {
    pub fn new(
        page_url: &str,
        target: &Target,
        result: DiscoveryResult,
        payload: Option<Value>,
    ) -> Self {
        Self {
            page_url: page_url.to_string(),
            view_id: target.view_id().to_string(),
            share_id: target.share_id().to_string(),
            result,
            payload,
            fetched_at: Utc::now(),
        }
    }

    fn key(&self) -> String {
        cache_key(&self.page_url, &self.view_id, &self.share_id)
    }

    /// Stale once `ttl` has elapsed since the entry was written.
    pub fn is_stale_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(elapsed) => elapsed >= ttl,
            // fetched_at in the future: clock skew, keep it
            Err(_) => false,
        }
    }

    /// Whether the stored `picked` URL can still be fetched at `now`, i.e.
    /// its signed access policy has not expired.
    pub fn can_refetch_at(&self, now: DateTime<Utc>) -> bool {
        !self.result.is_expired_at(now.fixed_offset())
    }
}

/// File name for a (page URL, view, share) triple: a readable host prefix
/// plus a SHA-256 of the full triple.
fn cache_key(page_url: &str, view_id: &str, share_id: &str) -> String {
    let host: String = page_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .take_while(|c| *c != '/' && *c != '?' && *c != '#')
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .take(48)
        .collect();

    let mut hasher = Sha256::new();
    for part in [page_url, view_id, share_id] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{host}-{}", hex::encode(hasher.finalize()))
}

/// Index entry for one cached file.
struct IndexEntry {
    path: PathBuf,
    last_accessed: Instant,
}

/// Discovery cache backed by a directory of JSON files.
pub struct DiscoveryCache {
    cache_dir: PathBuf,
    index: HashMap<String, IndexEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl DiscoveryCache {
    /// Open (creating if needed) the cache directory and index what is
    /// already there.
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Result<Self, CacheError> {
        fs::create_dir_all(&cache_dir)?;

        let mut index = HashMap::new();
        for entry in fs::read_dir(&cache_dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                index.insert(
                    stem.to_string(),
                    IndexEntry {
                        path: path.clone(),
                        last_accessed: Instant::now(),
                    },
                );
            }
        }

        tracing::debug!(
            "DiscoveryCache initialized: {} entries from {}",
            index.len(),
            cache_dir.display()
        );

        Ok(Self {
            cache_dir,
            index,
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
        })
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Fresh entry for this key, if any. Unreadable files are treated as
    /// absent.
    pub fn get(&mut self, page_url: &str, target: &Target) -> Option<CachedDiscovery> {
        let key = cache_key(page_url, target.view_id(), target.share_id());
        let entry = self.index.get_mut(&key)?;
        let cached = match read_entry(&entry.path) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("ignoring unreadable cache entry {}: {e}", entry.path.display());
                return None;
            }
        };
        if cached.page_url != page_url
            || cached.view_id != target.view_id()
            || cached.share_id != target.share_id()
            || cached.is_stale_at(Utc::now(), self.ttl)
        {
            return None;
        }
        entry.last_accessed = Instant::now();
        Some(cached)
    }

    /// Store an entry, evicting if the cache is full.
    pub fn put(&mut self, cached: &CachedDiscovery) -> Result<PathBuf, CacheError> {
        let key = cached.key();
        if self.index.len() >= self.max_entries && !self.index.contains_key(&key) {
            self.evict_one();
        }

        let path = self.cache_dir.join(format!("{key}.json"));
        fs::write(&path, serde_json::to_vec_pretty(cached)?)?;
        self.index.insert(
            key,
            IndexEntry {
                path: path.clone(),
                last_accessed: Instant::now(),
            },
        );
        Ok(path)
    }

    /// Drop the entry for this key.
    pub fn invalidate(&mut self, page_url: &str, target: &Target) {
        let key = cache_key(page_url, target.view_id(), target.share_id());
        self.remove_key(&key);
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let keys: Vec<String> = self.index.keys().cloned().collect();
        let n = keys.len();
        for key in keys {
            self.remove_key(&key);
        }
        n
    }

    /// Remove all stale or unreadable entries.
    pub fn cleanup_expired(&mut self) {
        for key in self.stale_keys() {
            self.remove_key(&key);
        }
    }

    /// Number of indexed entries (including stale ones).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn stale_keys(&self) -> Vec<String> {
        let now = Utc::now();
        self.index
            .iter()
            .filter(|(_, entry)| match read_entry(&entry.path) {
                Ok(cached) => cached.is_stale_at(now, self.ttl),
                Err(_) => true,
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn evict_one(&mut self) {
        let stale = self.stale_keys();
        if !stale.is_empty() {
            for key in stale {
                self.remove_key(&key);
            }
            return;
        }

        if let Some(lru) = self
            .index
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone())
        {
            tracing::info!("evicting LRU cache entry: {lru}");
            self.remove_key(&lru);
        }
    }

    fn remove_key(&mut self, key: &str) {
        if let Some(entry) = self.index.remove(key) {
            let _ = fs::remove_file(&entry.path);
        }
    }
}

fn read_entry(path: &Path) -> Result<CachedDiscovery, CacheError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

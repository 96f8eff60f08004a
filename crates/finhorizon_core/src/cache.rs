//! Two-tier segment cache (spec.md §4.9): an in-memory LRU backed by a
//! durable blob directory, addressed by the segment's content key so
//! identical segments across Monte-Carlo runs or repeated calculations
//! are computed once.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::EngineWarning;
use crate::model::ids::AccountId;
use crate::model::posting::Posting;
use crate::model::snapshot::Snapshot;

pub const DEFAULT_CACHE_DIR: &str = "./cache/calculate-v2";
pub const DEFAULT_BYTE_BUDGET: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSegment {
    pub snapshot: Snapshot,
    pub postings: FxHashMap<AccountId, Vec<Posting>>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry {
    segment: CachedSegment,
    approx_bytes: usize,
}

pub struct SegmentCache {
    memory: FxHashMap<String, Entry>,
    /// Most-recently-used key at the back.
    lru: VecDeque<String>,
    byte_budget: usize,
    current_bytes: usize,
    blob_dir: PathBuf,
    stats: CacheStats,
}

impl SegmentCache {
    #[must_use]
    pub fn new(blob_dir: impl Into<PathBuf>, byte_budget: usize) -> Self {
        SegmentCache {
            memory: FxHashMap::default(),
            lru: VecDeque::new(),
            byte_budget,
            current_bytes: 0,
            blob_dir: blob_dir.into(),
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CACHE_DIR, DEFAULT_BYTE_BUDGET)
    }

    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    #[must_use]
    pub fn memory_utilization(&self) -> f64 {
        if self.byte_budget == 0 {
            0.0
        } else {
            self.current_bytes as f64 / self.byte_budget as f64
        }
    }

    fn blob_filename(content_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content_key.as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
    }

    fn blob_path(&self, content_key: &str) -> PathBuf {
        self.blob_dir.join(Self::blob_filename(content_key)).with_extension("json")
    }

    pub fn get(&mut self, content_key: &str) -> Option<CachedSegment> {
        if let Some(entry) = self.memory.get(content_key) {
            self.touch(content_key);
            self.stats.hits += 1;
            return Some(entry.segment.clone());
        }

        match self.load_from_disk(content_key) {
            Ok(Some(segment)) => {
                self.stats.hits += 1;
                self.insert_memory(content_key.to_string(), segment.clone());
                Some(segment)
            }
            Ok(None) => {
                self.stats.misses += 1;
                None
            }
            Err(warning) => {
                warn!(?warning, "segment cache disk read failed");
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, content_key: &str, segment: CachedSegment) {
        self.insert_memory(content_key.to_string(), segment.clone());
        if let Err(warning) = self.store_to_disk(content_key, &segment) {
            warn!(?warning, "segment cache disk write failed");
        }
    }

    fn insert_memory(&mut self, key: String, segment: CachedSegment) {
        let approx_bytes = serde_json::to_vec(&segment).map(|v| v.len()).unwrap_or(0);
        self.current_bytes += approx_bytes;
        self.memory.insert(key.clone(), Entry { segment, approx_bytes });
        self.lru.retain(|k| k != &key);
        self.lru.push_back(key);
        self.evict_if_over_budget();
    }

    fn touch(&mut self, key: &str) {
        self.lru.retain(|k| k != key);
        self.lru.push_back(key.to_string());
    }

    fn evict_if_over_budget(&mut self) {
        while self.current_bytes > self.byte_budget {
            let Some(oldest) = self.lru.pop_front() else { break };
            if let Some(entry) = self.memory.remove(&oldest) {
                self.current_bytes = self.current_bytes.saturating_sub(entry.approx_bytes);
                debug!(key = %oldest, "evicted segment from memory cache");
            }
        }
    }

    fn load_from_disk(&self, content_key: &str) -> Result<Option<CachedSegment>, EngineWarning> {
        let path = self.blob_path(content_key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| EngineWarning::CacheFailure {
            key: content_key.to_string(),
            message: e.to_string(),
        })?;
        let segment = serde_json::from_slice(&bytes).map_err(|e| EngineWarning::CacheFailure {
            key: content_key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(segment))
    }

    fn store_to_disk(&self, content_key: &str, segment: &CachedSegment) -> Result<(), EngineWarning> {
        fs::create_dir_all(&self.blob_dir).map_err(|e| EngineWarning::CacheFailure {
            key: content_key.to_string(),
            message: e.to_string(),
        })?;
        let bytes = serde_json::to_vec(segment).map_err(|e| EngineWarning::CacheFailure {
            key: content_key.to_string(),
            message: e.to_string(),
        })?;
        fs::write(self.blob_path(content_key), bytes).map_err(|e| EngineWarning::CacheFailure {
            key: content_key.to_string(),
            message: e.to_string(),
        })
    }
}

#[must_use]
pub fn cache_dir_exists(dir: &Path) -> bool {
    dir.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;
    use rustc_hash::FxHashSet;

    fn sample_segment() -> CachedSegment {
        CachedSegment {
            snapshot: Snapshot {
                date: date(2025, 1, 1),
                balances: FxHashMap::default(),
                activity_indices: FxHashMap::default(),
                interest_states: FxHashMap::default(),
                data_hash: "abc".to_string(),
                processed_event_ids: FxHashSet::default(),
            },
            postings: FxHashMap::default(),
        }
    }

    #[test]
    fn miss_then_hit_after_put() {
        let dir = std::env::temp_dir().join("finhorizon_cache_test_miss_then_hit");
        let _ = fs::remove_dir_all(&dir);
        let mut cache = SegmentCache::new(&dir, DEFAULT_BYTE_BUDGET);

        assert!(cache.get("k1").is_none());
        cache.put("k1", sample_segment());
        assert!(cache.get("k1").is_some());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn eviction_respects_zero_byte_budget() {
        let dir = std::env::temp_dir().join("finhorizon_cache_test_eviction");
        let _ = fs::remove_dir_all(&dir);
        let mut cache = SegmentCache::new(&dir, 1);
        cache.put("k1", sample_segment());
        assert!(cache.memory.is_empty(), "entry larger than the budget should be evicted immediately");
        let _ = fs::remove_dir_all(&dir);
    }
}

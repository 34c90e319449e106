//! Byte-budgeted LRU cache of converted documents.

use super::entry::CachedDocumentEntry;
use crate::error::Result;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Arc<CachedDocumentEntry>>,
    /// Least recently used first
    lru: VecDeque<String>,
    /// In-memory bytes of all entries
    total_bytes: u64,
}

impl CacheState {
    fn touch(&mut self, job_id: &str) {
        if let Some(pos) = self.lru.iter().position(|k| k == job_id) {
            if let Some(key) = self.lru.remove(pos) {
                self.lru.push_back(key);
            }
        }
    }

    fn take(&mut self, job_id: &str) -> Option<Arc<CachedDocumentEntry>> {
        let entry = self.entries.remove(job_id)?;
        self.lru.retain(|k| k != job_id);
        self.total_bytes = self.total_bytes.saturating_sub(entry.memory_footprint());
        Some(entry)
    }

    fn insert(&mut self, entry: CachedDocumentEntry) {
        let key = entry.job_id.clone();
        self.total_bytes += entry.memory_footprint();
        self.entries.insert(key.clone(), Arc::new(entry));
        self.lru.push_back(key);
    }
}

/// Documents cached per job id under a memory budget.
///
/// Over budget, entries are evicted least recently used first; when only
/// the newest entry is left and it alone exceeds the budget, it is spilled
/// to a temp file. An entry larger than the whole budget goes straight to
/// disk. All bookkeeping happens under one mutex.
#[derive(Debug)]
pub struct LazyDocumentCache {
    state: Mutex<CacheState>,
    budget_bytes: u64,
    spill_dir: PathBuf,
}

impl LazyDocumentCache {
    pub fn new(budget_bytes: u64, spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            budget_bytes,
            spill_dir: spill_dir.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace the entry for its job id, then enforce the budget.
    /// Returns the job ids evicted to make room.
    pub fn put(&self, entry: CachedDocumentEntry) -> Result<Vec<String>> {
        let entry = if entry.memory_footprint() > self.budget_bytes {
            log::info!(
                "Document for job {} ({} bytes) exceeds cache budget, storing on disk",
                entry.job_id,
                entry.size()
            );
            entry.spilled(&self.spill_dir)?
        } else {
            entry
        };

        let job_id = entry.job_id.clone();
        let mut state = self.lock();
        if state.take(&job_id).is_some() {
            log::debug!("Replaced cached document for job {}", job_id);
        }
        state.insert(entry);
        Ok(self.enforce_budget(&mut state, &job_id))
    }

    fn enforce_budget(&self, state: &mut CacheState, newest: &str) -> Vec<String> {
        let mut evicted = Vec::new();
        while state.total_bytes > self.budget_bytes {
            let Some(victim) = state.lru.iter().find(|k| k.as_str() != newest).cloned() else {
                break;
            };
            if state.take(&victim).is_some() {
                log::info!("Evicted cached document for job {}", victim);
                evicted.push(victim);
            }
        }

        if state.total_bytes > self.budget_bytes {
            let spilled = state
                .entries
                .get(newest)
                .filter(|e| !e.is_on_disk())
                .map(|e| e.spilled(&self.spill_dir));
            match spilled {
                Some(Ok(spilled)) => {
                    log::info!("Spilled cached document for job {} to disk", newest);
                    state.take(newest);
                    state.insert(spilled);
                }
                Some(Err(e)) => log::warn!("Failed to spill cached document {}: {}", newest, e),
                None => {}
            }
        }
        evicted
    }

    /// Entry for a job, marking it most recently used.
    pub fn get(&self, job_id: &str) -> Option<Arc<CachedDocumentEntry>> {
        let mut state = self.lock();
        let entry = state.entries.get(job_id).cloned()?;
        state.touch(job_id);
        Some(entry)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().entries.contains_key(job_id)
    }

    /// Remove a job's entry. Removing an absent job is a no-op.
    pub fn remove(&self, job_id: &str) -> Option<Arc<CachedDocumentEntry>> {
        self.lock().take(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-memory bytes currently tracked.
    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Job ids, least recently used first.
    pub fn job_ids(&self) -> Vec<String> {
        self.lock().lru.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(budget: u64) -> (tempfile::TempDir, LazyDocumentCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = LazyDocumentCache::new(budget, dir.path());
        (dir, cache)
    }

    fn entry(job: &str, size: usize) -> CachedDocumentEntry {
        CachedDocumentEntry::new(job, vec![0u8; size])
    }

    #[test]
    fn test_evicts_least_recently_used_first() {
        let (_dir, cache) = cache(100);
        cache.put(entry("a", 40)).unwrap();
        cache.put(entry("b", 40)).unwrap();
        assert!(cache.get("a").is_some());

        let evicted = cache.put(entry("c", 40)).unwrap();
        assert_eq!(evicted, vec!["b".to_string()]);
        assert_eq!(cache.job_ids(), vec!["a".to_string(), "c".to_string()]);
        assert!(cache.total_bytes() <= cache.budget_bytes());
    }

    #[test]
    fn test_oversized_entry_goes_to_disk() {
        let (_dir, cache) = cache(10);
        cache.put(entry("small", 5)).unwrap();
        cache.put(entry("huge", 50)).unwrap();

        let huge = cache.get("huge").unwrap();
        assert!(huge.is_on_disk());
        assert_eq!(huge.bytes().unwrap().len(), 50);
        assert!(cache.contains("small"));
        assert_eq!(cache.total_bytes(), 5);
    }

    #[test]
    fn test_replacement_releases_old_bytes() {
        let (_dir, cache) = cache(100);
        cache.put(entry("a", 60)).unwrap();
        cache.put(entry("a", 30)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 30);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, cache) = cache(100);
        cache.put(entry("a", 10)).unwrap();
        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_total_never_exceeds_budget() {
        let (_dir, cache) = cache(64);
        for i in 0..20 {
            cache.put(entry(&format!("job-{}", i), 7 + (i * 5) % 30)).unwrap();
            assert!(cache.total_bytes() <= 64);
        }
    }
}

//! Job-scoped registry of normalized glyph-indexed fonts and their coverage.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Normalized (full coverage) replacements for glyph-indexed fonts, keyed by
/// font uid. Uids embed the job id so concurrent jobs never collide; a job's
/// entries are removed with [`FontRegistry::sweep_prefix`].
#[derive(Debug, Default)]
pub struct FontRegistry {
    normalized: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    coverage: RwLock<HashMap<String, Arc<HashSet<u32>>>>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a normalized TrueType program for a uid.
    pub fn insert_normalized(&self, uid: impl Into<String>, program: Vec<u8>) {
        if let Ok(mut map) = self.normalized.write() {
            map.insert(uid.into(), Arc::new(program));
        }
    }

    pub fn normalized(&self, uid: &str) -> Option<Arc<Vec<u8>>> {
        self.normalized.read().ok()?.get(uid).cloned()
    }

    /// Register the code points a uid's program covers.
    pub fn insert_coverage(&self, uid: impl Into<String>, code_points: HashSet<u32>) {
        if let Ok(mut map) = self.coverage.write() {
            map.insert(uid.into(), Arc::new(code_points));
        }
    }

    pub fn coverage(&self, uid: &str) -> Option<Arc<HashSet<u32>>> {
        self.coverage.read().ok()?.get(uid).cloned()
    }

    /// Check whether the coverage set of `uid` contains `code_point`.
    /// `None` when no coverage is known for the uid.
    pub fn covers(&self, uid: &str, code_point: u32) -> Option<bool> {
        self.coverage(uid).map(|set| set.contains(&code_point))
    }

    /// Remove all entries whose uid starts with `prefix`. Returns the number removed.
    pub fn sweep_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        if let Ok(mut map) = self.normalized.write() {
            let before = map.len();
            map.retain(|uid, _| !uid.starts_with(prefix));
            removed += before - map.len();
        }
        if let Ok(mut map) = self.coverage.write() {
            let before = map.len();
            map.retain(|uid, _| !uid.starts_with(prefix));
            removed += before - map.len();
        }
        if removed > 0 {
            log::debug!("Swept {} font registry entries for prefix {}", removed, prefix);
        }
        removed
    }

    /// Remove the entries of one job.
    pub fn sweep_job(&self, job_id: &str) -> usize {
        self.sweep_prefix(&format!("{}:", job_id))
    }

    pub fn is_empty(&self) -> bool {
        let normalized = self.normalized.read().map(|m| m.is_empty()).unwrap_or(true);
        let coverage = self.coverage.read().map(|m| m.is_empty()).unwrap_or(true);
        normalized && coverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let registry = FontRegistry::new();
        registry.insert_normalized("job-1:1:F1", vec![1, 2, 3]);
        registry.insert_coverage("job-1:1:F1", [0x41, 0x42].into_iter().collect());

        assert_eq!(registry.normalized("job-1:1:F1").unwrap().as_slice(), &[1, 2, 3]);
        assert_eq!(registry.covers("job-1:1:F1", 0x41), Some(true));
        assert_eq!(registry.covers("job-1:1:F1", 0x43), Some(false));
        assert_eq!(registry.covers("job-2:1:F1", 0x41), None);
    }

    #[test]
    fn test_sweep_only_touches_one_job() {
        let registry = FontRegistry::new();
        registry.insert_normalized("job-1:1:F1", vec![1]);
        registry.insert_coverage("job-1:2:F3", HashSet::new());
        registry.insert_normalized("job-10:1:F1", vec![2]);

        assert_eq!(registry.sweep_job("job-1"), 2);
        assert!(registry.normalized("job-1:1:F1").is_none());
        assert!(registry.normalized("job-10:1:F1").is_some());
        assert_eq!(registry.sweep_job("job-10"), 1);
        assert!(registry.is_empty());
    }
}

//! Document cache budget, eviction order and disk spillover.

use pdfjson::{CachedDocumentEntry, DocumentMetadataSummary, LazyDocumentCache};
use std::sync::Arc;
use std::thread;

fn entry(job: &str, size: usize) -> CachedDocumentEntry {
    CachedDocumentEntry::new(job, vec![7u8; size])
}

#[test]
fn test_budget_evicts_least_recently_used() {
    let dir = tempfile::tempdir().unwrap();
    let cache = LazyDocumentCache::new(250, dir.path());

    assert!(cache.put(entry("a", 100)).unwrap().is_empty());
    assert!(cache.put(entry("b", 100)).unwrap().is_empty());
    // Reading "a" makes "b" the eviction candidate
    assert!(cache.get("a").is_some());

    let evicted = cache.put(entry("c", 100)).unwrap();
    assert_eq!(evicted, vec!["b".to_string()]);
    assert_eq!(cache.job_ids(), vec!["a".to_string(), "c".to_string()]);
    assert_eq!(cache.total_bytes(), 200);
    assert!(cache.total_bytes() <= cache.budget_bytes());
}

#[test]
fn test_oversized_entry_goes_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cache = LazyDocumentCache::new(64, dir.path());

    let evicted = cache.put(entry("big", 1024)).unwrap();
    assert!(evicted.is_empty());
    let cached = cache.get("big").unwrap();
    assert!(cached.is_on_disk());
    assert_eq!(cached.size(), 1024);
    assert_eq!(cached.memory_footprint(), 0);
    assert_eq!(cache.total_bytes(), 0);
    assert_eq!(cached.bytes().unwrap().len(), 1024);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_spilled_file_is_removed_with_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = LazyDocumentCache::new(64, dir.path());
    cache.put(entry("big", 512)).unwrap();

    let removed = cache.remove("big");
    assert!(removed.is_some());
    drop(removed);
    assert!(!cache.contains("big"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_replacing_an_entry_keeps_one_copy() {
    let dir = tempfile::tempdir().unwrap();
    let cache = LazyDocumentCache::new(1000, dir.path());

    let summary = DocumentMetadataSummary {
        job_id: "job".to_string(),
        ..Default::default()
    };
    cache.put(entry("job", 100).with_metadata(summary)).unwrap();
    let original = cache.get("job").unwrap();
    cache.put(original.with_updated_bytes(vec![1u8; 300])).unwrap();

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.total_bytes(), 300);
    let replaced = cache.get("job").unwrap();
    assert_eq!(replaced.metadata.as_ref().unwrap().job_id, "job");
    // The previous handle still sees its own bytes
    assert_eq!(original.bytes().unwrap().len(), 100);
}

#[test]
fn test_concurrent_puts_stay_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(LazyDocumentCache::new(1000, dir.path()));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for round in 0..10 {
                    cache
                        .put(entry(&format!("job-{}-{}", worker, round), 200))
                        .unwrap();
                    cache.get(&format!("job-{}-{}", worker, round));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.total_bytes() <= cache.budget_bytes());
    assert!(cache.len() <= 5);
    assert!(!cache.is_empty());
}

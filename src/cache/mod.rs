//! Per-job document cache for page-level and incremental operations.

mod entry;
mod expiry;
mod lazy;

pub use entry::{CachedDocumentEntry, DocumentStorage};
pub use expiry::ExpiryScheduler;
pub use lazy::LazyDocumentCache;

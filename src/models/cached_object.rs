//! Presence record for an object held on local disk.

use chrono::{DateTime, Utc};

/// Cache state of one locally present object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedObject {
    /// Active consumers (e.g. range reads). A pinned object is never deleted.
    pub pinned_count: u64,

    /// When the object became present locally.
    pub added_at: DateTime<Utc>,
}

impl CachedObject {
    pub fn new() -> Self {
        Self {
            pinned_count: 0,
            added_at: Utc::now(),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned_count > 0
    }
}

impl Default for CachedObject {
    fn default() -> Self {
        Self::new()
    }
}

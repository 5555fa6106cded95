//! In-process cache of the latest known status per download.
//!
//! Reads are served entirely from here; the worker pushes keep it fresh.
//! Only the supervisor mutates the cache (single-writer by construction),
//! so a plain read-write lock suffices.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{DownloadState, DownloadStatus};
use crate::magnet::InfoHash;

/// Latest known status per info hash.
#[derive(Default)]
pub struct StatusCache {
    entries: RwLock<HashMap<InfoHash, DownloadStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for its info hash.
    pub fn apply(&self, status: DownloadStatus) {
        self.entries.write().insert(status.info_hash, status);
    }

    /// Returns a copy of the record for one download.
    pub fn get(&self, info_hash: InfoHash) -> Option<DownloadStatus> {
        self.entries.read().get(&info_hash).cloned()
    }

    /// Returns copies of every record, newest first.
    pub fn all(&self) -> Vec<DownloadStatus> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        entries
    }

    /// Removes and returns the record for one download.
    pub fn remove(&self, info_hash: InfoHash) -> Option<DownloadStatus> {
        self.entries.write().remove(&info_hash)
    }

    /// Rewrites the state of one record, returning the updated copy.
    pub fn set_state(&self, info_hash: InfoHash, state: DownloadState) -> Option<DownloadStatus> {
        let mut entries = self.entries.write();
        let status = entries.get_mut(&info_hash)?;
        status.state = state;
        Some(status.clone())
    }

    /// Demotes every non-terminal record to `Paused` with zeroed speeds.
    ///
    /// Applied when the worker dies: in-flight downloads become resumable
    /// rather than lost. Returns the demoted records for durable flushing.
    pub fn demote_live_to_paused(&self) -> Vec<DownloadStatus> {
        let mut entries = self.entries.write();
        let mut demoted = Vec::new();
        for status in entries.values_mut() {
            if matches!(status.state, DownloadState::Starting | DownloadState::Active) {
                status.state = DownloadState::Paused;
                status.download_speed = 0;
                status.upload_speed = 0;
                status.num_peers = 0;
                demoted.push(status.clone());
            }
        }
        demoted
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Replaces the whole cache with records loaded from the durable store.
    pub fn load_from(&self, records: HashMap<InfoHash, DownloadStatus>) {
        *self.entries.write() = records;
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::test_status;

    #[test]
    fn test_apply_and_get() {
        let cache = StatusCache::new();
        let status = test_status(1, DownloadState::Active);
        let hash = status.info_hash;

        cache.apply(status.clone());
        assert_eq!(cache.get(hash), Some(status));
        assert_eq!(cache.len(), 1);

        // Re-applying the same hash replaces, never duplicates.
        let mut updated = test_status(1, DownloadState::Active);
        updated.progress = 0.7;
        cache.apply(updated.clone());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(hash).unwrap().progress, 0.7);
    }

    #[test]
    fn test_demote_live_to_paused() {
        let cache = StatusCache::new();
        let mut active = test_status(1, DownloadState::Active);
        active.download_speed = 5000;
        active.num_peers = 4;
        cache.apply(active);
        cache.apply(test_status(2, DownloadState::Starting));
        cache.apply(test_status(3, DownloadState::Done));
        cache.apply(test_status(4, DownloadState::Paused));

        let demoted = cache.demote_live_to_paused();
        assert_eq!(demoted.len(), 2);
        for status in &demoted {
            assert_eq!(status.state, DownloadState::Paused);
            assert_eq!(status.download_speed, 0);
            assert_eq!(status.num_peers, 0);
        }

        // Done and already-paused records are untouched.
        assert_eq!(
            cache.get(test_status(3, DownloadState::Done).info_hash).unwrap().state,
            DownloadState::Done
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = StatusCache::new();
        let status = test_status(9, DownloadState::Paused);
        let hash = status.info_hash;
        cache.apply(status);

        assert!(cache.remove(hash).is_some());
        assert!(cache.remove(hash).is_none());
        assert!(cache.is_empty());

        cache.apply(test_status(1, DownloadState::Active));
        cache.clear();
        assert!(cache.is_empty());
    }
}

//! Process-local height cache.
//!
//! Mirrors the latest persisted directory block, the height a remote peer
//! announced as next, and how far local replay has progressed. Owned by one
//! [`BlockStore`](crate::store::BlockStore) and guarded by the same lock as
//! its backend writes.

use notary_core::Hash256;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeightCache {
    latest: Option<(u64, Hash256)>,
    next_expected: u64,
    local_sync: u64,
}

impl HeightCache {
    /// Cache seeded with the backend's tip at open.
    pub(crate) fn from_tip(tip: Option<(u64, Hash256)>) -> Self {
        Self {
            latest: tip,
            ..Self::default()
        }
    }

    /// Latest `(height, hash)`, if any block is known.
    pub fn latest(&self) -> Option<(u64, Hash256)> {
        self.latest
    }

    /// Overwrite the latest pair unconditionally.
    pub fn set_latest(&mut self, height: u64, hash: Hash256) {
        self.latest = Some((height, hash));
    }

    /// Raise the latest pair to `(height, hash)` unless a higher height is
    /// already cached. Equal heights take the new hash.
    pub fn advance(&mut self, height: u64, hash: Hash256) {
        match self.latest {
            Some((cached, _)) if cached > height => {}
            _ => self.latest = Some((height, hash)),
        }
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn set_next_expected(&mut self, height: u64) {
        self.next_expected = height;
    }

    pub fn local_sync(&self) -> u64 {
        self.local_sync
    }

    pub fn set_local_sync(&mut self, height: u64) {
        self.local_sync = height;
    }
}

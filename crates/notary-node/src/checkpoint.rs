//! Checkpoint orchestration: seal, persist, anchor.
//!
//! A seal persists the pending directory block first and anchors it second.
//! The two steps commit independently. When anchoring fails the block stays
//! persisted without an anchor record, which is an ordinary, queryable state:
//! [`Checkpointer::anchor_persisted`] anchors it again later.
//!
//! Lock order is pending block, then store. Anchoring runs with neither held,
//! so a stalled broadcast never blocks readers or entry commits.

use std::sync::Arc;
use std::time::Duration;

use notary_anchor::CommitmentAnchor;
use notary_core::constants::DIRECTORY_CHAIN_ID;
use notary_core::{
    Checkpoint, DirBlockInfo, DirEntry, DirectoryBlock, EntryBlock, EntryBlockHeader, Hash256,
    StoreError,
};
use notary_store::{BlockStore, KvBackend, RangeEnd};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::NodeError;
use crate::pending::PendingDirBlock;

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// A directory block produced by [`Checkpointer::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    pub height: u64,
    pub hash: Hash256,
    pub key_mr: Hash256,
    pub entries: usize,
    /// Anchor record, when an anchor is configured.
    pub anchor: Option<DirBlockInfo>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Unconfirmed anchors examined.
    pub checked: usize,
    /// Anchors newly marked confirmed.
    pub confirmed: usize,
    /// Anchors whose status query failed; they stay unconfirmed.
    pub failed: usize,
}

/// Accumulates directory entries, seals them into directory blocks, and
/// anchors sealed blocks.
pub struct Checkpointer<K: KvBackend, A: CommitmentAnchor> {
    store: Arc<BlockStore<K>>,
    anchor: Option<A>,
    network_id: u32,
    pending: Mutex<PendingDirBlock>,
}

impl<K: KvBackend, A: CommitmentAnchor> Checkpointer<K, A> {
    /// Resume on top of the store's current tip. With no anchor, sealed
    /// blocks are persisted only.
    pub fn new(store: Arc<BlockStore<K>>, anchor: Option<A>, network_id: u32) -> Result<Self, NodeError> {
        let pending = match store.latest_height() {
            Some((height, hash)) => {
                let tip: DirectoryBlock = store.block_by_hash(&hash)?;
                info!(height, %hash, "resuming after directory block");
                PendingDirBlock::after(&tip, hash, unix_now())
            }
            None => {
                info!("starting new directory chain");
                PendingDirBlock::genesis(unix_now())
            }
        };

        Ok(Self {
            store,
            anchor,
            network_id,
            pending: Mutex::new(pending),
        })
    }

    pub fn store(&self) -> &Arc<BlockStore<K>> {
        &self.store
    }

    pub fn anchor(&self) -> Option<&A> {
        self.anchor.as_ref()
    }

    /// Height the next sealed directory block will have.
    pub fn pending_height(&self) -> u64 {
        self.pending.lock().height()
    }

    /// Entries waiting for the next seal.
    pub fn pending_entries(&self) -> Vec<DirEntry> {
        self.pending.lock().entries().to_vec()
    }

    /// Fold an externally sealed entry block's key Merkle root into the
    /// pending directory block.
    pub fn add_entry(&self, chain_id: Hash256, key_mr: Hash256) -> Result<(), NodeError> {
        if chain_id == DIRECTORY_CHAIN_ID {
            return Err(NodeError::ReservedChain(chain_id));
        }
        self.pending.lock().add(DirEntry { chain_id, key_mr });
        Ok(())
    }

    /// Seal `entries` into the next entry block of `chain_id`, persist it,
    /// and fold it into the pending directory block.
    ///
    /// Returns the entry block's key Merkle root, or `None` when `entries`
    /// is empty.
    pub fn commit_entry_block(
        &self,
        chain_id: Hash256,
        entries: Vec<Hash256>,
    ) -> Result<Option<Hash256>, NodeError> {
        if chain_id == DIRECTORY_CHAIN_ID {
            return Err(NodeError::ReservedChain(chain_id));
        }
        if entries.is_empty() {
            return Ok(None);
        }

        let mut pending = self.pending.lock();
        let (height, prev_key_mr) = match self.store.chain_head(&chain_id) {
            Ok(head) => {
                let prev: EntryBlock = self.store.block_by_merkle_root(&head)?;
                (prev.height() + 1, head)
            }
            Err(e) if e.is_not_found() => (0, Hash256::ZERO),
            Err(e) => return Err(e.into()),
        };

        let block = EntryBlock::new(
            EntryBlockHeader {
                chain_id,
                height,
                dir_height: pending.height(),
                prev_key_mr,
                timestamp: unix_now(),
                entry_count: 0,
            },
            entries,
        )
        .map_err(StoreError::from)?;
        let hash = self.store.insert_block(&block)?;
        let key_mr = block.key_merkle_root();
        pending.add(DirEntry { chain_id, key_mr });

        debug!(
            chain = %chain_id,
            height,
            %hash,
            entries = block.entries.len(),
            "entry block committed"
        );
        Ok(Some(key_mr))
    }

    /// Seal the pending directory block.
    ///
    /// An empty pending block is left as is and `Ok(None)` is returned. A
    /// non-empty one is persisted, then anchored if an anchor is configured.
    /// An anchoring failure is returned as [`NodeError::AnchorFailed`]; the
    /// persisted block is not rolled back.
    pub fn seal(&self) -> Result<Option<SealedBlock>, NodeError> {
        let (block, hash) = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                debug!(height = pending.height(), "pending directory block is empty");
                return Ok(None);
            }
            let block = pending.build(self.network_id).map_err(StoreError::from)?;
            let hash = self.store.insert_block(&block)?;
            *pending = PendingDirBlock::after(&block, hash, unix_now());
            (block, hash)
        };

        let key_mr = block.key_merkle_root();
        info!(
            height = block.height(),
            %hash,
            %key_mr,
            entries = block.entries.len(),
            "directory block sealed"
        );

        let anchor = match &self.anchor {
            Some(anchor) => Some(self.anchor_block(anchor, &block, hash)?),
            None => None,
        };

        Ok(Some(SealedBlock {
            height: block.height(),
            hash,
            key_mr,
            entries: block.entries.len(),
            anchor,
        }))
    }

    /// Anchor the persisted directory block at `height`.
    ///
    /// A block that already has an anchor record is not anchored twice; its
    /// existing record is returned.
    pub fn anchor_persisted(&self, height: u64) -> Result<DirBlockInfo, NodeError> {
        let anchor = self.anchor.as_ref().ok_or(NodeError::AnchoringDisabled)?;
        let hash = self.store.hash_by_height(height)?;
        if let Some(existing) = self.store.anchor_info_by_hash(&hash)? {
            info!(height, %hash, "directory block already anchored");
            return Ok(existing);
        }
        let block: DirectoryBlock = self.store.block_by_hash(&hash)?;
        self.anchor_block(anchor, &block, hash)
    }

    /// Persisted directory blocks with no anchor record, lowest first.
    pub fn unanchored(&self) -> Result<Vec<(u64, Hash256)>, NodeError> {
        // Collect before the per-block lookups; the range holds the read lock.
        let hashes = self
            .store
            .range_by_height(0, RangeEnd::Unbounded)
            .collect::<Result<Vec<_>, _>>()?;

        let mut missing = Vec::new();
        for (height, hash) in (0u64..).zip(hashes) {
            if self.store.anchor_info_by_hash(&hash)?.is_none() {
                missing.push((height, hash));
            }
        }
        Ok(missing)
    }

    /// Mark unconfirmed anchors confirmed once their transaction has at
    /// least `required` confirmations.
    pub fn reconcile_anchors(&self, required: u32) -> Result<ReconcileReport, NodeError> {
        let anchor = self.anchor.as_ref().ok_or(NodeError::AnchoringDisabled)?;
        let mut report = ReconcileReport::default();

        for record in self.store.unconfirmed_anchor_infos()? {
            let Some(tx_hash) = record.btc_tx_hash else {
                continue;
            };
            report.checked += 1;

            let status = match anchor.status(&tx_hash) {
                Ok(status) => status,
                Err(e) => {
                    warn!(height = record.db_height, tx = %tx_hash, error = %e, "anchor status unavailable");
                    report.failed += 1;
                    continue;
                }
            };
            if status.confirmations < required {
                debug!(
                    height = record.db_height,
                    confirmations = status.confirmations,
                    required,
                    "anchor not yet confirmed"
                );
                continue;
            }

            let btc_height = status.block_height.unwrap_or(0);
            if self
                .store
                .confirm_anchor(&record.db_hash, status.block_hash_bytes(), btc_height)?
            {
                info!(height = record.db_height, tx = %tx_hash, btc_height, "anchor confirmed");
                report.confirmed += 1;
            }
        }
        Ok(report)
    }

    fn anchor_block(
        &self,
        anchor: &A,
        block: &DirectoryBlock,
        hash: Hash256,
    ) -> Result<DirBlockInfo, NodeError> {
        let height = block.height();
        let record = DirBlockInfo::for_block(block, hash, unix_now());

        let receipt = anchor.anchor(&record.db_merkle_root).map_err(|source| {
            warn!(height, %hash, stage = %source.stage(), error = %source, "anchoring failed");
            NodeError::AnchorFailed {
                height,
                block_hash: hash,
                source,
            }
        })?;

        let record = record.with_tx(receipt.tx_hash());
        self.store.insert_anchor_proof(&record)?;
        info!(height, %hash, txid = %receipt.txid, "directory block anchored");
        Ok(record)
    }
}

impl<K, A> Checkpointer<K, A>
where
    K: KvBackend + 'static,
    A: CommitmentAnchor + 'static,
{
    /// [`anchor_persisted`](Self::anchor_persisted) on the blocking pool,
    /// bounded by `timeout`.
    ///
    /// On timeout the attempt is abandoned, not cancelled: a broadcast that
    /// completes afterwards still records its anchor.
    pub async fn anchor_with_timeout(
        self: Arc<Self>,
        height: u64,
        timeout: Duration,
    ) -> Result<DirBlockInfo, NodeError> {
        let task = tokio::task::spawn_blocking(move || self.anchor_persisted(height));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(NodeError::Join(e.to_string())),
            Err(_) => {
                warn!(height, timeout_secs = timeout.as_secs(), "anchoring timed out");
                Err(NodeError::AnchorTimeout {
                    height,
                    secs: timeout.as_secs(),
                })
            }
        }
    }
}

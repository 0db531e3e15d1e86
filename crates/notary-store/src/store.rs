//! Block store: the key schema, atomic writes, and lookups.
//!
//! Every checkpoint insert stages four entries (block, sequence index, Merkle
//! root index, chain head) into one batch that is written atomically. The
//! directory chain head never moves below the tip. One
//! `RwLock` guards both backend writes and the [`HeightCache`]: writers hold
//! it exclusively from staging through cache update, readers share it.

use std::path::Path;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use notary_core::constants::{height_key, Table, DIRECTORY_CHAIN_ID};
use notary_core::types::sha256;
use notary_core::{Checkpoint, CoreError, DirBlockInfo, DirectoryBlock, Hash256, StoreError};

use crate::backend::{KvBackend, MemoryBackend, WriteBatch};
use crate::cache::HeightCache;
use crate::rocks::RocksBackend;
use crate::scan::{HeightRange, RangeEnd, TableScan};

/// Read a 32-byte hash value stored under `table || suffix`.
pub(crate) fn read_hash<K: KvBackend>(
    backend: &K,
    table: Table,
    suffix: &[u8],
) -> Result<Option<Hash256>, StoreError> {
    match backend.get(&table.key(suffix))? {
        Some(bytes) => Hash256::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Decode(format!("{}: {e}", table.name()))),
        None => Ok(None),
    }
}

fn load_block<B: Checkpoint, K: KvBackend>(backend: &K, hash: &Hash256) -> Result<B, StoreError> {
    let bytes = backend
        .get(&B::TABLES.blocks.key(hash.as_bytes()))?
        .ok_or_else(|| StoreError::NotFound(format!("{} {hash}", B::KIND)))?;
    Ok(B::from_bytes(&bytes)?)
}

fn load_anchor_info<K: KvBackend>(
    backend: &K,
    hash: &Hash256,
) -> Result<Option<DirBlockInfo>, StoreError> {
    match backend.get(&Table::DirBlockInfo.key(hash.as_bytes()))? {
        Some(bytes) => Ok(Some(DirBlockInfo::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Decode every value of `table`. The first undecodable value aborts.
fn decode_table<K: KvBackend, T>(
    backend: &K,
    table: Table,
    decode: impl Fn(&[u8]) -> Result<T, CoreError>,
) -> Result<Vec<T>, StoreError> {
    let (start, end) = table.bounds();
    backend
        .range(&start, &end)
        .map(|item| item.and_then(|(_, value)| Ok(decode(&value)?)))
        .collect()
}

/// Resolve the highest indexed directory block to `(height, hash)`.
///
/// The height index is authoritative. Every value on the way is decoded, and
/// the directory chain head must decode too, so a corrupt tip fails the open
/// instead of looking like an empty chain.
fn load_tip<K: KvBackend>(backend: &K) -> Result<Option<(u64, Hash256)>, StoreError> {
    let table = Table::DirBlockHeight;
    let (start, end) = table.bounds();
    let Some((key, value)) = backend.last(&start, &end)? else {
        return Ok(None);
    };
    let height = key
        .get(1..)
        .and_then(|suffix| <[u8; 8]>::try_from(suffix).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| StoreError::Decode(format!("{}: malformed key", table.name())))?;
    let hash = Hash256::from_slice(&value)
        .map_err(|e| StoreError::Decode(format!("{}: {e}", table.name())))?;
    let block: DirectoryBlock = load_block(backend, &hash)?;
    if block.height() != height {
        return Err(StoreError::Decode(format!(
            "directory block {hash} indexed at height {height} has height {}",
            block.height()
        )));
    }

    let key_mr = block.key_merkle_root();
    match read_hash(backend, Table::ChainHead, DIRECTORY_CHAIN_ID.as_bytes())? {
        Some(head) if head != key_mr => {
            warn!(height, %head, %key_mr, "directory chain head lags the height index")
        }
        _ => {}
    }
    Ok(Some((height, hash)))
}

/// Directory-block and anchor-record persistence over a [`KvBackend`].
pub struct BlockStore<K: KvBackend> {
    backend: K,
    state: RwLock<HeightCache>,
}

impl BlockStore<RocksBackend> {
    /// Open or create a RocksDB-backed store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::new(RocksBackend::open(path)?)?;
        info!(path = %path.display(), "block store opened");
        Ok(store)
    }
}

impl BlockStore<MemoryBackend> {
    /// Empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryBackend::new(),
            state: RwLock::new(HeightCache::default()),
        }
    }
}

impl<K: KvBackend> BlockStore<K> {
    /// Wrap `backend`, seeding the height cache from its highest indexed
    /// directory block. Fails if that tip cannot be read or decoded.
    pub fn new(backend: K) -> Result<Self, StoreError> {
        let tip = load_tip(&backend)?;
        if let Some((height, hash)) = tip {
            debug!(height, %hash, "height cache loaded from height index");
        }
        Ok(Self {
            backend,
            state: RwLock::new(HeightCache::from_tip(tip)),
        })
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    /// Start a write transaction with a fresh batch.
    ///
    /// The transaction holds the exclusive lock until it is dropped; readers
    /// and other writers wait.
    pub fn transaction(&self) -> StoreTxn<'_, K> {
        StoreTxn {
            backend: &self.backend,
            cache: self.state.write(),
            batch: Some(WriteBatch::new()),
            staged_tip: None,
            staged_head: None,
        }
    }

    /// Persist `block` under all four indexes atomically and return its
    /// content hash. Directory blocks also advance the height cache.
    pub fn insert_block<B: Checkpoint>(&self, block: &B) -> Result<Hash256, StoreError> {
        let mut txn = self.transaction();
        let hash = txn.insert_block(block)?;
        txn.commit()?;
        Ok(hash)
    }

    /// Persist an anchor record keyed by its block hash.
    ///
    /// A record without a transaction hash is dropped and `Ok(false)` is
    /// returned; nothing is written.
    pub fn insert_anchor_proof(&self, record: &DirBlockInfo) -> Result<bool, StoreError> {
        let mut txn = self.transaction();
        if !txn.insert_anchor_proof(record)? {
            return Ok(false);
        }
        txn.commit()?;
        Ok(true)
    }

    /// Mark the anchor record of `hash` confirmed. `Ok(false)` if the block
    /// has no anchor record.
    pub fn confirm_anchor(
        &self,
        hash: &Hash256,
        btc_block_hash: Option<Hash256>,
        btc_block_height: u64,
    ) -> Result<bool, StoreError> {
        let mut txn = self.transaction();
        if !txn.confirm_anchor(hash, btc_block_hash, btc_block_height)? {
            return Ok(false);
        }
        txn.commit()?;
        Ok(true)
    }

    // --- Lookups ---

    pub fn block_by_hash<B: Checkpoint>(&self, hash: &Hash256) -> Result<B, StoreError> {
        let _guard = self.state.read();
        load_block(&self.backend, hash)
    }

    /// Block of variant `B` at `height` on `chain_id`.
    pub fn block_at<B: Checkpoint>(&self, chain_id: &Hash256, height: u64) -> Result<B, StoreError> {
        let _guard = self.state.read();
        let sequence = B::sequence_key_at(chain_id, height);
        let hash = read_hash(&self.backend, B::TABLES.by_sequence, &sequence)?
            .ok_or_else(|| StoreError::NotFound(format!("{} {chain_id} at height {height}", B::KIND)))?;
        load_block(&self.backend, &hash)
    }

    pub fn block_by_height(&self, height: u64) -> Result<DirectoryBlock, StoreError> {
        self.block_at(&DIRECTORY_CHAIN_ID, height)
    }

    /// Directory block hash at `height`.
    pub fn hash_by_height(&self, height: u64) -> Result<Hash256, StoreError> {
        let _guard = self.state.read();
        read_hash(&self.backend, Table::DirBlockHeight, &height_key(height))?
            .ok_or_else(|| StoreError::NotFound(format!("directory block at height {height}")))
    }

    pub fn block_by_merkle_root<B: Checkpoint>(&self, root: &Hash256) -> Result<B, StoreError> {
        let _guard = self.state.read();
        let hash = read_hash(&self.backend, B::TABLES.by_merkle_root, root.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("{} with merkle root {root}", B::KIND)))?;
        load_block(&self.backend, &hash)
    }

    /// Latest key Merkle root recorded for `chain_id`.
    pub fn chain_head(&self, chain_id: &Hash256) -> Result<Hash256, StoreError> {
        let _guard = self.state.read();
        read_hash(&self.backend, Table::ChainHead, chain_id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("chain head {chain_id}")))
    }

    /// Anchor record of a directory block. `None` until it is anchored.
    pub fn anchor_info_by_hash(&self, hash: &Hash256) -> Result<Option<DirBlockInfo>, StoreError> {
        let _guard = self.state.read();
        load_anchor_info(&self.backend, hash)
    }

    /// Height of the directory block with content hash `hash`.
    pub fn height_of(&self, hash: &Hash256) -> Result<Option<u64>, StoreError> {
        let _guard = self.state.read();
        match load_block::<DirectoryBlock, K>(&self.backend, hash) {
            Ok(block) => Ok(Some(block.height())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lazy directory block hashes for `[start, end)`.
    pub fn range_by_height(&self, start: u64, end: RangeEnd) -> HeightRange<'_, K> {
        HeightRange::new(&self.backend, self.state.read(), start, end)
    }

    /// Consistent iteration over one table.
    pub fn scan_table(&self, table: Table) -> TableScan<'_> {
        TableScan::new(&self.backend, self.state.read(), table)
    }

    /// Every stored block of variant `B`, in content-hash order. The first
    /// undecodable value aborts the scan.
    pub fn all_blocks<B: Checkpoint>(&self) -> Result<Vec<B>, StoreError> {
        self.scan_table(B::TABLES.blocks)
            .map(|item| item.and_then(|(_, value)| Ok(B::from_bytes(&value)?)))
            .collect()
    }

    /// Every anchor record, in block-hash order.
    pub fn all_anchor_infos(&self) -> Result<Vec<DirBlockInfo>, StoreError> {
        self.scan_table(Table::DirBlockInfo)
            .map(|item| item.and_then(|(_, value)| Ok(DirBlockInfo::from_bytes(&value)?)))
            .collect()
    }

    /// Every directory block and every anchor record, read under one shared
    /// lock: no commit lands between the two tables, so each anchor record's
    /// block is in the returned set.
    pub fn blocks_and_anchors(&self) -> Result<(Vec<DirectoryBlock>, Vec<DirBlockInfo>), StoreError> {
        let _guard = self.state.read();
        let blocks = decode_table(&self.backend, Table::DirBlock, |bytes| {
            DirectoryBlock::from_bytes(bytes)
        })?;
        let anchors = decode_table(&self.backend, Table::DirBlockInfo, |bytes| {
            DirBlockInfo::from_bytes(bytes)
        })?;
        Ok((blocks, anchors))
    }

    /// Anchor records whose confirmation flag is unset.
    pub fn unconfirmed_anchor_infos(&self) -> Result<Vec<DirBlockInfo>, StoreError> {
        let mut unconfirmed = Vec::new();
        for item in self.scan_table(Table::DirBlockInfo) {
            let (_, value) = item?;
            let record = DirBlockInfo::from_bytes(&value)?;
            if !record.btc_confirmed {
                unconfirmed.push(record);
            }
        }
        Ok(unconfirmed)
    }

    // --- Height cache ---

    /// Latest persisted directory block `(height, hash)`.
    pub fn latest_height(&self) -> Option<(u64, Hash256)> {
        self.state.read().latest()
    }

    pub fn set_latest_height(&self, height: u64, hash: Hash256) {
        self.state.write().set_latest(height, hash);
    }

    /// Next height a remote peer announced.
    pub fn next_expected_height(&self) -> u64 {
        self.state.read().next_expected()
    }

    pub fn set_next_expected_height(&self, height: u64) {
        self.state.write().set_next_expected(height);
    }

    /// Height up to which local replay has completed.
    pub fn local_sync_height(&self) -> u64 {
        self.state.read().local_sync()
    }

    pub fn set_local_sync_height(&self, height: u64) {
        self.state.write().set_local_sync(height);
    }
}

/// Exclusive write transaction over a [`BlockStore`].
///
/// Holds the store's write lock and at most one batch. [`commit`](Self::commit)
/// consumes the batch whether or not the write succeeds; staging again needs
/// [`begin`](Self::begin). Dropping an uncommitted transaction discards it.
pub struct StoreTxn<'a, K: KvBackend> {
    backend: &'a K,
    cache: RwLockWriteGuard<'a, HeightCache>,
    batch: Option<WriteBatch>,
    staged_tip: Option<(u64, Hash256)>,
    staged_head: Option<Hash256>,
}

impl<K: KvBackend> StoreTxn<'_, K> {
    /// Open a fresh batch after a previous commit.
    pub fn begin(&mut self) -> Result<(), StoreError> {
        if self.batch.is_some() {
            return Err(StoreError::BatchState("batch already active".into()));
        }
        self.batch = Some(WriteBatch::new());
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.batch.is_some()
    }

    fn batch_mut(&mut self) -> Result<&mut WriteBatch, StoreError> {
        self.batch
            .as_mut()
            .ok_or_else(|| StoreError::BatchState("no active batch".into()))
    }

    /// Highest directory height committed or staged in this transaction.
    fn tip_height(&self) -> Option<u64> {
        let committed = self.cache.latest().map(|(height, _)| height);
        let staged = self.staged_tip.map(|(height, _)| height);
        committed.max(staged)
    }

    /// Chain head value to stage for a directory block below the tip: the
    /// head staged earlier in this transaction, else the stored one.
    fn current_dir_head(&self, fallback: Hash256) -> Result<Hash256, StoreError> {
        if let Some(head) = self.staged_head {
            return Ok(head);
        }
        let stored = read_hash(self.backend, Table::ChainHead, DIRECTORY_CHAIN_ID.as_bytes())?;
        Ok(stored.unwrap_or(fallback))
    }

    /// Stage the four index entries of `block`. Returns its content hash.
    ///
    /// The directory chain head only moves forward: a directory block below
    /// the current tip (a re-insert or an out-of-order commit) stages the
    /// head's current value again.
    pub fn insert_block<B: Checkpoint>(&mut self, block: &B) -> Result<Hash256, StoreError> {
        let bytes = block.to_bytes()?;
        let hash = sha256(&bytes);
        let key_mr = block.key_merkle_root();
        let height = block.height();
        let tables = B::TABLES;
        let moves_head = !B::TRACKS_HEIGHT || self.tip_height().is_none_or(|tip| height >= tip);
        let head = if moves_head {
            key_mr
        } else {
            self.current_dir_head(key_mr)?
        };

        let batch = self.batch_mut()?;
        batch.put(tables.blocks.key(hash.as_bytes()), bytes);
        batch.put(tables.by_sequence.key(&block.sequence_key()), hash.as_bytes().to_vec());
        batch.put(tables.by_merkle_root.key(key_mr.as_bytes()), hash.as_bytes().to_vec());
        batch.put(Table::ChainHead.key(block.chain_id().as_bytes()), head.as_bytes().to_vec());

        if B::TRACKS_HEIGHT && moves_head {
            self.staged_tip = Some((height, hash));
            self.staged_head = Some(key_mr);
        }
        debug!(kind = B::KIND, height, %hash, %key_mr, "staged block");
        Ok(hash)
    }

    /// Stage an anchor record. Records without a transaction hash are
    /// skipped and `Ok(false)` is returned.
    pub fn insert_anchor_proof(&mut self, record: &DirBlockInfo) -> Result<bool, StoreError> {
        if !record.is_recordable() {
            debug!(height = record.db_height, hash = %record.db_hash, "anchor record without transaction skipped");
            return Ok(false);
        }
        let bytes = record.to_bytes()?;
        self.batch_mut()?
            .put(Table::DirBlockInfo.key(record.db_hash.as_bytes()), bytes);
        Ok(true)
    }

    /// Stage the confirmed form of the anchor record of `hash`.
    pub fn confirm_anchor(
        &mut self,
        hash: &Hash256,
        btc_block_hash: Option<Hash256>,
        btc_block_height: u64,
    ) -> Result<bool, StoreError> {
        let Some(mut record) = load_anchor_info(self.backend, hash)? else {
            return Ok(false);
        };
        record.confirm(btc_block_hash, btc_block_height);
        self.insert_anchor_proof(&record)
    }

    /// Write the staged batch atomically and update the height cache.
    ///
    /// Returns the number of entries written. The batch is reset on every
    /// path; on failure nothing is visible and the cache is untouched.
    pub fn commit(&mut self) -> Result<usize, StoreError> {
        let batch = self
            .batch
            .take()
            .ok_or_else(|| StoreError::BatchState("commit without an active batch".into()))?;
        let staged_tip = self.staged_tip.take();
        self.staged_head = None;
        let writes = batch.len();
        if writes == 0 {
            return Ok(0);
        }

        self.backend.write(batch)?;

        if let Some((height, hash)) = staged_tip {
            self.cache.advance(height, hash);
        }
        debug!(writes, "store transaction committed");
        Ok(writes)
    }
}

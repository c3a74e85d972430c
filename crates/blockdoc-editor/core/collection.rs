//! The ordered block collection and its collection-level guard
//!
//! The collection owns every block. One [`ReentrantRwLock`] guards the
//! structure (order and membership) and each block carries its own lock.
//! Structural changes need the collection write lock; content changes need a
//! block write lock under at least a collection read lock, which is what
//! [`HierarchicalGuard`] provides.

use crate::core::block::{Block, BlockKey, BlockType};
use crate::core::errors::{CommandError, EditorError, Result};
use crate::core::hierarchy::HierarchicalGuard;
use crate::core::lock::{LockConfig, LockGuard, LockMode, ReentrantRwLock};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Storage slot of one block: its logical lock and its data
pub(crate) struct BlockCell {
    pub(crate) key: BlockKey,
    pub(crate) lock: Arc<ReentrantRwLock>,
    pub(crate) data: RwLock<Block>,
}

impl BlockCell {
    fn new(block: Block, config: &LockConfig) -> Self {
        let key = block.key();
        Self {
            key,
            lock: Arc::new(ReentrantRwLock::new(format!("block {key}"), config)),
            data: RwLock::new(block),
        }
    }
}

/// Ordered sequence of blocks with two-level locking
pub struct BlockCollection {
    lock: ReentrantRwLock,
    cells: RwLock<Vec<Arc<BlockCell>>>,
    next_key: AtomicU64,
    config: LockConfig,
}

impl BlockCollection {
    /// Create an empty collection with default lock settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    /// Create an empty collection with custom lock settings
    #[must_use]
    pub fn with_config(config: LockConfig) -> Self {
        Self {
            lock: ReentrantRwLock::new("collection", &config),
            cells: RwLock::new(Vec::new()),
            next_key: AtomicU64::new(1),
            config,
        }
    }

    /// Lock settings shared by the collection and its blocks
    #[must_use]
    pub const fn lock_config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the collection-wide lock
    pub fn acquire_collection_lock(&self, mode: LockMode) -> Result<CollectionGuard<'_>> {
        let guard = self.lock.acquire(mode)?;
        Ok(CollectionGuard::new(self, guard))
    }

    /// Non-blocking variant of [`Self::acquire_collection_lock`]
    pub fn try_acquire_collection_lock(
        &self,
        mode: LockMode,
    ) -> Result<Option<CollectionGuard<'_>>> {
        Ok(self
            .lock
            .try_acquire(mode)?
            .map(|guard| CollectionGuard::new(self, guard)))
    }

    /// Acquire the collection lock and then one block's lock
    pub fn acquire_block_lock(
        &self,
        collection_mode: LockMode,
        block_mode: LockMode,
        key: BlockKey,
    ) -> Result<HierarchicalGuard<'_>> {
        HierarchicalGuard::new(self, collection_mode, block_mode, key)
    }

    pub(crate) fn allocate_key(&self) -> BlockKey {
        BlockKey::from_raw(self.next_key.fetch_add(1, Ordering::Relaxed))
    }

    fn cell(&self, key: BlockKey) -> Option<Arc<BlockCell>> {
        self.cells
            .read()
            .iter()
            .find(|cell| cell.key == key)
            .map(Arc::clone)
    }
}

impl Default for BlockCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlockCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCollection")
            .field("blocks", &self.cells.read().len())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

/// Held collection lock with structural and block-level access
#[must_use = "the collection lock is released as soon as the guard is dropped"]
pub struct CollectionGuard<'a> {
    upgraded: Option<LockGuard<'a>>,
    guard: LockGuard<'a>,
    collection: &'a BlockCollection,
}

impl<'a> CollectionGuard<'a> {
    fn new(collection: &'a BlockCollection, guard: LockGuard<'a>) -> Self {
        Self {
            upgraded: None,
            guard,
            collection,
        }
    }

    /// Effective mode, accounting for an upgrade
    #[must_use]
    pub fn mode(&self) -> LockMode {
        if self.upgraded.is_some() {
            LockMode::Write
        } else {
            self.guard.mode()
        }
    }

    /// The collection this guard locks
    #[must_use]
    pub const fn collection(&self) -> &'a BlockCollection {
        self.collection
    }

    /// Move an upgradable guard to write mode
    pub fn upgrade(&mut self) -> Result<()> {
        if self.mode() == LockMode::Write {
            return Ok(());
        }
        self.upgraded = Some(self.collection.lock.acquire(LockMode::Write)?);
        Ok(())
    }

    /// Block keys in document order
    #[must_use]
    pub fn keys(&self) -> Vec<BlockKey> {
        self.collection.cells.read().iter().map(|cell| cell.key).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.cells.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of a block in document order
    #[must_use]
    pub fn index_of(&self, key: BlockKey) -> Option<usize> {
        self.collection
            .cells
            .read()
            .iter()
            .position(|cell| cell.key == key)
    }

    #[must_use]
    pub fn contains(&self, key: BlockKey) -> bool {
        self.index_of(key).is_some()
    }

    /// Read one block
    ///
    /// Under a write guard the block is read directly; otherwise its read lock
    /// is taken for the duration of `f`.
    pub fn with_block<R>(&self, key: BlockKey, f: impl FnOnce(&Block) -> R) -> Result<R> {
        let cell = self.cell(key)?;
        if self.mode() == LockMode::Write {
            return Ok(f(&cell.data.read()));
        }
        let _block_guard = cell.lock.acquire_owned(LockMode::Read)?;
        let result = f(&cell.data.read());
        Ok(result)
    }

    /// Mutate one block; needs collection write mode
    pub fn with_block_mut<R>(
        &mut self,
        key: BlockKey,
        f: impl FnOnce(&mut Block) -> R,
    ) -> Result<R> {
        self.require_write()?;
        let cell = self.cell(key)?;
        let result = f(&mut cell.data.write());
        Ok(result)
    }

    /// Clone every block in document order
    pub fn snapshot(&self) -> Result<Vec<Block>> {
        self.keys()
            .into_iter()
            .map(|key| self.with_block(key, Clone::clone))
            .collect()
    }

    /// Insert a new block at `index`, allocating a fresh key
    pub fn insert_block(
        &mut self,
        index: usize,
        text: impl Into<String>,
        block_type: BlockType,
    ) -> Result<BlockKey> {
        self.require_write()?;
        self.check_index(index)?;
        let key = self.collection.allocate_key();
        self.place(index, Block::new(key, text, block_type));
        Ok(key)
    }

    /// Re-insert a previously removed block under its original key
    pub fn insert_existing(&mut self, index: usize, block: Block) -> Result<()> {
        self.require_write()?;
        if self.contains(block.key()) {
            return Err(CommandError::DuplicateKey { key: block.key() }.into());
        }
        self.check_index(index)?;
        self.place(index, block);
        Ok(())
    }

    /// Remove a block, returning its former index and data
    pub fn remove_block(&mut self, key: BlockKey) -> Result<(usize, Block)> {
        self.require_write()?;
        let mut cells = self.collection.cells.write();
        let index = cells
            .iter()
            .position(|cell| cell.key == key)
            .ok_or(CommandError::BlockNotFound { key })?;
        let cell = cells.remove(index);
        drop(cells);
        let block = cell.data.read().clone();
        Ok((index, block))
    }

    /// Move a block to `to`, returning its former index
    pub fn move_block(&mut self, key: BlockKey, to: usize) -> Result<usize> {
        self.require_write()?;
        let mut cells = self.collection.cells.write();
        let from = cells
            .iter()
            .position(|cell| cell.key == key)
            .ok_or(CommandError::BlockNotFound { key })?;
        if to >= cells.len() {
            return Err(CommandError::IndexOutOfBounds {
                index: to,
                length: cells.len(),
            }
            .into());
        }
        let cell = cells.remove(from);
        cells.insert(to, cell);
        Ok(from)
    }

    pub(crate) fn cell(&self, key: BlockKey) -> Result<Arc<BlockCell>> {
        self.collection
            .cell(key)
            .ok_or_else(|| CommandError::BlockNotFound { key }.into())
    }

    fn require_write(&self) -> Result<()> {
        let held = self.mode();
        if held == LockMode::Write {
            Ok(())
        } else {
            Err(EditorError::LockModeViolation {
                resource: self.guard.resource().to_string(),
                required: LockMode::Write,
                held,
            })
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let length = self.len();
        if index > length {
            return Err(CommandError::IndexOutOfBounds { index, length }.into());
        }
        Ok(())
    }

    fn place(&self, index: usize, block: Block) {
        let cell = Arc::new(BlockCell::new(block, &self.collection.config));
        self.collection.cells.write().insert(index, cell);
    }
}

impl fmt::Debug for CollectionGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionGuard")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(BlockCollection: Send, Sync);

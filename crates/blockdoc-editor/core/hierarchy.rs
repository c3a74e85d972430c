//! Two-level lock guard: collection first, then one block
//!
//! Acquisition always goes collection → block and release always goes block →
//! collection. Every path that touches block data takes its locks through
//! this guard, which is what keeps the two levels deadlock-free.

use crate::core::block::{Block, BlockKey};
use crate::core::collection::{BlockCell, BlockCollection, CollectionGuard};
use crate::core::errors::{EditorError, Result};
use crate::core::lock::{LockMode, OwnedLockGuard};
use std::fmt;
use std::sync::Arc;

/// Collection lock plus one block lock, released in reverse order
///
/// Field order matters: Rust drops fields top to bottom, so the block guards
/// go before the collection guard.
#[must_use = "the locks are released as soon as the guard is dropped"]
pub struct HierarchicalGuard<'a> {
    upgraded: Option<OwnedLockGuard>,
    block: OwnedLockGuard,
    cell: Arc<BlockCell>,
    collection: CollectionGuard<'a>,
}

impl<'a> HierarchicalGuard<'a> {
    /// Acquire `collection_mode` on the collection, then `block_mode` on `key`
    pub fn new(
        collection: &'a BlockCollection,
        collection_mode: LockMode,
        block_mode: LockMode,
        key: BlockKey,
    ) -> Result<Self> {
        let collection = collection.acquire_collection_lock(collection_mode)?;
        let cell = collection.cell(key)?;
        let block = cell.lock.acquire_owned(block_mode)?;
        Ok(Self {
            upgraded: None,
            block,
            cell,
            collection,
        })
    }

    /// Read both levels
    pub fn read(collection: &'a BlockCollection, key: BlockKey) -> Result<Self> {
        Self::new(collection, LockMode::Read, LockMode::Read, key)
    }

    /// Upgradable read on both levels
    pub fn upgradable(collection: &'a BlockCollection, key: BlockKey) -> Result<Self> {
        Self::new(
            collection,
            LockMode::UpgradableRead,
            LockMode::UpgradableRead,
            key,
        )
    }

    /// Write on both levels
    pub fn write(collection: &'a BlockCollection, key: BlockKey) -> Result<Self> {
        Self::new(collection, LockMode::Write, LockMode::Write, key)
    }

    #[must_use]
    pub fn key(&self) -> BlockKey {
        self.cell.key
    }

    #[must_use]
    pub fn collection_mode(&self) -> LockMode {
        self.collection.mode()
    }

    /// Effective block mode, accounting for an upgrade
    #[must_use]
    pub fn block_mode(&self) -> LockMode {
        if self.upgraded.is_some() {
            LockMode::Write
        } else {
            self.block.mode()
        }
    }

    /// The collection-level half of this guard
    #[must_use]
    pub const fn collection(&self) -> &CollectionGuard<'a> {
        &self.collection
    }

    pub(crate) fn collection_mut(&mut self) -> &mut CollectionGuard<'a> {
        &mut self.collection
    }

    /// Move an upgradable block lock to write mode
    pub fn upgrade_block(&mut self) -> Result<()> {
        if self.block_mode() == LockMode::Write {
            return Ok(());
        }
        self.upgraded = Some(self.cell.lock.acquire_owned(LockMode::Write)?);
        Ok(())
    }

    /// Read the block; any mode suffices
    ///
    /// `f` must not re-enter the same block through another guard.
    pub fn with_block<R>(&self, f: impl FnOnce(&Block) -> R) -> R {
        f(&self.cell.data.read())
    }

    /// Mutate the block; needs block write mode
    pub fn with_block_mut<R>(&mut self, f: impl FnOnce(&mut Block) -> R) -> Result<R> {
        let held = self.block_mode();
        if held != LockMode::Write {
            return Err(EditorError::LockModeViolation {
                resource: self.cell.lock.resource().to_string(),
                required: LockMode::Write,
                held,
            });
        }
        Ok(f(&mut self.cell.data.write()))
    }

    /// Clone the block
    #[must_use]
    pub fn snapshot(&self) -> Block {
        self.with_block(Clone::clone)
    }
}

impl fmt::Debug for HierarchicalGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchicalGuard")
            .field("key", &self.cell.key)
            .field("collection_mode", &self.collection_mode())
            .field("block_mode", &self.block_mode())
            .finish()
    }
}

//! Core types and structures for the blockdoc-editor
//!
//! This module contains the fundamental building blocks of the editor:
//! - `Block` and its identity, type, status and tagged spans
//! - `BlockCollection`: ordered blocks behind two-level reentrant locks
//! - `HierarchicalGuard`: collection-then-block lock acquisition
//! - Error types for editor operations
//! - History management for undo/redo

pub mod block;
pub mod collection;
pub mod errors;
pub mod hierarchy;
pub mod history;
pub mod lock;

// Re-export commonly used types
pub use block::{
    Block, BlockContent, BlockKey, BlockStatus, BlockType, Tag, TaggedSpan, ValidationSeverity,
};
pub use collection::{BlockCollection, CollectionGuard};
pub use errors::{CommandError, EditorError, Result};
pub use hierarchy::HierarchicalGuard;
pub use history::{HistoryEntry, HistoryStats, UndoStack, UndoStackConfig};
pub use lock::{
    held_by_current_thread, LockConfig, LockGuard, LockMode, OwnedLockGuard, ReentrantRwLock,
};

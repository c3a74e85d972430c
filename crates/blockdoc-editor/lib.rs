//! Block-structured document model with reversible commands and background
//! analyzers
//!
//! `blockdoc-editor` keeps an ordered collection of text blocks (paragraphs,
//! headings, region links) that is edited interactively while analyzer
//! plugins annotate the same blocks on worker threads.
//!
//! # Features
//!
//! - **Two-level locking**: reentrant read / upgradable-read / write locks on
//!   the collection and on every block, always taken collection first
//! - **Reversible commands**: every mutation returns its exact inverse; undo
//!   and redo restore text, type and spans bit-identically
//! - **Composite commands**: batches apply in order, unwind on failure and
//!   undo in one step
//! - **Deferred execution**: analyzers queue edits that run once their locks
//!   are released
//! - **Analyzer pipeline**: provides/requires dependency ordering, revision
//!   stamps against stale results, a worker pool and editor actions
//!
//! # Example
//!
//! ```
//! use blockdoc_editor::analyzers::builtin::{builtin_analyzers, WordListDictionary};
//! use blockdoc_editor::{BlockEditor, BlockType, EditorConfig, Tag};
//! use std::sync::Arc;
//!
//! let dictionary = Arc::new(WordListDictionary::new(["correct", "hello"]));
//! let editor =
//!     BlockEditor::with_analyzers(EditorConfig::default(), builtin_analyzers(dictionary)).unwrap();
//!
//! let key = editor.append_block("Correc.", BlockType::Text).unwrap();
//! editor.wait_for_block_analyzers().unwrap();
//!
//! let block = editor.block(key).unwrap();
//! let misspelled: Vec<_> = block
//!     .spans()
//!     .iter()
//!     .filter(|span| matches!(span.tag, Tag::Misspelling { .. }))
//!     .collect();
//! assert_eq!(misspelled.len(), 1);
//! assert_eq!((misspelled[0].start, misspelled[0].stop), (0, 6));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod analyzers;
pub mod commands;
pub mod core;
pub mod events;
pub mod supervisor;

// Public API exports
pub use analyzers::{
    ActionImportance, AnalysisContext, AnalyzerInfo, AnalyzerRegistry, AnalyzerStatus,
    BlockAnalyzer, EditorAction,
};
pub use commands::{
    BatchCommand, CommandOutcome, CommandResult, CommandScope, DeleteTextCommand, DocumentAccess,
    EditorCommand, ExpectRevisionCommand, InsertBlockCommand, InsertTextCommand, MoveBlockCommand,
    RemoveBlockCommand, ReplaceTextCommand, RestoreBlockCommand, RestoreContentCommand,
    SetBlockTypeCommand, SetTextCommand,
};
pub use core::{
    held_by_current_thread, Block, BlockCollection, BlockContent, BlockKey, BlockStatus,
    BlockType, CollectionGuard, CommandError, EditorError, HierarchicalGuard, HistoryEntry,
    HistoryStats, LockConfig, LockGuard, LockMode, OwnedLockGuard, ReentrantRwLock, Result, Tag,
    TaggedSpan, UndoStack, UndoStackConfig, ValidationSeverity,
};
pub use events::{
    DocumentEvent, EventChannel, EventChannelConfig, EventFilter, EventHandler, EventStats,
};
pub use supervisor::{
    AnalysisSupervisor, BlockEditor, CommandSupervisor, DeferredSender, EditorConfig,
};

//! Error types for the blockdoc-editor crate
//!
//! Provides the main `EditorError` enum covering lock discipline, command
//! history and analyzer supervision, plus `CommandError` for domain rejections
//! raised by individual commands. Follows the same philosophy throughout:
//! - Use thiserror for structured error handling (no anyhow)
//! - Provide detailed context for debugging
//! - Keep analyzer failures local to one analyzer and one block

use crate::core::block::BlockKey;
use crate::core::lock::LockMode;
use core::fmt;
use thiserror::Error;

/// Domain rejection raised by a command before any mutation became visible
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Target block is not part of the collection
    #[error("Block not found: {key}")]
    BlockNotFound { key: BlockKey },

    /// Char range does not fit the block text
    #[error("Invalid range {start}..{stop} in block {key} (length: {length})")]
    InvalidRange {
        key: BlockKey,
        start: usize,
        stop: usize,
        length: usize,
    },

    /// Structural index outside the collection
    #[error("Index out of bounds: {index} (collection length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    /// Composite command without sub-commands
    #[error("Batch command '{description}' has no sub-commands")]
    EmptyBatch { description: String },

    /// A block with this key is already present
    #[error("Duplicate block key: {key}")]
    DuplicateKey { key: BlockKey },

    /// Command-specific rejection
    #[error("{message}")]
    Rejected { message: String },
}

/// Main error type for blockdoc-editor operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    /// Bounded lock wait expired; treated as a defect, never retried
    #[error("Lock timeout: {mode} on {resource} after {waited_ms}ms")]
    LockTimeout {
        mode: LockMode,
        resource: String,
        waited_ms: u64,
    },

    /// A thread holding only a read lock asked for a stronger mode
    #[error("Lock upgrade forbidden on {resource}: holding {held}, requested {requested}")]
    LockUpgradeForbidden {
        resource: String,
        held: LockMode,
        requested: LockMode,
    },

    /// Data access that the held guard mode does not permit
    #[error("Lock mode violation on {resource}: requires {required}, held {held}")]
    LockModeViolation {
        resource: String,
        required: LockMode,
        held: LockMode,
    },

    /// Command touched a block outside the scope it declared
    #[error("Block {key} is outside the command scope ({scope})")]
    ScopeViolation { key: BlockKey, scope: String },

    /// Blocking wait requested by a thread that still holds document locks
    #[error("Cannot wait for analyzers while holding document locks")]
    LockHeldDuringWait,

    /// Domain rejection from a command
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Command execution failed for a reason outside `CommandError`
    #[error("Command execution failed: {message}")]
    CommandFailed { message: String },

    /// No operation to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// No operation to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Analyzer reported failure or panicked on a block
    #[error("Analyzer '{analyzer}' failed on block {block}: {message}")]
    AnalyzerFailed {
        analyzer: String,
        block: BlockKey,
        message: String,
    },

    /// Analyzer could not be registered
    #[error("Analyzer registration failed: {name}: {message}")]
    AnalyzerRegistration { name: String, message: String },

    /// Event channel error
    #[error("Event channel error: {message}")]
    EventChannelError { message: String },

    /// Analysis worker could not be started
    #[error("Worker spawn failed: {message}")]
    WorkerSpawn { message: String },

    /// Supervisor has been shut down
    #[error("Editor supervisor is shut down")]
    Shutdown,
}

impl EditorError {
    /// Create a new command failed error
    pub fn command_failed<T: fmt::Display>(message: T) -> Self {
        Self::CommandFailed {
            message: message.to_string(),
        }
    }

    /// Create a new analyzer registration error
    pub fn registration<N: Into<String>, T: fmt::Display>(name: N, message: T) -> Self {
        Self::AnalyzerRegistration {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a new event channel error
    pub fn event_channel<T: fmt::Display>(message: T) -> Self {
        Self::EventChannelError {
            message: message.to_string(),
        }
    }

    /// Check if error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Command(..)
            | Self::CommandFailed { .. }
            | Self::NothingToUndo
            | Self::NothingToRedo
            | Self::AnalyzerFailed { .. }
            | Self::AnalyzerRegistration { .. }
            | Self::EventChannelError { .. } => true,
            Self::LockTimeout { .. }
            | Self::LockUpgradeForbidden { .. }
            | Self::LockModeViolation { .. }
            | Self::ScopeViolation { .. }
            | Self::LockHeldDuringWait
            | Self::WorkerSpawn { .. }
            | Self::Shutdown => false,
        }
    }

    /// Check if this error signals a broken locking discipline
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::LockUpgradeForbidden { .. }
                | Self::LockModeViolation { .. }
                | Self::ScopeViolation { .. }
        )
    }

    /// Check if this is a history-related error
    #[must_use]
    pub const fn is_history_error(&self) -> bool {
        matches!(self, Self::NothingToUndo | Self::NothingToRedo)
    }

    /// Get the underlying command error if this wraps one
    #[must_use]
    pub const fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            Self::Command(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for editor operations
pub type Result<T> = core::result::Result<T, EditorError>;

//! History management for undo/redo operations
//!
//! Every entry owns the command that reverses (or re-applies) one executed
//! command. Undo runs the entry's action and stores whatever that action
//! returns as its own inverse on the redo side, and vice versa, so block keys
//! stay stable across any number of undo/redo cycles.

use crate::commands::{CommandScope, EditorCommand};
use std::collections::VecDeque;
use std::time::Instant;

/// A single entry in the undo/redo history
#[derive(Debug)]
pub struct HistoryEntry {
    /// Stack-unique identifier
    pub id: u64,

    /// Command that moves the document to the other side of this entry
    pub action: Box<dyn EditorCommand>,

    /// Description of the original command
    pub description: String,

    /// Timestamp when the entry was recorded
    pub timestamp: Instant,

    /// Memory usage of this entry (for capacity management)
    pub memory_usage: usize,
}

impl HistoryEntry {
    /// Create an entry; the stack assigns the id on push
    pub fn new(action: Box<dyn EditorCommand>, description: impl Into<String>) -> Self {
        let description = description.into();
        let memory_usage =
            core::mem::size_of::<Self>() + action.memory_usage() + description.len();
        Self {
            id: 0,
            action,
            description,
            timestamp: Instant::now(),
            memory_usage,
        }
    }

    /// Replace the action after it has been executed
    #[must_use]
    pub fn with_action(self, action: Box<dyn EditorCommand>) -> Self {
        let mut entry = Self::new(action, self.description);
        entry.id = self.id;
        entry
    }

    /// Lock scope the action needs
    #[must_use]
    pub fn scope(&self) -> CommandScope {
        self.action.scope()
    }
}

/// Configuration for undo stack behavior
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UndoStackConfig {
    /// Maximum number of undo entries to keep (0 = unlimited)
    pub max_entries: usize,

    /// Maximum memory usage in bytes (0 = unlimited)
    pub max_memory: usize,
}

impl UndoStackConfig {
    /// Cap the number of undo entries
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Cap the memory held by history entries
    #[must_use]
    pub const fn with_max_memory(mut self, max_memory: usize) -> Self {
        self.max_memory = max_memory;
        self
    }
}

/// Undo/redo stacks with optional count and memory limits
#[derive(Debug)]
pub struct UndoStack {
    /// Configuration for this stack
    config: UndoStackConfig,

    /// Undo history (most recent operations first)
    undo_stack: VecDeque<HistoryEntry>,

    /// Redo history (operations that can be redone)
    redo_stack: VecDeque<HistoryEntry>,

    /// Current memory usage in bytes
    current_memory: usize,

    next_id: u64,
}

impl UndoStack {
    /// Create a new undo stack with default (unbounded) configuration
    pub fn new() -> Self {
        Self::with_config(UndoStackConfig::default())
    }

    /// Create a new undo stack with custom configuration
    pub fn with_config(config: UndoStackConfig) -> Self {
        Self {
            config,
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            current_memory: 0,
            next_id: 1,
        }
    }

    /// Record a freshly executed command
    ///
    /// This clears the redo stack as new operations invalidate
    /// previously undone operations.
    pub fn push(&mut self, entry: HistoryEntry) -> u64 {
        self.clear_redo_stack();
        let id = self.next_id;
        self.next_id += 1;
        self.push_undo(HistoryEntry { id, ..entry });
        id
    }

    /// Push onto the undo stack without touching redo (used by redo)
    pub fn push_undo(&mut self, entry: HistoryEntry) {
        self.current_memory += entry.memory_usage;
        self.undo_stack.push_front(entry);
        self.enforce_limits();
    }

    /// Most recent undo entry
    #[must_use]
    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.undo_stack.front()
    }

    /// Pop the most recent entry from the undo stack
    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        let entry = self.undo_stack.pop_front()?;
        self.current_memory -= entry.memory_usage;
        Some(entry)
    }

    /// Push an entry onto the redo stack
    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.current_memory += entry.memory_usage;
        self.redo_stack.push_front(entry);
    }

    /// Most recent redo entry
    #[must_use]
    pub fn peek_redo(&self) -> Option<&HistoryEntry> {
        self.redo_stack.front()
    }

    /// Pop an entry from the redo stack
    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        let entry = self.redo_stack.pop_front()?;
        self.current_memory -= entry.memory_usage;
        Some(entry)
    }

    /// Check if undo is available
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the number of undo entries available
    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the number of redo entries available
    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Get current memory usage in bytes
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get description of the next undo operation
    #[must_use]
    pub fn next_undo_description(&self) -> Option<&str> {
        self.undo_stack
            .front()
            .map(|entry| entry.description.as_str())
    }

    /// Get description of the next redo operation
    #[must_use]
    pub fn next_redo_description(&self) -> Option<&str> {
        self.redo_stack
            .front()
            .map(|entry| entry.description.as_str())
    }

    /// Snapshot of stack sizes
    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_count(),
            redo_count: self.redo_count(),
            memory_usage: self.memory_usage(),
        }
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_memory = 0;
    }

    /// Clear only the redo stack (called when new operations are performed)
    fn clear_redo_stack(&mut self) {
        for entry in self.redo_stack.drain(..) {
            self.current_memory -= entry.memory_usage;
        }
    }

    /// Enforce memory and count limits
    fn enforce_limits(&mut self) {
        while self.config.max_entries > 0 && self.undo_stack.len() > self.config.max_entries {
            if let Some(entry) = self.undo_stack.pop_back() {
                self.current_memory -= entry.memory_usage;
            }
        }

        while self.config.max_memory > 0
            && self.current_memory > self.config.max_memory
            && self.undo_stack.len() > 1
        {
            if let Some(entry) = self.undo_stack.pop_back() {
                self.current_memory -= entry.memory_usage;
            }
        }
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about history usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    /// Number of operations that can be undone
    pub undo_count: usize,
    /// Number of operations that can be redone
    pub redo_count: usize,
    /// Current memory usage in bytes
    pub memory_usage: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SetTextCommand;
    use crate::core::block::BlockKey;

    fn entry(text: &str) -> HistoryEntry {
        let action = SetTextCommand::new(BlockKey::from_raw(1), text);
        HistoryEntry::new(Box::new(action), format!("Set {text}"))
    }

    #[test]
    fn undo_stack_basic_operations() {
        let mut stack = UndoStack::new();
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());

        let id = stack.push(entry("a"));
        assert!(stack.can_undo());
        assert_eq!(stack.peek_undo().map(|e| e.id), Some(id));
        assert_eq!(stack.next_undo_description(), Some("Set a"));

        let popped = stack.pop_undo().unwrap();
        stack.push_redo(popped);
        assert!(!stack.can_undo());
        assert!(stack.can_redo());
        assert_eq!(stack.next_redo_description(), Some("Set a"));
    }

    #[test]
    fn push_clears_redo() {
        let mut stack = UndoStack::new();
        stack.push(entry("a"));
        let popped = stack.pop_undo().unwrap();
        stack.push_redo(popped);

        stack.push_undo(entry("b"));
        assert_eq!(stack.redo_count(), 1);

        stack.push(entry("c"));
        assert_eq!(stack.redo_count(), 0);
    }

    #[test]
    fn unbounded_by_default() {
        let mut stack = UndoStack::new();
        for i in 0..500 {
            stack.push(entry(&i.to_string()));
        }
        assert_eq!(stack.undo_count(), 500);
    }

    #[test]
    fn entry_limit_drops_oldest() {
        let mut stack = UndoStack::with_config(UndoStackConfig::default().with_max_entries(2));
        for text in ["a", "b", "c"] {
            stack.push(entry(text));
        }
        assert_eq!(stack.undo_count(), 2);
        assert_eq!(stack.next_undo_description(), Some("Set c"));
        stack.pop_undo();
        assert_eq!(stack.next_undo_description(), Some("Set b"));
    }

    #[test]
    fn memory_limit_keeps_latest() {
        let mut stack = UndoStack::with_config(UndoStackConfig::default().with_max_memory(1));
        stack.push(entry("a"));
        stack.push(entry("b"));
        assert_eq!(stack.undo_count(), 1);
        assert_eq!(stack.memory_usage(), stack.peek_undo().unwrap().memory_usage);
    }

    #[test]
    fn ids_survive_action_swap() {
        let mut stack = UndoStack::new();
        let id = stack.push(entry("a"));
        let popped = stack.pop_undo().unwrap();
        let swapped = popped.with_action(Box::new(SetTextCommand::new(BlockKey::from_raw(1), "z")));
        assert_eq!(swapped.id, id);
        assert_eq!(swapped.description, "Set a");
    }

    #[test]
    fn history_stats() {
        let mut stack = UndoStack::new();
        assert_eq!(
            stack.stats(),
            HistoryStats {
                undo_count: 0,
                redo_count: 0,
                memory_usage: 0
            }
        );
        stack.push(entry("a"));
        stack.clear();
        assert_eq!(stack.stats().memory_usage, 0);
    }
}

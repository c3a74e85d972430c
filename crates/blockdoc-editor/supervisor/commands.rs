//! Command supervisor: executes commands, keeps undo/redo history and drains
//! the deferred queue
//!
//! Lock order is fixed: deferred drain lock, then the command's document scope,
//! then the history mutex. The history mutex is held while a command runs so
//! history order always matches execution order; it is never held while
//! waiting for a document lock.

use super::analysis::DirtyQueue;
use crate::commands::{CommandResult, CommandScope, DocumentAccess, EditorCommand};
use crate::core::lock::held_by_current_thread;
use crate::core::{
    BlockCollection, EditorError, HistoryEntry, HistoryStats, Result, UndoStack, UndoStackConfig,
};
use crate::events::{DocumentEvent, EventChannel};
use parking_lot::{Mutex, ReentrantMutex};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, trace, warn};

type Deferred = Box<dyn EditorCommand>;

/// Handle for queueing commands to run after the current lock scope closes
///
/// Cheap to clone; analyzers receive one through their analysis context.
#[derive(Clone)]
pub struct DeferredSender {
    tx: Sender<Deferred>,
    pending: Arc<AtomicUsize>,
}

impl DeferredSender {
    /// Queue a command; never blocks
    pub fn defer(&self, command: impl EditorCommand + 'static) -> Result<()> {
        self.defer_boxed(Box::new(command))
    }

    /// Queue a boxed command; never blocks
    pub fn defer_boxed(&self, command: Deferred) -> Result<()> {
        trace!(command = command.description(), "command deferred");
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(command).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(EditorError::Shutdown);
        }
        Ok(())
    }

    /// Commands queued and not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for DeferredSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredSender")
            .field("pending", &self.pending())
            .finish()
    }
}

/// FIFO of deferred commands
///
/// The receiver lives behind a reentrant mutex that doubles as the drain lock:
/// one drain at a time keeps submission order, and a drain reached again on
/// the same thread (from an event handler, say) continues the same queue.
pub(crate) struct DeferredQueue {
    sender: DeferredSender,
    receiver: ReentrantMutex<Receiver<Deferred>>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            sender: DeferredSender {
                tx,
                pending: Arc::new(AtomicUsize::new(0)),
            },
            receiver: ReentrantMutex::new(rx),
        }
    }

    pub(crate) fn sender(&self) -> DeferredSender {
        self.sender.clone()
    }

    pub(crate) fn pending(&self) -> usize {
        self.sender.pending()
    }

    /// Take the next command without running it
    #[cfg(test)]
    pub(crate) fn try_take(&self) -> Option<Deferred> {
        let command = self.receiver.lock().try_recv().ok()?;
        self.sender.pending.fetch_sub(1, Ordering::SeqCst);
        Some(command)
    }
}

#[derive(Clone, Copy)]
enum HistorySide {
    Undo,
    Redo,
}

/// Owner of every document mutation
pub struct CommandSupervisor {
    collection: Arc<BlockCollection>,
    history: Mutex<UndoStack>,
    deferred: DeferredQueue,
    dirty: Arc<DirtyQueue>,
    events: Arc<EventChannel>,
}

impl CommandSupervisor {
    /// Standalone supervisor without an analysis pipeline
    pub fn new(collection: Arc<BlockCollection>, config: UndoStackConfig) -> Self {
        Self::with_parts(
            collection,
            config,
            Arc::new(DirtyQueue::new()),
            Arc::new(EventChannel::new()),
        )
    }

    pub(crate) fn with_parts(
        collection: Arc<BlockCollection>,
        config: UndoStackConfig,
        dirty: Arc<DirtyQueue>,
        events: Arc<EventChannel>,
    ) -> Self {
        Self {
            collection,
            history: Mutex::new(UndoStack::with_config(config)),
            deferred: DeferredQueue::new(),
            dirty,
            events,
        }
    }

    pub fn collection(&self) -> &Arc<BlockCollection> {
        &self.collection
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }

    /// Execute a command and record its inverse
    ///
    /// Clears the redo stack on success. On failure neither stack changes and
    /// no partial mutation stays visible.
    pub fn execute(&self, command: impl EditorCommand + 'static) -> Result<CommandResult> {
        self.execute_boxed(Box::new(command))
    }

    /// Execute a boxed command
    pub fn execute_boxed(&self, command: Box<dyn EditorCommand>) -> Result<CommandResult> {
        let result = self.execute_inner(command, false);
        self.drain_deferred();
        result
    }

    /// Queue a command to run once no lock scope is open
    pub fn defer(&self, command: impl EditorCommand + 'static) -> Result<()> {
        self.deferred.sender.defer(command)
    }

    /// Sender for the deferred queue
    pub fn deferred_sender(&self) -> DeferredSender {
        self.deferred.sender()
    }

    /// Deferred commands not yet finished
    pub fn deferred_pending(&self) -> usize {
        self.deferred.pending()
    }

    /// Run queued deferred commands in submission order
    ///
    /// Does nothing on a thread that holds a document lock; the commands run
    /// on the next drain from a lock-free thread. Returns the number of
    /// commands run.
    pub fn drain_deferred(&self) -> usize {
        if held_by_current_thread() {
            trace!("deferred drain skipped: caller holds document locks");
            return 0;
        }

        let receiver = self.deferred.receiver.lock();
        let mut executed = 0;
        while let Ok(command) = receiver.try_recv() {
            let description = command.description().to_string();
            if let Err(err) = self.execute_inner(command, true) {
                warn!(command = %description, error = %err, "deferred command failed");
            }
            self.deferred.sender.pending.fetch_sub(1, Ordering::SeqCst);
            executed += 1;
        }

        if executed > 0 {
            trace!(executed, "deferred queue drained");
        }
        executed
    }

    /// Revert the most recent command
    pub fn undo(&self) -> Result<CommandResult> {
        let result = self.step(HistorySide::Undo);
        self.drain_deferred();
        result
    }

    /// Re-apply the most recently undone command
    pub fn redo(&self) -> Result<CommandResult> {
        let result = self.step(HistorySide::Redo);
        self.drain_deferred();
        result
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo()
    }

    pub fn next_undo_description(&self) -> Option<String> {
        self.history
            .lock()
            .next_undo_description()
            .map(str::to_string)
    }

    pub fn next_redo_description(&self) -> Option<String> {
        self.history
            .lock()
            .next_redo_description()
            .map(str::to_string)
    }

    pub fn history_stats(&self) -> HistoryStats {
        self.history.lock().stats()
    }

    /// Drop all undo and redo entries
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    fn execute_inner(&self, command: Box<dyn EditorCommand>, deferred: bool) -> Result<CommandResult> {
        let description = command.description().to_string();
        let result = self.run_recorded(command.as_ref(), &description);

        match &result {
            Ok(result) => {
                debug!(
                    command = %description,
                    blocks = ?result.touched,
                    deferred,
                    "command executed"
                );
                self.events.dispatch(DocumentEvent::CommandExecuted {
                    description,
                    blocks: result.touched.clone(),
                    deferred,
                });
            }
            Err(err) => {
                debug!(command = %description, error = %err, deferred, "command rejected");
                self.events.dispatch(DocumentEvent::CommandFailed {
                    description,
                    message: err.to_string(),
                });
            }
        }
        result
    }

    fn run_recorded(&self, command: &dyn EditorCommand, description: &str) -> Result<CommandResult> {
        let mut access = DocumentAccess::acquire(&self.collection, command.scope())?;
        let mut history = self.history.lock();

        let outcome = command.execute(&mut access);
        let touched = access.touched().to_vec();
        self.dirty.mark_all(&touched);
        let outcome = outcome?;

        history.push(HistoryEntry::new(outcome.inverse, description));
        Ok(CommandResult {
            description: description.to_string(),
            touched,
            content_changed: outcome.content_changed,
            message: outcome.message,
        })
    }

    fn step(&self, side: HistorySide) -> Result<CommandResult> {
        let (description, result) = loop {
            let (id, scope) = self.peek(side)?;

            // The top entry can change while this thread waits for its scope.
            let mut access = DocumentAccess::acquire(&self.collection, scope)?;
            let mut history = self.history.lock();
            if Self::top(&history, side).map(|entry| (entry.id, entry.scope())) != Some((id, scope))
            {
                continue;
            }
            let Some(entry) = Self::pop(&mut history, side) else {
                continue;
            };

            let outcome = entry.action.execute(&mut access);
            let touched = access.touched().to_vec();
            self.dirty.mark_all(&touched);

            match outcome {
                Ok(outcome) => {
                    let result = CommandResult {
                        description: entry.description.clone(),
                        touched,
                        content_changed: outcome.content_changed,
                        message: outcome.message,
                    };
                    let entry = entry.with_action(outcome.inverse);
                    let description = entry.description.clone();
                    match side {
                        HistorySide::Undo => history.push_redo(entry),
                        HistorySide::Redo => history.push_undo(entry),
                    }
                    break (description, result);
                }
                Err(err) => {
                    warn!(
                        command = %entry.description,
                        error = %err,
                        "history entry could not be applied"
                    );
                    match side {
                        HistorySide::Undo => history.push_undo(entry),
                        HistorySide::Redo => history.push_redo(entry),
                    }
                    return Err(err);
                }
            }
        };

        let blocks = result.touched.clone();
        match side {
            HistorySide::Undo => {
                debug!(command = %description, blocks = ?blocks, "undo performed");
                self.events
                    .dispatch(DocumentEvent::UndoPerformed { description, blocks });
            }
            HistorySide::Redo => {
                debug!(command = %description, blocks = ?blocks, "redo performed");
                self.events
                    .dispatch(DocumentEvent::RedoPerformed { description, blocks });
            }
        }
        Ok(result)
    }

    fn peek(&self, side: HistorySide) -> Result<(u64, CommandScope)> {
        let history = self.history.lock();
        Self::top(&history, side)
            .map(|entry| (entry.id, entry.scope()))
            .ok_or(match side {
                HistorySide::Undo => EditorError::NothingToUndo,
                HistorySide::Redo => EditorError::NothingToRedo,
            })
    }

    fn top(history: &UndoStack, side: HistorySide) -> Option<&HistoryEntry> {
        match side {
            HistorySide::Undo => history.peek_undo(),
            HistorySide::Redo => history.peek_redo(),
        }
    }

    fn pop(history: &mut UndoStack, side: HistorySide) -> Option<HistoryEntry> {
        match side {
            HistorySide::Undo => history.pop_undo(),
            HistorySide::Redo => history.pop_redo(),
        }
    }
}

impl fmt::Debug for CommandSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSupervisor")
            .field("history", &self.history_stats())
            .field("deferred_pending", &self.deferred_pending())
            .finish_non_exhaustive()
    }
}

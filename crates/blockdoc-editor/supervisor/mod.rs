//! Supervisors and the editor facade
//!
//! [`BlockEditor`] wires a [`BlockCollection`], a [`CommandSupervisor`] and an
//! [`AnalysisSupervisor`] around one shared [`EventChannel`]. Dropping the
//! editor stops the analysis workers.

pub mod analysis;
pub mod commands;

pub use analysis::AnalysisSupervisor;
pub use commands::{CommandSupervisor, DeferredSender};

pub(crate) use analysis::DirtyQueue;
#[cfg(test)]
pub(crate) use commands::DeferredQueue;

use crate::analyzers::{BlockAnalyzer, EditorAction};
use crate::commands::{CommandResult, EditorCommand, InsertBlockCommand};
use crate::core::{
    Block, BlockCollection, BlockKey, BlockType, HierarchicalGuard, LockConfig, LockMode, Result,
    TaggedSpan, UndoStackConfig,
};
use crate::events::{EventChannel, EventChannelConfig};
use std::sync::Arc;
use std::time::Duration;

/// Editor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// Analysis worker threads (at least one runs)
    pub worker_count: usize,
    pub lock: LockConfig,
    pub undo: UndoStackConfig,
    pub events: EventChannelConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            lock: LockConfig::default(),
            undo: UndoStackConfig::default(),
            events: EventChannelConfig::default(),
        }
    }
}

impl EditorConfig {
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock = self.lock.with_timeout(timeout);
        self
    }

    #[must_use]
    pub fn with_undo(mut self, undo: UndoStackConfig) -> Self {
        self.undo = undo;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventChannelConfig) -> Self {
        self.events = events;
        self
    }
}

/// Document, command history and analysis pipeline in one handle
///
/// # Examples
///
/// ```
/// use blockdoc_editor::{BlockEditor, BlockType, EditorConfig, InsertTextCommand};
///
/// let editor = BlockEditor::new(EditorConfig::default()).unwrap();
/// let key = editor.append_block("Hello", BlockType::Text).unwrap();
/// editor.execute(InsertTextCommand::new(key, 5, " world")).unwrap();
/// editor.wait_for_block_analyzers().unwrap();
/// assert_eq!(editor.block(key).unwrap().text(), "Hello world");
///
/// editor.undo().unwrap();
/// assert_eq!(editor.block(key).unwrap().text(), "Hello");
/// ```
#[derive(Debug)]
pub struct BlockEditor {
    // Declared first so the workers stop before the rest is dropped.
    analysis: AnalysisSupervisor,
    commands: Arc<CommandSupervisor>,
    collection: Arc<BlockCollection>,
    events: Arc<EventChannel>,
}

impl BlockEditor {
    /// Create an editor with no analyzers
    pub fn new(config: EditorConfig) -> Result<Self> {
        let collection = Arc::new(BlockCollection::with_config(config.lock.clone()));
        let events = Arc::new(EventChannel::with_config(config.events.clone()));
        let dirty = Arc::new(DirtyQueue::new());
        let commands = Arc::new(CommandSupervisor::with_parts(
            Arc::clone(&collection),
            config.undo.clone(),
            Arc::clone(&dirty),
            Arc::clone(&events),
        ));
        let analysis = AnalysisSupervisor::start(
            Arc::clone(&collection),
            Arc::clone(&commands),
            dirty,
            Arc::clone(&events),
            config.worker_count,
        )?;

        Ok(Self {
            analysis,
            commands,
            collection,
            events,
        })
    }

    /// Create an editor and register `analyzers` in order
    pub fn with_analyzers(
        config: EditorConfig,
        analyzers: impl IntoIterator<Item = Arc<dyn BlockAnalyzer>>,
    ) -> Result<Self> {
        let editor = Self::new(config)?;
        for analyzer in analyzers {
            editor.register_analyzer(analyzer)?;
        }
        Ok(editor)
    }

    pub fn register_analyzer(&self, analyzer: Arc<dyn BlockAnalyzer>) -> Result<()> {
        self.analysis.register(analyzer)
    }

    /// Execute a command through the supervisor
    pub fn execute(&self, command: impl EditorCommand + 'static) -> Result<CommandResult> {
        self.commands.execute(command)
    }

    pub fn undo(&self) -> Result<CommandResult> {
        self.commands.undo()
    }

    pub fn redo(&self) -> Result<CommandResult> {
        self.commands.redo()
    }

    /// Queue a command to run once no lock scope is open
    pub fn defer(&self, command: impl EditorCommand + 'static) -> Result<()> {
        self.commands.defer(command)
    }

    /// See [`AnalysisSupervisor::wait_for_block_analyzers`]
    pub fn wait_for_block_analyzers(&self) -> Result<()> {
        self.analysis.wait_for_block_analyzers()
    }

    /// Bounded wait; `Ok(false)` on timeout
    pub fn wait_for_block_analyzers_timeout(&self, timeout: Duration) -> Result<bool> {
        self.analysis.wait_for_block_analyzers_timeout(timeout)
    }

    pub fn editor_actions(&self, key: BlockKey, span: &TaggedSpan) -> Result<Vec<EditorAction>> {
        self.analysis.editor_actions(key, span)
    }

    /// Append a block through the command path (undoable, queued for analysis)
    pub fn append_block(&self, text: impl Into<String>, block_type: BlockType) -> Result<BlockKey> {
        let result = self.execute(InsertBlockCommand::append(text, block_type))?;
        result.touched.first().copied().ok_or_else(|| {
            crate::core::EditorError::command_failed("block insertion reported no key")
        })
    }

    /// Snapshot of one block
    pub fn block(&self, key: BlockKey) -> Result<Block> {
        Ok(HierarchicalGuard::read(&self.collection, key)?.snapshot())
    }

    /// Snapshot of every block in document order
    pub fn blocks(&self) -> Result<Vec<Block>> {
        self.collection
            .acquire_collection_lock(LockMode::Read)?
            .snapshot()
    }

    pub fn collection(&self) -> &Arc<BlockCollection> {
        &self.collection
    }

    pub fn commands(&self) -> &Arc<CommandSupervisor> {
        &self.commands
    }

    pub fn analysis(&self) -> &AnalysisSupervisor {
        &self.analysis
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }
}

static_assertions::assert_impl_all!(BlockEditor: Send, Sync);
static_assertions::assert_impl_all!(CommandSupervisor: Send, Sync);

//! Command system for document mutations
//!
//! Every change to the document is a command. A command declares the lock
//! scope it needs, mutates blocks through a [`DocumentAccess`] holding that
//! scope, and returns its exact inverse so history can undo it. Commands name
//! their targets by [`BlockKey`], never by reference.

pub mod block_commands;
pub mod text_commands;

use crate::core::{
    Block, BlockCollection, BlockContent, BlockKey, CollectionGuard, CommandError, EditorError,
    HierarchicalGuard, LockMode, Result,
};
use core::fmt;
use tracing::error;

pub use block_commands::*;
pub use text_commands::*;

/// Lock scope a command runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandScope {
    /// Collection read plus write on one block
    Block(BlockKey),
    /// Collection write
    Structure,
}

impl CommandScope {
    /// Smallest scope covering both
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Block(a), Self::Block(b)) if a == b => Self::Block(a),
            _ => Self::Structure,
        }
    }

    /// Target block of a block scope
    #[must_use]
    pub const fn block_key(&self) -> Option<BlockKey> {
        match self {
            Self::Block(key) => Some(*key),
            Self::Structure => None,
        }
    }
}

impl fmt::Display for CommandScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(key) => write!(f, "block {key}"),
            Self::Structure => f.write_str("structure"),
        }
    }
}

enum AccessGuard<'a> {
    Block(HierarchicalGuard<'a>),
    Structure(CollectionGuard<'a>),
}

/// Locked view of the document handed to [`EditorCommand::execute`]
///
/// Records every block it hands out for mutation so the supervisor can mark
/// exactly those blocks dirty, whether the command succeeded or not.
pub struct DocumentAccess<'a> {
    guard: AccessGuard<'a>,
    scope: CommandScope,
    touched: Vec<BlockKey>,
}

impl<'a> DocumentAccess<'a> {
    /// Acquire the locks `scope` requires
    pub fn acquire(collection: &'a BlockCollection, scope: CommandScope) -> Result<Self> {
        let guard = match scope {
            CommandScope::Block(key) => AccessGuard::Block(collection.acquire_block_lock(
                LockMode::Read,
                LockMode::Write,
                key,
            )?),
            CommandScope::Structure => {
                AccessGuard::Structure(collection.acquire_collection_lock(LockMode::Write)?)
            }
        };
        Ok(Self {
            guard,
            scope,
            touched: Vec::new(),
        })
    }

    #[must_use]
    pub const fn scope(&self) -> CommandScope {
        self.scope
    }

    /// Blocks handed out for mutation, in first-touch order
    #[must_use]
    pub fn touched(&self) -> &[BlockKey] {
        &self.touched
    }

    /// Record a block changed through the structure guard
    pub fn mark_touched(&mut self, key: BlockKey) {
        if !self.touched.contains(&key) {
            self.touched.push(key);
        }
    }

    /// Read a block inside the scope
    pub fn with_block<R>(&self, key: BlockKey, f: impl FnOnce(&Block) -> R) -> Result<R> {
        match &self.guard {
            AccessGuard::Block(guard) if guard.key() == key => Ok(guard.with_block(f)),
            AccessGuard::Block(_) => Err(self.out_of_scope(key)),
            AccessGuard::Structure(guard) => guard.with_block(key, f),
        }
    }

    /// Mutate a block inside the scope
    pub fn with_block_mut<R>(
        &mut self,
        key: BlockKey,
        f: impl FnOnce(&mut Block) -> R,
    ) -> Result<R> {
        let scope = self.scope;
        let result = match &mut self.guard {
            AccessGuard::Block(guard) if guard.key() == key => guard.with_block_mut(f)?,
            AccessGuard::Block(_) => {
                return Err(EditorError::ScopeViolation {
                    key,
                    scope: scope.to_string(),
                })
            }
            AccessGuard::Structure(guard) => guard.with_block_mut(key, f)?,
        };
        self.mark_touched(key);
        Ok(result)
    }

    /// Structural access; only under [`CommandScope::Structure`]
    pub fn structure_mut(&mut self) -> Result<&mut CollectionGuard<'a>> {
        match &mut self.guard {
            AccessGuard::Structure(guard) => Ok(guard),
            AccessGuard::Block(guard) => Err(EditorError::LockModeViolation {
                resource: "collection".to_string(),
                required: LockMode::Write,
                held: guard.collection_mode(),
            }),
        }
    }

    fn out_of_scope(&self, key: BlockKey) -> EditorError {
        EditorError::ScopeViolation {
            key,
            scope: self.scope.to_string(),
        }
    }
}

impl fmt::Debug for DocumentAccess<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentAccess")
            .field("scope", &self.scope)
            .field("touched", &self.touched)
            .finish_non_exhaustive()
    }
}

/// What a successful Do produced
#[derive(Debug)]
pub struct CommandOutcome {
    /// Command restoring the state before this execution
    pub inverse: Box<dyn EditorCommand>,

    /// Whether block text or type changed
    pub content_changed: bool,

    /// Optional message about the operation
    pub message: Option<String>,
}

impl CommandOutcome {
    /// Content-changing outcome with the given inverse
    pub fn new(inverse: Box<dyn EditorCommand>) -> Self {
        Self {
            inverse,
            content_changed: true,
            message: None,
        }
    }

    /// Outcome that did not touch block content (e.g. a move)
    pub fn unchanged(inverse: Box<dyn EditorCommand>) -> Self {
        Self {
            content_changed: false,
            ..Self::new(inverse)
        }
    }

    /// Add a message to the outcome
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of executing a command through the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Description of the executed command
    pub description: String,

    /// Blocks whose content the command changed
    pub touched: Vec<BlockKey>,

    /// Whether block content was changed
    pub content_changed: bool,

    /// Optional message about the operation
    pub message: Option<String>,
}

/// Reversible unit of mutation
///
/// # Examples
///
/// ```
/// use blockdoc_editor::{
///     BlockKey, CommandOutcome, CommandScope, DocumentAccess, EditorCommand, Result,
///     SetTextCommand,
/// };
///
/// #[derive(Debug)]
/// struct Uppercase {
///     key: BlockKey,
/// }
///
/// impl EditorCommand for Uppercase {
///     fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
///         let upper = access.with_block(self.key, |block| block.text().to_uppercase())?;
///         SetTextCommand::new(self.key, upper).execute(access)
///     }
///
///     fn scope(&self) -> CommandScope {
///         CommandScope::Block(self.key)
///     }
///
///     fn description(&self) -> &str {
///         "Uppercase block"
///     }
/// }
/// ```
pub trait EditorCommand: core::fmt::Debug + Send + Sync {
    /// Apply the change and return its inverse
    ///
    /// On error no partial mutation may remain visible.
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome>;

    /// Lock scope the command needs
    fn scope(&self) -> CommandScope;

    /// Get a human-readable description of the command
    fn description(&self) -> &str;

    /// Check if this command modifies document content
    fn modifies_content(&self) -> bool {
        true
    }

    /// Get the estimated memory usage of this command
    ///
    /// Used for memory management in undo stacks with limited capacity.
    fn memory_usage(&self) -> usize {
        64 // Conservative default estimate for command overhead
    }
}

/// Restores text, type and spans of one block exactly
///
/// The inverse of every content command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreContentCommand {
    pub key: BlockKey,
    pub content: BlockContent,
}

impl RestoreContentCommand {
    pub fn new(key: BlockKey, content: BlockContent) -> Self {
        Self { key, content }
    }
}

impl EditorCommand for RestoreContentCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let saved = access.with_block_mut(self.key, |block| {
            let saved = block.content();
            block.restore_content(self.content.clone());
            saved
        })?;
        Ok(CommandOutcome::new(Box::new(Self::new(self.key, saved))))
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Block(self.key)
    }

    fn description(&self) -> &str {
        "Restore block content"
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.content.text.len()
            + self.content.spans.len() * core::mem::size_of::<crate::core::TaggedSpan>()
    }
}

/// Apply `edit` to one block and return a [`RestoreContentCommand`] inverse
pub(crate) fn edit_block(
    access: &mut DocumentAccess<'_>,
    key: BlockKey,
    edit: impl FnOnce(&mut Block) -> core::result::Result<(), CommandError>,
) -> Result<CommandOutcome> {
    let saved = access.with_block_mut(key, |block| {
        let saved = block.content();
        edit(block).map(|()| saved)
    })??;
    Ok(CommandOutcome::new(Box::new(RestoreContentCommand::new(
        key, saved,
    ))))
}

/// Runs `inner` only while the block is still at `revision`
///
/// Edits computed from a snapshot (deferred analyzer edits, editor actions)
/// carry the revision they saw. Once the block has moved on their offsets no
/// longer line up, so execution is rejected and nothing changes. Undo and redo
/// replay the recorded inverse, which carries no precondition.
///
/// # Examples
///
/// ```
/// use blockdoc_editor::{BlockEditor, BlockType, EditorConfig, ExpectRevisionCommand, SetTextCommand};
///
/// let editor = BlockEditor::new(EditorConfig::default()).unwrap();
/// let key = editor.append_block("draft", BlockType::Text).unwrap();
/// let seen = editor.block(key).unwrap().revision();
///
/// editor.execute(SetTextCommand::new(key, "edited")).unwrap();
/// let stale = ExpectRevisionCommand::new(key, seen, Box::new(SetTextCommand::new(key, "lost")));
/// assert!(editor.execute(stale).is_err());
/// assert_eq!(editor.block(key).unwrap().text(), "edited");
/// ```
#[derive(Debug)]
pub struct ExpectRevisionCommand {
    pub key: BlockKey,
    pub revision: u64,
    pub inner: Box<dyn EditorCommand>,
}

impl ExpectRevisionCommand {
    pub fn new(key: BlockKey, revision: u64, inner: Box<dyn EditorCommand>) -> Self {
        Self {
            key,
            revision,
            inner,
        }
    }
}

impl EditorCommand for ExpectRevisionCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let current = access.with_block(self.key, Block::revision)?;
        if current != self.revision {
            return Err(CommandError::Rejected {
                message: format!(
                    "block {} changed (revision {current}, expected {})",
                    self.key, self.revision
                ),
            }
            .into());
        }
        self.inner.execute(access)
    }

    fn scope(&self) -> CommandScope {
        self.inner.scope().merge(CommandScope::Block(self.key))
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn modifies_content(&self) -> bool {
        self.inner.modifies_content()
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + self.inner.memory_usage()
    }
}

/// Composite command executed and undone as one history entry
#[derive(Debug)]
pub struct BatchCommand {
    /// Commands to execute in order
    pub commands: Vec<Box<dyn EditorCommand>>,
    /// Description of the batch operation
    pub description: String,
}

impl BatchCommand {
    /// Create a new batch command
    ///
    /// # Examples
    ///
    /// ```
    /// use blockdoc_editor::{BatchCommand, BlockType, EditorCommand, ReplaceTextCommand, SetBlockTypeCommand, BlockKey};
    ///
    /// # fn demo(key: BlockKey) {
    /// let batch = BatchCommand::new("Convert to heading")
    ///     .add_command(Box::new(ReplaceTextCommand::new(key, 0, 2, "")))
    ///     .add_command(Box::new(SetBlockTypeCommand::new(key, BlockType::Heading { level: 1 })));
    /// assert_eq!(batch.description(), "Convert to heading");
    /// # }
    /// ```
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            description: description.into(),
        }
    }

    /// Add a command to the batch
    #[must_use]
    pub fn add_command(mut self, command: Box<dyn EditorCommand>) -> Self {
        self.commands.push(command);
        self
    }

    /// Add multiple commands to the batch
    #[must_use]
    pub fn add_commands(mut self, commands: Vec<Box<dyn EditorCommand>>) -> Self {
        self.commands.extend(commands);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl EditorCommand for BatchCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        if self.commands.is_empty() {
            return Err(CommandError::EmptyBatch {
                description: self.description.clone(),
            }
            .into());
        }

        let mut inverses: Vec<Box<dyn EditorCommand>> = Vec::with_capacity(self.commands.len());
        let mut content_changed = false;

        for command in &self.commands {
            match command.execute(access) {
                Ok(outcome) => {
                    content_changed |= outcome.content_changed;
                    inverses.push(outcome.inverse);
                }
                Err(err) => {
                    for inverse in inverses.iter().rev() {
                        if let Err(unwind) = inverse.execute(access) {
                            error!(
                                batch = %self.description,
                                command = inverse.description(),
                                error = %unwind,
                                "failed to unwind partially applied batch"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        inverses.reverse();
        let inverse = Self {
            commands: inverses,
            description: self.description.clone(),
        };
        Ok(CommandOutcome {
            inverse: Box::new(inverse),
            content_changed,
            message: None,
        })
    }

    fn scope(&self) -> CommandScope {
        self.commands
            .iter()
            .map(|command| command.scope())
            .reduce(CommandScope::merge)
            .unwrap_or(CommandScope::Structure)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn modifies_content(&self) -> bool {
        self.commands.iter().any(|command| command.modifies_content())
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.description.len()
            + self
                .commands
                .iter()
                .map(|c| c.memory_usage())
                .sum::<usize>()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::core::{BlockType, Tag, TaggedSpan};
    use pretty_assertions::assert_eq;

    #[test]
    fn scope_merge() {
        let a = CommandScope::Block(BlockKey::from_raw(1));
        let b = CommandScope::Block(BlockKey::from_raw(2));
        assert_eq!(a.merge(a), a);
        assert_eq!(a.merge(b), CommandScope::Structure);
        assert_eq!(a.merge(CommandScope::Structure), CommandScope::Structure);
        assert_eq!(a.to_string(), "block #1");
    }

    #[test]
    fn block_scope_rejects_other_blocks() {
        let (collection, keys) = collection_with(&["a", "b"]);
        let mut access = DocumentAccess::acquire(&collection, CommandScope::Block(keys[0])).unwrap();
        assert!(access.with_block(keys[0], |b| b.text().len()).is_ok());
        assert!(matches!(
            access.with_block_mut(keys[1], |_| ()),
            Err(EditorError::ScopeViolation { .. })
        ));
        assert!(matches!(
            access.structure_mut(),
            Err(EditorError::LockModeViolation { .. })
        ));
    }

    #[test]
    fn access_records_touched_blocks() {
        let (collection, keys) = collection_with(&["a", "b"]);
        let mut access = DocumentAccess::acquire(&collection, CommandScope::Structure).unwrap();
        access.with_block_mut(keys[1], |_| ()).unwrap();
        access.with_block_mut(keys[0], |_| ()).unwrap();
        access.with_block_mut(keys[1], |_| ()).unwrap();
        assert_eq!(access.touched(), &[keys[1], keys[0]]);
    }

    #[test]
    fn batch_undo_is_single_step() {
        let (collection, keys) = collection_with(&["# Title"]);
        let key = keys[0];
        let batch = BatchCommand::new("Convert to heading")
            .add_command(Box::new(ReplaceTextCommand::new(key, 0, 2, "")))
            .add_command(Box::new(SetBlockTypeCommand::new(
                key,
                BlockType::Heading { level: 1 },
            )));
        assert_eq!(batch.scope(), CommandScope::Block(key));

        let before = block(&collection, key).content();
        let outcome = run(&collection, &batch).unwrap();
        let after = block(&collection, key);
        assert_eq!(after.text(), "Title");
        assert_eq!(after.block_type(), &BlockType::Heading { level: 1 });

        run(&collection, outcome.inverse.as_ref()).unwrap();
        assert_eq!(block(&collection, key).content(), before);
    }

    #[test]
    fn failed_batch_unwinds_applied_steps() {
        let (collection, keys) = collection_with(&["hello"]);
        let key = keys[0];
        {
            let mut access = DocumentAccess::acquire(&collection, CommandScope::Block(key)).unwrap();
            access
                .with_block_mut(key, |b| {
                    b.replace_spans("words", vec![TaggedSpan::new(0, 5, Tag::Word)])
                })
                .unwrap();
        }
        let before = block(&collection, key).content();

        let batch = BatchCommand::new("Broken")
            .add_command(Box::new(InsertTextCommand::new(key, 5, " world")))
            .add_command(Box::new(DeleteTextCommand::new(key, 40, 50)));
        let err = run(&collection, &batch).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::InvalidRange { .. })
        ));
        assert_eq!(block(&collection, key).content(), before);
    }

    #[test]
    fn expected_revision_guards_inner_command() {
        let (collection, keys) = collection_with(&["# Title"]);
        let key = keys[0];
        let seen = block(&collection, key).revision();
        let guarded = ExpectRevisionCommand::new(
            key,
            seen,
            Box::new(ReplaceTextCommand::new(key, 0, 2, "")),
        );
        assert_eq!(guarded.scope(), CommandScope::Block(key));
        assert_eq!(guarded.description(), "Replace text");

        run(&collection, &SetTextCommand::new(key, "Hello")).unwrap();
        let before = block(&collection, key).content();
        let err = run(&collection, &guarded).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::Rejected { .. })
        ));
        assert_eq!(block(&collection, key).content(), before);

        let current = block(&collection, key).revision();
        let fresh = ExpectRevisionCommand::new(
            key,
            current,
            Box::new(ReplaceTextCommand::new(key, 0, 2, "")),
        );
        run(&collection, &fresh).unwrap();
        assert_eq!(block(&collection, key).text(), "llo");
    }

    #[test]
    fn expected_revision_rejection_unwinds_batch() {
        let (collection, keys) = collection_with(&["abc"]);
        let key = keys[0];
        let stale = block(&collection, key).revision();
        let batch = BatchCommand::new("Edit then stale")
            .add_command(Box::new(InsertTextCommand::new(key, 0, "x")))
            .add_command(Box::new(ExpectRevisionCommand::new(
                key,
                stale,
                Box::new(SetBlockTypeCommand::new(key, BlockType::Quote)),
            )));
        let before = block(&collection, key).content();
        assert!(run(&collection, &batch).is_err());
        assert_eq!(block(&collection, key).content(), before);
    }

    #[test]
    fn empty_batch_rejected() {
        let (collection, _) = collection_with(&[]);
        let err = run(&collection, &BatchCommand::new("Nothing")).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::EmptyBatch { .. })
        ));
    }

    #[test]
    fn batch_memory_usage_sums_children() {
        let key = BlockKey::from_raw(1);
        let batch = BatchCommand::new("Two")
            .add_command(Box::new(SetTextCommand::new(key, "abc")))
            .add_command(Box::new(SetTextCommand::new(key, "def")));
        assert!(batch.memory_usage() >= 6);
        assert_eq!(batch.len(), 2);
    }
}

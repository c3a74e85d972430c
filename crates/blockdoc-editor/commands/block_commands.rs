//! Structural commands: inserting, removing and moving blocks
//!
//! These run under the collection write lock. Removal keeps the removed block
//! (key included) in its inverse, so undo brings back the same identity and
//! later history entries that name the key stay valid.

use super::{CommandOutcome, CommandScope, DocumentAccess, EditorCommand};
use crate::core::{Block, BlockKey, BlockStatus, BlockType, Result};

/// Insert a new block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertBlockCommand {
    /// Target index; `None` appends
    pub index: Option<usize>,
    pub text: String,
    pub block_type: BlockType,
}

impl InsertBlockCommand {
    pub fn new(index: usize, text: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            index: Some(index),
            text: text.into(),
            block_type,
        }
    }

    /// Insert after the last block
    pub fn append(text: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            index: None,
            text: text.into(),
            block_type,
        }
    }
}

impl EditorCommand for InsertBlockCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let structure = access.structure_mut()?;
        let index = self.index.unwrap_or_else(|| structure.len());
        let key = structure.insert_block(index, self.text.clone(), self.block_type.clone())?;
        access.mark_touched(key);
        Ok(CommandOutcome::new(Box::new(RemoveBlockCommand::new(key)))
            .with_message(format!("Inserted block {key}")))
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Structure
    }

    fn description(&self) -> &str {
        "Insert block"
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + self.text.len()
    }
}

/// Remove a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveBlockCommand {
    pub key: BlockKey,
}

impl RemoveBlockCommand {
    pub fn new(key: BlockKey) -> Self {
        Self { key }
    }
}

impl EditorCommand for RemoveBlockCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let (index, block) = access.structure_mut()?.remove_block(self.key)?;
        // Reported so analysis can drop state kept for the block.
        access.mark_touched(self.key);
        Ok(CommandOutcome::new(Box::new(RestoreBlockCommand { index, block })))
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Structure
    }

    fn description(&self) -> &str {
        "Remove block"
    }
}

/// Re-insert a removed block under its original key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreBlockCommand {
    pub index: usize,
    pub block: Block,
}

impl EditorCommand for RestoreBlockCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let key = self.block.key();
        let structure = access.structure_mut()?;
        structure.insert_existing(self.index, self.block.clone())?;
        access.with_block_mut(key, |block| block.set_status(BlockStatus::Dirty))?;
        Ok(CommandOutcome::new(Box::new(RemoveBlockCommand::new(key))))
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Structure
    }

    fn description(&self) -> &str {
        "Restore block"
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.block.text().len()
            + self.block.spans().len() * core::mem::size_of::<crate::core::TaggedSpan>()
    }
}

/// Move a block to another index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveBlockCommand {
    pub key: BlockKey,
    pub to: usize,
}

impl MoveBlockCommand {
    pub fn new(key: BlockKey, to: usize) -> Self {
        Self { key, to }
    }
}

impl EditorCommand for MoveBlockCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let from = access.structure_mut()?.move_block(self.key, self.to)?;
        Ok(CommandOutcome::unchanged(Box::new(Self::new(self.key, from))))
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Structure
    }

    fn description(&self) -> &str {
        "Move block"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::{CommandError, EditorError, LockMode};
    use pretty_assertions::assert_eq;

    fn keys(collection: &crate::core::BlockCollection) -> Vec<BlockKey> {
        collection
            .acquire_collection_lock(LockMode::Read)
            .unwrap()
            .keys()
    }

    #[test]
    fn insert_then_undo_then_redo_keeps_key() {
        let (collection, existing) = collection_with(&["first"]);
        let outcome = run(&collection, &InsertBlockCommand::append("second", BlockType::Quote)).unwrap();
        let all = keys(&collection);
        assert_eq!(all.len(), 2);
        let inserted = all[1];

        let undo = run(&collection, outcome.inverse.as_ref()).unwrap();
        assert_eq!(keys(&collection), existing);

        run(&collection, undo.inverse.as_ref()).unwrap();
        assert_eq!(keys(&collection), vec![existing[0], inserted]);
        assert_eq!(block(&collection, inserted).text(), "second");
        assert_eq!(block(&collection, inserted).status(), BlockStatus::Dirty);
    }

    #[test]
    fn remove_restores_position() {
        let (collection, before) = collection_with(&["a", "b", "c"]);
        let outcome = run(&collection, &RemoveBlockCommand::new(before[1])).unwrap();
        assert_eq!(keys(&collection), vec![before[0], before[2]]);
        run(&collection, outcome.inverse.as_ref()).unwrap();
        assert_eq!(keys(&collection), before);
    }

    #[test]
    fn move_is_reversible() {
        let (collection, before) = collection_with(&["a", "b", "c"]);
        let outcome = run(&collection, &MoveBlockCommand::new(before[0], 2)).unwrap();
        assert!(!outcome.content_changed);
        assert_eq!(keys(&collection), vec![before[1], before[2], before[0]]);
        run(&collection, outcome.inverse.as_ref()).unwrap();
        assert_eq!(keys(&collection), before);
    }

    #[test]
    fn insert_out_of_bounds() {
        let (collection, _) = collection_with(&["a"]);
        let err = run(&collection, &InsertBlockCommand::new(5, "x", BlockType::Text)).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::IndexOutOfBounds { index: 5, length: 1 })
        ));
    }
}

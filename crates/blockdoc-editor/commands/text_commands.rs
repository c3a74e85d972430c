//! Content commands: text edits and block type changes
//!
//! All of them run under a single block scope, clear the block's spans, bump
//! its revision and return a [`RestoreContentCommand`] as inverse.

use super::{edit_block, CommandOutcome, CommandScope, DocumentAccess, EditorCommand};
use crate::core::{BlockKey, BlockType, Result};

/// Insert text at a char position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertTextCommand {
    pub key: BlockKey,
    /// Char offset to insert at
    pub position: usize,
    pub text: String,
    /// Optional description override
    pub description: Option<String>,
}

impl InsertTextCommand {
    pub fn new(key: BlockKey, position: usize, text: impl Into<String>) -> Self {
        Self {
            key,
            position,
            text: text.into(),
            description: None,
        }
    }

    /// Set a custom description for this command
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl EditorCommand for InsertTextCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        edit_block(access, self.key, |block| {
            block
                .replace_range(self.position, self.position, &self.text)
                .map(drop)
        })
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Block(self.key)
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("Insert text")
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.text.len()
            + self.description.as_ref().map_or(0, |d| d.len())
    }
}

/// Delete a char range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTextCommand {
    pub key: BlockKey,
    pub start: usize,
    pub stop: usize,
    /// Optional description override
    pub description: Option<String>,
}

impl DeleteTextCommand {
    pub fn new(key: BlockKey, start: usize, stop: usize) -> Self {
        Self {
            key,
            start,
            stop,
            description: None,
        }
    }

    /// Set a custom description for this command
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl EditorCommand for DeleteTextCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        edit_block(access, self.key, |block| {
            block.replace_range(self.start, self.stop, "").map(drop)
        })
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Block(self.key)
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("Delete text")
    }
}

/// Replace a char range with new text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceTextCommand {
    pub key: BlockKey,
    pub start: usize,
    pub stop: usize,
    /// New text to insert
    pub new_text: String,
    /// Optional description override
    pub description: Option<String>,
}

impl ReplaceTextCommand {
    pub fn new(key: BlockKey, start: usize, stop: usize, new_text: impl Into<String>) -> Self {
        Self {
            key,
            start,
            stop,
            new_text: new_text.into(),
            description: None,
        }
    }

    /// Set a custom description for this command
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl EditorCommand for ReplaceTextCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        edit_block(access, self.key, |block| {
            block
                .replace_range(self.start, self.stop, &self.new_text)
                .map(drop)
        })
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Block(self.key)
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("Replace text")
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.new_text.len()
            + self.description.as_ref().map_or(0, |d| d.len())
    }
}

/// Replace the whole text of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTextCommand {
    pub key: BlockKey,
    pub text: String,
}

impl SetTextCommand {
    pub fn new(key: BlockKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
        }
    }
}

impl EditorCommand for SetTextCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        edit_block(access, self.key, |block| {
            block.set_text(self.text.clone());
            Ok(())
        })
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Block(self.key)
    }

    fn description(&self) -> &str {
        "Set text"
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + self.text.len()
    }
}

/// Change the type of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBlockTypeCommand {
    pub key: BlockKey,
    pub block_type: BlockType,
}

impl SetBlockTypeCommand {
    pub fn new(key: BlockKey, block_type: BlockType) -> Self {
        Self { key, block_type }
    }
}

impl EditorCommand for SetBlockTypeCommand {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        edit_block(access, self.key, |block| {
            block.set_block_type(self.block_type.clone());
            Ok(())
        })
    }

    fn scope(&self) -> CommandScope {
        CommandScope::Block(self.key)
    }

    fn description(&self) -> &str {
        "Change block type"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::{BlockStatus, CommandError, EditorError, Tag, TaggedSpan};
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_delete_replace() {
        let (collection, keys) = collection_with(&["Hello"]);
        let key = keys[0];

        run(&collection, &InsertTextCommand::new(key, 5, " World")).unwrap();
        assert_eq!(block(&collection, key).text(), "Hello World");

        run(&collection, &ReplaceTextCommand::new(key, 6, 11, "Rust")).unwrap();
        assert_eq!(block(&collection, key).text(), "Hello Rust");

        run(&collection, &DeleteTextCommand::new(key, 5, 10)).unwrap();
        assert_eq!(block(&collection, key).text(), "Hello");
    }

    #[test]
    fn inverse_restores_spans_exactly() {
        let (collection, keys) = collection_with(&["Correc."]);
        let key = keys[0];
        {
            let mut access =
                DocumentAccess::acquire(&collection, CommandScope::Block(key)).unwrap();
            access
                .with_block_mut(key, |b| {
                    b.replace_spans("words", vec![TaggedSpan::new(0, 6, Tag::Word)])
                })
                .unwrap();
        }
        let before = block(&collection, key);

        let outcome = run(&collection, &SetTextCommand::new(key, "Correct.")).unwrap();
        let edited = block(&collection, key);
        assert!(edited.spans().is_empty());
        assert_eq!(edited.status(), BlockStatus::Dirty);
        assert!(edited.revision() > before.revision());

        run(&collection, outcome.inverse.as_ref()).unwrap();
        let restored = block(&collection, key);
        assert_eq!(restored.content(), before.content());
        assert!(restored.revision() > edited.revision());
    }

    #[test]
    fn set_block_type_round_trip() {
        let (collection, keys) = collection_with(&["Intro"]);
        let key = keys[0];
        let outcome = run(
            &collection,
            &SetBlockTypeCommand::new(key, BlockType::Heading { level: 2 }),
        )
        .unwrap();
        assert_eq!(
            block(&collection, key).block_type(),
            &BlockType::Heading { level: 2 }
        );
        let redo = run(&collection, outcome.inverse.as_ref()).unwrap();
        assert_eq!(block(&collection, key).block_type(), &BlockType::Text);
        run(&collection, redo.inverse.as_ref()).unwrap();
        assert_eq!(
            block(&collection, key).block_type(),
            &BlockType::Heading { level: 2 }
        );
    }

    #[test]
    fn invalid_range_leaves_block_untouched() {
        let (collection, keys) = collection_with(&["abc"]);
        let key = keys[0];
        let before = block(&collection, key);
        let err = run(&collection, &DeleteTextCommand::new(key, 2, 9)).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::InvalidRange { stop: 9, .. })
        ));
        assert_eq!(block(&collection, key), before);
    }

    #[test]
    fn missing_block_reported() {
        let (collection, _) = collection_with(&["abc"]);
        let err = run(
            &collection,
            &InsertTextCommand::new(BlockKey::from_raw(77), 0, "x"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::BlockNotFound { .. })
        ));
    }

    #[test]
    fn descriptions() {
        let key = BlockKey::from_raw(1);
        assert_eq!(InsertTextCommand::new(key, 0, "x").description(), "Insert text");
        assert_eq!(
            InsertTextCommand::new(key, 0, "x")
                .with_description("Type")
                .description(),
            "Type"
        );
        assert!(InsertTextCommand::new(key, 0, "Hello").memory_usage() >= 5);
    }
}

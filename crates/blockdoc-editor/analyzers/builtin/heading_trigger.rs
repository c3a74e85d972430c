//! Immediate-edit trigger turning `# ` prefixes into headings
//!
//! The analyzer runs under the block's write lock, so it never edits the block
//! itself: it defers a composite command that strips the prefix and changes
//! the block type in one undoable step. The command only applies while the
//! block is still at the analyzed revision.

use crate::analyzers::{AnalysisContext, AnalyzerInfo, AnalyzerStatus, BlockAnalyzer};
use crate::commands::{
    BatchCommand, CommandOutcome, CommandScope, DocumentAccess, EditorCommand,
    ExpectRevisionCommand, ReplaceTextCommand, SetBlockTypeCommand,
};
use crate::core::{Block, BlockKey, BlockType, Result, Tag, TaggedSpan};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Name published by [`HeadingTrigger`]
pub const TRIGGERS: &str = "triggers";

const RULE: &str = "heading-prefix";

type FiredSet = Arc<Mutex<HashSet<BlockKey>>>;

/// Converts Markdown-style heading prefixes
///
/// Fires at most once per block, so undoing a conversion sticks. A conversion
/// rejected because the block changed first lets the trigger fire again.
pub struct HeadingTrigger {
    info: AnalyzerInfo,
    fired: FiredSet,
}

impl HeadingTrigger {
    pub const NAME: &'static str = "heading-trigger";

    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(Self::NAME)
                .with_description("Converts '# ' prefixed text blocks into headings")
                .with_provided(TRIGGERS),
            fired: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Heading level and prefix length (in chars) of `text`, if it has a prefix
    pub fn heading_prefix(text: &str) -> Option<(u8, usize)> {
        let hashes = text.chars().take_while(|&c| c == '#').count();
        if !(1..=6).contains(&hashes) || text[hashes..].chars().next() != Some(' ') {
            return None;
        }
        u8::try_from(hashes).ok().map(|level| (level, hashes + 1))
    }

    /// Blocks this trigger has already converted (or is converting)
    pub fn fired_count(&self) -> usize {
        self.fired.lock().len()
    }
}

impl Default for HeadingTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAnalyzer for HeadingTrigger {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    fn analyze(&self, block: &Block, context: &mut AnalysisContext<'_>) -> AnalyzerStatus {
        if *block.block_type() != BlockType::Text {
            return AnalyzerStatus::Succeeded;
        }
        let Some((level, prefix_len)) = Self::heading_prefix(block.text()) else {
            return AnalyzerStatus::Succeeded;
        };
        if !self.fired.lock().insert(block.key()) {
            return AnalyzerStatus::Succeeded;
        }

        let key = block.key();
        let convert = ConvertToHeading {
            key,
            convert: ExpectRevisionCommand::new(
                key,
                block.revision(),
                Box::new(
                    BatchCommand::new("Convert to heading")
                        .add_command(Box::new(ReplaceTextCommand::new(key, 0, prefix_len, "")))
                        .add_command(Box::new(SetBlockTypeCommand::new(
                            key,
                            BlockType::Heading { level },
                        ))),
                ),
            ),
            fired: Arc::clone(&self.fired),
        };

        if let Err(err) = context.defer(convert) {
            self.fired.lock().remove(&key);
            return AnalyzerStatus::failed(err.to_string());
        }

        context.emit(TaggedSpan::new(
            0,
            prefix_len,
            Tag::Trigger {
                rule: RULE.to_string(),
            },
        ));
        AnalyzerStatus::Succeeded
    }

    fn forget_block(&self, key: BlockKey) {
        self.fired.lock().remove(&key);
    }
}

/// Deferred conversion; re-arms the trigger when it cannot apply
#[derive(Debug)]
struct ConvertToHeading {
    key: BlockKey,
    convert: ExpectRevisionCommand,
    fired: FiredSet,
}

impl EditorCommand for ConvertToHeading {
    fn execute(&self, access: &mut DocumentAccess<'_>) -> Result<CommandOutcome> {
        let outcome = self.convert.execute(access);
        if outcome.is_err() {
            self.fired.lock().remove(&self.key);
        }
        outcome
    }

    fn scope(&self) -> CommandScope {
        self.convert.scope()
    }

    fn description(&self) -> &str {
        self.convert.description()
    }

    fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + self.convert.memory_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::builtin::test_support::{run_analyzer, run_on_block};
    use crate::commands::test_support::{block, collection_with, run};
    use crate::commands::{CommandScope, EditorCommand, SetTextCommand};
    use crate::core::{CommandError, EditorError};
    use pretty_assertions::assert_eq;

    #[test]
    fn prefix_detection() {
        assert_eq!(HeadingTrigger::heading_prefix("# Title"), Some((1, 2)));
        assert_eq!(HeadingTrigger::heading_prefix("### Deep"), Some((3, 4)));
        assert_eq!(HeadingTrigger::heading_prefix("#Title"), None);
        assert_eq!(HeadingTrigger::heading_prefix("####### Seven"), None);
        assert_eq!(HeadingTrigger::heading_prefix("plain"), None);
        assert_eq!(HeadingTrigger::heading_prefix("#"), None);
    }

    #[test]
    fn defers_conversion_batch() {
        let run = run_analyzer(&HeadingTrigger::new(), "## Setup", BlockType::Text);
        assert_eq!(run.status, AnalyzerStatus::Succeeded);
        assert_eq!(run.deferred.len(), 1);
        assert_eq!(run.deferred[0].description(), "Convert to heading");
        assert_eq!(run.deferred[0].scope(), CommandScope::Block(run.block.key()));
        assert_eq!(run.spans.len(), 1);
        assert_eq!(run.spans[0].stop, 3);
    }

    #[test]
    fn ignores_non_text_blocks() {
        let run = run_analyzer(
            &HeadingTrigger::new(),
            "# Already",
            BlockType::Heading { level: 1 },
        );
        assert!(run.deferred.is_empty());
        assert!(run.spans.is_empty());
    }

    #[test]
    fn fires_once_per_block() {
        let trigger = HeadingTrigger::new();
        let block = Block::new(BlockKey::from_raw(9), "# Again", BlockType::Text);
        assert_eq!(run_on_block(&trigger, &block).deferred.len(), 1);
        assert!(run_on_block(&trigger, &block).deferred.is_empty());
    }

    #[test]
    fn conversion_applies_at_analyzed_revision() {
        let (collection, keys) = collection_with(&["## Setup"]);
        let trigger = HeadingTrigger::new();
        let analyzed = run_on_block(&trigger, &block(&collection, keys[0]));

        run(&collection, analyzed.deferred[0].as_ref()).unwrap();
        let converted = block(&collection, keys[0]);
        assert_eq!(converted.text(), "Setup");
        assert_eq!(converted.block_type(), &BlockType::Heading { level: 2 });
        assert_eq!(trigger.fired_count(), 1);
    }

    #[test]
    fn stale_conversion_is_rejected_and_rearms() {
        let (collection, keys) = collection_with(&["# Title"]);
        let key = keys[0];
        let trigger = HeadingTrigger::new();
        let analyzed = run_on_block(&trigger, &block(&collection, key));

        run(&collection, &SetTextCommand::new(key, "Hello")).unwrap();
        let err = run(&collection, analyzed.deferred[0].as_ref()).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Command(CommandError::Rejected { .. })
        ));
        let untouched = block(&collection, key);
        assert_eq!(untouched.text(), "Hello");
        assert_eq!(untouched.block_type(), &BlockType::Text);
        assert_eq!(trigger.fired_count(), 0);

        run(&collection, &SetTextCommand::new(key, "# Again")).unwrap();
        let again = run_on_block(&trigger, &block(&collection, key));
        assert_eq!(again.deferred.len(), 1);
    }

    #[test]
    fn forgotten_blocks_are_pruned() {
        let trigger = HeadingTrigger::new();
        let first = Block::new(BlockKey::from_raw(3), "# One", BlockType::Text);
        let second = Block::new(BlockKey::from_raw(4), "# Two", BlockType::Text);
        run_on_block(&trigger, &first);
        run_on_block(&trigger, &second);
        assert_eq!(trigger.fired_count(), 2);

        trigger.forget_block(first.key());
        assert_eq!(trigger.fired_count(), 1);
        assert_eq!(run_on_block(&trigger, &first).deferred.len(), 1);
    }
}

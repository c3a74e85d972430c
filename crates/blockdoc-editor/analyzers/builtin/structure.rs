//! Structural validation of block types
//!
//! Flags headings without text, heading levels outside `1..=6`, region links
//! without a target and headings padded with whitespace.

use crate::analyzers::{
    ActionImportance, AnalysisContext, AnalyzerInfo, AnalyzerStatus, BlockAnalyzer, EditorAction,
};
use crate::commands::{ExpectRevisionCommand, SetTextCommand};
use crate::core::{Block, BlockType, Tag, TaggedSpan, ValidationSeverity};

/// Name published by [`StructureValidator`]
pub const STRUCTURE: &str = "structure";

const EMPTY_HEADING: &str = "Heading has no text";
const EMPTY_LINK_TARGET: &str = "Region link has no target";
const PADDED_HEADING: &str = "Heading has leading or trailing whitespace";

/// Validates block type constraints
pub struct StructureValidator {
    info: AnalyzerInfo,
}

impl StructureValidator {
    pub const NAME: &'static str = "structure";

    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(Self::NAME)
                .with_description("Checks headings and region links")
                .with_provided(STRUCTURE),
        }
    }

    /// Validation findings for a block as `(severity, message)`
    pub fn validate(block: &Block) -> Vec<(ValidationSeverity, String)> {
        let mut findings = Vec::new();
        match block.block_type() {
            BlockType::Heading { level } => {
                if !(1..=6).contains(level) {
                    findings.push((
                        ValidationSeverity::Error,
                        format!("Heading level {level} is outside 1..=6"),
                    ));
                }
                let trimmed = block.text().trim();
                if trimmed.is_empty() {
                    findings.push((ValidationSeverity::Error, EMPTY_HEADING.to_string()));
                } else if trimmed.len() != block.text().len() {
                    findings.push((ValidationSeverity::Warning, PADDED_HEADING.to_string()));
                }
            }
            BlockType::RegionLink { target } if target.trim().is_empty() => {
                findings.push((ValidationSeverity::Error, EMPTY_LINK_TARGET.to_string()));
            }
            _ => {}
        }
        findings
    }
}

impl Default for StructureValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAnalyzer for StructureValidator {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    fn analyze(&self, block: &Block, context: &mut AnalysisContext<'_>) -> AnalyzerStatus {
        let whole = block.char_len();
        for (severity, message) in Self::validate(block) {
            context.emit(TaggedSpan::new(0, whole, Tag::Validation { severity, message }));
        }
        AnalyzerStatus::Succeeded
    }

    fn editor_actions(&self, block: &Block, span: &TaggedSpan) -> Vec<EditorAction> {
        match &span.tag {
            Tag::Validation { message, .. } if message == PADDED_HEADING => {
                let trim = SetTextCommand::new(block.key(), block.text().trim());
                let command =
                    ExpectRevisionCommand::new(block.key(), block.revision(), Box::new(trim));
                vec![EditorAction::new("Trim heading", "structure.trim-heading", Box::new(command))
                    .with_importance(ActionImportance::Low)]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::builtin::test_support::{run_analyzer, run_on_block};
    use crate::commands::test_support::{block, collection_with, run};
    use crate::commands::{SetBlockTypeCommand, SetTextCommand};

    fn messages(text: &str, block_type: BlockType) -> Vec<String> {
        run_analyzer(&StructureValidator::new(), text, block_type)
            .spans
            .into_iter()
            .filter_map(|span| match span.tag {
                Tag::Validation { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_is_valid() {
        assert!(messages("", BlockType::Text).is_empty());
        assert!(messages("Title", BlockType::Heading { level: 2 }).is_empty());
    }

    #[test]
    fn empty_heading_and_bad_level() {
        let found = messages("  ", BlockType::Heading { level: 9 });
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("level 9"));
        assert_eq!(found[1], EMPTY_HEADING);
    }

    #[test]
    fn region_link_needs_target() {
        let found = messages(
            "see below",
            BlockType::RegionLink {
                target: " ".to_string(),
            },
        );
        assert_eq!(found, vec![EMPTY_LINK_TARGET.to_string()]);
    }

    #[test]
    fn padded_heading_offers_trim() {
        let validator = StructureValidator::new();
        let run = run_analyzer(&validator, " Intro ", BlockType::Heading { level: 1 });
        assert_eq!(run.spans.len(), 1);
        assert_eq!((run.spans[0].start, run.spans[0].stop), (0, 7));
        let actions = validator.editor_actions(&run.block, &run.spans[0]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].resource_key(), "structure.trim-heading");
    }

    #[test]
    fn trim_does_not_overwrite_newer_text() {
        let validator = StructureValidator::new();
        let (collection, keys) = collection_with(&[" Intro "]);
        let key = keys[0];
        run(
            &collection,
            &SetBlockTypeCommand::new(key, BlockType::Heading { level: 1 }),
        )
        .unwrap();

        let analyzed = run_on_block(&validator, &block(&collection, key));
        let actions = validator.editor_actions(&analyzed.block, &analyzed.spans[0]);
        assert_eq!(actions[0].command().description(), "Set text");

        run(&collection, &SetTextCommand::new(key, " Introduction ")).unwrap();
        assert!(run(&collection, actions[0].command()).is_err());
        assert_eq!(block(&collection, key).text(), " Introduction ");
    }
}

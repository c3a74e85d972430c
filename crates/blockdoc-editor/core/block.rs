//! Blocks, their identities and analyzer annotations
//!
//! A `Block` is one paragraph-like unit of the document: text, a
//! [`BlockType`], the [`TaggedSpan`]s analyzers attached to it, a
//! [`BlockStatus`] and a revision stamp. Offsets are counted in `char`s.
//! Mutating methods are crate-private; outside code changes blocks through
//! commands and reads them through lock guards.

use crate::core::errors::CommandError;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque block identity, unique within a collection and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockKey(u64);

impl BlockKey {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlockType {
    /// Plain paragraph
    #[default]
    Text,
    /// Heading with a nesting level
    Heading { level: u8 },
    /// Link to another region of the document
    RegionLink { target: String },
    /// Block quotation
    Quote,
    /// Item of a list
    ListItem,
}

impl BlockType {
    /// Short name for logs and descriptions
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Heading { .. } => "heading",
            Self::RegionLink { .. } => "region-link",
            Self::Quote => "quote",
            Self::ListItem => "list-item",
        }
    }
}

/// Analysis state of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlockStatus {
    /// Every analyzer has completed for the current revision
    Clean,
    /// Edited since the last completed analysis
    #[default]
    Dirty,
    /// An analysis pass is running
    Analyzing,
    /// Some analyzer could not run because its requirements are unsatisfied
    Deferred,
}

impl BlockStatus {
    /// Whether the analysis supervisor has nothing further to do for now
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Clean | Self::Deferred)
    }
}

/// Severity of a validation annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValidationSeverity {
    Info,
    Warning,
    Error,
}

/// Payload of a tagged span
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Tag {
    /// A word token
    Word,
    /// A word the spelling dictionary rejected
    Misspelling {
        word: String,
        suggestions: Vec<String>,
    },
    /// Structural problem
    Validation {
        severity: ValidationSeverity,
        message: String,
    },
    /// Text matched an immediate-edit rule
    Trigger { rule: String },
    /// Analyzer-defined annotation
    Custom { kind: String, value: String },
}

impl Tag {
    /// Short name of the tag kind
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Word => "word",
            Self::Misspelling { .. } => "misspelling",
            Self::Validation { .. } => "validation",
            Self::Trigger { .. } => "trigger",
            Self::Custom { kind, .. } => kind,
        }
    }
}

/// Half-open char range of a block annotated by one analyzer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaggedSpan {
    pub start: usize,
    pub stop: usize,
    pub tag: Tag,
    /// Name of the analyzer that produced the span
    pub source: String,
}

impl TaggedSpan {
    /// Create a span; the analysis context fills in `source`
    pub fn new(start: usize, stop: usize, tag: Tag) -> Self {
        Self {
            start,
            stop,
            tag,
            source: String::new(),
        }
    }

    /// Set the producing analyzer
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Length in chars
    #[must_use]
    pub const fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    /// Whether the span covers no chars
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    /// Whether two spans share at least one char, or an empty span sits inside the other
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            self.start <= other.stop && other.start <= self.stop
        } else {
            self.start < other.stop && other.start < self.stop
        }
    }

    fn order_key(&self) -> (usize, usize, &str) {
        (self.start, self.stop, self.source.as_str())
    }
}

/// Text, type and spans of a block; what undo restores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContent {
    pub text: String,
    pub block_type: BlockType,
    pub spans: Vec<TaggedSpan>,
}

/// One block of the document
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Block {
    key: BlockKey,
    text: String,
    block_type: BlockType,
    spans: Vec<TaggedSpan>,
    status: BlockStatus,
    revision: u64,
}

impl Block {
    pub(crate) fn new(key: BlockKey, text: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            key,
            text: text.into(),
            block_type,
            spans: Vec::new(),
            status: BlockStatus::Dirty,
            revision: 1,
        }
    }

    #[must_use]
    pub const fn key(&self) -> BlockKey {
        self.key
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn block_type(&self) -> &BlockType {
        &self.block_type
    }

    /// All spans, ordered by `(start, stop, source)`
    #[must_use]
    pub fn spans(&self) -> &[TaggedSpan] {
        &self.spans
    }

    /// Spans produced by one analyzer
    pub fn spans_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a TaggedSpan> + 'a {
        self.spans.iter().filter(move |span| span.source == source)
    }

    #[must_use]
    pub const fn status(&self) -> BlockStatus {
        self.status
    }

    /// Stamp bumped on every text or type change
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Text length in chars
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Text of a char range
    pub fn slice(&self, start: usize, stop: usize) -> Result<&str, CommandError> {
        let (from, to) = self.byte_range(start, stop)?;
        Ok(&self.text[from..to])
    }

    /// Snapshot of what undo restores
    #[must_use]
    pub fn content(&self) -> BlockContent {
        BlockContent {
            text: self.text.clone(),
            block_type: self.block_type.clone(),
            spans: self.spans.clone(),
        }
    }

    /// Replace a char range, returning the removed text
    pub(crate) fn replace_range(
        &mut self,
        start: usize,
        stop: usize,
        replacement: &str,
    ) -> Result<String, CommandError> {
        let (from, to) = self.byte_range(start, stop)?;
        let removed = self.text[from..to].to_string();
        self.text.replace_range(from..to, replacement);
        self.touch();
        Ok(removed)
    }

    pub(crate) fn set_text(&mut self, text: impl Into<String>) -> String {
        let previous = core::mem::replace(&mut self.text, text.into());
        self.touch();
        previous
    }

    pub(crate) fn set_block_type(&mut self, block_type: BlockType) -> BlockType {
        let previous = core::mem::replace(&mut self.block_type, block_type);
        self.touch();
        previous
    }

    /// Restore text, type and spans exactly; the revision still moves forward
    pub(crate) fn restore_content(&mut self, content: BlockContent) {
        self.text = content.text;
        self.block_type = content.block_type;
        self.revision += 1;
        self.status = BlockStatus::Dirty;
        self.spans = content.spans;
    }

    /// Replace every span of `source` with `spans`
    ///
    /// Spans that do not fit the current text are dropped.
    pub(crate) fn replace_spans(&mut self, source: &str, spans: Vec<TaggedSpan>) -> usize {
        let char_len = self.char_len();
        self.spans.retain(|span| span.source != source);
        let before = self.spans.len();
        self.spans.extend(
            spans
                .into_iter()
                .filter(|span| span.start <= span.stop && span.stop <= char_len)
                .map(|span| span.with_source(source)),
        );
        let added = self.spans.len() - before;
        self.spans.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        added
    }

    pub(crate) fn set_status(&mut self, status: BlockStatus) {
        self.status = status;
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.status = BlockStatus::Dirty;
        self.spans.clear();
    }

    fn byte_range(&self, start: usize, stop: usize) -> Result<(usize, usize), CommandError> {
        let invalid = || CommandError::InvalidRange {
            key: self.key,
            start,
            stop,
            length: self.char_len(),
        };
        if start > stop {
            return Err(invalid());
        }
        let from = byte_offset(&self.text, start).ok_or_else(invalid)?;
        let to = byte_offset(&self.text, stop).ok_or_else(invalid)?;
        Ok((from, to))
    }
}

/// Byte offset of a char index; `None` past the end
pub(crate) fn byte_offset(text: &str, char_index: usize) -> Option<usize> {
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(core::iter::once(text.len()))
        .nth(char_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(text: &str) -> Block {
        Block::new(BlockKey::from_raw(1), text, BlockType::Text)
    }

    #[test]
    fn new_block_is_dirty() {
        let block = block("hello");
        assert_eq!(block.status(), BlockStatus::Dirty);
        assert_eq!(block.revision(), 1);
        assert_eq!(block.char_len(), 5);
    }

    #[test]
    fn replace_range_counts_chars() {
        let mut block = block("naïve café");
        let removed = block.replace_range(6, 10, "bar").unwrap();
        assert_eq!(removed, "café");
        assert_eq!(block.text(), "naïve bar");
        assert_eq!(block.revision(), 2);
    }

    #[test]
    fn invalid_range_rejected() {
        let mut block = block("abc");
        assert!(matches!(
            block.replace_range(2, 5, "x"),
            Err(CommandError::InvalidRange { length: 3, .. })
        ));
        assert!(matches!(
            block.slice(2, 1),
            Err(CommandError::InvalidRange { .. })
        ));
        assert_eq!(block.text(), "abc");
        assert_eq!(block.revision(), 1);
    }

    #[test]
    fn edits_clear_spans() {
        let mut block = block("one two");
        block.replace_spans("words", vec![TaggedSpan::new(0, 3, Tag::Word)]);
        assert_eq!(block.spans().len(), 1);
        block.set_block_type(BlockType::Quote);
        assert!(block.spans().is_empty());
        assert_eq!(block.status(), BlockStatus::Dirty);
    }

    #[test]
    fn replace_spans_keeps_other_sources_and_orders() {
        let mut block = block("one two");
        block.replace_spans("b", vec![TaggedSpan::new(4, 7, Tag::Word)]);
        block.replace_spans(
            "a",
            vec![
                TaggedSpan::new(4, 7, Tag::Word),
                TaggedSpan::new(0, 3, Tag::Word),
                TaggedSpan::new(5, 40, Tag::Word),
            ],
        );
        let order: Vec<_> = block
            .spans()
            .iter()
            .map(|s| (s.start, s.stop, s.source.as_str()))
            .collect();
        assert_eq!(order, vec![(0, 3, "a"), (4, 7, "a"), (4, 7, "b")]);

        block.replace_spans("a", Vec::new());
        assert_eq!(block.spans_from("b").count(), 1);
        assert_eq!(block.spans_from("a").count(), 0);
    }

    #[test]
    fn restore_content_is_exact() {
        let mut block = block("before");
        block.replace_spans("words", vec![TaggedSpan::new(0, 6, Tag::Word)]);
        let saved = block.content();
        block.set_text("after");
        block.restore_content(saved.clone());
        assert_eq!(block.content(), saved);
        assert_eq!(block.revision(), 3);
    }

    #[test]
    fn span_overlap() {
        let a = TaggedSpan::new(0, 6, Tag::Word);
        let b = TaggedSpan::new(5, 8, Tag::Word);
        let c = TaggedSpan::new(6, 8, Tag::Word);
        let caret = TaggedSpan::new(6, 6, Tag::Word);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.overlaps(&caret));
    }

    #[test]
    fn byte_offsets() {
        assert_eq!(byte_offset("aé", 0), Some(0));
        assert_eq!(byte_offset("aé", 2), Some(3));
        assert_eq!(byte_offset("aé", 3), None);
        assert_eq!(byte_offset("", 0), Some(0));
    }
}

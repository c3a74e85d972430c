//! Analyzer plugin contract
//!
//! An analyzer inspects one block at a time and annotates it with
//! [`TaggedSpan`]s. Analyzers declare the names they provide and require;
//! the analysis supervisor runs providers before requirers and only commits
//! spans that still match the block's text. An analyzer that wants to edit the
//! document hands a command to [`AnalysisContext::defer`] instead of executing
//! it, since it runs while the block's write lock is held.

pub mod actions;
pub mod builtin;
pub mod registry;

use crate::commands::EditorCommand;
use crate::core::{Block, BlockKey, Result, TaggedSpan};
use crate::supervisor::DeferredSender;
use std::collections::{BTreeSet, HashMap};

pub use actions::{ActionImportance, EditorAction};
pub use registry::AnalyzerRegistry;

/// Analyzer metadata: identity plus provided and required names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerInfo {
    /// Unique analyzer name; also the `source` of its spans
    pub name: String,
    /// Analyzer description
    pub description: String,
    /// Names this analyzer produces when it succeeds
    pub provides: BTreeSet<String>,
    /// Names that must be produced before this analyzer may run
    pub requires: BTreeSet<String>,
}

impl AnalyzerInfo {
    /// Create a new analyzer info
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a provided name
    #[must_use]
    pub fn with_provided(mut self, name: impl Into<String>) -> Self {
        self.provides.insert(name.into());
        self
    }

    /// Add a required name
    #[must_use]
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.requires.insert(name.into());
        self
    }

    /// Check if this analyzer provides a name
    pub fn provides_name(&self, name: &str) -> bool {
        self.provides.contains(name)
    }

    /// Check if this analyzer requires a name
    pub fn requires_name(&self, name: &str) -> bool {
        self.requires.contains(name)
    }
}

/// Outcome of one `analyze` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerStatus {
    /// Spans emitted are final for this revision
    Succeeded,
    /// The analyzer gave up on this revision
    Failed { reason: String },
    /// Not possible yet; ask again in a later pass
    Deferred,
}

impl AnalyzerStatus {
    /// Create a failed status
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether the analyzer is done with the current revision
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Deferred)
    }
}

/// A block analysis plugin
///
/// Implementations must be cheap to share; the supervisor calls them from
/// several worker threads at once (on different blocks).
pub trait BlockAnalyzer: Send + Sync {
    /// Get analyzer metadata
    fn info(&self) -> &AnalyzerInfo;

    /// Analyze a snapshot of `block`, emitting spans through `context`
    fn analyze(&self, block: &Block, context: &mut AnalysisContext<'_>) -> AnalyzerStatus;

    /// Actions offered for one of this analyzer's spans
    fn editor_actions(&self, _block: &Block, _span: &TaggedSpan) -> Vec<EditorAction> {
        Vec::new()
    }

    /// Drop per-block state; called once the block is gone from the collection
    fn forget_block(&self, _key: BlockKey) {}
}

/// Per-call view an analyzer gets of the current run
pub struct AnalysisContext<'a> {
    analyzer: &'a str,
    key: BlockKey,
    revision: u64,
    upstream: &'a HashMap<String, Vec<TaggedSpan>>,
    deferred: &'a DeferredSender,
    spans: Vec<TaggedSpan>,
}

impl<'a> AnalysisContext<'a> {
    pub(crate) fn new(
        analyzer: &'a str,
        block: &Block,
        upstream: &'a HashMap<String, Vec<TaggedSpan>>,
        deferred: &'a DeferredSender,
    ) -> Self {
        Self {
            analyzer,
            key: block.key(),
            revision: block.revision(),
            upstream,
            deferred,
            spans: Vec::new(),
        }
    }

    /// Block being analyzed
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// Revision the run started from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Name of the running analyzer
    pub fn analyzer(&self) -> &str {
        self.analyzer
    }

    /// Spans published under `name` by the analyzer that provided it this run
    ///
    /// `None` when no analyzer provided the name (for example because none is
    /// registered).
    pub fn provided(&self, name: &str) -> Option<&[TaggedSpan]> {
        self.upstream.get(name).map(Vec::as_slice)
    }

    /// Emit one span; `source` is set to this analyzer
    pub fn emit(&mut self, span: TaggedSpan) {
        self.spans.push(span.with_source(self.analyzer));
    }

    /// Emit several spans
    pub fn emit_all(&mut self, spans: impl IntoIterator<Item = TaggedSpan>) {
        for span in spans {
            self.emit(span);
        }
    }

    /// Spans emitted so far in this call
    pub fn spans(&self) -> &[TaggedSpan] {
        &self.spans
    }

    /// Queue a command to run once the current pass has released its locks
    pub fn defer(&self, command: impl EditorCommand + 'static) -> Result<()> {
        self.deferred.defer(command)
    }

    /// Queue a boxed command
    pub fn defer_boxed(&self, command: Box<dyn EditorCommand>) -> Result<()> {
        self.deferred.defer_boxed(command)
    }

    pub(crate) fn into_spans(self) -> Vec<TaggedSpan> {
        self.spans
    }
}

impl std::fmt::Debug for AnalysisContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("analyzer", &self.analyzer)
            .field("key", &self.key)
            .field("revision", &self.revision)
            .field("emitted", &self.spans.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlockType, Tag};
    use crate::supervisor::DeferredQueue;

    #[test]
    fn info_builder() {
        let info = AnalyzerInfo::new("spelling")
            .with_description("Dictionary check")
            .with_provided("spelling")
            .with_required("words");
        assert!(info.provides_name("spelling"));
        assert!(info.requires_name("words"));
        assert!(!info.requires_name("spelling"));
    }

    #[test]
    fn status_completion() {
        assert!(AnalyzerStatus::Succeeded.is_complete());
        assert!(AnalyzerStatus::failed("boom").is_complete());
        assert!(!AnalyzerStatus::Deferred.is_complete());
    }

    #[test]
    fn context_stamps_source_and_reads_upstream() {
        let block = Block::new(BlockKey::from_raw(4), "abc", BlockType::Text);
        let mut upstream = HashMap::new();
        upstream.insert("words".to_string(), vec![TaggedSpan::new(0, 3, Tag::Word)]);
        let queue = DeferredQueue::new();
        let sender = queue.sender();

        let mut context = AnalysisContext::new("counter", &block, &upstream, &sender);
        assert_eq!(context.key(), BlockKey::from_raw(4));
        assert_eq!(context.provided("words").map(<[_]>::len), Some(1));
        assert!(context.provided("grammar").is_none());

        context.emit(TaggedSpan::new(0, 1, Tag::Word));
        let spans = context.into_spans();
        assert_eq!(spans[0].source, "counter");
    }
}

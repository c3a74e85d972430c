//! Word tokenizer analyzer
//!
//! Tags every word of a block with [`Tag::Word`] and publishes them under the
//! `words` name for analyzers that work word by word.

use crate::analyzers::{AnalysisContext, AnalyzerInfo, AnalyzerStatus, BlockAnalyzer};
use crate::core::{Block, Tag, TaggedSpan};

/// Name published by [`WordCountAnalyzer`]
pub const WORDS: &str = "words";

/// Tags words and lets consumers count them
pub struct WordCountAnalyzer {
    info: AnalyzerInfo,
}

impl WordCountAnalyzer {
    pub const NAME: &'static str = "word-count";

    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(Self::NAME)
                .with_description("Splits block text into words")
                .with_provided(WORDS),
        }
    }

    /// Number of words found by the last committed run on `block`
    pub fn word_count(block: &Block) -> usize {
        block.spans_from(Self::NAME).count()
    }
}

impl Default for WordCountAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAnalyzer for WordCountAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    fn analyze(&self, block: &Block, context: &mut AnalysisContext<'_>) -> AnalyzerStatus {
        context.emit_all(
            word_ranges(block.text())
                .into_iter()
                .map(|(start, stop)| TaggedSpan::new(start, stop, Tag::Word)),
        );
        AnalyzerStatus::Succeeded
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || is_apostrophe(c)
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '\u{2019}'
}

/// Char ranges of the words in `text`
///
/// A word is a run of alphanumerics, optionally joined by apostrophes
/// (`don't`); apostrophes at either end of a run are not part of the word.
pub fn word_ranges(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let mut ranges = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        if !is_word_char(chars[index]) {
            index += 1;
            continue;
        }
        let mut start = index;
        while index < chars.len() && is_word_char(chars[index]) {
            index += 1;
        }
        let mut stop = index;
        while start < stop && is_apostrophe(chars[start]) {
            start += 1;
        }
        while stop > start && is_apostrophe(chars[stop - 1]) {
            stop -= 1;
        }
        if start < stop {
            ranges.push((start, stop));
        }
    }

    ranges
}

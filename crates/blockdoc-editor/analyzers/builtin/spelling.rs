//! Spell-checking analyzer
//!
//! Checks every word against a [`SpellingDictionary`] and tags rejected words
//! with [`Tag::Misspelling`], carrying the dictionary's suggestions. Each
//! suggestion is offered back as a replacement action.

use super::word_count::{word_ranges, WORDS};
use crate::analyzers::{
    ActionImportance, AnalysisContext, AnalyzerInfo, AnalyzerStatus, BlockAnalyzer, EditorAction,
};
use crate::commands::{ExpectRevisionCommand, ReplaceTextCommand};
use crate::core::{Block, Tag, TaggedSpan};
use std::collections::HashSet;
use std::sync::Arc;

/// Name published by [`SpellingAnalyzer`]
pub const SPELLING: &str = "spelling";

/// Spelling backend
pub trait SpellingDictionary: Send + Sync {
    /// Whether `word` is spelled correctly
    fn check(&self, word: &str) -> bool;

    /// Replacement candidates for `word`, best first
    fn suggest(&self, word: &str) -> Vec<String>;
}

/// In-memory dictionary built from a word list
///
/// Lookups ignore case. Suggestions are dictionary words within a small edit
/// distance, closest first.
#[derive(Debug, Clone)]
pub struct WordListDictionary {
    words: HashSet<String>,
    max_distance: usize,
    max_suggestions: usize,
}

impl WordListDictionary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|word| word.as_ref().to_lowercase())
                .collect(),
            max_distance: 2,
            max_suggestions: 5,
        }
    }

    /// Set the largest edit distance a suggestion may have
    #[must_use]
    pub fn with_max_distance(mut self, distance: usize) -> Self {
        self.max_distance = distance;
        self
    }

    /// Set the number of suggestions returned
    #[must_use]
    pub fn with_max_suggestions(mut self, count: usize) -> Self {
        self.max_suggestions = count;
        self
    }

    pub fn insert(&mut self, word: &str) {
        self.words.insert(word.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl SpellingDictionary for WordListDictionary {
    fn check(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    fn suggest(&self, word: &str) -> Vec<String> {
        let lower = word.to_lowercase();
        let mut candidates: Vec<(usize, &String)> = self
            .words
            .iter()
            .filter_map(|candidate| {
                let distance = edit_distance(&lower, candidate);
                (distance <= self.max_distance).then_some((distance, candidate))
            })
            .collect();
        candidates.sort();

        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        candidates
            .into_iter()
            .take(self.max_suggestions)
            .map(|(_, candidate)| {
                if capitalized {
                    capitalize(candidate)
                } else {
                    candidate.clone()
                }
            })
            .collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Tags words the dictionary rejects
pub struct SpellingAnalyzer {
    info: AnalyzerInfo,
    dictionary: Arc<dyn SpellingDictionary>,
}

impl SpellingAnalyzer {
    pub const NAME: &'static str = "spelling";

    pub fn new(dictionary: Arc<dyn SpellingDictionary>) -> Self {
        Self {
            info: AnalyzerInfo::new(Self::NAME)
                .with_description("Flags words missing from the dictionary")
                .with_required(WORDS)
                .with_provided(SPELLING),
            dictionary,
        }
    }
}

impl BlockAnalyzer for SpellingAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    fn analyze(&self, block: &Block, context: &mut AnalysisContext<'_>) -> AnalyzerStatus {
        // Without a word analyzer in the set, tokenize locally.
        let ranges: Vec<(usize, usize)> = match context.provided(WORDS) {
            Some(words) => words.iter().map(|span| (span.start, span.stop)).collect(),
            None => word_ranges(block.text()),
        };

        for (start, stop) in ranges {
            let Ok(word) = block.slice(start, stop) else {
                continue;
            };
            if word.chars().any(|c| c.is_numeric()) || self.dictionary.check(word) {
                continue;
            }
            context.emit(TaggedSpan::new(
                start,
                stop,
                Tag::Misspelling {
                    word: word.to_string(),
                    suggestions: self.dictionary.suggest(word),
                },
            ));
        }

        AnalyzerStatus::Succeeded
    }

    fn editor_actions(&self, block: &Block, span: &TaggedSpan) -> Vec<EditorAction> {
        let Tag::Misspelling { suggestions, .. } = &span.tag else {
            return Vec::new();
        };

        suggestions
            .iter()
            .enumerate()
            .map(|(rank, suggestion)| {
                let name = format!("Replace with '{suggestion}'");
                let replace =
                    ReplaceTextCommand::new(block.key(), span.start, span.stop, suggestion.clone())
                        .with_description(name.clone());
                // Span offsets are only valid for the revision they were computed on.
                let command =
                    ExpectRevisionCommand::new(block.key(), block.revision(), Box::new(replace));
                let importance = if rank == 0 {
                    ActionImportance::High
                } else {
                    ActionImportance::Normal
                };
                EditorAction::new(name, "spelling.replace", Box::new(command))
                    .with_importance(importance)
            })
            .collect()
    }
}

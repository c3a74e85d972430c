//! Built-in analyzers shipped with the editor
//!
//! - Word tokenizing (`words`)
//! - Spell checking against a pluggable dictionary (`spelling`, needs `words`)
//! - Structural validation of headings and region links (`structure`)
//! - Heading prefix trigger (`triggers`)

pub mod heading_trigger;
pub mod spelling;
pub mod structure;
pub mod word_count;

pub use heading_trigger::HeadingTrigger;
pub use spelling::{SpellingAnalyzer, SpellingDictionary, WordListDictionary};
pub use structure::StructureValidator;
pub use word_count::{word_ranges, WordCountAnalyzer};

use super::BlockAnalyzer;
use std::sync::Arc;

/// All built-in analyzers, spell checking against `dictionary`
pub fn builtin_analyzers(dictionary: Arc<dyn SpellingDictionary>) -> Vec<Arc<dyn BlockAnalyzer>> {
    vec![
        Arc::new(WordCountAnalyzer::new()),
        Arc::new(SpellingAnalyzer::new(dictionary)),
        Arc::new(StructureValidator::new()),
        Arc::new(HeadingTrigger::new()),
    ]
}

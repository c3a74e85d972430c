//! Analyzer registry kept in dependency order
//!
//! Providers sort before the analyzers that require their names (Kahn's
//! algorithm, ties broken by registration order). Analyzers caught in a
//! dependency cycle, or depending on one, keep registration order at the end
//! and are reported by [`AnalyzerRegistry::cycles`].

use super::BlockAnalyzer;
use crate::core::{EditorError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registered analyzers in dependency order
#[derive(Default)]
pub struct AnalyzerRegistry {
    /// Registration order
    analyzers: Vec<Arc<dyn BlockAnalyzer>>,
    /// Indices into `analyzers`, providers first
    order: Vec<usize>,
    /// Names that could not be placed after all of their providers
    cyclic: Vec<String>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an analyzer; names must be unique and non-empty
    pub fn register(&mut self, analyzer: Arc<dyn BlockAnalyzer>) -> Result<()> {
        let name = analyzer.info().name.clone();
        if name.is_empty() {
            return Err(EditorError::registration(name, "analyzer name is empty"));
        }
        if self.get(&name).is_some() {
            return Err(EditorError::registration(name, "analyzer is already registered"));
        }

        self.analyzers.push(analyzer);
        self.reorder();
        debug!(analyzer = %name, order = ?self.names(), "analyzer registered");

        if !self.cyclic.is_empty() {
            warn!(
                analyzers = ?self.cyclic,
                "analyzer requirements form a dependency cycle; affected analyzers stay deferred"
            );
        }
        Ok(())
    }

    /// Remove an analyzer by name
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn BlockAnalyzer>> {
        let index = self
            .analyzers
            .iter()
            .position(|analyzer| analyzer.info().name == name)?;
        let removed = self.analyzers.remove(index);
        self.reorder();
        Some(removed)
    }

    /// Look up an analyzer by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn BlockAnalyzer>> {
        self.analyzers
            .iter()
            .find(|analyzer| analyzer.info().name == name)
            .map(Arc::clone)
    }

    /// Analyzers in dependency order
    pub fn ordered(&self) -> Vec<Arc<dyn BlockAnalyzer>> {
        self.order
            .iter()
            .map(|&index| Arc::clone(&self.analyzers[index]))
            .collect()
    }

    /// Analyzer names in dependency order
    pub fn names(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|&index| self.analyzers[index].info().name.clone())
            .collect()
    }

    /// Analyzers in, or downstream of, a dependency cycle
    pub fn cycles(&self) -> &[String] {
        &self.cyclic
    }

    /// Whether an analyzer other than `except` provides `name`
    pub fn provided_by_other(&self, name: &str, except: &str) -> bool {
        self.analyzers
            .iter()
            .any(|analyzer| analyzer.info().name != except && analyzer.info().provides_name(name))
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    fn depends_on(&self, requirer: usize, provider: usize) -> bool {
        requirer != provider
            && self.analyzers[requirer]
                .info()
                .requires
                .iter()
                .any(|name| self.analyzers[provider].info().provides_name(name))
    }

    fn reorder(&mut self) {
        let count = self.analyzers.len();
        let mut indegree: Vec<usize> = (0..count)
            .map(|requirer| {
                (0..count)
                    .filter(|&provider| self.depends_on(requirer, provider))
                    .count()
            })
            .collect();

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(provider) = ready.pop_first() {
            order.push(provider);
            for requirer in 0..count {
                if indegree[requirer] > 0 && self.depends_on(requirer, provider) {
                    indegree[requirer] -= 1;
                    if indegree[requirer] == 0 {
                        ready.insert(requirer);
                    }
                }
            }
        }

        self.cyclic = (0..count)
            .filter(|&i| indegree[i] > 0)
            .map(|i| self.analyzers[i].info().name.clone())
            .collect();
        order.extend((0..count).filter(|&i| indegree[i] > 0));
        self.order = order;
    }
}

impl fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("order", &self.names())
            .field("cyclic", &self.cyclic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{AnalysisContext, AnalyzerInfo, AnalyzerStatus};
    use crate::core::Block;

    struct Stub(AnalyzerInfo);

    impl BlockAnalyzer for Stub {
        fn info(&self) -> &AnalyzerInfo {
            &self.0
        }

        fn analyze(&self, _block: &Block, _context: &mut AnalysisContext<'_>) -> AnalyzerStatus {
            AnalyzerStatus::Succeeded
        }
    }

    fn stub(name: &str, provides: &[&str], requires: &[&str]) -> Arc<dyn BlockAnalyzer> {
        let mut info = AnalyzerInfo::new(name);
        for p in provides {
            info = info.with_provided(*p);
        }
        for r in requires {
            info = info.with_required(*r);
        }
        Arc::new(Stub(info))
    }

    #[test]
    fn providers_sort_first() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(stub("spell", &["spelling"], &["words"])).unwrap();
        registry.register(stub("style", &[], &["spelling", "words"])).unwrap();
        registry.register(stub("count", &["words"], &[])).unwrap();
        assert_eq!(registry.names(), vec!["count", "spell", "style"]);
        assert!(registry.cycles().is_empty());
    }

    #[test]
    fn independent_analyzers_keep_registration_order() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(stub("b", &["x"], &[])).unwrap();
        registry.register(stub("a", &["y"], &[])).unwrap();
        assert_eq!(registry.names(), vec!["b", "a"]);
    }

    #[test]
    fn cycles_are_reported() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(stub("free", &["z"], &[])).unwrap();
        registry.register(stub("a", &["x"], &["y"])).unwrap();
        registry.register(stub("b", &["y"], &["x"])).unwrap();
        registry.register(stub("tail", &[], &["x"])).unwrap();
        assert_eq!(registry.names(), vec!["free", "a", "b", "tail"]);
        assert_eq!(registry.cycles(), ["a", "b", "tail"]);
    }

    #[test]
    fn self_provision_is_not_a_dependency() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(stub("loop", &["x"], &["x"])).unwrap();
        assert!(registry.cycles().is_empty());
        assert!(!registry.provided_by_other("x", "loop"));
    }

    #[test]
    fn duplicate_and_empty_names_rejected() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(stub("words", &[], &[])).unwrap();
        assert!(matches!(
            registry.register(stub("words", &[], &[])),
            Err(EditorError::AnalyzerRegistration { .. })
        ));
        assert!(registry.register(stub("", &[], &[])).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_reorders() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(stub("a", &["x"], &["y"])).unwrap();
        registry.register(stub("b", &["y"], &["x"])).unwrap();
        assert_eq!(registry.cycles().len(), 2);
        assert!(registry.unregister("b").is_some());
        assert!(registry.cycles().is_empty());
        assert!(registry.unregister("b").is_none());
    }
}

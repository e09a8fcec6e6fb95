//! Per-tag merge strategies and the registry resolving them.
//!
//! A strategy binds a [`Matcher`] and a conflict-report policy to a tag.
//! The registry is built once before a merge and read-only afterwards;
//! unregistered tags fall back to whole-subtree equality.

use std::collections::HashMap;

use crate::merge::matcher::Matcher;
use crate::model::types::TagName;

// ---------------------------------------------------------------------------
// ElementStrategy
// ---------------------------------------------------------------------------

/// Merge behavior for one element tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementStrategy {
    matcher: Matcher,
    report_conflicts: bool,
}

impl ElementStrategy {
    /// Strategy with the given matcher, reporting conflicts.
    #[must_use]
    pub const fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            report_conflicts: true,
        }
    }

    /// Strategy with the given matcher that resolves silently.
    ///
    /// Divergences under a silent tag are still resolved by the same rules;
    /// they are just not registered with the sink. Used for housekeeping
    /// elements whose churn is expected (timestamps and the like).
    #[must_use]
    pub const fn silent(matcher: Matcher) -> Self {
        Self {
            matcher,
            report_conflicts: false,
        }
    }

    /// The identity rule for this tag.
    #[must_use]
    pub const fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// `true` if divergences under this tag are registered with the sink.
    #[must_use]
    pub const fn reports_conflicts(&self) -> bool {
        self.report_conflicts
    }
}

// ---------------------------------------------------------------------------
// StrategyRegistry
// ---------------------------------------------------------------------------

/// Tag-to-strategy table consulted by the engine.
#[derive(Clone, Debug)]
pub struct StrategyRegistry {
    strategies: HashMap<TagName, ElementStrategy>,
    fallback: ElementStrategy,
}

impl StrategyRegistry {
    /// Empty registry: every tag resolves to the subtree-equality fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: ElementStrategy::new(Matcher::SubtreeEquality),
        }
    }

    /// The built-in table for the lexicon dialect.
    ///
    /// Keyed tags use their natural identifying attribute; cardinality-one
    /// tags match as singletons. Everything else falls back to subtree
    /// equality.
    #[must_use]
    pub fn lexicon() -> Self {
        let mut registry = Self::new();
        for (tag, key) in [
            ("entry", "id"),
            ("sense", "id"),
            ("form", "lang"),
            ("gloss", "lang"),
            ("field", "type"),
            ("trait", "name"),
        ] {
            registry.register(
                constant_tag(tag),
                ElementStrategy::new(Matcher::KeyAttribute { key: key.into() }),
            );
        }
        for tag in ["text", "gram-info", "definition"] {
            registry.register(
                constant_tag(tag),
                ElementStrategy::new(Matcher::SingletonTag),
            );
        }
        registry
    }

    /// Bind `strategy` to `tag`, replacing any earlier binding.
    pub fn register(&mut self, tag: TagName, strategy: ElementStrategy) {
        self.strategies.insert(tag, strategy);
    }

    /// The strategy for `tag`, falling back to subtree equality.
    #[must_use]
    pub fn resolve(&self, tag: &str) -> &ElementStrategy {
        self.strategies.get(tag).unwrap_or(&self.fallback)
    }

    /// Number of explicitly registered tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// `true` if no tag is explicitly registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn constant_tag(tag: &str) -> TagName {
    TagName::new(tag).expect("built-in tag names are valid")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

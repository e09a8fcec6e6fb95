//! Node identity across document revisions.
//!
//! Three-way merging hinges on deciding which element in one revision is
//! "the same" element in another. Position is useless for that: editors
//! insert, delete, and reorder freely. Identity comes from a closed set of
//! matcher kinds instead, chosen per tag through the strategy registry.

use crate::model::tree::{NodeId, Tree};

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// How elements of one tag are identified across revisions.
///
/// Matching is always scoped to the children of one parent; identity never
/// reaches across subtrees. Text runs are handled by the engine directly
/// (first text child under a matched element), and comments pair up by exact
/// content, so neither appears here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Same tag and same value of a designated key attribute.
    ///
    /// An element lacking the key attribute matches nothing and is treated
    /// as new on its side. Duplicate key values under one parent are
    /// malformed input; the earliest occurrence wins.
    KeyAttribute {
        /// Name of the identifying attribute.
        key: String,
    },

    /// First element with the same tag, regardless of attributes.
    ///
    /// For tags with at most one occurrence per parent.
    SingletonTag,

    /// First element whose whole subtree is structurally identical.
    ///
    /// The fallback for unregistered tags. Deliberately O(children x
    /// subtree); it only ever pairs up elements neither side touched, which
    /// is exactly what an identity-free tag needs.
    SubtreeEquality,
}

impl Matcher {
    /// `true` if `candidate` in `target` is the counterpart of `node` in
    /// `source` under this rule. Both must be elements with the same tag.
    #[must_use]
    pub fn matches(&self, source: &Tree, node: NodeId, target: &Tree, candidate: NodeId) -> bool {
        let (Some(tag), Some(candidate_tag)) = (source.tag(node), target.tag(candidate)) else {
            return false;
        };
        if tag != candidate_tag {
            return false;
        }
        match self {
            Self::KeyAttribute { key } => matches!(
                (source.attribute(node, key), target.attribute(candidate, key)),
                (Some(ours), Some(theirs)) if ours == theirs
            ),
            Self::SingletonTag => true,
            Self::SubtreeEquality => source.subtree_equal(node, target, candidate),
        }
    }

    /// Locate the counterpart of `node` among the element children of
    /// `target_parent`, scanning in document order.
    #[must_use]
    pub fn find_partner(
        &self,
        source: &Tree,
        node: NodeId,
        target: &Tree,
        target_parent: NodeId,
    ) -> Option<NodeId> {
        target
            .element_children(target_parent)
            .find(|&candidate| self.matches(source, node, target, candidate))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

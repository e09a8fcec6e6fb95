//! Structured conflict model — variant types, sinks, and serialization.
//!
//! A conflict is data, not an error: the engine always produces a merged
//! tree and reports every decision it had to force through a
//! [`ConflictSink`]. All conflicts resolve in favor of the local side, so a
//! caller that ignores the sink still gets a deterministic, usable document.
//!
//! # Conflict variants
//!
//! | Variant | Description |
//! |---------|-------------|
//! | [`Conflict::AttributeBothSet`] | Both sides set the same attribute to different values |
//! | [`Conflict::AttributeRemovedVsEdited`] | One side removed an attribute the other edited |
//! | [`Conflict::ElementRemovedVsEdited`] | One side removed an element the other edited |
//! | [`Conflict::ElementBothEdited`] | Both sides produced different content for the same element |
//!
//! # Serialization
//!
//! Tagged JSON with `snake_case` names, for the `--conflicts` report:
//!
//! ```json
//! {
//!   "type": "attribute_both_set",
//!   "element": "form",
//!   "attribute": "lang",
//!   "ours": "en-US",
//!   "theirs": "en-GB",
//!   "ancestor": "en"
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// A divergence the merge resolved by force.
///
/// Each variant carries the element (and attribute) name plus the local,
/// incoming, and ancestor candidates, so a reviewer can reconstruct what was
/// kept and what was dropped. For element-level variants the candidates are
/// serialized subtrees; for text they are the diverging runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Conflict {
    /// Both sides set the same attribute to different values.
    ///
    /// Raised with `ancestor: None` when both sides added the attribute
    /// independently. Resolution: the local value stays.
    AttributeBothSet {
        /// Tag of the element carrying the attribute.
        element: String,
        /// The attribute name.
        attribute: String,
        /// The local value (the one kept).
        ours: String,
        /// The incoming value (the one dropped).
        theirs: String,
        /// The ancestor value, if the attribute existed there.
        ancestor: Option<String>,
    },

    /// One side removed an attribute the other side edited.
    ///
    /// Exactly one of `ours`/`theirs` is `None` (the removing side).
    /// Resolution: the local state stays — removed locally means it stays
    /// removed, edited locally means the edit stays.
    AttributeRemovedVsEdited {
        /// Tag of the element carrying the attribute.
        element: String,
        /// The attribute name.
        attribute: String,
        /// The local value, `None` if removed locally.
        ours: Option<String>,
        /// The incoming value, `None` if removed by the incoming side.
        theirs: Option<String>,
        /// The value both sides started from.
        ancestor: String,
    },

    /// One side removed an element the other side edited.
    ///
    /// Exactly one of `ours`/`theirs` is `None`. Resolution mirrors the
    /// attribute rule: the local state stays, and an incoming edit to a
    /// locally-removed element is dropped (reported, never silently).
    ElementRemovedVsEdited {
        /// Tag of the element in question.
        element: String,
        /// The local subtree, `None` if removed locally.
        ours: Option<String>,
        /// The incoming subtree, `None` if removed by the incoming side.
        theirs: Option<String>,
        /// The subtree both sides started from.
        ancestor: String,
    },

    /// Both sides produced different content for the same element.
    ///
    /// Raised where no finer-grained rule can localize the divergence: a
    /// text run changed differently on both sides, or a whole record kept
    /// local-side under the keep-local policy. `ancestor: None` means both
    /// sides introduced the content independently. Resolution: the local
    /// content stays.
    ElementBothEdited {
        /// Tag of the element in question.
        element: String,
        /// The local content (the one kept).
        ours: String,
        /// The incoming content (the one dropped).
        theirs: String,
        /// The ancestor content, if any existed.
        ancestor: Option<String>,
    },
}

impl Conflict {
    /// Tag of the element this conflict is located at.
    #[must_use]
    pub fn element(&self) -> &str {
        match self {
            Self::AttributeBothSet { element, .. }
            | Self::AttributeRemovedVsEdited { element, .. }
            | Self::ElementRemovedVsEdited { element, .. }
            | Self::ElementBothEdited { element, .. } => element,
        }
    }

    /// The attribute name for the attribute-level variants.
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::AttributeBothSet { attribute, .. }
            | Self::AttributeRemovedVsEdited { attribute, .. } => Some(attribute),
            _ => None,
        }
    }

    /// Return the conflict variant name as a static string.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::AttributeBothSet { .. } => "attribute_both_set",
            Self::AttributeRemovedVsEdited { .. } => "attribute_removed_vs_edited",
            Self::ElementRemovedVsEdited { .. } => "element_removed_vs_edited",
            Self::ElementBothEdited { .. } => "element_both_edited",
        }
    }

    /// `true` if the losing side was a removal.
    #[must_use]
    pub const fn involves_removal(&self) -> bool {
        matches!(
            self,
            Self::AttributeRemovedVsEdited { .. } | Self::ElementRemovedVsEdited { .. }
        )
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeBothSet {
                element,
                attribute,
                ours,
                theirs,
                ..
            } => write!(
                f,
                "attribute {attribute:?} on <{element}> set to {ours:?} here and {theirs:?} there; kept {ours:?}"
            ),
            Self::AttributeRemovedVsEdited {
                element,
                attribute,
                ours,
                ..
            } => match ours {
                Some(value) => write!(
                    f,
                    "attribute {attribute:?} on <{element}> removed there but edited here; kept {value:?}"
                ),
                None => write!(
                    f,
                    "attribute {attribute:?} on <{element}> removed here but edited there; stays removed"
                ),
            },
            Self::ElementRemovedVsEdited { element, ours, .. } => match ours {
                Some(_) => write!(
                    f,
                    "<{element}> removed there but edited here; kept the local version"
                ),
                None => write!(
                    f,
                    "<{element}> removed here but edited there; stays removed"
                ),
            },
            Self::ElementBothEdited { element, .. } => write!(
                f,
                "<{element}> changed differently on both sides; kept the local version"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictSink
// ---------------------------------------------------------------------------

/// Receiver for conflict reports.
///
/// The sink is an explicit parameter of every merge entry point. Merging
/// never fails because a sink saw a conflict; sinks only observe.
pub trait ConflictSink {
    /// Record one conflict.
    fn register(&mut self, conflict: Conflict);
}

/// The explicit default sink: drops every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

impl ConflictSink for DiscardSink {
    fn register(&mut self, _conflict: Conflict) {}
}

/// Accumulates conflicts in order of discovery.
#[derive(Clone, Debug, Default)]
pub struct CollectSink {
    conflicts: Vec<Conflict>,
}

impl CollectSink {
    /// Create an empty sink.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conflicts: Vec::new(),
        }
    }

    /// The conflicts registered so far, in discovery order.
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Consume the sink, returning its conflicts.
    #[must_use]
    pub fn into_conflicts(self) -> Vec<Conflict> {
        self.conflicts
    }

    /// Number of conflicts registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

impl ConflictSink for CollectSink {
    fn register(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }
}

/// Emits every conflict as a `tracing` warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ConflictSink for LogSink {
    fn register(&mut self, conflict: Conflict) {
        tracing::warn!(
            kind = conflict.variant_name(),
            element = conflict.element(),
            "merge conflict: {conflict}"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;

    fn both_set() -> Conflict {
        Conflict::AttributeBothSet {
            element: "form".into(),
            attribute: "lang".into(),
            ours: "en-US".into(),
            theirs: "en-GB".into(),
            ancestor: Some("en".into()),
        }
    }

    // -- accessors --

    #[test]
    fn attribute_both_set_accessors() {
        let c = both_set();
        assert_eq!(c.element(), "form");
        assert_eq!(c.attribute(), Some("lang"));
        assert_eq!(c.variant_name(), "attribute_both_set");
        assert!(!c.involves_removal());
    }

    #[test]
    fn element_variants_have_no_attribute() {
        let c = Conflict::ElementBothEdited {
            element: "text".into(),
            ours: "hello".into(),
            theirs: "howdy".into(),
            ancestor: Some("hi".into()),
        };
        assert_eq!(c.element(), "text");
        assert_eq!(c.attribute(), None);
        assert!(!c.involves_removal());
    }

    #[test]
    fn removal_variants_report_removal() {
        let attr = Conflict::AttributeRemovedVsEdited {
            element: "entry".into(),
            attribute: "date-modified".into(),
            ours: None,
            theirs: Some("2024-06-01".into()),
            ancestor: "2024-01-01".into(),
        };
        let el = Conflict::ElementRemovedVsEdited {
            element: "sense".into(),
            ours: Some("<sense/>".into()),
            theirs: None,
            ancestor: "<sense n=\"1\"/>".into(),
        };
        assert!(attr.involves_removal());
        assert!(el.involves_removal());
    }

    // -- display --

    #[test]
    fn display_names_both_values() {
        let msg = format!("{}", both_set());
        assert!(msg.contains("\"lang\""));
        assert!(msg.contains("<form>"));
        assert!(msg.contains("en-US"));
        assert!(msg.contains("en-GB"));
    }

    #[test]
    fn display_states_which_side_removed() {
        let removed_here = Conflict::ElementRemovedVsEdited {
            element: "sense".into(),
            ours: None,
            theirs: Some("<sense/>".into()),
            ancestor: "<sense/>".into(),
        };
        assert!(format!("{removed_here}").contains("removed here"));

        let removed_there = Conflict::AttributeRemovedVsEdited {
            element: "entry".into(),
            attribute: "order".into(),
            ours: Some("2".into()),
            theirs: None,
            ancestor: "1".into(),
        };
        assert!(format!("{removed_there}").contains("removed there"));
    }

    // -- serde --

    #[test]
    fn serde_tag_is_snake_case() {
        let json = serde_json::to_string(&both_set()).unwrap();
        assert!(json.contains("\"type\":\"attribute_both_set\""));
        assert!(json.contains("\"element\":\"form\""));
        assert!(json.contains("\"ancestor\":\"en\""));
    }

    #[test]
    fn serde_roundtrip_all_variants() {
        let variants = vec![
            both_set(),
            Conflict::AttributeBothSet {
                element: "gram-info".into(),
                attribute: "value".into(),
                ours: "Noun".into(),
                theirs: "Verb".into(),
                ancestor: None,
            },
            Conflict::AttributeRemovedVsEdited {
                element: "entry".into(),
                attribute: "order".into(),
                ours: Some("3".into()),
                theirs: None,
                ancestor: "1".into(),
            },
            Conflict::ElementRemovedVsEdited {
                element: "sense".into(),
                ours: None,
                theirs: Some("<sense n=\"2\"/>".into()),
                ancestor: "<sense/>".into(),
            },
            Conflict::ElementBothEdited {
                element: "text".into(),
                ours: "hello".into(),
                theirs: "howdy".into(),
                ancestor: None,
            },
        ];
        for conflict in &variants {
            let json = serde_json::to_string(conflict).unwrap();
            let decoded: Conflict = serde_json::from_str(&json).unwrap();
            assert_eq!(&decoded, conflict);
            let tag = format!("\"type\":\"{}\"", conflict.variant_name());
            assert!(json.contains(&tag), "missing {tag} in {json}");
        }
    }

    // -- sinks --

    #[test]
    fn collect_sink_keeps_discovery_order() {
        let mut sink = CollectSink::new();
        assert!(sink.is_empty());
        sink.register(both_set());
        sink.register(Conflict::ElementBothEdited {
            element: "text".into(),
            ours: "a".into(),
            theirs: "b".into(),
            ancestor: None,
        });
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.conflicts()[0].variant_name(), "attribute_both_set");
        assert_eq!(sink.conflicts()[1].variant_name(), "element_both_edited");

        let owned = sink.into_conflicts();
        assert_eq!(owned.len(), 2);
    }

    #[test]
    fn discard_sink_drops_everything() {
        let mut sink = DiscardSink;
        sink.register(both_set());
        // Nothing to observe; the call just must not panic.
    }

    #[test]
    fn log_sink_does_not_panic_without_subscriber() {
        let mut sink = LogSink;
        sink.register(both_set());
    }
}

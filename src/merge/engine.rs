//! The three-way tree merge.
//!
//! `merge_trees` reconciles a local and an incoming revision against their
//! common ancestor. The output is a new tree seeded from the local side;
//! the incoming and ancestor trees are read-only probes. Divergences resolve
//! deterministically (the local side wins every tie) and are reported
//! through the caller's [`ConflictSink`]; the merge itself only fails on a
//! structural precondition, never on content.
//!
//! Per element pair the engine runs three phases: the attribute union walk,
//! the two-pass child reconciliation (incoming side first, then local
//! leftovers), and the first-text-child value merge. Multiple text runs
//! under one element are not disambiguated; the first run carries the
//! mergeable value and any others ride along with their subtree.

use std::collections::HashSet;

use thiserror::Error;

use crate::merge::conflict::{Conflict, ConflictSink};
use crate::merge::strategy::StrategyRegistry;
use crate::model::tree::{NodeId, Tree};
use crate::xml::write_node;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural precondition failures. Conflicts are never errors.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The two sides do not even agree on the document root.
    #[error("root tag mismatch: local document has <{ours}>, incoming document has <{theirs}>")]
    RootMismatch {
        /// Root tag of the local document.
        ours: String,
        /// Root tag of the incoming document.
        theirs: String,
    },

    /// The ancestor belongs to a different kind of document.
    #[error("root tag mismatch: documents have <{ours}>, ancestor has <{ancestor}>")]
    AncestorRootMismatch {
        /// Root tag shared by both sides.
        ours: String,
        /// Root tag of the ancestor document.
        ancestor: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Merge `theirs` into `ours` against `ancestor`.
///
/// With `ancestor: None` the merge degenerates to a two-way union: every
/// divergence looks like both sides adding independently. All three input
/// trees are left untouched.
///
/// # Errors
///
/// Fails only when the root tags disagree.
pub fn merge_trees(
    ours: &Tree,
    theirs: &Tree,
    ancestor: Option<&Tree>,
    registry: &StrategyRegistry,
    sink: &mut dyn ConflictSink,
) -> Result<Tree, MergeError> {
    let ours_tag = ours.tag(ours.root()).unwrap_or_default();
    let theirs_tag = theirs.tag(theirs.root()).unwrap_or_default();
    if ours_tag != theirs_tag {
        return Err(MergeError::RootMismatch {
            ours: ours_tag.to_owned(),
            theirs: theirs_tag.to_owned(),
        });
    }
    if let Some(a) = ancestor {
        let ancestor_tag = a.tag(a.root()).unwrap_or_default();
        if ancestor_tag != ours_tag {
            return Err(MergeError::AncestorRootMismatch {
                ours: ours_tag.to_owned(),
                ancestor: ancestor_tag.to_owned(),
            });
        }
    }

    let mut out = ours.clone();
    let out_root = out.root();
    merge_element_into(
        &mut out,
        out_root,
        theirs,
        theirs.root(),
        ancestor.map(|a| (a, a.root())),
        registry,
        sink,
    );
    Ok(out)
}

/// Recursive workhorse: reconcile one matched element pair in place.
///
/// `out_node` is the local element inside the output tree; `theirs_node` its
/// counterpart on the incoming side; `ancestor` the counterpart in the
/// common ancestor when one exists. Also driven directly by the record-level
/// merge, which pairs up records on its own.
pub(crate) fn merge_element_into(
    out: &mut Tree,
    out_node: NodeId,
    theirs: &Tree,
    theirs_node: NodeId,
    ancestor: Option<(&Tree, NodeId)>,
    registry: &StrategyRegistry,
    sink: &mut dyn ConflictSink,
) {
    let Some(tag) = out.tag(out_node).map(str::to_owned) else {
        return;
    };
    merge_attributes(out, out_node, theirs, theirs_node, ancestor, &tag, registry, sink);
    merge_children(out, out_node, theirs, theirs_node, ancestor, registry, sink);
    merge_text(out, out_node, theirs, theirs_node, ancestor, &tag, registry, sink);
}

/// Register `conflict` unless the element's strategy resolves silently.
pub(crate) fn report(registry: &StrategyRegistry, sink: &mut dyn ConflictSink, conflict: Conflict) {
    let tag = conflict.element();
    if registry.resolve(tag).reports_conflicts() {
        sink.register(conflict);
    } else {
        tracing::debug!(
            kind = conflict.variant_name(),
            element = tag,
            "conflict resolved silently"
        );
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn merge_attributes(
    out: &mut Tree,
    out_node: NodeId,
    theirs: &Tree,
    theirs_node: NodeId,
    ancestor: Option<(&Tree, NodeId)>,
    tag: &str,
    registry: &StrategyRegistry,
    sink: &mut dyn ConflictSink,
) {
    // Union of names, local order first so adopted attributes land at the end.
    let mut names: Vec<String> = Vec::new();
    for map in [
        out.attributes(out_node),
        theirs.attributes(theirs_node),
    ]
    .into_iter()
    .flatten()
    {
        for name in map.keys() {
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
    }

    for name in names {
        let ours_value = out.attribute(out_node, &name).map(str::to_owned);
        let theirs_value = theirs.attribute(theirs_node, &name).map(str::to_owned);
        let ancestor_value = ancestor
            .and_then(|(a_tree, a_node)| a_tree.attribute(a_node, &name).map(str::to_owned));

        match (ours_value, theirs_value, ancestor_value) {
            // Dropped on both sides, or never present.
            (None, None, _) => {}

            // Incoming addition.
            (None, Some(theirs_value), None) => {
                tracing::debug!(element = %tag, attribute = %name, "adopted incoming attribute");
                out.set_attribute(out_node, &name, &theirs_value);
            }

            // Removed locally; stays removed. Conflicts when the incoming
            // side edited the value we dropped.
            (None, Some(theirs_value), Some(ancestor_value)) => {
                if ancestor_value != theirs_value {
                    report(
                        registry,
                        sink,
                        Conflict::AttributeRemovedVsEdited {
                            element: tag.to_owned(),
                            attribute: name.clone(),
                            ours: None,
                            theirs: Some(theirs_value),
                            ancestor: ancestor_value,
                        },
                    );
                }
            }

            // Agreement.
            (Some(ours_value), Some(theirs_value), _) if ours_value == theirs_value => {}

            // Both added, differently.
            (Some(ours_value), Some(theirs_value), None) => {
                report(
                    registry,
                    sink,
                    Conflict::AttributeBothSet {
                        element: tag.to_owned(),
                        attribute: name.clone(),
                        ours: ours_value,
                        theirs: theirs_value,
                        ancestor: None,
                    },
                );
            }

            (Some(ours_value), Some(theirs_value), Some(ancestor_value)) => {
                if ancestor_value == ours_value {
                    // Clean incoming edit.
                    out.set_attribute(out_node, &name, &theirs_value);
                } else if ancestor_value == theirs_value {
                    // Clean local edit; keep it.
                } else {
                    report(
                        registry,
                        sink,
                        Conflict::AttributeBothSet {
                            element: tag.to_owned(),
                            attribute: name.clone(),
                            ours: ours_value,
                            theirs: theirs_value,
                            ancestor: Some(ancestor_value),
                        },
                    );
                }
            }

            // Incoming removal.
            (Some(ours_value), None, Some(ancestor_value)) => {
                if ancestor_value == ours_value {
                    out.remove_attribute(out_node, &name);
                } else {
                    report(
                        registry,
                        sink,
                        Conflict::AttributeRemovedVsEdited {
                            element: tag.to_owned(),
                            attribute: name.clone(),
                            ours: Some(ours_value),
                            theirs: None,
                            ancestor: ancestor_value,
                        },
                    );
                }
            }

            // Local addition; keep.
            (Some(_), None, None) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

fn merge_children(
    out: &mut Tree,
    out_node: NodeId,
    theirs: &Tree,
    theirs_node: NodeId,
    ancestor: Option<(&Tree, NodeId)>,
    registry: &StrategyRegistry,
    sink: &mut dyn ConflictSink,
) {
    // Snapshots: appends and removals below must not disturb iteration, and
    // appended children must not become match candidates.
    let ours_snapshot: Vec<NodeId> = out.children(out_node).to_vec();
    let theirs_snapshot: Vec<NodeId> = theirs.children(theirs_node).to_vec();
    let mut claimed: HashSet<NodeId> = HashSet::new();

    // Pass 1: walk the incoming side. Each incoming child either claims its
    // local counterpart, turns out to be deleted locally, or is new.
    for &t_child in &theirs_snapshot {
        if theirs.is_text(t_child) {
            continue;
        }
        if let Some(content) = theirs.comment(t_child) {
            merge_incoming_comment(out, out_node, &ours_snapshot, &mut claimed, content, ancestor);
            continue;
        }
        let Some(child_tag) = theirs.tag(t_child) else {
            continue;
        };
        let matcher = registry.resolve(child_tag).matcher();
        let partner = ours_snapshot
            .iter()
            .copied()
            .filter(|id| !claimed.contains(id))
            .find(|&candidate| matcher.matches(theirs, t_child, out, candidate));
        let ancestor_partner = ancestor.and_then(|(a_tree, a_node)| {
            matcher
                .find_partner(theirs, t_child, a_tree, a_node)
                .map(|a_child| (a_tree, a_child))
        });

        match partner {
            Some(o_child) => {
                claimed.insert(o_child);
                if out.subtree_equal(o_child, theirs, t_child) {
                    continue;
                }
                // Both sides still carry the element; recurse. A pair absent
                // from the ancestor merges against nothing, so divergences
                // surface through the nested attribute and text rules.
                merge_element_into(
                    out,
                    o_child,
                    theirs,
                    t_child,
                    ancestor_partner,
                    registry,
                    sink,
                );
            }
            None => match ancestor_partner {
                None => {
                    tracing::debug!(element = %child_tag, "adopted new incoming element");
                    let copy = out.adopt(theirs, t_child);
                    out.append_child(out_node, copy);
                }
                Some((a_tree, a_child)) => {
                    if a_tree.subtree_equal(a_child, theirs, t_child) {
                        // Deleted locally, untouched there; stays deleted.
                        tracing::debug!(element = %child_tag, "kept local deletion");
                    } else {
                        report(
                            registry,
                            sink,
                            Conflict::ElementRemovedVsEdited {
                                element: child_tag.to_owned(),
                                ours: None,
                                theirs: Some(write_node(theirs, t_child)),
                                ancestor: write_node(a_tree, a_child),
                            },
                        );
                    }
                }
            },
        }
    }

    // Pass 2: local children nothing on the incoming side claimed. Each is
    // either a local addition (keep), an incoming deletion (propagate when
    // untouched locally), or a removed-vs-edited conflict (keep).
    for &o_child in &ours_snapshot {
        if claimed.contains(&o_child) || out.is_text(o_child) {
            continue;
        }
        if out.is_comment(o_child) {
            let deleted_by_theirs = match (out.comment(o_child), ancestor) {
                (Some(content), Some((a_tree, a_node))) => has_comment(a_tree, a_node, content),
                _ => false,
            };
            if deleted_by_theirs {
                out.remove_child(out_node, o_child);
            }
            continue;
        }
        let Some(child_tag) = out.tag(o_child).map(str::to_owned) else {
            continue;
        };
        let matcher = registry.resolve(&child_tag).matcher();
        let Some((a_tree, a_child)) = ancestor.and_then(|(a_tree, a_node)| {
            matcher
                .find_partner(out, o_child, a_tree, a_node)
                .map(|a_child| (a_tree, a_child))
        }) else {
            // Local addition.
            continue;
        };
        if out.subtree_equal(o_child, a_tree, a_child) {
            tracing::debug!(element = %child_tag, "propagated incoming deletion");
            out.remove_child(out_node, o_child);
        } else {
            report(
                registry,
                sink,
                Conflict::ElementRemovedVsEdited {
                    element: child_tag.clone(),
                    ours: Some(write_node(out, o_child)),
                    theirs: None,
                    ancestor: write_node(a_tree, a_child),
                },
            );
        }
    }
}

/// Comments pair up by exact content; divergent content is two different
/// comments, so no conflict can arise.
fn merge_incoming_comment(
    out: &mut Tree,
    out_node: NodeId,
    ours_snapshot: &[NodeId],
    claimed: &mut HashSet<NodeId>,
    content: &str,
    ancestor: Option<(&Tree, NodeId)>,
) {
    let twin = ours_snapshot
        .iter()
        .copied()
        .filter(|id| !claimed.contains(id))
        .find(|&id| out.comment(id) == Some(content));
    if let Some(id) = twin {
        claimed.insert(id);
        return;
    }
    let deleted_locally =
        ancestor.is_some_and(|(a_tree, a_node)| has_comment(a_tree, a_node, content));
    if !deleted_locally {
        let copy = out.new_comment(content);
        out.append_child(out_node, copy);
    }
}

fn has_comment(tree: &Tree, parent: NodeId, content: &str) -> bool {
    tree.children(parent)
        .iter()
        .any(|&id| tree.comment(id) == Some(content))
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Degenerate three-way value merge over the first text child.
#[allow(clippy::too_many_arguments)]
fn merge_text(
    out: &mut Tree,
    out_node: NodeId,
    theirs: &Tree,
    theirs_node: NodeId,
    ancestor: Option<(&Tree, NodeId)>,
    tag: &str,
    registry: &StrategyRegistry,
    sink: &mut dyn ConflictSink,
) {
    let ours_text = out
        .first_text_child(out_node)
        .and_then(|id| out.text(id))
        .map(str::to_owned);
    let theirs_text = theirs
        .first_text_child(theirs_node)
        .and_then(|id| theirs.text(id))
        .map(str::to_owned);
    let ancestor_text = ancestor.and_then(|(a_tree, a_node)| {
        a_tree
            .first_text_child(a_node)
            .and_then(|id| a_tree.text(id))
            .map(str::to_owned)
    });

    match (ours_text, theirs_text, ancestor_text) {
        (None, None, _) => {}
        (Some(ours_text), Some(theirs_text), _) if ours_text == theirs_text => {}

        // Incoming addition.
        (None, Some(theirs_text), None) => {
            let id = out.new_text(&theirs_text);
            out.append_child(out_node, id);
        }

        // Removed locally; stays removed either way.
        (None, Some(theirs_text), Some(ancestor_text)) => {
            if ancestor_text != theirs_text {
                tracing::debug!(element = %tag, "dropped incoming text edit, run removed locally");
            }
        }

        // Both added, differently.
        (Some(ours_text), Some(theirs_text), None) => {
            report(
                registry,
                sink,
                Conflict::ElementBothEdited {
                    element: tag.to_owned(),
                    ours: ours_text,
                    theirs: theirs_text,
                    ancestor: None,
                },
            );
        }

        (Some(ours_text), Some(theirs_text), Some(ancestor_text)) => {
            if ancestor_text == ours_text {
                // Clean incoming edit.
                if let Some(id) = out.first_text_child(out_node) {
                    out.set_text(id, &theirs_text);
                }
            } else if ancestor_text == theirs_text {
                // Clean local edit; keep it.
            } else {
                report(
                    registry,
                    sink,
                    Conflict::ElementBothEdited {
                        element: tag.to_owned(),
                        ours: ours_text,
                        theirs: theirs_text,
                        ancestor: Some(ancestor_text),
                    },
                );
            }
        }

        // Incoming removal.
        (Some(ours_text), None, Some(ancestor_text)) => {
            if ancestor_text == ours_text {
                if let Some(id) = out.first_text_child(out_node) {
                    out.remove_child(out_node, id);
                }
            } else {
                tracing::debug!(element = %tag, "kept local text edit, run removed on the incoming side");
            }
        }

        // Local addition; keep.
        (Some(_), None, None) => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

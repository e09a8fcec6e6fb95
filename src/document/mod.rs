//! Record-level orchestration of the three-way merge.
//!
//! A lexicon document is a flat run of records under one root element. The
//! orchestrator pairs records across the three revisions by their stable
//! identifier attribute, decides per record whether anything diverged, and
//! only then hands the pair to the tree engine (or to the keep-local
//! policy). The root shell of the output, tag, attributes, and the opaque
//! version header, always comes from the local side, as do root-level
//! comments.
//!
//! Pairing is by identifier only, never by position, so records can be
//! reordered freely on either side without looking like edits.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::interfaces::RecordSink;
use crate::merge::conflict::{Conflict, ConflictSink};
use crate::merge::engine::{self, MergeError, merge_element_into};
use crate::merge::strategy::StrategyRegistry;
use crate::model::tree::{NodeId, Tree};
use crate::model::types::{RecordId, ValidationError};
use crate::xml::{ParseError, parse_document, write_document, write_node};

/// Attribute carrying the stable record identifier.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Attribute trusted for the cheap no-divergence check.
pub const DEFAULT_MODIFIED_ATTRIBUTE: &str = "date-modified";

/// Tag of the synthetic child preserving a losing record revision.
pub const DEFAULT_MARKER_TAG: &str = "merge-conflict";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which of the three input documents an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentSide {
    /// The local revision ("ours").
    Local,
    /// The incoming revision ("theirs").
    Incoming,
    /// The common ancestor.
    Ancestor,
}

impl fmt::Display for DocumentSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Incoming => "incoming",
            Self::Ancestor => "ancestor",
        })
    }
}

/// Fatal document-level failures. Merge conflicts are data, not errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// One of the three documents does not parse.
    #[error("malformed {side} document")]
    Parse {
        /// Which document failed.
        side: DocumentSide,
        /// The underlying syntax error.
        #[source]
        source: ParseError,
    },

    /// A record lacks the identifier attribute entirely.
    #[error("record <{tag}> at position {} is missing the {attribute:?} attribute", index + 1)]
    MissingRecordId {
        /// Tag of the offending record.
        tag: String,
        /// Zero-based position among the root's element children.
        index: usize,
        /// The attribute that was expected.
        attribute: String,
    },

    /// A record carries an identifier the id rules reject.
    #[error("record <{tag}> has an unusable identifier")]
    InvalidRecordId {
        /// Tag of the offending record.
        tag: String,
        /// Why the value was rejected.
        #[source]
        source: ValidationError,
    },

    /// Two records in one document share an identifier.
    #[error("duplicate record identifier {id:?}")]
    DuplicateRecordId {
        /// The repeated identifier value.
        id: String,
    },

    /// Structural precondition from the tree engine.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

// ---------------------------------------------------------------------------
// Record enumeration
// ---------------------------------------------------------------------------

/// The records of a document in order: every element child of the root,
/// keyed by its identifier attribute.
///
/// Shared with the file-fold protocol, which enforces the same shape on
/// update files.
///
/// # Errors
///
/// Fails when a record lacks the attribute, carries an unusable value, or
/// repeats an identifier seen earlier in the same document.
pub fn records_by_id(
    tree: &Tree,
    id_attribute: &str,
) -> Result<Vec<(RecordId, NodeId)>, DocumentError> {
    let mut records = Vec::new();
    let mut seen: HashSet<RecordId> = HashSet::new();
    for (index, node) in tree.element_children(tree.root()).enumerate() {
        let tag = tree.tag(node).unwrap_or_default().to_owned();
        let Some(value) = tree.attribute(node, id_attribute) else {
            return Err(DocumentError::MissingRecordId {
                tag,
                index,
                attribute: id_attribute.to_owned(),
            });
        };
        let id = RecordId::new(value)
            .map_err(|source| DocumentError::InvalidRecordId { tag, source })?;
        if !seen.insert(id.clone()) {
            return Err(DocumentError::DuplicateRecordId {
                id: id.as_str().to_owned(),
            });
        }
        records.push((id, node));
    }
    Ok(records)
}

/// Feed every record of `tree` to `sink`, in document order.
///
/// # Errors
///
/// Same identifier requirements as [`records_by_id`].
pub fn stream_records(
    tree: &Tree,
    id_attribute: &str,
    sink: &mut dyn RecordSink,
) -> Result<(), DocumentError> {
    for (id, node) in records_by_id(tree, id_attribute)? {
        sink.record(&id, tree, node);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DocumentMerger
// ---------------------------------------------------------------------------

/// What to do with a record pair that genuinely diverged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordMergePolicy {
    /// Field-level reconciliation through the tree engine.
    #[default]
    TreeMerge,
    /// The local record wins wholesale; the incoming revision is preserved,
    /// escaped, under a synthetic marker child so nothing is silently lost.
    KeepOursWithMarker,
}

/// Merges documents record by record.
#[derive(Clone, Debug)]
pub struct DocumentMerger {
    registry: StrategyRegistry,
    policy: RecordMergePolicy,
    id_attribute: String,
    modified_attribute: String,
    marker_tag: String,
}

impl DocumentMerger {
    /// Merger over the given registry with the default record policy and
    /// attribute names.
    #[must_use]
    pub fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            policy: RecordMergePolicy::default(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_owned(),
            modified_attribute: DEFAULT_MODIFIED_ATTRIBUTE.to_owned(),
            marker_tag: DEFAULT_MARKER_TAG.to_owned(),
        }
    }

    /// Replace the divergent-record policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RecordMergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the identifier attribute name.
    #[must_use]
    pub fn with_id_attribute(mut self, attribute: &str) -> Self {
        self.id_attribute = attribute.to_owned();
        self
    }

    /// Replace the modification-timestamp attribute name.
    #[must_use]
    pub fn with_modified_attribute(mut self, attribute: &str) -> Self {
        self.modified_attribute = attribute.to_owned();
        self
    }

    /// Replace the tag used for keep-local marker children.
    #[must_use]
    pub fn with_marker_tag(mut self, tag: &str) -> Self {
        self.marker_tag = tag.to_owned();
        self
    }

    /// The identifier attribute this merger pairs records by.
    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Parse three document strings and merge them.
    ///
    /// # Errors
    ///
    /// Fails on malformed input, records without usable identifiers, or a
    /// root-tag mismatch. Conflicts go to the sink, never into the error.
    pub fn merge_documents(
        &self,
        ours: &str,
        theirs: &str,
        ancestor: Option<&str>,
        sink: &mut dyn ConflictSink,
    ) -> Result<String, DocumentError> {
        let ours_tree = parse_document(ours).map_err(|source| DocumentError::Parse {
            side: DocumentSide::Local,
            source,
        })?;
        let theirs_tree = parse_document(theirs).map_err(|source| DocumentError::Parse {
            side: DocumentSide::Incoming,
            source,
        })?;
        let ancestor_tree = ancestor
            .map(|text| {
                parse_document(text).map_err(|source| DocumentError::Parse {
                    side: DocumentSide::Ancestor,
                    source,
                })
            })
            .transpose()?;
        let merged = self.merge_parsed(&ours_tree, &theirs_tree, ancestor_tree.as_ref(), sink)?;
        Ok(write_document(&merged))
    }

    /// Merge already-parsed documents record by record.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::merge_documents`], minus parsing.
    pub fn merge_parsed(
        &self,
        ours: &Tree,
        theirs: &Tree,
        ancestor: Option<&Tree>,
        sink: &mut dyn ConflictSink,
    ) -> Result<Tree, DocumentError> {
        let ours_root_tag = ours.tag(ours.root()).unwrap_or_default();
        let theirs_root_tag = theirs.tag(theirs.root()).unwrap_or_default();
        if ours_root_tag != theirs_root_tag {
            return Err(MergeError::RootMismatch {
                ours: ours_root_tag.to_owned(),
                theirs: theirs_root_tag.to_owned(),
            }
            .into());
        }
        if let Some(a) = ancestor {
            let ancestor_root_tag = a.tag(a.root()).unwrap_or_default();
            if ancestor_root_tag != ours_root_tag {
                return Err(MergeError::AncestorRootMismatch {
                    ours: ours_root_tag.to_owned(),
                    ancestor: ancestor_root_tag.to_owned(),
                }
                .into());
            }
        }

        let ours_records = records_by_id(ours, &self.id_attribute)?;
        let theirs_records = records_by_id(theirs, &self.id_attribute)?;
        let ancestor_records = match ancestor {
            Some(a) => records_by_id(a, &self.id_attribute)?,
            None => Vec::new(),
        };
        let ours_ids: HashMap<NodeId, &RecordId> =
            ours_records.iter().map(|(id, node)| (*node, id)).collect();
        let theirs_index: HashMap<&RecordId, NodeId> = theirs_records
            .iter()
            .map(|(id, node)| (id, *node))
            .collect();
        let ancestor_index: HashMap<&RecordId, NodeId> = ancestor_records
            .iter()
            .map(|(id, node)| (id, *node))
            .collect();

        // Root shell from the local side, version header and all.
        let mut out = Tree::new(ours_root_tag);
        if let Some(attributes) = ours.attributes(ours.root()) {
            for (name, value) in attributes {
                out.set_attribute(out.root(), name, value);
            }
        }
        let out_root = out.root();

        let mut consumed: HashSet<RecordId> = HashSet::new();
        for &child in ours.children(ours.root()) {
            if !ours.is_element(child) {
                // Root-level comments ride along with the local side.
                let copy = out.adopt(ours, child);
                out.append_child(out_root, copy);
                continue;
            }
            let Some(&id) = ours_ids.get(&child) else {
                continue;
            };
            let ancestor_pair = ancestor
                .and_then(|a_tree| ancestor_index.get(id).map(|&a_node| (a_tree, a_node)));

            let Some(&t_node) = theirs_index.get(id) else {
                // Absent on the incoming side.
                match ancestor_pair {
                    None => {
                        // New locally.
                        let copy = out.adopt(ours, child);
                        out.append_child(out_root, copy);
                    }
                    Some((a_tree, a_node)) => {
                        if ours.subtree_equal(child, a_tree, a_node) {
                            tracing::debug!(record = %id, "propagated incoming record deletion");
                        } else {
                            engine::report(
                                &self.registry,
                                sink,
                                Conflict::ElementRemovedVsEdited {
                                    element: ours.tag(child).unwrap_or_default().to_owned(),
                                    ours: Some(write_node(ours, child)),
                                    theirs: None,
                                    ancestor: write_node(a_tree, a_node),
                                },
                            );
                            let copy = out.adopt(ours, child);
                            out.append_child(out_root, copy);
                        }
                    }
                }
                continue;
            };

            consumed.insert(id.clone());
            if self.records_probably_equal(ours, child, theirs, t_node) {
                let copy = out.adopt(ours, child);
                out.append_child(out_root, copy);
                continue;
            }
            match self.policy {
                RecordMergePolicy::TreeMerge => {
                    let out_record = out.adopt(ours, child);
                    out.append_child(out_root, out_record);
                    merge_element_into(
                        &mut out,
                        out_record,
                        theirs,
                        t_node,
                        ancestor_pair,
                        &self.registry,
                        sink,
                    );
                }
                RecordMergePolicy::KeepOursWithMarker => {
                    tracing::debug!(record = %id, "kept local record wholesale");
                    let out_record = out.adopt(ours, child);
                    out.append_child(out_root, out_record);
                    self.attach_marker(&mut out, out_record, theirs, t_node);
                    engine::report(
                        &self.registry,
                        sink,
                        Conflict::ElementBothEdited {
                            element: ours.tag(child).unwrap_or_default().to_owned(),
                            ours: write_node(ours, child),
                            theirs: write_node(theirs, t_node),
                            ancestor: ancestor_pair
                                .map(|(a_tree, a_node)| write_node(a_tree, a_node)),
                        },
                    );
                }
            }
        }

        // Incoming-side leftovers, in their document order.
        for (id, t_node) in &theirs_records {
            if consumed.contains(id) {
                continue;
            }
            match ancestor.and_then(|a_tree| ancestor_index.get(id).map(|&n| (a_tree, n))) {
                None => {
                    tracing::debug!(record = %id, "adopted new incoming record");
                    let copy = out.adopt(theirs, *t_node);
                    out.append_child(out_root, copy);
                }
                Some((a_tree, a_node)) => {
                    if a_tree.subtree_equal(a_node, theirs, *t_node) {
                        tracing::debug!(record = %id, "kept local record deletion");
                    } else {
                        engine::report(
                            &self.registry,
                            sink,
                            Conflict::ElementRemovedVsEdited {
                                element: theirs.tag(*t_node).unwrap_or_default().to_owned(),
                                ours: None,
                                theirs: Some(write_node(theirs, *t_node)),
                                ancestor: write_node(a_tree, a_node),
                            },
                        );
                    }
                }
            }
        }

        Ok(out)
    }

    /// Records count as unchanged when their modification stamps agree, or
    /// failing that when their canonical serializations hash alike. Stamps
    /// are trusted: editors bump them on every write, so an equal non-empty
    /// stamp short-circuits the content comparison.
    fn records_probably_equal(
        &self,
        ours: &Tree,
        ours_node: NodeId,
        theirs: &Tree,
        theirs_node: NodeId,
    ) -> bool {
        if let (Some(ours_stamp), Some(theirs_stamp)) = (
            ours.attribute(ours_node, &self.modified_attribute),
            theirs.attribute(theirs_node, &self.modified_attribute),
        ) {
            if !ours_stamp.is_empty() && ours_stamp == theirs_stamp {
                return true;
            }
        }
        fingerprint(ours, ours_node) == fingerprint(theirs, theirs_node)
    }

    /// Preserve the losing incoming record, escaped, under a marker child.
    fn attach_marker(&self, out: &mut Tree, record: NodeId, theirs: &Tree, theirs_node: NodeId) {
        let marker = out.new_element(&self.marker_tag);
        out.set_attribute(marker, "date-created", &utc_timestamp_now());
        let preserved = out.new_text(&write_node(theirs, theirs_node));
        out.append_child(marker, preserved);
        out.append_child(record, marker);
    }
}

impl Default for DocumentMerger {
    fn default() -> Self {
        Self::new(StrategyRegistry::lexicon())
    }
}

/// Content fingerprint over the canonical subtree serialization.
fn fingerprint(tree: &Tree, node: NodeId) -> [u8; 32] {
    Sha256::digest(write_node(tree, node).as_bytes()).into()
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current UTC time in ISO 8601 format, without pulling in a calendar crate.
///
/// Falls back to the epoch if the system clock is unavailable.
fn utc_timestamp_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_utc_timestamp(secs)
}

fn format_utc_timestamp(secs: u64) -> String {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;
    let (year, month, day) = days_to_ymd(secs / 86_400);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Convert days since the Unix epoch to (year, month, day), Gregorian.
const fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    // Era-based civil-calendar arithmetic over 400-year cycles; exact for
    // any date after the epoch.
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use crate::merge::conflict::CollectSink;

    fn merge(ours: &str, theirs: &str, ancestor: &str) -> (String, Vec<Conflict>) {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let merged = merger
            .merge_documents(ours, theirs, Some(ancestor), &mut sink)
            .unwrap();
        (merged, sink.into_conflicts())
    }

    // -- record enumeration --

    #[test]
    fn missing_record_id_is_a_format_error() {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let err = merger
            .merge_documents(
                r#"<lexicon><entry id="a"/><entry/></lexicon>"#,
                "<lexicon/>",
                None,
                &mut sink,
            )
            .unwrap_err();
        // Positions are reported one-based.
        assert!(err.to_string().contains("position 2"), "{err}");
        match err {
            DocumentError::MissingRecordId {
                tag,
                index,
                attribute,
            } => {
                assert_eq!(tag, "entry");
                assert_eq!(index, 1);
                assert_eq!(attribute, "id");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_record_id_is_rejected() {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let err = merger
            .merge_documents(r#"<lexicon><entry id=""/></lexicon>"#, "<lexicon/>", None, &mut sink)
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidRecordId { .. }));
    }

    #[test]
    fn duplicate_record_ids_are_rejected() {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let err = merger
            .merge_documents(
                r#"<lexicon><entry id="a"/><entry id="a"/></lexicon>"#,
                "<lexicon/>",
                None,
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateRecordId { id } if id == "a"));
    }

    #[test]
    fn stream_records_visits_in_document_order() {
        let tree = parse_document(r#"<lexicon><entry id="b"/><entry id="a"/></lexicon>"#).unwrap();
        let mut order = Vec::new();
        let mut sink = |id: &RecordId, _: &Tree, _: NodeId| {
            order.push(id.as_str().to_owned());
        };
        stream_records(&tree, "id", &mut sink).unwrap();
        assert_eq!(order, ["b", "a"]);
    }

    #[test]
    fn malformed_incoming_document_names_its_side() {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let err = merger
            .merge_documents("<lexicon/>", "<lexicon><entry id=", None, &mut sink)
            .unwrap_err();
        assert!(err.to_string().contains("incoming"));
    }

    // -- record pairing --

    #[test]
    fn record_sets_union_in_document_order() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a"/><entry id="b"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="c"/></lexicon>"#,
            r#"<lexicon><entry id="a"/></lexicon>"#,
        );
        assert!(conflicts.is_empty());
        let a = merged.find("id=\"a\"").unwrap();
        let b = merged.find("id=\"b\"").unwrap();
        let c = merged.find("id=\"c\"").unwrap();
        assert!(a < b && b < c, "expected a, b, c in order: {merged}");
        assert_eq!(merged.matches("<entry").count(), 3);
    }

    #[test]
    fn reordered_records_are_not_edits() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="b"/><entry id="a"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="b"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="b"/></lexicon>"#,
        );
        assert!(conflicts.is_empty());
        // Local order wins.
        assert!(merged.find("id=\"b\"").unwrap() < merged.find("id=\"a\"").unwrap());
    }

    #[test]
    fn incoming_record_deletion_propagates() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a"/><entry id="b"/></lexicon>"#,
            r#"<lexicon><entry id="a"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="b"/></lexicon>"#,
        );
        assert!(conflicts.is_empty());
        assert!(!merged.contains("id=\"b\""));
    }

    #[test]
    fn record_removed_here_but_edited_there_stays_removed() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="b" order="2"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="b" order="1"/></lexicon>"#,
        );
        assert!(!merged.contains("id=\"b\""));
        assert_eq!(conflicts.len(), 1);
        assert!(matches!(
            &conflicts[0],
            Conflict::ElementRemovedVsEdited { ours: None, .. }
        ));
    }

    #[test]
    fn record_removed_there_but_edited_here_is_kept() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a"/><entry id="b" order="2"/></lexicon>"#,
            r#"<lexicon><entry id="a"/></lexicon>"#,
            r#"<lexicon><entry id="a"/><entry id="b" order="1"/></lexicon>"#,
        );
        assert!(merged.contains("id=\"b\""));
        assert_eq!(conflicts.len(), 1);
        assert!(matches!(
            &conflicts[0],
            Conflict::ElementRemovedVsEdited { theirs: None, .. }
        ));
    }

    #[test]
    fn divergent_records_merge_field_by_field() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a"><form lang="en"><text>house</text></form><form lang="de"><text>Haus</text></form></entry></lexicon>"#,
            r#"<lexicon><entry id="a"><form lang="en"><text>home</text></form></entry></lexicon>"#,
            r#"<lexicon><entry id="a"><form lang="en"><text>house</text></form></entry></lexicon>"#,
        );
        assert!(conflicts.is_empty());
        assert!(merged.contains("home"));
        assert!(merged.contains("Haus"));
        assert!(!merged.contains("house"));
    }

    // -- cheap no-divergence check --

    #[test]
    fn equal_modification_stamps_short_circuit_content() {
        // Content differs, stamps agree: the local record is emitted as-is
        // and nothing is reported.
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a" date-modified="2024-06-01T00:00:00Z" order="1"/></lexicon>"#,
            r#"<lexicon><entry id="a" date-modified="2024-06-01T00:00:00Z" order="2"/></lexicon>"#,
            r#"<lexicon><entry id="a" date-modified="2024-01-01T00:00:00Z" order="0"/></lexicon>"#,
        );
        assert!(conflicts.is_empty());
        assert!(merged.contains("order=\"1\""));
        assert!(!merged.contains("order=\"2\""));
    }

    #[test]
    fn empty_stamps_do_not_short_circuit() {
        let (merged, conflicts) = merge(
            r#"<lexicon><entry id="a" date-modified="" order="2"/></lexicon>"#,
            r#"<lexicon><entry id="a" date-modified="" order="3"/></lexicon>"#,
            r#"<lexicon><entry id="a" date-modified="" order="1"/></lexicon>"#,
        );
        assert!(merged.contains("order=\"2\""));
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn identical_content_without_stamps_is_unchanged() {
        let doc = r#"<lexicon><entry id="a"><form lang="en"><text>hi</text></form></entry></lexicon>"#;
        let (merged, conflicts) = merge(doc, doc, r"<lexicon/>");
        assert!(conflicts.is_empty());
        assert_eq!(merged.matches("<entry").count(), 1);
    }

    // -- keep-local policy --

    #[test]
    fn keep_ours_policy_attaches_escaped_marker() {
        let merger =
            DocumentMerger::default().with_policy(RecordMergePolicy::KeepOursWithMarker);
        let mut sink = CollectSink::new();
        let merged = merger
            .merge_documents(
                r#"<lexicon><entry id="a" order="2"/></lexicon>"#,
                r#"<lexicon><entry id="a" order="3"/></lexicon>"#,
                Some(r#"<lexicon><entry id="a" order="1"/></lexicon>"#),
                &mut sink,
            )
            .unwrap();
        // Local record wins; the incoming one survives escaped in the marker.
        assert!(merged.contains("order=\"2\""));
        assert!(merged.contains("<merge-conflict"));
        assert!(merged.contains("date-created="));
        assert!(merged.contains("&lt;entry"));
        assert_eq!(sink.len(), 1);
        assert!(matches!(
            &sink.conflicts()[0],
            Conflict::ElementBothEdited { .. }
        ));

        // Round-trip: the preserved revision is text, not markup.
        let tree = parse_document(&merged).unwrap();
        let records: Vec<_> = tree.element_children(tree.root()).collect();
        assert_eq!(records.len(), 1);
        let marker = tree.element_children(records[0]).next().unwrap();
        assert_eq!(tree.tag(marker), Some("merge-conflict"));
        let text = tree
            .first_text_child(marker)
            .and_then(|t| tree.text(t))
            .unwrap();
        assert_eq!(text, "<entry id=\"a\" order=\"3\"/>");
    }

    #[test]
    fn keep_ours_policy_leaves_clean_records_alone() {
        let merger =
            DocumentMerger::default().with_policy(RecordMergePolicy::KeepOursWithMarker);
        let mut sink = CollectSink::new();
        let doc = r#"<lexicon><entry id="a" order="1"/></lexicon>"#;
        let merged = merger
            .merge_documents(doc, doc, Some(doc), &mut sink)
            .unwrap();
        assert!(!merged.contains("merge-conflict"));
        assert!(sink.is_empty());
    }

    // -- root shell --

    #[test]
    fn root_shell_comes_from_the_local_side() {
        let (merged, _) = merge(
            r#"<lexicon version="0.13"><!-- curated --><entry id="a"/></lexicon>"#,
            r#"<lexicon version="0.14"><!-- upstream --><entry id="a"/></lexicon>"#,
            r#"<lexicon version="0.13"><entry id="a"/></lexicon>"#,
        );
        assert!(merged.contains("version=\"0.13\""));
        assert!(merged.contains("<!-- curated -->"));
        assert!(!merged.contains("upstream"));
    }

    #[test]
    fn two_way_merge_unions_records() {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let merged = merger
            .merge_documents(
                r#"<lexicon><entry id="a"/></lexicon>"#,
                r#"<lexicon><entry id="b"/></lexicon>"#,
                None,
                &mut sink,
            )
            .unwrap();
        assert!(merged.contains("id=\"a\""));
        assert!(merged.contains("id=\"b\""));
        assert!(sink.is_empty());
    }

    #[test]
    fn root_mismatch_is_an_error() {
        let merger = DocumentMerger::default();
        let mut sink = CollectSink::new();
        let err = merger
            .merge_documents("<lexicon/>", "<dictionary/>", None, &mut sink)
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Merge(MergeError::RootMismatch { .. })
        ));
    }

    // -- timestamps --

    #[test]
    fn timestamp_format_is_iso_utc() {
        assert_eq!(format_utc_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_utc_timestamp(1_704_067_200), "2024-01-01T00:00:00Z");
        assert_eq!(format_utc_timestamp(951_827_696), "2000-02-29T12:34:56Z");
        let now = utc_timestamp_now();
        assert_eq!(now.len(), 20);
        assert!(now.ends_with('Z'));
    }
}

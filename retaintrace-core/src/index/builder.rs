use std::collections::{HashSet, VecDeque};

use tracing::instrument;

use crate::id::ObjectId;
use crate::leaf::{is_leaf_array_class, is_leaf_instance_class, is_weak_reference_hierarchy};
use crate::oracle::{GraphOracle, NodeKind, OracleError, RootKind};

use super::reverse_index::ReverseIndex;

/// The strong GC-root ids a run starts from, alongside their kind (kept
/// for output, not used by the sweep itself beyond the strong/weak
/// split).
pub type StrongRoots = Vec<(ObjectId, RootKind)>;

/// Forward breadth-first sweep from the strong GC roots, recording
/// every traversed `parent -> child` edge as `child -> parent` in the
/// reverse index.
///
/// Returns the reverse index and the strong-root set actually used as
/// sweep starting points. A field-read error is fatal (the snapshot is
/// corrupt); a missing referenced object is silently dropped, per the
/// design's failure semantics.
#[instrument(skip(oracle))]
pub fn build_reverse_index(oracle: &dyn GraphOracle) -> Result<(ReverseIndex, StrongRoots), OracleError> {
    let strong_roots: StrongRoots = oracle
        .gc_roots()
        .into_iter()
        .filter(|(_, kind)| kind.is_strong())
        .collect();

    let mut index = ReverseIndex::new();
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();

    for (root_id, _) in &strong_roots {
        if visited.insert(*root_id) {
            queue.push_back(*root_id);
        }
    }

    while let Some(parent_id) = queue.pop_front() {
        let Some(kind) = oracle.node_kind(parent_id) else {
            // A root (or a child enqueued earlier) that no longer
            // resolves to anything: drop it silently.
            continue;
        };

        match kind {
            NodeKind::Instance { class_name } => {
                if is_leaf_instance_class(&class_name)
                    || is_weak_reference_hierarchy(&oracle.class_hierarchy(parent_id))
                {
                    continue;
                }
                for field in oracle.instance_fields(parent_id)? {
                    visit_child(oracle, &mut index, &mut visited, &mut queue, parent_id, field.value);
                }
            }
            NodeKind::ObjectArray { class_name } => {
                if is_leaf_array_class(&class_name) {
                    continue;
                }
                for element in oracle.array_elements(parent_id)? {
                    visit_child(oracle, &mut index, &mut visited, &mut queue, parent_id, element);
                }
            }
            NodeKind::ClassObject { .. } => {
                // Class objects are never leaves: their static fields
                // are always indexed.
                for field in oracle.static_fields(parent_id)? {
                    visit_child(oracle, &mut index, &mut visited, &mut queue, parent_id, field.value);
                }
            }
            NodeKind::PrimitiveArray => {
                // No outgoing references.
            }
        }
    }

    Ok((index, strong_roots))
}

/// Shared logic for instance fields, array elements, and static
/// fields: resolve the child, skip it if it doesn't exist or is a leaf
/// child, record the edge, and enqueue it for further traversal.
fn visit_child(
    oracle: &dyn GraphOracle,
    index: &mut ReverseIndex,
    visited: &mut HashSet<ObjectId>,
    queue: &mut VecDeque<ObjectId>,
    parent_id: ObjectId,
    child: Option<ObjectId>,
) {
    let Some(child_id) = child else {
        return;
    };
    let Some(child_kind) = oracle.node_kind(child_id) else {
        // Referenced id doesn't exist in the snapshot: drop silently.
        return;
    };
    if is_leaf_child(&child_kind) {
        return;
    }

    index.record_edge(parent_id, child_id);
    if visited.insert(child_id) {
        queue.push_back(child_id);
    }
}

/// A child is a leaf (excluded from the reverse index as a key) if it
/// is a leaf-instance class or a primitive array. Leaf array classes
/// (`String[]`) are excluded only as *parents*, not as children — they
/// can still be meaningful intermediate nodes on a path.
fn is_leaf_child(kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Instance { class_name } => is_leaf_instance_class(class_name),
        NodeKind::PrimitiveArray => true,
        NodeKind::ObjectArray { .. } | NodeKind::ClassObject { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FieldRef;
    use std::collections::HashMap as StdHashMap;

    /// Minimal oracle for exercising the sweep without a real snapshot.
    struct TestOracle {
        nodes: StdHashMap<ObjectId, NodeKind>,
        fields: StdHashMap<ObjectId, Vec<FieldRef>>,
        elements: StdHashMap<ObjectId, Vec<Option<ObjectId>>>,
        hierarchy: StdHashMap<ObjectId, Vec<String>>,
        roots: Vec<(ObjectId, RootKind)>,
        meta: crate::oracle::SnapshotMeta,
    }

    impl TestOracle {
        fn new() -> Self {
            Self {
                nodes: StdHashMap::new(),
                fields: StdHashMap::new(),
                elements: StdHashMap::new(),
                hierarchy: StdHashMap::new(),
                roots: Vec::new(),
                meta: crate::oracle::SnapshotMeta {
                    file_path: std::path::PathBuf::from("test.hprof"),
                    file_size_bytes: 0,
                    heap_dump_timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
                    hprof_version: "TEST PROFILE 1.0".to_string(),
                    pointer_size_bits: 64,
                    class_count: 0,
                    instance_count: 0,
                    object_array_count: 0,
                    primitive_array_count: 0,
                    gc_root_count: 0,
                },
            }
        }

        fn instance(mut self, id: u64, class: &str, fields: &[(&str, Option<u64>)]) -> Self {
            let oid = ObjectId::new(id);
            self.nodes.insert(
                oid,
                NodeKind::Instance {
                    class_name: class.to_string(),
                },
            );
            self.fields.insert(
                oid,
                fields
                    .iter()
                    .map(|(n, v)| FieldRef {
                        name: n.to_string(),
                        value: v.map(ObjectId::new),
                    })
                    .collect(),
            );
            self.hierarchy.insert(oid, vec![class.to_string()]);
            self
        }

        fn object_array(mut self, id: u64, class: &str, elements: &[Option<u64>]) -> Self {
            let oid = ObjectId::new(id);
            self.nodes.insert(
                oid,
                NodeKind::ObjectArray {
                    class_name: class.to_string(),
                },
            );
            self.elements
                .insert(oid, elements.iter().map(|e| e.map(ObjectId::new)).collect());
            self
        }

        fn primitive_array(mut self, id: u64) -> Self {
            self.nodes.insert(ObjectId::new(id), NodeKind::PrimitiveArray);
            self
        }

        fn root(mut self, id: u64, kind: RootKind) -> Self {
            self.roots.push((ObjectId::new(id), kind));
            self
        }
    }

    impl GraphOracle for TestOracle {
        fn meta(&self) -> &crate::oracle::SnapshotMeta {
            &self.meta
        }
        fn exists(&self, id: ObjectId) -> bool {
            self.nodes.contains_key(&id)
        }
        fn node_kind(&self, id: ObjectId) -> Option<NodeKind> {
            self.nodes.get(&id).cloned()
        }
        fn class_hierarchy(&self, id: ObjectId) -> Vec<String> {
            self.hierarchy.get(&id).cloned().unwrap_or_default()
        }
        fn instance_fields(&self, id: ObjectId) -> Result<Vec<FieldRef>, OracleError> {
            Ok(self.fields.get(&id).cloned().unwrap_or_default())
        }
        fn array_elements(&self, id: ObjectId) -> Result<Vec<Option<ObjectId>>, OracleError> {
            Ok(self.elements.get(&id).cloned().unwrap_or_default())
        }
        fn static_fields(&self, id: ObjectId) -> Result<Vec<FieldRef>, OracleError> {
            Ok(self.fields.get(&id).cloned().unwrap_or_default())
        }
        fn iter_instances<'a>(&'a self) -> Box<dyn Iterator<Item = ObjectId> + 'a> {
            Box::new(self.nodes.keys().copied())
        }
        fn gc_roots(&self) -> Vec<(ObjectId, RootKind)> {
            self.roots.clone()
        }
    }

    #[test]
    fn simple_chain_records_reverse_edges() {
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("next", Some(2))])
            .instance(2, "A", &[("field", Some(3))])
            .instance(3, "Target", &[]);

        let (index, roots) = build_reverse_index(&oracle).unwrap();
        assert_eq!(roots, vec![(ObjectId::new(1), RootKind::JniGlobal)]);
        assert_eq!(index.parents_of(ObjectId::new(2)), &[ObjectId::new(1)]);
        assert_eq!(index.parents_of(ObjectId::new(3)), &[ObjectId::new(2)]);
    }

    #[test]
    fn weak_root_kinds_are_excluded_from_the_sweep() {
        let oracle = TestOracle::new()
            .root(1, RootKind::Unreachable)
            .instance(1, "Root", &[("next", Some(2))])
            .instance(2, "A", &[]);

        let (index, roots) = build_reverse_index(&oracle).unwrap();
        assert!(roots.is_empty());
        assert!(index.parents_of(ObjectId::new(2)).is_empty());
    }

    #[test]
    fn leaf_instance_class_is_not_indexed_as_a_child() {
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("s", Some(2))])
            .instance(2, "String", &[]);

        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert!(index.parents_of(ObjectId::new(2)).is_empty());
    }

    #[test]
    fn leaf_instance_class_does_not_descend_into_its_own_fields() {
        // A String with a (hypothetical) reference field must not have
        // that field's target attributed to it as a parent.
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("s", Some(2))])
            .instance(2, "String", &[("value", Some(3))])
            .instance(3, "char[]", &[]);

        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert!(index.parents_of(ObjectId::new(3)).is_empty());
    }

    #[test]
    fn primitive_arrays_are_always_leaf_children() {
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("buf", Some(2))])
            .primitive_array(2);

        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert!(index.parents_of(ObjectId::new(2)).is_empty());
    }

    #[test]
    fn string_array_is_a_valid_child_but_not_a_parent() {
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("names", Some(2))])
            .object_array(2, "String[]", &[Some(3)])
            .instance(3, "String", &[]);

        let (index, _) = build_reverse_index(&oracle).unwrap();
        // String[] itself is a recorded child of Root...
        assert_eq!(index.parents_of(ObjectId::new(2)), &[ObjectId::new(1)]);
        // ...but it never descends into its own elements.
        assert!(index.parents_of(ObjectId::new(3)).is_empty());
    }

    #[test]
    fn synthetic_fields_are_excluded_by_the_oracle_contract() {
        // The oracle contract excludes `<`-prefixed fields before
        // handing them to the builder; verify the builder trusts that
        // and does not need its own filter.
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("real", Some(2))])
            .instance(2, "A", &[]);
        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert_eq!(index.parents_of(ObjectId::new(2)), &[ObjectId::new(1)]);
    }

    #[test]
    fn missing_referenced_object_is_dropped_silently() {
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("ghost", Some(99))]);

        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert_eq!(index.entry_count(), 0);
    }

    #[test]
    fn class_object_static_fields_are_always_indexed() {
        let oid = ObjectId::new(1);
        let mut oracle = TestOracle::new().root(1, RootKind::JniGlobal);
        oracle.nodes.insert(
            oid,
            NodeKind::ClassObject {
                class_name: "Holder".to_string(),
            },
        );
        oracle.fields.insert(
            oid,
            vec![FieldRef {
                name: "INSTANCE".to_string(),
                value: Some(ObjectId::new(2)),
            }],
        );
        let oracle = oracle.instance(2, "Holder", &[]);

        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert_eq!(index.parents_of(ObjectId::new(2)), &[oid]);
    }

    #[test]
    fn duplicate_edges_from_two_fields_are_both_kept() {
        let oracle = TestOracle::new()
            .root(1, RootKind::JniGlobal)
            .instance(1, "Root", &[("a", Some(2)), ("b", Some(2))])
            .instance(2, "Shared", &[]);
        let (index, _) = build_reverse_index(&oracle).unwrap();
        assert_eq!(
            index.parents_of(ObjectId::new(2)),
            &[ObjectId::new(1), ObjectId::new(1)]
        );
    }
}

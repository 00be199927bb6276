//! Edge Resolver: reopens each `parent -> child` pair of a surviving
//! path via the Graph Oracle to recover the field or array index that
//! explains the edge, for display only. The walker itself never calls
//! into this module — it deals purely in `ObjectId`s.

use tracing::warn;

use crate::id::ObjectId;
use crate::oracle::{GraphOracle, NodeKind};

/// One hop in a resolved, human-readable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A declared instance field or a class object's static field.
    Field { owner_class: String, field_name: String },
    /// An object-array element.
    ArrayIndex { owner_class: String, index: usize },
    /// The edge exists (it came from the reverse index) but no field
    /// or element currently resolves to `child` — the oracle's view
    /// and the cached index have drifted, or the field was not found
    /// due to a collision resolved elsewhere.
    Unknown { owner_class: String },
}

/// Resolves every edge along `root_id -> ... -> target_id`
/// (`ids_from_target` reversed, with `target_id` appended) into a
/// sequence of `Step`s, one per edge. Consecutive equal ids (the
/// `parent == child` case the walker's root handling can produce) are
/// skipped, never resolved.
pub fn resolve_path(oracle: &dyn GraphOracle, ids_from_target: &[ObjectId], target_id: ObjectId) -> Vec<Step> {
    let mut chain: Vec<ObjectId> = ids_from_target.iter().rev().copied().collect();
    chain.push(target_id);

    let mut steps = Vec::with_capacity(chain.len().saturating_sub(1));
    for window in chain.windows(2) {
        let (parent, child) = (window[0], window[1]);
        if parent == child {
            continue;
        }
        steps.push(resolve_edge(oracle, parent, child));
    }
    steps
}

fn resolve_edge(oracle: &dyn GraphOracle, parent: ObjectId, child: ObjectId) -> Step {
    let Some(kind) = oracle.node_kind(parent) else {
        warn!(%parent, %child, "edge resolver: parent no longer resolves in the snapshot");
        return Step::Unknown { owner_class: "?".to_string() };
    };

    match kind {
        NodeKind::Instance { class_name } => resolve_fields(oracle, parent, child, &class_name, |o, id| o.instance_fields(id)),
        NodeKind::ClassObject { class_name } => resolve_fields(oracle, parent, child, &class_name, |o, id| o.static_fields(id)),
        NodeKind::ObjectArray { class_name } => {
            let elements = match oracle.array_elements(parent) {
                Ok(elements) => elements,
                Err(e) => {
                    warn!(%parent, %child, error = %e, "edge resolver: failed reading array elements");
                    return Step::Unknown { owner_class: class_name };
                }
            };
            match elements.iter().position(|e| *e == Some(child)) {
                Some(index) => Step::ArrayIndex { owner_class: class_name, index },
                None => {
                    warn!(%parent, %child, "edge resolver: no array element resolves to child");
                    Step::Unknown { owner_class: class_name }
                }
            }
        }
        NodeKind::PrimitiveArray => {
            warn!(%parent, %child, "edge resolver: primitive array has no outgoing references");
            Step::Unknown { owner_class: "?".to_string() }
        }
    }
}

fn resolve_fields(
    oracle: &dyn GraphOracle,
    parent: ObjectId,
    child: ObjectId,
    class_name: &str,
    read_fields: impl Fn(&dyn GraphOracle, ObjectId) -> Result<Vec<crate::oracle::FieldRef>, crate::oracle::OracleError>,
) -> Step {
    let fields = match read_fields(oracle, parent) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(%parent, %child, error = %e, "edge resolver: failed reading fields");
            return Step::Unknown { owner_class: class_name.to_string() };
        }
    };
    // First-declared-wins on collisions: `position` returns the first match.
    match fields.iter().position(|f| f.value == Some(child)) {
        Some(i) => Step::Field {
            owner_class: class_name.to_string(),
            field_name: fields[i].name.clone(),
        },
        None => {
            warn!(%parent, %child, "edge resolver: no field resolves to child");
            Step::Unknown { owner_class: class_name.to_string() }
        }
    }
}

//! Grouper & Reporter: turns resolved paths into a small set of
//! diverse groups, ordered for display, plus the dependent-target
//! summary. The actual text rendering lives behind `OutputFormatter`
//! so alternate formats can be added without touching the grouping
//! logic.

use std::collections::HashMap;

use crate::id::ObjectId;
use crate::oracle::{RootKind, SnapshotMeta};
use crate::resolver::Step;

/// A fully resolved retention chain for one target, ready for display.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub target_id: ObjectId,
    pub target_class: String,
    pub root_id: ObjectId,
    pub root_kind: RootKind,
    pub steps: Vec<Step>,
}

impl ResolvedPath {
    /// The signature used to group paths: steps joined with ` -> `,
    /// array indices erased to `[*]` so permutations of the same
    /// structural path collapse together (invariant #6).
    pub fn signature(&self) -> String {
        let mut parts = Vec::with_capacity(self.steps.len() + 2);
        parts.push(format!("Root[{}]", self.root_kind));
        for step in &self.steps {
            parts.push(match step {
                Step::Field { owner_class, field_name } => format!("{owner_class}.{field_name}"),
                Step::ArrayIndex { owner_class, .. } => format!("{owner_class}[*]"),
                Step::Unknown { owner_class } => format!("{owner_class}.?"),
            });
        }
        parts.push(self.target_class.clone());
        parts.join(" -> ")
    }

    /// The literal rendering of one path line, array indices intact.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.steps.len() + 2);
        parts.push(format!("Root[{}, {}]", self.root_kind, self.root_id));
        for step in &self.steps {
            parts.push(match step {
                Step::Field { owner_class, field_name } => format!("{owner_class}.{field_name}"),
                Step::ArrayIndex { owner_class, index } => format!("{owner_class}[{index}]"),
                Step::Unknown { owner_class } => format!("{owner_class}.?"),
            });
        }
        parts.push(format!("{}@{}", self.target_class, self.target_id));
        parts.join(" -> ")
    }
}

/// One row in the final report: a signature shared by one or more
/// targets, with the first path observed kept as the exemplar.
#[derive(Debug, Clone)]
pub struct Group {
    pub signature: String,
    pub exemplar: ResolvedPath,
    pub target_ids: Vec<ObjectId>,
}

/// A target for which the walker found zero surviving records: it is
/// implicitly retained by some other reported path.
#[derive(Debug, Clone)]
pub struct DependentGroup {
    pub class_name: String,
    pub target_ids: Vec<ObjectId>,
}

/// Groups every `(target, path)` pair by signature, preserving
/// first-seen signature order (invariant #7), then sorts groups by
/// target count descending (stable for ties).
pub fn group_paths(paths: impl IntoIterator<Item = ResolvedPath>) -> Vec<Group> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();
    let mut seen_targets_per_signature: HashMap<String, std::collections::HashSet<ObjectId>> = HashMap::new();

    for path in paths {
        let signature = path.signature();
        let seen = seen_targets_per_signature.entry(signature.clone()).or_default();
        if !seen.insert(path.target_id) {
            // Same target already counted under this signature from an
            // earlier surviving record; defensive de-dup.
            continue;
        }

        match groups.get_mut(&signature) {
            Some(group) => group.target_ids.push(path.target_id),
            None => {
                order.push(signature.clone());
                groups.insert(
                    signature.clone(),
                    Group { signature, exemplar: path.clone(), target_ids: vec![path.target_id] },
                );
            }
        }
    }

    let mut result: Vec<Group> = order.into_iter().map(|sig| groups.remove(&sig).expect("signature tracked in order")).collect();
    result.sort_by(|a, b| b.target_ids.len().cmp(&a.target_ids.len()));
    result
}

/// Groups dependent targets by class name, preserving first-seen
/// class-name order.
pub fn group_dependents(dependents: impl IntoIterator<Item = (ObjectId, String)>) -> Vec<DependentGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, DependentGroup> = HashMap::new();

    for (target_id, class_name) in dependents {
        match groups.get_mut(&class_name) {
            Some(group) => group.target_ids.push(target_id),
            None => {
                order.push(class_name.clone());
                groups.insert(class_name.clone(), DependentGroup { class_name, target_ids: vec![target_id] });
            }
        }
    }

    order.into_iter().map(|name| groups.remove(&name).expect("class name tracked in order")).collect()
}

/// Abstraction over the presentation layer: given the finished
/// analysis, produce the report text. The core only ever implements
/// `TextReport`; alternate renderings are an external concern.
pub trait OutputFormatter {
    fn format(&self, meta: &SnapshotMeta, groups: &[Group], dependents: &[DependentGroup]) -> String;
}

/// The plain-text report format.
pub struct TextReport {
    pub tool_name: &'static str,
    pub tool_version: &'static str,
}

impl TextReport {
    pub fn new(tool_name: &'static str, tool_version: &'static str) -> Self {
        Self { tool_name, tool_version }
    }
}

impl OutputFormatter for TextReport {
    fn format(&self, meta: &SnapshotMeta, groups: &[Group], dependents: &[DependentGroup]) -> String {
        let mut out = String::new();

        let size_mb = meta.file_size_bytes as f64 / (1024.0 * 1024.0);
        out.push_str(&format!("# {} {}\n", self.tool_name, self.tool_version));
        out.push_str(&format!("# File: {}\n", meta.file_path.display()));
        out.push_str(&format!("# Size: {size_mb:.1} MB\n"));
        out.push_str(&format!(
            "# Heap dump timestamp: {}\n",
            meta.heap_dump_timestamp.format("%Y-%m-%d %H:%M:%S %Z")
        ));
        out.push_str(&format!("# Hprof version: {}\n", meta.hprof_version));
        out.push_str(&format!("# JVM pointer size: {}-bit\n", meta.pointer_size_bits));
        out.push_str(&format!(
            "# Objects: {} ({} classes, {} instances, {} object arrays, {} primitive arrays)\n",
            meta.class_count + meta.instance_count + meta.object_array_count + meta.primitive_array_count,
            meta.class_count,
            meta.instance_count,
            meta.object_array_count,
            meta.primitive_array_count,
        ));
        out.push_str(&format!("# GC roots: {}\n", meta.gc_root_count));

        for group in groups {
            out.push('\n');
            if group.target_ids.len() == 1 {
                out.push_str(&format!("# {}@{}\n", group.exemplar.target_class, group.target_ids[0]));
            } else {
                out.push_str(&format!("# {} ({} instances)\n", group.exemplar.target_class, group.target_ids.len()));
            }
            out.push_str(&group.exemplar.render());
            out.push('\n');
        }

        for dependent in dependents {
            out.push('\n');
            out.push_str(&format!(
                "# {} ({} instances) \u{2014} held by a path above\n",
                dependent.class_name,
                dependent.target_ids.len()
            ));
        }

        out
    }
}

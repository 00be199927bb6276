//! The read-only view of a heap snapshot that the path-discovery core
//! consumes. Nothing in this crate parses a snapshot file directly —
//! everything it needs comes through a `GraphOracle` implementation
//! (see the `retaintrace-hprof` crate for a real one, or
//! `FixtureOracle` in the test suite for an in-memory one).

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::id::ObjectId;

/// GC root kinds, per the JVM heap-dump format. Only the "strong"
/// kinds keep their referent alive for the purposes of this tool; the
/// rest are excluded from the reverse-index sweep and from path
/// discovery entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
    JniMonitor,
    ReferenceCleanup,
    VmInternal,
    StickyClass,
    Finalizing,
    Debugger,
    Unreachable,
    InternedString,
    Unknown,
}

impl RootKind {
    /// Strong roots are the only ones the reverse-index sweep starts
    /// from and the only ones the walker can stop at.
    pub fn is_strong(self) -> bool {
        matches!(
            self,
            RootKind::JniGlobal
                | RootKind::JniLocal
                | RootKind::JavaFrame
                | RootKind::NativeStack
                | RootKind::ThreadBlock
                | RootKind::MonitorUsed
                | RootKind::ThreadObject
                | RootKind::JniMonitor
                | RootKind::ReferenceCleanup
                | RootKind::VmInternal
        )
    }
}

impl std::fmt::Display for RootKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RootKind::JniGlobal => "JniGlobal",
            RootKind::JniLocal => "JniLocal",
            RootKind::JavaFrame => "JavaFrame",
            RootKind::NativeStack => "NativeStack",
            RootKind::ThreadBlock => "ThreadBlock",
            RootKind::MonitorUsed => "MonitorUsed",
            RootKind::ThreadObject => "ThreadObject",
            RootKind::JniMonitor => "JniMonitor",
            RootKind::ReferenceCleanup => "ReferenceCleanup",
            RootKind::VmInternal => "VmInternal",
            RootKind::StickyClass => "StickyClass",
            RootKind::Finalizing => "Finalizing",
            RootKind::Debugger => "Debugger",
            RootKind::Unreachable => "Unreachable",
            RootKind::InternedString => "InternedString",
            RootKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// The tagged variant over heap node kinds described in the design
/// notes: the walker's hot path never branches on this, only the
/// index builder and the edge resolver do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Instance { class_name: String },
    ObjectArray { class_name: String },
    ClassObject { class_name: String },
    PrimitiveArray,
}

impl NodeKind {
    pub fn class_name(&self) -> Option<&str> {
        match self {
            NodeKind::Instance { class_name }
            | NodeKind::ObjectArray { class_name }
            | NodeKind::ClassObject { class_name } => Some(class_name),
            NodeKind::PrimitiveArray => None,
        }
    }
}

/// A declared field or array element, resolved to the object id it
/// points at (`None` for a null reference).
#[derive(Debug, Clone)]
pub struct FieldRef {
    pub name: String,
    pub value: Option<ObjectId>,
}

/// Header metadata surfaced verbatim in the report's comment block.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    pub heap_dump_timestamp: DateTime<Utc>,
    pub hprof_version: String,
    pub pointer_size_bits: u8,
    pub class_count: u64,
    pub instance_count: u64,
    pub object_array_count: u64,
    pub primitive_array_count: u64,
    pub gc_root_count: u64,
}

/// An error reading a field or element from the snapshot. Per the
/// design, this is the one fatal condition in the reverse-index sweep:
/// a missing or corrupt field means the snapshot itself is corrupt.
#[derive(Debug, Clone)]
pub struct OracleError(pub String);

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "snapshot read error: {}", self.0)
    }
}

impl std::error::Error for OracleError {}

/// Read-only access to the heap graph. This is the boundary the
/// distilled spec calls an external collaborator: the path-discovery
/// core is written entirely against this trait and never assumes a
/// particular snapshot format.
pub trait GraphOracle {
    /// Snapshot-level metadata for the report header.
    fn meta(&self) -> &SnapshotMeta;

    /// Whether an object id refers to a live object in the snapshot.
    fn exists(&self, id: ObjectId) -> bool;

    /// The kind of node an id refers to, or `None` if it doesn't exist.
    fn node_kind(&self, id: ObjectId) -> Option<NodeKind>;

    /// The ancestry chain of class names for `id`'s class, nearest
    /// first (used only to test membership in the weak-reference
    /// hierarchy). Empty for ids that are not instances.
    fn class_hierarchy(&self, id: ObjectId) -> Vec<String>;

    /// Declared instance fields, in declaration order, with `<`-prefixed
    /// synthetic fields already excluded.
    fn instance_fields(&self, id: ObjectId) -> Result<Vec<FieldRef>, OracleError>;

    /// Object-array elements, in index order (`None` for a null slot).
    /// The index resolving to a given child is its position in this
    /// vector, not carried separately.
    fn array_elements(&self, id: ObjectId) -> Result<Vec<Option<ObjectId>>, OracleError>;

    /// Static fields of a class object, same `<`-prefix rule as
    /// instance fields.
    fn static_fields(&self, class_obj_id: ObjectId) -> Result<Vec<FieldRef>, OracleError>;

    /// All instance-scan-order object ids the analysis should consider
    /// as potential path targets (used by the CLI's leak selector, not
    /// by the core itself).
    fn iter_instances<'a>(&'a self) -> Box<dyn Iterator<Item = ObjectId> + 'a>;

    /// The full GC-root set, in enumeration order.
    fn gc_roots(&self) -> Vec<(ObjectId, RootKind)>;
}

//! An HPROF binary heap dump, exposed as a [`retaintrace_core::GraphOracle`].
//!
//! Parsing is a two-pass scan (see [`parse`]): the first resolves
//! string and class metadata, the second decodes instance/array data
//! and GC roots against it. Nothing here is specific to any one JVM
//! vendor's writer beyond the record layout itself.

mod format;
mod parse;
mod reader;

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{instrument, warn};

use retaintrace_core::{FieldRef, GraphOracle, NodeKind, ObjectId, OracleError, RootKind, SnapshotMeta};

use format::BasicType;
use parse::HprofSnapshot;
use reader::Cursor;

pub struct HprofOracle {
    snapshot: HprofSnapshot,
}

/// Reads and parses an HPROF file at `path` into a queryable oracle.
#[instrument]
pub fn load(path: &Path) -> anyhow::Result<HprofOracle> {
    let data = fs::read(path).with_context(|| format!("reading snapshot file {}", path.display()))?;
    let snapshot = parse::parse(path, &data).with_context(|| format!("parsing HPROF snapshot {}", path.display()))?;
    Ok(HprofOracle { snapshot })
}

fn decode_object_field(cursor: &mut Cursor<'_>) -> anyhow::Result<Option<ObjectId>> {
    let id = cursor.read_id()?;
    Ok(if id == 0 { None } else { Some(ObjectId::new(id)) })
}

impl HprofOracle {
    fn decode_instance_fields(&self, class_obj_id: u64, raw: &[u8]) -> Result<Vec<FieldRef>, OracleError> {
        let field_defs = self.snapshot.flatten_instance_fields(class_obj_id);
        let mut cursor = Cursor::new(raw, self.snapshot.id_size);
        let mut fields = Vec::with_capacity(field_defs.len());
        for (name, ty) in field_defs {
            if name.starts_with('<') {
                // Synthetic field: still occupies bytes in the layout,
                // just skip past it without recording it.
                let result = if ty == BasicType::Object { decode_object_field(&mut cursor).map(|_| ()) } else { cursor.skip(ty.size_bytes(self.snapshot.id_size)) };
                result.map_err(|e| OracleError(e.to_string()))?;
                continue;
            }
            let value = if ty == BasicType::Object {
                decode_object_field(&mut cursor).map_err(|e| OracleError(e.to_string()))?
            } else {
                cursor.skip(ty.size_bytes(self.snapshot.id_size)).map_err(|e| OracleError(e.to_string()))?;
                None
            };
            fields.push(FieldRef { name, value });
        }
        Ok(fields)
    }
}

impl GraphOracle for HprofOracle {
    fn meta(&self) -> &SnapshotMeta {
        &self.snapshot.meta
    }

    fn exists(&self, id: ObjectId) -> bool {
        self.node_kind(id).is_some()
    }

    fn node_kind(&self, id: ObjectId) -> Option<NodeKind> {
        let raw = id.raw();
        if let Some(instance) = self.snapshot.instances.get(&raw) {
            return Some(NodeKind::Instance { class_name: self.snapshot.class_name(instance.class_id) });
        }
        if let Some(array) = self.snapshot.object_arrays.get(&raw) {
            return Some(NodeKind::ObjectArray { class_name: array.class_name.clone() });
        }
        if self.snapshot.primitive_arrays.contains(&raw) {
            return Some(NodeKind::PrimitiveArray);
        }
        if let Some(class_def) = self.snapshot.classes.get(&raw) {
            return Some(NodeKind::ClassObject { class_name: class_def.name.clone() });
        }
        None
    }

    fn class_hierarchy(&self, id: ObjectId) -> Vec<String> {
        let raw = id.raw();
        let Some(instance) = self.snapshot.instances.get(&raw) else { return Vec::new() };
        self.snapshot.class_hierarchy_names(instance.class_id)
    }

    fn instance_fields(&self, id: ObjectId) -> Result<Vec<FieldRef>, OracleError> {
        let raw = id.raw();
        let Some(instance) = self.snapshot.instances.get(&raw) else {
            return Err(OracleError(format!("{id} is not an instance")));
        };
        self.decode_instance_fields(instance.class_id, &instance.raw)
    }

    fn array_elements(&self, id: ObjectId) -> Result<Vec<Option<ObjectId>>, OracleError> {
        let raw = id.raw();
        let Some(array) = self.snapshot.object_arrays.get(&raw) else {
            return Err(OracleError(format!("{id} is not an object array")));
        };
        Ok(array
            .elements
            .iter()
            .map(|&element_id| if element_id == 0 { None } else { Some(ObjectId::new(element_id)) })
            .collect())
    }

    fn static_fields(&self, class_obj_id: ObjectId) -> Result<Vec<FieldRef>, OracleError> {
        let raw = class_obj_id.raw();
        let Some(class_def) = self.snapshot.classes.get(&raw) else {
            return Err(OracleError(format!("{class_obj_id} is not a class object")));
        };
        Ok(class_def
            .static_fields
            .iter()
            .filter_map(|(name_id, value)| {
                let name = self.snapshot.name_of(*name_id);
                if name.starts_with('<') {
                    return None;
                }
                Some(FieldRef { name, value: value.map(ObjectId::new) })
            })
            .collect())
    }

    fn iter_instances<'a>(&'a self) -> Box<dyn Iterator<Item = ObjectId> + 'a> {
        Box::new(self.snapshot.instances.keys().map(|&raw| ObjectId::new(raw)))
    }

    fn gc_roots(&self) -> Vec<(ObjectId, RootKind)> {
        self.snapshot.gc_roots.iter().map(|&(id, kind)| (ObjectId::new(id), kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Hand-assembles a minimal but well-formed HPROF buffer: one
    /// class (`Leak`, a single object-typed field `next`), two
    /// instances chained `root_obj -> a -> b`, and one GC root on
    /// `root_obj`.
    fn build_sample_hprof() -> Vec<u8> {
        let id_size = 8u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(b"JAVA PROFILE 1.0.2\0");
        buf.write_u32::<BigEndian>(id_size).unwrap();
        buf.write_u64::<BigEndian>(0).unwrap();

        let mut string_body = Vec::new();
        string_body.write_u64::<BigEndian>(1).unwrap(); // string id 1
        string_body.extend_from_slice(b"Leak");
        write_record(&mut buf, 0x01, &string_body);

        let mut string_body2 = Vec::new();
        string_body2.write_u64::<BigEndian>(2).unwrap(); // string id 2 = field name "next"
        string_body2.extend_from_slice(b"next");
        write_record(&mut buf, 0x01, &string_body2);

        let mut load_class_body = Vec::new();
        load_class_body.write_u32::<BigEndian>(1).unwrap(); // serial
        load_class_body.write_u64::<BigEndian>(900).unwrap(); // class obj id
        load_class_body.write_u32::<BigEndian>(0).unwrap(); // stack trace serial
        load_class_body.write_u64::<BigEndian>(1).unwrap(); // name string id
        write_record(&mut buf, 0x02, &load_class_body);

        let mut heap_body = Vec::new();
        // GC_ROOT_JNI_GLOBAL: root_obj(id=10) + jni ref id
        heap_body.push(0x01);
        heap_body.write_u64::<BigEndian>(10).unwrap();
        heap_body.write_u64::<BigEndian>(0).unwrap();

        // CLASS_DUMP for class 900 ("Leak"), one instance field "next" (Object)
        heap_body.push(0x20);
        heap_body.write_u64::<BigEndian>(900).unwrap(); // class obj id
        heap_body.write_u32::<BigEndian>(0).unwrap(); // stack trace serial
        heap_body.write_u64::<BigEndian>(0).unwrap(); // super class id (none)
        heap_body.write_u64::<BigEndian>(0).unwrap(); // class loader id
        heap_body.write_u64::<BigEndian>(0).unwrap(); // signers id
        heap_body.write_u64::<BigEndian>(0).unwrap(); // protection domain id
        heap_body.write_u64::<BigEndian>(0).unwrap(); // reserved1
        heap_body.write_u64::<BigEndian>(0).unwrap(); // reserved2
        heap_body.write_u32::<BigEndian>(0).unwrap(); // instance size
        heap_body.write_u16::<BigEndian>(0).unwrap(); // constant pool size
        heap_body.write_u16::<BigEndian>(0).unwrap(); // static field count
        heap_body.write_u16::<BigEndian>(1).unwrap(); // instance field count
        heap_body.write_u64::<BigEndian>(2).unwrap(); // field name string id ("next")
        heap_body.push(2); // BasicType::Object

        // INSTANCE_DUMP root_obj(10) -> a(11)
        heap_body.push(0x21);
        heap_body.write_u64::<BigEndian>(10).unwrap();
        heap_body.write_u32::<BigEndian>(0).unwrap();
        heap_body.write_u64::<BigEndian>(900).unwrap(); // class id
        heap_body.write_u32::<BigEndian>(8).unwrap(); // num bytes
        heap_body.write_u64::<BigEndian>(11).unwrap(); // next -> a

        // INSTANCE_DUMP a(11) -> b(12)
        heap_body.push(0x21);
        heap_body.write_u64::<BigEndian>(11).unwrap();
        heap_body.write_u32::<BigEndian>(0).unwrap();
        heap_body.write_u64::<BigEndian>(900).unwrap();
        heap_body.write_u32::<BigEndian>(8).unwrap();
        heap_body.write_u64::<BigEndian>(12).unwrap();

        // INSTANCE_DUMP b(12) -> null
        heap_body.push(0x21);
        heap_body.write_u64::<BigEndian>(12).unwrap();
        heap_body.write_u32::<BigEndian>(0).unwrap();
        heap_body.write_u64::<BigEndian>(900).unwrap();
        heap_body.write_u32::<BigEndian>(8).unwrap();
        heap_body.write_u64::<BigEndian>(0).unwrap();

        write_record(&mut buf, 0x0c, &heap_body);
        buf
    }

    fn write_record(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
        buf.push(tag);
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u32::<BigEndian>(body.len() as u32).unwrap();
        buf.extend_from_slice(body);
    }

    #[test]
    fn parses_header_and_chained_instances() {
        let bytes = build_sample_hprof();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let oracle = load(file.path()).unwrap();
        assert_eq!(oracle.meta().pointer_size_bits, 64);
        assert_eq!(oracle.meta().instance_count, 3);
        assert_eq!(oracle.meta().gc_root_count, 1);

        let root = ObjectId::new(10);
        assert!(matches!(oracle.node_kind(root), Some(NodeKind::Instance { class_name }) if class_name == "Leak"));

        let fields = oracle.instance_fields(root).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "next");
        assert_eq!(fields[0].value, Some(ObjectId::new(11)));

        let b_fields = oracle.instance_fields(ObjectId::new(12)).unwrap();
        assert_eq!(b_fields[0].value, None);

        let roots = oracle.gc_roots();
        assert_eq!(roots, vec![(ObjectId::new(10), RootKind::JniGlobal)]);
    }

    #[test]
    fn unknown_object_id_has_no_node_kind() {
        let bytes = build_sample_hprof();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let oracle = load(file.path()).unwrap();
        assert!(oracle.node_kind(ObjectId::new(99999)).is_none());
        assert!(!oracle.exists(ObjectId::new(99999)));
    }
}

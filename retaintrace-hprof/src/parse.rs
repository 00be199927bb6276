//! Parses an HPROF binary heap dump into the in-memory structures
//! `HprofSnapshot` needs to answer `GraphOracle` queries. Two passes
//! over the buffer: the first resolves string/class metadata (names,
//! instance field descriptors, static field values); the second walks
//! every heap-dump sub-record using that metadata to decode instance
//! field bytes and collect GC roots.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::format::{record_tag, sub_record_tag, BasicType, HEADER_PREFIX};
use crate::reader::Cursor;
use retaintrace_core::{RootKind, SnapshotMeta};

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub super_class_id: u64,
    /// Fields declared directly on this class (not inherited), in
    /// declaration order, as stored in the instance dump's raw bytes.
    /// Names are string ids, resolved against `HprofSnapshot::strings`
    /// lazily by the oracle impl rather than at parse time, since the
    /// `STRING` records a field name refers to aren't guaranteed to
    /// precede the class dump that uses them.
    pub instance_field_defs: Vec<(u64, BasicType)>,
    pub static_fields: Vec<(u64, Option<u64>)>,
}

#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub class_id: u64,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ObjectArrayRecord {
    pub class_name: String,
    pub elements: Vec<u64>,
}

pub struct HprofSnapshot {
    pub id_size: u8,
    pub meta: SnapshotMeta,
    pub strings: HashMap<u64, String>,
    pub classes: HashMap<u64, ClassDef>,
    pub instances: HashMap<u64, InstanceRecord>,
    pub object_arrays: HashMap<u64, ObjectArrayRecord>,
    pub primitive_arrays: HashSet<u64>,
    pub gc_roots: Vec<(u64, RootKind)>,
}

struct TopLevelRecord<'a> {
    tag: u8,
    body: &'a [u8],
}

fn read_header(buf: &[u8]) -> Result<(u8, DateTime<Utc>, String, usize)> {
    let nul = buf.iter().position(|&b| b == 0).context("malformed HPROF header: no NUL terminator")?;
    let version = String::from_utf8_lossy(&buf[..nul]).to_string();
    if !buf[..nul].starts_with(HEADER_PREFIX) {
        bail!("not an HPROF file: unrecognized header {:?}", version);
    }
    let mut cursor = Cursor::new(&buf[nul + 1..], 4);
    let id_size = cursor.read_u32()? as u8;
    let timestamp_ms = cursor.read_u64()?;
    let timestamp = DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap());
    let consumed = nul + 1 + cursor.position();
    Ok((id_size, timestamp, version, consumed))
}

fn iter_top_level_records(buf: &[u8]) -> Result<Vec<TopLevelRecord<'_>>> {
    let mut cursor = Cursor::new(buf, 4); // id size doesn't matter for the fixed-width record header
    let mut records = Vec::new();
    while !cursor.is_empty() {
        let tag = cursor.read_u8()?;
        let _time = cursor.read_u32()?;
        let length = cursor.read_u32()? as usize;
        let body = cursor.read_bytes(length)?;
        records.push(TopLevelRecord { tag, body });
    }
    Ok(records)
}

pub fn parse(file_path: &std::path::Path, data: &[u8]) -> Result<HprofSnapshot> {
    let (id_size, heap_dump_timestamp, hprof_version, header_len) = read_header(data)?;
    let records = iter_top_level_records(&data[header_len..]).context("scanning top-level HPROF records")?;

    let mut strings: HashMap<u64, String> = HashMap::new();
    let mut load_class_name_ids: HashMap<u64, u64> = HashMap::new(); // class_obj_id -> name string id
    let mut classes: HashMap<u64, ClassDef> = HashMap::new();

    // Pass 1: strings, LOAD_CLASS, and class dumps (which may be
    // embedded in heap-dump segments alongside instances).
    for record in &records {
        match record.tag {
            record_tag::STRING => {
                let mut cursor = Cursor::new(record.body, id_size);
                let name_id = cursor.read_id()?;
                let text = String::from_utf8_lossy(&record.body[cursor.position()..]).to_string();
                strings.insert(name_id, text);
            }
            record_tag::LOAD_CLASS => {
                let mut cursor = Cursor::new(record.body, id_size);
                let _serial = cursor.read_u32()?;
                let class_obj_id = cursor.read_id()?;
                let _stack_serial = cursor.read_u32()?;
                let class_name_id = cursor.read_id()?;
                load_class_name_ids.insert(class_obj_id, class_name_id);
            }
            record_tag::HEAP_DUMP | record_tag::HEAP_DUMP_SEGMENT => {
                scan_class_dumps(record.body, id_size, &mut classes)?;
            }
            _ => {}
        }
    }

    for (class_obj_id, class_def) in classes.iter_mut() {
        if class_def.name.is_empty() {
            class_def.name = load_class_name_ids
                .get(class_obj_id)
                .and_then(|name_id| strings.get(name_id))
                .cloned()
                .unwrap_or_else(|| format!("<unknown class {class_obj_id:#x}>"));
        }
    }

    // Pass 2: instances, arrays, and GC roots.
    let mut instances: HashMap<u64, InstanceRecord> = HashMap::new();
    let mut object_arrays: HashMap<u64, ObjectArrayRecord> = HashMap::new();
    let mut primitive_arrays: HashSet<u64> = HashSet::new();
    let mut gc_roots: Vec<(u64, RootKind)> = Vec::new();

    let mut class_count = 0u64;
    let mut instance_count = 0u64;
    let mut object_array_count = 0u64;
    let mut primitive_array_count = 0u64;

    for record in &records {
        if record.tag != record_tag::HEAP_DUMP && record.tag != record_tag::HEAP_DUMP_SEGMENT {
            continue;
        }
        let mut cursor = Cursor::new(record.body, id_size);
        while !cursor.is_empty() {
            let sub_tag = cursor.read_u8()?;
            match sub_tag {
                sub_record_tag::CLASS_DUMP => {
                    skip_class_dump(&mut cursor, id_size)?;
                    class_count += 1;
                }
                sub_record_tag::INSTANCE_DUMP => {
                    let obj_id = cursor.read_id()?;
                    let _stack_serial = cursor.read_u32()?;
                    let class_obj_id = cursor.read_id()?;
                    let num_bytes = cursor.read_u32()? as usize;
                    let raw = cursor.read_bytes(num_bytes)?.to_vec();
                    instances.insert(obj_id, InstanceRecord { class_id: class_obj_id, raw });
                    instance_count += 1;
                }
                sub_record_tag::OBJECT_ARRAY_DUMP => {
                    let obj_id = cursor.read_id()?;
                    let _stack_serial = cursor.read_u32()?;
                    let num_elements = cursor.read_u32()? as usize;
                    let array_class_obj_id = cursor.read_id()?;
                    let mut elements = Vec::with_capacity(num_elements);
                    for _ in 0..num_elements {
                        elements.push(cursor.read_id()?);
                    }
                    let class_name = classes.get(&array_class_obj_id).map(|c| c.name.clone()).unwrap_or_else(|| "Object[]".to_string());
                    object_arrays.insert(obj_id, ObjectArrayRecord { class_name, elements });
                    object_array_count += 1;
                }
                sub_record_tag::PRIMITIVE_ARRAY_DUMP => {
                    let obj_id = cursor.read_id()?;
                    let _stack_serial = cursor.read_u32()?;
                    let num_elements = cursor.read_u32()? as usize;
                    let element_type_tag = cursor.read_u8()?;
                    let element_type = BasicType::from_tag(element_type_tag).context("unknown primitive array element type")?;
                    cursor.skip(num_elements * element_type.size_bytes(id_size))?;
                    primitive_arrays.insert(obj_id);
                    primitive_array_count += 1;
                }
                other => {
                    if let Some((len, kind)) = gc_root_body_len(other, id_size) {
                        let obj_id = cursor.read_id()?;
                        cursor.skip(len)?;
                        gc_roots.push((obj_id, kind));
                    } else {
                        bail!("unrecognized heap-dump sub-record tag {other:#x} at offset {}", cursor.position());
                    }
                }
            }
        }
    }

    let gc_root_count = gc_roots.len() as u64;
    let meta = SnapshotMeta {
        file_path: file_path.to_path_buf(),
        file_size_bytes: data.len() as u64,
        heap_dump_timestamp,
        hprof_version,
        pointer_size_bits: id_size * 8,
        class_count,
        instance_count,
        object_array_count,
        primitive_array_count,
        gc_root_count,
    };

    Ok(HprofSnapshot { id_size, meta, strings, classes, instances, object_arrays, primitive_arrays, gc_roots })
}

/// Body length (after the leading object id) and `RootKind` for every
/// GC-root sub-record tag. `None` for anything else.
fn gc_root_body_len(tag: u8, id_size: u8) -> Option<(usize, RootKind)> {
    let id = id_size as usize;
    Some(match tag {
        sub_record_tag::GC_ROOT_UNKNOWN => (0, RootKind::Unknown),
        sub_record_tag::GC_ROOT_JNI_GLOBAL => (id, RootKind::JniGlobal),
        sub_record_tag::GC_ROOT_JNI_LOCAL => (8, RootKind::JniLocal),
        sub_record_tag::GC_ROOT_JAVA_FRAME => (8, RootKind::JavaFrame),
        sub_record_tag::GC_ROOT_NATIVE_STACK => (4, RootKind::NativeStack),
        sub_record_tag::GC_ROOT_STICKY_CLASS => (0, RootKind::StickyClass),
        sub_record_tag::GC_ROOT_THREAD_BLOCK => (4, RootKind::ThreadBlock),
        sub_record_tag::GC_ROOT_MONITOR_USED => (0, RootKind::MonitorUsed),
        sub_record_tag::GC_ROOT_THREAD_OBJECT => (8, RootKind::ThreadObject),
        sub_record_tag::GC_ROOT_INTERNED_STRING => (0, RootKind::InternedString),
        sub_record_tag::GC_ROOT_FINALIZING => (0, RootKind::Finalizing),
        sub_record_tag::GC_ROOT_DEBUGGER => (0, RootKind::Debugger),
        sub_record_tag::GC_ROOT_REFERENCE_CLEANUP => (0, RootKind::ReferenceCleanup),
        sub_record_tag::GC_ROOT_VM_INTERNAL => (0, RootKind::VmInternal),
        sub_record_tag::GC_ROOT_JNI_MONITOR => (8, RootKind::JniMonitor),
        sub_record_tag::GC_ROOT_UNREACHABLE => (0, RootKind::Unreachable),
        _ => return None,
    })
}

/// First pass over a heap-dump (segment) body: records every
/// `CLASS_DUMP` sub-record's metadata, skipping everything else. Other
/// sub-records can't be skipped without knowing their length, which for
/// `INSTANCE_DUMP` depends on the class dumps collected in this very
/// pass — so unrelated sub-records are decoded just enough to advance
/// past them, discarding the result.
fn scan_class_dumps(body: &[u8], id_size: u8, classes: &mut HashMap<u64, ClassDef>) -> Result<()> {
    let mut cursor = Cursor::new(body, id_size);
    while !cursor.is_empty() {
        let sub_tag = cursor.read_u8()?;
        match sub_tag {
            sub_record_tag::CLASS_DUMP => {
                let class_def = read_class_dump(&mut cursor, id_size)?;
                classes.insert(class_def.0, class_def.1);
            }
            sub_record_tag::INSTANCE_DUMP => {
                let _obj_id = cursor.read_id()?;
                let _stack_serial = cursor.read_u32()?;
                let _class_obj_id = cursor.read_id()?;
                let num_bytes = cursor.read_u32()? as usize;
                cursor.skip(num_bytes)?;
            }
            sub_record_tag::OBJECT_ARRAY_DUMP => {
                let _obj_id = cursor.read_id()?;
                let _stack_serial = cursor.read_u32()?;
                let num_elements = cursor.read_u32()? as usize;
                let _array_class_obj_id = cursor.read_id()?;
                cursor.skip(num_elements * id_size as usize)?;
            }
            sub_record_tag::PRIMITIVE_ARRAY_DUMP => {
                let _obj_id = cursor.read_id()?;
                let _stack_serial = cursor.read_u32()?;
                let num_elements = cursor.read_u32()? as usize;
                let element_type_tag = cursor.read_u8()?;
                let element_type = BasicType::from_tag(element_type_tag).context("unknown primitive array element type")?;
                cursor.skip(num_elements * element_type.size_bytes(id_size))?;
            }
            other => {
                if let Some((len, _)) = gc_root_body_len(other, id_size) {
                    cursor.skip(id_size as usize + len)?;
                } else {
                    bail!("unrecognized heap-dump sub-record tag {other:#x} while scanning class dumps");
                }
            }
        }
    }
    Ok(())
}

/// Reads one `CLASS_DUMP` sub-record's body (the tag byte already
/// consumed) and advances `cursor` past it. Class names are resolved
/// later from `LOAD_CLASS`; `name` is left empty here.
fn read_class_dump(cursor: &mut Cursor<'_>, id_size: u8) -> Result<(u64, ClassDef)> {
    let class_obj_id = cursor.read_id()?;
    let _stack_trace_serial = cursor.read_u32()?;
    let super_class_id = cursor.read_id()?;
    let _class_loader_id = cursor.read_id()?;
    let _signers_id = cursor.read_id()?;
    let _protection_domain_id = cursor.read_id()?;
    cursor.skip(id_size as usize)?; // reserved1
    cursor.skip(id_size as usize)?; // reserved2
    let _instance_size = cursor.read_u32()?;

    let constant_pool_size = cursor.read_u16()?;
    for _ in 0..constant_pool_size {
        cursor.skip(2)?; // constant pool index
        let type_tag = cursor.read_u8()?;
        let ty = BasicType::from_tag(type_tag).context("unknown constant pool entry type")?;
        cursor.skip(ty.size_bytes(id_size))?;
    }

    let static_field_count = cursor.read_u16()?;
    let mut static_fields = Vec::with_capacity(static_field_count as usize);
    for _ in 0..static_field_count {
        let name_id = cursor.read_id()?;
        let type_tag = cursor.read_u8()?;
        let ty = BasicType::from_tag(type_tag).context("unknown static field type")?;
        let value = if ty == BasicType::Object {
            let id = cursor.read_id()?;
            if id == 0 {
                None
            } else {
                Some(id)
            }
        } else {
            cursor.skip(ty.size_bytes(id_size))?;
            None
        };
        static_fields.push((name_id, value));
    }

    let instance_field_count = cursor.read_u16()?;
    let mut instance_field_defs = Vec::with_capacity(instance_field_count as usize);
    for _ in 0..instance_field_count {
        let name_id = cursor.read_id()?;
        let type_tag = cursor.read_u8()?;
        let ty = BasicType::from_tag(type_tag).context("unknown instance field type")?;
        instance_field_defs.push((name_id, ty));
    }

    Ok((
        class_obj_id,
        ClassDef { name: String::new(), super_class_id, instance_field_defs, static_fields },
    ))
}

/// Skips one `CLASS_DUMP` sub-record without recording it (used on the
/// second pass, where class metadata is already known).
fn skip_class_dump(cursor: &mut Cursor<'_>, id_size: u8) -> Result<()> {
    read_class_dump(cursor, id_size).map(|_| ())
}

impl HprofSnapshot {
    pub fn name_of(&self, string_id: u64) -> String {
        self.strings.get(&string_id).cloned().unwrap_or_else(|| format!("<string {string_id:#x}>"))
    }

    pub fn class_name(&self, class_obj_id: u64) -> String {
        self.classes.get(&class_obj_id).map(|c| c.name.clone()).unwrap_or_else(|| format!("<class {class_obj_id:#x}>"))
    }

    /// The class's own declared fields followed by its ancestors',
    /// nearest-to-`class_obj_id` first, field names resolved. This is
    /// the order HPROF lays out an instance's raw bytes in: own fields
    /// first, then up the superclass chain.
    pub fn flatten_instance_fields(&self, class_obj_id: u64) -> Vec<(String, BasicType)> {
        let mut fields = Vec::new();
        let mut current = Some(class_obj_id);
        let mut guard = 0;
        while let Some(id) = current {
            guard += 1;
            if guard > 256 {
                warn!(class_obj_id, "class hierarchy walk exceeded depth guard, truncating");
                break;
            }
            let Some(class_def) = self.classes.get(&id) else { break };
            for (name_id, ty) in &class_def.instance_field_defs {
                fields.push((self.name_of(*name_id), *ty));
            }
            current = if class_def.super_class_id == 0 { None } else { Some(class_def.super_class_id) };
        }
        fields
    }

    /// The class's ancestry, nearest-first, as simple class names (used
    /// only for the weak-reference-hierarchy test).
    pub fn class_hierarchy_names(&self, class_obj_id: u64) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(class_obj_id);
        let mut guard = 0;
        while let Some(id) = current {
            guard += 1;
            if guard > 256 {
                break;
            }
            let Some(class_def) = self.classes.get(&id) else { break };
            names.push(class_def.name.clone());
            current = if class_def.super_class_id == 0 { None } else { Some(class_def.super_class_id) };
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_type_sizes_match_id_size() {
        assert_eq!(BasicType::Object.size_bytes(4), 4);
        assert_eq!(BasicType::Object.size_bytes(8), 8);
        assert_eq!(BasicType::Long.size_bytes(4), 8);
        assert_eq!(BasicType::Boolean.size_bytes(8), 1);
    }
}

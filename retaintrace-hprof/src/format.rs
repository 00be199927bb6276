//! HPROF binary format constants: top-level record tags, heap-dump
//! sub-record tags, and the basic-type tags used by field
//! descriptors. Mirrors the layout documented in the JDK's
//! `hprof_b_spec.h`.

pub const HEADER_PREFIX: &[u8] = b"JAVA PROFILE 1.0";

pub mod record_tag {
    pub const STRING: u8 = 0x01;
    pub const LOAD_CLASS: u8 = 0x02;
    pub const UNLOAD_CLASS: u8 = 0x03;
    pub const STACK_FRAME: u8 = 0x04;
    pub const STACK_TRACE: u8 = 0x05;
    pub const ALLOC_SITES: u8 = 0x06;
    pub const HEAP_SUMMARY: u8 = 0x07;
    pub const START_THREAD: u8 = 0x0a;
    pub const END_THREAD: u8 = 0x0b;
    pub const HEAP_DUMP: u8 = 0x0c;
    pub const CPU_SAMPLES: u8 = 0x0d;
    pub const CONTROL_SETTINGS: u8 = 0x0e;
    pub const HEAP_DUMP_SEGMENT: u8 = 0x1c;
    pub const HEAP_DUMP_END: u8 = 0x2c;
}

pub mod sub_record_tag {
    pub const GC_ROOT_UNKNOWN: u8 = 0xff;
    pub const GC_ROOT_JNI_GLOBAL: u8 = 0x01;
    pub const GC_ROOT_JNI_LOCAL: u8 = 0x02;
    pub const GC_ROOT_JAVA_FRAME: u8 = 0x03;
    pub const GC_ROOT_NATIVE_STACK: u8 = 0x04;
    pub const GC_ROOT_STICKY_CLASS: u8 = 0x05;
    pub const GC_ROOT_THREAD_BLOCK: u8 = 0x06;
    pub const GC_ROOT_MONITOR_USED: u8 = 0x07;
    pub const GC_ROOT_THREAD_OBJECT: u8 = 0x08;
    pub const GC_ROOT_INTERNED_STRING: u8 = 0x89;
    pub const GC_ROOT_FINALIZING: u8 = 0x8a;
    pub const GC_ROOT_DEBUGGER: u8 = 0x8b;
    pub const GC_ROOT_REFERENCE_CLEANUP: u8 = 0x8c;
    pub const GC_ROOT_VM_INTERNAL: u8 = 0x8d;
    pub const GC_ROOT_JNI_MONITOR: u8 = 0x8e;
    pub const GC_ROOT_UNREACHABLE: u8 = 0x90;
    pub const CLASS_DUMP: u8 = 0x20;
    pub const INSTANCE_DUMP: u8 = 0x21;
    pub const OBJECT_ARRAY_DUMP: u8 = 0x22;
    pub const PRIMITIVE_ARRAY_DUMP: u8 = 0x23;
}

/// `hprof_basic_type` values used in field descriptors and primitive
/// array element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicType {
    Object,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl BasicType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            2 => BasicType::Object,
            4 => BasicType::Boolean,
            5 => BasicType::Char,
            6 => BasicType::Float,
            7 => BasicType::Double,
            8 => BasicType::Byte,
            9 => BasicType::Short,
            10 => BasicType::Int,
            11 => BasicType::Long,
            _ => return None,
        })
    }

    /// Encoded size in bytes, given the snapshot's id size for object
    /// references.
    pub fn size_bytes(self, id_size: u8) -> usize {
        match self {
            BasicType::Object => id_size as usize,
            BasicType::Boolean | BasicType::Byte => 1,
            BasicType::Char | BasicType::Short => 2,
            BasicType::Float | BasicType::Int => 4,
            BasicType::Double | BasicType::Long => 8,
        }
    }
}

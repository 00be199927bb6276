//! Classifies classes as "carries no interesting inbound path" (leaf
//! instance/array classes excluded as index children) or as reference
//! types that never keep anything alive for our purposes (the
//! weak-reference hierarchy, excluded as parents).
//!
//! All comparisons are against the simple (unqualified) class name, so
//! `java.lang.String` and `String` both match `"String"`.

const LEAF_INSTANCE_CLASSES: &[&str] = &[
    "String", "Byte", "Short", "Integer", "Long", "Float", "Double", "Boolean", "Character",
];

const LEAF_ARRAY_CLASSES: &[&str] = &["String[]"];

const WEAK_REFERENCE_ANCESTORS: &[&str] = &[
    "WeakReference",
    "SoftReference",
    "PhantomReference",
    "FinalizerReference",
    "Cleaner",
];

/// Strips package/outer-class qualification, leaving the simple name
/// the leaf tables are written against.
pub fn simple_name(class_name: &str) -> &str {
    class_name
        .rsplit(['.', '/', '$'])
        .next()
        .unwrap_or(class_name)
}

pub fn is_leaf_instance_class(class_name: &str) -> bool {
    LEAF_INSTANCE_CLASSES.contains(&simple_name(class_name))
}

pub fn is_leaf_array_class(class_name: &str) -> bool {
    LEAF_ARRAY_CLASSES.contains(&simple_name(class_name))
}

/// True if any class in `ancestry` (nearest first, as returned by
/// `GraphOracle::class_hierarchy`) is one of the weak/soft/phantom
/// reference classes, `FinalizerReference`, or `Cleaner`.
pub fn is_weak_reference_hierarchy(ancestry: &[String]) -> bool {
    ancestry
        .iter()
        .any(|name| WEAK_REFERENCE_ANCESTORS.contains(&simple_name(name)))
}

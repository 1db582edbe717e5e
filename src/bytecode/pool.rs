use std::rc::Rc;

use crate::bytecode::image::{FunctionRef, TypeRef};
use crate::bytecode::op::BYTE_INDEX_LIMIT;

// =============================================================================
// POOL - Tagged constant storage shared by the whole module
// =============================================================================

/// Integer literal.
pub const TAG_INT: u8 = 0;
/// Reserved alternate integer-literal subkind; decoded identically.
pub const TAG_INT_ALT: u8 = 1;
/// Generic string literal.
pub const TAG_STRING: u8 = 2;
/// Function definition, resolved in a second pass.
pub const TAG_FUNCTION: u8 = 3;
/// Virtual-dispatch target name reference.
pub const TAG_METHOD_REF: u8 = 4;
/// Type definition, resolved in a second pass.
pub const TAG_TYPE: u8 = 5;
/// Native-function target name reference.
pub const TAG_NATIVE_REF: u8 = 6;

/// Decoded payload of one pool slot.
///
/// Tags 2/4/6 carry a string payload for their whole lifetime; tags 3/5
/// start out as a string placeholder (the declared name) and are
/// overwritten with the resolved definition during load.
#[derive(Debug, Clone)]
pub enum PoolEntry {
    Int(i32),
    Str(Rc<str>),
    Function(FunctionRef),
    Type(TypeRef),
}

/// One pool slot. The raw wire tag is kept alongside the decoded entry so
/// the two integer-literal subkinds stay distinguishable.
#[derive(Debug, Clone)]
pub struct PoolSlot {
    pub tag: u8,
    pub entry: PoolEntry,
}

/// The constant pool: append-only during load, immutable afterwards
/// except for the loader's own placeholder-overwrite step.
#[derive(Debug, Default)]
pub struct Pool {
    slots: Vec<PoolSlot>,
}

impl Pool {
    pub fn new() -> Self {
        Pool { slots: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, tag: u8, entry: PoolEntry) {
        // slots past the one-byte index range could never be addressed
        debug_assert!(self.slots.len() < BYTE_INDEX_LIMIT);
        self.slots.push(PoolSlot { tag, entry });
    }

    pub fn tag(&self, idx: u8) -> Option<u8> {
        self.slots.get(idx as usize).map(|slot| slot.tag)
    }

    pub fn entry(&self, idx: u8) -> Option<&PoolEntry> {
        self.slots.get(idx as usize).map(|slot| &slot.entry)
    }

    pub fn slots(&self) -> &[PoolSlot] {
        &self.slots
    }

    /// Placeholder overwrite: find the first slot with tag `tag` whose
    /// current payload is the string `name` and replace its entry with the
    /// resolved definition. Returns false when no placeholder matches.
    pub fn resolve(&mut self, tag: u8, name: &str, resolved: PoolEntry) -> bool {
        for slot in &mut self.slots {
            if slot.tag != tag {
                continue;
            }
            if let PoolEntry::Str(current) = &slot.entry {
                if current.as_ref() == name {
                    slot.entry = resolved;
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::image::Function;

    fn placeholder_pool() -> Pool {
        let mut pool = Pool::new();
        pool.push(TAG_INT, PoolEntry::Int(5));
        pool.push(TAG_FUNCTION, PoolEntry::Str("main".into()));
        pool.push(TAG_FUNCTION, PoolEntry::Str("helper".into()));
        pool
    }

    fn function(name: &str) -> PoolEntry {
        PoolEntry::Function(Rc::new(Function {
            name: name.to_string(),
            locals: 0,
            op_stack: 1,
            instructions: Vec::new(),
        }))
    }

    #[test]
    fn test_resolve_overwrites_matching_placeholder() {
        let mut pool = placeholder_pool();

        assert!(pool.resolve(TAG_FUNCTION, "helper", function("helper")));

        match pool.entry(2) {
            Some(PoolEntry::Function(f)) => assert_eq!(f.name, "helper"),
            other => panic!("expected resolved function, got {:?}", other),
        }
        // the unrelated placeholder is untouched
        assert!(matches!(pool.entry(1), Some(PoolEntry::Str(_))));
    }

    #[test]
    fn test_resolve_first_match_by_tag_and_name() {
        let mut pool = Pool::new();
        // same name under a different tag must not be touched
        pool.push(TAG_TYPE, PoolEntry::Str("main".into()));
        pool.push(TAG_FUNCTION, PoolEntry::Str("main".into()));

        assert!(pool.resolve(TAG_FUNCTION, "main", function("main")));
        assert!(matches!(pool.entry(0), Some(PoolEntry::Str(_))));
        assert!(matches!(pool.entry(1), Some(PoolEntry::Function(_))));
    }

    #[test]
    fn test_resolve_without_placeholder_fails() {
        let mut pool = placeholder_pool();
        assert!(!pool.resolve(TAG_FUNCTION, "missing", function("missing")));
    }

    #[test]
    fn test_out_of_range_index() {
        let pool = placeholder_pool();
        assert!(pool.entry(200).is_none());
        assert!(pool.tag(200).is_none());
    }
}

use crate::bytecode::image::TypeRef;
use crate::runtime::value::Value;

// =============================================================================
// HEAP - Arena for object and array instances
// =============================================================================
//
// Instances are reclaimed only by an explicit `free` opcode or at process
// teardown. Handles carry a generation so that any use of a freed slot is
// a detectable error rather than memory corruption.

/// Generation-checked reference to a heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    index: u32,
    generation: u32,
}

/// A user-type instance: its type plus one slot per declared field.
#[derive(Debug)]
pub struct Object {
    pub ty: TypeRef,
    pub fields: Vec<Value>,
}

#[derive(Debug)]
pub enum Instance {
    Object(Object),
    Array(Vec<Value>),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    instance: Option<Instance>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn alloc_object(&mut self, ty: TypeRef) -> Handle {
        let fields = vec![Value::Null; ty.fields as usize];
        self.alloc(Instance::Object(Object { ty, fields }))
    }

    pub fn alloc_array(&mut self, elements: Vec<Value>) -> Handle {
        self.alloc(Instance::Array(elements))
    }

    fn alloc(&mut self, instance: Instance) -> Handle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.instance = Some(instance);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            instance: Some(instance),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    /// `None` means the handle is stale: the slot was freed, or freed and
    /// reused by a later allocation.
    pub fn get(&self, handle: Handle) -> Option<&Instance> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.instance.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Instance> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.instance.as_mut()
    }

    /// Release an instance. The slot's generation is bumped so existing
    /// handles to it become stale, then the slot is recycled.
    pub fn free(&mut self, handle: Handle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.instance.is_none() {
            return false;
        }
        slot.instance = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::image::Type;
    use std::rc::Rc;

    fn pair_type() -> TypeRef {
        Rc::new(Type {
            name: "pair".to_string(),
            fields: 2,
            methods: None,
        })
    }

    #[test]
    fn test_object_fields_default_to_null() {
        let mut heap = Heap::new();
        let handle = heap.alloc_object(pair_type());

        match heap.get(handle) {
            Some(Instance::Object(obj)) => {
                assert_eq!(obj.fields.len(), 2);
                assert!(matches!(obj.fields[0], Value::Null));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_free_makes_handle_stale() {
        let mut heap = Heap::new();
        let handle = heap.alloc_array(vec![Value::Int(1)]);

        assert!(heap.free(handle));
        assert!(heap.get(handle).is_none());
        // double free is rejected too
        assert!(!heap.free(handle));
    }

    #[test]
    fn test_reused_slot_rejects_old_handle() {
        let mut heap = Heap::new();
        let old = heap.alloc_array(vec![Value::Int(1)]);
        heap.free(old);

        let new = heap.alloc_array(vec![Value::Int(2)]);
        // the new allocation recycled the slot with a fresh generation
        assert_ne!(old, new);
        assert!(heap.get(old).is_none());
        assert!(heap.get(new).is_some());
    }
}

//! Generation-tagged storage for resource graphs.
//!
//! A handle stays comparable after its graph is gone; looking it up then
//! fails instead of reaching a newer graph that reused the slot.

use std::fmt;

/// Reference into the arena: slot index plus the generation it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphHandle {
    index: u32,
    generation: u64,
}

impl GraphHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}.{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u64,
    value: Option<T>,
}

/// Slot arena whose handles carry a generation.
pub struct GenerationalArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    next_generation: u64,
}

impl<T> Default for GenerationalArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_generation: 1,
        }
    }
}

impl<T> GenerationalArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under a fresh generation.
    pub fn insert(&mut self, value: T) -> GraphHandle {
        let generation = self.next_generation;
        self.next_generation += 1;

        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = generation;
                slot.value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation,
                    value: Some(value),
                });
                (self.slots.len() - 1) as u32
            }
        };
        GraphHandle { index, generation }
    }

    fn slot(&self, handle: GraphHandle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
    }

    pub fn get(&self, handle: GraphHandle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: GraphHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?
            .value
            .as_mut()
    }

    /// Take the value out. The handle (and any copy of it) becomes stale.
    pub fn remove(&mut self, handle: GraphHandle) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?;
        let value = slot.value.take()?;
        self.free.push(handle.index);
        Some(value)
    }

    pub fn contains(&self, handle: GraphHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_handle_is_stale_after_reuse() {
        let mut arena = GenerationalArena::new();
        let first = arena.insert("v1");
        assert_eq!(arena.remove(first), Some("v1"));

        let second = arena.insert("v2");
        assert_ne!(first, second);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"v2"));
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn slot_is_reused() {
        let mut arena = GenerationalArena::new();
        let a = arena.insert(1);
        arena.remove(a);
        arena.insert(2);
        assert_eq!(arena.slots.len(), 1);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn double_remove_is_none() {
        let mut arena = GenerationalArena::new();
        let a = arena.insert(1);
        assert!(arena.remove(a).is_some());
        assert!(arena.remove(a).is_none());
        assert!(arena.is_empty());
    }
}

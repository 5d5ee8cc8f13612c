//! A small generational arena.
//!
//! Members and clients are removable while UAGs/HAGs/ASGs are only ever
//! replaced wholesale on policy swap, so only the former two need handles
//! that can detect use-after-remove. A generation counter on each slot
//! makes a stale [`Handle`] distinguishable from a freshly reused one,
//! which is how `BadMember`/`BadClient` get reported instead of silently
//! operating on the wrong object.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Handle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.value.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let mut arena = Arena::new();
        let handle = arena.insert(42);
        assert_eq!(arena.get(handle), Some(&42));
    }

    #[test]
    fn stale_handle_after_remove_is_rejected() {
        let mut arena = Arena::new();
        let handle = arena.insert(1);
        arena.remove(handle).unwrap();
        assert_eq!(arena.get(handle), None);
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let mut arena = Arena::new();
        let first = arena.insert(1);
        arena.remove(first).unwrap();
        let second = arena.insert(2);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&2));
    }
}

//! Generation-checked handles and the fixed arenas behind them
//!
//! A handle names a slot plus the generation the slot had when the object was
//! created. Deleting an object bumps the slot's generation, so a stale handle
//! is detected instead of silently aliasing whatever reuses the slot.

use crate::error::Error;

/// Index + generation pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub(crate) index: u8,
    pub(crate) generation: u16,
}

impl Slot {
    pub(crate) const fn new(index: u8, generation: u16) -> Self {
        Self { index, generation }
    }

    /// Slot index inside its table
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Pack into 4 bytes, e.g. to pass through a task parameter block
    pub fn to_bytes(self) -> [u8; 4] {
        let g = self.generation.to_le_bytes();
        [self.index, 0, g[0], g[1]]
    }

    /// Inverse of [`Slot::to_bytes`]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            index: bytes[0],
            generation: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Fixed-capacity object table with generation tracking
pub(crate) struct Arena<T, const N: usize> {
    slots: [Option<T>; N],
    generations: [u16; N],
}

impl<T, const N: usize> Arena<T, N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            generations: [0; N],
        }
    }

    /// Store `value` in the first free slot
    pub(crate) fn insert(&mut self, value: T) -> Result<Slot, Error> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::AllocationFailed)?;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.slots[index] = Some(value);
        Ok(Slot::new(index as u8, self.generations[index]))
    }

    pub(crate) fn get(&self, slot: Slot) -> Option<&T> {
        let i = slot.index();
        if i >= N || self.generations[i] != slot.generation {
            return None;
        }
        self.slots[i].as_ref()
    }

    pub(crate) fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        let i = slot.index();
        if i >= N || self.generations[i] != slot.generation {
            return None;
        }
        self.slots[i].as_mut()
    }

    pub(crate) fn remove(&mut self, slot: Slot) -> Option<T> {
        self.get(slot)?;
        let i = slot.index();
        self.generations[i] = self.generations[i].wrapping_add(1);
        self.slots[i].take()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get() {
        let mut arena = Arena::<u32, 4>::new();
        let a = arena.insert(7).unwrap();
        assert_eq!(arena.get(a), Some(&7));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut arena = Arena::<u32, 2>::new();
        let a = arena.insert(1).unwrap();
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2).unwrap();
        assert_eq!(a.index(), b.index());
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn test_exhaustion() {
        let mut arena = Arena::<u8, 2>::new();
        arena.insert(1).unwrap();
        arena.insert(2).unwrap();
        assert_eq!(arena.insert(3), Err(Error::AllocationFailed));
    }

    #[test]
    fn test_bytes() {
        let slot = Slot::new(3, 0x1234);
        assert_eq!(Slot::from_bytes(slot.to_bytes()), slot);
    }
}

//! Fixed-capacity ring buffer.
//!
//! `SlotStorage` is not synchronized. The monitor owns it behind its
//! mutex and is the only place it is touched concurrently.

use std::num::NonZeroUsize;

/// Circular buffer of `capacity` slots holding items in FIFO order.
///
/// `tail` is the next insertion slot and `head` the next removal slot,
/// both modulo capacity. Every accepted item gets an insertion ordinal
/// and every removal a removal ordinal, both counting from zero.
pub struct SlotStorage<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    len: usize,
    inserted: u64,
    removed: u64,
}

impl<T> SlotStorage<T> {
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            slots: (0..capacity.get()).map(|_| None).collect(),
            head: 0,
            tail: 0,
            len: 0,
            inserted: 0,
            removed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Items ever accepted.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Items ever removed.
    pub fn removed(&self) -> u64 {
        self.removed
    }

    /// Append at `tail`. Returns the insertion ordinal, or the item back
    /// when every slot is occupied.
    pub fn push_back(&mut self, item: T) -> Result<u64, T> {
        if self.is_full() {
            return Err(item);
        }
        debug_assert!(self.slots[self.tail].is_none(), "tail slot must be vacant");

        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.slots.len();
        self.len += 1;

        let ordinal = self.inserted;
        self.inserted += 1;
        Ok(ordinal)
    }

    /// Remove from `head` with its removal ordinal.
    pub fn pop_front(&mut self) -> Option<(T, u64)> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.head].take()?;
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;

        let ordinal = self.removed;
        self.removed += 1;
        debug_assert_eq!(self.inserted - self.removed, self.len as u64);
        Some((item, ordinal))
    }

    /// Stored items, head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.slots.len();
        (0..self.len).filter_map(move |offset| self.slots[(self.head + offset) % capacity].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(capacity: usize) -> SlotStorage<u64> {
        SlotStorage::with_capacity(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_fifo_with_wraparound() {
        let mut s = storage(3);
        for round in 0..4u64 {
            assert_eq!(s.push_back(round * 10), Ok(round * 2));
            assert_eq!(s.push_back(round * 10 + 1), Ok(round * 2 + 1));
            assert_eq!(s.pop_front(), Some((round * 10, round * 2)));
            assert_eq!(s.pop_front(), Some((round * 10 + 1, round * 2 + 1)));
        }
        assert!(s.is_empty());
        assert_eq!(s.inserted(), 8);
        assert_eq!(s.removed(), 8);
    }

    #[test]
    fn test_full_returns_item() {
        let mut s = storage(1);
        assert_eq!(s.push_back(1), Ok(0));
        assert!(s.is_full());
        assert_eq!(s.push_back(2), Err(2));
        assert_eq!(s.len(), 1);
        assert_eq!(s.inserted(), 1);
    }

    #[test]
    fn test_pop_empty() {
        let mut s = storage(2);
        assert_eq!(s.pop_front(), None);
        assert_eq!(s.removed(), 0);
    }

    #[test]
    fn test_iter_head_to_tail() {
        let mut s = storage(3);
        s.push_back(1).unwrap();
        s.push_back(2).unwrap();
        s.pop_front();
        s.push_back(3).unwrap();
        s.push_back(4).unwrap();
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}

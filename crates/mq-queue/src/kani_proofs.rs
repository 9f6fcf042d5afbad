//! Kani proof harnesses for `SlotStorage`.
//!
//! Bounded model checking over every input up to the unwind bound.
//! Kani runs single-threaded, so these cover the ring buffer arithmetic;
//! the concurrent monitor protocol is covered by loom and the stateright
//! model.
//!
//! ```bash
//! cargo kani -p mq-queue
//! cargo kani -p mq-queue --harness proof_fifo_across_wraparound
//! ```

#[cfg(kani)]
mod proofs {
    use std::num::NonZeroUsize;

    use crate::storage::SlotStorage;

    fn storage(capacity: usize) -> SlotStorage<u32> {
        SlotStorage::with_capacity(NonZeroUsize::new(capacity).unwrap())
    }

    /// Two pushes come back out in insertion order.
    #[kani::proof]
    #[kani::unwind(5)]
    fn proof_fifo_two_items() {
        let mut s = storage(2);
        let a: u32 = kani::any();
        let b: u32 = kani::any();

        assert_eq!(s.push_back(a), Ok(0));
        assert_eq!(s.push_back(b), Ok(1));
        assert_eq!(s.pop_front(), Some((a, 0)));
        assert_eq!(s.pop_front(), Some((b, 1)));
        assert!(s.is_empty());
    }

    /// Any push/pop sequence keeps `len <= capacity`, and a push that
    /// fails leaves the storage untouched.
    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_capacity_never_exceeded() {
        let capacity: usize = kani::any();
        kani::assume(capacity >= 1 && capacity <= 3);
        let mut s = storage(capacity);

        for step in 0..4u32 {
            if kani::any() {
                let before = s.len();
                match s.push_back(step) {
                    Ok(_) => assert_eq!(s.len(), before + 1),
                    Err(item) => {
                        assert_eq!(item, step);
                        assert_eq!(s.len(), capacity);
                    }
                }
            } else {
                let _ = s.pop_front();
            }
            assert!(s.len() <= s.capacity());
            assert_eq!(s.inserted() - s.removed(), s.len() as u64);
        }
    }

    /// After wrapping around, removal ordinals still match insertion
    /// ordinals.
    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_fifo_across_wraparound() {
        let mut s = storage(2);
        let x: u32 = kani::any();

        s.push_back(0).unwrap();
        s.pop_front();
        s.push_back(x).unwrap();
        s.push_back(1).unwrap();
        assert_eq!(s.pop_front(), Some((x, 1)));
        assert_eq!(s.pop_front(), Some((1, 2)));
    }
}

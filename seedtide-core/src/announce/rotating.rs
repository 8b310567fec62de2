//! Ordered sequence with a shared cursor, used for tracker and tier rotation.

use parking_lot::RwLock;

#[derive(Debug)]
struct Rotation<T> {
    items: Vec<T>,
    current: usize,
}

/// Ordered list with a cursor that always points at a live element.
///
/// Reads take a shared lock; `next`, `promote_current` and `rewind_to_first`
/// are exclusive. Construction rejects empty lists so `current()` is total.
#[derive(Debug)]
pub struct RotatingList<T: Clone> {
    rotation: RwLock<Rotation<T>>,
}

#[allow(clippy::len_without_is_empty)]
impl<T: Clone> RotatingList<T> {
    /// Returns `None` for an empty list.
    pub fn new(items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self {
            rotation: RwLock::new(Rotation { items, current: 0 }),
        })
    }

    pub fn current(&self) -> T {
        let rotation = self.rotation.read();
        rotation.items[rotation.current].clone()
    }

    pub fn current_index(&self) -> usize {
        self.rotation.read().current
    }

    /// Advances the cursor circularly and returns the new current element.
    pub fn next(&self) -> T {
        let mut rotation = self.rotation.write();
        rotation.current = (rotation.current + 1) % rotation.items.len();
        rotation.items[rotation.current].clone()
    }

    /// Moves the current element to the front, shifting the elements before
    /// it down by one, and resets the cursor to 0.
    pub fn promote_current(&self) {
        let mut rotation = self.rotation.write();
        let current = rotation.current;
        if current == 0 {
            return;
        }
        rotation.items[..=current].rotate_right(1);
        rotation.current = 0;
    }

    /// Resets the cursor to 0 without reordering.
    pub fn rewind_to_first(&self) {
        self.rotation.write().current = 0;
    }

    pub fn is_first(&self) -> bool {
        self.rotation.read().current == 0
    }

    pub fn is_last(&self) -> bool {
        let rotation = self.rotation.read();
        rotation.current == rotation.items.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rotation.read().items.len()
    }

    /// Elements in current order.
    pub fn snapshot(&self) -> Vec<T> {
        self.rotation.read().items.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_empty_list_rejected() {
        assert!(RotatingList::<u8>::new(Vec::new()).is_none());
    }

    #[test]
    fn test_next_wraps_around() {
        let list = RotatingList::new(vec!['a', 'b', 'c']).unwrap();
        assert!(list.is_first());
        assert_eq!(list.next(), 'b');
        assert_eq!(list.next(), 'c');
        assert!(list.is_last());
        assert_eq!(list.next(), 'a');
        assert!(list.is_first());
    }

    #[test]
    fn test_promote_current_shifts_predecessors() {
        let list = RotatingList::new(vec!['a', 'b', 'c', 'd']).unwrap();
        list.next();
        list.next();
        list.promote_current();

        assert_eq!(list.snapshot(), vec!['c', 'a', 'b', 'd']);
        assert_eq!(list.current_index(), 0);
        assert_eq!(list.current(), 'c');
    }

    #[test]
    fn test_promote_first_is_noop() {
        let list = RotatingList::new(vec![1, 2, 3]).unwrap();
        list.promote_current();
        assert_eq!(list.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn test_rewind_keeps_order() {
        let list = RotatingList::new(vec![1, 2, 3]).unwrap();
        list.next();
        list.next();
        list.rewind_to_first();
        assert_eq!(list.current(), 1);
        assert_eq!(list.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn test_single_element_is_first_and_last() {
        let list = RotatingList::new(vec!["only"]).unwrap();
        assert!(list.is_first());
        assert!(list.is_last());
        assert_eq!(list.next(), "only");
        list.promote_current();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_concurrent_rotation_keeps_cursor_in_bounds() {
        let list = Arc::new(RotatingList::new((0..5).collect::<Vec<u32>>()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let list = Arc::clone(&list);
                std::thread::spawn(move || {
                    for step in 0..1000 {
                        match (worker + step) % 3 {
                            0 => {
                                list.next();
                            }
                            1 => list.promote_current(),
                            _ => {
                                let _ = list.current();
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(list.current_index() < list.len());
        let mut items = list.snapshot();
        items.sort_unstable();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn prop_operations_preserve_elements(
            len in 1usize..8,
            ops in proptest::collection::vec(0u8..3, 0..64),
        ) {
            let list = RotatingList::new((0..len).collect::<Vec<_>>()).unwrap();
            for op in ops {
                match op {
                    0 => { list.next(); }
                    1 => list.promote_current(),
                    _ => list.rewind_to_first(),
                }
                prop_assert!(list.current_index() < len);
            }
            let mut items = list.snapshot();
            items.sort_unstable();
            prop_assert_eq!(items, (0..len).collect::<Vec<_>>());
        }
    }
}

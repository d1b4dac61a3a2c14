//! Dense ordering of playlist items.
//!
//! Positions are always `0..n-1` in list order. Every mutation here ends
//! with a renumber so callers can persist the positions as-is.

use signage_types::models::PlaylistItem;

/// Anything carrying an explicit integer position.
pub trait Positioned {
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);
}

impl Positioned for PlaylistItem {
    fn position(&self) -> i64 {
        self.position
    }

    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("index {index} out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
}

/// Position the next appended item gets.
pub fn next_position(len: usize) -> i64 {
    len as i64
}

pub fn renumber<T: Positioned>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(index as i64);
    }
}

pub fn is_dense<T: Positioned>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position() == index as i64)
}

/// Splice the element at `from` out and reinsert it at `to`.
pub fn move_item<T: Positioned>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), OrderError> {
    let len = items.len();
    if from >= len {
        return Err(OrderError::OutOfRange { index: from, len });
    }
    if to >= len {
        return Err(OrderError::OutOfRange { index: to, len });
    }

    if from != to {
        let moved = items.remove(from);
        items.insert(to, moved);
    }
    renumber(items);
    Ok(())
}

pub fn remove_item<T: Positioned>(items: &mut Vec<T>, index: usize) -> Result<T, OrderError> {
    if index >= items.len() {
        return Err(OrderError::OutOfRange {
            index,
            len: items.len(),
        });
    }
    let removed = items.remove(index);
    renumber(items);
    Ok(removed)
}

pub fn append<T: Positioned>(items: &mut Vec<T>, mut item: T) {
    item.set_position(next_position(items.len()));
    items.push(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Slot {
        tag: u32,
        position: i64,
    }

    impl Positioned for Slot {
        fn position(&self) -> i64 {
            self.position
        }
        fn set_position(&mut self, position: i64) {
            self.position = position;
        }
    }

    fn slots(n: u32) -> Vec<Slot> {
        (0..n)
            .map(|tag| Slot {
                tag,
                position: tag as i64,
            })
            .collect()
    }

    fn tags(items: &[Slot]) -> Vec<u32> {
        items.iter().map(|s| s.tag).collect()
    }

    #[test]
    fn move_down_and_up() {
        let mut items = slots(4);
        move_item(&mut items, 0, 2).unwrap();
        assert_eq!(tags(&items), vec![1, 2, 0, 3]);
        assert!(is_dense(&items));

        move_item(&mut items, 3, 0).unwrap();
        assert_eq!(tags(&items), vec![3, 1, 2, 0]);
        assert!(is_dense(&items));
    }

    #[test]
    fn move_out_of_range_is_rejected() {
        let mut items = slots(2);
        assert_eq!(
            move_item(&mut items, 2, 0),
            Err(OrderError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            move_item(&mut items, 0, 5),
            Err(OrderError::OutOfRange { index: 5, len: 2 })
        );
        assert_eq!(tags(&items), vec![0, 1]);
    }

    #[test]
    fn renumber_repairs_gaps() {
        let mut items = vec![
            Slot { tag: 7, position: 3 },
            Slot { tag: 8, position: 9 },
            Slot { tag: 9, position: 9 },
        ];
        assert!(!is_dense(&items));
        renumber(&mut items);
        assert!(is_dense(&items));
        assert_eq!(tags(&items), vec![7, 8, 9]);
    }

    #[test]
    fn append_takes_next_free_position() {
        let mut items = slots(3);
        append(&mut items, Slot { tag: 42, position: -1 });
        assert_eq!(items[3].position, 3);
        assert!(is_dense(&items));
    }

    proptest! {
        #[test]
        fn moves_keep_positions_dense(len in 1usize..40, a in 0usize..40, b in 0usize..40) {
            let mut items = slots(len as u32);
            let from = a % len;
            let to = b % len;
            move_item(&mut items, from, to).unwrap();
            prop_assert!(is_dense(&items));
            prop_assert_eq!(items[to].tag, from as u32);
        }

        #[test]
        fn removals_keep_positions_dense(len in 1usize..40, a in 0usize..40) {
            let mut items = slots(len as u32);
            let index = a % len;
            let removed = remove_item(&mut items, index).unwrap();
            prop_assert_eq!(removed.tag, index as u32);
            prop_assert_eq!(items.len(), len - 1);
            prop_assert!(is_dense(&items));
        }
    }
}

//! Fixed-capacity circular buffer with optional overwrite on insertion.
//!
//! Elements are addressed relative to the oldest entry. Both ends accept
//! insertions; when the buffer is full an insertion either fails without
//! touching the contents or discards the element at the opposite end.

use crate::error::{PointCloudError, Result};

/// A circular buffer over `capacity` slots.
///
/// `span` holds the (head, tail) slot indices of the oldest and newest
/// elements, or `None` while the buffer is empty.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    span: Option<(usize, usize)>,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer.
    ///
    /// # Panics
    /// Panics if capacity is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be greater than 0");
        Self::with_slots(capacity)
    }

    /// Creates an empty buffer, rejecting a zero capacity.
    pub fn try_new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PointCloudError::ZeroCapacity);
        }
        Ok(Self::with_slots(capacity))
    }

    fn with_slots(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, span: None }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        match self.span {
            None => 0,
            Some((head, tail)) if tail < head => tail + self.capacity() - head + 1,
            Some((head, tail)) => tail - head + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_none()
    }

    /// True when appending one more element would collide with the head.
    pub fn is_full(&self) -> bool {
        match self.span {
            None => false,
            Some((head, tail)) => (tail + 1) % self.capacity() == head,
        }
    }

    /// Oldest element.
    pub fn front(&self) -> Option<&T> {
        self.span.and_then(|(head, _)| self.slots[head].as_ref())
    }

    /// Newest element.
    pub fn rear(&self) -> Option<&T> {
        self.span.and_then(|(_, tail)| self.slots[tail].as_ref())
    }

    fn slot_of(&self, nth: usize) -> Option<usize> {
        if nth >= self.len() {
            return None;
        }
        let (head, _) = self.span?;
        Some((head + nth) % self.capacity())
    }

    /// Returns the `nth` element counting from the oldest (0).
    pub fn get(&self, nth: usize) -> Option<&T> {
        self.slot_of(nth).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, nth: usize) -> Option<&mut T> {
        let slot = self.slot_of(nth)?;
        self.slots[slot].as_mut()
    }

    /// Replaces the `nth` element in place. Returns false when `nth` is not populated.
    pub fn set(&mut self, nth: usize, value: T) -> bool {
        match self.slot_of(nth) {
            Some(slot) => {
                self.slots[slot] = Some(value);
                true
            }
            None => false,
        }
    }

    /// Inserts after the newest element.
    ///
    /// When full, returns false without mutating unless `overwrite` is set,
    /// in which case the oldest element is discarded.
    pub fn append(&mut self, item: T, overwrite: bool) -> bool {
        let capacity = self.capacity();
        let Some((mut head, tail)) = self.span else {
            self.slots[0] = Some(item);
            self.span = Some((0, 0));
            return true;
        };

        let next = (tail + 1) % capacity;
        if next == head && !overwrite {
            return false;
        }
        self.slots[next] = Some(item);
        if next == head {
            head = (next + 1) % capacity;
        }
        self.span = Some((head, next));
        true
    }

    /// Inserts before the oldest element.
    ///
    /// When full, returns false without mutating unless `overwrite` is set,
    /// in which case the newest element is discarded.
    pub fn prepend(&mut self, item: T, overwrite: bool) -> bool {
        let capacity = self.capacity();
        let Some((head, mut tail)) = self.span else {
            self.slots[0] = Some(item);
            self.span = Some((0, 0));
            return true;
        };

        let prev = (head + capacity - 1) % capacity;
        if prev == tail && !overwrite {
            return false;
        }
        self.slots[prev] = Some(item);
        if prev == tail {
            tail = (prev + capacity - 1) % capacity;
        }
        self.span = Some((prev, tail));
        true
    }

    /// Removes and returns the oldest element.
    pub fn pop_front(&mut self) -> Option<T> {
        let (head, tail) = self.span?;
        let item = self.slots[head].take();
        self.span = if head == tail {
            None
        } else {
            Some(((head + 1) % self.capacity(), tail))
        };
        item
    }

    /// Removes and returns the newest element.
    pub fn pop_back(&mut self) -> Option<T> {
        let (head, tail) = self.span?;
        let item = self.slots[tail].take();
        self.span = if head == tail {
            None
        } else {
            Some((head, (tail + self.capacity() - 1) % self.capacity()))
        };
        item
    }

    /// Drops every element. Capacity is kept.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.span = None;
    }

    /// Iterates from the oldest to the newest element.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |nth| self.get(nth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, items: &[i32]) -> RingBuffer<i32> {
        let mut buffer = RingBuffer::new(capacity);
        for &item in items {
            buffer.append(item, true);
        }
        buffer
    }

    #[test]
    fn test_empty_buffer() {
        let buffer: RingBuffer<i32> = RingBuffer::new(3);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.front(), None);
        assert_eq!(buffer.rear(), None);
        assert_eq!(buffer.get(0), None);
    }

    #[test]
    fn test_single_element_head_equals_tail() {
        let mut buffer = RingBuffer::new(4);
        assert!(buffer.append(7, false));
        assert_eq!(buffer.front(), Some(&7));
        assert_eq!(buffer.rear(), Some(&7));
        assert_eq!(buffer.len(), 1);

        assert_eq!(buffer.pop_front(), Some(7));
        assert!(buffer.is_empty());
        assert!(buffer.append(8, false));
        assert_eq!(buffer.get(0), Some(&8));
    }

    #[test]
    fn test_append_without_overwrite_reports_full() {
        let mut buffer = filled(3, &[1, 2, 3]);
        assert!(buffer.is_full());

        assert!(!buffer.append(4, false));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.front(), Some(&1));
        assert_eq!(buffer.rear(), Some(&3));
    }

    #[test]
    fn test_append_overwrite_evicts_oldest() {
        let buffer = filled(3, &[1, 2, 3, 4]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get(0), Some(&2));
        assert_eq!(buffer.get(2), Some(&4));
        assert_eq!(buffer.get(3), None);
    }

    #[test]
    fn test_count_never_exceeds_capacity() {
        let mut buffer = RingBuffer::new(5);
        for i in 0..37 {
            if i % 3 == 0 {
                buffer.prepend(i, true);
            } else {
                buffer.append(i, true);
            }
            assert!(buffer.len() <= buffer.capacity());
        }
        assert!(buffer.is_full());
    }

    #[test]
    fn test_prepend_order_and_overwrite() {
        let mut buffer = RingBuffer::new(3);
        buffer.prepend(1, false);
        buffer.prepend(2, false);
        buffer.prepend(3, false);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);

        assert!(!buffer.prepend(4, false));
        assert!(buffer.prepend(4, true));
        // Newest element (1) is discarded.
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
    }

    #[test]
    fn test_get_after_wraparound() {
        let mut buffer = filled(4, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert_eq!(buffer.get(3), Some(&6));

        assert_eq!(buffer.pop_front(), Some(3));
        assert!(buffer.append(7, false));
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_set_replaces_logical_element() {
        let mut buffer = filled(3, &[1, 2, 3, 4]);
        assert!(buffer.set(1, 30));
        assert_eq!(buffer.get(1), Some(&30));
        assert!(!buffer.set(3, 99));
    }

    #[test]
    fn test_pop_back_walks_towards_head() {
        let mut buffer = filled(3, &[1, 2, 3, 4]);
        assert_eq!(buffer.pop_back(), Some(4));
        assert_eq!(buffer.pop_back(), Some(3));
        assert_eq!(buffer.rear(), Some(&2));
        assert_eq!(buffer.pop_back(), Some(2));
        assert!(buffer.is_empty());
        assert_eq!(buffer.pop_back(), None);
    }

    #[test]
    fn test_clear_behaves_like_fresh_buffer() {
        let mut buffer = filled(3, &[1, 2, 3, 4, 5]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 3);

        let mut fresh = RingBuffer::new(3);
        assert_eq!(buffer.append(9, false), fresh.append(9, false));
        assert_eq!(buffer.get(0), fresh.get(0));
        assert_eq!(buffer.len(), fresh.len());
    }

    #[test]
    fn test_capacity_one() {
        let mut buffer = RingBuffer::new(1);
        assert!(buffer.append(1, false));
        assert!(buffer.is_full());
        assert!(!buffer.append(2, false));
        assert!(buffer.append(2, true));
        assert_eq!(buffer.front(), Some(&2));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            RingBuffer::<u8>::try_new(0),
            Err(PointCloudError::ZeroCapacity)
        ));
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _buffer: RingBuffer<i32> = RingBuffer::new(0);
    }
}

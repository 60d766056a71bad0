use std::collections::VecDeque;

/// Fixed-capacity FIFO that overwrites its oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, returning the entry evicted to make room for it.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Drops up to `count` of the oldest entries and returns how many were removed.
    pub fn remove(&mut self, count: usize) -> usize {
        let count = count.min(self.items.len());
        self.items.drain(..count);
        count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.len(), ring.capacity());
    }

    #[test]
    fn remove_is_clamped_to_length() {
        let mut ring = RingBuffer::new(4);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.remove(1), 1);
        assert_eq!(ring.peek(), Some(&"b"));
        assert_eq!(ring.remove(10), 1);
        assert!(ring.is_empty());
        assert_eq!(ring.peek(), None);
    }

    #[test]
    fn zero_capacity_holds_one_item() {
        let mut ring = RingBuffer::new(0);
        ring.push(1);
        assert_eq!(ring.push(2), Some(1));
        assert_eq!(ring.len(), 1);
    }
}

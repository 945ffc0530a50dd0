use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::frame::Frame;

/// Fixed-capacity cache of the most recent items.
///
/// Pushing onto a full buffer evicts the oldest item. The buffer is not
/// synchronized; wrap it (see [`FrameRing`]) when it crosses threads.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Copy of the newest item.
    pub fn latest(&self) -> Option<T> {
        self.items.back().cloned()
    }

    /// Copy of the oldest item still retained.
    pub fn oldest(&self) -> Option<T> {
        self.items.front().cloned()
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
}

/// Which retained frame a trigger should process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePick {
    Latest,
    Oldest,
}

/// Frame ring shared between the capture loop and trigger handlers.
///
/// Reads copy the frame out under the same lock that guards writes.
pub struct FrameRing {
    inner: Mutex<RingBuffer<Frame>>,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    pub fn push(&self, frame: Frame) {
        self.inner.lock().push(frame);
    }

    pub fn snapshot(&self, pick: FramePick) -> Option<Frame> {
        let ring = self.inner.lock();
        match pick {
            FramePick::Latest => ring.latest(),
            FramePick::Oldest => ring.oldest(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use crate::AidError;

#[derive(Debug)]
/// Thread-safe FIFO of frames waiting to be sent.
///
/// The controller pushes encoded requests at the back; the transport
/// worker peeks the front, writes it, and pops it only once the whole
/// frame went out.
pub struct MessageQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an item behind every queued item
    pub fn push_back(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Append every item of `batch`, in order, under a single lock
    pub fn extend<I: IntoIterator<Item = T>>(&self, batch: I) {
        self.lock().extend(batch);
    }

    /// Remove and return the oldest item
    pub fn pop_front(&self) -> Result<T, AidError> {
        self.lock().pop_front().ok_or(AidError::QueueEmpty)
    }

    /// Number of queued items
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every item, handing each one to `release` oldest first
    pub fn clear_with<F: FnMut(T)>(&self, release: F) {
        let drained: Vec<T> = self.lock().drain(..).collect();
        drained.into_iter().for_each(release);
    }

    /// Remove and drop every item
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T: Clone> MessageQueue<T> {
    /// Return a copy of the oldest item without removing it
    pub fn peek_front(&self) -> Result<T, AidError> {
        self.lock().front().cloned().ok_or(AidError::QueueEmpty)
    }
}

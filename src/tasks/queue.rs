use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use crate::page::ElementId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub queued: usize,
    pub inflight: usize,
}

impl QueueSnapshot {
    pub fn pending(&self) -> usize {
        self.queued + self.inflight
    }
}

/// FIFO of image elements waiting for classification plus the set of
/// dispatched ones. Unbounded; the inflight cap is the only back-pressure.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    waiting: VecDeque<ElementId>,
    queued: HashSet<ElementId>,
    running: HashSet<ElementId>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `element` unless it is already waiting or running.
    pub fn push(&self, element: ElementId) -> bool {
        let mut inner = self.inner.lock();
        if inner.running.contains(&element) || !inner.queued.insert(element) {
            return false;
        }
        inner.waiting.push_back(element);
        true
    }

    pub fn contains(&self, element: ElementId) -> bool {
        let inner = self.inner.lock();
        inner.queued.contains(&element) || inner.running.contains(&element)
    }

    /// Takes the oldest waiting element if fewer than `limit` are in flight,
    /// counting it as in flight.
    pub fn pop_within(&self, limit: usize) -> Option<ElementId> {
        let mut inner = self.inner.lock();
        if inner.running.len() >= limit {
            return None;
        }
        let element = inner.waiting.pop_front()?;
        inner.queued.remove(&element);
        inner.running.insert(element);
        Some(element)
    }

    pub fn finish(&self, element: ElementId) {
        self.inner.lock().running.remove(&element);
    }

    /// Drops every waiting element; in-flight work is left to finish.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.waiting.len();
        inner.waiting.clear();
        inner.queued.clear();
        dropped
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock();
        QueueSnapshot {
            queued: inner.waiting.len(),
            inflight: inner.running.len(),
        }
    }
}

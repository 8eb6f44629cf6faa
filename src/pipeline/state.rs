use std::collections::HashSet;

use parking_lot::{Mutex, MutexGuard};

use crate::{
    config::PipelineConfig,
    domain::{ClassificationResult, Mode},
    page::Page,
};

use super::{
    cache::ResultCache,
    viewport::{ViewportTracker, WorkingArea},
};

/// Mutable pipeline state shared by the observers, scheduler and controller.
///
/// Lock order: page before state, and never across an await.
pub struct PipelineState {
    inner: Mutex<StateInner>,
}

pub struct StateInner {
    pub mode: Mode,
    /// Bumped on every reset; completions carrying an older epoch are stale.
    pub epoch: u64,
    pub processed: HashSet<String>,
    pub cache: ResultCache,
    pub viewport: ViewportTracker,
}

impl PipelineState {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                mode: Mode::Off,
                epoch: 0,
                processed: HashSet::new(),
                cache: ResultCache::new(config.cache_capacity),
                viewport: ViewportTracker::new(config.viewport_margin),
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock()
    }

    pub fn mode(&self) -> Mode {
        self.inner.lock().mode
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Switches to `mode` and starts a new epoch. Cached results survive a
    /// switch between active modes and are dropped when the filter turns off.
    pub fn reset(&self, mode: Mode) -> u64 {
        let mut inner = self.inner.lock();
        inner.mode = mode;
        inner.epoch += 1;
        inner.processed.clear();
        if !mode.is_active() {
            inner.cache.clear();
        }
        inner.epoch
    }

    #[cfg(test)]
    pub fn is_processed(&self, url: &str) -> bool {
        self.inner.lock().processed.contains(url)
    }

    pub fn cached(&self, url: &str) -> Option<ClassificationResult> {
        self.inner.lock().cache.get(url)
    }

    pub fn cache_len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    pub fn update_working_area(&self, page: &Page) -> WorkingArea {
        self.inner.lock().viewport.update_working_area(page)
    }

    pub fn working_area(&self) -> WorkingArea {
        self.inner.lock().viewport.working_area()
    }
}

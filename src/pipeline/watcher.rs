//! Discovery of image candidates.
//!
//! Two independent producers feed one [`CandidateSink`]: the structural
//! observer reacts to inserted subtrees, the visibility observer to registered
//! elements entering the expanded viewport. Both are inert while disconnected
//! or while the filter is off.

use std::{
    collections::{BTreeSet, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{
    domain::candidate::is_gallery_container,
    page::{ElementId, Page, SharedPage},
};

use super::state::PipelineState;

/// Entry point candidates are offered to.
pub trait CandidateSink: Send + Sync {
    fn offer(&self, element: ElementId);
}

/// Image elements and gallery tiles under `root`, inclusive.
fn watch_targets(page: &Page, root: ElementId) -> Vec<ElementId> {
    page.query_all(root, |element| {
        element.is_image() || is_gallery_container(element)
    })
}

pub struct VisibilityObserver {
    connected: AtomicBool,
    page: SharedPage,
    state: Arc<PipelineState>,
    sink: Arc<dyn CandidateSink>,
    tracked: Mutex<Tracked>,
}

#[derive(Default)]
struct Tracked {
    observed: BTreeSet<ElementId>,
    intersecting: HashSet<ElementId>,
}

impl VisibilityObserver {
    pub fn new(page: SharedPage, state: Arc<PipelineState>, sink: Arc<dyn CandidateSink>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            page,
            state,
            sink,
            tracked: Mutex::new(Tracked::default()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Starts tracking every image and gallery tile already on the page.
    pub fn connect(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        let targets = {
            let page = self.page.lock();
            watch_targets(&page, page.body())
        };
        let count = targets.len();
        self.tracked.lock().observed.extend(targets);
        tracing::debug!(target: "watcher", observed = count, "visibility observer connected");
        self.evaluate();
    }

    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut tracked = self.tracked.lock();
        tracked.observed.clear();
        tracked.intersecting.clear();
        tracing::debug!(target: "watcher", "visibility observer disconnected");
    }

    pub fn observe(&self, element: ElementId) {
        if self.is_connected() {
            self.tracked.lock().observed.insert(element);
        }
    }

    #[cfg(test)]
    pub fn observed_len(&self) -> usize {
        self.tracked.lock().observed.len()
    }

    /// Re-computes intersections and offers the image behind every element
    /// that started intersecting since the last evaluation.
    pub fn evaluate(&self) {
        if !self.is_connected() {
            return;
        }
        let entering = {
            let page = self.page.lock();
            let state = self.state.lock();
            if !state.mode.is_active() {
                return;
            }
            let mut tracked = self.tracked.lock();
            let Tracked {
                observed,
                intersecting,
            } = &mut *tracked;

            observed.retain(|id| page.contains(*id));
            intersecting.retain(|id| observed.contains(id));

            let mut entering = BTreeSet::new();
            for id in observed.iter().copied() {
                if state.viewport.intersects_expanded_viewport(&page, id) {
                    if intersecting.insert(id) && state.viewport.is_in_working_area(&page, id) {
                        if let Some(img) = page.first_image(id) {
                            entering.insert(img);
                        }
                    }
                } else {
                    intersecting.remove(&id);
                }
            }
            entering
        };

        for img in entering {
            self.sink.offer(img);
        }
    }
}

pub struct StructuralObserver {
    connected: AtomicBool,
    page: SharedPage,
    state: Arc<PipelineState>,
    sink: Arc<dyn CandidateSink>,
    visibility: Arc<VisibilityObserver>,
}

impl StructuralObserver {
    pub fn new(
        page: SharedPage,
        state: Arc<PipelineState>,
        sink: Arc<dyn CandidateSink>,
        visibility: Arc<VisibilityObserver>,
    ) -> Self {
        Self {
            connected: AtomicBool::new(false),
            page,
            state,
            sink,
            visibility,
        }
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handles freshly inserted subtree roots.
    pub fn on_nodes_added(&self, roots: &[ElementId]) {
        if !self.is_connected() {
            return;
        }
        let (targets, ready) = {
            let page = self.page.lock();
            let state = self.state.lock();
            if !state.mode.is_active() {
                return;
            }

            let mut targets = BTreeSet::new();
            let mut images = BTreeSet::new();
            for root in roots {
                for target in watch_targets(&page, *root) {
                    targets.insert(target);
                    if let Some(img) = page.first_image(target) {
                        images.insert(img);
                    }
                }
            }
            let ready: Vec<ElementId> = images
                .into_iter()
                .filter(|img| state.viewport.is_in_working_area(&page, *img))
                .collect();
            (targets, ready)
        };

        tracing::debug!(
            target: "watcher",
            roots = roots.len(),
            observed = targets.len(),
            ready = ready.len(),
            "subtree inserted"
        );
        for target in targets {
            self.visibility.observe(target);
        }
        for img in ready {
            self.sink.offer(img);
        }
    }
}

/// Both observers, started and stopped together.
pub struct DomWatcher {
    structural: StructuralObserver,
    visibility: Arc<VisibilityObserver>,
}

impl DomWatcher {
    pub fn new(page: SharedPage, state: Arc<PipelineState>, sink: Arc<dyn CandidateSink>) -> Self {
        let visibility = Arc::new(VisibilityObserver::new(
            page.clone(),
            state.clone(),
            sink.clone(),
        ));
        let structural = StructuralObserver::new(page, state, sink, visibility.clone());
        Self {
            structural,
            visibility,
        }
    }

    pub fn start(&self) {
        self.structural.connect();
        self.visibility.connect();
        tracing::info!(target: "watcher", "dom watcher started");
    }

    pub fn stop(&self) {
        self.structural.disconnect();
        self.visibility.disconnect();
        tracing::info!(target: "watcher", "dom watcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.structural.is_connected() && self.visibility.is_connected()
    }

    pub fn structural(&self) -> &StructuralObserver {
        &self.structural
    }

    pub fn visibility(&self) -> &VisibilityObserver {
        &self.visibility
    }
}

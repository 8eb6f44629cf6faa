use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    classifier::ClassificationChain,
    config::PipelineConfig,
    domain::Mode,
    page::{ElementId, NodeSpec, PageError, SharedPage},
    tasks::{EnqueueOutcome, Scheduler},
};

use super::{presentation, state::PipelineState, watcher::DomWatcher};

/// Owns the active mode and the lifecycle of everything hanging off it.
pub struct ModeController {
    state: Arc<PipelineState>,
    page: SharedPage,
    scheduler: Scheduler,
    chain: ClassificationChain,
    watcher: DomWatcher,
    layout_debounce: Duration,
    pending_layout: Mutex<Option<JoinHandle<()>>>,
}

impl ModeController {
    pub fn new(
        state: Arc<PipelineState>,
        page: SharedPage,
        scheduler: Scheduler,
        chain: ClassificationChain,
        config: &PipelineConfig,
    ) -> Arc<Self> {
        let watcher = DomWatcher::new(page.clone(), state.clone(), Arc::new(scheduler.clone()));
        Arc::new(Self {
            state,
            page,
            scheduler,
            chain,
            watcher,
            layout_debounce: config.scroll_debounce,
            pending_layout: Mutex::new(None),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[cfg(test)]
    pub fn is_watching(&self) -> bool {
        self.watcher.is_running()
    }

    /// Returns `false` when `mode` is already active.
    pub async fn set_mode(&self, mode: Mode) -> bool {
        let previous = self.state.mode();
        if previous == mode {
            tracing::debug!(target: "mode", mode = %mode, "mode unchanged");
            return false;
        }
        tracing::info!(target: "mode", from = %previous, to = %mode, "switching mode");

        if mode.is_active() {
            self.activate(mode);
        } else {
            self.deactivate().await;
        }
        true
    }

    fn activate(&self, mode: Mode) {
        self.cancel_pending_layout();
        self.watcher.stop();

        presentation::clear_all(&mut self.page.lock());
        self.state.reset(mode);
        self.scheduler.clear_queue();
        self.state.update_working_area(&self.page.lock());

        self.watcher.start();
        let admitted = self.reprocess_visible();
        tracing::info!(target: "mode", mode = %mode, admitted, "filter active");
    }

    async fn deactivate(&self) {
        self.watcher.stop();
        self.cancel_pending_layout();

        self.state.reset(Mode::Off);
        let dropped = self.scheduler.clear_queue();
        let forgotten = self.chain.forget_inflight();
        self.chain.reset_availability().await;
        presentation::clear_all(&mut self.page.lock());

        tracing::info!(target: "mode", dropped, forgotten, "filter off");
    }

    /// Offers every unprocessed image in the working area to the scheduler.
    pub fn reprocess_visible(&self) -> usize {
        let candidates: Vec<ElementId> = {
            let page = self.page.lock();
            let state = self.state.lock();
            if !state.mode.is_active() {
                return 0;
            }
            page.images()
                .into_iter()
                .filter(|img| {
                    page.attribute(*img, presentation::PROCESSED_ATTR).is_none()
                        && state.viewport.is_in_working_area(&page, *img)
                })
                .collect()
        };

        candidates
            .into_iter()
            .filter(|img| {
                matches!(
                    self.scheduler.enqueue(*img),
                    EnqueueOutcome::Queued | EnqueueOutcome::PresentedFromCache
                )
            })
            .count()
    }

    pub fn handle_scroll(self: &Arc<Self>, y: f64) {
        self.page.lock().scroll_to(y);
        self.on_layout_change();
    }

    pub fn handle_resize(self: &Arc<Self>, viewport_height: f64) {
        self.page.lock().set_viewport_height(viewport_height);
        self.on_layout_change();
    }

    /// Intersections are re-evaluated at once; the working area follows after
    /// the debounce window.
    fn on_layout_change(self: &Arc<Self>) {
        if !self.state.mode().is_active() {
            return;
        }
        self.watcher.visibility().evaluate();

        let controller = Arc::clone(self);
        let delay = self.layout_debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.refresh_working_area();
        });
        if let Some(previous) = self.pending_layout.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Runs a pending debounced refresh now instead of waiting for its timer.
    pub fn flush_layout(&self) {
        let pending = self.pending_layout.lock().take();
        if let Some(handle) = pending {
            handle.abort();
            self.refresh_working_area();
        }
    }

    fn cancel_pending_layout(&self) {
        if let Some(handle) = self.pending_layout.lock().take() {
            handle.abort();
        }
    }

    fn refresh_working_area(&self) {
        if !self.state.mode().is_active() {
            return;
        }
        let area = self.state.update_working_area(&self.page.lock());
        let admitted = self.reprocess_visible();
        tracing::debug!(
            target: "mode",
            top = area.top,
            bottom = area.bottom,
            admitted,
            "working area refreshed"
        );
    }

    /// Inserts `node` under `parent` (the body when absent) and reports it to
    /// the structural observer.
    pub fn handle_insert(
        &self,
        parent: Option<ElementId>,
        node: &NodeSpec,
    ) -> Result<ElementId, PageError> {
        let root = {
            let mut page = self.page.lock();
            let parent = parent.unwrap_or_else(|| page.body());
            page.build_subtree(parent, node)?
        };
        self.watcher.structural().on_nodes_added(&[root]);
        Ok(root)
    }

    pub fn handle_remove(&self, element: ElementId) -> Result<(), PageError> {
        self.page.lock().remove(element)
    }
}

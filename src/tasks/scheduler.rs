use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    domain::ImageCandidate,
    page::{ElementId, SharedPage},
    pipeline::{presentation, state::PipelineState, watcher::CandidateSink},
};

use super::{
    processor::{CandidateProcessor, ProcessOutcome},
    queue::{CandidateQueue, QueueSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// A cached result was applied without going to the network.
    PresentedFromCache,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    AlreadyQueued,
    NoUrl,
    OutsideWorkingArea,
    AlreadyDispatched,
}

/// Admits candidates and keeps at most `max_inflight` classifications running.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    queue: CandidateQueue,
    max_inflight: usize,
    processor: Arc<CandidateProcessor>,
    state: Arc<PipelineState>,
    page: SharedPage,
    pending: watch::Sender<usize>,
}

impl Scheduler {
    pub fn new(
        processor: Arc<CandidateProcessor>,
        state: Arc<PipelineState>,
        page: SharedPage,
        max_inflight: usize,
    ) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(SchedulerInner {
                queue: CandidateQueue::new(),
                max_inflight: max_inflight.max(1),
                processor,
                state,
                page,
                pending,
            }),
        }
    }

    /// Must be called from within a tokio runtime; admitted work is spawned.
    pub fn enqueue(&self, element: ElementId) -> EnqueueOutcome {
        let outcome = {
            let mut page = self.inner.page.lock();
            let state = self.inner.state.lock();

            if !state.mode.is_active() {
                EnqueueOutcome::Skipped(SkipReason::Inactive)
            } else if self.inner.queue.contains(element) {
                EnqueueOutcome::Skipped(SkipReason::AlreadyQueued)
            } else if let Some(candidate) = ImageCandidate::resolve(&page, element) {
                if !state.viewport.is_in_working_area(&page, element) {
                    EnqueueOutcome::Skipped(SkipReason::OutsideWorkingArea)
                } else if let Some(result) = state.cache.get(&candidate.url) {
                    presentation::apply(&mut page, element, result, state.mode);
                    EnqueueOutcome::PresentedFromCache
                } else if state.processed.contains(&candidate.url) {
                    EnqueueOutcome::Skipped(SkipReason::AlreadyDispatched)
                } else {
                    self.inner.queue.push(element);
                    EnqueueOutcome::Queued
                }
            } else {
                EnqueueOutcome::Skipped(SkipReason::NoUrl)
            }
        };

        tracing::trace!(target: "scheduler", element = %element, outcome = ?outcome, "candidate offered");
        if outcome == EnqueueOutcome::Queued {
            self.drain();
        }
        outcome
    }

    /// Dispatches waiting candidates until the inflight cap is reached.
    fn drain(&self) {
        while let Some(element) = self.inner.queue.pop_within(self.inner.max_inflight) {
            let epoch = self.inner.state.epoch();
            let scheduler = self.clone();
            tokio::spawn(async move {
                let outcome = scheduler.inner.processor.process(element, epoch).await;
                scheduler.inner.queue.finish(element);
                match outcome {
                    ProcessOutcome::Classified { result, applied } => tracing::debug!(
                        target: "scheduler",
                        element = %element,
                        is_ai = result.is_ai,
                        applied,
                        "candidate finished"
                    ),
                    ProcessOutcome::AlreadyDispatched => tracing::debug!(
                        target: "scheduler",
                        element = %element,
                        "url already dispatched by another element"
                    ),
                    ProcessOutcome::Stale | ProcessOutcome::Abandoned => {
                        // The page or mode moved on while classifying; offer
                        // the element again under the current state.
                        let retry = scheduler.enqueue(element);
                        tracing::debug!(
                            target: "scheduler",
                            element = %element,
                            outcome = ?outcome,
                            retry = ?retry,
                            "candidate re-offered"
                        );
                    }
                }
                scheduler.refresh_pending();
                scheduler.drain();
            });
        }
        self.refresh_pending();
    }

    /// Forgets waiting candidates. Running ones complete and are judged stale
    /// by their epoch.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.inner.queue.clear();
        if dropped > 0 {
            tracing::info!(target: "scheduler", dropped, "queue cleared");
        }
        self.refresh_pending();
        dropped
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.queue.snapshot()
    }

    /// Resolves once nothing is queued or in flight.
    pub async fn wait_idle(&self) {
        let mut pending = self.inner.pending.subscribe();
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    /// Reads and publishes the count inside the channel's write lock so
    /// concurrent finishers cannot publish an older count after a newer one.
    fn refresh_pending(&self) {
        let queue = &self.inner.queue;
        self.inner
            .pending
            .send_modify(|pending| *pending = queue.snapshot().pending());
    }
}

impl CandidateSink for Scheduler {
    fn offer(&self, element: ElementId) {
        self.enqueue(element);
    }
}

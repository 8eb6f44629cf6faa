use std::sync::Arc;

use crate::{
    classifier::ClassificationChain,
    domain::{ClassificationResult, ImageCandidate},
    page::{ElementId, SharedPage},
    pipeline::{presentation, state::PipelineState},
};

/// What became of one dispatched element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessOutcome {
    /// Result cached; `applied` tells whether the page was mutated.
    Classified {
        result: ClassificationResult,
        applied: bool,
    },
    /// Another element already dispatched the same URL.
    AlreadyDispatched,
    /// The element lost its URL or left the page while classification ran.
    Abandoned,
    /// The pipeline was reset while classification ran.
    Stale,
}

pub struct CandidateProcessor {
    chain: ClassificationChain,
    state: Arc<PipelineState>,
    page: SharedPage,
}

impl CandidateProcessor {
    pub fn new(chain: ClassificationChain, state: Arc<PipelineState>, page: SharedPage) -> Self {
        Self { chain, state, page }
    }

    pub async fn process(&self, element: ElementId, epoch: u64) -> ProcessOutcome {
        let url = {
            let page = self.page.lock();
            ImageCandidate::resolve(&page, element).map(|candidate| candidate.url)
        };
        let Some(url) = url else {
            tracing::debug!(target: "processor", element = %element, "candidate has no url at dispatch");
            return ProcessOutcome::Abandoned;
        };
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return ProcessOutcome::Stale;
            }
            if !state.processed.insert(url.clone()) {
                return ProcessOutcome::AlreadyDispatched;
            }
        }

        let probability = self.chain.classify(&url).await;
        let result = ClassificationResult::from_probability(probability);
        tracing::info!(
            target: "processor",
            url = %url,
            prob = format_args!("{probability:.3}"),
            is_ai = result.is_ai,
            "image classified"
        );

        let mut page = self.page.lock();
        let mut state = self.state.lock();

        if !state.mode.is_active() {
            return ProcessOutcome::Stale;
        }
        if state.epoch != epoch {
            state.cache.insert(url, result);
            return ProcessOutcome::Stale;
        }

        let still_same = ImageCandidate::resolve(&page, element)
            .is_some_and(|candidate| candidate.url == url);
        if !still_same {
            state.processed.remove(&url);
            tracing::debug!(
                target: "processor",
                element = %element,
                url = %url,
                "candidate changed while classifying; will retry on next observation"
            );
            return ProcessOutcome::Abandoned;
        }

        state.cache.insert(url, result);

        if !state.viewport.is_in_working_area(&page, element) {
            tracing::debug!(target: "processor", element = %element, "left working area; result cached only");
            return ProcessOutcome::Classified {
                result,
                applied: false,
            };
        }

        presentation::apply(&mut page, element, result, state.mode);
        ProcessOutcome::Classified {
            result,
            applied: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::{
        classifier::{
            testing::{FakeFallback, FakeScorer},
            FallbackResponse,
        },
        config::{ClassifierConfig, PipelineConfig},
        domain::Mode,
        page::{LayoutBox, Page},
    };

    struct Fixture {
        page: SharedPage,
        state: Arc<PipelineState>,
        processor: CandidateProcessor,
        img: ElementId,
    }

    fn fixture(scorer: FakeScorer, top: f64) -> Fixture {
        let mut page = Page::new(Url::parse("https://example.com/").unwrap(), 500.0);
        let body = page.body();
        let img = page.create_element("img");
        page.append_child(body, img).unwrap();
        page.set_attribute(img, "src", "/a.jpg");
        page.get_mut(img).unwrap().layout = LayoutBox {
            top,
            height: 100.0,
            width: 100.0,
        };
        let page = page.into_shared();

        let state = Arc::new(PipelineState::new(&PipelineConfig::default()));
        state.reset(Mode::Light);
        state.update_working_area(&page.lock());

        let chain = ClassificationChain::new(
            Arc::new(scorer),
            Arc::new(FakeFallback::answering(FallbackResponse::probability(0.1))),
            &ClassifierConfig::default(),
        );
        let processor = CandidateProcessor::new(chain, state.clone(), page.clone());
        Fixture {
            page,
            state,
            processor,
            img,
        }
    }

    #[tokio::test]
    async fn element_scrolled_away_is_cached_but_untouched() {
        let f = fixture(FakeScorer::answering(0.95), 100.0);
        let epoch = f.state.epoch();
        f.page.lock().get_mut(f.img).unwrap().layout.top = 9000.0;

        let outcome = f.processor.process(f.img, epoch).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Classified { applied: false, .. }
        ));
        assert!(f.state.cached("https://example.com/a.jpg").is_some());
        assert!(presentation::badge_of(&f.page.lock(), f.img).is_none());
    }

    #[tokio::test]
    async fn url_disappearing_rolls_back_processed_marker() {
        let f = fixture(FakeScorer::answering(0.95), 100.0);
        let epoch = f.state.epoch();
        f.page.lock().remove_attribute(f.img, "src");

        assert_eq!(f.processor.process(f.img, epoch).await, ProcessOutcome::Abandoned);
        assert!(!f.state.is_processed("https://example.com/a.jpg"));
    }

    #[tokio::test]
    async fn stale_epoch_never_mutates_page() {
        let f = fixture(FakeScorer::answering(0.95), 100.0);
        let epoch = f.state.epoch();
        let pending = f.processor.process(f.img, epoch);
        f.state.reset(Mode::Strict);

        assert_eq!(pending.await, ProcessOutcome::Stale);
        assert!(f.page.lock().attribute(f.img, presentation::PROCESSED_ATTR).is_none());
    }

    #[tokio::test]
    async fn in_area_result_is_presented_and_cached() {
        let f = fixture(FakeScorer::answering(0.95), 100.0);
        let epoch = f.state.epoch();

        let outcome = f.processor.process(f.img, epoch).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Classified { applied: true, result } if result.is_ai
        ));
        assert!(f.state.is_processed("https://example.com/a.jpg"));
        assert!(presentation::badge_of(&f.page.lock(), f.img).is_some());
    }
}

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::{sync::Mutex, time::Instant};

use crate::config::ClassifierConfig;

use super::{FallbackClassifier, RequestDeduplicator, ScoringService};

/// Last known state of the scoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Available,
    Unavailable { since: Instant },
}

/// Remote scoring first, background estimate second, conservative default last.
///
/// Every call resolves to a probability in `[0, 1]`; failures are absorbed here
/// and only show up in the logs.
#[derive(Clone)]
pub struct ClassificationChain {
    inner: Arc<ChainInner>,
}

struct ChainInner {
    scorer: Arc<dyn ScoringService>,
    fallback: Arc<dyn FallbackClassifier>,
    availability: Mutex<Availability>,
    inflight: RequestDeduplicator<f64>,
    default_probability: f64,
    reprobe_after: Option<Duration>,
}

impl ClassificationChain {
    pub fn new(
        scorer: Arc<dyn ScoringService>,
        fallback: Arc<dyn FallbackClassifier>,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ChainInner {
                scorer,
                fallback,
                availability: Mutex::new(Availability::Unknown),
                inflight: RequestDeduplicator::new(),
                default_probability: config.fallback_probability.clamp(0.0, 1.0),
                reprobe_after: config.reprobe_after,
            }),
        }
    }

    pub async fn classify(&self, url: &str) -> f64 {
        let inner = self.inner.clone();
        let owned = url.to_string();
        self.inner
            .inflight
            .run(url, move || inner.resolve(owned).boxed())
            .await
    }

    #[cfg(test)]
    pub async fn availability(&self) -> Availability {
        *self.inner.availability.lock().await
    }

    /// Clears the latched availability so the next call probes again.
    pub async fn reset_availability(&self) {
        let mut availability = self.inner.availability.lock().await;
        if *availability != Availability::Unknown {
            tracing::info!(target: "classifier", "scoring service availability reset");
        }
        *availability = Availability::Unknown;
    }

    pub fn forget_inflight(&self) -> usize {
        self.inner.inflight.clear()
    }

    #[cfg(test)]
    pub fn inflight_len(&self) -> usize {
        self.inner.inflight.len()
    }
}

impl ChainInner {
    async fn resolve(self: Arc<Self>, url: String) -> f64 {
        if !self.server_available().await {
            return self.fallback_probability(&url).await;
        }

        match self.scorer.score(&url).await {
            Ok(prob) => {
                tracing::debug!(target: "classifier", url = %short(&url), prob, "scored by service");
                prob.clamp(0.0, 1.0)
            }
            Err(err) => {
                tracing::warn!(
                    target: "classifier",
                    error = %err,
                    url = %short(&url),
                    "scoring request failed; switching to fallback"
                );
                self.mark_unavailable().await;
                self.fallback_probability(&url).await
            }
        }
    }

    /// Probes the service while availability is unknown. The lock is held
    /// across the probe so concurrent callers wait for a single answer.
    async fn server_available(&self) -> bool {
        let mut availability = self.availability.lock().await;

        if let (Availability::Unavailable { since }, Some(after)) =
            (*availability, self.reprobe_after)
        {
            if since.elapsed() >= after {
                tracing::info!(target: "classifier", "re-probing scoring service");
                *availability = Availability::Unknown;
            }
        }

        if *availability == Availability::Unknown {
            *availability = if self.scorer.health().await {
                tracing::info!(target: "classifier", "scoring service available");
                Availability::Available
            } else {
                tracing::warn!(target: "classifier", "scoring service unavailable; using fallback");
                Availability::Unavailable {
                    since: Instant::now(),
                }
            };
        }

        *availability == Availability::Available
    }

    async fn mark_unavailable(&self) {
        let mut availability = self.availability.lock().await;
        if !matches!(*availability, Availability::Unavailable { .. }) {
            *availability = Availability::Unavailable {
                since: Instant::now(),
            };
        }
    }

    async fn fallback_probability(&self, url: &str) -> f64 {
        match self.fallback.classify(url).await {
            Ok(answer) => match answer.usable_probability() {
                Some(prob) => prob,
                None => {
                    tracing::warn!(
                        target: "classifier",
                        url = %short(url),
                        error = answer.error.as_deref().unwrap_or("unexpected response"),
                        "fallback classification failed"
                    );
                    self.default_probability
                }
            },
            Err(err) => {
                tracing::warn!(
                    target: "classifier",
                    url = %short(url),
                    error = %err,
                    "fallback classifier unreachable"
                );
                self.default_probability
            }
        }
    }
}

fn short(url: &str) -> &str {
    match url.char_indices().nth(100) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}

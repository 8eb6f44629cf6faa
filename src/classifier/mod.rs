//! Resolution of an image URL to an AI probability.
//!
//! The remote scoring service is tried first; any failure flips the chain onto
//! the background classifier, which always yields a value.

pub mod background;
pub mod chain;
pub mod client;
pub mod dedup;
pub mod wire;

#[cfg(test)]
pub mod testing;

use futures::future::BoxFuture;
use thiserror::Error;

pub use background::{BackgroundClassifier, PassthroughEncoder};
pub use chain::ClassificationChain;
pub use client::ScoringClient;
pub use dedup::RequestDeduplicator;
pub use wire::FallbackResponse;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier rejected image: {0}")]
    Rejected(String),
    #[error("malformed classifier response: {0}")]
    Protocol(String),
}

/// The remote scoring endpoint.
pub trait ScoringService: Send + Sync {
    /// `true` when the service answers its health probe.
    fn health(&self) -> BoxFuture<'_, bool>;

    fn score<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<f64, ClassifierError>>;
}

/// Degraded classification path used when the scoring service is unavailable.
pub trait FallbackClassifier: Send + Sync {
    fn classify<'a>(&'a self, url: &'a str)
        -> BoxFuture<'a, Result<FallbackResponse, ClassifierError>>;
}

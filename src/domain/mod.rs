pub mod candidate;
pub mod types;

pub use candidate::ImageCandidate;
pub use types::{ClassificationResult, Mode};

pub mod processor;
pub mod queue;
pub mod scheduler;

pub use queue::QueueSnapshot;
pub use scheduler::{EnqueueOutcome, Scheduler};

pub mod cache;
pub mod controller;
pub mod presentation;
pub mod state;
pub mod viewport;
pub mod watcher;

pub use controller::ModeController;
pub use state::PipelineState;
pub use viewport::WorkingArea;

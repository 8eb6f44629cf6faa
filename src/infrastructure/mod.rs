pub mod directories;
pub mod logging;
pub mod mode_store;
pub mod shutdown;

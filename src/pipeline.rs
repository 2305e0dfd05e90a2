//! Event-ingestion pipeline: ordered block queue, progress floor, and the
//! single-consumer drain driver.

pub mod driver;
pub mod progress;
pub mod queue;

pub use driver::{DriverParams, PipelineDriver};
pub use progress::ProgressTracker;
pub use queue::BlockQueue;

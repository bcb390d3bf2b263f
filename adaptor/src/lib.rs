//! Feeder that copies upstream sensor readings into farm-api samples.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod sink;
pub mod upstream;

pub use config::Args;
pub use error::CallError;
pub use pipeline::{run, IngestOptions, IngestReport, ItemFailure};
pub use retry::RetryPolicy;
pub use sink::{FarmClient, Forwarded};
pub use upstream::{Reading, UpstreamClient};
